use serde::{Deserialize, Serialize};

use crate::ids::{TenantId, UserId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Operator,
    Supervisor,
    Admin,
}

/// Caller identity passed into every kernel operation.
///
/// Authentication happens upstream; the kernel trusts these fields and uses
/// them for tenant scoping, role checks and audit attribution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub role: UserRole,
}

impl RequestContext {
    pub fn new(tenant_id: TenantId, user_id: UserId, role: UserRole) -> Self {
        Self {
            tenant_id,
            user_id,
            role,
        }
    }

    pub fn operator(tenant: impl Into<String>, user: impl Into<String>) -> Self {
        Self::new(TenantId::new(tenant), UserId::new(user), UserRole::Operator)
    }

    pub fn supervisor(tenant: impl Into<String>, user: impl Into<String>) -> Self {
        Self::new(TenantId::new(tenant), UserId::new(user), UserRole::Supervisor)
    }

    pub fn can_supervise(&self) -> bool {
        matches!(self.role, UserRole::Supervisor | UserRole::Admin)
    }
}
