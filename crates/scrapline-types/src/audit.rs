//! Audit record types.
//!
//! Every state-changing operation and every blocked attempt produces one
//! entry. Entries are append-only: the log store seals each record into an
//! [`AuditEntry`] carrying a hash chained over its predecessor.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AuditEntryId, TenantId, TransactionId, UserId};

/// Audit action types
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    TransactionCreated,
    TransactionCancelled,
    LevelCompleted,
    LevelApproved,
    WeighbridgeGrossCaptured,
    WeighbridgeTareCaptured,
    EvidenceCapture,
    EvidenceProcessed,
    EvidenceIntegrityVerified,
    ChronologyViolation,
    BackdatingBlocked,
    GatePassGenerated,
    GatePassValidationFailed,
    VehicleExitCompleted,
    VehicleExitSupervisorOverride,
    SupervisorOverrideExpiredGatePass,
    Rejection,
    Delete,
    AccessDenied,
}

/// Severity attached to an audit entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// An audit record before it has been sealed by the log store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub id: AuditEntryId,
    pub tenant_id: TenantId,
    pub transaction_id: Option<TransactionId>,
    pub actor: Option<UserId>,
    pub action: AuditAction,
    pub severity: AuditSeverity,
    pub description: String,
    #[serde(default)]
    pub details: BTreeMap<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    /// Create a new audit record builder
    pub fn builder(tenant_id: TenantId, action: AuditAction) -> AuditRecordBuilder {
        AuditRecordBuilder::new(tenant_id, action)
    }
}

/// Builder for audit records
#[derive(Debug)]
pub struct AuditRecordBuilder {
    tenant_id: TenantId,
    action: AuditAction,
    transaction_id: Option<TransactionId>,
    actor: Option<UserId>,
    severity: AuditSeverity,
    description: String,
    details: BTreeMap<String, serde_json::Value>,
}

impl AuditRecordBuilder {
    pub fn new(tenant_id: TenantId, action: AuditAction) -> Self {
        Self {
            tenant_id,
            action,
            transaction_id: None,
            actor: None,
            severity: AuditSeverity::Low,
            description: String::new(),
            details: BTreeMap::new(),
        }
    }

    pub fn transaction(mut self, id: TransactionId) -> Self {
        self.transaction_id = Some(id);
        self
    }

    pub fn actor(mut self, actor: UserId) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn severity(mut self, severity: AuditSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add a detail value. Values that fail to serialize are skipped.
    pub fn detail(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.details.insert(key.into(), v);
        }
        self
    }

    pub fn build(self, timestamp: DateTime<Utc>) -> AuditRecord {
        AuditRecord {
            id: AuditEntryId::new(),
            tenant_id: self.tenant_id,
            transaction_id: self.transaction_id,
            actor: self.actor,
            action: self.action,
            severity: self.severity,
            description: self.description,
            details: self.details,
            timestamp,
        }
    }
}

/// A sealed, hash-chained audit entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub sequence: u64,
    #[serde(flatten)]
    pub record: AuditRecord,
    pub previous_hash: Option<String>,
    pub entry_hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_details() {
        let record = AuditRecord::builder(TenantId::new("acme"), AuditAction::Delete)
            .severity(AuditSeverity::High)
            .description("deletion attempt")
            .detail("evidenceId", "ev-1")
            .build(Utc::now());

        assert_eq!(record.action, AuditAction::Delete);
        assert_eq!(record.severity, AuditSeverity::High);
        assert_eq!(record.details.get("evidenceId"), Some(&serde_json::json!("ev-1")));
    }

    #[test]
    fn severity_orders_low_to_critical() {
        assert!(AuditSeverity::Low < AuditSeverity::High);
        assert!(AuditSeverity::High < AuditSeverity::Critical);
    }

    #[test]
    fn action_wire_names() {
        let json = serde_json::to_string(&AuditAction::SupervisorOverrideExpiredGatePass).unwrap();
        assert_eq!(json, "\"SUPERVISOR_OVERRIDE_EXPIRED_GATE_PASS\"");
    }
}
