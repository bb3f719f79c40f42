//! Collaborator ports consumed by the kernel.
//!
//! Persistence, blob storage, vehicle history, notification delivery and
//! time are all external. The kernel only talks to these traits; in-memory
//! implementations live in [`crate::memory`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use scrapline_types::{
    AuditEntry, AuditRecord, Evidence, EvidenceId, TenantId, Transaction, TransactionId,
    VehicleVisit,
};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Load/save for transaction records.
///
/// ## OCC Conflict Detection
///
/// `save` is conditional on `expected_version` matching the stored version.
/// On mismatch it returns `StorageError::ConcurrentConflict` and writes
/// nothing. On success the stored version becomes `expected_version + 1`.
#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Insert a new transaction at version 0.
    async fn insert(&self, transaction: Transaction) -> StorageResult<()>;

    /// Load a transaction by id regardless of tenant.
    ///
    /// Tenant scoping is enforced by the caller so that cross-tenant access
    /// can be told apart from a missing record and audit-logged.
    async fn load(&self, id: &TransactionId) -> StorageResult<Option<Transaction>>;

    /// Version-checked write. Returns the new version.
    async fn save(&self, transaction: &Transaction, expected_version: u64) -> StorageResult<u64>;

    /// List a tenant's transactions.
    async fn list_for_tenant(&self, tenant_id: &TenantId) -> StorageResult<Vec<Transaction>>;
}

/// Append-only evidence store.
///
/// There is deliberately no delete operation.
#[async_trait]
pub trait EvidenceStore: Send + Sync {
    async fn append(&self, evidence: Evidence) -> StorageResult<()>;

    async fn get(&self, id: &EvidenceId) -> StorageResult<Option<Evidence>>;

    /// All evidence for a transaction, in storage (insertion) order.
    async fn list_for_transaction(&self, id: &TransactionId) -> StorageResult<Vec<Evidence>>;

    /// Set `is_processed = true`, leaving every other field untouched.
    async fn mark_processed(&self, id: &EvidenceId) -> StorageResult<()>;
}

/// Append-only audit log.
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Seal and append a record, returning the chained entry.
    async fn append(&self, record: AuditRecord) -> StorageResult<AuditEntry>;

    /// Entries for a tenant in append order.
    async fn list_for_tenant(&self, tenant_id: &TenantId) -> StorageResult<Vec<AuditEntry>>;

    /// Entries for a transaction in append order.
    async fn list_for_transaction(&self, id: &TransactionId) -> StorageResult<Vec<AuditEntry>>;
}

/// Blob storage for evidence files.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes and return the path they can be read back from.
    async fn put(
        &self,
        tenant_id: &TenantId,
        transaction_id: &TransactionId,
        bytes: &[u8],
    ) -> StorageResult<String>;

    async fn get(&self, path: &str) -> StorageResult<Option<Vec<u8>>>;
}

/// Vehicle master data, owned outside the kernel.
#[async_trait]
pub trait VehicleRegistry: Send + Sync {
    async fn append_visit(&self, tenant_id: &TenantId, visit: VehicleVisit) -> StorageResult<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    SupervisorApprovalRequired,
    MaterialRejected,
    VehicleExited,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub tenant_id: TenantId,
    pub transaction_id: TransactionId,
    pub message: String,
}

/// Outbound notification delivery (email, messaging). Failures never abort
/// the triggering operation.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), String>;
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<RwLock<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(RwLock::new(start)),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.write() = at;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.write();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read()
    }
}

/// The full set of collaborators the kernel runs against.
#[derive(Clone)]
pub struct Ports {
    pub transactions: Arc<dyn TransactionRepository>,
    pub evidence: Arc<dyn EvidenceStore>,
    pub audit: Arc<dyn AuditLog>,
    pub blobs: Arc<dyn BlobStore>,
    pub vehicles: Arc<dyn VehicleRegistry>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn manual_clock_moves_only_when_told() {
        let start = Utc::now();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);

        clock.advance(Duration::minutes(10));
        assert_eq!(clock.now(), start + Duration::minutes(10));

        clock.set(start);
        assert_eq!(clock.now(), start);
    }

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new(Utc::now());
        let other = clock.clone();
        clock.advance(Duration::hours(1));
        assert_eq!(clock.now(), other.now());
    }
}
