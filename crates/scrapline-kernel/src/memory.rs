//! In-memory port implementations for development and testing

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use scrapline_types::{
    AuditEntry, AuditRecord, Evidence, EvidenceId, TenantId, Transaction, TransactionId,
    VehicleVisit,
};
use tokio::sync::RwLock;

use crate::audit::{verify_chain, IntegrityChain};
use crate::error::StorageError;
use crate::ports::{
    AuditLog, BlobStore, Clock, EvidenceStore, Notification, Notifier, Ports, StorageResult,
    SystemClock, TransactionRepository, VehicleRegistry,
};

/// In-memory transaction repository with version-checked saves.
#[derive(Debug, Default)]
pub struct InMemoryTransactionRepository {
    transactions: RwLock<HashMap<TransactionId, Transaction>>,
}

impl InMemoryTransactionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionRepository for InMemoryTransactionRepository {
    async fn insert(&self, transaction: Transaction) -> StorageResult<()> {
        let mut transactions = self.transactions.write().await;
        if transactions.contains_key(&transaction.id) {
            return Err(StorageError::AlreadyExists(transaction.id.to_string()));
        }
        let mut transaction = transaction;
        transaction.version = 0;
        transactions.insert(transaction.id, transaction);
        Ok(())
    }

    async fn load(&self, id: &TransactionId) -> StorageResult<Option<Transaction>> {
        let transactions = self.transactions.read().await;
        Ok(transactions.get(id).cloned())
    }

    async fn save(&self, transaction: &Transaction, expected_version: u64) -> StorageResult<u64> {
        let mut transactions = self.transactions.write().await;
        let stored = transactions
            .get_mut(&transaction.id)
            .ok_or_else(|| StorageError::NotFound(transaction.id.to_string()))?;

        if stored.version != expected_version {
            return Err(StorageError::ConcurrentConflict {
                id: transaction.id.to_string(),
                expected_version,
            });
        }

        let mut next = transaction.clone();
        next.version = expected_version + 1;
        *stored = next;
        Ok(expected_version + 1)
    }

    async fn list_for_tenant(&self, tenant_id: &TenantId) -> StorageResult<Vec<Transaction>> {
        let transactions = self.transactions.read().await;
        let mut matching: Vec<_> = transactions
            .values()
            .filter(|t| &t.tenant_id == tenant_id)
            .cloned()
            .collect();
        matching.sort_by_key(|t| t.created_at);
        Ok(matching)
    }
}

/// In-memory append-only evidence store.
///
/// A single vector keeps insertion order, which is the storage order the
/// chronology check runs against.
#[derive(Debug, Default)]
pub struct InMemoryEvidenceStore {
    records: RwLock<Vec<Evidence>>,
}

impl InMemoryEvidenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EvidenceStore for InMemoryEvidenceStore {
    async fn append(&self, evidence: Evidence) -> StorageResult<()> {
        let mut records = self.records.write().await;
        if records.iter().any(|e| e.id == evidence.id) {
            return Err(StorageError::AlreadyExists(evidence.id.to_string()));
        }
        records.push(evidence);
        Ok(())
    }

    async fn get(&self, id: &EvidenceId) -> StorageResult<Option<Evidence>> {
        let records = self.records.read().await;
        Ok(records.iter().find(|e| &e.id == id).cloned())
    }

    async fn list_for_transaction(&self, id: &TransactionId) -> StorageResult<Vec<Evidence>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|e| &e.transaction_id == id)
            .cloned()
            .collect())
    }

    async fn mark_processed(&self, id: &EvidenceId) -> StorageResult<()> {
        let mut records = self.records.write().await;
        let record = records
            .iter_mut()
            .find(|e| &e.id == id)
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        record.is_processed = true;
        Ok(())
    }
}

/// In-memory hash-chained audit log.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    inner: Mutex<AuditState>,
}

#[derive(Debug, Default)]
struct AuditState {
    entries: Vec<AuditEntry>,
    chain: IntegrityChain,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all entries
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.inner.lock().entries.clone()
    }

    /// Recompute the whole chain.
    pub fn verify_chain(&self) -> bool {
        verify_chain(&self.inner.lock().entries)
    }
}

#[async_trait]
impl AuditLog for MemoryAuditLog {
    async fn append(&self, record: AuditRecord) -> StorageResult<AuditEntry> {
        let mut state = self.inner.lock();
        let entry = state.chain.seal(record);
        state.entries.push(entry.clone());
        Ok(entry)
    }

    async fn list_for_tenant(&self, tenant_id: &TenantId) -> StorageResult<Vec<AuditEntry>> {
        let state = self.inner.lock();
        Ok(state
            .entries
            .iter()
            .filter(|e| &e.record.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn list_for_transaction(&self, id: &TransactionId) -> StorageResult<Vec<AuditEntry>> {
        let state = self.inner.lock();
        Ok(state
            .entries
            .iter()
            .filter(|e| e.record.transaction_id.as_ref() == Some(id))
            .cloned()
            .collect())
    }
}

/// In-memory blob store keyed by `tenant/transaction/uuid` paths.
#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite stored bytes in place, as a corrupted or tampered backend would.
    pub async fn overwrite(&self, path: &str, bytes: Vec<u8>) {
        self.blobs.write().await.insert(path.to_string(), bytes);
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(
        &self,
        tenant_id: &TenantId,
        transaction_id: &TransactionId,
        bytes: &[u8],
    ) -> StorageResult<String> {
        let path = format!("{}/{}/{}", tenant_id, transaction_id, uuid::Uuid::new_v4());
        self.blobs.write().await.insert(path.clone(), bytes.to_vec());
        Ok(path)
    }

    async fn get(&self, path: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.blobs.read().await.get(path).cloned())
    }
}

/// In-memory vehicle visit history.
#[derive(Debug, Default)]
pub struct InMemoryVehicleRegistry {
    visits: RwLock<HashMap<(TenantId, String), Vec<VehicleVisit>>>,
    fail: bool,
}

impl InMemoryVehicleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry whose writes always fail.
    pub fn unavailable() -> Self {
        Self {
            visits: RwLock::new(HashMap::new()),
            fail: true,
        }
    }

    pub async fn visits(&self, tenant_id: &TenantId, vehicle_number: &str) -> Vec<VehicleVisit> {
        self.visits
            .read()
            .await
            .get(&(tenant_id.clone(), vehicle_number.to_string()))
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl VehicleRegistry for InMemoryVehicleRegistry {
    async fn append_visit(&self, tenant_id: &TenantId, visit: VehicleVisit) -> StorageResult<()> {
        if self.fail {
            return Err(StorageError::Backend("vehicle registry unavailable".into()));
        }
        self.visits
            .write()
            .await
            .entry((tenant_id.clone(), visit.vehicle_number.clone()))
            .or_default()
            .push(visit);
        Ok(())
    }
}

/// Notifier that records what it was asked to send.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose deliveries always fail.
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), String> {
        if self.fail {
            return Err(format!(
                "delivery failed for {:?} on {}",
                notification.kind, notification.transaction_id
            ));
        }
        self.sent.lock().push(notification);
        Ok(())
    }
}

/// Concrete handles to an in-memory port set, for inspection in tests and
/// the simulation command.
#[derive(Clone)]
pub struct InMemoryPorts {
    pub transactions: Arc<InMemoryTransactionRepository>,
    pub evidence: Arc<InMemoryEvidenceStore>,
    pub audit: Arc<MemoryAuditLog>,
    pub blobs: Arc<InMemoryBlobStore>,
    pub vehicles: Arc<InMemoryVehicleRegistry>,
    pub notifier: Arc<RecordingNotifier>,
}

impl InMemoryPorts {
    pub fn new() -> Self {
        Self::with_notifier(RecordingNotifier::new())
    }

    pub fn with_notifier(notifier: RecordingNotifier) -> Self {
        Self {
            transactions: Arc::new(InMemoryTransactionRepository::new()),
            evidence: Arc::new(InMemoryEvidenceStore::new()),
            audit: Arc::new(MemoryAuditLog::new()),
            blobs: Arc::new(InMemoryBlobStore::new()),
            vehicles: Arc::new(InMemoryVehicleRegistry::new()),
            notifier: Arc::new(notifier),
        }
    }

    pub fn with_vehicles(mut self, vehicles: InMemoryVehicleRegistry) -> Self {
        self.vehicles = Arc::new(vehicles);
        self
    }

    /// Erase to trait objects, using the wall clock.
    pub fn ports(&self) -> Ports {
        self.ports_with_clock(Arc::new(SystemClock))
    }

    pub fn ports_with_clock(&self, clock: Arc<dyn Clock>) -> Ports {
        Ports {
            transactions: self.transactions.clone(),
            evidence: self.evidence.clone(),
            audit: self.audit.clone(),
            blobs: self.blobs.clone(),
            vehicles: self.vehicles.clone(),
            notifier: self.notifier.clone(),
            clock,
        }
    }
}

impl Default for InMemoryPorts {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use scrapline_types::{FactoryId, UserId, VendorId};

    fn transaction() -> Transaction {
        Transaction::open(
            TenantId::new("acme"),
            FactoryId::new("plant-1"),
            VendorId::new("v-1"),
            "MH12AB1234",
            UserId::new("op"),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn save_bumps_version_and_rejects_stale_writes() {
        let repo = InMemoryTransactionRepository::new();
        let tx = transaction();
        repo.insert(tx.clone()).await.unwrap();

        assert_eq!(repo.save(&tx, 0).await.unwrap(), 1);
        let err = repo.save(&tx, 0).await.unwrap_err();
        assert!(matches!(err, StorageError::ConcurrentConflict { .. }));
        assert_eq!(repo.load(&tx.id).await.unwrap().unwrap().version, 1);
    }

    #[tokio::test]
    async fn duplicate_insert_rejected() {
        let repo = InMemoryTransactionRepository::new();
        let tx = transaction();
        repo.insert(tx.clone()).await.unwrap();
        assert!(matches!(
            repo.insert(tx).await,
            Err(StorageError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn audit_log_chains_entries() {
        let log = MemoryAuditLog::new();
        for _ in 0..3 {
            log.append(
                AuditRecord::builder(
                    TenantId::new("acme"),
                    scrapline_types::AuditAction::LevelCompleted,
                )
                .build(Utc::now()),
            )
            .await
            .unwrap();
        }
        assert_eq!(log.entries().len(), 3);
        assert!(log.verify_chain());
    }

    #[tokio::test]
    async fn blob_store_round_trips_bytes() {
        let blobs = InMemoryBlobStore::new();
        let tx = transaction();
        let path = blobs.put(&tx.tenant_id, &tx.id, b"ticket").await.unwrap();
        assert!(path.starts_with("acme/"));
        assert_eq!(blobs.get(&path).await.unwrap(), Some(b"ticket".to_vec()));
        assert_eq!(blobs.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn failing_notifier_records_nothing() {
        let notifier = RecordingNotifier::failing();
        let result = notifier
            .notify(Notification {
                kind: crate::ports::NotificationKind::VehicleExited,
                tenant_id: TenantId::new("acme"),
                transaction_id: TransactionId::new(),
                message: "bye".into(),
            })
            .await;
        assert!(result.is_err());
        assert!(notifier.sent().is_empty());
    }
}
