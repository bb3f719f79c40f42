//! Audit chain sealing and verification.
//!
//! Each entry hashes its own record together with the previous entry's hash,
//! so any edit or removal inside the log breaks every later link.

use scrapline_types::{AuditEntry, AuditRecord};
use sha2::{Digest, Sha256};

use crate::error::{KernelError, KernelResult};
use crate::ports::AuditLog;

/// Running state of a hash chain.
#[derive(Debug, Default, Clone)]
pub struct IntegrityChain {
    last_hash: Option<String>,
    count: u64,
}

impl IntegrityChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn previous_hash(&self) -> Option<String> {
        self.last_hash.clone()
    }

    pub fn entry_count(&self) -> u64 {
        self.count
    }

    /// Seal `record` as the next link and advance the chain.
    pub fn seal(&mut self, record: AuditRecord) -> AuditEntry {
        let previous_hash = self.last_hash.clone();
        let entry_hash = entry_hash(&record, previous_hash.as_deref());
        let entry = AuditEntry {
            sequence: self.count,
            record,
            previous_hash,
            entry_hash: entry_hash.clone(),
        };
        self.last_hash = Some(entry_hash);
        self.count += 1;
        entry
    }
}

fn entry_hash(record: &AuditRecord, previous_hash: Option<&str>) -> String {
    let body = serde_json::to_string(record).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    hasher.update(previous_hash.unwrap_or("").as_bytes());
    hex::encode(hasher.finalize())
}

/// Recompute every link of a chain, in order.
pub fn verify_chain(entries: &[AuditEntry]) -> bool {
    let mut previous: Option<&str> = None;
    for (i, entry) in entries.iter().enumerate() {
        if entry.sequence != i as u64 || entry.previous_hash.as_deref() != previous {
            return false;
        }
        if entry_hash(&entry.record, previous) != entry.entry_hash {
            return false;
        }
        previous = Some(entry.entry_hash.as_str());
    }
    true
}

/// Append to the audit log, surfacing store failures as kernel errors.
pub(crate) async fn record(log: &dyn AuditLog, record: AuditRecord) -> KernelResult<AuditEntry> {
    let action = record.action;
    log.append(record).await.map_err(|e| {
        tracing::error!(?action, error = %e, "Audit append failed");
        KernelError::Storage(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use scrapline_types::{AuditAction, AuditSeverity, TenantId};

    fn record(action: AuditAction) -> AuditRecord {
        AuditRecord::builder(TenantId::new("acme"), action)
            .severity(AuditSeverity::Low)
            .description("test")
            .build(Utc::now())
    }

    #[test]
    fn chain_links_entries() {
        let mut chain = IntegrityChain::new();
        let first = chain.seal(record(AuditAction::TransactionCreated));
        let second = chain.seal(record(AuditAction::LevelCompleted));

        assert_eq!(first.previous_hash, None);
        assert_eq!(second.previous_hash.as_deref(), Some(first.entry_hash.as_str()));
        assert_eq!(first.entry_hash.len(), 64);
        assert_eq!(chain.entry_count(), 2);
        assert!(verify_chain(&[first, second]));
    }

    #[test]
    fn tampering_breaks_the_chain() {
        let mut chain = IntegrityChain::new();
        let first = chain.seal(record(AuditAction::TransactionCreated));
        let mut second = chain.seal(record(AuditAction::Delete));
        second.record.description = "nothing happened".into();

        assert!(!verify_chain(&[first, second]));
    }

    #[test]
    fn removal_breaks_the_chain() {
        let mut chain = IntegrityChain::new();
        let _first = chain.seal(record(AuditAction::TransactionCreated));
        let second = chain.seal(record(AuditAction::LevelCompleted));

        assert!(!verify_chain(&[second]));
    }
}
