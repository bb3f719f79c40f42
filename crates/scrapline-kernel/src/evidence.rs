//! Evidence ledger.
//!
//! Evidence records are created once, hashed and enriched at capture time,
//! and never deleted. The only field that may change afterwards is
//! `is_processed`.

use chrono::{DateTime, Utc};
use scrapline_types::{
    AuditAction, AuditRecord, AuditSeverity, CaptureMetadata, Evidence, EvidenceId,
    EvidenceMetadata, EvidenceType, OperationalLevel, RequestContext, SystemInfo, TransactionId,
};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::access::{deny, ensure_mutable, load_scoped};
use crate::audit;
use crate::chronology::{ChronologyEvent, ChronologyGuard};
use crate::config::SystemConfig;
use crate::error::{KernelError, KernelResult};
use crate::locks::TransactionLocks;
use crate::ports::Ports;

/// Input to [`EvidenceLedger::create_evidence`].
#[derive(Clone, Debug)]
pub struct NewEvidence {
    pub transaction_id: TransactionId,
    pub level: OperationalLevel,
    pub evidence_type: EvidenceType,
    pub file_bytes: Option<Vec<u8>>,
    pub mime_type: Option<String>,
    pub metadata: Option<CaptureMetadata>,
    /// Device-reported capture time. Checked against the backdating window.
    pub captured_at: Option<DateTime<Utc>>,
}

impl NewEvidence {
    pub fn new(
        transaction_id: TransactionId,
        level: OperationalLevel,
        evidence_type: EvidenceType,
    ) -> Self {
        Self {
            transaction_id,
            level,
            evidence_type,
            file_bytes: None,
            mime_type: None,
            metadata: None,
            captured_at: None,
        }
    }

    pub fn with_file(mut self, bytes: impl Into<Vec<u8>>, mime_type: impl Into<String>) -> Self {
        self.file_bytes = Some(bytes.into());
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn with_metadata(mut self, metadata: CaptureMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn captured_at(mut self, at: DateTime<Utc>) -> Self {
        self.captured_at = Some(at);
        self
    }
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Merge caller metadata with server-side fields.
///
/// Caller-supplied capture and GPS values are kept as given; only empty
/// slots are filled. `system_info` is always generated here.
pub fn enrich_metadata(
    supplied: Option<CaptureMetadata>,
    system: &SystemConfig,
    now: DateTime<Utc>,
) -> EvidenceMetadata {
    let supplied = supplied.unwrap_or_default();

    let mut capture_info = supplied.capture_info;
    capture_info.timestamp.get_or_insert(now);
    capture_info
        .timezone
        .get_or_insert_with(|| system.timezone.clone());

    let gps_coordinates = supplied.gps_coordinates.map(|mut gps| {
        gps.timestamp.get_or_insert(now);
        gps
    });

    EvidenceMetadata {
        capture_info,
        gps_coordinates,
        system_info: SystemInfo {
            version: system.version.clone(),
            environment: system.environment.clone(),
            server_timestamp: now,
        },
        custom: supplied.custom,
    }
}

#[derive(Clone)]
pub struct EvidenceLedger {
    ports: Ports,
    locks: TransactionLocks,
    chronology: ChronologyGuard,
    system: SystemConfig,
}

impl EvidenceLedger {
    pub fn new(
        ports: Ports,
        locks: TransactionLocks,
        chronology: ChronologyGuard,
        system: SystemConfig,
    ) -> Self {
        Self {
            ports,
            locks,
            chronology,
            system,
        }
    }

    /// Capture a new evidence record against an active transaction.
    ///
    /// Writes for the same transaction are serialized so storage order is
    /// capture order.
    pub async fn create_evidence(
        &self,
        ctx: &RequestContext,
        input: NewEvidence,
    ) -> KernelResult<Evidence> {
        let transaction_id = input.transaction_id;
        let _guard = self.locks.acquire(transaction_id).await;

        let tx = load_scoped(&self.ports, ctx, &transaction_id).await?;
        ensure_mutable(&tx)?;

        let now = self.ports.clock.now();
        if let Some(device_time) = input.captured_at {
            let fresh = self
                .chronology
                .prevent_backdating(ctx, device_time, transaction_id, input.level)
                .await?;
            if !fresh {
                return Err(KernelError::IntegrityViolation(format!(
                    "evidence capture time {} is outside the allowed window",
                    device_time.to_rfc3339()
                )));
            }
        }

        let (file_path, file_hash, file_size) = match &input.file_bytes {
            Some(bytes) => {
                let hash = content_hash(bytes);
                let path = self
                    .ports
                    .blobs
                    .put(&ctx.tenant_id, &transaction_id, bytes)
                    .await?;
                debug!(%transaction_id, %path, size = bytes.len(), "Evidence blob stored");
                (Some(path), Some(hash), Some(bytes.len() as u64))
            }
            None => (None, None, None),
        };

        let evidence = Evidence {
            id: EvidenceId::new(),
            tenant_id: ctx.tenant_id.clone(),
            transaction_id,
            captured_by: ctx.user_id.clone(),
            operational_level: input.level,
            evidence_type: input.evidence_type,
            file_path,
            file_hash,
            file_size,
            mime_type: input.mime_type,
            metadata: enrich_metadata(input.metadata, &self.system, now),
            captured_at: input.captured_at.unwrap_or(now),
            is_processed: false,
        };

        self.ports.evidence.append(evidence.clone()).await?;

        let record = AuditRecord::builder(ctx.tenant_id.clone(), AuditAction::EvidenceCapture)
            .transaction(transaction_id)
            .actor(ctx.user_id.clone())
            .description(format!(
                "{:?} evidence captured at {}",
                evidence.evidence_type, evidence.operational_level
            ))
            .detail("evidenceId", evidence.id.to_string())
            .detail("level", evidence.operational_level)
            .detail("evidenceType", evidence.evidence_type)
            .detail("fileHash", &evidence.file_hash)
            .build(now);
        audit::record(self.ports.audit.as_ref(), record).await?;

        info!(
            %transaction_id,
            evidence_id = %evidence.id,
            level = %evidence.operational_level,
            "Evidence captured"
        );
        Ok(evidence)
    }

    /// Evidence is never deleted. The attempt is audit-logged and refused,
    /// whether or not `id` exists.
    pub async fn delete_evidence(&self, ctx: &RequestContext, id: EvidenceId) -> KernelResult<()> {
        let transaction_id = self
            .ports
            .evidence
            .get(&id)
            .await?
            .filter(|e| e.tenant_id == ctx.tenant_id)
            .map(|e| e.transaction_id);

        warn!(evidence_id = %id, user = %ctx.user_id, "Evidence deletion attempted");

        let mut builder = AuditRecord::builder(ctx.tenant_id.clone(), AuditAction::Delete)
            .actor(ctx.user_id.clone())
            .severity(AuditSeverity::High)
            .description("evidence deletion attempted and refused")
            .detail("evidenceId", id.to_string());
        if let Some(tx) = transaction_id {
            builder = builder.transaction(tx);
        }
        audit::record(self.ports.audit.as_ref(), builder.build(self.ports.clock.now())).await?;

        Err(KernelError::IntegrityViolation("deletion not allowed".into()))
    }

    /// Re-read the stored blob and compare its hash with the recorded one.
    pub async fn verify_integrity(&self, ctx: &RequestContext, id: EvidenceId) -> KernelResult<bool> {
        let evidence = self.get_evidence(ctx, id).await?;

        let (verified, reason) = match (&evidence.file_path, &evidence.file_hash) {
            (None, None) => (false, "no file content recorded"),
            (Some(path), Some(expected)) => match self.ports.blobs.get(path).await? {
                Some(bytes) if &content_hash(&bytes) == expected => (true, "hash matches"),
                Some(_) => (false, "hash mismatch"),
                None => (false, "stored file missing"),
            },
            (None, Some(_)) => (false, "file path missing"),
            (Some(_), None) => (false, "file hash missing"),
        };

        if verified {
            debug!(evidence_id = %id, "Evidence integrity verified");
        } else {
            warn!(evidence_id = %id, reason, "Evidence integrity check failed");
        }

        let record =
            AuditRecord::builder(ctx.tenant_id.clone(), AuditAction::EvidenceIntegrityVerified)
                .transaction(evidence.transaction_id)
                .actor(ctx.user_id.clone())
                .severity(if verified {
                    AuditSeverity::Low
                } else {
                    AuditSeverity::High
                })
                .description(reason)
                .detail("evidenceId", id.to_string())
                .detail("verified", verified)
                .build(self.ports.clock.now());
        audit::record(self.ports.audit.as_ref(), record).await?;

        Ok(verified)
    }

    /// Check the transaction's evidence, in storage order, for regressions.
    pub async fn validate_ordering(
        &self,
        ctx: &RequestContext,
        transaction_id: TransactionId,
    ) -> KernelResult<bool> {
        let events: Vec<ChronologyEvent> = self
            .list_evidence(ctx, transaction_id)
            .await?
            .iter()
            .map(|e| ChronologyEvent {
                captured_at: e.captured_at,
                operational_level: e.operational_level,
            })
            .collect();
        self.chronology
            .validate_ordering(ctx, transaction_id, &events)
            .await
    }

    /// Flag a record as processed downstream. Idempotent.
    pub async fn mark_processed(&self, ctx: &RequestContext, id: EvidenceId) -> KernelResult<()> {
        let evidence = self.get_evidence(ctx, id).await?;
        if evidence.is_processed {
            return Ok(());
        }
        self.ports.evidence.mark_processed(&id).await?;

        let record = AuditRecord::builder(ctx.tenant_id.clone(), AuditAction::EvidenceProcessed)
            .transaction(evidence.transaction_id)
            .actor(ctx.user_id.clone())
            .description("evidence marked processed")
            .detail("evidenceId", id.to_string())
            .build(self.ports.clock.now());
        audit::record(self.ports.audit.as_ref(), record).await?;
        Ok(())
    }

    /// A transaction's evidence in storage order.
    pub async fn list_evidence(
        &self,
        ctx: &RequestContext,
        transaction_id: TransactionId,
    ) -> KernelResult<Vec<Evidence>> {
        load_scoped(&self.ports, ctx, &transaction_id).await?;
        Ok(self
            .ports
            .evidence
            .list_for_transaction(&transaction_id)
            .await?)
    }

    pub async fn get_evidence(&self, ctx: &RequestContext, id: EvidenceId) -> KernelResult<Evidence> {
        let evidence = self
            .ports
            .evidence
            .get(&id)
            .await?
            .ok_or_else(|| KernelError::NotFound {
                kind: "evidence",
                id: id.to_string(),
            })?;
        if evidence.tenant_id != ctx.tenant_id {
            return Err(deny(
                &self.ports,
                ctx,
                Some(evidence.transaction_id),
                "evidence belongs to another tenant",
            )
            .await);
        }
        Ok(evidence)
    }
}
