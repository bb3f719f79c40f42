//! Gate-pass issuance, validation and vehicle exit.
//!
//! A transaction's pass moves through none → issued → used, with "expired"
//! derived from the clock. Issuance and exit each run inside the
//! transaction's lock, so the "no valid pass yet" and "not used yet" checks
//! are atomic with the writes that depend on them.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use scrapline_types::{
    AuditAction, AuditRecord, AuditSeverity, GatePassCredential, LevelFields, LevelRecord,
    OperationalLevel, RequestContext, Transaction, TransactionId, TransactionStatus,
    ValidationStatus, VehicleVisit,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::access::{ensure_mutable, load_scoped, notify, require_supervisor, save};
use crate::audit;
use crate::config::GatePassConfig;
use crate::error::{KernelError, KernelResult};
use crate::locks::TransactionLocks;
use crate::ports::{Notification, NotificationKind, Ports};

/// A single reason a presented pass is not acceptable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatePassIssue {
    InvalidFormat,
    TransactionNotFound,
    VehicleMismatch,
    AlreadyUsed,
    TransactionInactive,
    Expired,
    PayloadMismatch,
}

impl GatePassIssue {
    pub fn message(self) -> &'static str {
        match self {
            Self::InvalidFormat => "Invalid QR code format",
            Self::TransactionNotFound => "Transaction not found",
            Self::VehicleMismatch => "Vehicle number mismatch",
            Self::AlreadyUsed => "Gate pass already used",
            Self::TransactionInactive => "Transaction is not active",
            Self::Expired => "Gate pass expired",
            Self::PayloadMismatch => "Invalid QR code",
        }
    }
}

/// Result of checking a scanned payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatePassValidation {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub issues: Vec<GatePassIssue>,
    pub requires_supervisor_override: bool,
    pub transaction_id: Option<TransactionId>,
}

impl GatePassValidation {
    fn from_issues(transaction_id: Option<TransactionId>, issues: Vec<GatePassIssue>) -> Self {
        Self {
            is_valid: issues.is_empty(),
            errors: issues.iter().map(|i| i.message().to_string()).collect(),
            requires_supervisor_override: issues == [GatePassIssue::Expired],
            issues,
            transaction_id,
        }
    }
}

/// Compare a parsed credential and its raw payload against the stored
/// transaction. Every applicable issue is reported.
fn inspect(
    tx: &Transaction,
    credential: &GatePassCredential,
    payload: &str,
    now: DateTime<Utc>,
) -> Vec<GatePassIssue> {
    let mut issues = Vec::new();
    if credential.vehicle_number != tx.vehicle_number {
        issues.push(GatePassIssue::VehicleMismatch);
    }
    match tx.status {
        TransactionStatus::Completed => issues.push(GatePassIssue::AlreadyUsed),
        TransactionStatus::Rejected | TransactionStatus::Cancelled => {
            issues.push(GatePassIssue::TransactionInactive)
        }
        TransactionStatus::Active => {}
    }
    if credential.is_expired_at(now) {
        issues.push(GatePassIssue::Expired);
    }
    if tx.gate_pass_qr_code.as_deref() != Some(payload) {
        issues.push(GatePassIssue::PayloadMismatch);
    }
    issues
}

/// Cancelled and rejected transactions cannot exit. A completed one is left
/// to [`inspect`] so it reports the pass as already used.
fn ensure_exitable(tx: &Transaction) -> KernelResult<()> {
    if tx.status == TransactionStatus::Completed {
        return Ok(());
    }
    ensure_mutable(tx)
}

#[derive(Clone)]
pub struct GatePassAuthority {
    ports: Ports,
    locks: TransactionLocks,
    config: GatePassConfig,
}

impl GatePassAuthority {
    pub fn new(ports: Ports, locks: TransactionLocks, config: GatePassConfig) -> Self {
        Self {
            ports,
            locks,
            config,
        }
    }

    /// Issue an exit pass once GRN (L6) is approved.
    ///
    /// A transaction whose earlier pass has expired may be issued a fresh
    /// one; while a pass is still valid a second issuance is a `Conflict`.
    pub async fn generate(
        &self,
        ctx: &RequestContext,
        transaction_id: TransactionId,
        validity_hours: Option<i64>,
    ) -> KernelResult<GatePassCredential> {
        let validity_hours = validity_hours.unwrap_or(self.config.default_validity_hours);
        if validity_hours <= 0 || validity_hours > self.config.max_validity_hours {
            return Err(KernelError::Validation(format!(
                "gate pass validity must be between 1 and {} hours, got {validity_hours}",
                self.config.max_validity_hours
            )));
        }

        let _guard = self.locks.acquire(transaction_id).await;
        let mut tx = load_scoped(&self.ports, ctx, &transaction_id).await?;
        ensure_mutable(&tx)?;

        let now = self.ports.clock.now();
        if let (Some(_), Some(expires_at)) = (&tx.gate_pass_qr_code, tx.gate_pass_expires_at) {
            if now <= expires_at {
                return Err(KernelError::Conflict(format!(
                    "transaction {transaction_id} already has a valid gate pass until {}",
                    expires_at.to_rfc3339()
                )));
            }
        }

        let at_grn = matches!(
            tx.current_level,
            OperationalLevel::GrnGeneration | OperationalLevel::GatePassExit
        );
        if !at_grn || !tx.is_level_approved(OperationalLevel::GrnGeneration) {
            return Err(KernelError::Validation(format!(
                "gate pass requires an approved {} record (transaction is at {})",
                OperationalLevel::GrnGeneration,
                tx.current_level
            )));
        }

        let credential = GatePassCredential {
            transaction_id,
            vehicle_number: tx.vehicle_number.clone(),
            generated_at: now,
            expires_at: now + Duration::hours(validity_hours),
            nonce: uuid::Uuid::new_v4(),
        };
        let payload = credential
            .to_payload()
            .map_err(|e| KernelError::Serialization(e.to_string()))?;
        let reissue = tx.gate_pass_qr_code.is_some();

        tx.gate_pass_qr_code = Some(payload);
        tx.gate_pass_expires_at = Some(credential.expires_at);
        tx.current_level = OperationalLevel::GatePassExit;
        tx.level_data.insert(
            OperationalLevel::GatePassExit,
            LevelRecord {
                level: OperationalLevel::GatePassExit,
                fields: LevelFields::GatePassExit {
                    nonce: credential.nonce,
                    expires_at: credential.expires_at,
                    validity_hours,
                },
                attributes: BTreeMap::new(),
                completed_by: ctx.user_id.clone(),
                completed_at: now,
                evidence_ids: Vec::new(),
                validation_status: ValidationStatus::Approved,
                approved_by: None,
                approved_at: None,
            },
        );
        tx.updated_at = now;
        save(&self.ports, &mut tx).await?;

        let record = AuditRecord::builder(ctx.tenant_id.clone(), AuditAction::GatePassGenerated)
            .transaction(transaction_id)
            .actor(ctx.user_id.clone())
            .description(if reissue {
                "gate pass reissued after expiry"
            } else {
                "gate pass generated"
            })
            .detail("vehicleNumber", &credential.vehicle_number)
            .detail("expiresAt", credential.expires_at)
            .detail("validityHours", validity_hours)
            .build(now);
        audit::record(self.ports.audit.as_ref(), record).await?;

        info!(
            %transaction_id,
            vehicle = %credential.vehicle_number,
            expires_at = %credential.expires_at.to_rfc3339(),
            reissue,
            "Gate pass generated"
        );
        Ok(credential)
    }

    /// Check a scanned payload. Read-only apart from the audit entry written
    /// for a failed check.
    pub async fn validate(
        &self,
        ctx: &RequestContext,
        payload: &str,
    ) -> KernelResult<GatePassValidation> {
        let Ok(credential) = GatePassCredential::from_payload(payload) else {
            return self
                .reject(ctx, None, vec![GatePassIssue::InvalidFormat])
                .await;
        };

        let transaction_id = credential.transaction_id;
        let tx = match self.ports.transactions.load(&transaction_id).await? {
            Some(tx) if tx.tenant_id == ctx.tenant_id => tx,
            _ => {
                return self
                    .reject(ctx, None, vec![GatePassIssue::TransactionNotFound])
                    .await
            }
        };

        let issues = inspect(&tx, &credential, payload, self.ports.clock.now());
        if issues.is_empty() {
            return Ok(GatePassValidation::from_issues(Some(transaction_id), issues));
        }
        self.reject(ctx, Some(transaction_id), issues).await
    }

    async fn reject(
        &self,
        ctx: &RequestContext,
        transaction_id: Option<TransactionId>,
        issues: Vec<GatePassIssue>,
    ) -> KernelResult<GatePassValidation> {
        let validation = GatePassValidation::from_issues(transaction_id, issues);
        warn!(?transaction_id, errors = ?validation.errors, "Gate pass validation failed");

        let mut builder =
            AuditRecord::builder(ctx.tenant_id.clone(), AuditAction::GatePassValidationFailed)
                .actor(ctx.user_id.clone())
                .severity(AuditSeverity::Medium)
                .description(validation.errors.join("; "))
                .detail("issues", &validation.issues);
        if let Some(id) = transaction_id {
            builder = builder.transaction(id);
        }
        audit::record(self.ports.audit.as_ref(), builder.build(self.ports.clock.now())).await?;

        Ok(validation)
    }

    /// Let the vehicle out on the strength of its stored, still-valid pass.
    pub async fn process_exit(
        &self,
        ctx: &RequestContext,
        transaction_id: TransactionId,
    ) -> KernelResult<Transaction> {
        let _guard = self.locks.acquire(transaction_id).await;
        let tx = load_scoped(&self.ports, ctx, &transaction_id).await?;
        self.exit(ctx, tx, false).await
    }

    /// Let the vehicle out although its pass has expired.
    ///
    /// Only expiry is waived. The override itself is audit-logged before the
    /// exit is attempted.
    pub async fn supervisor_override(
        &self,
        ctx: &RequestContext,
        transaction_id: TransactionId,
        justification: &str,
    ) -> KernelResult<Transaction> {
        require_supervisor(&self.ports, ctx, transaction_id, "gate pass override").await?;
        if justification.trim().is_empty() {
            return Err(KernelError::Validation(
                "override justification is required".into(),
            ));
        }

        let _guard = self.locks.acquire(transaction_id).await;
        let tx = load_scoped(&self.ports, ctx, &transaction_id).await?;
        ensure_exitable(&tx)?;

        warn!(
            %transaction_id,
            supervisor = %ctx.user_id,
            justification,
            "Supervisor override of gate pass"
        );
        let record = AuditRecord::builder(
            ctx.tenant_id.clone(),
            AuditAction::SupervisorOverrideExpiredGatePass,
        )
        .transaction(transaction_id)
        .actor(ctx.user_id.clone())
        .severity(AuditSeverity::High)
        .description(justification)
        .detail("originalExpiry", tx.gate_pass_expires_at)
        .detail("justification", justification)
        .build(self.ports.clock.now());
        audit::record(self.ports.audit.as_ref(), record).await?;

        self.exit(ctx, tx, true).await
    }

    /// Shared exit path. Caller holds the transaction lock.
    async fn exit(
        &self,
        ctx: &RequestContext,
        mut tx: Transaction,
        supervisor_override: bool,
    ) -> KernelResult<Transaction> {
        let transaction_id = tx.id;
        let now = self.ports.clock.now();
        ensure_exitable(&tx)?;

        let Some(payload) = tx.gate_pass_qr_code.clone() else {
            return Err(KernelError::PreconditionFailed(format!(
                "transaction {transaction_id} has no gate pass"
            )));
        };
        let issues = match GatePassCredential::from_payload(&payload) {
            Ok(credential) => inspect(&tx, &credential, &payload, now),
            Err(_) => vec![GatePassIssue::InvalidFormat],
        };
        let blocking: Vec<_> = issues
            .into_iter()
            .filter(|issue| !(supervisor_override && *issue == GatePassIssue::Expired))
            .collect();
        if !blocking.is_empty() {
            let validation = self.reject(ctx, Some(transaction_id), blocking).await?;
            return Err(KernelError::Validation(validation.errors.join("; ")));
        }
        ensure_mutable(&tx)?;

        tx.status = TransactionStatus::Completed;
        tx.is_locked = true;
        tx.completed_at = Some(now);
        tx.updated_at = now;
        save(&self.ports, &mut tx).await?;

        // The exit is committed; a visit-history failure is audited with it
        // and surfaced afterwards.
        let visit = self
            .ports
            .vehicles
            .append_visit(
                &tx.tenant_id,
                VehicleVisit {
                    transaction_id,
                    vehicle_number: tx.vehicle_number.clone(),
                    visit_date: now,
                    factory_id: tx.factory_id.clone(),
                    status: tx.status,
                },
            )
            .await;

        let (action, severity) = if supervisor_override {
            (AuditAction::VehicleExitSupervisorOverride, AuditSeverity::High)
        } else {
            (AuditAction::VehicleExitCompleted, AuditSeverity::Low)
        };
        let mut builder = AuditRecord::builder(ctx.tenant_id.clone(), action)
            .transaction(transaction_id)
            .actor(ctx.user_id.clone())
            .severity(severity)
            .description(format!("vehicle {} exited", tx.vehicle_number))
            .detail("vehicleNumber", &tx.vehicle_number)
            .detail("netWeight", tx.weighbridge_data.net_weight)
            .detail("visitRecorded", visit.is_ok());
        if let Err(e) = &visit {
            warn!(%transaction_id, error = %e, "Vehicle visit history not updated");
            builder = builder.detail("visitError", e.to_string());
        }
        audit::record(self.ports.audit.as_ref(), builder.build(now)).await?;

        notify(
            &self.ports,
            Notification {
                kind: NotificationKind::VehicleExited,
                tenant_id: tx.tenant_id.clone(),
                transaction_id,
                message: format!("Vehicle {} has exited", tx.vehicle_number),
            },
        )
        .await;

        info!(
            %transaction_id,
            vehicle = %tx.vehicle_number,
            supervisor_override,
            "Vehicle exit completed"
        );
        visit?;
        Ok(tx)
    }
}
