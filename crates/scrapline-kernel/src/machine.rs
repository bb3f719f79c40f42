//! Transaction stage/status lifecycle.
//!
//! Operators record L1, L2, L4 and L6. L3 and L5 are written by weighbridge
//! captures and L7 by gate-pass issuance. Only L1 advances on approval; the
//! other operator levels are stations whose next stage is driven by the
//! instrument that follows them.
//!
//! Every mutation runs under the transaction's lock and ends with a
//! version-checked save, so a stage can advance at most once per request.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use scrapline_types::{
    AuditAction, AuditEntry, AuditRecord, AuditSeverity, EvidenceId, FactoryId, GatePassCredential,
    LevelFields, LevelRecord, OperationalLevel, RequestContext, Transaction, TransactionId,
    TransactionStatus, ValidationStatus, VendorId,
};
use tracing::{debug, info, warn};

use crate::access::{deny, ensure_mutable, load_scoped, notify, require_supervisor, save};
use crate::audit;
use crate::chronology::ChronologyGuard;
use crate::config::WeighbridgeConfig;
use crate::error::{KernelError, KernelResult};
use crate::gate_pass::GatePassAuthority;
use crate::locks::TransactionLocks;
use crate::ports::{Notification, NotificationKind, Ports};
use crate::weighbridge::{validate_reading, WeightReconciliationEngine};

/// Input to [`TransactionStateMachine::create_transaction`].
#[derive(Clone, Debug)]
pub struct NewTransaction {
    pub factory_id: FactoryId,
    pub vendor_id: VendorId,
    pub vehicle_number: String,
}

/// An operator's record for one level.
#[derive(Clone, Debug)]
pub struct LevelSubmission {
    pub fields: LevelFields,
    pub attributes: BTreeMap<String, serde_json::Value>,
    pub evidence_ids: Vec<EvidenceId>,
    pub validation_status: ValidationStatus,
}

impl LevelSubmission {
    pub fn new(fields: LevelFields, validation_status: ValidationStatus) -> Self {
        Self {
            fields,
            attributes: BTreeMap::new(),
            evidence_ids: Vec::new(),
            validation_status,
        }
    }

    pub fn approved(fields: LevelFields) -> Self {
        Self::new(fields, ValidationStatus::Approved)
    }

    pub fn with_evidence(mut self, ids: impl IntoIterator<Item = EvidenceId>) -> Self {
        self.evidence_ids.extend(ids);
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

/// A weighbridge reading.
#[derive(Clone, Debug, PartialEq)]
pub struct WeighbridgeReading {
    pub weight: f64,
    pub ticket_number: Option<String>,
    /// Instrument time. Checked against the backdating window.
    pub captured_at: Option<DateTime<Utc>>,
}

impl WeighbridgeReading {
    pub fn new(weight: f64) -> Self {
        Self {
            weight,
            ticket_number: None,
            captured_at: None,
        }
    }

    pub fn ticket(mut self, number: impl Into<String>) -> Self {
        self.ticket_number = Some(number.into());
        self
    }

    pub fn captured_at(mut self, at: DateTime<Utc>) -> Self {
        self.captured_at = Some(at);
        self
    }
}

fn require_text(label: &str, value: &str) -> KernelResult<()> {
    if value.trim().is_empty() {
        return Err(KernelError::Validation(format!("{label} is required")));
    }
    Ok(())
}

fn require_percent(label: &str, value: Option<f64>) -> KernelResult<()> {
    match value {
        Some(v) if !(0.0..=100.0).contains(&v) => Err(KernelError::Validation(format!(
            "{label} must be between 0 and 100, got {v}"
        ))),
        _ => Ok(()),
    }
}

/// Field-level checks for operator-recorded payloads.
fn validate_fields(fields: &LevelFields) -> KernelResult<()> {
    match fields {
        LevelFields::VendorDispatch {
            material_type,
            declared_weight,
            ..
        } => {
            require_text("material type", material_type)?;
            if let Some(w) = declared_weight {
                validate_reading("declared", *w)?;
            }
            Ok(())
        }
        LevelFields::GateEntry { .. } => Ok(()),
        LevelFields::MaterialInspection {
            grade,
            contamination_percent,
            moisture_percent,
            ..
        } => {
            require_text("material grade", grade)?;
            require_percent("contamination", *contamination_percent)?;
            require_percent("moisture", *moisture_percent)
        }
        LevelFields::GrnGeneration {
            grn_number,
            accepted_weight,
        } => {
            require_text("GRN number", grn_number)?;
            if let Some(w) = accepted_weight {
                validate_reading("accepted", *w)?;
            }
            Ok(())
        }
        LevelFields::WeighbridgeGross { .. }
        | LevelFields::WeighbridgeTare { .. }
        | LevelFields::GatePassExit { .. } => Ok(()),
    }
}

/// Owns every stage and status transition of a transaction.
#[derive(Clone)]
pub struct TransactionStateMachine {
    ports: Ports,
    locks: TransactionLocks,
    weights: WeightReconciliationEngine,
    chronology: ChronologyGuard,
    gate_pass: GatePassAuthority,
    discrepancy_threshold_percent: f64,
}

impl TransactionStateMachine {
    pub fn new(
        ports: Ports,
        locks: TransactionLocks,
        chronology: ChronologyGuard,
        gate_pass: GatePassAuthority,
        config: &WeighbridgeConfig,
    ) -> Self {
        Self {
            ports,
            locks,
            weights: WeightReconciliationEngine::from_config(config),
            chronology,
            gate_pass,
            discrepancy_threshold_percent: config.discrepancy_threshold_percent,
        }
    }

    /// Open a transaction at L1.
    pub async fn create_transaction(
        &self,
        ctx: &RequestContext,
        input: NewTransaction,
    ) -> KernelResult<Transaction> {
        let vehicle_number = input.vehicle_number.trim().to_uppercase();
        require_text("vehicle number", &vehicle_number)?;

        let now = self.ports.clock.now();
        let tx = Transaction::open(
            ctx.tenant_id.clone(),
            input.factory_id,
            input.vendor_id,
            vehicle_number,
            ctx.user_id.clone(),
            now,
        );
        self.ports.transactions.insert(tx.clone()).await?;

        let record = AuditRecord::builder(ctx.tenant_id.clone(), AuditAction::TransactionCreated)
            .transaction(tx.id)
            .actor(ctx.user_id.clone())
            .description(format!("transaction opened for vehicle {}", tx.vehicle_number))
            .detail("vehicleNumber", &tx.vehicle_number)
            .detail("vendorId", tx.vendor_id.as_str())
            .detail("factoryId", tx.factory_id.as_str())
            .build(now);
        audit::record(self.ports.audit.as_ref(), record).await?;

        info!(transaction_id = %tx.id, vehicle = %tx.vehicle_number, "Transaction created");
        Ok(tx)
    }

    pub async fn get_transaction(
        &self,
        ctx: &RequestContext,
        id: TransactionId,
    ) -> KernelResult<Transaction> {
        load_scoped(&self.ports, ctx, &id).await
    }

    /// The caller tenant's transactions, oldest first.
    pub async fn list_transactions(&self, ctx: &RequestContext) -> KernelResult<Vec<Transaction>> {
        Ok(self.ports.transactions.list_for_tenant(&ctx.tenant_id).await?)
    }

    /// Audit entries recorded against one transaction, in append order.
    pub async fn audit_trail(
        &self,
        ctx: &RequestContext,
        transaction_id: TransactionId,
    ) -> KernelResult<Vec<AuditEntry>> {
        load_scoped(&self.ports, ctx, &transaction_id).await?;
        Ok(self.ports.audit.list_for_transaction(&transaction_id).await?)
    }

    /// The caller tenant's whole audit log. Supervisors only.
    pub async fn tenant_audit_log(&self, ctx: &RequestContext) -> KernelResult<Vec<AuditEntry>> {
        if !ctx.can_supervise() {
            return Err(deny(&self.ports, ctx, None, "audit log access requires a supervisor").await);
        }
        Ok(self.ports.audit.list_for_tenant(&ctx.tenant_id).await?)
    }

    /// Record an operator level (L1, L2, L4 or L6) for the current stage.
    ///
    /// APPROVED at L1 advances to L2. REJECTED at L4 ends the transaction as
    /// REJECTED without advancing. PENDING waits for [`Self::approve_level`].
    pub async fn record_level_completion(
        &self,
        ctx: &RequestContext,
        transaction_id: TransactionId,
        submission: LevelSubmission,
    ) -> KernelResult<Transaction> {
        let level = submission.fields.level();
        if !level.is_operator_recorded() {
            return Err(KernelError::Validation(format!(
                "{level} is recorded by its instrument, not by an operator"
            )));
        }
        validate_fields(&submission.fields)?;

        let _guard = self.locks.acquire(transaction_id).await;
        let mut tx = load_scoped(&self.ports, ctx, &transaction_id).await?;
        ensure_mutable(&tx)?;

        if tx.current_level != level {
            return Err(KernelError::Validation(format!(
                "cannot record {level} while transaction is at {}",
                tx.current_level
            )));
        }
        if tx.is_level_approved(level) {
            return Err(KernelError::Conflict(format!(
                "{level} is already approved"
            )));
        }
        if level == OperationalLevel::GrnGeneration
            && !tx.is_level_approved(OperationalLevel::WeighbridgeTare)
        {
            return Err(KernelError::Validation(format!(
                "{level} requires an approved {} record",
                OperationalLevel::WeighbridgeTare
            )));
        }
        for id in &submission.evidence_ids {
            let belongs = self
                .ports
                .evidence
                .get(id)
                .await?
                .is_some_and(|e| e.transaction_id == transaction_id);
            if !belongs {
                return Err(KernelError::Validation(format!(
                    "evidence {id} does not belong to transaction {transaction_id}"
                )));
            }
        }

        let now = self.ports.clock.now();
        let status = submission.validation_status;
        let rejected_material = matches!(
            (&submission.fields, status),
            (LevelFields::MaterialInspection { .. }, ValidationStatus::Rejected)
        );
        let rejection_reason = match &submission.fields {
            LevelFields::MaterialInspection {
                remarks: Some(r), ..
            } => r.clone(),
            _ => "material rejected at inspection".to_string(),
        };

        tx.level_data.insert(
            level,
            LevelRecord {
                level,
                fields: submission.fields,
                attributes: submission.attributes,
                completed_by: ctx.user_id.clone(),
                completed_at: now,
                evidence_ids: submission.evidence_ids,
                validation_status: status,
                approved_by: None,
                approved_at: None,
            },
        );

        if status == ValidationStatus::Approved && level.advances_on_approval() {
            if let Some(next) = level.next() {
                tx.current_level = next;
            }
        }
        if rejected_material {
            tx.status = TransactionStatus::Rejected;
            tx.is_locked = true;
            tx.status_reason = Some(rejection_reason.clone());
        }
        tx.updated_at = now;
        save(&self.ports, &mut tx).await?;

        let builder = if rejected_material {
            AuditRecord::builder(ctx.tenant_id.clone(), AuditAction::Rejection)
                .severity(AuditSeverity::Medium)
                .description(format!("material rejected: {rejection_reason}"))
        } else {
            AuditRecord::builder(ctx.tenant_id.clone(), AuditAction::LevelCompleted)
                .description(format!("{level} recorded as {status:?}"))
        };
        let record = builder
            .transaction(transaction_id)
            .actor(ctx.user_id.clone())
            .detail("level", level)
            .detail("validationStatus", status)
            .detail("currentLevel", tx.current_level)
            .build(now);
        audit::record(self.ports.audit.as_ref(), record).await?;

        if rejected_material {
            warn!(%transaction_id, reason = %rejection_reason, "Material rejected at inspection");
            notify(
                &self.ports,
                Notification {
                    kind: NotificationKind::MaterialRejected,
                    tenant_id: tx.tenant_id.clone(),
                    transaction_id,
                    message: format!(
                        "Material on vehicle {} rejected: {rejection_reason}",
                        tx.vehicle_number
                    ),
                },
            )
            .await;
        } else if status == ValidationStatus::Pending {
            self.request_approval(&tx, level).await;
        }

        info!(
            %transaction_id,
            %level,
            status = ?status,
            current_level = %tx.current_level,
            "Level recorded"
        );
        Ok(tx)
    }

    /// Record a failed inspection. The transaction ends as REJECTED at L4.
    pub async fn reject_at_inspection(
        &self,
        ctx: &RequestContext,
        transaction_id: TransactionId,
        grade: impl Into<String>,
        reason: impl Into<String>,
    ) -> KernelResult<Transaction> {
        let reason = reason.into();
        require_text("rejection reason", &reason)?;
        let submission = LevelSubmission::new(
            LevelFields::MaterialInspection {
                grade: grade.into(),
                contamination_percent: None,
                moisture_percent: None,
                remarks: Some(reason),
            },
            ValidationStatus::Rejected,
        );
        self.record_level_completion(ctx, transaction_id, submission)
            .await
    }

    /// Supervisor approval of a PENDING level record.
    pub async fn approve_level(
        &self,
        ctx: &RequestContext,
        transaction_id: TransactionId,
        level: OperationalLevel,
    ) -> KernelResult<Transaction> {
        require_supervisor(&self.ports, ctx, transaction_id, "level approval").await?;

        let _guard = self.locks.acquire(transaction_id).await;
        let mut tx = load_scoped(&self.ports, ctx, &transaction_id).await?;
        ensure_mutable(&tx)?;

        let now = self.ports.clock.now();
        let record = tx
            .level_data
            .get_mut(&level)
            .ok_or_else(|| KernelError::NotFound {
                kind: "level record",
                id: format!("{transaction_id}/{level}"),
            })?;
        match record.validation_status {
            ValidationStatus::Approved => {
                return Err(KernelError::Conflict(format!("{level} is already approved")))
            }
            ValidationStatus::Rejected => {
                return Err(KernelError::Validation(format!(
                    "{level} was rejected and must be recorded again"
                )))
            }
            ValidationStatus::Pending => {}
        }
        record.validation_status = ValidationStatus::Approved;
        record.approved_by = Some(ctx.user_id.clone());
        record.approved_at = Some(now);

        if level == tx.current_level && level.advances_on_approval() {
            if let Some(next) = level.next() {
                tx.current_level = next;
            }
        }
        tx.updated_at = now;
        save(&self.ports, &mut tx).await?;

        let record = AuditRecord::builder(ctx.tenant_id.clone(), AuditAction::LevelApproved)
            .transaction(transaction_id)
            .actor(ctx.user_id.clone())
            .severity(AuditSeverity::Medium)
            .description(format!("{level} approved by supervisor"))
            .detail("level", level)
            .build(now);
        audit::record(self.ports.audit.as_ref(), record).await?;

        info!(%transaction_id, %level, supervisor = %ctx.user_id, "Level approved");
        Ok(tx)
    }

    /// Loaded-vehicle reading (L3). Moves the transaction to inspection.
    pub async fn capture_gross_weight(
        &self,
        ctx: &RequestContext,
        transaction_id: TransactionId,
        reading: WeighbridgeReading,
    ) -> KernelResult<Transaction> {
        validate_reading("gross", reading.weight)?;

        let _guard = self.locks.acquire(transaction_id).await;
        let mut tx = load_scoped(&self.ports, ctx, &transaction_id).await?;
        ensure_mutable(&tx)?;

        if tx.current_level != OperationalLevel::GateEntry {
            return Err(KernelError::Validation(format!(
                "gross weight requires {}, transaction is at {}",
                OperationalLevel::GateEntry,
                tx.current_level
            )));
        }
        if !tx.is_level_approved(OperationalLevel::GateEntry) {
            return Err(KernelError::Validation(format!(
                "gross weight requires an approved {} record",
                OperationalLevel::GateEntry
            )));
        }
        self.ensure_fresh(ctx, transaction_id, OperationalLevel::WeighbridgeGross, &reading)
            .await?;

        let now = self.ports.clock.now();
        let measured_at = reading.captured_at.unwrap_or(now);
        tx.weighbridge_data.gross_weight = Some(reading.weight);
        tx.weighbridge_data.gross_weight_timestamp = Some(measured_at);
        tx.weighbridge_data.gross_weight_operator = Some(ctx.user_id.clone());
        tx.level_data.insert(
            OperationalLevel::WeighbridgeGross,
            LevelRecord {
                level: OperationalLevel::WeighbridgeGross,
                fields: LevelFields::WeighbridgeGross {
                    gross_weight: reading.weight,
                    ticket_number: reading.ticket_number,
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
        tx.current_level = OperationalLevel::MaterialInspection;
        tx.updated_at = now;
        save(&self.ports, &mut tx).await?;

        let record =
            AuditRecord::builder(ctx.tenant_id.clone(), AuditAction::WeighbridgeGrossCaptured)
                .transaction(transaction_id)
                .actor(ctx.user_id.clone())
                .description(format!("gross weight {} captured", reading.weight))
                .detail("grossWeight", reading.weight)
                .detail("measuredAt", measured_at)
                .build(now);
        audit::record(self.ports.audit.as_ref(), record).await?;

        info!(%transaction_id, gross_weight = reading.weight, "Gross weight captured");
        Ok(tx)
    }

    /// Empty-vehicle reading (L5). Reconciles net weight and moves to GRN.
    ///
    /// The L5 record is PENDING when the discrepancy exceeds the configured
    /// threshold, which blocks GRN until a supervisor approves it.
    pub async fn capture_tare_weight(
        &self,
        ctx: &RequestContext,
        transaction_id: TransactionId,
        reading: WeighbridgeReading,
    ) -> KernelResult<Transaction> {
        validate_reading("tare", reading.weight)?;

        let _guard = self.locks.acquire(transaction_id).await;
        let mut tx = load_scoped(&self.ports, ctx, &transaction_id).await?;
        ensure_mutable(&tx)?;

        if tx.current_level != OperationalLevel::MaterialInspection {
            return Err(KernelError::Validation(format!(
                "tare weight requires {}, transaction is at {}",
                OperationalLevel::MaterialInspection,
                tx.current_level
            )));
        }
        let gross = tx.weighbridge_data.gross_weight.ok_or_else(|| {
            KernelError::Validation("tare weight requires a captured gross weight".into())
        })?;
        if !tx.is_level_approved(OperationalLevel::MaterialInspection) {
            return Err(KernelError::Validation(format!(
                "tare weight requires an approved {} record",
                OperationalLevel::MaterialInspection
            )));
        }
        self.ensure_fresh(ctx, transaction_id, OperationalLevel::WeighbridgeTare, &reading)
            .await?;

        let reconciliation = self.weights.calculate_net_weight(
            gross,
            reading.weight,
            self.discrepancy_threshold_percent,
        )?;
        debug!(%transaction_id, ?reconciliation, "Weights reconciled");

        let now = self.ports.clock.now();
        let measured_at = reading.captured_at.unwrap_or(now);
        let status = if reconciliation.requires_supervisor_approval {
            ValidationStatus::Pending
        } else {
            ValidationStatus::Approved
        };

        tx.weighbridge_data.tare_weight = Some(reading.weight);
        tx.weighbridge_data.net_weight = Some(reconciliation.net_weight);
        tx.weighbridge_data.tare_weight_timestamp = Some(measured_at);
        tx.weighbridge_data.tare_weight_operator = Some(ctx.user_id.clone());
        tx.level_data.insert(
            OperationalLevel::WeighbridgeTare,
            LevelRecord {
                level: OperationalLevel::WeighbridgeTare,
                fields: LevelFields::WeighbridgeTare {
                    tare_weight: reading.weight,
                    net_weight: reconciliation.net_weight,
                    discrepancy_percentage: reconciliation.discrepancy_percentage,
                    requires_supervisor_approval: reconciliation.requires_supervisor_approval,
                    ticket_number: reading.ticket_number,
                },
                attributes: BTreeMap::new(),
                completed_by: ctx.user_id.clone(),
                completed_at: now,
                evidence_ids: Vec::new(),
                validation_status: status,
                approved_by: None,
                approved_at: None,
            },
        );
        tx.current_level = OperationalLevel::GrnGeneration;
        tx.updated_at = now;
        save(&self.ports, &mut tx).await?;

        let record =
            AuditRecord::builder(ctx.tenant_id.clone(), AuditAction::WeighbridgeTareCaptured)
                .transaction(transaction_id)
                .actor(ctx.user_id.clone())
                .severity(if reconciliation.requires_supervisor_approval {
                    AuditSeverity::Medium
                } else {
                    AuditSeverity::Low
                })
                .description(format!(
                    "tare weight {} captured, net {}",
                    reading.weight, reconciliation.net_weight
                ))
                .detail("tareWeight", reading.weight)
                .detail("netWeight", reconciliation.net_weight)
                .detail("discrepancyPercentage", reconciliation.discrepancy_percentage)
                .detail(
                    "requiresSupervisorApproval",
                    reconciliation.requires_supervisor_approval,
                )
                .build(now);
        audit::record(self.ports.audit.as_ref(), record).await?;

        if reconciliation.requires_supervisor_approval {
            self.request_approval(&tx, OperationalLevel::WeighbridgeTare)
                .await;
        }

        info!(
            %transaction_id,
            net_weight = reconciliation.net_weight,
            discrepancy = reconciliation.discrepancy_percentage,
            pending = reconciliation.requires_supervisor_approval,
            "Tare weight captured"
        );
        Ok(tx)
    }

    /// Cancel an active transaction. The reason is mandatory.
    pub async fn cancel_transaction(
        &self,
        ctx: &RequestContext,
        transaction_id: TransactionId,
        reason: &str,
    ) -> KernelResult<Transaction> {
        require_text("cancellation reason", reason)?;

        let _guard = self.locks.acquire(transaction_id).await;
        let mut tx = load_scoped(&self.ports, ctx, &transaction_id).await?;
        ensure_mutable(&tx)?;

        let now = self.ports.clock.now();
        tx.status = TransactionStatus::Cancelled;
        tx.is_locked = true;
        tx.status_reason = Some(reason.to_string());
        tx.updated_at = now;
        save(&self.ports, &mut tx).await?;

        let record = AuditRecord::builder(ctx.tenant_id.clone(), AuditAction::TransactionCancelled)
            .transaction(transaction_id)
            .actor(ctx.user_id.clone())
            .severity(AuditSeverity::Medium)
            .description(reason)
            .detail("level", tx.current_level)
            .build(now);
        audit::record(self.ports.audit.as_ref(), record).await?;

        info!(%transaction_id, level = %tx.current_level, reason, "Transaction cancelled");
        Ok(tx)
    }

    /// Issue the exit pass (L6 → L7).
    pub async fn issue_gate_pass(
        &self,
        ctx: &RequestContext,
        transaction_id: TransactionId,
        validity_hours: Option<i64>,
    ) -> KernelResult<GatePassCredential> {
        self.gate_pass
            .generate(ctx, transaction_id, validity_hours)
            .await
    }

    /// Instrument time outside the window is a hard failure here: the
    /// timestamp is part of the requested write.
    async fn ensure_fresh(
        &self,
        ctx: &RequestContext,
        transaction_id: TransactionId,
        level: OperationalLevel,
        reading: &WeighbridgeReading,
    ) -> KernelResult<()> {
        let Some(at) = reading.captured_at else {
            return Ok(());
        };
        if self
            .chronology
            .prevent_backdating(ctx, at, transaction_id, level)
            .await?
        {
            Ok(())
        } else {
            Err(KernelError::IntegrityViolation(format!(
                "{level} reading time {} is outside the allowed window",
                at.to_rfc3339()
            )))
        }
    }

    async fn request_approval(&self, tx: &Transaction, level: OperationalLevel) {
        notify(
            &self.ports,
            Notification {
                kind: NotificationKind::SupervisorApprovalRequired,
                tenant_id: tx.tenant_id.clone(),
                transaction_id: tx.id,
                message: format!(
                    "{level} for vehicle {} is waiting for supervisor approval",
                    tx.vehicle_number
                ),
            },
        )
        .await;
    }
}
