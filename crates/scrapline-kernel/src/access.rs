//! Shared load/check/save steps used by every component.

use scrapline_types::{
    AuditAction, AuditRecord, AuditSeverity, RequestContext, Transaction, TransactionId,
};
use tracing::warn;

use crate::audit;
use crate::error::{KernelError, KernelResult, StorageError};
use crate::ports::{Notification, Ports};

/// Load a transaction and confirm it belongs to the caller's tenant.
///
/// A cross-tenant hit is audit-logged and reported as `Forbidden`.
pub(crate) async fn load_scoped(
    ports: &Ports,
    ctx: &RequestContext,
    id: &TransactionId,
) -> KernelResult<Transaction> {
    let tx = ports
        .transactions
        .load(id)
        .await?
        .ok_or_else(|| KernelError::transaction_not_found(id))?;

    if tx.tenant_id != ctx.tenant_id {
        return Err(deny(ports, ctx, Some(*id), "transaction belongs to another tenant").await);
    }
    Ok(tx)
}

/// Record an access denial and build the `Forbidden` error for it.
pub(crate) async fn deny(
    ports: &Ports,
    ctx: &RequestContext,
    transaction_id: Option<TransactionId>,
    reason: &str,
) -> KernelError {
    warn!(
        tenant = %ctx.tenant_id,
        user = %ctx.user_id,
        ?transaction_id,
        reason,
        "Access denied"
    );

    let mut builder = AuditRecord::builder(ctx.tenant_id.clone(), AuditAction::AccessDenied)
        .actor(ctx.user_id.clone())
        .severity(AuditSeverity::High)
        .description(reason)
        .detail("role", ctx.role);
    if let Some(id) = transaction_id {
        builder = builder.detail("requestedTransactionId", id.to_string());
    }

    if let Err(e) = audit::record(ports.audit.as_ref(), builder.build(ports.clock.now())).await {
        return e;
    }
    KernelError::Forbidden(reason.to_string())
}

/// Supervisor-only gate for overrides and approvals.
pub(crate) async fn require_supervisor(
    ports: &Ports,
    ctx: &RequestContext,
    transaction_id: TransactionId,
    action: &str,
) -> KernelResult<()> {
    if ctx.can_supervise() {
        return Ok(());
    }
    let reason = format!("{action} requires a supervisor");
    Err(deny(ports, ctx, Some(transaction_id), &reason).await)
}

/// Locked or terminal transactions accept no mutation.
pub(crate) fn ensure_mutable(tx: &Transaction) -> KernelResult<()> {
    if tx.is_locked {
        return Err(KernelError::PreconditionFailed(format!(
            "transaction {} is locked",
            tx.id
        )));
    }
    if tx.status.is_terminal() {
        return Err(KernelError::PreconditionFailed(format!(
            "transaction {} is {}",
            tx.id, tx.status
        )));
    }
    Ok(())
}

/// Version-checked save. Updates `tx.version` on success.
pub(crate) async fn save(ports: &Ports, tx: &mut Transaction) -> KernelResult<()> {
    match ports.transactions.save(tx, tx.version).await {
        Ok(version) => {
            tx.version = version;
            Ok(())
        }
        Err(StorageError::ConcurrentConflict {
            id,
            expected_version,
        }) => Err(KernelError::Conflict(format!(
            "transaction {id} was modified concurrently (expected version {expected_version})"
        ))),
        Err(e) => Err(e.into()),
    }
}

/// Deliver a notification. Failures are logged and never propagate.
pub(crate) async fn notify(ports: &Ports, notification: Notification) {
    let kind = notification.kind;
    let transaction_id = notification.transaction_id;
    if let Err(e) = ports.notifier.notify(notification).await {
        warn!(?kind, %transaction_id, error = %e, "Notification delivery failed");
    }
}
