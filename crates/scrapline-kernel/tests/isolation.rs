mod common;

use common::harness;
use scrapline_kernel::{KernelError, LevelSubmission, NewEvidence, WeighbridgeReading};
use scrapline_types::{
    AuditAction, EvidenceType, LevelFields, OperationalLevel, RequestContext, TenantId,
    TransactionId,
};

#[tokio::test]
async fn other_tenant_is_forbidden_everywhere() {
    let h = harness();
    let tx = h.at_gate_entry().await;
    let outsider = RequestContext::supervisor("globex", "auditor");

    let err = h
        .kernel
        .transactions()
        .get_transaction(&outsider, tx.id)
        .await
        .unwrap_err();
    assert!(matches!(err, KernelError::Forbidden(_)));

    let err = h
        .kernel
        .transactions()
        .capture_gross_weight(&outsider, tx.id, WeighbridgeReading::new(15000.0))
        .await
        .unwrap_err();
    assert!(matches!(err, KernelError::Forbidden(_)));

    let err = h
        .kernel
        .transactions()
        .cancel_transaction(&outsider, tx.id, "not mine")
        .await
        .unwrap_err();
    assert!(matches!(err, KernelError::Forbidden(_)));

    let err = h
        .kernel
        .evidence()
        .create_evidence(
            &outsider,
            NewEvidence::new(tx.id, OperationalLevel::GateEntry, EvidenceType::Photo),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, KernelError::Forbidden(_)));

    let err = h
        .kernel
        .evidence()
        .validate_ordering(&outsider, tx.id)
        .await
        .unwrap_err();
    assert!(matches!(err, KernelError::Forbidden(_)));

    let denials: Vec<_> = h
        .mem
        .audit
        .entries()
        .into_iter()
        .filter(|e| e.record.action == AuditAction::AccessDenied)
        .collect();
    assert_eq!(denials.len(), 5);
    assert!(denials
        .iter()
        .all(|e| e.record.tenant_id == TenantId::new("globex")));

    let stored = h.kernel.transactions().get_transaction(&h.operator, tx.id).await.unwrap();
    assert_eq!(stored.current_level, OperationalLevel::GateEntry);
    assert!(stored.weighbridge_data.gross_weight.is_none());
}

#[tokio::test]
async fn listing_is_tenant_scoped() {
    let h = harness();
    h.open().await;
    h.open().await;

    let mine = h.kernel.transactions().list_transactions(&h.operator).await.unwrap();
    assert_eq!(mine.len(), 2);

    let outsider = RequestContext::operator("globex", "op");
    let theirs = h.kernel.transactions().list_transactions(&outsider).await.unwrap();
    assert!(theirs.is_empty());
}

#[tokio::test]
async fn unknown_transaction_is_not_found() {
    let h = harness();
    let err = h
        .kernel
        .transactions()
        .record_level_completion(
            &h.operator,
            TransactionId::new(),
            LevelSubmission::approved(LevelFields::VendorDispatch {
                material_type: "HMS-1".into(),
                dispatch_reference: None,
                declared_weight: None,
            }),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, KernelError::NotFound { kind: "transaction", .. }));
}
