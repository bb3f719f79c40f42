mod common;

use common::{harness, VEHICLE};
use scrapline_kernel::{ErrorKind, NewEvidence, WeighbridgeReading};
use scrapline_types::{AuditAction, EvidenceType, OperationalLevel, TransactionStatus};

const RACERS: usize = 8;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_tare_captures_advance_once() {
    let h = harness();
    let tx = h.at_inspection().await;

    let mut handles = Vec::new();
    for i in 0..RACERS {
        let kernel = h.kernel.clone();
        let ctx = h.operator.clone();
        handles.push(tokio::spawn(async move {
            kernel
                .transactions()
                .capture_tare_weight(&ctx, tx.id, WeighbridgeReading::new(8000.0 + i as f64))
                .await
        }));
    }

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(e) => assert_eq!(e.kind(), ErrorKind::Validation, "{e}"),
        }
    }
    assert_eq!(successes, 1);
    assert_eq!(h.count(AuditAction::WeighbridgeTareCaptured), 1);

    let stored = h.kernel.transactions().get_transaction(&h.operator, tx.id).await.unwrap();
    assert_eq!(stored.current_level, OperationalLevel::GrnGeneration);
    assert_eq!(h.kernel.locks().tracked(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_gate_pass_issue_is_single() {
    let h = harness();
    let tx = h.at_grn().await;

    let mut handles = Vec::new();
    for _ in 0..RACERS {
        let kernel = h.kernel.clone();
        let ctx = h.operator.clone();
        handles.push(tokio::spawn(async move {
            kernel.gate_pass().generate(&ctx, tx.id, None).await
        }));
    }

    let mut issued = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(credential) => issued.push(credential),
            Err(e) => assert_eq!(e.kind(), ErrorKind::Conflict, "{e}"),
        }
    }
    assert_eq!(issued.len(), 1);
    assert_eq!(h.count(AuditAction::GatePassGenerated), 1);

    let stored = h.kernel.transactions().get_transaction(&h.operator, tx.id).await.unwrap();
    assert_eq!(
        stored.gate_pass_qr_code.as_deref(),
        Some(issued[0].to_payload().unwrap().as_str())
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_exits_complete_once() {
    let h = harness();
    let tx = h.at_grn().await;
    h.kernel.gate_pass().generate(&h.operator, tx.id, None).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..RACERS {
        let kernel = h.kernel.clone();
        let ctx = h.operator.clone();
        handles.push(tokio::spawn(async move {
            kernel.gate_pass().process_exit(&ctx, tx.id).await
        }));
    }

    let mut completed = 0;
    for handle in handles {
        if let Ok(done) = handle.await.unwrap() {
            assert_eq!(done.status, TransactionStatus::Completed);
            completed += 1;
        }
    }
    assert_eq!(completed, 1);
    assert_eq!(h.count(AuditAction::VehicleExitCompleted), 1);
    assert_eq!(
        h.mem.vehicles.visits(&tx.tenant_id, VEHICLE).await.len(),
        1
    );
    assert_eq!(h.kernel.locks().tracked(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_evidence_keeps_a_consistent_order() {
    let h = harness();
    let tx = h.at_gate_entry().await;

    let mut handles = Vec::new();
    for i in 0..RACERS {
        let kernel = h.kernel.clone();
        let ctx = h.operator.clone();
        handles.push(tokio::spawn(async move {
            kernel
                .evidence()
                .create_evidence(
                    &ctx,
                    NewEvidence::new(tx.id, OperationalLevel::GateEntry, EvidenceType::Photo)
                        .with_file(format!("frame-{i}").into_bytes(), "image/jpeg"),
                )
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let listed = h.kernel.evidence().list_evidence(&h.operator, tx.id).await.unwrap();
    assert_eq!(listed.len(), RACERS);
    assert!(h.kernel.evidence().validate_ordering(&h.operator, tx.id).await.unwrap());
    assert!(h.mem.audit.verify_chain());
}
