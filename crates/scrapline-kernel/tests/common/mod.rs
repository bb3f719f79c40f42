#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use scrapline_kernel::memory::RecordingNotifier;
use scrapline_kernel::{
    InMemoryPorts, IntakeKernel, KernelConfig, LevelSubmission, ManualClock, NewTransaction,
    WeighbridgeReading,
};
use scrapline_types::{
    AuditAction, FactoryId, LevelFields, RequestContext, Transaction, TransactionId, VendorId,
};

pub const VEHICLE: &str = "MH12AB1234";

pub struct Harness {
    pub kernel: IntakeKernel,
    pub mem: InMemoryPorts,
    pub clock: ManualClock,
    pub operator: RequestContext,
    pub supervisor: RequestContext,
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap()
}

pub fn harness() -> Harness {
    harness_with(KernelConfig::default(), RecordingNotifier::new())
}

pub fn harness_with(config: KernelConfig, notifier: RecordingNotifier) -> Harness {
    harness_over(config, InMemoryPorts::with_notifier(notifier))
}

pub fn harness_over(config: KernelConfig, mem: InMemoryPorts) -> Harness {
    let clock = ManualClock::new(start_time());
    let kernel = IntakeKernel::new(config, mem.ports_with_clock(Arc::new(clock.clone())));
    Harness {
        kernel,
        mem,
        clock,
        operator: RequestContext::operator("acme", "gate-op-1"),
        supervisor: RequestContext::supervisor("acme", "shift-lead"),
    }
}

impl Harness {
    pub async fn open(&self) -> Transaction {
        self.kernel
            .transactions()
            .create_transaction(
                &self.operator,
                NewTransaction {
                    factory_id: FactoryId::new("plant-1"),
                    vendor_id: VendorId::new("vendor-42"),
                    vehicle_number: VEHICLE.into(),
                },
            )
            .await
            .unwrap()
    }

    pub async fn record(&self, id: TransactionId, fields: LevelFields) -> Transaction {
        self.kernel
            .transactions()
            .record_level_completion(&self.operator, id, LevelSubmission::approved(fields))
            .await
            .unwrap()
    }

    /// L1 approved, L2 approved; ready for gross weighing.
    pub async fn at_gate_entry(&self) -> Transaction {
        let tx = self.open().await;
        self.record(
            tx.id,
            LevelFields::VendorDispatch {
                material_type: "HMS-1".into(),
                dispatch_reference: Some("DSP-881".into()),
                declared_weight: Some(7400.0),
            },
        )
        .await;
        self.record(
            tx.id,
            LevelFields::GateEntry {
                driver_name: Some("S. Kulkarni".into()),
                entry_gate: Some("G1".into()),
            },
        )
        .await
    }

    /// Gross captured; inspection not yet recorded.
    pub async fn at_gross(&self) -> Transaction {
        let tx = self.at_gate_entry().await;
        self.kernel
            .transactions()
            .capture_gross_weight(&self.operator, tx.id, WeighbridgeReading::new(15750.0))
            .await
            .unwrap()
    }

    /// Gross captured and inspection approved; ready for tare.
    pub async fn at_inspection(&self) -> Transaction {
        let tx = self.at_gross().await;
        self.record(
            tx.id,
            LevelFields::MaterialInspection {
                grade: "HMS-1".into(),
                contamination_percent: Some(1.5),
                moisture_percent: None,
                remarks: None,
            },
        )
        .await
    }

    /// Tare captured within threshold and GRN approved; ready for a gate pass.
    pub async fn at_grn(&self) -> Transaction {
        let tx = self.at_inspection().await;
        self.kernel
            .transactions()
            .capture_tare_weight(&self.operator, tx.id, WeighbridgeReading::new(8250.0))
            .await
            .unwrap();
        self.record(
            tx.id,
            LevelFields::GrnGeneration {
                grn_number: "GRN-2026-0042".into(),
                accepted_weight: Some(7500.0),
            },
        )
        .await
    }

    pub fn actions(&self) -> Vec<AuditAction> {
        self.mem
            .audit
            .entries()
            .into_iter()
            .map(|e| e.record.action)
            .collect()
    }

    pub fn count(&self, action: AuditAction) -> usize {
        self.actions().into_iter().filter(|a| *a == action).count()
    }
}
