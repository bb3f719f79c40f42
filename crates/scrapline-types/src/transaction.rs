use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{EvidenceId, FactoryId, TenantId, TransactionId, UserId, VendorId};
use crate::level::OperationalLevel;

/// Lifecycle status of a transaction.
///
/// Only `Active` accepts mutations; the other three are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Active,
    Completed,
    Rejected,
    Cancelled,
}

impl TransactionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Active)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Completed => "COMPLETED",
            Self::Rejected => "REJECTED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
    Pending,
    Approved,
    Rejected,
}

/// Typed payload of a level record, one variant per stage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum LevelFields {
    VendorDispatch {
        material_type: String,
        dispatch_reference: Option<String>,
        declared_weight: Option<f64>,
    },
    GateEntry {
        driver_name: Option<String>,
        entry_gate: Option<String>,
    },
    WeighbridgeGross {
        gross_weight: f64,
        ticket_number: Option<String>,
    },
    MaterialInspection {
        grade: String,
        contamination_percent: Option<f64>,
        moisture_percent: Option<f64>,
        remarks: Option<String>,
    },
    WeighbridgeTare {
        tare_weight: f64,
        net_weight: f64,
        discrepancy_percentage: f64,
        requires_supervisor_approval: bool,
        ticket_number: Option<String>,
    },
    GrnGeneration {
        grn_number: String,
        accepted_weight: Option<f64>,
    },
    GatePassExit {
        nonce: uuid::Uuid,
        expires_at: DateTime<Utc>,
        validity_hours: i64,
    },
}

impl LevelFields {
    /// The level this payload belongs to.
    pub fn level(&self) -> OperationalLevel {
        match self {
            Self::VendorDispatch { .. } => OperationalLevel::VendorDispatch,
            Self::GateEntry { .. } => OperationalLevel::GateEntry,
            Self::WeighbridgeGross { .. } => OperationalLevel::WeighbridgeGross,
            Self::MaterialInspection { .. } => OperationalLevel::MaterialInspection,
            Self::WeighbridgeTare { .. } => OperationalLevel::WeighbridgeTare,
            Self::GrnGeneration { .. } => OperationalLevel::GrnGeneration,
            Self::GatePassExit { .. } => OperationalLevel::GatePassExit,
        }
    }
}

/// Completion record for one level of a transaction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelRecord {
    pub level: OperationalLevel,
    pub fields: LevelFields,
    /// Site-specific extras that have no typed home in `fields`.
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
    pub completed_by: UserId,
    pub completed_at: DateTime<Utc>,
    #[serde(default)]
    pub evidence_ids: Vec<EvidenceId>,
    pub validation_status: ValidationStatus,
    pub approved_by: Option<UserId>,
    pub approved_at: Option<DateTime<Utc>>,
}

/// Weighbridge readings for a transaction.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeighbridgeData {
    pub gross_weight: Option<f64>,
    pub tare_weight: Option<f64>,
    pub net_weight: Option<f64>,
    pub gross_weight_timestamp: Option<DateTime<Utc>>,
    pub tare_weight_timestamp: Option<DateTime<Utc>>,
    pub gross_weight_operator: Option<UserId>,
    pub tare_weight_operator: Option<UserId>,
}

/// The unit of work: one truckload moving through L1..L7.
///
/// `version` is bumped by the repository on every successful save and used
/// for optimistic concurrency.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: TransactionId,
    pub tenant_id: TenantId,
    pub factory_id: FactoryId,
    pub vendor_id: VendorId,
    pub vehicle_number: String,
    pub current_level: OperationalLevel,
    pub status: TransactionStatus,
    pub is_locked: bool,
    #[serde(default)]
    pub level_data: BTreeMap<OperationalLevel, LevelRecord>,
    #[serde(default)]
    pub weighbridge_data: WeighbridgeData,
    pub gate_pass_qr_code: Option<String>,
    pub gate_pass_expires_at: Option<DateTime<Utc>>,
    pub status_reason: Option<String>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub version: u64,
}

impl Transaction {
    /// A fresh transaction at L1, ACTIVE and unlocked.
    pub fn open(
        tenant_id: TenantId,
        factory_id: FactoryId,
        vendor_id: VendorId,
        vehicle_number: impl Into<String>,
        created_by: UserId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            tenant_id,
            factory_id,
            vendor_id,
            vehicle_number: vehicle_number.into(),
            current_level: OperationalLevel::VendorDispatch,
            status: TransactionStatus::Active,
            is_locked: false,
            level_data: BTreeMap::new(),
            weighbridge_data: WeighbridgeData::default(),
            gate_pass_qr_code: None,
            gate_pass_expires_at: None,
            status_reason: None,
            created_by,
            created_at: now,
            updated_at: now,
            completed_at: None,
            version: 0,
        }
    }

    pub fn level_record(&self, level: OperationalLevel) -> Option<&LevelRecord> {
        self.level_data.get(&level)
    }

    /// Whether the record for `level` exists and is approved.
    pub fn is_level_approved(&self, level: OperationalLevel) -> bool {
        self.level_record(level)
            .map(|r| r.validation_status == ValidationStatus::Approved)
            .unwrap_or(false)
    }
}

/// Visit-history entry appended to the vehicle at exit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleVisit {
    pub transaction_id: TransactionId,
    pub vehicle_number: String,
    pub visit_date: DateTime<Utc>,
    pub factory_id: FactoryId,
    pub status: TransactionStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Transaction {
        Transaction::open(
            TenantId::new("acme"),
            FactoryId::new("plant-1"),
            VendorId::new("vendor-9"),
            "MH12AB1234",
            UserId::new("op-1"),
            Utc::now(),
        )
    }

    #[test]
    fn fresh_transaction_starts_at_l1_active() {
        let tx = sample();
        assert_eq!(tx.current_level, OperationalLevel::VendorDispatch);
        assert_eq!(tx.status, TransactionStatus::Active);
        assert!(!tx.is_locked);
        assert!(tx.level_data.is_empty());
        assert_eq!(tx.version, 0);
    }

    #[test]
    fn level_fields_report_their_level() {
        let fields = LevelFields::GrnGeneration {
            grn_number: "GRN-1".into(),
            accepted_weight: None,
        };
        assert_eq!(fields.level(), OperationalLevel::GrnGeneration);
    }

    #[test]
    fn level_fields_are_tagged_by_stage() {
        let fields = LevelFields::GateEntry {
            driver_name: Some("R. Patil".into()),
            entry_gate: None,
        };
        let json = serde_json::to_value(&fields).unwrap();
        assert_eq!(json["stage"], "gate_entry");
    }

    #[test]
    fn transaction_serializes_with_level_number_keys() {
        let mut tx = sample();
        let now = Utc::now();
        tx.level_data.insert(
            OperationalLevel::VendorDispatch,
            LevelRecord {
                level: OperationalLevel::VendorDispatch,
                fields: LevelFields::VendorDispatch {
                    material_type: "HMS-1".into(),
                    dispatch_reference: None,
                    declared_weight: None,
                },
                attributes: BTreeMap::new(),
                completed_by: UserId::new("op-1"),
                completed_at: now,
                evidence_ids: vec![],
                validation_status: ValidationStatus::Approved,
                approved_by: None,
                approved_at: None,
            },
        );

        let json = serde_json::to_value(&tx).unwrap();
        assert!(json["levelData"].get("1").is_some());
        assert_eq!(json["status"], "ACTIVE");

        let back: Transaction = serde_json::from_value(json).unwrap();
        assert!(back.is_level_approved(OperationalLevel::VendorDispatch));
    }

    #[test]
    fn terminal_statuses() {
        assert!(!TransactionStatus::Active.is_terminal());
        assert!(TransactionStatus::Completed.is_terminal());
        assert!(TransactionStatus::Rejected.is_terminal());
        assert!(TransactionStatus::Cancelled.is_terminal());
    }
}
