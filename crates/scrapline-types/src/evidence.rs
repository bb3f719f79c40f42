use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{EvidenceId, TenantId, TransactionId, UserId};
use crate::level::OperationalLevel;

/// Kind of evidentiary artifact.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvidenceType {
    Photo,
    Video,
    Document,
    WeighbridgeTicket,
    InspectionReport,
    Grn,
    GatePass,
    Signature,
    Other,
}

/// GPS fix attached to a capture.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpsCoordinates {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Capture context. Fields left empty by the caller are stamped by the ledger.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureInfo {
    pub timestamp: Option<DateTime<Utc>>,
    pub timezone: Option<String>,
    pub device_id: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Metadata supplied by the capturing client.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureMetadata {
    #[serde(default)]
    pub capture_info: CaptureInfo,
    pub gps_coordinates: Option<GpsCoordinates>,
    #[serde(default)]
    pub custom: BTreeMap<String, serde_json::Value>,
}

/// Server-side stamp, always generated by the ledger.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    pub version: String,
    pub environment: String,
    pub server_timestamp: DateTime<Utc>,
}

/// Enriched metadata as persisted on an evidence record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceMetadata {
    pub capture_info: CaptureInfo,
    pub gps_coordinates: Option<GpsCoordinates>,
    pub system_info: SystemInfo,
    #[serde(default)]
    pub custom: BTreeMap<String, serde_json::Value>,
}

/// An immutable fact about a transaction at a given level.
///
/// Only `is_processed` may change after creation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    pub id: EvidenceId,
    pub tenant_id: TenantId,
    pub transaction_id: TransactionId,
    pub captured_by: UserId,
    pub operational_level: OperationalLevel,
    pub evidence_type: EvidenceType,
    pub file_path: Option<String>,
    /// Lowercase hex SHA-256 of the file content, 64 characters.
    pub file_hash: Option<String>,
    pub file_size: Option<u64>,
    pub mime_type: Option<String>,
    pub metadata: EvidenceMetadata,
    pub captured_at: DateTime<Utc>,
    pub is_processed: bool,
}
