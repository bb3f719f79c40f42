use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::TransactionId;

/// Gate-pass payload embedded in `Transaction::gate_pass_qr_code`.
///
/// Wire format:
/// `{"transactionId", "vehicleNumber", "generatedAt", "expiresAt", "nonce"}`
/// with RFC 3339 timestamps and a UUID nonce.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GatePassCredential {
    pub transaction_id: TransactionId,
    pub vehicle_number: String,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub nonce: uuid::Uuid,
}

impl GatePassCredential {
    pub fn to_payload(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse a scanned payload. Any missing or mistyped field fails.
    pub fn from_payload(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}
