//! # scrapline-types
//!
//! Plain data model for the Scrapline intake pipeline. A truckload of scrap
//! is tracked as a [`Transaction`] moving through seven fixed operational
//! levels, from vendor dispatch (L1) to gate-pass exit (L7):
//!
//! 1. **Vendor dispatch**: the vendor announces the load
//! 2. **Gate entry**: the vehicle is admitted to the yard
//! 3. **Weighbridge gross**: loaded vehicle weighed
//! 4. **Material inspection**: grade assessed; may reject the load
//! 5. **Weighbridge tare**: empty vehicle weighed, net weight reconciled
//! 6. **GRN generation**: goods receipt confirmed
//! 7. **Gate-pass exit**: single-use exit credential issued and consumed
//!
//! Types here carry no workflow behaviour; the kernel owns every transition.

#![deny(unsafe_code)]

pub mod audit;
pub mod context;
pub mod evidence;
pub mod gate_pass;
pub mod ids;
pub mod level;
pub mod transaction;

pub use audit::{AuditAction, AuditEntry, AuditRecord, AuditRecordBuilder, AuditSeverity};
pub use context::{RequestContext, UserRole};
pub use evidence::{
    CaptureInfo, CaptureMetadata, Evidence, EvidenceMetadata, EvidenceType, GpsCoordinates,
    SystemInfo,
};
pub use gate_pass::GatePassCredential;
pub use ids::{AuditEntryId, EvidenceId, FactoryId, TenantId, TransactionId, UserId, VendorId};
pub use level::{InvalidLevel, OperationalLevel};
pub use transaction::{
    LevelFields, LevelRecord, Transaction, TransactionStatus, ValidationStatus, VehicleVisit,
    WeighbridgeData,
};
