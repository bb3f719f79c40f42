//! # scrapline-kernel
//!
//! Intake pipeline core. A truckload is driven from vendor dispatch to
//! gate-pass exit by five cooperating components:
//!
//! - [`TransactionStateMachine`] owns stage and status transitions
//! - [`WeightReconciliationEngine`] turns gross and tare readings into a net
//!   weight and a supervisor-approval flag
//! - [`EvidenceLedger`] captures hashed, append-only evidence
//! - [`ChronologyGuard`] checks event ordering and timestamp freshness
//! - [`GatePassAuthority`] issues, validates and consumes exit passes
//!
//! Persistence, blob storage, vehicle history, notifications and time are
//! reached through the traits in [`ports`]. [`IntakeKernel`] wires the
//! components together over one set of ports.
//!
//! ## Usage
//!
//! ```no_run
//! use scrapline_kernel::{IntakeKernel, KernelConfig, NewTransaction};
//! use scrapline_types::{FactoryId, RequestContext, VendorId};
//!
//! # async fn run() -> Result<(), scrapline_kernel::KernelError> {
//! let (kernel, _mem) = IntakeKernel::in_memory(KernelConfig::default());
//! let ctx = RequestContext::operator("acme", "gate-op-1");
//! let tx = kernel
//!     .transactions()
//!     .create_transaction(
//!         &ctx,
//!         NewTransaction {
//!             factory_id: FactoryId::new("plant-1"),
//!             vendor_id: VendorId::new("vendor-42"),
//!             vehicle_number: "MH12AB1234".into(),
//!         },
//!     )
//!     .await?;
//! # let _ = tx;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

mod access;
pub mod audit;
pub mod chronology;
pub mod config;
pub mod error;
pub mod evidence;
pub mod gate_pass;
pub mod kernel;
pub mod locks;
pub mod machine;
pub mod memory;
pub mod ports;
pub mod telemetry;
pub mod weighbridge;

pub use audit::{verify_chain, IntegrityChain};
pub use chronology::{first_violation, ChronologyEvent, ChronologyGuard, OrderingViolation};
pub use config::KernelConfig;
pub use error::{ErrorKind, KernelError, KernelResult, StorageError};
pub use evidence::{content_hash, EvidenceLedger, NewEvidence};
pub use gate_pass::{GatePassAuthority, GatePassIssue, GatePassValidation};
pub use kernel::IntakeKernel;
pub use locks::{TransactionGuard, TransactionLocks};
pub use machine::{LevelSubmission, NewTransaction, TransactionStateMachine, WeighbridgeReading};
pub use memory::InMemoryPorts;
pub use ports::{Clock, ManualClock, Notification, NotificationKind, Ports, SystemClock};
pub use weighbridge::{WeightReconciliation, WeightReconciliationEngine};
