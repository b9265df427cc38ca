//! Contact lifecycle synchronization: registers prospects, records purchases and
//! re-checks new prospects once after a delay.

pub mod config;
pub mod error;
pub mod events;
mod in_flight;
pub mod metrics_defs;
mod recheck;
pub mod synchronizer;

pub use error::SyncError;
pub use events::{CheckOutcome, Customer, Profile, PurchaseEvent, Registration};
pub use synchronizer::Synchronizer;
