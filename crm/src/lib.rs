pub mod client;
pub mod config;
pub mod metrics_defs;
#[cfg(any(test, feature = "testutils"))]
pub mod testutils;
pub mod types;

pub use client::{CrmClient, CrmError, HubSpotClient};
pub use types::{ContactEmail, ContactLookup, ContactProperties, PurchaseStatus};
