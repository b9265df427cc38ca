use crate::config::Config;
use crate::error::SyncError;
use crate::events::{CheckOutcome, PurchaseEvent, Registration};
use crate::in_flight::InFlight;
use crate::metrics_defs::{
    PROSPECT_REGISTERED, PURCHASE_RECORDED, RECHECK_FAILED, RECHECK_FIRED,
    RECHECK_MARKED_NOT_PURCHASED,
};
use crate::recheck::{ArmResult, RecheckRegistry};
use crm::types::property;
use crm::{ContactEmail, ContactProperties, CrmClient, PurchaseStatus};
use shared::counter;
use std::sync::Arc;
use std::time::Duration;

struct SynchronizerInner {
    crm: Arc<dyn CrmClient>,
    recheck_delay: Duration,
    rechecks: Arc<RecheckRegistry>,
    in_flight: InFlight,
}

/// Keeps the CRM's purchase status of storefront contacts up to date.
///
/// Every operation on a contact (check-or-register, purchase, recheck) holds that contact's
/// in-flight guard, so operations on the same email never interleave within this process.
#[derive(Clone)]
pub struct Synchronizer {
    inner: Arc<SynchronizerInner>,
}

impl Synchronizer {
    pub fn new(crm: Arc<dyn CrmClient>, config: &Config) -> Self {
        Synchronizer {
            inner: Arc::new(SynchronizerInner {
                crm,
                recheck_delay: config.recheck_delay(),
                rechecks: Arc::new(RecheckRegistry::default()),
                in_flight: InFlight::default(),
            }),
        }
    }

    /// Reports whether the contact already existed, registering it as a prospect when it
    /// did not. A new prospect gets a deferred recheck, so nothing is registered once
    /// [`Synchronizer::shutdown`] has run.
    pub async fn check_or_register(
        &self,
        registration: &Registration,
    ) -> Result<CheckOutcome, SyncError> {
        let email = ContactEmail::parse(registration.email.as_deref().unwrap_or_default())
            .map_err(|_| SyncError::MissingEmail)?;
        let _guard = self.inner.in_flight.acquire(&email).await;
        if !self.is_accepting() {
            return Err(SyncError::ShuttingDown);
        }

        let lookup = self
            .inner
            .crm
            .find_by_email(&email, &[property::EMAIL, property::PURCHASE_STATUS])
            .await?;

        if lookup.exists {
            tracing::debug!(email = %email, status = ?lookup.purchase_status(), "contact exists");
            return Ok(CheckOutcome { exists: true });
        }

        // Registered by this process already; the CRM search index has not caught up yet.
        if self.inner.rechecks.is_pending(&email) {
            tracing::debug!(email = %email, "contact not searchable yet, recheck pending");
            return Ok(CheckOutcome { exists: true });
        }

        let mut properties = registration.profile.to_properties();
        properties.insert(property::EMAIL.to_string(), email.to_string());
        properties.insert(
            property::PURCHASE_STATUS.to_string(),
            PurchaseStatus::Prospect.to_string(),
        );
        self.inner.crm.upsert_by_email(&email, &properties).await?;
        counter!(PROSPECT_REGISTERED).increment(1);

        match self.arm_recheck(email.clone()) {
            ArmResult::Armed => {
                let delay = self.inner.recheck_delay;
                tracing::info!(email = %email, ?delay, "registered prospect");
            }
            ArmResult::AlreadyPending => {
                tracing::info!(email = %email, "registered prospect, recheck already pending");
            }
            ArmResult::Closed => {
                tracing::warn!(email = %email, "registered prospect during shutdown, no recheck");
            }
        }

        Ok(CheckOutcome { exists: false })
    }

    /// Marks the buyer of a storefront order as purchased and cancels its pending recheck.
    pub async fn mark_purchased(&self, event: &PurchaseEvent) -> Result<(), SyncError> {
        let email = event.resolve_email()?;
        let _guard = self.inner.in_flight.acquire(&email).await;

        let properties = ContactProperties::from([(
            property::PURCHASE_STATUS.to_string(),
            PurchaseStatus::Purchased.to_string(),
        )]);
        self.inner.crm.upsert_by_email(&email, &properties).await?;
        counter!(PURCHASE_RECORDED).increment(1);

        let cancelled = self.inner.rechecks.cancel(&email);
        tracing::info!(email = %email, cancelled_recheck = cancelled, "purchase recorded");
        Ok(())
    }

    /// Stops accepting rechecks and drops every pending one. Pending rechecks are not
    /// persisted, so the contacts they covered keep their `prospect` status.
    pub fn shutdown(&self) -> usize {
        let dropped = self.inner.rechecks.close();
        tracing::info!(dropped, "lifecycle synchronizer shut down");
        dropped
    }

    pub fn is_accepting(&self) -> bool {
        !self.inner.rechecks.is_closed()
    }

    pub fn pending_rechecks(&self) -> usize {
        self.inner.rechecks.len()
    }

    fn arm_recheck(&self, email: ContactEmail) -> ArmResult {
        let crm = self.inner.crm.clone();
        let in_flight = self.inner.in_flight.clone();
        let task_email = email.clone();

        self.inner
            .rechecks
            .arm(email, self.inner.recheck_delay, async move {
                let _guard = in_flight.acquire(&task_email).await;
                recheck(crm.as_ref(), &task_email).await;
            })
    }
}

/// Marks the contact as not purchased unless a purchase was recorded in the meantime.
/// Failures are only logged: nobody is waiting for the result.
async fn recheck(crm: &dyn CrmClient, email: &ContactEmail) {
    counter!(RECHECK_FIRED).increment(1);

    let lookup = match crm.find_by_email(email, &[property::PURCHASE_STATUS]).await {
        Ok(lookup) => lookup,
        Err(e) => {
            counter!(RECHECK_FAILED).increment(1);
            tracing::error!(email = %email, error = %e, "recheck could not read purchase status");
            return;
        }
    };

    if lookup.purchase_status() == Some(PurchaseStatus::Purchased) {
        tracing::debug!(email = %email, "recheck found a purchase");
        return;
    }

    let properties = ContactProperties::from([(
        property::PURCHASE_STATUS.to_string(),
        PurchaseStatus::NotPurchased.to_string(),
    )]);
    match crm.upsert_by_email(email, &properties).await {
        Ok(()) => {
            counter!(RECHECK_MARKED_NOT_PURCHASED).increment(1);
            tracing::info!(email = %email, "no purchase after recheck delay, marked not purchased");
        }
        Err(e) => {
            counter!(RECHECK_FAILED).increment(1);
            tracing::error!(email = %email, error = %e, "recheck could not mark contact");
        }
    }
}
