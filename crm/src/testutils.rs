use crate::client::{CrmClient, CrmError};
use crate::types::{ContactEmail, ContactLookup, ContactProperties, PurchaseStatus, property};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::StatusCode;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Body returned by a failing `FakeCrm`, so tests can assert it never reaches a client.
pub const FAKE_UPSTREAM_ERROR_BODY: &str =
    r#"{"status":"error","message":"internal upstream failure","correlationId":"fake-123"}"#;

#[derive(Clone, Debug, PartialEq)]
pub enum CrmCall {
    Search { email: String },
    Upsert { email: String, properties: ContactProperties },
}

#[derive(Default)]
struct FakeCrmState {
    contacts: HashMap<String, ContactProperties>,
    calls: Vec<CrmCall>,
    failing: bool,
}

/// In-memory CRM. Upserts merge properties like the real API, and every call is recorded.
#[derive(Clone, Default)]
pub struct FakeCrm {
    state: Arc<Mutex<FakeCrmState>>,
    latency: Option<Duration>,
}

impl FakeCrm {
    pub fn new() -> Self {
        FakeCrm::default()
    }

    /// Every call sleeps for `latency` before answering. Lets concurrent callers interleave.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_contact(self, email: &str, properties: &[(&str, &str)]) -> Self {
        let mut stored: ContactProperties = properties
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        stored.insert(property::EMAIL.to_string(), email.to_string());
        self.state.lock().contacts.insert(email.to_string(), stored);
        self
    }

    /// Makes every following call fail with a simulated 500.
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().failing = failing;
    }

    pub fn calls(&self) -> Vec<CrmCall> {
        self.state.lock().calls.clone()
    }

    pub fn upserts(&self) -> Vec<(String, ContactProperties)> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                CrmCall::Upsert { email, properties } => Some((email.clone(), properties.clone())),
                CrmCall::Search { .. } => None,
            })
            .collect()
    }

    /// Number of upserts that wrote `status` as the purchase status.
    pub fn upserts_with_status(&self, status: PurchaseStatus) -> usize {
        self.upserts()
            .iter()
            .filter(|(_, properties)| {
                properties
                    .get(property::PURCHASE_STATUS)
                    .is_some_and(|value| value == status.as_str())
            })
            .count()
    }

    pub fn contact(&self, email: &str) -> Option<ContactProperties> {
        self.state.lock().contacts.get(email).cloned()
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn upstream_failure() -> CrmError {
        CrmError::Status {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: FAKE_UPSTREAM_ERROR_BODY.to_string(),
        }
    }
}

#[async_trait]
impl CrmClient for FakeCrm {
    async fn find_by_email(
        &self,
        email: &ContactEmail,
        properties: &[&str],
    ) -> Result<ContactLookup, CrmError> {
        self.delay().await;

        let mut state = self.state.lock();
        state.calls.push(CrmCall::Search {
            email: email.to_string(),
        });
        if state.failing {
            return Err(Self::upstream_failure());
        }

        let lookup = match state.contacts.get(email.as_str()) {
            Some(contact) => ContactLookup {
                exists: true,
                properties: contact
                    .iter()
                    .filter(|(name, _)| properties.contains(&name.as_str()))
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect(),
            },
            None => ContactLookup::not_found(),
        };
        Ok(lookup)
    }

    async fn upsert_by_email(
        &self,
        email: &ContactEmail,
        properties: &ContactProperties,
    ) -> Result<(), CrmError> {
        self.delay().await;

        let mut state = self.state.lock();
        state.calls.push(CrmCall::Upsert {
            email: email.to_string(),
            properties: properties.clone(),
        });
        if state.failing {
            return Err(Self::upstream_failure());
        }

        let contact = state.contacts.entry(email.to_string()).or_default();
        contact.insert(property::EMAIL.to_string(), email.to_string());
        contact.extend(properties.clone());
        Ok(())
    }
}
