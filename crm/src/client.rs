use crate::config::{ApiKey, Config};
use crate::metrics_defs::{CRM_REQUEST_DURATION, CRM_REQUEST_FAILED};
use crate::types::{ContactEmail, ContactLookup, ContactProperties, property};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use shared::{counter, histogram};
use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};
use url::Url;

#[derive(thiserror::Error, Debug)]
pub enum CrmError {
    #[error("CRM responded with {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("CRM request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid CRM base url: {0}")]
    InvalidBaseUrl(String),
}

impl CrmError {
    /// Upstream status, when the CRM answered at all.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            CrmError::Status { status, .. } => Some(*status),
            CrmError::Transport(e) => e.status(),
            CrmError::InvalidBaseUrl(_) => None,
        }
    }
}

/// The two remote operations the relay needs from the CRM.
#[async_trait]
pub trait CrmClient: Send + Sync {
    /// Equality search on the email property, returning only `properties`.
    async fn find_by_email(
        &self,
        email: &ContactEmail,
        properties: &[&str],
    ) -> Result<ContactLookup, CrmError>;

    /// Creates the contact if absent, otherwise merges `properties` into it.
    async fn upsert_by_email(
        &self,
        email: &ContactEmail,
        properties: &ContactProperties,
    ) -> Result<(), CrmError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchFilter<'a> {
    property_name: &'static str,
    operator: &'static str,
    value: &'a str,
}

#[derive(Serialize)]
struct SearchFilterGroup<'a> {
    filters: [SearchFilter<'a>; 1],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    filter_groups: [SearchFilterGroup<'a>; 1],
    properties: &'a [&'a str],
}

#[derive(Deserialize)]
struct SearchResult {
    #[serde(default)]
    properties: HashMap<String, Option<String>>,
}

#[derive(Deserialize)]
struct SearchResponse {
    total: u64,
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Serialize)]
struct PropertyValue<'a> {
    property: &'a str,
    value: &'a str,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    properties: Vec<PropertyValue<'a>>,
}

/// `CrmClient` backed by the HubSpot REST API.
#[derive(Clone)]
pub struct HubSpotClient {
    client: reqwest::Client,
    base_url: Url,
    api_key: ApiKey,
}

impl HubSpotClient {
    pub fn new(config: &Config) -> Result<Self, CrmError> {
        if config.base_url.cannot_be_a_base() {
            return Err(CrmError::InvalidBaseUrl(config.base_url.to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(HubSpotClient {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
        })
    }

    // Appends path segments to the base url. Each segment is percent-encoded on its own,
    // so an email can never escape its segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, CrmError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| CrmError::InvalidBaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn post(&self, url: Url) -> reqwest::RequestBuilder {
        self.client
            .post(url)
            .bearer_auth(self.api_key.expose())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, CrmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(CrmError::Status { status, body })
}

async fn observe<T, F>(op: &'static str, call: F) -> Result<T, CrmError>
where
    F: Future<Output = Result<T, CrmError>>,
{
    let start = Instant::now();
    let result = call.await;
    histogram!(CRM_REQUEST_DURATION, "op" => op).record(start.elapsed().as_secs_f64());

    if let Err(e) = &result {
        counter!(CRM_REQUEST_FAILED, "op" => op).increment(1);
        tracing::debug!(op, status = ?e.status(), "CRM call failed");
    }
    result
}

#[async_trait]
impl CrmClient for HubSpotClient {
    async fn find_by_email(
        &self,
        email: &ContactEmail,
        properties: &[&str],
    ) -> Result<ContactLookup, CrmError> {
        observe("search", async {
            let url = self.endpoint(&["crm", "v3", "objects", "contacts", "search"])?;
            let body = SearchRequest {
                filter_groups: [SearchFilterGroup {
                    filters: [SearchFilter {
                        property_name: property::EMAIL,
                        operator: "EQ",
                        value: email.as_str(),
                    }],
                }],
                properties,
            };

            let response = ensure_success(self.post(url).json(&body).send().await?).await?;
            let data = response.json::<SearchResponse>().await?;

            let properties = data
                .results
                .into_iter()
                .next()
                .map(|first| {
                    first
                        .properties
                        .into_iter()
                        .filter_map(|(name, value)| value.map(|v| (name, v)))
                        .collect()
                })
                .unwrap_or_default();

            Ok::<_, CrmError>(ContactLookup {
                exists: data.total > 0,
                properties,
            })
        })
        .await
    }

    async fn upsert_by_email(
        &self,
        email: &ContactEmail,
        properties: &ContactProperties,
    ) -> Result<(), CrmError> {
        observe("upsert", async {
            // The trailing empty segment keeps the trailing slash the endpoint expects.
            let url = self.endpoint(&[
                "contacts",
                "v1",
                "contact",
                "createOrUpdate",
                "email",
                email.as_str(),
                "",
            ])?;
            let body = UpsertRequest {
                properties: properties
                    .iter()
                    .map(|(property, value)| PropertyValue { property, value })
                    .collect(),
            };

            ensure_success(self.post(url).json(&body).send().await?).await?;
            Ok::<_, CrmError>(())
        })
        .await
    }
}
