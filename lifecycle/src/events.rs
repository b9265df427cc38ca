use crate::error::SyncError;
use crm::ContactEmail;
use crm::types::{ContactProperties, property};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// Storefront payloads are loosely typed. A field of an unexpected type reads as absent
// instead of failing the whole request.

fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}

/// Like [`text`], but numbers keep their decimal form (phone numbers often arrive as such).
fn text_or_number<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn customer<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Customer>, D::Error> {
    Ok(Customer::deserialize(Value::deserialize(deserializer)?).ok())
}

/// Optional profile fields sent by the storefront with a contact check.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default, deserialize_with = "text_or_number")]
    pub first_name: Option<String>,
    #[serde(default, deserialize_with = "text_or_number")]
    pub last_name: Option<String>,
    #[serde(default, deserialize_with = "text_or_number")]
    pub phone: Option<String>,
    #[serde(
        rename = "pageUrl",
        alias = "landingPageUrl",
        default,
        deserialize_with = "text"
    )]
    pub landing_page_url: Option<String>,
}

impl Profile {
    /// Every profile property, with missing fields written as empty strings. A new
    /// prospect always overwrites whatever the CRM held for these properties.
    pub fn to_properties(&self) -> ContactProperties {
        let field = |value: &Option<String>| value.clone().unwrap_or_default();

        ContactProperties::from([
            (property::FIRST_NAME.to_string(), field(&self.first_name)),
            (property::LAST_NAME.to_string(), field(&self.last_name)),
            (property::PHONE.to_string(), field(&self.phone)),
            (
                property::LANDING_PAGE_URL.to_string(),
                field(&self.landing_page_url),
            ),
        ])
    }
}

/// Body of a check-or-register request.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Registration {
    #[serde(default, deserialize_with = "text")]
    pub email: Option<String>,
    #[serde(flatten)]
    pub profile: Profile,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CheckOutcome {
    /// Whether the contact existed before this call, not whether it exists now.
    pub exists: bool,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Customer {
    #[serde(default, deserialize_with = "text")]
    pub email: Option<String>,
}

/// Storefront order webhook. Only the fields that can carry the buyer's email are read.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct PurchaseEvent {
    #[serde(default, deserialize_with = "text")]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "customer")]
    pub customer: Option<Customer>,
}

impl PurchaseEvent {
    /// A usable top-level `email` wins over `customer.email`.
    pub fn resolve_email(&self) -> Result<ContactEmail, SyncError> {
        let nested = self.customer.as_ref().and_then(|c| c.email.as_deref());

        [self.email.as_deref(), nested]
            .into_iter()
            .flatten()
            .find_map(|raw| ContactEmail::parse(raw).ok())
            .ok_or(SyncError::MissingEmail)
    }
}
