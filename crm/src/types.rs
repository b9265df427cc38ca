use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// CRM property names written and read by the relay.
pub mod property {
    pub const EMAIL: &str = "email";
    pub const FIRST_NAME: &str = "firstname";
    pub const LAST_NAME: &str = "lastname";
    pub const PHONE: &str = "phone";
    pub const LANDING_PAGE_URL: &str = "landing_page_url";
    pub const PURCHASE_STATUS: &str = "purchase_status";
}

/// Properties sent in an upsert. Ordered so request bodies are deterministic.
pub type ContactProperties = BTreeMap<String, String>;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum EmailError {
    #[error("email is required")]
    Empty,
}

/// The key of a contact. Trimmed and lowercased, since the CRM matches emails
/// case-insensitively and the relay keys its own state by the same value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContactEmail(String);

impl ContactEmail {
    pub fn parse(raw: &str) -> Result<Self, EmailError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(EmailError::Empty);
        }
        Ok(ContactEmail(trimmed.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContactEmail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PurchaseStatus {
    Prospect,
    Purchased,
    NotPurchased,
}

impl PurchaseStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            PurchaseStatus::Prospect => "prospect",
            PurchaseStatus::Purchased => "purchased",
            PurchaseStatus::NotPurchased => "not_purchased",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "prospect" => Some(PurchaseStatus::Prospect),
            "purchased" => Some(PurchaseStatus::Purchased),
            "not_purchased" => Some(PurchaseStatus::NotPurchased),
            _ => None,
        }
    }
}

impl fmt::Display for PurchaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a search by email.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContactLookup {
    pub exists: bool,
    /// Requested properties of the first match. Properties the CRM returned as null are omitted.
    pub properties: HashMap<String, String>,
}

impl ContactLookup {
    pub fn not_found() -> Self {
        ContactLookup::default()
    }

    /// `None` when the property is unset or holds a value the relay does not know.
    pub fn purchase_status(&self) -> Option<PurchaseStatus> {
        self.properties
            .get(property::PURCHASE_STATUS)
            .and_then(|value| PurchaseStatus::parse(value))
    }
}
