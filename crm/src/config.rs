use serde::Deserialize;
use std::fmt;
use url::Url;

const DEFAULT_BASE_URL: &str = "https://api.hubapi.com";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Bearer credential for the CRM. Never printed by `Debug`.
#[derive(Clone, Default, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new<K: Into<String>>(key: K) -> Self {
        ApiKey(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct Config {
    #[serde(default = "default_base_url")]
    pub base_url: Url,
    /// Usually supplied through the environment rather than the config file.
    #[serde(default)]
    pub api_key: ApiKey,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> Url {
    Url::parse(DEFAULT_BASE_URL).expect("default base url is valid")
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Default for Config {
    fn default() -> Self {
        Config {
            base_url: default_base_url(),
            api_key: ApiKey::default(),
            timeout_secs: default_timeout_secs(),
        }
    }
}
