use axum::http::HeaderValue;
use serde::Deserialize;
use thiserror::Error;

const DEFAULT_CORS_ORIGIN: &str = "https://snatchandglow.co.uk";

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("CORS origin cannot be empty")]
    EmptyCorsOrigin,

    #[error("CORS origin is not a valid header value: {0}")]
    InvalidCorsOrigin(String),
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

fn default_listener() -> Listener {
    Listener {
        host: "0.0.0.0".into(),
        port: 10000,
    }
}

fn default_admin_listener() -> Listener {
    Listener {
        host: "127.0.0.1".into(),
        port: 10001,
    }
}

fn default_cors_origin() -> String {
    DEFAULT_CORS_ORIGIN.into()
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Storefront-facing listener
    #[serde(default = "default_listener")]
    pub listener: Listener,
    /// Listener for the health and readiness probes
    #[serde(default = "default_admin_listener")]
    pub admin_listener: Listener,
    /// The only origin browsers may call the gateway from
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listener: default_listener(),
            admin_listener: default_admin_listener(),
            cors_origin: default_cors_origin(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;
        self.cors_origin_header()?;
        Ok(())
    }

    pub fn cors_origin_header(&self) -> Result<HeaderValue, ValidationError> {
        let origin = self.cors_origin.trim();
        if origin.is_empty() {
            return Err(ValidationError::EmptyCorsOrigin);
        }
        // Exactly one origin is allowed, never any.
        if origin == "*" {
            return Err(ValidationError::InvalidCorsOrigin(origin.to_string()));
        }
        HeaderValue::from_str(origin)
            .map_err(|_| ValidationError::InvalidCorsOrigin(origin.to_string()))
    }
}
