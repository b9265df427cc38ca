use crm::config::{ApiKey, Config as CrmConfig};
use gateway::config::{Config as GatewayConfig, ValidationError};
use lifecycle::config::Config as LifecycleConfig;
use serde::Deserialize;
use std::fs::File;
use std::path::Path;

pub const API_KEY_ENV: &str = "HUBSPOT_API_KEY";
pub const PORT_ENV: &str = "PORT";

#[derive(Deserialize, Debug)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
}

#[derive(Deserialize, Debug)]
pub struct LoggingConfig {
    pub sentry_dsn: String,
}

#[derive(Deserialize, Debug, Default)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub crm: CrmConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    pub metrics: Option<MetricsConfig>,
    pub logging: Option<LoggingConfig>,
}

impl Config {
    /// Reads the file, applies the process environment and validates the result.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let data = serde_yaml::from_reader(file)?;

        Ok(data)
    }

    /// Environment values win over the file. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(key) = non_empty(API_KEY_ENV) {
            self.crm.api_key = ApiKey::new(key.trim());
        }
        if let Some(port) = non_empty(PORT_ENV) {
            self.gateway.listener.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidPortEnv(port))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.gateway.validate()?;

        if self.crm.api_key.is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        if self.lifecycle.recheck_delay_secs == 0 {
            return Err(ConfigError::ZeroRecheckDelay);
        }
        if let Some(logging) = &self.logging {
            logging
                .sentry_dsn
                .parse::<sentry::types::Dsn>()
                .map_err(|e| ConfigError::InvalidSentryDsn(e.to_string()))?;
        }
        Ok(())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("invalid gateway config: {0}")]
    Gateway(#[from] ValidationError),
    #[error("PORT is not a valid port: {0}")]
    InvalidPortEnv(String),
    #[error("CRM API key is missing, set crm.api_key or HUBSPOT_API_KEY")]
    MissingApiKey,
    #[error("lifecycle.recheck_delay_secs cannot be 0")]
    ZeroRecheckDelay,
    #[error("invalid sentry dsn: {0}")]
    InvalidSentryDsn(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use std::time::Duration;

    fn write_tmp_file(s: &str) -> tempfile::NamedTempFile {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        write!(tmp, "{}", s).expect("write yaml");

        tmp
    }

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn full_config() {
        let yaml = r#"
            gateway:
                listener:
                    host: 0.0.0.0
                    port: 8080
                admin_listener:
                    host: 127.0.0.1
                    port: 8081
                cors_origin: https://shop.example.com
            crm:
                base_url: http://hubspot.internal:9000
                api_key: file-key
                timeout_secs: 3
            lifecycle:
                recheck_delay_secs: 300
            metrics:
                statsd_host: 127.0.0.1
                statsd_port: 8125
            logging:
                sentry_dsn: https://public@sentry.example.com/1
            "#;
        let tmp = write_tmp_file(yaml);
        let config = Config::from_file(tmp.path()).expect("load config");
        config.validate().expect("valid config");

        assert_eq!(config.gateway.listener.port, 8080);
        assert_eq!(config.gateway.cors_origin, "https://shop.example.com");
        assert_eq!(config.crm.base_url.as_str(), "http://hubspot.internal:9000/");
        assert_eq!(config.crm.api_key.expose(), "file-key");
        assert_eq!(config.lifecycle.recheck_delay(), Duration::from_secs(300));
        assert_eq!(config.metrics.expect("metrics").statsd_port, 8125);
        assert!(config.logging.is_some());
    }

    #[test]
    fn defaults_with_key_from_env() {
        let tmp = write_tmp_file("lifecycle: {}\n");
        let mut config = Config::from_file(tmp.path()).expect("load config");
        assert!(matches!(config.validate(), Err(ConfigError::MissingApiKey)));

        config
            .apply_env(env(&[(API_KEY_ENV, " env-key "), (PORT_ENV, "9999")]))
            .unwrap();
        config.validate().expect("valid config");

        assert_eq!(config.crm.api_key.expose(), "env-key");
        assert_eq!(config.gateway.listener.port, 9999);
        assert_eq!(config.gateway.admin_listener.port, 10001);
        assert_eq!(config.crm.base_url.as_str(), "https://api.hubapi.com/");
        assert_eq!(config.lifecycle.recheck_delay_secs, 3600);
        assert!(config.metrics.is_none());
    }

    #[test]
    fn env_overrides_file() {
        let tmp = write_tmp_file("crm:\n    api_key: file-key\n");
        let mut config = Config::from_file(tmp.path()).expect("load config");

        config.apply_env(env(&[(API_KEY_ENV, "")])).unwrap();
        assert_eq!(config.crm.api_key.expose(), "file-key");

        config.apply_env(env(&[(API_KEY_ENV, "env-key")])).unwrap();
        assert_eq!(config.crm.api_key.expose(), "env-key");

        let result = config.apply_env(env(&[(PORT_ENV, "http")]));
        assert!(matches!(result, Err(ConfigError::InvalidPortEnv(port)) if port == "http"));
    }

    #[test]
    fn validation_errors() {
        let base = |extra: &str| {
            let tmp = write_tmp_file(&format!("crm:\n    api_key: key\n{extra}"));
            Config::from_file(tmp.path()).expect("load config").validate()
        };

        assert!(base("").is_ok());
        assert!(matches!(
            base("lifecycle:\n    recheck_delay_secs: 0\n"),
            Err(ConfigError::ZeroRecheckDelay)
        ));
        assert!(matches!(
            base("gateway:\n    listener:\n        host: 0.0.0.0\n        port: 0\n"),
            Err(ConfigError::Gateway(ValidationError::InvalidPort))
        ));
        assert!(matches!(
            base("gateway:\n    cors_origin: \"\"\n"),
            Err(ConfigError::Gateway(ValidationError::EmptyCorsOrigin))
        ));
        assert!(matches!(
            base("logging:\n    sentry_dsn: not-a-dsn\n"),
            Err(ConfigError::InvalidSentryDsn(_))
        ));
    }

    #[test]
    fn missing_file_and_bad_yaml() {
        let result = Config::from_file(Path::new("/nonexistent/relay.yaml"));
        assert!(matches!(result, Err(ConfigError::LoadError(_))));

        let tmp = write_tmp_file("gateway: [1, 2");
        let result = Config::from_file(tmp.path());
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }
}
