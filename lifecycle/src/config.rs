use serde::Deserialize;
use std::time::Duration;

const DEFAULT_RECHECK_DELAY_SECS: u64 = 60 * 60;

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct Config {
    /// Delay between registering a prospect and re-checking its purchase status.
    #[serde(default = "default_recheck_delay_secs")]
    pub recheck_delay_secs: u64,
}

fn default_recheck_delay_secs() -> u64 {
    DEFAULT_RECHECK_DELAY_SECS
}

impl Default for Config {
    fn default() -> Self {
        Config {
            recheck_delay_secs: default_recheck_delay_secs(),
        }
    }
}

impl Config {
    pub fn recheck_delay(&self) -> Duration {
        Duration::from_secs(self.recheck_delay_secs)
    }
}
