use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::service::SessionOptions;
use crate::transport::{TransportConfig, DEFAULT_POLL_INTERVAL};

const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_WS_URL: &str = "ws://127.0.0.1:8000";

/// Runtime settings, read from the environment (and `.env` if present).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_url: String,
    pub ws_url: String,
    pub poll_interval: Duration,
    pub max_open_polls: Option<u32>,
    pub reconnect_after_file: bool,
    /// Directory of the login snapshot; `None` uses the user cache dir.
    pub cache_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_open_polls: None,
            reconnect_after_file: true,
            cache_dir: None,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; unparsable values keep defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            api_url: lookup("BASED_API_URL").unwrap_or(defaults.api_url),
            ws_url: lookup("BASED_WS_URL").unwrap_or(defaults.ws_url),
            poll_interval: parsed(&lookup, "BASED_POLL_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            max_open_polls: parsed(&lookup, "BASED_MAX_OPEN_POLLS"),
            reconnect_after_file: parsed(&lookup, "BASED_RECONNECT_AFTER_FILE")
                .unwrap_or(defaults.reconnect_after_file),
            cache_dir: lookup("BASED_CACHE_DIR").map(PathBuf::from),
        }
    }

    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            ws_base: self.ws_url.clone(),
            poll_interval: self.poll_interval,
            max_open_polls: self.max_open_polls,
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions { reconnect_after_file: self.reconnect_after_file }
    }
}

fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring unparsable setting");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults_without_environment() {
        let config = ClientConfig::from_lookup(|_| None);
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.max_open_polls, None);
        assert!(config.reconnect_after_file);
    }

    #[test]
    fn overrides_and_bad_values() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("BASED_WS_URL", "wss://chat.example"),
            ("BASED_POLL_INTERVAL_MS", "250"),
            ("BASED_MAX_OPEN_POLLS", "many"),
            ("BASED_RECONNECT_AFTER_FILE", "false"),
        ]);
        let config = ClientConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.transport().endpoint("c1"), "wss://chat.example/ws/c1");
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.max_open_polls, None);
        assert!(!config.session_options().reconnect_after_file);
    }
}
