//! Settings type definitions.
//!
//! Every struct implements [`Default`] with production values and is marked
//! `#[serde(default)]`, so partial JSON fills missing fields from defaults.

use cartsync_core::BackoffPolicy;
use serde::{Deserialize, Serialize};

/// Root settings.
///
/// ```json
/// {
///   "domain": "amazon.co.uk",
///   "endpoint": "http://localhost:9222",
///   "interval_minutes": 30,
///   "reconnect": { "max_attempts": 5 }
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Remote site/region, e.g. `amazon.com` or `amazon.de`.
    pub domain: String,
    /// Base URL of the browser debugging endpoint.
    pub endpoint: String,
    /// Timer period in minutes.
    pub interval_minutes: u64,
    /// Path of the list page on `domain`; also the target match pattern.
    pub list_path: String,
    /// Attach to any open page and navigate it when no target matches.
    pub adopt_any_page: bool,
    /// Local list store file.
    pub store_path: String,
    /// Remote call bounds.
    pub remote: RemoteSettings,
    /// Reconnect backoff.
    pub reconnect: BackoffPolicy,
    /// Logging.
    pub logging: LoggingSettings,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            domain: "amazon.com".to_string(),
            endpoint: "http://localhost:9222".to_string(),
            interval_minutes: 60,
            list_path: "/alexaquantum/sp/alexaShoppingList".to_string(),
            adopt_any_page: false,
            store_path: default_store_path(),
            remote: RemoteSettings::default(),
            reconnect: BackoffPolicy::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl SyncSettings {
    /// `domain` without scheme, `www.` prefix or trailing slash.
    pub fn bare_domain(&self) -> String {
        let d = self.domain.trim();
        let d = d
            .strip_prefix("https://")
            .or_else(|| d.strip_prefix("http://"))
            .unwrap_or(d);
        let d = d.strip_prefix("www.").unwrap_or(d);
        d.trim_end_matches('/').to_string()
    }

    /// Full URL of the list page.
    pub fn list_url(&self) -> String {
        format!("https://{}{}", self.bare_domain(), self.list_path)
    }

    /// `endpoint` without trailing slash.
    pub fn endpoint_base(&self) -> &str {
        self.endpoint.trim_end_matches('/')
    }
}

/// Per-call bounds for remote operations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSettings {
    /// HTTP discovery timeout.
    pub discovery_timeout_ms: u64,
    /// Timeout for a single control-channel command.
    pub command_timeout_ms: u64,
    /// Wait after navigating before the page is used.
    pub navigate_settle_ms: u64,
    /// Reads after an add before it counts as unconfirmed.
    pub confirm_attempts: u32,
    /// Pause between confirmation reads.
    pub confirm_interval_ms: u64,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            discovery_timeout_ms: 5_000,
            command_timeout_ms: 10_000,
            navigate_settle_ms: 2_000,
            confirm_attempts: 5,
            confirm_interval_ms: 400,
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

fn default_store_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    format!("{home}/.cartsync/shopping_list.json")
}
