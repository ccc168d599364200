//! Hub endpoint configuration.

use serde::{Deserialize, Serialize};

/// Hub endpoint locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubsConfig {
    /// WebSocket base URL (`ws://` or `wss://`).
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Path of the notifications hub.
    #[serde(default = "default_notifications_path")]
    pub notifications_path: String,
    /// Path of the office-hours hub.
    #[serde(default = "default_office_hours_path")]
    pub office_hours_path: String,
}

impl HubsConfig {
    /// Full URL for a hub path.
    pub fn url_for(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl Default for HubsConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            notifications_path: default_notifications_path(),
            office_hours_path: default_office_hours_path(),
        }
    }
}

fn default_base_url() -> String {
    "ws://localhost:5000".to_string()
}

fn default_notifications_path() -> String {
    "/hubs/notifications".to_string()
}

fn default_office_hours_path() -> String {
    "/hubs/office-hours".to_string()
}
