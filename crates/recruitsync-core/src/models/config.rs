//! System configuration model

use serde::{Deserialize, Serialize};

/// Fixed id of the config singleton row, both locally and remotely.
pub const CONFIG_SINGLETON_ID: &str = "config";

/// Portal-wide configuration, synchronized as a singleton.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemConfig {
    /// Organization display name
    pub org_name: String,
    /// IANA timezone used for booking display
    pub timezone: String,
    /// How far ahead bookings may be scheduled, in days
    pub booking_window_days: u32,
    /// Whether broadcast messaging is enabled org-wide
    pub broadcast_enabled: bool,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            org_name: "RecruitSync".to_string(),
            timezone: "UTC".to_string(),
            booking_window_days: 30,
            broadcast_enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_default_is_broadcast_enabled() {
        let config = SystemConfig::default();
        assert!(config.broadcast_enabled);
        assert_eq!(config.booking_window_days, 30);
    }

    #[test]
    fn config_serializes_camel_case() {
        let json = serde_json::to_value(SystemConfig::default()).unwrap();
        assert!(json.get("orgName").is_some());
        assert!(json.get("bookingWindowDays").is_some());
    }
}
