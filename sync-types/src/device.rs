//! Device metadata sent to the server on registration and sync.

use serde::{Deserialize, Serialize};

use crate::DeviceId;

/// Form factor of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    /// Phone-sized touch device
    Mobile,
    /// Tablet-sized touch device
    Tablet,
    /// Everything else
    Desktop,
}

impl DeviceType {
    /// Classify a user agent string.
    ///
    /// Tablets are checked first because Android tablets also match the
    /// generic `android` token.
    pub fn from_user_agent(user_agent: &str) -> Self {
        let ua = user_agent.to_ascii_lowercase();
        let android = ua.contains("android");
        if ua.contains("ipad") || ua.contains("tablet") || (android && !ua.contains("mobile")) {
            DeviceType::Tablet
        } else if ua.contains("mobi") || ua.contains("iphone") || android {
            DeviceType::Mobile
        } else {
            DeviceType::Desktop
        }
    }
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DeviceType::Mobile => "mobile",
            DeviceType::Tablet => "tablet",
            DeviceType::Desktop => "desktop",
        };
        f.write_str(name)
    }
}

/// Snapshot of one device, as registered with the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    /// Stable client-generated identifier
    pub device_id: DeviceId,
    /// Human-readable name, e.g. "Firefox on Linux"
    pub device_name: String,
    /// Form factor
    pub device_type: DeviceType,
    /// Raw user agent
    pub user_agent: String,
    /// "WIDTHxHEIGHT"
    pub screen_resolution: String,
    /// IANA timezone name
    pub timezone: String,
    /// BCP 47 language tag
    pub language: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_ipad_as_tablet() {
        let ua = "Mozilla/5.0 (iPad; CPU OS 17_0 like Mac OS X) AppleWebKit/605.1.15";
        assert_eq!(DeviceType::from_user_agent(ua), DeviceType::Tablet);
    }

    #[test]
    fn classifies_android_tablet_without_mobile_token() {
        let ua = "Mozilla/5.0 (Linux; Android 13; SM-X700) AppleWebKit/537.36 Chrome/120.0 Safari/537.36";
        assert_eq!(DeviceType::from_user_agent(ua), DeviceType::Tablet);
    }

    #[test]
    fn classifies_phones_as_mobile() {
        let iphone = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) Mobile/15E148";
        let android = "Mozilla/5.0 (Linux; Android 14; Pixel 8) Chrome/120.0 Mobile Safari/537.36";
        assert_eq!(DeviceType::from_user_agent(iphone), DeviceType::Mobile);
        assert_eq!(DeviceType::from_user_agent(android), DeviceType::Mobile);
    }

    #[test]
    fn classifies_everything_else_as_desktop() {
        let ua = "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0";
        assert_eq!(DeviceType::from_user_agent(ua), DeviceType::Desktop);
    }

    #[test]
    fn record_uses_camel_case_keys() {
        let record = DeviceRecord {
            device_id: DeviceId::parse("dev-1").unwrap(),
            device_name: "Firefox on Linux".into(),
            device_type: DeviceType::Desktop,
            user_agent: "ua".into(),
            screen_resolution: "1920x1080".into(),
            timezone: "Europe/Oslo".into(),
            language: "nb-NO".into(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["deviceId"], "dev-1");
        assert_eq!(json["deviceType"], "desktop");
        assert_eq!(json["screenResolution"], "1920x1080");
    }
}
