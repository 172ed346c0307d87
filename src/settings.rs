//! Settings store: the reporting credential and the analytics opt-in
//!
//! Seeded from configuration, then updated by `setting_changed` messages
//! from the host. [`Settings::apply`] returns the change it made so the
//! daemon can react to it on the event loop.

use serde_json::Value;

use crate::error::{Error, Result};
use crate::util;

/// Setting name of the reporting credential
pub const WAKATIME_API_KEY: &str = "wakatimeAPIKey";

/// Setting name of the analytics opt-in
pub const ANALYTICS: &str = "analytics";

/// A setting that changed value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingChange {
    ApiKey,
    Analytics(bool),
}

impl SettingChange {
    /// Setting name this change is keyed by
    pub fn key(&self) -> &'static str {
        match self {
            SettingChange::ApiKey => WAKATIME_API_KEY,
            SettingChange::Analytics(_) => ANALYTICS,
        }
    }
}

/// Current setting values
#[derive(Debug, Clone)]
pub struct Settings {
    api_key: String,
    analytics_enabled: bool,
}

impl Settings {
    pub fn new(api_key: impl Into<String>, analytics_enabled: bool) -> Self {
        Self {
            api_key: api_key.into(),
            analytics_enabled,
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn analytics_enabled(&self) -> bool {
        self.analytics_enabled
    }

    /// Whether the credential has the canonical shape
    pub fn has_valid_api_key(&self) -> bool {
        util::valid_api_key(&self.api_key)
    }

    /// Apply a change from the host; `None` when the key is unknown or the value did not change
    pub fn apply(&mut self, key: &str, value: &Value) -> Result<Option<SettingChange>> {
        match key {
            WAKATIME_API_KEY => {
                let new_key = value.as_str().ok_or_else(|| Error::HostMessage {
                    message: format!("setting '{}' expects a string", key),
                })?;
                if new_key == self.api_key {
                    return Ok(None);
                }
                self.api_key = new_key.to_string();
                Ok(Some(SettingChange::ApiKey))
            }
            ANALYTICS => {
                let enabled = value.as_bool().ok_or_else(|| Error::HostMessage {
                    message: format!("setting '{}' expects a boolean", key),
                })?;
                if enabled == self.analytics_enabled {
                    return Ok(None);
                }
                self.analytics_enabled = enabled;
                Ok(Some(SettingChange::Analytics(enabled)))
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_apply_api_key() {
        let mut settings = Settings::new("", true);
        assert!(!settings.has_valid_api_key());

        let change = settings
            .apply(WAKATIME_API_KEY, &json!("12345678-1234-4123-8123-123456789012"))
            .unwrap();
        assert_eq!(change, Some(SettingChange::ApiKey));
        assert_eq!(change.unwrap().key(), "wakatimeAPIKey");
        assert!(settings.has_valid_api_key());

        // same value again is not a change
        let change = settings
            .apply(WAKATIME_API_KEY, &json!("12345678-1234-4123-8123-123456789012"))
            .unwrap();
        assert!(change.is_none());
    }

    #[test]
    fn test_apply_analytics() {
        let mut settings = Settings::new("", true);
        let change = settings.apply(ANALYTICS, &json!(false)).unwrap();
        assert_eq!(change, Some(SettingChange::Analytics(false)));
        assert!(!settings.analytics_enabled());
    }

    #[test]
    fn test_apply_wrong_type() {
        let mut settings = Settings::new("", true);
        assert!(settings.apply(ANALYTICS, &json!("yes")).is_err());
        assert!(settings.apply(WAKATIME_API_KEY, &json!(42)).is_err());
        assert!(settings.analytics_enabled());
    }

    #[test]
    fn test_apply_unknown_key() {
        let mut settings = Settings::new("", true);
        assert!(settings.apply("theme", &json!("dark")).unwrap().is_none());
    }
}
