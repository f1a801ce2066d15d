use std::time::Duration;

use serde::Deserialize;

use crate::config::ConfigError;

fn default_true() -> bool {
    true
}

fn default_poll_interval_secs() -> u64 {
    120
}

/// Which branded portal the account lives on.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Brand {
    #[default]
    Nexia,
    Asair,
    Trane,
}

impl Brand {
    /// Portal root shown as the devices' configuration URL.
    pub fn root_url(self) -> &'static str {
        match self {
            Brand::Nexia => "https://www.mynexia.com",
            Brand::Asair => "https://asairhome.com",
            Brand::Trane => "https://www.tranehome.com",
        }
    }
}

/// Configuration for the Nexia integration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Enable the integration (default: true when section is present)
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub brand: Brand,

    /// Overrides the brand's portal URL
    #[serde(default)]
    pub root_url: Option<String>,

    /// Endpoint serving the house snapshot document
    pub snapshot_url: String,

    /// Seconds between coordinator refreshes (default: 120)
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl Config {
    pub fn root_url(&self) -> &str {
        self.root_url
            .as_deref()
            .unwrap_or_else(|| self.brand.root_url())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "integrations.nexia.poll_interval_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.snapshot_url.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "integrations.nexia.snapshot_url",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brand_selects_root_url() {
        let config: Config = toml::from_str(
            r#"
            brand = "asair"
            snapshot_url = "http://localhost/house.json"
            "#,
        )
        .unwrap();
        assert_eq!(config.brand, Brand::Asair);
        assert_eq!(config.root_url(), "https://asairhome.com");
        assert_eq!(config.brand.to_string(), "asair");
    }

    #[test]
    fn test_explicit_root_url_wins() {
        let config: Config = toml::from_str(
            r#"
            brand = "trane"
            root_url = "https://portal.example"
            snapshot_url = "http://localhost/house.json"
            poll_interval_secs = 30
            "#,
        )
        .unwrap();
        assert_eq!(config.root_url(), "https://portal.example");
        assert_eq!(config.poll_interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let err = crate::config::Config::parse(
            r#"
            [integrations.nexia]
            snapshot_url = "http://localhost/house.json"
            poll_interval_secs = 0
            "#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "integrations.nexia.poll_interval_secs",
                ..
            }
        ));
    }
}
