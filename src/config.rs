use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Largest page Mastodon-compatible servers will return.
pub const MAX_PAGE_SIZE: u32 = 40;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Used when `FEDI_INSTANCE` is not set.
    #[serde(default)]
    pub instance_url: Option<String>,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_stale_time_secs")]
    pub stale_time_secs: u64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

fn default_page_size() -> u32 {
    20
}

fn default_stale_time_secs() -> u64 {
    60
}

fn default_poll_interval_secs() -> u64 {
    3
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            instance_url: None,
            page_size: default_page_size(),
            stale_time_secs: default_stale_time_secs(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

impl AppConfig {
    pub fn page_size(&self) -> u32 {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }

    pub fn stale_time(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.stale_time_secs).unwrap_or(i64::MAX))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".config/fedicache/config.toml"))
}

pub fn load_config() -> AppConfig {
    let Some(path) = config_path() else {
        return AppConfig::default();
    };

    let Ok(contents) = fs::read_to_string(&path) else {
        return AppConfig::default();
    };

    parse_config(&contents)
}

fn parse_config(contents: &str) -> AppConfig {
    toml::from_str(contents).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "malformed config, using defaults");
        AppConfig::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config = parse_config("instance_url = \"https://example.social\"\n");
        assert_eq!(config.instance_url.as_deref(), Some("https://example.social"));
        assert_eq!(config.page_size, 20);
        assert_eq!(config.stale_time_secs, 60);
        assert_eq!(config.poll_interval(), Duration::from_secs(3));
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let config = parse_config("page_size = \"lots\"");
        assert_eq!(config.page_size, 20);
    }

    #[test]
    fn page_size_is_clamped() {
        let config = AppConfig {
            page_size: 500,
            ..Default::default()
        };
        assert_eq!(config.page_size(), MAX_PAGE_SIZE);
        let config = AppConfig {
            page_size: 0,
            ..Default::default()
        };
        assert_eq!(config.page_size(), 1);
    }
}
