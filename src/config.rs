//! On-disk configuration for the `image-gcd` binary. The core itself
//! never parses a config file; it only ever sees a validated
//! [`ImageGcPolicy`] plus a handful of paths/periods.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::controller::PeriodicConfig;
use crate::policy::ImageGcPolicy;

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Plain,
    Json,
}

impl Default for LogFormat {
    fn default() -> Self {
        LogFormat::Plain
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GcConfig {
    /// Mount point of the image filesystem, passed to `statvfs`.
    pub image_fs_path: PathBuf,

    pub policy: ImageGcPolicy,

    #[serde(with = "humantime_serde", default = "default_detect_period")]
    pub detect_period: Duration,

    #[serde(with = "humantime_serde", default = "default_collect_period")]
    pub collect_period: Duration,

    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_detect_period() -> Duration {
    Duration::from_secs(5)
}

fn default_collect_period() -> Duration {
    Duration::from_secs(60)
}

impl GcConfig {
    pub fn periodic_config(&self) -> PeriodicConfig {
        PeriodicConfig {
            detect_period: self.detect_period,
            collect_period: self.collect_period,
        }
    }

    /// Parse a config file's contents via `toml_edit`'s serde integration
    /// rather than hand-rolled field extraction.
    pub fn parse(contents: &str) -> anyhow::Result<Self> {
        let config = toml_edit::de::from_str(contents)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let toml = r#"
            image_fs_path = "/var/lib/containers"

            [policy]
            high_threshold_percent = 90
            low_threshold_percent = 80
            min_age = "2m"
            max_age = "0s"
        "#;
        let config = GcConfig::parse(toml).unwrap();
        assert_eq!(config.policy.high_threshold_percent, 90);
        assert_eq!(config.detect_period, default_detect_period());
        assert_eq!(config.policy.min_age, Duration::from_secs(120));
    }
}
