use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GcError, GcResult};

/// Configuration for the garbage collector.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GcConfig {
    /// Commits written or pinned more recently than this are never
    /// collected, so commits still being published survive.
    pub grace_period_secs: u64,
    /// Keys requested per backend scan.
    pub scan_page_size: usize,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: 24 * 60 * 60,
            scan_page_size: 500,
        }
    }
}

impl GcConfig {
    pub fn from_toml_str(s: &str) -> GcResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| GcError::Config(e.to_string()))?;
        if config.scan_page_size == 0 {
            return Err(GcError::Config("scan_page_size must be at least 1".into()));
        }
        Ok(config)
    }

    /// Parameters for a run starting at `now`.
    pub fn params_at(&self, now: DateTime<Utc>) -> GcParams {
        GcParams {
            now,
            grace_period: Duration::from_secs(self.grace_period_secs),
        }
    }
}

/// Parameters of one collection run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GcParams {
    pub now: DateTime<Utc>,
    pub grace_period: Duration,
}

impl GcParams {
    pub fn new(now: DateTime<Utc>, grace_period: Duration) -> Self {
        Self { now, grace_period }
    }

    /// Commits stamped after this instant, in milliseconds since the epoch,
    /// are inside the grace period.
    pub fn cutoff_ms(&self) -> i64 {
        let grace = i64::try_from(self.grace_period.as_millis()).unwrap_or(i64::MAX);
        self.now.timestamp_millis().saturating_sub(grace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn default_config() {
        let c = GcConfig::default();
        assert_eq!(c.grace_period_secs, 86_400);
        assert_eq!(c.scan_page_size, 500);
    }

    #[test]
    fn parse_toml() {
        let c = GcConfig::from_toml_str("grace_period_secs = 60").unwrap();
        assert_eq!(c.grace_period_secs, 60);
        assert_eq!(c.scan_page_size, 500);
        assert!(GcConfig::from_toml_str("scan_page_size = 0").is_err());
    }

    #[test]
    fn cutoff() {
        let now = Utc.timestamp_millis_opt(100_000).unwrap();
        let params = GcConfig {
            grace_period_secs: 30,
            ..GcConfig::default()
        }
        .params_at(now);
        assert_eq!(params.cutoff_ms(), 70_000);
        let forever = GcParams::new(now, Duration::MAX);
        assert_eq!(forever.cutoff_ms(), 100_000 - i64::MAX);
    }
}
