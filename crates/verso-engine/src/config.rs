use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use verso_index::IndexConfig;

use crate::error::{EngineError, EngineResult};
use crate::policy::RebasePolicy;

/// Configuration for the consistency engine.
///
/// Every field has a default, so a TOML file only needs the values it
/// changes:
///
/// ```toml
/// snapshot_interval = 50
///
/// [retry]
/// max_retries = 10
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum parent hops between a commit and its nearest snapshot.
    /// Zero disables snapshots.
    pub snapshot_interval: u64,
    /// Maximum index entries per snapshot segment.
    pub snapshot_segment_size: usize,
    /// Length of the ancestor list recorded in each commit.
    pub ancestors_per_commit: usize,
    /// Hard limit on commits visited by any single history walk.
    pub max_traversal: usize,
    /// Timeout applied to every individual backend call.
    pub call_timeout_ms: u64,
    /// Policy used when a commit request does not name one.
    pub default_rebase_policy: RebasePolicy,
    pub retry: RetryConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            snapshot_interval: 20,
            snapshot_segment_size: 512,
            ancestors_per_commit: 20,
            max_traversal: 10_000,
            call_timeout_ms: 5_000,
            default_rebase_policy: RebasePolicy::default(),
            retry: RetryConfig::default(),
        }
    }
}

/// Bounds on the commit retry loop.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt before a conflict or transient
    /// failure is surfaced.
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Fraction of each delay randomized away, in `[0, 1]`.
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 8,
            backoff_base_ms: 25,
            backoff_max_ms: 2_000,
            jitter: 0.5,
        }
    }
}

impl EngineConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(s: &str) -> EngineResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> EngineResult<()> {
        let fail = |msg: &str| Err(EngineError::Config(msg.to_string()));
        if self.snapshot_segment_size == 0 {
            return fail("snapshot_segment_size must be at least 1");
        }
        if self.ancestors_per_commit == 0 {
            return fail("ancestors_per_commit must be at least 1");
        }
        if self.max_traversal == 0 {
            return fail("max_traversal must be at least 1");
        }
        if self.snapshot_interval > self.max_traversal as u64 {
            return fail("snapshot_interval must not exceed max_traversal");
        }
        if self.call_timeout_ms == 0 {
            return fail("call_timeout_ms must be at least 1");
        }
        if self.retry.backoff_base_ms > self.retry.backoff_max_ms {
            return fail("retry.backoff_base_ms must not exceed retry.backoff_max_ms");
        }
        if !(0.0..=1.0).contains(&self.retry.jitter) {
            return fail("retry.jitter must be within [0, 1]");
        }
        Ok(())
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// The slice of this configuration the index manager uses.
    pub fn index_config(&self) -> IndexConfig {
        IndexConfig {
            snapshot_interval: self.snapshot_interval,
            segment_size: self.snapshot_segment_size,
            max_traversal: self.max_traversal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let c = EngineConfig::default();
        assert!(c.validate().is_ok());
        assert_eq!(c.snapshot_interval, 20);
        assert_eq!(c.default_rebase_policy, RebasePolicy::RebaseDisjoint);
        assert_eq!(c.call_timeout(), Duration::from_secs(5));
        assert_eq!(c.index_config().segment_size, 512);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = EngineConfig::from_toml_str(
            r#"
            snapshot_interval = 50
            default_rebase_policy = "abort_on_move"

            [retry]
            max_retries = 3
            "#,
        )
        .unwrap();
        assert_eq!(c.snapshot_interval, 50);
        assert_eq!(c.default_rebase_policy, RebasePolicy::AbortOnMove);
        assert_eq!(c.retry.max_retries, 3);
        assert_eq!(c.retry.backoff_base_ms, RetryConfig::default().backoff_base_ms);
        assert_eq!(c.ancestors_per_commit, 20);
    }

    #[test]
    fn rejects_invalid_values() {
        for doc in [
            "ancestors_per_commit = 0",
            "snapshot_segment_size = 0",
            "[retry]\njitter = 1.5",
            "[retry]\nbackoff_base_ms = 10\nbackoff_max_ms = 5",
            "max_traversal = 10\nsnapshot_interval = 11",
        ] {
            assert!(
                matches!(EngineConfig::from_toml_str(doc), Err(EngineError::Config(_))),
                "{doc}"
            );
        }
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(matches!(
            EngineConfig::from_toml_str("snapshot_interval = \"many\""),
            Err(EngineError::Config(_))
        ));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "call_timeout_ms = 250\nmax_traversal = 500").unwrap();
        let c = EngineConfig::load(file.path()).unwrap();
        assert_eq!(c.call_timeout(), Duration::from_millis(250));
        assert_eq!(c.max_traversal, 500);
    }

    #[test]
    fn load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            EngineConfig::load(dir.path().join("absent.toml")),
            Err(EngineError::Config(_))
        ));
    }
}
