//! Catalog configuration
//!
//! Plain configuration object for opening a [`Client`](crate::Client) and
//! running the background [`MaintenanceService`](crate::maintenance::MaintenanceService).

use crate::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the metadata catalog
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the durable snapshot (required)
    pub dir: PathBuf,
    /// Emit audit events for catalog mutations
    pub logging_enabled: bool,
    /// Auto-create the `autogen` retention policy on `create_database`
    pub retention_autocreate: bool,
    /// How often the maintenance worker prunes long-deleted shard groups
    pub prune_interval: Duration,
    /// How long a deleted shard group lingers before it may be pruned
    pub prune_window: Duration,
    /// How often the maintenance worker pre-creates upcoming shard groups
    pub precreate_interval: Duration,
    /// How far ahead of now shard groups are pre-created
    pub precreate_advance: Duration,
    /// Term granted to acquired leases
    pub lease_duration: Duration,
    /// Deadline for meta-node reachability probes in `ping`
    pub ping_timeout: Duration,
}

impl Config {
    /// Create a config rooted at the given snapshot directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Self::default()
        }
    }

    /// Validate the configuration before opening a client.
    pub fn validate(&self) -> Result<()> {
        if self.dir.as_os_str().is_empty() {
            return Err(Error::Config("Config.dir must be specified".to_string()));
        }
        if self.prune_window.is_zero() {
            return Err(Error::Config(
                "Config.prune_window must be greater than zero".to_string(),
            ));
        }
        if self.precreate_advance.is_zero() {
            return Err(Error::Config(
                "Config.precreate_advance must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dir: PathBuf::new(),
            logging_enabled: true,
            retention_autocreate: true,
            prune_interval: Duration::from_secs(6 * 60 * 60),
            prune_window: Duration::from_secs(14 * 24 * 60 * 60),
            precreate_interval: Duration::from_secs(10 * 60),
            precreate_advance: Duration::from_secs(30 * 60),
            lease_duration: Duration::from_secs(60),
            ping_timeout: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.logging_enabled);
        assert!(config.retention_autocreate);
        assert_eq!(config.prune_window, Duration::from_secs(14 * 24 * 60 * 60));
        assert_eq!(config.lease_duration, Duration::from_secs(60));
    }

    #[test]
    fn test_validate_requires_dir() {
        let config = Config::default();
        let err = config.validate().expect_err("empty dir should fail");
        assert!(
            err.to_string().contains("Config.dir"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn test_validate_accepts_dir() {
        let config = Config::new("/tmp/catalog");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_prune_window() {
        let mut config = Config::new("/tmp/catalog");
        config.prune_window = Duration::ZERO;
        assert!(config.validate().is_err());
    }
}
