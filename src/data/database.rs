//! Databases, retention policies, continuous queries, and subscriptions

use crate::data::shard::ShardGroupInfo;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Nanoseconds per hour
pub const NANOS_PER_HOUR: i64 = 3_600_000_000_000;
/// Nanoseconds per day
pub const NANOS_PER_DAY: i64 = 24 * NANOS_PER_HOUR;
/// Nanoseconds per week
pub const NANOS_PER_WEEK: i64 = 7 * NANOS_PER_DAY;

/// Smallest non-infinite retention duration
pub const MIN_RETENTION_POLICY_DURATION: i64 = NANOS_PER_HOUR;

/// Name of the retention policy auto-created with a database
pub const DEFAULT_RETENTION_POLICY_NAME: &str = "autogen";

/// Default shard group duration for a retention duration, by table:
/// infinite => 7d, under 2d => 1h, under 180d => 1d, otherwise 7d.
pub fn shard_group_duration_for(duration: i64) -> i64 {
    if duration == 0 || duration >= 180 * NANOS_PER_DAY {
        NANOS_PER_WEEK
    } else if duration >= 2 * NANOS_PER_DAY {
        NANOS_PER_DAY
    } else {
        NANOS_PER_HOUR
    }
}

/// Normalize a requested shard group duration: zero derives from the
/// retention duration, sub-minimum positive values are raised to the
/// minimum. Negative values pass through and fail duration validation.
pub fn normalized_shard_group_duration(sgd: i64, duration: i64) -> i64 {
    if sgd == 0 {
        shard_group_duration_for(duration)
    } else if sgd > 0 && sgd < MIN_RETENTION_POLICY_DURATION {
        MIN_RETENTION_POLICY_DURATION
    } else {
        sgd
    }
}

/// Validate the duration pair of a retention policy.
///
/// A finite retention duration must be a whole multiple of the shard group
/// duration, which in turn may not exceed it.
pub fn validate_durations(duration: i64, shard_group_duration: i64) -> Result<()> {
    if shard_group_duration <= 0 {
        return Err(Error::IncompatibleDurations);
    }
    if duration > 0 && (shard_group_duration > duration || duration % shard_group_duration != 0) {
        return Err(Error::IncompatibleDurations);
    }
    Ok(())
}

/// Fan-out mode of a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionMode {
    /// Every destination receives every write
    #[serde(rename = "ALL")]
    All,
    /// Each write goes to one destination
    #[serde(rename = "ANY")]
    Any,
}

impl fmt::Display for SubscriptionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionMode::All => write!(f, "ALL"),
            SubscriptionMode::Any => write!(f, "ANY"),
        }
    }
}

/// A write fan-out registration on a retention policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionInfo {
    /// Subscription name, unique within the retention policy
    pub name: String,
    /// Fan-out mode
    pub mode: SubscriptionMode,
    /// Destination URLs (validated at creation)
    pub destinations: Vec<String>,
}

/// A registered continuous query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuousQueryInfo {
    /// Query name, unique within the database
    pub name: String,
    /// Opaque query text
    pub query: String,
}

/// A retention policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicyInfo {
    /// Policy name, unique within the database
    pub name: String,
    /// Replication factor for new shard groups
    pub replica_n: usize,
    /// How long data is kept, in nanos; `0` keeps it forever
    pub duration: i64,
    /// Width of each shard group window, in nanos
    pub shard_group_duration: i64,
    /// Shard groups ordered by `start_time`
    #[serde(default)]
    pub shard_groups: Vec<ShardGroupInfo>,
    /// Subscriptions ordered by creation
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionInfo>,
}

impl RetentionPolicyInfo {
    /// Create a policy with the given name and defaults for the rest.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            replica_n: 1,
            duration: 0,
            shard_group_duration: shard_group_duration_for(0),
            shard_groups: Vec::new(),
            subscriptions: Vec::new(),
        }
    }

    /// The group that routes writes stamped `t`, if any.
    pub fn shard_group_by_timestamp(&self, t: i64) -> Option<&ShardGroupInfo> {
        self.shard_groups.iter().find(|sg| sg.accepts_writes_at(t))
    }

    /// Named subscription, if registered.
    pub fn subscription(&self, name: &str) -> Option<&SubscriptionInfo> {
        self.subscriptions.iter().find(|s| s.name == name)
    }
}

/// Requested parameters for creating a retention policy
///
/// `None` fields fall back to defaults on creation and act as wildcards
/// when matching an existing policy. A zero `shard_group_duration` derives
/// the width from the retention duration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionPolicySpec {
    /// Policy name
    pub name: String,
    /// Replication factor; defaults to 1
    pub replica_n: Option<usize>,
    /// Retention duration in nanos; defaults to infinite (0)
    pub duration: Option<i64>,
    /// Shard group duration in nanos; 0 derives the default
    pub shard_group_duration: i64,
}

impl RetentionPolicySpec {
    /// Materialize the spec into a policy with defaults applied.
    pub fn new_retention_policy_info(&self) -> RetentionPolicyInfo {
        let duration = self.duration.unwrap_or(0);
        RetentionPolicyInfo {
            name: self.name.clone(),
            replica_n: self.replica_n.unwrap_or(1),
            duration,
            shard_group_duration: normalized_shard_group_duration(
                self.shard_group_duration,
                duration,
            ),
            shard_groups: Vec::new(),
            subscriptions: Vec::new(),
        }
    }

    /// Whether an existing policy satisfies this spec, treating `None`
    /// fields as wildcards and normalizing the shard group duration.
    pub fn matches(&self, rpi: &RetentionPolicyInfo) -> bool {
        if !self.name.is_empty() && self.name != rpi.name {
            return false;
        }
        if let Some(duration) = self.duration {
            if duration != rpi.duration {
                return false;
            }
        }
        if let Some(replica_n) = self.replica_n {
            if replica_n != rpi.replica_n {
                return false;
            }
        }
        normalized_shard_group_duration(self.shard_group_duration, rpi.duration)
            == rpi.shard_group_duration
    }
}

/// Partial update of a retention policy; `None` fields are untouched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionPolicyUpdate {
    /// New policy name
    pub name: Option<String>,
    /// New retention duration in nanos
    pub duration: Option<i64>,
    /// New replication factor
    pub replica_n: Option<usize>,
    /// New shard group duration in nanos
    pub shard_group_duration: Option<i64>,
}

/// A database
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    /// Database name, unique across the catalog
    pub name: String,
    /// Name of the default retention policy; empty until one is created
    #[serde(default)]
    pub default_retention_policy: String,
    /// Retention policies ordered by creation
    #[serde(default)]
    pub retention_policies: Vec<RetentionPolicyInfo>,
    /// Continuous queries ordered by creation
    #[serde(default)]
    pub continuous_queries: Vec<ContinuousQueryInfo>,
}

impl DatabaseInfo {
    /// Create an empty database record.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Named retention policy, if present.
    pub fn retention_policy(&self, name: &str) -> Option<&RetentionPolicyInfo> {
        self.retention_policies.iter().find(|rp| rp.name == name)
    }

    pub(crate) fn retention_policy_mut(&mut self, name: &str) -> Option<&mut RetentionPolicyInfo> {
        self.retention_policies
            .iter_mut()
            .find(|rp| rp.name == name)
    }

    /// Named continuous query, if present.
    pub fn continuous_query(&self, name: &str) -> Option<&ContinuousQueryInfo> {
        self.continuous_queries.iter().find(|cq| cq.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_group_duration_table() {
        assert_eq!(shard_group_duration_for(0), NANOS_PER_WEEK);
        assert_eq!(shard_group_duration_for(NANOS_PER_DAY), NANOS_PER_HOUR);
        assert_eq!(shard_group_duration_for(2 * NANOS_PER_DAY - 1), NANOS_PER_HOUR);
        assert_eq!(shard_group_duration_for(2 * NANOS_PER_DAY), NANOS_PER_DAY);
        assert_eq!(shard_group_duration_for(179 * NANOS_PER_DAY), NANOS_PER_DAY);
        assert_eq!(shard_group_duration_for(180 * NANOS_PER_DAY), NANOS_PER_WEEK);
        assert_eq!(shard_group_duration_for(365 * NANOS_PER_DAY), NANOS_PER_WEEK);
    }

    #[test]
    fn test_normalized_shard_group_duration() {
        assert_eq!(normalized_shard_group_duration(0, 0), NANOS_PER_WEEK);
        assert_eq!(
            normalized_shard_group_duration(0, NANOS_PER_DAY),
            NANOS_PER_HOUR
        );
        // Explicit widths pass through; sub-minimum widths are raised.
        assert_eq!(
            normalized_shard_group_duration(2 * NANOS_PER_HOUR, 0),
            2 * NANOS_PER_HOUR
        );
        assert_eq!(
            normalized_shard_group_duration(NANOS_PER_HOUR / 2, 0),
            NANOS_PER_HOUR
        );
        // Negative widths are left for validation to reject.
        assert_eq!(normalized_shard_group_duration(-1, 0), -1);
    }

    #[test]
    fn test_validate_durations() {
        // Infinite retention accepts any positive width.
        assert!(validate_durations(0, NANOS_PER_WEEK).is_ok());
        // Equal durations are accepted.
        assert!(validate_durations(2 * NANOS_PER_HOUR, 2 * NANOS_PER_HOUR).is_ok());
        // Width must divide evenly into a finite retention duration.
        assert!(validate_durations(4 * NANOS_PER_HOUR, 2 * NANOS_PER_HOUR).is_ok());
        assert!(matches!(
            validate_durations(3 * NANOS_PER_HOUR, 2 * NANOS_PER_HOUR),
            Err(Error::IncompatibleDurations)
        ));
        // Width over the retention duration is rejected.
        assert!(matches!(
            validate_durations(NANOS_PER_HOUR, 2 * NANOS_PER_HOUR),
            Err(Error::IncompatibleDurations)
        ));
        // Width must be strictly positive.
        assert!(matches!(
            validate_durations(0, 0),
            Err(Error::IncompatibleDurations)
        ));
    }

    #[test]
    fn test_spec_materializes_defaults() {
        let spec = RetentionPolicySpec {
            name: "rp0".to_string(),
            ..Default::default()
        };
        let rpi = spec.new_retention_policy_info();
        assert_eq!(rpi.replica_n, 1);
        assert_eq!(rpi.duration, 0);
        assert_eq!(rpi.shard_group_duration, NANOS_PER_WEEK);
    }

    #[test]
    fn test_spec_matches_wildcards() {
        let rpi = RetentionPolicyInfo {
            name: "rp0".to_string(),
            replica_n: 2,
            duration: NANOS_PER_DAY,
            shard_group_duration: NANOS_PER_HOUR,
            shard_groups: Vec::new(),
            subscriptions: Vec::new(),
        };

        let spec = RetentionPolicySpec {
            name: "rp0".to_string(),
            replica_n: None,
            duration: None,
            shard_group_duration: 0,
        };
        assert!(spec.matches(&rpi), "wildcard spec should match");

        let spec = RetentionPolicySpec {
            name: "rp0".to_string(),
            replica_n: Some(3),
            duration: None,
            shard_group_duration: 0,
        };
        assert!(!spec.matches(&rpi), "replica mismatch should not match");

        let spec = RetentionPolicySpec {
            name: "rp0".to_string(),
            replica_n: Some(2),
            duration: Some(NANOS_PER_DAY),
            shard_group_duration: NANOS_PER_HOUR,
        };
        assert!(spec.matches(&rpi));
    }
}
