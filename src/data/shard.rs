//! Shard groups and shards
//!
//! A shard group is a time-aligned bucket of shards for one retention
//! policy. All timestamps are UTC nanoseconds since the epoch; `0` means
//! "unset" for `deleted_at` and `truncated_at`.

use serde::{Deserialize, Serialize};

/// An owning data node reference on a shard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardOwner {
    /// Id of the owning data node
    pub node_id: u64,
}

/// A horizontally partitioned storage unit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardInfo {
    /// Unique shard id, never reused
    pub id: u64,
    /// Owning data nodes, in placement order
    #[serde(default)]
    pub owners: Vec<ShardOwner>,
}

impl ShardInfo {
    /// Whether the given data node owns this shard.
    pub fn owned_by(&self, node_id: u64) -> bool {
        self.owners.iter().any(|o| o.node_id == node_id)
    }
}

/// A time-aligned bucket of shards
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardGroupInfo {
    /// Unique shard group id, never reused
    pub id: u64,
    /// Inclusive start of the covered window (UTC nanos)
    pub start_time: i64,
    /// Exclusive end of the covered window (UTC nanos)
    pub end_time: i64,
    /// Nonzero once the group is logically deleted
    #[serde(default)]
    pub deleted_at: i64,
    /// Nonzero once the group terminates before `end_time`
    #[serde(default)]
    pub truncated_at: i64,
    /// Shards of the group
    #[serde(default)]
    pub shards: Vec<ShardInfo>,
}

impl ShardGroupInfo {
    /// Whether the group has been logically deleted.
    pub fn deleted(&self) -> bool {
        self.deleted_at != 0
    }

    /// Whether the group has been truncated.
    pub fn truncated(&self) -> bool {
        self.truncated_at != 0
    }

    /// Whether `t` falls inside the group's window.
    pub fn contains(&self, t: i64) -> bool {
        self.start_time <= t && t < self.end_time
    }

    /// End of the window with truncation applied.
    pub fn effective_end_time(&self) -> i64 {
        if self.truncated() && self.truncated_at < self.end_time {
            self.truncated_at
        } else {
            self.end_time
        }
    }

    /// Whether the visible window intersects the inclusive range
    /// `[min, max]`, with truncation applied.
    pub fn overlaps(&self, min: i64, max: i64) -> bool {
        self.start_time <= max && self.effective_end_time() > min
    }

    /// Whether the group still routes writes stamped `t`.
    ///
    /// Deleted groups never do; truncated groups only accept timestamps
    /// before the truncation point.
    pub fn accepts_writes_at(&self, t: i64) -> bool {
        self.contains(t) && !self.deleted() && (!self.truncated() || t < self.truncated_at)
    }
}

/// Window `[floor(t / d) * d, floor(t / d) * d + d)` enclosing `t`,
/// aligned to UTC epoch multiples of `d`.
///
/// `div_euclid` keeps pre-epoch timestamps in their correct (earlier)
/// bucket instead of rounding toward zero.
pub fn window_bounds(t: i64, d: i64) -> (i64, i64) {
    let start = t.div_euclid(d) * d;
    (start, start.saturating_add(d))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::database::NANOS_PER_HOUR;

    #[test]
    fn test_window_bounds_alignment() {
        let d = NANOS_PER_HOUR;
        let (start, end) = window_bounds(90 * 60 * 1_000_000_000, d);
        assert_eq!(start, NANOS_PER_HOUR);
        assert_eq!(end, 2 * NANOS_PER_HOUR);

        // Exactly on a boundary starts a new window.
        let (start, end) = window_bounds(NANOS_PER_HOUR, d);
        assert_eq!(start, NANOS_PER_HOUR);
        assert_eq!(end, 2 * NANOS_PER_HOUR);
    }

    #[test]
    fn test_window_bounds_pre_epoch() {
        let d = NANOS_PER_HOUR;
        let (start, end) = window_bounds(-1, d);
        assert_eq!(start, -NANOS_PER_HOUR);
        assert_eq!(end, 0);
    }

    #[test]
    fn test_contains_is_half_open() {
        let sg = ShardGroupInfo {
            id: 1,
            start_time: 0,
            end_time: 10,
            ..Default::default()
        };
        assert!(sg.contains(0));
        assert!(sg.contains(9));
        assert!(!sg.contains(10));
    }

    #[test]
    fn test_overlaps_inclusive_max() {
        let sg = ShardGroupInfo {
            id: 1,
            start_time: 100,
            end_time: 200,
            ..Default::default()
        };
        assert!(sg.overlaps(0, 100));
        assert!(sg.overlaps(150, 160));
        assert!(sg.overlaps(199, 500));
        assert!(!sg.overlaps(200, 500));
        assert!(!sg.overlaps(0, 99));
    }

    #[test]
    fn test_overlaps_applies_truncation() {
        let sg = ShardGroupInfo {
            id: 1,
            start_time: 0,
            end_time: 100,
            truncated_at: 50,
            ..Default::default()
        };
        assert!(sg.overlaps(0, 40));
        assert!(sg.overlaps(49, 90));
        assert!(!sg.overlaps(50, 90), "a range past the cut sees nothing");
    }

    #[test]
    fn test_truncated_group_rejects_late_writes() {
        let sg = ShardGroupInfo {
            id: 1,
            start_time: 0,
            end_time: 100,
            truncated_at: 50,
            ..Default::default()
        };
        assert!(sg.accepts_writes_at(49));
        assert!(!sg.accepts_writes_at(50));
        assert_eq!(sg.effective_end_time(), 50);
    }

    #[test]
    fn test_deleted_group_rejects_writes() {
        let sg = ShardGroupInfo {
            id: 1,
            start_time: 0,
            end_time: 100,
            deleted_at: 70,
            ..Default::default()
        };
        assert!(!sg.accepts_writes_at(10));
        assert!(sg.deleted());
    }
}
