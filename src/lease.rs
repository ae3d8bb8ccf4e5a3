//! Named lease registry
//!
//! Leases are short-lived, in-memory exclusivity grants used by background
//! workers (shard pre-creation, retention enforcement) to avoid duplicating
//! work across cooperating nodes. They are never persisted; a restart drops
//! every grant.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

/// A granted lease
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    /// Lease name
    pub name: String,
    /// Absolute wall-clock expiration
    pub expiration: DateTime<Utc>,
    /// Node id of the holder (0 for unattached clients)
    pub owner: u64,
}

impl Lease {
    /// Whether the lease has lapsed at `now`.
    pub fn expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration <= now
    }
}

/// In-memory lease registry keyed by lease name
#[derive(Debug)]
pub struct Leases {
    term: chrono::Duration,
    leases: RwLock<HashMap<String, Lease>>,
}

impl Leases {
    /// Create a registry granting leases for the given term.
    pub fn new(term: std::time::Duration) -> Self {
        Self {
            term: chrono::Duration::from_std(term).unwrap_or(chrono::Duration::seconds(60)),
            leases: RwLock::new(HashMap::new()),
        }
    }

    /// Acquire or renew the named lease for `owner`.
    ///
    /// Grants when no unexpired holder exists, renews when `owner` already
    /// holds the lease, and refuses with [`Error::LeaseConflict`] otherwise.
    pub fn acquire(&self, name: &str, owner: u64) -> Result<Lease> {
        let now = Utc::now();
        let mut leases = self.leases.write();

        // Scavenge lapsed grants so the map stays bounded by live names.
        leases.retain(|_, lease| !lease.expired_at(now));

        if let Some(lease) = leases.get_mut(name) {
            if lease.owner != owner {
                return Err(Error::LeaseConflict);
            }
            lease.expiration = now + self.term;
            return Ok(lease.clone());
        }

        let lease = Lease {
            name: name.to_string(),
            expiration: now + self.term,
            owner,
        };
        leases.insert(name.to_string(), lease.clone());
        Ok(lease)
    }

    /// Number of unexpired grants.
    pub fn len(&self) -> usize {
        let now = Utc::now();
        self.leases
            .read()
            .values()
            .filter(|l| !l.expired_at(now))
            .count()
    }

    /// Whether no unexpired grants exist.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_acquire_grants_new_lease() {
        let leases = Leases::new(Duration::from_secs(60));
        let lease = leases.acquire("shard-precreation", 1).unwrap();
        assert_eq!(lease.name, "shard-precreation");
        assert_eq!(lease.owner, 1);
        assert!(lease.expiration > Utc::now());
    }

    #[test]
    fn test_acquire_renews_for_same_owner() {
        let leases = Leases::new(Duration::from_secs(60));
        let first = leases.acquire("retention", 7).unwrap();
        let second = leases.acquire("retention", 7).unwrap();
        assert!(second.expiration >= first.expiration);
        assert_eq!(leases.len(), 1);
    }

    #[test]
    fn test_acquire_refuses_foreign_holder() {
        let leases = Leases::new(Duration::from_secs(60));
        leases.acquire("retention", 1).unwrap();
        let err = leases.acquire("retention", 2).expect_err("expected conflict");
        assert!(matches!(err, Error::LeaseConflict));
    }

    #[test]
    fn test_expired_lease_is_reassignable() {
        let leases = Leases::new(Duration::ZERO);
        leases.acquire("retention", 1).unwrap();
        // Term is zero, so the grant lapses immediately and owner 2 may take it.
        let lease = leases.acquire("retention", 2).unwrap();
        assert_eq!(lease.owner, 2);
    }

    #[test]
    fn test_distinct_names_are_independent() {
        let leases = Leases::new(Duration::from_secs(60));
        leases.acquire("a", 1).unwrap();
        leases.acquire("b", 2).unwrap();
        assert_eq!(leases.len(), 2);
    }
}
