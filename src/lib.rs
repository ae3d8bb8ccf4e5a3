//! # Tidemark
//!
//! The cluster metadata catalog of a distributed time-series database.
//!
//! Tidemark is the authoritative, durably snapshotted state of databases,
//! retention policies, shard groups, shards, users, subscriptions,
//! continuous queries, and cluster nodes. Every query and write path
//! consults it to answer "where does data for time T in database D live,
//! and on which nodes?" and "is user U authorized?".
//!
//! ## Key properties
//!
//! - **Immutable snapshots**: readers take the published catalog by
//!   `Arc` and keep a consistent view for as long as they like; mutators
//!   never block readers
//! - **Versioned mutations**: every effective mutation bumps the catalog
//!   index exactly once; idempotent re-applications leave it untouched
//! - **Crash-safe persistence**: snapshots are written with the
//!   temp-file + fsync + rename pattern, so a crash always leaves a good
//!   snapshot behind
//! - **Time-aligned shard groups**: shard group windows are aligned to
//!   UTC epoch multiples of the policy's shard group duration
//!
//! ## Architecture
//!
//! - [`data::Data`]: the plain, copy-friendly catalog value and its pure
//!   transformations
//! - [`persist::Persister`]: atomic snapshot storage in one directory
//! - [`Client`]: serialized mutator and lock-free snapshot reader
//! - [`lease::Leases`]: named, time-bounded grants for background workers
//! - [`maintenance::MaintenanceService`]: periodic shard-group
//!   pre-creation and pruning

pub mod auth;
pub mod client;
pub mod config;
pub mod data;
pub mod lease;
pub mod maintenance;
pub mod persist;

mod error;

pub use client::Client;
pub use config::Config;
pub use error::{Error, Result};

/// Re-exports for convenience
pub mod prelude {
    pub use crate::data::{
        Data, DatabaseInfo, NodeInfo, Privilege, RetentionPolicyInfo, RetentionPolicySpec,
        RetentionPolicyUpdate, ShardGroupInfo, ShardInfo, ShardOwner, SubscriptionMode, UserInfo,
    };
    pub use crate::lease::Lease;
    pub use crate::maintenance::MaintenanceService;
    pub use crate::{Client, Config, Error, Result};
}
