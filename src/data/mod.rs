//! Versioned catalog state
//!
//! [`Data`] is the single aggregate the whole catalog lives in: databases,
//! retention policies, shard groups, users, nodes, and the monotonic id
//! allocators. Query methods never mutate and are safe on a shared
//! snapshot. Mutations run on a clone owned by the caller (the client
//! clones, applies, persists, then publishes) and either fully apply or
//! return an error that discards the clone, so no partial application
//! ever reaches the published snapshot.

mod database;
mod node;
mod shard;
mod user;

pub use database::{
    normalized_shard_group_duration, shard_group_duration_for, validate_durations,
    ContinuousQueryInfo, DatabaseInfo, RetentionPolicyInfo, RetentionPolicySpec,
    RetentionPolicyUpdate, SubscriptionInfo, SubscriptionMode, DEFAULT_RETENTION_POLICY_NAME,
    MIN_RETENTION_POLICY_DURATION, NANOS_PER_DAY, NANOS_PER_HOUR, NANOS_PER_WEEK,
};
pub use node::NodeInfo;
pub use shard::{window_bounds, ShardGroupInfo, ShardInfo, ShardOwner};
pub use user::{Privilege, UserInfo};

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The complete, versioned catalog value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Data {
    /// Monotonic version; bumped exactly once per effective mutation
    pub index: u64,
    /// Stable nonzero identity of this catalog, assigned on first open
    pub cluster_id: u64,
    /// Meta nodes, unique by id and by addr
    #[serde(default)]
    pub meta_nodes: Vec<NodeInfo>,
    /// Data nodes, unique by id and by either address
    #[serde(default)]
    pub data_nodes: Vec<NodeInfo>,
    /// Databases, unique by name
    #[serde(default)]
    pub databases: Vec<DatabaseInfo>,
    /// Users, unique by name
    #[serde(default)]
    pub users: Vec<UserInfo>,
    /// Node id allocator; never reused
    pub max_node_id: u64,
    /// Shard group id allocator; never reused
    pub max_shard_group_id: u64,
    /// Shard id allocator; never reused
    pub max_shard_id: u64,
}

impl Data {
    /// Fresh catalog with the given cluster identity.
    pub fn new(cluster_id: u64) -> Self {
        Self {
            index: 1,
            cluster_id,
            ..Default::default()
        }
    }

    // ---- queries ----------------------------------------------------

    /// Named database, if present.
    pub fn database(&self, name: &str) -> Option<&DatabaseInfo> {
        self.databases.iter().find(|db| db.name == name)
    }

    fn database_mut(&mut self, name: &str) -> Option<&mut DatabaseInfo> {
        self.databases.iter_mut().find(|db| db.name == name)
    }

    /// Named retention policy; the database must exist.
    pub fn retention_policy(
        &self,
        database: &str,
        policy: &str,
    ) -> Result<Option<&RetentionPolicyInfo>> {
        let db = self
            .database(database)
            .ok_or_else(|| Error::DatabaseNotFound(database.to_string()))?;
        Ok(db.retention_policy(policy))
    }

    /// Non-deleted shard groups of a policy whose truncation-applied
    /// window intersects `[tmin, tmax]`, ordered by start time.
    pub fn shard_groups_by_time_range(
        &self,
        database: &str,
        policy: &str,
        tmin: i64,
        tmax: i64,
    ) -> Result<Vec<ShardGroupInfo>> {
        let rp = self
            .retention_policy(database, policy)?
            .ok_or_else(|| Error::RetentionPolicyNotFound(policy.to_string()))?;
        Ok(rp
            .shard_groups
            .iter()
            .filter(|sg| !sg.deleted() && sg.overlaps(tmin, tmax))
            .cloned()
            .collect())
    }

    /// Database, policy, and group containing the shard, if any.
    pub fn shard_owner(&self, shard_id: u64) -> Option<(String, String, ShardGroupInfo)> {
        for db in &self.databases {
            for rp in &db.retention_policies {
                for sg in &rp.shard_groups {
                    if sg.shards.iter().any(|s| s.id == shard_id) {
                        return Some((db.name.clone(), rp.name.clone(), sg.clone()));
                    }
                }
            }
        }
        None
    }

    /// Ids of every shard in the catalog, ascending.
    pub fn shard_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .databases
            .iter()
            .flat_map(|db| &db.retention_policies)
            .flat_map(|rp| &rp.shard_groups)
            .flat_map(|sg| &sg.shards)
            .map(|s| s.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Named user, if present.
    pub fn user(&self, name: &str) -> Option<&UserInfo> {
        self.users.iter().find(|u| u.name == name)
    }

    fn user_mut(&mut self, name: &str) -> Option<&mut UserInfo> {
        self.users.iter_mut().find(|u| u.name == name)
    }

    /// Whether any admin user exists.
    pub fn admin_user_exists(&self) -> bool {
        self.users.iter().any(|u| u.admin)
    }

    /// Data node by id.
    pub fn data_node(&self, id: u64) -> Option<&NodeInfo> {
        self.data_nodes.iter().find(|n| n.id == id)
    }

    /// Data node by HTTP address.
    pub fn data_node_by_http_addr(&self, addr: &str) -> Option<&NodeInfo> {
        self.data_nodes.iter().find(|n| n.addr == addr)
    }

    /// Data node by TCP address.
    pub fn data_node_by_tcp_addr(&self, tcp_addr: &str) -> Option<&NodeInfo> {
        self.data_nodes.iter().find(|n| n.tcp_addr == tcp_addr)
    }

    /// Meta node by id.
    pub fn meta_node(&self, id: u64) -> Option<&NodeInfo> {
        self.meta_nodes.iter().find(|n| n.id == id)
    }

    /// Meta node by RPC address.
    pub fn meta_node_by_addr(&self, addr: &str) -> Option<&NodeInfo> {
        self.meta_nodes.iter().find(|n| n.addr == addr)
    }

    // ---- database transformations -----------------------------------

    /// Append a database; a present database is left untouched.
    pub fn create_database(&mut self, name: &str) -> Result<()> {
        validate_name(name).map_err(|e| match e {
            Error::InvalidName if name.is_empty() => Error::DatabaseNameRequired,
            other => other,
        })?;
        if self.database(name).is_none() {
            self.databases.push(DatabaseInfo::new(name));
        }
        Ok(())
    }

    /// Remove a database; removing an absent one is a no-op.
    pub fn drop_database(&mut self, name: &str) {
        self.databases.retain(|db| db.name != name);
    }

    /// Append a retention policy.
    ///
    /// Re-creating a policy is a no-op only when every field matches; a
    /// matching re-create that asks to make a non-default policy default
    /// conflicts.
    pub fn create_retention_policy(
        &mut self,
        database: &str,
        rpi: &RetentionPolicyInfo,
        make_default: bool,
    ) -> Result<()> {
        if rpi.name.is_empty() {
            return Err(Error::RetentionPolicyNameRequired);
        }
        if rpi.replica_n < 1 {
            return Err(Error::ReplicationFactorTooLow);
        }
        if rpi.duration != 0 && rpi.duration < MIN_RETENTION_POLICY_DURATION {
            return Err(Error::RetentionPolicyDurationTooLow);
        }
        validate_durations(rpi.duration, rpi.shard_group_duration)?;

        let db = self
            .database_mut(database)
            .ok_or_else(|| Error::DatabaseNotFound(database.to_string()))?;

        if let Some(existing) = db.retention_policy(&rpi.name) {
            if existing.replica_n != rpi.replica_n
                || existing.duration != rpi.duration
                || existing.shard_group_duration != rpi.shard_group_duration
            {
                return Err(Error::RetentionPolicyExists);
            }
            if make_default && db.default_retention_policy != rpi.name {
                return Err(Error::RetentionPolicyConflict);
            }
            return Ok(());
        }

        db.retention_policies.push(RetentionPolicyInfo {
            shard_groups: Vec::new(),
            subscriptions: Vec::new(),
            ..rpi.clone()
        });
        if make_default {
            db.default_retention_policy = rpi.name.clone();
        }
        Ok(())
    }

    /// Apply a partial update to a retention policy.
    ///
    /// The resulting policy must still satisfy the duration rules, and a
    /// rename may not collide with a sibling policy.
    pub fn update_retention_policy(
        &mut self,
        database: &str,
        policy: &str,
        update: &RetentionPolicyUpdate,
        make_default: bool,
    ) -> Result<()> {
        let db = self
            .database_mut(database)
            .ok_or_else(|| Error::DatabaseNotFound(database.to_string()))?;

        let current = db
            .retention_policy(policy)
            .ok_or_else(|| Error::RetentionPolicyNotFound(policy.to_string()))?;

        if let Some(new_name) = &update.name {
            if new_name != policy && db.retention_policy(new_name).is_some() {
                return Err(Error::RetentionPolicyExists);
            }
            if new_name.is_empty() {
                return Err(Error::RetentionPolicyNameRequired);
            }
        }

        let duration = update.duration.unwrap_or(current.duration);
        let replica_n = update.replica_n.unwrap_or(current.replica_n);
        let shard_group_duration = update
            .shard_group_duration
            .map(|sgd| normalized_shard_group_duration(sgd, duration))
            .unwrap_or(current.shard_group_duration);

        if replica_n < 1 {
            return Err(Error::ReplicationFactorTooLow);
        }
        if duration != 0 && duration < MIN_RETENTION_POLICY_DURATION {
            return Err(Error::RetentionPolicyDurationTooLow);
        }
        validate_durations(duration, shard_group_duration)?;

        let was_default = db.default_retention_policy == policy;
        let rp = match db.retention_policy_mut(policy) {
            Some(rp) => rp,
            None => return Err(Error::RetentionPolicyNotFound(policy.to_string())),
        };
        if let Some(new_name) = &update.name {
            rp.name = new_name.clone();
        }
        rp.duration = duration;
        rp.replica_n = replica_n;
        rp.shard_group_duration = shard_group_duration;
        let new_name = rp.name.clone();

        if make_default || was_default {
            db.default_retention_policy = new_name;
        }
        Ok(())
    }

    /// Set the database's default retention policy.
    pub fn set_default_retention_policy(&mut self, database: &str, policy: &str) -> Result<()> {
        let db = self
            .database_mut(database)
            .ok_or_else(|| Error::DatabaseNotFound(database.to_string()))?;
        if db.retention_policy(policy).is_none() {
            return Err(Error::RetentionPolicyNotFound(policy.to_string()));
        }
        db.default_retention_policy = policy.to_string();
        Ok(())
    }

    /// Drop a retention policy; absent databases and policies are no-ops.
    /// Dropping the current default clears the database's default.
    pub fn drop_retention_policy(&mut self, database: &str, policy: &str) {
        let Some(db) = self.database_mut(database) else {
            return;
        };
        db.retention_policies.retain(|rp| rp.name != policy);
        if db.default_retention_policy == policy {
            db.default_retention_policy = String::new();
        }
    }

    // ---- shard group transformations --------------------------------

    /// Create the shard group covering `t`, or return the one already
    /// routing writes at `t` unchanged.
    pub fn create_shard_group(
        &mut self,
        database: &str,
        policy: &str,
        t: i64,
    ) -> Result<ShardGroupInfo> {
        let db_idx = self
            .databases
            .iter()
            .position(|db| db.name == database)
            .ok_or_else(|| Error::DatabaseNotFound(database.to_string()))?;
        let rp_idx = self.databases[db_idx]
            .retention_policies
            .iter()
            .position(|rp| rp.name == policy)
            .ok_or_else(|| Error::RetentionPolicyNotFound(policy.to_string()))?;

        if let Some(existing) =
            self.databases[db_idx].retention_policies[rp_idx].shard_group_by_timestamp(t)
        {
            return Ok(existing.clone());
        }

        let (replica_n, sgd) = {
            let rp = &self.databases[db_idx].retention_policies[rp_idx];
            (rp.replica_n.max(1), rp.shard_group_duration)
        };
        if sgd <= 0 {
            return Err(Error::IncompatibleDurations);
        }

        let (aligned_start, end_time) = window_bounds(t, sgd);
        let mut start_time = aligned_start;
        // A truncated sibling still owns [start_time, truncated_at); the new
        // group picks up at its truncation point so visible windows never
        // overlap.
        for sg in &self.databases[db_idx].retention_policies[rp_idx].shard_groups {
            if !sg.deleted()
                && sg.truncated()
                && sg.start_time < end_time
                && sg.truncated_at > start_time
                && sg.truncated_at <= t
            {
                start_time = sg.truncated_at;
            }
        }

        self.max_shard_group_id += 1;
        let mut group = ShardGroupInfo {
            id: self.max_shard_group_id,
            start_time,
            end_time,
            deleted_at: 0,
            truncated_at: 0,
            shards: Vec::new(),
        };

        let node_ids: Vec<u64> = self.data_nodes.iter().map(|n| n.id).collect();
        let shard_n = if node_ids.is_empty() {
            1
        } else {
            node_ids.len().div_ceil(replica_n).max(1)
        };
        let owners_per_shard = replica_n.min(node_ids.len());
        for i in 0..shard_n {
            self.max_shard_id += 1;
            let mut shard = ShardInfo {
                id: self.max_shard_id,
                owners: Vec::with_capacity(owners_per_shard),
            };
            for j in 0..owners_per_shard {
                let idx = (group.id as usize + i + j) % node_ids.len();
                shard.owners.push(ShardOwner {
                    node_id: node_ids[idx],
                });
            }
            group.shards.push(shard);
        }

        let rp = &mut self.databases[db_idx].retention_policies[rp_idx];
        rp.shard_groups.push(group.clone());
        rp.shard_groups.sort_by_key(|sg| sg.start_time);
        Ok(group)
    }

    /// Extend every policy's coverage up to `to` by creating successor
    /// groups after the latest existing one.
    ///
    /// Policies that never received a group, or whose latest group is
    /// deleted or ends outside `(from, to)`, are left alone.
    pub fn precreate_shard_groups(&mut self, from: i64, to: i64) -> Result<()> {
        let mut pending: Vec<(String, String, i64, i64)> = Vec::new();
        for db in &self.databases {
            for rp in &db.retention_policies {
                let Some(last) = rp.shard_groups.last() else {
                    continue;
                };
                if last.deleted() || last.end_time <= from || last.end_time >= to {
                    continue;
                }
                pending.push((
                    db.name.clone(),
                    rp.name.clone(),
                    last.end_time,
                    rp.shard_group_duration,
                ));
            }
        }

        for (database, policy, mut t, sgd) in pending {
            if sgd <= 0 {
                continue;
            }
            while t < to {
                self.create_shard_group(&database, &policy, t)?;
                t = t.saturating_add(sgd);
            }
        }
        Ok(())
    }

    /// Mark a shard group deleted as of `at`; unknown groups are a no-op.
    pub fn delete_shard_group(&mut self, database: &str, policy: &str, id: u64, at: i64) {
        let Some(db) = self.database_mut(database) else {
            return;
        };
        let Some(rp) = db.retention_policy_mut(policy) else {
            return;
        };
        if let Some(sg) = rp.shard_groups.iter_mut().find(|sg| sg.id == id) {
            sg.deleted_at = at;
        }
    }

    /// Remove shard groups deleted before `cutoff`.
    pub fn prune_shard_groups(&mut self, cutoff: i64) {
        for db in &mut self.databases {
            for rp in &mut db.retention_policies {
                rp.shard_groups
                    .retain(|sg| !sg.deleted() || sg.deleted_at >= cutoff);
            }
        }
    }

    /// Terminate shard groups at `t`.
    ///
    /// Groups covering `t` stop there; groups entirely in the future
    /// collapse to zero width at their own start. Groups that already
    /// ended, were deleted, or were truncated before `t` are untouched.
    pub fn truncate_shard_groups(&mut self, t: i64) {
        for db in &mut self.databases {
            for rp in &mut db.retention_policies {
                for sg in &mut rp.shard_groups {
                    if t >= sg.end_time || sg.deleted() || (sg.truncated() && sg.truncated_at < t) {
                        continue;
                    }
                    sg.truncated_at = if t <= sg.start_time { sg.start_time } else { t };
                }
            }
        }
    }

    /// Remove a shard wherever it lives; an emptied group is removed with
    /// it. Unknown shards are a no-op.
    pub fn drop_shard(&mut self, shard_id: u64) {
        for db in &mut self.databases {
            for rp in &mut db.retention_policies {
                for sg in &mut rp.shard_groups {
                    sg.shards.retain(|s| s.id != shard_id);
                }
                rp.shard_groups.retain(|sg| !sg.shards.is_empty());
            }
        }
    }

    /// Add then remove owners on a shard, preserving order and skipping
    /// duplicates.
    pub fn update_shard_owners(&mut self, shard_id: u64, add: &[u64], del: &[u64]) -> Result<()> {
        for db in &mut self.databases {
            for rp in &mut db.retention_policies {
                for sg in &mut rp.shard_groups {
                    if let Some(shard) = sg.shards.iter_mut().find(|s| s.id == shard_id) {
                        for &node_id in add {
                            if !shard.owned_by(node_id) {
                                shard.owners.push(ShardOwner { node_id });
                            }
                        }
                        shard.owners.retain(|o| !del.contains(&o.node_id));
                        return Ok(());
                    }
                }
            }
        }
        Err(Error::ShardNotFound(shard_id))
    }

    // ---- user transformations ---------------------------------------

    /// Append a user with a pre-computed password digest.
    pub fn create_user(&mut self, name: &str, hash: &str, admin: bool) -> Result<()> {
        if name.is_empty() {
            return Err(Error::UsernameRequired);
        }
        if self.user(name).is_some() {
            return Err(Error::UserExists);
        }
        self.users.push(UserInfo {
            name: name.to_string(),
            hash: hash.to_string(),
            admin,
            privileges: BTreeMap::new(),
        });
        Ok(())
    }

    /// Remove a user.
    pub fn drop_user(&mut self, name: &str) -> Result<()> {
        if self.user(name).is_none() {
            return Err(Error::UserNotFound);
        }
        self.users.retain(|u| u.name != name);
        Ok(())
    }

    /// Replace a user's password digest.
    pub fn update_user_hash(&mut self, name: &str, hash: &str) -> Result<()> {
        let user = self.user_mut(name).ok_or(Error::UserNotFound)?;
        user.hash = hash.to_string();
        Ok(())
    }

    /// Set or clear a user's admin flag.
    pub fn set_admin_privilege(&mut self, name: &str, admin: bool) -> Result<()> {
        let user = self.user_mut(name).ok_or(Error::UserNotFound)?;
        user.admin = admin;
        Ok(())
    }

    /// Grant a privilege on a database to a user.
    pub fn set_privilege(&mut self, name: &str, database: &str, privilege: Privilege) -> Result<()> {
        if self.database(database).is_none() {
            return Err(Error::DatabaseNotFound(database.to_string()));
        }
        let user = self.user_mut(name).ok_or(Error::UserNotFound)?;
        user.privileges.insert(database.to_string(), privilege);
        Ok(())
    }

    // ---- continuous query transformations ---------------------------

    /// Register a continuous query; re-registering the identical query is
    /// a no-op, a different query under the same name conflicts.
    pub fn create_continuous_query(&mut self, database: &str, name: &str, query: &str) -> Result<()> {
        let db = self
            .database_mut(database)
            .ok_or_else(|| Error::DatabaseNotFound(database.to_string()))?;
        if let Some(existing) = db.continuous_query(name) {
            if existing.query == query {
                return Ok(());
            }
            return Err(Error::ContinuousQueryExists);
        }
        db.continuous_queries.push(ContinuousQueryInfo {
            name: name.to_string(),
            query: query.to_string(),
        });
        Ok(())
    }

    /// Remove a continuous query; an absent query is a no-op.
    pub fn drop_continuous_query(&mut self, database: &str, name: &str) -> Result<()> {
        let db = self
            .database_mut(database)
            .ok_or_else(|| Error::DatabaseNotFound(database.to_string()))?;
        db.continuous_queries.retain(|cq| cq.name != name);
        Ok(())
    }

    // ---- subscription transformations -------------------------------

    /// Register a subscription on a retention policy.
    pub fn create_subscription(
        &mut self,
        database: &str,
        policy: &str,
        sub: SubscriptionInfo,
    ) -> Result<()> {
        let rp = self.retention_policy_mut_checked(database, policy)?;
        if rp.subscription(&sub.name).is_some() {
            return Err(Error::SubscriptionExists);
        }
        rp.subscriptions.push(sub);
        Ok(())
    }

    /// Remove a subscription.
    pub fn drop_subscription(&mut self, database: &str, policy: &str, name: &str) -> Result<()> {
        let rp = self.retention_policy_mut_checked(database, policy)?;
        if rp.subscription(name).is_none() {
            return Err(Error::SubscriptionNotFound);
        }
        rp.subscriptions.retain(|s| s.name != name);
        Ok(())
    }

    fn retention_policy_mut_checked(
        &mut self,
        database: &str,
        policy: &str,
    ) -> Result<&mut RetentionPolicyInfo> {
        let db = self
            .database_mut(database)
            .ok_or_else(|| Error::DatabaseNotFound(database.to_string()))?;
        db.retention_policy_mut(policy)
            .ok_or_else(|| Error::RetentionPolicyNotFound(policy.to_string()))
    }

    // ---- node transformations ---------------------------------------

    /// Register a data node; re-registering both addresses returns the
    /// existing node, sharing only one address conflicts.
    pub fn create_data_node(&mut self, http_addr: &str, tcp_addr: &str) -> Result<NodeInfo> {
        if let Some(existing) = self
            .data_nodes
            .iter()
            .find(|n| n.addr == http_addr && n.tcp_addr == tcp_addr)
        {
            return Ok(existing.clone());
        }
        if self
            .data_nodes
            .iter()
            .any(|n| n.addr == http_addr || n.tcp_addr == tcp_addr)
        {
            return Err(Error::NodeExists);
        }
        self.max_node_id += 1;
        let node = NodeInfo::new(self.max_node_id, http_addr, tcp_addr);
        self.data_nodes.push(node.clone());
        Ok(node)
    }

    /// Remove a data node; unknown ids are a no-op.
    pub fn delete_data_node(&mut self, id: u64) {
        self.data_nodes.retain(|n| n.id != id);
    }

    /// Register a meta node, keyed by its RPC address.
    pub fn create_meta_node(&mut self, addr: &str, tcp_addr: &str) -> Result<NodeInfo> {
        if let Some(existing) = self.meta_nodes.iter().find(|n| n.addr == addr) {
            if existing.tcp_addr == tcp_addr {
                return Ok(existing.clone());
            }
            return Err(Error::NodeExists);
        }
        self.max_node_id += 1;
        let node = NodeInfo::new(self.max_node_id, addr, tcp_addr);
        self.meta_nodes.push(node.clone());
        Ok(node)
    }

    /// Remove a meta node; unknown ids are a no-op.
    pub fn delete_meta_node(&mut self, id: u64) {
        self.meta_nodes.retain(|n| n.id != id);
    }
}

/// Names may not be blank or contain whitespace.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.chars().any(char::is_whitespace) {
        return Err(Error::InvalidName);
    }
    Ok(())
}
