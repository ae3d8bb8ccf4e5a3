//! Catalog client
//!
//! [`Client`] owns the published catalog snapshot and serializes every
//! mutation: take the commit lock, clone the current [`Data`], apply the
//! transformation, persist, swap the published `Arc`, notify watchers.
//! Readers grab the current snapshot by reference and are never blocked
//! by mutators; a snapshot, once taken, stays internally consistent no
//! matter how many newer versions get published.
//!
//! A mutation that leaves the catalog structurally unchanged (an
//! idempotent re-create, a precreate with full coverage) neither persists
//! nor bumps the index.

use crate::auth;
use crate::config::Config;
use crate::data::{
    Data, DatabaseInfo, NodeInfo, Privilege, RetentionPolicyInfo, RetentionPolicySpec,
    RetentionPolicyUpdate, ShardGroupInfo, SubscriptionInfo, SubscriptionMode, UserInfo,
    DEFAULT_RETENTION_POLICY_NAME, MIN_RETENTION_POLICY_DURATION,
};
use crate::lease::{Lease, Leases};
use crate::persist::Persister;
use crate::{Error, Result};
use chrono::Utc;
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::BTreeMap;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

/// Coordinator for the metadata catalog
///
/// Safe to share across threads; wrap in an [`Arc`] and hand clones to
/// every consumer.
#[derive(Debug)]
pub struct Client {
    config: Config,
    persister: Persister,
    cache: RwLock<Arc<Data>>,
    commit_mu: Mutex<()>,
    change_mu: Mutex<()>,
    change_cond: Condvar,
    leases: Leases,
    node_id: AtomicU64,
}

impl Client {
    /// Open the catalog in `config.dir`, reloading the latest snapshot or
    /// initializing a fresh one with a new nonzero cluster id.
    pub fn open(config: Config) -> Result<Client> {
        config.validate()?;
        let persister = Persister::new(&config.dir)?;
        let data = match persister.load()? {
            Some(data) => data,
            None => {
                let data = Data::new(generate_cluster_id());
                persister.save(&data)?;
                data
            }
        };
        if config.logging_enabled {
            info!(
                "opened metadata catalog in {} (cluster id {}, index {})",
                persister.dir().display(),
                data.cluster_id,
                data.index
            );
        }
        let leases = Leases::new(config.lease_duration);
        Ok(Client {
            config,
            persister,
            cache: RwLock::new(Arc::new(data)),
            commit_mu: Mutex::new(()),
            change_mu: Mutex::new(()),
            change_cond: Condvar::new(),
            leases,
            node_id: AtomicU64::new(0),
        })
    }

    /// The currently published snapshot.
    pub fn snapshot(&self) -> Arc<Data> {
        self.cache.read().clone()
    }

    /// Current catalog version.
    pub fn index(&self) -> u64 {
        self.snapshot().index
    }

    /// Stable nonzero identity of this catalog.
    pub fn cluster_id(&self) -> u64 {
        self.snapshot().cluster_id
    }

    /// Id of the node this client is attached to; 0 when unattached.
    pub fn node_id(&self) -> u64 {
        self.node_id.load(Ordering::Relaxed)
    }

    /// Attach this client to a cluster node id.
    pub fn set_node_id(&self, id: u64) {
        self.node_id.store(id, Ordering::Relaxed);
    }

    /// Block until the published index exceeds `since` or `timeout`
    /// lapses; returns the index seen last.
    pub fn wait_for_data_changed(&self, since: u64, timeout: Duration) -> u64 {
        let deadline = Instant::now() + timeout;
        let mut guard = self.change_mu.lock();
        loop {
            let index = self.index();
            if index > since || Instant::now() >= deadline {
                return index;
            }
            if self.change_cond.wait_until(&mut guard, deadline).timed_out() {
                return self.index();
            }
        }
    }

    // ---- databases --------------------------------------------------

    /// All databases, in creation order.
    pub fn databases(&self) -> Vec<DatabaseInfo> {
        self.snapshot().databases.clone()
    }

    /// Named database, if present.
    pub fn database(&self, name: &str) -> Option<DatabaseInfo> {
        self.snapshot().database(name).cloned()
    }

    /// Create a database, auto-creating the default retention policy when
    /// configured. Idempotent; an existing database is returned unchanged.
    pub fn create_database(&self, name: &str) -> Result<DatabaseInfo> {
        let autocreate = self.config.retention_autocreate;
        let db = self.mutate(|data| {
            data.create_database(name)?;
            let needs_default = data
                .database(name)
                .map_or(false, |db| db.retention_policies.is_empty());
            if autocreate && needs_default {
                let rpi = RetentionPolicySpec {
                    name: DEFAULT_RETENTION_POLICY_NAME.to_string(),
                    replica_n: Some(1),
                    duration: Some(0),
                    shard_group_duration: 0,
                }
                .new_retention_policy_info();
                data.create_retention_policy(name, &rpi, true)?;
            }
            data.database(name)
                .cloned()
                .ok_or_else(|| Error::DatabaseNotFound(name.to_string()))
        })?;
        if self.config.logging_enabled {
            info!("database {} created", name);
        }
        Ok(db)
    }

    /// Create a database together with its default retention policy.
    ///
    /// When the database already exists the call only succeeds if the
    /// spec matches the existing default policy exactly; anything else is
    /// a [`Error::RetentionPolicyConflict`].
    pub fn create_database_with_retention_policy(
        &self,
        name: &str,
        spec: &RetentionPolicySpec,
    ) -> Result<DatabaseInfo> {
        if spec.name.is_empty() {
            return Err(Error::RetentionPolicyNameRequired);
        }
        if let Some(duration) = spec.duration {
            if duration != 0 && duration < MIN_RETENTION_POLICY_DURATION {
                return Err(Error::RetentionPolicyDurationTooLow);
            }
        }
        self.mutate(|data| {
            if let Some(db) = data.database(name) {
                let Some(rp) = db.retention_policy(&spec.name) else {
                    return Err(Error::RetentionPolicyConflict);
                };
                if !spec.matches(rp) || db.default_retention_policy != rp.name {
                    return Err(Error::RetentionPolicyConflict);
                }
                return Ok(db.clone());
            }
            data.create_database(name)?;
            data.create_retention_policy(name, &spec.new_retention_policy_info(), true)?;
            data.database(name)
                .cloned()
                .ok_or_else(|| Error::DatabaseNotFound(name.to_string()))
        })
    }

    /// Remove a database; removing an absent one succeeds silently.
    pub fn drop_database(&self, name: &str) -> Result<()> {
        self.mutate(|data| {
            data.drop_database(name);
            Ok(())
        })?;
        if self.config.logging_enabled {
            info!("database {} dropped", name);
        }
        Ok(())
    }

    // ---- retention policies -----------------------------------------

    /// Create a retention policy from a spec.
    pub fn create_retention_policy(
        &self,
        database: &str,
        spec: &RetentionPolicySpec,
        make_default: bool,
    ) -> Result<RetentionPolicyInfo> {
        let rpi = spec.new_retention_policy_info();
        self.mutate(|data| {
            data.create_retention_policy(database, &rpi, make_default)?;
            data.retention_policy(database, &rpi.name)?
                .cloned()
                .ok_or_else(|| Error::RetentionPolicyNotFound(rpi.name.clone()))
        })
    }

    /// Named retention policy; `Ok(None)` when the database exists but
    /// the policy does not.
    pub fn retention_policy(
        &self,
        database: &str,
        policy: &str,
    ) -> Result<Option<RetentionPolicyInfo>> {
        Ok(self.snapshot().retention_policy(database, policy)?.cloned())
    }

    /// Apply a partial update to a retention policy.
    pub fn update_retention_policy(
        &self,
        database: &str,
        policy: &str,
        update: &RetentionPolicyUpdate,
        make_default: bool,
    ) -> Result<()> {
        self.mutate(|data| data.update_retention_policy(database, policy, update, make_default))
    }

    /// Set the default retention policy of a database.
    pub fn set_default_retention_policy(&self, database: &str, policy: &str) -> Result<()> {
        self.mutate(|data| data.set_default_retention_policy(database, policy))
    }

    /// Drop a retention policy; dropping an absent one succeeds silently.
    pub fn drop_retention_policy(&self, database: &str, policy: &str) -> Result<()> {
        self.mutate(|data| {
            data.drop_retention_policy(database, policy);
            Ok(())
        })
    }

    // ---- shard groups and shards ------------------------------------

    /// Create (or fetch, when `t` falls into an existing window) the
    /// shard group routing writes stamped `t`.
    pub fn create_shard_group(
        &self,
        database: &str,
        policy: &str,
        t: i64,
    ) -> Result<ShardGroupInfo> {
        let sg = self.mutate(|data| data.create_shard_group(database, policy, t))?;
        debug!(
            "shard group {} covers [{}, {}) for {}.{}",
            sg.id, sg.start_time, sg.end_time, database, policy
        );
        Ok(sg)
    }

    /// Pre-create shard groups so every policy's coverage reaches `to`.
    pub fn precreate_shard_groups(&self, from: i64, to: i64) -> Result<()> {
        self.mutate(|data| data.precreate_shard_groups(from, to))
    }

    /// Mark a shard group deleted; unknown groups succeed silently.
    pub fn delete_shard_group(&self, database: &str, policy: &str, id: u64) -> Result<()> {
        let now = now_nanos();
        self.mutate(|data| {
            data.delete_shard_group(database, policy, id, now);
            Ok(())
        })
    }

    /// Remove shard groups whose deletion fell out of the prune window.
    pub fn prune_shard_groups(&self) -> Result<()> {
        let cutoff = now_nanos() - self.config.prune_window.as_nanos() as i64;
        self.mutate(|data| {
            data.prune_shard_groups(cutoff);
            Ok(())
        })
    }

    /// Terminate shard groups at `t` (see [`Data::truncate_shard_groups`]).
    pub fn truncate_shard_groups(&self, t: i64) -> Result<()> {
        self.mutate(|data| {
            data.truncate_shard_groups(t);
            Ok(())
        })
    }

    /// Remove a shard wherever it lives; an emptied group goes with it.
    pub fn drop_shard(&self, shard_id: u64) -> Result<()> {
        self.mutate(|data| {
            data.drop_shard(shard_id);
            Ok(())
        })
    }

    /// Add then remove owners on a shard.
    pub fn update_shard_owners(&self, shard_id: u64, add: &[u64], del: &[u64]) -> Result<()> {
        self.mutate(|data| data.update_shard_owners(shard_id, add, del))
    }

    /// Non-deleted shard groups of a policy whose truncation-applied
    /// window intersects `[tmin, tmax]`.
    pub fn shard_groups_by_time_range(
        &self,
        database: &str,
        policy: &str,
        tmin: i64,
        tmax: i64,
    ) -> Result<Vec<ShardGroupInfo>> {
        self.snapshot()
            .shard_groups_by_time_range(database, policy, tmin, tmax)
    }

    /// Database, policy, and group containing a shard.
    pub fn shard_owner(&self, shard_id: u64) -> Option<(String, String, ShardGroupInfo)> {
        self.snapshot().shard_owner(shard_id)
    }

    /// Ids of every shard in the catalog, ascending.
    pub fn shard_ids(&self) -> Vec<u64> {
        self.snapshot().shard_ids()
    }

    // ---- users ------------------------------------------------------

    /// All users.
    pub fn users(&self) -> Vec<UserInfo> {
        self.snapshot().users.clone()
    }

    /// Named user.
    pub fn user(&self, name: &str) -> Result<UserInfo> {
        self.snapshot().user(name).cloned().ok_or(Error::UserNotFound)
    }

    /// Number of users.
    pub fn user_count(&self) -> usize {
        self.snapshot().users.len()
    }

    /// Whether any admin user exists.
    pub fn admin_user_exists(&self) -> bool {
        self.snapshot().admin_user_exists()
    }

    /// Create a user. Re-creating with the same password and admin flag
    /// returns the existing user unchanged; any difference conflicts.
    pub fn create_user(&self, name: &str, password: &str, admin: bool) -> Result<UserInfo> {
        let hash = auth::hash_password(password);
        let user = self.mutate(|data| {
            if let Some(existing) = data.user(name) {
                if existing.admin == admin && auth::verify_password(&existing.hash, password) {
                    return Ok(existing.clone());
                }
                return Err(Error::UserExists);
            }
            data.create_user(name, &hash, admin)?;
            data.user(name).cloned().ok_or(Error::UserNotFound)
        })?;
        if self.config.logging_enabled {
            info!("user {} created (admin: {})", name, admin);
        }
        Ok(user)
    }

    /// Change a user's password.
    pub fn update_user(&self, name: &str, password: &str) -> Result<()> {
        let hash = auth::hash_password(password);
        self.mutate(|data| data.update_user_hash(name, &hash))
    }

    /// Remove a user.
    pub fn drop_user(&self, name: &str) -> Result<()> {
        self.mutate(|data| data.drop_user(name))
    }

    /// Set or clear a user's admin flag.
    pub fn set_admin_privilege(&self, name: &str, admin: bool) -> Result<()> {
        self.mutate(|data| data.set_admin_privilege(name, admin))
    }

    /// Grant a privilege on a database to a user.
    pub fn set_privilege(&self, name: &str, database: &str, privilege: Privilege) -> Result<()> {
        self.mutate(|data| data.set_privilege(name, database, privilege))
    }

    /// Effective privilege of a user on a database. Admins hold all
    /// privileges everywhere; otherwise the granted privilege,
    /// [`Privilege::NoPrivileges`] when nothing was granted.
    pub fn user_privilege(&self, name: &str, database: &str) -> Result<Privilege> {
        let data = self.snapshot();
        let user = data.user(name).ok_or(Error::UserNotFound)?;
        Ok(user.privilege(database))
    }

    /// All privileges granted to a user, by database.
    pub fn user_privileges(&self, name: &str) -> Result<BTreeMap<String, Privilege>> {
        let data = self.snapshot();
        let user = data.user(name).ok_or(Error::UserNotFound)?;
        Ok(user.privileges.clone())
    }

    /// Check a password against the stored digest.
    ///
    /// A missing user is [`Error::UserNotFound`]; a wrong or empty
    /// password on an existing user is always [`Error::Authenticate`].
    pub fn authenticate(&self, name: &str, password: &str) -> Result<UserInfo> {
        let data = self.snapshot();
        let user = data.user(name).ok_or(Error::UserNotFound)?;
        if password.is_empty() || !auth::verify_password(&user.hash, password) {
            return Err(Error::Authenticate);
        }
        Ok(user.clone())
    }

    // ---- continuous queries -----------------------------------------

    /// Register a continuous query; identical re-registration is a no-op.
    pub fn create_continuous_query(&self, database: &str, name: &str, query: &str) -> Result<()> {
        self.mutate(|data| data.create_continuous_query(database, name, query))
    }

    /// Remove a continuous query; an absent one succeeds silently.
    pub fn drop_continuous_query(&self, database: &str, name: &str) -> Result<()> {
        self.mutate(|data| data.drop_continuous_query(database, name))
    }

    // ---- subscriptions ----------------------------------------------

    /// Register a write fan-out subscription on a retention policy.
    ///
    /// At least one destination is required, and every destination must
    /// be a `udp`, `http`, or `https` URL with an explicit host and port.
    pub fn create_subscription(
        &self,
        database: &str,
        policy: &str,
        name: &str,
        mode: SubscriptionMode,
        destinations: &[&str],
    ) -> Result<()> {
        if destinations.is_empty() {
            return Err(Error::SubscriptionDestinationsRequired);
        }
        for dest in destinations {
            validate_subscription_destination(dest)?;
        }
        let sub = SubscriptionInfo {
            name: name.to_string(),
            mode,
            destinations: destinations.iter().map(|d| d.to_string()).collect(),
        };
        self.mutate(move |data| data.create_subscription(database, policy, sub))
    }

    /// Remove a subscription.
    pub fn drop_subscription(&self, database: &str, policy: &str, name: &str) -> Result<()> {
        self.mutate(|data| data.drop_subscription(database, policy, name))
    }

    // ---- nodes ------------------------------------------------------

    /// Register a data node under its HTTP and TCP addresses.
    pub fn create_data_node(&self, http_addr: &str, tcp_addr: &str) -> Result<NodeInfo> {
        let node = self.mutate(|data| data.create_data_node(http_addr, tcp_addr))?;
        if self.config.logging_enabled {
            info!("data node {} registered at {}", node.id, node.addr);
        }
        Ok(node)
    }

    /// Data node by id.
    pub fn data_node(&self, id: u64) -> Option<NodeInfo> {
        self.snapshot().data_node(id).cloned()
    }

    /// All data nodes.
    pub fn data_nodes(&self) -> Vec<NodeInfo> {
        self.snapshot().data_nodes.clone()
    }

    /// Data node by HTTP address.
    pub fn data_node_by_http_addr(&self, addr: &str) -> Option<NodeInfo> {
        self.snapshot().data_node_by_http_addr(addr).cloned()
    }

    /// Data node by TCP address.
    pub fn data_node_by_tcp_addr(&self, tcp_addr: &str) -> Option<NodeInfo> {
        self.snapshot().data_node_by_tcp_addr(tcp_addr).cloned()
    }

    /// Remove a data node; unknown ids succeed silently.
    pub fn delete_data_node(&self, id: u64) -> Result<()> {
        self.mutate(|data| {
            data.delete_data_node(id);
            Ok(())
        })
    }

    /// Register a meta node under its RPC address.
    pub fn create_meta_node(&self, addr: &str, tcp_addr: &str) -> Result<NodeInfo> {
        let node = self.mutate(|data| data.create_meta_node(addr, tcp_addr))?;
        if self.config.logging_enabled {
            info!("meta node {} registered at {}", node.id, node.addr);
        }
        Ok(node)
    }

    /// All meta nodes.
    pub fn meta_nodes(&self) -> Vec<NodeInfo> {
        self.snapshot().meta_nodes.clone()
    }

    /// Meta node by RPC address.
    pub fn meta_node_by_addr(&self, addr: &str) -> Option<NodeInfo> {
        self.snapshot().meta_node_by_addr(addr).cloned()
    }

    /// Remove a meta node; unknown ids succeed silently.
    pub fn delete_meta_node(&self, id: u64) -> Result<()> {
        self.mutate(|data| {
            data.delete_meta_node(id);
            Ok(())
        })
    }

    // ---- leases, ping, raw data -------------------------------------

    /// Acquire or renew a named lease for this node.
    pub fn acquire_lease(&self, name: &str) -> Result<Lease> {
        self.leases.acquire(name, self.node_id())
    }

    /// Verify persistence is writable and, with `all_nodes`, that every
    /// registered meta node is reachable. `timeout` overrides the
    /// configured `ping_timeout` for this probe.
    pub fn ping(&self, all_nodes: bool, timeout: Option<Duration>) -> Result<()> {
        self.persister.ping()?;
        if !all_nodes {
            return Ok(());
        }
        let timeout = timeout.unwrap_or(self.config.ping_timeout);
        let data = self.snapshot();
        for node in &data.meta_nodes {
            let mut addrs = node.addr.to_socket_addrs()?;
            let addr = addrs.next().ok_or_else(|| {
                Error::Io(std::io::Error::new(
                    std::io::ErrorKind::AddrNotAvailable,
                    format!("meta node address {} did not resolve", node.addr),
                ))
            })?;
            if let Err(e) = TcpStream::connect_timeout(&addr, timeout) {
                warn!("meta node {} unreachable: {}", node.addr, e);
                return Err(e.into());
            }
        }
        Ok(())
    }

    /// Replace the whole catalog value, persisting and bumping the index
    /// unconditionally. Replication and test hook.
    pub fn set_data(&self, data: Data) -> Result<()> {
        let _commit = self.commit_mu.lock();
        let current = self.snapshot();
        let mut updated = data;
        updated.index = current.index + 1;
        self.persister.save(&updated)?;
        *self.cache.write() = Arc::new(updated);
        self.notify_changed();
        Ok(())
    }

    // ---- commit path ------------------------------------------------

    fn mutate<T>(&self, apply: impl FnOnce(&mut Data) -> Result<T>) -> Result<T> {
        let _commit = self.commit_mu.lock();
        let current = self.snapshot();
        let mut updated = (*current).clone();
        let out = apply(&mut updated)?;

        // Idempotent no-ops must not advance the index or touch disk.
        if updated == *current {
            return Ok(out);
        }

        updated.index = current.index + 1;
        self.persister.save(&updated)?;
        let index = updated.index;
        *self.cache.write() = Arc::new(updated);
        self.notify_changed();
        debug!("catalog advanced to index {}", index);
        Ok(out)
    }

    fn notify_changed(&self) {
        let _guard = self.change_mu.lock();
        self.change_cond.notify_all();
    }
}

/// Current wall-clock time in UTC nanos.
pub(crate) fn now_nanos() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or(0)
}

fn generate_cluster_id() -> u64 {
    loop {
        let id = rand::random::<u64>();
        if id != 0 {
            return id;
        }
    }
}

fn validate_subscription_destination(dest: &str) -> Result<()> {
    let invalid = || Error::InvalidSubscriptionUrl(dest.to_string());
    let url = Url::parse(dest).map_err(|_| invalid())?;
    match url.scheme() {
        "udp" | "http" | "https" => {}
        _ => return Err(invalid()),
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid());
    }
    if url.port().is_none() {
        return Err(invalid());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_subscription_destination() {
        validate_subscription_destination("udp://example.com:9090").unwrap();
        validate_subscription_destination("http://example.com:9092").unwrap();
        validate_subscription_destination("https://example.com:9092").unwrap();

        for bad in [
            "bad://example.com:9191",
            "udp://example.com",
            "udp://:9090",
            "not a url",
        ] {
            let err = validate_subscription_destination(bad).expect_err(bad);
            assert!(
                err.to_string().starts_with("invalid subscription URL"),
                "unexpected error for {bad}: {err}"
            );
        }
    }

    #[test]
    fn test_generate_cluster_id_nonzero() {
        for _ in 0..32 {
            assert_ne!(generate_cluster_id(), 0);
        }
    }
}
