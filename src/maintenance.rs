//! Background catalog maintenance
//!
//! Periodically pre-creates upcoming shard groups so writes never wait on
//! group allocation, and prunes shard groups whose deletion fell out of
//! the prune window. Work is gated by the shard-precreation lease so only
//! one cooperating worker runs a tick at a time.

use crate::client::{now_nanos, Client};
use crate::Error;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const PRECREATION_LEASE: &str = "shard-precreation";

/// Periodic shard-group pre-creation and pruning worker
pub struct MaintenanceService {
    client: Arc<Client>,
    precreate_interval: Duration,
    precreate_advance: Duration,
    prune_interval: Duration,
    shutdown: Arc<(Mutex<bool>, Condvar)>,
    handle: Option<JoinHandle<()>>,
}

impl MaintenanceService {
    /// Create a stopped service around a shared client, taking its
    /// timings from the client's config.
    pub fn new(client: Arc<Client>, config: &crate::Config) -> Self {
        Self {
            client,
            precreate_interval: config.precreate_interval,
            precreate_advance: config.precreate_advance,
            prune_interval: config.prune_interval,
            shutdown: Arc::new((Mutex::new(false), Condvar::new())),
            handle: None,
        }
    }

    /// Spawn the worker thread. Calling `start` twice is a no-op.
    pub fn start(&mut self) {
        if self.handle.is_some() {
            return;
        }
        *self.shutdown.0.lock() = false;
        let client = self.client.clone();
        let shutdown = self.shutdown.clone();
        let precreate_interval = self.precreate_interval;
        let precreate_advance = self.precreate_advance;
        let prune_interval = self.prune_interval;

        let handle = std::thread::Builder::new()
            .name("catalog-maintenance".to_string())
            .spawn(move || {
                let mut last_prune = Instant::now();
                loop {
                    {
                        let mut stopped = shutdown.0.lock();
                        if !*stopped {
                            shutdown.1.wait_for(&mut stopped, precreate_interval);
                        }
                        if *stopped {
                            return;
                        }
                    }
                    run_tick(&client, precreate_advance);
                    if last_prune.elapsed() >= prune_interval {
                        if let Err(e) = client.prune_shard_groups() {
                            warn!("shard group prune failed: {}", e);
                        }
                        last_prune = Instant::now();
                    }
                }
            })
            .expect("failed to spawn maintenance thread");
        self.handle = Some(handle);
    }

    /// Signal the worker and wait for it to exit.
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        *self.shutdown.0.lock() = true;
        self.shutdown.1.notify_all();
        let _ = handle.join();
    }
}

impl Drop for MaintenanceService {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_tick(client: &Client, advance: Duration) {
    match client.acquire_lease(PRECREATION_LEASE) {
        Ok(_) => {}
        Err(Error::LeaseConflict) => {
            debug!("shard precreation lease held elsewhere, skipping tick");
            return;
        }
        Err(e) => {
            warn!("shard precreation lease unavailable: {}", e);
            return;
        }
    }
    let from = now_nanos();
    let to = from.saturating_add(advance.as_nanos() as i64);
    if let Err(e) = client.precreate_shard_groups(from, to) {
        warn!("shard group precreation failed: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DEFAULT_RETENTION_POLICY_NAME;
    use crate::Config;
    use tempfile::TempDir;

    #[test]
    fn test_tick_precreates_successor_group() {
        let dir = TempDir::new().unwrap();
        let client = Arc::new(Client::open(Config::new(dir.path())).unwrap());
        client.create_database("db0").unwrap();

        let now = now_nanos();
        let sg = client
            .create_shard_group("db0", DEFAULT_RETENTION_POLICY_NAME, now)
            .unwrap();

        // An advance reaching past the current window creates the successor.
        let advance = Duration::from_nanos((sg.end_time - now) as u64 + 1);
        run_tick(&client, advance);

        let groups = client
            .shard_groups_by_time_range("db0", DEFAULT_RETENTION_POLICY_NAME, now, sg.end_time + 1)
            .unwrap();
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn test_start_stop_is_clean() {
        let dir = TempDir::new().unwrap();
        let config = Config::new(dir.path());
        let client = Arc::new(Client::open(config.clone()).unwrap());
        let mut service = MaintenanceService::new(client, &config);
        service.start();
        service.start();
        service.stop();
        service.stop();
    }
}
