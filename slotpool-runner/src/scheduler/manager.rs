//! Pool manager
//!
//! Builds one `DevicePool` per device at startup and routes submissions to
//! them by device name. The set of devices never changes afterwards.

use slotpool_core::{
    DeviceDescriptor, DeviceProvider, JobId, PoolError, PoolResult, PoolSnapshot, Submission,
};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::info;

use crate::config::PoolConfig;
use crate::job::JobHandle;
use crate::scheduler::pool::DevicePool;

/// Owns the device pools
///
/// Dropping a manager without calling `shutdown_all` stops every loop but
/// leaves running jobs on their backends.
pub struct PoolManager {
    pools: HashMap<String, Arc<DevicePool>>,
    /// Device names in provider order
    devices: Vec<String>,
    config: PoolConfig,
}

impl PoolManager {
    /// Builds and starts one pool per device
    ///
    /// Must be called from within a Tokio runtime. Fails with
    /// `PoolError::DuplicateDevice` before anything is started if two
    /// descriptors share a name.
    pub fn start(devices: Vec<DeviceDescriptor>, config: PoolConfig) -> PoolResult<Self> {
        config.validate()?;
        let manager = Self::build(devices, config)?;

        for name in &manager.devices {
            manager.pools[name].start();
        }

        info!(
            devices = manager.devices.len(),
            workers_per_device = manager.config.workers_per_device,
            "Device pools started"
        );
        Ok(manager)
    }

    /// Builds and starts one pool per device the provider exposes
    pub fn from_provider(provider: &dyn DeviceProvider, config: PoolConfig) -> PoolResult<Self> {
        Self::start(provider.devices(), config)
    }

    /// Builds the pools without starting their loops
    fn build(devices: Vec<DeviceDescriptor>, config: PoolConfig) -> PoolResult<Self> {
        let mut pools = HashMap::with_capacity(devices.len());
        let mut names = Vec::with_capacity(devices.len());

        for descriptor in devices {
            if pools.contains_key(&descriptor.name) {
                return Err(PoolError::DuplicateDevice(descriptor.name));
            }
            let name = descriptor.name.clone();
            pools.insert(name.clone(), DevicePool::new(descriptor, config.clone()));
            names.push(name);
        }

        Ok(Self {
            pools,
            devices: names,
            config,
        })
    }

    /// Queues a job on the named device
    pub fn enqueue(&self, submission: Submission, device: &str) -> PoolResult<JobHandle> {
        self.pool(device)
            .ok_or_else(|| PoolError::UnrecognizedDevice(device.to_string()))?
            .enqueue(submission)
    }

    /// Get the pool for a device
    pub fn pool(&self, device: &str) -> Option<&Arc<DevicePool>> {
        self.pools.get(device)
    }

    /// Device names in provider order
    pub fn devices(&self) -> &[String] {
        &self.devices
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Finished job `id` on `device`
    pub async fn lookup(&self, device: &str, id: JobId) -> PoolResult<JobHandle> {
        self.pool(device)
            .ok_or_else(|| PoolError::UnrecognizedDevice(device.to_string()))?
            .lookup(id)
            .await
    }

    /// Clears every pool's finished map, returning the number of records dropped
    pub async fn flush_all(&self) -> usize {
        let mut flushed = 0;
        for pool in self.pools.values() {
            flushed += pool.flush().await;
        }
        flushed
    }

    /// Frees every pool
    ///
    /// Returns once every loop has exited and every running job has been
    /// cancelled or found already finished.
    pub async fn shutdown_all(&self) {
        info!("Shutting down {} device pool(s)", self.pools.len());
        for name in &self.devices {
            self.pools[name].free().await;
        }
        info!("All device pools stopped");
    }

    /// Snapshot of every pool keyed by device name
    pub async fn describe_all(&self) -> BTreeMap<String, PoolSnapshot> {
        let mut snapshots = BTreeMap::new();
        for (name, pool) in &self.pools {
            snapshots.insert(name.clone(), pool.describe().await);
        }
        snapshots
    }

    /// One `device:\t<snapshot>` line per device, in provider order
    pub async fn render(&self) -> String {
        let mut out = String::new();
        for name in &self.devices {
            let snapshot = self.pools[name].describe().await;
            let _ = writeln!(out, "{}:\t{}", name, snapshot);
        }
        out
    }
}

impl Drop for PoolManager {
    fn drop(&mut self) {
        for pool in self.pools.values() {
            pool.signal_shutdown();
        }
    }
}

impl std::fmt::Debug for PoolManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolManager")
            .field("devices", &self.devices)
            .field("config", &self.config)
            .finish()
    }
}
