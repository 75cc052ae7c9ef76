//! Device pool
//!
//! Owns one device's fixed slot array, its FIFO intake queue and the map of
//! finished jobs. A background task sweeps the slots periodically: running
//! jobs are polled, finished ones move into the finished map, and freed slots
//! are refilled from the queue.
//!
//! Two locks guard the pool. The intake lock covers the queue and the id
//! counter and is only ever held briefly, never across an await. The state
//! lock covers slots, finished map and status, and is held for a whole sweep.
//! The state lock may be held while taking the intake lock, never the
//! reverse.

use slotpool_core::{
    DeviceDescriptor, ExecutionBackend, JobId, JobState, PoolError, PoolResult, PoolSnapshot,
    PoolStatus, Submission,
};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, watch};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::config::PoolConfig;
use crate::job::JobHandle;

/// Queue side of the pool, guarded by the intake lock
struct Intake {
    next_id: JobId,
    pending: VecDeque<JobHandle>,
    accepting: bool,
}

/// Slot side of the pool, guarded by the state lock
struct PoolState {
    slots: Vec<Option<JobHandle>>,
    finished: BTreeMap<JobId, JobHandle>,
    status: PoolStatus,
    failed: usize,
}

/// What one sweep did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub completed: usize,
    pub dispatched: usize,
    pub failed: usize,
}

impl SweepReport {
    fn is_empty(&self) -> bool {
        self.completed == 0 && self.dispatched == 0 && self.failed == 0
    }
}

/// Bounded-concurrency dispatcher for one device
pub struct DevicePool {
    device: String,
    backend: Arc<dyn ExecutionBackend>,
    config: PoolConfig,
    intake: Mutex<Intake>,
    state: AsyncMutex<PoolState>,
    shutdown_tx: watch::Sender<bool>,
    /// Set once `free` has joined the loop and the pool is `Stopped`
    stopped_tx: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DevicePool {
    /// Creates a pool for a device
    ///
    /// The pool accepts work and can be swept by hand right away; `start`
    /// spawns the background loop.
    pub fn new(descriptor: DeviceDescriptor, config: PoolConfig) -> Arc<Self> {
        let (shutdown_tx, _) = watch::channel(false);
        let (stopped_tx, _) = watch::channel(false);
        let slots = vec![None; config.workers_per_device];

        Arc::new(Self {
            device: descriptor.name,
            backend: descriptor.backend,
            config,
            intake: Mutex::new(Intake {
                next_id: 0,
                pending: VecDeque::new(),
                accepting: true,
            }),
            state: AsyncMutex::new(PoolState {
                slots,
                finished: BTreeMap::new(),
                status: PoolStatus::Running,
                failed: 0,
            }),
            shutdown_tx,
            stopped_tx,
            worker: Mutex::new(None),
        })
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Spawns the scheduling loop on the current Tokio runtime
    ///
    /// Calling it again while a loop exists does nothing.
    pub fn start(self: &Arc<Self>) {
        let mut worker = self.worker.lock().unwrap();
        if worker.is_some() {
            warn!(device = %self.device, "Scheduling loop already started");
            return;
        }

        let pool = Arc::clone(self);
        let shutdown_rx = self.shutdown_tx.subscribe();
        *worker = Some(tokio::spawn(async move { pool.run(shutdown_rx).await }));
    }

    /// Queues a job and returns its handle immediately
    ///
    /// Never waits for a slot, whatever the queue depth.
    pub fn enqueue(&self, submission: Submission) -> PoolResult<JobHandle> {
        let mut intake = self.intake.lock().unwrap();
        if !intake.accepting {
            return Err(PoolError::PoolStopped(self.device.clone()));
        }

        let id = intake.next_id;
        intake.next_id += 1;

        let handle = JobHandle::new(id, self.device.clone(), submission, Arc::clone(&self.backend));
        intake.pending.push_back(handle.clone());

        debug!(device = %self.device, job_id = id, queued = intake.pending.len(), "Job enqueued");
        Ok(handle)
    }

    /// Pops the oldest queued job, if any
    pub fn dequeue(&self) -> Option<JobHandle> {
        self.intake.lock().unwrap().pending.pop_front()
    }

    /// Number of jobs waiting for a slot
    pub fn queue_depth(&self) -> usize {
        self.intake.lock().unwrap().pending.len()
    }

    /// Runs one sweep over all slots
    ///
    /// Slots are visited in ascending order. An occupied slot is polled and
    /// freed if its job completed or was cancelled. A job that cannot be
    /// polled is failed and cancelled on the backend before its slot is
    /// freed. An
    /// empty slot takes the next queued job, which is started before pausing
    /// for the grace interval.
    ///
    /// # Returns
    /// `None` once the pool is no longer running
    pub async fn sweep(&self) -> Option<SweepReport> {
        let mut state = self.state.lock().await;
        if state.status != PoolStatus::Running {
            return None;
        }

        let mut report = SweepReport::default();

        for index in 0..state.slots.len() {
            if let Some(handle) = state.slots[index].clone() {
                if handle.state() == JobState::Cancelled {
                    debug!(device = %self.device, slot = index, job_id = handle.id(), "Releasing cancelled job");
                    state.slots[index] = None;
                } else {
                    match handle.poll().await {
                        Ok(true) => {
                            handle.mark_completed();
                            state.slots[index] = None;
                            state.finished.insert(handle.id(), handle.clone());
                            report.completed += 1;
                            info!(device = %self.device, slot = index, job_id = handle.id(), "Job completed");
                        }
                        Ok(false) => {}
                        Err(e) => {
                            handle.abandon(e.to_string()).await;
                            state.slots[index] = None;
                            state.failed += 1;
                            report.failed += 1;
                            error!(device = %self.device, slot = index, job_id = handle.id(), error = %e, "Failed to poll job, releasing slot");
                        }
                    }
                }
            }

            if state.slots[index].is_none() {
                let Some(handle) = self.dequeue() else {
                    continue;
                };

                match handle.start().await {
                    Ok(()) => {
                        debug!(device = %self.device, slot = index, job_id = handle.id(), "Job dispatched");
                        state.slots[index] = Some(handle);
                        report.dispatched += 1;
                    }
                    Err(PoolError::AlreadyStarted(_)) if handle.state() == JobState::Running => {
                        // Submitted before it reached a slot; the slot keeps it tracked
                        warn!(device = %self.device, slot = index, job_id = handle.id(), "Queued job was already running");
                        state.slots[index] = Some(handle);
                    }
                    Err(e) => {
                        state.failed += 1;
                        report.failed += 1;
                        warn!(device = %self.device, slot = index, job_id = handle.id(), error = %e, "Failed to submit job");
                    }
                }

                if !self.config.grace_interval.is_zero() {
                    time::sleep(self.config.grace_interval).await;
                }
            }
        }

        Some(report)
    }

    /// Drops all finished-job records
    ///
    /// # Returns
    /// The number of records removed
    pub async fn flush(&self) -> usize {
        let mut state = self.state.lock().await;
        let flushed = state.finished.len();
        state.finished.clear();
        debug!(device = %self.device, flushed, "Flushed finished jobs");
        flushed
    }

    /// Returns the finished job with this identifier
    pub async fn lookup(&self, id: JobId) -> PoolResult<JobHandle> {
        self.state
            .lock()
            .await
            .finished
            .get(&id)
            .cloned()
            .ok_or_else(|| PoolError::NotFound {
                device: self.device.clone(),
                id,
            })
    }

    /// Identifiers of finished jobs, ascending
    pub async fn finished_ids(&self) -> Vec<JobId> {
        self.state.lock().await.finished.keys().copied().collect()
    }

    pub async fn status(&self) -> PoolStatus {
        self.state.lock().await.status
    }

    /// Consistent view of slots, queue depth and counters
    pub async fn describe(&self) -> PoolSnapshot {
        let state = self.state.lock().await;
        let queued = self.queue_depth();

        PoolSnapshot {
            device: self.device.clone(),
            status: state.status,
            slots: state
                .slots
                .iter()
                .map(|slot| slot.as_ref().map(JobHandle::id))
                .collect(),
            queued,
            finished: state.finished.len(),
            failed: state.failed,
        }
    }

    /// Stops the pool
    ///
    /// Every running job is cancelled on a best-effort basis: a job that
    /// finished in the meantime is tolerated, and its slot is cleared either
    /// way. Jobs still queued are marked discarded without contacting the
    /// backend. Returns once the scheduling loop has exited, including for
    /// callers racing an ongoing `free`; those wait for it to finish.
    pub async fn free(&self) {
        self.intake.lock().unwrap().accepting = false;
        let mut stopped = self.stopped_tx.subscribe();

        {
            let mut state = self.state.lock().await;
            if state.status != PoolStatus::Running {
                drop(state);
                let _ = stopped.wait_for(|done| *done).await;
                debug!(device = %self.device, "Pool already stopped");
                return;
            }

            for (index, slot) in state.slots.iter_mut().enumerate() {
                let Some(handle) = slot.take() else {
                    continue;
                };

                match handle.cancel().await {
                    Ok(()) => {
                        debug!(device = %self.device, slot = index, job_id = handle.id(), "Cancelled running job");
                    }
                    Err(e) if e.is_terminal_race() => {
                        debug!(device = %self.device, slot = index, job_id = handle.id(), "Job finished before it could be cancelled");
                    }
                    Err(e) => {
                        warn!(device = %self.device, slot = index, job_id = handle.id(), error = %e, "Failed to cancel job");
                    }
                }
            }

            state.status = PoolStatus::Stopping;
            self.shutdown_tx.send_replace(true);
        }

        let discarded: Vec<JobHandle> = self.intake.lock().unwrap().pending.drain(..).collect();
        for handle in &discarded {
            if handle.state() == JobState::Running {
                // Submitted outside the sweep; it still has to leave the backend
                if let Err(e) = handle.cancel().await {
                    if !e.is_terminal_race() {
                        warn!(device = %self.device, job_id = handle.id(), error = %e, "Failed to cancel queued job");
                    }
                }
            } else {
                handle.mark_discarded();
            }
        }

        let worker = self.worker.lock().unwrap().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!(device = %self.device, "Scheduling loop panicked: {}", e);
            }
        }

        self.state.lock().await.status = PoolStatus::Stopped;
        self.stopped_tx.send_replace(true);
        info!(
            device = %self.device,
            discarded = discarded.len(),
            "Device pool stopped"
        );
    }

    /// Stops intake and wakes the loop so it exits, without waiting
    ///
    /// Running jobs are left on the backend. Used when a manager is dropped
    /// without an orderly shutdown.
    pub(crate) fn signal_shutdown(&self) {
        self.intake.lock().unwrap().accepting = false;
        self.shutdown_tx.send_replace(true);
    }

    /// The scheduling loop
    async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            device = %self.device,
            slots = self.config.workers_per_device,
            "Starting scheduling loop (interval: {:?}, grace: {:?})",
            self.config.poll_interval,
            self.config.grace_interval
        );

        loop {
            match self.sweep().await {
                Some(report) if !report.is_empty() => {
                    debug!(
                        device = %self.device,
                        completed = report.completed,
                        dispatched = report.dispatched,
                        failed = report.failed,
                        "Sweep finished"
                    );
                }
                Some(_) => {}
                None => break,
            }

            tokio::select! {
                _ = time::sleep(self.config.poll_interval) => {}
                _ = shutdown.changed() => break,
            }
        }

        info!(device = %self.device, "Scheduling loop exited");
    }
}

impl std::fmt::Debug for DevicePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevicePool")
            .field("device", &self.device)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotpool_core::JobOutcome;
    use slotpool_sim::{JobScript, SimBackend};
    use std::time::Duration;

    fn pool(backend: &SimBackend, config: PoolConfig) -> Arc<DevicePool> {
        DevicePool::new(
            DeviceDescriptor::new(backend.device(), Arc::new(backend.clone())),
            config,
        )
    }

    fn job(name: &str) -> Submission {
        Submission::new(serde_json::json!({ "name": name }))
    }

    fn looping_config(workers: usize) -> PoolConfig {
        PoolConfig::new(workers, Duration::from_millis(5)).with_grace_interval(Duration::ZERO)
    }

    async fn wait_until_running(handle: &JobHandle) {
        time::timeout(Duration::from_secs(5), async {
            while handle.state() != JobState::Running {
                time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("job should be dispatched");
    }

    async fn slot_ids(pool: &DevicePool) -> Vec<Option<JobId>> {
        pool.describe().await.slots
    }

    #[tokio::test]
    async fn test_identifiers_strictly_increase() {
        let backend = SimBackend::new("sim_a");
        let pool = pool(&backend, PoolConfig::test_mode(2));

        let ids: Vec<JobId> = (0..5)
            .map(|i| pool.enqueue(job(&i.to_string())).unwrap().id())
            .collect();

        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
        assert_eq!(pool.queue_depth(), 5);
    }

    #[tokio::test]
    async fn test_dequeue_is_fifo() {
        let backend = SimBackend::new("sim_a");
        let pool = pool(&backend, PoolConfig::test_mode(1));

        pool.enqueue(job("a")).unwrap();
        pool.enqueue(job("b")).unwrap();

        assert_eq!(pool.dequeue().map(|h| h.id()), Some(0));
        assert_eq!(pool.dequeue().map(|h| h.id()), Some(1));
        assert!(pool.dequeue().is_none());
    }

    #[tokio::test]
    async fn test_enqueue_does_not_wait_for_slots() {
        let backend = SimBackend::with_default_script("sim_a", JobScript::Never);
        let pool = pool(&backend, PoolConfig::test_mode(1));

        pool.enqueue(job("first")).unwrap();
        pool.sweep().await.unwrap();

        // The only slot is busy and stays busy; enqueue still returns at once
        for i in 0..1000 {
            let handle = pool.enqueue(job(&i.to_string())).unwrap();
            assert_eq!(handle.state(), JobState::Created);
        }
        assert_eq!(pool.queue_depth(), 1000);
    }

    #[tokio::test]
    async fn test_two_slot_scenario() {
        let backend = SimBackend::new("sim_a");
        backend
            .script(JobScript::CompleteAfter(1))
            .script(JobScript::Never)
            .script(JobScript::Never);
        let pool = pool(&backend, PoolConfig::test_mode(2));

        let a = pool.enqueue(job("A")).unwrap();
        let b = pool.enqueue(job("B")).unwrap();
        let c = pool.enqueue(job("C")).unwrap();

        let first = pool.sweep().await.unwrap();
        assert_eq!(first.dispatched, 2);
        assert_eq!(slot_ids(&pool).await, vec![Some(a.id()), Some(b.id())]);
        assert_eq!(pool.queue_depth(), 1);
        assert_eq!(a.state(), JobState::Running);
        assert_eq!(c.state(), JobState::Created);

        let second = pool.sweep().await.unwrap();
        assert_eq!(second.completed, 1);
        assert_eq!(second.dispatched, 1);
        assert_eq!(slot_ids(&pool).await, vec![Some(c.id()), Some(b.id())]);
        assert_eq!(pool.queue_depth(), 0);
        assert_eq!(pool.finished_ids().await, vec![0]);
        assert_eq!(a.state(), JobState::Completed);
        assert_eq!(c.state(), JobState::Running);

        let finished = pool.lookup(0).await.unwrap();
        assert_eq!(finished.id(), a.id());
        assert!(matches!(finished.result().await.unwrap(), JobOutcome::Ready(_)));
    }

    #[tokio::test]
    async fn test_running_jobs_never_exceed_slots() {
        let backend = SimBackend::with_default_script("sim_a", JobScript::CompleteAfter(2));
        let pool = pool(&backend, PoolConfig::test_mode(3));

        for i in 0..10 {
            pool.enqueue(job(&i.to_string())).unwrap();
        }

        for _ in 0..30 {
            pool.sweep().await.unwrap();
            assert!(pool.describe().await.running() <= 3);
        }

        assert_eq!(pool.finished_ids().await.len(), 10);
        assert_eq!(backend.max_in_flight(), 3);
    }

    #[tokio::test]
    async fn test_poll_failure_releases_slot() {
        let backend = SimBackend::new("sim_a");
        backend.script(JobScript::FailPoll).script(JobScript::Never);
        let pool = pool(&backend, PoolConfig::test_mode(1));

        let broken = pool.enqueue(job("broken")).unwrap();
        let next = pool.enqueue(job("next")).unwrap();

        pool.sweep().await.unwrap();
        let report = pool.sweep().await.unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.dispatched, 1);
        assert_eq!(broken.state(), JobState::Failed);
        assert_eq!(next.state(), JobState::Running);
        assert_eq!(slot_ids(&pool).await, vec![Some(next.id())]);
        assert_eq!(pool.describe().await.failed, 1);
        // The broken job was withdrawn, so only the refill is on the device
        assert_eq!(backend.cancelled(), vec![broken.remote_id().unwrap()]);
        assert_eq!(backend.in_flight(), 1);
    }

    #[tokio::test]
    async fn test_rejected_submission_leaves_slot_empty() {
        let backend = SimBackend::new("sim_a");
        backend.script(JobScript::RejectSubmit);
        let pool = pool(&backend, PoolConfig::test_mode(1));

        let rejected = pool.enqueue(job("rejected")).unwrap();
        let report = pool.sweep().await.unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(rejected.state(), JobState::Failed);
        assert_eq!(slot_ids(&pool).await, vec![None]);
    }

    #[tokio::test]
    async fn test_cancelled_job_frees_slot() {
        let backend = SimBackend::with_default_script("sim_a", JobScript::Never);
        let pool = pool(&backend, PoolConfig::test_mode(1));

        let first = pool.enqueue(job("first")).unwrap();
        let second = pool.enqueue(job("second")).unwrap();
        pool.sweep().await.unwrap();

        first.cancel().await.unwrap();
        pool.sweep().await.unwrap();

        assert_eq!(slot_ids(&pool).await, vec![Some(second.id())]);
        assert!(pool.finished_ids().await.is_empty());
    }

    #[tokio::test]
    async fn test_flush_and_lookup() {
        let backend = SimBackend::with_default_script("sim_a", JobScript::CompleteAfter(0));
        let pool = pool(&backend, PoolConfig::test_mode(2));

        pool.enqueue(job("a")).unwrap();
        let b = pool.enqueue(job("b")).unwrap();
        pool.enqueue(job("c")).unwrap();
        pool.sweep().await.unwrap();
        pool.sweep().await.unwrap();

        assert_eq!(pool.finished_ids().await, vec![0, 1]);
        assert!(pool.lookup(b.id()).await.is_ok());

        assert_eq!(pool.flush().await, 2);
        let missing = pool.lookup(0).await;
        assert!(matches!(missing, Err(PoolError::NotFound { id: 0, .. })));
        // Job c is still running, flush leaves it alone
        assert_eq!(pool.describe().await.running(), 1);
    }

    #[tokio::test]
    async fn test_lookup_unknown_id() {
        let backend = SimBackend::new("sim_a");
        let pool = pool(&backend, PoolConfig::test_mode(1));

        let err = pool.lookup(42).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_describe_renders_slots() {
        let backend = SimBackend::with_default_script("sim_a", JobScript::Never);
        let pool = pool(&backend, PoolConfig::test_mode(3));

        for i in 0..5 {
            pool.enqueue(job(&i.to_string())).unwrap();
        }
        pool.sweep().await.unwrap();

        let snapshot = pool.describe().await;
        assert_eq!(snapshot.to_string(), "[X][X][X] : 2 queued, 0 finished");
        assert_eq!(snapshot.status, PoolStatus::Running);
    }

    #[tokio::test]
    async fn test_free_cancels_running_and_discards_queued() {
        let backend = SimBackend::with_default_script("sim_a", JobScript::Never);
        let pool = pool(&backend, PoolConfig::test_mode(2));

        let a = pool.enqueue(job("a")).unwrap();
        let b = pool.enqueue(job("b")).unwrap();
        let c = pool.enqueue(job("c")).unwrap();
        pool.sweep().await.unwrap();

        pool.free().await;

        assert_eq!(a.state(), JobState::Cancelled);
        assert_eq!(b.state(), JobState::Cancelled);
        assert_eq!(c.state(), JobState::Discarded);
        assert_eq!(backend.cancelled().len(), 2);
        assert_eq!(backend.submitted().len(), 2);

        let snapshot = pool.describe().await;
        assert_eq!(snapshot.status, PoolStatus::Stopped);
        assert_eq!(snapshot.running(), 0);
        assert_eq!(snapshot.queued, 0);
    }

    #[tokio::test]
    async fn test_free_tolerates_cancel_race() {
        let backend = SimBackend::new("sim_a");
        backend.script(JobScript::FinishOnCancel);
        let pool = pool(&backend, looping_config(1));
        pool.start();

        let racing = pool.enqueue(job("racing")).unwrap();
        wait_until_running(&racing).await;

        pool.free().await;

        assert_eq!(pool.status().await, PoolStatus::Stopped);
        assert_eq!(pool.describe().await.running(), 0);
        assert!(pool.worker.lock().unwrap().is_none());
        assert!(backend.cancelled().is_empty());
    }

    #[tokio::test]
    async fn test_no_dispatch_after_free() {
        let backend = SimBackend::with_default_script("sim_a", JobScript::Never);
        let pool = pool(&backend, looping_config(1));
        pool.start();

        let running = pool.enqueue(job("running")).unwrap();
        let waiting: Vec<JobHandle> = (0..3)
            .map(|i| pool.enqueue(job(&i.to_string())).unwrap())
            .collect();
        wait_until_running(&running).await;

        pool.free().await;
        pool.free().await;

        assert!(matches!(
            pool.enqueue(job("late")),
            Err(PoolError::PoolStopped(_))
        ));
        assert!(pool.sweep().await.is_none());

        // Several poll intervals pass without anything reaching the backend
        time::sleep(Duration::from_millis(50)).await;
        assert_eq!(backend.submitted(), vec![running.remote_id().unwrap()]);
        assert!(waiting.iter().all(|h| h.state() == JobState::Discarded));
        assert_eq!(backend.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_free_waits_for_loop_exit() {
        let backend = SimBackend::with_default_script("sim_a", JobScript::Never);
        let config =
            PoolConfig::new(1, Duration::from_secs(3600)).with_grace_interval(Duration::ZERO);
        let pool = pool(&backend, config);
        pool.start();
        pool.enqueue(job("running")).unwrap();
        time::sleep(Duration::from_millis(10)).await;

        let (_, after_second) = tokio::join!(pool.free(), async {
            pool.free().await;
            // The loop task owned the other reference; it is gone once the loop exits
            (pool.status().await, Arc::strong_count(&pool))
        });

        assert_eq!(after_second, (PoolStatus::Stopped, 1));
        assert_eq!(backend.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_job_started_while_queued_stays_tracked() {
        let backend = SimBackend::with_default_script("sim_a", JobScript::Never);
        let pool = pool(&backend, PoolConfig::test_mode(1));

        let a = pool.enqueue(job("a")).unwrap();
        let b = pool.enqueue(job("b")).unwrap();
        pool.sweep().await.unwrap();
        b.start().await.unwrap();

        // The only slot is busy, so b is still queued but already on the backend
        pool.sweep().await.unwrap();
        assert_eq!(pool.queue_depth(), 1);
        assert_eq!(backend.in_flight(), 2);

        pool.free().await;
        assert_eq!(a.state(), JobState::Cancelled);
        assert_eq!(b.state(), JobState::Cancelled);
        assert_eq!(backend.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_sweep_adopts_job_started_while_queued() {
        let backend = SimBackend::with_default_script("sim_a", JobScript::Never);
        let pool = pool(&backend, PoolConfig::test_mode(1));

        let early = pool.enqueue(job("early")).unwrap();
        early.start().await.unwrap();

        let report = pool.sweep().await.unwrap();
        assert_eq!(report.failed, 0);
        assert_eq!(slot_ids(&pool).await, vec![Some(early.id())]);
        assert_eq!(backend.submitted().len(), 1);

        pool.free().await;
        assert_eq!(early.state(), JobState::Cancelled);
        assert_eq!(backend.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_background_loop_drains_queue() {
        let backend = SimBackend::with_default_script("sim_a", JobScript::CompleteAfter(1));
        let pool = pool(&backend, looping_config(2));
        pool.start();

        let handles: Vec<JobHandle> = (0..6)
            .map(|i| pool.enqueue(job(&i.to_string())).unwrap())
            .collect();

        time::timeout(Duration::from_secs(5), async {
            while pool.finished_ids().await.len() < handles.len() {
                time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("loop should finish every job");

        assert!(handles.iter().all(|h| h.state() == JobState::Completed));
        assert!(backend.max_in_flight() <= 2);
        pool.free().await;
    }

    #[tokio::test]
    async fn test_free_preempts_poll_wait() {
        let backend = SimBackend::new("sim_a");
        let pool = pool(&backend, PoolConfig::new(1, Duration::from_secs(3600)));
        pool.start();
        time::sleep(Duration::from_millis(10)).await;

        time::timeout(Duration::from_secs(5), pool.free())
            .await
            .expect("free should not wait out the poll interval");
    }

    #[tokio::test]
    async fn test_grace_interval_spaces_submissions() {
        let backend = SimBackend::with_default_script("sim_a", JobScript::Never);
        let config = PoolConfig::test_mode(3).with_grace_interval(Duration::from_millis(20));
        let pool = pool(&backend, config);

        for i in 0..3 {
            pool.enqueue(job(&i.to_string())).unwrap();
        }

        let started = time::Instant::now();
        pool.sweep().await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(60));
        assert_eq!(backend.submitted().len(), 3);
    }
}
