//! Cron-driven resource synchronizer (§4.4): one instance per directed
//! (local, remote) node-pair of a resource.
//!
//! Grounded on `dns/intelligent_failover.rs` (state transitions driven off
//! the last observed health result, swapped atomically) and
//! `dns/shutdown.rs::ShutdownCoordinator` (a cancellation broadcast checked
//! at every suspension point).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use chrono::Local;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::events::{ClusterEvent, EventSink};
use crate::ids::{NodeId, ResourceId};
use crate::monitor::{DnsClassification, ResourceDnsResult, ResourceMonitor};
use crate::schedule::CombinedSchedule;
use crate::sync::{OperationResult, SyncContext, SynchronizerPlugin};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynchronizerState {
    Disabled,
    Sleeping,
    Testing,
    Synchronizing,
    Stopped,
}

/// How long a single `test`/`synchronize` dispatch is allowed to run before
/// being cancelled and reported as an `ERROR` result (§4.4).
pub struct OperationTimeouts {
    pub synchronize: Duration,
    pub test: Duration,
}

impl Default for OperationTimeouts {
    fn default() -> Self {
        OperationTimeouts {
            synchronize: Duration::from_secs(300),
            test: Duration::from_secs(60),
        }
    }
}

struct RunNowFlags {
    synchronize: AtomicBool,
    test: AtomicBool,
}

impl RunNowFlags {
    fn new() -> Self {
        RunNowFlags {
            synchronize: AtomicBool::new(false),
            test: AtomicBool::new(false),
        }
    }

    /// Flags are consumed (reset to false) on every tick whether or not the
    /// attempt was actually eligible (§4.4) — a request expires after one tick.
    fn take_synchronize(&self) -> bool {
        self.synchronize.swap(false, Ordering::AcqRel)
    }

    fn take_test(&self) -> bool {
        self.test.swap(false, Ordering::AcqRel)
    }
}

struct CancellationToken {
    generation: Arc<AtomicU64>,
}

impl CancellationToken {
    fn new() -> Self {
        CancellationToken {
            generation: Arc::new(AtomicU64::new(0)),
        }
    }
    fn snapshot(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
    fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::Acquire) == generation
    }
}

/// Per-directed-pair synchronizer (§4.4). Operates only when the cluster,
/// the resource, the local node and the remote node are all enabled.
pub struct ResourceSynchronizer {
    resource_id: ResourceId,
    local_node_id: NodeId,
    remote_node_id: NodeId,
    plugin: Arc<dyn SynchronizerPlugin>,
    schedule: CombinedSchedule,
    timeouts: OperationTimeouts,
    monitor: Arc<ResourceMonitor>,
    enabled: bool,
    event_sink: Arc<dyn EventSink>,

    state: Mutex<SynchronizerState>,
    run_now: RunNowFlags,
    last_test_result: ArcSwapOption<OperationResult>,
    last_synchronization_result: ArcSwapOption<OperationResult>,
    token: CancellationToken,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    build_context: Box<dyn Fn() -> Option<SyncContext> + Send + Sync>,
    worker_permits: Arc<Semaphore>,
}

impl ResourceSynchronizer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        resource_id: ResourceId,
        local_node_id: NodeId,
        remote_node_id: NodeId,
        plugin: Arc<dyn SynchronizerPlugin>,
        schedule: CombinedSchedule,
        timeouts: OperationTimeouts,
        monitor: Arc<ResourceMonitor>,
        enabled: bool,
        build_context: Box<dyn Fn() -> Option<SyncContext> + Send + Sync>,
        worker_permits: Arc<Semaphore>,
        event_sink: Arc<dyn EventSink>,
    ) -> Arc<ResourceSynchronizer> {
        Arc::new(ResourceSynchronizer {
            resource_id,
            local_node_id,
            remote_node_id,
            plugin,
            schedule,
            timeouts,
            monitor,
            enabled,
            event_sink,
            state: Mutex::new(if enabled { SynchronizerState::Sleeping } else { SynchronizerState::Disabled }),
            run_now: RunNowFlags::new(),
            last_test_result: ArcSwapOption::from(None),
            last_synchronization_result: ArcSwapOption::from(None),
            token: CancellationToken::new(),
            task: Mutex::new(None),
            build_context,
            worker_permits,
        })
    }

    pub fn state(&self) -> SynchronizerState {
        *self.state.lock()
    }

    pub fn last_test_result(&self) -> Option<Arc<OperationResult>> {
        self.last_test_result.load_full()
    }

    pub fn last_synchronization_result(&self) -> Option<Arc<OperationResult>> {
        self.last_synchronization_result.load_full()
    }

    /// A `runNow` call while not in `SLEEPING` is silently ignored (§4.4).
    pub fn request_synchronize_now(&self) {
        if self.state() == SynchronizerState::Sleeping {
            self.run_now.synchronize.store(true, Ordering::Release);
        }
    }

    pub fn request_test_now(&self) {
        if self.state() == SynchronizerState::Sleeping {
            self.run_now.test.store(true, Ordering::Release);
        }
    }

    pub fn start(self: &Arc<Self>, tick_interval: Duration) {
        if !self.enabled {
            *self.state.lock() = SynchronizerState::Disabled;
            return;
        }

        *self.state.lock() = SynchronizerState::Sleeping;
        let synchronizer = self.clone();
        let generation = synchronizer.token.snapshot();
        let mut guard = self.task.lock();
        *guard = Some(tokio::spawn(async move {
            synchronizer.run_loop(generation, tick_interval).await;
        }));
    }

    pub fn stop(&self) {
        self.token.cancel();
        *self.state.lock() = SynchronizerState::Stopped;
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }
    }

    async fn run_loop(self: Arc<Self>, generation: u64, tick_interval: Duration) {
        let mut ticker = tokio::time::interval(tick_interval);
        loop {
            ticker.tick().await;
            if !self.token.is_current(generation) {
                return;
            }
            self.tick().await;
            if !self.token.is_current(generation) {
                return;
            }
        }
    }

    /// §4.4 mode semantics, evaluated once per tick. No catch-up: the
    /// schedule is checked against *now*, not against whatever minute was
    /// last observed, so an overslept wakeup simply finds no match (§9).
    #[tracing::instrument(name = "sync_tick", skip(self), fields(resource = %self.resource_id, local = %self.local_node_id, remote = %self.remote_node_id))]
    async fn tick(&self) {
        if self.state() != SynchronizerState::Sleeping {
            // A previous op is still in flight or we're disabled/stopped.
            self.run_now.take_synchronize();
            self.run_now.take_test();
            return;
        }

        let now = Local::now();
        let synchronize_due = self.run_now.take_synchronize() || self.schedule.synchronize.matches_now(now);
        let test_due = self.run_now.take_test() || self.schedule.test.matches_now(now);

        let Some(last_dns) = self.monitor.last_result() else {
            return;
        };

        if last_dns.status() == crate::status::Status::Inconsistent {
            // "Never run while the resource DNS status is INCONSISTENT" (§4.4).
            return;
        }

        let (local_class, remote_class) = self.classify(&last_dns);

        if synchronize_due && self.plugin.can_synchronize(local_class, remote_class) {
            self.run_operation(SynchronizerState::Synchronizing, self.timeouts.synchronize, true).await;
        } else if test_due && self.plugin.can_test(local_class, remote_class) {
            self.run_operation(SynchronizerState::Testing, self.timeouts.test, false).await;
        }
    }

    fn classify(&self, result: &ResourceDnsResult) -> (DnsClassification, DnsClassification) {
        let local = result
            .node_results
            .get(&self.local_node_id)
            .map(|n| n.node_status)
            .unwrap_or(DnsClassification::Unknown);
        let remote = result
            .node_results
            .get(&self.remote_node_id)
            .map(|n| n.node_status)
            .unwrap_or(DnsClassification::Unknown);
        (local, remote)
    }

    async fn run_operation(&self, running_state: SynchronizerState, timeout: Duration, is_synchronize: bool) {
        let Some(ctx) = (self.build_context)() else {
            return;
        };

        // §9 "NORM-1" substitute: block on a pool-wide permit so
        // synchronizer operations never outnumber the capacity reserved
        // for them, leaving headroom for DNS monitor ticks.
        let Ok(_permit) = self.worker_permits.acquire().await else {
            return;
        };

        *self.state.lock() = running_state;

        let plugin = self.plugin.clone();
        let op_name = if is_synchronize { "synchronize" } else { "test" };
        tracing::debug!(resource = %self.resource_id, local = %self.local_node_id, remote = %self.remote_node_id, op = op_name, "dispatching operation");
        let outcome = tokio::time::timeout(timeout, async {
            if is_synchronize {
                plugin.synchronize(&ctx).await
            } else {
                plugin.test(&ctx).await
            }
        })
        .await;

        let result = match outcome {
            Ok(result) => {
                let event = if is_synchronize {
                    ClusterEvent::SynchronizeCompleted {
                        resource_id: self.resource_id.clone(),
                        local: self.local_node_id.clone(),
                        remote: self.remote_node_id.clone(),
                        status: result.status(),
                    }
                } else {
                    ClusterEvent::TestCompleted {
                        resource_id: self.resource_id.clone(),
                        local: self.local_node_id.clone(),
                        remote: self.remote_node_id.clone(),
                        status: result.status(),
                    }
                };
                self.event_sink.record(event);
                result
            }
            Err(_) => {
                tracing::warn!(resource = %self.resource_id, local = %self.local_node_id, remote = %self.remote_node_id, op = op_name, "operation timed out");
                self.event_sink.record(ClusterEvent::OperationTimedOut {
                    resource_id: self.resource_id.clone(),
                    local: self.local_node_id.clone(),
                    remote: self.remote_node_id.clone(),
                    operation: op_name,
                });
                OperationResult::timeout(op_name, timeout, Vec::new())
            }
        };

        if is_synchronize {
            self.last_synchronization_result.store(Some(Arc::new(result)));
        } else {
            self.last_test_result.store(Some(Arc::new(result)));
        }

        // §4.4 "a synchronize also counts as a test" — but we don't overwrite
        // lastTestResult with the synchronize's result: the two slots track
        // independently what the spec calls lastSynchronizationResult /
        // lastTestResult, each replaced only by its own operation kind.

        *self.state.lock() = SynchronizerState::Sleeping;
    }
}

/// Caps concurrent synchronizer operations across the whole cluster so DNS
/// monitor ticks are never starved (§9 "NORM-1" open question — there is no
/// portable thread-priority equivalent, so a semaphore below the pool's
/// total capacity substitutes for "one step below normal priority").
pub struct SynchronizerWorkerLimit {
    semaphore: Arc<Semaphore>,
}

impl SynchronizerWorkerLimit {
    pub fn new(permits: usize) -> SynchronizerWorkerLimit {
        SynchronizerWorkerLimit {
            semaphore: Arc::new(Semaphore::new(permits.max(1))),
        }
    }

    pub fn handle(&self) -> Arc<Semaphore> {
        self.semaphore.clone()
    }
}
