//! Cluster coordinator (§4.5): cluster-wide lifecycle, the shared worker
//! pool, the configuration-change listener, and aggregate status.
//!
//! Grounded on `dns/context.rs::ServerContext::initialize` (construct once,
//! `initialize()` wires dependent subsystems in order) and
//! `bin/atlas.rs::main` (context, then servers, in a fixed start order).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use derive_more::{Display, Error, From};
use parking_lot::Mutex;

use crate::config::{ConfigError, ConfigListener, ConfigurationSource};
use crate::dns::resolver_cache::NameserverHealth;
use crate::dns::ResolverCache;
use crate::events::{ClusterEvent, EventSink, LoggingEventSink};
use crate::ids::{NameserverHostname, NodeId, RecordName, ResourceId};
use crate::model::{ClusterModel, ModelError, Node, Resource, ResourceNode};
use crate::monitor::{ResourceMonitor, DEFAULT_DNS_CHECK_INTERVAL};
use crate::schedule::{CombinedSchedule, CronSchedule, ScheduleParseError};
use crate::status::Status;
use crate::sync::{PluginRegistry, SyncContext};
use crate::synchronizer::{OperationTimeouts, ResourceSynchronizer, SynchronizerWorkerLimit};

const DEFAULT_SYNCHRONIZER_TICK_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Display, Error, From)]
pub enum ClusterError {
    #[display(fmt = "configuration error: {}", _0)]
    Config(ConfigError),
    #[display(fmt = "configuration validation failed: {}", _0)]
    Model(ModelError),
    #[display(fmt = "could not parse schedule: {}", _0)]
    Schedule(ScheduleParseError),
    #[display(fmt = "could not determine this node: local hostname {} matches no configured node", _0)]
    CannotDetermineThisNode(#[error(not(source))] String),
}

#[derive(Debug, Clone)]
pub struct ClusterStatus {
    pub status: Status,
    pub enabled: bool,
    pub started: bool,
    pub resources: BTreeMap<ResourceId, Status>,
    pub nodes: BTreeMap<NodeId, Status>,
    pub nameservers: BTreeMap<NameserverHostname, NameserverHealth>,
}

struct Runtime {
    model: ClusterModel,
    this_node: NodeId,
    monitors: BTreeMap<ResourceId, Arc<ResourceMonitor>>,
    synchronizers: Vec<Arc<ResourceSynchronizer>>,
    config_listener: Option<ConfigListener>,
}

/// §4.5: `start`/`stop` idempotent under the `started` guard.
pub struct ClusterCoordinator {
    config_source: Arc<dyn ConfigurationSource>,
    event_sink: Arc<dyn EventSink>,
    plugin_registry: Arc<PluginRegistry>,
    resolver_timeout: Duration,
    monitor_interval: Duration,
    synchronizer_permits: usize,
    started: AtomicBool,
    runtime: Mutex<Option<Runtime>>,
    last_status: ArcSwap<ClusterStatus>,
}

impl ClusterCoordinator {
    pub fn new(
        config_source: Arc<dyn ConfigurationSource>,
        event_sink: Arc<dyn EventSink>,
        plugin_registry: Arc<PluginRegistry>,
    ) -> Arc<ClusterCoordinator> {
        Arc::new(ClusterCoordinator {
            config_source,
            event_sink,
            plugin_registry,
            resolver_timeout: crate::dns::resolver_cache::DEFAULT_LOOKUP_TIMEOUT,
            monitor_interval: DEFAULT_DNS_CHECK_INTERVAL,
            synchronizer_permits: 4,
            started: AtomicBool::new(false),
            runtime: Mutex::new(None),
            last_status: ArcSwap::from_pointee(ClusterStatus {
                status: Status::Stopped,
                enabled: false,
                started: false,
                resources: BTreeMap::new(),
                nodes: BTreeMap::new(),
                nameservers: BTreeMap::new(),
            }),
        })
    }

    pub fn with_defaults(config_source: Arc<dyn ConfigurationSource>) -> Arc<ClusterCoordinator> {
        Self::new(config_source, Arc::new(LoggingEventSink), Arc::new(PluginRegistry::with_builtin_plugins()))
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// §4.5 start: idempotent.
    pub fn start(self: &Arc<Self>) -> Result<(), ClusterError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        match self.start_inner() {
            Ok(()) => {
                self.event_sink.record(ClusterEvent::ClusterStarted);
                Ok(())
            }
            Err(e) => {
                self.started.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    fn start_inner(self: &Arc<Self>) -> Result<(), ClusterError> {
        // Step 1: start the configuration source and register a change listener (§9).
        self.config_source.start()?;

        let coordinator = self.clone();
        let listener: ConfigListener = Arc::new(move || {
            // "On configuration-change callback: stop then start; thrown
            // errors during the restart are logged, not propagated." (§4.5)
            coordinator.stop();
            if let Err(e) = coordinator.start() {
                tracing::error!(error = %e, "restart after configuration reload failed");
            }
        });
        self.config_source.add_listener(listener.clone());

        // Steps 2-3: read and validate configuration, build `nodes`/`resources`.
        let snapshot = self.config_source.snapshot();
        let (nodes, resources) = build_model(&snapshot)?;
        let model = ClusterModel::new(nodes, resources)?;

        // Step 4: determine `thisNode`.
        let this_node = determine_this_node(&model)?;

        // Step 5/6: the worker pool / event sink are process-wide and already
        // held by this coordinator; nothing to construct per start.

        // Step 7: instantiate each resource via its factory and start its monitor.
        let resolver_cache = Arc::new(ResolverCache::new(self.resolver_timeout));
        let worker_limit = SynchronizerWorkerLimit::new(self.synchronizer_permits);

        let mut monitors = BTreeMap::new();
        let mut synchronizers = Vec::new();

        for resource in model.resources.values() {
            let monitor = ResourceMonitor::new(
                resource.clone(),
                model.nodes.clone(),
                snapshot.enabled,
                resolver_cache.clone(),
                self.monitor_interval,
                self.event_sink.clone(),
            );
            monitor.start();
            monitors.insert(resource.id.clone(), monitor.clone());

            let plugin = self.plugin_registry.resolve(&resource.resource_type, &resource.id);
            let Some(plugin) = plugin else {
                tracing::warn!(resource = %resource.id, resource_type = %resource.resource_type, "no synchronizer plug-in registered for this resource type");
                continue;
            };

            for remote_rn in resource.resource_nodes.values() {
                if remote_rn.node_id == this_node {
                    continue;
                }
                let Some(local_rn) = resource.resource_nodes.get(&this_node) else {
                    continue;
                };

                let schedule = resource_schedule(resource)?;
                let local_node_id = this_node.clone();
                let remote_node_id = remote_rn.node_id.clone();
                let resource_for_ctx = resource.clone();
                let model_for_ctx = model.clone();
                let local_rn = local_rn.clone();
                let remote_rn = remote_rn.clone();

                let build_context = Box::new(move || -> Option<SyncContext> {
                    let local_node = model_for_ctx.nodes.get(&local_node_id)?.clone();
                    let remote_node = model_for_ctx.nodes.get(&remote_node_id)?.clone();
                    Some(SyncContext {
                        resource: resource_for_ctx.clone(),
                        local_node,
                        remote_node,
                        local_resource_node: local_rn.clone(),
                        remote_resource_node: remote_rn.clone(),
                    })
                });

                let enabled = snapshot.enabled
                    && resource.enabled
                    && model.nodes.get(&this_node).map(|n| n.enabled).unwrap_or(false)
                    && model.nodes.get(&remote_rn.node_id).map(|n| n.enabled).unwrap_or(false);

                let synchronizer = ResourceSynchronizer::new(
                    resource.id.clone(),
                    this_node.clone(),
                    remote_rn.node_id.clone(),
                    plugin.clone(),
                    schedule,
                    OperationTimeouts::default(),
                    monitor.clone(),
                    enabled,
                    build_context,
                    worker_limit.handle(),
                    self.event_sink.clone(),
                );
                synchronizer.start(DEFAULT_SYNCHRONIZER_TICK_INTERVAL);
                synchronizers.push(synchronizer);
            }
        }

        *self.runtime.lock() = Some(Runtime {
            model,
            this_node,
            monitors,
            synchronizers,
            config_listener: Some(listener),
        });

        Ok(())
    }

    /// §4.5 stop: tears down in reverse order; idempotent.
    pub fn stop(self: &Arc<Self>) {
        if !self.started.swap(false, Ordering::AcqRel) {
            return;
        }

        if let Some(runtime) = self.runtime.lock().take() {
            for synchronizer in &runtime.synchronizers {
                synchronizer.stop();
            }
            for monitor in runtime.monitors.values() {
                monitor.stop();
            }
            if let Some(listener) = &runtime.config_listener {
                self.config_source.remove_listener(listener);
            }
        }

        self.config_source.stop();
        self.event_sink.record(ClusterEvent::ClusterStopped);
    }

    /// §4.5 "Aggregate status() = max(status over all resources, over all
    /// nodes, over all nameservers, over the cluster's own enabled/running
    /// state)".
    pub fn status(&self) -> Arc<ClusterStatus> {
        let guard = self.runtime.lock();
        let Some(runtime) = guard.as_ref() else {
            return self.last_status.load_full();
        };

        let mut resources = BTreeMap::new();
        let mut nameservers: BTreeMap<NameserverHostname, NameserverHealth> = BTreeMap::new();
        let mut rolled = if self.is_started() { Status::Healthy } else { Status::Stopped };

        for (resource_id, monitor) in &runtime.monitors {
            let status = monitor.last_result().map(|r| r.status()).unwrap_or_default();
            resources.insert(resource_id.clone(), status);
            rolled = rolled.max(status);

            for (key, health) in monitor.resolver_cache().health_snapshot() {
                nameservers.insert(NameserverHostname::new(key), health);
            }
        }

        let mut nodes = BTreeMap::new();
        for (node_id, node) in &runtime.model.nodes {
            let status = if !node.enabled { Status::Disabled } else { Status::Healthy };
            nodes.insert(node_id.clone(), status);
            rolled = rolled.max(status);
        }

        let status = Arc::new(ClusterStatus {
            status: rolled,
            enabled: true,
            started: self.is_started(),
            resources,
            nodes,
            nameservers,
        });
        self.last_status.store(status.clone());
        status
    }
}

fn resource_schedule(resource: &Resource) -> Result<CombinedSchedule, ClusterError> {
    let synchronize_expr = resource.params.get("synchronizeSchedule").map(String::as_str).unwrap_or("0 0 0 * * *");
    let test_expr = resource.params.get("testSchedule").map(String::as_str).unwrap_or("0 */15 * * * *");
    Ok(CombinedSchedule {
        synchronize: CronSchedule::parse(synchronize_expr)?,
        test: CronSchedule::parse(test_expr)?,
    })
}

/// §4.5 step 4: compare the local hostname to configured node hostnames
/// (case-insensitively, since hostnames are DNS names).
pub fn determine_this_node(model: &ClusterModel) -> Result<NodeId, ClusterError> {
    let local_hostname = std::env::var("HOSTNAME")
        .ok()
        .or_else(|| hostname_fallback())
        .unwrap_or_default();

    model
        .nodes
        .values()
        .find(|n| n.hostname.as_str().eq_ignore_ascii_case(&local_hostname))
        .map(|n| n.id.clone())
        .ok_or(ClusterError::CannotDetermineThisNode(local_hostname))
}

#[cfg(unix)]
fn hostname_fallback() -> Option<String> {
    std::fs::read_to_string("/etc/hostname").ok().map(|s| s.trim().to_string())
}

#[cfg(not(unix))]
fn hostname_fallback() -> Option<String> {
    None
}

pub fn build_model(
    snapshot: &crate::config::ConfigSnapshot,
) -> Result<(BTreeMap<NodeId, Node>, BTreeMap<ResourceId, Resource>), ClusterError> {
    let mut nodes = BTreeMap::new();
    for node_config in &snapshot.nodes {
        nodes.insert(
            NodeId::new(node_config.id.clone()),
            Node {
                id: NodeId::new(node_config.id.clone()),
                display_name: node_config.display.clone(),
                enabled: node_config.enabled,
                hostname: NameserverHostname::new(node_config.hostname.clone()),
                nameservers: node_config.nameservers.iter().cloned().map(NameserverHostname::new).collect(),
            },
        );
    }

    let mut resources = BTreeMap::new();
    for resource_config in &snapshot.resources {
        let mut resource_nodes = BTreeMap::new();
        for rn_config in &resource_config.nodes {
            resource_nodes.insert(
                NodeId::new(rn_config.node_id.clone()),
                ResourceNode {
                    resource_id: ResourceId::new(resource_config.id.clone()),
                    node_id: NodeId::new(rn_config.node_id.clone()),
                    node_records: rn_config.node_records.iter().cloned().map(RecordName::new).collect(),
                    params: rn_config.params.clone(),
                },
            );
        }

        resources.insert(
            ResourceId::new(resource_config.id.clone()),
            Resource {
                id: ResourceId::new(resource_config.id.clone()),
                display_name: resource_config.display.clone(),
                enabled: resource_config.enabled,
                resource_type: resource_config.resource_type.clone(),
                allow_multi_master: resource_config.allow_multi_master,
                master_records: resource_config.master_records.iter().cloned().map(RecordName::new).collect(),
                master_record_ttl_secs: resource_config.master_record_ttl_secs,
                resource_nodes,
                params: resource_config.params.clone(),
            },
        );
    }

    Ok((nodes, resources))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapConfigurationSource;

    const SAMPLE: &str = r#"
appcluster.enabled=true
appcluster.nodes=a,b
appcluster.node.a.hostname=this-host
appcluster.node.a.nameservers=ns1.example.com
appcluster.node.b.hostname=b.example.com
appcluster.node.b.nameservers=ns1.example.com
appcluster.resources=r1
appcluster.resource.r1.type=manual
appcluster.resource.r1.masterRecords=m.example.com
appcluster.resource.r1.masterRecordsTtl=300
appcluster.resource.r1.nodes=a,b
appcluster.resource.r1.node.a.nodeRecords=a.example.com
appcluster.resource.r1.node.b.nodeRecords=b.example.com
"#;

    #[tokio::test(flavor = "multi_thread")]
    async fn start_is_idempotent() {
        std::env::set_var("HOSTNAME", "this-host");
        let config = Arc::new(MapConfigurationSource::from_properties(SAMPLE).unwrap());
        let cluster = ClusterCoordinator::with_defaults(config);
        cluster.start().unwrap();
        cluster.start().unwrap();
        assert!(cluster.is_started());
        cluster.stop();
        cluster.stop();
        assert!(!cluster.is_started());
    }

    #[test]
    fn cannot_determine_this_node_is_an_error() {
        std::env::remove_var("HOSTNAME");
        let nodes: BTreeMap<_, _> = [(
            NodeId::new("a"),
            Node {
                id: NodeId::new("a"),
                display_name: "A".to_string(),
                enabled: true,
                hostname: NameserverHostname::new("a.example.com"),
                nameservers: Default::default(),
            },
        )]
        .into_iter()
        .collect();
        let model = ClusterModel::new(nodes, BTreeMap::new()).unwrap();
        assert!(determine_this_node(&model).is_err());
    }
}
