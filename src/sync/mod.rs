//! Plug-in synchronizer registry (§4.6).
//!
//! Grounded on `dns/resolve.rs`'s `DnsResolver` trait with two concrete
//! strategies (`RecursiveDnsResolver`, `ForwardingDnsResolver`) selected by a
//! context enum — the same "one trait, several strategy structs, resolved by
//! a key" shape, here keyed by `resourceType` instead of a resolve mode.

pub mod csync2;
pub mod imap;
pub mod jdbc;
pub mod manual;
pub mod rsync;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use parking_lot::Mutex;

use crate::ids::ResourceId;
use crate::model::{Node, Resource, ResourceNode};
use crate::monitor::DnsClassification;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum OperationStatus {
    Successful,
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct OperationStep {
    pub name: String,
    pub status: OperationStatus,
    pub output: String,
}

impl OperationStep {
    pub fn ok(name: impl Into<String>, output: impl Into<String>) -> OperationStep {
        OperationStep {
            name: name.into(),
            status: OperationStatus::Successful,
            output: output.into(),
        }
    }

    pub fn warning(name: impl Into<String>, output: impl Into<String>) -> OperationStep {
        OperationStep {
            name: name.into(),
            status: OperationStatus::Warning,
            output: output.into(),
        }
    }

    pub fn error(name: impl Into<String>, output: impl Into<String>) -> OperationStep {
        OperationStep {
            name: name.into(),
            status: OperationStatus::Error,
            output: output.into(),
        }
    }
}

/// §9 open question resolution: the richer list-of-steps form, not the
/// simpler single status/output/error triple.
#[derive(Debug, Clone)]
pub struct OperationResult {
    pub steps: Vec<OperationStep>,
    pub error: Option<String>,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
}

impl OperationResult {
    pub fn status(&self) -> OperationStatus {
        let from_steps = self
            .steps
            .iter()
            .map(|s| s.status)
            .max()
            .unwrap_or(OperationStatus::Successful);
        if self.error.is_some() {
            from_steps.max(OperationStatus::Error)
        } else {
            from_steps
        }
    }

    /// §4.4 "Operation dispatch": timeout produces an ERROR result with the
    /// stringified cause, partial output preserved.
    pub fn timeout(operation: &str, timeout: Duration, partial_steps: Vec<OperationStep>) -> OperationResult {
        let now = Local::now();
        OperationResult {
            steps: partial_steps,
            error: Some(format!("{} timed out after {:?}", operation, timeout)),
            started_at: now,
            finished_at: now,
        }
    }

    pub fn failed(cause: impl std::fmt::Display, partial_steps: Vec<OperationStep>) -> OperationResult {
        let now = Local::now();
        OperationResult {
            steps: partial_steps,
            error: Some(cause.to_string()),
            started_at: now,
            finished_at: now,
        }
    }
}

/// Everything a plug-in needs to act on one directed (local, remote) pair of
/// a resource (§4.4 "one instance per directed node-pair").
pub struct SyncContext {
    pub resource: Resource,
    pub local_node: Node,
    pub remote_node: Node,
    pub local_resource_node: ResourceNode,
    pub remote_resource_node: ResourceNode,
}

impl SyncContext {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.resource.params.get(key).map(String::as_str)
    }

    pub fn local_param(&self, key: &str) -> Option<&str> {
        self.local_resource_node.params.get(key).map(String::as_str)
    }

    pub fn remote_param(&self, key: &str) -> Option<&str> {
        self.remote_resource_node.params.get(key).map(String::as_str)
    }
}

/// One narrow interface per §4.6 — "adding a new synchronization strategy
/// requires only a new factory and the implementation of
/// canSynchronize/canTest/synchronize/test". Default eligibility predicates
/// are the ones given in §4.4 and may be overridden by a plug-in.
#[async_trait]
pub trait SynchronizerPlugin: Send + Sync {
    fn can_synchronize(&self, local: DnsClassification, remote: DnsClassification) -> bool {
        matches!(local, DnsClassification::Master) && matches!(remote, DnsClassification::Slave)
    }

    fn can_test(&self, local: DnsClassification, remote: DnsClassification) -> bool {
        (matches!(local, DnsClassification::Master) && matches!(remote, DnsClassification::Slave))
            || (matches!(local, DnsClassification::Slave) && matches!(remote, DnsClassification::Master))
    }

    async fn test(&self, ctx: &SyncContext) -> OperationResult;

    async fn synchronize(&self, ctx: &SyncContext) -> OperationResult;
}

type PluginFactory = Arc<dyn Fn(&ResourceId) -> Arc<dyn SynchronizerPlugin> + Send + Sync>;

/// Maps `resourceType` -> factory (§4.6). Factories are instantiated once
/// per process and cached, mirroring `dns/resolve.rs`'s resolver strategies
/// being constructed once in `ServerContext::create_resolver` and reused.
pub struct PluginRegistry {
    factories: BTreeMap<String, PluginFactory>,
    cache: Mutex<BTreeMap<ResourceId, Arc<dyn SynchronizerPlugin>>>,
}

impl PluginRegistry {
    pub fn new() -> PluginRegistry {
        PluginRegistry {
            factories: BTreeMap::new(),
            cache: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn with_builtin_plugins() -> PluginRegistry {
        let mut registry = PluginRegistry::new();
        registry.register("rsync", |_| Arc::new(rsync::RsyncPlugin::default()));
        registry.register("csync2", |_| Arc::new(csync2::Csync2Plugin::default()));
        registry.register("jdbc", |_| Arc::new(jdbc::JdbcPlugin::default()));
        registry.register("imap", |_| Arc::new(imap::ImapPlugin::default()));
        registry.register("manual", |_| Arc::new(manual::ManualPlugin::default()));
        registry
    }

    pub fn register<F>(&mut self, resource_type: &str, factory: F)
    where
        F: Fn(&ResourceId) -> Arc<dyn SynchronizerPlugin> + Send + Sync + 'static,
    {
        self.factories.insert(resource_type.to_string(), Arc::new(factory));
    }

    /// Resolve and cache the plug-in for one resource. Per §4.6, a factory
    /// is instantiated once per process; here that's once per resource id.
    pub fn resolve(&self, resource_type: &str, resource_id: &ResourceId) -> Option<Arc<dyn SynchronizerPlugin>> {
        if let Some(plugin) = self.cache.lock().get(resource_id).cloned() {
            return Some(plugin);
        }

        let factory = self.factories.get(resource_type)?;
        let plugin = factory(resource_id);
        self.cache.lock().insert(resource_id.clone(), plugin.clone());
        Some(plugin)
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_eligibility_matches_spec_table() {
        struct Probe;
        #[async_trait]
        impl SynchronizerPlugin for Probe {
            async fn test(&self, _ctx: &SyncContext) -> OperationResult {
                unreachable!()
            }
            async fn synchronize(&self, _ctx: &SyncContext) -> OperationResult {
                unreachable!()
            }
        }
        let probe = Probe;

        assert!(probe.can_synchronize(DnsClassification::Master, DnsClassification::Slave));
        assert!(!probe.can_synchronize(DnsClassification::Slave, DnsClassification::Master));

        assert!(probe.can_test(DnsClassification::Master, DnsClassification::Slave));
        assert!(probe.can_test(DnsClassification::Slave, DnsClassification::Master));
        assert!(!probe.can_test(DnsClassification::Master, DnsClassification::Master));
    }

    #[test]
    fn registry_caches_per_resource() {
        let registry = PluginRegistry::with_builtin_plugins();
        let id = ResourceId::new("r1");
        let a = registry.resolve("manual", &id).unwrap();
        let b = registry.resolve("manual", &id).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
