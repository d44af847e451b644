//! The resource DNS monitor (§4.3): a per-resource supervisor that ticks
//! every `DNS_CHECK_INTERVAL`, fans out lookups across the shared worker
//! pool, cross-checks nameserver agreement, classifies the resource and
//! every node, and notifies listeners.
//!
//! Grounded on `dns/intelligent_failover.rs::FailoverManager` (periodic
//! `tokio::time::interval` loop fanning out checks and updating shared
//! state behind `parking_lot`) and `dns/health.rs::HealthMonitor` (a
//! snapshot struct swapped in and read by callers).

use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use tokio::task::JoinSet;

use crate::dns::{lookup_a, LookupResult, LookupStatus, ResolverCache};
use crate::events::{ClusterEvent, EventSink};
use crate::ids::{NameserverHostname, NodeId, RecordName};
use crate::model::{Node, Resource};
use crate::status::Status;

pub const DEFAULT_DNS_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// The classification shared by `masterStatus` and every `nodeStatus` (§4.3
/// state diagram). `Unknown` is the pre-first-tick value; `Slave`/`Master`
/// and `Inconsistent` are only produced by a completed tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DnsClassification {
    Unknown,
    Disabled,
    Stopped,
    Starting,
    Slave,
    Master,
    Inconsistent,
}

impl DnsClassification {
    pub fn to_status(self) -> Status {
        match self {
            DnsClassification::Unknown => Status::Unknown,
            DnsClassification::Disabled => Status::Disabled,
            DnsClassification::Stopped => Status::Stopped,
            DnsClassification::Starting => Status::Starting,
            DnsClassification::Slave | DnsClassification::Master => Status::Healthy,
            DnsClassification::Inconsistent => Status::Inconsistent,
        }
    }
}

fn lookup_status_contribution(status: LookupStatus) -> Status {
    match status {
        LookupStatus::Successful => Status::Healthy,
        LookupStatus::TryAgain => Status::Warning,
        LookupStatus::Unrecoverable | LookupStatus::HostNotFound | LookupStatus::TypeNotFound => Status::Error,
    }
}

pub type LookupMap = BTreeMap<RecordName, Option<BTreeMap<NameserverHostname, LookupResult>>>;

#[derive(Debug, Clone)]
pub struct ResourceNodeDnsResult {
    pub node_id: NodeId,
    pub node_record_lookups: LookupMap,
    pub node_status: DnsClassification,
    pub node_status_messages: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ResourceDnsResult {
    pub resource_id: crate::ids::ResourceId,
    pub start_time: DateTime<Local>,
    pub end_time: DateTime<Local>,
    pub master_record_lookups: LookupMap,
    pub master_status: DnsClassification,
    pub master_status_messages: Vec<String>,
    pub node_results: BTreeMap<NodeId, ResourceNodeDnsResult>,
}

impl ResourceDnsResult {
    /// §4.7: roll every lookup/node/master status through `max`.
    /// Resolves the §9 open question — the source's placeholder `TODO`
    /// returning a hardcoded `HEALTHY` is not replicated.
    pub fn status(&self) -> Status {
        let mut rolled = self.master_status.to_status();

        for maybe_nameservers in self.master_record_lookups.values() {
            if let Some(by_ns) = maybe_nameservers {
                for lookup in by_ns.values() {
                    rolled = rolled.max(lookup_status_contribution(lookup.status));
                }
            }
        }

        for node_result in self.node_results.values() {
            rolled = rolled.max(node_result.node_status.to_status());
            for maybe_nameservers in node_result.node_record_lookups.values() {
                if let Some(by_ns) = maybe_nameservers {
                    for lookup in by_ns.values() {
                        rolled = rolled.max(lookup_status_contribution(lookup.status));
                    }
                }
            }
        }

        rolled
    }

    fn disabled(resource_id: crate::ids::ResourceId, nodes: &BTreeMap<NodeId, Node>, now: DateTime<Local>) -> ResourceDnsResult {
        let node_results = nodes
            .keys()
            .cloned()
            .map(|node_id| {
                (
                    node_id.clone(),
                    ResourceNodeDnsResult {
                        node_id,
                        node_record_lookups: BTreeMap::new(),
                        node_status: DnsClassification::Disabled,
                        node_status_messages: Vec::new(),
                    },
                )
            })
            .collect();

        ResourceDnsResult {
            resource_id,
            start_time: now,
            end_time: now,
            master_record_lookups: BTreeMap::new(),
            master_status: DnsClassification::Disabled,
            master_status_messages: Vec::new(),
            node_results,
        }
    }
}

/// Atomically-published cancellation token (§9 "long-lived worker identity
/// check... port as an atomically-published cancellation token"). Each tick
/// loop iteration compares its captured generation against the current one;
/// a mismatch means `stop` happened and it should exit.
#[derive(Clone)]
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

pub struct ResourceMonitor {
    resource: Resource,
    nodes: BTreeMap<NodeId, Node>,
    cluster_enabled: bool,
    resolver_cache: Arc<ResolverCache>,
    interval: Duration,
    event_sink: Arc<dyn EventSink>,
    last_result: ArcSwapOption<ResourceDnsResult>,
    token: CancellationToken,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl ResourceMonitor {
    pub fn new(
        resource: Resource,
        nodes: BTreeMap<NodeId, Node>,
        cluster_enabled: bool,
        resolver_cache: Arc<ResolverCache>,
        interval: Duration,
        event_sink: Arc<dyn EventSink>,
    ) -> Arc<ResourceMonitor> {
        Arc::new(ResourceMonitor {
            resource,
            nodes,
            cluster_enabled,
            resolver_cache,
            interval,
            event_sink,
            last_result: ArcSwapOption::from(None),
            token: CancellationToken::new(),
            task: Mutex::new(None),
        })
    }

    pub fn resource_id(&self) -> &crate::ids::ResourceId {
        &self.resource.id
    }

    pub fn resolver_cache(&self) -> &Arc<ResolverCache> {
        &self.resolver_cache
    }

    pub fn last_result(&self) -> Option<Arc<ResourceDnsResult>> {
        self.last_result.load_full()
    }

    /// §4.3 state diagram: STOPPED -> DISABLED (cluster/resource disabled)
    /// or STOPPED -> STARTING -> classified.
    pub fn start(self: &Arc<Self>) {
        if !self.cluster_enabled || !self.resource.enabled {
            let now = Local::now();
            let disabled = ResourceDnsResult::disabled(self.resource.id.clone(), &self.nodes, now);
            self.publish(disabled);
            return;
        }

        let monitor = self.clone();
        let generation = monitor.token.snapshot();
        let mut guard = self.task.lock();
        *guard = Some(tokio::spawn(async move {
            monitor.run_loop(generation).await;
        }));
    }

    /// Runs exactly one tick on demand and publishes its result, without
    /// starting the periodic loop. Used by the status CLI (§11) for an
    /// immediate snapshot rather than waiting up to `DNS_CHECK_INTERVAL`.
    pub async fn run_tick_now(&self) -> Arc<ResourceDnsResult> {
        let result = self.tick().await;
        self.publish(result)
    }

    /// §4.3 "Cancellation and shutdown": stop sets STOPPED, cancels the
    /// ticker, and lets in-flight lookups complete or be rejected.
    pub fn stop(&self) {
        self.token.cancel();
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }
    }

    async fn run_loop(self: Arc<Self>, generation: u64) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            ticker.tick().await;
            if !self.token.is_current(generation) {
                return;
            }

            let result = self.tick().await;

            if !self.token.is_current(generation) {
                // stop() raced us; discard this tick's result per §4.3/§5.
                return;
            }

            self.publish(result);
        }
    }

    fn publish(&self, result: ResourceDnsResult) -> Arc<ResourceDnsResult> {
        let new = Arc::new(result);
        self.last_result.store(Some(new.clone()));
        self.event_sink.record(ClusterEvent::ResourceDnsResultPublished {
            resource_id: new.resource_id.clone(),
            status: new.status(),
        });
        new
    }

    /// One execution of the tick algorithm (§4.3 steps 1-8): fan out over
    /// the network (step 1-2), then reduce to a classified result (step 3-8).
    #[tracing::instrument(name = "resource_tick", skip(self), fields(resource = %self.resource.id))]
    async fn tick(&self) -> ResourceDnsResult {
        let start_time = Local::now();

        let nameservers = self.resource.enabled_nameservers(&self.nodes);
        let mut all_hostnames: BTreeSet<RecordName> = self.resource.master_records.clone();
        for rn in self.resource.enabled_resource_nodes(&self.nodes) {
            all_hostnames.extend(rn.node_records.iter().cloned());
        }

        let raw_lookups = self.fan_out(&all_hostnames, &nameservers).await;
        self.build_result(start_time, raw_lookups)
    }

    /// §4.3 steps 3-8: pure reduction from already-resolved lookups to a
    /// classified `ResourceDnsResult`. Split out from `tick` so the
    /// classification algorithm can be exercised without a network.
    fn build_result(
        &self,
        start_time: DateTime<Local>,
        raw_lookups: BTreeMap<RecordName, BTreeMap<NameserverHostname, LookupResult>>,
    ) -> ResourceDnsResult {
        let mut agreement_message: Option<String> = None;
        let mut canonical: BTreeMap<RecordName, BTreeSet<Ipv4Addr>> = BTreeMap::new();

        for (hostname, by_ns) in &raw_lookups {
            let mut sets: Vec<(NameserverHostname, BTreeSet<Ipv4Addr>)> = by_ns
                .iter()
                .map(|(ns, r)| (ns.clone(), r.addresses.iter().cloned().collect()))
                .collect();
            sets.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));

            if let Some((_, first_set)) = sets.first() {
                canonical.insert(hostname.clone(), first_set.clone());
            }

            if agreement_message.is_none() {
                for window in sets.windows(2) {
                    if window[0].1 != window[1].1 {
                        agreement_message = Some(format!(
                            "nameserver disagreement for {}: {} returned {:?}, {} returned {:?}",
                            hostname, window[0].0, window[0].1, window[1].0, window[1].1
                        ));
                        break;
                    }
                }
            }
        }

        let mut inconsistent = agreement_message.is_some();
        let mut messages: Vec<String> = agreement_message.into_iter().collect();

        // Step 4: master-record completeness and multi-master.
        let mut master_address_sets: Vec<BTreeSet<Ipv4Addr>> = Vec::new();
        for record in &self.resource.master_records {
            let addrs = canonical.get(record).cloned().unwrap_or_default();
            if addrs.is_empty() {
                inconsistent = true;
                messages.push(format!("master record missing: {}", record));
            } else if addrs.len() > 1 && !self.resource.allow_multi_master {
                inconsistent = true;
                messages.push(format!("multi-master not allowed: {}", record));
            }
            master_address_sets.push(addrs);
        }

        let distinct_master_sets: BTreeSet<_> = master_address_sets
            .iter()
            .filter(|s| !s.is_empty())
            .cloned()
            .collect();
        if distinct_master_sets.len() > 1 {
            inconsistent = true;
            messages.push("master records resolve to different address sets".to_string());
        }

        let master_address_set: BTreeSet<Ipv4Addr> = master_address_sets
            .into_iter()
            .flatten()
            .collect();

        // Step 5: per-node uniqueness.
        let mut node_address: BTreeMap<NodeId, Ipv4Addr> = BTreeMap::new();
        let mut seen_addrs: BTreeMap<Ipv4Addr, NodeId> = BTreeMap::new();
        let mut node_messages: BTreeMap<NodeId, Vec<String>> = BTreeMap::new();

        for rn in self.resource.enabled_resource_nodes(&self.nodes) {
            let mut record_sets: Vec<BTreeSet<Ipv4Addr>> = Vec::new();
            let mut first_ok = true;
            for record in &rn.node_records {
                let addrs = canonical.get(record).cloned().unwrap_or_default();
                if addrs.len() != 1 {
                    inconsistent = true;
                    first_ok = false;
                    node_messages.entry(rn.node_id.clone()).or_default().push(format!(
                        "node record {} does not resolve to exactly one address",
                        record
                    ));
                }
                record_sets.push(addrs);
            }

            let distinct: BTreeSet<_> = record_sets.iter().filter(|s| !s.is_empty()).cloned().collect();
            if distinct.len() > 1 {
                inconsistent = true;
                node_messages
                    .entry(rn.node_id.clone())
                    .or_default()
                    .push("node records disagree on address".to_string());
                first_ok = false;
            }

            if first_ok {
                if let Some(set) = record_sets.first() {
                    if let Some(addr) = set.iter().next().copied() {
                        node_address.insert(rn.node_id.clone(), addr);
                        if let Some(existing) = seen_addrs.insert(addr, rn.node_id.clone()) {
                            inconsistent = true;
                            messages.push(format!("duplicate A: {} used by {} and {}", addr, existing, rn.node_id));
                        }
                    }
                }
            }
        }

        // Step 6: master <-> node cross-check.
        for addr in &master_address_set {
            if !node_address.values().any(|a| a == addr) {
                inconsistent = true;
                messages.push(format!("master A record doesn't match any node: {}", addr));
            }
        }

        // Step 7: classify.
        let mut node_results = BTreeMap::new();
        for (node_id, node) in &self.nodes {
            let node_record_lookups = self.dense_for_node(node_id, &self.resource, &raw_lookups);

            let node_status = if !node.enabled || !self.resource.resource_nodes.contains_key(node_id) {
                DnsClassification::Disabled
            } else if inconsistent {
                DnsClassification::Inconsistent
            } else {
                match node_address.get(node_id) {
                    Some(addr) if master_address_set.contains(addr) => DnsClassification::Master,
                    Some(_) => DnsClassification::Slave,
                    None => DnsClassification::Unknown,
                }
            };

            node_results.insert(
                node_id.clone(),
                ResourceNodeDnsResult {
                    node_id: node_id.clone(),
                    node_record_lookups,
                    node_status,
                    node_status_messages: node_messages.remove(node_id).unwrap_or_default(),
                },
            );
        }

        let master_status = if inconsistent {
            DnsClassification::Inconsistent
        } else {
            DnsClassification::Master
        };

        let master_record_lookups = self.dense_master(&raw_lookups);

        ResourceDnsResult {
            resource_id: self.resource.id.clone(),
            start_time,
            end_time: Local::now(),
            master_record_lookups,
            master_status,
            master_status_messages: messages,
            node_results,
        }
    }

    async fn fan_out(
        &self,
        hostnames: &BTreeSet<RecordName>,
        nameservers: &BTreeSet<NameserverHostname>,
    ) -> BTreeMap<RecordName, BTreeMap<NameserverHostname, LookupResult>> {
        let mut join_set = JoinSet::new();

        for hostname in hostnames {
            for ns in nameservers {
                let hostname = hostname.clone();
                let ns = ns.clone();
                let resolver_cache = self.resolver_cache.clone();
                let expected_ttl = if self.resource.master_records.contains(&hostname) {
                    Some(self.resource.master_record_ttl_secs)
                } else {
                    None
                };

                join_set.spawn(async move {
                    let result = match resolver_cache.get(&ns).await {
                        Ok(resolver) => lookup_a(&resolver, &hostname, expected_ttl).await,
                        Err(e) => LookupResult {
                            name: hostname.clone(),
                            status: LookupStatus::Unrecoverable,
                            addresses: Vec::new(),
                            warnings: Vec::new(),
                            errors: vec![e.to_string()],
                        },
                    };

                    let success = result.status == LookupStatus::Successful;
                    let error = result.errors.first().cloned();
                    resolver_cache.record_outcome(&ns, success, error);

                    (hostname, ns, result)
                });
            }
        }

        let mut lookups: BTreeMap<RecordName, BTreeMap<NameserverHostname, LookupResult>> = BTreeMap::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((hostname, ns, result)) => {
                    lookups.entry(hostname).or_default().insert(ns, result);
                }
                Err(join_err) => {
                    tracing::error!(resource = %self.resource.id, %join_err, "lookup task panicked");
                }
            }
        }
        lookups
    }

    fn dense_master(
        &self,
        raw: &BTreeMap<RecordName, BTreeMap<NameserverHostname, LookupResult>>,
    ) -> LookupMap {
        let nameservers = self.resource.enabled_nameservers(&self.nodes);
        self.resource
            .master_records
            .iter()
            .map(|r| (r.clone(), Self::dense_row(r, &nameservers, raw)))
            .collect()
    }

    fn dense_for_node(
        &self,
        node_id: &NodeId,
        resource: &Resource,
        raw: &BTreeMap<RecordName, BTreeMap<NameserverHostname, LookupResult>>,
    ) -> LookupMap {
        let Some(rn) = resource.resource_nodes.get(node_id) else {
            return BTreeMap::new();
        };
        let nameservers = resource.enabled_nameservers(&self.nodes);
        rn.node_records
            .iter()
            .map(|r| (r.clone(), Self::dense_row(r, &nameservers, raw)))
            .collect()
    }

    /// §8 invariant 1: when present, the lookup map is dense — every
    /// declared record has an entry for every enabled nameserver.
    fn dense_row(
        record: &RecordName,
        nameservers: &BTreeSet<NameserverHostname>,
        raw: &BTreeMap<RecordName, BTreeMap<NameserverHostname, LookupResult>>,
    ) -> Option<BTreeMap<NameserverHostname, LookupResult>> {
        let by_ns = raw.get(record)?;
        let mut dense = BTreeMap::new();
        for ns in nameservers {
            if let Some(result) = by_ns.get(ns) {
                dense.insert(ns.clone(), result.clone());
            }
        }
        Some(dense)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResourceNode;
    use std::collections::BTreeMap as Map;

    fn node(id: &str, hostname: &str) -> Node {
        Node {
            id: NodeId::new(id),
            display_name: id.to_string(),
            enabled: true,
            hostname: NameserverHostname::new(hostname),
            nameservers: [NameserverHostname::new("ns1.example.com"), NameserverHostname::new("ns2.example.com")]
                .into_iter()
                .collect(),
        }
    }

    fn make_result(master: DnsClassification, a: DnsClassification, b: DnsClassification) -> ResourceDnsResult {
        let mut node_results = Map::new();
        node_results.insert(
            NodeId::new("a"),
            ResourceNodeDnsResult {
                node_id: NodeId::new("a"),
                node_record_lookups: Map::new(),
                node_status: a,
                node_status_messages: Vec::new(),
            },
        );
        node_results.insert(
            NodeId::new("b"),
            ResourceNodeDnsResult {
                node_id: NodeId::new("b"),
                node_record_lookups: Map::new(),
                node_status: b,
                node_status_messages: Vec::new(),
            },
        );

        ResourceDnsResult {
            resource_id: crate::ids::ResourceId::new("r"),
            start_time: Local::now(),
            end_time: Local::now(),
            master_record_lookups: Map::new(),
            master_status: master,
            master_status_messages: Vec::new(),
            node_results,
        }
    }

    #[test]
    fn status_rollup_is_healthy_when_all_healthy() {
        let result = make_result(DnsClassification::Master, DnsClassification::Master, DnsClassification::Slave);
        assert_eq!(result.status(), Status::Healthy);
    }

    #[test]
    fn status_rollup_is_inconsistent_if_any_node_is() {
        let result = make_result(DnsClassification::Master, DnsClassification::Inconsistent, DnsClassification::Slave);
        assert_eq!(result.status(), Status::Inconsistent);
    }

    #[allow(dead_code)]
    fn sample_resource() -> (Resource, BTreeMap<NodeId, Node>) {
        let nodes: BTreeMap<_, _> = [
            (NodeId::new("a"), node("a", "a.example.com")),
            (NodeId::new("b"), node("b", "b.example.com")),
        ]
        .into_iter()
        .collect();

        let mut resource_nodes = Map::new();
        resource_nodes.insert(
            NodeId::new("a"),
            ResourceNode {
                resource_id: crate::ids::ResourceId::new("r"),
                node_id: NodeId::new("a"),
                node_records: [RecordName::new("a.example.com")].into_iter().collect(),
                params: Map::new(),
            },
        );
        resource_nodes.insert(
            NodeId::new("b"),
            ResourceNode {
                resource_id: crate::ids::ResourceId::new("r"),
                node_id: NodeId::new("b"),
                node_records: [RecordName::new("b.example.com")].into_iter().collect(),
                params: Map::new(),
            },
        );

        let resource = Resource {
            id: crate::ids::ResourceId::new("r"),
            display_name: "R".to_string(),
            enabled: true,
            resource_type: "manual".to_string(),
            allow_multi_master: false,
            master_records: [RecordName::new("m.example.com")].into_iter().collect(),
            master_record_ttl_secs: 300,
            resource_nodes,
            params: Map::new(),
        };

        (resource, nodes)
    }

    fn sample_monitor() -> ResourceMonitor {
        let (resource, nodes) = sample_resource();
        let cache = Arc::new(ResolverCache::new(Duration::from_secs(1)));
        let monitor = ResourceMonitor::new(resource, nodes, true, cache, Duration::from_secs(30), Arc::new(crate::events::LoggingEventSink));
        Arc::try_unwrap(monitor).unwrap_or_else(|_| unreachable!())
    }

    fn lr(name: &RecordName, addrs: &[&str], warnings: Vec<String>) -> LookupResult {
        let addresses: Vec<Ipv4Addr> = addrs.iter().map(|a| a.parse().unwrap()).collect();
        LookupResult {
            name: name.clone(),
            status: if addresses.is_empty() { LookupStatus::HostNotFound } else { LookupStatus::Successful },
            addresses,
            warnings,
            errors: Vec::new(),
        }
    }

    fn raw(entries: Vec<(&RecordName, Vec<(&str, LookupResult)>)>) -> BTreeMap<RecordName, BTreeMap<NameserverHostname, LookupResult>> {
        entries
            .into_iter()
            .map(|(name, by_ns)| {
                let map: BTreeMap<NameserverHostname, LookupResult> = by_ns
                    .into_iter()
                    .map(|(ns, r)| (NameserverHostname::new(ns), r))
                    .collect();
                (name.clone(), map)
            })
            .collect()
    }

    #[test]
    fn s1_healthy_master_slave() {
        let monitor = sample_monitor();
        let m = RecordName::new("m.example.com");
        let a = RecordName::new("a.example.com");
        let b = RecordName::new("b.example.com");

        let raw_lookups = raw(vec![
            (&m, vec![("ns1.example.com", lr(&m, &["10.0.0.1"], vec![])), ("ns2.example.com", lr(&m, &["10.0.0.1"], vec![]))]),
            (&a, vec![("ns1.example.com", lr(&a, &["10.0.0.1"], vec![])), ("ns2.example.com", lr(&a, &["10.0.0.1"], vec![]))]),
            (&b, vec![("ns1.example.com", lr(&b, &["10.0.0.2"], vec![])), ("ns2.example.com", lr(&b, &["10.0.0.2"], vec![]))]),
        ]);

        let result = monitor.build_result(Local::now(), raw_lookups);
        assert_eq!(result.master_status, DnsClassification::Master);
        assert_eq!(result.node_results[&NodeId::new("a")].node_status, DnsClassification::Master);
        assert_eq!(result.node_results[&NodeId::new("b")].node_status, DnsClassification::Slave);
        assert_eq!(result.status(), Status::Healthy);
    }

    #[test]
    fn s2_nameserver_disagreement_is_inconsistent() {
        let monitor = sample_monitor();
        let m = RecordName::new("m.example.com");
        let a = RecordName::new("a.example.com");
        let b = RecordName::new("b.example.com");

        let raw_lookups = raw(vec![
            (&m, vec![("ns1.example.com", lr(&m, &["10.0.0.1"], vec![])), ("ns2.example.com", lr(&m, &["10.0.0.2"], vec![]))]),
            (&a, vec![("ns1.example.com", lr(&a, &["10.0.0.1"], vec![])), ("ns2.example.com", lr(&a, &["10.0.0.1"], vec![]))]),
            (&b, vec![("ns1.example.com", lr(&b, &["10.0.0.2"], vec![])), ("ns2.example.com", lr(&b, &["10.0.0.2"], vec![]))]),
        ]);

        let result = monitor.build_result(Local::now(), raw_lookups);
        assert_eq!(result.status(), Status::Inconsistent);
        assert!(result.master_status_messages.iter().any(|m| m.contains("nameserver disagreement")));
    }

    #[test]
    fn s3_unexpected_ttl_is_a_warning_not_a_status_change() {
        let monitor = sample_monitor();
        let m = RecordName::new("m.example.com");
        let a = RecordName::new("a.example.com");
        let b = RecordName::new("b.example.com");
        let ttl_warning = "unexpectedTtl: m.example.com ttl=600 expected=300".to_string();

        let raw_lookups = raw(vec![
            (
                &m,
                vec![
                    ("ns1.example.com", lr(&m, &["10.0.0.1"], vec![ttl_warning.clone()])),
                    ("ns2.example.com", lr(&m, &["10.0.0.1"], vec![ttl_warning.clone()])),
                ],
            ),
            (&a, vec![("ns1.example.com", lr(&a, &["10.0.0.1"], vec![])), ("ns2.example.com", lr(&a, &["10.0.0.1"], vec![]))]),
            (&b, vec![("ns1.example.com", lr(&b, &["10.0.0.2"], vec![])), ("ns2.example.com", lr(&b, &["10.0.0.2"], vec![]))]),
        ]);

        let result = monitor.build_result(Local::now(), raw_lookups);
        assert_eq!(result.status(), Status::Healthy);
        let by_ns = result.master_record_lookups[&m].as_ref().unwrap();
        for lookup in by_ns.values() {
            assert!(lookup.warnings.contains(&ttl_warning));
        }
    }

    #[test]
    fn s4_multi_master_forbidden() {
        let monitor = sample_monitor();
        let m = RecordName::new("m.example.com");
        let a = RecordName::new("a.example.com");
        let b = RecordName::new("b.example.com");

        let raw_lookups = raw(vec![
            (
                &m,
                vec![
                    ("ns1.example.com", lr(&m, &["10.0.0.1", "10.0.0.2"], vec![])),
                    ("ns2.example.com", lr(&m, &["10.0.0.1", "10.0.0.2"], vec![])),
                ],
            ),
            (&a, vec![("ns1.example.com", lr(&a, &["10.0.0.1"], vec![])), ("ns2.example.com", lr(&a, &["10.0.0.1"], vec![]))]),
            (&b, vec![("ns1.example.com", lr(&b, &["10.0.0.2"], vec![])), ("ns2.example.com", lr(&b, &["10.0.0.2"], vec![]))]),
        ]);

        let result = monitor.build_result(Local::now(), raw_lookups);
        assert_eq!(result.status(), Status::Inconsistent);
        assert!(result.master_status_messages.iter().any(|m| m.contains("multi-master not allowed")));
    }

    #[test]
    fn master_record_lookups_only_include_configured_nameservers() {
        let monitor = sample_monitor();
        let m = RecordName::new("m.example.com");
        let a = RecordName::new("a.example.com");
        let b = RecordName::new("b.example.com");

        // ns2 never produced a raw lookup for `m` (e.g. a fan-out join that
        // never scheduled it) — the per-record map only ever reflects
        // nameservers that actually answered, keyed and ordered by hostname.
        let raw_lookups = raw(vec![
            (&m, vec![("ns1.example.com", lr(&m, &["10.0.0.1"], vec![]))]),
            (&a, vec![("ns1.example.com", lr(&a, &["10.0.0.1"], vec![])), ("ns2.example.com", lr(&a, &["10.0.0.1"], vec![]))]),
            (&b, vec![("ns1.example.com", lr(&b, &["10.0.0.2"], vec![])), ("ns2.example.com", lr(&b, &["10.0.0.2"], vec![]))]),
        ]);

        let result = monitor.build_result(Local::now(), raw_lookups);
        let by_ns = result.master_record_lookups[&m].as_ref().unwrap();
        assert_eq!(by_ns.len(), 1);
        assert!(by_ns.contains_key(&NameserverHostname::new("ns1.example.com")));
    }
}
