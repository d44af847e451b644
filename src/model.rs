//! Node / Resource / ResourceNode (§3 DATA MODEL).
//!
//! Cross-entity references are identifier handles, not ownership pointers
//! (§9 "Back-references... form a graph with cycles. Preferred redesign: an
//! arena holds the concrete records; cross-entity links are identifier
//! handles"). `Resource`/`ResourceNode` hold `NodeId`s, never `&Node`; lookups
//! go through `ClusterModel`, mirroring `dns/context.rs::ServerContext`
//! owning the aggregate state that other structs reference by field, not by
//! pointer-back.

use std::collections::{BTreeMap, BTreeSet};

use derive_more::{Display, Error, From};
use serde::{Deserialize, Serialize};

use crate::ids::{NameserverHostname, NodeId, RecordName, ResourceId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub display_name: String,
    pub enabled: bool,
    pub hostname: NameserverHostname,
    pub nameservers: BTreeSet<NameserverHostname>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceNode {
    pub resource_id: ResourceId,
    pub node_id: NodeId,
    pub node_records: BTreeSet<RecordName>,
    /// Type-specific parameters consumed by the resource's synchronizer plug-in.
    pub params: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub display_name: String,
    pub enabled: bool,
    pub resource_type: String,
    pub allow_multi_master: bool,
    pub master_records: BTreeSet<RecordName>,
    pub master_record_ttl_secs: u32,
    pub resource_nodes: BTreeMap<NodeId, ResourceNode>,
    pub params: BTreeMap<String, String>,
}

impl Resource {
    /// Union of the nameservers of every *enabled* resource-node (§3).
    pub fn enabled_nameservers(&self, nodes: &BTreeMap<NodeId, Node>) -> BTreeSet<NameserverHostname> {
        let mut set = BTreeSet::new();
        for (node_id, _rn) in &self.resource_nodes {
            if let Some(node) = nodes.get(node_id) {
                if node.enabled {
                    set.extend(node.nameservers.iter().cloned());
                }
            }
        }
        set
    }

    pub fn enabled_resource_nodes<'a>(
        &'a self,
        nodes: &'a BTreeMap<NodeId, Node>,
    ) -> impl Iterator<Item = &'a ResourceNode> + 'a {
        self.resource_nodes.values().filter(move |rn| {
            nodes
                .get(&rn.node_id)
                .map(|n| n.enabled)
                .unwrap_or(false)
        })
    }
}

#[derive(Debug, Display, Error, From)]
pub enum ModelError {
    #[display(fmt = "duplicate node display name: {}", _0)]
    DuplicateNodeDisplay(#[error(not(source))] String),
    #[display(fmt = "duplicate node hostname: {}", _0)]
    DuplicateNodeHostname(#[error(not(source))] String),
    #[display(fmt = "duplicate resource display name: {}", _0)]
    DuplicateResourceDisplay(#[error(not(source))] String),
    #[display(
        fmt = "resource {}: master record {} also appears as a node record",
        resource,
        record
    )]
    MasterNodeRecordOverlap { resource: String, record: String },
    #[display(
        fmt = "resource {}: node records for {} and {} overlap",
        resource,
        node_a,
        node_b
    )]
    NodeRecordOverlap {
        resource: String,
        node_a: String,
        node_b: String,
    },
    #[display(fmt = "resource {} references unknown node {}", resource, node)]
    UnknownNode { resource: String, node: String },
}

/// The full, validated configuration the cluster coordinator builds at
/// start (§4.5 step 2-3) and swaps in wholesale on reload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterModel {
    pub nodes: BTreeMap<NodeId, Node>,
    pub resources: BTreeMap<ResourceId, Resource>,
}

impl ClusterModel {
    pub fn validate(nodes: &BTreeMap<NodeId, Node>, resources: &BTreeMap<ResourceId, Resource>) -> Result<(), ModelError> {
        let mut displays = BTreeSet::new();
        let mut hostnames = BTreeSet::new();
        for node in nodes.values() {
            if !displays.insert(node.display_name.clone()) {
                return Err(ModelError::DuplicateNodeDisplay(node.display_name.clone()));
            }
            if !hostnames.insert(node.hostname.clone()) {
                return Err(ModelError::DuplicateNodeHostname(node.hostname.to_string()));
            }
        }

        let mut resource_displays = BTreeSet::new();
        for resource in resources.values() {
            if !resource_displays.insert(resource.display_name.clone()) {
                return Err(ModelError::DuplicateResourceDisplay(resource.display_name.clone()));
            }

            for rn in resource.resource_nodes.values() {
                if !nodes.contains_key(&rn.node_id) {
                    return Err(ModelError::UnknownNode {
                        resource: resource.id.to_string(),
                        node: rn.node_id.to_string(),
                    });
                }

                for record in &rn.node_records {
                    if resource.master_records.contains(record) {
                        return Err(ModelError::MasterNodeRecordOverlap {
                            resource: resource.id.to_string(),
                            record: record.to_string(),
                        });
                    }
                }
            }

            let pairs: Vec<_> = resource.resource_nodes.values().collect();
            for i in 0..pairs.len() {
                for j in (i + 1)..pairs.len() {
                    if !pairs[i].node_records.is_disjoint(&pairs[j].node_records) {
                        return Err(ModelError::NodeRecordOverlap {
                            resource: resource.id.to_string(),
                            node_a: pairs[i].node_id.to_string(),
                            node_b: pairs[j].node_id.to_string(),
                        });
                    }
                }
            }
        }

        Ok(())
    }

    pub fn new(
        nodes: BTreeMap<NodeId, Node>,
        resources: BTreeMap<ResourceId, Resource>,
    ) -> Result<Self, ModelError> {
        Self::validate(&nodes, &resources)?;
        Ok(ClusterModel { nodes, resources })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, display: &str, hostname: &str) -> Node {
        Node {
            id: NodeId::new(id),
            display_name: display.to_string(),
            enabled: true,
            hostname: NameserverHostname::new(hostname),
            nameservers: [NameserverHostname::new("ns1.example.com")].into_iter().collect(),
        }
    }

    #[test]
    fn rejects_duplicate_hostnames() {
        let nodes: BTreeMap<_, _> = [
            (NodeId::new("a"), node("a", "Node A", "same.example.com")),
            (NodeId::new("b"), node("b", "Node B", "same.example.com")),
        ]
        .into_iter()
        .collect();

        let err = ClusterModel::validate(&nodes, &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, ModelError::DuplicateNodeHostname(_)));
    }

    #[test]
    fn rejects_master_node_record_overlap() {
        let nodes: BTreeMap<_, _> = [(NodeId::new("a"), node("a", "Node A", "a.example.com"))]
            .into_iter()
            .collect();

        let mut resource_nodes = BTreeMap::new();
        resource_nodes.insert(
            NodeId::new("a"),
            ResourceNode {
                resource_id: ResourceId::new("r"),
                node_id: NodeId::new("a"),
                node_records: [RecordName::new("shared.example.com")].into_iter().collect(),
                params: BTreeMap::new(),
            },
        );

        let resources: BTreeMap<_, _> = [(
            ResourceId::new("r"),
            Resource {
                id: ResourceId::new("r"),
                display_name: "R".to_string(),
                enabled: true,
                resource_type: "manual".to_string(),
                allow_multi_master: false,
                master_records: [RecordName::new("shared.example.com")].into_iter().collect(),
                master_record_ttl_secs: 300,
                resource_nodes,
                params: BTreeMap::new(),
            },
        )]
        .into_iter()
        .collect();

        let err = ClusterModel::validate(&nodes, &resources).unwrap_err();
        assert!(matches!(err, ModelError::MasterNodeRecordOverlap { .. }));
    }
}
