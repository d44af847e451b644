//! Manual synchronizer (§4.6 "manual... each modeled as a plug-in").
//!
//! Stands in for an operator-driven resource type (runbook, ticket, or a
//! resource with no automatable transfer mechanism): `test` only confirms
//! both endpoints are reachable according to the params configured for
//! them; `synchronize` never moves data, it only records that a human
//! action is required.

use async_trait::async_trait;
use chrono::Local;

use super::{OperationResult, OperationStep, SyncContext, SynchronizerPlugin};

#[derive(Default)]
pub struct ManualPlugin;

#[async_trait]
impl SynchronizerPlugin for ManualPlugin {
    async fn test(&self, ctx: &SyncContext) -> OperationResult {
        let started_at = Local::now();
        let mut steps = Vec::new();

        for (label, params) in [
            ("local", &ctx.local_resource_node.params),
            ("remote", &ctx.remote_resource_node.params),
        ] {
            if params.contains_key("manual.runbook") {
                steps.push(OperationStep::ok(
                    format!("{} runbook configured", label),
                    params.get("manual.runbook").cloned().unwrap_or_default(),
                ));
            } else {
                steps.push(OperationStep::warning(
                    format!("{} runbook missing", label),
                    "no manual.runbook param set for this resource-node".to_string(),
                ));
            }
        }

        OperationResult {
            steps,
            error: None,
            started_at,
            finished_at: Local::now(),
        }
    }

    async fn synchronize(&self, _ctx: &SyncContext) -> OperationResult {
        let now = Local::now();
        OperationResult {
            steps: vec![OperationStep::warning(
                "manual synchronize",
                "this resource type requires operator action; no automatic transfer was performed",
            )],
            error: None,
            started_at: now,
            finished_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{NameserverHostname, NodeId, RecordName, ResourceId};
    use crate::model::{Node, Resource, ResourceNode};
    use std::collections::{BTreeMap, BTreeSet};

    fn ctx(with_runbook: bool) -> SyncContext {
        let node = |id: &str| Node {
            id: NodeId::new(id),
            display_name: id.to_string(),
            enabled: true,
            hostname: NameserverHostname::new(format!("{}.example.com", id)),
            nameservers: BTreeSet::new(),
        };

        let mut params = BTreeMap::new();
        if with_runbook {
            params.insert("manual.runbook".to_string(), "https://runbooks/r1".to_string());
        }

        let rn = |node_id: &str, params: BTreeMap<String, String>| ResourceNode {
            resource_id: ResourceId::new("r"),
            node_id: NodeId::new(node_id),
            node_records: [RecordName::new(format!("{}.example.com", node_id))].into_iter().collect(),
            params,
        };

        SyncContext {
            resource: Resource {
                id: ResourceId::new("r"),
                display_name: "R".to_string(),
                enabled: true,
                resource_type: "manual".to_string(),
                allow_multi_master: false,
                master_records: BTreeSet::new(),
                master_record_ttl_secs: 300,
                resource_nodes: BTreeMap::new(),
                params: BTreeMap::new(),
            },
            local_node: node("a"),
            remote_node: node("b"),
            local_resource_node: rn("a", params.clone()),
            remote_resource_node: rn("b", params),
        }
    }

    #[tokio::test]
    async fn test_warns_when_runbook_missing() {
        let plugin = ManualPlugin::default();
        let result = plugin.test(&ctx(false)).await;
        assert!(result.steps.iter().any(|s| s.status == super::super::OperationStatus::Warning));
    }

    #[tokio::test]
    async fn synchronize_never_reports_success_as_a_completed_transfer() {
        let plugin = ManualPlugin::default();
        let result = plugin.synchronize(&ctx(true)).await;
        assert_eq!(result.status(), super::super::OperationStatus::Warning);
    }
}
