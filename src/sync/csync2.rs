//! csync2 synchronizer (§4.6 "csync2... each modeled as a plug-in").
//!
//! `test` runs `csync2 -cr <group>` (check only, the `-r` dry-run flag) and
//! `synchronize` runs `csync2 -x <group>` (force-sync), against the group
//! named by the `csync2.group` resource param.

use async_trait::async_trait;
use chrono::Local;
use tokio::process::Command;

use super::{OperationResult, OperationStep, SyncContext, SynchronizerPlugin};

#[derive(Default)]
pub struct Csync2Plugin;

impl Csync2Plugin {
    fn group<'a>(&self, ctx: &'a SyncContext) -> Option<&'a str> {
        ctx.param("csync2.group")
    }

    async fn run(&self, args: &[&str]) -> Result<OperationStep, String> {
        let output = Command::new("csync2")
            .args(args)
            .output()
            .await
            .map_err(|e| format!("could not spawn csync2: {}", e))?;

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.status.success() {
            Ok(OperationStep::ok("csync2", text))
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            Ok(OperationStep::error("csync2", format!("{}\n{}", text, stderr)))
        }
    }
}

#[async_trait]
impl SynchronizerPlugin for Csync2Plugin {
    async fn test(&self, ctx: &SyncContext) -> OperationResult {
        let started_at = Local::now();
        let Some(group) = self.group(ctx) else {
            return OperationResult::failed("csync2.group not configured", Vec::new());
        };

        match self.run(&["-cr", group]).await {
            Ok(step) => {
                let error = if step.status == super::OperationStatus::Error {
                    Some("csync2 check reported differences or failed".to_string())
                } else {
                    None
                };
                OperationResult {
                    steps: vec![step],
                    error,
                    started_at,
                    finished_at: Local::now(),
                }
            }
            Err(cause) => OperationResult::failed(cause, Vec::new()),
        }
    }

    async fn synchronize(&self, ctx: &SyncContext) -> OperationResult {
        let started_at = Local::now();
        let Some(group) = self.group(ctx) else {
            return OperationResult::failed("csync2.group not configured", Vec::new());
        };

        match self.run(&["-x", group]).await {
            Ok(step) => {
                let error = if step.status == super::OperationStatus::Error {
                    Some("csync2 sync failed".to_string())
                } else {
                    None
                };
                OperationResult {
                    steps: vec![step],
                    error,
                    started_at,
                    finished_at: Local::now(),
                }
            }
            Err(cause) => OperationResult::failed(cause, Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{NameserverHostname, NodeId, ResourceId};
    use crate::model::{Node, Resource, ResourceNode};
    use std::collections::{BTreeMap, BTreeSet};

    fn ctx() -> SyncContext {
        let node = |id: &str| Node {
            id: NodeId::new(id),
            display_name: id.to_string(),
            enabled: true,
            hostname: NameserverHostname::new(format!("{}.example.com", id)),
            nameservers: BTreeSet::new(),
        };
        let rn = |id: &str| ResourceNode {
            resource_id: ResourceId::new("r"),
            node_id: NodeId::new(id),
            node_records: BTreeSet::new(),
            params: BTreeMap::new(),
        };

        SyncContext {
            resource: Resource {
                id: ResourceId::new("r"),
                display_name: "R".to_string(),
                enabled: true,
                resource_type: "csync2".to_string(),
                allow_multi_master: false,
                master_records: BTreeSet::new(),
                master_record_ttl_secs: 300,
                resource_nodes: BTreeMap::new(),
                params: BTreeMap::new(),
            },
            local_node: node("a"),
            remote_node: node("b"),
            local_resource_node: rn("a"),
            remote_resource_node: rn("b"),
        }
    }

    #[tokio::test]
    async fn test_fails_fast_without_group() {
        let plugin = Csync2Plugin::default();
        let result = plugin.test(&ctx()).await;
        assert!(result.error.is_some());
    }
}
