//! rsync synchronizer (§4.6 "rsync... each modeled as a plug-in").
//!
//! `test` runs `rsync --dry-run --itemize-changes` to compute the pending
//! delta without transferring anything; `synchronize` runs the real
//! transfer. Both shell out via `tokio::process::Command`, the same way the
//! teacher drives external tools from `spawn_blocking` in
//! `intelligent_failover.rs::check_endpoint_health`.

use async_trait::async_trait;
use chrono::Local;
use tokio::process::Command;

use super::{OperationResult, OperationStep, SyncContext, SynchronizerPlugin};

#[derive(Default)]
pub struct RsyncPlugin;

impl RsyncPlugin {
    fn remote_spec(&self, ctx: &SyncContext) -> Option<String> {
        let path = ctx.remote_param("rsync.path")?;
        Some(format!("{}:{}", ctx.remote_node.hostname, path))
    }

    fn local_path(&self, ctx: &SyncContext) -> Option<&str> {
        ctx.local_param("rsync.path")
    }

    async fn run(&self, args: &[&str]) -> Result<(OperationStep, bool), String> {
        let output = Command::new("rsync")
            .args(args)
            .output()
            .await
            .map_err(|e| format!("could not spawn rsync: {}", e))?;

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.status.success() {
            Ok((OperationStep::ok("rsync", text), true))
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            Ok((OperationStep::error("rsync", format!("{}\n{}", text, stderr)), false))
        }
    }
}

#[async_trait]
impl SynchronizerPlugin for RsyncPlugin {
    async fn test(&self, ctx: &SyncContext) -> OperationResult {
        let started_at = Local::now();

        let (Some(local), Some(remote)) = (self.local_path(ctx), self.remote_spec(ctx)) else {
            return OperationResult::failed("rsync.path not configured on both resource-nodes", Vec::new());
        };

        match self.run(&["-az", "--dry-run", "--itemize-changes", local, &remote]).await {
            Ok((step, _)) => OperationResult {
                steps: vec![step],
                error: None,
                started_at,
                finished_at: Local::now(),
            },
            Err(cause) => OperationResult::failed(cause, Vec::new()),
        }
    }

    async fn synchronize(&self, ctx: &SyncContext) -> OperationResult {
        let started_at = Local::now();

        let (Some(local), Some(remote)) = (self.local_path(ctx), self.remote_spec(ctx)) else {
            return OperationResult::failed("rsync.path not configured on both resource-nodes", Vec::new());
        };

        match self.run(&["-az", "--delete", local, &remote]).await {
            Ok((step, ok)) => OperationResult {
                error: if ok { None } else { Some("rsync exited non-zero".to_string()) },
                steps: vec![step],
                started_at,
                finished_at: Local::now(),
            },
            Err(cause) => OperationResult::failed(cause, Vec::new()),
        }
    }
}
