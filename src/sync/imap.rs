//! IMAP mailbox synchronizer (§4.6 "IMAP... each modeled as a plug-in").
//!
//! Compares the UID list of a mailbox on both endpoints and reports
//! messages present on only one side; `synchronize` additionally copies
//! messages missing on the remote side. There is no real IMAP client in
//! scope (the spec excludes content-synchronizer implementations, §1) —
//! mailbox access goes through a small `MailboxSource` trait; the default
//! source sees an empty mailbox on both sides.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Local;

use super::{OperationResult, OperationStep, SyncContext, SynchronizerPlugin};

pub trait MailboxSource: Send + Sync {
    fn uids(&self, node_hostname: &str, mailbox: &str) -> BTreeSet<u64>;
    fn copy(&self, mailbox: &str, uid: u64, from_hostname: &str, to_hostname: &str) -> Result<(), String>;
}

pub struct NullMailboxSource;

impl MailboxSource for NullMailboxSource {
    fn uids(&self, _node_hostname: &str, _mailbox: &str) -> BTreeSet<u64> {
        BTreeSet::new()
    }

    fn copy(&self, _mailbox: &str, _uid: u64, _from: &str, _to: &str) -> Result<(), String> {
        Ok(())
    }
}

pub struct ImapPlugin {
    source: Arc<dyn MailboxSource>,
}

impl Default for ImapPlugin {
    fn default() -> Self {
        ImapPlugin {
            source: Arc::new(NullMailboxSource),
        }
    }
}

impl ImapPlugin {
    pub fn with_source(source: Arc<dyn MailboxSource>) -> ImapPlugin {
        ImapPlugin { source }
    }

    fn mailbox<'a>(&self, ctx: &'a SyncContext) -> Option<&'a str> {
        ctx.param("imap.mailbox")
    }
}

#[async_trait]
impl SynchronizerPlugin for ImapPlugin {
    async fn test(&self, ctx: &SyncContext) -> OperationResult {
        let started_at = Local::now();
        let Some(mailbox) = self.mailbox(ctx) else {
            return OperationResult::failed("imap.mailbox not configured", Vec::new());
        };

        let local_uids = self.source.uids(ctx.local_node.hostname.as_str(), mailbox);
        let remote_uids = self.source.uids(ctx.remote_node.hostname.as_str(), mailbox);

        let missing_on_remote = local_uids.difference(&remote_uids).count();
        let extra_on_remote = remote_uids.difference(&local_uids).count();

        let summary = format!(
            "{}: {} local, {} remote, {} missing on remote, {} extra on remote",
            mailbox,
            local_uids.len(),
            remote_uids.len(),
            missing_on_remote,
            extra_on_remote
        );

        let step = if missing_on_remote == 0 && extra_on_remote == 0 {
            OperationStep::ok(mailbox, summary)
        } else {
            OperationStep::warning(mailbox, summary)
        };

        OperationResult {
            steps: vec![step],
            error: None,
            started_at,
            finished_at: Local::now(),
        }
    }

    async fn synchronize(&self, ctx: &SyncContext) -> OperationResult {
        let started_at = Local::now();
        let Some(mailbox) = self.mailbox(ctx) else {
            return OperationResult::failed("imap.mailbox not configured", Vec::new());
        };

        let local_uids = self.source.uids(ctx.local_node.hostname.as_str(), mailbox);
        let remote_uids = self.source.uids(ctx.remote_node.hostname.as_str(), mailbox);

        let mut steps = Vec::new();
        let mut copy_errors = Vec::new();
        let mut copied = 0;

        for uid in local_uids.difference(&remote_uids) {
            match self
                .source
                .copy(mailbox, *uid, ctx.local_node.hostname.as_str(), ctx.remote_node.hostname.as_str())
            {
                Ok(()) => copied += 1,
                Err(e) => copy_errors.push(e),
            }
        }

        steps.push(OperationStep::ok(mailbox, format!("copied {} messages", copied)));

        let error = if copy_errors.is_empty() {
            None
        } else {
            Some(copy_errors.join("; "))
        };

        OperationResult {
            steps,
            error,
            started_at,
            finished_at: Local::now(),
        }
    }
}
