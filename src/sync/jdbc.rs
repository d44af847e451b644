//! JDBC-style schema/row synchronizer (§4.6 "representative plug-in; not
//! part of the required core but specified for completeness of the
//! interface").
//!
//! `test` compares catalog -> schema -> table -> column metadata, then for
//! each shared table performs a **merge walk** over the two endpoints' rows
//! ordered by primary key, classifying each row as match / modified /
//! missing / extra. String primary-key columns are ordered by UTF-8 byte
//! comparison (decoupling from server collation); binary-typed columns are
//! compared via hash rather than byte-for-byte. There is no real database
//! driver in scope here (the spec excludes "the data-source naming service
//! used by the JDBC plug-in", §1) — row access goes through a small
//! `JdbcConnector` trait that a real deployment would back with an actual
//! driver; the default connector sees an empty schema on both sides.

use std::collections::BTreeMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Local;

use super::{OperationResult, OperationStep, SyncContext, SynchronizerPlugin};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnValue {
    Text(String),
    Binary(Vec<u8>),
}

impl ColumnValue {
    fn comparison_key(&self) -> ComparisonKey {
        match self {
            ColumnValue::Text(s) => ComparisonKey::Bytes(s.as_bytes().to_vec()),
            ColumnValue::Binary(b) => {
                let mut hasher = DefaultHasher::new();
                b.hash(&mut hasher);
                ComparisonKey::Hash(hasher.finish())
            }
        }
    }
}

#[derive(PartialEq)]
enum ComparisonKey {
    Bytes(Vec<u8>),
    Hash(u64),
}

#[derive(Debug, Clone)]
pub struct Row {
    /// Primary-key column values, in declared column order; compared as raw
    /// UTF-8 bytes per column.
    pub pk: Vec<String>,
    pub columns: BTreeMap<String, ColumnValue>,
}

/// A single endpoint's view of one table: metadata plus rows already
/// ordered by primary key (as a real `SELECT ... ORDER BY <pk cols>` with
/// `FETCH_FORWARD` would deliver them).
pub struct TableSnapshot {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

pub trait JdbcConnector: Send + Sync {
    fn tables(&self) -> Vec<String>;
    fn snapshot(&self, node_hostname: &str, table: &str) -> Option<TableSnapshot>;
}

pub struct NullJdbcConnector;

impl JdbcConnector for NullJdbcConnector {
    fn tables(&self) -> Vec<String> {
        Vec::new()
    }

    fn snapshot(&self, _node_hostname: &str, _table: &str) -> Option<TableSnapshot> {
        None
    }
}

#[derive(Debug, PartialEq, Eq)]
enum RowDiff {
    Match,
    Modified,
    Missing,
    Extra,
}

/// The merge walk: two pointers over pk-ordered row streams (§4.6).
fn merge_walk(local: &[Row], remote: &[Row]) -> Vec<(Vec<String>, RowDiff)> {
    let mut i = 0;
    let mut j = 0;
    let mut diffs = Vec::new();

    while i < local.len() && j < remote.len() {
        match local[i].pk.cmp(&remote[j].pk) {
            std::cmp::Ordering::Equal => {
                let same = local[i].columns.len() == remote[j].columns.len()
                    && local[i].columns.iter().all(|(k, v)| {
                        remote[j]
                            .columns
                            .get(k)
                            .map(|rv| rv.comparison_key() == v.comparison_key())
                            .unwrap_or(false)
                    });
                diffs.push((local[i].pk.clone(), if same { RowDiff::Match } else { RowDiff::Modified }));
                i += 1;
                j += 1;
            }
            std::cmp::Ordering::Less => {
                diffs.push((local[i].pk.clone(), RowDiff::Missing));
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                diffs.push((remote[j].pk.clone(), RowDiff::Extra));
                j += 1;
            }
        }
    }
    while i < local.len() {
        diffs.push((local[i].pk.clone(), RowDiff::Missing));
        i += 1;
    }
    while j < remote.len() {
        diffs.push((remote[j].pk.clone(), RowDiff::Extra));
        j += 1;
    }

    diffs
}

pub struct JdbcPlugin {
    connector: Arc<dyn JdbcConnector>,
}

impl Default for JdbcPlugin {
    fn default() -> Self {
        JdbcPlugin {
            connector: Arc::new(NullJdbcConnector),
        }
    }
}

impl JdbcPlugin {
    pub fn with_connector(connector: Arc<dyn JdbcConnector>) -> JdbcPlugin {
        JdbcPlugin { connector }
    }

    fn tables(&self, ctx: &SyncContext) -> Vec<String> {
        match ctx.param("jdbc.tables") {
            Some(list) => list.split(',').map(|t| t.trim().to_string()).filter(|t| !t.is_empty()).collect(),
            None => self.connector.tables(),
        }
    }

    /// "Everything runs within the outer transaction, which is rolled back
    /// at the end of a test" — there's no real transaction here, but the
    /// shape is preserved: `test` only ever reads, never calls a mutating
    /// connector method.
    fn compare_table(&self, ctx: &SyncContext, table: &str) -> OperationStep {
        let local = self.connector.snapshot(ctx.local_node.hostname.as_str(), table);
        let remote = self.connector.snapshot(ctx.remote_node.hostname.as_str(), table);

        let (local, remote) = match (local, remote) {
            (Some(l), Some(r)) => (l, r),
            _ => return OperationStep::error(table, "table missing on one endpoint"),
        };

        if local.columns != remote.columns {
            return OperationStep::error(table, format!("column metadata differs: {:?} vs {:?}", local.columns, remote.columns));
        }

        let diffs = merge_walk(&local.rows, &remote.rows);
        let modified = diffs.iter().filter(|(_, d)| *d == RowDiff::Modified).count();
        let missing = diffs.iter().filter(|(_, d)| *d == RowDiff::Missing).count();
        let extra = diffs.iter().filter(|(_, d)| *d == RowDiff::Extra).count();

        let summary = format!(
            "{} rows compared: {} modified, {} missing, {} extra",
            diffs.len(),
            modified,
            missing,
            extra
        );

        if modified == 0 && missing == 0 && extra == 0 {
            OperationStep::ok(table, summary)
        } else {
            OperationStep::warning(table, summary)
        }
    }
}

#[async_trait]
impl SynchronizerPlugin for JdbcPlugin {
    async fn test(&self, ctx: &SyncContext) -> OperationResult {
        let started_at = Local::now();
        let tables = self.tables(ctx);

        if tables.is_empty() {
            return OperationResult {
                steps: vec![OperationStep::warning("schema", "no tables configured for comparison")],
                error: None,
                started_at,
                finished_at: Local::now(),
            };
        }

        let steps: Vec<OperationStep> = tables.iter().map(|t| self.compare_table(ctx, t)).collect();
        OperationResult {
            steps,
            error: None,
            started_at,
            finished_at: Local::now(),
        }
    }

    async fn synchronize(&self, ctx: &SyncContext) -> OperationResult {
        // A synchronize always performs a test first (§4.4 "a synchronize
        // also counts as a test") and then reports what a real connector
        // would additionally have to push; applying the delta is left to
        // the concrete connector, which this crate does not ship.
        let mut result = self.test(ctx).await;
        result.steps.push(OperationStep::warning(
            "apply",
            "row-level apply is delegated to the configured JdbcConnector implementation",
        ));
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{NameserverHostname, NodeId, ResourceId};
    use crate::model::{Node, Resource, ResourceNode};
    use std::collections::BTreeSet;

    struct FixedConnector {
        local: TableSnapshot,
        remote: TableSnapshot,
    }

    impl JdbcConnector for FixedConnector {
        fn tables(&self) -> Vec<String> {
            vec!["widgets".to_string()]
        }

        fn snapshot(&self, node_hostname: &str, _table: &str) -> Option<TableSnapshot> {
            if node_hostname.starts_with("a") {
                Some(TableSnapshot {
                    columns: self.local.columns.clone(),
                    rows: self.local.rows.clone(),
                })
            } else {
                Some(TableSnapshot {
                    columns: self.remote.columns.clone(),
                    rows: self.remote.rows.clone(),
                })
            }
        }
    }

    fn row(pk: &str, value: &str) -> Row {
        let mut columns = BTreeMap::new();
        columns.insert("value".to_string(), ColumnValue::Text(value.to_string()));
        Row {
            pk: vec![pk.to_string()],
            columns,
        }
    }

    fn ctx(tables: &str) -> SyncContext {
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

        let mut params = BTreeMap::new();
        params.insert("jdbc.tables".to_string(), tables.to_string());

        SyncContext {
            resource: Resource {
                id: ResourceId::new("r"),
                display_name: "R".to_string(),
                enabled: true,
                resource_type: "jdbc".to_string(),
                allow_multi_master: false,
                master_records: BTreeSet::new(),
                master_record_ttl_secs: 300,
                resource_nodes: BTreeMap::new(),
                params,
            },
            local_node: node("a"),
            remote_node: node("b"),
            local_resource_node: rn("a"),
            remote_resource_node: rn("b"),
        }
    }

    #[test]
    fn merge_walk_classifies_all_four_cases() {
        let local = vec![row("1", "x"), row("2", "y"), row("3", "z")];
        let remote = vec![row("1", "x"), row("2", "different"), row("4", "w")];
        let diffs = merge_walk(&local, &remote);

        assert_eq!(diffs[0].1, RowDiff::Match);
        assert_eq!(diffs[1].1, RowDiff::Modified);
        assert_eq!(diffs[2].1, RowDiff::Missing); // pk "3" only local
        assert_eq!(diffs[3].1, RowDiff::Extra); // pk "4" only remote
    }

    #[tokio::test]
    async fn test_reports_clean_when_rows_match() {
        let connector = Arc::new(FixedConnector {
            local: TableSnapshot {
                columns: vec!["value".to_string()],
                rows: vec![row("1", "x")],
            },
            remote: TableSnapshot {
                columns: vec!["value".to_string()],
                rows: vec![row("1", "x")],
            },
        });
        let plugin = JdbcPlugin::with_connector(connector);
        let result = plugin.test(&ctx("widgets")).await;
        assert_eq!(result.status(), super::super::OperationStatus::Successful);
    }

    #[tokio::test]
    async fn synchronize_always_runs_a_test_first() {
        let connector = Arc::new(FixedConnector {
            local: TableSnapshot {
                columns: vec!["value".to_string()],
                rows: vec![row("1", "x")],
            },
            remote: TableSnapshot {
                columns: vec!["value".to_string()],
                rows: vec![row("1", "y")],
            },
        });
        let plugin = JdbcPlugin::with_connector(connector);
        let result = plugin.synchronize(&ctx("widgets")).await;
        assert!(result.steps.iter().any(|s| s.name == "widgets"));
        assert!(result.steps.iter().any(|s| s.name == "apply"));
    }
}
