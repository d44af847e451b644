//! appcluster-status — a one-shot snapshot CLI.
//!
//! Grounded on `bin/atlas-cli.rs`'s `handle_status` (fetch once, render a
//! `comfy_table::Table`, color the result) but reads the configuration file
//! and runs the DNS checks itself rather than calling a running daemon —
//! there is no HTTP surface here to call into (§1 Non-goals).

use std::path::PathBuf;
use std::sync::Arc;

use appcluster::cluster::{build_model, determine_this_node};
use appcluster::config::MapConfigurationSource;
use appcluster::dns::ResolverCache;
use appcluster::events::LoggingEventSink;
use appcluster::model::ClusterModel;
use appcluster::monitor::{DnsClassification, ResourceMonitor, DEFAULT_DNS_CHECK_INTERVAL};
use appcluster::status::Status;
use clap::Parser;
use colored::Colorize;
use comfy_table::Table;

#[derive(Parser)]
#[command(name = "appcluster-status")]
#[command(author = "appcluster contributors")]
#[command(version)]
#[command(about = "Run one DNS observation pass and print cluster status", long_about = None)]
struct Cli {
    /// Path to the properties-style configuration file.
    #[arg(short = 'c', long, env = "APPCLUSTER_CONFIG", default_value = "appcluster.properties")]
    config: PathBuf,

    /// Disable colored output.
    #[arg(long)]
    no_color: bool,
}

fn colorize(status: Status, text: &str) -> colored::ColoredString {
    match status {
        Status::Healthy => text.green(),
        Status::Starting | Status::Warning => text.yellow(),
        Status::Error | Status::Inconsistent => text.red(),
        Status::Disabled | Status::Stopped | Status::Unknown => text.dimmed(),
    }
}

fn classification_label(class: DnsClassification) -> &'static str {
    match class {
        DnsClassification::Unknown => "unknown",
        DnsClassification::Disabled => "disabled",
        DnsClassification::Stopped => "stopped",
        DnsClassification::Starting => "starting",
        DnsClassification::Slave => "slave",
        DnsClassification::Master => "master",
        DnsClassification::Inconsistent => "inconsistent",
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    if cli.no_color {
        colored::control::set_override(false);
    }

    let text = std::fs::read_to_string(&cli.config)
        .map_err(|e| format!("could not read {}: {}", cli.config.display(), e))?;
    let config = MapConfigurationSource::from_properties(&text)?;
    let snapshot = config.snapshot();

    let (nodes, resources) = build_model(&snapshot)?;
    let model = ClusterModel::new(nodes.clone(), resources.clone())?;

    let this_node = determine_this_node(&model).ok();
    match &this_node {
        Some(id) => println!("{} this node: {}", "i".blue().bold(), id),
        None => println!("{} could not determine this node from HOSTNAME; showing all nodes", "⚠".yellow().bold()),
    }

    let resolver_cache = Arc::new(ResolverCache::new(appcluster::dns::resolver_cache::DEFAULT_LOOKUP_TIMEOUT));

    let mut overall = Status::Healthy;
    let mut table = Table::new();
    table.set_header(vec!["Resource", "Node", "Role", "Messages"]);

    for resource in model.resources.values() {
        let monitor = ResourceMonitor::new(
            resource.clone(),
            model.nodes.clone(),
            snapshot.enabled,
            resolver_cache.clone(),
            DEFAULT_DNS_CHECK_INTERVAL,
            Arc::new(LoggingEventSink),
        );
        let result = monitor.run_tick_now().await;
        overall = overall.max(result.status());

        let master_label = classification_label(result.master_status);
        table.add_row(vec![
            resource.id.to_string(),
            "(master)".to_string(),
            colorize(result.master_status.to_status(), master_label).to_string(),
            result.master_status_messages.join("; "),
        ]);

        for (node_id, node_result) in &result.node_results {
            let label = classification_label(node_result.node_status);
            let is_this = this_node.as_ref() == Some(node_id);
            let node_col = if is_this { format!("{} (this)", node_id) } else { node_id.to_string() };
            table.add_row(vec![
                String::new(),
                node_col,
                colorize(node_result.node_status.to_status(), label).to_string(),
                node_result.node_status_messages.join("; "),
            ]);
        }
    }

    println!("{}", table);

    let health = resolver_cache.health_snapshot();
    if !health.is_empty() {
        let mut ns_table = Table::new();
        ns_table.set_header(vec!["Nameserver", "Successes", "Failures", "Last error"]);
        for (hostname, health) in health {
            ns_table.add_row(vec![
                hostname,
                health.successes.to_string(),
                health.failures.to_string(),
                health.last_error.unwrap_or_default(),
            ]);
        }
        println!("{}", ns_table);
    }

    let overall_label = format!("{:?}", overall).to_uppercase();
    println!("{} overall status: {}", "=".bold(), colorize(overall, &overall_label));

    // Non-zero exit for anything worse than HEALTHY, for use in scripts/cron.
    if overall > Status::Healthy {
        std::process::exit(1);
    }

    Ok(())
}
