//! appclusterd — the daemon entry point.
//!
//! Grounded on `bin/atlas.rs::main`: parse CLI flags, build the context,
//! initialize it, then run until signaled.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use appcluster::cluster::ClusterCoordinator;
use appcluster::config::{spawn_file_watcher, FileConfigurationSource, DEFAULT_FILE_CHECK_INTERVAL};
use appcluster::events::LoggingEventSink;
use appcluster::sync::PluginRegistry;
use clap::Parser;

#[derive(Parser)]
#[command(name = "appclusterd")]
#[command(author = "appcluster contributors")]
#[command(version)]
#[command(about = "DNS-observed master/slave cluster coordinator daemon", long_about = None)]
struct Cli {
    /// Path to the properties-style configuration file.
    #[arg(short = 'c', long, env = "APPCLUSTER_CONFIG", default_value = "appcluster.properties")]
    config: PathBuf,

    /// How often to poll the configuration file for changes, in seconds.
    #[arg(long, default_value_t = DEFAULT_FILE_CHECK_INTERVAL.as_secs())]
    file_check_interval_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let event_sink = Arc::new(LoggingEventSink);

    let config_source = FileConfigurationSource::new(
        cli.config.clone(),
        Duration::from_secs(cli.file_check_interval_secs),
        event_sink.clone(),
    )?;
    spawn_file_watcher(config_source.clone());

    let cluster = ClusterCoordinator::new(config_source, event_sink, Arc::new(PluginRegistry::with_builtin_plugins()));
    cluster.start()?;
    tracing::info!("appclusterd running, press ctrl-c to stop");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    cluster.stop();

    Ok(())
}
