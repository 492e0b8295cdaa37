//! keel — standalone deploy harness.
//!
//! Wires the deploy pipeline to local collaborators:
//! - State store (redb, on disk)
//! - Fake registry puller behind the retrying puller
//! - Static process-type extractor
//! - In-memory cluster backend
//!
//! # Usage
//!
//! ```text
//! keel --config keel.toml deploy remind101/acme-inc:latest --process web='./bin/web'
//! keel apps
//! keel releases acme-inc
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use keel_core::{Image, KeelConfig};
use keel_deploy::{DeployPipeline, SlugService, StaticExtractor};
use keel_puller::{FakePuller, RetryPuller};
use keel_scheduler::{MemoryCluster, Scheduler};
use keel_state::StateStore;

#[derive(Parser)]
#[command(name = "keel", about = "Keel standalone deploy harness")]
struct Cli {
    /// Path to keel.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory for persistent state (overrides the config file).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Pull an image and deploy it as a new release.
    Deploy {
        /// Image reference, e.g. `quay.io/remind101/acme-inc:v2`.
        image: String,

        /// Process type served by the image, as TYPE=COMMAND. Repeatable.
        #[arg(long = "process", value_parser = parse_process)]
        processes: Vec<(String, Vec<String>)>,

        /// Pull attempts before giving up (0 = unlimited).
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Overall pull deadline, e.g. `30s` or `10m` (0 = none).
        #[arg(long)]
        deadline: Option<String>,
    },

    /// List apps.
    Apps,

    /// List an app's releases.
    Releases {
        /// App name.
        app: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => KeelConfig::from_file(path)?,
        None => KeelConfig::default(),
    };
    if let Some(dir) = cli.data_dir {
        config.state.data_dir = dir;
    }

    // Logs go to stderr; stdout carries the progress stream.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log.filter)),
        )
        .init();

    let store = open_store(&config.state.data_dir)?;

    match cli.command {
        Command::Deploy {
            image,
            processes,
            max_attempts,
            deadline,
        } => {
            if let Some(max) = max_attempts {
                config.pull.max_attempts = Some(max);
            }
            if deadline.is_some() {
                config.pull.deadline = deadline;
            }
            if !processes.is_empty() {
                config.processes = processes.into_iter().collect();
            }
            run_deploy(&config, store, &image).await
        }
        Command::Apps => {
            for app in store.list_apps()? {
                println!("{}\t{}\t{}", app.name, app.id, app.repo);
            }
            Ok(())
        }
        Command::Releases { app } => {
            let record = store
                .find_app_by_name(&app)?
                .with_context(|| format!("app not found: {app}"))?;
            for release in store.list_releases(&record.id)? {
                println!(
                    "v{}\t{}\t{}",
                    release.version, release.created_at, release.description
                );
            }
            Ok(())
        }
    }
}

fn open_store(data_dir: &Path) -> anyhow::Result<StateStore> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("creating data directory {}", data_dir.display()))?;
    let db_path = data_dir.join("keel.redb");
    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");
    Ok(store)
}

async fn run_deploy(config: &KeelConfig, store: StateStore, reference: &str) -> anyhow::Result<()> {
    let image = Image::parse(reference)?;
    let policy = config.retry_policy()?;
    info!(
        max_attempts = policy.max_attempts,
        deadline = ?policy.deadline,
        "pull policy resolved"
    );

    // ── Assemble the pipeline ──────────────────────────────────

    let puller = Arc::new(RetryPuller::new(FakePuller, policy));
    let extractor = Arc::new(StaticExtractor::new(config.processes.clone()));
    let cluster = Arc::new(MemoryCluster::new());
    let scheduler = Arc::new(Scheduler::new(cluster.clone()));
    let store = Arc::new(store);
    let slugs = SlugService::new(puller, extractor, store.clone());
    let pipeline = DeployPipeline::new(store, slugs, scheduler);

    let mut stdout = std::io::stdout();
    let deploy = pipeline
        .deploy(&image, &mut stdout)
        .await
        .with_context(|| format!("deploying {image}"))?;

    println!("Deployed {image} as release v{}", deploy.release.version);
    for service in cluster.services().await {
        println!("{}", serde_json::to_string(&service)?);
    }
    Ok(())
}

/// Parse `TYPE=COMMAND`; the command is split on whitespace.
fn parse_process(s: &str) -> Result<(String, Vec<String>), String> {
    let (process_type, command) = s
        .split_once('=')
        .ok_or_else(|| format!("expected TYPE=COMMAND, got {s:?}"))?;
    let command: Vec<String> = command.split_whitespace().map(String::from).collect();
    if process_type.is_empty() || command.is_empty() {
        return Err(format!("expected TYPE=COMMAND, got {s:?}"));
    }
    Ok((process_type.to_string(), command))
}
