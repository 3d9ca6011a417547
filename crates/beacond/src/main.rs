//! beacond — command-line front end for a Beacon store.
//!
//! Each invocation opens the store named in `beacon.toml`, starts the write
//! consumer, runs one operation and shuts down after the queue drains.
//!
//! # Usage
//!
//! ```text
//! beacond init --data-dir /var/lib/beacon
//! beacond provision --id <owner> --auth <secret> --tier system
//! beacond heartbeat --id <system> --auth <secret>
//! beacond report --id <system> --auth <secret> --key temp --data 21.5
//! beacond fetch --id <client> --auth <secret> --system <system> --key temp
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use beacon_core::{AccessTier, BeaconConfig};
use beacon_service::{Beacon, IssuedCredential};
use beacon_state::StateStore;
use clap::{Args, Parser, Subcommand};
use tracing::info;

#[derive(Parser)]
#[command(name = "beacond", about = "Beacon status store")]
struct Cli {
    /// Path to beacon.toml.
    #[arg(long, short, global = true, default_value = "beacon.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

/// Credentials of the calling identity.
#[derive(Args)]
struct Caller {
    #[arg(long)]
    id: String,
    #[arg(long)]
    auth: String,
}

#[derive(Subcommand)]
enum Command {
    /// Write a fresh beacon.toml, create the database and issue the owner credential.
    Init {
        /// Directory for the database file.
        #[arg(long, default_value = "/var/lib/beacon")]
        data_dir: PathBuf,
    },
    /// Issue a new credential.
    Provision {
        #[command(flatten)]
        caller: Caller,
        /// Tier of the new credential: system, client, admin or owner.
        #[arg(long)]
        tier: AccessTier,
    },
    /// Check that a credential authenticates.
    Check {
        #[command(flatten)]
        caller: Caller,
    },
    /// Record a heartbeat for the calling system.
    Heartbeat {
        #[command(flatten)]
        caller: Caller,
    },
    /// Store a JSON value under a key for the calling system.
    Report {
        #[command(flatten)]
        caller: Caller,
        #[arg(long)]
        key: String,
        /// JSON text, e.g. `21.5` or `{"sda":"ok"}`.
        #[arg(long)]
        data: String,
    },
    /// Read a system's value, or its last heartbeat when no key is given.
    Fetch {
        #[command(flatten)]
        caller: Caller,
        #[arg(long)]
        system: String,
        #[arg(long)]
        key: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,beacond=debug,beacon=debug")
            }),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Init { data_dir } => {
            let owner = init(&cli.config, &data_dir).await?;
            println!("{}", credential_json(&owner)?);
        }
        command => {
            let config = BeaconConfig::from_file(&cli.config)
                .with_context(|| format!("failed to load {}", cli.config.display()))?;
            let beacon = open(&config)?;
            let result = run(&beacon, command).await;
            beacon.shutdown().await?;
            let output = result?;
            if !output.is_empty() {
                println!("{output}");
            }
        }
    }
    Ok(())
}

fn open(config: &BeaconConfig) -> anyhow::Result<Beacon> {
    let path = config.database_path();
    let store = StateStore::open(&path)
        .with_context(|| format!("failed to open database {}", path.display()))?;
    Ok(Beacon::start(store, config)?)
}

/// Write the config, create the database and return the owner credential.
async fn init(config_path: &Path, data_dir: &Path) -> anyhow::Result<IssuedCredential> {
    if config_path.exists() {
        bail!("{} already exists", config_path.display());
    }

    std::fs::create_dir_all(data_dir)?;
    let config = BeaconConfig::scaffold(data_dir);
    std::fs::write(config_path, config.to_toml_string()?)?;
    info!(path = %config_path.display(), "wrote config");

    let beacon = open(&config)?;
    let owner = beacon.service().bootstrap_owner().await;
    beacon.shutdown().await?;

    Ok(owner?)
}

/// Run one command against a started store and return what to print.
async fn run(beacon: &Beacon, command: Command) -> anyhow::Result<String> {
    let service = beacon.service();

    let output = match command {
        Command::Init { .. } => bail!("init runs without an existing store"),
        Command::Provision { caller, tier } => {
            let issued = service.provision(&caller.id, &caller.auth, tier).await?;
            credential_json(&issued)?
        }
        Command::Check { caller } => {
            if !service.check_auth(&caller.id, &caller.auth).await {
                bail!("you do not have the proper credentials");
            }
            "ok".to_string()
        }
        Command::Heartbeat { caller } => service
            .record_heartbeat(&caller.id, &caller.auth)
            .await?
            .to_string(),
        Command::Report { caller, key, data } => {
            service
                .update_value(&caller.id, &caller.auth, &key, &data)
                .await?;
            String::new()
        }
        Command::Fetch {
            caller,
            system,
            key: Some(key),
        } => service
            .fetch_value(&caller.id, &caller.auth, &system, &key)
            .await?
            .to_string(),
        Command::Fetch {
            caller,
            system,
            key: None,
        } => service
            .fetch_heartbeat(&caller.id, &caller.auth, &system)
            .await?
            .unwrap_or_default(),
    };
    Ok(output)
}

fn credential_json(issued: &IssuedCredential) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(issued)?)
}
