use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use console::style;
use sdr_memory_core::{StoreError, config};
use std::path::PathBuf;
use std::process::ExitCode;
mod commands;

#[derive(Parser)]
#[command(name = "sdr-memory")]
#[command(about = "sdr-memory - per-customer profile, memory and history", long_about = None)]
struct Cli {
    /// Workspace root holding memory/users/
    #[arg(long, global = true)]
    workspace: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
pub struct Identity {
    #[arg(long)]
    pub channel: String,
    #[arg(long, default_value = "")]
    pub sender_id: String,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
pub struct PatchSource {
    /// Patch as inline JSON
    #[arg(long = "json")]
    pub json: Option<String>,
    /// Path to a JSON patch file
    #[arg(long)]
    pub file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    ResolveKey {
        #[command(flatten)]
        identity: Identity,
    },
    ShowPath {
        #[command(flatten)]
        identity: Identity,
    },
    Ensure {
        #[command(flatten)]
        identity: Identity,
    },
    GetProfile {
        #[command(flatten)]
        identity: Identity,
    },
    UpsertProfile {
        #[command(flatten)]
        identity: Identity,
        #[command(flatten)]
        patch: PatchSource,
    },
    AppendHistory {
        #[command(flatten)]
        identity: Identity,
        #[arg(long)]
        entry: String,
    },
    SetNextStep {
        #[command(flatten)]
        identity: Identity,
        #[arg(long)]
        next_step: String,
    },
    GetHistory {
        #[command(flatten)]
        identity: Identity,
    },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    if let Commands::ResolveKey { identity } = &cli.command {
        println!("{}", commands::resolve_key(identity));
        return Ok(());
    }

    let config = config::Config::load_or_init()?;
    let workspace = config.resolve_workspace(cli.workspace.as_deref());
    tracing::debug!(workspace = %workspace.display(), "Using workspace");

    commands::run(&workspace, cli.command).await
}

/// 0 ok, 1 usage or config, 2 invalid patch, 3 corrupt profile,
/// 4 empty entry, 5 storage failure.
fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<StoreError>() {
        Some(StoreError::InvalidPatch { .. }) => 2,
        Some(StoreError::CorruptProfile { .. }) => 3,
        Some(StoreError::EmptyEntry { .. }) => 4,
        Some(StoreError::Io { .. }) => 5,
        None => 1,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", style("error:").red().bold(), e);
            ExitCode::from(exit_code(&e))
        }
    }
}
