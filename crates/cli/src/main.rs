mod actor_commands;
mod config_commands;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    relaygram_bridge::ActorId,
    tracing::debug,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "relaygram", about = "Telegram bridge worker tooling", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins if set.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file to use instead of discovering `relaygram.{toml,yaml,json}`.
    #[arg(long, short, global = true, env = "RELAYGRAM_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration file and report errors/warnings.
    CheckConfig {
        /// Show informational diagnostics in addition to errors and warnings.
        #[arg(long)]
        verbose: bool,
    },
    /// Call getMe for configured actors and report whether their tokens work.
    Probe {
        /// Only probe this actor.
        #[arg(long)]
        actor: Option<i64>,
        /// Print snapshots as JSON lines.
        #[arg(long)]
        json: bool,
    },
    /// Reconcile configured actors against an actor snapshot and print the changes.
    SyncActors {
        /// JSON object of persisted actors keyed by id. Empty when omitted.
        #[arg(long)]
        existing: Option<PathBuf>,
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so command output on stdout stays parseable.
    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    debug!(version = env!("CARGO_PKG_VERSION"), "relaygram starting");

    let config = cli.config.as_deref();
    match cli.command {
        Commands::CheckConfig { verbose } => config_commands::check(config, verbose),
        Commands::Probe { actor, json } => {
            actor_commands::probe(config, actor.map(ActorId), json).await
        },
        Commands::SyncActors { existing, json } => {
            actor_commands::sync(config, existing.as_deref(), json).await
        },
    }
}
