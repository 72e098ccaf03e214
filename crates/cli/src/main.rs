mod account_commands;

use std::{net::SocketAddr, path::PathBuf};

use {
    anyhow::Context,
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use {parley_auth::UserStore, parley_config::ParleyConfig};

#[derive(Parser)]
#[command(name = "parley", about = "Parley: real-time chat gateway", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file; defaults to parley.{toml,yaml,yml,json} in the current
    /// directory or ~/.config/parley.
    #[arg(long, global = true, env = "PARLEY_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the chat gateway.
    Gateway {
        #[arg(long)]
        bind: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        /// Base URL of the identity service.
        #[arg(long, env = "PARLEY_IDENTITY_URL")]
        identity_url: Option<String>,
    },
    /// Run the in-memory identity service.
    Identity {
        #[arg(long)]
        bind: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Account management against the identity service.
    Account {
        #[command(subcommand)]
        action: account_commands::AccountAction,
        /// Base URL of the identity service.
        #[arg(long, global = true, env = "PARLEY_IDENTITY_URL")]
        identity_url: Option<String>,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

async fn run_identity(config: &ParleyConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.identity.bind, config.identity.port)
        .parse()
        .with_context(|| format!("invalid bind address {}", config.identity.bind))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    parley_auth::service::serve_identity(
        listener,
        UserStore::new(),
        parley_gateway::shutdown_signal(),
    )
    .await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "parley starting");
    let mut config = parley_config::load_or_discover(cli.config.as_deref())?;

    match cli.command {
        Commands::Gateway {
            bind,
            port,
            identity_url,
        } => {
            if let Some(bind) = bind {
                config.gateway.bind = bind;
            }
            if let Some(port) = port {
                config.gateway.port = port;
            }
            if let Some(url) = identity_url {
                config.identity.url = url;
            }
            parley_gateway::start_gateway(&config).await
        },
        Commands::Identity { bind, port } => {
            if let Some(bind) = bind {
                config.identity.bind = bind;
            }
            if let Some(port) = port {
                config.identity.port = port;
            }
            run_identity(&config).await
        },
        Commands::Account {
            action,
            identity_url,
        } => {
            if let Some(url) = identity_url {
                config.identity.url = url;
            }
            account_commands::handle_account(action, &config.identity).await
        },
    }
}
