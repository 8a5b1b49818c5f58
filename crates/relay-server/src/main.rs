mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use config::Config;
use relay_chat::ChatHub;
use relay_identity::IdentityStore;
use relay_pairing::PairingManager;
use relay_registry::FileRegistry;
use relay_status::StatusState;

/// SSH-authenticated chat and file-relay hub.
#[derive(Parser)]
#[command(name = "relay-server")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// SSH listen address
    #[arg(long)]
    ssh_addr: Option<String>,

    /// HTTP status listen address
    #[arg(long)]
    http_addr: Option<String>,

    /// Path to the SSH host key (OpenSSH private key format)
    #[arg(long)]
    host_key: PathBuf,

    /// Path to the identity store file
    #[arg(long)]
    identity_db: Option<PathBuf>,

    /// Optional TOML config file; CLI flags above override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Increase log verbosity; repeatable
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load_or_default(cli.config.as_deref())?;
    if let Some(addr) = cli.ssh_addr {
        config.network.ssh_addr = addr;
    }
    if let Some(addr) = cli.http_addr {
        config.network.http_addr = addr;
    }
    if let Some(db) = cli.identity_db {
        config.identity.db_path = db;
    }
    config.validate()?;

    // CLI verbosity overrides the config file's level when passed explicitly.
    let level = match cli.verbose {
        0 => config.logging.level.clone(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    tracing_subscriber::fmt().with_env_filter(level).init();

    let host_key = russh_keys::load_secret_key(&cli.host_key, None)
        .map_err(|e| anyhow::anyhow!("failed to load host key from {}: {e}", cli.host_key.display()))?;

    let identity = Arc::new(IdentityStore::load(&config.identity.db_path).await?);
    let registry = Arc::new(FileRegistry::new());
    let pairing = Arc::new(PairingManager::default());
    let chat = Arc::new(ChatHub::new(Arc::clone(&registry)));

    let ssh_addr: SocketAddr = config.network.ssh_addr.parse()?;
    let http_addr: SocketAddr = config.network.http_addr.parse()?;

    tracing::info!(%ssh_addr, %http_addr, "starting relay-server");

    let status_state = StatusState {
        chat: Arc::clone(&chat),
        hostname: hostname(),
        ssh_addr: config.network.ssh_addr.clone(),
        http_addr: config.network.http_addr.clone(),
        started_at: Instant::now(),
    };
    let status_router = relay_status::router(status_state);

    let ssh_task = tokio::spawn(relay_ssh::serve(ssh_addr, host_key, identity, chat, pairing));
    let http_task = tokio::spawn(async move {
        let listener = tokio::net::TcpListener::bind(http_addr).await?;
        axum::serve(listener, status_router).await?;
        Ok::<(), std::io::Error>(())
    });

    tokio::select! {
        result = ssh_task => {
            result??;
        }
        result = http_task => {
            result??;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    Ok(())
}

fn hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "relay-server".to_string())
}
