//! WolfAdmin - Cluster Administration for WolfScale Storage Nodes
//!
//! Runs the admin RPC endpoint of a node and the supervisor that owns its
//! restart sequence.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wolfadmin::config::WolfAdminConfig;
use wolfadmin::error::Result;
use wolfadmin::locks::LockRegistry;
use wolfadmin::network::AdminRpcServer;
use wolfadmin::node::{supervise, NodeContext, ServiceSignal};
use wolfadmin::peers::{init_global_admin_peers, AdminPeers};
use wolfadmin::quorum;
use wolfadmin::reconcile::ConfigSnapshot;
use wolfadmin::runner::LocalRunner;

/// WolfAdmin - Cluster Administration for WolfScale Storage Nodes
#[derive(Parser)]
#[command(name = "wolfadmin")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "wolfadmin.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the admin endpoint of this node
    Start,

    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "wolfadmin.toml")]
        output: PathBuf,

        /// Address of this node (host:port)
        #[arg(long, default_value = "127.0.0.1:9000")]
        address: String,
    },

    /// Validate configuration file
    Validate,

    /// Show the ordered admin peer list
    Peers,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // The configured level applies unless overridden on the command line
    let level = cli.log_level.clone().unwrap_or_else(|| {
        WolfAdminConfig::from_file(&cli.config)
            .map(|c| c.logging.level)
            .unwrap_or_else(|_| "info".to_string())
    });
    init_logging(&level);

    match cli.command {
        Commands::Start => match run_start(cli.config).await? {
            ServiceSignal::Restart => restart_process(),
            _ => Ok(()),
        },
        Commands::Init { output, address } => run_init(output, address),
        Commands::Validate => run_validate(cli.config),
        Commands::Peers => run_peers(cli.config),
    }
}

fn init_logging(level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build the local runner for a loaded configuration
fn local_node(
    config: &WolfAdminConfig,
) -> Result<(
    Arc<NodeContext>,
    Arc<LocalRunner>,
    tokio::sync::mpsc::UnboundedReceiver<ServiceSignal>,
)> {
    let document = match &config.server {
        Some(table) => Some(ConfigSnapshot::from_document(table)?),
        None => {
            tracing::warn!("No [server] document configured; peers will see this node as config-less");
            None
        }
    };

    let (ctx, signals) = NodeContext::new(Arc::new(LockRegistry::new()), document);
    let ctx = Arc::new(ctx);
    let runner = Arc::new(LocalRunner::new(Arc::clone(&ctx)));
    Ok((ctx, runner, signals))
}

/// Run the node until the supervisor asks it to stop or restart
async fn run_start(config_path: PathBuf) -> Result<ServiceSignal> {
    tracing::info!("Starting WolfAdmin node...");

    let config = match WolfAdminConfig::from_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load configuration from {:?}: {}", config_path, e);
            return Err(e);
        }
    };
    tracing::info!("Loaded configuration for node: {}", config.node.address);

    let (ctx, local, mut signals) = local_node(&config)?;

    let peers = Arc::new(AdminPeers::from_config(&config, local.clone()));
    tracing::info!(
        "Admin peers ({}): {}",
        peers.len(),
        peers.addresses().join(", ")
    );
    if !init_global_admin_peers(Arc::clone(&peers)) {
        tracing::warn!("Admin peer directory already initialized");
    }

    let server = Arc::new(AdminRpcServer::new(
        config.bind_address().to_string(),
        config.credential.clone(),
        local,
    ));
    let listener = server.bind().await?;
    let serving = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.serve(listener).await })
    };

    ctx.mark_booted();
    tracing::info!("WolfAdmin node is up");

    let signal = tokio::select! {
        signal = supervise(&mut signals) => signal,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C");
            ServiceSignal::Stop
        }
    };

    server.stop();
    match serving.await {
        Ok(Err(e)) => tracing::warn!("Admin RPC server exited with error: {}", e),
        Err(e) => tracing::warn!("Admin RPC server task failed: {}", e),
        Ok(Ok(())) => {}
    }

    tracing::info!("WolfAdmin node stopped ({:?})", signal);
    Ok(signal)
}

/// Replace the current process with a fresh copy of itself
#[cfg(unix)]
fn restart_process() -> Result<()> {
    use std::os::unix::process::CommandExt;

    let exe = std::env::current_exe()?;
    tracing::info!("Restarting {:?}", exe);
    let err = std::process::Command::new(exe)
        .args(std::env::args_os().skip(1))
        .exec();
    Err(err.into())
}

#[cfg(not(unix))]
fn restart_process() -> Result<()> {
    let exe = std::env::current_exe()?;
    tracing::info!("Restarting {:?}", exe);
    std::process::Command::new(exe)
        .args(std::env::args_os().skip(1))
        .spawn()?;
    Ok(())
}

/// Initialize a new configuration file
fn run_init(output: PathBuf, address: String) -> Result<()> {
    let config_content = format!(
        r#"# WolfAdmin Configuration
# Generated configuration file

[node]
address = "{address}"
# bind_address = "0.0.0.0:9000"

[cluster]
endpoints = []
# endpoints = ["http://node-1:9000/export", "http://node-2:9000/export", "http://node-3:9000/export"]
connect_timeout_ms = 5000
request_timeout_ms = 30000

[credential]
access_key = "admin"
secret_key = "changeme"

[logging]
level = "info"

# Cluster-wide document served to peers; must be identical on every node
[server]
region = "us-east-1"
"#
    );

    std::fs::write(&output, config_content)?;
    println!("✓ Configuration written to {:?}", output);
    println!("  Edit the file to set the cluster endpoints and credential");
    Ok(())
}

/// Validate configuration file
fn run_validate(config_path: PathBuf) -> Result<()> {
    match WolfAdminConfig::from_file(&config_path) {
        Ok(config) => {
            let nodes = config.node_count();
            println!("✓ Configuration is valid");
            println!("  Node Address:   {}", config.node.address);
            println!("  Bind Address:   {}", config.bind_address());
            println!("  Endpoints:      {}", config.cluster.endpoints.len());
            println!("  Nodes:          {}", nodes);
            println!("  Write Quorum:   {}", config.write_quorum());
            println!("  Lock Quorum:    {}", quorum::lock_read_quorum(nodes));
            println!("  Uptime Quorum:  {}", quorum::uptime_read_quorum(nodes));
            println!(
                "  Server Config:  {}",
                if config.server.is_some() { "present" } else { "absent" }
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            Err(e)
        }
    }
}

/// Show the ordered admin peer list
fn run_peers(config_path: PathBuf) -> Result<()> {
    let config = WolfAdminConfig::from_file(&config_path)?;
    let (_ctx, local, _signals) = local_node(&config)?;
    let peers = AdminPeers::from_config(&config, local);

    println!("Admin Peers");
    println!("===========");
    for (i, address) in peers.addresses().iter().enumerate() {
        let role = if i == 0 { "local" } else { "remote" };
        println!("  {:>2}  {:<32} {}", i, address, role);
    }
    println!();
    println!(
        "Mode: {}",
        if peers.is_distributed() { "distributed" } else { "single node" }
    );
    Ok(())
}
