use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use fognode::config::NodeConfig;
use fognode::identity::Role;
use fognode::node::{Node, NodeBehavior};
use fognode::roles::{LoggerBehavior, MasterBehavior, WorkerBehavior};

#[derive(Parser, Debug)]
#[command(name = "fognode")]
#[command(version)]
#[command(about = "Node runtime for the fog computing testbed")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run the master node
    Master(NodeArgs),

    /// Run the remote logger
    Logger(NodeArgs),

    /// Run a worker node
    Worker(NodeArgs),
}

#[derive(Parser, Debug)]
struct NodeArgs {
    /// Address this node listens on and advertises to peers
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(long, short = 'p')]
    port: u16,

    /// Master address (host:port)
    #[arg(long, default_value = "127.0.0.1:5000")]
    master: SocketAddr,

    /// Remote logger address (host:port)
    #[arg(long, default_value = "127.0.0.1:5001")]
    logger: SocketAddr,

    /// Numeric id for the master and the remote logger
    #[arg(long, default_value = "0")]
    node_id: u64,

    /// Receiver and sender pool size
    #[arg(long, default_value = "32")]
    threads: usize,

    /// Drop failed sends instead of reporting them to the master
    #[arg(long)]
    ignore_socket_err: bool,

    /// Seconds between resource and statistics uploads
    #[arg(long, default_value = "10")]
    upload_period: u64,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "debug")]
    log_level: String,
}

impl NodeArgs {
    fn into_config(self, role: Role) -> Result<NodeConfig, Box<dyn std::error::Error>> {
        let listen_addr: SocketAddr = format!("{}:{}", self.host, self.port).parse()?;
        let mut config = NodeConfig::new(role, listen_addr)
            .with_node_id(self.node_id)
            .with_master(self.master)
            .with_logger(self.logger)
            .with_thread_number(self.threads)
            .with_ignore_socket_err(self.ignore_socket_err)
            .with_upload_period(Duration::from_secs(self.upload_period));
        config.log_level = self.log_level;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let (config, behavior): (NodeConfig, Arc<dyn NodeBehavior>) = match args.command {
        Commands::Master(node) => (
            node.into_config(Role::Master)?,
            Arc::new(MasterBehavior::new()) as Arc<dyn NodeBehavior>,
        ),
        Commands::Logger(node) => (
            node.into_config(Role::RemoteLogger)?,
            Arc::new(LoggerBehavior::new()) as Arc<dyn NodeBehavior>,
        ),
        Commands::Worker(node) => (
            node.into_config(Role::Worker)?,
            Arc::new(WorkerBehavior::new()) as Arc<dyn NodeBehavior>,
        ),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str())),
        )
        .init();

    tracing::info!(
        role = %config.role,
        listen_addr = %config.listen_addr,
        master = %config.master_addr,
        logger = %config.logger_addr,
        "Starting node"
    );

    Node::builder(config, behavior).build()?.run().await?;
    Ok(())
}
