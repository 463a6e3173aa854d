//! Tether node binary.

mod cli;
mod config;
mod listener;

use std::sync::Arc;

use clap::Parser;
use tether_connection::Transport;
use tether_manager::{ManagedClient, ManagedServer};
use tether_observability::init_logging;
use tether_primitives::ServiceInfo;
use tether_tasks::TaskExecutor;
use tether_transport_tcp::{TcpClientTransport, TcpServerTransport};
use tracing::info;

use crate::{
    cli::{Cli, Commands, FindArgs, ServeArgs},
    config::TetherConfig,
    listener::LoggingListener,
};

/// DNS-SD system name advertised by servers.
const SYSTEM_NAME: &str = "tether";

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_logging(&cli.logs)?;

    info!("Starting tether {}", env!("CARGO_PKG_VERSION"));

    let executor = TaskExecutor::try_current()?;
    match cli.command {
        Commands::Serve(args) => serve(args, executor).await,
        Commands::Find(args) => find(args, executor).await,
    }
}

async fn serve(args: ServeArgs, executor: TaskExecutor) -> eyre::Result<()> {
    let mut config = TetherConfig::load(args.session.config.as_deref())?;
    config.apply_serve(&args);

    let user_info = config.session.user_info();
    let friendly_name = user_info
        .user_name
        .clone()
        .unwrap_or_else(|| SYSTEM_NAME.to_string());
    let transport: Arc<dyn Transport> = Arc::new(TcpServerTransport::new(
        config.tcp.listen_addr,
        ServiceInfo::new(friendly_name, SYSTEM_NAME),
    ));

    let server = ManagedServer::new(
        vec![transport],
        executor,
        config.session,
        config.link,
        Arc::new(LoggingListener::new(args.session.auto_accept)),
    );
    server.start_server(user_info);

    tokio::signal::ctrl_c().await?;
    server.stop_server();
    Ok(())
}

async fn find(args: FindArgs, executor: TaskExecutor) -> eyre::Result<()> {
    let mut config = TetherConfig::load(args.session.config.as_deref())?;
    config.apply_find(&args);

    if config.tcp.peers.is_empty() {
        eyre::bail!("no servers to connect to, pass --peer or set tcp.peers");
    }

    let user_info = config.session.user_info();
    let transport: Arc<dyn Transport> = Arc::new(TcpClientTransport::new(config.tcp.peers));

    let client = ManagedClient::new(
        vec![transport],
        executor,
        config.session,
        config.link,
        Arc::new(LoggingListener::new(args.session.auto_accept)),
    );
    client.find_server(user_info);

    tokio::signal::ctrl_c().await?;
    client.stop_finding_server();
    Ok(())
}
