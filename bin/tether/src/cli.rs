//! Command-line interface.

use std::{net::SocketAddr, path::PathBuf};

use clap::{Args, Parser, Subcommand};
use tether_observability::LogArgs;

/// Tether peer link node.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub(crate) struct Cli {
    #[command(flatten)]
    pub(crate) logs: LogArgs,

    #[command(subcommand)]
    pub(crate) command: Commands,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Commands {
    /// Accept clients over TCP.
    Serve(ServeArgs),

    /// Connect to servers over TCP.
    Find(FindArgs),
}

/// Arguments shared by both roles.
#[derive(Debug, Args)]
#[command(next_help_heading = "Session")]
pub(crate) struct SessionArgs {
    /// TOML configuration file. Command-line flags override its values.
    #[arg(long, value_name = "PATH")]
    pub(crate) config: Option<PathBuf>,

    /// Name advertised to peers.
    #[arg(long)]
    pub(crate) name: Option<String>,

    /// Keep every connection to a peer instead of merging duplicates.
    #[arg(long)]
    pub(crate) no_dedup: bool,

    /// Accept every pending decision (bonding, admission, joining) once.
    #[arg(long)]
    pub(crate) auto_accept: bool,
}

#[derive(Debug, Args)]
pub(crate) struct ServeArgs {
    #[command(flatten)]
    pub(crate) session: SessionArgs,

    /// Address to accept clients on.
    #[arg(long, value_name = "ADDR", help_heading = "TCP")]
    pub(crate) listen: Option<SocketAddr>,
}

#[derive(Debug, Args)]
pub(crate) struct FindArgs {
    #[command(flatten)]
    pub(crate) session: SessionArgs,

    /// Server to connect to. May be repeated.
    #[arg(long = "peer", value_name = "ADDR", help_heading = "TCP")]
    pub(crate) peers: Vec<SocketAddr>,

    /// Join servers as soon as they are identified.
    #[arg(long)]
    pub(crate) eager: bool,
}
