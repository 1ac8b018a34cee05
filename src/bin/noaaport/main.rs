mod ingest;

use std::io::stderr;
use std::net::Ipv4Addr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use noaaport::config::Config;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Receive SBN datagrams from a NOAAPort multicast group and write each
    /// reassembled product to its own file.
    ///
    /// Ingest runs until no datagram has been received for --timeout seconds, then
    /// finishes any queued work and prints a JSON summary to stdout. Without a
    /// timeout it runs until killed.
    Ingest {
        /// JSON config file. Flags override values from the file.
        #[arg(short, long, value_name = "path")]
        config: Option<PathBuf>,

        /// Multicast group to join, e.g., 224.0.1.1 for the NWSTG channel.
        #[arg(short, long)]
        group: Option<Ipv4Addr>,

        /// Local interface address to join the group on.
        #[arg(short, long)]
        interface: Option<Ipv4Addr>,

        /// UDP port. Defaults to the port mapped to the group.
        #[arg(short, long)]
        port: Option<u16>,

        /// Stop after this many seconds without a datagram.
        #[arg(short, long, value_name = "secs")]
        timeout: Option<u64>,

        /// Directory to write products to.
        #[arg(short, long, value_name = "path")]
        output: Option<PathBuf>,

        /// Write compressed fragments as received rather than inflating them.
        #[arg(long, action)]
        no_decompress: bool,
    },
    /// Print the default config as JSON.
    DefaultConfig,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(stderr)
        .with_ansi(false)
        .with_env_filter(
            EnvFilter::try_from_env("NOAAPORT_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    debug!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Ingest {
            config,
            group,
            interface,
            port,
            timeout,
            output,
            no_decompress,
        } => {
            let mut config = match config {
                Some(path) => Config::from_path(&path)
                    .with_context(|| format!("failed to load config {path:?}"))?,
                None => Config::default(),
            };
            if let Some(group) = group {
                config.multicast.group = group;
            }
            if let Some(interface) = interface {
                config.multicast.interface = interface;
            }
            if port.is_some() {
                config.multicast.port = port;
            }
            if let Some(secs) = timeout {
                config.multicast.read_timeout_ms = Some(secs * 1000);
            }
            if let Some(output) = output {
                config.output.directory = output;
            }
            if no_decompress {
                config.output.decompress = false;
            }
            ingest::ingest(&config)
        }
        Commands::DefaultConfig => {
            let json = serde_json::to_string_pretty(&Config::default())
                .context("serializing default config")?;
            println!("{json}");
            Ok(())
        }
    }
}
