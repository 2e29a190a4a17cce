use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

mod commands;
mod utils;

/// ndn-mesh command line interface
#[derive(Parser)]
#[clap(author, version, about)]
struct Cli {
    /// Sets the level of verbosity
    #[clap(short, long, global = true)]
    verbose: bool,

    /// Subcommand to execute
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a captured management payload
    Decode {
        /// What the payload holds
        #[clap(value_enum)]
        kind: DecodeKind,

        /// Payload as hex (whitespace is ignored)
        #[clap(long, conflicts_with = "file")]
        hex: Option<String>,

        /// Read the raw payload from a file
        #[clap(long)]
        file: Option<PathBuf>,

        /// Print JSON instead of text
        #[clap(long)]
        json: bool,
    },

    /// Show the unsigned name of a management command
    Command {
        #[clap(subcommand)]
        cmd: CommandCommands,
    },

    /// Show the name of a probe Interest
    ProbeName {
        /// Address of the probed peer
        peer_ip: String,

        /// Address of the probing node
        my_ip: String,

        /// Probe prefix
        #[clap(long, default_value = "/localhop/wifidirect")]
        prefix: String,
    },

    /// Run a mesh of in-memory forwarders
    Simulate {
        /// Number of nodes; the first one owns the group
        #[clap(short, long, default_value = "3")]
        nodes: usize,

        /// How long to let the mesh run
        #[clap(short, long, default_value = "10")]
        seconds: u64,

        /// Mesh configuration file
        #[clap(long)]
        config: Option<PathBuf>,

        /// Print JSON instead of text
        #[clap(long)]
        json: bool,
    },

    /// Print the effective mesh configuration as JSON
    Config {
        /// Mesh configuration file
        #[clap(short, long)]
        file: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum DecodeKind {
    /// faces/list dataset
    Faces,
    /// fib/list dataset
    Fib,
    /// rib/list dataset
    Rib,
    /// general status dataset
    Status,
    /// ControlResponse
    Response,
    /// ControlParameters
    Parameters,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum LocalControlFeature {
    IncomingFaceId,
    NextHopFaceId,
    CachingPolicy,
}

#[derive(Subcommand)]
pub enum CommandCommands {
    /// faces/create
    CreateFace {
        /// Remote URI, e.g. udp://192.168.49.1
        uri: String,
    },

    /// faces/destroy
    DestroyFace {
        face_id: u64,
    },

    /// rib/register
    Register {
        /// Name prefix (NDN URI format)
        prefix: String,

        /// Next-hop face ID
        face_id: u64,

        /// Route cost
        #[clap(short, long, default_value = "0")]
        cost: u64,

        /// Also set the capture flag
        #[clap(long)]
        capture: bool,
    },

    /// rib/unregister
    Unregister {
        /// Name prefix (NDN URI format)
        prefix: String,

        /// Face to unregister from; the requesting face when omitted
        face_id: Option<u64>,
    },

    /// strategy-choice/set
    Strategy {
        prefix: String,
        strategy: String,
    },

    /// fib/add-nexthop
    AddNexthop {
        prefix: String,
        face_id: u64,
        #[clap(short, long, default_value = "0")]
        cost: u64,
    },

    /// faces/enable-local-control
    EnableLocalControl {
        #[clap(value_enum)]
        feature: LocalControlFeature,
    },

    /// faces/disable-local-control
    DisableLocalControl {
        #[clap(value_enum)]
        feature: LocalControlFeature,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(
        if cli.verbose { "debug" } else { "info" }
    )).init();

    // Execute the specified command
    match cli.command {
        Commands::Decode { kind, hex, file, json } => {
            commands::decode::run(kind, hex, file, json)?;
        }
        Commands::Command { cmd } => {
            commands::command::handle_command(cmd)?;
        }
        Commands::ProbeName { peer_ip, my_ip, prefix } => {
            commands::probe::print_probe_name(&prefix, &peer_ip, &my_ip)?;
        }
        Commands::Simulate { nodes, seconds, config, json } => {
            commands::simulate::run(nodes, seconds, config, json).await?;
        }
        Commands::Config { file } => {
            commands::config::print_config(file)?;
        }
    }

    Ok(())
}
