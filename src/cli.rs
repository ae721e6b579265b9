use clap::{Parser, Subcommand};
use routegate::codec::Framing;
use std::path::PathBuf;

/// MCP gateway exposing HTTP routes and federated MCP servers as tools
#[derive(Debug, Parser)]
#[command(name = "routegate")]
#[command(version)]
#[command(about = "MCP gateway for HTTP routes and bridged MCP servers", long_about = None)]
pub struct Args {
    /// Config file (default: $ROUTEGATE_HOME/config/config.toml or ~/.config/routegate/config.toml)
    #[arg(short = 'c', long = "config", env = "ROUTEGATE_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Speak MCP over stdin/stdout
    Serve {
        /// Message framing on stdio
        #[arg(long, value_enum, default_value_t = Framing::Newline)]
        framing: Framing,
    },

    /// Print the tool catalog
    Tools,

    /// Invoke one tool and print its result
    Call {
        /// Tool name as listed by `tools`
        name: String,
        /// Arguments as a JSON object
        #[arg(value_name = "ARGS_JSON")]
        args: Option<String>,
    },

    /// Print configured bridges and how many tools each exposes
    Bridges,
}
