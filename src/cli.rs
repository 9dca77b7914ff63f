use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sous")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Cook nodes with chef-solo from a local kitchen", long_about = None)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Kitchen directory (defaults to $SOUS_KITCHEN, then the current directory)
    #[arg(short, long, global = true, value_name = "DIR")]
    pub kitchen: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run chef-solo on one or more nodes
    Cook(CookArgs),

    /// Lock a node so nobody cooks it
    Lock {
        /// Node name
        node: String,

        /// Why the node is locked
        #[arg(short, long)]
        reason: String,
    },

    /// Remove a node's lock
    Unlock {
        /// Node name
        node: String,
    },

    /// Print a node's resolved attributes as JSON
    Show {
        /// Node name
        node: String,
    },

    /// List the kitchen's nodes
    List,

    /// Install chef on a node with the omnibus installer
    DeployAgent {
        /// Node name
        node: String,

        /// Chef version to install (latest when omitted)
        #[arg(long)]
        version: Option<String>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct CookArgs {
    /// Nodes to cook
    #[arg(required_unless_present_any = ["all", "env"], conflicts_with_all = ["all", "env"])]
    pub nodes: Vec<String>,

    /// Cook every node in the kitchen
    #[arg(short, long, conflicts_with = "env")]
    pub all: bool,

    /// Cook every node in an environment
    #[arg(short, long, value_name = "ENV")]
    pub env: Option<String>,

    /// Parallel jobs (defaults to [run] jobs in sous.toml)
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Report what chef-solo would change without changing it
    #[arg(long)]
    pub why_run: bool,

    /// Rewrite node records even when they exist
    #[arg(long)]
    pub force_save: bool,

    /// Don't ask for confirmation
    #[arg(short, long)]
    pub yes: bool,
}
