// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "legate")]
#[command(about = "Remote command execution and file transfer over SSH")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args)]
pub struct ConnectArgs {
    /// Remote target as [user@]host[:port]
    pub target: String,

    /// Private key file to authenticate with
    #[arg(long)]
    pub key_file: Option<PathBuf>,

    /// Prompt for an SSH password
    #[arg(long)]
    pub ask_pass: bool,

    /// Connection timeout in seconds
    #[arg(long, default_value_t = 10)]
    pub timeout: u64,

    /// Skip loading the system host key file before connecting
    #[arg(long)]
    pub no_host_key_checking: bool,

    /// Host key file to load and persist trusted keys in
    #[arg(long)]
    pub trust_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a command on the remote host
    Run {
        #[command(flatten)]
        connect: ConnectArgs,

        /// Command to execute
        command: String,

        /// Wrap the command in this shell
        #[arg(long)]
        shell: Option<String>,

        /// Run the command through sudo
        #[arg(long)]
        sudo: bool,

        /// Account to become when using sudo
        #[arg(long, default_value = "root")]
        sudo_user: String,

        /// Prompt for the sudo password
        #[arg(long)]
        ask_sudo_pass: bool,

        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Upload a local file to the remote host
    Put {
        #[command(flatten)]
        connect: ConnectArgs,

        /// Local file to upload
        local: PathBuf,

        /// Remote destination path
        remote: String,
    },

    /// Download a remote file
    Get {
        #[command(flatten)]
        connect: ConnectArgs,

        /// Remote file to download
        remote: String,

        /// Local destination path
        local: PathBuf,
    },
}

#[derive(ValueEnum, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Text,
    Json,
}
