use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "gatelog",
    about = "Access-gated file server with an append-only audit log",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// TOML settings file. Environment variables override it.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Serve files from the bucket
    Serve,
    /// Append queued audit events to the log object
    Consume,
    /// Run the file server and the consumer in one process
    Run,
    /// Print the audit log
    Cat(CatArgs),
    /// Append one line to the audit log
    Append(AppendArgs),
}

#[derive(Args)]
pub struct CatArgs {
    /// Log object to print instead of the configured one
    #[arg(long)]
    pub object: Option<String>,
}

#[derive(Args)]
pub struct AppendArgs {
    pub line: String,
    /// Log object to append to instead of the configured one
    #[arg(long)]
    pub object: Option<String>,
}
