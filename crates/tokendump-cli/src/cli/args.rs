use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "tokendump",
    version,
    about = "Collect app tokens and depot keys for your licenses and submit them"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Collect tokens and depot keys, then submit them
    Run(RunArgs),
    /// Inspect or reset the known-depot cache
    Known(KnownArgs),
    Version,
}

#[derive(Args, Debug, Default)]
pub struct ConfigArgs {
    /// YAML config file (default: ./tokendump.yaml if present)
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Collect only, do not submit
    #[arg(long)]
    pub no_submit: bool,

    /// Write the sorted payload as JSON to this file
    #[arg(long)]
    pub dump: Option<PathBuf>,

    /// Request keys even for depots that were submitted before
    #[arg(long)]
    pub no_skip_known: bool,
}

#[derive(Args, Debug)]
pub struct KnownArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    #[command(subcommand)]
    pub cmd: KnownSub,
}

#[derive(Subcommand, Debug)]
pub enum KnownSub {
    /// Print depot IDs that were already submitted
    List,
    /// Delete the cache file
    Clear,
    /// Print the cache file location
    Path,
}
