use clap::{Parser, Subcommand};
use std::path::PathBuf;

use jobportal_core::PrincipalId;
use jobportal_ledger::Amount;

#[derive(Parser, Debug)]
#[command(name = "jobportal")]
#[command(about = "JobPortal ledger deployment tool", long_about = None)]
pub struct Cli {
    /// Settings file (overrides JOBPORTAL_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Deploy a ledger and verify its initial stats
    Deploy(DeployArgs),
    /// Deploy a ledger and apply a JSON script of operations
    Run(RunArgs),
}

#[derive(clap::Args, Debug, Default)]
pub struct DeployArgs {
    /// Posting fee in the smallest unit (defaults to settings)
    #[arg(long)]
    pub fee: Option<Amount>,

    /// Administrator address, 0x + 40 hex digits (defaults to settings, then a fresh one)
    #[arg(long)]
    pub admin: Option<PrincipalId>,
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Path to the script file
    pub script: PathBuf,

    #[command(flatten)]
    pub deploy: DeployArgs,
}
