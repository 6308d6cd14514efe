use std::io;
use std::process::ExitCode;

use clap::Parser;

use jobportal_cli::cli::{Cli, Commands};
use jobportal_cli::{deploy, load_settings, script};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match load_settings(cli.config) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("Deployment failed: {err:#}");
            return ExitCode::FAILURE;
        }
    };
    jobportal_observability::init_with(&settings.telemetry.log_filter, settings.telemetry.json);

    let mut stdout = io::stdout().lock();
    let result = match &cli.command {
        Commands::Deploy(args) => deploy::execute(&settings, args, &mut stdout),
        Commands::Run(args) => script::execute(&settings, args, &mut stdout),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "jobportal command failed");
            eprintln!("Deployment failed: {err:#}");
            ExitCode::FAILURE
        }
    }
}
