pub mod models;
pub mod error;
pub mod identity;
pub mod allocation;
pub mod ramp;
pub mod client;
pub mod classifier;
pub mod scenario;
pub mod load_test;
pub mod summary;
pub mod db;
pub mod export;
pub mod config;
pub mod commands;

use clap::Parser;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

use config::{Cli, Commands};
use db::Database;
use error::{HarnessError, Result};
use summary::SummaryBuilder;

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!("failed to start runtime: {}", e);
            return ExitCode::from(2);
        }
    };

    match runtime.block_on(dispatch(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

async fn dispatch(cli: Cli) -> Result<()> {
    let db = cli.db.as_deref().map(Database::new).transpose()?;
    let require_db = || db.as_ref().ok_or_else(|| HarnessError::config("--db or HARNESS_DB is required"));

    match cli.command {
        Commands::Run(args) => {
            let report = commands::start_load_test(&args, db.as_ref()).await?;
            println!("run {}", report.run_id);
            println!("{}", SummaryBuilder::render(&report.summary));
        }
        Commands::Runs { scenario } => {
            for run in commands::list_runs(require_db()?, scenario)? {
                println!(
                    "{}\t{}\t{}\t{}",
                    run.id,
                    run.scenario,
                    run.status,
                    run.started_at
                );
            }
        }
        Commands::Report { run_id, format, output } => {
            commands::export_report(require_db()?, &run_id, format, &output)?;
            println!("wrote {}", output.display());
        }
        Commands::DeleteRun { run_id } => commands::delete_run(require_db()?, &run_id)?,
        Commands::Scenarios => {
            for (kind, description) in commands::list_scenarios() {
                println!("{:<22}{}", kind.name(), description);
            }
        }
    }
    Ok(())
}
