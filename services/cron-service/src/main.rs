use std::{path::PathBuf, process::ExitCode, sync::Arc};

use chrono::Local;
use clap::{Parser, Subcommand};

use legal_common::{init_tracing, RunMode};
use legal_cron::{
    load_config, load_config_from, CommandLimits, CronConfig, CronError, JobContext,
    JobRegistry, PgStore, Scheduler,
};

#[derive(Parser)]
#[command(name = "legal-cron")]
#[command(about = "Periodic jobs for the legal toolbox, one tick per invocation")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (defaults to CRON_CONFIG_PATH or cron.toml)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one scheduler tick
    Run,
    /// Remove all job locks
    Unlock,
    /// Remove all pending jobs, then all locks
    Clean,
    /// Show held locks and pending jobs
    Status,
    /// Run a single job now, ignoring schedule and locks
    Call {
        module: String,
        method: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// List registered jobs and the schedule
    Jobs,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let _guards = init_tracing("legal-cron", "info", RunMode::OneShot);

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            tracing::error!(error = %err, "legal-cron failed");
            ExitCode::FAILURE
        }
    }
}

fn build_registry(config: &CronConfig) -> JobRegistry {
    let mut registry = JobRegistry::with_builtins();
    registry.register_commands(&config.jobs);
    registry
}

async fn build_scheduler(config: &CronConfig) -> Result<Scheduler, CronError> {
    let store = Arc::new(PgStore::connect(&config.database_url).await?);
    let http = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .user_agent(concat!("legal-cron/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let ctx = JobContext {
        store: store.clone(),
        cache: store.clone(),
        rates: store,
        http,
        limits: CommandLimits {
            timeout: config.command_timeout,
            output_limit_bytes: config.output_limit_bytes,
        },
    };
    Ok(Scheduler::new(
        ctx,
        build_registry(config),
        config.jobs.clone(),
        config.lock_expiry,
    ))
}

/// `Ok(false)` means the command ran but some job failed.
async fn run(cli: Cli) -> Result<bool, CronError> {
    let config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };

    if let Commands::Jobs = cli.command {
        for job in build_registry(&config).describe() {
            println!("{job}");
        }
        println!();
        for spec in &config.jobs {
            println!(
                "{:<16} {:<24} lock={} blocking={} args={:?}",
                spec.when.to_string(),
                spec.name,
                spec.lock.as_deref().unwrap_or("-"),
                spec.blocking,
                spec.args
            );
        }
        return Ok(true);
    }

    let scheduler = build_scheduler(&config).await?;
    match cli.command {
        Commands::Run => {
            let report = scheduler.cron_run(Local::now()).await?;
            Ok(report.is_success())
        }
        Commands::Unlock => {
            scheduler.cron_unlock().await?;
            Ok(true)
        }
        Commands::Clean => {
            scheduler.cron_clean().await?;
            Ok(true)
        }
        Commands::Status => {
            let status = scheduler.cron_status().await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(true)
        }
        Commands::Call {
            module,
            method,
            args,
        } => {
            let name = format!("{module}.{method}");
            scheduler.call(&name, &args.join(" ")).await?;
            tracing::info!(job = name.as_str(), "job completed");
            Ok(true)
        }
        Commands::Jobs => Ok(true),
    }
}
