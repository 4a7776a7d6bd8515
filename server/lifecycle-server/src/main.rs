use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use lifecycle_server::bootstrap::{build_runtime, Runtime};
use lifecycle_server::create_app;
use prescription_lifecycle::{LifecycleStep, RenewalSource};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;
use workflow_engine::{JobHandler, PeriodicScheduler, WorkerPool};

/// Prescription lifecycle orchestrator
#[derive(Parser, Debug)]
#[command(name = "lifecycle-server")]
#[command(about = "Keeps medication subscriptions in step with their prescriptions")]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "RXLC_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve webhooks, run lifecycle steps and the scheduled renewal sweep (default)
    Serve,
    /// Run one renewal sweep and print the report
    Sweep {
        /// Look-ahead window in days
        #[arg(long)]
        window_days: Option<u32>,
        #[arg(long, value_enum)]
        source: Option<SourceArg>,
    },
    /// Print the current and next dose of a prescription
    Dose { prescription_id: Uuid },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SourceArg {
    Local,
    Gateway,
}

impl From<SourceArg> for RenewalSource {
    fn from(source: SourceArg) -> Self {
        match source {
            SourceArg::Local => RenewalSource::LocalRecords,
            SourceArg::Gateway => RenewalSource::Gateway,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let config = config_engine::load(args.config.as_deref())?;
    logger_redacted::init_tracing(&config.logging)?;
    info!(version = env!("CARGO_PKG_VERSION"), "Starting prescription lifecycle orchestrator");

    let runtime = build_runtime(&config).await?;
    let result = match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&config, &runtime).await,
        Command::Sweep { window_days, source } => {
            let window_days = window_days.unwrap_or(config.renewal.sweep_window_days);
            let source = source.map(RenewalSource::from).unwrap_or(config.renewal.source);
            let report = runtime.server.sweep.run(window_days, source).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Dose { prescription_id } => {
            let progress = runtime.orchestrator.dose_progress(prescription_id).await?;
            println!("{}", serde_json::to_string_pretty(&progress)?);
            Ok(())
        }
    };

    runtime.pool.close().await;
    result
}

async fn serve(config: &config_engine::LifecycleConfig, runtime: &Runtime) -> anyhow::Result<()> {
    let handler: Arc<dyn JobHandler<LifecycleStep>> = runtime.orchestrator.clone();
    let workers = WorkerPool::spawn(
        runtime.queue.clone(),
        handler,
        config.workers.count,
        config.workers.poll_interval(),
    );

    let mut scheduler = PeriodicScheduler::new().await?;
    let sweep = runtime.server.sweep.clone();
    let window_days = config.renewal.sweep_window_days;
    let source = config.renewal.source;
    scheduler
        .add_cron("renewal_sweep", &config.renewal.sweep_schedule, move || {
            let sweep = sweep.clone();
            async move {
                match sweep.run(window_days, source).await {
                    Ok(report) => info!(
                        examined = report.examined,
                        cancelled = report.cancelled,
                        alerted = report.alerted,
                        errors = report.errors,
                        "Scheduled renewal sweep finished"
                    ),
                    Err(e) => error!(error = %e, "Scheduled renewal sweep failed"),
                }
            }
        })
        .await?;
    scheduler.start().await?;

    let addr: SocketAddr = config
        .server
        .bind_address
        .parse()
        .with_context(|| format!("invalid bind address '{}'", config.server.bind_address))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;
    info!(address = %addr, "Lifecycle server listening");

    let served = axum::serve(listener, create_app(runtime.server.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error");

    info!("Shutting down");
    if let Err(e) = scheduler.shutdown().await {
        error!(error = %e, "Scheduler did not stop cleanly");
    }
    runtime.queue.close();
    workers.shutdown().await;
    served
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
}
