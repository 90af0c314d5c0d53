// src/main.rs
mod cli;
mod config;
mod container;
mod error;
mod file_utils;
mod ini_parser;
mod models;
mod orchestrator;
mod platform;
mod storage;

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use tracing::{debug, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use cli::{Cli, Commands, SubmitArgs, SyncArgs};
use config::load_config;
use models::{LauncherConfig, format_params_pretty};
use orchestrator::{Orchestrator, ParamLogging, SubmissionResult};
use platform::{VertexClient, credentials_for};
use storage::{GcsUploader, sync_to_gcs};

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "vertex_launcher=info".into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();

    // 加载配置文件
    let config = load_config(&cli.settings)?;
    debug!("Configuration loaded from {}", cli.settings);

    match cli.command {
        Commands::Submit(args) => run_submit(args, config),
        Commands::Sync(args) => run_sync(args, config),
    }
}

fn run_submit(args: SubmitArgs, config: LauncherConfig) -> Result<()> {
    // 标签、超参数、运行名都在构建镜像之前准备好
    let plan = cli::plan_submit(args, config, Utc::now())?;

    if let Some(params) = plan.request.parameters.as_ref().filter(|p| !p.is_empty()) {
        println!("Parameters to be logged:\n{}", format_params_pretty(params)?);
    }

    if plan.skip_build {
        println!("Skipping image build, using {}", plan.request.template.container_uri);
    } else {
        println!("--- Building and pushing Docker image: {} ---", plan.request.template.container_uri);
        container::build_and_push(&plan.request.template.container_uri, &plan.build, plan.verbose)?;
    }

    let credentials = credentials_for(&plan.settings.platform);
    let client = VertexClient::new()?;
    let orchestrator = Orchestrator::new(&client, credentials.as_ref(), plan.settings);

    println!("--- Submitting custom job '{}' ---", plan.request.template.display_name);
    let result = orchestrator.submit(&plan.request)?;
    print_submission(&result);

    Ok(())
}

fn print_submission(result: &SubmissionResult) {
    println!("Custom job submitted: {} ({})", result.job_id, result.state);
    if let (Some(experiment), Some(run)) = (&result.experiment, &result.run) {
        println!("   Experiment: {}  Run: {}", experiment, run);
    }
    println!("   View job: {}", result.console_url);

    if result.params_logged() {
        println!("   Hyperparameters logged to the experiment run.");
    } else if let ParamLogging::Failed { reason } = &result.params {
        warn!("Job is running but its parameters were not logged: {}", reason);
    }
}

fn run_sync(args: SyncArgs, config: LauncherConfig) -> Result<()> {
    let credentials = credentials_for(&config.platform);
    let uploader = GcsUploader::new(credentials.as_ref())?;
    let count = sync_to_gcs(&uploader, &args.local_dir, &args.destination)?;
    println!("Uploaded {} files to {}", count, args.destination);
    Ok(())
}
