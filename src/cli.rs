use std::path::PathBuf;
use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use crate::config::DEFAULT_CONFIG_PATH;
use crate::ini_parser::flatten_file;
use crate::models::{
    BuildConfig, DiskSpec, ExperimentRef, JobTemplate, LauncherConfig, MachineSpec, expand_env_vars, parse_labels,
};
use crate::orchestrator::{SubmitRequest, SubmitSettings};

#[derive(Parser, Debug)]
#[command(name = "vertex-launcher", version, about = "Build, push, and run a training job on Vertex AI.")]
pub struct Cli {
    /// Launcher settings file (created with defaults if missing)
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub settings: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build and push the image, then submit a custom training job
    Submit(SubmitArgs),
    /// Recursively copy a local directory to a gs:// path
    Sync(SyncArgs),
}

#[derive(Args, Debug, Default)]
pub struct SubmitArgs {
    /// Google Cloud project ID
    #[arg(long)]
    pub project: Option<String>,
    /// GCP region for the job (e.g. us-central1)
    #[arg(long)]
    pub location: Option<String>,
    /// GCS bucket for staging artifacts (e.g. gs://my-bucket)
    #[arg(long)]
    pub staging_bucket: Option<String>,
    /// Display name for the custom job
    #[arg(long)]
    pub display_name: String,
    /// Image URI; $VAR and ${VAR} are expanded from the environment
    #[arg(long)]
    pub container_uri: String,
    /// Service account for the job
    #[arg(long)]
    pub service_account: Option<String>,
    #[arg(long)]
    pub machine_type: Option<String>,
    #[arg(long)]
    pub accelerator_type: Option<String>,
    #[arg(long)]
    pub accelerator_count: Option<u32>,
    /// GCS path to the raw dataset, passed as the first container argument
    #[arg(long)]
    pub dataset_path: Option<String>,
    /// Name of the Vertex AI experiment
    #[arg(long)]
    pub experiment: Option<String>,
    /// Name of the experiment run (defaults to run-<UTC timestamp>)
    #[arg(long)]
    pub experiment_run: Option<String>,
    /// INI file whose parameters are logged to the experiment run
    #[arg(long)]
    pub config_file: Option<PathBuf>,
    /// Job labels in key=value format
    #[arg(long, num_args = 0..)]
    pub labels: Vec<String>,
    /// Stream docker build/push output instead of capturing it
    #[arg(long)]
    pub verbose_subprocess: bool,
    /// Submit an already pushed image
    #[arg(long)]
    pub skip_build: bool,
    /// Remaining arguments are passed to the container entrypoint
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub container_args: Vec<String>,
}

#[derive(Args, Debug)]
pub struct SyncArgs {
    pub local_dir: PathBuf,
    /// Destination such as gs://bucket/prefix
    pub destination: String,
}

/// 命令行参数与配置文件合并后的提交计划
#[derive(Debug)]
pub struct SubmitPlan {
    pub settings: SubmitSettings,
    pub request: SubmitRequest,
    pub build: BuildConfig,
    pub verbose: bool,
    pub skip_build: bool,
}

/// 合并参数与配置，完成所有不涉及平台调用的准备工作
///
/// 标签最先解析：格式错误时在构建镜像和任何平台调用之前失败。
pub fn plan_submit(args: SubmitArgs, config: LauncherConfig, now: DateTime<Utc>) -> Result<SubmitPlan> {
    let labels = parse_labels(&args.labels)?;

    // 1. 从 INI 文件读取要记录的超参数；命令行透传参数只交给容器，不记录
    let parameters = match &args.config_file {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Config file not found at: {}", path.display());
            }
            info!("Reading base hyperparameters from {}", path.display());
            Some(flatten_file(path, &config.parameters.sweep_prefix))
        }
        None => None,
    };

    // 2. 展开镜像地址中的环境变量
    let container_uri = expand_env_vars(&args.container_uri);

    // 3. 给定实验但没有运行名时合成一个
    let names = ExperimentRef::resolve_names(args.experiment, args.experiment_run, now);

    let LauncherConfig { mut platform, machine, job, build, .. } = config;
    override_with(&mut platform.project, args.project);
    override_with(&mut platform.location, args.location);
    override_with(&mut platform.staging_bucket, args.staging_bucket);
    override_with(&mut platform.service_account, args.service_account);

    let template = JobTemplate {
        display_name: args.display_name,
        container_uri,
        machine: MachineSpec {
            machine_type: args.machine_type.unwrap_or(machine.machine_type),
            accelerator_type: args.accelerator_type.unwrap_or(machine.accelerator_type),
            accelerator_count: args.accelerator_count.unwrap_or(machine.accelerator_count),
        },
        disk: DiskSpec {
            boot_disk_type: machine.boot_disk_type,
            boot_disk_size_gb: machine.boot_disk_size_gb,
        },
        labels,
        service_account: platform.service_account.clone(),
        timeout_seconds: job.timeout_seconds,
    };

    Ok(SubmitPlan {
        settings: SubmitSettings {
            platform,
            submit_timeout: job.submit_timeout(),
            poll_interval: job.poll_interval(),
        },
        request: SubmitRequest {
            template,
            names,
            dataset_path: args.dataset_path,
            extra_args: args.container_args,
            parameters,
        },
        verbose: args.verbose_subprocess || build.verbose,
        skip_build: args.skip_build,
        build,
    })
}

fn override_with(target: &mut Option<String>, value: Option<String>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        *target = Some(value);
    }
}
