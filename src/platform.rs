//! 远端训练平台抽象
//!
//! 平台上下文（项目、区域、暂存桶、凭据）在每次提交开始时显式构建，
//! 然后以引用的形式传给每一次平台调用，没有全局的“当前项目”状态。

pub mod vertex;

use crate::error::{LaunchError, LaunchResult, PlatformError, PlatformResult};
use crate::models::{ContextRef, JobSpecification, ParameterMap, PlatformConfig};
use std::process::Command;
use tracing::debug;

pub use vertex::VertexClient;

/// 环境变量中的访问令牌优先于 gcloud
pub const ACCESS_TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

/// 一次提交所用的平台上下文
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformContext {
    pub project: String,
    pub location: String,
    pub staging_bucket: String,
    pub service_account: Option<String>,
    access_token: String,
}

impl PlatformContext {
    /// 校验配置并获取访问令牌；失败即致命
    pub fn initialize(config: &PlatformConfig, credentials: &dyn CredentialSource) -> LaunchResult<Self> {
        let project = required(&config.project, "project")?;
        let location = required(&config.location, "location")?;
        let staging_bucket = required(&config.staging_bucket, "staging_bucket")?;

        if location.contains('/') {
            return Err(LaunchError::ContextInit(format!("invalid location '{}'", location)));
        }
        if !staging_bucket.starts_with("gs://") {
            return Err(LaunchError::ContextInit(format!(
                "staging bucket must be a gs:// URI, got '{}'",
                staging_bucket
            )));
        }

        let access_token = credentials
            .access_token()
            .map_err(|e| LaunchError::ContextInit(e.to_string()))?;
        if access_token.trim().is_empty() {
            return Err(LaunchError::ContextInit("empty access token".to_string()));
        }

        Ok(Self {
            project,
            location,
            staging_bucket: staging_bucket.trim_end_matches('/').to_string(),
            service_account: config.service_account.clone(),
            access_token: access_token.trim().to_string(),
        })
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// `projects/{project}/locations/{location}`
    pub fn parent(&self) -> String {
        format!("projects/{}/locations/{}", self.project, self.location)
    }

    pub fn metadata_store(&self) -> String {
        format!("{}/metadataStores/default", self.parent())
    }

    pub fn context_name(&self, context_id: &str) -> String {
        format!("{}/contexts/{}", self.metadata_store(), context_id)
    }

    /// 实验的预期引用（实验的 contextId 就是实验名）
    pub fn experiment_ref(&self, experiment: &str) -> ContextRef {
        ContextRef {
            id: experiment.to_string(),
            display_name: experiment.to_string(),
            resource_name: self.context_name(experiment),
        }
    }

    /// 运行的预期引用，contextId 为 `{experiment}-{run}`
    pub fn run_ref(&self, experiment: &ContextRef, run: &str) -> ContextRef {
        let id = run_context_id(&experiment.id, run);
        ContextRef {
            resource_name: self.context_name(&id),
            id,
            display_name: run.to_string(),
        }
    }

    pub fn console_job_url(&self, job_id: &str) -> String {
        format!(
            "https://console.cloud.google.com/ai/platform/locations/{}/training/{}?project={}",
            self.location, job_id, self.project
        )
    }
}

fn required(value: &Option<String>, field: &str) -> LaunchResult<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| LaunchError::ContextInit(format!("{} is required", field)))
}

pub fn run_context_id(experiment_id: &str, run: &str) -> String {
    format!("{}-{}", experiment_id, run)
}

// ————————————————————————————————————————————————————————————————————————
// 凭据
// ————————————————————————————————————————————————————————————————————————

pub trait CredentialSource {
    fn access_token(&self) -> PlatformResult<String>;
}

/// 配置文件中直接给出的令牌
pub struct StaticToken(pub String);

impl CredentialSource for StaticToken {
    fn access_token(&self) -> PlatformResult<String> {
        Ok(self.0.clone())
    }
}

/// 先读环境变量，再调用 `gcloud auth print-access-token`
pub struct GcloudCredentials;

impl CredentialSource for GcloudCredentials {
    fn access_token(&self) -> PlatformResult<String> {
        if let Ok(token) = std::env::var(ACCESS_TOKEN_ENV) {
            if !token.trim().is_empty() {
                debug!("using access token from {}", ACCESS_TOKEN_ENV);
                return Ok(token);
            }
        }

        debug!("requesting access token from gcloud");
        let output = Command::new("gcloud")
            .args(["auth", "print-access-token"])
            .output()
            .map_err(|e| PlatformError::Credentials(format!("failed to run gcloud: {}", e)))?;
        if !output.status.success() {
            return Err(PlatformError::Credentials(format!(
                "gcloud auth print-access-token failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

pub fn credentials_for(config: &PlatformConfig) -> Box<dyn CredentialSource> {
    match &config.access_token {
        Some(token) => Box::new(StaticToken(token.clone())),
        None => Box::new(GcloudCredentials),
    }
}

// ————————————————————————————————————————————————————————————————————————
// 作业状态
// ————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Unspecified,
    Queued,
    Pending,
    Running,
    Succeeded,
    PartiallySucceeded,
    Failed,
    Cancelling,
    Cancelled,
    Paused,
    Expired,
    Updating,
}

impl JobState {
    pub fn parse(raw: &str) -> Self {
        match raw.trim_start_matches("JOB_STATE_") {
            "QUEUED" => JobState::Queued,
            "PENDING" => JobState::Pending,
            "RUNNING" => JobState::Running,
            "SUCCEEDED" => JobState::Succeeded,
            "PARTIALLY_SUCCEEDED" => JobState::PartiallySucceeded,
            "FAILED" => JobState::Failed,
            "CANCELLING" => JobState::Cancelling,
            "CANCELLED" => JobState::Cancelled,
            "PAUSED" => JobState::Paused,
            "EXPIRED" => JobState::Expired,
            "UPDATING" => JobState::Updating,
            _ => JobState::Unspecified,
        }
    }

    /// 进入该状态即视为提交成功
    pub fn is_accepted(self) -> bool {
        matches!(self, JobState::Running | JobState::Succeeded | JobState::PartiallySucceeded)
    }

    pub fn is_failed(self) -> bool {
        matches!(
            self,
            JobState::Failed | JobState::Cancelling | JobState::Cancelled | JobState::Expired
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobState::Unspecified => "UNSPECIFIED",
            JobState::Queued => "QUEUED",
            JobState::Pending => "PENDING",
            JobState::Running => "RUNNING",
            JobState::Succeeded => "SUCCEEDED",
            JobState::PartiallySucceeded => "PARTIALLY_SUCCEEDED",
            JobState::Failed => "FAILED",
            JobState::Cancelling => "CANCELLING",
            JobState::Cancelled => "CANCELLED",
            JobState::Paused => "PAUSED",
            JobState::Expired => "EXPIRED",
            JobState::Updating => "UPDATING",
        };
        write!(f, "JOB_STATE_{}", name)
    }
}

/// 平台返回的作业快照
#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedJob {
    pub name: String, // projects/…/customJobs/{id}
    pub state: JobState,
    pub error: Option<String>,
}

impl SubmittedJob {
    pub fn job_id(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}

// ————————————————————————————————————————————————————————————————————————
// 平台接口
// ————————————————————————————————————————————————————————————————————————

/// 提交流程所需的全部平台调用
///
/// 查询类调用用 `Ok(None)` 表示不存在；创建类调用在名称已被占用时
/// 返回 `PlatformError::AlreadyExists`。
pub trait TrainingPlatform {
    fn get_experiment(&self, ctx: &PlatformContext, name: &str) -> PlatformResult<Option<ContextRef>>;

    fn create_experiment(&self, ctx: &PlatformContext, name: &str) -> PlatformResult<ContextRef>;

    fn get_run(&self, ctx: &PlatformContext, experiment: &ContextRef, run: &str) -> PlatformResult<Option<ContextRef>>;

    fn create_run(&self, ctx: &PlatformContext, experiment: &ContextRef, run: &str) -> PlatformResult<ContextRef>;

    /// 把运行挂到实验下；重复挂载不是错误
    fn link_run(&self, ctx: &PlatformContext, experiment: &ContextRef, run: &ContextRef) -> PlatformResult<()>;

    fn submit_job(
        &self,
        ctx: &PlatformContext,
        spec: &JobSpecification,
        experiment: Option<&ContextRef>,
        run: Option<&ContextRef>,
    ) -> PlatformResult<SubmittedJob>;

    fn get_job(&self, ctx: &PlatformContext, name: &str) -> PlatformResult<SubmittedJob>;

    fn log_params(&self, ctx: &PlatformContext, run: &ContextRef, params: &ParameterMap) -> PlatformResult<()>;
}

#[cfg(test)]
pub(crate) fn sample_platform_config() -> PlatformConfig {
    PlatformConfig {
        project: Some("my-project".to_string()),
        location: Some("us-central1".to_string()),
        staging_bucket: Some("gs://my-bucket/".to_string()),
        service_account: Some("trainer@my-project.iam.gserviceaccount.com".to_string()),
        access_token: None,
    }
}
