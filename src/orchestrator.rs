// src/orchestrator.rs
use std::time::{Duration, Instant};
use chrono::Utc;
use tracing::{debug, info, warn};
use crate::error::{LaunchError, LaunchResult, PlatformError, PlatformResult};
use crate::models::experiment::synthesize_run_name;
use crate::models::{ContextRef, ExperimentRef, JobSpecification, JobTemplate, ParameterMap, PlatformConfig};
use crate::platform::{CredentialSource, JobState, PlatformContext, SubmittedJob, TrainingPlatform};

/// 提交流程的运行参数
#[derive(Debug, Clone)]
pub struct SubmitSettings {
    pub platform: PlatformConfig,
    pub submit_timeout: Duration,
    pub poll_interval: Duration,
}

/// 一次提交的全部输入
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub template: JobTemplate,
    pub names: ExperimentRef,
    pub dataset_path: Option<String>,
    pub extra_args: Vec<String>,
    // 只用于记录，不影响远端作业实际执行的内容
    pub parameters: Option<ParameterMap>,
}

/// 参数记录的结果：作业已提交，但指标未必挂上
#[derive(Debug, Clone, PartialEq)]
pub enum ParamLogging {
    Logged { count: usize },
    Skipped,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionResult {
    pub job_id: String,
    pub job_name: String,
    pub state: JobState,
    pub experiment: Option<String>,
    pub run: Option<String>,
    pub console_url: String,
    pub params: ParamLogging,
}

impl SubmissionResult {
    pub fn params_logged(&self) -> bool {
        matches!(self.params, ParamLogging::Logged { .. })
    }
}

// ————————————————————————————————————————————————————————————————————————
// 查找-创建 状态机：Unresolved → LookedUp → {Found | Creating → Created} → Resolved
// ————————————————————————————————————————————————————————————————————————
#[derive(Debug)]
enum Resolution {
    Unresolved,
    LookedUp(Option<ContextRef>),
    Found(ContextRef),
    Creating,
    Created(ContextRef),
    Resolved(ContextRef),
}

/// 解析一个实验或运行；“已存在”是正常的状态转移而不是错误
///
/// 查找与创建不是原子操作，两个并发调用可能都走到创建，
/// 由平台的名称唯一性约束兜底，后到的一方得到 AlreadyExists。
fn resolve<L, C>(kind: &str, expected: &ContextRef, lookup: L, create: C) -> PlatformResult<ContextRef>
where
    L: Fn() -> PlatformResult<Option<ContextRef>>,
    C: Fn() -> PlatformResult<ContextRef>,
{
    let mut state = Resolution::Unresolved;
    loop {
        state = match state {
            Resolution::Unresolved => Resolution::LookedUp(lookup()?),
            Resolution::LookedUp(Some(found)) => {
                info!("Found existing {} '{}'", kind, expected.display_name);
                Resolution::Found(found)
            }
            Resolution::LookedUp(None) => {
                info!("{} '{}' not found. Creating it now.", kind, expected.display_name);
                Resolution::Creating
            }
            Resolution::Creating => match create() {
                Ok(created) => Resolution::Created(created),
                Err(PlatformError::AlreadyExists(_)) => {
                    info!("{} '{}' was created concurrently, continuing", kind, expected.display_name);
                    Resolution::Found(expected.clone())
                }
                Err(e) => return Err(e),
            },
            Resolution::Found(context) | Resolution::Created(context) => Resolution::Resolved(context),
            Resolution::Resolved(context) => return Ok(context),
        };
    }
}

/// 作业编排器：解析实验/运行、提交作业、尽力记录参数
pub struct Orchestrator<'a, P: TrainingPlatform> {
    platform: &'a P,
    credentials: &'a dyn CredentialSource,
    settings: SubmitSettings,
}

impl<'a, P: TrainingPlatform> Orchestrator<'a, P> {
    pub fn new(platform: &'a P, credentials: &'a dyn CredentialSource, settings: SubmitSettings) -> Self {
        Self { platform, credentials, settings }
    }

    pub fn submit(&self, request: &SubmitRequest) -> LaunchResult<SubmissionResult> {
        // 1. 平台上下文
        let ctx = PlatformContext::initialize(&self.settings.platform, self.credentials)?;
        info!(project = %ctx.project, location = %ctx.location, "platform context initialized");

        // 2. 实验
        let experiment = match &request.names.experiment {
            Some(name) => Some(self.resolve_experiment(&ctx, name)?),
            None => None,
        };

        // 3. 运行（仅在实验已解析时；未给出运行名则按当前 UTC 时间合成）
        let run = match &experiment {
            Some(experiment) => {
                let run_name = request
                    .names
                    .run
                    .clone()
                    .unwrap_or_else(|| synthesize_run_name(Utc::now()));
                Some(self.resolve_run(&ctx, experiment, &run_name)?)
            }
            None => None,
        };

        // 4. 构建作业描述
        let spec = JobSpecification::build(
            &request.template,
            request.dataset_path.as_deref(),
            &request.extra_args,
        );
        info!(display_name = spec.display_name(), image = spec.image_uri(), args = ?spec.args(), "job specification built");

        // 5. 提交并等待作业被接受
        let submitted = self
            .platform
            .submit_job(&ctx, &spec, experiment.as_ref(), run.as_ref())
            .map_err(LaunchError::Submission)?;
        info!(job = %submitted.name, "custom job created");
        let job = self.wait_until_accepted(&ctx, submitted)?;
        info!(job = %job.name, state = %job.state, "custom job '{}' submitted successfully", spec.display_name());

        // 6. 尽力记录参数
        let params = match (&experiment, &run, &request.parameters) {
            (Some(experiment), Some(run), Some(parameters)) if !parameters.is_empty() => {
                self.log_parameters(&ctx, experiment, run, parameters)
            }
            _ => ParamLogging::Skipped,
        };

        Ok(SubmissionResult {
            job_id: job.job_id().to_string(),
            console_url: ctx.console_job_url(job.job_id()),
            job_name: job.name,
            state: job.state,
            experiment: experiment.map(|e| e.display_name),
            run: run.map(|r| r.display_name),
            params,
        })
    }

    fn resolve_experiment(&self, ctx: &PlatformContext, name: &str) -> LaunchResult<ContextRef> {
        resolve(
            "Experiment",
            &ctx.experiment_ref(name),
            || self.platform.get_experiment(ctx, name),
            || self.platform.create_experiment(ctx, name),
        )
        .map_err(|source| LaunchError::Experiment { name: name.to_string(), source })
    }

    /// 解析运行并挂到实验下
    ///
    /// 挂载在每条路径上都执行：上一次调用可能在创建之后、挂载之前失败。
    fn resolve_run(&self, ctx: &PlatformContext, experiment: &ContextRef, run: &str) -> LaunchResult<ContextRef> {
        resolve(
            "Experiment run",
            &ctx.run_ref(experiment, run),
            || self.platform.get_run(ctx, experiment, run),
            || self.platform.create_run(ctx, experiment, run),
        )
        .and_then(|handle| {
            self.platform.link_run(ctx, experiment, &handle)?;
            Ok(handle)
        })
        .map_err(|source| LaunchError::Run { name: run.to_string(), source })
    }

    /// 轮询直到作业进入运行（或已完成）状态；失败状态与超时都是致命的
    fn wait_until_accepted(&self, ctx: &PlatformContext, mut job: SubmittedJob) -> LaunchResult<SubmittedJob> {
        let started = Instant::now();
        loop {
            if job.state.is_accepted() {
                return Ok(job);
            }
            if job.state.is_failed() {
                return Err(LaunchError::JobFailed {
                    message: job.error.clone().unwrap_or_else(|| "no error message".to_string()),
                    job: job.name,
                    state: job.state.to_string(),
                });
            }
            if started.elapsed() >= self.settings.submit_timeout {
                return Err(LaunchError::SubmitTimeout {
                    job: job.name,
                    seconds: self.settings.submit_timeout.as_secs(),
                });
            }

            info!(job = %job.name, state = %job.state, "waiting for job to start");
            let remaining = self.settings.submit_timeout.saturating_sub(started.elapsed());
            std::thread::sleep(self.settings.poll_interval.min(remaining));
            job = self.platform.get_job(ctx, &job.name).map_err(LaunchError::Submission)?;
        }
    }

    fn log_parameters(
        &self,
        ctx: &PlatformContext,
        experiment: &ContextRef,
        run: &ContextRef,
        parameters: &ParameterMap,
    ) -> ParamLogging {
        let outcome = self
            .platform
            .get_run(ctx, experiment, &run.display_name)
            .and_then(|handle| {
                let handle = handle.ok_or_else(|| PlatformError::NotFound(run.resource_name.clone()))?;
                info!("Logging hyperparameters to run '{}'...", handle.display_name);
                debug!(keys = ?parameters.keys().collect::<Vec<_>>(), "parameter keys");
                self.platform.log_params(ctx, &handle, parameters)
            });

        match outcome {
            Ok(()) => {
                info!(count = parameters.len(), "hyperparameters logged successfully");
                ParamLogging::Logged { count: parameters.len() }
            }
            Err(e) => {
                warn!("Could not log hyperparameters to experiment run '{}': {}", run.display_name, e);
                ParamLogging::Failed { reason: e.to_string() }
            }
        }
    }
}
