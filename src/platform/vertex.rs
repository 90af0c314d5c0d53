//! Vertex AI REST 客户端（同步阻塞）

use crate::error::{PlatformError, PlatformResult};
use crate::models::{ContextRef, JobSpecification, LabelSet, MetadataContext, ParameterMap, params_to_json};
use crate::platform::{JobState, PlatformContext, SubmittedJob, TrainingPlatform};
use chrono::Utc;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use tracing::debug;

const EXPERIMENT_SCHEMA: &str = "system.Experiment";
const RUN_SCHEMA: &str = "system.ExperimentRun";
const SCHEMA_VERSION: &str = "0.0.1";
// 运行参数在 Context 元数据中的键
const PARAMS_METADATA_KEY: &str = "_params";

pub struct VertexClient {
    client: Client,
    endpoint: Option<String>,
}

impl VertexClient {
    pub fn new() -> PlatformResult<Self> {
        let client = Client::builder().user_agent(concat!("vertex-launcher/", env!("CARGO_PKG_VERSION"))).build()?;
        Ok(Self { client, endpoint: None })
    }

    /// 指定 API 根地址（区域端点之外的环境，或测试）
    pub fn with_endpoint(endpoint: impl Into<String>) -> PlatformResult<Self> {
        let mut client = Self::new()?;
        client.endpoint = Some(endpoint.into().trim_end_matches('/').to_string());
        Ok(client)
    }

    fn base_url(&self, ctx: &PlatformContext) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => format!("https://{}-aiplatform.googleapis.com/v1", ctx.location),
        }
    }

    fn url(&self, ctx: &PlatformContext, resource: &str) -> String {
        format!("{}/{}", self.base_url(ctx), resource)
    }

    /// 发送请求并按状态码归类错误：404 → NotFound，409 → AlreadyExists
    fn send(&self, ctx: &PlatformContext, request: RequestBuilder, resource: &str) -> PlatformResult<JsonValue> {
        let response = request.bearer_auth(ctx.access_token()).send()?;
        let status = response.status();
        let body = response.text()?;
        debug!(%status, resource, "vertex response");

        match status {
            s if s.is_success() => {
                if body.trim().is_empty() {
                    Ok(JsonValue::Null)
                } else {
                    Ok(serde_json::from_str(&body)?)
                }
            }
            StatusCode::NOT_FOUND => Err(PlatformError::NotFound(resource.to_string())),
            StatusCode::CONFLICT => Err(PlatformError::AlreadyExists(resource.to_string())),
            s => Err(PlatformError::Api { status: s.as_u16(), message: error_message(&body) }),
        }
    }

    fn get_context(&self, ctx: &PlatformContext, context_id: &str) -> PlatformResult<Option<MetadataContext>> {
        let resource = ctx.context_name(context_id);
        match self.send(ctx, self.client.get(self.url(ctx, &resource)), &resource) {
            Ok(body) => Ok(Some(serde_json::from_value(body)?)),
            Err(PlatformError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn create_context(&self, ctx: &PlatformContext, context_id: &str, body: &MetadataContext) -> PlatformResult<MetadataContext> {
        let resource = format!("{}/contexts", ctx.metadata_store());
        let request = self
            .client
            .post(self.url(ctx, &resource))
            .query(&[("contextId", context_id)])
            .json(body);
        let created = self
            .send(ctx, request, &ctx.context_name(context_id))
            .map_err(|e| match e {
                // 部分错误以 400 + ALREADY_EXISTS 文本返回
                PlatformError::Api { message, .. } if message.contains("already exists") => {
                    PlatformError::AlreadyExists(ctx.context_name(context_id))
                }
                e => e,
            })?;
        Ok(serde_json::from_value(created)?)
    }
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<JsonValue>(body)
        .ok()
        .and_then(|v| v.pointer("/error/message").and_then(JsonValue::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

fn to_ref(context: &MetadataContext, fallback: ContextRef) -> ContextRef {
    if context.name.is_empty() {
        return fallback;
    }
    ContextRef {
        id: context.name.rsplit('/').next().unwrap_or(&fallback.id).to_string(),
        display_name: if context.display_name.is_empty() { fallback.display_name } else { context.display_name.clone() },
        resource_name: context.name.clone(),
    }
}

fn check_schema(context: &MetadataContext, expected: &str) -> PlatformResult<()> {
    if !context.schema_title.is_empty() && context.schema_title != expected {
        return Err(PlatformError::InvalidResponse(format!(
            "context {} has schema {}, expected {}",
            context.name, context.schema_title, expected
        )));
    }
    Ok(())
}

// ————————————————————————————————————————————————————————————————————————
// CustomJob 请求体
// ————————————————————————————————————————————————————————————————————————

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CustomJobBody<'a> {
    display_name: &'a str,
    #[serde(skip_serializing_if = "LabelSet::is_empty")]
    labels: &'a LabelSet,
    job_spec: JobSpecBody<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JobSpecBody<'a> {
    worker_pool_specs: Vec<WorkerPoolSpecBody<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    service_account: Option<&'a str>,
    scheduling: SchedulingBody,
    base_output_directory: OutputDirectoryBody,
    #[serde(skip_serializing_if = "Option::is_none")]
    experiment: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    experiment_run: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WorkerPoolSpecBody<'a> {
    machine_spec: MachineSpecBody<'a>,
    replica_count: u32,
    disk_spec: DiskSpecBody<'a>,
    container_spec: ContainerSpecBody<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MachineSpecBody<'a> {
    machine_type: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    accelerator_type: &'a str,
    #[serde(skip_serializing_if = "is_zero")]
    accelerator_count: u32,
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DiskSpecBody<'a> {
    boot_disk_type: &'a str,
    boot_disk_size_gb: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ContainerSpecBody<'a> {
    image_uri: &'a str,
    args: &'a [String],
}

#[derive(Debug, Serialize)]
struct SchedulingBody {
    timeout: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OutputDirectoryBody {
    output_uri_prefix: String,
}

#[derive(Debug, Deserialize)]
struct CustomJobResponse {
    name: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    error: Option<StatusBody>,
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    #[serde(default)]
    message: String,
}

impl From<CustomJobResponse> for SubmittedJob {
    fn from(resp: CustomJobResponse) -> Self {
        SubmittedJob {
            name: resp.name,
            state: JobState::parse(&resp.state),
            error: resp.error.map(|e| e.message).filter(|m| !m.is_empty()),
        }
    }
}

fn custom_job_body<'a>(
    ctx: &'a PlatformContext,
    spec: &'a JobSpecification,
    experiment: Option<&'a ContextRef>,
    run: Option<&'a ContextRef>,
) -> CustomJobBody<'a> {
    let machine = spec.machine();
    let disk = spec.disk();
    CustomJobBody {
        display_name: spec.display_name(),
        labels: spec.labels(),
        job_spec: JobSpecBody {
            worker_pool_specs: vec![WorkerPoolSpecBody {
                machine_spec: MachineSpecBody {
                    machine_type: &machine.machine_type,
                    accelerator_type: &machine.accelerator_type,
                    accelerator_count: machine.accelerator_count,
                },
                replica_count: spec.replica_count(),
                disk_spec: DiskSpecBody {
                    boot_disk_type: &disk.boot_disk_type,
                    boot_disk_size_gb: disk.boot_disk_size_gb,
                },
                container_spec: ContainerSpecBody { image_uri: spec.image_uri(), args: spec.args() },
            }],
            service_account: spec.service_account().or(ctx.service_account.as_deref()),
            scheduling: SchedulingBody { timeout: format!("{}s", spec.timeout_seconds()) },
            base_output_directory: OutputDirectoryBody {
                output_uri_prefix: format!(
                    "{}/aiplatform-custom-job-{}",
                    ctx.staging_bucket,
                    Utc::now().format("%Y-%m-%d-%H:%M:%S%.3f")
                ),
            },
            experiment: experiment.map(|e| e.resource_name.as_str()),
            experiment_run: run.map(|r| r.resource_name.as_str()),
        },
    }
}

impl TrainingPlatform for VertexClient {
    fn get_experiment(&self, ctx: &PlatformContext, name: &str) -> PlatformResult<Option<ContextRef>> {
        match self.get_context(ctx, name)? {
            Some(context) => {
                check_schema(&context, EXPERIMENT_SCHEMA)?;
                Ok(Some(to_ref(&context, ctx.experiment_ref(name))))
            }
            None => Ok(None),
        }
    }

    fn create_experiment(&self, ctx: &PlatformContext, name: &str) -> PlatformResult<ContextRef> {
        let body = MetadataContext {
            display_name: name.to_string(),
            schema_title: EXPERIMENT_SCHEMA.to_string(),
            schema_version: Some(SCHEMA_VERSION.to_string()),
            metadata: Some(json!({ "experiment_deleted": false })),
            ..Default::default()
        };
        let created = self.create_context(ctx, name, &body)?;
        Ok(to_ref(&created, ctx.experiment_ref(name)))
    }

    fn get_run(&self, ctx: &PlatformContext, experiment: &ContextRef, run: &str) -> PlatformResult<Option<ContextRef>> {
        let expected = ctx.run_ref(experiment, run);
        match self.get_context(ctx, &expected.id)? {
            Some(context) => {
                check_schema(&context, RUN_SCHEMA)?;
                Ok(Some(to_ref(&context, expected)))
            }
            None => Ok(None),
        }
    }

    fn create_run(&self, ctx: &PlatformContext, experiment: &ContextRef, run: &str) -> PlatformResult<ContextRef> {
        let expected = ctx.run_ref(experiment, run);
        let body = MetadataContext {
            display_name: run.to_string(),
            schema_title: RUN_SCHEMA.to_string(),
            schema_version: Some(SCHEMA_VERSION.to_string()),
            metadata: Some(json!({ "state": "RUNNING" })),
            ..Default::default()
        };
        Ok(to_ref(&self.create_context(ctx, &expected.id, &body)?, expected))
    }

    fn link_run(&self, ctx: &PlatformContext, experiment: &ContextRef, run: &ContextRef) -> PlatformResult<()> {
        // addContextChildren 对已挂载的子节点是幂等的
        let resource = format!("{}:addContextChildren", experiment.resource_name);
        let request = self
            .client
            .post(self.url(ctx, &resource))
            .json(&json!({ "childContexts": [run.resource_name] }));
        self.send(ctx, request, &resource)?;
        Ok(())
    }

    fn submit_job(
        &self,
        ctx: &PlatformContext,
        spec: &JobSpecification,
        experiment: Option<&ContextRef>,
        run: Option<&ContextRef>,
    ) -> PlatformResult<SubmittedJob> {
        let resource = format!("{}/customJobs", ctx.parent());
        let body = custom_job_body(ctx, spec, experiment, run);
        let request = self.client.post(self.url(ctx, &resource)).json(&body);
        let response: CustomJobResponse = serde_json::from_value(self.send(ctx, request, &resource)?)?;
        Ok(response.into())
    }

    fn get_job(&self, ctx: &PlatformContext, name: &str) -> PlatformResult<SubmittedJob> {
        let response: CustomJobResponse =
            serde_json::from_value(self.send(ctx, self.client.get(self.url(ctx, name)), name)?)?;
        Ok(response.into())
    }

    fn log_params(&self, ctx: &PlatformContext, run: &ContextRef, params: &ParameterMap) -> PlatformResult<()> {
        // 读取现有元数据后合并，避免覆盖运行状态等字段
        let current = self
            .get_context(ctx, &run.id)?
            .ok_or_else(|| PlatformError::NotFound(run.resource_name.clone()))?;

        let mut metadata = match current.metadata {
            Some(JsonValue::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        let mut logged = match metadata.remove(PARAMS_METADATA_KEY) {
            Some(JsonValue::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        logged.extend(params_to_json(params));
        metadata.insert(PARAMS_METADATA_KEY.to_string(), JsonValue::Object(logged));

        let request = self
            .client
            .patch(self.url(ctx, &run.resource_name))
            .query(&[("updateMask", "metadata")])
            .json(&json!({ "metadata": metadata }));
        self.send(ctx, request, &run.resource_name)?;
        Ok(())
    }
}
