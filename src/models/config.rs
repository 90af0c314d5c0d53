use serde::Deserialize;
use std::time::Duration;

/// 启动器配置结构（vertex_launcher.toml）
#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(default)]
pub struct LauncherConfig {
    pub platform: PlatformConfig,
    pub machine: MachineConfig,
    pub job: JobConfig,
    pub build: BuildConfig,
    pub parameters: ParametersConfig,
}

/// 云平台配置
#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(default)]
pub struct PlatformConfig {
    #[serde(deserialize_with = "crate::models::deserialize_optional_string")]
    pub project: Option<String>,
    #[serde(deserialize_with = "crate::models::deserialize_optional_string")]
    pub location: Option<String>,
    #[serde(deserialize_with = "crate::models::deserialize_optional_string")]
    pub staging_bucket: Option<String>,
    #[serde(deserialize_with = "crate::models::deserialize_optional_string")]
    pub service_account: Option<String>,
    // 留空时依次尝试环境变量和 gcloud
    #[serde(deserialize_with = "crate::models::deserialize_optional_string")]
    pub access_token: Option<String>,
}

/// 机器与加速器配置
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct MachineConfig {
    pub machine_type: String,
    pub accelerator_type: String,
    pub accelerator_count: u32,
    pub boot_disk_type: String,
    pub boot_disk_size_gb: u32,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            machine_type: "g2-standard-16".to_string(),
            accelerator_type: "NVIDIA_L4".to_string(),
            accelerator_count: 1,
            boot_disk_type: "pd-ssd".to_string(),
            boot_disk_size_gb: 100,
        }
    }
}

/// 作业调度与提交等待配置
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct JobConfig {
    pub timeout_seconds: u64,        // 远端作业最长运行时间，默认 7 天
    pub submit_timeout_seconds: u64, // 等待作业进入运行状态的上限
    pub poll_interval_seconds: u64,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 604_800,
            submit_timeout_seconds: 900,
            poll_interval_seconds: 10,
        }
    }
}

/// 轮询间隔下限，避免配置为 0 时空转请求接口
pub const MIN_POLL_INTERVAL_SECONDS: u64 = 1;

impl JobConfig {
    pub fn submit_timeout(&self) -> Duration {
        Duration::from_secs(self.submit_timeout_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds.max(MIN_POLL_INTERVAL_SECONDS))
    }
}

/// 镜像构建配置
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct BuildConfig {
    pub dockerfile: String,
    pub context: String,
    pub verbose: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            dockerfile: "gcp.dockerfile".to_string(),
            context: ".".to_string(),
            verbose: false,
        }
    }
}

/// 参数扁平化配置
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ParametersConfig {
    pub sweep_prefix: String,
}

impl Default for ParametersConfig {
    fn default() -> Self {
        Self { sweep_prefix: crate::ini_parser::SWEEP_SECTION_PREFIX.to_string() }
    }
}
