use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// 实验 / 运行名称对，用于指标记录的逻辑分组
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExperimentRef {
    pub experiment: Option<String>,
    pub run: Option<String>,
}

impl ExperimentRef {
    /// 给定实验但未给运行名时，按 UTC 时间合成 `run-YYYYmmdd-HHMMSS`
    ///
    /// 同一秒内的两次调用会得到相同名称，后续按“已存在”处理即可。
    pub fn resolve_names(experiment: Option<String>, run: Option<String>, now: DateTime<Utc>) -> Self {
        let experiment = experiment.filter(|e| !e.is_empty());
        let run = run.filter(|r| !r.is_empty());
        let run = match (&experiment, run) {
            (Some(_), None) => Some(synthesize_run_name(now)),
            (_, run) => run,
        };
        Self { experiment, run }
    }
}

pub fn synthesize_run_name(now: DateTime<Utc>) -> String {
    format!("run-{}", now.format("%Y%m%d-%H%M%S"))
}

/// 元数据存储中的 Context 资源（实验与运行都以此表示）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MetadataContext {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub schema_title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JsonValue>,
}

/// 已解析的实验或运行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextRef {
    pub id: String,            // contextId，例如 `drive` 或 `drive-run-20240101-000000`
    pub display_name: String,  // 用户给定的名称
    pub resource_name: String, // projects/…/metadataStores/default/contexts/{id}
}
