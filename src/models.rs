// models.rs - 作为模块目录入口文件（Rust 2018+ 风格）
// 导出所有子模块
pub mod config;
pub mod experiment;
pub mod job;
pub mod labels;
pub mod parameter_value;
pub mod utils;

// 重新导出常用类型，保持API一致性
pub use config::{BuildConfig, LauncherConfig, PlatformConfig};
pub use experiment::{ContextRef, ExperimentRef, MetadataContext};
pub use job::{DiskSpec, JobSpecification, JobTemplate, MachineSpec};
pub use labels::{LabelSet, parse_labels};
pub use parameter_value::{ParameterMap, ParameterValue, format_params_pretty, params_to_json};
pub use utils::{deserialize_optional_string, expand_env_vars};
