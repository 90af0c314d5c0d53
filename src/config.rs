use crate::models::LauncherConfig;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "vertex_launcher.toml";

pub fn load_config(config_path: &str) -> Result<LauncherConfig> {
    // 检查配置文件是否存在，如果不存在则创建默认配置
    if !Path::new(config_path).exists() {
        create_default_config(config_path)?;
        println!("Created default config file at {}", config_path);
    }

    // 读取配置文件内容
    let config_content = fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read config file: {}", config_path))?;

    // 解析TOML配置
    let config: LauncherConfig = toml::from_str(&config_content)
        .with_context(|| format!("Failed to parse config file: {}", config_path))?;

    Ok(config)
}

fn create_default_config(config_path: &str) -> Result<()> {
    let default_config = r#"# Values here are defaults; command-line flags take precedence.

[platform]
project = ""
location = "us-central1"
staging_bucket = ""
service_account = ""
# Leave empty to use $GOOGLE_OAUTH_ACCESS_TOKEN or `gcloud auth print-access-token`.
access_token = ""

[machine]
machine_type = "g2-standard-16"
accelerator_type = "NVIDIA_L4"
accelerator_count = 1
boot_disk_type = "pd-ssd"
boot_disk_size_gb = 100

[job]
timeout_seconds = 604800
submit_timeout_seconds = 900
poll_interval_seconds = 10

[build]
dockerfile = "gcp.dockerfile"
context = "."
verbose = false

[parameters]
sweep_prefix = "sweep."
"#;

    fs::write(config_path, default_config)
        .with_context(|| format!("Failed to create default config file: {}", config_path))?;

    Ok(())
}
