use anyhow::{Context, Result};
use std::process::{Command, Stdio};
use tracing::info;
use crate::models::BuildConfig;

/// 运行外部命令；非零退出时把捕获的输出附在错误里
///
/// `verbose` 为真时直接把子进程输出串流到终端，不再捕获。
pub fn run_command(command: &[String], error_message: &str, verbose: bool) -> Result<()> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| anyhow::anyhow!("empty command"))?;
    info!("Running command: {}", command.join(" "));

    let mut cmd = Command::new(program);
    cmd.args(args);

    if verbose {
        let status = cmd
            .stdin(Stdio::null())
            .status()
            .with_context(|| format!("{} Failed to start '{}'", error_message, program))?;
        if !status.success() {
            anyhow::bail!("{} ({}). See the output above for details.", error_message, status);
        }
    } else {
        let output = cmd
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("{} Failed to start '{}'", error_message, program))?;
        if !output.status.success() {
            anyhow::bail!(
                "{} ({})\n   STDOUT: {}\n   STDERR: {}",
                error_message,
                output.status,
                String::from_utf8_lossy(&output.stdout).trim(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
    }

    info!("Command successful.");
    Ok(())
}

pub fn build_command(image: &str, build: &BuildConfig) -> Vec<String> {
    vec![
        "docker".to_string(),
        "build".to_string(),
        "--tag".to_string(),
        image.to_string(),
        "--file".to_string(),
        build.dockerfile.clone(),
        build.context.clone(),
    ]
}

pub fn push_command(image: &str) -> Vec<String> {
    vec!["docker".to_string(), "push".to_string(), image.to_string()]
}

/// 构建并推送镜像
pub fn build_and_push(image: &str, build: &BuildConfig, verbose: bool) -> Result<()> {
    run_command(&build_command(image, build), "Docker build failed.", verbose)?;
    run_command(
        &push_command(image),
        "Docker push failed. Ensure you are authenticated with `gcloud auth configure-docker`.",
        verbose,
    )
}
