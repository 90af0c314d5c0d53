use std::path::Path;
use anyhow::{Context, Result};
use reqwest::blocking::Client;
use tracing::{debug, info};
use crate::file_utils::{GcsPath, collect_sync_entries};
use crate::platform::CredentialSource;

const STORAGE_UPLOAD_ENDPOINT: &str = "https://storage.googleapis.com/upload/storage/v1";

/// 对象存储上传客户端
pub struct GcsUploader {
    client: Client,
    endpoint: String,
    access_token: String,
}

impl GcsUploader {
    pub fn new(credentials: &dyn CredentialSource) -> Result<Self> {
        Self::with_endpoint(STORAGE_UPLOAD_ENDPOINT, credentials)
    }

    pub fn with_endpoint(endpoint: &str, credentials: &dyn CredentialSource) -> Result<Self> {
        let access_token = credentials.access_token().context("Failed to obtain access token")?;
        let client = Client::builder()
            .user_agent(concat!("vertex-launcher/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            access_token: access_token.trim().to_string(),
        })
    }

    /// 以 media 方式上传单个文件
    pub fn upload_file(&self, local_path: &Path, bucket: &str, object: &str) -> Result<()> {
        let bytes = std::fs::read(local_path)
            .with_context(|| format!("Failed to read {}", local_path.display()))?;
        let url = format!("{}/b/{}/o", self.endpoint, bucket);

        let response = self
            .client
            .post(&url)
            .query(&[("uploadType", "media"), ("name", object)])
            .bearer_auth(&self.access_token)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .with_context(|| format!("Upload request for gs://{}/{} failed", bucket, object))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            anyhow::bail!("Upload of gs://{}/{} returned {}: {}", bucket, object, status, body.trim());
        }
        debug!(bucket, object, "uploaded");
        Ok(())
    }
}

/// 把本地目录递归复制到 `gs://bucket/prefix`，返回上传的文件数
///
/// 目录内容直接放在前缀之下，例如 `out/a/b.bin` → `gs://bucket/prefix/a/b.bin`。
pub fn sync_to_gcs(uploader: &GcsUploader, local_dir: &Path, destination: &str) -> Result<usize> {
    info!("Syncing local directory '{}' to GCS path '{}'...", local_dir.display(), destination);
    let target = GcsPath::parse(destination)?;
    let entries = collect_sync_entries(local_dir)?;

    for entry in &entries {
        let object = target.object_name(&entry.relative_name);
        uploader.upload_file(&entry.local_path, &target.bucket, &object)?;
    }

    info!(files = entries.len(), "Sync successful.");
    Ok(entries.len())
}
