use std::path::{Path, PathBuf};
use walkdir::{WalkDir, DirEntry};
use anyhow::{Context, Result};

/// 待上传的本地文件及其对象名（相对路径，使用 `/` 分隔）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncEntry {
    pub local_path: PathBuf,
    pub relative_name: String,
}

/// `gs://bucket/prefix` 拆分后的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcsPath {
    pub bucket: String,
    pub prefix: String, // 不带首尾 `/`，可以为空
}

impl GcsPath {
    pub fn parse(uri: &str) -> Result<Self> {
        let rest = uri
            .strip_prefix("gs://")
            .ok_or_else(|| anyhow::anyhow!("'{}' is not a gs:// path", uri))?;
        let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            anyhow::bail!("'{}' has no bucket name", uri);
        }
        Ok(Self {
            bucket: bucket.to_string(),
            prefix: prefix.trim_matches('/').to_string(),
        })
    }

    /// 相对路径对应的对象名
    pub fn object_name(&self, relative_name: &str) -> String {
        if self.prefix.is_empty() {
            relative_name.to_string()
        } else {
            format!("{}/{}", self.prefix, relative_name)
        }
    }
}

/// 递归遍历本地目录，收集所有普通文件
pub fn collect_sync_entries(local_dir: &Path) -> Result<Vec<SyncEntry>> {
    // 检查目录是否存在
    if !local_dir.exists() {
        anyhow::bail!("Local directory '{}' does not exist", local_dir.display());
    }

    if !local_dir.is_dir() {
        anyhow::bail!("'{}' is not a directory", local_dir.display());
    }

    let mut entries = Vec::new();
    for entry in WalkDir::new(local_dir).follow_links(true).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", local_dir.display()))?;
        if !is_regular_file(&entry) {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(local_dir)
            .with_context(|| format!("{} is outside {}", entry.path().display(), local_dir.display()))?;
        entries.push(SyncEntry {
            local_path: entry.path().to_path_buf(),
            relative_name: to_object_name(relative),
        });
    }

    Ok(entries)
}

fn is_regular_file(entry: &DirEntry) -> bool {
    entry.file_type().is_file()
}

/// 把相对路径转换为对象名，统一使用 `/`
fn to_object_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_parse_gcs_path() {
        let path = GcsPath::parse("gs://my-bucket/runs/drive/").unwrap();
        assert_eq!(path.bucket, "my-bucket");
        assert_eq!(path.prefix, "runs/drive");
        assert_eq!(path.object_name("a/b.bin"), "runs/drive/a/b.bin");

        let path = GcsPath::parse("gs://my-bucket").unwrap();
        assert_eq!(path.prefix, "");
        assert_eq!(path.object_name("b.bin"), "b.bin");
    }

    #[test]
    fn test_parse_gcs_path_invalid() {
        assert!(GcsPath::parse("s3://bucket/x").is_err());
        assert!(GcsPath::parse("gs:///x").is_err());
        assert!(GcsPath::parse("/local/dir").is_err());
    }

    #[test]
    fn test_collect_sync_entries() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path();

        // 创建嵌套目录结构
        fs::create_dir_all(root.join("maps/town01")).unwrap();
        fs::write(root.join("config.ini"), "[train]").unwrap();
        fs::write(root.join("maps/town01/map.bin"), "bin").unwrap();
        fs::create_dir(root.join("empty")).unwrap();

        let entries = collect_sync_entries(root).unwrap();
        dbg!(&entries);

        let names: Vec<&str> = entries.iter().map(|e| e.relative_name.as_str()).collect();
        assert_eq!(names, vec!["config.ini", "maps/town01/map.bin"]);
        assert!(entries[1].local_path.ends_with("maps/town01/map.bin"));
    }

    #[test]
    fn test_collect_sync_entries_nonexistent_dir() {
        // 测试不存在的目录
        let result = collect_sync_entries(Path::new("/nonexistent/directory"));
        assert!(result.is_err());
    }

    #[test]
    fn test_collect_sync_entries_file_instead_of_dir() {
        let temp_dir = tempdir().unwrap();
        let file_path = temp_dir.path().join("file.txt");
        fs::write(&file_path, "test").unwrap();

        // 测试文件而不是目录的情况
        assert!(collect_sync_entries(&file_path).is_err());
    }

    #[test]
    fn test_collect_sync_entries_empty_dir() {
        let temp_dir = tempdir().unwrap();
        let entries = collect_sync_entries(temp_dir.path()).unwrap();
        assert_eq!(entries.len(), 0);
    }
}
