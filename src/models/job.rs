use crate::models::labels::LabelSet;

/// 每个作业固定只有一个副本
pub const REPLICA_COUNT: u32 = 1;

/// 机器与加速器选择
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineSpec {
    pub machine_type: String,
    pub accelerator_type: String,
    pub accelerator_count: u32,
}

/// 启动盘规格
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskSpec {
    pub boot_disk_type: String,
    pub boot_disk_size_gb: u32,
}

/// 调用方给定的作业模板，尚未包含容器参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobTemplate {
    pub display_name: String,
    pub container_uri: String,
    pub machine: MachineSpec,
    pub disk: DiskSpec,
    pub labels: LabelSet,
    pub service_account: Option<String>,
    pub timeout_seconds: u64,
}

/// 单个远端训练作业的完整描述，构建后不可修改
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpecification {
    display_name: String,
    image_uri: String,
    args: Vec<String>,
    machine: MachineSpec,
    disk: DiskSpec,
    labels: LabelSet,
    service_account: Option<String>,
    timeout_seconds: u64,
}

impl JobSpecification {
    /// 由模板构建作业描述：参数向量为 `[dataset_path] ++ extra_args`
    ///
    /// 纯构造，不做 I/O，也没有失败路径。
    pub fn build(template: &JobTemplate, dataset_path: Option<&str>, extra_args: &[String]) -> Self {
        let args: Vec<String> = dataset_path
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .into_iter()
            .chain(extra_args.iter().cloned())
            .collect();

        Self {
            display_name: template.display_name.clone(),
            image_uri: template.container_uri.clone(),
            args,
            machine: template.machine.clone(),
            disk: template.disk.clone(),
            labels: template.labels.clone(),
            service_account: template.service_account.clone(),
            timeout_seconds: template.timeout_seconds,
        }
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn image_uri(&self) -> &str {
        &self.image_uri
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn machine(&self) -> &MachineSpec {
        &self.machine
    }

    pub fn disk(&self) -> &DiskSpec {
        &self.disk
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    pub fn replica_count(&self) -> u32 {
        REPLICA_COUNT
    }

    pub fn service_account(&self) -> Option<&str> {
        self.service_account.as_deref()
    }

    pub fn timeout_seconds(&self) -> u64 {
        self.timeout_seconds
    }
}

#[cfg(test)]
pub(crate) fn sample_template() -> JobTemplate {
    JobTemplate {
        display_name: "drive-train".to_string(),
        container_uri: "us-docker.pkg.dev/p/repo/drive:latest".to_string(),
        machine: MachineSpec {
            machine_type: "g2-standard-16".to_string(),
            accelerator_type: "NVIDIA_L4".to_string(),
            accelerator_count: 1,
        },
        disk: DiskSpec { boot_disk_type: "pd-ssd".to_string(), boot_disk_size_gb: 100 },
        labels: LabelSet::from([("user".to_string(), "alice".to_string())]),
        service_account: Some("trainer@p.iam.gserviceaccount.com".to_string()),
        timeout_seconds: 604_800,
    }
}
