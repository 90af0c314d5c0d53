use thiserror::Error;

pub type LaunchResult<T> = std::result::Result<T, LaunchError>;
pub type PlatformResult<T> = std::result::Result<T, PlatformError>;

/// 远端平台调用失败的分类
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("resource already exists: {0}")]
    AlreadyExists(String),

    #[error("platform API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("credentials unavailable: {0}")]
    Credentials(String),

    #[error("unexpected platform response: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// 提交流程中的致命错误
///
/// 参数记录失败不在此列，它作为成功结果中的 `ParamLogging::Failed` 返回。
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("invalid label format: {0}. Must be key=value")]
    MalformedLabel(String),

    #[error("failed to initialize platform context: {0}")]
    ContextInit(String),

    #[error("failed to resolve experiment '{name}': {source}")]
    Experiment {
        name: String,
        #[source]
        source: PlatformError,
    },

    #[error("failed to resolve experiment run '{name}': {source}")]
    Run {
        name: String,
        #[source]
        source: PlatformError,
    },

    #[error("job submission failed: {0}")]
    Submission(#[source] PlatformError),

    #[error("job {job} entered state {state}: {message}")]
    JobFailed {
        job: String,
        state: String,
        message: String,
    },

    #[error("job {job} was not running after {seconds}s")]
    SubmitTimeout { job: String, seconds: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_message_is_preserved() {
        let err = LaunchError::Experiment {
            name: "drive".to_string(),
            source: PlatformError::Api { status: 403, message: "permission denied".to_string() },
        };
        let text = err.to_string();
        assert!(text.contains("drive"));
        assert!(text.contains("403"));
        assert!(text.contains("permission denied"));
    }

    #[test]
    fn test_malformed_label_message() {
        let err = LaunchError::MalformedLabel("badlabel".to_string());
        assert_eq!(err.to_string(), "invalid label format: badlabel. Must be key=value");
    }
}
