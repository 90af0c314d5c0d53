use crate::error::{LaunchError, LaunchResult};
use std::collections::BTreeMap;

/// 作业标签集合
pub type LabelSet = BTreeMap<String, String>;

/// 解析 `key=value` 形式的标签列表
///
/// 只按第一个 `=` 切分，值中可以再包含 `=`。缺少 `=` 的标记直接报错，
/// 不会被悄悄丢弃；调用方应在任何平台调用之前完成解析。
pub fn parse_labels<S: AsRef<str>>(tokens: &[S]) -> LaunchResult<LabelSet> {
    let mut labels = LabelSet::new();
    for token in tokens {
        let token = token.as_ref();
        let (key, value) = token
            .split_once('=')
            .ok_or_else(|| LaunchError::MalformedLabel(token.to_string()))?;
        labels.insert(key.to_string(), value.to_string());
    }
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_labels() {
        let labels = parse_labels(&["user=alice", "env=prod"]).unwrap();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels.get("user").map(String::as_str), Some("alice"));
        assert_eq!(labels.get("env").map(String::as_str), Some("prod"));
    }

    #[test]
    fn test_parse_labels_splits_on_first_equals() {
        let labels = parse_labels(&["query=a=b"]).unwrap();
        assert_eq!(labels.get("query").map(String::as_str), Some("a=b"));

        let labels = parse_labels(&["empty="]).unwrap();
        assert_eq!(labels.get("empty").map(String::as_str), Some(""));
    }

    #[test]
    fn test_parse_labels_rejects_missing_equals() {
        let err = parse_labels(&["user=alice", "badlabel"]).unwrap_err();
        assert!(matches!(err, LaunchError::MalformedLabel(ref token) if token == "badlabel"));
    }

    #[test]
    fn test_parse_labels_empty_list() {
        let labels = parse_labels::<&str>(&[]).unwrap();
        assert!(labels.is_empty());
    }
}
