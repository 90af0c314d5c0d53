use serde::{Deserialize, Deserializer};

/// 反序列化可选字符串，将空字符串转换为None
///
/// # 参数
/// - `deserializer`: 用于反序列化的serde反序列化器
///
/// # 返回值
/// 反序列化后的可选字符串，如果原字符串为空则返回None
pub fn deserialize_optional_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: Option<String> = Option::deserialize(deserializer)?;
    Ok(s.filter(|s| !s.is_empty()))
}

/// 展开字符串中的 `$NAME` 与 `${NAME}` 环境变量引用
///
/// 未定义的变量保持原样，例如镜像地址 `us-docker.pkg.dev/$PROJECT/repo:$USER`。
pub fn expand_env_vars(input: &str) -> String {
    expand_vars_with(input, |name| std::env::var(name).ok())
}

/// 使用自定义查找函数展开变量引用
pub fn expand_vars_with<F>(input: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        output.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        // ${NAME} 形式
        if let Some(braced) = after.strip_prefix('{') {
            if let Some(end) = braced.find('}') {
                let name = &braced[..end];
                match lookup(name) {
                    Some(value) => output.push_str(&value),
                    None => output.push_str(&rest[pos..pos + 3 + end]),
                }
                rest = &braced[end + 1..];
                continue;
            }
            output.push('$');
            rest = after;
            continue;
        }

        // $NAME 形式，名称由字母、数字和下划线组成
        let name_len = after
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(after.len());
        if name_len == 0 {
            output.push('$');
            rest = after;
            continue;
        }
        let name = &after[..name_len];
        match lookup(name) {
            Some(value) => output.push_str(&value),
            None => {
                output.push('$');
                output.push_str(name);
            }
        }
        rest = &after[name_len..];
    }

    output.push_str(rest);
    output
}
