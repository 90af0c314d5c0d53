// src/ini_parser.rs
use std::path::Path;
use anyhow::{Context, Result};
use tracing::{debug, warn};
use crate::models::{ParameterMap, ParameterValue};

/// 超参数搜索空间所在的节名前缀，这些节不属于单次运行的参数
pub const SWEEP_SECTION_PREFIX: &str = "sweep.";

const DEFAULT_SECTION: &str = "DEFAULT";
const MAX_INTERPOLATION_DEPTH: usize = 10;

pub type Entries = Vec<(String, Option<String>)>;

/// INI 文件中的一个节，保持书写顺序
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IniSection {
    pub name: String,
    pub entries: Entries,
}

/// 解析后的 INI 文档
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IniDocument {
    pub defaults: Entries, // [DEFAULT] 节，被其余每个节继承
    pub sections: Vec<IniSection>,
}

// ————————————————————————————————————————————————————————————————————————
// 入口：读取并扁平化配置文件，任何失败都退化为空表
// ————————————————————————————————————————————————————————————————————————
pub fn flatten_file(file_path: &Path, sweep_prefix: &str) -> ParameterMap {
    let contents = match std::fs::read_to_string(file_path)
        .with_context(|| format!("Failed to read config file: {}", file_path.display()))
    {
        Ok(contents) => contents,
        Err(e) => {
            warn!("{:#}; parameters will not be logged", e);
            return ParameterMap::new();
        }
    };

    flatten_str(&contents, sweep_prefix).unwrap_or_else(|e| {
        warn!("Error parsing INI file {}: {:#}; parameters will not be logged", file_path.display(), e);
        ParameterMap::new()
    })
}

/// 解析并扁平化 INI 文本
pub fn flatten_str(contents: &str, sweep_prefix: &str) -> Result<ParameterMap> {
    let document = parse_ini(contents)?;
    flatten_document(&document, sweep_prefix)
}

/// 将文档扁平化为 `section.key` → 类型化值
///
/// 以 `sweep_prefix` 开头的节整体跳过；键中的 `-` 统一替换为 `_`。
pub fn flatten_document(document: &IniDocument, sweep_prefix: &str) -> Result<ParameterMap> {
    let mut params = ParameterMap::new();

    for section in &document.sections {
        if section.name.starts_with(sweep_prefix) {
            debug!(section = %section.name, "skipping sweep section");
            continue;
        }
        for (key, value) in document.items(section)? {
            let param_key = format!("{}.{}", section.name, key.replace('-', "_"));
            let value = coerce_value(value.as_deref());
            debug!(key = %param_key, kind = value.type_name(), "parameter");
            params.insert(param_key, value);
        }
    }

    Ok(params)
}

// ————————————————————————————————————————————————————————————————————————
// 类型推断：裸键 → true；完整的数字 → int / float；否则保留字符串
// ————————————————————————————————————————————————————————————————————————
pub fn coerce_value(value: Option<&str>) -> ParameterValue {
    let Some(raw) = value else {
        return ParameterValue::Bool(true);
    };

    match parse_number(raw) {
        // 没有小数部分的数字（包括 "3.0"）落在 i64 范围内时视为整数
        Some(n) if n.is_finite() && n.fract() == 0.0 && n >= i64::MIN as f64 && n < i64::MAX as f64 => {
            ParameterValue::Int(n as i64)
        }
        Some(n) => ParameterValue::Float(n),
        None => ParameterValue::String(raw.to_string()),
    }
}

/// 解析数字，允许首尾空白以及数字之间的 `_` 分组符
fn parse_number(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    let bytes = s.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if *b == b'_' {
            let prev_digit = i > 0 && bytes[i - 1].is_ascii_digit();
            let next_digit = bytes.get(i + 1).is_some_and(u8::is_ascii_digit);
            if !(prev_digit && next_digit) {
                return None;
            }
        }
    }

    let cleaned: String = s.chars().filter(|c| *c != '_').collect();
    cleaned.parse::<f64>().ok()
}

// ————————————————————————————————————————————————————————————————————————
// 语法解析
// ————————————————————————————————————————————————————————————————————————

/// 当前写入位置：`None` 表示 DEFAULT 节，`Some(i)` 表示第 i 个普通节
type SectionCursor = Option<usize>;

pub fn parse_ini(contents: &str) -> Result<IniDocument> {
    let mut document = IniDocument::default();
    let mut current: Option<SectionCursor> = None;
    // 最近一个键：(所在节, 条目下标, 缩进)，用于多行值续写
    let mut last_key: Option<(SectionCursor, usize, usize)> = None;

    for (index, line) in contents.lines().enumerate() {
        let lineno = index + 1;
        let stripped = line.trim();

        if stripped.is_empty() {
            last_key = None;
            continue;
        }
        if stripped.starts_with('#') || stripped.starts_with(';') {
            continue;
        }

        let indent = line.len() - line.trim_start().len();

        // 缩进更深的行是上一个值的续行
        if let Some((cursor, entry, key_indent)) = last_key {
            if indent > key_indent {
                let entries = document.entries_mut(cursor);
                let (key, value) = &mut entries[entry];
                match value {
                    Some(v) => {
                        v.push('\n');
                        v.push_str(stripped);
                    }
                    None => anyhow::bail!("line {}: continuation of value-less key '{}'", lineno, key),
                }
                continue;
            }
        }

        if stripped.starts_with('[') {
            let end = stripped
                .rfind(']')
                .ok_or_else(|| anyhow::anyhow!("line {}: unterminated section header: {}", lineno, stripped))?;
            let name = &stripped[1..end];
            if name.is_empty() {
                anyhow::bail!("line {}: empty section header", lineno);
            }

            if name == DEFAULT_SECTION {
                current = Some(None);
            } else {
                if document.sections.iter().any(|s| s.name == name) {
                    anyhow::bail!("line {}: duplicate section '{}'", lineno, name);
                }
                document.sections.push(IniSection { name: name.to_string(), entries: Vec::new() });
                current = Some(Some(document.sections.len() - 1));
            }
            last_key = None;
            continue;
        }

        let cursor = current
            .ok_or_else(|| anyhow::anyhow!("line {}: key outside of any section: {}", lineno, stripped))?;

        let (key, value) = split_option(stripped);
        if key.is_empty() {
            anyhow::bail!("line {}: empty key", lineno);
        }

        let entries = document.entries_mut(cursor);
        if entries.iter().any(|(k, _)| *k == key) {
            anyhow::bail!("line {}: duplicate key '{}'", lineno, key);
        }
        entries.push((key, value));
        last_key = Some((cursor, entries.len() - 1, indent));
    }

    Ok(document)
}

/// 按第一个 `=` 或 `:` 拆分键值；没有分隔符时为裸键
fn split_option(line: &str) -> (String, Option<String>) {
    match line.find(['=', ':']) {
        Some(pos) => (
            line[..pos].trim().to_lowercase(),
            Some(line[pos + 1..].trim().to_string()),
        ),
        None => (line.trim().to_lowercase(), None),
    }
}

impl IniDocument {
    fn entries_mut(&mut self, cursor: SectionCursor) -> &mut Entries {
        match cursor {
            None => &mut self.defaults,
            Some(i) => &mut self.sections[i].entries,
        }
    }

    /// 节的有效条目：DEFAULT 条目在前，节内同名条目覆盖之，并完成插值
    pub fn items(&self, section: &IniSection) -> Result<Entries> {
        let mut merged: Entries = self.defaults.clone();
        for (key, value) in &section.entries {
            match merged.iter_mut().find(|(k, _)| k == key) {
                Some((_, existing)) => *existing = value.clone(),
                None => merged.push((key.clone(), value.clone())),
            }
        }

        merged
            .iter()
            .map(|(key, value)| -> Result<(String, Option<String>)> {
                let value = match value {
                    Some(v) => Some(interpolate(v, &merged, 1).with_context(|| {
                        format!("bad interpolation in [{}] {}", section.name, key)
                    })?),
                    None => None,
                };
                Ok((key.clone(), value))
            })
            .collect()
    }
}

// ————————————————————————————————————————————————————————————————————————
// `%(name)s` 插值，`%%` 表示字面量 `%`
// ————————————————————————————————————————————————————————————————————————
fn interpolate(value: &str, scope: &Entries, depth: usize) -> Result<String> {
    if depth > MAX_INTERPOLATION_DEPTH {
        anyhow::bail!("interpolation depth exceeded for value: {}", value);
    }

    let mut output = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(pos) = rest.find('%') {
        output.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(tail) = after.strip_prefix('%') {
            output.push('%');
            rest = tail;
        } else if let Some(tail) = after.strip_prefix('(') {
            let close = tail
                .find(")s")
                .ok_or_else(|| anyhow::anyhow!("bad interpolation syntax: {}", value))?;
            let name = tail[..close].to_lowercase();
            let referenced = scope
                .iter()
                .find(|(k, _)| *k == name)
                .ok_or_else(|| anyhow::anyhow!("unknown interpolation reference '{}'", name))?;
            match &referenced.1 {
                Some(v) => output.push_str(&interpolate(v, scope, depth + 1)?),
                None => anyhow::bail!("interpolation references value-less key '{}'", name),
            }
            rest = &tail[close + 2..];
        } else {
            anyhow::bail!("'%' must be followed by '%' or '(': {}", value);
        }
    }

    output.push_str(rest);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::format_params_pretty;
    use std::io::Write;

    fn flatten(contents: &str) -> ParameterMap {
        flatten_str(contents, SWEEP_SECTION_PREFIX).unwrap()
    }

    #[test]
    fn test_end_to_end_sweep_section_dropped() {
        let params = flatten("[train]\nlr=0.001\n[sweep.x]\na=1");
        println!("{}", format_params_pretty(&params).unwrap());

        assert_eq!(params.len(), 1);
        assert_eq!(params.get("train.lr"), Some(&ParameterValue::Float(0.001)));
    }

    #[test]
    fn test_sweep_sections_contribute_no_keys() {
        let contents = r#"
[base]
package = ocean

[sweep]
method = Protein

[sweep.train.learning_rate]
distribution = log_normal
min = 0.0001
max = 0.1

[sweep.env.num_agents]
min = 16
"#;
        let params = flatten(contents);
        // 只有精确前缀 "sweep." 被排除，名为 "sweep" 的节保留
        let keys: Vec<&str> = params.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["base.package", "sweep.method"]);
        assert!(params.keys().all(|k| !k.starts_with("sweep.train") && !k.starts_with("sweep.env")));
    }

    #[test]
    fn test_value_typing_rules() {
        assert_eq!(coerce_value(Some("10")), ParameterValue::Int(10));
        assert_eq!(coerce_value(Some("10.5")), ParameterValue::Float(10.5));
        assert_eq!(coerce_value(Some("10.0")), ParameterValue::Int(10));
        assert_eq!(coerce_value(Some("abc")), ParameterValue::String("abc".to_string()));
        assert_eq!(coerce_value(None), ParameterValue::Bool(true));
    }

    #[test]
    fn test_numeric_edge_cases() {
        assert_eq!(coerce_value(Some("  42  ")), ParameterValue::Int(42));
        assert_eq!(coerce_value(Some("1_000_000")), ParameterValue::Int(1_000_000));
        assert_eq!(coerce_value(Some("1e-3")), ParameterValue::Float(0.001));
        assert_eq!(coerce_value(Some("1e3")), ParameterValue::Int(1000));
        assert_eq!(coerce_value(Some("-7")), ParameterValue::Int(-7));
        assert_eq!(coerce_value(Some(".5")), ParameterValue::Float(0.5));
        assert_eq!(coerce_value(Some("inf")), ParameterValue::Float(f64::INFINITY));
        assert!(matches!(coerce_value(Some("nan")), ParameterValue::Float(f) if f.is_nan()));
        assert_eq!(coerce_value(Some("1e30")), ParameterValue::Float(1e30));

        // 非法的分组符位置以及其他非数字保持为字符串
        assert_eq!(coerce_value(Some("_1")), ParameterValue::String("_1".to_string()));
        assert_eq!(coerce_value(Some("1__0")), ParameterValue::String("1__0".to_string()));
        assert_eq!(coerce_value(Some("1_.5")), ParameterValue::String("1_.5".to_string()));
        assert_eq!(coerce_value(Some("0x10")), ParameterValue::String("0x10".to_string()));
        assert_eq!(coerce_value(Some("True")), ParameterValue::String("True".to_string()));
        assert_eq!(coerce_value(Some("")), ParameterValue::String(String::new()));
    }

    #[test]
    fn test_composite_key_normalizes_hyphens() {
        let params = flatten("[train]\nlearning-rate = 0.0003\n");
        assert_eq!(params.get("train.learning_rate"), Some(&ParameterValue::Float(0.0003)));
        assert!(params.get("train.learning-rate").is_none());
    }

    #[test]
    fn test_bare_key_is_true() {
        let params = flatten("[train]\ncompile\nanneal-lr\nbatch_size = 8\n");
        assert_eq!(params.get("train.compile"), Some(&ParameterValue::Bool(true)));
        assert_eq!(params.get("train.anneal_lr"), Some(&ParameterValue::Bool(true)));
        assert_eq!(params.get("train.batch_size"), Some(&ParameterValue::Int(8)));
    }

    #[test]
    fn test_grammar_details() {
        let contents = r#"
# leading comment
[env]
; another comment
Num-Agents : 1024
map_dir = resources/drive/binaries
notes = first line
    second line
inline = 3 # not a comment
"#;
        let params = flatten(contents);
        // 键统一小写，`:` 也是分隔符
        assert_eq!(params.get("env.num_agents"), Some(&ParameterValue::Int(1024)));
        assert_eq!(
            params.get("env.map_dir"),
            Some(&ParameterValue::String("resources/drive/binaries".to_string()))
        );
        assert_eq!(
            params.get("env.notes"),
            Some(&ParameterValue::String("first line\nsecond line".to_string()))
        );
        assert_eq!(params.get("env.inline"), Some(&ParameterValue::String("3 # not a comment".to_string())));
    }

    #[test]
    fn test_default_section_is_inherited() {
        let contents = "[DEFAULT]\nseed = 42\ndevice = cuda\n[train]\ndevice = cpu\n[env]\nname = drive\n";
        let params = flatten(contents);

        assert!(!params.keys().any(|k| k.starts_with("DEFAULT.")));
        assert_eq!(params.get("train.seed"), Some(&ParameterValue::Int(42)));
        assert_eq!(params.get("train.device"), Some(&ParameterValue::String("cpu".to_string())));
        assert_eq!(params.get("env.seed"), Some(&ParameterValue::Int(42)));
        assert_eq!(params.get("env.device"), Some(&ParameterValue::String("cuda".to_string())));
    }

    #[test]
    fn test_interpolation() {
        let contents = "[paths]\nroot = /data\nmaps = %(root)s/maps\nrate = 50%%\n";
        let params = flatten(contents);
        assert_eq!(params.get("paths.maps"), Some(&ParameterValue::String("/data/maps".to_string())));
        assert_eq!(params.get("paths.rate"), Some(&ParameterValue::String("50%".to_string())));
    }

    #[test]
    fn test_invalid_documents_are_errors() {
        let invalid = [
            "lr = 0.1\n[train]\n",                  // 节头之前的键
            "[train]\nlr = 1\n[train]\nlr = 2\n",   // 重复的节
            "[train]\nlr = 1\nlr = 2\n",            // 重复的键
            "[train\nlr = 1\n",                     // 未闭合的节头
            "[train]\n= 1\n",                       // 空键
            "[train]\nrate = 50%\n",                // 非法插值
            "[train]\npath = %(missing)s/x\n",      // 未知引用
            "[train]\na = %(b)s\nb = %(a)s\n",      // 循环引用
        ];
        for contents in invalid {
            assert!(flatten_str(contents, SWEEP_SECTION_PREFIX).is_err(), "expected error for {:?}", contents);
        }
    }

    #[test]
    fn test_flatten_file_degrades_to_empty() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[train]\nlr = 0.1\nlr = 0.2\n").unwrap();
        let params = flatten_file(file.path(), SWEEP_SECTION_PREFIX);
        assert!(params.is_empty());

        let params = flatten_file(Path::new("/nonexistent/config.ini"), SWEEP_SECTION_PREFIX);
        assert!(params.is_empty());
    }

    #[test]
    fn test_flatten_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "[base]\npackage = ocean\n\n[train]\ntotal-timesteps = 2_000_000_000\ngamma = 0.98\nanneal_lr\n\n[sweep.train.gamma]\nmin = 0.9\n"
        )
        .unwrap();

        let params = flatten_file(file.path(), SWEEP_SECTION_PREFIX);
        assert_eq!(params.len(), 4);
        assert_eq!(params.get("train.total_timesteps"), Some(&ParameterValue::Int(2_000_000_000)));
        assert_eq!(params.get("train.gamma"), Some(&ParameterValue::Float(0.98)));
        assert_eq!(params.get("train.anneal_lr"), Some(&ParameterValue::Bool(true)));
        assert_eq!(params.get("base.package"), Some(&ParameterValue::String("ocean".to_string())));
    }

    #[test]
    fn test_custom_sweep_prefix() {
        let params = flatten_str("[grid.a]\nx = 1\n[train]\ny = 2\n", "grid.").unwrap();
        let keys: Vec<&str> = params.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["train.y"]);
    }
}
