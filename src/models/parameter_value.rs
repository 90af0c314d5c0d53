use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use std::fmt;

/// 扁平化后的参数值类型
#[derive(Clone, PartialEq)]
pub enum ParameterValue {
    Bool(bool),     // 无值的键（裸键）统一视为 true
    Int(i64),       // 整数类型参数值
    Float(f64),     // 浮点数类型参数值
    String(String), // 无法解析为数字时保留原始字符串
}

impl ParameterValue {
    pub fn to_string_repr(&self) -> String {
        match self {
            ParameterValue::Bool(b) => b.to_string(),
            ParameterValue::Int(n) => n.to_string(),
            ParameterValue::Float(n) => n.to_string(),
            ParameterValue::String(s) => s.clone(),
        }
    }

    /// 类型名称，用于诊断输出
    pub fn type_name(&self) -> &'static str {
        match self {
            ParameterValue::Bool(_) => "bool",
            ParameterValue::Int(_) => "int",
            ParameterValue::Float(_) => "float",
            ParameterValue::String(_) => "string",
        }
    }
}

/// 为ParameterValue实现Debug trait，使用Display的格式
impl fmt::Debug for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_repr())
    }
}

impl From<&ParameterValue> for JsonValue {
    fn from(val: &ParameterValue) -> Self {
        match val {
            ParameterValue::Bool(b) => JsonValue::Bool(*b),
            ParameterValue::Int(i) => JsonValue::Number((*i).into()),
            // inf/nan 不是合法的 JSON 数字，退化为字符串以免丢失参数
            ParameterValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or_else(|| JsonValue::String(f.to_string())),
            ParameterValue::String(s) => JsonValue::String(s.clone()),
        }
    }
}

/// 扁平化参数表：`section.key` → 类型化值，按书写顺序保存
///
/// 顺序本身没有语义，只是让诊断输出与配置文件的书写顺序一致。
pub type ParameterMap = IndexMap<String, ParameterValue>;

/// 转换为 JSON 对象，作为参数记录请求的载荷
pub fn params_to_json(params: &ParameterMap) -> serde_json::Map<String, JsonValue> {
    params.iter().map(|(k, v)| (k.clone(), v.into())).collect()
}

/// 将参数表格式化为美观的JSON字符串
///
/// 用于在提交前展示即将记录到实验运行上的参数。
///
/// # 示例
/// ```ignore
/// let mut params = ParameterMap::new();
/// params.insert("train.learning_rate".to_string(), ParameterValue::Float(0.001));
/// println!("{}", format_params_pretty(&params)?);
/// // 输出:
/// // {
/// //   "train.learning_rate": 0.001
/// // }
/// ```
pub fn format_params_pretty(params: &ParameterMap) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&params_to_json(params))
}
