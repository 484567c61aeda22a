//! 通用配置文档模型
//!
//! 片段在合并、密钥解析阶段都以带标签的树结构表示，
//! 只有到绑定阶段才会解码为强类型的 [`Config`](crate::config::Config)。

use serde::Serialize;
use std::collections::BTreeMap;

/// 按键排序的映射节点
pub type Mapping = BTreeMap<String, Value>;

/// 文档节点
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// 标量叶子
    Scalar(Scalar),
    /// 嵌套映射
    Mapping(Mapping),
    /// 序列，合并时整体替换
    Sequence(Vec<Value>),
}

/// 标量值
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
}

impl Value {
    /// 构造字符串叶子
    pub fn string(value: impl Into<String>) -> Self {
        Value::Scalar(Scalar::String(value.into()))
    }

    /// 取字符串叶子
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Scalar(Scalar::String(s)) => Some(s),
            _ => None,
        }
    }

    /// 取映射节点
    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            Value::Mapping(m) => Some(m),
            _ => None,
        }
    }

    /// 按点分路径查找节点，例如 `database.connectionUrl.value`
    pub fn pointer(&self, dotted: &str) -> Option<&Value> {
        dotted
            .split('.')
            .try_fold(self, |node, key| node.as_mapping()?.get(key))
    }
}

/// 转换失败时返回的描述
pub type ConversionError = String;

/// 把映射键转换为字符串；YAML 允许非字符串键，标量键会被字符串化
fn scalar_key(value: &serde_yaml::Value) -> Result<String, ConversionError> {
    match value {
        serde_yaml::Value::String(s) => Ok(s.clone()),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::Null => Ok("null".to_string()),
        other => Err(format!("不支持的映射键: {other:?}")),
    }
}

fn yaml_number(n: &serde_yaml::Number) -> Scalar {
    let number = if let Some(i) = n.as_i64() {
        Some(serde_json::Number::from(i))
    } else if let Some(u) = n.as_u64() {
        Some(serde_json::Number::from(u))
    } else {
        n.as_f64().and_then(serde_json::Number::from_f64)
    };

    match number {
        Some(number) => Scalar::Number(number),
        // NaN / inf 无法用 JSON 数字表示
        None => Scalar::String(n.to_string()),
    }
}

impl TryFrom<serde_yaml::Value> for Value {
    type Error = ConversionError;

    fn try_from(value: serde_yaml::Value) -> Result<Self, Self::Error> {
        Ok(match value {
            serde_yaml::Value::Null => Value::Scalar(Scalar::Null),
            serde_yaml::Value::Bool(b) => Value::Scalar(Scalar::Bool(b)),
            serde_yaml::Value::Number(n) => Value::Scalar(yaml_number(&n)),
            serde_yaml::Value::String(s) => Value::Scalar(Scalar::String(s)),
            serde_yaml::Value::Sequence(items) => Value::Sequence(
                items
                    .into_iter()
                    .map(Value::try_from)
                    .collect::<Result<_, _>>()?,
            ),
            serde_yaml::Value::Mapping(map) => {
                let mut mapping = Mapping::new();
                for (key, value) in map {
                    mapping.insert(scalar_key(&key)?, Value::try_from(value)?);
                }
                Value::Mapping(mapping)
            }
            serde_yaml::Value::Tagged(tagged) => Value::try_from(tagged.value)?,
        })
    }
}

impl From<toml::Value> for Value {
    fn from(value: toml::Value) -> Self {
        match value {
            toml::Value::String(s) => Value::Scalar(Scalar::String(s)),
            toml::Value::Integer(i) => Value::Scalar(Scalar::Number(i.into())),
            toml::Value::Float(f) => match serde_json::Number::from_f64(f) {
                Some(n) => Value::Scalar(Scalar::Number(n)),
                None => Value::Scalar(Scalar::String(f.to_string())),
            },
            toml::Value::Boolean(b) => Value::Scalar(Scalar::Bool(b)),
            toml::Value::Datetime(dt) => Value::Scalar(Scalar::String(dt.to_string())),
            toml::Value::Array(items) => {
                Value::Sequence(items.into_iter().map(Value::from).collect())
            }
            toml::Value::Table(table) => Value::Mapping(
                table
                    .into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Scalar(Scalar::Null),
            serde_json::Value::Bool(b) => Value::Scalar(Scalar::Bool(b)),
            serde_json::Value::Number(n) => Value::Scalar(Scalar::Number(n)),
            serde_json::Value::String(s) => Value::Scalar(Scalar::String(s)),
            serde_json::Value::Array(items) => {
                Value::Sequence(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Mapping(
                map.into_iter().map(|(k, v)| (k, Value::from(v))).collect(),
            ),
        }
    }
}
