//! 线上 JSON 结构。只描述解码需要的字段，未知字段一律忽略。

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use lcms_core::entity::EntitiesBlock;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDrawing {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, rename = "starttime", deserialize_with = "lenient_opt_string")]
    pub start_time: Option<String>,
    #[serde(default, rename = "lastchange", deserialize_with = "lenient_opt_string")]
    pub last_change: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub projection: Option<String>,
    #[serde(default)]
    pub topic_layers: Vec<RawTopicLayer>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTopicLayer {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default)]
    pub z_level: Option<f64>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub removed: bool,
    #[serde(default)]
    pub action_layers: Vec<RawActionLayer>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawActionLayer {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub version: String,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub removed: bool,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub show_initially: bool,
    #[serde(default)]
    pub z_level: Option<f64>,
    #[serde(default)]
    pub entities: Option<EntitiesBlock>,
}

/// 标识、版本与时间戳在不同来源中可能是字符串也可能是数字。
fn lenient_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => Some(text),
        Some(other) => Some(other.to_string()),
    })
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    lenient_opt_string(deserializer).map(Option::unwrap_or_default)
}

/// `null` 或非布尔值按 false 处理。
fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(matches!(
        Option::<Value>::deserialize(deserializer)?,
        Some(Value::Bool(true))
    ))
}
