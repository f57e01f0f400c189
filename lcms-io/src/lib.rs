use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use lcms_core::element::ElementTree;
use lcms_core::entity::SUPPORTED_SCHEMA_VERSION;
use lcms_core::errors::BuildError;
use lcms_core::layer::{ActionLayer, Diagnostic, Drawing, TopicLayer};
use lcms_core::projection::RdNewProjection;

pub mod raw;
pub mod tree;

use raw::{RawActionLayer, RawDrawing, RawTopicLayer};

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to read file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid drawing JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to resolve drawing `{drawing}`: {source}")]
    Build {
        drawing: String,
        #[source]
        source: BuildError,
    },
    #[error("expected exactly one drawing in {path:?}, found {count}")]
    DocumentCount { path: PathBuf, count: usize },
}

pub trait DrawingLoader {
    fn load(&self, path: &Path) -> Result<Drawing, DecodeError>;
}

/// 读取文件并拆分出其中的全部图纸文档。
pub fn read_documents(path: &Path) -> Result<Vec<Value>, DecodeError> {
    let data = fs::read_to_string(path).map_err(|source| DecodeError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let value: Value = serde_json::from_str(&data)?;
    Ok(split_documents(value))
}

/// 输入可以是单个图纸、`{ "drawing": {...} }` 包装，或二者组成的数组。
pub fn split_documents(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.into_iter().flat_map(split_documents).collect(),
        Value::Object(mut map)
            if !map.contains_key("topicLayers")
                && map.get("drawing").is_some_and(Value::is_object) =>
        {
            map.remove("drawing").into_iter().collect()
        }
        other => vec![other],
    }
}

/// JSON 图纸解码器。投影参数在构造时计算一次。
#[derive(Debug, Clone, Default)]
pub struct JsonDrawingDecoder {
    projection: RdNewProjection,
}

impl JsonDrawingDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode_str(&self, text: &str) -> Result<Drawing, DecodeError> {
        let raw: RawDrawing = serde_json::from_str(text)?;
        self.decode_raw(raw)
    }

    pub fn decode_value(&self, value: &Value) -> Result<Drawing, DecodeError> {
        let raw = RawDrawing::deserialize(value)?;
        self.decode_raw(raw)
    }

    fn decode_raw(&self, raw: RawDrawing) -> Result<Drawing, DecodeError> {
        let mut drawing = Drawing::new(raw.id, raw.name);
        drawing.start_time = raw.start_time;
        drawing.last_change = raw.last_change;
        drawing.projection = raw.projection;

        for topic in raw.topic_layers {
            let layer = self.decode_topic(topic, &mut drawing)?;
            drawing.push_topic_layer(layer);
        }

        info!(
            drawing = %drawing.id,
            topics = drawing.topic_layers().len(),
            elements = drawing.element_count(),
            diagnostics = drawing.diagnostics().len(),
            "图纸解码完成"
        );
        Ok(drawing)
    }

    fn decode_topic(
        &self,
        topic: RawTopicLayer,
        drawing: &mut Drawing,
    ) -> Result<TopicLayer, DecodeError> {
        let mut layer = TopicLayer {
            id: topic.id,
            name: topic.name,
            z_level: topic.z_level.map_or(0, |z| z as i64),
            removed: topic.removed,
            action_layers: Vec::new(),
        };
        // 已删除的动作图层不参与元素解析
        for action in topic.action_layers.into_iter().filter(|action| !action.removed) {
            let action = self.decode_action(action, drawing)?;
            layer.action_layers.push(action);
        }
        Ok(layer)
    }

    fn decode_action(
        &self,
        action: RawActionLayer,
        drawing: &mut Drawing,
    ) -> Result<ActionLayer, DecodeError> {
        let schema_version = action.entities.as_ref().and_then(|block| block.version);
        if let Some(found) = schema_version.filter(|v| *v != SUPPORTED_SCHEMA_VERSION) {
            warn!(
                layer = %action.id,
                name = %action.name,
                found,
                expected = SUPPORTED_SCHEMA_VERSION,
                "实体块版本不受支持，仍按当前版本解析"
            );
            drawing.push_diagnostic(Diagnostic::SchemaVersionMismatch {
                layer: action.id.clone(),
                found,
                expected: SUPPORTED_SCHEMA_VERSION,
            });
        }

        let elements = match action.entities.as_ref() {
            Some(block) => tree::build_elements(&action.id, block, &self.projection).map_err(
                |source| DecodeError::Build {
                    drawing: drawing.id.clone(),
                    source,
                },
            )?,
            None => ElementTree::new(),
        };

        Ok(ActionLayer {
            id: action.id,
            name: action.name,
            version: action.version,
            removed: action.removed,
            show_initially: action.show_initially,
            z_level: action.z_level.map_or(0, |z| z as i64),
            schema_version,
            elements,
        })
    }
}

impl DrawingLoader for JsonDrawingDecoder {
    fn load(&self, path: &Path) -> Result<Drawing, DecodeError> {
        let mut documents = read_documents(path)?;
        if documents.len() != 1 {
            return Err(DecodeError::DocumentCount {
                path: path.to_path_buf(),
                count: documents.len(),
            });
        }
        let document = documents.remove(0);
        self.decode_value(&document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn split_unwraps_wrappers_and_arrays() {
        let value = json!([
            { "drawing": { "id": "D1", "topicLayers": [] } },
            { "id": "D2", "topicLayers": [] },
            [ { "id": "D3" } ]
        ]);
        let documents = split_documents(value);
        let ids: Vec<_> = documents.iter().map(|d| d["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["D1", "D2", "D3"]);
    }

    #[test]
    fn object_with_topic_layers_is_not_unwrapped() {
        let value = json!({ "id": "D1", "topicLayers": [], "drawing": { "id": "inner" } });
        let documents = split_documents(value);
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0]["id"], "D1");
    }

    #[test]
    fn removed_action_layers_are_dropped_before_resolution() {
        // 已删除图层中的坏引用不应触发错误
        let value = json!({
            "id": "D1",
            "topicLayers": [{
                "id": "T1", "name": "Roads",
                "actionLayers": [
                    { "id": "AL1", "removed": true,
                      "entities": { "version": 20161115, "topEntityIds": ["ghost"], "entityList": [] } },
                    { "id": "AL2" }
                ]
            }]
        });
        let drawing = JsonDrawingDecoder::new()
            .decode_value(&value)
            .expect("decode drawing");
        let topic = drawing.topic_layer("T1").expect("topic layer");
        assert_eq!(topic.action_layers.len(), 1);
        assert_eq!(topic.action_layers[0].id, "AL2");
        assert!(topic.action_layers[0].elements.is_empty());
    }
}
