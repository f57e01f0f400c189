use std::collections::HashMap;
use std::fmt;

use crate::element::{Element, ElementIndex, ElementTree};

/// 解码过程中发现但不致命的问题。
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    SchemaVersionMismatch {
        layer: String,
        found: i64,
        expected: i64,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::SchemaVersionMismatch {
                layer,
                found,
                expected,
            } => write!(
                f,
                "action layer `{layer}` declares entities version {found}, expected {expected}"
            ),
        }
    }
}

/// 动作图层：一棵已解析的元素森林。已删除的动作图层在构建主题图层时就被丢弃。
#[derive(Debug, Clone, Default)]
pub struct ActionLayer {
    pub id: String,
    pub name: String,
    pub version: String,
    pub removed: bool,
    pub show_initially: bool,
    pub z_level: i64,
    pub schema_version: Option<i64>,
    pub elements: ElementTree,
}

impl ActionLayer {
    /// 按 `topEntityIds` 顺序的顶层元素。
    pub fn roots(&self) -> impl Iterator<Item = (ElementIndex, &Element)> {
        self.elements
            .roots()
            .iter()
            .map(|index| (*index, &self.elements[*index]))
    }
}

#[derive(Debug, Clone, Default)]
pub struct TopicLayer {
    pub id: String,
    pub name: String,
    pub z_level: i64,
    pub removed: bool,
    pub action_layers: Vec<ActionLayer>,
}

impl TopicLayer {
    /// 名称为空时退回到标识。
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// 单次解码得到的完整图纸。主题图层索引在构造时一次性建立，之后不再变化。
#[derive(Debug, Clone, Default)]
pub struct Drawing {
    pub id: String,
    pub name: String,
    pub start_time: Option<String>,
    pub last_change: Option<String>,
    pub projection: Option<String>,
    topic_layers: Vec<TopicLayer>,
    index: HashMap<String, usize>,
    diagnostics: Vec<Diagnostic>,
}

impl Drawing {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// 追加主题图层；重复标识只保留第一次出现的索引。
    pub fn push_topic_layer(&mut self, layer: TopicLayer) {
        let position = self.topic_layers.len();
        self.index.entry(layer.id.clone()).or_insert(position);
        self.topic_layers.push(layer);
    }

    pub fn push_diagnostic(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn topic_layer(&self, id: &str) -> Option<&TopicLayer> {
        self.index
            .get(id)
            .and_then(|position| self.topic_layers.get(*position))
    }

    #[inline]
    pub fn topic_layers(&self) -> &[TopicLayer] {
        &self.topic_layers
    }

    #[inline]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn element_count(&self) -> usize {
        self.topic_layers
            .iter()
            .flat_map(|topic| topic.action_layers.iter())
            .map(|action| action.elements.len())
            .sum()
    }
}
