use std::collections::BTreeMap;
use std::fmt;

use glam::{DMat2, DVec2};
use serde::{Deserialize, Deserializer, Serialize};

use crate::geometry::Point2;

/// 实体块当前支持的模式版本。旧版本 20150909 仍可解析，但会产生诊断。
pub const SUPPORTED_SCHEMA_VERSION: i64 = 20161115;

/// 属性项中唯一保留的类型：文本。
pub const TEXTUAL_ATTRIBUTE_KIND: i64 = 6;

/// 实体类型标签的闭合集合。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Line,
    Rectangle,
    Arc,
    PolyArrow,
    StrokeText,
    Part,
    Image,
    PolyLine,
    Contour,
    Symbol,
}

impl EntityKind {
    pub const ALL: [EntityKind; 10] = [
        EntityKind::Line,
        EntityKind::Rectangle,
        EntityKind::Arc,
        EntityKind::PolyArrow,
        EntityKind::StrokeText,
        EntityKind::Part,
        EntityKind::Image,
        EntityKind::PolyLine,
        EntityKind::Contour,
        EntityKind::Symbol,
    ];

    /// 解析线上格式中的 `entityIdentifier`，同时接受完整类型名。
    pub fn from_tag(tag: &str) -> Option<Self> {
        let kind = match tag {
            "Lne" | "Line" => EntityKind::Line,
            "Rct" | "Rectangle" => EntityKind::Rectangle,
            "Arc" => EntityKind::Arc,
            "PAr" | "PolyArrow" => EntityKind::PolyArrow,
            "STx" | "StrokeText" => EntityKind::StrokeText,
            "Prt" | "Part" => EntityKind::Part,
            "Img" | "Image" => EntityKind::Image,
            "PLn" | "PolyLine" => EntityKind::PolyLine,
            "Spl" | "Contour" => EntityKind::Contour,
            "Syn" | "Symbol" => EntityKind::Symbol,
            _ => return None,
        };
        Some(kind)
    }

    pub fn tag(self) -> &'static str {
        match self {
            EntityKind::Line => "Lne",
            EntityKind::Rectangle => "Rct",
            EntityKind::Arc => "Arc",
            EntityKind::PolyArrow => "PAr",
            EntityKind::StrokeText => "STx",
            EntityKind::Part => "Prt",
            EntityKind::Image => "Img",
            EntityKind::PolyLine => "PLn",
            EntityKind::Contour => "Spl",
            EntityKind::Symbol => "Syn",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// 线上格式中的 `{x, y}` 坐标，x 为经度、y 为纬度。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawPoint {
    pub x: f64,
    pub y: f64,
}

impl From<RawPoint> for Point2 {
    fn from(value: RawPoint) -> Self {
        Point2::new(value.x, value.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransformMatrix {
    pub m00: f64,
    pub m10: f64,
    pub m01: f64,
    pub m11: f64,
}

impl TransformMatrix {
    pub fn to_mat2(self) -> DMat2 {
        DMat2::from_cols(DVec2::new(self.m00, self.m10), DVec2::new(self.m01, self.m11))
    }
}

/// 缺省时按单位矩阵处理。
pub fn linear_or_identity(transform: Option<TransformMatrix>) -> DMat2 {
    transform.map_or(DMat2::IDENTITY, TransformMatrix::to_mat2)
}

/// `pixelScale` 在不同版本中以布尔值或数值出现。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PixelScale {
    Flag(bool),
    Factor(f64),
}

impl PixelScale {
    pub fn value(self) -> f64 {
        match self {
            PixelScale::Flag(true) => 1.0,
            PixelScale::Flag(false) => 0.0,
            PixelScale::Factor(factor) => factor,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower_left: Option<RawPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper_right: Option<RawPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<TransformMatrix>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alpha: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color1: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillType {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paint: Option<Paint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextStyle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balloon_type: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balloon_fill_type: Option<FillType>,
}

impl TextStyle {
    pub fn has_balloon(&self) -> bool {
        self.balloon_type.is_some_and(|kind| kind != 0.0)
    }

    pub fn balloon_color(&self) -> Option<i64> {
        self.balloon_fill_type
            .as_ref()
            .and_then(|fill| fill.paint.as_ref())
            .and_then(|paint| paint.color1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<TextStyle>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeItem {
    #[serde(rename = "type")]
    pub kind: i64,
    pub name: String,
    /// 只保留字符串值；其他类型的值读作 None。
    #[serde(
        default,
        deserialize_with = "string_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub attribute_value: Option<String>,
}

fn string_value<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum AnyValue {
        Text(String),
        Other(serde::de::IgnoredAny),
    }

    Ok(match Option::<AnyValue>::deserialize(deserializer)? {
        Some(AnyValue::Text(text)) => Some(text),
        Some(AnyValue::Other(_)) | None => None,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeGroup {
    pub name: String,
    #[serde(default)]
    pub attribute_items: Vec<AttributeItem>,
}

/// 单个绘图图元的原始记录，解析后不再修改。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub point1: Option<RawPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub point2: Option<RawPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub point_list: Option<Vec<RawPoint>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<TransformMatrix>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<RawPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pixel_scale: Option<PixelScale>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<SymbolRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<TextBlock>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<AttributeGroup>,
}

impl Entity {
    pub fn points(&self) -> Option<Vec<Point2>> {
        self.point_list
            .as_ref()
            .map(|points| points.iter().copied().map(Point2::from).collect())
    }

    /// 将属性组压平为 `名称 → 文本值`；只保留文本类型且值非空的项，后出现者覆盖先出现者。
    pub fn attribute_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        for group in &self.attributes {
            for item in &group.attribute_items {
                if item.kind != TEXTUAL_ATTRIBUTE_KIND {
                    continue;
                }
                match item.attribute_value.as_deref() {
                    Some(value) if !value.is_empty() => {
                        map.insert(item.name.clone(), value.to_string());
                    }
                    _ => {}
                }
            }
        }
        map
    }
}

/// `entityList` 中的一项：类型标签 + 实体本体。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRecord {
    pub entity_identifier: String,
    pub entity: Entity,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitiesBlock {
    #[serde(default)]
    pub version: Option<i64>,
    #[serde(default)]
    pub top_entity_ids: Vec<String>,
    #[serde(default)]
    pub entity_list: Vec<EntityRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_round_trips_through_its_tag() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(EntityKind::from_tag("Contour"), Some(EntityKind::Contour));
        assert_eq!(EntityKind::from_tag("Xyz"), None);
    }

    #[test]
    fn attribute_map_keeps_only_textual_items() {
        let entity: Entity = serde_json::from_str(
            r#"{
                "id": "e1",
                "attributes": [
                    { "name": "symbol", "attributeItems": [
                        { "type": 6, "name": "type", "attributeValue": "brandweer" },
                        { "type": 3, "name": "count", "attributeValue": "4" },
                        { "type": 6, "name": "empty", "attributeValue": "" }
                    ]},
                    { "name": "extra", "attributeItems": [
                        { "type": 6, "name": "type", "attributeValue": "politie" },
                        { "type": 6, "name": "owner" }
                    ]}
                ]
            }"#,
        )
        .expect("parse entity");
        let map = entity.attribute_map();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("type").map(String::as_str), Some("politie"));
    }

    #[test]
    fn non_string_attribute_values_do_not_fail_the_entity() {
        let entity: Entity = serde_json::from_str(
            r#"{
                "id": "L1",
                "attributes": [
                    { "name": "weg", "attributeItems": [
                        { "type": 3, "name": "count", "attributeValue": 4 },
                        { "type": 5, "name": "flags", "attributeValue": { "a": [1, 2] } },
                        { "type": 6, "name": "number", "attributeValue": 7 },
                        { "type": 6, "name": "status", "attributeValue": "open" }
                    ]}
                ]
            }"#,
        )
        .expect("非文本属性值不应导致解析失败");
        let map = entity.attribute_map();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("status").map(String::as_str), Some("open"));
    }

    #[test]
    fn pixel_scale_accepts_flag_and_number() {
        let flag: PixelScale = serde_json::from_str("true").unwrap();
        let factor: PixelScale = serde_json::from_str("2.5").unwrap();
        assert_eq!(flag.value(), 1.0);
        assert_eq!(factor.value(), 2.5);
    }

    #[test]
    fn balloon_requires_non_zero_type() {
        let style: TextStyle = serde_json::from_str(
            r#"{ "balloonType": 0, "balloonFillType": { "paint": { "color1": 255 } } }"#,
        )
        .unwrap();
        assert!(!style.has_balloon());
        assert_eq!(style.balloon_color(), Some(255));
    }
}
