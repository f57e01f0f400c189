//! 输出用的 GeoJSON 子集：只有 Point 与 Polygon 两种几何。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use lcms_core::geometry::Point2;

use crate::errors::EngineError;

/// 标题 → 命名要素集。
pub type LayerMap = BTreeMap<String, NamedFeatureCollection>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point([f64; 2]),
    Polygon(Vec<Vec<[f64; 2]>>),
}

impl Geometry {
    pub fn point(point: Point2) -> Self {
        Geometry::Point(point.to_array())
    }

    /// 单环多边形，坐标按原顺序输出，不补闭合点。
    pub fn polygon(ring: &[Point2]) -> Self {
        Geometry::Polygon(vec![ring.iter().map(|p| p.to_array()).collect()])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub struct Feature {
    pub id: String,
    pub geometry: Geometry,
    pub properties: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionProperties {
    pub guid: String,
    pub name: String,
}

/// 一个主题图层对应的要素集，`properties.name` 即其标题。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedFeatureCollection {
    pub properties: CollectionProperties,
    pub geojson: FeatureCollection,
}

impl NamedFeatureCollection {
    pub fn new(guid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            properties: CollectionProperties {
                guid: guid.into(),
                name: name.into(),
            },
            geojson: FeatureCollection::default(),
        }
    }

    #[inline]
    pub fn title(&self) -> &str {
        &self.properties.name
    }

    #[inline]
    pub fn features(&self) -> &[Feature] {
        &self.geojson.features
    }

    /// 规范 JSON 的 SHA-256（小写十六进制），供发布端去重。
    pub fn change_key(&self) -> Result<String, EngineError> {
        let bytes = serde_json::to_vec(self)?;
        Ok(format!("{:x}", Sha256::digest(&bytes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn feature_serializes_as_geojson() {
        let mut properties = Map::new();
        properties.insert("id".to_string(), json!("L1"));
        let feature = Feature {
            id: "L1".to_string(),
            geometry: Geometry::polygon(&[
                Point2::new(5.0, 52.0),
                Point2::new(5.1, 52.1),
                Point2::new(5.0, 52.0),
            ]),
            properties,
        };
        let value = serde_json::to_value(&feature).expect("serialize feature");
        assert_eq!(
            value,
            json!({
                "type": "Feature",
                "id": "L1",
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[5.0, 52.0], [5.1, 52.1], [5.0, 52.0]]]
                },
                "properties": { "id": "L1" }
            })
        );

        let point = serde_json::to_value(Geometry::point(Point2::new(4.5, 51.5))).unwrap();
        assert_eq!(point, json!({ "type": "Point", "coordinates": [4.5, 51.5] }));
    }

    #[test]
    fn change_key_is_stable_and_content_sensitive() {
        let first = NamedFeatureCollection::new("T1", "LCMS: Roads (1)");
        let second = NamedFeatureCollection::new("T1", "LCMS: Roads (1)");
        let other = NamedFeatureCollection::new("T1", "LCMS: Roads (2)");

        let key = first.change_key().expect("hash collection");
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(key, second.change_key().unwrap());
        assert_ne!(key, other.change_key().unwrap());

        let value = serde_json::to_value(&first).unwrap();
        assert_eq!(value["geojson"]["type"], "FeatureCollection");
        assert_eq!(value["properties"]["guid"], "T1");
    }
}
