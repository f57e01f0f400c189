//! 单个元素到 GeoJSON 要素的转换。每个元素至多产生一个要素。

use serde_json::{Map, Value};

use lcms_core::element::{ElementIndex, ElementTree, Shape};

use crate::geojson::{Feature, Geometry};
use crate::symbols::IconResolver;

/// 容器与缺少几何的元素返回 None。Symbol 会顺带触发图标调度。
pub fn element_feature(
    tree: &ElementTree,
    index: ElementIndex,
    icons: &IconResolver,
) -> Option<Feature> {
    let element = tree.get(index)?;
    let mut properties = Map::new();
    properties.insert("id".to_string(), Value::String(element.id.clone()));

    let geometry = match &element.shape {
        Shape::Part(_) => return None,
        Shape::Symbol(symbol) => {
            let origin = symbol.origin?;
            if let Some(parent) = tree.parent(index) {
                extend(&mut properties, &parent.attributes);
            }
            extend(&mut properties, &element.attributes);
            if let Some(symbol_id) = symbol.symbol_id.as_deref() {
                properties.insert("icon".to_string(), Value::from(symbol_id));
                icons.ensure_icon(symbol, &element.layer_id);
            }
            properties.insert("Name".to_string(), Value::from(symbol.label.as_str()));
            Geometry::point(origin)
        }
        shape => {
            let ring = shape.ring()?;
            extend(&mut properties, &element.attributes);
            Geometry::polygon(&ring)
        }
    };

    Some(Feature {
        id: element.id.clone(),
        geometry,
        properties,
    })
}

fn extend<'a>(
    properties: &mut Map<String, Value>,
    attributes: impl IntoIterator<Item = (&'a String, &'a String)>,
) {
    for (name, value) in attributes {
        properties.insert(name.clone(), Value::String(value.clone()));
    }
}
