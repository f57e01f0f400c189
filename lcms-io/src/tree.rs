//! 将扁平的实体列表与 id 引用还原为元素森林。

use std::collections::{HashMap, HashSet};

use tracing::debug;

use lcms_core::element::{Element, ElementIndex, ElementTree, Shape};
use lcms_core::entity::{EntitiesBlock, EntityKind, EntityRecord};
use lcms_core::errors::BuildError;
use lcms_core::projection::PlanarProjection;

/// 以 `topEntityIds` 为根构建单个动作图层的元素树。
///
/// 容器先入树再递归解析其子元素，子元素保持 `children` 中的声明顺序。
/// 引用了祖先链上已有 id 的子元素视为环，立即失败。
pub fn build_elements(
    layer: &str,
    block: &EntitiesBlock,
    projection: &dyn PlanarProjection,
) -> Result<ElementTree, BuildError> {
    let mut builder = TreeBuilder::new(layer, block, projection);
    let roots = builder.resolve_all(&block.top_entity_ids, None)?;
    builder.tree.set_roots(roots);
    Ok(builder.tree)
}

struct TreeBuilder<'a> {
    layer: &'a str,
    records: HashMap<&'a str, &'a EntityRecord>,
    projection: &'a dyn PlanarProjection,
    ancestors: HashSet<&'a str>,
    tree: ElementTree,
}

impl<'a> TreeBuilder<'a> {
    fn new(
        layer: &'a str,
        block: &'a EntitiesBlock,
        projection: &'a dyn PlanarProjection,
    ) -> Self {
        let mut records = HashMap::with_capacity(block.entity_list.len());
        for record in &block.entity_list {
            match record.entity.id.as_deref() {
                Some(id) => {
                    records.entry(id).or_insert(record);
                }
                None => debug!(
                    layer = %layer,
                    tag = %record.entity_identifier,
                    "实体缺少 id，无法被引用"
                ),
            }
        }
        Self {
            layer,
            records,
            projection,
            ancestors: HashSet::new(),
            tree: ElementTree::new(),
        }
    }

    fn resolve_all(
        &mut self,
        ids: &'a [String],
        parent: Option<ElementIndex>,
    ) -> Result<Vec<ElementIndex>, BuildError> {
        ids.iter().map(|id| self.resolve(id, parent)).collect()
    }

    fn resolve(
        &mut self,
        id: &'a str,
        parent: Option<ElementIndex>,
    ) -> Result<ElementIndex, BuildError> {
        let record = self
            .records
            .get(id)
            .copied()
            .ok_or_else(|| BuildError::MalformedReference {
                id: id.to_string(),
                layer: self.layer.to_string(),
            })?;
        let kind = EntityKind::from_tag(&record.entity_identifier).ok_or_else(|| {
            BuildError::UnsupportedEntityKind {
                tag: record.entity_identifier.clone(),
                layer: self.layer.to_string(),
            }
        })?;
        if !self.ancestors.insert(id) {
            return Err(BuildError::CyclicReference {
                id: id.to_string(),
                layer: self.layer.to_string(),
            });
        }

        let context = self.tree.symbol_context(parent);
        let shape = Shape::from_entity(kind, id, &record.entity, context, self.projection)?;
        let index = self.tree.push(Element {
            id: id.to_string(),
            layer_id: self.layer.to_string(),
            parent,
            attributes: record.entity.attribute_map(),
            shape,
        });

        if kind == EntityKind::Part {
            let children = record.entity.children.as_deref().unwrap_or_default();
            let children = self.resolve_all(children, Some(index))?;
            self.tree.attach_children(index, children);
        }

        self.ancestors.remove(id);
        Ok(index)
    }
}
