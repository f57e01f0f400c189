use serde_json::Value;
use tracing::{debug, info, warn};

use lcms_core::layer::Drawing;
use lcms_io::{DecodeError, JsonDrawingDecoder};

use crate::feature::element_feature;
use crate::geojson::{LayerMap, NamedFeatureCollection};
use crate::symbols::IconResolver;

/// `LCMS: {名称或 id} ({序号})`
pub fn layer_title(name: &str, index: usize) -> String {
    format!("LCMS: {name} ({index})")
}

/// 批量转换中单张图纸的失败记录。
#[derive(Debug)]
pub struct BatchFailure {
    /// 从 1 开始的图纸序号。
    pub index: usize,
    pub error: DecodeError,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub layers: LayerMap,
    pub failures: Vec<BatchFailure>,
}

impl BatchReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// 图纸到命名要素集的聚合器。
#[derive(Debug, Clone)]
pub struct Converter {
    decoder: JsonDrawingDecoder,
    icons: IconResolver,
}

impl Converter {
    pub fn new(icons: IconResolver) -> Self {
        Self {
            decoder: JsonDrawingDecoder::new(),
            icons,
        }
    }

    /// 每个 id 非空的主题图层生成一个要素集；`index` 从 1 开始。
    pub fn convert(&self, drawing: &Drawing, index: usize) -> LayerMap {
        let mut layers = LayerMap::new();
        self.convert_into(drawing, index, &mut layers);
        layers
    }

    /// 逐张独立解码与转换；解码失败的图纸不产生任何输出。
    pub fn convert_batch(&self, documents: &[Value]) -> BatchReport {
        let mut report = BatchReport::default();
        for (position, document) in documents.iter().enumerate() {
            let index = position + 1;
            match self.decoder.decode_value(document) {
                Ok(drawing) => self.convert_into(&drawing, index, &mut report.layers),
                Err(error) => {
                    warn!(index, error = %error, "图纸解码失败，跳过");
                    report.failures.push(BatchFailure { index, error });
                }
            }
        }
        info!(
            drawings = documents.len(),
            layers = report.layers.len(),
            failures = report.failures.len(),
            "批量转换完成"
        );
        report
    }

    fn convert_into(&self, drawing: &Drawing, index: usize, layers: &mut LayerMap) {
        for topic in drawing.topic_layers() {
            if topic.id.is_empty() {
                debug!(drawing = %drawing.id, "主题图层缺少 id，跳过");
                continue;
            }
            let title = layer_title(topic.display_name(), index);
            let mut collection = NamedFeatureCollection::new(topic.id.clone(), title.clone());
            for action in &topic.action_layers {
                // 容器递归展开为叶子；非容器自身即叶子
                for root in action.elements.roots() {
                    collection.geojson.features.extend(
                        action
                            .elements
                            .leaves(*root)
                            .into_iter()
                            .filter_map(|leaf| element_feature(&action.elements, leaf, &self.icons)),
                    );
                }
            }
            debug!(
                title = %title,
                features = collection.features().len(),
                "主题图层转换完成"
            );
            if let Some(replaced) = layers.insert(title.clone(), collection) {
                warn!(
                    title = %title,
                    layer = %topic.id,
                    replaced = %replaced.properties.guid,
                    "标题重复，以后出现的要素集为准"
                );
            }
        }
    }
}
