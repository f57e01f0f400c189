pub mod geometry;
pub mod projection;
pub mod entity;
pub mod element;
pub mod layer;

pub mod errors {
    use thiserror::Error;

    #[derive(Debug, Clone, PartialEq, Error)]
    pub enum ProjectionError {
        #[error("non-finite coordinate ({x}, {y})")]
        NonFinite { x: f64, y: f64 },
    }

    /// 元素树构建失败。任一元素出错都会使整张图纸的解码失败。
    #[derive(Debug, Error)]
    pub enum BuildError {
        #[error("entity `{id}` referenced in action layer `{layer}` does not exist")]
        MalformedReference { id: String, layer: String },
        #[error("unsupported entity type `{tag}` in action layer `{layer}`")]
        UnsupportedEntityKind { tag: String, layer: String },
        #[error("entity `{id}` in action layer `{layer}` is its own ancestor")]
        CyclicReference { id: String, layer: String },
        #[error("entity `{id}` is missing required geometry `{field}`")]
        MissingGeometry { id: String, field: &'static str },
        #[error(transparent)]
        Projection(#[from] ProjectionError),
    }
}
