pub mod errors {
    use std::path::PathBuf;

    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum EngineError {
        #[error("failed to serialize feature collection: {0}")]
        Serialize(#[from] serde_json::Error),
    }

    /// 图标下载失败。只写日志，不影响要素输出。
    #[derive(Debug, Error)]
    pub enum DownloadFailure {
        #[cfg(feature = "http")]
        #[error("failed to build HTTP client: {source}")]
        Client {
            #[source]
            source: reqwest::Error,
        },
        #[cfg(feature = "http")]
        #[error("request to {url} failed: {source}")]
        Request {
            url: String,
            #[source]
            source: reqwest::Error,
        },
        #[error("{url} answered with status {status}")]
        Status { url: String, status: u16 },
        #[error("failed to write icon {path:?}: {source}")]
        Write {
            path: PathBuf,
            #[source]
            source: std::io::Error,
        },
    }
}

pub mod convert;
pub mod feature;
pub mod geojson;
pub mod symbols;

pub use convert::{BatchFailure, BatchReport, Converter, layer_title};
pub use geojson::{Feature, FeatureCollection, Geometry, LayerMap, NamedFeatureCollection};
pub use symbols::{IconFetcher, IconRequest, IconResolver, SkipFetcher, SymbolRegistry};
