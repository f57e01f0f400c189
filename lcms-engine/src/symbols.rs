//! 符号图标的去重与下载调度。
//!
//! 同一符号 id 在进程生命周期内只调度一次下载；本地已有同名文件时不下载。
//! 下载本身由 `IconFetcher` 完成，不阻塞要素生成。

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, warn};

use lcms_core::element::SymbolShape;

/// 已见过的符号 id 集合。由宿主持有并通过 `Arc` 共享。
#[derive(Debug, Default)]
pub struct SymbolRegistry {
    seen: Mutex<HashSet<String>>,
}

impl SymbolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 原子地检查并插入；首次出现时返回 true。
    pub fn mark_seen(&self, symbol_id: &str) -> bool {
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        seen.insert(symbol_id.to_string())
    }

    pub fn contains(&self, symbol_id: &str) -> bool {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(symbol_id)
    }

    pub fn len(&self) -> usize {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconRequest {
    pub symbol_id: String,
    pub local_path: PathBuf,
    pub url: String,
}

/// 发起一次不等待结果的下载。失败只记录日志，不影响几何输出。
pub trait IconFetcher: Send + Sync {
    fn fetch(&self, request: IconRequest);

    /// 等待已调度的下载结束。
    fn wait_idle(&self) {}
}

/// 不下载，只记录请求。
#[derive(Debug, Clone, Copy, Default)]
pub struct SkipFetcher;

impl IconFetcher for SkipFetcher {
    fn fetch(&self, request: IconRequest) {
        debug!(
            symbol = %request.symbol_id,
            url = %request.url,
            "已关闭图标下载，跳过"
        );
    }
}

/// 符号 id 必须是单个普通文件名，才能作为图标目录下的文件名使用。
fn is_plain_file_name(symbol_id: &str) -> bool {
    let mut components = Path::new(symbol_id).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(name)), None) if name == symbol_id
    )
}

/// `<base_url>/drawing/symbol?data={...}`
pub fn symbol_url(base_url: &str, symbol_id: &str, layer_id: &str) -> String {
    format!(
        r#"{base_url}/drawing/symbol?data={{"imageId":"{symbol_id}","hostActivityId":"{layer_id}","activityId":"{layer_id}"}}"#
    )
}

/// 将符号解析为本地图标路径，并在需要时调度下载。
#[derive(Clone)]
pub struct IconResolver {
    registry: Arc<SymbolRegistry>,
    fetcher: Arc<dyn IconFetcher>,
    image_folder: PathBuf,
    base_url: String,
}

impl IconResolver {
    pub fn new(
        registry: Arc<SymbolRegistry>,
        fetcher: Arc<dyn IconFetcher>,
        image_folder: impl Into<PathBuf>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            fetcher,
            image_folder: image_folder.into(),
            base_url: base_url.into(),
        }
    }

    /// 不下载任何图标的解析器，注册表独立。
    pub fn offline(image_folder: impl Into<PathBuf>) -> Self {
        Self::new(
            Arc::new(SymbolRegistry::new()),
            Arc::new(SkipFetcher),
            image_folder,
            String::new(),
        )
    }

    pub fn registry(&self) -> &Arc<SymbolRegistry> {
        &self.registry
    }

    pub fn wait_idle(&self) {
        self.fetcher.wait_idle();
    }

    /// 首次遇到该符号 id 且本地缺少图标文件时调度一次下载。
    pub fn ensure_icon(&self, symbol: &SymbolShape, layer_id: &str) {
        let Some(symbol_id) = symbol.symbol_id.as_deref() else {
            return;
        };
        if !self.registry.mark_seen(symbol_id) {
            return;
        }
        if !is_plain_file_name(symbol_id) {
            warn!(symbol = %symbol_id, "符号 id 不是合法文件名，跳过图标下载");
            return;
        }
        let local_path = self.image_folder.join(symbol_id);
        if local_path.exists() {
            debug!(symbol = %symbol_id, path = %local_path.display(), "图标已存在");
            return;
        }
        let url = symbol
            .download_location
            .clone()
            .unwrap_or_else(|| symbol_url(&self.base_url, symbol_id, layer_id));
        self.fetcher.fetch(IconRequest {
            symbol_id: symbol_id.to_string(),
            local_path,
            url,
        });
    }
}

impl std::fmt::Debug for IconResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IconResolver")
            .field("registry", &self.registry)
            .field("image_folder", &self.image_folder)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "http")]
pub use http::HttpIconFetcher;

#[cfg(feature = "http")]
mod http {
    use std::fs;
    use std::sync::{Arc, Mutex, PoisonError};
    use std::thread::{self, JoinHandle};
    use std::time::Duration;

    use tracing::{info, warn};

    use super::{IconFetcher, IconRequest};
    use crate::errors::DownloadFailure;

    /// 每个请求一个线程，阻塞式 HTTP 客户端。
    #[derive(Debug, Clone)]
    pub struct HttpIconFetcher {
        client: reqwest::blocking::Client,
        pending: Arc<Mutex<Vec<JoinHandle<()>>>>,
    }

    impl HttpIconFetcher {
        pub fn new(timeout: Duration) -> Result<Self, DownloadFailure> {
            let client = reqwest::blocking::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|source| DownloadFailure::Client { source })?;
            Ok(Self {
                client,
                pending: Arc::new(Mutex::new(Vec::new())),
            })
        }

        fn download(
            client: &reqwest::blocking::Client,
            request: &IconRequest,
        ) -> Result<u64, DownloadFailure> {
            let response = client
                .get(&request.url)
                .send()
                .map_err(|source| DownloadFailure::Request {
                    url: request.url.clone(),
                    source,
                })?;
            if !response.status().is_success() {
                return Err(DownloadFailure::Status {
                    url: request.url.clone(),
                    status: response.status().as_u16(),
                });
            }
            let bytes = response.bytes().map_err(|source| DownloadFailure::Request {
                url: request.url.clone(),
                source,
            })?;
            fs::write(&request.local_path, &bytes).map_err(|source| DownloadFailure::Write {
                path: request.local_path.clone(),
                source,
            })?;
            Ok(bytes.len() as u64)
        }
    }

    impl IconFetcher for HttpIconFetcher {
        fn fetch(&self, request: IconRequest) {
            let client = self.client.clone();
            let handle = thread::spawn(move || match Self::download(&client, &request) {
                Ok(size) => info!(
                    symbol = %request.symbol_id,
                    path = %request.local_path.display(),
                    size,
                    "图标下载完成"
                ),
                Err(err) => warn!(symbol = %request.symbol_id, error = %err, "图标下载失败"),
            });
            self.pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(handle);
        }

        fn wait_idle(&self) {
            let handles: Vec<_> = self
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .drain(..)
                .collect();
            for handle in handles {
                if handle.join().is_err() {
                    warn!("图标下载线程异常退出");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::thread;

    #[derive(Default)]
    struct RecordingFetcher {
        requests: Mutex<Vec<IconRequest>>,
    }

    impl IconFetcher for RecordingFetcher {
        fn fetch(&self, request: IconRequest) {
            self.requests.lock().unwrap().push(request);
        }
    }

    fn symbol(id: &str, download_location: Option<&str>) -> SymbolShape {
        SymbolShape {
            origin: None,
            label: String::new(),
            symbol_id: Some(id.to_string()),
            download_location: download_location.map(str::to_string),
            background: Default::default(),
            image_type: None,
        }
    }

    #[test]
    fn registry_reports_first_insert_only() {
        let registry = Arc::new(SymbolRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || registry.mark_seen("sym-1"))
            })
            .collect();
        let fresh = handles
            .into_iter()
            .map(|h| h.join().expect("join"))
            .filter(|fresh| *fresh)
            .count();
        assert_eq!(fresh, 1);
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("sym-1"));
    }

    #[test]
    fn icon_is_fetched_once_with_constructed_url() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let fetcher = Arc::new(RecordingFetcher::default());
        let resolver = IconResolver::new(
            Arc::new(SymbolRegistry::new()),
            fetcher.clone(),
            dir.path(),
            "https://example.invalid/lcms/",
        );

        resolver.ensure_icon(&symbol("sym-7", None), "AL1");
        resolver.ensure_icon(&symbol("sym-7", None), "AL2");

        let requests = fetcher.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].local_path, dir.path().join("sym-7"));
        assert_eq!(
            requests[0].url,
            r#"https://example.invalid/lcms//drawing/symbol?data={"imageId":"sym-7","hostActivityId":"AL1","activityId":"AL1"}"#
        );
    }

    #[test]
    fn existing_file_and_download_location() {
        let dir = tempfile::tempdir().expect("create temp dir");
        fs::write(dir.path().join("cached"), b"png").expect("write icon");
        let fetcher = Arc::new(RecordingFetcher::default());
        let registry = Arc::new(SymbolRegistry::new());
        let resolver = IconResolver::new(registry.clone(), fetcher.clone(), dir.path(), "");

        resolver.ensure_icon(&symbol("cached", None), "AL1");
        resolver.ensure_icon(&symbol("remote", Some("https://cdn.invalid/remote.png")), "AL1");

        let requests = fetcher.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, "https://cdn.invalid/remote.png");
        // 本地已存在的图标同样记为已见
        assert!(registry.contains("cached"));
    }

    #[test]
    fn symbol_ids_that_escape_the_folder_are_not_fetched() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let fetcher = Arc::new(RecordingFetcher::default());
        let registry = Arc::new(SymbolRegistry::new());
        let resolver =
            IconResolver::new(registry.clone(), fetcher.clone(), dir.path().join("images"), "");

        for id in ["../../etc/evil", "/etc/evil", "a/b", "..", ".", "sub/../x", ""] {
            resolver.ensure_icon(&symbol(id, None), "AL1");
        }
        resolver.ensure_icon(&symbol("sym-ok.png", None), "AL1");

        let requests = fetcher.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].local_path, dir.path().join("images").join("sym-ok.png"));
        assert!(requests.iter().all(|r| r.local_path.starts_with(dir.path().join("images"))));
        assert!(registry.contains("../../etc/evil"));
        assert!(registry.contains("/etc/evil"));
    }
}
