use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use lcms_config::{AppConfig, ConfigError, SymbolConfig};
use lcms_engine::{Converter, IconFetcher, IconResolver, LayerMap, SkipFetcher, SymbolRegistry};

mod icon_folder;

/// 将 LCMS 图纸转换为按主题图层划分的 GeoJSON 要素集。
#[derive(Debug, Parser)]
#[command(name = "lcms-app", version)]
struct Cli {
    /// 配置文件路径，缺省时按 LCMS_CONFIG / ./config/default.toml 查找
    #[arg(long)]
    config: Option<PathBuf>,
    /// 输出文件，缺省写到标准输出
    #[arg(long, short)]
    output: Option<PathBuf>,
    /// 不下载符号图标
    #[arg(long)]
    no_download: bool,
    /// 图纸 JSON 文件
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    let config = load_configuration(cli.config.clone());
    init_logging(&config);
    info!("启动 LCMS 图纸转换");

    let download = config.symbols.download && !cli.no_download;
    if download {
        if let Err(err) = icon_folder::ensure_icon_folder(&config.symbols) {
            warn!(error = %err, "无法准备图标目录");
        }
    }
    let icons = build_icon_resolver(&config.symbols, download);
    let converter = Converter::new(icons.clone());

    let mut documents = Vec::new();
    for input in &cli.inputs {
        match lcms_io::read_documents(input) {
            Ok(mut found) => {
                info!(path = %input.display(), drawings = found.len(), "已读取输入文件");
                documents.append(&mut found);
            }
            Err(err) => {
                error!(path = %input.display(), error = %err, "读取输入文件失败");
                std::process::exit(1);
            }
        }
    }

    let report = converter.convert_batch(&documents);
    for failure in &report.failures {
        error!(index = failure.index, error = %failure.error, "图纸转换失败");
    }
    for (title, collection) in &report.layers {
        match collection.change_key() {
            Ok(key) => info!(
                title = %title,
                features = collection.features().len(),
                change_key = %key,
                "图层已生成"
            ),
            Err(err) => warn!(title = %title, error = %err, "无法计算变更键"),
        }
    }

    if let Err(err) = write_output(&report.layers, cli.output.as_deref(), config.output.pretty) {
        error!(error = %err, "写出结果失败");
        std::process::exit(1);
    }
    icons.wait_idle();

    if !report.is_complete() {
        std::process::exit(2);
    }
}

fn build_icon_resolver(symbols: &SymbolConfig, download: bool) -> IconResolver {
    let fetcher: Arc<dyn IconFetcher> = if download {
        http_fetcher()
    } else {
        Arc::new(SkipFetcher)
    };
    IconResolver::new(
        Arc::new(SymbolRegistry::new()),
        fetcher,
        symbols.image_folder.clone(),
        symbols.base_url.clone(),
    )
}

#[cfg(feature = "http")]
fn http_fetcher() -> Arc<dyn IconFetcher> {
    use std::time::Duration;

    match lcms_engine::symbols::HttpIconFetcher::new(Duration::from_secs(30)) {
        Ok(fetcher) => Arc::new(fetcher),
        Err(err) => {
            warn!(error = %err, "无法创建 HTTP 客户端，跳过图标下载");
            Arc::new(SkipFetcher)
        }
    }
}

#[cfg(not(feature = "http"))]
fn http_fetcher() -> Arc<dyn IconFetcher> {
    warn!("未启用 http 特性，跳过图标下载");
    Arc::new(SkipFetcher)
}

fn write_output(layers: &LayerMap, output: Option<&Path>, pretty: bool) -> io::Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(layers)
    } else {
        serde_json::to_string(layers)
    }
    .map_err(io::Error::other)?;

    match output {
        Some(path) => {
            fs::write(path, json)?;
            info!(path = %path.display(), layers = layers.len(), "结果已写出");
            Ok(())
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(json.as_bytes())?;
            stdout.write_all(b"\n")
        }
    }
}

fn load_configuration(override_path: Option<PathBuf>) -> AppConfig {
    match override_path {
        Some(path) => AppConfig::from_file(&path).unwrap_or_else(|err| {
            warn!(path = %path.display(), error = %err, "加载指定配置失败，使用默认配置");
            AppConfig::default()
        }),
        None => match AppConfig::discover() {
            Ok(cfg) => cfg,
            Err(err) => {
                match &err {
                    ConfigError::Io { path, .. } | ConfigError::Parse { path, .. } => {
                        warn!(path = %path.display(), error = %err, "加载默认配置失败，使用内建默认值");
                    }
                    ConfigError::Context { .. } => {
                        warn!(error = %err, "加载默认配置失败，使用内建默认值");
                    }
                }
                AppConfig::default()
            }
        },
    }
}

fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_new(config.logging.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(filter).with_writer(io::stderr);
    if subscriber.try_init().is_err() {
        // 已初始化，忽略
    }
}
