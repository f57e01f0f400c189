use std::env;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};

use lcms_config::SymbolConfig;
use tracing::info;

/// 确保图标缓存目录存在，返回其绝对路径。
pub fn ensure_icon_folder(config: &SymbolConfig) -> Result<PathBuf, IconFolderError> {
    let target = normalize_path(&config.image_folder)?;
    if target.is_dir() {
        return Ok(target);
    }
    if !config.create_folder {
        return Err(IconFolderError::CreateDisabled { target });
    }
    fs::create_dir_all(&target).map_err(|error| IconFolderError::CreateFailed {
        target: target.clone(),
        error,
    })?;
    info!(path = %target.display(), "已创建图标目录");
    Ok(target)
}

fn normalize_path(path: &Path) -> Result<PathBuf, IconFolderError> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        let cwd = env::current_dir().map_err(|error| IconFolderError::Io { error })?;
        Ok(cwd.join(path))
    }
}

#[derive(Debug)]
pub enum IconFolderError {
    CreateDisabled { target: PathBuf },
    CreateFailed { target: PathBuf, error: std::io::Error },
    Io { error: std::io::Error },
}

impl Display for IconFolderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            IconFolderError::CreateDisabled { target } => {
                write!(
                    f,
                    "图标目录 {} 不存在且 create_folder 已关闭",
                    target.display()
                )
            }
            IconFolderError::CreateFailed { target, error } => {
                write!(f, "创建图标目录 {} 失败: {}", target.display(), error)
            }
            IconFolderError::Io { error } => write!(f, "I/O 错误: {error}"),
        }
    }
}

impl std::error::Error for IconFolderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IconFolderError::CreateFailed { error, .. } | IconFolderError::Io { error } => {
                Some(error)
            }
            IconFolderError::CreateDisabled { .. } => None,
        }
    }
}
