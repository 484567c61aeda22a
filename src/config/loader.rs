//! 配置加载器实现
//!
//! 读取配置目录下的全部片段文件，并串联 合并 → 密钥解析 → 绑定校验 流水线

use crate::config::document::{Mapping, Scalar, Value};
use crate::config::merge::merge_fragments;
use crate::config::secrets::resolve_secrets;
use crate::config::types::{bind_config, Config, CREDENTIAL_FIELDS};
use crate::error::ConfigError;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// 单个配置片段
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    /// 来源文件路径，决定合并顺序并用于错误报告
    pub source: PathBuf,
    /// 解析后的根映射
    pub root: Mapping,
}

/// 片段文件格式，由扩展名决定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentFormat {
    Yaml,
    Json,
    Toml,
}

impl FragmentFormat {
    /// 根据扩展名识别格式，不支持的扩展名返回 None
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "yaml" | "yml" => Some(Self::Yaml),
            "json" => Some(Self::Json),
            "toml" => Some(Self::Toml),
            _ => None,
        }
    }
}

/// 一次流水线运行的产物
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// 绑定并校验通过的配置
    pub config: Config,
    /// 本次解析过程中读取过的密钥文件
    pub secret_paths: BTreeSet<PathBuf>,
}

/// 配置加载器trait，定义配置加载接口
///
/// 加载过程是阻塞 IO，管理器会在阻塞线程池中调用它
pub trait ConfigLoader: Send + Sync {
    /// 从配置目录加载一份完整配置
    fn load_dir(&self, dir: &Path) -> Result<LoadedConfig, ConfigError>;
}

/// 基于目录片段的配置加载器
#[derive(Debug, Clone, Default)]
pub struct DirectoryConfigLoader;

impl DirectoryConfigLoader {
    pub fn new() -> Self {
        Self
    }
}

impl ConfigLoader for DirectoryConfigLoader {
    fn load_dir(&self, dir: &Path) -> Result<LoadedConfig, ConfigError> {
        let fragments = read_fragments(dir)?;
        debug!(path = %dir.display(), fragments = fragments.len(), "读取配置片段完成");

        let merged = merge_fragments(&fragments);
        let resolved = resolve_secrets(merged, CREDENTIAL_FIELDS)?;
        let config = bind_config(&resolved.root)?;

        Ok(LoadedConfig {
            config,
            secret_paths: resolved.secret_paths,
        })
    }
}

/// 判断文件名是否为隐藏项
pub fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

/// 读取目录下的全部片段，按路径字典序返回
///
/// # 参数
/// * `dir` - 配置目录
///
/// # 返回
/// * `Result<Vec<Fragment>, ConfigError>` - 片段列表；任何一个文件解析失败都会让整次读取失败
pub fn read_fragments(dir: &Path) -> Result<Vec<Fragment>, ConfigError> {
    let metadata = fs::metadata(dir).map_err(|source| ConfigError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    if !metadata.is_dir() {
        return Err(ConfigError::Io {
            path: dir.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "不是目录"),
        });
    }

    let mut files = Vec::new();
    collect_files(dir, &mut files)?;
    files.sort();

    files
        .into_iter()
        .filter_map(|path| match FragmentFormat::from_path(&path) {
            Some(format) => Some((path, format)),
            None => {
                debug!(path = %path.display(), "跳过不支持的配置文件扩展名");
                None
            }
        })
        .map(|(path, format)| {
            let bytes = fs::read(&path).map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            })?;
            // 编码错误属于内容问题，按解析错误报告
            let content = String::from_utf8(bytes).map_err(|e| ConfigError::Parse {
                file: path.clone(),
                message: format!("文件不是有效的 UTF-8: {e}"),
            })?;
            parse_fragment(&path, &content, format)
        })
        .collect()
}

/// 递归收集非隐藏的普通文件
fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), ConfigError> {
    let io_err = |source| ConfigError::Io {
        path: dir.to_path_buf(),
        source,
    };

    for entry in fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if is_hidden(&path) {
            continue;
        }

        // 跟随符号链接，挂载的 ConfigMap 常以链接形式出现
        let metadata = fs::metadata(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        if metadata.is_dir() {
            collect_files(&path, files)?;
        } else if metadata.is_file() {
            files.push(path);
        }
    }

    Ok(())
}

/// 解析单个片段内容
///
/// 空文档视为空映射；根节点不是映射时报解析错误
pub fn parse_fragment(
    path: &Path,
    content: &str,
    format: FragmentFormat,
) -> Result<Fragment, ConfigError> {
    let parse_err = |message: String| ConfigError::Parse {
        file: path.to_path_buf(),
        message,
    };

    let value = match format {
        FragmentFormat::Yaml => {
            let raw: serde_yaml::Value =
                serde_yaml::from_str(content).map_err(|e| parse_err(e.to_string()))?;
            Value::try_from(raw).map_err(parse_err)?
        }
        FragmentFormat::Json => {
            if content.trim().is_empty() {
                Value::Mapping(Mapping::new())
            } else {
                let raw: serde_json::Value =
                    serde_json::from_str(content).map_err(|e| parse_err(e.to_string()))?;
                Value::from(raw)
            }
        }
        FragmentFormat::Toml => {
            let raw: toml::Table =
                toml::from_str(content).map_err(|e| parse_err(e.to_string()))?;
            Value::from(toml::Value::Table(raw))
        }
    };

    let root = match value {
        Value::Mapping(mapping) => mapping,
        Value::Scalar(Scalar::Null) => Mapping::new(),
        _ => return Err(parse_err("片段根节点必须是映射".to_string())),
    };

    Ok(Fragment {
        source: path.to_path_buf(),
        root,
    })
}

/// 获取默认配置目录路径
///
/// 优先使用当前目录下的 `conf`，否则使用系统配置目录下的 `confhub/conf`
pub fn get_default_config_folder() -> PathBuf {
    let local = PathBuf::from("conf");
    if local.is_dir() {
        return local;
    }

    dirs::config_dir()
        .map(|config_dir| config_dir.join("confhub").join("conf"))
        .unwrap_or(local)
}
