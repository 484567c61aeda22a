//! 错误处理模块
//!
//! 定义应用程序的统一错误类型

use std::path::PathBuf;
use thiserror::Error;

/// confhub 应用程序的主要错误类型
#[derive(Error, Debug)]
pub enum ConfhubError {
    /// 配置相关错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// 日志系统错误
    #[error("日志错误: {0}")]
    Logging(#[from] LoggingError),

    /// IO错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON序列化/反序列化错误
    #[error("JSON错误: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML序列化错误
    #[error("YAML错误: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// 其他错误
    #[error("其他错误: {0}")]
    Other(#[from] anyhow::Error),
}

/// 配置错误类型
///
/// 前四种错误会中止一次完整的加载/重载；`Hook` 只用于记录，不会回滚已生效的配置。
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 配置目录或文件不可读
    #[error("读取配置路径失败: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 配置片段语法错误
    #[error("配置片段解析失败: {file}: {message}")]
    Parse { file: PathBuf, message: String },

    /// 引用的密钥文件缺失或不可读
    #[error("读取密钥文件失败: {path}: {source}")]
    SecretRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 绑定或语义校验失败，包含本次发现的全部问题
    #[error("配置验证失败: {}", .violations.join("; "))]
    Validation { violations: Vec<String> },

    /// 钩子在耗尽重试次数后仍然失败
    #[error("配置钩子 {name} 在 {attempts} 次尝试后仍然失败: {message}")]
    Hook {
        name: String,
        attempts: u32,
        message: String,
    },

    /// 尚未成功加载过配置
    #[error("配置尚未加载")]
    NotLoaded,

    /// 已经加载过配置，后续更新只能通过重载
    #[error("配置已加载，请使用重载")]
    AlreadyLoaded,

    /// 文件监控错误
    #[error("文件监控错误: {0}")]
    Watch(#[from] notify::Error),

    /// 后台加载任务异常退出
    #[error("配置加载任务异常终止: {0}")]
    Task(String),
}

impl ConfigError {
    /// 构造只有一条问题的验证错误
    pub fn validation(message: impl Into<String>) -> Self {
        ConfigError::Validation {
            violations: vec![message.into()],
        }
    }
}

/// 日志系统错误类型
#[derive(Error, Debug)]
pub enum LoggingError {
    /// 无效的日志级别
    #[error("无效的日志级别: {0}")]
    InvalidLevel(String),

    /// 无效的日志格式
    #[error("无效的日志格式: {0}")]
    InvalidFormat(String),

    /// 日志文件打开失败
    #[error("打开日志文件失败: {path}: {source}")]
    OpenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 全局订阅器安装失败
    #[error("tracing subscriber初始化失败: {0}")]
    Init(String),

    /// 运行时重新配置失败
    #[error("日志系统重新配置失败: {0}")]
    Reload(String),
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, ConfhubError>;
