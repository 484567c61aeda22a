//! confhub - 目录式配置管理器
//!
//! 从配置目录加载多个片段文件并合并为一份权威配置，支持：
//! - YAML / JSON / TOML 片段的确定性深度合并
//! - 通过文件路径引用的密钥解析
//! - 语义校验与默认值绑定
//! - 目录与密钥文件监控、防抖动热重载
//! - 原子快照替换和带重试的重载钩子
//! - 结构化日志记录

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;

// 重新导出主要类型
pub use config::{Config, ConfigManager, ConfigSnapshot, HookDefinition, ReloadHook};
pub use error::{ConfhubError, ConfigError};

/// 应用程序版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 应用程序名称
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// 应用程序描述
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
