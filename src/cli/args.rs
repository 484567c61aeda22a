//! 命令行参数定义
//!
//! 使用clap定义应用程序的命令行接口

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// confhub - 目录式配置管理器
#[derive(Parser, Debug, Clone)]
#[command(
    name = "confhub",
    version = crate::VERSION,
    about = crate::APP_DESCRIPTION,
    long_about = None
)]
pub struct Args {
    /// 配置目录路径
    #[arg(
        short = 'c',
        long = "config-folder-path",
        value_name = "DIR",
        help = "配置目录路径",
        env = "CONFHUB_CONFIG_FOLDER"
    )]
    pub config_folder_path: Option<PathBuf>,

    /// 加载配置之前使用的日志级别
    #[arg(
        long,
        value_enum,
        default_value = "info",
        help = "引导阶段的日志级别",
        env = "CONFHUB_LOG_LEVEL"
    )]
    pub log_level: LogLevel,

    /// 子命令
    #[command(subcommand)]
    pub command: Commands,
}

/// 日志级别枚举
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// 子命令定义
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// 加载配置并持续监控变更
    Run {
        /// 防抖动窗口（毫秒）
        #[arg(
            long,
            value_name = "MILLIS",
            default_value_t = 500,
            help = "防抖动窗口（毫秒）",
            env = "CONFHUB_DEBOUNCE_MS"
        )]
        debounce_ms: u64,
    },

    /// 验证配置目录
    Validate {
        /// 显示详细信息
        #[arg(short, long, help = "显示详细信息")]
        verbose: bool,
    },

    /// 输出合并后的有效配置
    Show {
        /// 输出格式
        #[arg(long, value_enum, default_value = "yaml", help = "输出格式")]
        format: ConfigFormat,

        /// 显示凭据明文
        #[arg(long, help = "显示凭据明文")]
        show_secrets: bool,
    },

    /// 显示版本信息
    Version {
        /// 输出格式
        #[arg(long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },
}

/// 版本信息输出格式
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum OutputFormat {
    /// 文本格式
    Text,
    /// JSON格式
    Json,
}

/// 配置输出格式
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum ConfigFormat {
    /// JSON格式
    Json,
    /// YAML格式
    Yaml,
}

impl Args {
    /// 获取配置目录路径
    pub fn get_config_folder(&self) -> PathBuf {
        self.config_folder_path
            .clone()
            .unwrap_or_else(crate::config::get_default_config_folder)
    }
}
