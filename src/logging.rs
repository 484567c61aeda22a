//! 日志系统模块
//!
//! 基于 tracing 的结构化日志。过滤器和输出层都可以在运行时替换，
//! 配置重载后通过 `logger` 钩子重新应用日志配置。

use crate::config::hooks::{FnHook, HookDefinition};
use crate::config::types::LogConfig;
use crate::error::LoggingError;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt::{self, time::ChronoUtc, writer::BoxMakeWriter};
use tracing_subscriber::layer::Layered;
use tracing_subscriber::{prelude::*, registry, reload, EnvFilter, Layer, Registry};

type FilterLayer = reload::Layer<EnvFilter, Registry>;
type BaseSubscriber = Layered<FilterLayer, Registry>;
type OutputLayer = Box<dyn Layer<BaseSubscriber> + Send + Sync>;

/// 日志输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// 每行一个 JSON 对象
    Json,
    /// 单行文本，无颜色
    Text,
    /// 多行易读格式
    HumanFriendly,
}

impl FromStr for LogFormat {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "text" => Ok(LogFormat::Text),
            "humanfriendly" => Ok(LogFormat::HumanFriendly),
            _ => Err(LoggingError::InvalidFormat(s.to_string())),
        }
    }
}

/// 日志设置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    /// 默认日志级别，`RUST_LOG` 中的指令优先
    pub level: LevelFilter,
    /// 输出格式
    pub format: LogFormat,
    /// 日志文件，为空时输出到标准输出
    pub file_path: Option<PathBuf>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::Json,
            file_path: None,
        }
    }
}

impl LogSettings {
    /// 只指定级别的设置，用于加载配置之前的引导阶段
    pub fn bootstrap(level: &str) -> Result<Self, LoggingError> {
        Ok(Self {
            level: parse_level(level)?,
            format: LogFormat::Text,
            file_path: None,
        })
    }

    /// 从配置中的日志段构造设置
    pub fn from_config(config: &LogConfig) -> Result<Self, LoggingError> {
        Ok(Self {
            level: parse_level(&config.level)?,
            format: config.format.parse()?,
            file_path: config
                .file_path
                .as_ref()
                .filter(|path| !path.is_empty())
                .map(PathBuf::from),
        })
    }
}

fn parse_level(level: &str) -> Result<LevelFilter, LoggingError> {
    LevelFilter::from_str(level).map_err(|_| LoggingError::InvalidLevel(level.to_string()))
}

/// 全局日志系统
static GLOBAL: Mutex<Option<Arc<LoggingSystem>>> = Mutex::new(None);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 日志系统
///
/// 持有两个可重载层的句柄；进程内只安装一次全局订阅器
pub struct LoggingSystem {
    filter: reload::Handle<EnvFilter, Registry>,
    output: reload::Handle<OutputLayer, BaseSubscriber>,
    settings: Mutex<LogSettings>,
}

impl LoggingSystem {
    /// 初始化日志系统
    ///
    /// 首次调用安装全局订阅器；之后的调用复用已安装的系统并应用新设置
    ///
    /// # 参数
    /// * `settings` - 日志设置
    ///
    /// # 返回
    /// * `Result<Arc<LoggingSystem>, LoggingError>` - 全局日志系统
    pub fn init(settings: LogSettings) -> Result<Arc<LoggingSystem>, LoggingError> {
        let mut global = lock(&GLOBAL);
        if let Some(system) = global.as_ref() {
            system.apply(settings)?;
            return Ok(Arc::clone(system));
        }

        let (filter_layer, filter) = reload::Layer::new(build_filter(settings.level));
        let (output_layer, output) = reload::Layer::new(build_output(&settings)?);

        registry()
            .with(filter_layer)
            .with(output_layer)
            .try_init()
            .map_err(|e| LoggingError::Init(e.to_string()))?;

        let system = Arc::new(LoggingSystem {
            filter,
            output,
            settings: Mutex::new(settings),
        });
        *global = Some(Arc::clone(&system));

        tracing::debug!(settings = ?system.settings(), "日志系统初始化完成");
        Ok(system)
    }

    /// 已初始化的全局日志系统
    pub fn current() -> Option<Arc<LoggingSystem>> {
        lock(&GLOBAL).clone()
    }

    /// 当前生效的设置
    pub fn settings(&self) -> LogSettings {
        lock(&self.settings).clone()
    }

    /// 运行时应用新设置
    pub fn apply(&self, settings: LogSettings) -> Result<(), LoggingError> {
        let mut current = lock(&self.settings);
        if *current == settings {
            return Ok(());
        }

        // 先构造输出层，文件打不开时不改动任何状态
        let output = build_output(&settings)?;
        self.output
            .reload(output)
            .map_err(|e| LoggingError::Reload(e.to_string()))?;
        self.filter
            .reload(build_filter(settings.level))
            .map_err(|e| LoggingError::Reload(e.to_string()))?;

        tracing::info!(
            level = %settings.level,
            format = ?settings.format,
            file = ?settings.file_path,
            "日志配置已更新"
        );
        *current = settings;
        Ok(())
    }
}

fn build_filter(level: LevelFilter) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy()
}

fn build_output(settings: &LogSettings) -> Result<OutputLayer, LoggingError> {
    let (writer, to_file) = match &settings.file_path {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| LoggingError::OpenFile {
                    path: path.clone(),
                    source,
                })?;
            (BoxMakeWriter::new(Mutex::new(file)), true)
        }
        None => (BoxMakeWriter::new(std::io::stdout), false),
    };

    let layer = fmt::layer()
        .with_writer(writer)
        .with_timer(ChronoUtc::rfc_3339());

    let layer = match settings.format {
        LogFormat::Json => layer.json().boxed(),
        LogFormat::Text => layer.with_ansi(false).boxed(),
        LogFormat::HumanFriendly => layer.pretty().with_ansi(!to_file).boxed(),
    };
    Ok(layer)
}

/// 每次配置重载后重新应用日志配置的钩子
pub fn logger_hook() -> HookDefinition {
    HookDefinition::new(
        "logger",
        FnHook::new(|snapshot| {
            let settings = LogSettings::from_config(&snapshot.log)?;
            LoggingSystem::init(settings)?;
            Ok(())
        }),
    )
    .with_retry(2, Duration::from_millis(200))
}
