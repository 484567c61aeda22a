//! 配置管理模块
//!
//! 提供配置目录加载、片段合并、密钥解析、校验和热重载功能

pub mod document;
pub mod hooks;
pub mod loader;
pub mod manager;
pub mod merge;
pub mod secrets;
pub mod types;
pub mod validation;
pub mod watcher;

// 重新导出主要类型
pub use document::{Mapping, Scalar, Value};
pub use hooks::{FnHook, HookDefinition, ReloadHook};
pub use loader::{
    get_default_config_folder, read_fragments, ConfigLoader, DirectoryConfigLoader, Fragment,
    LoadedConfig,
};
pub use manager::{ConfigManager, ConfigSnapshot, ManagerState, ReloadOutcome, WatchHandle};
pub use merge::merge_fragments;
pub use secrets::{resolve_secrets, ResolvedDocument};
pub use types::{bind_config, Config, CredentialConfig, CREDENTIAL_FIELDS};
pub use validation::{parse_duration, validate_config};
pub use watcher::{ConfigWatcher, ReloadSignal, DEFAULT_DEBOUNCE};
