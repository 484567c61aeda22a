//! 配置数据结构定义
//!
//! 定义应用程序的配置结构体、默认值以及从通用文档到强类型配置的绑定

use crate::config::document::Mapping;
use crate::config::validation::validate_config;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 主配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
    /// 对外服务配置
    #[serde(default = "default_server")]
    pub server: ServerConfig,
    /// 内部服务配置（健康检查、指标）
    #[serde(default = "default_internal_server")]
    pub internal_server: ServerConfig,
    /// 链路追踪配置
    #[serde(default)]
    pub tracing: TracingConfig,
    /// 数据库配置，必填
    pub database: Option<DatabaseConfig>,
    /// 分布式锁配置
    #[serde(default)]
    pub lock_distributor: LockDistributorConfig,
    /// OIDC 认证配置
    pub oidc_authentication: Option<OidcAuthConfig>,
    /// OPA 授权服务配置
    pub opa_server_authorization: Option<OpaServerAuthorization>,
    /// 消息总线配置
    pub amqp: Option<AmqpConfig>,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,
    /// 日志格式：json / text / humanfriendly
    #[serde(default = "default_log_format")]
    pub format: String,
    /// 日志文件路径，为空时输出到控制台
    pub file_path: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file_path: None,
        }
    }
}

/// 服务监听配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// 监听地址
    pub listen_addr: Option<String>,
    /// 监听端口
    pub port: u16,
}

/// 链路追踪配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TracingConfig {
    /// 是否启用
    #[serde(default)]
    pub enabled: bool,
    /// 导出器类型
    #[serde(default = "default_tracing_type", rename = "type")]
    pub kind: String,
    /// OTEL HTTP 导出器配置
    pub otel_http: Option<TracingOtelHttpConfig>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            kind: default_tracing_type(),
            otel_http: None,
        }
    }
}

/// OTEL HTTP 导出器配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TracingOtelHttpConfig {
    /// 导出地址
    #[serde(default)]
    pub server_url: String,
    /// 附加请求头
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseConfig {
    /// 数据库驱动
    #[serde(default = "default_database_driver")]
    pub driver: String,
    /// 主库连接串
    pub connection_url: Option<CredentialConfig>,
    /// 只读副本连接串
    #[serde(default)]
    pub replica_connection_urls: Vec<CredentialConfig>,
}

/// 分布式锁配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LockDistributorConfig {
    /// 心跳间隔
    #[serde(default = "default_heartbeat_frequency")]
    pub heartbeat_frequency: String,
    /// 租约时长
    #[serde(default = "default_lease_duration")]
    pub lease_duration: String,
    /// 锁表名
    #[serde(default = "default_lock_table_name")]
    pub table_name: String,
}

impl Default for LockDistributorConfig {
    fn default() -> Self {
        Self {
            heartbeat_frequency: default_heartbeat_frequency(),
            lease_duration: default_lease_duration(),
            table_name: default_lock_table_name(),
        }
    }
}

/// OIDC 认证配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OidcAuthConfig {
    #[serde(default, rename = "clientID")]
    pub client_id: String,
    pub client_secret: Option<CredentialConfig>,
    #[serde(default = "default_oidc_cookie_name")]
    pub cookie_name: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub issuer_url: String,
    #[serde(default)]
    pub redirect_url: String,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default = "default_oidc_scopes")]
    pub scopes: Vec<String>,
}

/// OPA 授权服务配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OpaServerAuthorization {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// 消息总线配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AmqpConfig {
    /// 连接串
    pub connection: Option<CredentialConfig>,
    /// 通道 QoS
    #[serde(default)]
    pub channel_qos: AmqpChannelQos,
}

/// 通道 QoS 配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AmqpChannelQos {
    #[serde(default = "default_prefetch_count")]
    pub prefetch_count: u16,
}

impl Default for AmqpChannelQos {
    fn default() -> Self {
        Self {
            prefetch_count: default_prefetch_count(),
        }
    }
}

/// 凭据配置
///
/// `path` 非空时，`value` 由密钥解析阶段从该文件读取
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CredentialConfig {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(default)]
    pub value: String,
}

impl CredentialConfig {
    /// 直接给定值的凭据
    pub fn inline(value: impl Into<String>) -> Self {
        Self {
            path: String::new(),
            value: value.into(),
        }
    }

    /// 遮蔽值后的副本
    pub fn redacted(&self) -> Self {
        Self {
            path: self.path.clone(),
            value: REDACTED.to_string(),
        }
    }
}

// 不在日志里打印凭据
impl fmt::Debug for CredentialConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialConfig")
            .field("path", &self.path)
            .field("value", &REDACTED)
            .finish()
    }
}

const REDACTED: &str = "***";

/// 模式中声明为凭据的字段，点号分隔；`[]` 后缀表示凭据列表
///
/// 密钥解析只处理这些位置，其余映射中名为 `path` 的键保持原样
pub const CREDENTIAL_FIELDS: &[&str] = &[
    "database.connectionUrl",
    "database.replicaConnectionUrls[]",
    "oidcAuthentication.clientSecret",
    "amqp.connection",
];

impl Config {
    /// 返回全部凭据值被遮蔽的副本，用于展示
    pub fn redacted(&self) -> Config {
        let mut config = self.clone();
        if let Some(database) = config.database.as_mut() {
            database.connection_url = database.connection_url.as_ref().map(|c| c.redacted());
            for replica in database.replica_connection_urls.iter_mut() {
                *replica = replica.redacted();
            }
        }
        if let Some(oidc) = config.oidc_authentication.as_mut() {
            oidc.client_secret = oidc.client_secret.as_ref().map(|c| c.redacted());
        }
        if let Some(amqp) = config.amqp.as_mut() {
            amqp.connection = amqp.connection.as_ref().map(|c| c.redacted());
        }
        config
    }
}

/// 把解析完成的文档绑定为强类型配置并执行语义校验
///
/// 纯函数，不做任何 IO
pub fn bind_config(root: &Mapping) -> Result<Config, ConfigError> {
    let json = serde_json::to_value(root)
        .map_err(|e| ConfigError::validation(format!("配置文档无法转换: {e}")))?;
    let config: Config = serde_json::from_value(json)
        .map_err(|e| ConfigError::validation(format!("配置结构无效: {e}")))?;

    validate_config(&config).map_err(|violations| ConfigError::Validation { violations })?;
    Ok(config)
}

// 默认值函数
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}
fn default_server() -> ServerConfig {
    ServerConfig {
        listen_addr: None,
        port: 8080,
    }
}
fn default_internal_server() -> ServerConfig {
    ServerConfig {
        listen_addr: None,
        port: 9090,
    }
}
fn default_tracing_type() -> String {
    "OTEL_HTTP".to_string()
}
fn default_database_driver() -> String {
    "POSTGRES".to_string()
}
fn default_heartbeat_frequency() -> String {
    "1s".to_string()
}
fn default_lease_duration() -> String {
    "3s".to_string()
}
fn default_lock_table_name() -> String {
    "locks".to_string()
}
fn default_oidc_cookie_name() -> String {
    "oidc".to_string()
}
fn default_oidc_scopes() -> Vec<String> {
    vec![
        "openid".to_string(),
        "email".to_string(),
        "profile".to_string(),
    ]
}
fn default_prefetch_count() -> u16 {
    10
}
