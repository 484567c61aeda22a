//! 配置语义校验
//!
//! 一次遍历收集全部违规项，不做任何 IO

use crate::config::types::{Config, LockDistributorConfig};
use std::time::Duration;

const LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];
const LOG_FORMATS: &[&str] = &["json", "text", "humanfriendly"];
const DATABASE_DRIVERS: &[&str] = &["POSTGRES", "MYSQL", "SQLITE", "SQLSERVER"];
const TRACING_TYPES: &[&str] = &["OTEL_HTTP"];

/// 校验配置，返回全部违规描述
pub fn validate_config(config: &Config) -> Result<(), Vec<String>> {
    let mut violations = Vec::new();

    check_one_of(&mut violations, "log.level", &config.log.level, LOG_LEVELS);
    check_one_of(&mut violations, "log.format", &config.log.format, LOG_FORMATS);
    check_one_of(
        &mut violations,
        "tracing.type",
        &config.tracing.kind,
        TRACING_TYPES,
    );

    // 端口
    if config.server.port == 0 {
        violations.push("server.port 不能为 0".to_string());
    }
    if config.internal_server.port == 0 {
        violations.push("internalServer.port 不能为 0".to_string());
    }
    if config.server.port == config.internal_server.port {
        violations.push(format!(
            "server.port 与 internalServer.port 不能相同: {}",
            config.server.port
        ));
    }

    if config.tracing.enabled {
        let has_url = config
            .tracing
            .otel_http
            .as_ref()
            .is_some_and(|otel| !otel.server_url.is_empty());
        if !has_url {
            violations.push("启用 tracing 时必须配置 tracing.otelHttp.serverUrl".to_string());
        }
    }

    match &config.database {
        None => violations.push("缺少必填配置段 database".to_string()),
        Some(database) => {
            check_one_of(
                &mut violations,
                "database.driver",
                &database.driver,
                DATABASE_DRIVERS,
            );
            let has_url = database
                .connection_url
                .as_ref()
                .is_some_and(|url| !url.value.is_empty());
            if !has_url {
                violations.push("database.connectionUrl.value 不能为空".to_string());
            }
        }
    }

    check_lock_distributor(&mut violations, &config.lock_distributor);

    if let Some(oidc) = &config.oidc_authentication {
        for (field, value) in [
            ("clientID", &oidc.client_id),
            ("issuerUrl", &oidc.issuer_url),
            ("redirectUrl", &oidc.redirect_url),
            ("state", &oidc.state),
        ] {
            if value.is_empty() {
                violations.push(format!("oidcAuthentication.{field} 不能为空"));
            }
        }
    }

    if let Some(opa) = &config.opa_server_authorization {
        if opa.url.is_empty() {
            violations.push("opaServerAuthorization.url 不能为空".to_string());
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

fn check_one_of(violations: &mut Vec<String>, field: &str, value: &str, allowed: &[&str]) {
    if !allowed.contains(&value) {
        violations.push(format!(
            "{field} 的值 '{value}' 无效，可选值: {}",
            allowed.join(", ")
        ));
    }
}

fn check_lock_distributor(violations: &mut Vec<String>, lock: &LockDistributorConfig) {
    if lock.table_name.is_empty() {
        violations.push("lockDistributor.tableName 不能为空".to_string());
    }

    let heartbeat = parse_field(
        violations,
        "lockDistributor.heartbeatFrequency",
        &lock.heartbeat_frequency,
    );
    let lease = parse_field(violations, "lockDistributor.leaseDuration", &lock.lease_duration);

    if let (Some(heartbeat), Some(lease)) = (heartbeat, lease) {
        if lease <= heartbeat {
            violations.push(format!(
                "lockDistributor.leaseDuration ({}) 必须大于 heartbeatFrequency ({})",
                lock.lease_duration, lock.heartbeat_frequency
            ));
        }
    }
}

fn parse_field(violations: &mut Vec<String>, field: &str, value: &str) -> Option<Duration> {
    match parse_duration(value) {
        Ok(duration) => Some(duration),
        Err(e) => {
            violations.push(format!("{field}: {e}"));
            None
        }
    }
}

/// 解析时长字符串，支持 `ms`、`s`、`m`、`h` 单位
///
/// # 参数
/// * `value` - 例如 `500ms`、`1s`、`2m`、`1h`
///
/// # 返回
/// * `Result<Duration, String>` - 解析结果或错误描述
pub fn parse_duration(value: &str) -> Result<Duration, String> {
    let value = value.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| format!("时长 '{value}' 缺少单位"))?;
    let (digits, unit) = value.split_at(split);

    let amount: u64 = digits
        .parse()
        .map_err(|_| format!("时长 '{value}' 缺少数值"))?;

    let duration = match unit {
        "ms" => Duration::from_millis(amount),
        "s" => Duration::from_secs(amount),
        "m" => Duration::from_secs(amount.saturating_mul(60)),
        "h" => Duration::from_secs(amount.saturating_mul(3600)),
        _ => return Err(format!("时长 '{value}' 的单位 '{unit}' 不受支持")),
    };
    Ok(duration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{
        CredentialConfig, DatabaseConfig, OidcAuthConfig, TracingOtelHttpConfig,
    };

    fn valid_config() -> Config {
        let json = serde_json::json!({
            "database": {
                "connectionUrl": { "value": "postgres://localhost/app" }
            }
        });
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_valid_config_passes() {
        assert_eq!(validate_config(&valid_config()), Ok(()));
    }

    #[test]
    fn test_all_violations_reported() {
        let mut config = valid_config();
        config.log.level = "verbose".to_string();
        config.log.format = "xml".to_string();
        config.server.port = 9090;
        config.lock_distributor.lease_duration = "soon".to_string();

        let violations = validate_config(&config).unwrap_err();
        assert_eq!(violations.len(), 4, "{violations:?}");
        assert!(violations.iter().any(|v| v.contains("log.level")));
        assert!(violations.iter().any(|v| v.contains("log.format")));
        assert!(violations.iter().any(|v| v.contains("internalServer.port")));
        assert!(violations.iter().any(|v| v.contains("leaseDuration")));
    }

    #[test]
    fn test_database_required() {
        let mut config = valid_config();
        config.database = None;
        let violations = validate_config(&config).unwrap_err();
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("database"));
    }

    #[test]
    fn test_empty_connection_url_rejected() {
        let mut config = valid_config();
        config.database = Some(DatabaseConfig {
            driver: "MYSQL".to_string(),
            connection_url: Some(CredentialConfig::default()),
            replica_connection_urls: Vec::new(),
        });
        let violations = validate_config(&config).unwrap_err();
        assert!(violations[0].contains("connectionUrl"));
    }

    #[test]
    fn test_unknown_driver_rejected() {
        let mut config = valid_config();
        if let Some(database) = config.database.as_mut() {
            database.driver = "ORACLE".to_string();
        }
        let violations = validate_config(&config).unwrap_err();
        assert!(violations[0].contains("database.driver"));
    }

    #[test]
    fn test_tracing_requires_server_url() {
        let mut config = valid_config();
        config.tracing.enabled = true;
        assert!(validate_config(&config).is_err());

        config.tracing.otel_http = Some(TracingOtelHttpConfig {
            server_url: "http://localhost:4318".to_string(),
            headers: Default::default(),
        });
        assert_eq!(validate_config(&config), Ok(()));
    }

    #[test]
    fn test_oidc_fields_required() {
        let mut config = valid_config();
        config.oidc_authentication = Some(OidcAuthConfig {
            client_id: "client".to_string(),
            client_secret: None,
            cookie_name: "oidc".to_string(),
            state: String::new(),
            issuer_url: String::new(),
            redirect_url: "http://localhost:8080/".to_string(),
            email_verified: false,
            scopes: vec!["openid".to_string()],
        });

        let violations = validate_config(&config).unwrap_err();
        assert_eq!(violations.len(), 2);
    }

    #[test]
    fn test_lease_must_exceed_heartbeat() {
        let mut config = valid_config();
        config.lock_distributor.heartbeat_frequency = "3s".to_string();
        config.lock_distributor.lease_duration = "3000ms".to_string();
        let violations = validate_config(&config).unwrap_err();
        assert!(violations[0].contains("leaseDuration"));
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("500ms"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_duration("1s"), Ok(Duration::from_secs(1)));
        assert_eq!(parse_duration("2m"), Ok(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("s").is_err());
        assert!(parse_duration("5d").is_err());
        assert!(parse_duration("").is_err());
    }
}
