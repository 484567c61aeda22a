//! 密钥解析
//!
//! 只在声明为凭据的字段上解析引用（见 [`CREDENTIAL_FIELDS`](crate::config::types::CREDENTIAL_FIELDS)）。
//! 凭据映射的 `path` 非空时读取该文件内容写入 `value`，并保留 `path` 以便下次重新解析。

use crate::config::document::{Mapping, Value};
use crate::error::ConfigError;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::debug;

const PATH_KEY: &str = "path";
const VALUE_KEY: &str = "value";
const EACH_SUFFIX: &str = "[]";

/// 解析完成的文档
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDocument {
    /// 已填充密钥值的文档
    pub root: Mapping,
    /// 读取过的全部密钥文件，去重
    pub secret_paths: BTreeSet<PathBuf>,
}

/// 解析文档中声明位置上的凭据引用
///
/// # 参数
/// * `root` - 合并后的文档
/// * `fields` - 凭据字段，点号分隔，段尾 `[]` 表示对列表逐项处理
///
/// # 返回
/// * `Result<ResolvedDocument, ConfigError>` - 缺失的字段直接跳过；任何密钥文件读取失败都会让整次解析失败
pub fn resolve_secrets(
    mut root: Mapping,
    fields: &[&str],
) -> Result<ResolvedDocument, ConfigError> {
    let mut secret_paths = BTreeSet::new();
    for field in fields {
        let segments: Vec<&str> = field.split('.').collect();
        resolve_field(&mut root, &segments, &mut secret_paths)?;
    }
    Ok(ResolvedDocument { root, secret_paths })
}

fn resolve_field(
    mapping: &mut Mapping,
    segments: &[&str],
    secret_paths: &mut BTreeSet<PathBuf>,
) -> Result<(), ConfigError> {
    let Some((head, rest)) = segments.split_first() else {
        return Ok(());
    };
    let (key, each) = match head.strip_suffix(EACH_SUFFIX) {
        Some(key) => (key, true),
        None => (*head, false),
    };
    let Some(value) = mapping.get_mut(key) else {
        return Ok(());
    };

    match (value, each) {
        (Value::Sequence(items), true) => {
            for item in items.iter_mut() {
                resolve_target(item, rest, secret_paths)?;
            }
            Ok(())
        }
        (value, false) => resolve_target(value, rest, secret_paths),
        // 形状不符交给绑定阶段报告
        _ => Ok(()),
    }
}

fn resolve_target(
    value: &mut Value,
    rest: &[&str],
    secret_paths: &mut BTreeSet<PathBuf>,
) -> Result<(), ConfigError> {
    let Value::Mapping(mapping) = value else {
        return Ok(());
    };
    if rest.is_empty() {
        resolve_credential(mapping, secret_paths)
    } else {
        resolve_field(mapping, rest, secret_paths)
    }
}

/// 读取单个凭据映射引用的文件
fn resolve_credential(
    credential: &mut Mapping,
    secret_paths: &mut BTreeSet<PathBuf>,
) -> Result<(), ConfigError> {
    let path = match credential.get(PATH_KEY).and_then(Value::as_str) {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => return Ok(()),
    };

    let secret = read_secret(&path)?;
    debug!(path = %path.display(), "密钥文件已读取");
    credential.insert(VALUE_KEY.to_string(), Value::string(secret));
    secret_paths.insert(path);
    Ok(())
}

/// 读取密钥文件，去掉末尾换行
fn read_secret(path: &PathBuf) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::SecretRead {
        path: path.clone(),
        source,
    })?;
    Ok(content.trim_end_matches(['\n', '\r']).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::{parse_fragment, FragmentFormat};
    use crate::config::types::CREDENTIAL_FIELDS;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn document(yaml: &str) -> Mapping {
        parse_fragment(Path::new("doc.yaml"), yaml, FragmentFormat::Yaml)
            .unwrap()
            .root
    }

    fn resolve(doc: Mapping) -> Result<ResolvedDocument, ConfigError> {
        resolve_secrets(doc, CREDENTIAL_FIELDS)
    }

    fn lookup<'a>(root: &'a Mapping, dotted: &str) -> Option<&'a str> {
        let (head, rest) = dotted.split_once('.')?;
        root.get(head)?.pointer(rest)?.as_str()
    }

    #[test]
    fn test_path_reference_reads_file() {
        let dir = TempDir::new().unwrap();
        let secret = dir.path().join("s1");
        fs::write(&secret, "VALUE1\n").unwrap();

        let doc = document(&format!(
            "database:\n  connectionUrl:\n    path: {}\n",
            secret.display()
        ));
        let resolved = resolve(doc).unwrap();

        assert_eq!(lookup(&resolved.root, "database.connectionUrl.value"), Some("VALUE1"));
        assert_eq!(
            lookup(&resolved.root, "database.connectionUrl.path"),
            Some(secret.to_str().unwrap())
        );
        assert_eq!(resolved.secret_paths, BTreeSet::from([secret]));
    }

    #[test]
    fn test_reresolution_picks_up_new_contents() {
        let dir = TempDir::new().unwrap();
        let secret = dir.path().join("s1");
        fs::write(&secret, "VALUE1").unwrap();
        let doc = document(&format!(
            "oidcAuthentication:\n  clientSecret:\n    path: {}\n",
            secret.display()
        ));

        let first = resolve(doc.clone()).unwrap();
        let again = resolve(doc.clone()).unwrap();
        assert_eq!(first, again);

        fs::write(&secret, "SECRET1").unwrap();
        let changed = resolve(doc).unwrap();
        assert_eq!(
            lookup(&changed.root, "oidcAuthentication.clientSecret.value"),
            Some("SECRET1")
        );
        assert_eq!(
            lookup(&changed.root, "oidcAuthentication.clientSecret.path"),
            Some(secret.to_str().unwrap())
        );
    }

    #[test]
    fn test_path_takes_precedence_over_inline_value() {
        let dir = TempDir::new().unwrap();
        let secret = dir.path().join("s1");
        fs::write(&secret, "from-file").unwrap();
        let doc = document(&format!(
            "amqp:\n  connection:\n    path: {}\n    value: inline\n",
            secret.display()
        ));

        let resolved = resolve(doc).unwrap();
        assert_eq!(lookup(&resolved.root, "amqp.connection.value"), Some("from-file"));
    }

    #[test]
    fn test_inline_value_kept_when_path_empty() {
        let doc = document("database:\n  connectionUrl:\n    path: \"\"\n    value: inline\n");
        let resolved = resolve(doc).unwrap();
        assert_eq!(lookup(&resolved.root, "database.connectionUrl.value"), Some("inline"));
        assert!(resolved.secret_paths.is_empty());
    }

    #[test]
    fn test_undeclared_path_keys_left_alone() {
        let doc = document(
            "opaServerAuthorization:\n  url: http://opa\n  tags:\n    path: /api/v1\n\
             tracing:\n  otelHttp:\n    headers:\n      path: /nonexistent/confhub/header\n",
        );
        let resolved = resolve(doc.clone()).unwrap();

        assert_eq!(resolved.root, doc);
        assert!(resolved.secret_paths.is_empty());
        assert_eq!(
            lookup(&resolved.root, "opaServerAuthorization.tags.path"),
            Some("/api/v1")
        );
    }

    #[test]
    fn test_replica_list_resolved_item_by_item() {
        let dir = TempDir::new().unwrap();
        let secret = dir.path().join("replica");
        fs::write(&secret, "replica-url").unwrap();
        let doc = document(&format!(
            "database:\n  replicaConnectionUrls:\n    - path: {}\n    - value: inline\n",
            secret.display()
        ));

        let resolved = resolve(doc).unwrap();
        let replicas = resolved
            .root
            .get("database")
            .and_then(|db| db.pointer("replicaConnectionUrls"))
            .unwrap();
        match replicas {
            Value::Sequence(items) => {
                assert_eq!(items[0].pointer("value").and_then(Value::as_str), Some("replica-url"));
                assert_eq!(items[1].pointer("value").and_then(Value::as_str), Some("inline"));
            }
            other => panic!("期望序列, 实际: {other:?}"),
        }
        assert_eq!(resolved.secret_paths, BTreeSet::from([secret]));
    }

    #[test]
    fn test_field_below_list_items() {
        let dir = TempDir::new().unwrap();
        let secret = dir.path().join("token");
        fs::write(&secret, "t0ken\r\n").unwrap();
        let doc = document(&format!(
            "services:\n  - name: a\n    token:\n      path: {}\n  - name: b\n",
            secret.display()
        ));

        let resolved = resolve_secrets(doc, &["services[].token"]).unwrap();
        let Some(Value::Sequence(items)) = resolved.root.get("services") else {
            panic!("期望序列");
        };
        assert_eq!(items[0].pointer("token.value").and_then(Value::as_str), Some("t0ken"));
        assert!(items[1].pointer("token").is_none());
    }

    #[test]
    fn test_absent_fields_skipped() {
        let resolved = resolve(document("server:\n  port: 8080\n")).unwrap();
        assert!(resolved.secret_paths.is_empty());
    }

    #[test]
    fn test_missing_secret_file_fails() {
        let doc = document("amqp:\n  connection:\n    path: /nonexistent/confhub/secret\n");
        match resolve(doc) {
            Err(ConfigError::SecretRead { path, .. }) => {
                assert_eq!(path, PathBuf::from("/nonexistent/confhub/secret"))
            }
            other => panic!("期望密钥读取错误, 实际: {other:?}"),
        }
    }
}
