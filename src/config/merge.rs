//! 配置片段合并
//!
//! 合并顺序只由文件路径决定：按字典序，后面的文件覆盖前面文件中冲突的标量键。
//! 两侧都是映射时递归合并；其余情况（包括序列）整体替换。

use crate::config::document::{Mapping, Value};
use crate::config::loader::Fragment;

/// 合并一组片段
///
/// 输入顺序无关紧要，内部会先按来源路径排序；空输入得到空文档
pub fn merge_fragments(fragments: &[Fragment]) -> Mapping {
    let mut ordered: Vec<&Fragment> = fragments.iter().collect();
    ordered.sort_by(|a, b| a.source.cmp(&b.source));

    ordered.into_iter().fold(Mapping::new(), |mut acc, fragment| {
        deep_merge(&mut acc, &fragment.root);
        acc
    })
}

/// 把 `overlay` 深度合并进 `base`，`overlay` 优先
pub fn deep_merge(base: &mut Mapping, overlay: &Mapping) {
    for (key, overlay_value) in overlay {
        match (base.get_mut(key), overlay_value) {
            (Some(Value::Mapping(base_map)), Value::Mapping(overlay_map)) => {
                deep_merge(base_map, overlay_map);
            }
            _ => {
                base.insert(key.clone(), overlay_value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::{parse_fragment, FragmentFormat};
    use std::path::Path;

    fn fragment(name: &str, yaml: &str) -> Fragment {
        parse_fragment(Path::new(name), yaml, FragmentFormat::Yaml).unwrap()
    }

    fn to_value(mapping: Mapping) -> Value {
        Value::Mapping(mapping)
    }

    #[test]
    fn test_later_file_wins_on_scalar_conflict() {
        let merged = merge_fragments(&[fragment("a.yaml", "x: 1"), fragment("b.yaml", "x: 2")]);
        let expected = fragment("expected.yaml", "x: 2").root;
        assert_eq!(merged, expected);
    }

    #[test]
    fn test_nested_mappings_deep_merge() {
        let merged = merge_fragments(&[
            fragment("a.yaml", "db:\n  host: h1\n"),
            fragment("b.yaml", "db:\n  port: 5432\n"),
        ]);
        let expected = fragment("expected.yaml", "db:\n  host: h1\n  port: 5432\n").root;
        assert_eq!(merged, expected);
    }

    #[test]
    fn test_sequences_replaced_wholesale() {
        let merged = merge_fragments(&[
            fragment("a.yaml", "scopes: [openid, email, profile]\n"),
            fragment("b.yaml", "scopes: [openid]\n"),
        ]);
        let expected = fragment("expected.yaml", "scopes: [openid]\n").root;
        assert_eq!(merged, expected);
    }

    #[test]
    fn test_scalar_replaces_mapping_and_back() {
        let merged = merge_fragments(&[
            fragment("a.yaml", "tracing:\n  enabled: true\n"),
            fragment("b.yaml", "tracing: off\n"),
            fragment("c.yaml", "tracing:\n  type: OTEL_HTTP\n"),
        ]);
        let expected = fragment("expected.yaml", "tracing:\n  type: OTEL_HTTP\n").root;
        assert_eq!(merged, expected);
    }

    #[test]
    fn test_input_order_does_not_matter() {
        let a = fragment("conf/a.yaml", "opa:\n  url: http://a\n  tags:\n    t1: v1\n");
        let b = fragment("conf/b.yaml", "opa:\n  tags:\n    t2: v2\n");
        let c = fragment("conf/sub/c.yaml", "opa:\n  url: http://c\n");

        let forward = merge_fragments(&[a.clone(), b.clone(), c.clone()]);
        let backward = merge_fragments(&[c, b, a]);
        assert_eq!(forward, backward);

        let merged = to_value(forward);
        assert_eq!(merged.pointer("opa.url").and_then(Value::as_str), Some("http://c"));
        assert_eq!(merged.pointer("opa.tags.t1").and_then(Value::as_str), Some("v1"));
        assert_eq!(merged.pointer("opa.tags.t2").and_then(Value::as_str), Some("v2"));
    }

    #[test]
    fn test_empty_input_yields_empty_document() {
        assert!(merge_fragments(&[]).is_empty());
    }
}
