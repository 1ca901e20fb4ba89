use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Normalized categorical tag values. Ordered so serialized graphs are
/// reproducible.
pub type Tags = BTreeSet<String>;

/// A raw OSM-style tag value as it appears in source exports: the same key
/// can carry one value or several depending on how ways were merged.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum TagValue {
    Text(String),
    Number(f64),
    Flag(bool),
    List(Vec<Option<TagValue>>),
}

impl From<&str> for TagValue {
    fn from(value: &str) -> Self {
        TagValue::Text(value.to_string())
    }
}

/// Flatten a scalar, list or absent tag value into a set of strings.
/// Nulls inside lists are dropped.
pub fn normalize_tags(value: Option<&TagValue>) -> Tags {
    let mut out = Tags::new();
    if let Some(value) = value {
        collect(value, &mut out);
    }
    out
}

fn collect(value: &TagValue, out: &mut Tags) {
    match value {
        TagValue::Text(s) => {
            out.insert(s.clone());
        }
        TagValue::Number(n) => {
            out.insert(n.to_string());
        }
        TagValue::Flag(b) => {
            out.insert(b.to_string());
        }
        TagValue::List(items) => {
            for item in items.iter().flatten() {
                collect(item, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> Tags {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn list_with_nulls() {
        let value = TagValue::List(vec![
            Some("Ferry".into()),
            None,
            Some("Bridge".into()),
        ]);
        assert_eq!(normalize_tags(Some(&value)), set(&["Ferry", "Bridge"]));
    }

    #[test]
    fn absent_and_scalar() {
        assert!(normalize_tags(None).is_empty());
        assert_eq!(normalize_tags(Some(&"Ferry".into())), set(&["Ferry"]));
    }

    #[test]
    fn parses_mixed_json_values() {
        let value: TagValue = serde_json::from_str(r#"["primary", null, ["secondary"], 2]"#).unwrap();
        assert_eq!(
            normalize_tags(Some(&value)),
            set(&["primary", "secondary", "2"])
        );
        let flag: TagValue = serde_json::from_str("true").unwrap();
        assert_eq!(normalize_tags(Some(&flag)), set(&["true"]));
    }
}
