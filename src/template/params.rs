use std::collections::BTreeMap;
use std::fmt::Display;
use std::fs;
use std::path::Path;

use crate::error::{FerryError, Result};

/// Placeholder values, already rendered to their textual form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams {
    values: BTreeMap<String, String>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Display) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Display) {
        self.values.insert(key.into(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Parses `key=value` pairs as given on the command line. The value may
    /// itself contain `=`.
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut params = Self::new();
        for pair in pairs {
            let pair = pair.as_ref();
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                FerryError::InvalidParameter(format!("Expected key=value, got '{}'", pair))
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(FerryError::InvalidParameter(format!("Empty key in '{}'", pair)));
            }
            params.insert(key, value);
        }
        Ok(params)
    }

    /// Reads a flat mapping of scalar values; `.json` files with serde_json,
    /// anything else as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        if path.extension().is_some_and(|ext| ext == "json") {
            Self::parse_json(&content)
        } else {
            Self::parse_mapping(&content)
        }
    }

    pub fn parse_mapping(content: &str) -> Result<Self> {
        let mapping: BTreeMap<String, serde_yaml::Value> = serde_yaml::from_str(content)?;

        let mut params = Self::new();
        for (key, value) in mapping {
            let rendered = match value {
                serde_yaml::Value::String(s) => s,
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::Bool(b) => b.to_string(),
                serde_yaml::Value::Null => "NULL".to_string(),
                other => return Err(not_scalar(&key, &other)),
            };
            params.values.insert(key, rendered);
        }
        Ok(params)
    }

    pub fn parse_json(content: &str) -> Result<Self> {
        let mapping: BTreeMap<String, serde_json::Value> = serde_json::from_str(content)?;

        let mut params = Self::new();
        for (key, value) in mapping {
            let rendered = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                serde_json::Value::Null => "NULL".to_string(),
                other => return Err(not_scalar(&key, &other)),
            };
            params.values.insert(key, rendered);
        }
        Ok(params)
    }

    /// Later values win.
    pub fn merge(mut self, other: QueryParams) -> Self {
        self.values.extend(other.values);
        self
    }
}

fn not_scalar(key: &str, value: &impl std::fmt::Debug) -> FerryError {
    FerryError::InvalidParameter(format!("Parameter '{}' must be a scalar, got {:?}", key, value))
}

impl<K: Into<String>, V: Display> FromIterator<(K, V)> for QueryParams {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut params = Self::new();
        for (key, value) in iter {
            params.insert(key, value);
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_pairs() {
        let params = QueryParams::from_pairs(["limit=10", "filter=a=b"]).unwrap();
        assert_eq!(params.get("limit"), Some("10"));
        assert_eq!(params.get("filter"), Some("a=b"));
    }

    #[test]
    fn test_from_pairs_rejects_missing_equals() {
        assert!(matches!(
            QueryParams::from_pairs(["limit"]),
            Err(FerryError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_parse_mapping_renders_scalars() {
        let params = QueryParams::parse_mapping("limit: 10\nratio: 0.5\nregion: apac\nactive: true\nmissing: ~\n").unwrap();
        assert_eq!(params.get("limit"), Some("10"));
        assert_eq!(params.get("ratio"), Some("0.5"));
        assert_eq!(params.get("region"), Some("apac"));
        assert_eq!(params.get("active"), Some("true"));
        assert_eq!(params.get("missing"), Some("NULL"));
    }

    #[test]
    fn test_parse_mapping_accepts_json() {
        let params = QueryParams::parse_mapping(r#"{"start_date": "2024-01-01", "n": 3}"#).unwrap();
        assert_eq!(params.get("start_date"), Some("2024-01-01"));
        assert_eq!(params.get("n"), Some("3"));
    }

    #[test]
    fn test_parse_json_renders_scalars() {
        let params = QueryParams::parse_json(r#"{"n": 3, "ratio": 0.25, "on": false, "gone": null, "d": "2024-01-01"}"#).unwrap();
        assert_eq!(params.get("n"), Some("3"));
        assert_eq!(params.get("ratio"), Some("0.25"));
        assert_eq!(params.get("on"), Some("false"));
        assert_eq!(params.get("gone"), Some("NULL"));
        assert_eq!(params.get("d"), Some("2024-01-01"));
    }

    #[test]
    fn test_parse_json_errors() {
        assert!(matches!(QueryParams::parse_json(r#"{"ids": [1]}"#), Err(FerryError::InvalidParameter(_))));
        assert!(matches!(QueryParams::parse_json("ids: 1"), Err(FerryError::Json(_))));
    }

    #[test]
    fn test_parse_mapping_rejects_lists() {
        assert!(QueryParams::parse_mapping("ids: [1, 2]").is_err());
    }

    #[test]
    fn test_merge_prefers_later_values() {
        let merged = QueryParams::new().with("a", 1).with("b", 2)
            .merge(QueryParams::new().with("b", 3));
        assert_eq!(merged.get("a"), Some("1"));
        assert_eq!(merged.get("b"), Some("3"));
    }
}
