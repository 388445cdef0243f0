use std::fs;
use std::path::Path;

use super::field::{BqType, Column};
use crate::error::{FerryError, Result};

/// Schema handed to a load job: inferred by BigQuery or given column by column.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum LoadSchema {
    #[default]
    Auto,
    Explicit(Vec<Column>),
}

impl LoadSchema {
    pub fn explicit(columns: impl IntoIterator<Item = Column>) -> Self {
        LoadSchema::Explicit(columns.into_iter().collect())
    }

    pub fn is_auto(&self) -> bool {
        matches!(self, LoadSchema::Auto)
    }

    pub fn columns(&self) -> &[Column] {
        match self {
            LoadSchema::Auto => &[],
            LoadSchema::Explicit(columns) => columns,
        }
    }

    /// Parses `auto` or `name:TYPE,name:TYPE`.
    pub fn parse_inline(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.eq_ignore_ascii_case("auto") {
            return Ok(LoadSchema::Auto);
        }

        let mut columns = Vec::new();
        for pair in text.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (name, ty) = pair.split_once(':').ok_or_else(|| {
                FerryError::InvalidSchema(format!("Expected name:TYPE, got '{}'", pair))
            })?;
            columns.push(Column::new(name.trim(), ty.parse::<BqType>()?));
        }

        Self::from_columns(columns)
    }

    /// Parses a YAML mapping of column name to type. Declaration order
    /// becomes column order. A flat JSON object is accepted too.
    pub fn parse_mapping(content: &str) -> Result<Self> {
        let mapping: serde_yaml::Mapping = serde_yaml::from_str(content)?;

        let mut columns = Vec::with_capacity(mapping.len());
        for (key, value) in &mapping {
            let name = key.as_str().ok_or_else(|| {
                FerryError::InvalidSchema(format!("Column names must be strings, got {:?}", key))
            })?;
            let ty = value.as_str().ok_or_else(|| {
                FerryError::InvalidSchema(format!("Type of column '{}' must be a string", name))
            })?;
            columns.push(Column::new(name, ty.parse::<BqType>()?));
        }

        Self::from_columns(columns)
    }

    /// Parses a `bq`-style JSON schema: an array of `{"name", "type", "mode"}`
    /// objects. `mode` defaults to `NULLABLE`.
    pub fn parse_json(content: &str) -> Result<Self> {
        let columns: Vec<Column> = serde_json::from_str(content)?;
        Self::from_columns(columns)
    }

    /// `.json` files hold a `bq` schema array, anything else a YAML mapping.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        if path.extension().is_some_and(|ext| ext == "json") {
            Self::parse_json(&content)
        } else {
            Self::parse_mapping(&content)
        }
    }

    fn from_columns(columns: Vec<Column>) -> Result<Self> {
        if columns.is_empty() {
            return Err(FerryError::InvalidSchema("Explicit schema has no columns".into()));
        }
        for (i, column) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name == column.name) {
                return Err(FerryError::InvalidSchema(format!("Duplicate column '{}'", column.name)));
            }
        }
        Ok(LoadSchema::Explicit(columns))
    }
}
