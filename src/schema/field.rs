use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::FerryError;

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(try_from = "String")]
pub enum BqType {
    String,
    Bytes,
    Int64,
    Float64,
    Numeric,
    Bignumeric,
    Bool,
    Date,
    Datetime,
    Time,
    Timestamp,
    Geography,
    Json,
}

impl BqType {
    /// Standard SQL type name, as sent in a load job schema.
    pub fn as_str(&self) -> &'static str {
        match self {
            BqType::String => "STRING",
            BqType::Bytes => "BYTES",
            BqType::Int64 => "INT64",
            BqType::Float64 => "FLOAT64",
            BqType::Numeric => "NUMERIC",
            BqType::Bignumeric => "BIGNUMERIC",
            BqType::Bool => "BOOL",
            BqType::Date => "DATE",
            BqType::Datetime => "DATETIME",
            BqType::Time => "TIME",
            BqType::Timestamp => "TIMESTAMP",
            BqType::Geography => "GEOGRAPHY",
            BqType::Json => "JSON",
        }
    }
}

impl TryFrom<String> for BqType {
    type Error = FerryError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl fmt::Display for BqType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BqType {
    type Err = FerryError;

    // Accepts legacy SQL aliases (INTEGER, FLOAT, BOOLEAN) alongside standard names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "STRING" => Ok(BqType::String),
            "BYTES" => Ok(BqType::Bytes),
            "INT64" | "INTEGER" | "INT" => Ok(BqType::Int64),
            "FLOAT64" | "FLOAT" => Ok(BqType::Float64),
            "NUMERIC" => Ok(BqType::Numeric),
            "BIGNUMERIC" => Ok(BqType::Bignumeric),
            "BOOL" | "BOOLEAN" => Ok(BqType::Bool),
            "DATE" => Ok(BqType::Date),
            "DATETIME" => Ok(BqType::Datetime),
            "TIME" => Ok(BqType::Time),
            "TIMESTAMP" => Ok(BqType::Timestamp),
            "GEOGRAPHY" => Ok(BqType::Geography),
            "JSON" => Ok(BqType::Json),
            other => Err(FerryError::InvalidSchema(format!("Unknown column type '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldMode {
    #[default]
    Nullable,
    Required,
}

impl FieldMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldMode::Nullable => "NULLABLE",
            FieldMode::Required => "REQUIRED",
        }
    }
}

/// One column of an explicit load schema. Deserializes from an entry of a
/// `bq`-style JSON schema file.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: BqType,
    #[serde(default)]
    pub mode: FieldMode,
}

impl Column {
    pub fn new(name: impl Into<String>, field_type: BqType) -> Self {
        Self {
            name: name.into(),
            field_type,
            mode: FieldMode::default(),
        }
    }

    pub fn required(mut self) -> Self {
        self.mode = FieldMode::Required;
        self
    }
}
