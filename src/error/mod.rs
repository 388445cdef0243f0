mod bq_error;
mod parser;

use thiserror::Error;

pub use bq_error::{BigQueryError, QueryErrorLocation};
pub use parser::{parse_bq_error, parse_job_error, ErrorContext};

#[derive(Error, Debug)]
pub enum FerryError {
    #[error("BigQuery error: {0}")]
    BigQuery(#[from] BigQueryError),

    #[error("BigQuery client error: {0}")]
    Client(String),

    #[error("SQL file not found: {0}")]
    SqlFileNotFound(String),

    #[error("Missing query parameter '{placeholder}' in {template}")]
    MissingParameter {
        placeholder: String,
        template: String,
    },

    #[error("Malformed SQL template {template}: {message}")]
    MalformedTemplate {
        template: String,
        message: String,
    },

    #[error("Invalid query parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid table reference: {0}")]
    InvalidTableRef(String),

    #[error("Invalid storage path: {0}")]
    InvalidStoragePath(String),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("No shard files under {prefix} matching '{file_prefix}'")]
    NoMatchingShards {
        prefix: String,
        file_prefix: String,
    },

    #[error("Exported to {output_uri} but temporary table {table} could not be deleted: {reason}")]
    TempTableLeaked {
        table: String,
        output_uri: String,
        reason: String,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] object_store::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FerryError {
    /// True for failures raised locally before any remote call was made.
    pub fn is_template_error(&self) -> bool {
        matches!(
            self,
            FerryError::SqlFileNotFound(_)
                | FerryError::MissingParameter { .. }
                | FerryError::MalformedTemplate { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FerryError>;
