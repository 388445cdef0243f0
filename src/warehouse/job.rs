use std::fmt;
use std::time::Duration;

use crate::schema::LoadSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Query,
    Extract,
    Load,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Query => "query",
            JobKind::Extract => "extract",
            JobKind::Load => "load",
        }
    }

    /// Generated client-side and reused when polling.
    pub fn new_job_id(&self) -> String {
        format!("bqferry_{}_{}", self.as_str(), uuid::Uuid::new_v4().simple())
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A job that reached `DONE` without an error result.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub job_id: String,
    pub kind: JobKind,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileFormat {
    #[default]
    Csv,
    Json,
    Avro,
    Parquet,
}

impl FileFormat {
    /// Name used in job configurations.
    pub fn api_name(&self) -> &'static str {
        match self {
            FileFormat::Csv => "CSV",
            FileFormat::Json => "NEWLINE_DELIMITED_JSON",
            FileFormat::Avro => "AVRO",
            FileFormat::Parquet => "PARQUET",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            FileFormat::Csv => "csv",
            FileFormat::Json => "json",
            FileFormat::Avro => "avro",
            FileFormat::Parquet => "parquet",
        }
    }

    pub fn is_delimited(&self) -> bool {
        matches!(self, FileFormat::Csv)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    None,
    Gzip,
    Snappy,
    Deflate,
}

impl Compression {
    pub fn api_name(&self) -> Option<&'static str> {
        match self {
            Compression::None => None,
            Compression::Gzip => Some("GZIP"),
            Compression::Snappy => Some("SNAPPY"),
            Compression::Deflate => Some("DEFLATE"),
        }
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            Compression::Gzip => ".gz",
            _ => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractOptions {
    pub format: FileFormat,
    pub compression: Compression,
    pub print_header: bool,
    pub field_delimiter: Option<String>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            format: FileFormat::Csv,
            compression: Compression::None,
            print_header: true,
            field_delimiter: None,
        }
    }
}

impl ExtractOptions {
    pub fn with_format(mut self, format: FileFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// File suffix of the shards this extract writes, e.g. `csv.gz`.
    pub fn file_suffix(&self) -> String {
        format!("{}{}", self.format.extension(), self.compression.suffix())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadOptions {
    pub schema: LoadSchema,
    pub format: FileFormat,
    /// Header rows to skip in delimited files.
    pub skip_leading_rows: u32,
    pub field_delimiter: Option<String>,
    pub location: Option<String>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            schema: LoadSchema::Auto,
            format: FileFormat::Csv,
            skip_leading_rows: 1,
            field_delimiter: None,
            location: None,
        }
    }
}

impl LoadOptions {
    pub fn with_schema(mut self, schema: LoadSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_skip_leading_rows(mut self, rows: u32) -> Self {
        self.skip_leading_rows = rows;
        self
    }

    pub fn with_format(mut self, format: FileFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// Polling cadence while waiting on a job. Waits are unbounded.
#[derive(Debug, Clone)]
pub struct JobPollConfig {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub multiplier: u32,
}

impl Default for JobPollConfig {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(5),
            multiplier: 2,
        }
    }
}

impl JobPollConfig {
    pub fn next_interval(&self, current: Duration) -> Duration {
        (current * self.multiplier).min(self.max_interval)
    }
}
