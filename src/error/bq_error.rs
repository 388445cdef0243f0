use thiserror::Error;

/// A BigQuery failure sorted into the cases a user can act on.
///
/// Request-level errors and failed job results both end up here; see
/// [`parse_bq_error`](super::parse_bq_error) and
/// [`parse_job_error`](super::parse_job_error).
#[derive(Error, Debug, Clone)]
pub enum BigQueryError {
    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("Invalid credentials: {reason}{}", in_path(.path))]
    InvalidCredentials { path: Option<String>, reason: String },

    #[error("Could not reach BigQuery: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Invalid SQL: {message}{}{}", at_position(.position), preview(.sql_preview))]
    InvalidQuery {
        sql_preview: String,
        message: String,
        position: Option<QueryErrorLocation>,
    },

    #[error("Table not found: {project}.{dataset}.{table}")]
    TableNotFound {
        project: String,
        dataset: String,
        table: String,
    },

    #[error("Dataset not found: {project}.{dataset}")]
    DatasetNotFound { project: String, dataset: String },

    #[error("Access denied to {resource}{}", requiring(.required_permission))]
    AccessDenied {
        resource: String,
        required_permission: Option<String>,
    },

    #[error("Quota exceeded ({quota_type}): {message}")]
    QuotaExceeded { quota_type: String, message: String },

    #[error("Resources exceeded: {message}")]
    ResourcesExceeded { message: String },

    #[error("{operation} timed out")]
    Timeout { operation: String },

    #[error("Schema mismatch{}: {message}", on_field(.field))]
    SchemaMismatch {
        message: String,
        field: Option<String>,
    },

    #[error("Location mismatch: {message}")]
    LocationMismatch {
        message: String,
        location: Option<String>,
    },

    /// A job reached `DONE` with an error result the other variants do not cover.
    #[error("Job {job_id} failed{}: {message}", bracketed(.reason))]
    JobFailed {
        job_id: String,
        reason: Option<String>,
        message: String,
    },

    #[error("BigQuery error{}: {message}", bracketed(.code))]
    Unknown {
        code: Option<String>,
        message: String,
        raw_error: String,
    },
}

/// 1-based line and column reported for a query error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryErrorLocation {
    pub line: u32,
    pub column: Option<u32>,
}

fn in_path(path: &Option<String>) -> String {
    path.as_ref().map(|p| format!(" (path: {p})")).unwrap_or_default()
}

fn at_position(position: &Option<QueryErrorLocation>) -> String {
    match position {
        Some(QueryErrorLocation { line, column: Some(col) }) => format!(" (line {line}, column {col})"),
        Some(QueryErrorLocation { line, column: None }) => format!(" (line {line})"),
        None => String::new(),
    }
}

fn preview(sql: &str) -> String {
    if sql.is_empty() {
        String::new()
    } else {
        format!("\n\nSQL preview:\n  {sql}")
    }
}

fn requiring(permission: &Option<String>) -> String {
    permission.as_ref().map(|p| format!(" (requires {p})")).unwrap_or_default()
}

fn on_field(field: &Option<String>) -> String {
    field.as_ref().map(|f| format!(" on field '{f}'")).unwrap_or_default()
}

fn bracketed(tag: &Option<String>) -> String {
    tag.as_ref().map(|t| format!(" [{t}]")).unwrap_or_default()
}

impl BigQueryError {
    /// Short stable identifier, printed next to the message by the CLI.
    pub fn error_code(&self) -> &'static str {
        match self {
            BigQueryError::AuthenticationFailed { .. } => "AUTH_FAILED",
            BigQueryError::InvalidCredentials { .. } => "INVALID_CREDENTIALS",
            BigQueryError::ConnectionFailed { .. } => "CONNECTION_FAILED",
            BigQueryError::InvalidQuery { .. } => "INVALID_QUERY",
            BigQueryError::TableNotFound { .. } => "TABLE_NOT_FOUND",
            BigQueryError::DatasetNotFound { .. } => "DATASET_NOT_FOUND",
            BigQueryError::AccessDenied { .. } => "ACCESS_DENIED",
            BigQueryError::QuotaExceeded { .. } => "QUOTA_EXCEEDED",
            BigQueryError::ResourcesExceeded { .. } => "RESOURCES_EXCEEDED",
            BigQueryError::Timeout { .. } => "TIMEOUT",
            BigQueryError::SchemaMismatch { .. } => "SCHEMA_MISMATCH",
            BigQueryError::LocationMismatch { .. } => "LOCATION_MISMATCH",
            BigQueryError::JobFailed { .. } => "JOB_FAILED",
            BigQueryError::Unknown { .. } => "UNKNOWN",
        }
    }

    /// Things to try, one per line.
    pub fn hints(&self) -> Vec<String> {
        match self {
            BigQueryError::AuthenticationFailed { .. } | BigQueryError::InvalidCredentials { .. } => vec![
                "gcloud auth application-default login".into(),
                "or point GOOGLE_APPLICATION_CREDENTIALS at a service account key".into(),
            ],
            BigQueryError::ConnectionFailed { .. } => vec![
                "check network access to bigquery.googleapis.com".into(),
                "make sure the BigQuery API is enabled for the project".into(),
            ],
            BigQueryError::InvalidQuery { .. } => vec![
                "render the template with --dry-run and inspect the SQL".into(),
                "parameter values are inserted verbatim, so string values need their own quotes".into(),
            ],
            BigQueryError::TableNotFound { project, dataset, table } => vec![
                format!("bq show {project}:{dataset}.{table}"),
                "temporary tables are dropped after export unless --keep-temp-table is set".into(),
            ],
            BigQueryError::DatasetNotFound { project, dataset } => vec![
                format!("bq show {project}:{dataset}"),
                "load jobs do not create datasets".into(),
            ],
            BigQueryError::AccessDenied { resource, required_permission } => vec![
                format!(
                    "grant {} on {resource}",
                    required_permission.as_deref().unwrap_or("the missing permission")
                ),
                "exports and loads also need storage.objects.* on the bucket".into(),
            ],
            BigQueryError::QuotaExceeded { quota_type, .. } => vec![
                format!("wait for the {quota_type} quota to refill and run again"),
            ],
            BigQueryError::ResourcesExceeded { .. } => vec![
                "filter the query to scan less data".into(),
                "export through a sharded (*) path instead of a single file".into(),
            ],
            BigQueryError::Timeout { .. } => vec![
                "the job may still finish; check it with bq ls -j".into(),
            ],
            BigQueryError::SchemaMismatch { .. } => vec![
                "compare the schema with the file columns, or use --schema auto".into(),
                "check --skip-leading-rows against the number of header rows".into(),
            ],
            BigQueryError::LocationMismatch { location, .. } => vec![
                format!(
                    "pass the region of the source data with --location (current: {})",
                    location.as_deref().unwrap_or("unset")
                ),
                "the staging dataset and the bucket must be in compatible regions".into(),
            ],
            BigQueryError::JobFailed { job_id, .. } => vec![
                format!("bq show -j {job_id}"),
            ],
            BigQueryError::Unknown { .. } => vec![
                "https://status.cloud.google.com/".into(),
            ],
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            BigQueryError::TableNotFound { .. } | BigQueryError::DatasetNotFound { .. } => true,
            BigQueryError::Unknown { code: Some(code), .. } => code == "notFound",
            _ => false,
        }
    }
}
