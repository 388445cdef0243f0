use std::sync::OnceLock;

use gcp_bigquery_client::error::BQError;
use gcp_bigquery_client::model::error_proto::ErrorProto;
use regex::Regex;

use super::bq_error::{BigQueryError, QueryErrorLocation};

/// Classifies an API-level error (request rejected, auth, transport).
pub fn parse_bq_error(error: BQError, context: ErrorContext) -> BigQueryError {
    match &error {
        BQError::ResponseError { error: resp } => {
            let reason = resp.error.errors
                .first()
                .and_then(|e| e.get("reason").map(|s| s.as_str()));
            classify(Some(resp.error.code), reason, &resp.error.message, context)
                .unwrap_or_else(|| BigQueryError::Unknown {
                    code: reason.map(|s| s.to_string()),
                    message: resp.error.message.clone(),
                    raw_error: format!("{:?}", resp),
                })
        }

        BQError::RequestError(req_err) => {
            BigQueryError::ConnectionFailed {
                reason: req_err.to_string(),
            }
        }

        BQError::NoToken => {
            BigQueryError::AuthenticationFailed {
                reason: "No authentication token available".to_string(),
            }
        }

        BQError::YupAuthError(yup_err) => {
            BigQueryError::AuthenticationFailed {
                reason: yup_err.to_string(),
            }
        }

        BQError::InvalidServiceAccountKey(io_err)
        | BQError::InvalidServiceAccountAuthenticator(io_err) => {
            BigQueryError::InvalidCredentials {
                path: std::env::var("GOOGLE_APPLICATION_CREDENTIALS").ok(),
                reason: io_err.to_string(),
            }
        }

        BQError::InvalidApplicationDefaultCredentialsAuthenticator(io_err) => {
            BigQueryError::AuthenticationFailed {
                reason: io_err.to_string(),
            }
        }

        BQError::SerializationError(serde_err) => {
            BigQueryError::Unknown {
                code: Some("SERIALIZATION".to_string()),
                message: serde_err.to_string(),
                raw_error: error.to_string(),
            }
        }

        BQError::ConnectionPoolError(msg) => {
            BigQueryError::ConnectionFailed {
                reason: msg.clone(),
            }
        }

        _ => BigQueryError::Unknown {
            code: None,
            message: error.to_string(),
            raw_error: format!("{:?}", error),
        }
    }
}

/// Classifies the `errorResult` of a job that finished in a failed state.
pub fn parse_job_error(job_id: &str, proto: &ErrorProto, context: ErrorContext) -> BigQueryError {
    let message = proto.message.clone().unwrap_or_else(|| "job failed without a message".to_string());
    let reason = proto.reason.as_deref();

    classify(None, reason, &message, context).unwrap_or_else(|| BigQueryError::JobFailed {
        job_id: job_id.to_string(),
        reason: reason.map(|s| s.to_string()),
        message,
    })
}

/// Shared reason table for API responses and job results. Job results carry
/// no HTTP status, so `status` is optional; `None` means nothing matched.
fn classify(
    status: Option<i64>,
    reason: Option<&str>,
    message: &str,
    context: ErrorContext,
) -> Option<BigQueryError> {
    let msg_lower = message.to_lowercase();

    let classified = match (status, reason) {
        (_, Some("invalidQuery")) => BigQueryError::InvalidQuery {
            sql_preview: context.sql.unwrap_or_default(),
            message: message.to_string(),
            position: extract_query_location(message),
        },

        (_, Some("invalid")) if msg_lower.contains("different location")
            || msg_lower.contains("location mismatch") => BigQueryError::LocationMismatch {
            message: message.to_string(),
            location: context.location,
        },

        (_, Some("invalid")) if msg_lower.contains("schema") => BigQueryError::SchemaMismatch {
            message: message.to_string(),
            field: extract_field_name(message),
        },

        (_, Some("invalid")) if msg_lower.contains("syntax") => BigQueryError::InvalidQuery {
            sql_preview: context.sql.unwrap_or_default(),
            message: message.to_string(),
            position: extract_query_location(message),
        },

        (_, Some("resourcesExceeded")) | (_, Some("responseTooLarge")) => {
            BigQueryError::ResourcesExceeded {
                message: message.to_string(),
            }
        }

        (_, Some("timeout")) => BigQueryError::Timeout {
            operation: context.operation.unwrap_or_else(|| "job".to_string()),
        },

        (_, Some("accessDenied")) => BigQueryError::AccessDenied {
            resource: context.resource.unwrap_or_else(|| "resource".to_string()),
            required_permission: extract_required_permission(message),
        },

        (_, Some("quotaExceeded")) | (_, Some("rateLimitExceeded")) => {
            BigQueryError::QuotaExceeded {
                quota_type: extract_quota_type(message).unwrap_or_else(|| "API".to_string()),
                message: message.to_string(),
            }
        }

        (Some(404), _) | (_, Some("notFound")) => parse_not_found_error(message, &context),

        (Some(status @ 500..=599), _) => BigQueryError::Unknown {
            code: Some(format!("HTTP_{}", status)),
            message: format!("BigQuery server error: {}", message),
            raw_error: message.to_string(),
        },

        _ => return None,
    };

    Some(classified)
}

struct Patterns {
    table: Regex,
    dataset: Regex,
    line_col: Regex,
    field: Regex,
    permission: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let re = |p: &str| Regex::new(p).unwrap();
        Patterns {
            // "Not found: Table project:dataset.table"
            table: re(r"(?i)table\s+([^:\s]+):([^.\s]+)\.([^\s]+)"),
            // "Not found: Dataset project:dataset"
            dataset: re(r"(?i)dataset\s+([^:\s]+):([^\s]+)"),
            line_col: re(r"\[(\d+):(\d+)\]"),
            field: re(r"(?i)field:?\s+'?([A-Za-z_][A-Za-z0-9_]*)"),
            permission: re(r"((?:bigquery|storage)\.[a-zA-Z.]+[a-zA-Z])"),
        }
    })
}

fn parse_not_found_error(message: &str, context: &ErrorContext) -> BigQueryError {
    let msg_lower = message.to_lowercase();

    if msg_lower.contains("table") {
        if let Some(caps) = patterns().table.captures(message) {
            return BigQueryError::TableNotFound {
                project: caps[1].to_string(),
                dataset: caps[2].to_string(),
                table: caps[3].to_string(),
            };
        }
        if let (Some(project), Some(dataset), Some(table)) = (&context.project, &context.dataset, &context.table) {
            return BigQueryError::TableNotFound {
                project: project.clone(),
                dataset: dataset.clone(),
                table: table.clone(),
            };
        }
    }

    if msg_lower.contains("dataset") {
        if let Some(caps) = patterns().dataset.captures(message) {
            return BigQueryError::DatasetNotFound {
                project: caps[1].to_string(),
                dataset: caps[2].to_string(),
            };
        }
        if let (Some(project), Some(dataset)) = (&context.project, &context.dataset) {
            return BigQueryError::DatasetNotFound {
                project: project.clone(),
                dataset: dataset.clone(),
            };
        }
    }

    // URIs that matched no files end up here too.
    BigQueryError::Unknown {
        code: Some("notFound".to_string()),
        message: message.to_string(),
        raw_error: message.to_string(),
    }
}

fn extract_query_location(message: &str) -> Option<QueryErrorLocation> {
    let caps = patterns().line_col.captures(message)?;
    Some(QueryErrorLocation {
        line: caps[1].parse().ok()?,
        column: caps[2].parse().ok(),
    })
}

fn extract_field_name(message: &str) -> Option<String> {
    patterns().field.captures(message).map(|caps| caps[1].to_string())
}

fn extract_required_permission(message: &str) -> Option<String> {
    patterns().permission.captures(message).map(|caps| caps[1].to_string())
}

fn extract_quota_type(message: &str) -> Option<String> {
    let msg_lower = message.to_lowercase();

    if msg_lower.contains("concurrent") {
        Some("concurrent queries".to_string())
    } else if msg_lower.contains("extract") {
        Some("extract bytes".to_string())
    } else if msg_lower.contains("load") {
        Some("load jobs".to_string())
    } else if msg_lower.contains("rate") {
        Some("rate limit".to_string())
    } else {
        None
    }
}

#[derive(Debug, Default, Clone)]
pub struct ErrorContext {
    pub sql: Option<String>,
    pub operation: Option<String>,
    pub resource: Option<String>,
    pub project: Option<String>,
    pub dataset: Option<String>,
    pub table: Option<String>,
    pub location: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        let full_sql = sql.into();
        self.sql = Some(match full_sql.char_indices().nth(500) {
            Some((cut, _)) => format!("{}...", &full_sql[..cut]),
            None => full_sql,
        });
        self
    }

    pub fn with_operation(mut self, op: impl Into<String>) -> Self {
        self.operation = Some(op.into());
        self
    }

    pub fn with_dataset(mut self, project: impl Into<String>, dataset: impl Into<String>) -> Self {
        let project = project.into();
        let dataset = dataset.into();
        self.resource = Some(format!("{}.{}", project, dataset));
        self.project = Some(project);
        self.dataset = Some(dataset);
        self
    }

    pub fn with_table(mut self, project: impl Into<String>, dataset: impl Into<String>, table: impl Into<String>) -> Self {
        let (project, dataset, table) = (project.into(), dataset.into(), table.into());
        self.resource = Some(format!("{}.{}.{}", project, dataset, table));
        self.project = Some(project);
        self.dataset = Some(dataset);
        self.table = Some(table);
        self
    }

    pub fn with_location(mut self, location: Option<&str>) -> Self {
        self.location = location.map(|l| l.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proto(reason: &str, message: &str) -> ErrorProto {
        ErrorProto {
            reason: Some(reason.to_string()),
            message: Some(message.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_job_error_invalid_query_keeps_sql_preview() {
        let ctx = ErrorContext::new().with_sql("SELECT x FROM t WHERE");
        let err = parse_job_error("j1", &proto("invalidQuery", "Syntax error: Unexpected end of script at [1:22]"), ctx);

        match err {
            BigQueryError::InvalidQuery { sql_preview, position, .. } => {
                assert_eq!(sql_preview, "SELECT x FROM t WHERE");
                assert_eq!(position, Some(QueryErrorLocation { line: 1, column: Some(22) }));
            }
            other => panic!("Expected InvalidQuery, got {:?}", other),
        }
    }

    #[test]
    fn test_job_error_location_mismatch() {
        let ctx = ErrorContext::new().with_location(Some("EU"));
        let err = parse_job_error(
            "j2",
            &proto("invalid", "Cannot read and write in different locations: source: US, destination: EU"),
            ctx,
        );

        match err {
            BigQueryError::LocationMismatch { location, .. } => assert_eq!(location, Some("EU".to_string())),
            other => panic!("Expected LocationMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_job_error_schema_mismatch_extracts_field() {
        let err = parse_job_error(
            "j3",
            &proto("invalid", "Provided Schema does not match Table p:d.t. Field amount has changed type from INTEGER to STRING"),
            ErrorContext::new(),
        );

        match err {
            BigQueryError::SchemaMismatch { field, .. } => assert_eq!(field, Some("amount".to_string())),
            other => panic!("Expected SchemaMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_job_error_not_found_table() {
        let err = parse_job_error(
            "j4",
            &proto("notFound", "Not found: Table my-project:staging.report_20240101000000"),
            ErrorContext::new(),
        );

        match err {
            BigQueryError::TableNotFound { project, dataset, table } => {
                assert_eq!(project, "my-project");
                assert_eq!(dataset, "staging");
                assert_eq!(table, "report_20240101000000");
            }
            other => panic!("Expected TableNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_job_error_not_found_uri_is_generic() {
        let err = parse_job_error(
            "j5",
            &proto("notFound", "Not found: URI gs://bucket/exports/missing_*.csv"),
            ErrorContext::new(),
        );
        assert!(err.is_not_found());
        assert_eq!(err.error_code(), "UNKNOWN");
    }

    #[test]
    fn test_job_error_unclassified_becomes_job_failed() {
        let err = parse_job_error("j6", &proto("stopped", "Job execution was cancelled"), ErrorContext::new());

        match err {
            BigQueryError::JobFailed { job_id, reason, message } => {
                assert_eq!(job_id, "j6");
                assert_eq!(reason, Some("stopped".to_string()));
                assert_eq!(message, "Job execution was cancelled");
            }
            other => panic!("Expected JobFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_job_error_without_message() {
        let err = parse_job_error("j7", &ErrorProto::default(), ErrorContext::new());
        assert!(err.to_string().contains("job failed without a message"));
    }

    #[test]
    fn test_extract_required_permission_storage() {
        let msg = "Access Denied: does not have storage.objects.create access to the Google Cloud Storage object.";
        assert_eq!(extract_required_permission(msg), Some("storage.objects.create".to_string()));
    }

    #[test]
    fn test_extract_quota_type_extract() {
        assert_eq!(
            extract_quota_type("Quota exceeded: Your project exceeded quota for extract bytes per day"),
            Some("extract bytes".to_string())
        );
    }

    #[test]
    fn test_error_context_sql_truncation() {
        let long_sql = "SELECT ".to_string() + &"x, ".repeat(500);
        let ctx = ErrorContext::new().with_sql(long_sql);
        assert!(ctx.sql.as_ref().unwrap().len() <= 503);
        assert!(ctx.sql.as_ref().unwrap().ends_with("..."));
    }

    #[test]
    fn test_error_context_with_table() {
        let ctx = ErrorContext::new().with_table("my-project", "my_dataset", "my_table");
        assert_eq!(ctx.project, Some("my-project".to_string()));
        assert_eq!(ctx.table, Some("my_table".to_string()));
        assert_eq!(ctx.resource, Some("my-project.my_dataset.my_table".to_string()));
    }

    #[test]
    fn test_parse_not_found_dataset_from_context() {
        let ctx = ErrorContext::new().with_dataset("ctx-project", "gcpy");
        let err = parse_not_found_error("Dataset is gone", &ctx);

        match err {
            BigQueryError::DatasetNotFound { project, dataset } => {
                assert_eq!(project, "ctx-project");
                assert_eq!(dataset, "gcpy");
            }
            other => panic!("Expected DatasetNotFound, got {:?}", other),
        }
    }
}
