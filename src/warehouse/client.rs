use std::path::Path;
use std::time::Instant;

use async_trait::async_trait;
use gcp_bigquery_client::error::BQError;
use gcp_bigquery_client::model::dataset::Dataset;
use gcp_bigquery_client::model::field_type::FieldType;
use gcp_bigquery_client::model::job::Job;
use gcp_bigquery_client::model::job_configuration::JobConfiguration;
use gcp_bigquery_client::model::job_configuration_extract::JobConfigurationExtract;
use gcp_bigquery_client::model::job_configuration_load::JobConfigurationLoad;
use gcp_bigquery_client::model::job_configuration_query::JobConfigurationQuery;
use gcp_bigquery_client::model::job_reference::JobReference;
use gcp_bigquery_client::model::table_field_schema::TableFieldSchema;
use gcp_bigquery_client::model::table_reference::TableReference;
use gcp_bigquery_client::model::table_schema::TableSchema;
use gcp_bigquery_client::Client;
use tracing::{debug, info};

use super::api::Warehouse;
use super::job::{DeleteOutcome, ExtractOptions, JobKind, JobOutcome, JobPollConfig, LoadOptions};
use crate::error::{parse_bq_error, parse_job_error, ErrorContext, FerryError, Result};
use crate::schema::{BqType, Column, GcsUri, LoadSchema, TableRef};

const WRITE_TRUNCATE: &str = "WRITE_TRUNCATE";
const CREATE_IF_NEEDED: &str = "CREATE_IF_NEEDED";

#[derive(Clone)]
pub struct BqClient {
    client: Client,
    project_id: String,
    poll: JobPollConfig,
}

impl BqClient {
    /// Authenticates with application default credentials.
    pub async fn new(project_id: impl Into<String>) -> Result<Self> {
        let client = Client::from_application_default_credentials()
            .await
            .map_err(|e| {
                let ctx = ErrorContext::new().with_operation("client_init");
                FerryError::BigQuery(parse_bq_error(e, ctx))
            })?;

        Ok(Self::from_client(client, project_id))
    }

    pub async fn from_service_account_key_file(
        key_file: impl AsRef<Path>,
        project_id: impl Into<String>,
    ) -> Result<Self> {
        let key_file = key_file.as_ref().to_string_lossy().to_string();
        let client = Client::from_service_account_key_file(&key_file)
            .await
            .map_err(|e| {
                let ctx = ErrorContext::new().with_operation("client_init");
                FerryError::BigQuery(parse_bq_error(e, ctx))
            })?;

        Ok(Self::from_client(client, project_id))
    }

    pub fn from_client(client: Client, project_id: impl Into<String>) -> Self {
        Self {
            client,
            project_id: project_id.into(),
            poll: JobPollConfig::default(),
        }
    }

    pub fn with_poll_config(mut self, poll: JobPollConfig) -> Self {
        self.poll = poll;
        self
    }

    async fn submit(
        &self,
        kind: JobKind,
        configuration: JobConfiguration,
        location: Option<&str>,
        ctx: ErrorContext,
    ) -> Result<JobOutcome> {
        let job_id = kind.new_job_id();
        let started = Instant::now();

        let job = Job {
            configuration: Some(configuration),
            job_reference: Some(JobReference {
                job_id: Some(job_id.clone()),
                location: location.map(|l| l.to_string()),
                project_id: Some(self.project_id.clone()),
            }),
            ..Default::default()
        };

        let inserted = self.client
            .job()
            .insert(&self.project_id, job)
            .await
            .map_err(|e| FerryError::BigQuery(parse_bq_error(e, ctx.clone())))?;

        info!(job_id = %job_id, kind = %kind, "Starting job");

        // The service reports where it actually placed the job.
        let location = inserted
            .job_reference
            .and_then(|r| r.location)
            .or_else(|| location.map(|l| l.to_string()));

        self.wait_for_job(&job_id, kind, location.as_deref(), ctx, started).await
    }

    async fn wait_for_job(
        &self,
        job_id: &str,
        kind: JobKind,
        location: Option<&str>,
        ctx: ErrorContext,
        started: Instant,
    ) -> Result<JobOutcome> {
        let mut interval = self.poll.initial_interval;

        loop {
            let job = self.client
                .job()
                .get_job(&self.project_id, job_id, location)
                .await
                .map_err(|e| FerryError::BigQuery(parse_bq_error(e, ctx.clone())))?;

            let status = job.status.as_ref();
            let state = status.and_then(|s| s.state.as_deref());

            if state == Some("DONE") {
                if let Some(error) = status.and_then(|s| s.error_result.as_ref()) {
                    return Err(FerryError::BigQuery(parse_job_error(job_id, error, ctx)));
                }

                return Ok(JobOutcome {
                    job_id: job_id.to_string(),
                    kind,
                    elapsed: started.elapsed(),
                });
            }

            debug!(job_id, state = ?state, wait_ms = interval.as_millis() as u64, "Job not done yet");
            tokio::time::sleep(interval).await;
            interval = self.poll.next_interval(interval);
        }
    }

    fn table_reference(table: &TableRef) -> TableReference {
        TableReference::new(&table.project, &table.dataset, &table.table)
    }

    fn build_table_schema(&self, schema: &LoadSchema) -> Option<TableSchema> {
        match schema {
            LoadSchema::Auto => None,
            LoadSchema::Explicit(columns) => Some(TableSchema {
                fields: Some(columns.iter().map(|c| self.build_field_schema(c)).collect()),
            }),
        }
    }

    fn build_field_schema(&self, column: &Column) -> TableFieldSchema {
        let mut tfs = TableFieldSchema::new(&column.name, self.to_field_type(&column.field_type));
        tfs.mode = Some(column.mode.as_str().to_string());
        tfs
    }

    fn to_field_type(&self, bq_type: &BqType) -> FieldType {
        match bq_type {
            BqType::String => FieldType::String,
            BqType::Bytes => FieldType::Bytes,
            BqType::Int64 => FieldType::Int64,
            BqType::Float64 => FieldType::Float64,
            BqType::Numeric => FieldType::Numeric,
            BqType::Bignumeric => FieldType::Bignumeric,
            BqType::Bool => FieldType::Bool,
            BqType::Date => FieldType::Date,
            BqType::Datetime => FieldType::Datetime,
            BqType::Time => FieldType::Time,
            BqType::Timestamp => FieldType::Timestamp,
            BqType::Geography => FieldType::Geography,
            BqType::Json => FieldType::Json,
        }
    }
}

#[async_trait]
impl Warehouse for BqClient {
    fn project_id(&self) -> &str {
        &self.project_id
    }

    async fn create_dataset_if_absent(&self, project: &str, dataset: &str, location: &str) -> Result<()> {
        let mut ds = Dataset::new(project, dataset);
        ds.location = Some(location.to_string());

        match self.client.dataset().create(ds).await {
            Ok(_) => {
                info!(dataset = %format!("{}.{}", project, dataset), location, "Created dataset");
                Ok(())
            }
            Err(BQError::ResponseError { error }) if error.error.code == 409 => {
                debug!(dataset = %format!("{}.{}", project, dataset), "Dataset already exists");
                Ok(())
            }
            Err(e) => {
                let ctx = ErrorContext::new()
                    .with_operation("create_dataset")
                    .with_dataset(project, dataset)
                    .with_location(Some(location));
                Err(FerryError::BigQuery(parse_bq_error(e, ctx)))
            }
        }
    }

    async fn run_query(&self, sql: &str, destination: &TableRef, location: Option<&str>) -> Result<JobOutcome> {
        let configuration = JobConfiguration {
            query: Some(JobConfigurationQuery {
                query: sql.to_string(),
                destination_table: Some(Self::table_reference(destination)),
                write_disposition: Some(WRITE_TRUNCATE.to_string()),
                create_disposition: Some(CREATE_IF_NEEDED.to_string()),
                use_legacy_sql: Some(false),
                ..Default::default()
            }),
            ..Default::default()
        };

        let ctx = ErrorContext::new()
            .with_operation("query")
            .with_table(&destination.project, &destination.dataset, &destination.table)
            .with_location(location)
            .with_sql(sql);

        self.submit(JobKind::Query, configuration, location, ctx).await
    }

    async fn run_extract(
        &self,
        source: &TableRef,
        destination: &GcsUri,
        location: Option<&str>,
        options: &ExtractOptions,
    ) -> Result<JobOutcome> {
        let configuration = JobConfiguration {
            extract: Some(JobConfigurationExtract {
                source_table: Some(Self::table_reference(source)),
                destination_uris: Some(vec![destination.to_string()]),
                destination_format: Some(options.format.api_name().to_string()),
                compression: options.compression.api_name().map(|c| c.to_string()),
                print_header: options.format.is_delimited().then_some(options.print_header),
                field_delimiter: options.field_delimiter.clone(),
                ..Default::default()
            }),
            ..Default::default()
        };

        let ctx = ErrorContext::new()
            .with_operation("extract")
            .with_table(&source.project, &source.dataset, &source.table)
            .with_location(location);

        self.submit(JobKind::Extract, configuration, location, ctx).await
    }

    async fn run_load(&self, sources: &[GcsUri], destination: &TableRef, options: &LoadOptions) -> Result<JobOutcome> {
        let delimited = options.format.is_delimited();

        let configuration = JobConfiguration {
            load: Some(JobConfigurationLoad {
                source_uris: Some(sources.iter().map(|u| u.to_string()).collect()),
                destination_table: Some(Self::table_reference(destination)),
                source_format: Some(options.format.api_name().to_string()),
                write_disposition: Some(WRITE_TRUNCATE.to_string()),
                create_disposition: Some(CREATE_IF_NEEDED.to_string()),
                autodetect: Some(options.schema.is_auto()),
                schema: self.build_table_schema(&options.schema),
                skip_leading_rows: delimited.then_some(options.skip_leading_rows as i32),
                field_delimiter: if delimited { options.field_delimiter.clone() } else { None },
                ..Default::default()
            }),
            ..Default::default()
        };

        let ctx = ErrorContext::new()
            .with_operation("load")
            .with_table(&destination.project, &destination.dataset, &destination.table)
            .with_location(options.location.as_deref());

        self.submit(JobKind::Load, configuration, options.location.as_deref(), ctx).await
    }

    async fn delete_table(&self, table: &TableRef) -> Result<DeleteOutcome> {
        match self.client.table().delete(&table.project, &table.dataset, &table.table).await {
            Ok(_) => Ok(DeleteOutcome::Deleted),
            Err(BQError::ResponseError { error }) if error.error.code == 404 => Ok(DeleteOutcome::NotFound),
            Err(e) => {
                let ctx = ErrorContext::new()
                    .with_operation("delete_table")
                    .with_table(&table.project, &table.dataset, &table.table);
                Err(FerryError::BigQuery(parse_bq_error(e, ctx)))
            }
        }
    }

    async fn table_row_count(&self, table: &TableRef) -> Result<Option<u64>> {
        let metadata = self.client
            .table()
            .get(&table.project, &table.dataset, &table.table, None)
            .await
            .map_err(|e| {
                let ctx = ErrorContext::new()
                    .with_operation("get_table")
                    .with_table(&table.project, &table.dataset, &table.table);
                FerryError::BigQuery(parse_bq_error(e, ctx))
            })?;

        Ok(metadata.num_rows.and_then(|n| n.parse::<u64>().ok()))
    }
}
