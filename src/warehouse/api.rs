use async_trait::async_trait;

use super::job::{DeleteOutcome, ExtractOptions, JobOutcome, LoadOptions};
use crate::error::Result;
use crate::schema::{GcsUri, TableRef};

/// What the pipeline needs from the warehouse. Every job-running method
/// returns only once the job reached a terminal state.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Default project for tables that do not name one.
    fn project_id(&self) -> &str;

    /// Succeeds when the dataset already exists.
    async fn create_dataset_if_absent(&self, project: &str, dataset: &str, location: &str) -> Result<()>;

    /// Runs `sql` into `destination` with write-truncate semantics.
    async fn run_query(&self, sql: &str, destination: &TableRef, location: Option<&str>) -> Result<JobOutcome>;

    async fn run_extract(
        &self,
        source: &TableRef,
        destination: &GcsUri,
        location: Option<&str>,
        options: &ExtractOptions,
    ) -> Result<JobOutcome>;

    /// Loads `sources` into `destination` with write-truncate semantics.
    async fn run_load(&self, sources: &[GcsUri], destination: &TableRef, options: &LoadOptions) -> Result<JobOutcome>;

    async fn delete_table(&self, table: &TableRef) -> Result<DeleteOutcome>;

    async fn table_row_count(&self, table: &TableRef) -> Result<Option<u64>>;
}
