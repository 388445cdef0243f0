use tracing::info;

use crate::error::Result;
use crate::schema::{GcsUri, TableRef};
use crate::warehouse::{ExtractOptions, JobOutcome, Warehouse};

/// Writes warehouse tables out to (usually sharded) files in GCS.
pub struct TableExporter<'a> {
    warehouse: &'a dyn Warehouse,
    options: ExtractOptions,
}

impl<'a> TableExporter<'a> {
    pub fn new(warehouse: &'a dyn Warehouse) -> Self {
        Self {
            warehouse,
            options: ExtractOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ExtractOptions) -> Self {
        self.options = options;
        self
    }

    /// A `*` in the last segment of `destination` lets the service pick the
    /// number of shards.
    pub async fn export(&self, source: &TableRef, destination: &GcsUri, location: &str) -> Result<JobOutcome> {
        let outcome = self.warehouse
            .run_extract(source, destination, Some(location), &self.options)
            .await?;

        info!(job_id = %outcome.job_id, "Exported {} to {}", source, destination);
        info!("Time elapsed: {:.2?}", outcome.elapsed);
        Ok(outcome)
    }
}
