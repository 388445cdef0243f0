use std::path::Path;

use tracing::{debug, info};

use crate::error::Result;
use crate::schema::TableRef;
use crate::template::{QueryParams, SqlTemplate};
use crate::warehouse::{JobOutcome, Warehouse};

/// Renders SQL templates and runs them into a destination table.
pub struct QueryExecutor<'a> {
    warehouse: &'a dyn Warehouse,
    location: Option<String>,
}

impl<'a> QueryExecutor<'a> {
    pub fn new(warehouse: &'a dyn Warehouse) -> Self {
        Self { warehouse, location: None }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Reads and renders the template before anything is sent to the
    /// warehouse, then overwrites `destination` with the query result.
    pub async fn execute(
        &self,
        template_path: impl AsRef<Path>,
        params: &QueryParams,
        destination: &TableRef,
    ) -> Result<JobOutcome> {
        let template = SqlTemplate::from_file(template_path)?;
        let sql = template.render(params)?;
        self.execute_sql(&sql, destination).await
    }

    pub async fn execute_sql(&self, sql: &str, destination: &TableRef) -> Result<JobOutcome> {
        debug!(destination = %destination, sql = %sql, "Submitting query");

        let outcome = self.warehouse
            .run_query(sql, destination, self.location.as_deref())
            .await?;

        info!(
            destination = %destination,
            job_id = %outcome.job_id,
            "Query execution time: {:.2?}",
            outcome.elapsed
        );
        Ok(outcome)
    }
}
