use tracing::info;

use crate::error::Result;
use crate::schema::{GcsUri, LoadSchema, TableRef};
use crate::warehouse::{JobOutcome, LoadOptions, Warehouse};

#[derive(Debug, Clone)]
pub struct ImportReport {
    pub destination: TableRef,
    pub job: JobOutcome,
    /// Row count from table metadata after the load; `None` if not reported.
    pub rows: Option<u64>,
}

/// Loads files from GCS into warehouse tables, replacing their contents.
pub struct TableImporter<'a> {
    warehouse: &'a dyn Warehouse,
    options: LoadOptions,
}

impl<'a> TableImporter<'a> {
    pub fn new(warehouse: &'a dyn Warehouse) -> Self {
        Self {
            warehouse,
            options: LoadOptions::default(),
        }
    }

    pub fn with_options(mut self, options: LoadOptions) -> Self {
        self.options = options;
        self
    }

    /// Loads `source` (wildcards allowed) into `dataset.table` of the
    /// warehouse's default project.
    pub async fn import(
        &self,
        source: &GcsUri,
        dataset: &str,
        table: &str,
        schema: LoadSchema,
    ) -> Result<ImportReport> {
        let destination = TableRef::new(self.warehouse.project_id(), dataset, table);
        let options = self.options.clone().with_schema(schema);
        self.import_to(std::slice::from_ref(source), &destination, &options).await
    }

    pub async fn import_to(
        &self,
        sources: &[GcsUri],
        destination: &TableRef,
        options: &LoadOptions,
    ) -> Result<ImportReport> {
        let job = self.warehouse.run_load(sources, destination, options).await?;
        info!(job_id = %job.job_id, "Job finished. Time elapsed: {:.2?}", job.elapsed);

        let rows = self.warehouse.table_row_count(destination).await?;
        match rows {
            Some(n) => info!(destination = %destination, "Loaded {} rows", n),
            None => info!(destination = %destination, "Load finished, row count not reported"),
        }

        Ok(ImportReport {
            destination: destination.clone(),
            job,
            rows,
        })
    }
}
