use std::path::Path;

use chrono::{Local, NaiveDateTime};
use tracing::{info, warn};

use super::{QueryExecutor, TableExporter};
use crate::error::{FerryError, Result};
use crate::schema::{GcsUri, TableRef};
use crate::template::{QueryParams, SqlTemplate};
use crate::warehouse::{DeleteOutcome, ExtractOptions, Warehouse};

pub const DEFAULT_DATASET: &str = "gcpy";
pub const DEFAULT_LOCATION: &str = "US";
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

#[derive(Debug, Clone)]
pub struct QueryToGcsConfig {
    pub project: String,
    pub dataset: String,
    pub location: String,
    pub delete_temp_table: bool,
    pub extract: ExtractOptions,
}

impl QueryToGcsConfig {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            dataset: DEFAULT_DATASET.to_string(),
            location: DEFAULT_LOCATION.to_string(),
            delete_temp_table: true,
            extract: ExtractOptions::default(),
        }
    }

    pub fn with_dataset(mut self, dataset: impl Into<String>) -> Self {
        self.dataset = dataset.into();
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn keep_temp_table(mut self) -> Self {
        self.delete_temp_table = false;
        self
    }

    pub fn with_extract(mut self, extract: ExtractOptions) -> Self {
        self.extract = extract;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cleanup {
    Deleted,
    AlreadyAbsent,
    Kept,
}

#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub temp_table: TableRef,
    pub output_uri: GcsUri,
    pub cleanup: Cleanup,
}

/// Runs a templated query into a timestamped staging table, exports that
/// table to sharded files under the target location, then drops it.
///
/// Steps run strictly in order and a failure stops the rest. Nothing is
/// rolled back: an export failure leaves the staging table behind.
pub struct QueryToGcs<'a> {
    warehouse: &'a dyn Warehouse,
    config: QueryToGcsConfig,
}

impl<'a> QueryToGcs<'a> {
    pub fn new(warehouse: &'a dyn Warehouse, config: QueryToGcsConfig) -> Self {
        Self { warehouse, config }
    }

    pub fn config(&self) -> &QueryToGcsConfig {
        &self.config
    }

    pub async fn run(
        &self,
        sql_file: impl AsRef<Path>,
        target: &GcsUri,
        params: &QueryParams,
    ) -> Result<PipelineOutcome> {
        self.run_at(sql_file, target, params, Local::now().naive_local()).await
    }

    pub async fn run_at(
        &self,
        sql_file: impl AsRef<Path>,
        target: &GcsUri,
        params: &QueryParams,
        now: NaiveDateTime,
    ) -> Result<PipelineOutcome> {
        let sql_file = sql_file.as_ref();
        let (temp_table, output_uri) = self.plan(sql_file, target, now)?;

        let sql = SqlTemplate::from_file(sql_file)?.render(params)?;

        info!("Step 1/4: ensuring dataset {}.{}", self.config.project, self.config.dataset);
        self.warehouse
            .create_dataset_if_absent(&self.config.project, &self.config.dataset, &self.config.location)
            .await?;

        info!("Step 2/4: running {} into {}", sql_file.display(), temp_table);
        QueryExecutor::new(self.warehouse)
            .with_location(self.config.location.clone())
            .execute_sql(&sql, &temp_table)
            .await?;

        info!("Step 3/4: exporting to {}", output_uri);
        TableExporter::new(self.warehouse)
            .with_options(self.config.extract.clone())
            .export(&temp_table, &output_uri, &self.config.location)
            .await?;

        let cleanup = if self.config.delete_temp_table {
            info!("Step 4/4: deleting {}", temp_table);
            self.drop_temp_table(&temp_table, &output_uri).await?
        } else {
            info!("Step 4/4: keeping {}", temp_table);
            Cleanup::Kept
        };

        Ok(PipelineOutcome {
            temp_table,
            output_uri,
            cleanup,
        })
    }

    /// Staging table and export destination for a run started at `now`.
    pub fn plan(&self, sql_file: &Path, target: &GcsUri, now: NaiveDateTime) -> Result<(TableRef, GcsUri)> {
        let basename = query_basename(sql_file)?;
        let ts = now.format(TIMESTAMP_FORMAT).to_string();

        let temp_table = TableRef::new(
            &self.config.project,
            &self.config.dataset,
            format!("{}_{}", basename, ts),
        );
        let output_uri = target
            .join(&ts)
            .join(&format!("{}_*.{}", basename, self.config.extract.file_suffix()));

        Ok((temp_table, output_uri))
    }

    async fn drop_temp_table(&self, table: &TableRef, output_uri: &GcsUri) -> Result<Cleanup> {
        match self.warehouse.delete_table(table).await {
            Ok(DeleteOutcome::Deleted) => Ok(Cleanup::Deleted),
            Ok(DeleteOutcome::NotFound) => {
                warn!("Temporary table {} was already gone", table);
                Ok(Cleanup::AlreadyAbsent)
            }
            Err(FerryError::BigQuery(e)) if e.is_not_found() => {
                warn!("Temporary table {} was already gone: {}", table, e);
                Ok(Cleanup::AlreadyAbsent)
            }
            Err(e) => Err(FerryError::TempTableLeaked {
                table: table.to_string(),
                output_uri: output_uri.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

/// File name of the template up to its first `.`, e.g. `daily.agg.sql` gives
/// `daily`.
pub fn query_basename(path: &Path) -> Result<String> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();

    let basename = name.split('.').next().unwrap_or_default();
    if basename.is_empty() {
        return Err(FerryError::InvalidTableRef(format!(
            "cannot derive a table name from '{}'",
            path.display()
        )));
    }
    Ok(basename.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use crate::warehouse::{Compression, MockWarehouse};

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 5).unwrap().and_hms_opt(h, m, s).unwrap()
    }

    #[test]
    fn test_query_basename() {
        assert_eq!(query_basename(Path::new("sql/daily_users.sql")).unwrap(), "daily_users");
        assert_eq!(query_basename(Path::new("report.v2.sql")).unwrap(), "report");
        assert_eq!(query_basename(Path::new("noext")).unwrap(), "noext");
        assert!(query_basename(Path::new(".hidden")).is_err());
    }

    #[test]
    fn test_plan_names() {
        let mock = MockWarehouse::new("proj");
        let pipeline = QueryToGcs::new(&mock, QueryToGcsConfig::new("proj"));
        let target = GcsUri::parse("gs://bucket/exports/").unwrap();

        let (table, uri) = pipeline.plan(Path::new("q/users.sql"), &target, at(9, 8, 7)).unwrap();
        assert_eq!(table.to_string(), "proj.gcpy.users_20240305090807");
        assert_eq!(uri.to_string(), "gs://bucket/exports/20240305090807/users_*.csv");
    }

    #[test]
    fn test_plan_uses_extract_suffix() {
        let mock = MockWarehouse::new("proj");
        let config = QueryToGcsConfig::new("proj")
            .with_dataset("staging")
            .with_extract(ExtractOptions::default().with_compression(Compression::Gzip));
        let pipeline = QueryToGcs::new(&mock, config);
        let target = GcsUri::parse("gs://bucket").unwrap();

        let (table, uri) = pipeline.plan(Path::new("users.sql"), &target, at(0, 0, 1)).unwrap();
        assert_eq!(table.dataset, "staging");
        assert_eq!(uri.to_string(), "gs://bucket/20240305000001/users_*.csv.gz");
    }

    #[test]
    fn test_config_defaults() {
        let config = QueryToGcsConfig::new("p");
        assert_eq!(config.dataset, "gcpy");
        assert_eq!(config.location, "US");
        assert!(config.delete_temp_table);
        assert!(!config.keep_temp_table().delete_temp_table);
    }
}
