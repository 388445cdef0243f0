use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use super::api::Warehouse;
use super::job::{DeleteOutcome, ExtractOptions, JobKind, JobOutcome, LoadOptions};
use crate::error::{BigQueryError, FerryError, Result};
use crate::schema::{GcsUri, TableRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    CreateDataset,
    Query,
    Extract,
    Load,
    DeleteTable,
    TableRowCount,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WarehouseCall {
    CreateDataset {
        project: String,
        dataset: String,
        location: String,
    },
    Query {
        sql: String,
        destination: TableRef,
        location: Option<String>,
    },
    Extract {
        source: TableRef,
        destination: GcsUri,
        location: Option<String>,
        options: ExtractOptions,
    },
    Load {
        sources: Vec<GcsUri>,
        destination: TableRef,
        options: LoadOptions,
    },
    DeleteTable {
        table: TableRef,
    },
    TableRowCount {
        table: TableRef,
    },
}

impl WarehouseCall {
    pub fn kind(&self) -> CallKind {
        match self {
            WarehouseCall::CreateDataset { .. } => CallKind::CreateDataset,
            WarehouseCall::Query { .. } => CallKind::Query,
            WarehouseCall::Extract { .. } => CallKind::Extract,
            WarehouseCall::Load { .. } => CallKind::Load,
            WarehouseCall::DeleteTable { .. } => CallKind::DeleteTable,
            WarehouseCall::TableRowCount { .. } => CallKind::TableRowCount,
        }
    }
}

impl fmt::Display for WarehouseCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WarehouseCall::CreateDataset { project, dataset, location } => {
                write!(f, "create dataset {}.{} (if absent) in {}", project, dataset, location)
            }
            WarehouseCall::Query { sql, destination, .. } => {
                write!(f, "query into {} (write-truncate):\n{}", destination, sql.trim())
            }
            WarehouseCall::Extract { source, destination, options, .. } => {
                write!(f, "extract {} to {} as {}", source, destination, options.format.api_name())
            }
            WarehouseCall::Load { sources, destination, options } => {
                let uris: Vec<String> = sources.iter().map(|u| u.to_string()).collect();
                let schema = if options.schema.is_auto() { "autodetect" } else { "explicit schema" };
                write!(f, "load {} into {} (write-truncate, {})", uris.join(", "), destination, schema)
            }
            WarehouseCall::DeleteTable { table } => write!(f, "delete table {} (if exists)", table),
            WarehouseCall::TableRowCount { table } => write!(f, "get row count of {}", table),
        }
    }
}

#[derive(Default)]
struct MockState {
    calls: Vec<WarehouseCall>,
    tables: HashSet<TableRef>,
    row_counts: HashMap<TableRef, u64>,
    failures: HashMap<CallKind, BigQueryError>,
}

/// In-process warehouse that records every call instead of contacting BigQuery.
///
/// Queries and loads create their destination table; deletes remove it. Any
/// call kind can be made to fail with a given error.
pub struct MockWarehouse {
    project_id: String,
    state: Mutex<MockState>,
}

impl MockWarehouse {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            state: Mutex::new(MockState::default()),
        }
    }

    pub fn failing_on(self, kind: CallKind, error: BigQueryError) -> Self {
        self.lock().failures.insert(kind, error);
        self
    }

    pub fn with_table(self, table: TableRef, rows: u64) -> Self {
        {
            let mut state = self.lock();
            state.tables.insert(table.clone());
            state.row_counts.insert(table, rows);
        }
        self
    }

    pub fn calls(&self) -> Vec<WarehouseCall> {
        self.lock().calls.clone()
    }

    pub fn call_kinds(&self) -> Vec<CallKind> {
        self.lock().calls.iter().map(WarehouseCall::kind).collect()
    }

    pub fn table_exists(&self, table: &TableRef) -> bool {
        self.lock().tables.contains(table)
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A panicking test thread must not hide the calls recorded so far.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, call: WarehouseCall) -> Result<()> {
        let mut state = self.lock();
        let kind = call.kind();
        state.calls.push(call);
        match state.failures.get(&kind) {
            Some(error) => Err(FerryError::BigQuery(error.clone())),
            None => Ok(()),
        }
    }

    fn outcome(kind: JobKind) -> JobOutcome {
        JobOutcome {
            job_id: kind.new_job_id(),
            kind,
            elapsed: Duration::ZERO,
        }
    }
}

#[async_trait]
impl Warehouse for MockWarehouse {
    fn project_id(&self) -> &str {
        &self.project_id
    }

    async fn create_dataset_if_absent(&self, project: &str, dataset: &str, location: &str) -> Result<()> {
        self.record(WarehouseCall::CreateDataset {
            project: project.to_string(),
            dataset: dataset.to_string(),
            location: location.to_string(),
        })
    }

    async fn run_query(&self, sql: &str, destination: &TableRef, location: Option<&str>) -> Result<JobOutcome> {
        self.record(WarehouseCall::Query {
            sql: sql.to_string(),
            destination: destination.clone(),
            location: location.map(|l| l.to_string()),
        })?;
        self.lock().tables.insert(destination.clone());
        Ok(Self::outcome(JobKind::Query))
    }

    async fn run_extract(
        &self,
        source: &TableRef,
        destination: &GcsUri,
        location: Option<&str>,
        options: &ExtractOptions,
    ) -> Result<JobOutcome> {
        self.record(WarehouseCall::Extract {
            source: source.clone(),
            destination: destination.clone(),
            location: location.map(|l| l.to_string()),
            options: options.clone(),
        })?;
        Ok(Self::outcome(JobKind::Extract))
    }

    async fn run_load(&self, sources: &[GcsUri], destination: &TableRef, options: &LoadOptions) -> Result<JobOutcome> {
        self.record(WarehouseCall::Load {
            sources: sources.to_vec(),
            destination: destination.clone(),
            options: options.clone(),
        })?;
        self.lock().tables.insert(destination.clone());
        Ok(Self::outcome(JobKind::Load))
    }

    async fn delete_table(&self, table: &TableRef) -> Result<DeleteOutcome> {
        self.record(WarehouseCall::DeleteTable { table: table.clone() })?;
        let mut state = self.lock();
        state.row_counts.remove(table);
        if state.tables.remove(table) {
            Ok(DeleteOutcome::Deleted)
        } else {
            Ok(DeleteOutcome::NotFound)
        }
    }

    async fn table_row_count(&self, table: &TableRef) -> Result<Option<u64>> {
        self.record(WarehouseCall::TableRowCount { table: table.clone() })?;
        let state = self.lock();
        if !state.tables.contains(table) {
            return Err(FerryError::BigQuery(BigQueryError::TableNotFound {
                project: table.project.clone(),
                dataset: table.dataset.clone(),
                table: table.table.clone(),
            }));
        }
        Ok(state.row_counts.get(table).copied())
    }
}
