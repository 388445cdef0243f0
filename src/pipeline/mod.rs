mod bridge;
mod executor;
mod exporter;
mod importer;
mod orchestrator;

pub use bridge::{download_sharded, TabularBridge};
pub use executor::QueryExecutor;
pub use exporter::TableExporter;
pub use importer::{ImportReport, TableImporter};
pub use orchestrator::{
    query_basename, Cleanup, PipelineOutcome, QueryToGcs, QueryToGcsConfig, DEFAULT_DATASET,
    DEFAULT_LOCATION, TIMESTAMP_FORMAT,
};
