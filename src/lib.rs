pub mod error;
pub mod schema;
pub mod template;
pub mod warehouse;
pub mod storage;
pub mod pipeline;

pub use error::{FerryError, Result};
pub use schema::{BqType, Column, FieldMode, GcsUri, LoadSchema, TableRef};
pub use template::{QueryParams, SqlTemplate};
pub use warehouse::{
    BqClient, Compression, DeleteOutcome, ExtractOptions, FileFormat, JobOutcome, JobPollConfig,
    LoadOptions, MockWarehouse, Warehouse,
};
pub use storage::{Frame, GcsStorage, ObjectStorage};
pub use pipeline::{
    Cleanup, ImportReport, PipelineOutcome, QueryExecutor, QueryToGcs, QueryToGcsConfig,
    TableExporter, TableImporter, TabularBridge,
};
