mod api;
mod client;
mod job;
mod mock;

pub use api::Warehouse;
pub use client::BqClient;
pub use job::{
    Compression, DeleteOutcome, ExtractOptions, FileFormat, JobKind, JobOutcome,
    JobPollConfig, LoadOptions,
};
pub use mock::{CallKind, MockWarehouse, WarehouseCall};
