mod frame;
mod gcs;

pub use frame::Frame;
pub use gcs::{GcsStorage, ObjectStorage};
