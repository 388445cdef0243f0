use std::io::Read;

use bytes::Bytes;
use flate2::read::GzDecoder;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::TableImporter;
use crate::error::{FerryError, Result};
use crate::schema::{GcsUri, TableRef};
use crate::storage::{Frame, ObjectStorage};
use crate::warehouse::{LoadOptions, Warehouse};

/// Moves in-memory frames into the warehouse and sharded exports back out.
pub struct TabularBridge<'a> {
    warehouse: &'a dyn Warehouse,
    storage: &'a dyn ObjectStorage,
    location: Option<String>,
}

impl<'a> TabularBridge<'a> {
    pub fn new(warehouse: &'a dyn Warehouse, storage: &'a dyn ObjectStorage) -> Self {
        Self {
            warehouse,
            storage,
            location: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Replaces `destination` with the contents of `frame`.
    ///
    /// The frame is staged as CSV under `staging`, loaded with an
    /// autodetected schema, and the staged object is removed afterwards.
    pub async fn upload(&self, frame: &Frame, destination: &TableRef, staging: &GcsUri) -> Result<TableRef> {
        if frame.num_columns() == 0 {
            return Err(FerryError::InvalidSchema(format!(
                "cannot upload a frame without columns to {}",
                destination
            )));
        }

        let staged = staging.join(&format!("{}_{}.csv", destination.table, Uuid::new_v4().simple()));
        self.storage.write(&staged, Bytes::from(frame.to_csv()?)).await?;
        debug!(object = %staged, rows = frame.num_rows(), "Staged frame");

        let mut options = LoadOptions::default();
        if let Some(location) = &self.location {
            options = options.with_location(location.clone());
        }

        let loaded = TableImporter::new(self.warehouse)
            .import_to(std::slice::from_ref(&staged), destination, &options)
            .await;

        if let Err(e) = self.storage.delete(&staged).await {
            warn!("Failed to delete staged object {}: {}", staged, e);
        }

        let report = loaded?;
        Ok(report.destination)
    }

    /// See [`download_sharded`].
    pub async fn download_sharded(&self, prefix: &GcsUri, file_prefix: &str) -> Result<Frame> {
        download_sharded(self.storage, prefix, file_prefix).await
    }
}

/// Reads every shard below the directory `prefix` whose relative name starts
/// with `file_prefix` and concatenates them in listing order.
///
/// `prefix` may also be an export pattern such as the `output_uri` of a
/// [`QueryToGcs`](super::QueryToGcs) run; its directory is listed then.
/// Objects without an extension are skipped. Shards ending in `.gz` are
/// decompressed.
pub async fn download_sharded(storage: &dyn ObjectStorage, prefix: &GcsUri, file_prefix: &str) -> Result<Frame> {
    let dir = listing_dir(prefix);
    let shards: Vec<GcsUri> = storage
        .list(&dir)
        .await?
        .into_iter()
        .filter(|uri| is_shard(&dir, uri, file_prefix))
        .collect();

    if shards.is_empty() {
        return Err(FerryError::NoMatchingShards {
            prefix: prefix.to_string(),
            file_prefix: file_prefix.to_string(),
        });
    }

    let mut frames = Vec::with_capacity(shards.len());
    for shard in &shards {
        let data = storage.read(shard).await?;
        let frame = read_shard(shard, &data)?;
        debug!(shard = %shard, rows = frame.num_rows(), "Read shard");
        frames.push(frame);
    }

    let merged = Frame::concat(frames);
    info!("Read {} rows from {} shards under {}", merged.num_rows(), shards.len(), prefix);
    Ok(merged)
}

// A final segment with a wildcard or an extension names files, not a directory.
fn listing_dir(prefix: &GcsUri) -> GcsUri {
    let last = prefix.file_name();
    if prefix.has_wildcard() || last.contains('.') {
        prefix.parent()
    } else {
        prefix.clone()
    }
}

fn is_shard(prefix: &GcsUri, uri: &GcsUri, file_prefix: &str) -> bool {
    let relative = if prefix.path.is_empty() {
        uri.path.as_str()
    } else {
        match uri.path.strip_prefix(prefix.path.as_str()).and_then(|r| r.strip_prefix('/')) {
            Some(r) => r,
            None => return false,
        }
    };
    relative.starts_with(file_prefix) && uri.file_name().contains('.')
}

fn read_shard(uri: &GcsUri, data: &[u8]) -> Result<Frame> {
    if uri.file_name().ends_with(".gz") {
        let mut decoded = Vec::new();
        GzDecoder::new(data).read_to_end(&mut decoded)?;
        Frame::read_csv(decoded.as_slice())
    } else {
        Frame::read_csv(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_shard_matches_relative_prefix() {
        let dir = GcsUri::parse("gs://b/exports/run").unwrap();
        let yes = GcsUri::parse("gs://b/exports/run/users_000.csv").unwrap();
        let nested = GcsUri::parse("gs://b/exports/run/users/part-0.csv").unwrap();
        let other = GcsUri::parse("gs://b/exports/run/orders_000.csv").unwrap();
        let no_ext = GcsUri::parse("gs://b/exports/run/users_000").unwrap();
        let sibling = GcsUri::parse("gs://b/exports/runner/users_000.csv").unwrap();

        assert!(is_shard(&dir, &yes, "users_"));
        assert!(is_shard(&dir, &nested, "users"));
        assert!(!is_shard(&dir, &other, "users_"));
        assert!(!is_shard(&dir, &no_ext, "users_"));
        assert!(!is_shard(&dir, &sibling, "users_"));
    }

    #[test]
    fn test_is_shard_at_bucket_root() {
        let root = GcsUri::parse("gs://b").unwrap();
        let uri = GcsUri::parse("gs://b/users_1.csv").unwrap();
        assert!(is_shard(&root, &uri, "users"));
        assert!(is_shard(&root, &uri, ""));
    }

    #[test]
    fn test_listing_dir_of_export_pattern() {
        let pattern = GcsUri::parse("gs://b/out/20240305/users_*.csv").unwrap();
        assert_eq!(listing_dir(&pattern).to_string(), "gs://b/out/20240305");

        let file = GcsUri::parse("gs://b/out/users.csv").unwrap();
        assert_eq!(listing_dir(&file).to_string(), "gs://b/out");

        let dir = GcsUri::parse("gs://b/out/20240305").unwrap();
        assert_eq!(listing_dir(&dir), dir);
    }

    #[test]
    fn test_read_gzip_shard() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(b"id\n1\n2\n").unwrap();
        let data = enc.finish().unwrap();

        let uri = GcsUri::parse("gs://b/x/users_0.csv.gz").unwrap();
        let frame = read_shard(&uri, &data).unwrap();
        assert_eq!(frame.column("id").unwrap(), vec!["1", "2"]);
    }
}
