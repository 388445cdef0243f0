use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use tracing::debug;

use crate::error::{FerryError, Result};
use crate::schema::GcsUri;

/// What the tabular bridge needs from object storage.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Every object below the directory `prefix`, recursively, in the store's
    /// listing order.
    async fn list(&self, prefix: &GcsUri) -> Result<Vec<GcsUri>>;

    async fn read(&self, uri: &GcsUri) -> Result<Bytes>;

    async fn write(&self, uri: &GcsUri, data: Bytes) -> Result<()>;

    async fn delete(&self, uri: &GcsUri) -> Result<()>;
}

/// Google Cloud Storage through `object_store`, one client per bucket.
///
/// Buckets without a registered store are connected on first use from the
/// environment (`GOOGLE_APPLICATION_CREDENTIALS` / `GOOGLE_SERVICE_ACCOUNT`),
/// unless the storage was created with [`GcsStorage::registered_only`].
pub struct GcsStorage {
    stores: Mutex<HashMap<String, Arc<dyn ObjectStore>>>,
    connect_from_env: bool,
}

impl GcsStorage {
    pub fn from_env() -> Self {
        Self {
            stores: Mutex::new(HashMap::new()),
            connect_from_env: true,
        }
    }

    pub fn registered_only() -> Self {
        Self {
            stores: Mutex::new(HashMap::new()),
            connect_from_env: false,
        }
    }

    pub fn with_bucket(self, bucket: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        self.register(bucket, store);
        self
    }

    pub fn register(&self, bucket: impl Into<String>, store: Arc<dyn ObjectStore>) {
        self.stores
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(bucket.into(), store);
    }

    fn store_for(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>> {
        let mut stores = self.stores.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(store) = stores.get(bucket) {
            return Ok(Arc::clone(store));
        }

        if !self.connect_from_env {
            return Err(FerryError::Client(format!("No object store registered for bucket '{}'", bucket)));
        }

        debug!(bucket, "Connecting to GCS bucket");
        let store: Arc<dyn ObjectStore> = Arc::new(
            GoogleCloudStorageBuilder::from_env()
                .with_bucket_name(bucket)
                .build()?,
        );
        stores.insert(bucket.to_string(), Arc::clone(&store));
        Ok(store)
    }

    fn object_path(uri: &GcsUri) -> Result<ObjectPath> {
        if uri.path.is_empty() || uri.has_wildcard() {
            return Err(FerryError::InvalidStoragePath(format!("{} does not name a single object", uri)));
        }
        Ok(ObjectPath::from(uri.path.as_str()))
    }
}

#[async_trait]
impl ObjectStorage for GcsStorage {
    async fn list(&self, prefix: &GcsUri) -> Result<Vec<GcsUri>> {
        let store = self.store_for(&prefix.bucket)?;
        let dir = (!prefix.path.is_empty()).then(|| ObjectPath::from(prefix.path.as_str()));

        let objects: Vec<_> = store.list(dir.as_ref()).try_collect().await?;
        debug!(prefix = %prefix, count = objects.len(), "Listed objects");

        Ok(objects
            .into_iter()
            .map(|meta| GcsUri::new(prefix.bucket.clone(), meta.location.to_string()))
            .collect())
    }

    async fn read(&self, uri: &GcsUri) -> Result<Bytes> {
        let store = self.store_for(&uri.bucket)?;
        let data = store.get(&Self::object_path(uri)?).await?.bytes().await?;
        Ok(data)
    }

    async fn write(&self, uri: &GcsUri, data: Bytes) -> Result<()> {
        let store = self.store_for(&uri.bucket)?;
        store.put(&Self::object_path(uri)?, PutPayload::from(data)).await?;
        Ok(())
    }

    async fn delete(&self, uri: &GcsUri) -> Result<()> {
        let store = self.store_for(&uri.bucket)?;
        store.delete(&Self::object_path(uri)?).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;

    fn storage() -> GcsStorage {
        GcsStorage::registered_only().with_bucket("bucket", Arc::new(InMemory::new()))
    }

    #[tokio::test]
    async fn test_write_read_roundtrip() {
        let storage = storage();
        let uri = GcsUri::parse("gs://bucket/a/b.csv").unwrap();

        storage.write(&uri, Bytes::from_static(b"x\n1\n")).await.unwrap();
        assert_eq!(storage.read(&uri).await.unwrap(), Bytes::from_static(b"x\n1\n"));
    }

    #[tokio::test]
    async fn test_list_is_scoped_to_directory() {
        let storage = storage();
        for path in ["exports/a.csv", "exports/sub/b.csv", "other/c.csv"] {
            storage.write(&GcsUri::new("bucket", path), Bytes::from_static(b"x")).await.unwrap();
        }

        let listed = storage.list(&GcsUri::parse("gs://bucket/exports").unwrap()).await.unwrap();
        let paths: Vec<&str> = listed.iter().map(|u| u.path.as_str()).collect();
        assert_eq!(paths, vec!["exports/a.csv", "exports/sub/b.csv"]);
    }

    #[tokio::test]
    async fn test_unregistered_bucket_fails_without_env() {
        let err = storage().list(&GcsUri::parse("gs://elsewhere/x").unwrap()).await.unwrap_err();
        assert!(matches!(err, FerryError::Client(_)));
    }

    #[tokio::test]
    async fn test_wildcard_is_not_an_object() {
        let err = storage().read(&GcsUri::parse("gs://bucket/out/part_*.csv").unwrap()).await.unwrap_err();
        assert!(matches!(err, FerryError::InvalidStoragePath(_)));
    }

    #[tokio::test]
    async fn test_delete_removes_object() {
        let storage = storage();
        let uri = GcsUri::new("bucket", "tmp/x.csv");
        storage.write(&uri, Bytes::from_static(b"x")).await.unwrap();
        storage.delete(&uri).await.unwrap();
        assert!(storage.read(&uri).await.is_err());
    }
}
