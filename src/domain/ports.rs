use crate::domain::model::{CorridorId, FetchWindow, IngestedBatch};
use crate::utils::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Byte-level object storage shared by the sink and the watermark state.
pub trait Storage: Send + Sync {
    /// `Ok(None)` when the object does not exist.
    fn read_file(
        &self,
        path: &str,
    ) -> impl std::future::Future<Output = Result<Option<Vec<u8>>>> + Send;

    /// Replaces the object at `path` atomically: readers see the old or the
    /// new content, never a partial write.
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// Remote market-data API.
#[async_trait]
pub trait FetchClient: Send + Sync {
    /// Fails with `NetworkError` (transient) or `ApiError` (permanent).
    async fn fetch(&self, window: &FetchWindow) -> Result<IngestedBatch>;
}

/// Source of the corridors the API currently knows about.
#[async_trait]
pub trait CorridorCatalog: Send + Sync {
    async fn list_corridors(&self) -> Result<Vec<CorridorId>>;
}

/// Object-store ingress. Uploading the same key twice overwrites.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn upload(&self, key: &str, payload: &[u8]) -> Result<()>;
}

#[async_trait]
pub trait WatermarkStore: Send + Sync {
    /// Last committed watermark, or the configured default date.
    async fn get(&self, corridor: &CorridorId) -> Result<DateTime<Utc>>;

    /// Durably records `watermark`; leaves the old value in place on failure.
    async fn commit(&self, corridor: &CorridorId, watermark: DateTime<Utc>) -> Result<()>;
}
