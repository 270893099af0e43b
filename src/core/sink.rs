use crate::domain::ports::{Sink, Storage};
use crate::utils::error::{IngressError, Result};
use async_trait::async_trait;

/// Writes each batch to `<prefix>/<key>.json` in a [`Storage`].
pub struct ObjectSink<S: Storage> {
    storage: S,
    prefix: Option<String>,
}

impl<S: Storage> ObjectSink<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            prefix: None,
        }
    }

    /// Objects land under the ingress dataset, e.g. the dataset GUID.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into().trim_matches('/').to_string();
        self.prefix = (!prefix.is_empty()).then_some(prefix);
        self
    }

    pub fn object_path(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}/{}.json", prefix, key),
            None => format!("{}.json", key),
        }
    }
}

#[async_trait]
impl<S: Storage> Sink for ObjectSink<S> {
    async fn upload(&self, key: &str, payload: &[u8]) -> Result<()> {
        let path = self.object_path(key);
        tracing::debug!("Uploading {} bytes to {}", payload.len(), path);

        self.storage
            .write_file(&path, payload)
            .await
            .map_err(|e| match e {
                IngressError::StorageError { .. } | IngressError::AuthenticationError { .. } => e,
                other => IngressError::storage(format!("upload of '{}' failed: {}", path, other)),
            })
    }
}
