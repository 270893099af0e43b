//! Azure Data Lake Storage Gen2 over its REST API.
//!
//! Writes go to a staging path under [`STAGING_DIR`] (create, append, flush)
//! and are then renamed over the destination, so readers of the dataset see
//! either the previous object or the complete new one. A crash before the
//! rename leaves its leftover under the staging directory only.

use crate::adapters::azure_auth::ClientSecretCredential;
use crate::config::AdapterConfig;
use crate::domain::ports::Storage;
use crate::utils::error::{IngressError, Result};
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use url::Url;

const API_VERSION: &str = "2021-08-06";

/// Filesystem-level directory outside every dataset directory.
pub const STAGING_DIR: &str = ".staging";

#[derive(Debug, Clone)]
pub struct DataLakeStorage {
    client: Client,
    filesystem_url: Url,
    credential: Arc<ClientSecretCredential>,
}

impl DataLakeStorage {
    pub fn new(
        client: Client,
        ingress_url: &str,
        filesystem_name: &str,
        credential: Arc<ClientSecretCredential>,
    ) -> Result<Self> {
        let filesystem_url = Url::parse(&format!(
            "{}/{}/",
            ingress_url.trim_end_matches('/'),
            filesystem_name.trim_matches('/')
        ))
        .map_err(|e| IngressError::InvalidConfigValueError {
            field: "Azure Storage.ingress_url".to_string(),
            value: ingress_url.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            client,
            filesystem_url,
            credential,
        })
    }

    pub fn from_config(config: &AdapterConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.storage_timeout())
            .build()
            .map_err(|e| IngressError::config(format!("cannot build storage client: {}", e)))?;
        let credential = ClientSecretCredential::new(
            client.clone(),
            config.authority_host(),
            &config.authorization.tenant_id,
            &config.authorization.client_id,
            &config.authorization.client_secret,
        )?;
        Self::new(
            client,
            &config.azure_storage.ingress_url,
            &config.azure_storage.filesystem_name,
            Arc::new(credential),
        )
    }

    fn url_for(&self, path: &str) -> Result<Url> {
        self.filesystem_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| IngressError::storage(format!("invalid object path '{}': {}", path, e)))
    }

    async fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        let token = self.credential.token().await?;
        Ok(request
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .header("x-ms-version", API_VERSION))
    }

    async fn send(&self, operation: &str, path: &str, request: RequestBuilder) -> Result<Response> {
        let response = self
            .authorized(request)
            .await?
            .send()
            .await
            .map_err(|e| {
                IngressError::storage(format!("{} of '{}' failed: {}", operation, path, e))
            })?;
        Ok(response)
    }

    async fn expect_success(operation: &str, path: &str, response: Response) -> Result<()> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(IngressError::storage(format!(
            "{} of '{}' answered {}: {}",
            operation, path, status, body
        )))
    }

    /// Creates (or truncates) `path`, appends `data` and flushes it.
    async fn upload(&self, path: &str, data: &[u8]) -> Result<()> {
        let url = self.url_for(path)?;

        let create = self
            .client
            .put(url.clone())
            .query(&[("resource", "file")])
            .header(CONTENT_LENGTH, 0);
        let response = self.send("create", path, create).await?;
        Self::expect_success("create", path, response).await?;

        if !data.is_empty() {
            let append = self
                .client
                .patch(url.clone())
                .query(&[("action", "append"), ("position", "0")])
                .body(data.to_vec());
            let response = self.send("append", path, append).await?;
            Self::expect_success("append", path, response).await?;
        }

        let length = data.len().to_string();
        let flush = self
            .client
            .patch(url)
            .query(&[("action", "flush"), ("position", length.as_str())])
            .header(CONTENT_LENGTH, 0);
        let response = self.send("flush", path, flush).await?;
        Self::expect_success("flush", path, response).await
    }

    /// Renames `from` over `to`, replacing any existing object.
    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let source = self.url_for(from)?;
        let request = self
            .client
            .put(self.url_for(to)?)
            .header("x-ms-rename-source", source.path())
            .header(CONTENT_LENGTH, 0);
        let response = self.send("rename", to, request).await?;
        Self::expect_success("rename", to, response).await
    }

    /// Rename needs the destination parent to exist.
    async fn ensure_directory(&self, dir: &str) -> Result<()> {
        let request = self
            .client
            .put(self.url_for(dir)?)
            .query(&[("resource", "directory")])
            .header("If-None-Match", "*")
            .header(CONTENT_LENGTH, 0);
        let response = self.send("mkdir", dir, request).await?;
        if response.status() == StatusCode::CONFLICT {
            return Ok(());
        }
        Self::expect_success("mkdir", dir, response).await
    }

    /// Moves a flushed staging object to its place in the dataset.
    async fn publish(&self, staging: &str, path: &str) -> Result<()> {
        if let Some(dir) = parent_dir(path) {
            self.ensure_directory(dir).await?;
        }
        self.rename(staging, path).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let request = self.client.delete(self.url_for(path)?);
        let response = self.send("delete", path, request).await?;
        Self::expect_success("delete", path, response).await
    }
}

fn staging_path(path: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!(
        "{}/{}.{}-{}",
        STAGING_DIR,
        path.trim_start_matches('/'),
        std::process::id(),
        nanos
    )
}

fn parent_dir(path: &str) -> Option<&str> {
    path.trim_start_matches('/')
        .rsplit_once('/')
        .map(|(dir, _)| dir)
        .filter(|dir| !dir.is_empty())
}

impl Storage for DataLakeStorage {
    async fn read_file(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let request = self.client.get(self.url_for(path)?);
        let response = self.send("read", path, request).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IngressError::storage(format!(
                "read of '{}' answered {}: {}",
                path, status, body
            )));
        }

        let data = response
            .bytes()
            .await
            .map_err(|e| IngressError::storage(format!("read of '{}' failed: {}", path, e)))?;
        Ok(Some(data.to_vec()))
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let staging = staging_path(path);
        self.upload(&staging, data).await?;

        if let Err(e) = self.publish(&staging, path).await {
            if let Err(cleanup) = self.delete(&staging).await {
                tracing::warn!("Could not remove staging object {}: {}", staging, cleanup);
            }
            return Err(e);
        }
        Ok(())
    }
}
