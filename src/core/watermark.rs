use crate::domain::model::{format_timestamp, parse_timestamp, CorridorId};
use crate::domain::ports::{Storage, WatermarkStore};
use crate::utils::error::{IngressError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::Mutex;

/// On-disk layout, shared with earlier versions of the adapter.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StateDocument {
    #[serde(rename = "LastUpdates", default)]
    last_updates: Vec<StateEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StateEntry {
    #[serde(rename = "Corridor")]
    corridor: String,
    #[serde(rename = "LastSuccessfulMonthlyDate")]
    last_successful: String,
}

/// In-memory watermark table with the configured default for unseen corridors.
#[derive(Debug, Clone, PartialEq)]
pub struct WatermarkState {
    default: DateTime<Utc>,
    entries: BTreeMap<CorridorId, DateTime<Utc>>,
}

impl WatermarkState {
    pub fn new(default: DateTime<Utc>) -> Self {
        Self {
            default,
            entries: BTreeMap::new(),
        }
    }

    pub fn from_document(data: &[u8], default: DateTime<Utc>) -> Result<Self> {
        let document: StateDocument = serde_json::from_slice(data).map_err(|e| {
            IngressError::persistence(format!("state document is not valid JSON: {}", e))
        })?;

        let mut state = Self::new(default);
        for entry in document.last_updates {
            // 跳過的項目會在下次寫回時消失，所以讀不懂就整個失敗
            let corridor = CorridorId::parse(&entry.corridor).map_err(|e| {
                IngressError::persistence(format!("unreadable state entry: {}", e))
            })?;
            // 讀不懂的日期不能默默退回預設值，否則會整段重抓
            let watermark = parse_timestamp(&entry.last_successful).ok_or_else(|| {
                IngressError::persistence(format!(
                    "unreadable watermark '{}' for corridor {}",
                    entry.last_successful, corridor
                ))
            })?;
            let slot = state.entries.entry(corridor).or_insert(watermark);
            *slot = (*slot).max(watermark);
        }
        Ok(state)
    }

    pub fn to_document(&self) -> Result<Vec<u8>> {
        let document = StateDocument {
            last_updates: self
                .entries
                .iter()
                .map(|(corridor, watermark)| StateEntry {
                    corridor: corridor.to_string(),
                    last_successful: format_timestamp(*watermark),
                })
                .collect(),
        };
        Ok(serde_json::to_vec_pretty(&document)?)
    }

    pub fn get(&self, corridor: &CorridorId) -> DateTime<Utc> {
        self.entries.get(corridor).copied().unwrap_or(self.default)
    }

    pub fn contains(&self, corridor: &CorridorId) -> bool {
        self.entries.contains_key(corridor)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The state after committing `watermark`; `None` when nothing changes.
    pub fn with_commit(
        &self,
        corridor: &CorridorId,
        watermark: DateTime<Utc>,
    ) -> Result<Option<Self>> {
        let current = self.get(corridor);
        if self.contains(corridor) && watermark == current {
            return Ok(None);
        }
        if watermark < current {
            return Err(IngressError::WatermarkRegression {
                corridor: corridor.to_string(),
                current: format_timestamp(current),
                requested: format_timestamp(watermark),
            });
        }

        let mut next = self.clone();
        next.entries.insert(corridor.clone(), watermark);
        Ok(Some(next))
    }
}

/// Watermark store backed by a single JSON document in a [`Storage`].
///
/// The document is loaded once; each commit writes the whole document
/// through `Storage::write_file` and only then updates the in-memory copy.
/// Commits are serialised because they rewrite the same document.
pub struct StateFileWatermarkStore<S: Storage> {
    storage: S,
    path: String,
    state: Mutex<WatermarkState>,
}

impl<S: Storage> StateFileWatermarkStore<S> {
    /// Fails when the document exists but cannot be read; a missing document
    /// is an empty state.
    pub async fn load(storage: S, path: impl Into<String>, default: DateTime<Utc>) -> Result<Self> {
        let path = path.into();
        let data = storage.read_file(&path).await.map_err(|e| {
            IngressError::persistence(format!("cannot read watermark state '{}': {}", path, e))
        })?;

        let state = match data {
            Some(data) => WatermarkState::from_document(&data, default)?,
            None => {
                tracing::info!("No watermark state at {}, starting from {}", path, default);
                WatermarkState::new(default)
            }
        };
        if state.is_empty() {
            tracing::debug!("Watermark state at {} lists no corridors yet", path);
        } else {
            tracing::debug!("Loaded {} corridor watermarks from {}", state.len(), path);
        }

        Ok(Self {
            storage,
            path,
            state: Mutex::new(state),
        })
    }

    pub async fn snapshot(&self) -> WatermarkState {
        self.state.lock().await.clone()
    }
}

#[async_trait]
impl<S: Storage> WatermarkStore for StateFileWatermarkStore<S> {
    async fn get(&self, corridor: &CorridorId) -> Result<DateTime<Utc>> {
        Ok(self.state.lock().await.get(corridor))
    }

    async fn commit(&self, corridor: &CorridorId, watermark: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.lock().await;
        let Some(next) = state.with_commit(corridor, watermark)? else {
            return Ok(());
        };

        let document = next.to_document()?;
        self.storage
            .write_file(&self.path, &document)
            .await
            .map_err(|e| {
                IngressError::persistence(format!(
                    "cannot write watermark state '{}': {}",
                    self.path, e
                ))
            })?;

        *state = next;
        Ok(())
    }
}
