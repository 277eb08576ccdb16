//! Bounded generation history persisted under one key.
//!
//! Records are stored newest first as a JSON array. Storage problems never
//! reach the caller: reads degrade to an empty history and writes are
//! logged and dropped.

use crate::KvStore;
use ai_pipeline::asset::{base64_bytes, AssetHandle, OutputType};
use ai_pipeline::GenerationSettings;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, warn};

pub const HISTORY_KEY: &str = "generationHistory";
pub const MAX_HISTORY_ITEMS: usize = 20;

/// Persisted form of a generated asset; continuation data is not kept
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryAsset {
    #[serde(rename = "type")]
    pub kind: OutputType,
    pub prompt: String,
    #[serde(rename = "base64", with = "base64_bytes")]
    pub bytes: Vec<u8>,
    pub mime_type: String,
    #[serde(default)]
    pub is_upscaled: bool,
}

impl From<&AssetHandle> for HistoryAsset {
    fn from(asset: &AssetHandle) -> Self {
        Self {
            kind: asset.kind,
            prompt: asset.prompt.clone(),
            bytes: asset.bytes.clone(),
            mime_type: asset.mime_type.clone(),
            is_upscaled: asset.is_upscaled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Creation time in epoch milliseconds; strictly increasing
    pub id: i64,
    pub settings: GenerationSettings,
    pub assets: Vec<HistoryAsset>,
}

pub struct HistoryStore {
    store: Arc<dyn KvStore>,
}

impl HistoryStore {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// All records, newest first. Absent, unreadable or corrupt data reads
    /// as empty; a corrupt value is removed.
    pub fn get_all(&self) -> Vec<HistoryRecord> {
        let raw = match self.store.get(HISTORY_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                error!("failed to load history: {e:#}");
                return Vec::new();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(records) => records,
            Err(e) => {
                error!("discarding corrupt history: {e}");
                if let Err(e) = self.store.remove(HISTORY_KEY) {
                    warn!("failed to remove corrupt history: {e:#}");
                }
                Vec::new()
            }
        }
    }

    /// Prepend a record, evicting the oldest past capacity. Returns the
    /// record, or `None` if it could not be persisted.
    pub fn append(
        &self,
        settings: GenerationSettings,
        assets: Vec<HistoryAsset>,
    ) -> Option<HistoryRecord> {
        let mut records = self.get_all();

        let mut id = chrono::Utc::now().timestamp_millis();
        if let Some(newest) = records.first() {
            if id <= newest.id {
                id = newest.id + 1;
            }
        }

        let record = HistoryRecord {
            id,
            settings,
            assets,
        };
        records.insert(0, record.clone());
        records.truncate(MAX_HISTORY_ITEMS);

        let json = match serde_json::to_string(&records) {
            Ok(json) => json,
            Err(e) => {
                error!("failed to serialize history: {e}");
                return None;
            }
        };
        if let Err(e) = self.store.set(HISTORY_KEY, &json) {
            error!("failed to save history: {e:#}");
            return None;
        }

        debug!(id, records = records.len(), "history record added");
        Some(record)
    }

    pub fn find(&self, id: i64) -> Option<HistoryRecord> {
        self.get_all().into_iter().find(|record| record.id == id)
    }

    pub fn clear(&self) {
        if let Err(e) = self.store.remove(HISTORY_KEY) {
            error!("failed to clear history: {e:#}");
        }
    }
}
