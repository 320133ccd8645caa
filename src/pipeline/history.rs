//! Append-only config history per pipeline with cursor pagination

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, PartialEq)]
pub enum HistoryError {
    #[error("No history for pipeline '{0}'")]
    PipelineNotFound(Uuid),

    #[error("Invalid cursor: '{0}'")]
    InvalidCursor(String),

    #[error("History page size must be greater than zero")]
    InvalidLimit,

    #[error("History for pipeline '{0}' already exists")]
    AlreadyInitialized(Uuid),
}

/// One committed raw config
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfigVersion {
    id: Uuid,
    raw_config: String,
    created_at: DateTime<Utc>,
    #[serde(skip)]
    sequence: u64,
}

impl PipelineConfigVersion {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn raw_config(&self) -> &str {
        &self.raw_config
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfigHistoryParams {
    /// Page size
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last: Option<usize>,
    /// Only return versions older than this cursor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
}

impl PipelineConfigHistoryParams {
    pub fn last(mut self, last: usize) -> Self {
        self.last = Some(last);
        self
    }

    pub fn before(mut self, cursor: impl Into<String>) -> Self {
        self.before = Some(cursor.into());
        self
    }
}

/// A page of versions, newest first
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfigHistory {
    pub items: Vec<PipelineConfigVersion>,
    /// Cursor for the next page, absent on the last page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_cursor: Option<String>,
}

/// Opaque position in one pipeline's history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cursor {
    pipeline_id: Uuid,
    sequence: u64,
}

impl Cursor {
    fn encode(&self) -> String {
        URL_SAFE_NO_PAD.encode(format!("{}:{}", self.pipeline_id, self.sequence))
    }

    fn decode(raw: &str) -> Result<Self, HistoryError> {
        let invalid = || HistoryError::InvalidCursor(raw.to_string());

        let bytes = URL_SAFE_NO_PAD.decode(raw).map_err(|_| invalid())?;
        let text = String::from_utf8(bytes).map_err(|_| invalid())?;
        let (id, sequence) = text.split_once(':').ok_or_else(invalid)?;

        Ok(Self {
            pipeline_id: Uuid::parse_str(id).map_err(|_| invalid())?,
            sequence: sequence.parse().map_err(|_| invalid())?,
        })
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Config versions for every pipeline, oldest first per pipeline
#[derive(Debug)]
pub struct HistoryStore {
    versions: DashMap<Uuid, Vec<PipelineConfigVersion>>,
    /// Page size when a query does not set `last`; unbounded when `None`
    default_limit: Option<usize>,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryStore {
    pub fn new() -> Self {
        Self {
            versions: DashMap::new(),
            default_limit: None,
        }
    }

    pub fn with_default_limit(default_limit: usize) -> Self {
        Self {
            versions: DashMap::new(),
            default_limit: Some(default_limit.max(1)),
        }
    }

    /// Start a pipeline's history with its initial config
    pub fn init(
        &self,
        pipeline_id: Uuid,
        raw_config: &str,
    ) -> Result<PipelineConfigVersion, HistoryError> {
        use dashmap::mapref::entry::Entry;

        match self.versions.entry(pipeline_id) {
            Entry::Occupied(_) => Err(HistoryError::AlreadyInitialized(pipeline_id)),
            Entry::Vacant(entry) => {
                let version = PipelineConfigVersion {
                    id: Uuid::new_v4(),
                    raw_config: raw_config.to_string(),
                    created_at: Utc::now(),
                    sequence: 0,
                };
                entry.insert(vec![version.clone()]);
                Ok(version)
            }
        }
    }

    /// Append a committed config. Timestamps never go backwards within a pipeline.
    pub fn record_version(
        &self,
        pipeline_id: Uuid,
        raw_config: &str,
    ) -> Result<PipelineConfigVersion, HistoryError> {
        let mut versions = self
            .versions
            .get_mut(&pipeline_id)
            .ok_or(HistoryError::PipelineNotFound(pipeline_id))?;

        let now = Utc::now();
        let (created_at, sequence) = match versions.last() {
            Some(last) => (now.max(last.created_at), last.sequence + 1),
            None => (now, 0),
        };
        let version = PipelineConfigVersion {
            id: Uuid::new_v4(),
            raw_config: raw_config.to_string(),
            created_at,
            sequence,
        };
        versions.push(version.clone());
        Ok(version)
    }

    /// List versions newest first.
    ///
    /// With `before`, only versions strictly older than the cursor are returned.
    /// `end_cursor` is set only when older versions remain past this page.
    pub fn list_versions(
        &self,
        pipeline_id: Uuid,
        params: &PipelineConfigHistoryParams,
    ) -> Result<PipelineConfigHistory, HistoryError> {
        let limit = match params.last {
            Some(0) => return Err(HistoryError::InvalidLimit),
            Some(n) => n,
            None => self.default_limit.unwrap_or(usize::MAX),
        };
        let before = params
            .before
            .as_deref()
            .map(|raw| {
                let cursor = Cursor::decode(raw)?;
                if cursor.pipeline_id != pipeline_id {
                    return Err(HistoryError::InvalidCursor(raw.to_string()));
                }
                Ok(cursor.sequence)
            })
            .transpose()?;

        let versions = self
            .versions
            .get(&pipeline_id)
            .ok_or(HistoryError::PipelineNotFound(pipeline_id))?;

        let mut older = versions
            .iter()
            .rev()
            .filter(|v| before.map_or(true, |seq| v.sequence < seq));

        let items: Vec<_> = older.by_ref().take(limit).cloned().collect();
        let end_cursor = match (items.last(), older.next()) {
            (Some(last), Some(_)) => Some(
                Cursor {
                    pipeline_id,
                    sequence: last.sequence,
                }
                .encode(),
            ),
            _ => None,
        };

        Ok(PipelineConfigHistory { items, end_cursor })
    }

    /// Drop a pipeline's history; returns how many versions were removed
    pub fn remove(&self, pipeline_id: Uuid) -> usize {
        self.versions
            .remove(&pipeline_id)
            .map(|(_, versions)| versions.len())
            .unwrap_or(0)
    }

    /// Number of versions recorded for a pipeline
    pub fn len(&self, pipeline_id: Uuid) -> usize {
        self.versions
            .get(&pipeline_id)
            .map(|versions| versions.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(id: Uuid, configs: &[&str]) -> HistoryStore {
        let store = HistoryStore::new();
        store.init(id, configs[0]).unwrap();
        for raw in &configs[1..] {
            store.record_version(id, raw).unwrap();
        }
        store
    }

    fn raws(history: &PipelineConfigHistory) -> Vec<&str> {
        history.items.iter().map(|v| v.raw_config()).collect()
    }

    #[test]
    fn test_newest_first() {
        let id = Uuid::new_v4();
        let store = store_with(id, &["v1", "v2", "v3"]);

        let history = store
            .list_versions(id, &PipelineConfigHistoryParams::default())
            .unwrap();
        assert_eq!(raws(&history), vec!["v3", "v2", "v1"]);
        assert!(history.end_cursor.is_none());
    }

    #[test]
    fn test_created_at_is_monotonic() {
        let id = Uuid::new_v4();
        let store = store_with(id, &["v1", "v2", "v3", "v4"]);

        let history = store
            .list_versions(id, &PipelineConfigHistoryParams::default())
            .unwrap();
        for pair in history.items.windows(2) {
            assert!(pair[0].created_at() >= pair[1].created_at());
        }
    }

    #[test]
    fn test_pagination_walks_all_versions() {
        let id = Uuid::new_v4();
        let store = store_with(id, &["v1", "v2", "v3", "v4", "v5"]);

        let first = store
            .list_versions(id, &PipelineConfigHistoryParams::default().last(2))
            .unwrap();
        assert_eq!(raws(&first), vec!["v5", "v4"]);
        let cursor = first.end_cursor.clone().unwrap();

        let second = store
            .list_versions(id, &PipelineConfigHistoryParams::default().last(2).before(cursor))
            .unwrap();
        assert_eq!(raws(&second), vec!["v3", "v2"]);

        let third = store
            .list_versions(
                id,
                &PipelineConfigHistoryParams::default()
                    .last(2)
                    .before(second.end_cursor.clone().unwrap()),
            )
            .unwrap();
        assert_eq!(raws(&third), vec!["v1"]);
        assert!(third.end_cursor.is_none());
    }

    #[test]
    fn test_default_limit_applies_without_last() {
        let id = Uuid::new_v4();
        let store = HistoryStore::with_default_limit(1);
        store.init(id, "v1").unwrap();
        store.record_version(id, "v2").unwrap();

        let history = store
            .list_versions(id, &PipelineConfigHistoryParams::default())
            .unwrap();
        assert_eq!(raws(&history), vec!["v2"]);
        assert!(history.end_cursor.is_some());
    }

    #[test]
    fn test_exact_page_has_no_end_cursor() {
        let id = Uuid::new_v4();
        let store = store_with(id, &["v1", "v2"]);

        let history = store
            .list_versions(id, &PipelineConfigHistoryParams::default().last(2))
            .unwrap();
        assert_eq!(history.items.len(), 2);
        assert!(history.end_cursor.is_none());
    }

    #[test]
    fn test_zero_limit_rejected() {
        let id = Uuid::new_v4();
        let store = store_with(id, &["v1"]);
        let result = store.list_versions(id, &PipelineConfigHistoryParams::default().last(0));
        assert_eq!(result, Err(HistoryError::InvalidLimit));
    }

    #[test]
    fn test_invalid_cursor() {
        let id = Uuid::new_v4();
        let store = store_with(id, &["v1"]);

        let result = store.list_versions(id, &PipelineConfigHistoryParams::default().before("%%%"));
        assert!(matches!(result, Err(HistoryError::InvalidCursor(_))));

        let foreign = Cursor {
            pipeline_id: Uuid::new_v4(),
            sequence: 1,
        };
        let result = store.list_versions(
            id,
            &PipelineConfigHistoryParams::default().before(foreign.to_string()),
        );
        assert!(matches!(result, Err(HistoryError::InvalidCursor(_))));
    }

    #[test]
    fn test_unknown_pipeline() {
        let store = HistoryStore::new();
        let id = Uuid::new_v4();
        assert_eq!(
            store.record_version(id, "v1").unwrap_err(),
            HistoryError::PipelineNotFound(id)
        );
        assert!(matches!(
            store.list_versions(id, &PipelineConfigHistoryParams::default()),
            Err(HistoryError::PipelineNotFound(_))
        ));
    }

    #[test]
    fn test_init_twice_and_remove() {
        let id = Uuid::new_v4();
        let store = store_with(id, &["v1", "v2"]);

        assert_eq!(store.init(id, "v1"), Err(HistoryError::AlreadyInitialized(id)));
        assert_eq!(store.len(id), 2);
        assert_eq!(store.remove(id), 2);
        assert_eq!(store.len(id), 0);
    }

    #[test]
    fn test_cursor_roundtrip() {
        let cursor = Cursor {
            pipeline_id: Uuid::new_v4(),
            sequence: 42,
        };
        assert_eq!(Cursor::decode(&cursor.encode()).unwrap(), cursor);
    }
}
