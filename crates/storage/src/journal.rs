//! Single-file JSON journal shared by the rate cache and the sync journal.
//!
//! The document is a JSON object whose well-known keys each hold an array of
//! records. Every read parses the whole file and every write rewrites it, all
//! under one in-process read-write lock. Keys this crate does not know about
//! are carried through writes untouched.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use crate::records::{RATES_SECTION, SYNC_SECTION};

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("journal I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("journal {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    #[error("failed to encode journal record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A record type stored in one named array of the document.
pub trait JournalRecord: Serialize + DeserializeOwned {
    const SECTION: &'static str;

    /// Identity within the section; writes replace a record with equal key.
    fn key(&self) -> String;
}

pub struct JournalStore {
    path: PathBuf,
    lock: RwLock<()>,
}

impl JournalStore {
    /// Opens the journal at `path`, creating a minimal empty document when
    /// the file does not exist yet.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, JournalError> {
        let store = Self {
            path: path.into(),
            lock: RwLock::new(()),
        };
        store.ensure_exists().await?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn ensure_exists(&self) -> Result<(), JournalError> {
        let _guard = self.lock.write().await;
        let exists = tokio::fs::try_exists(&self.path)
            .await
            .map_err(|source| self.io(source))?;
        if !exists {
            let mut doc = Map::new();
            doc.insert(RATES_SECTION.to_string(), Value::Array(vec![]));
            doc.insert(SYNC_SECTION.to_string(), Value::Array(vec![]));
            self.write_document(&doc).await?;
            debug!(path = %self.path.display(), "created empty journal");
        }
        Ok(())
    }

    /// Looks up one record by key.
    pub async fn get<R: JournalRecord>(&self, key: &str) -> Result<Option<R>, JournalError> {
        Ok(self
            .all::<R>()
            .await?
            .into_iter()
            .find(|r| r.key() == key))
    }

    pub async fn contains<R: JournalRecord>(&self, key: &str) -> Result<bool, JournalError> {
        Ok(self.get::<R>(key).await?.is_some())
    }

    /// Every record of the section, in file order.
    pub async fn all<R: JournalRecord>(&self) -> Result<Vec<R>, JournalError> {
        let _guard = self.lock.read().await;
        let doc = self.read_document().await?;
        self.section(&doc, R::SECTION)
    }

    /// Inserts or replaces a single record.
    pub async fn upsert<R: JournalRecord>(&self, record: R) -> Result<(), JournalError> {
        self.upsert_many(vec![record]).await
    }

    /// Inserts or replaces each record by key in a single read-modify-write.
    pub async fn upsert_many<R: JournalRecord>(&self, records: Vec<R>) -> Result<(), JournalError> {
        if records.is_empty() {
            return Ok(());
        }

        let _guard = self.lock.write().await;
        let mut doc = self.read_document().await?;
        let mut existing: Vec<R> = self.section(&doc, R::SECTION)?;

        for record in records {
            let key = record.key();
            match existing.iter_mut().find(|r| r.key() == key) {
                Some(slot) => *slot = record,
                None => existing.push(record),
            }
        }

        doc.insert(R::SECTION.to_string(), serde_json::to_value(&existing)?);
        self.write_document(&doc).await
    }

    fn section<R: JournalRecord>(
        &self,
        doc: &Map<String, Value>,
        name: &str,
    ) -> Result<Vec<R>, JournalError> {
        match doc.get(name) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| self.corrupt(format!("section {name:?}: {e}"))),
        }
    }

    async fn read_document(&self) -> Result<Map<String, Value>, JournalError> {
        let content = tokio::fs::read(&self.path)
            .await
            .map_err(|source| self.io(source))?;
        match serde_json::from_slice::<Value>(&content) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(self.corrupt("top level is not an object".to_string())),
            Err(e) => Err(self.corrupt(e.to_string())),
        }
    }

    async fn write_document(&self, doc: &Map<String, Value>) -> Result<(), JournalError> {
        let content = serde_json::to_vec_pretty(doc)?;
        // Write-then-rename: readers never observe a truncated document.
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|source| self.io(source))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|source| self.io(source))
    }

    fn io(&self, source: std::io::Error) -> JournalError {
        JournalError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn corrupt(&self, reason: String) -> JournalError {
        JournalError::Corrupt {
            path: self.path.clone(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{RateRecord, SyncRecord};
    use chrono::{NaiveDate, TimeZone, Utc};
    use std::sync::Arc;

    fn at(h: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 8, h, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn open_creates_minimal_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        JournalStore::open(&path).await.unwrap();

        let raw: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(
            raw,
            serde_json::json!({"rates": [], "ynab_synced_transactions": []})
        );
    }

    #[tokio::test]
    async fn open_keeps_existing_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(
            &path,
            r#"{"rates":[],"ynab_synced_transactions":[{"import_id":"YNAB:aa","synced_at":"2024-04-08T01:00:00Z"}]}"#,
        )
        .unwrap();

        let store = JournalStore::open(&path).await.unwrap();
        assert!(store.contains::<SyncRecord>("YNAB:aa").await.unwrap());
    }

    #[tokio::test]
    async fn upsert_appends_then_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let store = JournalStore::open(dir.path().join("data.json")).await.unwrap();

        store.upsert(SyncRecord::new("YNAB:1", at(1))).await.unwrap();
        store.upsert(SyncRecord::new("YNAB:2", at(2))).await.unwrap();
        store.upsert(SyncRecord::new("YNAB:1", at(3))).await.unwrap();

        let all = store.all::<SyncRecord>().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0], SyncRecord::new("YNAB:1", at(3)));
        assert_eq!(all[1].import_id, "YNAB:2");
    }

    #[tokio::test]
    async fn sections_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let store = JournalStore::open(dir.path().join("data.json")).await.unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 4, 8).unwrap();

        store.upsert(RateRecord::new(day, "USD", 17.7)).await.unwrap();
        store.upsert(SyncRecord::new("YNAB:1", at(1))).await.unwrap();
        store.upsert(RateRecord::new(day, "USD", 17.9)).await.unwrap();

        let rates = store.all::<RateRecord>().await.unwrap();
        assert_eq!(rates, vec![RateRecord::new(day, "USD", 17.9)]);
        assert!(store.contains::<SyncRecord>("YNAB:1").await.unwrap());
        assert_eq!(
            store
                .get::<RateRecord>(&RateRecord::key_for(day, "USD"))
                .await
                .unwrap()
                .map(|r| r.value),
            Some(17.9)
        );
    }

    #[tokio::test]
    async fn unknown_sections_survive_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, r#"{"rates":[],"other_tool":{"k":1}}"#).unwrap();

        let store = JournalStore::open(&path).await.unwrap();
        store.upsert(SyncRecord::new("YNAB:1", at(1))).await.unwrap();

        let raw: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["other_tool"], serde_json::json!({"k": 1}));
        assert_eq!(raw["ynab_synced_transactions"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn corrupt_document_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = JournalStore::open(&path).await.unwrap();
        let err = store.contains::<SyncRecord>("x").await.unwrap_err();
        assert!(matches!(err, JournalError::Corrupt { .. }));
        let err = store.upsert(SyncRecord::new("x", at(1))).await.unwrap_err();
        assert!(matches!(err, JournalError::Corrupt { .. }));
        // Nothing was overwritten.
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{not json");
    }

    #[tokio::test]
    async fn malformed_section_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, r#"{"ynab_synced_transactions": 5}"#).unwrap();

        let store = JournalStore::open(&path).await.unwrap();
        assert!(matches!(
            store.all::<SyncRecord>().await,
            Err(JournalError::Corrupt { .. })
        ));
    }

    #[tokio::test]
    async fn concurrent_writers_serialize() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JournalStore::open(dir.path().join("data.json")).await.unwrap());

        let mut handles = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .upsert(SyncRecord::new(&format!("YNAB:{i}"), at(1)))
                    .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        assert_eq!(store.all::<SyncRecord>().await.unwrap().len(), 20);
    }

    #[tokio::test]
    async fn upsert_many_single_write() {
        let dir = tempfile::tempdir().unwrap();
        let store = JournalStore::open(dir.path().join("data.json")).await.unwrap();
        let batch: Vec<_> = (0..100)
            .map(|i| SyncRecord::new(&format!("YNAB:{i}"), at(1)))
            .collect();
        store.upsert_many(batch).await.unwrap();
        assert_eq!(store.all::<SyncRecord>().await.unwrap().len(), 100);
        store.upsert_many(Vec::<SyncRecord>::new()).await.unwrap();
    }

    #[tokio::test]
    async fn missing_directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let res = JournalStore::open(dir.path().join("nope").join("data.json")).await;
        assert!(matches!(res, Err(JournalError::Io { .. })));
    }
}
