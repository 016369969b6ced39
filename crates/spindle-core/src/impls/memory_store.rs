//! InMemoryRecordStore - 開発・テスト用の永続化ゲートウェイ
//!
//! # 実装詳細
//! - `HashMap<Table, Vec<Record>>` で table ごとに挿入順で保持
//! - 「newest / oldest」は (timestamp, 挿入順) で決める（SQLite 実装の rowid と同じ規則）
//! - `set_offline(true)` で障害を再現できる

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::{Record, StoreError, Table};
use crate::ports::RecordStore;

#[derive(Default)]
struct State {
    tables: HashMap<Table, Vec<Record>>,
    offline: bool,
}

/// InMemoryRecordStore はプロセス内だけで完結する RecordStore
///
/// # 使用例
/// ```ignore
/// let store = InMemoryRecordStore::new();
/// store.append(QueueEntry::new(AssetKey::new("a.png"), now).into()).await?;
/// ```
#[derive(Default)]
pub struct InMemoryRecordStore {
    state: Mutex<State>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline every operation fails with `StoreError::Query`.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut State) -> R) -> Result<R, StoreError> {
        let mut state = self.lock();
        if state.offline {
            return Err(StoreError::Query("store is offline".to_string()));
        }
        Ok(f(&mut state))
    }
}

impl State {
    fn insert(&mut self, record: Record) {
        let table = record.table();
        let rows = self.tables.entry(table).or_default();
        if table.unique_key() && rows.iter().any(|r| r.key() == record.key()) {
            return;
        }
        rows.push(record);
    }
}

/// Index of the newest row: latest timestamp, ties broken by later insertion.
fn newest_index(rows: &[Record]) -> Option<usize> {
    rows.iter()
        .enumerate()
        .max_by_key(|(i, r)| (r.timestamp(), *i))
        .map(|(i, _)| i)
}

/// Index of the oldest row: earliest timestamp, ties broken by earlier insertion.
fn oldest_index(rows: &[Record]) -> Option<usize> {
    rows.iter()
        .enumerate()
        .min_by_key(|(i, r)| (r.timestamp(), *i))
        .map(|(i, _)| i)
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn append(&self, record: Record) -> Result<(), StoreError> {
        self.with_state(|s| s.insert(record))
    }

    async fn append_all(&self, records: Vec<Record>) -> Result<(), StoreError> {
        self.with_state(|s| {
            for record in records {
                s.insert(record);
            }
        })
    }

    async fn scan_all(&self, table: Table) -> Result<Vec<Record>, StoreError> {
        self.with_state(|s| {
            let mut rows: Vec<(usize, Record)> = s
                .tables
                .get(&table)
                .map(|rows| rows.iter().cloned().enumerate().collect())
                .unwrap_or_default();
            rows.sort_by_key(|(i, r)| (r.timestamp(), *i));
            rows.into_iter().map(|(_, r)| r).collect()
        })
    }

    async fn count(&self, table: Table) -> Result<usize, StoreError> {
        self.with_state(|s| s.tables.get(&table).map_or(0, Vec::len))
    }

    async fn exists(&self, table: Table, key: &str) -> Result<bool, StoreError> {
        self.with_state(|s| {
            s.tables
                .get(&table)
                .is_some_and(|rows| rows.iter().any(|r| r.key() == key))
        })
    }

    async fn delete(&self, table: Table, key: &str) -> Result<usize, StoreError> {
        self.with_state(|s| {
            let Some(rows) = s.tables.get_mut(&table) else {
                return 0;
            };
            let before = rows.len();
            rows.retain(|r| r.key() != key);
            before - rows.len()
        })
    }

    async fn delete_oldest(&self, table: Table) -> Result<bool, StoreError> {
        self.with_state(|s| {
            let Some(rows) = s.tables.get_mut(&table) else {
                return false;
            };
            match oldest_index(rows) {
                Some(i) => {
                    rows.remove(i);
                    true
                }
                None => false,
            }
        })
    }

    async fn newest(&self, table: Table) -> Result<Option<Record>, StoreError> {
        self.with_state(|s| {
            s.tables
                .get(&table)
                .and_then(|rows| newest_index(rows).map(|i| rows[i].clone()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AssetKey, PeerId, QueueEntry, RecentEntry, RelationshipRequest};
    use chrono::{DateTime, TimeZone, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn queue(key: &str, secs: i64) -> Record {
        QueueEntry::new(AssetKey::new(key), at(secs)).into()
    }

    #[tokio::test]
    async fn newest_prefers_latest_timestamp_then_latest_insert() {
        let store = InMemoryRecordStore::new();
        store
            .append_all(vec![queue("a", 5), queue("b", 9), queue("c", 9), queue("d", 1)])
            .await
            .unwrap();

        let newest = store.newest(Table::Queue).await.unwrap().unwrap();
        assert_eq!(newest.key(), "c");
        assert_eq!(store.newest_timestamp(Table::Queue).await.unwrap(), Some(at(9)));
    }

    #[tokio::test]
    async fn delete_oldest_removes_one_row() {
        let store = InMemoryRecordStore::new();
        for (key, secs) in [("a", 3), ("b", 1), ("c", 2)] {
            store
                .append(RecentEntry::new(AssetKey::new(key), at(secs)).into())
                .await
                .unwrap();
        }

        assert!(store.delete_oldest(Table::Recent).await.unwrap());
        let keys: Vec<String> = store
            .scan_all(Table::Recent)
            .await
            .unwrap()
            .iter()
            .map(|r| r.key().to_string())
            .collect();
        assert_eq!(keys, vec!["c", "a"]);
    }

    #[tokio::test]
    async fn relationship_requests_keep_first_record_per_peer() {
        let store = InMemoryRecordStore::new();
        let first = RelationshipRequest::new(PeerId::new("7"), "alice", at(1));
        store.append(first.clone().into()).await.unwrap();
        store
            .append_all(vec![
                RelationshipRequest::new(PeerId::new("7"), "alice_renamed", at(2)).into(),
                RelationshipRequest::new(PeerId::new("8"), "bob", at(3)).into(),
            ])
            .await
            .unwrap();

        assert_eq!(store.count(Table::RelationshipRequests).await.unwrap(), 2);
        let rows = store.scan_all(Table::RelationshipRequests).await.unwrap();
        assert_eq!(RelationshipRequest::try_from(rows[0].clone()).unwrap(), first);

        // queue keys may repeat
        store.append(queue("a", 1)).await.unwrap();
        store.append(queue("a", 2)).await.unwrap();
        assert_eq!(store.count(Table::Queue).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn delete_oldest_on_empty_table_is_noop() {
        let store = InMemoryRecordStore::new();
        assert!(!store.delete_oldest(Table::Recent).await.unwrap());
    }

    #[tokio::test]
    async fn tables_are_isolated() {
        let store = InMemoryRecordStore::new();
        store.append(queue("a.png", 1)).await.unwrap();
        store
            .append(RelationshipRequest::new(PeerId::new("a.png"), "x", at(1)).into())
            .await
            .unwrap();

        assert_eq!(store.count(Table::Queue).await.unwrap(), 1);
        assert_eq!(store.count(Table::Recent).await.unwrap(), 0);
        assert_eq!(store.delete(Table::Queue, "a.png").await.unwrap(), 1);
        assert!(store
            .exists(Table::RelationshipRequests, "a.png")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn offline_store_fails_every_operation() {
        let store = InMemoryRecordStore::new();
        store.set_offline(true);
        assert!(store.count(Table::Queue).await.is_err());
        assert!(store.append(queue("a", 1)).await.is_err());

        store.set_offline(false);
        assert_eq!(store.count(Table::Queue).await.unwrap(), 0);
    }
}
