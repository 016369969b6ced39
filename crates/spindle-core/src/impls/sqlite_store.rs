//! SqliteRecordStore - 本番用の永続化ゲートウェイ
//!
//! # 実装詳細
//! - tokio-rusqlite の単一バックグラウンドスレッドに全 SQL を委譲（`call()`）
//! - テーブル名は `TableNames` で検証済みの識別子だけを使う（リクエスト時の文字列補間なし）
//! - timestamp は epoch からの整数マイクロ秒
//! - 「newest / oldest」は (timestamp, rowid) の順序で一意に決まる
//! - 接続は `open_with_retry` で backoff + 上限付きリトライ

use std::convert::Infallible;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;
use tokio_rusqlite::Connection;
use tracing::{info, warn};

use crate::domain::{
    AssetKey, Outcome, PeerId, QueueEntry, RecentEntry, Record, RelationshipRequest, StoreError,
    Table, TableNames,
};
use crate::ports::RecordStore;
use crate::retry::{Attempted, RetryPolicy, run_with_backoff};

/// Row as read from any table, before it is typed.
struct RawRow {
    key: String,
    extra: Option<String>,
    micros: i64,
}

pub struct SqliteRecordStore {
    conn: Connection,
    names: TableNames,
}

fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> StoreError {
    StoreError::Query(e.to_string())
}

fn to_micros(at: DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

fn from_micros(micros: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| StoreError::Malformed(format!("timestamp out of range: {micros}")))
}

impl SqliteRecordStore {
    /// Open (or create) the database at `path` and make sure every table exists.
    pub async fn open(path: impl AsRef<Path>, names: TableNames) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())
            .await
            .map_err(|e| StoreError::Connect {
                attempts: 1,
                reason: e.to_string(),
            })?;
        let store = Self { conn, names };
        store.create_tables().await?;
        Ok(store)
    }

    /// `open`, retried under `policy` until it succeeds or the attempt cap is hit.
    pub async fn open_with_retry(
        path: impl AsRef<Path>,
        names: TableNames,
        policy: &RetryPolicy,
    ) -> Result<Self, StoreError> {
        let path: PathBuf = path.as_ref().to_path_buf();

        let attempted = run_with_backoff::<_, Infallible, _, _>(policy, |attempt| {
            let path = path.clone();
            let names = names.clone();
            async move {
                Ok(match Self::open(&path, names).await {
                    Ok(store) => Outcome::Success(store),
                    Err(e) => {
                        warn!(attempt, path = %path.display(), error = %e, "database connection failed");
                        Outcome::retryable(e.to_string())
                    }
                })
            }
        })
        .await
        .unwrap_or_else(|never| match never {});

        match attempted {
            Attempted::Succeeded { value, attempts } => {
                info!(attempts, path = %path.display(), "database connected");
                Ok(value)
            }
            other => Err(StoreError::Connect {
                attempts: other.attempts(),
                reason: other
                    .failure_reason()
                    .unwrap_or("no connection attempt was made")
                    .to_string(),
            }),
        }
    }

    async fn create_tables(&self) -> Result<(), StoreError> {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS \"{queue}\" (
                filepath TEXT NOT NULL,
                comment TEXT,
                timestamp INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS \"{recent}\" (
                filepath TEXT NOT NULL,
                timestamp INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS \"{requests}\" (
                id TEXT NOT NULL,
                screen_name TEXT NOT NULL,
                timestamp INTEGER NOT NULL
            );
            CREATE UNIQUE INDEX IF NOT EXISTS \"{requests}_id\" ON \"{requests}\" (id);",
            queue = self.names.resolve(Table::Queue),
            recent = self.names.resolve(Table::Recent),
            requests = self.names.resolve(Table::RelationshipRequests),
        );

        self.conn
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch(&ddl)?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    fn table(&self, table: Table) -> String {
        format!("\"{}\"", self.names.resolve(table))
    }

    /// Column list matching `RawRow` for `table`.
    fn select_columns(table: Table) -> &'static str {
        match table {
            Table::Queue => "filepath, comment, timestamp",
            Table::Recent => "filepath, NULL, timestamp",
            Table::RelationshipRequests => "id, screen_name, timestamp",
        }
    }

    fn decode(table: Table, raw: RawRow) -> Result<Record, StoreError> {
        let at = from_micros(raw.micros)?;
        Ok(match table {
            Table::Queue => Record::Queue(QueueEntry {
                key: AssetKey::new(raw.key),
                comment: raw.extra,
                enqueued_at: at,
            }),
            Table::Recent => Record::Recent(RecentEntry::new(AssetKey::new(raw.key), at)),
            Table::RelationshipRequests => Record::RelationshipRequest(RelationshipRequest::new(
                PeerId::new(raw.key),
                raw.extra.unwrap_or_default(),
                at,
            )),
        })
    }

    /// SQL and parameters inserting `record` into its table.
    fn insert_statement(&self, record: &Record) -> (String, Vec<rusqlite::types::Value>) {
        use rusqlite::types::Value;

        let table = self.table(record.table());
        let insert = if record.table().unique_key() {
            "INSERT OR IGNORE"
        } else {
            "INSERT"
        };
        let at = Value::Integer(to_micros(record.timestamp()));
        match record {
            Record::Queue(e) => (
                format!("{insert} INTO {table} (filepath, comment, timestamp) VALUES (?1, ?2, ?3)"),
                vec![
                    Value::Text(e.key.as_str().to_string()),
                    e.comment.clone().map_or(Value::Null, Value::Text),
                    at,
                ],
            ),
            Record::Recent(e) => (
                format!("{insert} INTO {table} (filepath, timestamp) VALUES (?1, ?2)"),
                vec![Value::Text(e.key.as_str().to_string()), at],
            ),
            Record::RelationshipRequest(r) => (
                format!("{insert} INTO {table} (id, screen_name, timestamp) VALUES (?1, ?2, ?3)"),
                vec![
                    Value::Text(r.peer_id.as_str().to_string()),
                    Value::Text(r.peer_handle.clone()),
                    at,
                ],
            ),
        }
    }

    async fn query_rows(&self, table: Table, sql: String) -> Result<Vec<Record>, StoreError> {
        let raw = self
            .conn
            .call(move |conn| -> Result<Vec<RawRow>, rusqlite::Error> {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok(RawRow {
                            key: row.get(0)?,
                            extra: row.get(1)?,
                            micros: row.get(2)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(map_tr_err)?;

        raw.into_iter().map(|r| Self::decode(table, r)).collect()
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn append(&self, record: Record) -> Result<(), StoreError> {
        let (sql, params) = self.insert_statement(&record);
        self.conn
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(&sql, rusqlite::params_from_iter(params))?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    async fn append_all(&self, records: Vec<Record>) -> Result<(), StoreError> {
        let statements: Vec<_> = records.iter().map(|r| self.insert_statement(r)).collect();
        self.conn
            .call(move |conn| -> Result<(), rusqlite::Error> {
                let tx = conn.transaction()?;
                for (sql, params) in statements {
                    tx.execute(&sql, rusqlite::params_from_iter(params))?;
                }
                tx.commit()
            })
            .await
            .map_err(map_tr_err)
    }

    async fn scan_all(&self, table: Table) -> Result<Vec<Record>, StoreError> {
        let sql = format!(
            "SELECT {} FROM {} ORDER BY {} ASC, rowid ASC",
            Self::select_columns(table),
            self.table(table),
            table.order_column(),
        );
        self.query_rows(table, sql).await
    }

    async fn count(&self, table: Table) -> Result<usize, StoreError> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.table(table));
        let count = self
            .conn
            .call(move |conn| -> Result<i64, rusqlite::Error> {
                conn.query_row(&sql, [], |row| row.get(0))
            })
            .await
            .map_err(map_tr_err)?;
        usize::try_from(count).map_err(|_| StoreError::Malformed(format!("negative count {count}")))
    }

    async fn exists(&self, table: Table, key: &str) -> Result<bool, StoreError> {
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE {} = ?1)",
            self.table(table),
            table.key_column(),
        );
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<bool, rusqlite::Error> {
                conn.query_row(&sql, [key], |row| row.get(0))
            })
            .await
            .map_err(map_tr_err)
    }

    async fn delete(&self, table: Table, key: &str) -> Result<usize, StoreError> {
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?1",
            self.table(table),
            table.key_column()
        );
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<usize, rusqlite::Error> { conn.execute(&sql, [key]) })
            .await
            .map_err(map_tr_err)
    }

    async fn delete_oldest(&self, table: Table) -> Result<bool, StoreError> {
        let name = self.table(table);
        let sql = format!(
            "DELETE FROM {name} WHERE rowid = \
             (SELECT rowid FROM {name} ORDER BY {order} ASC, rowid ASC LIMIT 1)",
            order = table.order_column(),
        );
        let deleted = self
            .conn
            .call(move |conn| -> Result<usize, rusqlite::Error> { conn.execute(&sql, []) })
            .await
            .map_err(map_tr_err)?;
        Ok(deleted > 0)
    }

    async fn newest(&self, table: Table) -> Result<Option<Record>, StoreError> {
        let sql = format!(
            "SELECT {} FROM {} ORDER BY {} DESC, rowid DESC LIMIT 1",
            Self::select_columns(table),
            self.table(table),
            table.order_column(),
        );
        let raw = self
            .conn
            .call(move |conn| -> Result<Option<RawRow>, rusqlite::Error> {
                conn.query_row(&sql, [], |row| {
                    Ok(RawRow {
                        key: row.get(0)?,
                        extra: row.get(1)?,
                        micros: row.get(2)?,
                    })
                })
                .optional()
            })
            .await
            .map_err(map_tr_err)?;

        raw.map(|r| Self::decode(table, r)).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;
    use tempfile::tempdir;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    async fn open_temp() -> (tempfile::TempDir, SqliteRecordStore) {
        let dir = tempdir().unwrap();
        let store = SqliteRecordStore::open(dir.path().join("spindle.db"), TableNames::default())
            .await
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn queue_rows_round_trip_with_comment() {
        let (_dir, store) = open_temp().await;
        let entry = QueueEntry::new(AssetKey::new("cats/1.png"), at(10)).with_comment("meow");
        store.append(entry.clone().into()).await.unwrap();

        let rows = store.scan_all(Table::Queue).await.unwrap();
        assert_eq!(rows, vec![Record::Queue(entry)]);
        assert!(store.exists(Table::Queue, "cats/1.png").await.unwrap());
        assert!(!store.exists(Table::Recent, "cats/1.png").await.unwrap());
    }

    #[tokio::test]
    async fn newest_breaks_timestamp_ties_by_insertion_order() {
        let (_dir, store) = open_temp().await;
        let rows: Vec<Record> = ["a", "b", "c"]
            .into_iter()
            .map(|k| QueueEntry::new(AssetKey::new(k), at(5)).into())
            .collect();
        store.append_all(rows).await.unwrap();

        let newest = store.newest(Table::Queue).await.unwrap().unwrap();
        assert_eq!(newest.key(), "c");
    }

    #[tokio::test]
    async fn delete_oldest_and_count() {
        let (_dir, store) = open_temp().await;
        for (key, secs) in [("x", 30), ("y", 10), ("z", 20)] {
            store
                .append(RecentEntry::new(AssetKey::new(key), at(secs)).into())
                .await
                .unwrap();
        }

        assert!(store.delete_oldest(Table::Recent).await.unwrap());
        assert_eq!(store.count(Table::Recent).await.unwrap(), 2);
        assert!(!store.exists(Table::Recent, "y").await.unwrap());
        assert_eq!(
            store.newest_timestamp(Table::Recent).await.unwrap(),
            Some(at(30))
        );
    }

    #[tokio::test]
    async fn relationship_requests_keep_handle() {
        let (_dir, store) = open_temp().await;
        let request = RelationshipRequest::new(PeerId::new("12345"), "alice", at(1));
        store.append(request.clone().into()).await.unwrap();

        let back = RelationshipRequest::try_from(
            store
                .newest(Table::RelationshipRequests)
                .await
                .unwrap()
                .unwrap(),
        )
        .unwrap();
        assert_eq!(back, request);
        assert_eq!(
            store.delete(Table::RelationshipRequests, "12345").await.unwrap(),
            1
        );
        assert_eq!(store.newest(Table::RelationshipRequests).await.unwrap(), None);
    }

    #[tokio::test]
    async fn duplicate_relationship_request_is_ignored() {
        let (_dir, store) = open_temp().await;
        let first = RelationshipRequest::new(PeerId::new("12345"), "alice", at(1));
        store.append(first.clone().into()).await.unwrap();
        store
            .append(RelationshipRequest::new(PeerId::new("12345"), "alice2", at(2)).into())
            .await
            .unwrap();
        store
            .append_all(vec![
                RelationshipRequest::new(PeerId::new("12345"), "alice3", at(3)).into(),
                RelationshipRequest::new(PeerId::new("999"), "bob", at(4)).into(),
            ])
            .await
            .unwrap();

        assert_eq!(store.count(Table::RelationshipRequests).await.unwrap(), 2);
        let rows = store.scan_all(Table::RelationshipRequests).await.unwrap();
        assert_eq!(RelationshipRequest::try_from(rows[0].clone()).unwrap(), first);
    }

    #[tokio::test]
    async fn microsecond_timestamps_survive() {
        let (_dir, store) = open_temp().await;
        let precise = at(1_700_000_000) + chrono::Duration::microseconds(123_456);
        store
            .append(RecentEntry::new(AssetKey::new("p"), precise).into())
            .await
            .unwrap();
        assert_eq!(
            store.newest_timestamp(Table::Recent).await.unwrap(),
            Some(precise)
        );
    }

    #[tokio::test]
    async fn custom_table_names_are_used() {
        let dir = tempdir().unwrap();
        let names = TableNames::new("kitten_queue", "kitten_recent", "kitten_requests").unwrap();
        let path = dir.path().join("custom.db");
        let store = SqliteRecordStore::open(&path, names).await.unwrap();
        store
            .append(QueueEntry::new(AssetKey::new("k"), at(1)).into())
            .await
            .unwrap();
        drop(store);

        let conn = rusqlite::Connection::open(&path).unwrap();
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM kitten_queue", [], |row| row.get(0))
            .unwrap();
        assert_eq!(n, 1);
    }

    #[tokio::test]
    async fn reopening_keeps_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("spindle.db");
        {
            let store = SqliteRecordStore::open(&path, TableNames::default()).await.unwrap();
            store
                .append(QueueEntry::new(AssetKey::new("keep"), at(1)).into())
                .await
                .unwrap();
        }
        let store = SqliteRecordStore::open_with_retry(
            &path,
            TableNames::default(),
            &RetryPolicy::new(2, Duration::from_millis(1)),
        )
        .await
        .unwrap();
        assert_eq!(store.count(Table::Queue).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn connect_gives_up_after_the_cap() {
        let dir = tempdir().unwrap();
        // a directory that does not exist cannot hold a database file
        let path = dir.path().join("missing").join("spindle.db");

        let err = SqliteRecordStore::open_with_retry(
            &path,
            TableNames::default(),
            &RetryPolicy::new(3, Duration::from_millis(10)),
        )
        .await
        .err()
        .unwrap();

        assert!(matches!(err, StoreError::Connect { attempts: 3, .. }), "{err}");
    }
}
