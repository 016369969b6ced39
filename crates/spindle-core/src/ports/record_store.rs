//! RecordStore port - 永続化ゲートウェイ（source of truth）
//!
//! 3 つのコンポーネント（queue builder, publish pipeline, relationship tracker）は
//! このゲートウェイだけを介して通信します。プロセス内の共有可変状態はありません。
//!
//! # 実装
//! - `impls::SqliteRecordStore`: 本番用
//! - `impls::InMemoryRecordStore`: 開発・テスト用

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{Record, StoreError, Table};

/// RecordStore は名前付きレコード集合への汎用 CRUD を提供
///
/// # 設計原則
/// - 各メソッドは 1 つの論理操作 = 1 トランザクション
/// - key 列・順序列は `Table` から決まる（呼び出し側が列名を渡すことはない）
/// - 「newest」は順序列の降順、同値なら挿入順の新しい方
/// - ビジネスロジックは持たない
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert one record into the table its variant belongs to.
    ///
    /// For a table with `Table::unique_key`, a record whose key is already
    /// present is dropped and the stored one is kept.
    async fn append(&self, record: Record) -> Result<(), StoreError>;

    /// Insert records in order, as a single operation.
    async fn append_all(&self, records: Vec<Record>) -> Result<(), StoreError>;

    /// Every record of `table`, oldest first.
    async fn scan_all(&self, table: Table) -> Result<Vec<Record>, StoreError>;

    async fn count(&self, table: Table) -> Result<usize, StoreError>;

    /// Whether any record of `table` has `key` in its key column.
    async fn exists(&self, table: Table, key: &str) -> Result<bool, StoreError>;

    /// Delete every record of `table` whose key column equals `key`.
    /// Returns how many rows went away.
    async fn delete(&self, table: Table, key: &str) -> Result<usize, StoreError>;

    /// Delete the single oldest record of `table`. Returns false on an empty table.
    async fn delete_oldest(&self, table: Table) -> Result<bool, StoreError>;

    async fn newest(&self, table: Table) -> Result<Option<Record>, StoreError>;

    async fn newest_timestamp(&self, table: Table) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self.newest(table).await?.map(|r| r.timestamp()))
    }
}
