//! Persisted records: queue entries, recency window, relationship requests.
//!
//! Design:
//! - Every record belongs to exactly one `Table` role.
//! - The persistence gateway owns all records; components re-read them on every invocation.
//! - `Record` is the one shape the gateway stores; typed records convert in and out of it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ids::{AssetKey, PeerId};
use super::table::Table;

/// One pending publish action.
///
/// The pipeline consumes the *newest* entry first, so the queue builder inserts
/// the intended publish order in reverse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub key: AssetKey,
    pub comment: Option<String>,
    pub enqueued_at: DateTime<Utc>,
}

impl QueueEntry {
    pub fn new(key: AssetKey, enqueued_at: DateTime<Utc>) -> Self {
        Self {
            key,
            comment: None,
            enqueued_at,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Post text: the comment, or an empty caption.
    pub fn caption(&self) -> &str {
        self.comment.as_deref().unwrap_or("")
    }
}

/// An asset published within the retained history window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentEntry {
    pub key: AssetKey,
    pub published_at: DateTime<Utc>,
}

impl RecentEntry {
    pub fn new(key: AssetKey, published_at: DateTime<Utc>) -> Self {
        Self { key, published_at }
    }
}

/// Durable marker that a follow action toward `peer_id` was attempted.
///
/// At most one live record per peer; its presence is the only dedup signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipRequest {
    pub peer_id: PeerId,
    pub peer_handle: String,
    pub sent_at: DateTime<Utc>,
}

impl RelationshipRequest {
    pub fn new(peer_id: PeerId, peer_handle: impl Into<String>, sent_at: DateTime<Utc>) -> Self {
        Self {
            peer_id,
            peer_handle: peer_handle.into(),
            sent_at,
        }
    }
}

/// A row of any table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "table", rename_all = "snake_case")]
pub enum Record {
    Queue(QueueEntry),
    Recent(RecentEntry),
    RelationshipRequest(RelationshipRequest),
}

impl Record {
    pub fn table(&self) -> Table {
        match self {
            Record::Queue(_) => Table::Queue,
            Record::Recent(_) => Table::Recent,
            Record::RelationshipRequest(_) => Table::RelationshipRequests,
        }
    }

    /// Value of the table's key column.
    pub fn key(&self) -> &str {
        match self {
            Record::Queue(e) => e.key.as_str(),
            Record::Recent(e) => e.key.as_str(),
            Record::RelationshipRequest(r) => r.peer_id.as_str(),
        }
    }

    /// Value of the table's ordering column.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Record::Queue(e) => e.enqueued_at,
            Record::Recent(e) => e.published_at,
            Record::RelationshipRequest(r) => r.sent_at,
        }
    }
}

impl From<QueueEntry> for Record {
    fn from(entry: QueueEntry) -> Self {
        Record::Queue(entry)
    }
}

impl From<RecentEntry> for Record {
    fn from(entry: RecentEntry) -> Self {
        Record::Recent(entry)
    }
}

impl From<RelationshipRequest> for Record {
    fn from(request: RelationshipRequest) -> Self {
        Record::RelationshipRequest(request)
    }
}

/// A record came back from a table it does not belong to.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("expected a {expected} record, found a {found} record")]
pub struct RecordMismatch {
    pub expected: Table,
    pub found: Table,
}

impl TryFrom<Record> for QueueEntry {
    type Error = RecordMismatch;

    fn try_from(record: Record) -> Result<Self, Self::Error> {
        match record {
            Record::Queue(e) => Ok(e),
            other => Err(RecordMismatch {
                expected: Table::Queue,
                found: other.table(),
            }),
        }
    }
}

impl TryFrom<Record> for RecentEntry {
    type Error = RecordMismatch;

    fn try_from(record: Record) -> Result<Self, Self::Error> {
        match record {
            Record::Recent(e) => Ok(e),
            other => Err(RecordMismatch {
                expected: Table::Recent,
                found: other.table(),
            }),
        }
    }
}

impl TryFrom<Record> for RelationshipRequest {
    type Error = RecordMismatch;

    fn try_from(record: Record) -> Result<Self, Self::Error> {
        match record {
            Record::RelationshipRequest(r) => Ok(r),
            other => Err(RecordMismatch {
                expected: Table::RelationshipRequests,
                found: other.table(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn record_exposes_key_and_ordering_field() {
        let q: Record = QueueEntry::new(AssetKey::new("a.png"), at(10)).into();
        assert_eq!(q.table(), Table::Queue);
        assert_eq!(q.key(), "a.png");
        assert_eq!(q.timestamp(), at(10));

        let r: Record = RelationshipRequest::new(PeerId::new("42"), "alice", at(20)).into();
        assert_eq!(r.table(), Table::RelationshipRequests);
        assert_eq!(r.key(), "42");
        assert_eq!(r.timestamp(), at(20));
    }

    #[test]
    fn typed_conversion_rejects_other_tables() {
        let r: Record = RecentEntry::new(AssetKey::new("a.png"), at(1)).into();
        let err = QueueEntry::try_from(r.clone()).unwrap_err();
        assert_eq!(err.expected, Table::Queue);
        assert_eq!(err.found, Table::Recent);

        let back = RecentEntry::try_from(r).unwrap();
        assert_eq!(back.key.as_str(), "a.png");
    }

    #[test]
    fn caption_defaults_to_empty() {
        let entry = QueueEntry::new(AssetKey::new("a.png"), at(0));
        assert_eq!(entry.caption(), "");
        assert_eq!(entry.with_comment("hi").caption(), "hi");
    }
}
