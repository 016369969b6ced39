//! Logical table roles and their concrete identifiers.
//!
//! Table names are resolved once (from config) and validated at construction;
//! nothing downstream ever builds an identifier from request-time input.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The three record sets the agent persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    /// Pending publishes (`QueueEntry`).
    Queue,
    /// Recently published assets (`RecentEntry`).
    Recent,
    /// Follow requests already sent (`RelationshipRequest`).
    RelationshipRequests,
}

impl Table {
    pub const ALL: [Table; 3] = [Table::Queue, Table::Recent, Table::RelationshipRequests];

    /// Column holding the record's identity (used by `exists` / `delete`).
    pub fn key_column(self) -> &'static str {
        match self {
            Table::Queue | Table::Recent => "filepath",
            Table::RelationshipRequests => "id",
        }
    }

    /// At most one record per key. Appending a key that is already present is a no-op.
    pub fn unique_key(self) -> bool {
        matches!(self, Table::RelationshipRequests)
    }

    /// Column records are ordered by (used by `newest` / `delete_oldest`).
    pub fn order_column(self) -> &'static str {
        "timestamp"
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Table::Queue => "queue",
            Table::Recent => "recent",
            Table::RelationshipRequests => "relationship_requests",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableNameError {
    #[error("table name for {role} is not a valid identifier: {name:?}")]
    InvalidIdentifier { role: Table, name: String },

    #[error("{first} and {second} share the table name {name:?}")]
    Collision {
        first: Table,
        second: Table,
        name: String,
    },
}

/// Concrete table identifiers, one per role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    queue: String,
    recent: String,
    relationship_requests: String,
}

impl TableNames {
    pub fn new(
        queue: impl Into<String>,
        recent: impl Into<String>,
        relationship_requests: impl Into<String>,
    ) -> Result<Self, TableNameError> {
        let names = Self {
            queue: queue.into(),
            recent: recent.into(),
            relationship_requests: relationship_requests.into(),
        };

        for role in Table::ALL {
            let name = names.resolve(role);
            if !is_identifier(name) {
                return Err(TableNameError::InvalidIdentifier {
                    role,
                    name: name.to_string(),
                });
            }
        }

        for (i, first) in Table::ALL.iter().enumerate() {
            for second in &Table::ALL[i + 1..] {
                if names.resolve(*first).eq_ignore_ascii_case(names.resolve(*second)) {
                    return Err(TableNameError::Collision {
                        first: *first,
                        second: *second,
                        name: names.resolve(*first).to_string(),
                    });
                }
            }
        }

        Ok(names)
    }

    pub fn resolve(&self, table: Table) -> &str {
        match table {
            Table::Queue => &self.queue,
            Table::Recent => &self.recent,
            Table::RelationshipRequests => &self.relationship_requests,
        }
    }
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            queue: "queue".to_string(),
            recent: "recent_queue".to_string(),
            relationship_requests: "request_sent".to_string(),
        }
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn default_names_are_valid() {
        let names = TableNames::default();
        assert!(TableNames::new(
            names.resolve(Table::Queue),
            names.resolve(Table::Recent),
            names.resolve(Table::RelationshipRequests),
        )
        .is_ok());
    }

    #[rstest]
    #[case::empty("")]
    #[case::leading_digit("1queue")]
    #[case::injection("queue; DROP TABLE recent")]
    #[case::quoted("\"queue\"")]
    #[case::dash("bot-queue")]
    fn rejects_non_identifiers(#[case] name: &str) {
        let err = TableNames::new(name, "recent", "requests").unwrap_err();
        assert!(matches!(
            err,
            TableNameError::InvalidIdentifier { role: Table::Queue, .. }
        ));
    }

    #[test]
    fn rejects_collisions() {
        let err = TableNames::new("bot_queue", "BOT_QUEUE", "requests").unwrap_err();
        assert!(matches!(
            err,
            TableNameError::Collision {
                first: Table::Queue,
                second: Table::Recent,
                ..
            }
        ));
    }

    #[test]
    fn resolves_each_role() {
        let names = TableNames::new("q", "r", "s").unwrap();
        assert_eq!(names.resolve(Table::Queue), "q");
        assert_eq!(names.resolve(Table::Recent), "r");
        assert_eq!(names.resolve(Table::RelationshipRequests), "s");
    }
}
