//! Domain model (IDs, records, table roles, outcomes, errors).

pub mod errors;
pub mod ids;
pub mod outcome;
pub mod record;
pub mod table;

pub use self::errors::{FetchError, PlatformError, StoreError};
pub use self::ids::{AssetKey, PeerId, RunId};
pub use self::outcome::{Outcome, OutcomeKind};
pub use self::record::{QueueEntry, RecentEntry, Record, RecordMismatch, RelationshipRequest};
pub use self::table::{Table, TableNameError, TableNames};
