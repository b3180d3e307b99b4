//! Storage boundary for events, organizations, guests and users.
//!
//! Everything above this module talks to an [`EventStore`]. The production
//! backend is [`postgres::PgEventStore`]; [`memory::MemoryEventStore`] keeps
//! the same semantics in process and backs the tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Event, EventChanges, ExpiredEvent, Guest, NewEvent, Organization, User,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryEventStore;
pub use postgres::PgEventStore;

/// Failures produced by a store backend.
///
/// Backends translate their native errors into this enum exactly once, so
/// callers can match on it exhaustively.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("permission denied")]
    PermissionDenied,

    #[error("record not found")]
    NotFound,

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store call timed out")]
    Timeout,

    #[error("conflicting write: {0}")]
    Conflict(String),

    #[error("record already exists")]
    AlreadyExists,

    #[error("stored data is corrupt: {0}")]
    DataLoss(String),

    #[error("store resources exhausted")]
    ResourceExhausted,

    #[error("operation cancelled")]
    Cancelled,

    #[error("precondition failed: {0}")]
    FailedPrecondition(String),

    #[error("store error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Text safe to show to an end user.
    pub fn user_message(&self) -> &'static str {
        match self {
            StoreError::PermissionDenied => "You do not have permission to perform this operation",
            StoreError::NotFound => "The requested resource was not found",
            StoreError::Unavailable(_) => {
                "Service temporarily unavailable. Please try again in a few moments"
            }
            StoreError::Timeout => "The request timed out. Please check your connection",
            StoreError::Conflict(_) => {
                "The resource was modified by someone else. Please reload and try again"
            }
            StoreError::AlreadyExists => "This resource already exists",
            StoreError::DataLoss(_) => "Stored data is corrupted. Please try again",
            StoreError::ResourceExhausted => "Resource limit exceeded. Please try again later",
            StoreError::Cancelled => "The operation was cancelled",
            StoreError::FailedPrecondition(_) => "The operation is not allowed right now",
            StoreError::Internal(_) => "An error occurred. Please try again",
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::PoolTimedOut => StoreError::Timeout,
            sqlx::Error::PoolClosed => StoreError::Unavailable("connection pool closed".into()),
            sqlx::Error::Io(e) => StoreError::Unavailable(e.to_string()),
            sqlx::Error::Tls(e) => StoreError::Unavailable(e.to_string()),
            sqlx::Error::WorkerCrashed => StoreError::Unavailable("database worker crashed".into()),
            sqlx::Error::Database(db) => {
                if db.is_unique_violation() {
                    return StoreError::AlreadyExists;
                }
                if db.is_foreign_key_violation() || db.is_check_violation() {
                    return StoreError::FailedPrecondition(db.message().to_string());
                }
                match db.code().as_deref() {
                    // insufficient_privilege
                    Some("42501") => StoreError::PermissionDenied,
                    // serialization_failure, deadlock_detected
                    Some("40001") | Some("40P01") => StoreError::Conflict(db.message().to_string()),
                    // query_canceled
                    Some("57014") => StoreError::Cancelled,
                    // too_many_connections, out_of_memory, disk_full
                    Some("53300") | Some("53200") | Some("53100") => StoreError::ResourceExhausted,
                    _ => StoreError::Internal(db.message().to_string()),
                }
            }
            sqlx::Error::ColumnDecode { source, .. } | sqlx::Error::Decode(source) => {
                StoreError::DataLoss(source.to_string())
            }
            other => StoreError::Internal(other.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A single write staged in a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchWrite {
    /// Move an active event to `finished`. Fails the batch if the event is
    /// no longer active.
    FinishEvent { event_id: Uuid, at: DateTime<Utc> },

    /// Apply a signed delta to an organization's active-event counter,
    /// clamped at zero.
    AdjustActiveEvents { organization_id: Uuid, delta: i32 },
}

/// Writes that are committed together or not at all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    writes: Vec<BatchWrite>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finish_event(&mut self, event_id: Uuid, at: DateTime<Utc>) -> &mut Self {
        self.writes.push(BatchWrite::FinishEvent { event_id, at });
        self
    }

    pub fn adjust_active_events(&mut self, organization_id: Uuid, delta: i32) -> &mut Self {
        self.writes.push(BatchWrite::AdjustActiveEvents {
            organization_id,
            delta,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn writes(&self) -> &[BatchWrite] {
        &self.writes
    }
}

/// Outcome of a committed batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitReport {
    pub writes_applied: usize,
    /// Counter adjustments that targeted an organization that does not exist.
    /// They are skipped; the rest of the batch still applies.
    pub missing_organizations: Vec<Uuid>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Cheapest possible round trip, used for connectivity checks.
    async fn ping(&self) -> StoreResult<()>;

    async fn fetch_event(&self, id: Uuid) -> StoreResult<Option<Event>>;

    /// Insert an active event and bump its organization's counter by one in
    /// the same transaction.
    async fn insert_event(&self, event: NewEvent) -> StoreResult<Event>;

    /// Apply a partial update. `Ok(None)` when the event does not exist.
    async fn update_event(
        &self,
        id: Uuid,
        changes: EventChanges,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Event>>;

    /// Active events of an organization, newest first, optionally strictly
    /// older than `before`.
    async fn list_active_events(
        &self,
        organization_id: Uuid,
        before: Option<DateTime<Utc>>,
        limit: i64,
    ) -> StoreResult<Vec<Event>>;

    async fn event_created_at(&self, id: Uuid) -> StoreResult<Option<DateTime<Utc>>>;

    /// Active events whose date is strictly before `now`, oldest first.
    async fn find_expired_events(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<ExpiredEvent>>;

    /// Commit every write of the batch atomically.
    async fn commit(&self, batch: WriteBatch) -> StoreResult<CommitReport>;

    /// Server-side signed increment of the active-event counter, clamped at
    /// zero. `Ok(false)` when the organization does not exist.
    async fn adjust_active_events(&self, organization_id: Uuid, delta: i32) -> StoreResult<bool>;

    async fn fetch_organization(&self, id: Uuid) -> StoreResult<Option<Organization>>;

    /// Insert unless an organization with the same id exists. Returns whether
    /// a row was written.
    async fn insert_organization(&self, organization: Organization) -> StoreResult<bool>;

    async fn find_guest(&self, event_id: Uuid, email: &str) -> StoreResult<Option<Guest>>;

    /// Insert a guest and bump the event's guest count. A duplicate
    /// `(event_id, email)` is `AlreadyExists`.
    async fn insert_guest(&self, guest: Guest) -> StoreResult<()>;

    async fn list_guests(&self, event_id: Uuid) -> StoreResult<Vec<Guest>>;

    async fn fetch_user(&self, id: Uuid) -> StoreResult<Option<User>>;

    /// Insert a user together with the organization it owns, if any, in one
    /// transaction. A duplicate email or id is `AlreadyExists` and leaves no
    /// organization behind.
    async fn insert_user(
        &self,
        user: User,
        owned_organization: Option<Organization>,
    ) -> StoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_keeps_staging_order() {
        let event_id = Uuid::new_v4();
        let org_id = Uuid::new_v4();
        let now = Utc::now();

        let mut batch = WriteBatch::new();
        batch.finish_event(event_id, now).adjust_active_events(org_id, -1);

        assert_eq!(batch.len(), 2);
        assert_eq!(
            batch.writes(),
            &[
                BatchWrite::FinishEvent { event_id, at: now },
                BatchWrite::AdjustActiveEvents {
                    organization_id: org_id,
                    delta: -1
                },
            ]
        );
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        assert_eq!(StoreError::from(sqlx::Error::RowNotFound), StoreError::NotFound);
        assert_eq!(StoreError::from(sqlx::Error::PoolTimedOut), StoreError::Timeout);
    }
}
