//! Outbound ports
//!
//! Interfaces infrastructure must implement: the generic content record
//! backend, the key/value meta store, the customer directory and the
//! attachment store. Listener and guard traits plug into the event bus and
//! the status machine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use crate::domain::aggregates::{Customer, NewCustomer, PendingAttachment};
use crate::domain::events::TicketEvent;
use crate::domain::value_objects::{AttachmentId, CustomerId, RecordId, TicketId, TicketStatus, UserId};

// =============================================================================
// Errors
// =============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("entity not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    StorageError(String),
}

pub type RepoResult<T> = std::result::Result<T, RepositoryError>;

// =============================================================================
// Records
// =============================================================================

/// Kind of a content record
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Ticket,
    Reply,
    Note,
    Other(String),
}

impl RecordKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Ticket => "ticket",
            Self::Reply => "ticket_reply",
            Self::Note => "ticket_note",
            Self::Other(kind) => kind,
        }
    }
}

/// Stored content record
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub id: RecordId,
    pub kind: RecordKind,
    pub status: String,
    pub title: String,
    pub content: String,
    pub parent: Option<RecordId>,
    pub author: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewRecord {
    pub kind: RecordKind,
    pub status: String,
    pub title: String,
    pub content: String,
    pub parent: Option<RecordId>,
    pub author: Option<UserId>,
    /// Creation time; the store uses the current time when absent
    pub created_at: Option<DateTime<Utc>>,
}

impl NewRecord {
    pub fn new(kind: RecordKind, status: impl Into<String>) -> Self {
        Self {
            kind,
            status: status.into(),
            title: String::new(),
            content: String::new(),
            parent: None,
            author: None,
            created_at: None,
        }
    }
}

/// Partial record update. `None` leaves the column untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecordUpdate {
    pub status: Option<String>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
}

impl RecordUpdate {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.title.is_none()
            && self.content.is_none()
            && self.created_at.is_none()
            && self.modified_at.is_none()
    }
}

/// Content record backend
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn create(&self, record: NewRecord) -> RepoResult<RecordId>;

    async fn update(&self, id: RecordId, update: RecordUpdate) -> RepoResult<()>;

    async fn get(&self, id: RecordId) -> RepoResult<Option<Record>>;

    /// Child records of `parent` of one kind, oldest first
    async fn children(&self, parent: RecordId, kind: RecordKind) -> RepoResult<Vec<Record>>;

    async fn delete(&self, id: RecordId) -> RepoResult<()>;
}

/// Key/value metadata attached to records
#[async_trait]
pub trait MetaStore: Send + Sync {
    async fn get(&self, entity: RecordId, key: &str) -> RepoResult<Option<Value>>;

    /// Write a value. When `prev` is given the write only happens if the
    /// stored value equals it. Returns whether a write happened.
    async fn set(&self, entity: RecordId, key: &str, value: Value, prev: Option<&Value>) -> RepoResult<bool>;
}

// =============================================================================
// Customers & attachments
// =============================================================================

/// Customer directory port
#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    async fn find_by_id(&self, id: CustomerId) -> RepoResult<Option<Customer>>;

    /// Case-insensitive match against primary and alternate emails
    async fn find_by_email(&self, email: &str) -> RepoResult<Option<Customer>>;

    async fn find_by_user_id(&self, user_id: UserId) -> RepoResult<Option<Customer>>;

    async fn create(&self, customer: NewCustomer) -> RepoResult<Customer>;

    /// Atomic lookup by email, creating the customer when none matches
    async fn find_or_create(&self, customer: NewCustomer) -> RepoResult<Customer>;

    async fn add_alternate_email(&self, id: CustomerId, email: &str) -> RepoResult<()>;

    async fn attach_ticket(&self, id: CustomerId, ticket: TicketId) -> RepoResult<()>;

    async fn increment_ticket_count(&self, id: CustomerId) -> RepoResult<u64>;
}

/// Resolves staged uploads into stored attachments
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    async fn attach(&self, ticket: TicketId, file: &PendingAttachment) -> RepoResult<AttachmentId>;
}

// =============================================================================
// Listeners & guards
// =============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("listener failed: {0}")]
pub struct ListenerError(pub String);

/// Subscriber on the ticket event bus
#[async_trait]
pub trait TicketListener: Send + Sync {
    async fn on_event(&self, event: &TicketEvent) -> Result<(), ListenerError>;
}

/// Veto hook consulted before every status transition
pub trait StatusGuard: Send + Sync {
    /// Return false to block the transition
    fn allow(&self, ticket: TicketId, to: &TicketStatus, from: Option<&TicketStatus>) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_update_is_empty() {
        assert!(RecordUpdate::default().is_empty());
        let update = RecordUpdate { title: Some("x".into()), ..Default::default() };
        assert!(!update.is_empty());
    }

    #[test]
    fn test_repository_error_display() {
        assert_eq!(RepositoryError::NotFound("record 4".into()).to_string(), "entity not found: record 4");
        assert_eq!(RecordKind::Note.as_str(), "ticket_note");
    }
}
