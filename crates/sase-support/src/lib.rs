//! OpenSASE Customer Support Platform
//!
//! Ticket persistence engine: tickets are hydrated lazily from a generic
//! content record store plus a key/value meta store, track their own pending
//! changes, and flush only those changes on save.
//!
//! ## Architecture
//!
//! - **Domain Layer**: ticket aggregate, value objects, events, metadata
//!   merge and SLA timing
//! - **Application Layer**: `TicketService` (hydration, save protocol,
//!   replies and notes) and the `StatusMachine`
//! - **Ports Layer**: record, meta, customer and attachment store traits
//! - **Infrastructure Layer**: event bus and in-memory adapters
//!
//! ## Save protocol
//!
//! 1. New tickets get a backing record, a unique key and a customer
//! 2. Pending fields are flushed one by one
//! 3. The consolidated metadata document is merged and written if changed
//! 4. The ticket is re-hydrated from the stores

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod ports;

// Re-exports for convenience
pub use application::{NotUpdatedReason, SaveContext, SaveReport, StatusMachine, TicketService, TransitionOutcome};
pub use config::{SlaSettings, SupportConfig};
pub use domain::aggregates::{
    Customer, FormSubmission, NewCustomer, NewReply, PendingAttachment, PendingField, RequesterInfo, SlaBlock,
    Ticket,
};
pub use domain::events::TicketEvent;
pub use domain::services::{SlaCalculator, SlaTarget};
pub use domain::value_objects::{
    AgentId, AttachmentId, CustomerId, NoteId, RecordId, ReplyId, TicketId, TicketSource, TicketStatus, UserId,
};
pub use error::{Result, SupportError};
pub use infrastructure::{EventBus, EventLog};
pub use ports::inbound::TicketUseCases;
pub use ports::outbound::{
    AttachmentStore, CustomerDirectory, ListenerError, MetaStore, RecordStore, RepositoryError, StatusGuard,
    TicketListener,
};
