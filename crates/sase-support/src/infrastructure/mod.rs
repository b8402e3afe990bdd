//! Infrastructure layer
//!
//! Event bus and in-memory adapters for the outbound ports.

pub mod events;
pub mod persistence;

pub use events::{EventBus, EventLog};
pub use persistence::{
    InMemoryAttachmentStore, InMemoryCustomerDirectory, InMemoryMetaStore, InMemoryRecordStore,
};
