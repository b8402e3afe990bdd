//! Aggregates
pub mod customer;
pub mod reply;
pub mod ticket;

pub use customer::{Customer, NewCustomer};
pub use reply::NewReply;
pub use ticket::{
    FormSubmission, PendingAttachment, PendingChanges, PendingField, RequesterInfo, SlaBlock, Ticket,
};
