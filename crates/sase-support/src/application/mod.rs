//! Application layer
//!
//! Ticket persistence services built on the outbound ports.

pub mod commands;
pub mod status;

pub use commands::{SaveContext, SaveReport, TicketService};
pub use status::{NotUpdatedReason, StatusMachine, TransitionOutcome};
