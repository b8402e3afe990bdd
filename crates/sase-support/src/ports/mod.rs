//! Ports module (Hexagonal Architecture)
//!
//! Storage, customer and event interfaces the support engine depends on.

pub mod inbound;
pub mod outbound;

pub use inbound::*;
pub use outbound::*;
