//! Inbound ports (use case traits)

use async_trait::async_trait;

use crate::application::commands::{SaveContext, SaveReport};
use crate::application::status::TransitionOutcome;
use crate::domain::aggregates::{NewReply, Ticket};
use crate::domain::value_objects::{NoteId, ReplyId, TicketId, TicketStatus, UserId};
use crate::error::Result;

/// Ticket persistence use cases
#[async_trait]
pub trait TicketUseCases: Send + Sync {
    /// Load a ticket and everything attached to it
    async fn hydrate(&self, id: TicketId) -> Result<Ticket>;

    /// Persist the ticket's pending fields, creating it if new
    async fn save(&self, ticket: &mut Ticket, ctx: &SaveContext) -> Result<SaveReport>;

    async fn update_status(&self, ticket: &mut Ticket, status: TicketStatus) -> Result<TransitionOutcome>;

    async fn add_reply(&self, ticket: &Ticket, reply: NewReply) -> Result<ReplyId>;

    async fn add_note(&self, ticket: &Ticket, text: &str, author: Option<UserId>) -> Result<NoteId>;

    async fn delete_note(&self, ticket: &Ticket, note: NoteId) -> Result<()>;
}
