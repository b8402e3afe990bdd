//! Support domain events
//!
//! Published on the event bus around creation, saves and every status
//! transition. Each event is delivered once per operation.

use crate::domain::aggregates::PendingField;
use crate::domain::value_objects::{CustomerId, NoteId, ReplyId, TicketId, TicketStatus};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TicketEvent {
    /// A new ticket is about to get its backing record
    Creating { email: String },
    Created { ticket_id: TicketId, customer_id: CustomerId },
    Hydrated { ticket_id: TicketId },
    Saved { ticket_id: TicketId, fields: Vec<PendingField> },

    StatusChanging { ticket_id: TicketId, from: Option<TicketStatus>, to: TicketStatus },
    StatusChanged { ticket_id: TicketId, from: Option<TicketStatus>, to: TicketStatus },
    Opened { ticket_id: TicketId },
    PutOnHold { ticket_id: TicketId },
    Closed { ticket_id: TicketId },

    ReplyAdded { ticket_id: TicketId, reply_id: ReplyId, resolves: bool },
    NoteAdded { ticket_id: TicketId, note_id: NoteId },
    NoteDeleted { ticket_id: TicketId, note_id: NoteId },
}

impl TicketEvent {
    /// Ticket this event belongs to, if it has one yet
    pub fn ticket_id(&self) -> Option<TicketId> {
        match self {
            Self::Creating { .. } => None,
            Self::Created { ticket_id, .. }
            | Self::Hydrated { ticket_id }
            | Self::Saved { ticket_id, .. }
            | Self::StatusChanging { ticket_id, .. }
            | Self::StatusChanged { ticket_id, .. }
            | Self::Opened { ticket_id }
            | Self::PutOnHold { ticket_id }
            | Self::Closed { ticket_id }
            | Self::ReplyAdded { ticket_id, .. }
            | Self::NoteAdded { ticket_id, .. }
            | Self::NoteDeleted { ticket_id, .. } => Some(*ticket_id),
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Creating { .. } => "ticket.creating",
            Self::Created { .. } => "ticket.created",
            Self::Hydrated { .. } => "ticket.hydrated",
            Self::Saved { .. } => "ticket.saved",
            Self::StatusChanging { .. } => "ticket.status_changing",
            Self::StatusChanged { .. } => "ticket.status_changed",
            Self::Opened { .. } => "ticket.opened",
            Self::PutOnHold { .. } => "ticket.put_on_hold",
            Self::Closed { .. } => "ticket.closed",
            Self::ReplyAdded { .. } => "ticket.reply_added",
            Self::NoteAdded { .. } => "ticket.note_added",
            Self::NoteDeleted { .. } => "ticket.note_deleted",
        }
    }
}
