//! Ticket status state machine
//!
//! ```text
//! new -> open -> hold <-> open
//!        open/hold -> closed
//! ```
//!
//! Any status string can be stored. Only `open`, `hold` and `closed` carry
//! side effects, and each of those fires only when the ticket was not already
//! in that state.

use chrono::Utc;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::SupportConfig;
use crate::domain::aggregates::Ticket;
use crate::domain::events::TicketEvent;
use crate::domain::value_objects::{TicketId, TicketStatus};
use crate::error::{Result, SupportError};
use crate::infrastructure::events::EventBus;
use crate::ports::outbound::{RecordStore, RecordUpdate, StatusGuard};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransitionOutcome {
    Updated,
    NotUpdated(NotUpdatedReason),
}

impl TransitionOutcome {
    pub fn is_updated(&self) -> bool {
        matches!(self, Self::Updated)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotUpdatedReason {
    /// Already in the requested status
    Unchanged,
    /// Blocked by a status guard
    Vetoed,
}

pub struct StatusMachine {
    records: Arc<dyn RecordStore>,
    events: Arc<EventBus>,
    guards: RwLock<Vec<Arc<dyn StatusGuard>>>,
    config: Arc<SupportConfig>,
}

impl StatusMachine {
    pub fn new(records: Arc<dyn RecordStore>, events: Arc<EventBus>, config: Arc<SupportConfig>) -> Self {
        Self {
            records,
            events,
            guards: RwLock::new(Vec::new()),
            config,
        }
    }

    pub fn add_guard(&self, guard: Arc<dyn StatusGuard>) {
        self.guards.write().push(guard);
    }

    /// Move a persisted ticket to `to`.
    ///
    /// Compares against the status last persisted, not the in-memory one, so
    /// a staged status still transitions on save.
    pub async fn transition(&self, ticket: &mut Ticket, to: TicketStatus) -> Result<TransitionOutcome> {
        let id = ticket
            .id
            .ok_or_else(|| SupportError::Validation("ticket has no record to transition".into()))?;
        let from = ticket.persisted_status.clone();

        if from.as_ref() == Some(&to) {
            return Ok(TransitionOutcome::NotUpdated(NotUpdatedReason::Unchanged));
        }

        if !self.allowed(id, &to, from.as_ref()) {
            info!(ticket_id = %id, to = %to, "Status change vetoed");
            return Ok(TransitionOutcome::NotUpdated(NotUpdatedReason::Vetoed));
        }

        self.events
            .publish(TicketEvent::StatusChanging { ticket_id: id, from: from.clone(), to: to.clone() })
            .await;

        let now = Utc::now();
        let update = RecordUpdate {
            status: Some(to.as_str().to_string()),
            modified_at: Some(now),
            ..Default::default()
        };
        self.records.update(id, update).await.map_err(|e| {
            warn!(ticket_id = %id, to = %to, error = %e, "Status write failed");
            SupportError::Persistence(e.to_string())
        })?;

        ticket.status = to.clone();
        ticket.status_label = self.config.status_label(&to);
        ticket.persisted_status = Some(to.clone());
        ticket.modified_date = Some(now);
        ticket.resolved_date = to.is_closed().then_some(now);

        self.run_handler(id, &to, from.as_ref()).await;

        self.events
            .publish(TicketEvent::StatusChanged { ticket_id: id, from: from.clone(), to: to.clone() })
            .await;

        info!(
            ticket_id = %id,
            from = from.as_ref().map(TicketStatus::as_str).unwrap_or("unset"),
            to = %to,
            "Ticket status updated"
        );
        Ok(TransitionOutcome::Updated)
    }

    fn allowed(&self, id: TicketId, to: &TicketStatus, from: Option<&TicketStatus>) -> bool {
        let guards: Vec<_> = self.guards.read().clone();
        guards.iter().all(|guard| guard.allow(id, to, from))
    }

    async fn run_handler(&self, id: TicketId, to: &TicketStatus, from: Option<&TicketStatus>) {
        if from == Some(to) {
            return;
        }
        let event = match to {
            TicketStatus::Open => TicketEvent::Opened { ticket_id: id },
            TicketStatus::Hold => TicketEvent::PutOnHold { ticket_id: id },
            TicketStatus::Closed => TicketEvent::Closed { ticket_id: id },
            _ => return,
        };
        self.events.publish(event).await;
    }
}
