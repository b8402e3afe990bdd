//! Ticket event bus

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::events::TicketEvent;
use crate::ports::outbound::{ListenerError, TicketListener};

/// Fan-out of ticket events to registered listeners.
///
/// Listeners run in registration order. A failing listener is logged and
/// skipped; it never fails the operation that published the event.
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<Vec<Arc<dyn TicketListener>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Arc<dyn TicketListener>) {
        self.listeners.write().push(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    pub async fn publish(&self, event: TicketEvent) {
        // Snapshot so no lock is held across an await
        let listeners: Vec<_> = self.listeners.read().clone();
        debug!(event = event.event_type(), listeners = listeners.len(), "Publishing ticket event");

        for listener in listeners {
            if let Err(e) = listener.on_event(&event).await {
                warn!(
                    event = event.event_type(),
                    ticket_id = ?event.ticket_id(),
                    error = %e,
                    "Ticket listener failed"
                );
            }
        }
    }
}

/// Listener that records every event it sees
#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<TicketEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TicketEvent> {
        self.events.lock().clone()
    }

    /// Number of recorded events of one type, e.g. `"ticket.opened"`
    pub fn count(&self, event_type: &str) -> usize {
        self.events.lock().iter().filter(|e| e.event_type() == event_type).count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

#[async_trait]
impl TicketListener for EventLog {
    async fn on_event(&self, event: &TicketEvent) -> Result<(), ListenerError> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}
