//! Customer entity
//!
//! Customers are owned by the customer directory. The ticket engine only
//! reads them and asks the directory to create, link and count.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

use crate::domain::value_objects::{CustomerId, TicketId, UserId};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
    pub email: String,
    /// Alternate emails tickets were logged with
    pub emails: BTreeSet<String>,
    pub user_id: Option<UserId>,
    pub ticket_count: u64,
    pub ticket_ids: Vec<TicketId>,
    pub created_at: DateTime<Utc>,
}

impl Customer {
    /// Split the display name into first and last name on the first space
    pub fn split_name(&self) -> (String, String) {
        match self.name.trim().split_once(' ') {
            Some((first, last)) => (first.to_string(), last.trim().to_string()),
            None => (self.name.trim().to_string(), String::new()),
        }
    }

    /// Primary or alternate email match, case-insensitive
    pub fn has_email(&self, email: &str) -> bool {
        let email = normalize_email(email);
        !email.is_empty() && (normalize_email(&self.email) == email || self.emails.contains(&email))
    }
}

/// Data for a customer record that does not exist yet
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NewCustomer {
    pub name: String,
    pub email: String,
    pub user_id: Option<UserId>,
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
