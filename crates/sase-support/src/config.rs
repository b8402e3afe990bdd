//! Support engine configuration

use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::warn;

use crate::domain::value_objects::{TicketSource, TicketStatus};
use crate::error::{Result, SupportError};

/// Overrides `key_secret` when set
pub const KEY_SECRET_ENV: &str = "SUPPORT_KEY_SECRET";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupportConfig {
    /// Singular label for tickets, used in default titles
    pub ticket_label: String,
    /// Display names keyed by raw status
    pub status_labels: BTreeMap<String, String>,
    /// Intake source names keyed by source number
    pub source_labels: BTreeMap<String, String>,
    pub default_source: u32,
    /// Mixed into generated ticket keys
    pub key_secret: String,
    /// Requester IP used when the request carries none
    pub default_ip: String,
    /// strftime format for SLA deadlines
    pub date_format: String,
    pub sla: SlaSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlaSettings {
    /// Assign default targets to new tickets that have none
    pub enabled: bool,
    pub respond_hours: u32,
    pub resolve_hours: u32,
}

impl Default for SlaSettings {
    fn default() -> Self {
        Self { enabled: true, respond_hours: 4, resolve_hours: 48 }
    }
}

impl Default for SupportConfig {
    fn default() -> Self {
        let status_labels = [("new", "New"), ("open", "Open"), ("hold", "On Hold"), ("closed", "Closed")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let source_labels = [("1", "Website"), ("2", "Email"), ("3", "Telephone"), ("99", "Other")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        Self {
            ticket_label: "Ticket".into(),
            status_labels,
            source_labels,
            default_source: TicketSource::WEBSITE.value(),
            key_secret: String::new(),
            default_ip: "127.0.0.1".into(),
            date_format: "%-I:%M %P %B %-d, %Y".into(),
            sla: SlaSettings::default(),
        }
    }
}

impl SupportConfig {
    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| SupportError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Load from a TOML file, falling back to defaults
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path.as_ref()) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "Support config not loaded, using defaults");
                Self::default().with_env_overrides()
            }
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| SupportError::Config(e.to_string()))?;
        let config = config.with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(secret) = std::env::var(KEY_SECRET_ENV) {
            if !secret.is_empty() {
                self.key_secret = secret;
            }
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.ticket_label.trim().is_empty() {
            return Err(SupportError::Config("ticket_label cannot be empty".into()));
        }
        if StrftimeItems::new(&self.date_format).any(|item| matches!(item, Item::Error)) {
            return Err(SupportError::Config(format!("invalid date_format: {}", self.date_format)));
        }
        Ok(())
    }

    /// Display name for a status; unknown statuses are capitalized
    pub fn status_label(&self, status: &TicketStatus) -> String {
        self.status_labels
            .get(status.as_str())
            .cloned()
            .unwrap_or_else(|| capitalize(status.as_str()))
    }

    pub fn source_label(&self, source: TicketSource) -> Option<&str> {
        self.source_labels.get(&source.value().to_string()).map(String::as_str)
    }

    pub fn default_source(&self) -> TicketSource {
        TicketSource::new(self.default_source)
    }

    /// Title given to tickets saved without one
    pub fn new_ticket_title(&self) -> String {
        format!("New {}", self.ticket_label)
    }
}

fn capitalize(raw: &str) -> String {
    let mut chars = raw.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
