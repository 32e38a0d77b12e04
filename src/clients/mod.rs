//! Collaborators the campaign engine talks to.
//!
//! Each external system sits behind a narrow trait so the engine can be driven
//! by the real HTTP/SQLite/SMTP clients in production and by in-memory doubles
//! in tests. Every operation returns `Result<_, ClientError>`; callers decide
//! whether an error degrades the result or aborts the operation.

pub mod crm;
pub mod email;
pub mod ledger;
pub mod messaging;

use crate::config::Config;
use crate::model::{CampaignSummary, Lead, MessageRecord, NewMessage};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

pub use crm::CrmClient;
pub use email::{EmailNotifier, LogNotifier};
pub use ledger::SqliteLedger;
pub use messaging::MessagingClient;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("Storage lock poisoned")]
    LockPoisoned,
    #[error("Email error: {0}")]
    Email(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Read access to CRM leads.
#[async_trait]
pub trait LeadSource: Send + Sync {
    /// All leads, in CRM order. `None` requests the default field list.
    async fn fetch_all_leads(&self, fields: Option<&[&str]>) -> Result<Vec<Lead>, ClientError>;

    /// `Ok(None)` when the CRM has no such lead.
    async fn fetch_lead(&self, lead_id: &str) -> Result<Option<Lead>, ClientError>;
}

/// Write-back of campaign activity onto CRM records.
#[async_trait]
pub trait CrmAnnotator: Send + Sync {
    async fn add_note(&self, lead_id: &str, title: &str, body: &str) -> Result<(), ClientError>;
}

/// A templated message ready for the messaging provider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutboundMessage {
    pub phone: String,
    pub name: String,
    pub template: String,
    pub template_params: Vec<String>,
    pub tags: Vec<String>,
    pub attributes: HashMap<String, String>,
}

/// Confirmation of an accepted send. `phone` is the normalised destination.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub phone: String,
    pub name: String,
}

#[async_trait]
pub trait MessagingTransport: Send + Sync {
    async fn send_template(&self, message: &OutboundMessage) -> Result<Delivery, ClientError>;
}

/// Append-only message history.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn fetch_all_messages(&self) -> Result<Vec<MessageRecord>, ClientError>;

    /// Append a row and return the sequence number it was assigned
    /// (existing rows for the lead + 1).
    async fn append_message(&self, message: NewMessage) -> Result<u32, ClientError>;

    async fn count_for_lead(&self, lead_id: &str) -> Result<u32, ClientError>;

    async fn append_summary(&self, summary: &CampaignSummary) -> Result<(), ClientError>;
}

/// Operator-facing notifications (HTML email in production).
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(&self, subject: &str, html_body: &str) -> Result<(), ClientError>;
}

/// Client handles shared by the engine, owned by the entry point.
#[derive(Clone)]
pub struct Clients {
    pub leads: Arc<dyn LeadSource>,
    pub crm: Arc<dyn CrmAnnotator>,
    pub transport: Arc<dyn MessagingTransport>,
    pub ledger: Arc<dyn Ledger>,
    pub notifier: Arc<dyn NotificationChannel>,
}

impl Clients {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let crm = Arc::new(CrmClient::new(&config.crm));
        let transport = Arc::new(MessagingClient::new(&config.messaging));
        let ledger = Arc::new(SqliteLedger::open(&config.ledger.database_path)?);

        let notifier: Arc<dyn NotificationChannel> = match &config.notifications.recipient {
            Some(_) => Arc::new(EmailNotifier::new(&config.notifications)?),
            None => {
                log::warn!("No report recipient configured, notifications will only be logged");
                Arc::new(LogNotifier)
            }
        };

        Ok(Self {
            leads: crm.clone(),
            crm,
            transport,
            ledger,
            notifier,
        })
    }
}
