//! In-memory collaborators for unit tests.

use crate::clients::{
    ClientError, Clients, CrmAnnotator, Delivery, Ledger, LeadSource, MessagingTransport,
    NotificationChannel, OutboundMessage,
};
use crate::model::{
    normalize_id, CampaignSummary, CampaignType, Lead, MessageRecord, NewMessage, Outcome,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

pub fn lead(id: &str, status: &str, source: &str) -> Lead {
    Lead::new(id)
        .with_name("Test", id)
        .with_phone("9876543210")
        .with_status(status)
        .with_source(source)
}

pub fn record(lead_id: &str, sequence: u32) -> MessageRecord {
    MessageRecord {
        timestamp: Utc::now(),
        lead_id: lead_id.to_string(),
        name: String::new(),
        phone: String::new(),
        status: String::new(),
        source: String::new(),
        template: "welcome".to_string(),
        sequence,
        outcome: Outcome::Success,
        campaign_type: CampaignType::Auto,
        notes: String::new(),
    }
}

/// One ledger row per entry in `lead_ids`.
pub fn history_for(lead_ids: &[&str]) -> Vec<MessageRecord> {
    lead_ids.iter().map(|id| record(id, 1)).collect()
}

#[derive(Default)]
pub struct MemoryCrm {
    pub leads: Mutex<Vec<Lead>>,
    pub notes: Mutex<Vec<(String, String, String)>>,
    pub fail_fetch: bool,
    pub fail_notes: bool,
}

impl MemoryCrm {
    pub fn with_leads(leads: Vec<Lead>) -> Self {
        Self {
            leads: Mutex::new(leads),
            ..Default::default()
        }
    }

    pub fn noted_leads(&self) -> Vec<String> {
        self.notes
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _, _)| id.clone())
            .collect()
    }
}

#[async_trait]
impl LeadSource for MemoryCrm {
    async fn fetch_all_leads(&self, _fields: Option<&[&str]>) -> Result<Vec<Lead>, ClientError> {
        if self.fail_fetch {
            return Err(ClientError::Http {
                status: 500,
                body: "CRM unavailable".to_string(),
            });
        }
        Ok(self.leads.lock().unwrap().clone())
    }

    async fn fetch_lead(&self, lead_id: &str) -> Result<Option<Lead>, ClientError> {
        if self.fail_fetch {
            return Err(ClientError::Http {
                status: 500,
                body: "CRM unavailable".to_string(),
            });
        }
        let lead_id = normalize_id(lead_id);
        Ok(self
            .leads
            .lock()
            .unwrap()
            .iter()
            .find(|lead| lead.id == lead_id)
            .cloned())
    }
}

#[async_trait]
impl CrmAnnotator for MemoryCrm {
    async fn add_note(&self, lead_id: &str, title: &str, body: &str) -> Result<(), ClientError> {
        if self.fail_notes {
            return Err(ClientError::Http {
                status: 401,
                body: "INVALID_TOKEN".to_string(),
            });
        }
        self.notes
            .lock()
            .unwrap()
            .push((lead_id.to_string(), title.to_string(), body.to_string()));
        Ok(())
    }
}

/// Accepts every message except those addressed to `rejected_phones`.
#[derive(Default)]
pub struct StubTransport {
    pub sent: Mutex<Vec<OutboundMessage>>,
    pub rejected_phones: HashSet<String>,
}

impl StubTransport {
    pub fn rejecting(phones: &[&str]) -> Self {
        Self {
            rejected_phones: phones.iter().map(|p| p.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl MessagingTransport for StubTransport {
    async fn send_template(&self, message: &OutboundMessage) -> Result<Delivery, ClientError> {
        self.sent.lock().unwrap().push(message.clone());
        if self.rejected_phones.contains(&message.phone) {
            return Err(ClientError::Http {
                status: 400,
                body: "invalid destination".to_string(),
            });
        }
        Ok(Delivery {
            phone: message.phone.clone(),
            name: message.name.clone(),
        })
    }
}

#[derive(Default)]
pub struct MemoryLedger {
    pub records: Mutex<Vec<MessageRecord>>,
    pub summaries: Mutex<Vec<CampaignSummary>>,
    pub fail_reads: bool,
    pub fail_writes: bool,
}

impl MemoryLedger {
    pub fn with_history(records: Vec<MessageRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            ..Default::default()
        }
    }

    pub fn rows_for(&self, lead_id: &str) -> Vec<MessageRecord> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.lead_id == lead_id)
            .cloned()
            .collect()
    }

    pub fn row_count(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn fetch_all_messages(&self) -> Result<Vec<MessageRecord>, ClientError> {
        if self.fail_reads {
            return Err(ClientError::LockPoisoned);
        }
        Ok(self.records.lock().unwrap().clone())
    }

    async fn append_message(&self, message: NewMessage) -> Result<u32, ClientError> {
        if self.fail_writes {
            return Err(ClientError::LockPoisoned);
        }
        let mut records = self.records.lock().unwrap();
        let sequence = records.iter().filter(|r| r.lead_id == message.lead_id).count() as u32 + 1;
        records.push(message.into_record(sequence, Utc::now()));
        Ok(sequence)
    }

    async fn count_for_lead(&self, lead_id: &str) -> Result<u32, ClientError> {
        if self.fail_reads {
            return Err(ClientError::LockPoisoned);
        }
        let lead_id = normalize_id(lead_id);
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.lead_id == lead_id)
            .count() as u32)
    }

    async fn append_summary(&self, summary: &CampaignSummary) -> Result<(), ClientError> {
        if self.fail_writes {
            return Err(ClientError::LockPoisoned);
        }
        self.summaries.lock().unwrap().push(summary.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, String)>>,
    pub fail: bool,
}

impl RecordingNotifier {
    pub fn subjects(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(s, _)| s.clone()).collect()
    }
}

#[async_trait]
impl NotificationChannel for RecordingNotifier {
    async fn send(&self, subject: &str, html_body: &str) -> Result<(), ClientError> {
        if self.fail {
            return Err(ClientError::Email("connection refused".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((subject.to_string(), html_body.to_string()));
        Ok(())
    }
}

/// Concrete doubles kept alongside the trait-object bundle so tests can
/// inspect what the engine did.
pub struct Harness {
    pub crm: Arc<MemoryCrm>,
    pub transport: Arc<StubTransport>,
    pub ledger: Arc<MemoryLedger>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub fn new(crm: MemoryCrm, transport: StubTransport, ledger: MemoryLedger) -> Self {
        Self {
            crm: Arc::new(crm),
            transport: Arc::new(transport),
            ledger: Arc::new(ledger),
            notifier: Arc::new(RecordingNotifier::default()),
        }
    }

    pub fn with_leads(leads: Vec<Lead>) -> Self {
        Self::new(
            MemoryCrm::with_leads(leads),
            StubTransport::default(),
            MemoryLedger::default(),
        )
    }

    pub fn clients(&self) -> Clients {
        Clients {
            leads: self.crm.clone(),
            crm: self.crm.clone(),
            transport: self.transport.clone(),
            ledger: self.ledger.clone(),
            notifier: self.notifier.clone(),
        }
    }
}
