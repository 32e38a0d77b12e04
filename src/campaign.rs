use crate::clients::{
    ClientError, Clients, CrmAnnotator, Ledger, MessagingTransport, OutboundMessage,
};
use crate::model::{CampaignSummary, CampaignType, Lead, NewMessage};
use chrono::Local;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum CampaignError {
    #[error("No template configured for {0}")]
    MissingTemplate(String),
    #[error("Unable to read leads: {0}")]
    LeadSource(#[source] ClientError),
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
}

/// What started a campaign run. Decides the ledger campaign type, the
/// first outbound tag and the CRM note title.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Poll,
    Webhook,
    Approval,
}

impl Trigger {
    pub fn tag(&self) -> &'static str {
        match self {
            Trigger::Poll => "auto",
            Trigger::Webhook => "new_lead",
            Trigger::Approval => "manual",
        }
    }

    pub fn campaign_type(&self) -> CampaignType {
        match self {
            Trigger::Poll | Trigger::Webhook => CampaignType::Auto,
            Trigger::Approval => CampaignType::Manual,
        }
    }

    fn note_title(&self) -> &'static str {
        match self.campaign_type() {
            CampaignType::Auto => "WhatsApp Sent - Auto",
            CampaignType::Manual => "WhatsApp Sent - Manual",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CampaignRequest {
    /// Label recorded in notes and the summary row.
    pub segment: String,
    pub template: String,
    pub trigger: Trigger,
}

impl CampaignRequest {
    pub fn new(segment: &str, template: &str, trigger: Trigger) -> Self {
        Self {
            segment: segment.to_string(),
            template: template.to_string(),
            trigger,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RecipientStatus {
    /// `sequence` is `None` when the ledger write failed after the send.
    Sent { sequence: Option<u32> },
    Failed { reason: String },
    /// No usable phone number; counted as failed.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecipientOutcome {
    pub lead_id: String,
    pub name: String,
    #[serde(flatten)]
    pub status: RecipientStatus,
}

impl RecipientOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.status, RecipientStatus::Sent { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CampaignResult {
    pub total: u32,
    pub success: u32,
    pub failed: u32,
    pub recipients: Vec<RecipientOutcome>,
}

impl CampaignResult {
    fn from_outcomes(recipients: Vec<RecipientOutcome>) -> Self {
        let success = recipients.iter().filter(|r| r.is_success()).count() as u32;
        let total = recipients.len() as u32;
        Self {
            total,
            success,
            failed: total - success,
            recipients,
        }
    }

    /// Fraction in `0.0..=1.0`; zero for an empty run.
    pub fn success_rate(&self) -> f64 {
        f64::from(self.success) / f64::from(self.total.max(1))
    }

    /// Successful sends that were a lead's first message.
    pub fn new_lead_sends(&self) -> u32 {
        self.count_sent(|sequence| sequence == 1)
    }

    pub fn follow_up_sends(&self) -> u32 {
        self.count_sent(|sequence| sequence > 1)
    }

    fn count_sent<F: Fn(u32) -> bool>(&self, predicate: F) -> u32 {
        self.recipients
            .iter()
            .filter(|r| matches!(r.status, RecipientStatus::Sent { sequence: Some(s) } if predicate(s)))
            .count() as u32
    }
}

/// Sends one template to a list of leads, one at a time, pausing between
/// transport calls.
#[derive(Clone)]
pub struct CampaignExecutor {
    transport: Arc<dyn MessagingTransport>,
    crm: Arc<dyn CrmAnnotator>,
    ledger: Arc<dyn Ledger>,
    send_delay: Duration,
}

impl CampaignExecutor {
    pub fn new(clients: &Clients, send_delay: Duration) -> Self {
        Self {
            transport: clients.transport.clone(),
            crm: clients.crm.clone(),
            ledger: clients.ledger.clone(),
            send_delay,
        }
    }

    pub async fn execute(
        &self,
        request: &CampaignRequest,
        leads: &[Lead],
    ) -> Result<CampaignResult, CampaignError> {
        if request.template.trim().is_empty() {
            return Err(CampaignError::MissingTemplate(request.segment.clone()));
        }

        log::info!(
            "Starting campaign {} with template {} for {} leads",
            request.segment,
            request.template,
            leads.len()
        );

        let mut outcomes = Vec::with_capacity(leads.len());
        for (index, lead) in leads.iter().enumerate() {
            let outcome = self.send_one(request, lead).await;
            let reached_transport = outcome.status != RecipientStatus::Skipped;
            outcomes.push(outcome);

            if reached_transport && index + 1 < leads.len() && !self.send_delay.is_zero() {
                tokio::time::sleep(self.send_delay).await;
            }
        }

        let result = CampaignResult::from_outcomes(outcomes);
        log::info!(
            "Campaign {} complete: {} sent, {} failed of {}",
            request.segment,
            result.success,
            result.failed,
            result.total
        );

        if result.total > 0 {
            self.record_summary(request, &result).await;
        }

        Ok(result)
    }

    async fn send_one(&self, request: &CampaignRequest, lead: &Lead) -> RecipientOutcome {
        let name = lead.display_name();
        let outcome = |status| RecipientOutcome {
            lead_id: lead.id.clone(),
            name: name.clone(),
            status,
        };

        let Some(phone) = lead.contact_phone() else {
            log::warn!("Lead {} has no phone", lead.id);
            return outcome(RecipientStatus::Skipped);
        };

        let message = OutboundMessage {
            phone: phone.to_string(),
            name: name.clone(),
            template: request.template.clone(),
            tags: vec![
                request.trigger.tag().to_string(),
                lead.status().to_string(),
                lead.source().to_string(),
            ],
            ..Default::default()
        };

        let delivery = match self.transport.send_template(&message).await {
            Ok(delivery) => delivery,
            Err(e) => {
                log::error!("Failed to send WhatsApp to lead {}: {e}", lead.id);
                return outcome(RecipientStatus::Failed {
                    reason: e.to_string(),
                });
            }
        };

        let row = NewMessage::for_lead(
            lead,
            &delivery.phone,
            &request.template,
            request.trigger.campaign_type(),
        );
        let sequence = match self.ledger.append_message(row).await {
            Ok(sequence) => Some(sequence),
            Err(e) => {
                log::error!("Sent to lead {} but failed to log message: {e}", lead.id);
                None
            }
        };

        let body = note_body(request, sequence);
        if let Err(e) = self
            .crm
            .add_note(&lead.id, request.trigger.note_title(), &body)
            .await
        {
            log::warn!("Failed to add note to lead {}: {e}", lead.id);
        }

        log::info!("WhatsApp sent to lead {}", lead.id);
        outcome(RecipientStatus::Sent { sequence })
    }

    async fn record_summary(&self, request: &CampaignRequest, result: &CampaignResult) {
        let summary = CampaignSummary {
            date: Local::now().date_naive(),
            segment: request.segment.clone(),
            total_sent: result.total,
            success: result.success,
            failed: result.failed,
            new_leads: result.new_lead_sends(),
            follow_ups: result.follow_up_sends(),
            campaign_type: request.trigger.campaign_type(),
        };
        if let Err(e) = self.ledger.append_summary(&summary).await {
            log::error!("Error updating campaign summary: {e}");
        }
    }
}

fn note_body(request: &CampaignRequest, sequence: Option<u32>) -> String {
    let mut body = format!(
        "WhatsApp sent on {}\nTemplate: {}\nSegment: {}",
        Local::now().format("%Y-%m-%d %H:%M:%S"),
        request.template,
        request.segment
    );
    if let Some(sequence) = sequence {
        body.push_str(&format!("\nMessage #{sequence}"));
    }
    body
}
