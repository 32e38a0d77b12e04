use crate::campaign::{
    CampaignError, CampaignExecutor, CampaignRequest, CampaignResult, RecipientStatus, Trigger,
};
use crate::clients::Clients;
use crate::cohort::{classify, ContactBucket};
use crate::config::Config;
use crate::model::{lenient_id, Lead};
use crate::report::{CampaignReport, CohortReport, Reporter};
use crate::segment::{self, Segment, SegmentResolver};
use crate::snapshot::{message_count, Snapshot};
use chrono::Local;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

pub const SERVICE_NAME: &str = "Zoho-WhatsApp Automation";

#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub timestamp: String,
    pub service: &'static str,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PollSummary {
    pub checked: usize,
    pub new_found: usize,
    pub sent: u32,
    pub failed: u32,
}

/// Body of a CRM webhook call.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookLead {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: String,
    #[serde(rename = "Lead_Status", default)]
    pub status: Option<String>,
    #[serde(rename = "Lead_Source", default)]
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Sent { sequence: Option<u32> },
    NotFound,
    AlreadyContacted { messages: u32 },
    NoPhone,
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ApprovedCampaign {
    pub segment: String,
    pub template: String,
    pub result: CampaignResult,
    pub success_rate: f64,
    pub emailed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyReportOutcome {
    pub report: CohortReport,
    pub emailed: bool,
}

/// Entry point for every trigger: HTTP handlers, the scheduler and the CLI.
///
/// Campaign runs (poll, webhook, approval) hold `campaign_lock` for their
/// whole duration so two runs never interleave their ledger reads and writes.
pub struct OutreachService {
    config: Config,
    clients: Clients,
    executor: CampaignExecutor,
    resolver: SegmentResolver,
    reporter: Reporter,
    campaign_lock: Mutex<()>,
}

impl OutreachService {
    pub fn new(config: Config, clients: Clients) -> Self {
        let executor = CampaignExecutor::new(&clients, config.send_delay());
        let resolver = SegmentResolver::new(clients.leads.clone(), clients.ledger.clone());
        let reporter = Reporter::new(
            clients.notifier.clone(),
            &config.notifications.approval_base_url,
        );
        Self {
            config,
            clients,
            executor,
            resolver,
            reporter,
            campaign_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            status: "healthy",
            timestamp: Local::now().to_rfc3339(),
            service: SERVICE_NAME,
        }
    }

    fn new_lead_template(&self) -> Result<String, CampaignError> {
        self.config
            .campaign
            .new_lead_template
            .clone()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| CampaignError::MissingTemplate("new leads".to_string()))
    }

    /// Message never-contacted leads with the new-lead template, at most
    /// `poll_batch_limit` per call.
    pub async fn poll_new_leads(&self) -> Result<PollSummary, CampaignError> {
        let template = self.new_lead_template()?;
        let _guard = self.campaign_lock.lock().await;
        log::info!("Checking for new leads...");

        let snapshot = Snapshot::load(self.clients.leads.as_ref(), self.clients.ledger.as_ref()).await?;
        let new_leads = segment::resolve(
            &Segment::Contact(ContactBucket::NeverContacted),
            &snapshot.leads,
            &snapshot.history,
        );

        let limit = self.config.campaign.poll_batch_limit;
        let batch = &new_leads[..new_leads.len().min(limit)];
        let request = CampaignRequest::new(ContactBucket::NeverContacted.name(), &template, Trigger::Poll);
        let result = self.executor.execute(&request, batch).await?;

        let summary = PollSummary {
            checked: snapshot.leads.len(),
            new_found: new_leads.len(),
            sent: result.success,
            failed: result.failed,
        };
        log::info!("Check complete: {summary:?}");
        Ok(summary)
    }

    /// Send the new-lead template to a lead announced by the CRM, unless the
    /// ledger already has messages for it.
    pub async fn handle_webhook_lead(&self, event: &WebhookLead) -> Result<WebhookOutcome, CampaignError> {
        if event.id.is_empty() {
            return Err(CampaignError::MissingParameter("id"));
        }
        let template = self.new_lead_template()?;
        let _guard = self.campaign_lock.lock().await;
        log::info!("Processing new lead: {}", event.id);

        let mut lead: Lead = match self.clients.leads.fetch_lead(&event.id).await {
            Ok(Some(lead)) => lead,
            Ok(None) => {
                log::error!("Lead {} not found", event.id);
                return Ok(WebhookOutcome::NotFound);
            }
            Err(e) => {
                log::error!("Error fetching lead {}: {e}", event.id);
                return Ok(WebhookOutcome::NotFound);
            }
        };

        let existing = message_count(self.clients.ledger.as_ref(), &lead.id).await;
        if existing > 0 {
            log::info!("Lead {} already has {existing} messages, skipping", lead.id);
            return Ok(WebhookOutcome::AlreadyContacted { messages: existing });
        }

        if event.status.is_some() {
            lead.status = event.status.clone();
        }
        if event.source.is_some() {
            lead.source = event.source.clone();
        }

        let request = CampaignRequest::new("webhook", &template, Trigger::Webhook);
        let result = self.executor.execute(&request, std::slice::from_ref(&lead)).await?;

        let outcome = match result.recipients.into_iter().next().map(|r| r.status) {
            Some(RecipientStatus::Sent { sequence }) => WebhookOutcome::Sent { sequence },
            Some(RecipientStatus::Failed { reason }) => WebhookOutcome::Failed { reason },
            Some(RecipientStatus::Skipped) | None => WebhookOutcome::NoPhone,
        };
        Ok(outcome)
    }

    /// Current cohort counts without sending anything.
    pub async fn cohorts(&self) -> Result<CohortReport, CampaignError> {
        let snapshot = Snapshot::load(self.clients.leads.as_ref(), self.clients.ledger.as_ref()).await?;
        Ok(CohortReport::from_cohorts(&classify(&snapshot.leads, &snapshot.history)))
    }

    pub async fn send_daily_report(&self) -> Result<DailyReportOutcome, CampaignError> {
        log::info!("Generating daily report...");
        let report = self.cohorts().await?;
        let emailed = self.reporter.send_daily_report(&report).await;
        Ok(DailyReportOutcome { report, emailed })
    }

    /// Operator-approved campaign: resolve `segment` now, send `template`
    /// to every lead in it, then email the totals.
    pub async fn approve_campaign(
        &self,
        segment: Option<&str>,
        template: Option<&str>,
    ) -> Result<ApprovedCampaign, CampaignError> {
        let segment = non_empty(segment).ok_or(CampaignError::MissingParameter("segment"))?;
        let template = non_empty(template).ok_or(CampaignError::MissingParameter("template"))?;

        let _guard = self.campaign_lock.lock().await;
        log::info!("Campaign approved: segment={segment}, template={template}");

        let leads = self.resolver.resolve(segment).await?;

        let request = CampaignRequest::new(segment, template, Trigger::Approval);
        let result = self.executor.execute(&request, &leads).await?;

        let report = CampaignReport::new(segment, template, &result);
        let emailed = self.reporter.send_campaign_summary(&report).await;

        Ok(ApprovedCampaign {
            segment: segment.to_string(),
            template: template.to_string(),
            success_rate: report.success_rate,
            result,
            emailed,
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
