use anyhow::Context;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub crm: CrmConfig,
    #[serde(default)]
    pub messaging: MessagingConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub campaign: CampaignConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrmConfig {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    /// Data-centre domain, e.g. "zoho.in" or "zoho.com".
    pub domain: String,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    pub api_key: String,
    pub base_url: String,
    /// Provider campaign used for templates without an alias.
    pub default_campaign: Option<String>,
    /// Template name -> provider campaign name.
    pub template_aliases: HashMap<String, String>,
    pub source_label: String,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub database_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub smtp_server: String,
    pub smtp_port: u16,
    pub sender_email: String,
    pub sender_password: Option<String>,
    pub recipient: Option<String>,
    pub approval_base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CampaignConfig {
    /// Template sent to leads discovered by polling or webhooks.
    pub new_lead_template: Option<String>,
    pub send_delay_ms: u64,
    pub poll_batch_limit: usize,
    /// Seconds between automatic polls; 0 disables the poll loop.
    pub poll_interval_seconds: u64,
    /// Local "HH:MM" for the daily cohort report; unset disables it.
    pub daily_report_time: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            refresh_token: String::new(),
            domain: "zoho.in".to_string(),
            timeout_seconds: Some(15),
        }
    }
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://backend.aisensy.com/campaign/t1/api/v2".to_string(),
            default_campaign: None,
            template_aliases: HashMap::new(),
            source_label: "Zoho CRM Automation".to_string(),
            timeout_seconds: Some(10),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database_path: "/var/lib/lead-outreach/ledger.db".to_string(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            smtp_server: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            sender_email: "noreply@automation.com".to_string(),
            sender_password: None,
            recipient: None,
            approval_base_url: "http://localhost:8080".to_string(),
        }
    }
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            new_lead_template: None,
            send_delay_ms: 2000,
            poll_batch_limit: 10,
            poll_interval_seconds: 900,
            daily_report_time: Some("09:00".to_string()),
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file: {path}"))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Invalid configuration in {path}"))?;
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Overlay values from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Overlay values from `lookup`; blank values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(v) = get("ZOHO_CLIENT_ID") {
            self.crm.client_id = v;
        }
        if let Some(v) = get("ZOHO_CLIENT_SECRET") {
            self.crm.client_secret = v;
        }
        if let Some(v) = get("ZOHO_REFRESH_TOKEN") {
            self.crm.refresh_token = v;
        }
        if let Some(v) = get("ZOHO_DOMAIN") {
            self.crm.domain = v;
        }
        if let Some(v) = get("AISENSY_API_KEY") {
            self.messaging.api_key = v;
        }
        if let Some(v) = get("AISENSY_CAMPAIGN_NAME") {
            self.messaging.default_campaign = Some(v);
        }
        if let Some(v) = get("NEW_LEAD_TEMPLATE") {
            self.campaign.new_lead_template = Some(v);
        }
        if let Some(v) = get("REPORT_EMAIL") {
            self.notifications.recipient = Some(v);
        }
        if let Some(v) = get("APPROVAL_BASE_URL") {
            self.notifications.approval_base_url = v;
        }
        if let Some(v) = get("SENDER_EMAIL") {
            self.notifications.sender_email = v;
        }
        if let Some(v) = get("SENDER_PASSWORD") {
            self.notifications.sender_password = Some(v);
        }
        if let Some(v) = get("LEDGER_DB_PATH") {
            self.ledger.database_path = v;
        }
        if let Some(v) = get("PORT") {
            match v.trim().parse() {
                Ok(port) => self.server.port = port,
                Err(e) => log::warn!("Ignoring invalid PORT '{v}': {e}"),
            }
        }
    }

    /// Problems that would make some operation fail at run time.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.crm.client_id.is_empty()
            || self.crm.client_secret.is_empty()
            || self.crm.refresh_token.is_empty()
        {
            problems.push("CRM credentials are incomplete".to_string());
        }
        if self.messaging.api_key.is_empty() {
            problems.push("Messaging API key is not set".to_string());
        }
        if self.campaign.new_lead_template.is_none() {
            problems.push("No new lead template configured; polling and webhooks will not send".to_string());
        }
        if self.notifications.recipient.is_none() {
            problems.push("No report recipient configured".to_string());
        }
        if let Some(time) = &self.campaign.daily_report_time {
            if parse_report_time(time).is_none() {
                problems.push(format!("Invalid daily_report_time '{time}', expected HH:MM"));
            }
        }

        problems
    }

    pub fn send_delay(&self) -> Duration {
        Duration::from_millis(self.campaign.send_delay_ms)
    }

    pub fn poll_interval(&self) -> Option<Duration> {
        match self.campaign.poll_interval_seconds {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn daily_report_time(&self) -> Option<NaiveTime> {
        self.campaign
            .daily_report_time
            .as_deref()
            .and_then(parse_report_time)
    }
}

pub fn parse_report_time(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").ok()
}
