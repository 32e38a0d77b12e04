use super::{ClientError, CrmAnnotator, LeadSource};
use crate::config::CrmConfig;
use crate::model::Lead;
use async_trait::async_trait;
use log::{debug, error, info, warn};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

pub const DEFAULT_LEAD_FIELDS: [&str; 9] = [
    "First_Name",
    "Last_Name",
    "Phone",
    "Mobile",
    "Email",
    "Lead_Status",
    "Lead_Source",
    "Company",
    "id",
];

const PER_PAGE: usize = 200;
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(300);
const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 3600;
/// Single-record lookups and note writes; paginated reads use the client
/// default.
const SHORT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    refresh_after: Instant,
}

impl CachedToken {
    fn new(value: String, expires_in_secs: u64, now: Instant) -> Self {
        let lifetime = Duration::from_secs(expires_in_secs).saturating_sub(TOKEN_REFRESH_MARGIN);
        Self {
            value,
            refresh_after: now + lifetime,
        }
    }

    fn is_fresh(&self, now: Instant) -> bool {
        now < self.refresh_after
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RecordsResponse {
    data: Option<Vec<Lead>>,
}

/// Zoho-style CRM client: OAuth refresh-token flow, paginated lead reads,
/// note creation.
pub struct CrmClient {
    client: Client,
    client_id: String,
    client_secret: String,
    refresh_token: String,
    auth_url: String,
    api_base: String,
    token: RwLock<Option<CachedToken>>,
}

impl CrmClient {
    pub fn new(config: &CrmConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds.unwrap_or(15)))
            .user_agent(concat!("lead-outreach/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            refresh_token: config.refresh_token.clone(),
            auth_url: format!("https://accounts.{}/oauth/v2/token", config.domain),
            api_base: api_base_for(&config.domain),
            token: RwLock::new(None),
        }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub fn auth_url(&self) -> &str {
        &self.auth_url
    }

    /// Cached access token, refreshed shortly before it expires.
    async fn access_token(&self) -> Result<String, ClientError> {
        {
            let token = self.token.read().await;
            if let Some(cached) = token.as_ref() {
                if cached.is_fresh(Instant::now()) {
                    return Ok(cached.value.clone());
                }
            }
        }

        let mut token = self.token.write().await;
        // Another task may have refreshed while we waited for the lock.
        if let Some(cached) = token.as_ref() {
            if cached.is_fresh(Instant::now()) {
                return Ok(cached.value.clone());
            }
        }

        let fresh = self.refresh_access_token().await?;
        let value = fresh.value.clone();
        *token = Some(fresh);
        Ok(value)
    }

    async fn refresh_access_token(&self) -> Result<CachedToken, ClientError> {
        let params = [
            ("refresh_token", self.refresh_token.as_str()),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .client
            .post(&self.auth_url)
            .query(&params)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            error!("Failed to get access token: {body}");
            return Err(ClientError::Auth(format!("HTTP {}: {body}", status.as_u16())));
        }

        let body: TokenResponse = response.json().await?;
        match body.access_token {
            Some(access_token) => {
                info!("Access token refreshed successfully");
                Ok(CachedToken::new(
                    access_token,
                    body.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS),
                    Instant::now(),
                ))
            }
            None => Err(ClientError::Auth(
                body.error
                    .unwrap_or_else(|| "token response without access_token".to_string()),
            )),
        }
    }

    fn auth_header(token: &str) -> String {
        format!("Zoho-oauthtoken {token}")
    }

    fn lookup_request(&self, token: &str, lead_id: &str) -> RequestBuilder {
        self.client
            .get(format!("{}/Leads/{lead_id}", self.api_base))
            .header("Authorization", Self::auth_header(token))
            .timeout(SHORT_REQUEST_TIMEOUT)
    }

    fn note_request(&self, token: &str, payload: &serde_json::Value) -> RequestBuilder {
        self.client
            .post(format!("{}/Notes", self.api_base))
            .header("Authorization", Self::auth_header(token))
            .timeout(SHORT_REQUEST_TIMEOUT)
            .json(payload)
    }

    async fn fetch_page(
        &self,
        token: &str,
        module: &str,
        fields: &str,
        page: usize,
    ) -> Result<Vec<Lead>, ClientError> {
        let url = format!("{}/{module}", self.api_base);
        let page_param = page.to_string();
        let per_page_param = PER_PAGE.to_string();

        let response = self
            .client
            .get(&url)
            .header("Authorization", Self::auth_header(token))
            .query(&[
                ("fields", fields),
                ("page", page_param.as_str()),
                ("per_page", per_page_param.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        // The CRM answers 204 when a module is empty.
        if status == StatusCode::NO_CONTENT {
            return Ok(Vec::new());
        }
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let body: RecordsResponse = response.json().await?;
        Ok(body.data.unwrap_or_default())
    }
}

#[async_trait]
impl LeadSource for CrmClient {
    /// Walks every page. An error on the first page is returned; an error on a
    /// later page stops the walk and returns what was collected so far.
    async fn fetch_all_leads(&self, fields: Option<&[&str]>) -> Result<Vec<Lead>, ClientError> {
        let token = self.access_token().await?;
        let fields = fields.unwrap_or(&DEFAULT_LEAD_FIELDS[..]).join(",");

        let mut leads = Vec::new();
        let mut page = 1;

        loop {
            match self.fetch_page(&token, "Leads", &fields, page).await {
                Ok(records) => {
                    let count = records.len();
                    leads.extend(records);
                    if count < PER_PAGE {
                        break;
                    }
                    page += 1;
                }
                Err(e) if page == 1 => {
                    error!("Error fetching Leads: {e}");
                    return Err(e);
                }
                Err(e) => {
                    warn!("Error fetching Leads page {page}, keeping {} records: {e}", leads.len());
                    break;
                }
            }
        }

        info!("Fetched {} records from Leads", leads.len());
        Ok(leads)
    }

    async fn fetch_lead(&self, lead_id: &str) -> Result<Option<Lead>, ClientError> {
        let token = self.access_token().await?;
        let response = self.lookup_request(&token, lead_id).send().await?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT || status == StatusCode::NOT_FOUND {
            debug!("Lead {lead_id} not found");
            return Ok(None);
        }
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let body: RecordsResponse = response.json().await?;
        Ok(body.data.and_then(|records| records.into_iter().next()))
    }
}

#[async_trait]
impl CrmAnnotator for CrmClient {
    async fn add_note(&self, lead_id: &str, title: &str, body: &str) -> Result<(), ClientError> {
        let token = self.access_token().await?;
        let payload = note_payload(lead_id, title, body);
        let response = self.note_request(&token, &payload).send().await?;

        let status = response.status();
        if status == StatusCode::OK || status == StatusCode::CREATED {
            info!("Note added to lead {lead_id}");
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            error!("Failed to add note to lead {lead_id}: {body}");
            Err(ClientError::Http {
                status: status.as_u16(),
                body,
            })
        }
    }
}

/// API host for a data-centre domain: "zoho.in" -> "www.zohoapis.in".
fn api_base_for(domain: &str) -> String {
    let domain = domain.trim();
    let suffix = domain.strip_prefix("zoho.").unwrap_or(domain);
    format!("https://www.zohoapis.{suffix}/crm/v3")
}

fn note_payload(lead_id: &str, title: &str, body: &str) -> serde_json::Value {
    serde_json::json!({
        "data": [{
            "Note_Title": title,
            "Note_Content": body,
            "Parent_Id": lead_id,
            "se_module": "Leads",
        }]
    })
}
