use super::{ClientError, Delivery, MessagingTransport, OutboundMessage};
use crate::config::MessagingConfig;
use async_trait::async_trait;
use log::{error, info};
use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use std::time::Duration;

/// AiSensy-style WhatsApp campaign API client.
pub struct MessagingClient {
    client: Client,
    api_key: String,
    base_url: String,
    source_label: String,
    default_campaign: Option<String>,
    template_aliases: HashMap<String, String>,
}

impl MessagingClient {
    pub fn new(config: &MessagingConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds.unwrap_or(10)))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
            source_label: config.source_label.clone(),
            default_campaign: config.default_campaign.clone(),
            template_aliases: config.template_aliases.clone(),
        }
    }

    /// Provider campaign for a template: explicit alias, then the configured
    /// default campaign, then the template name itself.
    pub fn campaign_for(&self, template: &str) -> String {
        self.template_aliases
            .get(template)
            .or(self.default_campaign.as_ref())
            .cloned()
            .unwrap_or_else(|| template.to_string())
    }

    fn payload(&self, message: &OutboundMessage, destination: &str) -> serde_json::Value {
        let mut payload = serde_json::json!({
            "apiKey": self.api_key,
            "campaignName": self.campaign_for(&message.template),
            "destination": destination,
            "userName": message.name,
            "source": self.source_label,
        });

        if !message.template_params.is_empty() {
            payload["templateParams"] = serde_json::json!(message.template_params);
        }
        if !message.tags.is_empty() {
            payload["tags"] = serde_json::json!(message.tags);
        }
        if !message.attributes.is_empty() {
            payload["attributes"] = serde_json::json!(message.attributes);
        }

        payload
    }
}

/// Put the number in international form for the provider.
///
/// Numbers already starting with `+` are kept; `91...` gains a `+`; a bare
/// ten-digit number is assumed Indian. Anything else passes through.
pub fn normalize_phone(phone: &str) -> String {
    let phone = phone.trim();
    if phone.starts_with('+') {
        phone.to_string()
    } else if phone.starts_with("91") {
        format!("+{phone}")
    } else if phone.len() == 10 {
        format!("+91{phone}")
    } else {
        phone.to_string()
    }
}

#[async_trait]
impl MessagingTransport for MessagingClient {
    async fn send_template(&self, message: &OutboundMessage) -> Result<Delivery, ClientError> {
        let destination = normalize_phone(&message.phone);
        let payload = self.payload(message, &destination);

        let response = match self.client.post(&self.base_url).json(&payload).send().await {
            Ok(response) => response,
            Err(e) => {
                error!("Error sending WhatsApp to {destination}: {e}");
                return Err(e.into());
            }
        };

        let status = response.status();
        if status == StatusCode::OK {
            info!("WhatsApp sent successfully to {destination}");
            Ok(Delivery {
                phone: destination,
                name: message.name.clone(),
            })
        } else {
            let body = response.text().await.unwrap_or_default();
            error!("Failed to send WhatsApp to {destination}: {body}");
            Err(ClientError::Http {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_with(default_campaign: Option<&str>, aliases: &[(&str, &str)]) -> MessagingClient {
        let config = MessagingConfig {
            api_key: "key-123".to_string(),
            default_campaign: default_campaign.map(str::to_string),
            template_aliases: aliases
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..Default::default()
        };
        MessagingClient::new(&config)
    }

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone("+14155550100"), "+14155550100");
        assert_eq!(normalize_phone("919876543210"), "+919876543210");
        assert_eq!(normalize_phone("9876543210"), "+919876543210");
        assert_eq!(normalize_phone(" 9876543210 "), "+919876543210");
        assert_eq!(normalize_phone("0044123"), "0044123");
    }

    #[test]
    fn test_campaign_resolution_order() {
        let client = client_with(Some("zoho_default"), &[("followup", "followup_v2")]);
        assert_eq!(client.campaign_for("followup"), "followup_v2");
        assert_eq!(client.campaign_for("welcome"), "zoho_default");

        let client = client_with(None, &[]);
        assert_eq!(client.campaign_for("welcome"), "welcome");
    }

    #[test]
    fn test_payload_omits_empty_optionals() {
        let client = client_with(None, &[]);
        let message = OutboundMessage {
            phone: "9876543210".to_string(),
            name: "Asha Rao".to_string(),
            template: "welcome".to_string(),
            ..Default::default()
        };
        let payload = client.payload(&message, "+919876543210");

        assert_eq!(payload["apiKey"], "key-123");
        assert_eq!(payload["campaignName"], "welcome");
        assert_eq!(payload["destination"], "+919876543210");
        assert_eq!(payload["userName"], "Asha Rao");
        assert_eq!(payload["source"], "Zoho CRM Automation");
        assert!(payload.get("tags").is_none());
        assert!(payload.get("templateParams").is_none());
    }

    #[test]
    fn test_payload_includes_tags() {
        let client = client_with(None, &[]);
        let message = OutboundMessage {
            phone: "9876543210".to_string(),
            name: "Asha".to_string(),
            template: "welcome".to_string(),
            tags: vec!["auto".to_string(), "New".to_string(), "Web".to_string()],
            template_params: vec!["Asha".to_string()],
            ..Default::default()
        };
        let payload = client.payload(&message, "+919876543210");

        assert_eq!(payload["tags"], serde_json::json!(["auto", "New", "Web"]));
        assert_eq!(payload["templateParams"], serde_json::json!(["Asha"]));
    }
}
