use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Placeholder for lead fields the CRM left empty.
pub const UNKNOWN: &str = "Unknown";

/// A prospective contact as returned by the CRM.
///
/// Field names follow the CRM's JSON so records deserialize straight from API
/// responses and webhook bodies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lead {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: String,
    #[serde(rename = "First_Name", default)]
    pub first_name: Option<String>,
    #[serde(rename = "Last_Name", default)]
    pub last_name: Option<String>,
    #[serde(rename = "Phone", default)]
    pub phone: Option<String>,
    #[serde(rename = "Mobile", default)]
    pub mobile: Option<String>,
    #[serde(rename = "Email", default)]
    pub email: Option<String>,
    #[serde(rename = "Lead_Status", default)]
    pub status: Option<String>,
    #[serde(rename = "Lead_Source", default)]
    pub source: Option<String>,
    #[serde(rename = "Company", default)]
    pub company: Option<String>,
}

impl Lead {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: normalize_id(&id.into()),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, first: &str, last: &str) -> Self {
        self.first_name = Some(first.to_string());
        self.last_name = Some(last.to_string());
        self
    }

    pub fn with_phone(mut self, phone: &str) -> Self {
        self.phone = Some(phone.to_string());
        self
    }

    pub fn with_status(mut self, status: &str) -> Self {
        self.status = Some(status.to_string());
        self
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.source = Some(source.to_string());
        self
    }

    /// "First Last", trimmed; empty when the CRM has neither.
    pub fn display_name(&self) -> String {
        let first = self.first_name.as_deref().unwrap_or("").trim();
        let last = self.last_name.as_deref().unwrap_or("").trim();
        format!("{first} {last}").trim().to_string()
    }

    /// Phone, falling back to mobile. Blank values count as absent.
    pub fn contact_phone(&self) -> Option<&str> {
        non_blank(self.phone.as_deref()).or_else(|| non_blank(self.mobile.as_deref()))
    }

    pub fn status(&self) -> &str {
        non_blank(self.status.as_deref()).unwrap_or(UNKNOWN)
    }

    pub fn source(&self) -> &str {
        non_blank(self.source.as_deref()).unwrap_or(UNKNOWN)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Canonical string form of a lead identifier.
///
/// Ledger rows and CRM records do not always agree on the type of the id
/// (spreadsheet exports turn `123` into `123.0`), so both sides are compared
/// through this function.
pub fn normalize_id(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.strip_suffix(".0") {
        Some(integral) if !integral.is_empty() && integral.chars().all(|c| c.is_ascii_digit()) => {
            integral.to_string()
        }
        _ => trimmed.to_string(),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Integer(i64),
    Float(f64),
}

pub(crate) fn lenient_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let id = match Option::<RawId>::deserialize(deserializer)? {
        None => String::new(),
        Some(RawId::Text(text)) => normalize_id(&text),
        Some(RawId::Integer(n)) => n.to_string(),
        Some(RawId::Float(f)) => normalize_id(&f.to_string()),
    };
    Ok(id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignType {
    Auto,
    Manual,
}

impl CampaignType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignType::Auto => "auto",
            CampaignType::Manual => "manual",
        }
    }

    /// Anything other than "auto" was an operator-approved send.
    pub fn from_label(label: &str) -> Self {
        if label.trim().eq_ignore_ascii_case("auto") {
            CampaignType::Auto
        } else {
            CampaignType::Manual
        }
    }
}

impl fmt::Display for CampaignType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failed => "failed",
        }
    }

    pub fn from_label(label: &str) -> Self {
        if label.trim().eq_ignore_ascii_case("success") {
            Outcome::Success
        } else {
            Outcome::Failed
        }
    }
}

/// One row of the message ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub timestamp: DateTime<Utc>,
    pub lead_id: String,
    pub name: String,
    pub phone: String,
    pub status: String,
    pub source: String,
    pub template: String,
    /// 1 for the first message a lead ever received, 2 for the second, ...
    pub sequence: u32,
    pub outcome: Outcome,
    pub campaign_type: CampaignType,
    pub notes: String,
}

/// A send about to be written to the ledger. The ledger assigns the sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub lead_id: String,
    pub name: String,
    pub phone: String,
    pub status: String,
    pub source: String,
    pub template: String,
    pub outcome: Outcome,
    pub campaign_type: CampaignType,
    pub notes: String,
}

impl NewMessage {
    pub fn for_lead(lead: &Lead, phone: &str, template: &str, campaign_type: CampaignType) -> Self {
        Self {
            lead_id: normalize_id(&lead.id),
            name: lead.display_name(),
            phone: phone.to_string(),
            status: lead.status().to_string(),
            source: lead.source().to_string(),
            template: template.to_string(),
            outcome: Outcome::Success,
            campaign_type,
            notes: String::new(),
        }
    }

    pub fn into_record(self, sequence: u32, timestamp: DateTime<Utc>) -> MessageRecord {
        MessageRecord {
            timestamp,
            lead_id: self.lead_id,
            name: self.name,
            phone: self.phone,
            status: self.status,
            source: self.source,
            template: self.template,
            sequence,
            outcome: self.outcome,
            campaign_type: self.campaign_type,
            notes: self.notes,
        }
    }
}

/// Per-run totals kept in the ledger's summary table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignSummary {
    pub date: NaiveDate,
    pub segment: String,
    pub total_sent: u32,
    pub success: u32,
    pub failed: u32,
    pub new_leads: u32,
    pub follow_ups: u32,
    pub campaign_type: CampaignType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_id() {
        assert_eq!(normalize_id(" 42 "), "42");
        assert_eq!(normalize_id("42.0"), "42");
        assert_eq!(normalize_id("4.0.0"), "4.0.0");
        assert_eq!(normalize_id("abc.0"), "abc.0");
        assert_eq!(normalize_id(".0"), ".0");
    }

    #[test]
    fn test_lead_deserializes_numeric_id() {
        let lead: Lead =
            serde_json::from_str(r#"{"id": 5725767000001, "First_Name": "Asha"}"#).unwrap();
        assert_eq!(lead.id, "5725767000001");
        assert_eq!(lead.display_name(), "Asha");

        let lead: Lead = serde_json::from_str(r#"{"id": null}"#).unwrap();
        assert_eq!(lead.id, "");
    }

    #[test]
    fn test_missing_fields_default_to_unknown() {
        let lead: Lead = serde_json::from_str(r#"{"id": "7", "Lead_Status": "  "}"#).unwrap();
        assert_eq!(lead.status(), UNKNOWN);
        assert_eq!(lead.source(), UNKNOWN);
        assert_eq!(lead.contact_phone(), None);
    }

    #[test]
    fn test_contact_phone_falls_back_to_mobile() {
        let mut lead = Lead::new("1");
        lead.phone = Some("".to_string());
        lead.mobile = Some("9876543210".to_string());
        assert_eq!(lead.contact_phone(), Some("9876543210"));

        let lead = Lead::new("2").with_phone("+919876543210");
        assert_eq!(lead.contact_phone(), Some("+919876543210"));
    }

    #[test]
    fn test_labels() {
        assert_eq!(CampaignType::from_label("AUTO"), CampaignType::Auto);
        assert_eq!(CampaignType::from_label("manual"), CampaignType::Manual);
        assert_eq!(Outcome::from_label("success"), Outcome::Success);
        assert_eq!(Outcome::from_label("whatever"), Outcome::Failed);
    }
}
