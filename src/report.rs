//! Operator-facing summaries: cohort counts for the daily report and totals
//! for a finished campaign, rendered as HTML email.

use crate::campaign::CampaignResult;
use crate::clients::NotificationChannel;
use crate::cohort::{CohortSet, ContactBucket};
use crate::segment::HIGH_POTENTIAL;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Template offered for each approval link in the daily report.
pub const SUGGESTED_TEMPLATES: [(&str, &str, &str); 4] = [
    ("never_contacted", "welcome", "Send Welcome"),
    ("first_message", "followup", "Send Follow-up"),
    ("second_message", "offer", "Send Offer"),
    (HIGH_POTENTIAL, "priority", "Send Priority Message"),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketCount {
    pub name: String,
    pub label: String,
    pub count: usize,
    /// Share of the whole lead set, 0-100 with one decimal.
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CohortReport {
    pub generated_at: DateTime<Local>,
    pub total_leads: usize,
    pub buckets: Vec<BucketCount>,
    pub by_status: BTreeMap<String, usize>,
    pub by_source: BTreeMap<String, usize>,
    pub high_potential: usize,
}

impl CohortReport {
    pub fn from_cohorts(cohorts: &CohortSet<'_>) -> Self {
        let total_leads = cohorts.total();
        let buckets = ContactBucket::ALL
            .into_iter()
            .map(|bucket| {
                let count = cohorts.bucket(bucket).len();
                BucketCount {
                    name: bucket.name().to_string(),
                    label: bucket.label().to_string(),
                    count,
                    percentage: percentage(count, total_leads),
                }
            })
            .collect();

        let counts = |groups: &BTreeMap<String, Vec<_>>| {
            groups
                .iter()
                .map(|(key, leads)| (key.clone(), leads.len()))
                .collect::<BTreeMap<_, _>>()
        };

        Self {
            generated_at: Local::now(),
            total_leads,
            buckets,
            by_status: counts(&cohorts.by_status),
            by_source: counts(&cohorts.by_source),
            high_potential: cohorts.high_potential.len(),
        }
    }

    /// Count for a bucket or `high_potential`; zero for anything else.
    pub fn count(&self, name: &str) -> usize {
        if name == HIGH_POTENTIAL {
            return self.high_potential;
        }
        self.buckets
            .iter()
            .find(|bucket| bucket.name == name)
            .map(|bucket| bucket.count)
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CampaignReport {
    pub segment: String,
    pub template: String,
    pub completed_at: DateTime<Local>,
    pub total: u32,
    pub success: u32,
    pub failed: u32,
    pub success_rate: f64,
}

impl CampaignReport {
    pub fn new(segment: &str, template: &str, result: &CampaignResult) -> Self {
        Self {
            segment: segment.to_string(),
            template: template.to_string(),
            completed_at: Local::now(),
            total: result.total,
            success: result.success,
            failed: result.failed,
            success_rate: round_one_decimal(result.success_rate() * 100.0),
        }
    }
}

fn percentage(count: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round_one_decimal(count as f64 * 100.0 / total as f64)
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub fn approval_link(base_url: &str, segment: &str, template: &str) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("segment", segment)
        .append_pair("template", template)
        .finish();
    format!("{}/approve-campaign?{query}", base_url.trim_end_matches('/'))
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn action_button(base_url: &str, segment: &str) -> Option<String> {
    SUGGESTED_TEMPLATES
        .iter()
        .find(|(name, _, _)| *name == segment)
        .map(|(name, template, caption)| {
            format!(
                "<a href=\"{}\" class=\"btn\">{caption}</a>",
                escape_html(&approval_link(base_url, name, template))
            )
        })
}

const STYLE: &str = "<style>
body { font-family: Arial, sans-serif; max-width: 800px; margin: 0 auto; padding: 20px; }
h1 { color: #1a73e8; }
h2 { color: #34a853; margin-top: 30px; }
table { border-collapse: collapse; width: 100%; margin: 20px 0; }
th, td { border: 1px solid #ddd; padding: 12px; text-align: left; }
th { background-color: #f2f2f2; }
.btn { background-color: #1a73e8; color: white; padding: 12px 24px; text-decoration: none; border-radius: 4px; display: inline-block; margin: 10px 5px; }
.section { background-color: #f9f9f9; padding: 15px; margin: 15px 0; border-radius: 5px; }
.stat { background-color: #f9f9f9; padding: 15px; margin: 10px 0; border-radius: 5px; display: inline-block; width: 45%; }
</style>";

fn count_table(heading: &str, key_label: &str, counts: &BTreeMap<String, usize>) -> String {
    let mut html = String::new();
    html.push_str(&format!(
        "<div class=\"section\"><h2>{heading}</h2><table><tr><th>{key_label}</th><th>Count</th></tr>\n"
    ));
    for (key, count) in counts {
        html.push_str(&format!(
            "<tr><td>{}</td><td>{count}</td></tr>\n",
            escape_html(key)
        ));
    }
    html.push_str("</table></div>\n");
    html
}

pub fn render_daily_report(report: &CohortReport, approval_base_url: &str) -> String {
    let mut html = String::new();
    html.push_str(&format!("<html><head>{STYLE}</head><body>\n"));
    html.push_str("<h1>Daily WhatsApp Campaign Report</h1>\n");
    html.push_str(&format!(
        "<p><strong>Date:</strong> {}</p>\n<p><strong>Total leads:</strong> {}</p>\n",
        report.generated_at.format("%B %d, %Y"),
        report.total_leads
    ));

    html.push_str("<div class=\"section\"><h2>Lead Cohort Summary</h2><table>\n");
    html.push_str("<tr><th>Cohort</th><th>Count</th><th>Share</th><th>Action</th></tr>\n");
    for bucket in &report.buckets {
        let action = action_button(approval_base_url, &bucket.name).unwrap_or_else(|| "-".to_string());
        html.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{:.1}%</td><td>{action}</td></tr>\n",
            bucket.label, bucket.count, bucket.percentage
        ));
    }
    html.push_str("</table></div>\n");

    html.push_str(&count_table("By Lead Status", "Status", &report.by_status));
    html.push_str(&count_table("By Lead Source", "Source", &report.by_source));

    html.push_str(&format!(
        "<div class=\"section\"><h2>High Potential Leads</h2>\n<p>{} leads identified as high potential (Contacted/Qualified with less than 2 messages)</p>\n{}\n</div>\n",
        report.high_potential,
        action_button(approval_base_url, HIGH_POTENTIAL).unwrap_or_default()
    ));

    html.push_str("<hr style=\"margin: 40px 0;\">\n");
    html.push_str("<p style=\"color: #666; font-size: 14px;\">Click any button above to approve and send that campaign.<br>You'll receive a summary email after the campaign completes.</p>\n");
    html.push_str(&format!(
        "<p style=\"color: #999; font-size: 12px;\">Generated by lead-outreach<br>{}</p>\n",
        report.generated_at.format("%Y-%m-%d %H:%M:%S")
    ));
    html.push_str("</body></html>\n");
    html
}

pub fn render_campaign_summary(report: &CampaignReport) -> String {
    let stat = |label: &str, value: String| {
        format!("<div class=\"stat\"><div>{label}</div><div style=\"font-size: 32px; font-weight: bold;\">{value}</div></div>\n")
    };

    let mut html = String::new();
    html.push_str(&format!("<html><head>{STYLE}</head><body>\n"));
    html.push_str("<h1>Campaign Completed</h1>\n");
    html.push_str(&format!(
        "<p><strong>Segment:</strong> {}</p>\n<p><strong>Template:</strong> {}</p>\n<p><strong>Time:</strong> {}</p>\n<hr>\n",
        escape_html(&report.segment),
        escape_html(&report.template),
        report.completed_at.format("%Y-%m-%d %H:%M:%S")
    ));
    html.push_str(&stat("Total Sent", report.total.to_string()));
    html.push_str(&stat("Successful", report.success.to_string()));
    html.push_str(&stat("Failed", report.failed.to_string()));
    html.push_str(&stat("Success Rate", format!("{:.1}%", report.success_rate)));
    html.push_str("<hr style=\"margin: 30px 0;\">\n");
    html.push_str("<p style=\"color: #666;\">Successful sends are recorded in the message ledger and noted on the CRM record.</p>\n");
    html.push_str("</body></html>\n");
    html
}

/// Emails reports through the notification channel. Failures are logged and
/// reported as `false`.
#[derive(Clone)]
pub struct Reporter {
    notifier: Arc<dyn NotificationChannel>,
    approval_base_url: String,
}

impl Reporter {
    pub fn new(notifier: Arc<dyn NotificationChannel>, approval_base_url: &str) -> Self {
        Self {
            notifier,
            approval_base_url: approval_base_url.to_string(),
        }
    }

    pub async fn send_daily_report(&self, report: &CohortReport) -> bool {
        let subject = format!(
            "Daily WhatsApp Campaign Report - {}",
            report.generated_at.format("%B %d, %Y")
        );
        let html = render_daily_report(report, &self.approval_base_url);
        self.deliver(&subject, &html).await
    }

    pub async fn send_campaign_summary(&self, report: &CampaignReport) -> bool {
        let subject = format!("Campaign Complete: {}", report.segment);
        let html = render_campaign_summary(report);
        self.deliver(&subject, &html).await
    }

    async fn deliver(&self, subject: &str, html: &str) -> bool {
        match self.notifier.send(subject, html).await {
            Ok(()) => {
                log::info!("Report sent: {subject}");
                true
            }
            Err(e) => {
                log::error!("Error sending email '{subject}': {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::{RecipientOutcome, RecipientStatus};
    use crate::cohort::classify;
    use crate::testing::{history_for, lead, RecordingNotifier};

    fn sample_report() -> CohortReport {
        let leads = vec![
            lead("1", "New", "Web"),
            lead("2", "Contacted", "Web"),
            lead("3", "Qualified", "Trade Show"),
            lead("4", "New", "Ads"),
        ];
        let history = history_for(&["2", "3", "3"]);
        CohortReport::from_cohorts(&classify(&leads, &history))
    }

    #[test]
    fn test_counts_and_percentages() {
        let report = sample_report();

        assert_eq!(report.total_leads, 4);
        assert_eq!(report.count("never_contacted"), 2);
        assert_eq!(report.count("first_message"), 1);
        assert_eq!(report.count("second_message"), 1);
        assert_eq!(report.count("third_plus_message"), 0);
        assert_eq!(report.count(HIGH_POTENTIAL), 1);
        assert_eq!(report.count("by_status"), 0);
        assert_eq!(report.buckets[0].percentage, 50.0);
        assert_eq!(report.by_status["New"], 2);
        assert_eq!(report.by_source["Trade Show"], 1);
    }

    #[test]
    fn test_empty_lead_set_degrades_to_zero() {
        let report = CohortReport::from_cohorts(&classify(&[], &[]));
        assert_eq!(report.total_leads, 0);
        assert!(report.buckets.iter().all(|b| b.count == 0 && b.percentage == 0.0));
        assert!(report.by_status.is_empty());
    }

    #[test]
    fn test_approval_link_is_encoded() {
        assert_eq!(
            approval_link("https://ops.example.com/", "status:Hot Lead", "welcome"),
            "https://ops.example.com/approve-campaign?segment=status%3AHot+Lead&template=welcome"
        );
    }

    #[test]
    fn test_daily_report_html() {
        let html = render_daily_report(&sample_report(), "https://ops.example.com");

        assert!(html.contains(
            "https://ops.example.com/approve-campaign?segment=never_contacted&amp;template=welcome"
        ));
        assert!(html.contains("segment=high_potential&amp;template=priority"));
        assert!(html.contains("segment=second_message&amp;template=offer"));
        assert!(!html.contains("segment=third_plus_message"));
        assert!(html.contains("<td>Trade Show</td><td>1</td>"));
    }

    #[test]
    fn test_user_text_is_escaped() {
        let result = CampaignResult::default();
        let html = render_campaign_summary(&CampaignReport::new("source:<script>", "welcome", &result));
        assert!(html.contains("source:&lt;script&gt;"));
        assert!(html.contains("0.0%"));
    }

    #[test]
    fn test_campaign_report_rate() {
        let sent = RecipientOutcome {
            lead_id: "1".to_string(),
            name: String::new(),
            status: RecipientStatus::Sent { sequence: Some(1) },
        };
        let result = CampaignResult {
            total: 3,
            success: 1,
            failed: 2,
            recipients: vec![sent],
        };
        let report = CampaignReport::new("never_contacted", "welcome", &result);
        assert_eq!(report.success_rate, 33.3);
    }

    #[tokio::test]
    async fn test_reporter_reports_send_failure() {
        let notifier = Arc::new(RecordingNotifier {
            fail: true,
            ..Default::default()
        });
        let reporter = Reporter::new(notifier, "http://localhost:8080");
        assert!(!reporter.send_daily_report(&sample_report()).await);

        let notifier = Arc::new(RecordingNotifier::default());
        let reporter = Reporter::new(notifier.clone(), "http://localhost:8080");
        let report = CampaignReport::new("first_message", "followup", &CampaignResult::default());
        assert!(reporter.send_campaign_summary(&report).await);
        assert_eq!(notifier.subjects(), vec!["Campaign Complete: first_message"]);
    }
}
