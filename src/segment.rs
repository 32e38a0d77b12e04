use crate::campaign::CampaignError;
use crate::clients::{Ledger, LeadSource};
use crate::cohort::{is_high_potential, ContactBucket, MessageCounts};
use crate::model::{Lead, MessageRecord};
use crate::snapshot::Snapshot;
use std::fmt;
use std::sync::Arc;

pub const HIGH_POTENTIAL: &str = "high_potential";

/// Cohort names accepted as segment identifiers.
pub const RESOLVABLE_COHORTS: [&str; 5] = [
    "never_contacted",
    "first_message",
    "second_message",
    "third_plus_message",
    HIGH_POTENTIAL,
];

/// A selector that resolves to a list of leads at campaign time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Contact(ContactBucket),
    HighPotential,
    Status(String),
    Source(String),
    /// Resolves to no leads.
    Unrecognized(String),
}

impl Segment {
    /// Parse an identifier such as `never_contacted` or `status:Qualified`.
    /// Never fails; unknown identifiers become [`Segment::Unrecognized`].
    pub fn parse(identifier: &str) -> Self {
        let identifier = identifier.trim();

        if let Some(bucket) = ContactBucket::from_name(identifier) {
            return Segment::Contact(bucket);
        }
        if identifier == HIGH_POTENTIAL {
            return Segment::HighPotential;
        }
        if let Some(value) = identifier.strip_prefix("status:") {
            return Segment::Status(value.to_string());
        }
        if let Some(value) = identifier.strip_prefix("source:") {
            return Segment::Source(value.to_string());
        }

        Segment::Unrecognized(identifier.to_string())
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Segment::Unrecognized(_))
    }

    fn matches(&self, lead: &Lead, counts: &MessageCounts) -> bool {
        match self {
            Segment::Contact(bucket) => ContactBucket::for_count(counts.get(&lead.id)) == *bucket,
            Segment::HighPotential => is_high_potential(lead, counts.get(&lead.id)),
            Segment::Status(status) => lead.status() == status,
            Segment::Source(source) => lead.source() == source,
            Segment::Unrecognized(_) => false,
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Contact(bucket) => f.write_str(bucket.name()),
            Segment::HighPotential => f.write_str(HIGH_POTENTIAL),
            Segment::Status(value) => write!(f, "status:{value}"),
            Segment::Source(value) => write!(f, "source:{value}"),
            Segment::Unrecognized(raw) => f.write_str(raw),
        }
    }
}

/// Leads selected by `segment`, in lead order.
pub fn resolve(segment: &Segment, leads: &[Lead], history: &[MessageRecord]) -> Vec<Lead> {
    if !segment.is_recognized() {
        log::warn!("Unrecognized segment '{segment}', nothing to send");
        return Vec::new();
    }

    let counts = MessageCounts::from_history(history);
    leads
        .iter()
        .filter(|lead| segment.matches(lead, &counts))
        .cloned()
        .collect()
}

/// Resolves segment identifiers against fresh reads of the CRM and ledger.
#[derive(Clone)]
pub struct SegmentResolver {
    leads: Arc<dyn LeadSource>,
    ledger: Arc<dyn Ledger>,
}

impl SegmentResolver {
    pub fn new(leads: Arc<dyn LeadSource>, ledger: Arc<dyn Ledger>) -> Self {
        Self { leads, ledger }
    }

    pub async fn resolve(&self, identifier: &str) -> Result<Vec<Lead>, CampaignError> {
        let segment = Segment::parse(identifier);
        if !segment.is_recognized() {
            log::warn!("Unrecognized segment '{identifier}', nothing to send");
            return Ok(Vec::new());
        }

        let snapshot = Snapshot::load(self.leads.as_ref(), self.ledger.as_ref()).await?;
        let leads = resolve(&segment, &snapshot.leads, &snapshot.history);
        log::info!("Segment {segment} resolved to {} leads", leads.len());
        Ok(leads)
    }
}
