use crate::model::{normalize_id, Lead, MessageRecord};
use std::collections::{BTreeMap, HashMap};

/// Statuses that make a lightly-contacted lead worth a priority message.
pub const HIGH_POTENTIAL_STATUSES: [&str; 2] = ["Contacted", "Qualified"];

/// Leads with fewer messages than this can still be high potential.
pub const HIGH_POTENTIAL_MAX_MESSAGES: u32 = 2;

/// Contact-count partition. Every lead falls in exactly one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContactBucket {
    NeverContacted,
    FirstMessage,
    SecondMessage,
    ThirdPlusMessage,
}

impl ContactBucket {
    pub const ALL: [ContactBucket; 4] = [
        ContactBucket::NeverContacted,
        ContactBucket::FirstMessage,
        ContactBucket::SecondMessage,
        ContactBucket::ThirdPlusMessage,
    ];

    pub fn for_count(count: u32) -> Self {
        match count {
            0 => ContactBucket::NeverContacted,
            1 => ContactBucket::FirstMessage,
            2 => ContactBucket::SecondMessage,
            _ => ContactBucket::ThirdPlusMessage,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ContactBucket::NeverContacted => "never_contacted",
            ContactBucket::FirstMessage => "first_message",
            ContactBucket::SecondMessage => "second_message",
            ContactBucket::ThirdPlusMessage => "third_plus_message",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|bucket| bucket.name() == name)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ContactBucket::NeverContacted => "Never Contacted",
            ContactBucket::FirstMessage => "Received 1st Message",
            ContactBucket::SecondMessage => "Received 2nd Message",
            ContactBucket::ThirdPlusMessage => "Received 3+ Messages",
        }
    }
}

/// Number of ledger rows per lead id.
#[derive(Debug, Clone, Default)]
pub struct MessageCounts {
    counts: HashMap<String, u32>,
}

impl MessageCounts {
    /// Rows without a lead id are skipped.
    pub fn from_history(history: &[MessageRecord]) -> Self {
        let mut counts = HashMap::new();
        for record in history {
            let lead_id = normalize_id(&record.lead_id);
            if lead_id.is_empty() {
                continue;
            }
            *counts.entry(lead_id).or_insert(0) += 1;
        }
        Self { counts }
    }

    pub fn get(&self, lead_id: &str) -> u32 {
        let lead_id = normalize_id(lead_id);
        if lead_id.is_empty() {
            return 0;
        }
        self.counts.get(&lead_id).copied().unwrap_or(0)
    }
}

pub fn is_high_potential(lead: &Lead, message_count: u32) -> bool {
    HIGH_POTENTIAL_STATUSES.contains(&lead.status())
        && message_count < HIGH_POTENTIAL_MAX_MESSAGES
}

/// Leads grouped by contact history and CRM fields.
///
/// The four contact buckets partition the lead set, as do `by_status` and
/// `by_source`. `high_potential` overlaps the others.
#[derive(Debug, Clone, Default)]
pub struct CohortSet<'a> {
    pub never_contacted: Vec<&'a Lead>,
    pub first_message: Vec<&'a Lead>,
    pub second_message: Vec<&'a Lead>,
    pub third_plus_message: Vec<&'a Lead>,
    pub by_status: BTreeMap<String, Vec<&'a Lead>>,
    pub by_source: BTreeMap<String, Vec<&'a Lead>>,
    pub high_potential: Vec<&'a Lead>,
}

impl<'a> CohortSet<'a> {
    pub fn bucket(&self, bucket: ContactBucket) -> &[&'a Lead] {
        match bucket {
            ContactBucket::NeverContacted => &self.never_contacted,
            ContactBucket::FirstMessage => &self.first_message,
            ContactBucket::SecondMessage => &self.second_message,
            ContactBucket::ThirdPlusMessage => &self.third_plus_message,
        }
    }

    fn bucket_mut(&mut self, bucket: ContactBucket) -> &mut Vec<&'a Lead> {
        match bucket {
            ContactBucket::NeverContacted => &mut self.never_contacted,
            ContactBucket::FirstMessage => &mut self.first_message,
            ContactBucket::SecondMessage => &mut self.second_message,
            ContactBucket::ThirdPlusMessage => &mut self.third_plus_message,
        }
    }

    /// Size of the classified lead set.
    pub fn total(&self) -> usize {
        ContactBucket::ALL
            .iter()
            .map(|bucket| self.bucket(*bucket).len())
            .sum()
    }
}

/// Classify `leads` against the message `history`.
///
/// Never fails; leads with missing fields land in the "Unknown" groups.
pub fn classify<'a>(leads: &'a [Lead], history: &[MessageRecord]) -> CohortSet<'a> {
    let counts = MessageCounts::from_history(history);
    let mut cohorts = CohortSet::default();

    for lead in leads {
        let count = counts.get(&lead.id);

        cohorts.bucket_mut(ContactBucket::for_count(count)).push(lead);

        cohorts
            .by_status
            .entry(lead.status().to_string())
            .or_default()
            .push(lead);
        cohorts
            .by_source
            .entry(lead.source().to_string())
            .or_default()
            .push(lead);

        if is_high_potential(lead, count) {
            cohorts.high_potential.push(lead);
        }
    }

    log::debug!(
        "Classified {} leads: {} never contacted, {} high potential",
        leads.len(),
        cohorts.never_contacted.len(),
        cohorts.high_potential.len()
    );

    cohorts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{history_for, lead};

    fn ids(leads: &[&Lead]) -> Vec<String> {
        leads.iter().map(|lead| lead.id.clone()).collect()
    }

    #[test]
    fn test_new_lead_without_history_is_never_contacted() {
        let leads = vec![lead("1", "New", "Web")];
        let cohorts = classify(&leads, &[]);

        assert_eq!(ids(&cohorts.never_contacted), vec!["1"]);
        assert!(cohorts.high_potential.is_empty());
    }

    #[test]
    fn test_contacted_lead_with_one_message_is_high_potential() {
        let leads = vec![lead("2", "Contacted", "Referral")];
        let history = history_for(&["2"]);
        let cohorts = classify(&leads, &history);

        assert_eq!(ids(&cohorts.first_message), vec!["2"]);
        assert_eq!(ids(&cohorts.high_potential), vec!["2"]);
    }

    #[test]
    fn test_count_buckets_partition_leads() {
        let leads = vec![
            lead("a", "New", "Web"),
            lead("b", "Contacted", "Web"),
            lead("c", "Qualified", "Ads"),
            lead("d", "Lost", "Ads"),
            lead("e", "Qualified", "Event"),
        ];
        let history = history_for(&["b", "c", "c", "d", "d", "d", "d", "zzz"]);
        let cohorts = classify(&leads, &history);

        assert_eq!(ids(&cohorts.never_contacted), vec!["a", "e"]);
        assert_eq!(ids(&cohorts.first_message), vec!["b"]);
        assert_eq!(ids(&cohorts.second_message), vec!["c"]);
        assert_eq!(ids(&cohorts.third_plus_message), vec!["d"]);
        assert_eq!(cohorts.total(), leads.len());

        for lead in &leads {
            let hits = ContactBucket::ALL
                .iter()
                .filter(|bucket| cohorts.bucket(**bucket).iter().any(|l| l.id == lead.id))
                .count();
            assert_eq!(hits, 1, "lead {} must be in exactly one bucket", lead.id);
        }
    }

    #[test]
    fn test_keyed_groupings_partition_leads() {
        let leads = vec![
            lead("1", "New", "Web"),
            lead("2", "New", "Ads"),
            Lead::new("3"),
        ];
        let cohorts = classify(&leads, &[]);

        let status_total: usize = cohorts.by_status.values().map(Vec::len).sum();
        let source_total: usize = cohorts.by_source.values().map(Vec::len).sum();
        assert_eq!(status_total, 3);
        assert_eq!(source_total, 3);
        assert_eq!(ids(&cohorts.by_status["New"]), vec!["1", "2"]);
        assert_eq!(ids(&cohorts.by_status["Unknown"]), vec!["3"]);
        assert_eq!(ids(&cohorts.by_source["Unknown"]), vec!["3"]);
    }

    #[test]
    fn test_high_potential_excludes_twice_messaged() {
        let leads = vec![
            lead("q", "Qualified", "Web"),
            lead("c", "Contacted", "Web"),
            lead("n", "New", "Web"),
        ];
        let history = history_for(&["q", "q"]);
        let cohorts = classify(&leads, &history);

        assert_eq!(ids(&cohorts.high_potential), vec!["c"]);
    }

    #[test]
    fn test_ids_compare_after_normalization() {
        let leads = vec![lead("100", "New", "Web")];
        let history = history_for(&["100.0", " 100 "]);
        let cohorts = classify(&leads, &history);

        assert_eq!(ids(&cohorts.second_message), vec!["100"]);
    }

    #[test]
    fn test_blank_ids_never_match_history() {
        let leads = vec![Lead::new("")];
        let history = history_for(&["", ""]);
        let cohorts = classify(&leads, &history);

        assert_eq!(cohorts.never_contacted.len(), 1);
    }

    #[test]
    fn test_bucket_names_round_trip() {
        for bucket in ContactBucket::ALL {
            assert_eq!(ContactBucket::from_name(bucket.name()), Some(bucket));
        }
        assert_eq!(ContactBucket::from_name("by_status"), None);
    }
}
