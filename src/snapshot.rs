use crate::campaign::CampaignError;
use crate::clients::{Ledger, LeadSource};
use crate::model::{Lead, MessageRecord};

/// Leads and message history read together for one classification or
/// resolution pass.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub leads: Vec<Lead>,
    pub history: Vec<MessageRecord>,
}

impl Snapshot {
    /// Failing to read leads aborts; a failed history read is treated as an
    /// empty history.
    pub async fn load(leads: &dyn LeadSource, ledger: &dyn Ledger) -> Result<Self, CampaignError> {
        let leads = leads
            .fetch_all_leads(None)
            .await
            .map_err(CampaignError::LeadSource)?;
        let history = read_history(ledger).await;

        Ok(Self { leads, history })
    }
}

pub async fn read_history(ledger: &dyn Ledger) -> Vec<MessageRecord> {
    match ledger.fetch_all_messages().await {
        Ok(history) => history,
        Err(e) => {
            log::error!("Error getting messages: {e}");
            Vec::new()
        }
    }
}

/// Ledger count for one lead; errors count as zero.
pub async fn message_count(ledger: &dyn Ledger, lead_id: &str) -> u32 {
    match ledger.count_for_lead(lead_id).await {
        Ok(count) => count,
        Err(e) => {
            log::error!("Error getting message count for lead {lead_id}: {e}");
            0
        }
    }
}
