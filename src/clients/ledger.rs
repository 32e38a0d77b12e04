use super::{ClientError, Ledger};
use crate::model::{normalize_id, CampaignSummary, CampaignType, MessageRecord, NewMessage, Outcome};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Message ledger stored in SQLite.
///
/// `message_log` holds one row per successful send; `campaign_summary` one row
/// per campaign run. Rows are only ever inserted.
pub struct SqliteLedger {
    db_path: String,
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    pub fn open(db_path: &str) -> anyhow::Result<Self> {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create ledger directory: {}", parent.display())
                })?;
            }
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open ledger database: {db_path}"))?;
        Self::init_database(&conn)?;
        log::info!("Ledger opened at {db_path}");

        Ok(Self {
            db_path: db_path.to_string(),
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_database(&conn)?;
        Ok(Self {
            db_path: ":memory:".to_string(),
            conn: Mutex::new(conn),
        })
    }

    pub fn path(&self) -> &str {
        &self.db_path
    }

    fn init_database(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS message_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                lead_id TEXT NOT NULL,
                name TEXT NOT NULL DEFAULT '',
                phone TEXT NOT NULL DEFAULT '',
                lead_status TEXT NOT NULL DEFAULT '',
                lead_source TEXT NOT NULL DEFAULT '',
                template TEXT NOT NULL,
                message_count INTEGER NOT NULL,
                result TEXT NOT NULL,
                campaign_type TEXT NOT NULL,
                notes TEXT NOT NULL DEFAULT ''
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_message_log_lead ON message_log (lead_id)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS campaign_summary (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                date TEXT NOT NULL,
                segment TEXT NOT NULL,
                total_sent INTEGER NOT NULL,
                success INTEGER NOT NULL,
                failed INTEGER NOT NULL,
                new_leads INTEGER NOT NULL,
                follow_ups INTEGER NOT NULL,
                campaign_type TEXT NOT NULL
            )",
            [],
        )?;

        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, ClientError> {
        self.conn.lock().map_err(|_| ClientError::LockPoisoned)
    }

    /// Most recent campaign summaries, newest first.
    pub fn recent_summaries(&self, limit: usize) -> Result<Vec<CampaignSummary>, ClientError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT date, segment, total_sent, success, failed, new_leads, follow_ups, campaign_type
             FROM campaign_summary ORDER BY id DESC LIMIT ?1",
        )?;

        let summaries = stmt
            .query_map(params![limit as i64], |row| {
                Ok(CampaignSummary {
                    date: row.get::<_, NaiveDate>(0)?,
                    segment: row.get(1)?,
                    total_sent: row.get(2)?,
                    success: row.get(3)?,
                    failed: row.get(4)?,
                    new_leads: row.get(5)?,
                    follow_ups: row.get(6)?,
                    campaign_type: CampaignType::from_label(&row.get::<_, String>(7)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(summaries)
    }

    fn count_rows(conn: &Connection, lead_id: &str) -> rusqlite::Result<u32> {
        conn.query_row(
            "SELECT COUNT(*) FROM message_log WHERE lead_id = ?1",
            params![normalize_id(lead_id)],
            |row| row.get(0),
        )
    }
}

#[async_trait]
impl Ledger for SqliteLedger {
    async fn fetch_all_messages(&self) -> Result<Vec<MessageRecord>, ClientError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT timestamp, lead_id, name, phone, lead_status, lead_source, template,
                    message_count, result, campaign_type, notes
             FROM message_log ORDER BY id",
        )?;

        let records = stmt
            .query_map([], |row| {
                Ok(MessageRecord {
                    timestamp: row.get::<_, DateTime<Utc>>(0)?,
                    lead_id: row.get(1)?,
                    name: row.get(2)?,
                    phone: row.get(3)?,
                    status: row.get(4)?,
                    source: row.get(5)?,
                    template: row.get(6)?,
                    sequence: row.get(7)?,
                    outcome: Outcome::from_label(&row.get::<_, String>(8)?),
                    campaign_type: CampaignType::from_label(&row.get::<_, String>(9)?),
                    notes: row.get(10)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Count and insert run in one IMMEDIATE transaction, so two writers can
    /// never hand out the same sequence number for a lead.
    async fn append_message(&self, message: NewMessage) -> Result<u32, ClientError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let sequence = Self::count_rows(&tx, &message.lead_id)? + 1;
        tx.execute(
            "INSERT INTO message_log
             (timestamp, lead_id, name, phone, lead_status, lead_source, template,
              message_count, result, campaign_type, notes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                Utc::now(),
                message.lead_id,
                message.name,
                message.phone,
                message.status,
                message.source,
                message.template,
                sequence,
                message.outcome.as_str(),
                message.campaign_type.as_str(),
                message.notes,
            ],
        )?;
        tx.commit()?;

        log::info!("Message logged for lead {} (#{sequence})", message.lead_id);
        Ok(sequence)
    }

    async fn count_for_lead(&self, lead_id: &str) -> Result<u32, ClientError> {
        let conn = self.lock()?;
        Ok(Self::count_rows(&conn, lead_id)?)
    }

    async fn append_summary(&self, summary: &CampaignSummary) -> Result<(), ClientError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO campaign_summary
             (date, segment, total_sent, success, failed, new_leads, follow_ups, campaign_type)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                summary.date,
                summary.segment,
                summary.total_sent,
                summary.success,
                summary.failed,
                summary.new_leads,
                summary.follow_ups,
                summary.campaign_type.as_str(),
            ],
        )?;
        log::info!("Campaign summary recorded for {}", summary.segment);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Lead;

    fn message(lead_id: &str, template: &str) -> NewMessage {
        let lead = Lead::new(lead_id).with_status("New").with_source("Web");
        NewMessage::for_lead(&lead, "+919876543210", template, CampaignType::Auto)
    }

    #[tokio::test]
    async fn test_append_assigns_increasing_sequence() {
        let ledger = SqliteLedger::open_in_memory().unwrap();

        assert_eq!(ledger.append_message(message("1", "welcome")).await.unwrap(), 1);
        assert_eq!(ledger.append_message(message("2", "welcome")).await.unwrap(), 1);
        assert_eq!(ledger.append_message(message("1", "followup")).await.unwrap(), 2);
        assert_eq!(ledger.count_for_lead("1").await.unwrap(), 2);
        assert_eq!(ledger.count_for_lead("3").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_count_matches_normalized_ids() {
        let ledger = SqliteLedger::open_in_memory().unwrap();
        ledger.append_message(message("42", "welcome")).await.unwrap();

        assert_eq!(ledger.count_for_lead("42").await.unwrap(), 1);
        assert_eq!(ledger.count_for_lead("42.0").await.unwrap(), 1);
        assert_eq!(ledger.count_for_lead(" 42 ").await.unwrap(), 1);
        assert_eq!(ledger.append_message(message("42.0", "followup")).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_fetch_all_returns_rows_in_order() {
        let ledger = SqliteLedger::open_in_memory().unwrap();
        ledger.append_message(message("1", "welcome")).await.unwrap();
        ledger.append_message(message("1", "followup")).await.unwrap();

        let records = ledger.fetch_all_messages().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].template, "welcome");
        assert_eq!(records[0].sequence, 1);
        assert_eq!(records[1].sequence, 2);
        assert_eq!(records[1].status, "New");
        assert_eq!(records[1].outcome, Outcome::Success);
        assert_eq!(records[1].campaign_type, CampaignType::Auto);
    }

    #[tokio::test]
    async fn test_sequence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ledger.db");
        let path = path.to_str().unwrap();

        {
            let ledger = SqliteLedger::open(path).unwrap();
            ledger.append_message(message("9", "welcome")).await.unwrap();
        }

        let ledger = SqliteLedger::open(path).unwrap();
        assert_eq!(ledger.append_message(message("9", "offer")).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_summaries_newest_first() {
        let ledger = SqliteLedger::open_in_memory().unwrap();
        for (segment, success) in [("never_contacted", 3), ("first_message", 1)] {
            ledger
                .append_summary(&CampaignSummary {
                    date: NaiveDate::from_ymd_opt(2026, 10, 16).unwrap(),
                    segment: segment.to_string(),
                    total_sent: 4,
                    success,
                    failed: 4 - success,
                    new_leads: success,
                    follow_ups: 0,
                    campaign_type: CampaignType::Manual,
                })
                .await
                .unwrap();
        }

        let summaries = ledger.recent_summaries(10).unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].segment, "first_message");
        assert_eq!(summaries[1].success, 3);
        assert_eq!(summaries[1].campaign_type, CampaignType::Manual);
    }
}
