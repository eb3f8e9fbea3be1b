//! # SQLite Collaborator Store (sqlx)
//!
//! Persistent implementation of the collaborator traits on a sqlx SQLite
//! pool. The schema lives in `migrations/` and is applied on connect. WAL
//! journaling is enabled for file databases.
//!
//! ```rust
//! use rvoip_dialer_engine::store::{SqliteStore, RecordStore};
//! use rvoip_dialer_engine::records::ContactRecord;
//!
//! # async fn example() -> rvoip_dialer_engine::Result<()> {
//! let store = SqliteStore::new_in_memory().await?;
//! store.insert_contact_record("spring-sale", &ContactRecord::new("r1", "+15550100", "Ada")).await?;
//! store.upsert_agent("alice", true).await?;
//!
//! let records = store.list_eligible_records("spring-sale").await?;
//! assert_eq!(records.len(), 1);
//! # Ok(())
//! # }
//! ```

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc, Weekday};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use crate::campaign::{CampaignId, CampaignStatistics, HourWindow};
use crate::config::DatabaseConfig;
use crate::dialer::{CallId, CallRecord};
use crate::error::{DialerError, Result};
use crate::records::{normalize_phone, ContactRecord, CustomerTier, FinalResult, RecordId};

use super::{AgentPresence, AgentView, DncList, RecordStore};

/// Collaborator store backed by SQLite
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect, configure and migrate
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("🗄️ Initializing dialer store: {}", config.database_url);
        let in_memory = config.database_url.contains(":memory:");

        let options = SqliteConnectOptions::from_str(&config.database_url)?
            .journal_mode(if in_memory {
                SqliteJournalMode::Memory
            } else {
                SqliteJournalMode::Wal
            })
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5))
            .create_if_missing(true);

        // every connection to :memory: opens its own database
        let pool = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(config.max_connections)
                .acquire_timeout(config.query_timeout())
                .connect_with(options)
                .await?
        };

        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("✅ Dialer store ready");
        Ok(Self { pool })
    }

    /// In-memory database for tests
    pub async fn new_in_memory() -> Result<Self> {
        Self::new(&DatabaseConfig::default()).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert or replace a contact record of `source_campaign_id`
    pub async fn insert_contact_record(&self, source_campaign_id: &str, record: &ContactRecord) -> Result<()> {
        let preferred_days = record.preferred_days.as_ref().map(|days| {
            days.iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join(",")
        });

        sqlx::query(
            "INSERT OR REPLACE INTO contact_records
                (record_id, source_campaign_id, phone_number, name, customer_tier,
                 last_interaction_at, last_sale_at, preferred_start, preferred_end,
                 preferred_days, distance_km, utc_offset_minutes, retry_count,
                 last_attempt_at, final_result)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id.0)
        .bind(source_campaign_id)
        .bind(&record.phone_number)
        .bind(&record.name)
        .bind(record.customer_tier.as_str())
        .bind(record.last_interaction_at)
        .bind(record.last_sale_at)
        .bind(record.preferred_hours.map(|w| w.start))
        .bind(record.preferred_hours.map(|w| w.end))
        .bind(preferred_days)
        .bind(record.distance_km)
        .bind(record.utc_offset_minutes)
        .bind(record.retry_count as i64)
        .bind(record.last_attempt_at)
        .bind(record.final_result.map(|r| r.as_str()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Block a number, for one source campaign or for all when `None`
    pub async fn add_dnc_number(&self, phone_number: &str, source_campaign_id: Option<&str>) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO dnc_numbers (phone_number, source_campaign_id, added_at)
             VALUES (?, ?, ?)",
        )
        .bind(normalize_phone(phone_number))
        .bind(source_campaign_id.unwrap_or(""))
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn upsert_agent(&self, agent_id: &str, available: bool) -> Result<()> {
        sqlx::query(
            "INSERT INTO agents (agent_id, available, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(agent_id) DO UPDATE SET available = excluded.available,
                                                 updated_at = excluded.updated_at",
        )
        .bind(agent_id)
        .bind(available)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Returns `false` when the agent is unknown
    pub async fn set_agent_available(&self, agent_id: &str, available: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE agents SET available = ?, updated_at = ? WHERE agent_id = ?")
            .bind(available)
            .bind(Utc::now())
            .bind(agent_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn final_disposition(&self, record_id: &RecordId) -> Result<Option<FinalResult>> {
        let row = sqlx::query("SELECT final_result FROM contact_records WHERE record_id = ?")
            .bind(&record_id.0)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let value: Option<String> = row.try_get("final_result")?;
                Ok(value.as_deref().and_then(FinalResult::parse))
            }
            None => Ok(None),
        }
    }

    pub async fn call_record_count(&self, campaign_id: &CampaignId) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM call_records WHERE campaign_id = ?")
            .bind(&campaign_id.0)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("n")?)
    }

    pub async fn load_campaign_statistics(&self, campaign_id: &CampaignId) -> Result<Option<CampaignStatistics>> {
        let row = sqlx::query("SELECT statistics FROM campaign_statistics WHERE campaign_id = ?")
            .bind(&campaign_id.0)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let json: String = row.try_get("statistics")?;
                let stats = serde_json::from_str(&json)
                    .map_err(|e| DialerError::database(format!("corrupt statistics for {}: {}", campaign_id, e)))?;
                Ok(Some(stats))
            }
            None => Ok(None),
        }
    }

    /// Per-disposition call counts of a campaign, from the call log
    pub async fn disposition_counts(&self, campaign_id: &CampaignId) -> Result<HashMap<String, i64>> {
        let rows = sqlx::query(
            "SELECT disposition, COUNT(*) AS n FROM call_records WHERE campaign_id = ? GROUP BY disposition",
        )
        .bind(&campaign_id.0)
        .fetch_all(&self.pool)
        .await?;

        let mut counts = HashMap::new();
        for row in &rows {
            counts.insert(row.try_get::<String, _>("disposition")?, row.try_get::<i64, _>("n")?);
        }
        Ok(counts)
    }

    fn record_from_row(row: &SqliteRow) -> Result<ContactRecord> {
        let tier: String = row.try_get("customer_tier")?;
        let preferred_start: Option<NaiveTime> = row.try_get("preferred_start")?;
        let preferred_end: Option<NaiveTime> = row.try_get("preferred_end")?;
        let preferred_days: Option<String> = row.try_get("preferred_days")?;
        let final_result: Option<String> = row.try_get("final_result")?;
        let retry_count: i64 = row.try_get("retry_count")?;

        let mut record = ContactRecord::new(
            row.try_get::<String, _>("record_id")?,
            row.try_get::<String, _>("phone_number")?,
            row.try_get::<String, _>("name")?,
        );
        record.customer_tier = CustomerTier::parse(&tier);
        record.last_interaction_at = row.try_get("last_interaction_at")?;
        record.last_sale_at = row.try_get("last_sale_at")?;
        record.preferred_hours = match (preferred_start, preferred_end) {
            (Some(start), Some(end)) => Some(HourWindow { start, end }),
            _ => None,
        };
        record.preferred_days = preferred_days.map(|days| {
            days.split(',')
                .filter_map(|d| d.trim().parse::<Weekday>().ok())
                .collect()
        });
        record.distance_km = row.try_get("distance_km")?;
        record.utc_offset_minutes = row.try_get("utc_offset_minutes")?;
        record.retry_count = u32::try_from(retry_count).unwrap_or_default();
        record.last_attempt_at = row.try_get("last_attempt_at")?;
        record.final_result = final_result.as_deref().and_then(FinalResult::parse);
        Ok(record)
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn list_eligible_records(&self, source_campaign_id: &str) -> Result<Vec<ContactRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM contact_records
             WHERE source_campaign_id = ? AND final_result IS NULL
             ORDER BY rowid",
        )
        .bind(source_campaign_id)
        .fetch_all(&self.pool)
        .await?;

        let records = rows
            .iter()
            .map(Self::record_from_row)
            .collect::<Result<Vec<_>>>()?;
        debug!("Loaded {} open records for {}", records.len(), source_campaign_id);
        Ok(records)
    }

    async fn mark_final_disposition(
        &self,
        record_id: &RecordId,
        result: FinalResult,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let outcome = sqlx::query(
            "UPDATE contact_records SET final_result = ?, final_result_at = ?
             WHERE record_id = ? AND final_result IS NULL",
        )
        .bind(result.as_str())
        .bind(at)
        .bind(&record_id.0)
        .execute(&self.pool)
        .await?;

        let written = outcome.rows_affected() > 0;
        if !written {
            debug!("Record {} already finalized or unknown, ignoring {}", record_id, result.as_str());
        }
        Ok(written)
    }

    async fn save_call_record(&self, record: &CallRecord) -> Result<()> {
        let metadata = serde_json::to_string(&record.metadata)
            .map_err(|e| DialerError::database(format!("cannot encode call metadata: {}", e)))?;

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT OR REPLACE INTO call_records
                (call_id, campaign_id, record_id, agent_id, phone_number, disposition, attempt,
                 initiated_at, answered_at, completed_at, talk_time_secs, notes, metadata)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.call_id.0)
        .bind(&record.campaign_id.0)
        .bind(&record.record_id.0)
        .bind(&record.agent_id)
        .bind(&record.phone_number)
        .bind(record.disposition.as_str())
        .bind(record.attempt as i64)
        .bind(record.initiated_at)
        .bind(record.answered_at)
        .bind(record.completed_at)
        .bind(record.talk_time_secs as i64)
        .bind(&record.notes)
        .bind(metadata)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE contact_records SET last_attempt_at = ?, retry_count = MAX(retry_count, ?)
             WHERE record_id = ?",
        )
        .bind(record.completed_at)
        .bind(record.attempt as i64)
        .bind(&record.record_id.0)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(())
    }

    async fn schedule_callback(&self, record_id: &RecordId, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("INSERT INTO callbacks (record_id, callback_at, created_at) VALUES (?, ?, ?)")
            .bind(&record_id.0)
            .bind(at)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn save_campaign_statistics(
        &self,
        campaign_id: &CampaignId,
        statistics: &CampaignStatistics,
    ) -> Result<()> {
        let json = serde_json::to_string(statistics)
            .map_err(|e| DialerError::database(format!("cannot encode statistics: {}", e)))?;
        sqlx::query(
            "INSERT INTO campaign_statistics (campaign_id, statistics, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(campaign_id) DO UPDATE SET statistics = excluded.statistics,
                                                    updated_at = excluded.updated_at",
        )
        .bind(&campaign_id.0)
        .bind(json)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl DncList for SqliteStore {
    async fn list_dnc(&self, source_campaign_id: &str) -> Result<HashSet<String>> {
        let rows = sqlx::query(
            "SELECT phone_number FROM dnc_numbers WHERE source_campaign_id = '' OR source_campaign_id = ?",
        )
        .bind(source_campaign_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("phone_number").map_err(DialerError::from))
            .collect()
    }
}

#[async_trait]
impl AgentPresence for SqliteStore {
    async fn list_available_agents(&self) -> Result<Vec<AgentView>> {
        let rows = sqlx::query(
            "SELECT agent_id, available, current_call_id FROM agents
             WHERE available = 1 ORDER BY agent_id",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut agents = Vec::with_capacity(rows.len());
        for row in &rows {
            let current: Option<String> = row.try_get("current_call_id")?;
            agents.push(AgentView {
                agent_id: row.try_get("agent_id")?,
                available: row.try_get("available")?,
                current_call_id: current.map(CallId),
            });
        }
        Ok(agents)
    }
}
