//! # Collaborator Stores
//!
//! The engine reads contact records, the Do-Not-Contact list and agent
//! presence from external systems, and writes call outcomes and campaign
//! statistics back. Each concern is a narrow async trait:
//!
//! - [`RecordStore`]: contact records keyed by source campaign, terminal
//!   dispositions, call records, callbacks, campaign statistics
//! - [`DncList`]: Do-Not-Contact numbers
//! - [`AgentPresence`]: which agents can take a call right now
//!
//! The engine never calls these directly. Every call goes through
//! [`StoreGateway`], which bounds it with a timeout and retries transient
//! failures with exponential backoff, so a slow or flapping backend surfaces
//! as a [`DialerError::TransientStore`] instead of a stalled tick.
//!
//! Two implementations ship with the crate: [`InMemoryStore`] for tests and
//! simulation, and [`SqliteStore`] on sqlx.

pub mod memory;
pub mod sqlite;

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::campaign::{CampaignId, CampaignStatistics};
use crate::config::DatabaseConfig;
use crate::dialer::{CallId, CallRecord};
use crate::error::{DialerError, Result};
use crate::records::{ContactRecord, FinalResult, RecordId};

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Contact record store keyed by source campaign
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Records of `source_campaign_id` without a terminal disposition
    async fn list_eligible_records(&self, source_campaign_id: &str) -> Result<Vec<ContactRecord>>;

    /// Write a terminal disposition
    ///
    /// Returns `true` only for the first terminal write of a record; later
    /// writes leave the stored result untouched and return `false`.
    async fn mark_final_disposition(
        &self,
        record_id: &RecordId,
        result: FinalResult,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Persist a completed attempt and note it on the contact record
    async fn save_call_record(&self, record: &CallRecord) -> Result<()>;

    async fn schedule_callback(&self, record_id: &RecordId, at: DateTime<Utc>) -> Result<()>;

    async fn save_campaign_statistics(
        &self,
        campaign_id: &CampaignId,
        statistics: &CampaignStatistics,
    ) -> Result<()>;
}

/// Do-Not-Contact list
#[async_trait]
pub trait DncList: Send + Sync {
    /// Normalized phone numbers that must not be dialed for `source_campaign_id`
    async fn list_dnc(&self, source_campaign_id: &str) -> Result<HashSet<String>>;
}

/// Read-only view of the agent presence subsystem
#[async_trait]
pub trait AgentPresence: Send + Sync {
    async fn list_available_agents(&self) -> Result<Vec<AgentView>>;
}

/// Transient presence view of one agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentView {
    pub agent_id: String,
    pub available: bool,
    pub current_call_id: Option<CallId>,
}

impl AgentView {
    pub fn available(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            available: true,
            current_call_id: None,
        }
    }
}

/// Timeout and retry policy around the collaborator stores
#[derive(Clone)]
pub struct StoreGateway {
    records: Arc<dyn RecordStore>,
    dnc: Arc<dyn DncList>,
    presence: Arc<dyn AgentPresence>,
    timeout: Duration,
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl StoreGateway {
    pub fn new(
        records: Arc<dyn RecordStore>,
        dnc: Arc<dyn DncList>,
        presence: Arc<dyn AgentPresence>,
        config: &DatabaseConfig,
    ) -> Self {
        Self {
            records,
            dnc,
            presence,
            timeout: config.query_timeout(),
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
        }
    }

    /// Gateway over one store implementing all three collaborator traits
    pub fn from_store<S>(store: Arc<S>, config: &DatabaseConfig) -> Self
    where
        S: RecordStore + DncList + AgentPresence + 'static,
    {
        Self::new(store.clone(), store.clone(), store, config)
    }

    pub async fn list_eligible_records(&self, source_campaign_id: &str) -> Result<Vec<ContactRecord>> {
        self.call("list_eligible_records", || self.records.list_eligible_records(source_campaign_id))
            .await
    }

    pub async fn list_dnc(&self, source_campaign_id: &str) -> Result<HashSet<String>> {
        self.call("list_dnc", || self.dnc.list_dnc(source_campaign_id)).await
    }

    pub async fn list_available_agents(&self) -> Result<Vec<AgentView>> {
        self.call("list_available_agents", || self.presence.list_available_agents())
            .await
    }

    pub async fn mark_final_disposition(
        &self,
        record_id: &RecordId,
        result: FinalResult,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        self.call("mark_final_disposition", || {
            self.records.mark_final_disposition(record_id, result, at)
        })
        .await
    }

    pub async fn save_call_record(&self, record: &CallRecord) -> Result<()> {
        self.call("save_call_record", || self.records.save_call_record(record))
            .await
    }

    pub async fn schedule_callback(&self, record_id: &RecordId, at: DateTime<Utc>) -> Result<()> {
        self.call("schedule_callback", || self.records.schedule_callback(record_id, at))
            .await
    }

    pub async fn save_campaign_statistics(
        &self,
        campaign_id: &CampaignId,
        statistics: &CampaignStatistics,
    ) -> Result<()> {
        self.call("save_campaign_statistics", || {
            self.records.save_campaign_statistics(campaign_id, statistics)
        })
        .await
    }

    /// Run `op` under the timeout, retrying transient failures
    async fn call<T, F, Fut>(&self, name: &str, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            let outcome = match tokio::time::timeout(self.timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(DialerError::transient_store(format!(
                    "{} timed out after {:?}",
                    name, self.timeout
                ))),
            };

            match outcome {
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let delay = self.backoff_delay(attempt);
                    attempt += 1;
                    warn!(
                        "Store call {} failed ({}), retry {}/{} in {:?}",
                        name, e, attempt, self.max_retries, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }

    /// Delay before retry number `attempt + 1`
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl std::fmt::Debug for StoreGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreGateway")
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}
