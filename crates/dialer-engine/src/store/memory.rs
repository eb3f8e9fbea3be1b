//! In-memory collaborator store for tests and simulation

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::campaign::{CampaignId, CampaignStatistics};
use crate::dialer::CallRecord;
use crate::error::{DialerError, Result};
use crate::records::{normalize_phone, ContactRecord, FinalResult, RecordId};

use super::{AgentPresence, AgentView, DncList, RecordStore};

/// Collaborator store held entirely in memory
///
/// Implements [`RecordStore`], [`DncList`] and [`AgentPresence`]. Faults can
/// be injected with [`fail_next_reads`](Self::fail_next_reads) and
/// [`fail_next_writes`](Self::fail_next_writes), latency with
/// [`set_latency`](Self::set_latency).
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: RwLock<HashMap<String, Vec<ContactRecord>>>,
    global_dnc: RwLock<HashSet<String>>,
    campaign_dnc: RwLock<HashMap<String, HashSet<String>>>,
    agents: RwLock<Vec<AgentView>>,
    dispositions: Mutex<HashMap<RecordId, (FinalResult, DateTime<Utc>)>>,
    disposition_attempts: Mutex<Vec<(RecordId, FinalResult)>>,
    call_records: Mutex<Vec<CallRecord>>,
    callbacks: Mutex<Vec<(RecordId, DateTime<Utc>)>>,
    statistics: Mutex<HashMap<CampaignId, CampaignStatistics>>,
    read_faults: AtomicU32,
    write_faults: AtomicU32,
    latency: Mutex<Option<Duration>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_record(&self, source_campaign_id: &str, record: ContactRecord) {
        self.records
            .write()
            .entry(source_campaign_id.to_string())
            .or_default()
            .push(record);
    }

    pub fn add_records(&self, source_campaign_id: &str, records: impl IntoIterator<Item = ContactRecord>) {
        let mut map = self.records.write();
        map.entry(source_campaign_id.to_string())
            .or_default()
            .extend(records);
    }

    /// Block a number for every campaign
    pub fn add_dnc(&self, phone_number: &str) {
        self.global_dnc.write().insert(normalize_phone(phone_number));
    }

    /// Block a number for one source campaign
    pub fn add_campaign_dnc(&self, source_campaign_id: &str, phone_number: &str) {
        self.campaign_dnc
            .write()
            .entry(source_campaign_id.to_string())
            .or_default()
            .insert(normalize_phone(phone_number));
    }

    /// Register an available agent
    pub fn add_agent(&self, agent_id: &str) {
        let mut agents = self.agents.write();
        match agents.iter_mut().find(|a| a.agent_id == agent_id) {
            Some(agent) => agent.available = true,
            None => agents.push(AgentView::available(agent_id)),
        }
    }

    pub fn set_agent_available(&self, agent_id: &str, available: bool) {
        if let Some(agent) = self.agents.write().iter_mut().find(|a| a.agent_id == agent_id) {
            agent.available = available;
        }
    }

    /// Make the next `n` reads fail with a transient error
    pub fn fail_next_reads(&self, n: u32) {
        self.read_faults.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` writes fail with a transient error
    pub fn fail_next_writes(&self, n: u32) {
        self.write_faults.store(n, Ordering::SeqCst);
    }

    pub fn pending_read_faults(&self) -> u32 {
        self.read_faults.load(Ordering::SeqCst)
    }

    pub fn pending_write_faults(&self) -> u32 {
        self.write_faults.load(Ordering::SeqCst)
    }

    /// Delay every call by `latency`
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    pub fn final_disposition(&self, record_id: &RecordId) -> Option<FinalResult> {
        self.dispositions.lock().get(record_id).map(|(r, _)| *r)
    }

    pub fn dispositions(&self) -> HashMap<RecordId, FinalResult> {
        self.dispositions
            .lock()
            .iter()
            .map(|(id, (r, _))| (id.clone(), *r))
            .collect()
    }

    /// Every disposition write received, including ignored repeats
    pub fn disposition_attempts(&self) -> Vec<(RecordId, FinalResult)> {
        self.disposition_attempts.lock().clone()
    }

    pub fn call_records(&self) -> Vec<CallRecord> {
        self.call_records.lock().clone()
    }

    pub fn callbacks(&self) -> Vec<(RecordId, DateTime<Utc>)> {
        self.callbacks.lock().clone()
    }

    pub fn campaign_statistics(&self, campaign_id: &CampaignId) -> Option<CampaignStatistics> {
        self.statistics.lock().get(campaign_id).cloned()
    }

    async fn before_read(&self) -> Result<()> {
        self.delay().await;
        if take_fault(&self.read_faults) {
            return Err(DialerError::transient_store("injected read failure"));
        }
        Ok(())
    }

    async fn before_write(&self) -> Result<()> {
        self.delay().await;
        if take_fault(&self.write_faults) {
            return Err(DialerError::transient_store("injected write failure"));
        }
        Ok(())
    }

    async fn delay(&self) {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

fn take_fault(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn list_eligible_records(&self, source_campaign_id: &str) -> Result<Vec<ContactRecord>> {
        self.before_read().await?;
        let dispositions = self.dispositions.lock().clone();
        let records = self
            .records
            .read()
            .get(source_campaign_id)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.final_result.is_none() && !dispositions.contains_key(&r.id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(records)
    }

    async fn mark_final_disposition(
        &self,
        record_id: &RecordId,
        result: FinalResult,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        self.before_write().await?;
        self.disposition_attempts.lock().push((record_id.clone(), result));
        let mut dispositions = self.dispositions.lock();
        if dispositions.contains_key(record_id) {
            debug!("Record {} already finalized, ignoring {}", record_id, result.as_str());
            return Ok(false);
        }
        dispositions.insert(record_id.clone(), (result, at));
        Ok(true)
    }

    async fn save_call_record(&self, record: &CallRecord) -> Result<()> {
        self.before_write().await?;
        {
            let mut map = self.records.write();
            let stored = map
                .values_mut()
                .flat_map(|records| records.iter_mut())
                .find(|r| r.id == record.record_id);
            if let Some(stored) = stored {
                stored.last_attempt_at = Some(record.completed_at);
                stored.retry_count = stored.retry_count.max(record.attempt);
            }
        }
        self.call_records.lock().push(record.clone());
        Ok(())
    }

    async fn schedule_callback(&self, record_id: &RecordId, at: DateTime<Utc>) -> Result<()> {
        self.before_write().await?;
        self.callbacks.lock().push((record_id.clone(), at));
        Ok(())
    }

    async fn save_campaign_statistics(
        &self,
        campaign_id: &CampaignId,
        statistics: &CampaignStatistics,
    ) -> Result<()> {
        self.before_write().await?;
        self.statistics
            .lock()
            .insert(campaign_id.clone(), statistics.clone());
        Ok(())
    }
}

#[async_trait]
impl DncList for InMemoryStore {
    async fn list_dnc(&self, source_campaign_id: &str) -> Result<HashSet<String>> {
        self.before_read().await?;
        let mut numbers = self.global_dnc.read().clone();
        if let Some(campaign) = self.campaign_dnc.read().get(source_campaign_id) {
            numbers.extend(campaign.iter().cloned());
        }
        Ok(numbers)
    }
}

#[async_trait]
impl AgentPresence for InMemoryStore {
    async fn list_available_agents(&self) -> Result<Vec<AgentView>> {
        self.before_read().await?;
        Ok(self
            .agents
            .read()
            .iter()
            .filter(|a| a.available)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_terminal_write_wins() {
        let store = InMemoryStore::new();
        let id = RecordId::from("r1");
        let now = Utc::now();

        assert!(store.mark_final_disposition(&id, FinalResult::Contacted, now).await.unwrap());
        assert!(!store.mark_final_disposition(&id, FinalResult::NoContact, now).await.unwrap());
        assert_eq!(store.final_disposition(&id), Some(FinalResult::Contacted));
        assert_eq!(store.disposition_attempts().len(), 2);
    }

    #[tokio::test]
    async fn test_finalized_records_not_listed() {
        let store = InMemoryStore::new();
        store.add_records(
            "src",
            vec![
                ContactRecord::new("r1", "5550100", "Ada"),
                ContactRecord::new("r2", "5550101", "Grace"),
            ],
        );
        store
            .mark_final_disposition(&RecordId::from("r1"), FinalResult::NoContact, Utc::now())
            .await
            .unwrap();

        let records = store.list_eligible_records("src").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id.0, "r2");
        assert!(store.list_eligible_records("other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dnc_scopes() {
        let store = InMemoryStore::new();
        store.add_dnc("+1 555 0100");
        store.add_campaign_dnc("src", "555-0101");

        let src = store.list_dnc("src").await.unwrap();
        assert!(src.contains("+15550100"));
        assert!(src.contains("5550101"));
        assert_eq!(store.list_dnc("other").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let store = InMemoryStore::new();
        store.add_agent("a1");
        store.fail_next_reads(1);
        assert!(store.list_available_agents().await.unwrap_err().is_transient());
        assert_eq!(store.list_available_agents().await.unwrap().len(), 1);

        store.set_agent_available("a1", false);
        assert!(store.list_available_agents().await.unwrap().is_empty());
    }
}
