//! Per-campaign dial context
//!
//! Everything one campaign mutates across ticks lives here: the campaign
//! itself, its dial queue, ratio controller and in-flight calls. The engine
//! keeps each context behind one `tokio::sync::Mutex`, so a tick or command
//! runs to completion before the next one touches the campaign.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{watch, Mutex};

use crate::campaign::Campaign;
use crate::config::RatioConfig;
use crate::ratio::RatioController;
use crate::records::{DialQueue, RecordId};

use super::assignment::RoundRobinAssigner;
use super::types::{Call, CallId};

/// Shared handle to one campaign
pub(super) struct CampaignSlot {
    pub(super) state: Mutex<CampaignContext>,
    /// Number of non-terminal calls, watched by `stop_campaign` while draining
    pub(super) in_flight: watch::Sender<usize>,
}

impl CampaignSlot {
    pub(super) fn new(context: CampaignContext) -> Self {
        let (in_flight, _) = watch::channel(0);
        Self {
            state: Mutex::new(context),
            in_flight,
        }
    }
}

pub(super) struct CampaignContext {
    pub(super) campaign: Campaign,
    pub(super) queue: DialQueue,
    pub(super) ratio: RatioController,
    /// Non-terminal calls
    pub(super) calls: HashMap<CallId, Call>,
    /// Completed calls kept for idempotent completion reports
    pub(super) completed: HashMap<CallId, Call>,
    /// Records whose terminal disposition has been written
    pub(super) finalized: HashSet<RecordId>,
    pub(super) assigner: RoundRobinAssigner,
    /// Set while `stop_campaign` drains calls; no new launches
    pub(super) stopping: bool,
}

impl CampaignContext {
    pub(super) fn new(campaign: Campaign, ratio_config: RatioConfig) -> Self {
        let s = &campaign.settings;
        let ratio = RatioController::new(ratio_config, s.min_ratio, s.max_ratio, s.initial_ratio);
        Self {
            campaign,
            queue: DialQueue::new(),
            ratio,
            calls: HashMap::new(),
            completed: HashMap::new(),
            finalized: HashSet::new(),
            assigner: RoundRobinAssigner::new(),
            stopping: false,
        }
    }

    /// Whether new calls may be launched
    pub(super) fn is_dialing(&self) -> bool {
        self.campaign.status == crate::campaign::CampaignStatus::Active && !self.stopping
    }

    pub(super) fn has_call_for(&self, record_id: &RecordId) -> bool {
        self.calls.values().any(|c| &c.record.id == record_id)
    }

    /// Queue empty and nothing in flight
    pub(super) fn is_drained(&self) -> bool {
        self.queue.is_empty() && self.calls.is_empty()
    }

    /// Agents currently holding a non-terminal call of this campaign
    pub(super) fn busy_agents(&self) -> HashSet<String> {
        self.calls.values().filter_map(|c| c.agent_id.clone()).collect()
    }

    /// Calls that have run longer than the campaign limit
    pub(super) fn overdue_calls(&self, now: DateTime<Utc>) -> Vec<CallId> {
        let limit = Duration::seconds(self.campaign.settings.max_call_duration_secs as i64);
        self.calls
            .values()
            .filter(|c| now - c.initiated_at > limit)
            .map(|c| c.call_id.clone())
            .collect()
    }

    /// Drop completion tombstones older than `retention`, returning their ids
    pub(super) fn prune_completed(&mut self, now: DateTime<Utc>, retention: Duration) -> Vec<CallId> {
        let expired: Vec<CallId> = self
            .completed
            .values()
            .filter(|c| c.completed_at.map(|at| now - at > retention).unwrap_or(true))
            .map(|c| c.call_id.clone())
            .collect();
        for id in &expired {
            self.completed.remove(id);
        }
        expired
    }
}
