//! Core dialer engine
//!
//! [`DialerEngine`] is the command surface of the predictive dialer. It owns
//! one [`CampaignContext`](super::context::CampaignContext) per campaign and
//! serializes every command and tick touching a campaign through that
//! context's mutex. Periodic work (queue ticks, ratio ticks, cleanup) is
//! driven from outside, normally by [`DialerServer`](crate::server::DialerServer).
//!
//! At most one campaign per engine is `active` or `paused` at a time; run
//! several engines to dial several campaigns concurrently.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::campaign::{Campaign, CampaignId, CampaignSettings, CampaignStatistics, CampaignStatus};
use crate::config::DialerConfig;
use crate::error::{DialerError, Result};
use crate::monitoring::{DialerEvent, DialerEventKind, DialerEvents, PerformanceMetrics};
use crate::ratio::RatioAdjustment;
use crate::records::{RecordFilter, RecordPrioritizer};
use crate::store::{AgentPresence, DncList, RecordStore, StoreGateway};

use super::context::{CampaignContext, CampaignSlot};
use super::types::{Call, CallId, Disposition};

/// Campaign snapshot returned by [`DialerEngine::get_campaign_status`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignStatusReport {
    pub campaign: Campaign,
    pub statistics: CampaignStatistics,
    pub current_ratio: f64,
    pub queued_records: usize,
    pub eligible_records: usize,
    pub active_calls: usize,
}

/// Predictive dialer engine
pub struct DialerEngine {
    pub(super) config: DialerConfig,
    pub(super) gateway: StoreGateway,
    pub(super) events: Arc<DialerEvents>,
    pub(super) filter: RecordFilter,
    pub(super) prioritizer: RecordPrioritizer,
    pub(super) campaigns: DashMap<CampaignId, Arc<CampaignSlot>>,
    /// Owning campaign of every live or tombstoned call
    pub(super) call_index: DashMap<CallId, CampaignId>,
    /// The campaign currently active or paused
    pub(super) running: Mutex<Option<CampaignId>>,
}

impl DialerEngine {
    /// Create an engine over a store gateway
    pub fn new(config: DialerConfig, gateway: StoreGateway) -> Result<Self> {
        config.validate()?;
        info!("🚀 Creating DialerEngine");
        Ok(Self {
            events: Arc::new(DialerEvents::new(&config.events)),
            filter: RecordFilter::new(config.scoring.clone()),
            prioritizer: RecordPrioritizer::new(config.scoring.clone()),
            campaigns: DashMap::new(),
            call_index: DashMap::new(),
            running: Mutex::new(None),
            gateway,
            config,
        })
    }

    /// Create an engine over one store implementing every collaborator trait
    pub fn with_store<S>(config: DialerConfig, store: Arc<S>) -> Result<Self>
    where
        S: RecordStore + DncList + AgentPresence + 'static,
    {
        let gateway = StoreGateway::from_store(store, &config.database);
        Self::new(config, gateway)
    }

    pub fn config(&self) -> &DialerConfig {
        &self.config
    }

    pub fn events(&self) -> &Arc<DialerEvents> {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DialerEvent> {
        self.events.subscribe()
    }

    pub(super) fn slot(&self, campaign_id: &CampaignId) -> Result<Arc<CampaignSlot>> {
        self.campaigns
            .get(campaign_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| DialerError::not_found(format!("campaign {}", campaign_id)))
    }

    pub(super) fn slots(&self) -> Vec<Arc<CampaignSlot>> {
        self.campaigns.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Register a new campaign in `configuring`
    pub async fn create_campaign(
        &self,
        source_campaign_id: &str,
        agent_ids: Vec<String>,
        settings: CampaignSettings,
    ) -> Result<Campaign> {
        let source = source_campaign_id.trim();
        if source.is_empty() {
            return Err(DialerError::validation("source campaign id is required"));
        }
        let mut seen = HashSet::new();
        let agent_ids: Vec<String> = agent_ids
            .into_iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty() && seen.insert(a.clone()))
            .collect();
        if agent_ids.is_empty() {
            return Err(DialerError::validation("at least one agent id is required"));
        }
        settings.validate()?;

        let campaign = Campaign::new(source.to_string(), agent_ids, settings);
        let context = CampaignContext::new(campaign.clone(), self.config.ratio.clone());
        self.campaigns
            .insert(campaign.id.clone(), Arc::new(CampaignSlot::new(context)));

        info!(
            "📋 Created campaign {} for {} with {} agents",
            campaign.id,
            campaign.source_campaign_id,
            campaign.agent_ids.len()
        );
        Ok(campaign)
    }

    /// Load and queue records, then start dialing
    pub async fn start_campaign(&self, campaign_id: &CampaignId) -> Result<Campaign> {
        let slot = self.slot(campaign_id)?;
        let mut ctx = slot.state.lock().await;

        match ctx.campaign.status {
            CampaignStatus::Configuring => {}
            CampaignStatus::Active => {
                return Err(DialerError::conflict(format!("campaign {} is already active", campaign_id)))
            }
            other => {
                return Err(DialerError::conflict(format!(
                    "campaign {} cannot start from {}",
                    campaign_id, other
                )))
            }
        }
        self.claim_running(campaign_id)?;

        let now = Utc::now();
        let eligible = self.filter.intake(&self.gateway, &ctx.campaign, now).await;
        let ordered = self.prioritizer.order(eligible, &ctx.campaign.settings, now);
        let loaded = ctx.queue.extend_ordered(ordered);
        ctx.campaign.statistics.records_loaded += loaded as u64;

        if let Err(e) = ctx.campaign.transition(CampaignStatus::Active) {
            self.release_running(campaign_id);
            return Err(e);
        }

        let ratio = ctx.ratio.current_ratio();
        self.events.publish(
            campaign_id,
            DialerEventKind::CampaignStarted {
                records_loaded: loaded,
                ratio,
            },
        );
        info!(
            "▶️ Campaign {} started with {} queued records at ratio {:.2}",
            campaign_id, loaded, ratio
        );
        Ok(ctx.campaign.clone())
    }

    /// Halt launching; in-flight calls run to completion
    pub async fn pause_campaign(&self, campaign_id: &CampaignId) -> Result<Campaign> {
        let slot = self.slot(campaign_id)?;
        let mut ctx = slot.state.lock().await;
        if ctx.stopping {
            return Err(DialerError::conflict(format!("campaign {} is stopping", campaign_id)));
        }
        ctx.campaign.transition(CampaignStatus::Paused)?;
        self.events.publish(campaign_id, DialerEventKind::CampaignPaused);
        info!("⏸️ Campaign {} paused with {} calls in flight", campaign_id, ctx.calls.len());
        Ok(ctx.campaign.clone())
    }

    pub async fn resume_campaign(&self, campaign_id: &CampaignId) -> Result<Campaign> {
        let slot = self.slot(campaign_id)?;
        let mut ctx = slot.state.lock().await;
        if ctx.campaign.status != CampaignStatus::Paused || ctx.stopping {
            return Err(DialerError::conflict(format!(
                "campaign {} cannot resume from {}",
                campaign_id, ctx.campaign.status
            )));
        }
        ctx.campaign.transition(CampaignStatus::Active)?;
        self.events.publish(campaign_id, DialerEventKind::CampaignResumed);
        info!("▶️ Campaign {} resumed", campaign_id);
        Ok(ctx.campaign.clone())
    }

    /// Drain in-flight calls, persist final statistics and release the queue
    ///
    /// Waits up to the configured grace period for in-flight calls to
    /// complete, then force-completes the rest as `failed`.
    pub async fn stop_campaign(&self, campaign_id: &CampaignId) -> Result<Campaign> {
        let slot = self.slot(campaign_id)?;
        {
            let mut ctx = slot.state.lock().await;
            if ctx.stopping {
                return Err(DialerError::conflict(format!("campaign {} is already stopping", campaign_id)));
            }
            if !ctx.campaign.status.can_transition_to(CampaignStatus::Stopped) {
                return Err(DialerError::conflict(format!(
                    "campaign {} cannot stop from {}",
                    campaign_id, ctx.campaign.status
                )));
            }
            ctx.stopping = true;
            info!("🛑 Stopping campaign {}, draining {} calls", campaign_id, ctx.calls.len());
        }

        let grace = self.config.general.stop_grace_period();
        let mut in_flight = slot.in_flight.subscribe();
        // the watch guard must not outlive this statement
        let drained = tokio::time::timeout(grace, in_flight.wait_for(|n| *n == 0))
            .await
            .is_ok();
        if !drained {
            warn!("Campaign {} did not drain within {:?}", campaign_id, grace);
        }

        let mut ctx = slot.state.lock().await;
        let now = Utc::now();
        let leftover: Vec<CallId> = ctx.calls.keys().cloned().collect();
        for call_id in &leftover {
            let duration = ctx
                .calls
                .get(call_id)
                .map(|c| (now - c.initiated_at).num_seconds().max(0) as u64)
                .unwrap_or(0);
            self.finish_call(&slot, &mut ctx, call_id, duration, Disposition::Failed, &Default::default())
                .await;
        }
        if !leftover.is_empty() {
            warn!("⚠️ Force-completed {} calls of campaign {} as failed", leftover.len(), campaign_id);
        }

        let released = ctx.queue.drain_all().len();
        debug!("Released {} queued records of campaign {}", released, campaign_id);
        ctx.campaign.transition(CampaignStatus::Stopped)?;
        ctx.stopping = false;
        self.persist_statistics(&ctx.campaign).await;
        self.release_running(campaign_id);

        self.events.publish(
            campaign_id,
            DialerEventKind::CampaignStopped {
                statistics: ctx.campaign.statistics.clone(),
                forced_calls: leftover.len(),
            },
        );
        info!("✅ Campaign {} stopped", campaign_id);
        Ok(ctx.campaign.clone())
    }

    pub async fn get_campaign_status(&self, campaign_id: &CampaignId) -> Result<CampaignStatusReport> {
        let slot = self.slot(campaign_id)?;
        let ctx = slot.state.lock().await;
        Ok(CampaignStatusReport {
            campaign: ctx.campaign.clone(),
            statistics: ctx.campaign.statistics.clone(),
            current_ratio: ctx.ratio.current_ratio(),
            queued_records: ctx.queue.len(),
            eligible_records: ctx.queue.eligible_len(&ctx.campaign.settings, Utc::now()),
            active_calls: ctx.calls.len(),
        })
    }

    /// Performance metrics over every campaign of this engine
    ///
    /// Agent utilization counts the agents of running campaigns only.
    pub async fn get_performance_metrics(&self) -> PerformanceMetrics {
        let mut statistics = CampaignStatistics::default();
        let mut agents = HashSet::new();
        let mut busy = HashSet::new();
        for slot in self.slots() {
            let ctx = slot.state.lock().await;
            statistics.merge(&ctx.campaign.statistics);
            if ctx.campaign.status.is_running() {
                agents.extend(ctx.campaign.agent_ids.iter().cloned());
                busy.extend(ctx.busy_agents());
            }
        }
        PerformanceMetrics::compute(&statistics, busy.len(), agents.len())
    }

    pub async fn get_campaign_metrics(&self, campaign_id: &CampaignId) -> Result<PerformanceMetrics> {
        let slot = self.slot(campaign_id)?;
        let ctx = slot.state.lock().await;
        Ok(PerformanceMetrics::compute(
            &ctx.campaign.statistics,
            ctx.busy_agents().len(),
            ctx.campaign.agent_ids.len(),
        ))
    }

    pub async fn list_campaigns(&self) -> Vec<Campaign> {
        let mut campaigns = Vec::new();
        for slot in self.slots() {
            campaigns.push(slot.state.lock().await.campaign.clone());
        }
        campaigns.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        campaigns
    }

    /// Snapshot of the non-terminal calls of a campaign
    pub async fn active_calls(&self, campaign_id: &CampaignId) -> Result<Vec<Call>> {
        let slot = self.slot(campaign_id)?;
        let ctx = slot.state.lock().await;
        let mut calls: Vec<Call> = ctx.calls.values().cloned().collect();
        calls.sort_by(|a, b| a.initiated_at.cmp(&b.initiated_at));
        Ok(calls)
    }

    /// Re-run intake, queueing only records not already queued, in flight or finalized
    pub async fn refresh_records(&self, campaign_id: &CampaignId) -> Result<usize> {
        let slot = self.slot(campaign_id)?;
        let mut ctx = slot.state.lock().await;
        if !ctx.campaign.status.is_running() || ctx.stopping {
            return Err(DialerError::conflict(format!(
                "campaign {} is not running ({})",
                campaign_id, ctx.campaign.status
            )));
        }

        let now = Utc::now();
        let eligible = self.filter.intake(&self.gateway, &ctx.campaign, now).await;
        let fresh: Vec<_> = eligible
            .into_iter()
            .filter(|r| !ctx.queue.contains(&r.id) && !ctx.has_call_for(&r.id) && !ctx.finalized.contains(&r.id))
            .collect();
        let ordered = self.prioritizer.order(fresh, &ctx.campaign.settings, now);
        let added = ctx.queue.extend_ordered(ordered);
        ctx.campaign.statistics.records_loaded += added as u64;

        info!("🔄 Campaign {} refreshed, {} new records queued", campaign_id, added);
        Ok(added)
    }

    /// Run one ratio controller tick for every active campaign
    ///
    /// Paused campaigns keep their ratio.
    pub async fn optimize_ratio(&self) -> Vec<(CampaignId, RatioAdjustment)> {
        let mut adjustments = Vec::new();
        for slot in self.slots() {
            let mut ctx = slot.state.lock().await;
            if !ctx.is_dialing() {
                continue;
            }
            if let Some(adj) = ctx.ratio.tick(Utc::now()) {
                let campaign_id = ctx.campaign.id.clone();
                info!(
                    "📈 Campaign {} ratio {:.2} -> {:.2} (optimal {:.2}, answer rate {:.2})",
                    campaign_id, adj.previous, adj.current, adj.optimal, adj.observation.answer_rate
                );
                self.events.publish(
                    &campaign_id,
                    DialerEventKind::RatioOptimized {
                        previous: adj.previous,
                        current: adj.current,
                        optimal: adj.optimal,
                        answer_rate: adj.observation.answer_rate,
                        abandonment_rate: adj.observation.abandonment_rate,
                    },
                );
                adjustments.push((campaign_id, adj));
            }
        }
        adjustments
    }

    /// Complete an active campaign whose queue and calls are both empty
    pub(super) async fn complete_if_drained(&self, ctx: &mut CampaignContext) -> bool {
        if ctx.campaign.status != CampaignStatus::Active || ctx.stopping || !ctx.is_drained() {
            return false;
        }
        if let Err(e) = ctx.campaign.transition(CampaignStatus::Completed) {
            warn!("Campaign {} could not complete: {}", ctx.campaign.id, e);
            return false;
        }
        let campaign_id = ctx.campaign.id.clone();
        self.persist_statistics(&ctx.campaign).await;
        self.release_running(&campaign_id);
        self.events.publish(
            &campaign_id,
            DialerEventKind::CampaignCompleted {
                statistics: ctx.campaign.statistics.clone(),
            },
        );
        info!(
            "🏁 Campaign {} completed after {} calls",
            campaign_id, ctx.campaign.statistics.total_calls
        );
        true
    }

    pub(super) async fn persist_statistics(&self, campaign: &Campaign) {
        if let Err(e) = self
            .gateway
            .save_campaign_statistics(&campaign.id, &campaign.statistics)
            .await
        {
            warn!("Failed to persist statistics of campaign {}: {}", campaign.id, e);
        }
    }

    fn claim_running(&self, campaign_id: &CampaignId) -> Result<()> {
        let mut running = self.running.lock();
        match running.as_ref() {
            Some(other) if other != campaign_id => Err(DialerError::conflict(format!(
                "campaign {} is already running on this engine",
                other
            ))),
            _ => {
                *running = Some(campaign_id.clone());
                Ok(())
            }
        }
    }

    fn release_running(&self, campaign_id: &CampaignId) {
        let mut running = self.running.lock();
        if running.as_ref() == Some(campaign_id) {
            *running = None;
        }
    }

    /// The campaign currently active or paused, if any
    pub fn running_campaign(&self) -> Option<CampaignId> {
        self.running.lock().clone()
    }

    /// Per-campaign statistics snapshot
    pub async fn statistics(&self) -> HashMap<CampaignId, CampaignStatistics> {
        let mut out = HashMap::new();
        for slot in self.slots() {
            let ctx = slot.state.lock().await;
            out.insert(ctx.campaign.id.clone(), ctx.campaign.statistics.clone());
        }
        out
    }
}

impl std::fmt::Debug for DialerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialerEngine")
            .field("campaigns", &self.campaigns.len())
            .field("running", &self.running_campaign())
            .finish()
    }
}

/// Builder for [`DialerEngine`]
#[derive(Default)]
pub struct DialerEngineBuilder {
    config: Option<DialerConfig>,
    gateway: Option<StoreGateway>,
}

impl DialerEngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: DialerConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_gateway(mut self, gateway: StoreGateway) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Use one store for records, DNC and presence
    ///
    /// The gateway takes its timeout and retry policy from the configuration
    /// present at this call; set the configuration first.
    pub fn with_store<S>(mut self, store: Arc<S>) -> Self
    where
        S: RecordStore + DncList + AgentPresence + 'static,
    {
        let database = self.config.clone().unwrap_or_default().database;
        self.gateway = Some(StoreGateway::from_store(store, &database));
        self
    }

    pub fn build(self) -> Result<DialerEngine> {
        let gateway = self
            .gateway
            .ok_or_else(|| DialerError::configuration("no store configured"))?;
        DialerEngine::new(self.config.unwrap_or_default(), gateway)
    }
}
