//! Queue processor
//!
//! Each tick launches
//!
//! ```text
//! min(floor(available_agents * ratio) - in_flight, eligible_queue_len, launch_ceiling)
//! ```
//!
//! new calls per active campaign, popping the dial queue head and binding
//! each call to an agent round-robin. The launch ceiling is shared by all
//! campaigns of the tick. Since `ratio <= max_ratio`, non-terminal calls never
//! exceed `available_agents * max_ratio` right after a tick.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::campaign::CampaignId;
use crate::error::{DialerError, Result};
use crate::monitoring::DialerEventKind;
use crate::store::AgentView;

use super::context::{CampaignContext, CampaignSlot};
use super::core::DialerEngine;
use super::types::{Assignment, Call};

/// Number of calls a tick may launch
pub fn launch_count(
    available_agents: usize,
    ratio: f64,
    in_flight: usize,
    eligible_queued: usize,
    ceiling: usize,
) -> usize {
    let target = (available_agents as f64 * ratio).floor() as usize;
    target.saturating_sub(in_flight).min(eligible_queued).min(ceiling)
}

impl DialerEngine {
    /// Run one queue processor tick over every active campaign
    ///
    /// A failing campaign is logged and skipped. Returns the number of calls
    /// launched.
    pub async fn process_tick(&self) -> usize {
        let mut remaining = self.config.general.launch_ceiling_per_tick();
        let mut launched = 0;
        for slot in self.slots() {
            match self.tick_slot(&slot, remaining).await {
                Ok(n) => {
                    launched += n;
                    remaining = remaining.saturating_sub(n);
                }
                Err(e) => error!("Queue tick failed: {}", e),
            }
        }
        launched
    }

    /// Run one queue processor tick for a single campaign
    pub async fn tick_campaign(&self, campaign_id: &CampaignId) -> Result<usize> {
        let slot = self.slot(campaign_id)?;
        self.tick_slot(&slot, self.config.general.launch_ceiling_per_tick())
            .await
    }

    async fn tick_slot(&self, slot: &Arc<CampaignSlot>, ceiling: usize) -> Result<usize> {
        let mut ctx = slot.state.lock().await;
        if !ctx.is_dialing() {
            return Ok(0);
        }
        if self.complete_if_drained(&mut ctx).await {
            return Ok(0);
        }

        let now = Utc::now();
        let eligible = ctx.queue.eligible_len(&ctx.campaign.settings, now);
        if eligible == 0 {
            debug!("Campaign {} has no eligible records this tick", ctx.campaign.id);
            return Ok(0);
        }

        let agents = self.campaign_agents(&ctx).await?;
        let ratio = ctx.ratio.current_ratio();
        let count = launch_count(agents.len(), ratio, ctx.calls.len(), eligible, ceiling);
        debug!(
            "Campaign {} tick: {} agents x {:.2} with {} in flight, {} eligible -> launching {}",
            ctx.campaign.id,
            agents.len(),
            ratio,
            ctx.calls.len(),
            eligible,
            count
        );

        let mut launched = 0;
        for _ in 0..count {
            match self.launch_next(slot, &mut ctx, &agents, now, None, HashMap::new()) {
                Ok(_) => launched += 1,
                Err(e) => {
                    debug!("Campaign {} stops launching this tick: {}", ctx.campaign.id, e);
                    break;
                }
            }
        }
        if launched > 0 {
            info!("📞 Campaign {} launched {} calls", ctx.campaign.id, launched);
        }
        Ok(launched)
    }

    /// Launch the next eligible queued record outside the tick
    ///
    /// Fails with `QueueEmpty` when no queued record is eligible, and with
    /// `NoAgentsAvailable` when no agent of the campaign is available; the
    /// record then stays at the head of the queue.
    pub async fn assign_call_to_agent(
        &self,
        campaign_id: &CampaignId,
        priority: u8,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<Assignment> {
        let slot = self.slot(campaign_id)?;
        let mut ctx = slot.state.lock().await;
        if !ctx.is_dialing() {
            return Err(DialerError::conflict(format!(
                "campaign {} is not dialing ({})",
                campaign_id, ctx.campaign.status
            )));
        }

        let now = Utc::now();
        if ctx.queue.eligible_len(&ctx.campaign.settings, now) == 0 {
            return Err(DialerError::queue_empty(format!(
                "campaign {} has no eligible records",
                campaign_id
            )));
        }
        let agents = self.campaign_agents(&ctx).await?;
        self.launch_next(&slot, &mut ctx, &agents, now, Some(priority), metadata)
    }

    /// Available agents staffing the campaign
    async fn campaign_agents(&self, ctx: &CampaignContext) -> Result<Vec<AgentView>> {
        let agents = self.gateway.list_available_agents().await?;
        Ok(agents
            .into_iter()
            .filter(|a| a.available && ctx.campaign.has_agent(&a.agent_id))
            .collect())
    }

    /// Pop the next eligible record, create its call and assign an agent
    fn launch_next(
        &self,
        slot: &CampaignSlot,
        ctx: &mut CampaignContext,
        agents: &[AgentView],
        now: DateTime<Utc>,
        requested_priority: Option<u8>,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<Assignment> {
        let campaign_id = ctx.campaign.id.clone();
        let entry = ctx
            .queue
            .pop_next_eligible(&ctx.campaign.settings, now)
            .ok_or_else(|| DialerError::queue_empty(format!("campaign {} has no eligible records", campaign_id)))?;

        if ctx.has_call_for(&entry.record.id) {
            warn!("Record {} already has a call in flight, leaving it queued", entry.record.id);
            let record_id = entry.record.id.clone();
            ctx.queue.insert(entry);
            return Err(DialerError::internal(format!("record {} already in flight", record_id)));
        }

        let mut call = Call::dialing(campaign_id.clone(), entry.record.clone(), entry.priority);
        call.requested_priority = requested_priority;
        call.metadata = metadata;

        let assignment = match ctx.assigner.assign(&mut call, agents, now) {
            Some(assignment) => assignment,
            None => {
                // not an attempt; retried next tick
                ctx.queue.push_front(entry);
                return Err(DialerError::no_agents_available(format!(
                    "no agent of campaign {} is available",
                    campaign_id
                )));
            }
        };

        self.call_index.insert(call.call_id.clone(), campaign_id.clone());
        ctx.calls.insert(call.call_id.clone(), call);
        slot.in_flight.send_replace(ctx.calls.len());

        self.events.publish(
            &campaign_id,
            DialerEventKind::CallAssigned {
                call_id: assignment.call_id.clone(),
                record_id: assignment.record_id.clone(),
                agent_id: assignment.agent_id.clone(),
                phone_number: assignment.phone_number.clone(),
                amd_enabled: ctx.campaign.settings.amd_enabled,
            },
        );
        Ok(assignment)
    }
}
