//! Call lifecycle and outcome handling
//!
//! ```text
//! dialing ─► assigned ─┬─► ringing ─┬─► talking ─► completed (answered)
//!                      │            │
//!                      └────────────┴─► completed (no_answer / busy / fax / amd / failed)
//! ```
//!
//! A completed call updates campaign statistics and feeds the ratio
//! controller, then routes its record:
//!
//! - `answered`: terminal `contacted`, or re-enqueued at the requested
//!   callback time
//! - `no_answer` / `busy` / `fax` / `failed`: `retry_count` + 1; re-enqueued
//!   after backoff while `retry_count < max_retry_attempts`, otherwise
//!   terminal `no_contact`
//! - `amd`: terminal `answering_machine`, unless `retry_on_amd` is set and
//!   retries remain
//!
//! Store writes during outcome handling are best effort: a failure is logged
//! and the in-memory statistics still update.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::campaign::{CampaignId, CampaignSettings};
use crate::error::{DialerError, Result};
use crate::monitoring::DialerEventKind;
use crate::ratio::SampleKind;
use crate::records::{ContactRecord, FinalResult};

use super::context::{CampaignContext, CampaignSlot};
use super::core::DialerEngine;
use super::types::{Call, CallId, CallOutcome, CallRecord, CallStatus, Disposition};

/// Result of one cleanup sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    /// Calls force-completed for exceeding the maximum call duration
    pub timed_out_calls: usize,
    pub tombstones_pruned: usize,
    pub ratio_samples_pruned: usize,
}

/// Delay before the next attempt after `retry_count` failed attempts
///
/// `base * 2^(retry_count - 1)`, capped at the campaign maximum.
pub fn retry_backoff(settings: &CampaignSettings, retry_count: u32) -> Duration {
    let exponent = retry_count.saturating_sub(1).min(20);
    let secs = settings
        .retry_backoff_base_secs
        .saturating_mul(1u64 << exponent)
        .min(settings.retry_backoff_max_secs);
    Duration::seconds(secs as i64)
}

impl DialerEngine {
    /// Telephony progress: the callee's phone is ringing
    pub async fn report_call_ringing(&self, call_id: &CallId) -> Result<()> {
        self.advance_call(call_id, CallStatus::Ringing).await
    }

    /// Telephony progress: the callee picked up
    pub async fn report_call_answered(&self, call_id: &CallId) -> Result<()> {
        self.advance_call(call_id, CallStatus::Talking).await
    }

    async fn advance_call(&self, call_id: &CallId, next: CallStatus) -> Result<()> {
        let slot = self.slot_for_call(call_id)?;
        let mut ctx = slot.state.lock().await;
        if ctx.completed.contains_key(call_id) {
            debug!("Ignoring {} report for completed call {}", next, call_id);
            return Ok(());
        }
        let call = ctx
            .calls
            .get_mut(call_id)
            .ok_or_else(|| DialerError::not_found(format!("call {}", call_id)))?;

        let allowed = match (call.status, next) {
            (current, next) if current == next => return Ok(()),
            (CallStatus::Assigned, CallStatus::Ringing) => true,
            (CallStatus::Assigned | CallStatus::Ringing, CallStatus::Talking) => true,
            _ => false,
        };
        if !allowed {
            return Err(DialerError::conflict(format!(
                "call {} cannot go from {} to {}",
                call_id, call.status, next
            )));
        }
        if next == CallStatus::Talking {
            call.answered_at = Some(Utc::now());
        }
        call.status = next;
        debug!("Call {} is {}", call_id, next);
        Ok(())
    }

    /// Report the outcome of a call
    ///
    /// Idempotent: repeating the report for a completed call returns the
    /// completed call and changes nothing.
    pub async fn complete_call(
        &self,
        call_id: &CallId,
        agent_id: &str,
        duration_secs: u64,
        disposition: Disposition,
        outcome: CallOutcome,
    ) -> Result<Call> {
        let slot = self.slot_for_call(call_id)?;
        let mut ctx = slot.state.lock().await;

        if let Some(done) = ctx.completed.get(call_id) {
            debug!("Duplicate completion of call {} ignored", call_id);
            return Ok(done.clone());
        }
        let call = ctx
            .calls
            .get(call_id)
            .ok_or_else(|| DialerError::not_found(format!("call {}", call_id)))?;
        if let Some(assigned) = &call.agent_id {
            if assigned != agent_id {
                return Err(DialerError::validation(format!(
                    "call {} is assigned to {}, not {}",
                    call_id, assigned, agent_id
                )));
            }
        }
        if disposition == Disposition::AnsweringMachine && !ctx.campaign.settings.amd_enabled {
            return Err(DialerError::validation(format!(
                "call {} reported an answering machine but detection is disabled for campaign {}",
                call_id, ctx.campaign.id
            )));
        }

        let completed = self
            .finish_call(&slot, &mut ctx, call_id, duration_secs, disposition, &outcome)
            .await
            .ok_or_else(|| DialerError::internal(format!("call {} vanished", call_id)))?;
        self.complete_if_drained(&mut ctx).await;
        Ok(completed)
    }

    /// Periodic sweep: overdue calls, stale tombstones, old ratio samples
    pub async fn cleanup_sweep(&self) -> CleanupReport {
        let mut report = CleanupReport::default();
        let retention = Duration::seconds(self.config.general.completed_call_retention_secs as i64);

        for slot in self.slots() {
            let mut ctx = slot.state.lock().await;
            let now = Utc::now();

            for call_id in ctx.overdue_calls(now) {
                let duration = ctx
                    .calls
                    .get(&call_id)
                    .map(|c| (now - c.initiated_at).num_seconds().max(0) as u64)
                    .unwrap_or(0);
                warn!("⏱️ Call {} exceeded the maximum duration, failing it", call_id);
                let outcome = CallOutcome::new().with_notes("exceeded maximum call duration");
                if self
                    .finish_call(&slot, &mut ctx, &call_id, duration, Disposition::Failed, &outcome)
                    .await
                    .is_some()
                {
                    report.timed_out_calls += 1;
                }
            }

            for call_id in ctx.prune_completed(now, retention) {
                self.call_index.remove(&call_id);
                report.tombstones_pruned += 1;
            }
            report.ratio_samples_pruned += ctx.ratio.prune(now);
            self.complete_if_drained(&mut ctx).await;
        }

        if report != CleanupReport::default() {
            debug!("Cleanup sweep: {:?}", report);
        }
        report
    }

    pub(super) fn slot_for_call(&self, call_id: &CallId) -> Result<Arc<CampaignSlot>> {
        let campaign_id: CampaignId = self
            .call_index
            .get(call_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| DialerError::not_found(format!("call {}", call_id)))?;
        self.slot(&campaign_id)
    }

    /// Move a non-terminal call to `completed` and route its outcome
    ///
    /// Returns the completed call, or `None` if it was not in flight.
    pub(super) async fn finish_call(
        &self,
        slot: &CampaignSlot,
        ctx: &mut CampaignContext,
        call_id: &CallId,
        duration_secs: u64,
        disposition: Disposition,
        outcome: &CallOutcome,
    ) -> Option<Call> {
        let mut call = ctx.calls.remove(call_id)?;
        slot.in_flight.send_replace(ctx.calls.len());

        let now = Utc::now();
        call.status = CallStatus::Completed;
        call.completed_at = Some(now);
        call.duration_secs = Some(duration_secs);
        call.disposition = Some(disposition);
        call.metadata
            .extend(outcome.metadata.iter().map(|(k, v)| (k.clone(), v.clone())));

        let talk_time = if disposition == Disposition::Answered {
            duration_secs
        } else {
            0
        };
        self.persist_call_record(&call, talk_time, outcome, now).await;
        self.route_outcome(ctx, &call, talk_time, disposition, outcome, now)
            .await;

        self.events.publish(
            &call.campaign_id,
            DialerEventKind::CallCompleted {
                call_id: call.call_id.clone(),
                record_id: call.record.id.clone(),
                agent_id: call.agent_id.clone(),
                disposition,
                talk_time_secs: talk_time,
            },
        );
        debug!("Call {} completed as {}", call_id, disposition);

        ctx.completed.insert(call.call_id.clone(), call.clone());
        Some(call)
    }

    async fn persist_call_record(&self, call: &Call, talk_time: u64, outcome: &CallOutcome, now: DateTime<Utc>) {
        let record = CallRecord {
            call_id: call.call_id.clone(),
            campaign_id: call.campaign_id.clone(),
            record_id: call.record.id.clone(),
            agent_id: call.agent_id.clone(),
            phone_number: call.record.phone_number.clone(),
            disposition: call.disposition.unwrap_or(Disposition::Failed),
            attempt: call.record.retry_count + 1,
            initiated_at: call.initiated_at,
            answered_at: call.answered_at,
            completed_at: now,
            talk_time_secs: talk_time,
            notes: outcome.notes.clone(),
            metadata: call.metadata.clone(),
        };
        if let Err(e) = self.gateway.save_call_record(&record).await {
            warn!("Failed to persist call record {}: {}", call.call_id, e);
        }
    }

    /// Update statistics and the ratio controller, then retry, reschedule or finalize
    async fn route_outcome(
        &self,
        ctx: &mut CampaignContext,
        call: &Call,
        talk_time: u64,
        disposition: Disposition,
        outcome: &CallOutcome,
        now: DateTime<Utc>,
    ) {
        let mut record = call.record.clone();
        record.last_attempt_at = Some(now);

        let stats = &mut ctx.campaign.statistics;
        stats.total_calls += 1;
        let sample = match disposition {
            Disposition::Answered => {
                stats.answered_calls += 1;
                stats.total_talk_time_secs += talk_time;
                let answered_at = call.answered_at.unwrap_or(now);
                stats.total_wait_time_ms += (answered_at - call.initiated_at).num_milliseconds().max(0) as u64;
                SampleKind::Answered
            }
            Disposition::NoAnswer | Disposition::Busy | Disposition::Fax => {
                stats.abandoned_calls += 1;
                SampleKind::Abandoned
            }
            Disposition::AnsweringMachine => {
                stats.amd_calls += 1;
                if let Some(correct) = outcome.amd_verified {
                    stats.amd_verified += 1;
                    if correct {
                        stats.amd_verified_correct += 1;
                    }
                }
                SampleKind::Amd
            }
            Disposition::Failed => {
                stats.failed_calls += 1;
                SampleKind::Failed
            }
        };
        ctx.ratio.record_outcome(sample, talk_time as f64, now);

        match disposition {
            Disposition::Answered => match outcome.callback_at {
                Some(callback_at) => self.schedule_callback(ctx, call, record, callback_at, now).await,
                None => self.finalize(ctx, &record, FinalResult::Contacted, now).await,
            },
            Disposition::AnsweringMachine if !ctx.campaign.settings.retry_on_amd => {
                self.finalize(ctx, &record, FinalResult::AnsweringMachine, now).await
            }
            Disposition::AnsweringMachine => {
                record.retry_count += 1;
                self.retry_or_finalize(ctx, record, FinalResult::AnsweringMachine, now)
                    .await
            }
            Disposition::NoAnswer | Disposition::Busy | Disposition::Fax | Disposition::Failed => {
                record.retry_count += 1;
                self.retry_or_finalize(ctx, record, FinalResult::NoContact, now).await
            }
        }
    }

    async fn retry_or_finalize(
        &self,
        ctx: &mut CampaignContext,
        mut record: ContactRecord,
        exhausted: FinalResult,
        now: DateTime<Utc>,
    ) {
        let max = ctx.campaign.settings.max_retry_attempts;
        if record.retry_count >= max {
            info!(
                "Record {} exhausted {} attempts, finalizing as {}",
                record.id,
                max,
                exhausted.as_str()
            );
            self.finalize(ctx, &record, exhausted, now).await;
            return;
        }

        let delay = retry_backoff(&ctx.campaign.settings, record.retry_count);
        record.next_eligible_at = Some(now + delay);
        ctx.campaign.statistics.retries_scheduled += 1;
        debug!(
            "Record {} retry {}/{} in {}s",
            record.id,
            record.retry_count,
            max,
            delay.num_seconds()
        );
        self.requeue(ctx, record, now);
    }

    async fn schedule_callback(
        &self,
        ctx: &mut CampaignContext,
        call: &Call,
        mut record: ContactRecord,
        callback_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) {
        record.next_eligible_at = Some(callback_at);
        ctx.campaign.statistics.callbacks_scheduled += 1;
        if let Err(e) = self.gateway.schedule_callback(&record.id, callback_at).await {
            warn!("Failed to persist callback for record {}: {}", record.id, e);
        }
        self.events.publish(
            &call.campaign_id,
            DialerEventKind::CallbackScheduled {
                call_id: call.call_id.clone(),
                record_id: record.id.clone(),
                callback_at,
            },
        );
        info!("📅 Callback for record {} scheduled at {}", record.id, callback_at);
        self.requeue(ctx, record, now);
    }

    /// Re-enter the dial queue at the record's priority position
    fn requeue(&self, ctx: &mut CampaignContext, record: ContactRecord, now: DateTime<Utc>) {
        if ctx.stopping || ctx.campaign.status.is_terminal() {
            debug!("Campaign {} is winding down, not re-queuing {}", ctx.campaign.id, record.id);
            return;
        }
        let entry = self.prioritizer.entry(record, &ctx.campaign.settings, now);
        ctx.queue.insert(entry);
    }

    /// Write a terminal disposition once per record
    async fn finalize(&self, ctx: &mut CampaignContext, record: &ContactRecord, result: FinalResult, now: DateTime<Utc>) {
        if !ctx.finalized.insert(record.id.clone()) {
            debug!("Record {} already finalized", record.id);
            return;
        }
        ctx.campaign.statistics.records_finalized += 1;
        match self.gateway.mark_final_disposition(&record.id, result, now).await {
            Ok(true) => debug!("Record {} finalized as {}", record.id, result.as_str()),
            Ok(false) => debug!("Store already held a terminal result for record {}", record.id),
            Err(e) => warn!(
                "Failed to persist final disposition {} for record {}: {}",
                result.as_str(),
                record.id,
                e
            ),
        }
    }
}
