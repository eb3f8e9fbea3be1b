//! # Record Filter & Scorer
//!
//! Decides which contact records may enter the dial queue and gives each
//! survivor an initial lead score. A record survives when it is
//!
//! 1. not on the Do-Not-Contact list,
//! 2. inside the campaign's calling window in the callee's local time,
//! 3. not attempted within the campaign cool-down,
//! 4. structurally valid (non-empty phone number and name) and not finalized.
//!
//! The score is the sum of three bounded contributions (recent interaction,
//! recent sale, customer tier bonus) clipped to `ScoringConfig::max_score`.

use std::collections::HashSet;

use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, Utc};
use tracing::{debug, info, warn};

use crate::campaign::{Campaign, CampaignSettings};
use crate::config::ScoringConfig;
use crate::store::StoreGateway;

use super::types::{ContactRecord, CustomerTier};

/// Per-reason exclusion counts of one filter pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterReport {
    pub accepted: usize,
    pub invalid: usize,
    pub finalized: usize,
    pub do_not_contact: usize,
    pub outside_calling_hours: usize,
    pub cooling_down: usize,
}

/// Eligibility filter and lead scorer
#[derive(Debug, Clone)]
pub struct RecordFilter {
    scoring: ScoringConfig,
}

impl RecordFilter {
    pub fn new(scoring: ScoringConfig) -> Self {
        Self { scoring }
    }

    /// Filter and score `records` as of `now`
    ///
    /// Survivors keep their input order and get `score` and `processed_at`
    /// set. Nothing else is touched.
    pub fn filter(
        &self,
        records: Vec<ContactRecord>,
        dnc: &HashSet<String>,
        settings: &CampaignSettings,
        now: DateTime<Utc>,
    ) -> (Vec<ContactRecord>, FilterReport) {
        let mut report = FilterReport::default();
        let cooldown = Duration::seconds(settings.cooldown_secs as i64);

        let eligible: Vec<ContactRecord> = records
            .into_iter()
            .filter_map(|mut record| {
                if record.phone_number.trim().is_empty() || record.name.trim().is_empty() {
                    report.invalid += 1;
                    return None;
                }
                if record.final_result.is_some() {
                    report.finalized += 1;
                    return None;
                }
                if dnc.contains(&record.normalized_phone()) {
                    report.do_not_contact += 1;
                    return None;
                }
                if !settings.calling_hours.allows(local_time(&record, settings, now)) {
                    report.outside_calling_hours += 1;
                    return None;
                }
                if let Some(last) = record.last_attempt_at {
                    if now - last < cooldown {
                        report.cooling_down += 1;
                        return None;
                    }
                }

                record.score = self.score(&record, now);
                record.processed_at = Some(now);
                Some(record)
            })
            .collect();

        report.accepted = eligible.len();
        (eligible, report)
    }

    /// Initial lead score of a record
    pub fn score(&self, record: &ContactRecord, now: DateTime<Utc>) -> f64 {
        let s = &self.scoring;
        let interaction = decayed(
            record.last_interaction_at,
            now,
            s.interaction_max_points,
            s.interaction_decay_days,
        );
        let sale = decayed(record.last_sale_at, now, s.sale_max_points, s.sale_decay_days);
        let tier = match record.customer_tier {
            CustomerTier::Standard => 0.0,
            CustomerTier::Silver => s.silver_bonus,
            CustomerTier::Gold => s.gold_bonus,
            CustomerTier::Platinum => s.platinum_bonus,
        };
        (interaction + sale + tier).clamp(0.0, s.max_score)
    }

    /// Fetch, filter and score the records of `campaign`
    ///
    /// Any storage failure while listing records or reading the DNC list
    /// yields an empty result: nothing is eligible right now.
    pub async fn intake(
        &self,
        gateway: &StoreGateway,
        campaign: &Campaign,
        now: DateTime<Utc>,
    ) -> Vec<ContactRecord> {
        let records = match gateway.list_eligible_records(&campaign.source_campaign_id).await {
            Ok(records) => records,
            Err(e) => {
                warn!("Record intake for campaign {} failed listing records: {}", campaign.id, e);
                return Vec::new();
            }
        };
        let dnc = match gateway.list_dnc(&campaign.source_campaign_id).await {
            Ok(dnc) => dnc,
            Err(e) => {
                warn!("Record intake for campaign {} failed reading DNC list: {}", campaign.id, e);
                return Vec::new();
            }
        };

        let fetched = records.len();
        let (eligible, report) = self.filter(records, &dnc, &campaign.settings, now);
        info!(
            "📥 Campaign {}: {} of {} records eligible",
            campaign.id, report.accepted, fetched
        );
        debug!("Filter report for campaign {}: {:?}", campaign.id, report);
        eligible
    }
}

/// Local wall-clock time of the callee
pub fn local_time(record: &ContactRecord, settings: &CampaignSettings, now: DateTime<Utc>) -> NaiveDateTime {
    let minutes = record.utc_offset_minutes.unwrap_or(settings.utc_offset_minutes);
    match FixedOffset::east_opt(minutes * 60) {
        Some(offset) => now.with_timezone(&offset).naive_local(),
        None => now.naive_utc(),
    }
}

/// Linear decay from `max_points` at `now` to zero after `decay_days`
fn decayed(at: Option<DateTime<Utc>>, now: DateTime<Utc>, max_points: f64, decay_days: f64) -> f64 {
    match at {
        Some(at) => {
            let days = (now - at).num_seconds().max(0) as f64 / 86_400.0;
            (max_points * (1.0 - days / decay_days)).max(0.0)
        }
        None => 0.0,
    }
}
