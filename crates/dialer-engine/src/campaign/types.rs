//! Campaign data model: identity, lifecycle status, per-campaign settings and
//! running statistics.

use std::fmt;

use chrono::{DateTime, Datelike, NaiveDateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DialerError, Result};

/// Dialing campaign identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CampaignId(pub String);

impl CampaignId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for CampaignId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CampaignId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Campaign lifecycle status
///
/// ```text
/// configuring ──start──► active ──pause──► paused
///                          ▲ │  ◄──resume──  │
///                          │ │               │
///                 completed◄─┘──stop──► stopped ◄──stop──┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Configuring,
    Active,
    Paused,
    Stopped,
    Completed,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Configuring => "configuring",
            CampaignStatus::Active => "active",
            CampaignStatus::Paused => "paused",
            CampaignStatus::Stopped => "stopped",
            CampaignStatus::Completed => "completed",
        }
    }

    /// Whether `next` is reachable from this status in one transition
    pub fn can_transition_to(&self, next: CampaignStatus) -> bool {
        use CampaignStatus::*;
        matches!(
            (self, next),
            (Configuring, Active)
                | (Active, Paused)
                | (Paused, Active)
                | (Active, Stopped)
                | (Paused, Stopped)
                | (Active, Completed)
        )
    }

    /// Terminal campaigns never dial again
    pub fn is_terminal(&self) -> bool {
        matches!(self, CampaignStatus::Stopped | CampaignStatus::Completed)
    }

    /// Active or paused campaigns hold the engine's dial context
    pub fn is_running(&self) -> bool {
        matches!(self, CampaignStatus::Active | CampaignStatus::Paused)
    }
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A daily time-of-day window
///
/// `start` is inclusive and `end` exclusive. A window with `start > end`
/// wraps past midnight; `start == end` covers the whole day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl HourWindow {
    /// Window from `start_hour:00` to `end_hour:00`
    pub fn hours(start_hour: u32, end_hour: u32) -> Self {
        let at = |h: u32| NaiveTime::from_hms_opt(h % 24, 0, 0).unwrap_or(NaiveTime::MIN);
        Self {
            start: at(start_hour),
            end: at(end_hour),
        }
    }

    pub fn all_day() -> Self {
        Self {
            start: NaiveTime::MIN,
            end: NaiveTime::MIN,
        }
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.start == self.end {
            true
        } else if self.start < self.end {
            time >= self.start && time < self.end
        } else {
            time >= self.start || time < self.end
        }
    }
}

/// Permitted calling window, evaluated in the callee's local time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallingHours {
    /// Monday to Friday window
    pub weekday: HourWindow,
    /// Saturday and Sunday window; `None` disables weekend dialing
    pub weekend: Option<HourWindow>,
}

impl CallingHours {
    /// No time restriction at all, weekends included
    pub fn always() -> Self {
        Self {
            weekday: HourWindow::all_day(),
            weekend: Some(HourWindow::all_day()),
        }
    }

    pub fn allows(&self, local: NaiveDateTime) -> bool {
        match local.weekday() {
            Weekday::Sat | Weekday::Sun => self
                .weekend
                .map(|w| w.contains(local.time()))
                .unwrap_or(false),
            _ => self.weekday.contains(local.time()),
        }
    }
}

impl Default for CallingHours {
    fn default() -> Self {
        Self {
            weekday: HourWindow::hours(9, 21),
            weekend: None,
        }
    }
}

/// Per-campaign dialing settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CampaignSettings {
    /// Lower bound of the calls-per-agent ratio
    pub min_ratio: f64,
    /// Upper bound of the calls-per-agent ratio
    pub max_ratio: f64,
    /// Ratio the campaign starts dialing with
    pub initial_ratio: f64,
    /// Whether the telephony layer runs answering machine detection
    ///
    /// Passed to the telephony layer on every `call:assigned` event. With
    /// detection off, an `answering_machine` outcome is rejected.
    pub amd_enabled: bool,
    /// Retry records whose call hit an answering machine
    pub retry_on_amd: bool,
    /// Calls running longer than this are force-completed by the cleanup sweep
    pub max_call_duration_secs: u64,
    /// Attempts after which a record is finalized as no-contact
    pub max_retry_attempts: u32,
    /// First retry delay; doubled per further attempt
    pub retry_backoff_base_secs: u64,
    /// Retry delay cap
    pub retry_backoff_max_secs: u64,
    /// Records attempted more recently than this are not taken in at intake
    pub cooldown_secs: u64,
    /// Permitted calling window
    pub calling_hours: CallingHours,
    /// Campaign timezone, used when a record carries none
    pub utc_offset_minutes: i32,
}

impl Default for CampaignSettings {
    fn default() -> Self {
        Self {
            min_ratio: 1.0,
            max_ratio: 3.0,
            initial_ratio: 1.5,
            amd_enabled: true,
            retry_on_amd: false,
            max_call_duration_secs: 3600,
            max_retry_attempts: 3,
            retry_backoff_base_secs: 300,
            retry_backoff_max_secs: 3600,
            cooldown_secs: 3600,
            calling_hours: CallingHours::default(),
            utc_offset_minutes: 0,
        }
    }
}

impl CampaignSettings {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("min_ratio", self.min_ratio),
            ("max_ratio", self.max_ratio),
            ("initial_ratio", self.initial_ratio),
        ] {
            if !value.is_finite() {
                return Err(DialerError::validation(format!("{} must be a finite number, got {}", name, value)));
            }
        }
        if !(self.min_ratio > 0.0) {
            return Err(DialerError::validation("min_ratio must be greater than 0"));
        }
        if self.min_ratio > self.max_ratio {
            return Err(DialerError::validation(format!(
                "min_ratio {} exceeds max_ratio {}",
                self.min_ratio, self.max_ratio
            )));
        }
        if self.initial_ratio < self.min_ratio || self.initial_ratio > self.max_ratio {
            return Err(DialerError::validation(format!(
                "initial_ratio {} outside [{}, {}]",
                self.initial_ratio, self.min_ratio, self.max_ratio
            )));
        }
        if self.max_retry_attempts == 0 {
            return Err(DialerError::validation("max_retry_attempts must be greater than 0"));
        }
        if self.max_call_duration_secs == 0 {
            return Err(DialerError::validation("max_call_duration_secs must be greater than 0"));
        }
        if self.retry_backoff_base_secs > self.retry_backoff_max_secs {
            return Err(DialerError::validation("retry_backoff_base_secs exceeds retry_backoff_max_secs"));
        }
        if self.utc_offset_minutes.abs() > 14 * 60 {
            return Err(DialerError::validation("utc_offset_minutes out of range"));
        }
        Ok(())
    }
}

/// Running campaign statistics
///
/// Every completed attempt increments `total_calls` and exactly one of the
/// per-disposition counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CampaignStatistics {
    pub total_calls: u64,
    pub answered_calls: u64,
    /// No-answer, busy and fax outcomes
    pub abandoned_calls: u64,
    pub amd_calls: u64,
    pub failed_calls: u64,
    pub callbacks_scheduled: u64,
    pub retries_scheduled: u64,
    pub records_loaded: u64,
    pub records_finalized: u64,
    pub total_talk_time_secs: u64,
    /// Sum of initiation-to-answer delays of answered calls
    pub total_wait_time_ms: u64,
    /// AMD detections later verified by the telephony layer
    pub amd_verified: u64,
    /// Verified AMD detections that were correct
    pub amd_verified_correct: u64,
}

impl CampaignStatistics {
    pub fn answer_rate(&self) -> f64 {
        ratio(self.answered_calls, self.total_calls)
    }

    /// Abandoned attempts over completed attempts excluding AMD detections
    pub fn abandonment_rate(&self) -> f64 {
        ratio(self.abandoned_calls, self.total_calls.saturating_sub(self.amd_calls))
    }

    pub fn avg_talk_time_secs(&self) -> f64 {
        ratio(self.total_talk_time_secs, self.answered_calls)
    }

    pub fn avg_wait_time_secs(&self) -> f64 {
        ratio(self.total_wait_time_ms, self.answered_calls) / 1000.0
    }

    /// Accumulate another campaign's counters
    pub fn merge(&mut self, other: &CampaignStatistics) {
        self.total_calls += other.total_calls;
        self.answered_calls += other.answered_calls;
        self.abandoned_calls += other.abandoned_calls;
        self.amd_calls += other.amd_calls;
        self.failed_calls += other.failed_calls;
        self.callbacks_scheduled += other.callbacks_scheduled;
        self.retries_scheduled += other.retries_scheduled;
        self.records_loaded += other.records_loaded;
        self.records_finalized += other.records_finalized;
        self.total_talk_time_secs += other.total_talk_time_secs;
        self.total_wait_time_ms += other.total_wait_time_ms;
        self.amd_verified += other.amd_verified;
        self.amd_verified_correct += other.amd_verified_correct;
    }
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// One dialing campaign
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    /// Campaign in the collaborator store whose records are dialed
    pub source_campaign_id: String,
    /// Agents staffing this campaign
    pub agent_ids: Vec<String>,
    pub status: CampaignStatus,
    pub settings: CampaignSettings,
    pub statistics: CampaignStatistics,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Campaign {
    pub fn new(source_campaign_id: String, agent_ids: Vec<String>, settings: CampaignSettings) -> Self {
        Self {
            id: CampaignId::new(),
            source_campaign_id,
            agent_ids,
            status: CampaignStatus::Configuring,
            settings,
            statistics: CampaignStatistics::default(),
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
        }
    }

    /// Move to `next`, or fail with [`DialerError::Conflict`]
    pub fn transition(&mut self, next: CampaignStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(DialerError::conflict(format!(
                "campaign {} cannot go from {} to {}",
                self.id, self.status, next
            )));
        }
        let now = Utc::now();
        match next {
            CampaignStatus::Active if self.started_at.is_none() => self.started_at = Some(now),
            CampaignStatus::Stopped | CampaignStatus::Completed => self.ended_at = Some(now),
            _ => {}
        }
        self.status = next;
        Ok(())
    }

    pub fn has_agent(&self, agent_id: &str) -> bool {
        self.agent_ids.iter().any(|a| a == agent_id)
    }
}
