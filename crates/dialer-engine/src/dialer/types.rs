use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::campaign::CampaignId;
use crate::records::{ContactRecord, RecordId};

/// Unique identifier of one dial attempt, never reused
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallId(pub String);

impl CallId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CallId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Call status
///
/// ```text
/// dialing ─► assigned ─► ringing ─► talking ─► completed
///               │           │                     ▲
///               └───────────┴─────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Dialing,
    Assigned,
    Ringing,
    Talking,
    Completed,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Dialing => "dialing",
            CallStatus::Assigned => "assigned",
            CallStatus::Ringing => "ringing",
            CallStatus::Talking => "talking",
            CallStatus::Completed => "completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CallStatus::Completed)
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome classification reported by the telephony layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Answered,
    NoAnswer,
    Busy,
    Fax,
    /// Answering machine detected
    AnsweringMachine,
    Failed,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Answered => "answered",
            Disposition::NoAnswer => "no_answer",
            Disposition::Busy => "busy",
            Disposition::Fax => "fax",
            Disposition::AnsweringMachine => "amd",
            Disposition::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "answered" => Some(Disposition::Answered),
            "no_answer" => Some(Disposition::NoAnswer),
            "busy" => Some(Disposition::Busy),
            "fax" => Some(Disposition::Fax),
            "amd" | "answering_machine" => Some(Disposition::AnsweringMachine),
            "failed" => Some(Disposition::Failed),
            _ => None,
        }
    }

    /// No-answer, busy and fax: the callee could not be reached
    pub fn is_abandoned(&self) -> bool {
        matches!(self, Disposition::NoAnswer | Disposition::Busy | Disposition::Fax)
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome details reported with a completed call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallOutcome {
    /// Callback requested by the callee; answered calls only
    pub callback_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub metadata: HashMap<String, serde_json::Value>,
    /// For AMD outcomes: whether later verification confirmed the machine
    pub amd_verified: Option<bool>,
}

impl CallOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(mut self, at: DateTime<Utc>) -> Self {
        self.callback_at = Some(at);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_amd_verified(mut self, correct: bool) -> Self {
        self.amd_verified = Some(correct);
        self
    }
}

/// One dial attempt, held in memory from launch to completion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Call {
    pub call_id: CallId,
    pub campaign_id: CampaignId,
    /// Snapshot of the dialed record
    pub record: ContactRecord,
    /// Dial queue priority at launch
    pub priority: f64,
    /// Caller-supplied priority of a manual launch
    pub requested_priority: Option<u8>,
    pub status: CallStatus,
    pub agent_id: Option<String>,
    pub initiated_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub answered_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_secs: Option<u64>,
    pub disposition: Option<Disposition>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Call {
    pub fn dialing(campaign_id: CampaignId, record: ContactRecord, priority: f64) -> Self {
        Self {
            call_id: CallId::new(),
            campaign_id,
            record,
            priority,
            requested_priority: None,
            status: CallStatus::Dialing,
            agent_id: None,
            initiated_at: Utc::now(),
            assigned_at: None,
            answered_at: None,
            completed_at: None,
            duration_secs: None,
            disposition: None,
            metadata: HashMap::new(),
        }
    }

    pub fn record_id(&self) -> &RecordId {
        &self.record.id
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// A dialing call bound to an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub call_id: CallId,
    pub campaign_id: CampaignId,
    pub record_id: RecordId,
    pub phone_number: String,
    pub agent_id: String,
    pub priority: f64,
    pub assigned_at: DateTime<Utc>,
}

/// Persisted summary of a completed attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    pub call_id: CallId,
    pub campaign_id: CampaignId,
    pub record_id: RecordId,
    pub agent_id: Option<String>,
    pub phone_number: String,
    pub disposition: Disposition,
    /// Attempt number of the record, starting at 1
    pub attempt: u32,
    pub initiated_at: DateTime<Utc>,
    pub answered_at: Option<DateTime<Utc>>,
    pub completed_at: DateTime<Utc>,
    pub talk_time_secs: u64,
    pub notes: Option<String>,
    pub metadata: HashMap<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_ids_unique() {
        let a = CallId::new();
        let b = CallId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_disposition_parse() {
        assert_eq!(Disposition::parse("amd"), Some(Disposition::AnsweringMachine));
        assert_eq!(Disposition::parse("no_answer"), Some(Disposition::NoAnswer));
        assert_eq!(Disposition::parse("hangup"), None);
        assert!(Disposition::Fax.is_abandoned());
        assert!(!Disposition::Failed.is_abandoned());
        assert!(!Disposition::AnsweringMachine.is_abandoned());
    }
}
