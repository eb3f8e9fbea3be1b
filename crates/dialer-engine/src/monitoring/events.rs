//! Outbound event channel
//!
//! Events go out on a bounded `tokio::sync::broadcast` channel. Publishing
//! never awaits: with no subscriber the event is only recorded in history, and
//! a subscriber that falls more than `channel_capacity` events behind loses
//! the oldest ones (`RecvError::Lagged`) instead of holding up the dial loop.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

use crate::campaign::{CampaignId, CampaignStatistics};
use crate::config::EventConfig;
use crate::dialer::{CallId, Disposition};
use crate::records::RecordId;

/// One outbound event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialerEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub campaign_id: CampaignId,
    #[serde(flatten)]
    pub kind: DialerEventKind,
}

impl DialerEvent {
    pub fn new(campaign_id: CampaignId, kind: DialerEventKind) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            campaign_id,
            kind,
        }
    }

    pub fn topic(&self) -> &'static str {
        self.kind.topic()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Event payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DialerEventKind {
    CampaignStarted {
        records_loaded: usize,
        ratio: f64,
    },
    CampaignPaused,
    CampaignResumed,
    CampaignStopped {
        statistics: CampaignStatistics,
        forced_calls: usize,
    },
    CampaignCompleted {
        statistics: CampaignStatistics,
    },
    CallAssigned {
        call_id: CallId,
        record_id: RecordId,
        agent_id: String,
        phone_number: String,
        /// Whether the telephony layer should run answering machine detection
        amd_enabled: bool,
    },
    CallCompleted {
        call_id: CallId,
        record_id: RecordId,
        agent_id: Option<String>,
        disposition: Disposition,
        talk_time_secs: u64,
    },
    CallbackScheduled {
        call_id: CallId,
        record_id: RecordId,
        callback_at: DateTime<Utc>,
    },
    RatioOptimized {
        previous: f64,
        current: f64,
        optimal: f64,
        answer_rate: f64,
        abandonment_rate: f64,
    },
}

impl DialerEventKind {
    pub fn topic(&self) -> &'static str {
        match self {
            DialerEventKind::CampaignStarted { .. } => "campaign:started",
            DialerEventKind::CampaignPaused => "campaign:paused",
            DialerEventKind::CampaignResumed => "campaign:resumed",
            DialerEventKind::CampaignStopped { .. } => "campaign:stopped",
            DialerEventKind::CampaignCompleted { .. } => "campaign:completed",
            DialerEventKind::CallAssigned { .. } => "call:assigned",
            DialerEventKind::CallCompleted { .. } => "call:completed",
            DialerEventKind::CallbackScheduled { .. } => "call:callback_scheduled",
            DialerEventKind::RatioOptimized { .. } => "ratio:optimized",
        }
    }
}

/// Broadcast publisher with bounded history
#[derive(Debug)]
pub struct DialerEvents {
    tx: broadcast::Sender<DialerEvent>,
    history: Mutex<VecDeque<DialerEvent>>,
    history_size: usize,
    topic_counts: Mutex<HashMap<&'static str, u64>>,
}

impl DialerEvents {
    pub fn new(config: &EventConfig) -> Self {
        let (tx, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            tx,
            history: Mutex::new(VecDeque::with_capacity(config.history_size.min(1024))),
            history_size: config.history_size,
            topic_counts: Mutex::new(HashMap::new()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DialerEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, campaign_id: &CampaignId, kind: DialerEventKind) {
        let event = DialerEvent::new(campaign_id.clone(), kind);
        let topic = event.topic();

        *self.topic_counts.lock().entry(topic).or_insert(0) += 1;
        if self.history_size > 0 {
            let mut history = self.history.lock();
            if history.len() == self.history_size {
                history.pop_front();
            }
            history.push_back(event.clone());
        }

        // Err only means nobody is listening
        if self.tx.send(event).is_err() {
            trace!("No subscribers for {}", topic);
        }
    }

    /// Most recent events, oldest first
    pub fn recent(&self, limit: usize) -> Vec<DialerEvent> {
        let history = self.history.lock();
        let skip = history.len().saturating_sub(limit);
        history.iter().skip(skip).cloned().collect()
    }

    pub fn count(&self, topic: &str) -> u64 {
        self.topic_counts.lock().get(topic).copied().unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for DialerEvents {
    fn default() -> Self {
        Self::new(&EventConfig::default())
    }
}
