//! Round-robin call assignment over the available-agent snapshot

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::store::AgentView;

use super::types::{Assignment, Call, CallStatus};

/// Round-robin agent selector
///
/// The index survives across ticks, so consecutive launches spread over the
/// snapshot even when it changes between ticks. No strict fairness across
/// snapshots is promised.
#[derive(Debug, Default, Clone)]
pub struct RoundRobinAssigner {
    next: usize,
}

impl RoundRobinAssigner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick the next agent of `available`, or `None` when it is empty
    pub fn select<'a>(&mut self, available: &'a [AgentView]) -> Option<&'a AgentView> {
        if available.is_empty() {
            return None;
        }
        let index = self.next % available.len();
        self.next = index + 1;
        available.get(index)
    }

    /// Bind a dialing call to the next agent
    ///
    /// Returns `None` and leaves the call untouched when nobody is available.
    pub fn assign(&mut self, call: &mut Call, available: &[AgentView], now: DateTime<Utc>) -> Option<Assignment> {
        let agent = self.select(available)?;
        call.status = CallStatus::Assigned;
        call.agent_id = Some(agent.agent_id.clone());
        call.assigned_at = Some(now);
        debug!("Call {} assigned to agent {}", call.call_id, agent.agent_id);

        Some(Assignment {
            call_id: call.call_id.clone(),
            campaign_id: call.campaign_id.clone(),
            record_id: call.record.id.clone(),
            phone_number: call.record.phone_number.clone(),
            agent_id: agent.agent_id.clone(),
            priority: call.priority,
            assigned_at: now,
        })
    }
}
