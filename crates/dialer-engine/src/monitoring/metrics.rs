use serde::{Deserialize, Serialize};

use crate::campaign::CampaignStatistics;

/// Dialer performance snapshot
///
/// All values derive from engine state:
///
/// - `agent_utilization`: agents holding a non-terminal call / campaign agents
/// - `connection_rate`: answered / completed attempts
/// - `avg_wait_time_secs`: mean initiation-to-answer delay of answered calls
/// - `avg_call_duration_secs`: mean talk time of answered calls
/// - `abandonment_rate`: abandoned / (completed - AMD)
/// - `amd_accuracy`: verified-correct / verified AMD detections, `None`
///   until the telephony layer verifies one
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub agent_utilization: f64,
    pub connection_rate: f64,
    pub avg_wait_time_secs: f64,
    pub avg_call_duration_secs: f64,
    pub abandonment_rate: f64,
    pub amd_accuracy: Option<f64>,
}

impl PerformanceMetrics {
    /// Metrics from campaign counters and the current agent occupancy
    pub fn compute(statistics: &CampaignStatistics, busy_agents: usize, total_agents: usize) -> Self {
        Self {
            agent_utilization: if total_agents == 0 {
                0.0
            } else {
                (busy_agents as f64 / total_agents as f64).min(1.0)
            },
            connection_rate: statistics.answer_rate(),
            avg_wait_time_secs: statistics.avg_wait_time_secs(),
            avg_call_duration_secs: statistics.avg_talk_time_secs(),
            abandonment_rate: statistics.abandonment_rate(),
            amd_accuracy: if statistics.amd_verified == 0 {
                None
            } else {
                Some(statistics.amd_verified_correct as f64 / statistics.amd_verified as f64)
            },
        }
    }
}
