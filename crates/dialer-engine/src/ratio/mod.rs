//! # Ratio Controller
//!
//! Keeps the calls-per-agent dialing ratio in step with live call outcomes.
//! Each controller tick looks at the outcomes inside the rolling look-back
//! window and proposes an optimal ratio from
//!
//! ```text
//! connect     = 1 / answer_rate                  (max_ratio when nothing answered)
//! abandon     = 1 - abandonment_weight * max(0, abandonment_rate - target_abandonment_rate)
//! talk        = clamp(reference_talk_time / avg_talk_time, 0.8, 1.2)
//! trend       = clamp(1 - trend_weight * (avg(last n answer rates) - avg(previous n)), 0.8, 1.2)
//! optimal     = clamp(connect * abandon * talk * trend, min_ratio, max_ratio)
//! ```
//!
//! and moves toward it by at most `max_step`:
//! `next = current + clamp(optimal - current, -max_step, max_step)`.
//! A move is committed only when `|next - current| > noise_threshold`.
//!
//! AMD outcomes count toward `answer_rate`'s denominator but not toward the
//! abandonment denominator.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::RatioConfig;

/// Outcome class of a completed call as seen by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    Answered,
    /// No answer, busy or fax
    Abandoned,
    /// Answering machine detected
    Amd,
    Failed,
}

#[derive(Debug, Clone, Copy)]
struct CallSample {
    completed_at: DateTime<Utc>,
    kind: SampleKind,
    talk_secs: f64,
}

/// KPIs observed over the look-back window
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RatioObservation {
    pub sample_size: usize,
    pub answer_rate: f64,
    pub abandonment_rate: f64,
    pub avg_talk_time_secs: f64,
    pub trend: f64,
}

/// A committed ratio change
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatioAdjustment {
    pub previous: f64,
    pub current: f64,
    pub optimal: f64,
    pub observation: RatioObservation,
}

/// Calls-per-agent ratio controller for one campaign
#[derive(Debug, Clone)]
pub struct RatioController {
    config: RatioConfig,
    min_ratio: f64,
    max_ratio: f64,
    current: f64,
    samples: VecDeque<CallSample>,
    answer_rate_history: VecDeque<f64>,
}

impl RatioController {
    /// Create a controller starting at `initial`, clamped into the bounds
    pub fn new(config: RatioConfig, min_ratio: f64, max_ratio: f64, initial: f64) -> Self {
        Self {
            config,
            min_ratio,
            max_ratio,
            current: initial.clamp(min_ratio, max_ratio),
            samples: VecDeque::new(),
            answer_rate_history: VecDeque::new(),
        }
    }

    pub fn current_ratio(&self) -> f64 {
        self.current
    }

    pub fn bounds(&self) -> (f64, f64) {
        (self.min_ratio, self.max_ratio)
    }

    /// Feed one completed call
    pub fn record_outcome(&mut self, kind: SampleKind, talk_secs: f64, completed_at: DateTime<Utc>) {
        self.samples.push_back(CallSample {
            completed_at,
            kind,
            talk_secs,
        });
    }

    /// Drop samples older than the look-back window
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let cutoff = now - Duration::seconds(self.config.lookback_window_secs as i64);
        let before = self.samples.len();
        self.samples.retain(|s| s.completed_at >= cutoff);
        before - self.samples.len()
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// KPIs over the current window without advancing the controller
    pub fn observe(&self) -> RatioObservation {
        let total = self.samples.len();
        if total == 0 {
            return RatioObservation::default();
        }
        let mut answered = 0usize;
        let mut abandoned = 0usize;
        let mut amd = 0usize;
        let mut talk = 0.0;
        for s in &self.samples {
            match s.kind {
                SampleKind::Answered => {
                    answered += 1;
                    talk += s.talk_secs;
                }
                SampleKind::Abandoned => abandoned += 1,
                SampleKind::Amd => amd += 1,
                SampleKind::Failed => {}
            }
        }
        let contact_attempts = total - amd;
        RatioObservation {
            sample_size: total,
            answer_rate: answered as f64 / total as f64,
            abandonment_rate: if contact_attempts == 0 {
                0.0
            } else {
                abandoned as f64 / contact_attempts as f64
            },
            avg_talk_time_secs: if answered == 0 { 0.0 } else { talk / answered as f64 },
            trend: self.trend(),
        }
    }

    /// Run one controller tick
    ///
    /// Returns the committed adjustment, or `None` when there is no call
    /// history in the window or the move stays within the noise threshold.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<RatioAdjustment> {
        self.prune(now);
        if self.samples.is_empty() {
            return None;
        }

        let mut observation = self.observe();
        let window = self.config.trend_ticks * 2;
        self.answer_rate_history.push_back(observation.answer_rate);
        while self.answer_rate_history.len() > window {
            self.answer_rate_history.pop_front();
        }
        observation.trend = self.trend();

        let optimal = self.optimal_ratio(&observation);
        let step = (optimal - self.current).clamp(-self.config.max_step, self.config.max_step);
        let next = (self.current + step).clamp(self.min_ratio, self.max_ratio);

        if (next - self.current).abs() <= self.config.noise_threshold {
            debug!(
                "Ratio hold at {:.2} (optimal {:.2}, {} samples)",
                self.current, optimal, observation.sample_size
            );
            return None;
        }

        let previous = self.current;
        self.current = next;
        Some(RatioAdjustment {
            previous,
            current: next,
            optimal,
            observation,
        })
    }

    /// Target ratio for an observation, within bounds
    pub fn optimal_ratio(&self, obs: &RatioObservation) -> f64 {
        let c = &self.config;
        let connect = if obs.answer_rate > 0.0 {
            1.0 / obs.answer_rate
        } else {
            self.max_ratio
        };
        let abandon = (1.0 - c.abandonment_weight * (obs.abandonment_rate - c.target_abandonment_rate).max(0.0))
            .max(0.0);
        let talk = if obs.avg_talk_time_secs > 0.0 {
            (c.reference_talk_time_secs / obs.avg_talk_time_secs).clamp(0.8, 1.2)
        } else {
            1.0
        };
        let trend = (1.0 - c.trend_weight * obs.trend).clamp(0.8, 1.2);

        (connect * abandon * talk * trend).clamp(self.min_ratio, self.max_ratio)
    }

    /// Last `trend_ticks` answer rates against the `trend_ticks` before them
    fn trend(&self) -> f64 {
        let n = self.config.trend_ticks;
        if n == 0 || self.answer_rate_history.len() < n * 2 {
            return 0.0;
        }
        let len = self.answer_rate_history.len();
        let recent: f64 = self.answer_rate_history.iter().skip(len - n).sum::<f64>() / n as f64;
        let previous: f64 = self.answer_rate_history.iter().skip(len - 2 * n).take(n).sum::<f64>() / n as f64;
        recent - previous
    }
}
