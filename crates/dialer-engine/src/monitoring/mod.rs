//! # Monitoring
//!
//! Outbound event channel for supervisors and the telephony layer, and the
//! performance metrics returned by
//! [`DialerEngine::get_performance_metrics`](crate::dialer::DialerEngine::get_performance_metrics).

pub mod events;
pub mod metrics;

pub use events::{DialerEvent, DialerEventKind, DialerEvents};
pub use metrics::PerformanceMetrics;
