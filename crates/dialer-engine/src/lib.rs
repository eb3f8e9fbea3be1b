//! # Dialer-Engine
//!
//! Predictive outbound dialing engine for RVoIP.
//!
//! The engine takes a campaign of contact records, filters and scores them,
//! and launches outbound calls at a dial ratio (calls per available agent)
//! that adapts to observed answer and abandonment rates. Call outcomes
//! reported by the telephony layer turn into retries with backoff, scheduled
//! callbacks or terminal dispositions written back to storage.
//!
//! This crate provides:
//! - Campaign lifecycle: `configuring → active ⇄ paused → stopped | completed`
//! - Record intake: Do-Not-Contact screening, calling-hours windows and
//!   priority scoring
//! - An adaptive [`RatioController`](ratio::RatioController)
//! - Round-robin agent assignment and the call lifecycle
//! - Pluggable collaborator stores, with in-memory and SQLite backends
//! - An event channel and performance metrics for supervisors
//!
//! ## Architecture
//!
//! ```text
//!  records ──► RecordFilter ──► RecordPrioritizer ──► DialQueue
//!                                                        │
//!               RatioController ──► queue tick ◄─────────┘
//!                     ▲                 │ launch + assign
//!                     │                 ▼
//!                     └──────── call lifecycle ──► store write-back
//! ```
//!
//! The engine never dials by itself: it publishes
//! [`CallAssigned`](monitoring::DialerEventKind::CallAssigned) events and
//! expects the telephony layer to report progress and outcomes back through
//! [`DialerEngine::complete_call`](dialer::DialerEngine::complete_call).

pub mod campaign;
pub mod config;
pub mod dialer;
pub mod error;
pub mod logging;
pub mod monitoring;
pub mod ratio;
pub mod records;
pub mod server;
pub mod store;

pub use config::DialerConfig;
pub use dialer::{DialerEngine, DialerEngineBuilder};
pub use error::{DialerError, ErrorClass, Result};
pub use server::{DialerServer, DialerServerBuilder};

/// Commonly used types
pub mod prelude {
    pub use crate::campaign::{
        Campaign, CampaignId, CampaignSettings, CampaignStatistics, CampaignStatus, CallingHours,
        HourWindow,
    };
    pub use crate::config::{DialerConfig, GeneralConfig, RatioConfig, ScoringConfig};
    pub use crate::dialer::{
        Assignment, Call, CallId, CallOutcome, CallStatus, CampaignStatusReport, CleanupReport,
        DialerEngine, DialerEngineBuilder, Disposition,
    };
    pub use crate::error::{DialerError, ErrorClass, Result};
    pub use crate::monitoring::{DialerEvent, DialerEventKind, PerformanceMetrics};
    pub use crate::records::{ContactRecord, CustomerTier, FinalResult, RecordId};
    pub use crate::server::{DialerServer, DialerServerBuilder};
    pub use crate::store::{AgentPresence, AgentView, DncList, InMemoryStore, RecordStore, SqliteStore, StoreGateway};
}
