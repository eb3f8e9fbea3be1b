//! # Predictive Dialer
//!
//! The dialer engine proper: the campaign command surface, the queue
//! processor that launches calls at the current dial ratio, round-robin
//! agent assignment and the call lifecycle that turns telephony outcomes
//! into retries, callbacks and terminal dispositions.
//!
//! ## Engine layout
//!
//! [`DialerEngine`] is split over several files, each adding one `impl`
//! block:
//!
//! - `core`: construction, campaign commands, status and metrics queries
//! - `queue_processor`: queue ticks and `assign_call_to_agent`
//! - `lifecycle`: call progress, `complete_call` and the cleanup sweep

pub mod assignment;
mod context;
pub mod core;
pub mod lifecycle;
pub mod queue_processor;
pub mod types;

pub use assignment::RoundRobinAssigner;
pub use core::{CampaignStatusReport, DialerEngine, DialerEngineBuilder};
pub use lifecycle::{retry_backoff, CleanupReport};
pub use queue_processor::launch_count;
pub use types::{Assignment, Call, CallId, CallOutcome, CallRecord, CallStatus, Disposition};
