//! # Contact Records
//!
//! Contact record model, the intake filter and scorer, and the
//! priority-ordered dial queue.

pub mod filter;
pub mod prioritizer;
pub mod types;

pub use filter::{FilterReport, RecordFilter};
pub use prioritizer::{DialQueue, QueuedRecord, RecordPrioritizer};
pub use types::{normalize_phone, ContactRecord, CustomerTier, FinalResult, RecordId};
