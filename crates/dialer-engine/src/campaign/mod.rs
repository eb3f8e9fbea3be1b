//! # Campaign Module
//!
//! Campaign identity, lifecycle status machine, per-campaign settings and
//! statistics. The lifecycle commands themselves (`start`, `pause`, `resume`,
//! `stop`) are driven by [`DialerEngine`](crate::dialer::DialerEngine), which
//! owns the dial context of a running campaign; this module only decides
//! which transitions are legal.

pub mod types;

pub use types::{
    Campaign, CampaignId, CampaignSettings, CampaignStatistics, CampaignStatus, CallingHours,
    HourWindow,
};
