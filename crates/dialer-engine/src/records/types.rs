use std::fmt;

use chrono::{DateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::campaign::HourWindow;

/// Contact record identifier in the collaborator store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub String);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Customer tier used for the scoring bonus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerTier {
    #[default]
    Standard,
    Silver,
    Gold,
    Platinum,
}

impl CustomerTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            CustomerTier::Standard => "standard",
            CustomerTier::Silver => "silver",
            CustomerTier::Gold => "gold",
            CustomerTier::Platinum => "platinum",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "silver" => CustomerTier::Silver,
            "gold" => CustomerTier::Gold,
            "platinum" => CustomerTier::Platinum,
            _ => CustomerTier::Standard,
        }
    }
}

/// Terminal disposition of a record, written back to storage once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalResult {
    /// A live person was reached
    Contacted,
    /// Retries exhausted without reaching anyone
    NoContact,
    /// An answering machine picked up and AMD retries are off or exhausted
    AnsweringMachine,
}

impl FinalResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinalResult::Contacted => "contacted",
            FinalResult::NoContact => "no_contact",
            FinalResult::AnsweringMachine => "answering_machine",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "contacted" => Some(FinalResult::Contacted),
            "no_contact" => Some(FinalResult::NoContact),
            "answering_machine" => Some(FinalResult::AnsweringMachine),
            _ => None,
        }
    }
}

/// A dialable target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactRecord {
    pub id: RecordId,
    pub phone_number: String,
    pub name: String,
    pub customer_tier: CustomerTier,
    pub last_interaction_at: Option<DateTime<Utc>>,
    pub last_sale_at: Option<DateTime<Utc>>,
    /// Hours the contact prefers to be called in, local time
    pub preferred_hours: Option<HourWindow>,
    /// Days the contact prefers to be called on
    pub preferred_days: Option<Vec<Weekday>>,
    pub distance_km: Option<f64>,
    /// Callee timezone; the campaign timezone applies when absent
    pub utc_offset_minutes: Option<i32>,

    /// Lead score assigned at intake
    pub score: f64,
    pub processed_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Earliest time of the next attempt
    pub next_eligible_at: Option<DateTime<Utc>>,
    pub final_result: Option<FinalResult>,
}

impl ContactRecord {
    pub fn new(id: impl Into<String>, phone_number: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: RecordId(id.into()),
            phone_number: phone_number.into(),
            name: name.into(),
            customer_tier: CustomerTier::Standard,
            last_interaction_at: None,
            last_sale_at: None,
            preferred_hours: None,
            preferred_days: None,
            distance_km: None,
            utc_offset_minutes: None,
            score: 0.0,
            processed_at: None,
            retry_count: 0,
            last_attempt_at: None,
            next_eligible_at: None,
            final_result: None,
        }
    }

    pub fn with_tier(mut self, tier: CustomerTier) -> Self {
        self.customer_tier = tier;
        self
    }

    pub fn with_last_interaction(mut self, at: DateTime<Utc>) -> Self {
        self.last_interaction_at = Some(at);
        self
    }

    pub fn with_last_sale(mut self, at: DateTime<Utc>) -> Self {
        self.last_sale_at = Some(at);
        self
    }

    pub fn with_utc_offset(mut self, minutes: i32) -> Self {
        self.utc_offset_minutes = Some(minutes);
        self
    }

    pub fn with_distance(mut self, km: f64) -> Self {
        self.distance_km = Some(km);
        self
    }

    /// Phone number reduced to digits and a leading `+`, as DNC lists store it
    pub fn normalized_phone(&self) -> String {
        normalize_phone(&self.phone_number)
    }

    pub fn is_eligible_at(&self, now: DateTime<Utc>) -> bool {
        self.final_result.is_none() && self.next_eligible_at.map(|t| t <= now).unwrap_or(true)
    }
}

/// Strip formatting from a phone number, keeping digits and a leading `+`
pub fn normalize_phone(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut out = String::with_capacity(trimmed.len());
    if trimmed.starts_with('+') {
        out.push('+');
    }
    out.extend(trimmed.chars().filter(|c| c.is_ascii_digit()));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone("+1 (555) 010-2030"), "+15550102030");
        assert_eq!(normalize_phone(" 555.0100 "), "5550100");
    }

    #[test]
    fn test_eligibility() {
        let now = Utc::now();
        let mut record = ContactRecord::new("r1", "5550100", "Ada");
        assert!(record.is_eligible_at(now));

        record.next_eligible_at = Some(now + chrono::Duration::seconds(30));
        assert!(!record.is_eligible_at(now));

        record.next_eligible_at = None;
        record.final_result = Some(FinalResult::NoContact);
        assert!(!record.is_eligible_at(now));
    }

    #[test]
    fn test_tier_parse() {
        assert_eq!(CustomerTier::parse("GOLD"), CustomerTier::Gold);
        assert_eq!(CustomerTier::parse("unknown"), CustomerTier::Standard);
    }
}
