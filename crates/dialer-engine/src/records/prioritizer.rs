//! # Record Prioritizer & Dial Queue
//!
//! Orders eligible records into the dial queue by a weighted sum of
//! time-of-day fit, day-of-week fit, normalized lead score and proximity.
//! Ordering is a stable descending sort, so equal priorities keep filter
//! order. The queue is never re-sorted mid-tick; records entering later
//! (fresh intake, retries, callbacks) are inserted at their priority
//! position behind any entries of equal priority.

use std::collections::VecDeque;

use chrono::{DateTime, Datelike, Utc};
use tracing::debug;

use crate::campaign::CampaignSettings;
use crate::config::ScoringConfig;

use super::filter::local_time;
use super::types::{ContactRecord, RecordId};

/// A record waiting in the dial queue with its computed priority
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedRecord {
    pub record: ContactRecord,
    pub priority: f64,
}

impl QueuedRecord {
    /// Out of backoff, not finalized and inside the callee's calling window
    pub fn is_dialable(&self, settings: &CampaignSettings, now: DateTime<Utc>) -> bool {
        self.record.is_eligible_at(now)
            && settings
                .calling_hours
                .allows(local_time(&self.record, settings, now))
    }
}

/// Computes dial-queue priorities
#[derive(Debug, Clone)]
pub struct RecordPrioritizer {
    scoring: ScoringConfig,
}

impl RecordPrioritizer {
    pub fn new(scoring: ScoringConfig) -> Self {
        Self { scoring }
    }

    /// Weighted priority of `record` at `now`
    pub fn priority(&self, record: &ContactRecord, settings: &CampaignSettings, now: DateTime<Utc>) -> f64 {
        let s = &self.scoring;
        let local = local_time(record, settings, now);

        let time_fit = match record.preferred_hours {
            Some(window) if window.contains(local.time()) => 1.0,
            Some(_) => 0.0,
            None => 0.5,
        };
        let day_fit = match &record.preferred_days {
            Some(days) if days.contains(&local.weekday()) => 1.0,
            Some(_) => 0.0,
            None => 0.5,
        };
        let score = (record.score / s.max_score).clamp(0.0, 1.0);
        let proximity = match record.distance_km {
            Some(km) => 1.0 - (km.max(0.0) / s.proximity_max_km).min(1.0),
            None => 0.5,
        };

        s.time_of_day_weight * time_fit
            + s.day_of_week_weight * day_fit
            + s.score_weight * score
            + s.proximity_weight * proximity
    }

    pub fn entry(&self, record: ContactRecord, settings: &CampaignSettings, now: DateTime<Utc>) -> QueuedRecord {
        let priority = self.priority(&record, settings, now);
        QueuedRecord { record, priority }
    }

    /// Order records by descending priority, ties in input order
    pub fn order(
        &self,
        records: Vec<ContactRecord>,
        settings: &CampaignSettings,
        now: DateTime<Utc>,
    ) -> Vec<QueuedRecord> {
        let mut entries: Vec<QueuedRecord> = records
            .into_iter()
            .map(|record| self.entry(record, settings, now))
            .collect();
        // sort_by is stable
        entries.sort_by(|a, b| b.priority.total_cmp(&a.priority));
        entries
    }
}

/// Priority-ordered sequence of records awaiting a call attempt
#[derive(Debug, Default)]
pub struct DialQueue {
    entries: VecDeque<QueuedRecord>,
}

impl DialQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries that may be dialed at `now`
    pub fn eligible_len(&self, settings: &CampaignSettings, now: DateTime<Utc>) -> usize {
        self.entries.iter().filter(|e| e.is_dialable(settings, now)).count()
    }

    pub fn contains(&self, record_id: &RecordId) -> bool {
        self.entries.iter().any(|e| &e.record.id == record_id)
    }

    /// Insert at the priority position, behind entries of equal priority
    ///
    /// Returns the position. A record already queued is not inserted twice.
    pub fn insert(&mut self, entry: QueuedRecord) -> Option<usize> {
        if self.contains(&entry.record.id) {
            debug!("Record {} already queued, not re-queuing", entry.record.id);
            return None;
        }
        let position = self
            .entries
            .iter()
            .position(|existing| existing.priority < entry.priority)
            .unwrap_or(self.entries.len());
        self.entries.insert(position, entry);
        Some(position)
    }

    /// Insert an already ordered batch, keeping its relative order
    pub fn extend_ordered(&mut self, entries: Vec<QueuedRecord>) -> usize {
        entries.into_iter().filter_map(|e| self.insert(e)).count()
    }

    /// Put an entry back at the head, unchanged
    pub fn push_front(&mut self, entry: QueuedRecord) {
        self.entries.push_front(entry);
    }

    /// Remove the highest-priority entry that is eligible at `now`
    ///
    /// Entries outside the calling window stay queued until it opens.
    pub fn pop_next_eligible(&mut self, settings: &CampaignSettings, now: DateTime<Utc>) -> Option<QueuedRecord> {
        let index = self.entries.iter().position(|e| e.is_dialable(settings, now))?;
        self.entries.remove(index)
    }

    /// Release every entry
    pub fn drain_all(&mut self) -> Vec<QueuedRecord> {
        self.entries.drain(..).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueuedRecord> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::HourWindow;
    use chrono::{Duration, TimeZone, Weekday};

    fn monday_noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap()
    }

    fn scored(id: &str, score: f64) -> ContactRecord {
        let mut r = ContactRecord::new(id, "5550100", "Name");
        r.score = score;
        r
    }

    fn prioritizer() -> RecordPrioritizer {
        RecordPrioritizer::new(ScoringConfig::default())
    }

    #[test]
    fn test_order_is_descending_and_stable() {
        let settings = CampaignSettings::default();
        let records = vec![scored("a", 10.0), scored("b", 80.0), scored("c", 10.0), scored("d", 80.0)];

        let ordered = prioritizer().order(records, &settings, monday_noon());
        let ids: Vec<&str> = ordered.iter().map(|e| e.record.id.0.as_str()).collect();
        assert_eq!(ids, vec!["b", "d", "a", "c"]);
    }

    #[test]
    fn test_preferences_shift_priority() {
        let settings = CampaignSettings::default();
        let now = monday_noon();
        let p = prioritizer();

        let neutral = scored("n", 50.0);
        let mut fits = scored("f", 50.0);
        fits.preferred_hours = Some(HourWindow::hours(11, 13));
        fits.preferred_days = Some(vec![Weekday::Mon]);
        let mut misses = scored("m", 50.0);
        misses.preferred_hours = Some(HourWindow::hours(18, 20));
        misses.preferred_days = Some(vec![Weekday::Fri]);

        let pn = p.priority(&neutral, &settings, now);
        let pf = p.priority(&fits, &settings, now);
        let pm = p.priority(&misses, &settings, now);
        assert!(pf > pn && pn > pm);

        let near = scored("near", 50.0).with_distance(10.0);
        let far = scored("far", 50.0).with_distance(1000.0);
        assert!(p.priority(&near, &settings, now) > p.priority(&far, &settings, now));
    }

    #[test]
    fn test_reinsertion_by_priority() {
        let mut queue = DialQueue::new();
        let entry = |id: &str, priority: f64| QueuedRecord {
            record: ContactRecord::new(id, "1", "n"),
            priority,
        };
        queue.extend_ordered(vec![entry("a", 0.9), entry("b", 0.5), entry("c", 0.1)]);

        assert_eq!(queue.insert(entry("d", 0.5)), Some(2));
        assert_eq!(queue.insert(entry("a", 0.2)), None);

        let ids: Vec<&str> = queue.iter().map(|e| e.record.id.0.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "d", "c"]);
    }

    #[test]
    fn test_pop_skips_records_in_backoff() {
        let now = monday_noon();
        let mut queue = DialQueue::new();
        let mut waiting = ContactRecord::new("waiting", "1", "n");
        waiting.next_eligible_at = Some(now + Duration::minutes(5));
        queue.insert(QueuedRecord { record: waiting, priority: 0.9 });
        queue.insert(QueuedRecord {
            record: ContactRecord::new("ready", "2", "n"),
            priority: 0.1,
        });

        let settings = CampaignSettings::default();
        assert_eq!(queue.eligible_len(&settings, now), 1);
        let next = queue.pop_next_eligible(&settings, now).unwrap();
        assert_eq!(next.record.id.0, "ready");
        assert!(queue.pop_next_eligible(&settings, now).is_none());
        assert_eq!(queue.len(), 1);

        let later = now + Duration::minutes(6);
        assert_eq!(queue.pop_next_eligible(&settings, later).unwrap().record.id.0, "waiting");
    }

    #[test]
    fn test_pop_holds_records_outside_calling_window() {
        // default window is 09:00-21:00 on weekdays, closed at weekends
        let settings = CampaignSettings::default();
        let monday_late = Utc.with_ymd_and_hms(2024, 6, 10, 22, 0, 0).unwrap();
        let mut queue = DialQueue::new();
        let mut retried = ContactRecord::new("retried", "1", "n");
        retried.retry_count = 1;
        retried.next_eligible_at = Some(monday_late);
        queue.insert(QueuedRecord { record: retried, priority: 0.5 });

        assert_eq!(queue.eligible_len(&settings, monday_late), 0);
        assert!(queue.pop_next_eligible(&settings, monday_late).is_none());

        let saturday_noon = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
        assert!(queue.pop_next_eligible(&settings, saturday_noon).is_none());
        assert_eq!(queue.len(), 1);

        // callee's own offset decides: 22:00 UTC is 15:00 at UTC-7
        let mut west = ContactRecord::new("west", "2", "n").with_utc_offset(-7 * 60);
        west.next_eligible_at = Some(monday_late);
        queue.insert(QueuedRecord { record: west, priority: 0.1 });
        assert_eq!(queue.pop_next_eligible(&settings, monday_late).unwrap().record.id.0, "west");

        let tuesday_morning = Utc.with_ymd_and_hms(2024, 6, 11, 9, 30, 0).unwrap();
        assert_eq!(queue.pop_next_eligible(&settings, tuesday_morning).unwrap().record.id.0, "retried");
    }
}
