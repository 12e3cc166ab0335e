//! Emergency department queue: priority ordering and waiting times

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{TriageEntry, TriageLevel, TriageStatus};

/// A waiting entry with its place in the queue
#[derive(Debug, Clone, Serialize)]
pub struct QueuedEntry {
    pub position: usize,
    pub waiting_minutes: i64,
    pub target_wait_minutes: i64,
    pub overdue: bool,
    #[serde(flatten)]
    pub entry: TriageEntry,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueueStats {
    pub waiting: usize,
    pub in_treatment: usize,
    pub waiting_by_level: BTreeMap<TriageLevel, usize>,
    pub average_wait_minutes: f64,
    pub longest_wait_minutes: i64,
    pub overdue: usize,
}

/// Whole minutes since arrival, never negative
pub fn waiting_minutes(entry: &TriageEntry, now: DateTime<Utc>) -> i64 {
    let until = entry.treatment_started_at.unwrap_or(now);
    (until - entry.arrived_at).num_minutes().max(0)
}

/// Past the target wait of its level
pub fn is_overdue(entry: &TriageEntry, now: DateTime<Utc>) -> bool {
    waiting_minutes(entry, now) > entry.level.target_wait_minutes()
}

/// Most urgent first, then longest waiting, then id for a stable order
pub fn sort_by_priority(entries: &mut [TriageEntry]) {
    entries.sort_by(|a, b| {
        a.level
            .cmp(&b.level)
            .then(a.arrived_at.cmp(&b.arrived_at))
            .then(a.id.cmp(&b.id))
    });
}

/// Orders the waiting entries and annotates them with position and wait
pub fn build_queue(entries: Vec<TriageEntry>, now: DateTime<Utc>) -> Vec<QueuedEntry> {
    let mut waiting: Vec<TriageEntry> = entries
        .into_iter()
        .filter(|entry| entry.status == TriageStatus::Waiting)
        .collect();
    sort_by_priority(&mut waiting);

    waiting
        .into_iter()
        .enumerate()
        .map(|(index, entry)| QueuedEntry {
            position: index + 1,
            waiting_minutes: waiting_minutes(&entry, now),
            target_wait_minutes: entry.level.target_wait_minutes(),
            overdue: is_overdue(&entry, now),
            entry,
        })
        .collect()
}

pub fn queue_stats(entries: &[TriageEntry], now: DateTime<Utc>) -> QueueStats {
    let mut stats = QueueStats::default();
    let mut total_wait = 0i64;

    for entry in entries {
        match entry.status {
            TriageStatus::Waiting => {
                let wait = waiting_minutes(entry, now);
                stats.waiting += 1;
                *stats.waiting_by_level.entry(entry.level).or_default() += 1;
                total_wait += wait;
                stats.longest_wait_minutes = stats.longest_wait_minutes.max(wait);
                if wait > entry.level.target_wait_minutes() {
                    stats.overdue += 1;
                }
            }
            TriageStatus::InTreatment => stats.in_treatment += 1,
            _ => {}
        }
    }

    if stats.waiting > 0 {
        let average = total_wait as f64 / stats.waiting as f64;
        stats.average_wait_minutes = (average * 10.0).round() / 10.0;
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PatientID, TriageID, UserID, Vitals};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 20, 12, 0, 0).unwrap()
    }

    fn entry(level: TriageLevel, arrived_minutes_ago: i64, status: TriageStatus) -> TriageEntry {
        TriageEntry {
            id: TriageID::new(),
            patient_id: PatientID::new(),
            level,
            status,
            chief_complaint: "Abdominal pain".to_string(),
            vitals: Vitals::default(),
            notes: None,
            assessed_by: UserID::new(),
            arrived_at: now() - Duration::minutes(arrived_minutes_ago),
            treatment_started_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn test_queue_orders_by_level_then_arrival() {
        let entries = vec![
            entry(TriageLevel::NonUrgent, 200, TriageStatus::Waiting),
            entry(TriageLevel::Urgent, 5, TriageStatus::Waiting),
            entry(TriageLevel::Immediate, 1, TriageStatus::Waiting),
            entry(TriageLevel::Urgent, 40, TriageStatus::Waiting),
            entry(TriageLevel::Immediate, 90, TriageStatus::InTreatment),
        ];

        let queue = build_queue(entries, now());
        let order: Vec<(TriageLevel, i64)> = queue
            .iter()
            .map(|q| (q.entry.level, q.waiting_minutes))
            .collect();

        assert_eq!(
            order,
            vec![
                (TriageLevel::Immediate, 1),
                (TriageLevel::Urgent, 40),
                (TriageLevel::Urgent, 5),
                (TriageLevel::NonUrgent, 200),
            ]
        );
        assert_eq!(
            queue.iter().map(|q| q.position).collect::<Vec<_>>(),
            vec![1, 2, 3, 4]
        );
    }

    #[test]
    fn test_overdue_flags() {
        let queue = build_queue(
            vec![
                entry(TriageLevel::Immediate, 1, TriageStatus::Waiting),
                entry(TriageLevel::Urgent, 30, TriageStatus::Waiting),
                entry(TriageLevel::Urgent, 31, TriageStatus::Waiting),
                entry(TriageLevel::NonUrgent, 119, TriageStatus::Waiting),
            ],
            now(),
        );
        let flags: Vec<bool> = queue.iter().map(|q| q.overdue).collect();
        assert_eq!(flags, vec![true, true, false, false]);
    }

    #[test]
    fn test_future_arrival_waits_zero_minutes() {
        let early = entry(TriageLevel::Urgent, -10, TriageStatus::Waiting);
        assert_eq!(waiting_minutes(&early, now()), 0);
    }

    #[test]
    fn test_wait_stops_when_treatment_starts() {
        let mut seen = entry(TriageLevel::LessUrgent, 90, TriageStatus::InTreatment);
        seen.treatment_started_at = Some(now() - Duration::minutes(60));
        assert_eq!(waiting_minutes(&seen, now()), 30);
    }

    #[test]
    fn test_queue_stats() {
        let entries = vec![
            entry(TriageLevel::Immediate, 4, TriageStatus::Waiting),
            entry(TriageLevel::Urgent, 45, TriageStatus::Waiting),
            entry(TriageLevel::Urgent, 10, TriageStatus::Waiting),
            entry(TriageLevel::NonUrgent, 20, TriageStatus::InTreatment),
            entry(TriageLevel::NonUrgent, 300, TriageStatus::Completed),
        ];

        let stats = queue_stats(&entries, now());
        assert_eq!(stats.waiting, 3);
        assert_eq!(stats.in_treatment, 1);
        assert_eq!(stats.waiting_by_level.get(&TriageLevel::Urgent), Some(&2));
        assert_eq!(stats.waiting_by_level.get(&TriageLevel::NonUrgent), None);
        assert_eq!(stats.average_wait_minutes, 19.7);
        assert_eq!(stats.longest_wait_minutes, 45);
        assert_eq!(stats.overdue, 2);
    }

    #[test]
    fn test_empty_queue_stats() {
        let stats = queue_stats(&[], now());
        assert_eq!(stats, QueueStats::default());
    }
}
