//! Session assembly for sleep and workout metrics.
//!
//! Sleep records are grouped into one session per UTC day of their start
//! time; the session window grows to cover every stage seen for that day.
//! Workouts become one session each, carrying at most one calories segment.
//!
//! Session ids are `<prefix>-<uuid v4>` and are generated fresh on every
//! run, so re-running a sync creates new remote sessions.

use std::collections::BTreeMap;

use uuid::Uuid;

use crate::aggregate::{bucket_key, Granularity};
use crate::catalog::{sleep_stage, SessionSpec};
use crate::models::{MetricKind, MetricPoint, MetricValue, Session};
use crate::normalize::{repair_interval, MIN_INTERVAL_MS};

/// Description attached to every imported session.
pub const SESSION_DESCRIPTION: &str = "Imported from Apple Health";

/// Streaming accumulator producing [`Session`]s.
#[derive(Debug)]
pub struct SessionAccumulator {
    spec: SessionSpec,
    nights: BTreeMap<String, Session>,
    workouts: Vec<Session>,
}

impl SessionAccumulator {
    pub fn new(spec: SessionSpec) -> Self {
        Self {
            spec,
            nights: BTreeMap::new(),
            workouts: Vec::new(),
        }
    }

    fn new_session(&self, start_ms: i64, end_ms: i64) -> Session {
        Session {
            id: format!("{}-{}", self.spec.id_prefix, Uuid::new_v4()),
            name: self.spec.name.to_string(),
            description: SESSION_DESCRIPTION.to_string(),
            start_ms,
            end_ms,
            activity_type: self.spec.activity_type,
            segments: Vec::new(),
        }
    }

    /// Add one sleep-analysis record with its Apple category value.
    pub fn push_sleep_stage(&mut self, start_ms: i64, end_ms: i64, category: &str) {
        let (start_ms, end_ms) = repair_interval(start_ms, end_ms, MIN_INTERVAL_MS);
        let night = bucket_key(start_ms, Granularity::Day);
        if !self.nights.contains_key(&night) {
            let session = self.new_session(start_ms, end_ms);
            self.nights.insert(night.clone(), session);
        }
        if let Some(session) = self.nights.get_mut(&night) {
            session.start_ms = session.start_ms.min(start_ms);
            session.end_ms = session.end_ms.max(end_ms);
            session.segments.push(MetricPoint::new(
                start_ms,
                end_ms,
                MetricKind::Sleep,
                MetricValue::Int(sleep_stage(category)),
            ));
        }
    }

    /// Add one workout. A positive `calories` total becomes a single segment
    /// spanning the whole session.
    pub fn push_workout(&mut self, start_ms: i64, end_ms: i64, calories: f64) {
        let (start_ms, end_ms) = repair_interval(start_ms, end_ms, MIN_INTERVAL_MS);
        let mut session = self.new_session(start_ms, end_ms);
        if calories > 0.0 {
            session.segments.push(MetricPoint::new(
                start_ms,
                end_ms,
                MetricKind::Calories,
                MetricValue::Float(calories),
            ));
        }
        self.workouts.push(session);
    }

    /// Return every assembled session ordered by start time, with segments
    /// sorted by start.
    pub fn finish(self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self.nights.into_values().chain(self.workouts).collect();
        for session in &mut sessions {
            session.segments.sort_by_key(|p| p.start_ms);
        }
        sessions.sort_by_key(|s| s.start_ms);
        sessions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::find_spec;
    use crate::models::ActivityType;

    const JAN_1_22H: i64 = 1_704_146_400_000; // 2024-01-01T22:00:00Z
    const HOUR: i64 = 60 * 60 * 1000;

    fn sleep_acc() -> SessionAccumulator {
        SessionAccumulator::new(find_spec("sleep").unwrap().session.unwrap())
    }

    #[test]
    fn sleep_records_group_by_night_and_expand_window() {
        let mut acc = sleep_acc();
        acc.push_sleep_stage(
            JAN_1_22H + HOUR,
            JAN_1_22H + 2 * HOUR,
            "HKCategoryValueSleepAnalysisAsleepDeep",
        );
        acc.push_sleep_stage(JAN_1_22H, JAN_1_22H + HOUR, "HKCategoryValueSleepAnalysisAsleepCore");
        acc.push_sleep_stage(
            JAN_1_22H + 2 * HOUR + 30 * 60 * 1000,
            JAN_1_22H + 3 * HOUR,
            "HKCategoryValueSleepAnalysisAwake",
        );

        let sessions = acc.finish();
        // The 00:30 record belongs to the next UTC day.
        assert_eq!(sessions.len(), 2);
        let first = &sessions[0];
        assert!(first.id.starts_with("sleep-"));
        assert_eq!(first.activity_type, ActivityType::Sleep);
        assert_eq!(first.start_ms, JAN_1_22H);
        assert_eq!(first.end_ms, JAN_1_22H + 2 * HOUR);
        assert_eq!(first.segments.len(), 2);
        assert_eq!(first.segments[0].value, MetricValue::Int(4));
        assert_eq!(first.segments[1].value, MetricValue::Int(5));
        assert_eq!(sessions[1].segments[0].value, MetricValue::Int(1));
    }

    #[test]
    fn workouts_carry_calories_segment_only_when_positive() {
        let spec = find_spec("badminton").unwrap().session.unwrap();
        let mut acc = SessionAccumulator::new(spec);
        acc.push_workout(JAN_1_22H, JAN_1_22H + HOUR, 412.5);
        acc.push_workout(JAN_1_22H - HOUR, JAN_1_22H - HOUR, 0.0);

        let sessions = acc.finish();
        assert_eq!(sessions.len(), 2);
        assert!(sessions[0].segments.is_empty());
        assert_eq!(sessions[0].end_ms, JAN_1_22H - HOUR + MIN_INTERVAL_MS);
        assert_eq!(sessions[1].name, "Badminton Match");
        assert_eq!(sessions[1].segments.len(), 1);
        assert_eq!(sessions[1].segments[0].value, MetricValue::Float(412.5));
        assert_eq!(sessions[1].segments[0].end_ms, JAN_1_22H + HOUR);
    }

    #[test]
    fn session_ids_are_unique_per_run() {
        let spec = find_spec("badminton").unwrap().session.unwrap();
        let mut acc = SessionAccumulator::new(spec);
        acc.push_workout(0, 1, 0.0);
        acc.push_workout(0, 1, 0.0);
        let sessions = acc.finish();
        assert_ne!(sessions[0].id, sessions[1].id);
    }
}
