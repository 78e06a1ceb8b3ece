//! Core data models used throughout Health Sync.
//!
//! These types represent the normalized points, series, and sessions that
//! flow from the export scanner through aggregation to the uploaders.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Destination value format of a metric's single data field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldFormat {
    FloatPoint,
    Integer,
}

/// The fixed set of metrics Health Sync knows how to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetricKind {
    Weight,
    Height,
    BodyMassIndex,
    BodyFat,
    OxygenSaturation,
    Steps,
    Calories,
    Distance,
    Sleep,
    Badminton,
}

impl MetricKind {
    /// Every metric, in catalog order.
    pub const ALL: [MetricKind; 10] = [
        MetricKind::Weight,
        MetricKind::Height,
        MetricKind::BodyMassIndex,
        MetricKind::BodyFat,
        MetricKind::OxygenSaturation,
        MetricKind::Steps,
        MetricKind::Calories,
        MetricKind::Distance,
        MetricKind::Sleep,
        MetricKind::Badminton,
    ];

    /// The CLI / config name of the metric (e.g. `"body_fat"`).
    pub fn name(&self) -> &'static str {
        match self {
            MetricKind::Weight => "weight",
            MetricKind::Height => "height",
            MetricKind::BodyMassIndex => "bmi",
            MetricKind::BodyFat => "body_fat",
            MetricKind::OxygenSaturation => "oxygen_saturation",
            MetricKind::Steps => "steps",
            MetricKind::Calories => "calories",
            MetricKind::Distance => "distance",
            MetricKind::Sleep => "sleep",
            MetricKind::Badminton => "badminton",
        }
    }

    /// Look a metric up by its name.
    pub fn from_name(name: &str) -> Option<MetricKind> {
        MetricKind::ALL.into_iter().find(|m| m.name() == name)
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single numeric reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Float(f64),
    Int(i64),
}

impl MetricValue {
    /// Build a value in the given destination format. Integer formats drop
    /// the fractional part, so `"41.6"` steps count as 41.
    pub fn from_f64(value: f64, format: FieldFormat) -> Self {
        match format {
            FieldFormat::FloatPoint => MetricValue::Float(value),
            FieldFormat::Integer => MetricValue::Int(value.trunc() as i64),
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            MetricValue::Float(v) => *v,
            MetricValue::Int(v) => *v as f64,
        }
    }
}

/// One normalized time-series point.
///
/// Invariant: `end_ms >= start_ms` once the point has been through
/// [`repair_interval`](crate::normalize::repair_interval). Points are never
/// mutated; repairs produce a new value via [`MetricPoint::repaired`].
#[derive(Debug, Clone, PartialEq)]
pub struct MetricPoint {
    pub start_ms: i64,
    pub end_ms: i64,
    pub metric: MetricKind,
    pub value: MetricValue,
}

impl MetricPoint {
    pub fn new(start_ms: i64, end_ms: i64, metric: MetricKind, value: MetricValue) -> Self {
        Self {
            start_ms,
            end_ms,
            metric,
            value,
        }
    }

    /// Return a copy whose interval has been repaired to at least
    /// `min_duration_ms` when it was empty or inverted.
    pub fn repaired(&self, min_duration_ms: i64) -> Self {
        let (start_ms, end_ms) =
            crate::normalize::repair_interval(self.start_ms, self.end_ms, min_duration_ms);
        Self {
            start_ms,
            end_ms,
            ..self.clone()
        }
    }
}

/// An ordered run of points that is uploaded as one sequence.
///
/// Day-bucketed metrics produce one series per UTC day (labelled
/// `YYYY-MM-DD`); every other metric produces a single series labelled
/// `"all"`. Points are sorted ascending by start time.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub label: String,
    pub points: Vec<MetricPoint>,
}

/// Remote activity type of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityType {
    Badminton,
    Sleep,
}

impl ActivityType {
    /// Google Fit activity type code.
    pub fn code(&self) -> i32 {
        match self {
            ActivityType::Badminton => 10,
            ActivityType::Sleep => 72,
        }
    }
}

/// Upload lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Assembled locally, not yet sent.
    Built,
    /// The remote session exists but its segments are not (or failed to be) written.
    SessionLive,
    /// Session and all linked segments are written.
    Complete,
}

/// A bounded-time activity (workout or sleep) with its per-segment points.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: String,
    pub name: String,
    pub description: String,
    pub start_ms: i64,
    pub end_ms: i64,
    pub activity_type: ActivityType,
    pub segments: Vec<MetricPoint>,
}
