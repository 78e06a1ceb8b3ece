//! Time bucketing for high-frequency metrics.
//!
//! [`SeriesAccumulator`] receives points one at a time while the export is
//! streamed and turns them into upload-ready [`Series`] once the stream ends.
//! The strategy comes from the metric's [`Aggregation`]:
//!
//! - `None`: identity, one point per record.
//! - `SumPerMinute`: values summed per UTC minute, one 60 s point per bucket.
//! - `GroupByDay`: points grouped per UTC day.
//!
//! Every series is sorted ascending by start time on output: the uploader
//! derives each write window from the first and last point of a chunk.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::catalog::Aggregation;
use crate::models::{FieldFormat, MetricKind, MetricPoint, MetricValue, Series};
use crate::normalize::MIN_INTERVAL_MS;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Label of the single series produced by non-day strategies.
pub const ALL_SERIES_LABEL: &str = "all";

/// Calendar granularity of a bucket key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Day,
    Minute,
}

impl Granularity {
    fn span_ms(&self) -> i64 {
        match self {
            Granularity::Day => DAY_MS,
            Granularity::Minute => MIN_INTERVAL_MS,
        }
    }
}

/// UTC calendar key of a timestamp: `YYYY-MM-DD` or `YYYY-MM-DDTHH:MM`.
pub fn bucket_key(timestamp_ms: i64, granularity: Granularity) -> String {
    let dt: DateTime<Utc> = DateTime::from_timestamp_millis(timestamp_ms).unwrap_or_default();
    match granularity {
        Granularity::Day => dt.format("%Y-%m-%d").to_string(),
        Granularity::Minute => dt.format("%Y-%m-%dT%H:%M").to_string(),
    }
}

/// Start of the bucket containing `timestamp_ms`, in epoch milliseconds.
pub fn bucket_start_ms(timestamp_ms: i64, granularity: Granularity) -> i64 {
    timestamp_ms.div_euclid(granularity.span_ms()) * granularity.span_ms()
}

/// Streaming accumulator for one series-shaped metric.
#[derive(Debug)]
pub struct SeriesAccumulator {
    metric: MetricKind,
    format: FieldFormat,
    strategy: Aggregation,
    points: Vec<MetricPoint>,
    minutes: BTreeMap<i64, f64>,
    days: BTreeMap<String, Vec<MetricPoint>>,
    accepted: u64,
}

impl SeriesAccumulator {
    /// Create an accumulator. Session strategies are treated as identity;
    /// sessions are assembled by [`SessionAccumulator`](crate::sessions::SessionAccumulator).
    pub fn new(metric: MetricKind, format: FieldFormat, strategy: Aggregation) -> Self {
        Self {
            metric,
            format,
            strategy,
            points: Vec::new(),
            minutes: BTreeMap::new(),
            days: BTreeMap::new(),
            accepted: 0,
        }
    }

    /// Number of points pushed so far.
    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    /// Add one extracted point. The point's interval is repaired first.
    pub fn push(&mut self, point: MetricPoint) {
        let point = point.repaired(MIN_INTERVAL_MS);
        self.accepted += 1;
        match self.strategy {
            Aggregation::SumPerMinute => {
                let minute = bucket_start_ms(point.start_ms, Granularity::Minute);
                *self.minutes.entry(minute).or_insert(0.0) += point.value.as_f64();
            }
            Aggregation::GroupByDay => {
                let day = bucket_key(point.start_ms, Granularity::Day);
                self.days.entry(day).or_default().push(point);
            }
            Aggregation::None | Aggregation::SleepNight | Aggregation::Workout => {
                self.points.push(point);
            }
        }
    }

    /// Close every open bucket and return the upload-ready series.
    ///
    /// Returns no series at all when nothing was pushed.
    pub fn finish(self) -> Vec<Series> {
        match self.strategy {
            Aggregation::SumPerMinute => {
                let points: Vec<MetricPoint> = self
                    .minutes
                    .into_iter()
                    .map(|(start_ms, total)| {
                        MetricPoint::new(
                            start_ms,
                            start_ms + MIN_INTERVAL_MS,
                            self.metric,
                            MetricValue::from_f64(total, self.format),
                        )
                    })
                    .collect();
                single_series(points)
            }
            Aggregation::GroupByDay => self
                .days
                .into_iter()
                .map(|(label, mut points)| {
                    points.sort_by_key(|p| p.start_ms);
                    Series { label, points }
                })
                .collect(),
            Aggregation::None | Aggregation::SleepNight | Aggregation::Workout => {
                let mut points = self.points;
                points.sort_by_key(|p| p.start_ms);
                single_series(points)
            }
        }
    }
}

fn single_series(points: Vec<MetricPoint>) -> Vec<Series> {
    if points.is_empty() {
        return Vec::new();
    }
    vec![Series {
        label: ALL_SERIES_LABEL.to_string(),
        points,
    }]
}

#[cfg(test)]
mod tests {
    use super::*;

    const JAN_1: i64 = 1_704_067_200_000; // 2024-01-01T00:00:00Z

    fn point(kind: MetricKind, start: i64, end: i64, value: MetricValue) -> MetricPoint {
        MetricPoint::new(start, end, kind, value)
    }

    #[test]
    fn bucket_keys_are_utc_calendar_strings() {
        assert_eq!(bucket_key(JAN_1, Granularity::Day), "2024-01-01");
        assert_eq!(
            bucket_key(JAN_1 + 90 * 60 * 1000 + 59_999, Granularity::Minute),
            "2024-01-01T01:30"
        );
        assert_eq!(bucket_key(JAN_1 - 1, Granularity::Day), "2023-12-31");
    }

    #[test]
    fn bucket_start_matches_key() {
        let ts = JAN_1 + 3 * DAY_MS + 12_345_678;
        let minute = bucket_start_ms(ts, Granularity::Minute);
        assert_eq!(
            bucket_key(minute, Granularity::Minute),
            bucket_key(ts, Granularity::Minute)
        );
        assert_eq!(minute % MIN_INTERVAL_MS, 0);
        assert_eq!(bucket_start_ms(ts, Granularity::Day), JAN_1 + 3 * DAY_MS);
    }

    #[test]
    fn calories_sum_per_minute() {
        let mut acc = SeriesAccumulator::new(
            MetricKind::Calories,
            FieldFormat::FloatPoint,
            Aggregation::SumPerMinute,
        );
        acc.push(point(
            MetricKind::Calories,
            JAN_1 + 5_000,
            JAN_1 + 5_000,
            MetricValue::Float(1.5),
        ));
        acc.push(point(
            MetricKind::Calories,
            JAN_1 + 30_000,
            JAN_1 + 40_000,
            MetricValue::Float(2.0),
        ));
        acc.push(point(
            MetricKind::Calories,
            JAN_1 + 61_000,
            JAN_1 + 62_000,
            MetricValue::Float(0.25),
        ));

        let series = acc.finish();
        assert_eq!(series.len(), 1);
        let points = &series[0].points;
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].start_ms, JAN_1);
        assert_eq!(points[0].end_ms, JAN_1 + MIN_INTERVAL_MS);
        assert_eq!(points[0].value, MetricValue::Float(3.5));
        assert_eq!(points[1].start_ms, JAN_1 + MIN_INTERVAL_MS);
        assert_eq!(points[1].value, MetricValue::Float(0.25));
    }

    #[test]
    fn steps_group_per_day_sorted() {
        let mut acc =
            SeriesAccumulator::new(MetricKind::Steps, FieldFormat::Integer, Aggregation::GroupByDay);
        acc.push(point(
            MetricKind::Steps,
            JAN_1 + DAY_MS + 10,
            JAN_1 + DAY_MS + 20,
            MetricValue::Int(7),
        ));
        acc.push(point(
            MetricKind::Steps,
            JAN_1 + 5_000_000,
            JAN_1 + 5_000_000,
            MetricValue::Int(3),
        ));
        acc.push(point(MetricKind::Steps, JAN_1 + 1_000, JAN_1 + 2_000, MetricValue::Int(5)));

        let series = acc.finish();
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].label, "2024-01-01");
        assert_eq!(series[1].label, "2024-01-02");
        let day1 = &series[0].points;
        assert_eq!(day1[0].start_ms, JAN_1 + 1_000);
        assert_eq!(day1[1].start_ms, JAN_1 + 5_000_000);
        assert_eq!(day1[1].end_ms, JAN_1 + 5_000_000 + MIN_INTERVAL_MS);
    }

    #[test]
    fn identity_keeps_every_point() {
        let mut acc =
            SeriesAccumulator::new(MetricKind::Weight, FieldFormat::FloatPoint, Aggregation::None);
        acc.push(point(
            MetricKind::Weight,
            JAN_1 + DAY_MS,
            JAN_1 + DAY_MS,
            MetricValue::Float(71.0),
        ));
        acc.push(point(MetricKind::Weight, JAN_1, JAN_1, MetricValue::Float(70.5)));
        assert_eq!(acc.accepted(), 2);

        let series = acc.finish();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].label, ALL_SERIES_LABEL);
        assert_eq!(series[0].points[0].value, MetricValue::Float(70.5));
        assert_eq!(series[0].points[1].end_ms, JAN_1 + DAY_MS + MIN_INTERVAL_MS);
    }

    #[test]
    fn empty_accumulator_yields_nothing() {
        for strategy in [Aggregation::None, Aggregation::SumPerMinute, Aggregation::GroupByDay] {
            let acc = SeriesAccumulator::new(MetricKind::Weight, FieldFormat::FloatPoint, strategy);
            assert!(acc.finish().is_empty());
        }
    }
}
