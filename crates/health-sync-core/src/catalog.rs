//! The metric catalog: one table row per supported metric.
//!
//! Each [`MetricSpec`] says which export elements belong to the metric, how
//! to read and convert their value, how to aggregate the result, and which
//! remote data type and stream receive it. The scanner, aggregator, and
//! uploaders are generic over this table.
//!
//! | Metric | Source | Aggregation | Destination |
//! |--------|--------|-------------|-------------|
//! | `weight` | `HKQuantityTypeIdentifierBodyMass` | none | `com.google.weight` |
//! | `height` | `HKQuantityTypeIdentifierHeight` (cm → m) | none | `com.google.height` |
//! | `bmi` | `HKQuantityTypeIdentifierBodyMassIndex` | none | `com.google.body.mass.index` |
//! | `body_fat` | `HKQuantityTypeIdentifierBodyFatPercentage` (fraction → %) | none | `com.google.body.fat.percentage` |
//! | `oxygen_saturation` | `HKQuantityTypeIdentifierOxygenSaturation` (fraction → %) | none | `com.google.oxygen_saturation` |
//! | `steps` | `HKQuantityTypeIdentifierStepCount` | per day | `com.google.step_count.delta` |
//! | `calories` | `HKQuantityTypeIdentifierActiveEnergyBurned` | sum per minute | `com.google.calories.expended` |
//! | `distance` | `HKQuantityTypeIdentifierDistanceWalkingRunning` | per day | `com.google.distance.delta` |
//! | `sleep` | `HKCategoryTypeIdentifierSleepAnalysis` | session per night | `com.google.sleep.segment` |
//! | `badminton` | `Workout` / `HKWorkoutActivityTypeBadminton` | session per workout | `com.google.calories.expended` |

use crate::models::{ActivityType, FieldFormat, MetricKind};
use crate::normalize::UnitRule;

/// How extracted points are reduced before upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    /// One point per record.
    None,
    /// Values summed into one-minute buckets.
    SumPerMinute,
    /// Repaired intervals grouped per UTC day and sorted by start.
    GroupByDay,
    /// Records grouped into one sleep session per UTC day of their start.
    SleepNight,
    /// One session per matching workout element.
    Workout,
}

impl Aggregation {
    /// Whether this metric uploads sessions rather than plain series.
    pub fn is_session(&self) -> bool {
        matches!(self, Aggregation::SleepNight | Aggregation::Workout)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Aggregation::None => "none",
            Aggregation::SumPerMinute => "sum/minute",
            Aggregation::GroupByDay => "group/day",
            Aggregation::SleepNight => "session/night",
            Aggregation::Workout => "session/workout",
        }
    }
}

/// One field of a remote data type schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub format: FieldFormat,
}

/// Which export elements feed a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceFilter {
    /// Element tag, e.g. `Record` or `Workout`.
    pub tag: &'static str,
    /// Discriminating attribute name, e.g. `type`.
    pub attribute: &'static str,
    /// Required value of the discriminating attribute.
    pub value: &'static str,
}

impl SourceFilter {
    /// Whether an element with this tag and attribute lookup matches.
    pub fn matches<'a>(&self, tag: &str, lookup: impl Fn(&str) -> Option<&'a str>) -> bool {
        tag == self.tag && lookup(self.attribute) == Some(self.value)
    }
}

/// Session-specific settings for sleep and workout metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSpec {
    pub activity_type: ActivityType,
    /// Display name of created sessions.
    pub name: &'static str,
    /// Prefix of the generated session id (`<prefix>-<uuid>`).
    pub id_prefix: &'static str,
}

/// A row of the metric catalog.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricSpec {
    pub kind: MetricKind,
    pub source: SourceFilter,
    /// Attribute holding the numeric (or categorical, for sleep) value.
    pub value_attribute: &'static str,
    pub unit: UnitRule,
    pub aggregation: Aggregation,
    /// Remote data type name, e.g. `com.google.weight`.
    pub data_type_name: &'static str,
    /// The single value field written for each point.
    pub field: FieldSpec,
    /// Explicit schema registered when the data source is created; `None`
    /// registers the default single-field schema built from `field`.
    pub schema: Option<&'static [FieldSpec]>,
    /// Display name of the destination data stream.
    pub stream_name: &'static str,
    /// Preferred points per upload call; falls back to the configured default.
    pub chunk_size: Option<usize>,
    pub session: Option<SessionSpec>,
}

impl MetricSpec {
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// Schema fields to register for the data source.
    pub fn schema_fields(&self) -> Vec<FieldSpec> {
        match self.schema {
            Some(fields) => fields.to_vec(),
            None => vec![self.field],
        }
    }
}

const fn record(type_identifier: &'static str) -> SourceFilter {
    SourceFilter {
        tag: "Record",
        attribute: "type",
        value: type_identifier,
    }
}

const fn float_field(name: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        format: FieldFormat::FloatPoint,
    }
}

const BMI_SCHEMA: &[FieldSpec] = &[float_field("bmi")];

/// Apple sleep-analysis category values and the remote sleep stage codes
/// they map to. Unknown values map to [`DEFAULT_SLEEP_STAGE`].
pub const SLEEP_STAGES: &[(&str, i64)] = &[
    ("HKCategoryValueSleepAnalysisInBed", 3),
    ("HKCategoryValueSleepAnalysisAsleep", 2),
    ("HKCategoryValueSleepAnalysisAsleepUnspecified", 2),
    ("HKCategoryValueSleepAnalysisAsleepCore", 4),
    ("HKCategoryValueSleepAnalysisAsleepDeep", 5),
    ("HKCategoryValueSleepAnalysisAsleepREM", 6),
    ("HKCategoryValueSleepAnalysisAwake", 1),
];

/// Generic "asleep" stage.
pub const DEFAULT_SLEEP_STAGE: i64 = 2;

/// Map an Apple sleep category value to a remote sleep stage code.
pub fn sleep_stage(category: &str) -> i64 {
    SLEEP_STAGES
        .iter()
        .find(|(name, _)| *name == category)
        .map(|(_, code)| *code)
        .unwrap_or(DEFAULT_SLEEP_STAGE)
}

/// The full catalog, in [`MetricKind::ALL`] order.
pub const CATALOG: [MetricSpec; 10] = [
    MetricSpec {
        kind: MetricKind::Weight,
        source: record("HKQuantityTypeIdentifierBodyMass"),
        value_attribute: "value",
        unit: UnitRule::Identity,
        aggregation: Aggregation::None,
        data_type_name: "com.google.weight",
        field: float_field("weight"),
        schema: None,
        stream_name: "apple_health_weight_clean",
        chunk_size: None,
        session: None,
    },
    MetricSpec {
        kind: MetricKind::Height,
        source: record("HKQuantityTypeIdentifierHeight"),
        value_attribute: "value",
        unit: UnitRule::CentimetersToMeters,
        aggregation: Aggregation::None,
        data_type_name: "com.google.height",
        field: float_field("height"),
        schema: None,
        stream_name: "apple_health_height_clean",
        chunk_size: None,
        session: None,
    },
    MetricSpec {
        kind: MetricKind::BodyMassIndex,
        source: record("HKQuantityTypeIdentifierBodyMassIndex"),
        value_attribute: "value",
        unit: UnitRule::Identity,
        aggregation: Aggregation::None,
        data_type_name: "com.google.body.mass.index",
        field: float_field("bmi"),
        schema: Some(BMI_SCHEMA),
        stream_name: "apple_health_bmi_clean",
        chunk_size: None,
        session: None,
    },
    MetricSpec {
        kind: MetricKind::BodyFat,
        source: record("HKQuantityTypeIdentifierBodyFatPercentage"),
        value_attribute: "value",
        unit: UnitRule::FractionToPercent,
        aggregation: Aggregation::None,
        data_type_name: "com.google.body.fat.percentage",
        field: float_field("percentage"),
        schema: None,
        stream_name: "apple_health_body_fat_clean",
        chunk_size: None,
        session: None,
    },
    MetricSpec {
        kind: MetricKind::OxygenSaturation,
        source: record("HKQuantityTypeIdentifierOxygenSaturation"),
        value_attribute: "value",
        unit: UnitRule::FractionToPercent,
        aggregation: Aggregation::None,
        data_type_name: "com.google.oxygen_saturation",
        field: float_field("oxygen_saturation"),
        schema: None,
        stream_name: "apple_health_oxygen_clean",
        chunk_size: None,
        session: None,
    },
    MetricSpec {
        kind: MetricKind::Steps,
        source: record("HKQuantityTypeIdentifierStepCount"),
        value_attribute: "value",
        unit: UnitRule::Identity,
        aggregation: Aggregation::GroupByDay,
        data_type_name: "com.google.step_count.delta",
        field: FieldSpec {
            name: "steps",
            format: FieldFormat::Integer,
        },
        schema: None,
        stream_name: "apple_health_steps_clean",
        chunk_size: None,
        session: None,
    },
    MetricSpec {
        kind: MetricKind::Calories,
        source: record("HKQuantityTypeIdentifierActiveEnergyBurned"),
        value_attribute: "value",
        unit: UnitRule::Identity,
        aggregation: Aggregation::SumPerMinute,
        data_type_name: "com.google.calories.expended",
        field: float_field("calories"),
        schema: None,
        stream_name: "apple_health_calories_clean",
        chunk_size: Some(1000),
        session: None,
    },
    MetricSpec {
        kind: MetricKind::Distance,
        source: record("HKQuantityTypeIdentifierDistanceWalkingRunning"),
        value_attribute: "value",
        unit: UnitRule::Identity,
        aggregation: Aggregation::GroupByDay,
        data_type_name: "com.google.distance.delta",
        field: float_field("distance"),
        schema: None,
        stream_name: "apple_health_distance_clean",
        chunk_size: None,
        session: None,
    },
    MetricSpec {
        kind: MetricKind::Sleep,
        source: record("HKCategoryTypeIdentifierSleepAnalysis"),
        value_attribute: "value",
        unit: UnitRule::Identity,
        aggregation: Aggregation::SleepNight,
        data_type_name: "com.google.sleep.segment",
        field: FieldSpec {
            name: "sleep_segment_type",
            format: FieldFormat::Integer,
        },
        schema: None,
        stream_name: "apple_health_sleep_clean",
        chunk_size: None,
        session: Some(SessionSpec {
            activity_type: ActivityType::Sleep,
            name: "Sleep",
            id_prefix: "sleep",
        }),
    },
    MetricSpec {
        kind: MetricKind::Badminton,
        source: SourceFilter {
            tag: "Workout",
            attribute: "workoutActivityType",
            value: "HKWorkoutActivityTypeBadminton",
        },
        value_attribute: "totalEnergyBurned",
        unit: UnitRule::Identity,
        aggregation: Aggregation::Workout,
        data_type_name: "com.google.calories.expended",
        field: float_field("calories"),
        schema: None,
        stream_name: "apple_health_badminton_calories",
        chunk_size: None,
        session: Some(SessionSpec {
            activity_type: ActivityType::Badminton,
            name: "Badminton Match",
            id_prefix: "badminton",
        }),
    },
];

/// Catalog row for a metric.
pub fn spec_for(kind: MetricKind) -> &'static MetricSpec {
    // CATALOG is laid out in MetricKind::ALL order.
    &CATALOG[MetricKind::ALL
        .iter()
        .position(|k| *k == kind)
        .unwrap_or_default()]
}

/// Catalog row for a metric name (`"weight"`, `"body_fat"`, ...).
pub fn find_spec(name: &str) -> Option<&'static MetricSpec> {
    CATALOG.iter().find(|spec| spec.name() == name)
}
