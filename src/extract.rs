//! Streaming record extraction from an Apple Health `export.xml`.
//!
//! Exports routinely exceed a gigabyte, so the document is never loaded
//! whole. [`ElementScanner`] pulls events from a `quick_xml` reader and
//! yields one [`RawElement`] per opened element (optionally only for a set
//! of tag names). [`extract_metric`] drives a scanner through a metric's
//! catalog row and hands every accepted record to the matching accumulator.
//!
//! Records with a missing or unparseable date or numeric value are dropped
//! with a warning. A malformed XML stream stops extraction with an error.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;
use tracing::{debug, warn};

use health_sync_core::aggregate::SeriesAccumulator;
use health_sync_core::catalog::{Aggregation, MetricSpec};
use health_sync_core::models::{MetricPoint, MetricValue, Series, Session};
use health_sync_core::normalize::{convert_unit, parse_number, parse_timestamp_ms};
use health_sync_core::sessions::SessionAccumulator;

use crate::progress::{ProgressEvent, ProgressReporter};

/// Matched records between two scanning progress events.
const PROGRESS_EVERY: u64 = 1000;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to open export {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed XML at byte {position}: {message}")]
    Xml { position: u64, message: String },
}

/// Tag name and attributes of one opened element.
#[derive(Debug, Clone, PartialEq)]
pub struct RawElement {
    pub tag: String,
    pub attributes: Vec<(String, String)>,
}

impl RawElement {
    /// Value of the named attribute, if present.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Lazy iterator over the elements of an XML stream.
///
/// Reads only as far as the consumer pulls; dropping the scanner stops
/// reading. After an error the iterator is exhausted.
pub struct ElementScanner<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    tags: Vec<String>,
    done: bool,
}

impl<R: BufRead> ElementScanner<R> {
    pub fn new(input: R) -> Self {
        Self {
            reader: Reader::from_reader(input),
            buf: Vec::new(),
            tags: Vec::new(),
            done: false,
        }
    }

    /// Only surface elements with one of these tag names. Attributes of
    /// other elements are never decoded.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    fn xml_error(&self, message: String) -> ExtractError {
        ExtractError::Xml {
            position: self.reader.buffer_position() as u64,
            message,
        }
    }
}

/// Open an export file for scanning.
pub fn open_export(path: &Path) -> Result<ElementScanner<BufReader<File>>, ExtractError> {
    let file = File::open(path).map_err(|source| ExtractError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(ElementScanner::new(BufReader::new(file)))
}

fn wanted(tags: &[String], element: &BytesStart<'_>) -> bool {
    tags.is_empty() || tags.iter().any(|t| t.as_bytes() == element.name().as_ref())
}

/// Decode an element's attributes. A malformed attribute is skipped with a
/// warning so that it only affects the record carrying it; duplicates keep
/// the first occurrence.
fn to_raw(element: &BytesStart<'_>) -> RawElement {
    let tag = String::from_utf8_lossy(element.name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attr in element.attributes().with_checks(false) {
        let attr = match attr {
            Ok(attr) => attr,
            Err(e) => {
                warn!(tag = %tag, error = %e, "ignoring malformed attributes");
                break;
            }
        };
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        match attr.unescape_value() {
            Ok(value) => attributes.push((key, value.into_owned())),
            Err(e) => {
                warn!(tag = %tag, attribute = %key, error = %e, "ignoring undecodable attribute")
            }
        }
    }
    RawElement { tag, attributes }
}

impl<R: BufRead> Iterator for ElementScanner<R> {
    type Item = Result<RawElement, ExtractError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            self.buf.clear();
            let decoded = match self.reader.read_event_into(&mut self.buf) {
                Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                    if !wanted(&self.tags, &e) {
                        continue;
                    }
                    Ok(to_raw(&e))
                }
                Ok(Event::Eof) => {
                    self.done = true;
                    return None;
                }
                Ok(_) => continue,
                Err(e) => Err(e.to_string()),
            };
            return Some(match decoded {
                Ok(element) => Ok(element),
                Err(message) => {
                    self.done = true;
                    Err(self.xml_error(message))
                }
            });
        }
    }
}

/// Accumulated output of one metric's scan.
#[derive(Debug)]
pub enum Extracted {
    Series(Vec<Series>),
    Sessions(Vec<Session>),
}

impl Extracted {
    pub fn is_empty(&self) -> bool {
        match self {
            Extracted::Series(series) => series.is_empty(),
            Extracted::Sessions(sessions) => sessions.is_empty(),
        }
    }
}

/// Result of scanning an export for one metric.
#[derive(Debug)]
pub struct Extraction {
    /// Elements that matched the metric's source filter.
    pub matched: u64,
    /// Matched elements dropped for a bad date or value.
    pub dropped: u64,
    pub output: Extracted,
}

enum Sink {
    Series(SeriesAccumulator),
    Sessions(SessionAccumulator),
}

/// Scan `elements` for `spec`'s records and aggregate them.
///
/// The returned collection is complete: every open bucket has been closed.
pub fn extract_metric<I>(
    elements: I,
    spec: &MetricSpec,
    progress: &dyn ProgressReporter,
) -> Result<Extraction, ExtractError>
where
    I: IntoIterator<Item = Result<RawElement, ExtractError>>,
{
    let mut sink = match spec.session {
        Some(session) if spec.aggregation.is_session() => {
            Sink::Sessions(SessionAccumulator::new(session))
        }
        _ => Sink::Series(SeriesAccumulator::new(
            spec.kind,
            spec.field.format,
            spec.aggregation,
        )),
    };

    let mut matched = 0u64;
    let mut dropped = 0u64;

    for element in elements {
        let element = element?;
        if !spec.source.matches(&element.tag, |name| element.attr(name)) {
            continue;
        }
        matched += 1;
        if matched % PROGRESS_EVERY == 0 {
            progress.report(ProgressEvent::Scanning {
                metric: spec.name().to_string(),
                matched,
            });
        }

        if !accept(&element, spec, &mut sink) {
            dropped += 1;
        }
    }

    debug!(metric = spec.name(), matched, dropped, "export scan finished");
    progress.report(ProgressEvent::Scanning {
        metric: spec.name().to_string(),
        matched,
    });

    let output = match sink {
        Sink::Series(acc) => Extracted::Series(acc.finish()),
        Sink::Sessions(acc) => Extracted::Sessions(acc.finish()),
    };
    Ok(Extraction {
        matched,
        dropped,
        output,
    })
}

/// Feed one matching element into the sink. Returns `false` when the
/// record was dropped.
fn accept(element: &RawElement, spec: &MetricSpec, sink: &mut Sink) -> bool {
    let start = element.attr("startDate").and_then(parse_timestamp_ms);
    let end = element.attr("endDate").and_then(parse_timestamp_ms);
    let (start_ms, end_ms) = match (start, end) {
        (Some(s), Some(e)) => (s, e),
        _ => {
            warn!(
                metric = spec.name(),
                start = element.attr("startDate").unwrap_or(""),
                end = element.attr("endDate").unwrap_or(""),
                "dropping record with unparseable dates"
            );
            return false;
        }
    };

    match sink {
        Sink::Sessions(acc) => {
            match spec.aggregation {
                Aggregation::Workout => {
                    let calories = element
                        .attr(spec.value_attribute)
                        .and_then(parse_number)
                        .unwrap_or(0.0);
                    acc.push_workout(start_ms, end_ms, calories);
                }
                _ => {
                    let category = element.attr(spec.value_attribute).unwrap_or("");
                    acc.push_sleep_stage(start_ms, end_ms, category);
                }
            }
            true
        }
        Sink::Series(acc) => {
            let raw = element.attr(spec.value_attribute);
            let Some(value) = raw.and_then(parse_number) else {
                warn!(
                    metric = spec.name(),
                    value = raw.unwrap_or(""),
                    "dropping record with unparseable value"
                );
                return false;
            };
            let value = convert_unit(value, spec.unit);
            // Scalar readings are instants; the upload repairs them to one minute.
            let end_ms = if matches!(spec.aggregation, Aggregation::None) {
                start_ms
            } else {
                end_ms
            };
            acc.push(MetricPoint::new(
                start_ms,
                end_ms,
                spec.kind,
                MetricValue::from_f64(value, spec.field.format),
            ));
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use health_sync_core::catalog::find_spec;
    use health_sync_core::normalize::MIN_INTERVAL_MS;

    const EXPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE HealthData [
<!ELEMENT HealthData (ExportDate,Me,(Record|Workout)*)>
]>
<HealthData locale="en_US">
 <ExportDate value="2024-02-01 10:00:00 -0800"/>
 <Me HKCharacteristicTypeIdentifierBiologicalSex="HKBiologicalSexMale"/>
 <Record type="HKQuantityTypeIdentifierBodyMass" unit="kg" startDate="2024-01-01 00:00:00 +0000" endDate="2024-01-01 00:00:00 +0000" value="70.5"/>
 <Record type="HKQuantityTypeIdentifierHeight" unit="cm" startDate="2024-01-01 00:00:00 +0000" endDate="2024-01-01 00:00:00 +0000" value="180"/>
 <Record type="HKQuantityTypeIdentifierBodyMass" unit="kg" startDate="garbage" endDate="2024-01-01 00:00:00 +0000" value="71"/>
 <Record type="HKQuantityTypeIdentifierBodyMass" unit="kg" startDate="2024-01-02 00:00:00 +0000" endDate="2024-01-02 00:00:00 +0000" value="abc"/>
 <Record type="HKQuantityTypeIdentifierBodyMass" unit="kg" startDate="2024-01-02 00:00:00 +0000" endDate="2024-01-02 00:00:00 +0000" value="71.2">
  <MetadataEntry key="HKWasUserEntered" value="1"/>
 </Record>
 <Workout workoutActivityType="HKWorkoutActivityTypeBadminton" duration="60" startDate="2024-01-03 18:00:00 +0000" endDate="2024-01-03 19:00:00 +0000" totalEnergyBurned="412.5" totalEnergyBurnedUnit="kcal"/>
 <Workout workoutActivityType="HKWorkoutActivityTypeRunning" startDate="2024-01-03 07:00:00 +0000" endDate="2024-01-03 07:30:00 +0000"/>
</HealthData>
"#;

    fn scanner() -> ElementScanner<&'static [u8]> {
        ElementScanner::new(EXPORT.as_bytes())
    }

    #[test]
    fn scanner_yields_every_element_in_document_order() {
        let tags: Vec<String> = scanner().map(|e| e.unwrap().tag).collect();
        assert_eq!(tags[0], "HealthData");
        assert_eq!(tags[1], "ExportDate");
        assert!(tags.contains(&"MetadataEntry".to_string()));
        assert_eq!(tags.last().map(String::as_str), Some("Workout"));
    }

    #[test]
    fn tag_filter_skips_other_elements() {
        let records: Vec<RawElement> = scanner()
            .with_tags(["Record"])
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(records.len(), 5);
        assert_eq!(records[0].attr("value"), Some("70.5"));
        assert_eq!(records[0].attr("missing"), None);
    }

    #[test]
    fn weights_are_extracted_and_bad_records_dropped() {
        let spec = find_spec("weight").unwrap();
        let extraction = extract_metric(scanner(), spec, &NoProgress).unwrap();
        assert_eq!(extraction.matched, 4);
        assert_eq!(extraction.dropped, 2);
        let Extracted::Series(series) = extraction.output else {
            panic!("expected series");
        };
        assert_eq!(series.len(), 1);
        let values: Vec<MetricValue> = series[0].points.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![MetricValue::Float(70.5), MetricValue::Float(71.2)]);
    }

    #[test]
    fn scalar_readings_ignore_the_record_end_date() {
        let export = r#"<HealthData>
 <Record type="HKQuantityTypeIdentifierBodyMass" startDate="2024-01-01 00:00:00 +0000" endDate="2024-01-01 00:10:00 +0000" value="70"/>
 <Record type="HKQuantityTypeIdentifierStepCount" startDate="2024-01-01 00:00:00 +0000" endDate="2024-01-01 00:10:00 +0000" value="500"/>
</HealthData>"#;
        let jan_1 = 1_704_067_200_000;

        let weight = find_spec("weight").unwrap();
        let extraction =
            extract_metric(ElementScanner::new(export.as_bytes()), weight, &NoProgress).unwrap();
        let Extracted::Series(series) = extraction.output else {
            panic!("expected series");
        };
        let point = series[0].points[0].repaired(MIN_INTERVAL_MS);
        assert_eq!((point.start_ms, point.end_ms), (jan_1, jan_1 + 60_000));

        let steps = find_spec("steps").unwrap();
        let extraction =
            extract_metric(ElementScanner::new(export.as_bytes()), steps, &NoProgress).unwrap();
        let Extracted::Series(series) = extraction.output else {
            panic!("expected series");
        };
        assert_eq!(series[0].points[0].end_ms, jan_1 + 600_000);
    }

    #[test]
    fn height_is_converted_to_meters() {
        let spec = find_spec("height").unwrap();
        let extraction = extract_metric(scanner(), spec, &NoProgress).unwrap();
        let Extracted::Series(series) = extraction.output else {
            panic!("expected series");
        };
        assert!((series[0].points[0].value.as_f64() - 1.8).abs() < 1e-9);
    }

    #[test]
    fn badminton_workouts_become_sessions() {
        let spec = find_spec("badminton").unwrap();
        let extraction = extract_metric(scanner(), spec, &NoProgress).unwrap();
        assert_eq!(extraction.matched, 1);
        let Extracted::Sessions(sessions) = extraction.output else {
            panic!("expected sessions");
        };
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].segments[0].value, MetricValue::Float(412.5));
    }

    #[test]
    fn no_matches_yields_empty_output() {
        let spec = find_spec("sleep").unwrap();
        let extraction = extract_metric(scanner(), spec, &NoProgress).unwrap();
        assert_eq!(extraction.matched, 0);
        assert!(extraction.output.is_empty());
    }

    #[test]
    fn bad_attributes_only_affect_their_own_record() {
        let export = r#"<HealthData>
 <Record type="HKQuantityTypeIdentifierStepCount" startDate="2024-01-01 00:00:00 +0000" endDate="2024-01-01 00:00:00 +0000" value="&bogus;"/>
 <Record type="HKQuantityTypeIdentifierHeartRate" type="x" startDate="2024-01-01 00:00:00 +0000" endDate="2024-01-01 00:00:00 +0000" value="60"/>
 <Record type="HKQuantityTypeIdentifierBodyMass" startDate="2024-01-01 00:00:00 +0000" endDate="2024-01-01 00:00:00 +0000" value="70.5"/>
</HealthData>"#;
        let records: Vec<RawElement> = ElementScanner::new(export.as_bytes())
            .with_tags(["Record"])
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].attr("value"), None);
        assert_eq!(records[1].attr("type"), Some("HKQuantityTypeIdentifierHeartRate"));

        let spec = find_spec("weight").unwrap();
        let extraction =
            extract_metric(ElementScanner::new(export.as_bytes()), spec, &NoProgress).unwrap();
        assert_eq!(extraction.matched, 1);
        assert_eq!(extraction.dropped, 0);

        let spec = find_spec("steps").unwrap();
        let extraction =
            extract_metric(ElementScanner::new(export.as_bytes()), spec, &NoProgress).unwrap();
        assert_eq!(extraction.matched, 1);
        assert_eq!(extraction.dropped, 1);
    }

    #[test]
    fn malformed_xml_is_fatal() {
        let broken = "<HealthData><Record type=\"x\" value=\"1\"></Workout></HealthData>";
        let spec = find_spec("weight").unwrap();
        let result = extract_metric(ElementScanner::new(broken.as_bytes()), spec, &NoProgress);
        assert!(matches!(result, Err(ExtractError::Xml { .. })));
    }

    #[test]
    fn missing_export_is_an_open_error() {
        let result = open_export(Path::new("/nonexistent/export.xml"));
        assert!(matches!(result, Err(ExtractError::Open { .. })));
    }
}
