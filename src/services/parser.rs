//! XML normalization of staged run documents into the run aggregate.
//!
//! Three independent documents feed one [`TestRun`]:
//! - the NUnit 3 result document (required; failure aborts the run)
//! - the system info document (optional)
//! - the system fingerprint document with measurements (optional)

use chrono::{DateTime, NaiveDateTime, Utc};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde::Deserialize;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    Measurement, RawRunData, RunKey, SystemInfo, TestResult, TestRun, unknown_time,
};

/// Result of parsing one optional document.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentOutcome<T> {
    Parsed(T),
    /// The document was not staged.
    Absent,
    /// The document was staged but could not be read; carries the reason.
    Failed(String),
}

impl<T> DocumentOutcome<T> {
    pub fn into_parsed(self) -> Option<T> {
        match self {
            DocumentOutcome::Parsed(value) => Some(value),
            _ => None,
        }
    }
}

/// Build the run aggregate for `key` from its raw documents.
///
/// Only a broken primary document is an error. A broken companion document is
/// logged and left out of the run.
pub fn parse_run(raw: &RawRunData, key: &RunKey) -> AppResult<TestRun> {
    debug!(length = raw.test_result_xml.len(), "Parsing result document");
    let primary = parse_primary(&raw.test_result_xml)?;

    let mut run = TestRun::new(key);
    run.overall_result = primary.overall_result;
    run.test_count = primary.test_count;
    run.passed_count = primary.passed_count;
    run.failed_count = primary.failed_count;
    run.skipped_count = primary.skipped_count;
    run.start_time = primary.start_time;
    run.end_time = primary.end_time;
    run.test_results = primary.test_results;
    run.raw_json = raw.test_result_xml.clone();
    run.raw_fingerprint_xml = raw.fingerprint_xml.clone();
    run.specflow_log = raw.specflow_log.clone();

    match parse_system_info(raw.system_info_xml.as_deref()) {
        DocumentOutcome::Parsed(system_info) => {
            info!(
                system_name = %system_info.system_name,
                product_family = %system_info.product_family,
                "Parsed system info document"
            );
            run.system_info = Some(system_info);
        }
        DocumentOutcome::Absent => debug!(run = %key, "No system info document"),
        DocumentOutcome::Failed(reason) => error!(
            host = %key.host,
            pdc = %key.pdc,
            run_id = %key.run_id,
            error = %reason,
            "Failed to parse system info document"
        ),
    }

    match parse_fingerprint(raw.fingerprint_xml.as_deref()) {
        DocumentOutcome::Parsed(measurements) => {
            info!(count = measurements.len(), "Parsed fingerprint document");
            run.measurements = measurements;
        }
        DocumentOutcome::Absent => debug!(run = %key, "No fingerprint document"),
        DocumentOutcome::Failed(reason) => error!(
            host = %key.host,
            pdc = %key.pdc,
            run_id = %key.run_id,
            error = %reason,
            "Failed to parse fingerprint document"
        ),
    }

    info!(
        test_count = run.test_count,
        passed = run.passed_count,
        failed = run.failed_count,
        has_system_info = run.system_info.is_some(),
        measurements = run.measurements.len(),
        "Parsed test run"
    );

    Ok(run)
}

// ============================================================================
// Primary result document (NUnit 3)
// ============================================================================

/// Values read from the primary result document.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryDocument {
    pub overall_result: String,
    pub test_count: i32,
    pub passed_count: i32,
    pub failed_count: i32,
    pub skipped_count: i32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub test_results: Vec<TestResult>,
}

/// Test case being read; closed by its end tag.
struct PendingCase {
    result: TestResult,
}

impl PendingCase {
    fn from_start(e: &BytesStart<'_>) -> AppResult<Self> {
        let test_name = match attr(e, b"fullname")? {
            Some(name) => name,
            None => attr(e, b"name")?.unwrap_or_else(|| "Unknown".to_string()),
        };

        Ok(PendingCase {
            result: TestResult {
                id: Uuid::now_v7(),
                test_name,
                result: attr(e, b"result")?.unwrap_or_else(|| "Unknown".to_string()),
                error_message: None,
                output: None,
                duration_seconds: parse_seconds(attr(e, b"duration")?.as_deref()),
            },
        })
    }
}

/// Text element being collected inside a test case, with its depth.
#[derive(Clone, Copy)]
enum Capture {
    Message(usize),
    Output(usize),
}

impl Capture {
    fn depth(self) -> usize {
        match self {
            Capture::Message(depth) | Capture::Output(depth) => depth,
        }
    }
}

/// Parse the NUnit 3 result document.
///
/// Counters come from the root attributes unless the root reports no tests
/// while test cases are present; then they are tallied from the cases.
pub fn parse_primary(xml: &str) -> AppResult<PrimaryDocument> {
    let mut reader = Reader::from_str(xml);
    let mut doc: Option<PrimaryDocument> = None;
    let mut current: Option<PendingCase> = None;
    let mut capture: Option<Capture> = None;
    let mut text = String::new();
    let mut depth: usize = 0;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| invalid_document(reader.buffer_position(), e))?;

        match event {
            Event::Start(e) => {
                depth += 1;
                if doc.is_none() {
                    doc = Some(read_root(&e)?);
                    continue;
                }
                let Some(doc) = doc.as_mut() else { continue };

                match e.name().as_ref() {
                    b"test-case" => {
                        if let Some(case) = current.take() {
                            doc.test_results.push(case.result);
                        }
                        current = Some(PendingCase::from_start(&e)?);
                    }
                    b"message"
                        if capture.is_none()
                            && current
                                .as_ref()
                                .is_some_and(|c| c.result.error_message.is_none()) =>
                    {
                        capture = Some(Capture::Message(depth));
                        text.clear();
                    }
                    b"output"
                        if capture.is_none()
                            && current.as_ref().is_some_and(|c| c.result.output.is_none()) =>
                    {
                        capture = Some(Capture::Output(depth));
                        text.clear();
                    }
                    _ => {}
                }
            }
            Event::Empty(e) => {
                if doc.is_none() {
                    doc = Some(read_root(&e)?);
                    continue;
                }
                let Some(doc) = doc.as_mut() else { continue };

                match e.name().as_ref() {
                    b"test-case" => {
                        if let Some(case) = current.take() {
                            doc.test_results.push(case.result);
                        }
                        doc.test_results.push(PendingCase::from_start(&e)?.result);
                    }
                    b"message" => {
                        if let Some(case) = current.as_mut() {
                            case.result.error_message.get_or_insert_with(String::new);
                        }
                    }
                    b"output" => {
                        if let Some(case) = current.as_mut() {
                            case.result.output.get_or_insert_with(String::new);
                        }
                    }
                    _ => {}
                }
            }
            Event::Text(t) => {
                if capture.is_some() {
                    let unescaped = t
                        .unescape()
                        .map_err(|e| invalid_document(reader.buffer_position(), e))?;
                    text.push_str(&unescaped);
                }
            }
            Event::CData(c) => {
                if capture.is_some() {
                    text.push_str(&String::from_utf8_lossy(&c));
                }
            }
            Event::End(e) => {
                if let Some(open) = capture
                    && open.depth() == depth
                {
                    let value = Some(text.trim().to_string());
                    if let Some(case) = current.as_mut() {
                        match open {
                            Capture::Message(_) => case.result.error_message = value,
                            Capture::Output(_) => case.result.output = value,
                        }
                    }
                    capture = None;
                }

                if e.name().as_ref() == b"test-case"
                    && let (Some(doc), Some(case)) = (doc.as_mut(), current.take())
                {
                    doc.test_results.push(case.result);
                }

                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if depth != 0 {
        return Err(AppError::Parse(
            "Result document ended before its root element was closed".to_string(),
        ));
    }

    let mut doc = doc.ok_or_else(|| {
        AppError::Parse("Result document has no root element".to_string())
    })?;

    if doc.test_count == 0 && !doc.test_results.is_empty() {
        let total = doc.test_results.len() as i32;
        let passed = doc
            .test_results
            .iter()
            .filter(|r| r.result == "Passed")
            .count() as i32;
        let failed = doc
            .test_results
            .iter()
            .filter(|r| r.result == "Failed")
            .count() as i32;

        doc.test_count = total;
        doc.passed_count = passed;
        doc.failed_count = failed;
        doc.skipped_count = total - passed - failed;
    }

    Ok(doc)
}

fn read_root(e: &BytesStart<'_>) -> AppResult<PrimaryDocument> {
    Ok(PrimaryDocument {
        overall_result: attr(e, b"result")?.unwrap_or_else(|| "Unknown".to_string()),
        test_count: parse_count(attr(e, b"total")?.as_deref()),
        passed_count: parse_count(attr(e, b"passed")?.as_deref()),
        failed_count: parse_count(attr(e, b"failed")?.as_deref()),
        skipped_count: parse_count(attr(e, b"skipped")?.as_deref())
            + parse_count(attr(e, b"inconclusive")?.as_deref()),
        start_time: parse_timestamp(attr(e, b"start-time")?.as_deref())
            .unwrap_or_else(unknown_time),
        end_time: parse_timestamp(attr(e, b"end-time")?.as_deref()).unwrap_or_else(unknown_time),
        test_results: Vec::new(),
    })
}

fn attr(e: &BytesStart<'_>, name: &[u8]) -> AppResult<Option<String>> {
    for attribute in e.attributes() {
        let attribute =
            attribute.map_err(|err| AppError::Parse(format!("Invalid attribute: {}", err)))?;
        if attribute.key.as_ref() == name {
            let value = attribute
                .unescape_value()
                .map_err(|err| AppError::Parse(format!("Invalid attribute value: {}", err)))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn invalid_document(position: impl std::fmt::Display, err: impl std::fmt::Display) -> AppError {
    AppError::Parse(format!(
        "Invalid result document at byte {}: {}",
        position, err
    ))
}

fn parse_count(value: Option<&str>) -> i32 {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(0)
}

/// NUnit 3 durations are seconds as a float, e.g. `197.780999`.
fn parse_seconds(value: Option<&str>) -> f64 {
    value
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite())
        .unwrap_or(0.0)
}

/// Parse the timestamp shapes NUnit writes; naive values are taken as UTC.
pub fn parse_timestamp(value: Option<&str>) -> Option<DateTime<Utc>> {
    let value = value?.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(dt.with_timezone(&Utc));
    }

    const NAIVE_FORMATS: [&str; 3] = [
        "%Y-%m-%d %H:%M:%S%.fZ",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
    ];

    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|dt| dt.and_utc())
}

// ============================================================================
// System info document
// ============================================================================

/// Flat `<SystemInfo>` document; every element is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SystemInfoDocument {
    #[serde(rename = "SystemName")]
    system_name: Option<String>,
    #[serde(rename = "STM")]
    stm: Option<String>,
    #[serde(rename = "MSIVersion")]
    msi_version: Option<String>,
    #[serde(rename = "PDCVersion")]
    pdc_version: Option<String>,
    #[serde(rename = "MonoplaneOrBiplane")]
    monoplane_or_biplane: Option<String>,
    #[serde(rename = "FrontalStandType")]
    frontal_stand_type: Option<String>,
    #[serde(rename = "TableType")]
    table_type: Option<String>,
    #[serde(rename = "TableTopType")]
    table_top_type: Option<String>,
    #[serde(rename = "DetectorNameFrontal")]
    detector_name_frontal: Option<String>,
    #[serde(rename = "DetectorNameLateral")]
    detector_name_lateral: Option<String>,
    #[serde(rename = "SystemType")]
    system_type: Option<String>,
    #[serde(rename = "ProductFamily")]
    product_family: Option<String>,
    #[serde(rename = "DetectorType")]
    detector_type: Option<String>,
    #[serde(rename = "LateralStandType")]
    lateral_stand_type: Option<String>,
    #[serde(rename = "SystemConfigType")]
    system_config_type: Option<String>,
}

/// Parse the system info document. Missing elements become empty strings.
pub fn parse_system_info(xml: Option<&str>) -> DocumentOutcome<SystemInfo> {
    let Some(xml) = xml.filter(|x| !x.trim().is_empty()) else {
        return DocumentOutcome::Absent;
    };

    let doc: SystemInfoDocument = match quick_xml::de::from_str(xml) {
        Ok(doc) => doc,
        Err(e) => return DocumentOutcome::Failed(e.to_string()),
    };

    DocumentOutcome::Parsed(SystemInfo {
        id: Uuid::now_v7(),
        system_name: doc.system_name.unwrap_or_default(),
        stm: doc.stm.unwrap_or_default(),
        msi_version: doc.msi_version.unwrap_or_default(),
        pdc_version: doc.pdc_version.unwrap_or_default(),
        monoplane_or_biplane: doc.monoplane_or_biplane.unwrap_or_default(),
        frontal_stand_type: doc.frontal_stand_type.unwrap_or_default(),
        table_type: doc.table_type.unwrap_or_default(),
        table_top_type: doc.table_top_type.unwrap_or_default(),
        detector_name_frontal: doc.detector_name_frontal.unwrap_or_default(),
        detector_name_lateral: doc.detector_name_lateral.unwrap_or_default(),
        system_type: doc.system_type.unwrap_or_default(),
        product_family: doc.product_family.unwrap_or_default(),
        detector_type: doc.detector_type.unwrap_or_default(),
        lateral_stand_type: doc.lateral_stand_type.unwrap_or_default(),
        system_config_type: doc.system_config_type.unwrap_or_default(),
        raw_xml: xml.to_string(),
    })
}

// ============================================================================
// Fingerprint document
// ============================================================================

/// `<MedicalSystem>` root: groups of tests, each test holding measurements.
#[derive(Debug, Deserialize)]
struct FingerprintDocument {
    #[serde(rename = "Test", default)]
    groups: Vec<FingerprintGroup>,
}

#[derive(Debug, Deserialize)]
struct FingerprintGroup {
    #[serde(rename = "Test", default)]
    tests: Vec<FingerprintTest>,
}

#[derive(Debug, Deserialize)]
struct FingerprintTest {
    #[serde(rename = "@Name")]
    name: Option<String>,
    #[serde(rename = "Measurement", default)]
    measurements: Vec<FingerprintMeasurement>,
}

#[derive(Debug, Deserialize)]
struct FingerprintMeasurement {
    #[serde(rename = "@Name")]
    name: Option<String>,
    #[serde(rename = "@Result")]
    result: Option<String>,
    #[serde(rename = "@MeasurementUnit")]
    unit: Option<String>,
    #[serde(rename = "@Description")]
    description: Option<String>,
    #[serde(rename = "MeasuredValue")]
    measured_value: Option<MeasuredValue>,
}

#[derive(Debug, Deserialize)]
struct MeasuredValue {
    #[serde(rename = "Value")]
    value: Option<StringValueNode>,
    #[serde(rename = "Spec", default)]
    specs: Vec<SpecNode>,
}

#[derive(Debug, Deserialize)]
struct StringValueNode {
    #[serde(rename = "StringValue")]
    string_value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SpecNode {
    #[serde(rename = "@Context")]
    context: Option<String>,
    #[serde(rename = "Range")]
    range: Option<RangeNode>,
}

#[derive(Debug, Deserialize)]
struct RangeNode {
    #[serde(rename = "RangeInterval")]
    interval: Option<RangeInterval>,
}

#[derive(Debug, Deserialize)]
struct RangeInterval {
    #[serde(rename = "UpperValue")]
    upper: Option<StringValueNode>,
    #[serde(rename = "LowerValue")]
    lower: Option<StringValueNode>,
}

fn bound(node: Option<StringValueNode>) -> Option<String> {
    node.and_then(|n| n.string_value)
}

/// Parse the fingerprint document into measurements, in document order.
pub fn parse_fingerprint(xml: Option<&str>) -> DocumentOutcome<Vec<Measurement>> {
    let Some(xml) = xml.filter(|x| !x.trim().is_empty()) else {
        return DocumentOutcome::Absent;
    };

    let doc: FingerprintDocument = match quick_xml::de::from_str(xml) {
        Ok(doc) => doc,
        Err(e) => return DocumentOutcome::Failed(e.to_string()),
    };

    let mut measurements = Vec::new();

    for test in doc.groups.into_iter().flat_map(|g| g.tests) {
        let test_name = test.name.unwrap_or_else(|| "Unknown".to_string());

        for m in test.measurements {
            let mut measurement = Measurement {
                id: Uuid::now_v7(),
                test_name: test_name.clone(),
                measurement_name: m.name.unwrap_or_else(|| "Unknown".to_string()),
                result: m.result.unwrap_or_else(|| "Unknown".to_string()),
                measurement_unit: m.unit,
                description: m.description,
                ..Measurement::default()
            };

            if let Some(measured) = m.measured_value {
                measurement.measured_value = measured.value.and_then(|v| v.string_value);

                for spec in measured.specs {
                    let Some(interval) = spec.range.and_then(|r| r.interval) else {
                        continue;
                    };

                    match spec.context.as_deref() {
                        Some("Error") => {
                            measurement.spec_error_upper = bound(interval.upper);
                            measurement.spec_error_lower = bound(interval.lower);
                        }
                        Some("Warning") => {
                            measurement.spec_warning_upper = bound(interval.upper);
                            measurement.spec_warning_lower = bound(interval.lower);
                        }
                        _ => {}
                    }
                }
            }

            measurements.push(measurement);
        }
    }

    DocumentOutcome::Parsed(measurements)
}
