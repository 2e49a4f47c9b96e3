//! Report row JSON to strict portal entities, plus JSON entry points for
//! reconciliation.
//!
//! Report payloads come from an AI parser and have no enforced schema. Every
//! alternate key spelling is resolved here so the engine in `portal-core`
//! only ever sees strict types.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use portal_core::{
    Condition, ConditionSeverity, HealthSnapshot, Measurement, Medication, Parameter,
    ParameterStatus, ParameterValue, PortalError, Profile, ReconcileConfig, ReconciledView, Report,
    ReportData,
};
use serde_json::{Map, Value};

/// Reconcile reports and an optional snapshot given as JSON text.
pub fn reconcile_str(
    reports_json: &str,
    snapshot_json: Option<&str>,
    config: &ReconcileConfig,
) -> Result<ReconciledView, PortalError> {
    let reports: Value = serde_json::from_str(reports_json)?;
    let snapshot = snapshot_json
        .map(serde_json::from_str::<Value>)
        .transpose()?;
    reconcile_value(&reports, snapshot.as_ref(), config)
}

/// Reconcile reports and an optional snapshot given as `serde_json::Value`.
///
/// Only the outer envelope can fail; individual malformed reports or fields
/// contribute nothing to the view.
pub fn reconcile_value(
    reports: &Value,
    snapshot: Option<&Value>,
    config: &ReconcileConfig,
) -> Result<ReconciledView, PortalError> {
    let reports = parse_reports(reports)?;
    let snapshot = snapshot.and_then(parse_snapshot_value);
    Ok(portal_core::reconcile_with(
        &reports,
        snapshot.as_ref(),
        config,
    ))
}

/// Parse a list of report rows. Accepts a bare array, `{"reports": [...]}`
/// or `null`.
pub fn parse_reports(value: &Value) -> Result<Vec<Report>, PortalError> {
    let rows = match value {
        Value::Null => return Ok(Vec::new()),
        Value::Array(rows) => rows,
        Value::Object(obj) => obj
            .get("reports")
            .and_then(Value::as_array)
            .ok_or_else(|| PortalError::MissingData("reports array".to_string()))?,
        other => {
            return Err(PortalError::Parse(format!(
                "Expected an array of reports, received {}",
                json_kind(other)
            )))
        }
    };

    Ok(rows
        .iter()
        .enumerate()
        .map(|(index, row)| {
            let mut report = parse_report_value(row);
            if report.id.is_empty() {
                report.id = format!("report-{index}");
            }
            report
        })
        .collect())
}

/// Map one raw report row into a `Report`. Never fails; unknown shapes yield
/// an empty report.
pub fn parse_report_value(row: &Value) -> Report {
    // Some rows store the parser output as a JSON-encoded string.
    if let Some(Value::String(encoded)) = row.get("report_json") {
        if let Ok(decoded) = serde_json::from_str::<Value>(encoded) {
            if decoded.is_object() {
                let mut row = row.clone();
                row["report_json"] = decoded;
                return parse_report_value(&row);
            }
        }
    }

    let payload = report_payload(row);
    let uploaded_raw = first_str(row, &["uploaded_at", "created_at"]);
    let date_raw = first_str(row, &["date", "report_date"])
        .or_else(|| payload.and_then(|data| first_str(data, &["report_date", "date"])));

    let context = ReportContext {
        uploaded_at: uploaded_raw.and_then(parse_datetime),
        report_date: date_raw.and_then(parse_datetime),
        uploaded_raw,
        date_raw,
    };

    let data = match payload {
        Some(data) => ReportData {
            profile: data.get("profile").and_then(parse_profile),
            parameters: array_field(data, "parameters")
                .filter_map(|entry| parse_parameter(entry, &context))
                .collect(),
            conditions: array_field(data, "conditions")
                .filter_map(parse_condition)
                .collect(),
            medications: array_field(data, "medications")
                .map(|entry| parse_medication(entry, &context))
                .collect(),
        },
        None => ReportData::default(),
    };

    let id = row.get("id").and_then(scalar_text).unwrap_or_default();
    tracing::debug!(
        report_id = %id,
        parameters = data.parameters.len(),
        conditions = data.conditions.len(),
        medications = data.medications.len(),
        "report parsed"
    );

    Report {
        id,
        uploaded_at: context.uploaded_at,
        report_date: context.report_date,
        data,
    }
}

/// Map a raw snapshot row into a `HealthSnapshot`; `None` when the value is
/// not an object.
pub fn parse_snapshot_value(value: &Value) -> Option<HealthSnapshot> {
    let obj = value.as_object()?;
    let number = |key: &str| obj.get(key).and_then(number_value);

    Some(HealthSnapshot {
        systolic_bp: number("systolic_bp"),
        diastolic_bp: number("diastolic_bp"),
        heart_rate: number("heart_rate"),
        spo2: number("spo2"),
        temperature: number("temperature"),
        hba1c: number("hba1c"),
        ldl: number("ldl"),
        vitamin_b12: number("vitamin_b12"),
        chronic_conditions: obj
            .get("chronic_conditions")
            .map(string_list)
            .unwrap_or_default(),
        age: number("age"),
        last_updated: first_str(value, &["last_updated", "updated_at"]).and_then(parse_datetime),
    })
}

struct ReportContext<'a> {
    uploaded_at: Option<DateTime<Utc>>,
    report_date: Option<DateTime<Utc>>,
    uploaded_raw: Option<&'a str>,
    date_raw: Option<&'a str>,
}

fn report_payload(row: &Value) -> Option<&Value> {
    if let Some(report_json) = row.get("report_json") {
        return match report_json.get("data") {
            Some(data) if data.is_object() => Some(data),
            _ if report_json.is_object() => Some(report_json),
            _ => None,
        };
    }
    row.get("data").filter(|data| data.is_object())
}

fn parse_parameter(entry: &Value, context: &ReportContext<'_>) -> Option<Parameter> {
    let name = first_text(entry, &["name", "parameter", "test_name"])?;
    let value = match entry.get("value")? {
        Value::Number(number) => ParameterValue::Number(number.as_f64()?),
        Value::String(text) if !text.trim().is_empty() => {
            ParameterValue::Text(text.trim().to_string())
        }
        _ => return None,
    };

    let timestamp = first_str(entry, &["timestamp", "date", "measured_at"])
        .and_then(parse_datetime)
        .or(context.report_date)
        .or(context.uploaded_at);

    Some(Parameter {
        name,
        value,
        unit: first_text(entry, &["unit", "units"]),
        status: entry
            .get("status")
            .and_then(Value::as_str)
            .map(parse_status)
            .unwrap_or_default(),
        timestamp,
    })
}

fn parse_status(raw: &str) -> ParameterStatus {
    match raw.trim().to_lowercase().as_str() {
        "critical" => ParameterStatus::Critical,
        "warning" | "abnormal" | "high" | "low" | "borderline" => ParameterStatus::Warning,
        _ => ParameterStatus::Normal,
    }
}

const CONDITION_KEYS: [&str; 10] = [
    "name",
    "condition",
    "condition_name",
    "severity",
    "currentStatus",
    "current_status",
    "diagnosedDate",
    "diagnosed_date",
    "relatedParameters",
    "related_parameters",
];

fn parse_condition(entry: &Value) -> Option<Condition> {
    if let Some(name) = entry.as_str() {
        let name = name.trim();
        return (!name.is_empty()).then(|| Condition {
            name: name.to_string(),
            ..Condition::default()
        });
    }

    let obj = entry.as_object()?;
    let name = first_text(entry, &["name", "condition", "condition_name"])?;
    let extra: Map<String, Value> = obj
        .iter()
        .filter(|(key, _)| !CONDITION_KEYS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    Some(Condition {
        name,
        severity: entry
            .get("severity")
            .and_then(Value::as_str)
            .and_then(parse_severity),
        current_status: first_text(entry, &["currentStatus", "current_status"]),
        diagnosed_date: first_text(entry, &["diagnosedDate", "diagnosed_date"]),
        related_parameters: entry
            .get("relatedParameters")
            .or_else(|| entry.get("related_parameters"))
            .map(string_list)
            .unwrap_or_default(),
        extra,
    })
}

fn parse_severity(raw: &str) -> Option<ConditionSeverity> {
    match raw.trim().to_lowercase().as_str() {
        "mild" => Some(ConditionSeverity::Mild),
        "moderate" => Some(ConditionSeverity::Moderate),
        "severe" => Some(ConditionSeverity::Severe),
        _ => None,
    }
}

/// Every entry becomes a `Medication`, even unusable ones, so that a
/// non-empty list still marks its report as the medication source. The
/// engine discards entries without a valid name.
fn parse_medication(entry: &Value, context: &ReportContext<'_>) -> Medication {
    if let Some(name) = entry.as_str() {
        return Medication {
            name: name.trim().to_string(),
            start_date: context.uploaded_raw.or(context.date_raw).map(str::to_string),
            ..Medication::default()
        };
    }

    Medication {
        name: first_text(entry, &["name", "medication_name", "drug_name"]).unwrap_or_default(),
        dosage: first_text(entry, &["dosage", "dose", "strength"]),
        frequency: first_text(entry, &["frequency", "freq"]),
        start_date: first_text(entry, &["startDate", "start_date"])
            .or_else(|| context.uploaded_raw.map(str::to_string))
            .or_else(|| context.date_raw.map(str::to_string)),
    }
}

const PROFILE_KEYS: [&str; 11] = [
    "name",
    "patient_name",
    "full_name",
    "age",
    "gender",
    "sex",
    "blood_group",
    "bloodGroup",
    "height",
    "weight",
    "bmi",
];

fn parse_profile(value: &Value) -> Option<Profile> {
    let obj = value.as_object()?;
    let extra: Map<String, Value> = obj
        .iter()
        .filter(|(key, _)| !PROFILE_KEYS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    Some(Profile {
        name: first_text(value, &["name", "patient_name", "full_name"]),
        age: value.get("age").and_then(number_value),
        gender: first_text(value, &["gender", "sex"]),
        blood_group: first_text(value, &["blood_group", "bloodGroup"]),
        height: value.get("height").and_then(parse_measurement),
        weight: value.get("weight").and_then(parse_measurement),
        bmi: value.get("bmi").and_then(number_value),
        extra,
    })
}

fn parse_measurement(value: &Value) -> Option<Measurement> {
    match value {
        Value::Object(_) => Some(Measurement {
            value: value.get("value").and_then(number_value),
            unit: first_text(value, &["unit", "units"]),
        }),
        Value::Number(_) | Value::String(_) => {
            let number = number_value(value)?;
            Some(Measurement {
                value: Some(number),
                unit: value.as_str().and_then(trailing_unit),
            })
        }
        _ => None,
    }
}

fn array_field<'a>(data: &'a Value, key: &str) -> impl Iterator<Item = &'a Value> {
    data.get(key)
        .and_then(Value::as_array)
        .map(|arr| arr.iter())
        .into_iter()
        .flatten()
}

/// First key holding a non-blank string (or a number, stringified).
fn first_text(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| value.get(*key))
        .filter_map(scalar_text)
        .find(|text| !text.is_empty())
}

fn first_str<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| value.get(*key))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|text| !text.is_empty())
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn number_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => leading_number(text),
        _ => None,
    }
}

fn leading_number(text: &str) -> Option<f64> {
    let cleaned: String = text
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    if cleaned.is_empty() {
        None
    } else {
        cleaned.parse::<f64>().ok()
    }
}

fn trailing_unit(text: &str) -> Option<String> {
    let unit = text
        .trim()
        .trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == '-')
        .trim();
    (!unit.is_empty()).then(|| unit.to_string())
}

fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .or_else(|| item.get("name").and_then(scalar_text))
            })
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect(),
        Value::String(text) => text
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
