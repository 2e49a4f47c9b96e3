//! Merges uploaded reports and an optional health snapshot into one view.
//!
//! The engine is pure and total: missing fields contribute nothing and no
//! input makes it fail. Precedence rules:
//! - profile comes from the newest report that has one;
//! - snapshot vitals beat report vitals with the same key;
//! - medications come from the newest report with a non-empty list only;
//! - a non-empty snapshot condition list replaces report conditions.

use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::normalize::vital_key;
use crate::{
    Condition, HealthSnapshot, Medication, Parameter, ParameterStatus, ParameterValue, Profile,
    ReconcileConfig, ReconciledView, Report, VitalThresholds,
};

type StatusRule = fn(&VitalThresholds, f64) -> ParameterStatus;

/// Reconcile with the default clinical thresholds.
pub fn reconcile(reports: &[Report], snapshot: Option<&HealthSnapshot>) -> ReconciledView {
    reconcile_with(reports, snapshot, &ReconcileConfig::default())
}

/// Reconcile `reports` (any order) and `snapshot` into a single view.
pub fn reconcile_with(
    reports: &[Report],
    snapshot: Option<&HealthSnapshot>,
    config: &ReconcileConfig,
) -> ReconciledView {
    let ordered = newest_first(reports);

    ReconciledView {
        profile: select_profile(&ordered),
        parameters: merge_parameters(&ordered, snapshot, &config.thresholds),
        conditions: merge_conditions(&ordered, snapshot),
        medications: select_medications(&ordered),
    }
}

/// Parameters synthesized from snapshot fields, in display order.
pub fn snapshot_parameters(
    snapshot: &HealthSnapshot,
    thresholds: &VitalThresholds,
) -> Vec<Parameter> {
    let at = snapshot.last_updated;
    let mut parameters = Vec::with_capacity(6);

    if let (Some(systolic), Some(diastolic)) = (snapshot.systolic_bp, snapshot.diastolic_bp) {
        parameters.push(Parameter {
            name: "Blood Pressure".to_string(),
            value: ParameterValue::Text(format!(
                "{}/{}",
                ParameterValue::Number(systolic),
                ParameterValue::Number(diastolic)
            )),
            unit: Some("mmHg".to_string()),
            status: thresholds.blood_pressure_status(systolic, diastolic),
            timestamp: at,
        });
    }

    let singles: [(Option<f64>, &str, &str, StatusRule); 5] = [
        (
            snapshot.heart_rate,
            "Heart Rate",
            "bpm",
            VitalThresholds::heart_rate_status,
        ),
        (snapshot.spo2, "SpO2", "%", VitalThresholds::spo2_status),
        (
            snapshot.temperature,
            "Temperature",
            "°C",
            VitalThresholds::temperature_status,
        ),
        (snapshot.hba1c, "HbA1c", "%", VitalThresholds::hba1c_status),
        (snapshot.ldl, "LDL", "mg/dL", VitalThresholds::ldl_status),
    ];

    for (value, name, unit, status) in singles {
        let Some(value) = value else {
            continue;
        };
        parameters.push(Parameter {
            name: name.to_string(),
            value: ParameterValue::Number(value),
            unit: Some(unit.to_string()),
            status: status(thresholds, value),
            timestamp: at,
        });
    }

    parameters
}

fn newest_first(reports: &[Report]) -> Vec<&Report> {
    let mut ordered: Vec<&Report> = reports.iter().collect();
    ordered.sort_by(|a, b| newest_first_cmp(a.recency(), b.recency()));
    ordered
}

/// Newer timestamps first, undated entries last; ties keep input order.
fn newest_first_cmp(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn select_profile(ordered: &[&Report]) -> Option<Profile> {
    let report = ordered.iter().find(|report| report.data.profile.is_some())?;
    let mut profile = report.data.profile.clone()?;

    if profile.bmi.is_none() {
        profile.bmi = profile.computed_bmi();
    }

    tracing::debug!(report_id = %report.id, "profile selected");
    Some(profile)
}

fn merge_parameters(
    ordered: &[&Report],
    snapshot: Option<&HealthSnapshot>,
    thresholds: &VitalThresholds,
) -> Vec<Parameter> {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();

    if let Some(snapshot) = snapshot {
        for parameter in snapshot_parameters(snapshot, thresholds) {
            if seen.insert(parameter.key()) {
                merged.push(parameter);
            }
        }
    }

    let mut candidates: Vec<(&'static str, &Parameter)> = ordered
        .iter()
        .flat_map(|report| report.data.parameters.iter())
        .filter_map(|parameter| vital_key(&parameter.name).map(|key| (key, parameter)))
        .collect();
    candidates.sort_by(|(_, a), (_, b)| newest_first_cmp(a.timestamp, b.timestamp));

    for (key, parameter) in candidates {
        if seen.insert(key.to_string()) {
            merged.push(parameter.clone());
        }
    }

    merged
}

fn select_medications(ordered: &[&Report]) -> Vec<Medication> {
    let Some(report) = ordered
        .iter()
        .find(|report| !report.data.medications.is_empty())
    else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut medications = Vec::new();

    for medication in &report.data.medications {
        if !medication.has_valid_name() {
            tracing::debug!(
                report_id = %report.id,
                name = %medication.name,
                "discarding medication with invalid name"
            );
            continue;
        }
        if seen.insert(medication.key()) {
            medications.push(medication.clone());
        }
    }

    tracing::debug!(
        report_id = %report.id,
        count = medications.len(),
        "medications selected"
    );
    medications
}

fn merge_conditions(ordered: &[&Report], snapshot: Option<&HealthSnapshot>) -> Vec<Condition> {
    let controlled: Vec<Condition> = snapshot
        .map(|snapshot| {
            snapshot
                .chronic_conditions
                .iter()
                .map(|name| name.trim())
                .filter(|name| !name.is_empty())
                .map(Condition::controlled)
                .collect()
        })
        .unwrap_or_default();
    if !controlled.is_empty() {
        return controlled;
    }

    let mut seen = HashSet::new();
    ordered
        .iter()
        .flat_map(|report| report.data.conditions.iter())
        .filter(|condition| {
            let key = condition.key();
            !key.is_empty() && seen.insert(key)
        })
        .cloned()
        .collect()
}
