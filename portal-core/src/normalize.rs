//! Name normalization shared by parameters, conditions and medications.

/// Lowercase, keep only letters and whitespace, collapse runs of whitespace.
pub fn normalize_clinical_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .filter(|c| c.is_alphabetic() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalized name with separators removed, so `blood-pressure` and
/// `Blood Pressure` compare equal.
pub fn compact_key(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .filter(|c| c.is_alphabetic())
        .collect()
}

/// Canonical key of a primary vital, or `None` when the name is not on the
/// dashboard whitelist.
pub fn vital_key(name: &str) -> Option<&'static str> {
    let compact = compact_key(name);
    if compact.is_empty() {
        return None;
    }
    PRIMARY_VITALS
        .iter()
        .find(|(_, aliases)| aliases.iter().any(|alias| *alias == compact))
        .map(|(canonical, _)| *canonical)
}

/// Identity key of a parameter: the canonical vital key when whitelisted,
/// otherwise the normalized name.
pub fn parameter_key(name: &str) -> String {
    match vital_key(name) {
        Some(canonical) => canonical.to_string(),
        None => normalize_clinical_name(name),
    }
}

// Aliases are compact keys: lowercase letters only. Digits are dropped by
// normalization, so "SpO2" arrives as "spo".
const PRIMARY_VITALS: &[(&str, &[&str])] = &[
    (
        "blood pressure",
        &["bloodpressure", "bp", "arterialbloodpressure", "bpsystolicdiastolic"],
    ),
    (
        "systolic blood pressure",
        &["systolicbloodpressure", "systolicbp", "systolic", "sbp"],
    ),
    (
        "diastolic blood pressure",
        &["diastolicbloodpressure", "diastolicbp", "diastolic", "dbp"],
    ),
    (
        "heart rate",
        &["heartrate", "pulse", "pulserate", "hr", "heartratepulse"],
    ),
    (
        "oxygen saturation",
        &["oxygensaturation", "spo", "sao", "oxygen", "bloodoxygen"],
    ),
    ("respiratory rate", &["respiratoryrate", "respirationrate", "rr"]),
    ("temperature", &["temperature", "bodytemperature", "temp"]),
    (
        "blood glucose",
        &["bloodglucose", "glucose", "bloodsugar", "sugar"],
    ),
    (
        "fasting blood glucose",
        &[
            "fastingbloodglucose",
            "fastingglucose",
            "fastingbloodsugar",
            "fbs",
            "fbg",
            "glucosefasting",
        ],
    ),
    (
        "random blood glucose",
        &["randombloodglucose", "randomglucose", "randombloodsugar", "rbs"],
    ),
    (
        "postprandial blood glucose",
        &[
            "postprandialbloodglucose",
            "postprandialglucose",
            "postprandialbloodsugar",
            "ppbs",
            "ppbg",
        ],
    ),
    ("weight", &["weight", "bodyweight"]),
    ("height", &["height", "bodyheight"]),
    ("bmi", &["bmi", "bodymassindex"]),
];
