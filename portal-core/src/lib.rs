//! Kiểu dữ liệu lõi và engine hợp nhất hồ sơ cho cổng bệnh nhân.
//!
//! Crate này chỉ làm việc trên dữ liệu đã tải và đã chuẩn hóa. Các dòng
//! báo cáo thô được `portal-reports` chuyển sang các kiểu ở đây.

mod normalize;
mod reconcile;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use normalize::{compact_key, normalize_clinical_name, parameter_key, vital_key};
pub use reconcile::{reconcile, reconcile_with, snapshot_parameters};

/// Cấu hình điều chỉnh engine hợp nhất.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ReconcileConfig {
    /// Ngưỡng dùng để gắn cờ chỉ số sống lấy từ snapshot.
    #[serde(default)]
    pub thresholds: VitalThresholds,
}

/// Ngưỡng lâm sàng áp dụng cho chỉ số sống trong snapshot.
///
/// Giá trị vượt hẳn ngưỡng bị gắn `warning`, còn lại là `normal`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VitalThresholds {
    pub systolic_max: f64,
    pub diastolic_max: f64,
    pub heart_rate_max: f64,
    pub heart_rate_min: f64,
    pub spo2_min: f64,
    /// Độ C.
    pub temperature_max: f64,
    pub hba1c_max: f64,
    pub ldl_max: f64,
}

impl Default for VitalThresholds {
    fn default() -> Self {
        Self {
            systolic_max: 140.0,
            diastolic_max: 90.0,
            heart_rate_max: 100.0,
            heart_rate_min: 60.0,
            spo2_min: 95.0,
            temperature_max: 37.5,
            hba1c_max: 6.5,
            ldl_max: 130.0,
        }
    }
}

impl VitalThresholds {
    pub fn blood_pressure_status(&self, systolic: f64, diastolic: f64) -> ParameterStatus {
        flag(systolic > self.systolic_max || diastolic > self.diastolic_max)
    }

    pub fn heart_rate_status(&self, bpm: f64) -> ParameterStatus {
        flag(bpm > self.heart_rate_max || bpm < self.heart_rate_min)
    }

    pub fn spo2_status(&self, percent: f64) -> ParameterStatus {
        flag(percent < self.spo2_min)
    }

    pub fn temperature_status(&self, celsius: f64) -> ParameterStatus {
        flag(celsius > self.temperature_max)
    }

    pub fn hba1c_status(&self, percent: f64) -> ParameterStatus {
        flag(percent > self.hba1c_max)
    }

    pub fn ldl_status(&self, mg_dl: f64) -> ParameterStatus {
        flag(mg_dl > self.ldl_max)
    }
}

fn flag(out_of_range: bool) -> ParameterStatus {
    if out_of_range {
        ParameterStatus::Warning
    } else {
        ParameterStatus::Normal
    }
}

/// Trạng thái hiển thị của một chỉ số.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ParameterStatus {
    #[default]
    Normal,
    Warning,
    Critical,
}

impl ParameterStatus {
    /// Mọi trạng thái khác `Normal` được đưa lên bảng cảnh báo.
    pub fn is_flagged(self) -> bool {
        !matches!(self, ParameterStatus::Normal)
    }
}

/// Giá trị chỉ số: số thuần hoặc chuỗi đọc được như `120/80`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ParameterValue {
    Number(f64),
    Text(String),
}

impl ParameterValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParameterValue::Number(value) => Some(*value),
            ParameterValue::Text(text) => text.trim().parse().ok(),
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Number(value) if value.fract() == 0.0 => write!(f, "{value:.0}"),
            ParameterValue::Number(value) => write!(f, "{value}"),
            ParameterValue::Text(text) => f.write_str(text),
        }
    }
}

/// Một chỉ số lâm sàng (xét nghiệm hoặc chỉ số sống).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub value: ParameterValue,
    pub unit: Option<String>,
    #[serde(default)]
    pub status: ParameterStatus,
    pub timestamp: Option<DateTime<Utc>>,
}

impl Parameter {
    /// Khóa định danh dùng để loại trùng chỉ số.
    pub fn key(&self) -> String {
        parameter_key(&self.name)
    }
}

/// Mức độ nặng của bệnh lý.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ConditionSeverity {
    Mild,
    Moderate,
    Severe,
}

/// Bệnh lý đã chẩn đoán; các khóa lạ của object nguồn giữ trong `extra`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<ConditionSeverity>,
    #[serde(default)]
    pub current_status: Option<String>,
    #[serde(default)]
    pub diagnosed_date: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_parameters: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Condition {
    /// Bệnh lý lấy từ danh sách bệnh mạn tính của snapshot.
    pub fn controlled(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            current_status: Some("controlled".to_string()),
            ..Self::default()
        }
    }

    pub fn key(&self) -> String {
        normalize_clinical_name(&self.name)
    }
}

/// Một dòng thuốc trong báo cáo.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Medication {
    pub name: String,
    pub dosage: Option<String>,
    pub frequency: Option<String>,
    pub start_date: Option<String>,
}

impl Medication {
    /// Tên rỗng, chỉ có `.` hoặc một ký tự là nhiễu của bộ phân tích.
    pub fn has_valid_name(&self) -> bool {
        let name = self.name.trim();
        name != "." && name.chars().count() > 1
    }

    pub fn key(&self) -> String {
        normalize_clinical_name(&self.name)
    }
}

/// Số đo kèm đơn vị tùy chọn (`height`, `weight`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Measurement {
    pub value: Option<f64>,
    pub unit: Option<String>,
}

/// Thông tin hành chính của bệnh nhân trích từ báo cáo.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Profile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blood_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<Measurement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<Measurement>,
    #[serde(default)]
    pub bmi: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Profile {
    /// BMI từ chiều cao (cm) và cân nặng (kg), làm tròn một chữ số thập phân.
    pub fn computed_bmi(&self) -> Option<f64> {
        let height_cm = self.height.as_ref()?.value?;
        let weight_kg = self.weight.as_ref()?.value?;
        if height_cm <= 0.0 || weight_kg <= 0.0 {
            return None;
        }
        let height_m = height_cm / 100.0;
        let bmi = weight_kg / (height_m * height_m);
        Some((bmi * 10.0).round() / 10.0)
    }
}

/// Dữ liệu có cấu trúc của một báo cáo đã tải lên.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ReportData {
    pub profile: Option<Profile>,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub medications: Vec<Medication>,
}

/// Báo cáo đã tải lên sau khi phân tích.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Report {
    pub id: String,
    pub uploaded_at: Option<DateTime<Utc>>,
    /// Ngày lâm sàng in trên báo cáo, nếu bộ phân tích tìm thấy.
    pub report_date: Option<DateTime<Utc>>,
    pub data: ReportData,
}

impl Report {
    /// Mốc thời gian dùng để xếp báo cáo mới nhất lên đầu.
    pub fn recency(&self) -> Option<DateTime<Utc>> {
        self.uploaded_at.or(self.report_date)
    }
}

/// Chỉ số sống mới nhất, cập nhật ngoài luồng báo cáo.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct HealthSnapshot {
    pub systolic_bp: Option<f64>,
    pub diastolic_bp: Option<f64>,
    pub heart_rate: Option<f64>,
    pub spo2: Option<f64>,
    pub temperature: Option<f64>,
    pub hba1c: Option<f64>,
    pub ldl: Option<f64>,
    pub vitamin_b12: Option<f64>,
    #[serde(default)]
    pub chronic_conditions: Vec<String>,
    pub age: Option<f64>,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Kết quả hợp nhất, đã loại trùng, để dashboard hiển thị.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ReconciledView {
    pub profile: Option<Profile>,
    pub parameters: Vec<Parameter>,
    pub conditions: Vec<Condition>,
    pub medications: Vec<Medication>,
}

impl ReconciledView {
    pub fn is_empty(&self) -> bool {
        self.profile.is_none()
            && self.parameters.is_empty()
            && self.conditions.is_empty()
            && self.medications.is_empty()
    }

    /// Các chỉ số cần chú ý.
    pub fn flagged_parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters
            .iter()
            .filter(|parameter| parameter.status.is_flagged())
    }

    /// Tìm chỉ số theo bất kỳ tên nào có cùng khóa định danh.
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        let key = parameter_key(name);
        self.parameters.iter().find(|parameter| parameter.key() == key)
    }
}

/// Lỗi chung khi đọc dữ liệu đầu vào của cổng.
#[derive(Debug, thiserror::Error)]
pub enum PortalError {
    #[error("Dữ liệu đầu vào thiếu thông tin: {0}")]
    MissingData(String),
    #[error("Không đọc được dữ liệu: {0}")]
    Parse(String),
}

impl From<serde_json::Error> for PortalError {
    fn from(err: serde_json::Error) -> Self {
        PortalError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bmi_is_rounded_to_one_decimal() {
        let profile = Profile {
            height: Some(Measurement {
                value: Some(170.0),
                unit: Some("cm".into()),
            }),
            weight: Some(Measurement {
                value: Some(70.0),
                unit: Some("kg".into()),
            }),
            ..Profile::default()
        };
        assert_eq!(profile.computed_bmi(), Some(24.2));
    }

    #[test]
    fn bmi_needs_both_measurements() {
        let profile = Profile {
            height: Some(Measurement {
                value: Some(170.0),
                unit: None,
            }),
            ..Profile::default()
        };
        assert_eq!(profile.computed_bmi(), None);
    }

    #[test]
    fn medication_name_validity() {
        let named = |name: &str| Medication {
            name: name.to_string(),
            ..Medication::default()
        };
        assert!(named("Metformin").has_valid_name());
        assert!(named("B6").has_valid_name());
        assert!(!named("").has_valid_name());
        assert!(!named(".").has_valid_name());
        assert!(!named("x").has_valid_name());
        assert!(!named("  ").has_valid_name());
    }

    #[test]
    fn thresholds_flag_only_strictly_beyond_bounds() {
        let t = VitalThresholds::default();
        assert_eq!(t.blood_pressure_status(140.0, 90.0), ParameterStatus::Normal);
        assert_eq!(t.blood_pressure_status(141.0, 80.0), ParameterStatus::Warning);
        assert_eq!(t.blood_pressure_status(120.0, 91.0), ParameterStatus::Warning);
        assert_eq!(t.heart_rate_status(59.0), ParameterStatus::Warning);
        assert_eq!(t.heart_rate_status(100.0), ParameterStatus::Normal);
        assert_eq!(t.spo2_status(94.0), ParameterStatus::Warning);
        assert_eq!(t.temperature_status(37.5), ParameterStatus::Normal);
        assert_eq!(t.hba1c_status(6.6), ParameterStatus::Warning);
        assert_eq!(t.ldl_status(131.0), ParameterStatus::Warning);
    }

    #[test]
    fn parameter_value_display() {
        assert_eq!(ParameterValue::Number(72.0).to_string(), "72");
        assert_eq!(ParameterValue::Number(36.8).to_string(), "36.8");
        assert_eq!(ParameterValue::Text("120/80".into()).to_string(), "120/80");
        assert_eq!(ParameterValue::Text(" 98 ".into()).as_f64(), Some(98.0));
    }

    #[test]
    fn empty_view_serializes_with_null_profile() {
        let json = serde_json::to_value(ReconciledView::default()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "profile": null,
                "parameters": [],
                "conditions": [],
                "medications": []
            })
        );
    }

    #[test]
    fn controlled_condition_serializes_null_diagnosed_date() {
        let json = serde_json::to_value(Condition::controlled("Hypertension")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "name": "Hypertension",
                "currentStatus": "controlled",
                "diagnosedDate": null
            })
        );
    }
}
