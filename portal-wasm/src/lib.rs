//! Bridge WASM <-> JavaScript trung lập framework cho front end của cổng.

use portal_auth::{
    require_doctor, require_linked_patient, require_session, AuthSnapshot, GuardConfig,
    GuardOutcome,
};
use portal_core::{ReconcileConfig, VitalThresholds};
use serde::{Deserialize, Serialize};
use serde_wasm_bindgen::{from_value, Serializer};
use wasm_bindgen::prelude::*;

/// Ghi đè một phần ngưỡng; trường nào thiếu thì giữ mặc định.
#[derive(Deserialize, Default)]
struct JsReconcileConfig {
    #[serde(default)]
    systolic_max: Option<f64>,
    #[serde(default)]
    diastolic_max: Option<f64>,
    #[serde(default)]
    heart_rate_max: Option<f64>,
    #[serde(default)]
    heart_rate_min: Option<f64>,
    #[serde(default)]
    spo2_min: Option<f64>,
    #[serde(default)]
    temperature_max: Option<f64>,
    #[serde(default)]
    hba1c_max: Option<f64>,
    #[serde(default)]
    ldl_max: Option<f64>,
}

impl From<JsReconcileConfig> for ReconcileConfig {
    fn from(cfg: JsReconcileConfig) -> Self {
        let base = VitalThresholds::default();
        ReconcileConfig {
            thresholds: VitalThresholds {
                systolic_max: cfg.systolic_max.unwrap_or(base.systolic_max),
                diastolic_max: cfg.diastolic_max.unwrap_or(base.diastolic_max),
                heart_rate_max: cfg.heart_rate_max.unwrap_or(base.heart_rate_max),
                heart_rate_min: cfg.heart_rate_min.unwrap_or(base.heart_rate_min),
                spo2_min: cfg.spo2_min.unwrap_or(base.spo2_min),
                temperature_max: cfg.temperature_max.unwrap_or(base.temperature_max),
                hba1c_max: cfg.hba1c_max.unwrap_or(base.hba1c_max),
                ldl_max: cfg.ldl_max.unwrap_or(base.ldl_max),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GuardKind {
    Session,
    Doctor,
    LinkedPatient,
}

impl GuardKind {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "session" => Some(GuardKind::Session),
            "doctor" => Some(GuardKind::Doctor),
            "linked_patient" => Some(GuardKind::LinkedPatient),
            _ => None,
        }
    }

    fn check(self, auth: &AuthSnapshot, config: &GuardConfig) -> GuardOutcome {
        match self {
            GuardKind::Session => require_session(auth, config),
            GuardKind::Doctor => require_doctor(auth, config),
            GuardKind::LinkedPatient => require_linked_patient(auth, config),
        }
    }
}

/// Hợp nhất các dòng báo cáo (và snapshot nếu có) thành view cho dashboard.
#[wasm_bindgen(js_name = reconcileReports)]
pub fn reconcile_reports(
    reports: JsValue,
    snapshot: Option<JsValue>,
    config: Option<JsValue>,
) -> Result<JsValue, JsValue> {
    #[cfg(target_arch = "wasm32")]
    console_error_panic_hook::set_once();

    let reports = from_value::<serde_json::Value>(reports)
        .map_err(|err| JsValue::from_str(&format!("Không đọc được danh sách báo cáo: {err}")))?;

    let snapshot = match snapshot {
        Some(js_snapshot) if !js_snapshot.is_null() && !js_snapshot.is_undefined() => Some(
            from_value::<serde_json::Value>(js_snapshot)
                .map_err(|err| JsValue::from_str(&format!("Không đọc được snapshot: {err}")))?,
        ),
        _ => None,
    };

    let cfg = match config {
        Some(js_cfg) => {
            let cfg: JsReconcileConfig = from_value(js_cfg)
                .map_err(|err| JsValue::from_str(&format!("Không đọc được config: {err}")))?;
            ReconcileConfig::from(cfg)
        }
        None => ReconcileConfig::default(),
    };

    let view = portal_reports::reconcile_value(&reports, snapshot.as_ref(), &cfg)
        .map_err(|err| JsValue::from_str(&format!("Lỗi hợp nhất: {err}")))?;

    to_js(&view)
}

/// Kiểm tra guard của route (`session`, `doctor`, `linked_patient`) theo
/// trạng thái đăng nhập hiện tại.
#[wasm_bindgen(js_name = checkRoute)]
pub fn check_route(
    guard: &str,
    auth: JsValue,
    config: Option<JsValue>,
) -> Result<JsValue, JsValue> {
    let kind = GuardKind::parse(guard)
        .ok_or_else(|| JsValue::from_str(&format!("Guard không hợp lệ: {guard}")))?;

    let auth: AuthSnapshot = from_value(auth)
        .map_err(|err| JsValue::from_str(&format!("Không đọc được trạng thái đăng nhập: {err}")))?;

    let cfg = match config {
        Some(js_cfg) => from_value::<GuardConfig>(js_cfg)
            .map_err(|err| JsValue::from_str(&format!("Không đọc được config guard: {err}")))?,
        None => GuardConfig::default(),
    };

    to_js(&kind.check(&auth, &cfg))
}

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    value
        .serialize(&Serializer::json_compatible())
        .map_err(|err| JsValue::from_str(&format!("Không serialize được kết quả: {err}")))
}
