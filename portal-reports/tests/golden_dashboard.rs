use std::fs;

use portal_core::ReconcileConfig;
use portal_reports::reconcile_str;
use serde_json::Value;

fn fixture_path(name: &str) -> String {
    format!("{}/tests/data/{name}", env!("CARGO_MANIFEST_DIR"))
}

fn read_fixture(name: &str) -> String {
    fs::read_to_string(fixture_path(name)).expect("fixture should be readable")
}

#[test]
fn dashboard_reports_match_golden_view() {
    let reports = read_fixture("dashboard_reports.json");
    let snapshot = read_fixture("dashboard_snapshot.json");

    let view = reconcile_str(&reports, Some(&snapshot), &ReconcileConfig::default())
        .expect("reconciliation should succeed");
    let actual = serde_json::to_value(view).expect("view should serialize");

    let expected: Value =
        serde_json::from_str(&read_fixture("dashboard_view.json")).expect("golden is valid JSON");

    assert_eq!(actual, expected);
}

#[test]
fn caller_order_does_not_change_the_view() {
    let reports = read_fixture("dashboard_reports.json");
    let snapshot = read_fixture("dashboard_snapshot.json");

    let mut rows: Vec<Value> = serde_json::from_str(&reports).unwrap();
    rows.reverse();
    let reversed = serde_json::to_string(&rows).unwrap();

    let config = ReconcileConfig::default();
    let expected = reconcile_str(&reports, Some(&snapshot), &config).unwrap();
    let actual = reconcile_str(&reversed, Some(&snapshot), &config).unwrap();

    assert_eq!(actual, expected);
}
