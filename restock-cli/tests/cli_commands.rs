mod common;

use predicates::prelude::*;

use common::{json_stdout, MockTarget, Workspace};

const TWO_ITEMS: &str = r#"[{"sku":"A","quantity":5},{"sku":"B","quantity":0}]"#;

#[test]
fn info_on_fresh_home_reports_no_snapshot() {
    let ws = Workspace::new(TWO_ITEMS);
    ws.restock(None)
        .arg("info")
        .assert()
        .success()
        .stdout(predicate::str::contains("no snapshot yet"));
}

#[test]
fn preview_counts_changes_without_a_target() {
    let ws = Workspace::new(TWO_ITEMS);
    let output = ws
        .restock(None)
        .args(["preview", "--json"])
        .output()
        .expect("run preview");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let json = json_stdout(&output);
    assert_eq!(json["new"], 2);
    assert_eq!(json["modified"], 0);
    assert_eq!(json["estimated_batches"], 1);
    assert_eq!(json["estimated_api_calls"], 3, "two lookups and one bulk call");
    assert_eq!(json["estimated_duration_secs"], 1.4);
}

#[test]
fn run_without_target_explains_missing_setting() {
    let ws = Workspace::new(TWO_ITEMS);
    ws.restock(None)
        .arg("run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("target.base_url"));
}

#[test]
fn run_then_rerun_is_idempotent() {
    let ws = Workspace::new(TWO_ITEMS);
    let target = MockTarget::spawn(&[]);

    let first = ws
        .restock(Some(&target.url))
        .args(["run", "--json"])
        .output()
        .expect("first run");
    assert!(
        first.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&first.stderr)
    );
    let summary = json_stdout(&first);
    assert_eq!(summary["new"], 2);
    assert_eq!(summary["successful"], 1);
    assert_eq!(summary["noop"], 1);
    assert_eq!(summary["snapshot_updated"], true);
    assert_eq!(summary["stats"]["throttle_remaining"]["remaining"], 990);
    assert_eq!(summary["applied"][0]["sku"], "A");
    assert_eq!(summary["applied"][0]["quantity"], 5);
    assert_eq!(summary["applied"][0]["delta"], 5);
    assert_eq!(target.adjustments().len(), 1);
    assert!(target.adjustments()[0].contains(r#""delta":5"#));

    let requests_before = target.requests().len();
    let second = ws
        .restock(Some(&target.url))
        .args(["run", "--json"])
        .output()
        .expect("second run");
    assert!(second.status.success());
    let summary = json_stdout(&second);
    assert_eq!(summary["total"], 0);
    assert_eq!(summary["batches"], 0);
    assert_eq!(target.requests().len(), requests_before, "no target calls");

    assert!(ws.state_dir().join("snapshot.json").exists());
}

#[test]
fn changed_quantity_is_pushed_as_delta() {
    let ws = Workspace::new(r#"[{"sku":"A","quantity":10}]"#);
    let target = MockTarget::spawn(&[]);
    ws.restock(Some(&target.url)).arg("run").assert().success();

    ws.write_inventory(r#"[{"sku":"A","quantity":15}]"#);
    ws.restock(Some(&target.url))
        .arg("run")
        .assert()
        .success()
        .stdout(predicate::str::contains("1 synced"));
    let last = target.adjustments().pop().expect("adjustment sent");
    assert!(last.contains(r#""delta":5"#), "got: {last}");
}

#[test]
fn unknown_sku_fails_the_command_but_syncs_the_rest() {
    let ws = Workspace::new(r#"[{"sku":"A","quantity":5},{"sku":"GHOST","quantity":3}]"#);
    let target = MockTarget::spawn(&["GHOST"]);

    ws.restock(Some(&target.url))
        .arg("run")
        .assert()
        .failure()
        .stdout(predicate::str::contains("not found in target system"))
        .stderr(predicate::str::contains("1 item(s) failed"));

    let info = ws
        .restock(None)
        .args(["info", "--json"])
        .output()
        .expect("info");
    assert_eq!(json_stdout(&info)["entries"], 1);
}

#[test]
fn reset_clears_snapshot_and_keeps_backup() {
    let ws = Workspace::new(TWO_ITEMS);
    let target = MockTarget::spawn(&[]);
    ws.restock(Some(&target.url)).arg("run").assert().success();

    ws.restock(None)
        .arg("reset")
        .assert()
        .success()
        .stdout(predicate::str::contains("snapshot cleared"));
    assert!(!ws.state_dir().join("snapshot.json").exists());
    assert!(ws.state_dir().join("snapshot.json.1").exists());

    ws.restock(None)
        .arg("reset")
        .assert()
        .success()
        .stdout(predicate::str::contains("no snapshot to reset"));
}

#[test]
fn check_reports_both_systems() {
    let ws = Workspace::new(TWO_ITEMS);
    let target = MockTarget::spawn(&[]);
    ws.restock(Some(&target.url))
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("source: 2 records"))
        .stdout(predicate::str::contains("resolves to gid://item/A"));
}

#[test]
fn check_fails_when_inventory_missing() {
    let ws = Workspace::new(TWO_ITEMS);
    std::fs::remove_file(&ws.inventory).expect("remove inventory");
    let target = MockTarget::spawn(&[]);
    ws.restock(Some(&target.url))
        .arg("check")
        .assert()
        .failure()
        .stdout(predicate::str::contains("source unavailable"));
}

#[test]
fn invalid_config_is_reported() {
    let ws = Workspace::new(TWO_ITEMS);
    ws.write_config("batch_size: 999\n");
    ws.restock(None)
        .arg("info")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load configuration"));
}

#[test]
fn explicit_config_path_selects_state_dir() {
    let ws = Workspace::new(TWO_ITEMS);
    let state = ws.home.path().join("custom-state");
    let config = ws.home.path().join("restock.yaml");
    std::fs::write(&config, format!("state_dir: {}\n", state.display())).unwrap();

    let output = ws
        .restock(None)
        .arg("--config")
        .arg(&config)
        .args(["info", "--json"])
        .output()
        .expect("info");
    assert!(output.status.success());
    let json = json_stdout(&output);
    assert_eq!(json["path"], state.join("snapshot.json").display().to_string());
}

#[test]
fn verbose_run_lists_applied_items() {
    let ws = Workspace::new(r#"[{"sku":"A","quantity":10},{"sku":"B","quantity":3}]"#);
    let target = MockTarget::spawn(&[]);
    ws.restock(Some(&target.url)).arg("run").assert().success();

    ws.write_inventory(r#"[{"sku":"A","quantity":7},{"sku":"B","quantity":3}]"#);
    ws.restock(Some(&target.url))
        .args(["run", "--verbose"])
        .assert()
        .success()
        .stdout(predicate::str::contains("quantity"))
        .stdout(predicate::str::contains("-3"))
        .stdout(predicate::str::contains("B").not());
}

#[test]
fn sku_with_reserved_characters_round_trips_through_lookup() {
    let ws = Workspace::new(r#"[{"sku":"MANT 500/A&B","quantity":4}]"#);
    let target = MockTarget::spawn(&[]);

    ws.restock(Some(&target.url)).arg("run").assert().success();
    assert_eq!(target.lookups(), ["MANT 500/A&B"]);
    let sent = target.adjustments().pop().expect("adjustment sent");
    assert!(sent.contains(r#""item_id":"gid://item/MANT 500/A&B""#), "got: {sent}");
}

#[test]
fn unknown_sku_with_space_is_reported_missing() {
    let ws = Workspace::new(r#"[{"sku":"MANT 500","quantity":4}]"#);
    let target = MockTarget::spawn(&["MANT 500"]);

    ws.restock(Some(&target.url))
        .arg("run")
        .assert()
        .failure()
        .stdout(predicate::str::contains("not found in target system"));
    assert!(target.adjustments().is_empty());
}
