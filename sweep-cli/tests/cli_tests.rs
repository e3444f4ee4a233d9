use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// ===== Helpers =====

fn network_xml() -> String {
    let mut doc = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<net>\n");
    for i in 0..40 {
        doc.push_str(&format!(
            "    <edge id=\"e{}\" from=\"n{}\" to=\"n{}\" priority=\"1\"/>\n",
            i,
            i,
            i + 1
        ));
    }
    doc.push_str("</net>\n");
    doc
}

/// Writes inputs and a campaign file whose tools are plain shell commands.
fn workspace(baseline_tool: &str, extra: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let inputs = dir.path().join("inputs");
    fs::create_dir_all(&inputs).unwrap();
    fs::write(inputs.join("network.net.xml"), network_xml()).unwrap();
    fs::write(inputs.join("zones.taz.xml"), "<tazs/>").unwrap();
    fs::write(inputs.join("pt_routes.rou.xml"), "<routes/>").unwrap();
    fs::write(inputs.join("pt_stops.add.xml"), "<additional/>").unwrap();
    fs::write(inputs.join("od_template.od"), "$OR;D2\n1 2 {{TRAFFIC_VALUE}}\n").unwrap();

    let root = dir.path().display();
    let config = format!(
        r#"
[sweep]
traffic_values = [500, 1000]
trials_per_value = 2
baseline_trials = 2

[execution]
max_jobs = 2
{extra}

[paths]
output_dir = "{root}/outputs"
network = "{root}/inputs/network.net.xml"
taz = "{root}/inputs/zones.taz.xml"
matrix_template = "{root}/inputs/od_template.od"
pt_routes = "{root}/inputs/pt_routes.rou.xml"
pt_additionals = ["{root}/inputs/pt_stops.add.xml"]

[naming]
city = "Miskolc"

[tools.baseline_simulation]
program = "sh"
args = ["-c", '{baseline_tool}', "sh", "{{net}}", "{{stop_output}}"]
"#
    );
    let path = dir.path().join("campaign.toml");
    fs::write(&path, config).unwrap();
    (dir, path)
}

fn transit_sweep(dir: &Path, config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("transit-sweep").unwrap();
    cmd.current_dir(dir)
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(config)
        .arg("--no-color");
    cmd
}

// ===== plan =====

#[test]
fn test_plan_lists_every_task_as_json() {
    let (dir, config) = workspace("true", "");

    let output = transit_sweep(dir.path(), &config)
        .args(["--output", "json", "plan"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let tasks: Vec<serde_json::Value> = serde_json::from_slice(&output).unwrap();
    assert_eq!(tasks.len(), 6);
    assert_eq!(tasks[0]["id"], "baseline#1");
    assert_eq!(tasks[0]["seed"], 43);
    assert_eq!(tasks[5]["id"], "mixed-1000#2");
    assert_eq!(tasks[5]["seed"], 1044);
}

#[test]
fn test_plan_compact_output() {
    let (dir, config) = workspace("true", "");

    transit_sweep(dir.path(), &config)
        .args(["-o", "compact", "plan"])
        .assert()
        .success()
        .stdout(predicate::str::contains("mixed-500#1\tmixed\t500\t1\t543"));
}

#[test]
fn test_rejects_unknown_failure_policy() {
    let (dir, config) = workspace("true", "failure_policy = \"fail_fast\"");

    transit_sweep(dir.path(), &config)
        .arg("plan")
        .assert()
        .failure()
        .stderr(predicate::str::contains("campaign.toml"));
}

#[test]
fn test_missing_config_file() {
    let dir = TempDir::new().unwrap();

    transit_sweep(dir.path(), &dir.path().join("nope.toml"))
        .arg("plan")
        .assert()
        .failure()
        .stderr(predicate::str::contains("nope.toml"));
}

#[test]
fn test_environment_overrides_file() {
    let (dir, config) = workspace("true", "");

    let output = transit_sweep(dir.path(), &config)
        .env("SWEEP__SWEEP__BASELINE_TRIALS", "5")
        .args(["-o", "json", "plan"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let tasks: Vec<serde_json::Value> = serde_json::from_slice(&output).unwrap();
    assert_eq!(tasks.len(), 9);
}

// ===== status / inventory =====

#[test]
fn test_status_before_any_run() {
    let (dir, config) = workspace("true", "");

    let output = transit_sweep(dir.path(), &config)
        .args(["-o", "json", "status", "--pending"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let rows: Vec<serde_json::Value> = serde_json::from_slice(&output).unwrap();
    assert_eq!(rows.len(), 6);
    assert_eq!(rows[2]["pending_stages"][0], "matrix_variant");
}

#[test]
fn test_inventory_of_empty_campaign() {
    let (dir, config) = workspace("true", "");

    transit_sweep(dir.path(), &config)
        .args(["-o", "compact", "inventory"])
        .assert()
        .success()
        .stdout(predicate::str::contains("500\t0\t2\tincomplete"));
}

// ===== run =====

#[cfg(unix)]
#[test]
fn test_run_baseline_only_succeeds_and_is_idempotent() {
    let (dir, config) = workspace("cat \"$1\" > \"$2\"", "");
    fs::write(
        &config,
        fs::read_to_string(&config)
            .unwrap()
            .replace("trials_per_value = 2", "trials_per_value = 0")
            .replace("traffic_values = [500, 1000]", "traffic_values = []"),
    )
    .unwrap();

    transit_sweep(dir.path(), &config)
        .args(["-o", "json", "run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"tool_invocations\": 2"));

    let sim = dir.path().join("outputs").join("sim");
    assert!(sim.join("stop_events_baseline_1.xml").is_file());
    assert!(sim.join("stop_events_baseline_2.xml").is_file());
    assert!(dir.path().join("outputs").join("campaign_report.json").is_file());

    transit_sweep(dir.path(), &config)
        .args(["-o", "json", "run", "--max-jobs", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"tool_invocations\": 0"));
}

#[cfg(unix)]
#[test]
fn test_run_reports_aggregate_failure() {
    let (dir, config) = workspace("echo \"Error: bad network\" >&2; exit 3", "");
    fs::write(
        &config,
        fs::read_to_string(&config)
            .unwrap()
            .replace("trials_per_value = 2", "trials_per_value = 0")
            .replace("traffic_values = [500, 1000]", "traffic_values = []"),
    )
    .unwrap();

    transit_sweep(dir.path(), &config)
        .arg("run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("2 of 2 tasks failed"));

    assert!(!dir
        .path()
        .join("outputs")
        .join("sim")
        .join("stop_events_baseline_1.xml")
        .exists());
}
