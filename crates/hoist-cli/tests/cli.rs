use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::{tempdir, TempDir};

const TOPOLOGY: &str = r#"{
  "health_monitoring": {
    "heartbeat_config": {
      "interval_minutes": 5,
      "check_interval_seconds": 30,
      "failure_timeout_minutes": 3,
      "health_timeout_seconds": 10
    }
  },
  "droplets": {
    "master": { "ip": "10.0.0.1", "role": "master" },
    "web1": { "ip": "10.0.0.2", "role": "web", "size": "s-2vcpu-2gb" }
  },
  "projects": {
    "hostomatic": {
      "uat": {
        "services": {
          "backend": { "type": "web", "assigned_droplets": ["web1"] },
          "frontend": { "type": "web", "assigned_droplets": ["web1"] },
          "admin": { "type": "web", "port": 8004, "assigned_droplets": ["web1"] }
        }
      }
    }
  }
}
"#;

const JOBS: &str = r#"
- name: backup
  schedule: "0 3 * * *"
  script_path: scripts/backup.sh
  description: Nightly backup
- name: health-check
  schedule: "*/5 * * * *"
  script_path: scripts/health.sh
  enabled: false
"#;

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new(topology: &str, jobs: &str) -> Self {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("target.json"), topology).expect("write topology");
        fs::write(dir.path().join("jobs.yaml"), jobs).expect("write jobs");
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn hoist(&self) -> Command {
        let mut cmd = Command::cargo_bin("hoist").expect("hoist binary");
        cmd.current_dir(self.dir.path())
            .env_remove("RUST_LOG")
            .env_remove("HOIST_PROVIDER_ENDPOINT")
            .env_remove("HOIST_PROVIDER_TOKEN")
            .env_remove("HOIST_CONFIG");
        cmd
    }

    fn topology_json(&self) -> serde_json::Value {
        let raw = fs::read_to_string(self.path("target.json")).expect("read topology");
        serde_json::from_str(&raw).expect("topology json")
    }
}

fn port(topology: &serde_json::Value, service: &str) -> Option<u64> {
    topology["projects"]["hostomatic"]["uat"]["services"][service]["port"].as_u64()
}

fn write_script(path: &Path, body: &str) {
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(path, body).expect("write script");
}

#[test]
fn validate_accepts_valid_topology() {
    let fx = Fixture::new(TOPOLOGY, JOBS);
    fx.hoist()
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("is valid"));
}

#[test]
fn validate_rejects_missing_role_with_exit_1() {
    let topology = TOPOLOGY.replace(r#""role": "web", "#, "");
    let fx = Fixture::new(&topology, JOBS);
    fx.hoist()
        .arg("validate")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("droplet 'web1' has no role"));
}

#[test]
fn validate_rejects_malformed_cron_and_duplicate_job() {
    let jobs = format!("{JOBS}- name: backup\n  schedule: \"61 * * * *\"\n  script_path: x.sh\n");
    let fx = Fixture::new(TOPOLOGY, &jobs);
    fx.hoist()
        .arg("validate")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("defined more than once"))
        .stderr(predicate::str::contains("malformed schedule"));
}

#[test]
fn validate_rejects_dangling_droplet() {
    let topology = TOPOLOGY.replace(r#"["web1"] },"#, r#"["web9"] },"#);
    let fx = Fixture::new(&topology, JOBS);
    fx.hoist()
        .args(["validate", "-o", "json"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("dangling_droplet"));
}

#[test]
fn validate_strict_turns_warnings_into_errors() {
    let topology = TOPOLOGY.replace(r#""role": "master""#, r#""role": "web""#);
    let fx = Fixture::new(&topology, JOBS);

    fx.hoist()
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("no droplet has role 'master'"));

    fx.hoist().args(["validate", "--strict"]).assert().code(1);
}

#[test]
fn unparseable_topology_is_a_validation_failure() {
    let fx = Fixture::new("{ not json", JOBS);
    fx.hoist().arg("validate").assert().code(1);
}

#[test]
fn apply_assigns_stable_ports() {
    let fx = Fixture::new(TOPOLOGY, JOBS);

    fx.hoist().arg("apply").assert().success();
    let first = fx.topology_json();
    let backend = port(&first, "backend").expect("backend port");
    let frontend = port(&first, "frontend").expect("frontend port");
    assert_ne!(backend, frontend);
    assert!((8000..10000).contains(&backend));
    assert_eq!(port(&first, "admin"), Some(8004));
    assert_eq!(first["droplets"]["web1"]["size"], "s-2vcpu-2gb");

    fx.hoist().arg("apply").assert().success();
    let second = fx.topology_json();
    assert_eq!(port(&second, "backend"), Some(backend));
    assert_eq!(port(&second, "frontend"), Some(frontend));

    // Same input in a fresh directory gives the same ports.
    let other = Fixture::new(TOPOLOGY, JOBS);
    other.hoist().arg("ports").assert().success();
    assert_eq!(port(&other.topology_json(), "backend"), Some(backend));
}

#[test]
fn apply_dry_run_writes_nothing() {
    let fx = Fixture::new(TOPOLOGY, JOBS);
    fx.hoist()
        .args(["apply", "--dry-run", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"ports\""));
    assert_eq!(fs::read_to_string(fx.path("target.json")).unwrap(), TOPOLOGY);
}

#[test]
fn apply_without_provider_leaves_droplet_unprovisioned_with_exit_2() {
    let topology = TOPOLOGY.replace(r#""ip": "10.0.0.2""#, r#""ip": null"#);
    let fx = Fixture::new(&topology, JOBS);

    fx.hoist()
        .arg("apply")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("could not be provisioned"));

    let after = fx.topology_json();
    assert!(after["droplets"]["web1"]["ip"].is_null());
    assert!(port(&after, "backend").is_some());
}

#[test]
fn jobs_lists_definitions() {
    let fx = Fixture::new(TOPOLOGY, JOBS);
    let output = fx.hoist().args(["jobs", "-o", "json"]).output().expect("run");
    assert!(output.status.success());

    let rows: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    let rows = rows.as_array().expect("array");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["name"], "backup");
    assert_eq!(rows[1]["name"], "health-check");
}

#[test]
fn missing_default_jobs_file_is_fine() {
    let fx = Fixture::new(TOPOLOGY, JOBS);
    fs::remove_file(fx.path("jobs.yaml")).unwrap();
    fx.hoist().arg("validate").assert().success();

    fx.hoist()
        .args(["jobs", "--jobs", "absent.yaml"])
        .assert()
        .code(2);
}

#[test]
fn validate_reports_unreadable_files_with_exit_1() {
    let fx = Fixture::new(TOPOLOGY, JOBS);
    fx.hoist()
        .args(["validate", "--jobs", "absent.yaml"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("absent.yaml"));

    fs::remove_file(fx.path("target.json")).unwrap();
    fx.hoist()
        .arg("validate")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("target.json"));
}

#[test]
fn validate_json_names_unknown_service_type() {
    let topology = TOPOLOGY.replace(
        r#""type": "web", "port": 8004"#,
        r#""type": "database", "port": 8004"#,
    );
    let fx = Fixture::new(&topology, JOBS);
    fx.hoist()
        .args(["validate", "-o", "json"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains(r#""kind": "unknown_service_type""#))
        .stdout(predicate::str::contains(r#""service_type": "database""#));
}

#[test]
fn summary_reports_counts() {
    let fx = Fixture::new(TOPOLOGY, JOBS);
    let output = fx.hoist().args(["summary", "-o", "json"]).output().expect("run");
    assert!(output.status.success());

    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(summary["droplets"], 2);
    assert_eq!(summary["services"], 3);
    assert_eq!(summary["enabled_jobs"], 1);
    assert_eq!(summary["master"], "10.0.0.1");
}

#[test]
fn run_job_unknown_name_fails() {
    let fx = Fixture::new(TOPOLOGY, JOBS);
    fx.hoist()
        .args(["run-job", "nope"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Job not found: nope"));
}

#[cfg(unix)]
#[test]
fn run_job_reports_script_exit_status() {
    let fx = Fixture::new(TOPOLOGY, JOBS);
    write_script(&fx.path("scripts/backup.sh"), "echo backing up\n");
    write_script(&fx.path("scripts/health.sh"), "echo unhealthy >&2\nexit 4\n");

    fx.hoist()
        .args(["run-job", "backup"])
        .env("HOIST_EXECUTOR__INTERPRETER", "sh")
        .assert()
        .success()
        .stdout(predicate::str::contains("Job backup succeeded"));

    fx.hoist()
        .args(["run-job", "health-check"])
        .env("HOIST_EXECUTOR__INTERPRETER", "sh")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("code 4"));
}
