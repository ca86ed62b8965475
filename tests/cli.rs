use std::ffi::OsString;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use chrono::{Duration, Utc};
use predicates::prelude::PredicateBooleanExt;
use serde_json::{Value, json};
use tempfile::{TempDir, tempdir};

const BIN: &str = "metadeploy";

const JOB_A: &str = "0Af000000000001AAA";
const JOB_B: &str = "0Af000000000002AAA";
const JOB_A_SHORT: &str = "0Af000000000001";

const FAKE_MDT_SCRIPT: &str = r#"#!/usr/bin/env python3
import json
import os
import sys

ROOT = os.path.abspath(os.environ.get("FAKE_MDT_ROOT", "."))
JOB_ID = os.environ.get("FAKE_MDT_JOB_ID", "0Af000000000001AAA")
STATUSES = os.environ.get("FAKE_MDT_STATUSES", "Succeeded").split(",")
FLAKY = int(os.environ.get("FAKE_MDT_FLAKY", "0"))
COMPONENTS = int(os.environ.get("FAKE_MDT_COMPONENTS", "3"))
FAILED = int(os.environ.get("FAKE_MDT_FAILED", "0"))


def emit(payload):
    sys.stdout.write(json.dumps(payload) + "\n")


def bump(area):
    path = os.path.join(ROOT, f"{area}-calls.json")
    count = 0
    if os.path.exists(path):
        with open(path, "r", encoding="utf-8") as handle:
            count = json.load(handle)["count"]
    count += 1
    with open(path, "w", encoding="utf-8") as handle:
        json.dump({"count": count}, handle)
    return count


def snapshot(job_id, status):
    failures = []
    if FAILED and status in ("SucceededPartial", "Failed"):
        failures = [
            {"full_name": f"Broken{i}", "type": "ApexClass", "problem": "Invalid syntax"}
            for i in range(FAILED)
        ]
    deployed = COMPONENTS - len(failures) if status.startswith("Succeeded") else 0
    return {
        "id": job_id,
        "status": status,
        "components_total": COMPONENTS,
        "components_deployed": deployed,
        "components_failed": len(failures),
        "tests_total": 0,
        "tests_completed": 0,
        "tests_failed": 0,
        "failures": failures,
    }


def main(argv):
    if len(argv) < 2:
        sys.stderr.write("usage: mdt <area> <op> [id]\n")
        return 1
    area, op = argv[0], argv[1]

    if op == "start":
        request = json.load(sys.stdin)
        if (
            area == "deploy"
            and os.environ.get("FAKE_MDT_CONFLICTS")
            and not request.get("ignore_conflicts")
        ):
            emit({
                "error": {
                    "name": "SourceConflictError",
                    "message": "local files conflict with the org",
                    "conflicts": [
                        {
                            "full_name": "MyClass",
                            "type": "ApexClass",
                            "path": "classes/MyClass.cls",
                        }
                    ],
                }
            })
            return 0
        emit({"id": JOB_ID, "status": "Pending"})
        return 0

    if op == "status":
        count = bump(area)
        if count <= FLAKY:
            sys.stderr.write("request failed: ECONNRESET\n")
            return 1
        index = min(count - FLAKY, len(STATUSES)) - 1
        emit(snapshot(argv[2], STATUSES[index].strip()))
        return 0

    if op == "cancel":
        if os.environ.get("FAKE_MDT_CANCEL_INVALID"):
            emit({"error": {"name": "INVALID_ID_FIELD", "message": "the job already finished"}})
            return 0
        emit(snapshot(argv[2], os.environ.get("FAKE_MDT_CANCEL_STATUS", "Canceling")))
        return 0

    if op == "quick":
        if os.environ.get("FAKE_MDT_QUICK_INVALID"):
            emit({
                "error": {
                    "name": "INVALID_ID_FIELD",
                    "message": "no validation found for this id",
                }
            })
            return 0
        emit({"id": os.environ.get("FAKE_MDT_QUICK_ID", JOB_ID), "status": "Pending"})
        return 0

    sys.stderr.write(f"unsupported operation {area} {op}\n")
    return 1


if __name__ == "__main__":
    sys.exit(main(sys.argv[1:]))
"#;

struct TestEnv {
    project: TempDir,
    path: OsString,
    envs: Vec<(String, String)>,
}

impl TestEnv {
    fn new() -> Self {
        let project = tempdir().expect("tempdir");
        let bin_dir = project.path().join("bin");
        write_fake_mdt(&bin_dir);

        let base_path = std::env::var_os("PATH").unwrap_or_else(|| OsString::from(""));
        let mut path = OsString::new();
        path.push(bin_dir.as_os_str());
        path.push(":");
        path.push(&base_path);

        let envs = vec![(
            "FAKE_MDT_ROOT".to_string(),
            project.path().to_str().expect("project path utf8").to_string(),
        )];

        Self {
            project,
            path,
            envs,
        }
    }

    fn env(&mut self, key: &str, value: &str) -> &mut Self {
        self.envs.push((key.to_string(), value.to_string()));
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin(BIN).expect("binary should build");
        cmd.current_dir(self.project.path());
        cmd.env("PATH", &self.path);
        for (key, value) in &self.envs {
            cmd.env(key, value);
        }
        cmd
    }

    fn cache_path(&self) -> PathBuf {
        self.project
            .path()
            .join(".metadeploy")
            .join("deploy-cache.json")
    }

    fn read_cache(&self) -> Value {
        let raw = fs::read_to_string(self.cache_path()).expect("cache file");
        serde_json::from_str(&raw).expect("valid cache json")
    }

    fn seed_cache(&self, entries: &[(&str, &str)]) {
        let state_dir = self.project.path().join(".metadeploy");
        fs::create_dir_all(&state_dir).expect("state dir");
        let now = Utc::now();
        let mut jobs = serde_json::Map::new();
        for (id, status) in entries {
            jobs.insert(
                id.to_string(),
                json!({
                    "job_id": id,
                    "target_org": "dev@example.com",
                    "wait_minutes": 5,
                    "status": status,
                    "created_at": now.to_rfc3339(),
                    "expires_at": (now + Duration::days(3)).to_rfc3339(),
                }),
            );
        }
        let doc = json!({
            "latest": entries.last().map(|(id, _)| *id),
            "jobs": Value::Object(jobs),
        });
        fs::write(
            state_dir.join("deploy-cache.json"),
            serde_json::to_string_pretty(&doc).expect("serialize cache"),
        )
        .expect("write cache");
    }
}

fn write_fake_mdt(bin_dir: &Path) {
    fs::create_dir_all(bin_dir).expect("create fake mdt bin dir");
    let script_path = bin_dir.join("mdt");
    fs::write(&script_path, FAKE_MDT_SCRIPT).expect("write fake mdt script");
    let mut permissions = fs::metadata(&script_path)
        .expect("script metadata")
        .permissions();
    permissions.set_mode(0o755);
    fs::set_permissions(&script_path, permissions).expect("set script permissions");
}

#[test]
fn help_lists_supported_subcommands() {
    let mut cmd = Command::cargo_bin(BIN).expect("binary should build");
    cmd.args(["deploy", "--help"]);
    cmd.assert()
        .success()
        .stdout(predicates::str::contains("start"))
        .stdout(predicates::str::contains("validate"))
        .stdout(predicates::str::contains("quick"))
        .stdout(predicates::str::contains("resume"))
        .stdout(predicates::str::contains("cancel"))
        .stdout(predicates::str::contains("report"));
}

#[test]
fn deploy_start_succeeds_and_caches_the_job() {
    let mut env = TestEnv::new();
    env.env("FAKE_MDT_STATUSES", "InProgress,Succeeded");

    let mut cmd = env.command();
    cmd.args([
        "deploy",
        "start",
        "--source-dir",
        "force-app",
        "--target-org",
        "dev@example.com",
    ]);
    cmd.assert()
        .code(0)
        .stdout(predicates::str::contains(format!("Deploy ID: {JOB_A}")))
        .stdout(predicates::str::contains("Succeeded"));

    let cache = env.read_cache();
    assert_eq!(cache["latest"], JOB_A);
    assert_eq!(cache["jobs"][JOB_A]["target_org"], "dev@example.com");
    assert_eq!(cache["jobs"][JOB_A]["status"], "Succeeded");
}

#[test]
fn deploy_start_async_returns_once_the_job_is_queued() {
    let env = TestEnv::new();

    let mut cmd = env.command();
    cmd.args([
        "deploy",
        "start",
        "--source-dir",
        "force-app",
        "--target-org",
        "dev@example.com",
        "--async",
    ]);
    cmd.assert()
        .code(69)
        .stdout(predicates::str::contains("Pending"))
        .stdout(predicates::str::contains("deploy resume --job-id"));

    let cache = env.read_cache();
    assert_eq!(cache["jobs"][JOB_A]["status"], "Pending");
}

#[test]
fn deploy_start_emits_a_json_envelope() {
    let mut env = TestEnv::new();
    env.env("FAKE_MDT_STATUSES", "Succeeded");

    let mut cmd = env.command();
    cmd.args([
        "deploy",
        "start",
        "--source-dir",
        "force-app",
        "--target-org",
        "dev@example.com",
        "--json",
    ]);
    let output = cmd.assert().code(0).get_output().stdout.clone();
    let value: Value = serde_json::from_slice(&output).expect("valid json");
    assert_eq!(value["id"], JOB_A);
    assert_eq!(value["status"], "Succeeded");
    assert_eq!(value["done"], true);
    assert_eq!(value["components"]["total"], 3);
}

#[test]
fn partial_success_exits_with_its_own_code() {
    let mut env = TestEnv::new();
    env.env("FAKE_MDT_STATUSES", "InProgress,SucceededPartial");
    env.env("FAKE_MDT_FAILED", "1");

    let mut cmd = env.command();
    cmd.args([
        "deploy",
        "start",
        "--source-dir",
        "force-app",
        "--target-org",
        "dev@example.com",
    ]);
    cmd.assert()
        .code(68)
        .stdout(predicates::str::contains("SucceededPartial"))
        .stdout(predicates::str::contains("Broken0"))
        .stdout(predicates::str::contains("Invalid syntax"));
}

#[test]
fn failed_deploy_exits_nonzero() {
    let mut env = TestEnv::new();
    env.env("FAKE_MDT_STATUSES", "Failed");
    env.env("FAKE_MDT_FAILED", "2");

    let mut cmd = env.command();
    cmd.args([
        "deploy",
        "start",
        "--source-dir",
        "force-app",
        "--target-org",
        "dev@example.com",
    ]);
    cmd.assert()
        .code(1)
        .stdout(predicates::str::contains("Failed"))
        .stdout(predicates::str::contains("Broken1"));
}

#[test]
fn conflicts_render_a_table_and_fail_the_deploy() {
    let mut env = TestEnv::new();
    env.env("FAKE_MDT_CONFLICTS", "1");

    let mut cmd = env.command();
    cmd.args([
        "deploy",
        "start",
        "--source-dir",
        "force-app",
        "--target-org",
        "dev@example.com",
    ]);
    cmd.assert()
        .code(1)
        .stdout(predicates::str::contains("MyClass"))
        .stdout(predicates::str::contains("classes/MyClass.cls"))
        .stderr(predicates::str::contains("ConflictsDetected"))
        .stderr(predicates::str::contains("--ignore-conflicts"));
}

#[test]
fn ignoring_conflicts_lets_the_deploy_through() {
    let mut env = TestEnv::new();
    env.env("FAKE_MDT_CONFLICTS", "1");
    env.env("FAKE_MDT_STATUSES", "Succeeded");

    let mut cmd = env.command();
    cmd.args([
        "deploy",
        "start",
        "--source-dir",
        "force-app",
        "--target-org",
        "dev@example.com",
        "--ignore-conflicts",
    ]);
    cmd.assert().code(0);
}

#[test]
fn specified_tests_level_requires_tests() {
    let env = TestEnv::new();

    let mut cmd = env.command();
    cmd.args([
        "deploy",
        "start",
        "--source-dir",
        "force-app",
        "--target-org",
        "dev@example.com",
        "--test-level",
        "run-specified-tests",
    ]);
    cmd.assert()
        .code(1)
        .stderr(predicates::str::contains("--tests is required"));

    assert!(!env.cache_path().exists(), "usage errors must not touch the cache");
}

#[test]
fn validate_then_quick_deploy_round_trip() {
    let mut env = TestEnv::new();
    env.env("FAKE_MDT_STATUSES", "Succeeded");
    env.env("FAKE_MDT_QUICK_ID", JOB_B);

    let mut validate = env.command();
    validate.args([
        "deploy",
        "validate",
        "--source-dir",
        "force-app",
        "--target-org",
        "dev@example.com",
    ]);
    validate
        .assert()
        .code(0)
        .stdout(predicates::str::contains(format!("Validation ID: {JOB_A}")))
        .stdout(predicates::str::contains("deploy quick --job-id"));

    let cache = env.read_cache();
    assert_eq!(cache["jobs"][JOB_A]["validation"], true);

    let mut quick = env.command();
    quick.args(["deploy", "quick", "--use-most-recent"]);
    quick
        .assert()
        .code(0)
        .stdout(predicates::str::contains(format!("Deploy ID: {JOB_B}")));

    let cache = env.read_cache();
    assert_eq!(cache["latest"], JOB_B);
    assert_eq!(cache["jobs"][JOB_B]["validation"], false);
    assert_eq!(cache["jobs"][JOB_B]["target_org"], "dev@example.com");
}

#[test]
fn quick_deploy_rejects_an_unknown_validation() {
    let mut env = TestEnv::new();
    env.env("FAKE_MDT_QUICK_INVALID", "1");

    let mut cmd = env.command();
    cmd.args(["deploy", "quick", "--job-id", JOB_A]);
    cmd.assert()
        .code(1)
        .stderr(predicates::str::contains("cannot be quick deployed"))
        .stderr(predicates::str::contains("no validation found for this id"));
}

#[test]
fn resume_completes_and_clears_the_cache_entry() {
    let mut env = TestEnv::new();
    env.env("FAKE_MDT_STATUSES", "Succeeded");
    env.seed_cache(&[(JOB_B, "InProgress"), (JOB_A, "InProgress")]);

    let mut cmd = env.command();
    cmd.args(["deploy", "resume", "--job-id", JOB_A]);
    cmd.assert()
        .code(0)
        .stdout(predicates::str::contains("Succeeded"));

    let cache = env.read_cache();
    assert!(
        cache["jobs"].get(JOB_A).is_none(),
        "resumed job should be dropped from the cache"
    );
    assert_eq!(cache["jobs"][JOB_B]["status"], "InProgress");
}

#[test]
fn resume_rejects_a_job_that_already_finished() {
    let env = TestEnv::new();
    env.seed_cache(&[(JOB_A, "Failed")]);

    let mut cmd = env.command();
    cmd.args(["deploy", "resume", "--job-id", JOB_A]);
    cmd.assert()
        .code(1)
        .stderr(predicates::str::contains("cannot be resumed"));
}

#[test]
fn resume_requires_a_job_reference() {
    let env = TestEnv::new();

    let mut cmd = env.command();
    cmd.args(["deploy", "resume"]);
    cmd.assert()
        .code(1)
        .stderr(predicates::str::contains("no recent deploy job"));
}

#[test]
fn most_recent_against_an_empty_cache_fails_in_json_mode() {
    let env = TestEnv::new();

    let mut cmd = env.command();
    cmd.args(["deploy", "resume", "--use-most-recent", "--json"]);
    let output = cmd.assert().code(1).get_output().stdout.clone();
    let value: Value = serde_json::from_slice(&output).expect("valid json");
    assert_eq!(value["name"], "NoRecentJobId");
    assert_eq!(value["exitCode"], 1);
}

#[test]
fn report_resolves_a_short_job_id() {
    let mut env = TestEnv::new();
    env.env("FAKE_MDT_STATUSES", "InProgress");
    env.seed_cache(&[(JOB_A, "InProgress")]);

    let mut cmd = env.command();
    cmd.args(["deploy", "report", "--job-id", JOB_A_SHORT]);
    cmd.assert()
        .code(69)
        .stdout(predicates::str::contains(format!("Deploy ID: {JOB_A}")))
        .stdout(predicates::str::contains("InProgress"))
        .stdout(predicates::str::contains("Target org: dev@example.com"));
}

#[test]
fn report_emits_a_json_envelope() {
    let mut env = TestEnv::new();
    env.env("FAKE_MDT_STATUSES", "Succeeded");
    env.seed_cache(&[(JOB_A, "InProgress")]);

    let mut cmd = env.command();
    cmd.args(["deploy", "report", "--use-most-recent", "--json"]);
    let output = cmd.assert().code(0).get_output().stdout.clone();
    let value: Value = serde_json::from_slice(&output).expect("valid json");
    assert_eq!(value["id"], JOB_A);
    assert_eq!(value["status"], "Succeeded");

    let cache = env.read_cache();
    assert_eq!(cache["jobs"][JOB_A]["status"], "Succeeded");
}

#[test]
fn report_rejects_an_uncached_job_id() {
    let env = TestEnv::new();
    env.seed_cache(&[(JOB_A, "InProgress")]);

    let mut cmd = env.command();
    cmd.args(["deploy", "report", "--job-id", JOB_B]);
    cmd.assert()
        .code(1)
        .stderr(predicates::str::contains("invalid deploy job id"));
}

#[test]
fn cancel_polls_until_the_job_is_canceled() {
    let mut env = TestEnv::new();
    env.env("FAKE_MDT_STATUSES", "Canceled");
    env.seed_cache(&[(JOB_A, "InProgress")]);

    let mut cmd = env.command();
    cmd.args(["deploy", "cancel", "--job-id", JOB_A]);
    cmd.assert()
        .code(1)
        .stdout(predicates::str::contains("Canceling"))
        .stdout(predicates::str::contains("Canceled"));

    let cache = env.read_cache();
    assert_eq!(cache["jobs"][JOB_A]["status"], "Canceled");
}

#[test]
fn cancel_relabels_a_server_rejection() {
    let mut env = TestEnv::new();
    env.env("FAKE_MDT_CANCEL_INVALID", "1");
    env.seed_cache(&[(JOB_A, "InProgress")]);

    let mut cmd = env.command();
    cmd.args(["deploy", "cancel", "--job-id", JOB_A]);
    cmd.assert()
        .code(1)
        .stderr(predicates::str::contains("cannot be canceled"))
        .stderr(predicates::str::contains("the job already finished"));
}

#[test]
fn transient_poll_errors_are_retried() {
    let mut env = TestEnv::new();
    env.env("FAKE_MDT_FLAKY", "2");
    env.env("FAKE_MDT_STATUSES", "Succeeded");

    let mut cmd = env.command();
    cmd.args([
        "deploy",
        "start",
        "--source-dir",
        "force-app",
        "--target-org",
        "dev@example.com",
    ]);
    cmd.assert()
        .code(0)
        .stdout(predicates::str::contains("Succeeded"))
        .stderr(predicates::str::contains("ECONNRESET").not());
}

#[test]
fn retrieve_start_polls_to_completion() {
    let mut env = TestEnv::new();
    env.env("FAKE_MDT_STATUSES", "InProgress,Succeeded");

    let mut cmd = env.command();
    cmd.args([
        "retrieve",
        "start",
        "--source-dir",
        "force-app",
        "--target-org",
        "dev@example.com",
    ]);
    cmd.assert()
        .code(0)
        .stdout(predicates::str::contains(format!("Retrieve ID: {JOB_A}")))
        .stdout(predicates::str::contains("Succeeded"));
}
