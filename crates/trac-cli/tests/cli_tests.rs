// SPDX-License-Identifier: Apache-2.0
//! Launcher behavior: flags, exit codes and admin tasks.

use assert_cmd::Command;
use predicates::prelude::*;

fn trac_svc() -> Command {
    Command::cargo_bin("trac-svc").unwrap()
}

fn write_config(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let db = dir.path().join("metadata.db");
    let config = format!(
        r#"
        [tenants.ACME]
        description = "ACME Corp"

        [metadata]
        database = "{}"
        pool_size = 1
        "#,
        db.display()
    );
    let path = dir.path().join("platform.toml");
    std::fs::write(&path, config).unwrap();
    path
}

#[test]
fn help_exits_zero() {
    trac_svc()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--config"))
        .stdout(predicate::str::contains("--task"));
}

#[test]
fn task_list_exits_zero_and_names_tasks() {
    trac_svc()
        .arg("--task-list")
        .assert()
        .success()
        .stdout(predicate::str::contains("run-gateway"))
        .stdout(predicate::str::contains("init-schema"))
        .stdout(predicate::str::contains("add-tenant"))
        .stdout(predicate::str::contains("list-tenants"));
}

#[test]
fn unknown_flag_fails_quietly() {
    trac_svc()
        .arg("--definitely-not-a-flag")
        .assert()
        .failure()
        .stdout(predicate::str::is_empty());
}

#[test]
fn unknown_task_fails_with_exit_one() {
    trac_svc()
        .args(["--task", "no-such-task"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("unknown task"));
}

#[test]
fn missing_config_file_fails() {
    trac_svc()
        .args(["--config", "/definitely/missing.toml", "--task", "list-tenants"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("load config"));
}

#[test]
fn init_schema_creates_the_database() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(&dir);

    trac_svc()
        .args(["--config"])
        .arg(&config)
        .args(["--task", "init-schema"])
        .assert()
        .success()
        .stdout(predicate::str::contains("schema deployed"));

    assert!(dir.path().join("metadata.db").exists());
}

#[test]
fn add_and_list_tenants() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(&dir);

    trac_svc()
        .args(["--config"])
        .arg(&config)
        .args(["--task", "add-tenant", "VOLTDATA", "Volt Data"])
        .assert()
        .success()
        .stdout(predicate::str::contains("tenant [VOLTDATA] registered"));

    trac_svc()
        .args(["--config"])
        .arg(&config)
        .args(["--task", "list-tenants"])
        .assert()
        .success()
        .stdout(predicate::str::contains("VOLTDATA"))
        .stdout(predicate::str::contains("Volt Data"));

    // Registering the same tenant again is a runtime error.
    trac_svc()
        .args(["--config"])
        .arg(&config)
        .args(["--task", "add-tenant", "VOLTDATA"])
        .assert()
        .code(1);
}

#[test]
fn secrets_require_a_secret_key() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("metadata.db");
    let config_text = format!(
        r#"
        [metadata]
        database = "{}"

        [resources.model_repo]
        resource_type = "MODEL_REPOSITORY"
        protocol = "git"

        [resources.model_repo.secrets]
        token = "repo_token"
        "#,
        db.display()
    );
    let path = dir.path().join("platform.toml");
    std::fs::write(&path, config_text).unwrap();

    trac_svc()
        .args(["--config"])
        .arg(&path)
        .args(["--task", "list-tenants"])
        .env_remove("SECRET_KEY")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("secret key"));

    // With a key and the secret present in the environment, the task runs.
    trac_svc()
        .args(["--config"])
        .arg(&path)
        .args(["--task", "list-tenants"])
        .env("SECRET_KEY", "trac_test")
        .env("TRAC_TEST_SECRET_REPO_TOKEN", "sealed")
        .assert()
        .success();
}
