use std::time::Duration;

use workshop_conductor::config::GlobalConfig;
use workshop_conductor::models::activity::ActivityMode;
use workshop_conductor::AppError;

fn sample_toml(data_dir: &str) -> String {
    format!(
        r#"
data_dir = '{data_dir}'
mailbox_capacity = 16
broadcast_capacity = 32
retention_days = 7

[worker]
script_ref = "dist/session-worker"
args = ["--quiet"]
idle_timeout_seconds = 600

[audit]
enabled = true

[[workshops]]
id = "retro"
required_active_profile_count = 3

[[workshops.activities]]
id = "activity-1"
modes = ["individual", "group"]

[[workshops.activities]]
id = "activity-2"
modes = ["group"]

[[sessions]]
id = "session-1"
workshop_id = "retro"
"#
    )
}

fn minimal_toml(data_dir: &str) -> String {
    format!("data_dir = '{data_dir}'\n")
}

#[test]
fn parses_full_config() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config =
        GlobalConfig::from_toml_str(&sample_toml(temp.path().to_str().expect("utf8")))
            .expect("config parses");

    assert_eq!(config.mailbox_capacity, 16);
    assert_eq!(config.broadcast_capacity, 32);
    assert_eq!(config.retention_days, 7);
    assert_eq!(config.worker.script_ref, "dist/session-worker");
    assert_eq!(config.worker.args, vec!["--quiet".to_owned()]);
    assert_eq!(config.worker_idle_timeout(), Some(Duration::from_secs(600)));
    assert!(config.audit.enabled);

    let workshop = &config.workshops[0];
    assert_eq!(workshop.required_active_profile_count, 3);
    let plan = workshop.plan().expect("plan");
    assert_eq!(plan.len(), 2);
    assert_eq!(
        plan.activities()[0].modes,
        vec![ActivityMode::Individual, ActivityMode::Group]
    );
    assert_eq!(config.sessions[0].workshop_id, "retro");
}

#[test]
fn applies_defaults() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = GlobalConfig::from_toml_str(&minimal_toml(temp.path().to_str().expect("utf8")))
        .expect("config parses");

    assert_eq!(config.mailbox_capacity, 64);
    assert_eq!(config.broadcast_capacity, 128);
    assert_eq!(config.retention_days, 30);
    assert_eq!(config.worker.script_ref, "session-worker");
    assert!(config.worker.args.is_empty());
    assert_eq!(config.worker_idle_timeout(), None);
    assert!(!config.audit.enabled);
    assert!(config.workshops.is_empty());
}

#[test]
fn derived_paths_live_under_data_dir() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = GlobalConfig::from_toml_str(&minimal_toml(temp.path().to_str().expect("utf8")))
        .expect("config parses");

    let canonical = temp.path().canonicalize().expect("canonical");
    assert_eq!(config.data_dir, canonical);
    assert_eq!(config.db_path(), canonical.join("conductor.db"));
    assert_eq!(config.audit_dir(), canonical.join("logs"));
}

#[test]
fn load_from_path_reads_file() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("config.toml");
    std::fs::write(&path, minimal_toml(temp.path().to_str().expect("utf8"))).expect("write");

    let config = GlobalConfig::load_from_path(&path).expect("load");
    assert_eq!(config.retention_days, 30);
}

#[test]
fn missing_file_is_config_error() {
    let err = GlobalConfig::load_from_path("/definitely/not/here.toml").expect_err("missing");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn rejects_invalid_settings() {
    let temp = tempfile::tempdir().expect("tempdir");
    let dir = temp.path().to_str().expect("utf8");

    let cases = [
        format!("data_dir = '{dir}'\nmailbox_capacity = 0\n"),
        format!("data_dir = '{dir}'\nbroadcast_capacity = 0\n"),
        format!("data_dir = '{dir}'\n[worker]\nscript_ref = '  '\n"),
        format!(
            "data_dir = '{dir}'\n[[workshops]]\nid = 'w'\nrequired_active_profile_count = 0\n"
        ),
        format!(
            "data_dir = '{dir}'\n[[workshops]]\nid = 'w'\nrequired_active_profile_count = 1\n\
             [[workshops]]\nid = 'w'\nrequired_active_profile_count = 1\n"
        ),
        format!(
            "data_dir = '{dir}'\n[[workshops]]\nid = 'w'\nrequired_active_profile_count = 1\n\
             [[workshops.activities]]\nid = 'a'\nmodes = ['group', 'individual']\n"
        ),
        format!("data_dir = '{dir}'\n[[sessions]]\nid = 's'\nworkshop_id = 'nope'\n"),
        "data_dir = '/definitely/not/here'\n".to_owned(),
        format!(
            "data_dir = '{dir}'\n[[workshops]]\nid = 'w'\nrequired_active_profile_count = 1\n\
             [[workshops.activities]]\nid = 'a'\nmodes = ['solo']\n"
        ),
    ];

    for raw in &cases {
        let err = GlobalConfig::from_toml_str(raw).expect_err("must reject");
        assert!(
            matches!(err, AppError::Config(_)),
            "expected config error for {raw}, got {err}"
        );
    }
}
