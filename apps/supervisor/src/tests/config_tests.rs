use super::*;

use std::{
    collections::HashMap,
    env,
    time::{SystemTime, UNIX_EPOCH},
};

#[test]
fn file_values_override_defaults() {
    let mut settings = Settings::default();
    apply_file(
        &mut settings,
        r#"
            controller_url = "http://192.168.1.20:5000"
            confirm_attempts = 10
            confirm_delay_ms = 250
        "#,
    )
    .expect("parse");

    assert_eq!(settings.controller_url, "http://192.168.1.20:5000");
    assert_eq!(
        settings.confirmation_policy(),
        ConfirmationPolicy {
            attempts: 10,
            delay: Duration::from_millis(250),
        }
    );
    assert_eq!(settings.state_path, DEFAULT_STATE_PATH);
}

#[test]
fn rejects_unparseable_file() {
    let mut settings = Settings::default();
    assert!(apply_file(&mut settings, "poll_period_ms = \"fast\"").is_err());
}

#[test]
fn env_overrides_prefer_app_prefix_and_ignore_bad_numbers() {
    let vars: HashMap<&str, &str> = HashMap::from([
        ("APP__CONTROLLER_URL", "http://pond-a:5000"),
        ("SUPERVISOR_CONTROLLER_URL", "http://ignored:5000"),
        ("SUPERVISOR_POLL_PERIOD_MS", "500"),
        ("APP__CONFIRM_ATTEMPTS", "many"),
    ]);
    let mut settings = Settings::default();
    apply_env(&mut settings, |key| vars.get(key).map(|v| v.to_string()));

    assert_eq!(settings.controller_url, "http://pond-a:5000");
    assert_eq!(settings.poll_period(), Duration::from_millis(500));
    assert_eq!(settings.confirm_attempts, 6);
}

#[test]
fn transport_config_validates_url() {
    let mut settings = Settings::default();
    settings.request_timeout_ms = 0;
    let config = settings.transport_config().expect("config");
    assert_eq!(config.request_timeout, None);
    assert_eq!(config.command_path, DEFAULT_COMMAND_PATH);

    settings.controller_url = "ftp://pond".into();
    assert!(settings.transport_config().is_err());

    settings.controller_url = "not a url".into();
    assert!(settings.transport_config().is_err());
}

#[test]
fn explicit_missing_file_is_an_error() {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let path = env::temp_dir().join(format!("supervisor_missing_{suffix}.toml"));

    assert!(load_settings(Some(&path)).is_err());
}

#[test]
fn loads_explicit_file() {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let path = env::temp_dir().join(format!("supervisor_settings_{suffix}.toml"));
    fs::write(&path, "request_timeout_ms = 750\n").expect("write");

    let settings = load_settings(Some(&path)).expect("load");
    assert_eq!(settings.request_timeout_ms, 750);

    fs::remove_file(path).expect("cleanup");
}
