use std::env;
use std::sync::{Mutex, OnceLock};

use rise_cli::commands::{migrate, negotiate, seed};
use serde_json::Value;

#[test]
fn migrate_returns_success_with_valid_env() {
    let db = TempDb::new();
    with_env(&[("RISE_DATABASE_URL", db.url.as_str())], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_for_invalid_flexibility() {
    with_env(
        &[("RISE_DATABASE_URL", "sqlite::memory:"), ("RISE_NEGOTIATION_DEFAULT_FLEXIBILITY", "2")],
        || {
            let result = migrate::run();
            assert_eq!(result.exit_code, 2, "expected config validation failure code");

            let payload = parse_payload(&result.output);
            assert_eq!(payload["status"], "error");
            assert_eq!(payload["error_class"], "config_validation");
        },
    );
}

#[test]
fn seed_loads_demo_inventory_once() {
    let db = TempDb::new();
    with_env(&[("RISE_DATABASE_URL", db.url.as_str())], || {
        let first = seed::run();
        assert_eq!(first.exit_code, 0, "expected first seed invocation success");
        let first_payload = parse_payload(&first.output);
        let message = first_payload["message"].as_str().unwrap_or_default();
        assert!(message.starts_with("demo inventory loaded (6 cars)"));
        assert!(message.contains("  - #1: 2022 Toyota Camry"));

        let second = seed::run();
        assert_eq!(second.exit_code, 0, "expected second seed invocation success");
        let second_payload = parse_payload(&second.output);
        assert_eq!(second_payload["status"], "ok");
        assert_eq!(
            second_payload["message"],
            "demo inventory already present (6 cars in catalog)"
        );
    });
}

#[test]
fn negotiate_counters_then_reports_terminal_errors() {
    let db = TempDb::new();
    with_env(&[("RISE_DATABASE_URL", db.url.as_str())], || {
        assert_eq!(seed::run().exit_code, 0, "seed should succeed");

        let countered = negotiate::run(1, "45000");
        assert_eq!(countered.exit_code, 0);
        let payload = parse_payload(&countered.output);
        assert_eq!(payload["data"]["status"], "counter_offer");
        assert!(payload["message"]
            .as_str()
            .is_some_and(|message| message.starts_with("Negotiate counter offer: ")));

        let rejected = parse_payload(&negotiate::run(1, "30000").output);
        assert_eq!(
            rejected["message"],
            "Negotiate rejected: Offer too low. Minimum acceptable price is 42000."
        );

        let disabled = negotiate::run(4, "34000");
        assert_eq!(disabled.exit_code, 9);
        assert_eq!(parse_payload(&disabled.output)["error_class"], "negotiation_disabled");

        let missing = negotiate::run(99, "1000");
        assert_eq!(missing.exit_code, 8);
        assert_eq!(parse_payload(&missing.output)["error_class"], "not_found");
    });
}

#[test]
fn negotiate_rejects_unparseable_offers_before_touching_the_database() {
    with_env(&[], || {
        let result = negotiate::run(1, "a lot");
        assert_eq!(result.exit_code, 7);
        assert_eq!(parse_payload(&result.output)["error_class"], "invalid_argument");
    });
}

struct TempDb {
    _dir: tempfile::TempDir,
    url: String,
}

impl TempDb {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("rise.db").display());
        Self { _dir: dir, url }
    }
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "RISE_DATABASE_URL",
        "DATABASE_URL",
        "RISE_DATABASE_MAX_CONNECTIONS",
        "RISE_DATABASE_TIMEOUT_SECS",
        "RISE_LLM_PROVIDER",
        "RISE_LLM_API_KEY",
        "RISE_LLM_BASE_URL",
        "RISE_LLM_MODEL",
        "OPENAI_API_KEY",
        "RISE_NEGOTIATION_DEFAULT_FLEXIBILITY",
        "RISE_LOGGING_LEVEL",
        "RISE_LOGGING_FORMAT",
        "RISE_LOG_LEVEL",
        "RISE_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
