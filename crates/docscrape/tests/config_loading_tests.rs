//! Table-driven tests for configuration loading and validation.

mod common;

use std::time::Duration;

use tempfile::TempDir;

use docscrape::config::{load_config, load_config_from_str, LogFormat};
use docscrape::error::ConfigError;
use docscrape::session::DedupPolicy;

/// Represents a single config loading test case.
struct ConfigTestCase {
    /// Test case name for identification.
    name: &'static str,
    /// The config JSON content to test.
    config_json: &'static str,
    /// Whether loading should succeed.
    should_succeed: bool,
    /// Expected error substring (if should_succeed is false).
    expected_error: Option<&'static str>,
}

const JSON_CONFIG_TESTS: &[ConfigTestCase] = &[
    ConfigTestCase {
        name: "valid_minimal",
        config_json: r#"{ "version": "1.0" }"#,
        should_succeed: true,
        expected_error: None,
    },
    ConfigTestCase {
        name: "valid_full",
        config_json: r#"{
            "version": "1.0",
            "poll_interval_seconds": 10,
            "max_concurrent_jobs": 5,
            "results_directory": "/data/results",
            "status_store": { "path": "/data/jobs.json" },
            "session": {
                "page_limit": 20,
                "max_page_retries": 4,
                "retry_base_delay_ms": 1000,
                "retry_max_delay_ms": 16000,
                "fetch_timeout_seconds": 45,
                "dedup": "case_number"
            },
            "status_writes": { "max_retries": 2, "base_delay_ms": 250, "max_delay_ms": 1000 },
            "site": {
                "base_url": "https://records.example.gov/",
                "search_path": "RealEstate/SearchResults.aspx",
                "user_agent": "docscrape-test",
                "request_timeout_seconds": 15
            },
            "logging": { "level": "debug", "format": "json" }
        }"#,
        should_succeed: true,
        expected_error: None,
    },
    ConfigTestCase {
        name: "unsupported_version",
        config_json: r#"{ "version": "2.0" }"#,
        should_succeed: false,
        expected_error: Some("Unsupported config version"),
    },
    ConfigTestCase {
        name: "missing_version",
        config_json: r#"{ "max_concurrent_jobs": 2 }"#,
        should_succeed: false,
        expected_error: Some("Schema validation failed"),
    },
    ConfigTestCase {
        name: "unknown_top_level_field",
        config_json: r#"{ "version": "1.0", "worker_count": 4 }"#,
        should_succeed: false,
        expected_error: Some("Schema validation failed"),
    },
    ConfigTestCase {
        name: "zero_concurrency",
        config_json: r#"{ "version": "1.0", "max_concurrent_jobs": 0 }"#,
        should_succeed: false,
        expected_error: Some("Schema validation failed"),
    },
    ConfigTestCase {
        name: "zero_poll_interval",
        config_json: r#"{ "version": "1.0", "poll_interval_seconds": 0 }"#,
        should_succeed: false,
        expected_error: Some("Schema validation failed"),
    },
    ConfigTestCase {
        name: "unknown_dedup_policy",
        config_json: r#"{ "version": "1.0", "session": { "dedup": "grantor" } }"#,
        should_succeed: false,
        expected_error: Some("Schema validation failed"),
    },
    ConfigTestCase {
        name: "unknown_log_format",
        config_json: r#"{ "version": "1.0", "logging": { "format": "xml" } }"#,
        should_succeed: false,
        expected_error: Some("Schema validation failed"),
    },
    ConfigTestCase {
        name: "inverted_retry_delays",
        config_json: r#"{
            "version": "1.0",
            "session": { "retry_base_delay_ms": 5000, "retry_max_delay_ms": 1000 }
        }"#,
        should_succeed: false,
        expected_error: Some("retry_base_delay_ms must not exceed"),
    },
    ConfigTestCase {
        name: "inverted_status_write_delays",
        config_json: r#"{
            "version": "1.0",
            "status_writes": { "base_delay_ms": 9000, "max_delay_ms": 10 }
        }"#,
        should_succeed: false,
        expected_error: Some("base_delay_ms must not exceed"),
    },
    ConfigTestCase {
        name: "relative_base_url",
        config_json: r#"{ "version": "1.0", "site": { "base_url": "records/search" } }"#,
        should_succeed: false,
        expected_error: Some("is not a valid URL"),
    },
    ConfigTestCase {
        name: "not_json",
        config_json: "version = 1.0",
        should_succeed: false,
        expected_error: Some("Failed to parse config JSON"),
    },
];

#[test]
fn test_json_config_loading() {
    for test_case in JSON_CONFIG_TESTS {
        let result = load_config_from_str(test_case.config_json);

        if test_case.should_succeed {
            assert!(
                result.is_ok(),
                "Test '{}': Expected success but got error: {:?}",
                test_case.name,
                result.err()
            );
        } else {
            assert!(
                result.is_err(),
                "Test '{}': Expected error but got success",
                test_case.name
            );

            if let Some(expected_error) = test_case.expected_error {
                let error_msg = result.err().unwrap().to_string();
                assert!(
                    error_msg.contains(expected_error),
                    "Test '{}': Expected error containing '{}', got '{}'",
                    test_case.name,
                    expected_error,
                    error_msg
                );
            }
        }
    }
}

#[test]
fn test_valid_config_field_values() {
    let config = load_config_from_str(JSON_CONFIG_TESTS[1].config_json).unwrap();

    assert_eq!(config.poll_interval_seconds, 10);
    assert_eq!(config.max_concurrent_jobs, 5);
    assert_eq!(config.status_store.path, "/data/jobs.json");
    assert_eq!(config.session.dedup, DedupPolicy::CaseNumber);
    assert_eq!(config.logging.format, LogFormat::Json);

    let orchestrator = config.orchestrator_config();
    assert_eq!(orchestrator.poll_interval, Duration::from_secs(10));
    assert_eq!(orchestrator.max_concurrent_jobs, 5);
    assert_eq!(orchestrator.status_retry.max_attempts(), 3);

    let session = config.session_config();
    assert_eq!(session.page_limit, 20);
    assert_eq!(session.retry.max_attempts(), 5);
    assert_eq!(session.fetch_timeout, Duration::from_secs(45));
}

#[test]
fn test_config_defaults_applied() {
    let config = load_config_from_str(r#"{ "version": "1.0" }"#).unwrap();

    assert_eq!(config.poll_interval_seconds, 30);
    assert_eq!(config.max_concurrent_jobs, 3);
    assert_eq!(config.results_directory, "results");
    assert_eq!(config.session.max_page_retries, 3);
    assert_eq!(config.session.dedup, DedupPolicy::None);
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.logging.format, LogFormat::Pretty);
}

#[test]
fn test_load_from_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.json");
    std::fs::write(&path, r#"{ "version": "1.0", "max_concurrent_jobs": 7 }"#).unwrap();

    let config = load_config(&path).unwrap();
    assert_eq!(config.max_concurrent_jobs, 7);

    let missing = load_config(temp_dir.path().join("absent.json"));
    assert!(matches!(missing, Err(ConfigError::ReadFile { .. })));
}
