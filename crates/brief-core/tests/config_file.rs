//! Loading configuration from disk

use brief_core::{BriefConfig, BriefError};
use pretty_assertions::assert_eq;
use std::io::Write;
use std::time::Duration;

fn write_config(text: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file
}

#[test]
fn loads_sections_from_file() {
    let file = write_config(
        r#"
[constraints]
max_rounds = 2
per_domain_cap = 1
fetch_timeout_secs = 7.5
exclude_domains = ["spam.example"]

[search]
base_url = "http://searx.internal:8080"

[retry]
max_attempts = 5
"#,
    );

    let config = BriefConfig::load(file.path()).unwrap();

    assert_eq!(config.constraints.max_rounds, 2);
    assert_eq!(config.constraints.per_domain_cap, 1);
    assert_eq!(config.constraints.fetch_timeout, Duration::from_millis(7_500));
    assert_eq!(config.constraints.exclude_domains, vec!["spam.example".to_string()]);
    assert_eq!(config.constraints.robots_timeout, Duration::from_secs(5));
    assert_eq!(config.search.base_url, "http://searx.internal:8080");
    assert_eq!(config.retry.max_attempts, 5);
    assert_eq!(config.completion, BriefConfig::default().completion);
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = BriefConfig::load(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, BriefError::Io(_)));
}

#[test]
fn invalid_limits_in_file_are_rejected() {
    let file = write_config("[constraints]\nmax_rounds = 0\n");
    let err = BriefConfig::load(file.path()).unwrap_err();
    assert!(matches!(err, BriefError::InvalidInput(_)));
}

#[test]
fn rendered_config_loads_back() {
    let mut config = BriefConfig::default();
    config.constraints.max_revisions = 0;
    config.quality.min_words = 40;
    let file = write_config(&config.to_toml_string().unwrap());

    assert_eq!(BriefConfig::load(file.path()).unwrap(), config);
}
