//! Tests for logging configuration and format parsing

use broker_host::observability::logging::{build_filter, parse_level, LogFormat};
use broker_host::observability::{init_logging, lifecycle_span};
use tracing::Level;

#[test]
fn test_log_format_parse_known_values() {
    assert_eq!(LogFormat::parse("json"), LogFormat::Json);
    assert_eq!(LogFormat::parse("Pretty"), LogFormat::Pretty);
    assert_eq!(LogFormat::parse("COMPACT"), LogFormat::Compact);
}

#[test]
fn test_log_format_parse_whitespace_falls_back_to_json() {
    assert_eq!(LogFormat::parse("  pretty  "), LogFormat::Json);
    assert_eq!(LogFormat::parse("compact\n"), LogFormat::Json);
}

#[test]
fn test_level_parsing_defaults_to_info() {
    assert_eq!(parse_level("warn"), Level::WARN);
    assert_eq!(parse_level("verbose"), Level::INFO);
}

#[test]
fn test_filter_keeps_mqtt_client_quiet() {
    let rendered = build_filter(Level::TRACE).to_string();
    assert!(rendered.contains("rumqttc=warn"));
    assert!(rendered.contains("tokio=warn"));
}

#[test]
fn test_spans_work_after_init() {
    init_logging(Level::DEBUG, LogFormat::Compact, true);

    let span = lifecycle_span!(operation = "test");
    let _guard = span.enter();
    tracing::info!("inside lifecycle span");
}
