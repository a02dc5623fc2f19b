//! Test helpers and utilities for integration tests

use broker_host::config::{AppConfig, HandlerConfig};
use broker_host::credentials::{Credentials, SEED_ENV, TOKEN_ENV, URL_ENV};
use broker_host::handler::HandlerRegistry;
use broker_host::testing::mocks::{CallLog, RecordingHandler, RECORDING_KIND};
use serde_json::json;

pub const TEST_URL: &str = "mqtt://broker.test:1883";

/// Credentials with only the given slots present
#[allow(dead_code)]
pub fn credentials(url: bool, token: bool, seed: bool) -> Credentials {
    Credentials::from_lookup(|name| match name {
        URL_ENV if url => Some(TEST_URL.to_string()),
        TOKEN_ENV if token => Some("test-token".to_string()),
        SEED_ENV if seed => Some("test-seed".to_string()),
        _ => None,
    })
}

/// All three slots present
#[allow(dead_code)]
pub fn token_credentials() -> Credentials {
    credentials(true, true, true)
}

/// One recording handler block
#[allow(dead_code)]
pub fn recording(name: &str) -> HandlerConfig {
    HandlerConfig {
        handler: RECORDING_KIND.to_string(),
        options: json!({ "name": name })
            .as_object()
            .cloned()
            .unwrap_or_default(),
    }
}

/// Recording handler that fails the given operations
#[allow(dead_code)]
pub fn failing_recording(name: &str, fail_subscribe: bool, fail_unsubscribe: bool) -> HandlerConfig {
    let mut config = recording(name);
    config
        .options
        .insert("fail_subscribe".to_string(), json!(fail_subscribe));
    config
        .options
        .insert("fail_unsubscribe".to_string(), json!(fail_unsubscribe));
    config
}

/// Configuration with the given handler blocks and context
#[allow(dead_code)]
pub fn app_config(context: &str, handlers: Vec<HandlerConfig>) -> AppConfig {
    AppConfig {
        context: context.to_string(),
        handlers,
        ..Default::default()
    }
}

/// Registry knowing only the recording handler, logging into `log`
#[allow(dead_code)]
pub fn recording_registry(log: &CallLog) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    RecordingHandler::register(&mut registry, log);
    registry
}
