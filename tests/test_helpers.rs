//! Test helpers and utilities for integration tests

use a2a_router::card::AgentCard;
use a2a_router::config::{BridgeSection, RouterConfig};
use serde_json::{json, Value};

/// Configuration with short timeouts for integration tests
#[allow(dead_code)]
pub fn test_config() -> RouterConfig {
    let mut config = RouterConfig::default();
    config.router.id = "test-router".to_string();
    config.discovery.timeout_ms = 2_000;
    config.bridge = BridgeSection {
        timeout_ms: 2_000,
        ..BridgeSection::default()
    };
    config
}

/// Card whose endpoint is `url`
#[allow(dead_code)]
pub fn card_at(name: &str, description: &str, url: &str) -> AgentCard {
    AgentCard::new(name, description, url)
}

/// JSON-RPC error body
#[allow(dead_code)]
pub fn rpc_error(code: i64, message: &str) -> Value {
    json!({"jsonrpc": "2.0", "id": "1", "error": {"code": code, "message": message}})
}

/// JSON-RPC success body carrying one text artifact
#[allow(dead_code)]
pub fn rpc_text_result(text: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": "1",
        "result": {
            "artifacts": [{"parts": [{"kind": "text", "text": text}]}],
            "status": {"state": "completed"}
        }
    })
}

/// Directory tool-call answer embedding `card`
#[allow(dead_code)]
pub fn tool_answer(card: &AgentCard) -> Value {
    json!({"content": [{"type": "text", "text": serde_json::to_string(card).unwrap()}]})
}
