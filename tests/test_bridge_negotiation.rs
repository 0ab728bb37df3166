//! Protocol bridge negotiation against mock agents
//!
//! Each mock agent accepts or rejects envelope dialects by matching the
//! JSON-RPC `method`, so the tests observe exactly which variants were sent.

mod test_helpers;

use a2a_router::bridge::ToolFactory;
use a2a_router::config::{BridgeSection, NegotiationPolicy};
use a2a_router::error::{FailureKind, NormalizedResult};
use serde_json::json;
use std::time::{Duration, Instant};
use test_helpers::{card_at, rpc_error, rpc_text_result};
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

const STRUCTURED: &str = "message/send";
const LEGACY: &str = "message";

fn factory(policy: NegotiationPolicy) -> ToolFactory {
    ToolFactory::new(&BridgeSection {
        timeout_ms: 1_000,
        negotiation: policy,
        ..BridgeSection::default()
    })
}

async fn mount_reply(server: &MockServer, rpc_method: &str, reply: ResponseTemplate, calls: u64) {
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"jsonrpc": "2.0", "method": rpc_method})))
        .respond_with(reply)
        .expect(calls)
        .mount(server)
        .await;
}

/// Structured envelope answered only after 5s
async fn mount_slow_reply(server: &MockServer) {
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": STRUCTURED})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(rpc_text_result("late"))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(server)
        .await;
}

fn agent_card(server: &MockServer) -> a2a_router::card::AgentCard {
    card_at("MockAgent", "Mock agent", &server.uri())
}

#[tokio::test]
async fn test_method_not_found_retries_with_legacy_envelope() {
    let server = MockServer::start().await;
    mount_reply(
        &server,
        STRUCTURED,
        ResponseTemplate::new(200).set_body_json(rpc_error(-32601, "Method not found")),
        1,
    )
    .await;
    mount_reply(
        &server,
        LEGACY,
        ResponseTemplate::new(200).set_body_json(rpc_text_result("Sunny, 25°C")),
        1,
    )
    .await;

    let tool = factory(NegotiationPolicy::CodeGated)
        .build(&agent_card(&server))
        .unwrap();
    let result = tool.call("clima em São Paulo").await;

    assert_eq!(
        result,
        NormalizedResult::success(rpc_text_result("Sunny, 25°C"))
    );
}

#[tokio::test]
async fn test_invalid_params_retries_with_legacy_envelope() {
    let server = MockServer::start().await;
    mount_reply(
        &server,
        STRUCTURED,
        ResponseTemplate::new(200).set_body_json(rpc_error(-32602, "Invalid params")),
        1,
    )
    .await;
    mount_reply(
        &server,
        LEGACY,
        ResponseTemplate::new(200).set_body_json(rpc_text_result("ok")),
        1,
    )
    .await;

    let tool = factory(NegotiationPolicy::CodeGated)
        .build(&agent_card(&server))
        .unwrap();
    assert!(tool.call("hello").await.is_success());
}

#[tokio::test]
async fn test_structured_envelope_accepted_first() {
    let server = MockServer::start().await;
    mount_reply(
        &server,
        STRUCTURED,
        ResponseTemplate::new(200).set_body_json(rpc_text_result("first try")),
        1,
    )
    .await;
    mount_reply(&server, LEGACY, ResponseTemplate::new(500), 0).await;

    let tool = factory(NegotiationPolicy::CodeGated)
        .build(&agent_card(&server))
        .unwrap();
    let result = tool.call("hello").await;
    assert_eq!(
        result.payload().unwrap()["result"]["artifacts"][0]["parts"][0]["text"],
        "first try"
    );
}

#[tokio::test]
async fn test_application_error_is_success_under_code_gating() {
    let server = MockServer::start().await;
    let body = rpc_error(-32000, "City not found");
    mount_reply(
        &server,
        STRUCTURED,
        ResponseTemplate::new(200).set_body_json(body.clone()),
        1,
    )
    .await;
    mount_reply(&server, LEGACY, ResponseTemplate::new(500), 0).await;

    let tool = factory(NegotiationPolicy::CodeGated)
        .build(&agent_card(&server))
        .unwrap();
    assert_eq!(tool.call("clima em Atlantis").await, NormalizedResult::success(body));
}

#[tokio::test]
async fn test_any_error_policy_retries_application_errors() {
    let server = MockServer::start().await;
    mount_reply(
        &server,
        STRUCTURED,
        ResponseTemplate::new(200).set_body_json(rpc_error(-32000, "Unsupported")),
        1,
    )
    .await;
    mount_reply(
        &server,
        LEGACY,
        ResponseTemplate::new(200).set_body_json(rpc_text_result("legacy ok")),
        1,
    )
    .await;

    let tool = factory(NegotiationPolicy::AnyError)
        .build(&agent_card(&server))
        .unwrap();
    assert!(tool.call("hello").await.is_success());
}

#[tokio::test]
async fn test_every_variant_rejected_is_protocol_mismatch() {
    let server = MockServer::start().await;
    mount_reply(
        &server,
        STRUCTURED,
        ResponseTemplate::new(200).set_body_json(rpc_error(-32601, "Method not found")),
        1,
    )
    .await;
    mount_reply(
        &server,
        LEGACY,
        ResponseTemplate::new(200).set_body_json(rpc_error(-32601, "Method not found")),
        1,
    )
    .await;

    let tool = factory(NegotiationPolicy::CodeGated)
        .build(&agent_card(&server))
        .unwrap();
    let result = tool.call("hello").await;

    assert_eq!(result.failure_kind(), Some(FailureKind::AgentProtocolMismatch));
    match result {
        NormalizedResult::Failure { message, .. } => {
            assert!(message.starts_with("message rejected"), "{message}")
        }
        other => panic!("Expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_legacy_timeout_after_rejection_is_protocol_mismatch() {
    let server = MockServer::start().await;
    mount_reply(
        &server,
        STRUCTURED,
        ResponseTemplate::new(200).set_body_json(rpc_error(-32601, "Method not found")),
        1,
    )
    .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": LEGACY})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(rpc_text_result("late"))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let tool = ToolFactory::default()
        .with_timeout(Duration::from_millis(200))
        .build(&agent_card(&server))
        .unwrap();
    let result = tool.call("hello").await;

    assert_eq!(result.failure_kind(), Some(FailureKind::AgentProtocolMismatch));
    match result {
        NormalizedResult::Failure { message, .. } => {
            assert!(message.contains("message/send rejected"), "{message}");
            assert!(message.contains("message failed"), "{message}");
        }
        other => panic!("Expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_agent_gone_after_rejection_is_protocol_mismatch() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    // Answers one request with a dialect rejection, then stops listening
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/", listener.local_addr().unwrap());
    let agent = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 8192];
        let _ = socket.read(&mut buf).await.unwrap();
        let body = rpc_error(-32601, "Method not found").to_string();
        let reply = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\n\
             connection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(reply.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();
    });

    let tool = factory(NegotiationPolicy::CodeGated)
        .build(&card_at("FlakyAgent", "", &url))
        .unwrap();
    let result = tool.call("hello").await;
    agent.await.unwrap();

    assert_eq!(result.failure_kind(), Some(FailureKind::AgentProtocolMismatch));
}

#[tokio::test]
async fn test_http_error_without_rpc_body_is_terminal_under_code_gating() {
    let server = MockServer::start().await;
    mount_reply(&server, STRUCTURED, ResponseTemplate::new(404), 1).await;
    mount_reply(&server, LEGACY, ResponseTemplate::new(200), 0).await;

    let tool = factory(NegotiationPolicy::CodeGated)
        .build(&agent_card(&server))
        .unwrap();
    let result = tool.call("hello").await;
    assert_eq!(result.failure_kind(), Some(FailureKind::AgentProtocolMismatch));
}

#[tokio::test]
async fn test_non_json_reply_is_malformed() {
    let server = MockServer::start().await;
    mount_reply(
        &server,
        STRUCTURED,
        ResponseTemplate::new(200).set_body_string("<html>hello</html>"),
        1,
    )
    .await;

    let tool = factory(NegotiationPolicy::CodeGated)
        .build(&agent_card(&server))
        .unwrap();
    let result = tool.call("hello").await;
    assert_eq!(result.failure_kind(), Some(FailureKind::MalformedResponse));
}

#[tokio::test]
async fn test_metadata_travels_with_every_variant() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "method": STRUCTURED,
            "params": {"metadata": {"agent_id": "weather-1"}}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(rpc_error(-32601, "nope")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "method": LEGACY,
            "params": {
                "message": {"content": {"type": "text", "text": "clima em Lisboa"}},
                "metadata": {"agent_id": "weather-1"}
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(rpc_text_result("ok")))
        .expect(1)
        .mount(&server)
        .await;

    let tool = factory(NegotiationPolicy::CodeGated)
        .build(&agent_card(&server))
        .unwrap()
        .with_metadata(json!({"agent_id": "weather-1"}));
    assert!(tool.call("clima em Lisboa").await.is_success());
}

#[tokio::test]
async fn test_unreachable_agent_fails_fast() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/", listener.local_addr().unwrap());
    drop(listener);

    let tool = factory(NegotiationPolicy::CodeGated)
        .build(&card_at("GoneAgent", "", &url))
        .unwrap();

    let started = Instant::now();
    let result = tool.call("hello").await;
    assert_eq!(result.failure_kind(), Some(FailureKind::AgentUnreachable));
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn test_slow_agent_times_out() {
    let server = MockServer::start().await;
    mount_slow_reply(&server).await;

    let tool = ToolFactory::default()
        .with_timeout(Duration::from_millis(200))
        .build(&agent_card(&server))
        .unwrap();
    let result = tool.call("hello").await;
    assert_eq!(result.failure_kind(), Some(FailureKind::Timeout));
}

#[tokio::test]
async fn test_caller_deadline_cuts_call_short() {
    let server = MockServer::start().await;
    mount_slow_reply(&server).await;

    let tool = factory(NegotiationPolicy::CodeGated)
        .build(&agent_card(&server))
        .unwrap();

    let started = Instant::now();
    let result = tool
        .call_with_deadline("hello", Duration::from_millis(100))
        .await;
    assert_eq!(result.failure_kind(), Some(FailureKind::Timeout));
    assert!(started.elapsed() < Duration::from_millis(900));
}

#[test]
fn test_malformed_card_url_fails_before_any_request() {
    let err = ToolFactory::default()
        .build(&card_at("Broken", "", "mailto:agent@example.com"))
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::InvalidAgentCard);
}
