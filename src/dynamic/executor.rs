//! Inbound JSON-RPC handling for dynamic agents

use super::DynamicAgentFactory;
use crate::bridge::envelope::{extract_text, EnvelopeVariant};
use crate::bridge::jsonrpc::{
    JsonRpcRequest, JsonRpcResponse, RpcError, INVALID_REQUEST, JSONRPC_VERSION,
};
use crate::card::{AgentCapabilities, AgentCard, AgentSkill};
use crate::observability::metrics::metrics;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

/// Routing key used when a request names no agent
pub const DEFAULT_AGENT_ID: &str = "dynamic";

/// Answers inbound requests in either envelope dialect
#[derive(Debug, Clone)]
pub struct DynamicAgentExecutor {
    factory: Arc<DynamicAgentFactory>,
}

impl DynamicAgentExecutor {
    pub fn new(factory: Arc<DynamicAgentFactory>) -> Self {
        Self { factory }
    }

    pub fn factory(&self) -> &Arc<DynamicAgentFactory> {
        &self.factory
    }

    /// Handle a raw request body
    pub fn handle_body(&self, body: &[u8]) -> JsonRpcResponse {
        match serde_json::from_slice::<Value>(body) {
            Ok(value) => self.handle_value(value),
            Err(e) => {
                warn!(error = %e, "Inbound request is not JSON");
                JsonRpcResponse::error(
                    Value::Null,
                    RpcError::parse_error(format!("Parse error: {e}")),
                )
            }
        }
    }

    /// Handle a decoded request body
    pub fn handle_value(&self, value: Value) -> JsonRpcResponse {
        let id = value.get("id").cloned().unwrap_or(Value::Null);
        match serde_json::from_value::<JsonRpcRequest>(value) {
            Ok(request) => self.execute(&request),
            Err(e) => JsonRpcResponse::error(
                id,
                RpcError::new(INVALID_REQUEST, format!("Invalid request: {e}")),
            ),
        }
    }

    /// Run a decoded request through the addressed agent
    pub fn execute(&self, request: &JsonRpcRequest) -> JsonRpcResponse {
        metrics().inbound_request();

        if request.jsonrpc != JSONRPC_VERSION {
            return JsonRpcResponse::error(
                request.id.clone(),
                RpcError::new(
                    INVALID_REQUEST,
                    format!("Unsupported jsonrpc version '{}'", request.jsonrpc),
                ),
            );
        }

        let Some(variant) = EnvelopeVariant::from_method(&request.method) else {
            return JsonRpcResponse::error(
                request.id.clone(),
                RpcError::method_not_found(&request.method),
            );
        };

        let Some(text) = extract_text(&request.params) else {
            return JsonRpcResponse::error(
                request.id.clone(),
                RpcError::invalid_params(format!(
                    "{} requires params.message with text",
                    variant.method()
                )),
            );
        };

        let agent_id = routing_key(&request.params);
        let span = crate::inbound_span!(agent_id = %agent_id, method = variant.method());
        let _enter = span.enter();

        let agent = self.factory.get_or_create(&agent_id);
        let reply = agent.handle(&text);
        info!(reply_len = reply.len(), "Dynamic agent replied");

        JsonRpcResponse::success(request.id.clone(), task_result(&reply))
    }
}

/// `params.metadata.agent_id`, then `params.message.metadata.agent_id`
fn routing_key(params: &Value) -> String {
    ["/metadata/agent_id", "/message/metadata/agent_id"]
        .iter()
        .filter_map(|pointer| params.pointer(pointer).and_then(Value::as_str))
        .find(|id| !id.trim().is_empty())
        .unwrap_or(DEFAULT_AGENT_ID)
        .to_string()
}

fn task_result(text: &str) -> Value {
    json!({
        "artifacts": [{"parts": [{"kind": "text", "text": text}]}],
        "status": {"state": "completed"},
    })
}

/// Card describing this process as a callee
pub fn dynamic_agent_card(base_url: &str) -> AgentCard {
    AgentCard::new(
        "Dynamic A2A Agent",
        "Creates or reuses a sub-agent on demand (weather, information, calculation) \
         and runs the request on it",
        format!("{}/a2a", base_url.trim_end_matches('/')),
    )
    .with_capabilities(AgentCapabilities {
        streaming: true,
        push_notifications: true,
    })
    .with_skill(AgentSkill {
        id: "dynamic_create".to_string(),
        name: "Create Dynamic Agent".to_string(),
        description: "Creates or reuses a sub-agent and runs the request. \
                      Address the sub-agent with params.metadata.agent_id."
            .to_string(),
        tags: vec![
            "dynamic".to_string(),
            "supervisor".to_string(),
            "router".to_string(),
        ],
        examples: vec!["clima em Lisboa".to_string(), "calc 2+2".to_string()],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::jsonrpc::{INVALID_PARAMS, METHOD_NOT_FOUND, PARSE_ERROR};

    fn executor() -> DynamicAgentExecutor {
        DynamicAgentExecutor::new(Arc::new(DynamicAgentFactory::new()))
    }

    fn reply_text(response: &JsonRpcResponse) -> String {
        response.result.as_ref().unwrap()["artifacts"][0]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .to_string()
    }

    #[test]
    fn test_structured_message_is_handled() {
        let executor = executor();
        let request = EnvelopeVariant::StructuredMessage.build("clima em Lisboa");
        let response = executor.execute(&request);

        assert_eq!(response.id, request.id);
        assert!(response.error.is_none());
        assert!(reply_text(&response).contains("Lisboa"));
        assert_eq!(response.result.unwrap()["status"]["state"], "completed");
    }

    #[test]
    fn test_legacy_message_is_handled() {
        let executor = executor();
        let request = EnvelopeVariant::LegacyMessage.build("olá");
        let response = executor.execute(&request);
        assert_eq!(reply_text(&response), "Agent dynamic replied: 'olá'.");
    }

    #[test]
    fn test_routing_key_from_metadata() {
        let executor = executor();
        let request = EnvelopeVariant::LegacyMessage
            .build_with_metadata("olá", Some(json!({"agent_id": "helper"})));
        let response = executor.execute(&request);

        assert_eq!(reply_text(&response), "Agent helper replied: 'olá'.");
        assert_eq!(executor.factory().ids(), vec!["helper".to_string()]);
    }

    #[test]
    fn test_routing_key_from_message_metadata() {
        let params = json!({"message": {"metadata": {"agent_id": "nested"}}});
        assert_eq!(routing_key(&params), "nested");
        assert_eq!(routing_key(&json!({})), DEFAULT_AGENT_ID);
        assert_eq!(
            routing_key(&json!({"metadata": {"agent_id": "  "}})),
            DEFAULT_AGENT_ID
        );
    }

    #[test]
    fn test_unknown_method() {
        let request = JsonRpcRequest::new("tasks/cancel", json!({}));
        let response = executor().execute(&request);
        assert_eq!(response.error.unwrap().code, METHOD_NOT_FOUND);
    }

    #[test]
    fn test_missing_text_is_invalid_params() {
        let request = JsonRpcRequest::new("message/send", json!({"message": {"parts": []}}));
        let response = executor().execute(&request);
        assert_eq!(response.error.unwrap().code, INVALID_PARAMS);
    }

    #[test]
    fn test_parse_error() {
        let response = executor().handle_body(b"{not json");
        assert_eq!(response.error.unwrap().code, PARSE_ERROR);
        assert_eq!(response.id, Value::Null);
    }

    #[test]
    fn test_invalid_request_keeps_id() {
        let response = executor().handle_value(json!({"jsonrpc": "2.0", "id": 7}));
        assert_eq!(response.id, json!(7));
        assert_eq!(response.error.unwrap().code, INVALID_REQUEST);
    }

    #[test]
    fn test_dynamic_agent_card() {
        let card = dynamic_agent_card("http://localhost:10120/");
        assert_eq!(card.url, "http://localhost:10120/a2a");
        assert!(card.capabilities.streaming);
        assert_eq!(card.skills[0].id, "dynamic_create");
        assert!(card.validate().is_ok());
    }
}
