//! Directory service routes
//!
//! Exposes the local card directory with the same wire shapes
//! [`crate::discovery::remote::RemoteDiscovery`] consumes, so one router can
//! serve as the discovery backend of another.

use super::{error_reply, with_state, AppState};
use crate::card::directory::CARD_LIST_URI;
use crate::discovery::remote::FIND_AGENT_TOOL;
use crate::discovery::resolve_in_snapshot;
use crate::error::FailureKind;
use crate::observability::metrics::metrics;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::convert::Infallible;
use tracing::{debug, info, warn};
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

/// Arguments accepted by `find_agent_simple`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct FindAgentArguments {
    /// Free-text query to match against agent cards
    pub query: String,
}

impl FindAgentArguments {
    /// JSON schema the arguments are validated against
    pub fn json_schema() -> Value {
        serde_json::to_value(schemars::schema_for!(FindAgentArguments)).unwrap_or_default()
    }

    /// Validate `arguments` against the schema, then decode them
    pub fn parse(arguments: &Value) -> Result<Self, String> {
        let schema = Self::json_schema();
        let validator = jsonschema::validator_for(&schema)
            .map_err(|e| format!("Schema compilation error: {e}"))?;

        validator.validate(arguments).map_err(|errors| {
            let error_messages: Vec<String> = errors
                .map(|e| format!("At '{}': {}", e.instance_path, e))
                .collect();
            error_messages.join("; ")
        })?;

        serde_json::from_value(arguments.clone()).map_err(|e| e.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct ToolCallRequest {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct ResourceQuery {
    uri: String,
}

fn text_content(value: &Value) -> Value {
    json!({"content": [{"type": "text", "text": value.to_string()}]})
}

fn resource_contents(uri: &str, value: &Value) -> Value {
    json!({
        "contents": [{
            "uri": uri,
            "mimeType": "application/json",
            "text": value.to_string(),
        }]
    })
}

fn find_agent(state: &AppState, request: ToolCallRequest) -> (StatusCode, Value) {
    if request.name != FIND_AGENT_TOOL {
        return (
            StatusCode::NOT_FOUND,
            json!({"error": format!("Unknown tool: {}", request.name)}),
        );
    }

    let arguments = match FindAgentArguments::parse(&request.arguments) {
        Ok(arguments) => arguments,
        Err(message) => {
            warn!(error = %message, "Rejected find_agent_simple arguments");
            return (StatusCode::BAD_REQUEST, json!({"error": message}));
        }
    };

    let snapshot = state.directory.snapshot();
    match resolve_in_snapshot(&snapshot, &state.rules, &arguments.query) {
        Ok(card) => {
            debug!(query = %arguments.query, agent = %card.name, "Served directory lookup");
            (StatusCode::OK, text_content(&json!(card)))
        }
        Err(e) if e.kind() == FailureKind::NoAgentAvailable => (
            StatusCode::OK,
            text_content(&json!({"error": "No agent cards available"})),
        ),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, json!({"error": e.to_string()})),
    }
}

fn read_resource(state: &AppState, uri: &str) -> (StatusCode, Value) {
    let snapshot = state.directory.snapshot();

    if uri == CARD_LIST_URI {
        let listing = json!({"agent_cards": snapshot.list()});
        return (StatusCode::OK, resource_contents(uri, &listing));
    }

    match snapshot.get(uri) {
        Ok(card) => (
            StatusCode::OK,
            resource_contents(uri, &json!({"agent_card": card})),
        ),
        Err(e) => (StatusCode::NOT_FOUND, json!({"error": e.to_string()})),
    }
}

/// POST /tools/call, GET /resources/read and POST /directory/reload
pub fn routes(
    state: AppState,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let tools_route = warp::path!("tools" / "call")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(|request: ToolCallRequest, state: AppState| async move {
            let (status, body) = find_agent(&state, request);
            Ok::<_, Infallible>(warp::reply::with_status(warp::reply::json(&body), status))
        });

    let resources_route = warp::path!("resources" / "read")
        .and(warp::get())
        .and(warp::query::<ResourceQuery>())
        .and(with_state(state.clone()))
        .and_then(|query: ResourceQuery, state: AppState| async move {
            let (status, body) = read_resource(&state, &query.uri);
            Ok::<_, Infallible>(warp::reply::with_status(warp::reply::json(&body), status))
        });

    let reload_route = warp::path!("directory" / "reload")
        .and(warp::post())
        .and(with_state(state))
        .and_then(|state: AppState| async move {
            let directory = state.directory.clone();
            // Card files are read with blocking I/O
            let reply = match tokio::task::spawn_blocking(move || directory.reload()).await {
                Ok(snapshot) => {
                    metrics().directory_reloaded();
                    info!(cards = snapshot.len(), "Agent card directory reloaded");
                    warp::reply::with_status(
                        warp::reply::json(&json!({
                            "cards": snapshot.list(),
                            "skipped": snapshot.load_errors().len(),
                        })),
                        StatusCode::OK,
                    )
                }
                Err(e) => error_reply(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Directory reload failed: {e}"),
                ),
            };
            Ok::<_, Infallible>(reply)
        });

    tools_route.or(resources_route).or(reload_route)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::AgentCard;
    use crate::discovery::remote::parse_tool_result;
    use crate::testing::{directory_of, information_card, weather_card};

    fn state() -> AppState {
        AppState::for_tests(directory_of(vec![
            information_card("http://localhost:10111/"),
            weather_card("http://localhost:10110/"),
        ]))
    }

    #[test]
    fn test_arguments_schema_requires_query() {
        assert!(FindAgentArguments::parse(&json!({"query": "clima"})).is_ok());
        assert!(FindAgentArguments::parse(&json!({})).is_err());
        assert!(FindAgentArguments::parse(&json!({"query": 7})).is_err());
    }

    #[tokio::test]
    async fn test_tool_call_answer_is_decodable_by_remote_client() {
        let response = warp::test::request()
            .method("POST")
            .path("/tools/call")
            .json(&json!({"name": FIND_AGENT_TOOL, "arguments": {"query": "clima em Lisboa"}}))
            .reply(&routes(state()))
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body: Value = serde_json::from_slice(response.body()).unwrap();
        let card = parse_tool_result(&body).unwrap();
        assert_eq!(card.name, "WeatherAgent");
    }

    #[tokio::test]
    async fn test_tool_call_on_empty_directory_reports_error_text() {
        let response = warp::test::request()
            .method("POST")
            .path("/tools/call")
            .json(&json!({"name": FIND_AGENT_TOOL, "arguments": {"query": "x"}}))
            .reply(&routes(AppState::for_tests(directory_of(Vec::new()))))
            .await;

        let body: Value = serde_json::from_slice(response.body()).unwrap();
        let err = parse_tool_result(&body).unwrap_err();
        assert_eq!(err.kind(), FailureKind::NoAgentAvailable);
    }

    #[tokio::test]
    async fn test_unknown_tool_and_bad_arguments() {
        let routes = routes(state());
        let response = warp::test::request()
            .method("POST")
            .path("/tools/call")
            .json(&json!({"name": "book_hotel", "arguments": {}}))
            .reply(&routes)
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = warp::test::request()
            .method("POST")
            .path("/tools/call")
            .json(&json!({"name": FIND_AGENT_TOOL, "arguments": {"q": "x"}}))
            .reply(&routes)
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_resource_list_and_card() {
        let routes = routes(state());
        let response = warp::test::request()
            .path("/resources/read?uri=resource://agent_cards/list")
            .reply(&routes)
            .await;
        let body: Value = serde_json::from_slice(response.body()).unwrap();
        let listing: Value =
            serde_json::from_str(body["contents"][0]["text"].as_str().unwrap()).unwrap();
        let uris = listing["agent_cards"].as_array().unwrap();
        assert_eq!(uris.len(), 2);

        let weather_uri = uris
            .iter()
            .filter_map(Value::as_str)
            .find(|uri| uri.contains("weather"))
            .unwrap();
        let response = warp::test::request()
            .path(&format!("/resources/read?uri={weather_uri}"))
            .reply(&routes)
            .await;
        let body: Value = serde_json::from_slice(response.body()).unwrap();
        let resource: Value =
            serde_json::from_str(body["contents"][0]["text"].as_str().unwrap()).unwrap();
        let card: AgentCard = serde_json::from_value(resource["agent_card"].clone()).unwrap();
        assert_eq!(card.name, "WeatherAgent");
    }

    #[tokio::test]
    async fn test_unknown_resource_is_not_found() {
        let response = warp::test::request()
            .path("/resources/read?uri=resource://agent_cards/missing")
            .reply(&routes(state()))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
