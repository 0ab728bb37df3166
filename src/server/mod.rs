//! HTTP hosting surface
//!
//! One warp server carries both directions of traffic:
//!
//! - `POST /query` routes free text through the [`Orchestrator`]
//! - `POST /a2a` and `GET /.well-known/agent.json` expose the dynamic agent
//! - `POST /tools/call` and `GET /resources/read` expose the card directory
//! - `GET /health`, `GET /metrics` and `GET /` serve operators

pub mod directory;
pub mod health;

use crate::bridge::ToolFactory;
use crate::card::DirectoryHandle;
use crate::config::RouterConfig;
use crate::discovery::build_resolver;
use crate::discovery::rules::RuleSet;
use crate::dynamic::executor::{dynamic_agent_card, DynamicAgentExecutor};
use crate::dynamic::DynamicAgentFactory;
use crate::error::{NormalizedResult, RouterResult};
use crate::orchestrator::Orchestrator;
use crate::persistence::{
    AgentType, ConversationContext, InMemoryStore, Message, PersistencePort, PersistenceResult,
    Task, TtlPolicy,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

/// Largest accepted request body
const MAX_BODY_BYTES: u64 = 1024 * 1024;

/// Server startup failures
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid listen address '{address}': {reason}")]
    Address { address: String, reason: String },
    #[error("Failed to bind HTTP server: {0}")]
    Bind(#[from] warp::Error),
}

/// Everything a request handler needs
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RouterConfig>,
    pub directory: Arc<DirectoryHandle>,
    pub orchestrator: Arc<Orchestrator>,
    pub executor: Arc<DynamicAgentExecutor>,
    pub store: Arc<dyn PersistencePort>,
    pub rules: Arc<RuleSet>,
}

impl AppState {
    /// Load the card directory named by `config` and wire every component
    pub fn from_config(config: RouterConfig) -> RouterResult<Self> {
        let directory = Arc::new(DirectoryHandle::load(config.directory.cards_dir.clone()));
        Self::new(config, directory)
    }

    /// Wire every component around an existing directory
    pub fn new(config: RouterConfig, directory: Arc<DirectoryHandle>) -> RouterResult<Self> {
        let resolver = build_resolver(&config, directory.clone())?;
        let orchestrator = Orchestrator::new(resolver, ToolFactory::new(&config.bridge));
        let executor = DynamicAgentExecutor::new(Arc::new(DynamicAgentFactory::new()));
        let store = InMemoryStore::with_ttl(TtlPolicy::from(&config.persistence));

        Ok(Self {
            config: Arc::new(config),
            directory,
            orchestrator: Arc::new(orchestrator),
            executor: Arc::new(executor),
            store: Arc::new(store),
            rules: Arc::new(RuleSet::default_rules()),
        })
    }

    /// Swap the persistence backend
    pub fn with_store(mut self, store: Arc<dyn PersistencePort>) -> Self {
        self.store = store;
        self
    }

    #[cfg(test)]
    pub(crate) fn for_tests(directory: Arc<DirectoryHandle>) -> Self {
        Self::new(RouterConfig::default(), directory).expect("local discovery always builds")
    }
}

pub(crate) fn with_state(
    state: AppState,
) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

pub(crate) fn error_reply(
    status: StatusCode,
    message: impl Into<String>,
) -> warp::reply::WithStatus<warp::reply::Json> {
    warp::reply::with_status(
        warp::reply::json(&json!({"error": message.into()})),
        status,
    )
}

/// Body of `POST /query`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

/// Answer of `POST /query`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub ok: bool,
    pub task_id: String,
    pub agent: Option<String>,
    pub result: NormalizedResult,
}

fn result_summary(result: &NormalizedResult) -> String {
    match result {
        NormalizedResult::Success { payload } => payload.to_string(),
        NormalizedResult::Failure { kind, message } => format!("{kind}: {message}"),
    }
}

/// Run one query, recording it as a task and, when linked, in its conversation
pub async fn handle_query(state: &AppState, request: QueryRequest) -> QueryResponse {
    let mut task = Task::new(request.text.clone(), AgentType::Supervisor);
    if let Some(conversation_id) = &request.conversation_id {
        task = task.with_metadata("conversation_id", json!(conversation_id));
    }
    task.start();
    log_store_error("save task", state.store.save_task(&task).await);

    if let Some(conversation_id) = &request.conversation_id {
        let message = Message::new(request.text.clone(), "user").in_conversation(conversation_id);
        log_store_error("save message", state.store.save_message(&message).await);
    }

    let query = state.orchestrator.run_query(&request.text).await;
    let agent = query.agent_card.as_ref().map(|card| card.name.clone());
    let result = query.into_result();

    if result.is_success() {
        task.complete(result_summary(&result));
    } else {
        task.fail(result_summary(&result));
    }
    log_store_error("update task", state.store.update_task(&task).await);

    if let Some(conversation_id) = &request.conversation_id {
        let sender = agent.clone().unwrap_or_else(|| "router".to_string());
        let reply = Message::new(result_summary(&result), sender.clone())
            .with_receiver("user")
            .in_conversation(conversation_id);
        log_store_error("save message", state.store.save_message(&reply).await);
        log_store_error(
            "save conversation",
            record_handoff(state.store.as_ref(), conversation_id, &sender).await,
        );
    }

    QueryResponse {
        ok: result.is_success(),
        task_id: task.id,
        agent,
        result,
    }
}

async fn record_handoff(
    store: &dyn PersistencePort,
    conversation_id: &str,
    agent: &str,
) -> PersistenceResult<()> {
    let mut conversation = store
        .get_conversation(conversation_id)
        .await?
        .unwrap_or_else(|| ConversationContext::new(conversation_id));
    conversation.hand_to(agent);
    store.save_conversation(&conversation).await
}

fn log_store_error(operation: &str, result: PersistenceResult<()>) {
    if let Err(e) = result {
        warn!(operation, error = %e, "Persistence write failed, continuing");
    }
}

/// Every route, with rejections rendered as JSON
pub fn routes(state: AppState) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let query_route = warp::path("query")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(|request: QueryRequest, state: AppState| async move {
            let response = handle_query(&state, request).await;
            Ok::<_, Infallible>(warp::reply::json(&response))
        });

    // Raw bytes so undecodable bodies still get a JSON-RPC parse error
    let a2a_route = warp::path("a2a")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::bytes())
        .and(with_state(state.clone()))
        .and_then(|body: warp::hyper::body::Bytes, state: AppState| async move {
            let response = state.executor.handle_body(&body);
            Ok::<_, Infallible>(warp::reply::json(&response))
        });

    let card_route = warp::path(".well-known")
        .and(warp::path("agent.json"))
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(|state: AppState| async move {
            let card = dynamic_agent_card(&state.config.server.advertised_url());
            Ok::<_, Infallible>(warp::reply::json(&card))
        });

    query_route
        .or(a2a_route)
        .or(card_route)
        .or(directory::routes(state.clone()))
        .or(health::routes(state))
        .with(
            warp::cors()
                .allow_any_origin()
                .allow_methods(vec!["GET", "POST"])
                .allow_headers(vec!["content-type"]),
        )
        .recover(handle_rejection)
}

async fn handle_rejection(rejection: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message) = if rejection.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found".to_string())
    } else if let Some(e) = rejection.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, format!("Invalid request body: {e}"))
    } else if let Some(e) = rejection.find::<warp::reject::InvalidQuery>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if rejection.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large".to_string())
    } else if let Some(e) = rejection.find::<warp::filters::cors::CorsForbidden>() {
        (StatusCode::FORBIDDEN, e.to_string())
    } else if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else {
        error!(rejection = ?rejection, "Unhandled rejection");
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
    };
    Ok(error_reply(status, message))
}

/// Listen address from the `[server]` section
pub fn listen_addr(config: &RouterConfig) -> Result<SocketAddr, ServerError> {
    let address = format!("{}:{}", config.server.host, config.server.port);
    address.parse().map_err(|e: std::net::AddrParseError| ServerError::Address {
        address: address.clone(),
        reason: e.to_string(),
    })
}

/// Serve until `shutdown` resolves
pub async fn serve(
    state: AppState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), ServerError> {
    let addr = listen_addr(&state.config)?;
    let (bound, server) =
        warp::serve(routes(state)).try_bind_with_graceful_shutdown(addr, shutdown)?;

    info!(address = %bound, "A2A router listening");
    server.await;
    info!("HTTP server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::TaskStatus;
    use crate::testing::{directory_of, weather_card};
    use serde_json::Value;

    #[tokio::test]
    async fn test_query_on_empty_directory_fails_cleanly() {
        let state = AppState::for_tests(directory_of(Vec::new()));
        let response = warp::test::request()
            .method("POST")
            .path("/query")
            .json(&json!({"text": "clima em Lisboa"}))
            .reply(&routes(state.clone()))
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body: QueryResponse = serde_json::from_slice(response.body()).unwrap();
        assert!(!body.ok);
        assert!(body.agent.is_none());
        assert_eq!(
            body.result.failure_kind(),
            Some(crate::error::FailureKind::NoAgentAvailable)
        );

        let task = state.store.get_task(&body.task_id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
    }

    #[tokio::test]
    async fn test_query_with_conversation_records_messages() {
        // Nothing listens on port 9; the call fails but is still recorded
        let state = AppState::for_tests(directory_of(vec![weather_card("http://127.0.0.1:9/")]));
        let response = handle_query(
            &state,
            QueryRequest {
                text: "clima em Lisboa".to_string(),
                conversation_id: Some("c-1".to_string()),
            },
        )
        .await;
        assert_eq!(response.agent.as_deref(), Some("WeatherAgent"));

        let messages = state.store.get_messages("c-1").await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].sender, "user");
        assert_eq!(messages[1].sender, "WeatherAgent");

        let conversation = state.store.get_conversation("c-1").await.unwrap().unwrap();
        assert_eq!(conversation.current_agent.as_deref(), Some("WeatherAgent"));
    }

    #[tokio::test]
    async fn test_a2a_route_runs_dynamic_agent() {
        let state = AppState::for_tests(directory_of(Vec::new()));
        let request = json!({
            "jsonrpc": "2.0",
            "id": "req-1",
            "method": "message/send",
            "params": {"message": {"role": "user", "parts": [{"kind": "text", "text": "calc 2+2"}]}}
        });
        let response = warp::test::request()
            .method("POST")
            .path("/a2a")
            .json(&request)
            .reply(&routes(state.clone()))
            .await;

        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["id"], "req-1");
        assert_eq!(body["result"]["status"]["state"], "completed");
        assert_eq!(state.executor.factory().len(), 1);
    }

    #[tokio::test]
    async fn test_a2a_route_reports_parse_errors() {
        let state = AppState::for_tests(directory_of(Vec::new()));
        let response = warp::test::request()
            .method("POST")
            .path("/a2a")
            .body("{not json")
            .reply(&routes(state))
            .await;

        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["error"]["code"], crate::bridge::jsonrpc::PARSE_ERROR);
    }

    #[tokio::test]
    async fn test_well_known_card_uses_advertised_url() {
        let state = AppState::for_tests(directory_of(Vec::new()));
        let response = warp::test::request()
            .path("/.well-known/agent.json")
            .reply(&routes(state.clone()))
            .await;

        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["name"], "Dynamic A2A Agent");
        assert_eq!(
            body["url"],
            format!("{}/a2a", state.config.server.advertised_url().trim_end_matches('/'))
        );
    }

    #[tokio::test]
    async fn test_rejections_are_json() {
        let routes = routes(AppState::for_tests(directory_of(Vec::new())));
        let response = warp::test::request()
            .path("/no/such/route")
            .reply(&routes)
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert!(body["error"].is_string());

        let response = warp::test::request()
            .method("POST")
            .path("/query")
            .json(&json!({"wrong": 1}))
            .reply(&routes)
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_cors_preflight_and_forbidden_method() {
        let routes = routes(AppState::for_tests(directory_of(Vec::new())));

        let response = warp::test::request()
            .method("OPTIONS")
            .path("/query")
            .header("origin", "http://console.local")
            .header("access-control-request-method", "POST")
            .header("access-control-request-headers", "content-type")
            .reply(&routes)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("access-control-allow-origin"));

        let response = warp::test::request()
            .method("OPTIONS")
            .path("/query")
            .header("origin", "http://console.local")
            .header("access-control-request-method", "DELETE")
            .reply(&routes)
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert!(body["error"].is_string());

        let response = warp::test::request()
            .path("/health")
            .header("origin", "http://console.local")
            .reply(&routes)
            .await;
        assert!(response.headers().contains_key("access-control-allow-origin"));
    }

    #[test]
    fn test_listen_addr() {
        let mut config = RouterConfig::default();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 10120;
        assert_eq!(listen_addr(&config).unwrap().port(), 10120);

        config.server.host = "not an address".to_string();
        assert!(matches!(
            listen_addr(&config),
            Err(ServerError::Address { .. })
        ));
    }
}
