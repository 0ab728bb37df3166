//! Remote directory client
//!
//! # Wire format
//!
//! Lookup is a tool call:
//!
//! ```json
//! POST {base}/tools/call
//! {"name": "find_agent_simple", "arguments": {"query": "clima em Lisboa"}}
//! ```
//!
//! answered with the card JSON embedded as text:
//!
//! ```json
//! {"content": [{"type": "text", "text": "{\"name\": \"WeatherAgent\", ...}"}]}
//! ```
//!
//! Directory services that mount tools under `/client/tools/call` answer 404 on
//! the primary path. When both paths are 404 the card listing resource is read
//! instead and the first weather card in it is used.

use super::rules::RuleSet;
use super::AgentResolver;
use crate::card::directory::CARD_LIST_URI;
use crate::card::AgentCard;
use crate::error::{FailureKind, RouterError, RouterResult};
use crate::observability::metrics::metrics;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn, Instrument};

/// Tool name invoked on the directory service
pub const FIND_AGENT_TOOL: &str = "find_agent_simple";

/// Tool-call paths, tried in order while the service answers 404
const TOOL_CALL_PATHS: &[&str] = &["/tools/call", "/client/tools/call"];

/// Resource path used when no tool-call path exists
const RESOURCE_READ_PATH: &str = "/resources/read";

/// Discovery through an HTTP directory service
pub struct RemoteDiscovery {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
    fallback_rules: RuleSet,
    fallback_card: Option<AgentCard>,
}

impl RemoteDiscovery {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            timeout,
            fallback_rules: RuleSet::weather_fallback(),
            fallback_card: None,
        }
    }

    /// Card returned when the service is unreachable and a fallback rule fires
    pub fn with_fallback_card(mut self, card: AgentCard) -> Self {
        self.fallback_card = Some(card);
        self
    }

    /// Rules applied to the fallback card
    pub fn with_fallback_rules(mut self, rules: RuleSet) -> Self {
        self.fallback_rules = rules;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Query the directory service without any fallback
    pub async fn find_agent(&self, query: &str) -> RouterResult<AgentCard> {
        let payload = json!({
            "name": FIND_AGENT_TOOL,
            "arguments": { "query": query },
        });

        for (attempt, path) in TOOL_CALL_PATHS.iter().enumerate() {
            let url = format!("{}{}", self.base_url, path);
            debug!(url = %url, "Calling directory tool");

            let response = self
                .client
                .post(&url)
                .json(&payload)
                .timeout(self.timeout)
                .send()
                .await
                .map_err(|e| classify_transport_error(&url, e))?;

            let status = response.status();
            if status == StatusCode::NOT_FOUND {
                debug!(url = %url, "Directory tool path not found");
                continue;
            }
            if attempt > 0 {
                metrics().discovery_alternate_path();
            }
            if !status.is_success() {
                return Err(RouterError::discovery_unavailable(format!(
                    "Directory service returned {status}"
                )));
            }

            let body: Value = response.json().await.map_err(|e| {
                RouterError::malformed_response(format!("Directory response is not JSON: {e}"))
            })?;
            return parse_tool_result(&body);
        }

        info!("No tool-call path on directory service, reading card resources");
        metrics().discovery_alternate_path();
        self.find_via_resources().await
    }

    async fn find_via_resources(&self) -> RouterResult<AgentCard> {
        let listing = self.read_resource(CARD_LIST_URI).await?;
        let uris: Vec<String> = listing
            .get("agent_cards")
            .and_then(Value::as_array)
            .map(|uris| {
                uris.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        for uri in uris.iter().filter(|uri| uri.contains("weather")) {
            let resource = match self.read_resource(uri).await {
                Ok(resource) => resource,
                Err(e) => {
                    warn!(uri = %uri, error = %e, "Skipping unreadable card resource");
                    continue;
                }
            };
            if let Some(card) = card_from_resource(&resource) {
                return Ok(card);
            }
        }

        Err(RouterError::discovery_unavailable(
            "Directory service exposes neither tools nor a usable card resource",
        ))
    }

    async fn read_resource(&self, uri: &str) -> RouterResult<Value> {
        let url = format!("{}{}", self.base_url, RESOURCE_READ_PATH);
        let response = self
            .client
            .get(&url)
            .query(&[("uri", uri)])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| classify_transport_error(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RouterError::discovery_unavailable(format!(
                "Reading resource {uri} returned {status}"
            )));
        }

        let body: Value = response.json().await.map_err(|e| {
            RouterError::malformed_response(format!("Resource response is not JSON: {e}"))
        })?;

        let text = body
            .pointer("/contents/0/text")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                RouterError::malformed_response(format!("Resource {uri} has no text content"))
            })?;

        serde_json::from_str(text).map_err(|e| {
            RouterError::malformed_response(format!("Resource {uri} text is not JSON: {e}"))
        })
    }

    fn local_fallback(&self, query: &str, cause: RouterError) -> RouterResult<AgentCard> {
        let Some(card) = &self.fallback_card else {
            return Err(RouterError::discovery_unavailable(format!(
                "{cause}; no local fallback card configured"
            )));
        };

        match self.fallback_rules.select(query, &[card]) {
            Some(selected) => {
                warn!(
                    error = %cause,
                    rule = selected.rule,
                    agent = %selected.card.name,
                    "Directory service unavailable, using local fallback"
                );
                metrics().discovery_fallback();
                Ok(selected.card.clone())
            }
            None => Err(RouterError::discovery_unavailable(format!(
                "{cause}; no local fallback rule matched"
            ))),
        }
    }
}

#[async_trait]
impl AgentResolver for RemoteDiscovery {
    async fn resolve(&self, query: &str) -> RouterResult<AgentCard> {
        metrics().discovery_lookup();
        let span = crate::discovery_span!(base_url = %self.base_url);

        async {
            match self.find_agent(query).await {
                Ok(card) => {
                    info!(agent = %card.name, url = %card.url, "Directory resolved agent");
                    Ok(card)
                }
                Err(e) if is_unavailable(&e) => self.local_fallback(query, e),
                Err(e) => Err(e),
            }
        }
        .instrument(span)
        .await
    }
}

fn is_unavailable(error: &RouterError) -> bool {
    matches!(
        error.kind(),
        FailureKind::DiscoveryUnavailable | FailureKind::Timeout
    )
}

fn classify_transport_error(url: &str, error: reqwest::Error) -> RouterError {
    if error.is_timeout() {
        RouterError::timeout(format!("Directory request to {url} timed out"))
    } else {
        RouterError::discovery_unavailable(format!("Directory request to {url} failed: {error}"))
    }
}

/// Decode a tool-call answer into a card
///
/// Accepts the content list at the top level or under a JSON-RPC `result`.
pub fn parse_tool_result(body: &Value) -> RouterResult<AgentCard> {
    let content = body
        .get("content")
        .or_else(|| body.pointer("/result/content"))
        .ok_or_else(|| RouterError::malformed_response("Tool result has no content"))?;

    let text = content
        .pointer("/0/text")
        .and_then(Value::as_str)
        .ok_or_else(|| RouterError::malformed_response("Tool result has no text content"))?;

    let value: Value = serde_json::from_str(text).map_err(|e| {
        RouterError::malformed_response(format!("Tool result text is not JSON: {e}"))
    })?;

    if value.get("name").is_none() {
        if let Some(error) = value.get("error") {
            let message = error
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            return Err(RouterError::no_agent_available(message));
        }
    }

    let card: AgentCard = serde_json::from_value(value).map_err(|e| {
        RouterError::malformed_response(format!("Tool result is not an agent card: {e}"))
    })?;
    card.validate()?;
    Ok(card)
}

fn card_from_resource(resource: &Value) -> Option<AgentCard> {
    let candidate = resource
        .get("agent_card")
        .or_else(|| resource.pointer("/agent_cards/0"))
        .unwrap_or(resource);

    serde_json::from_value::<AgentCard>(candidate.clone())
        .ok()
        .filter(|card| card.validate().is_ok())
}
