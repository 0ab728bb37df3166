//! Protocol bridge
//!
//! [`ToolFactory::build`] turns an [`AgentCard`] into an [`AgentTool`], a callable
//! that speaks JSON-RPC to the agent. A call negotiates the request dialect:
//! envelope variants are tried in order and a variant rejected by the agent is
//! followed by the next one. Every outcome, including transport failures, comes
//! back as a [`NormalizedResult`].

pub mod envelope;
pub mod jsonrpc;

pub use envelope::{extract_text, EnvelopeVariant};
pub use jsonrpc::{JsonRpcRequest, JsonRpcResponse, RpcError};

use crate::card::AgentCard;
use crate::config::{BridgeSection, NegotiationPolicy};
use crate::error::{FailureKind, NormalizedResult, RouterError, RouterResult};
use crate::observability::metrics::metrics;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn, Instrument};

/// Builds agent tools sharing one HTTP client
#[derive(Debug, Clone)]
pub struct ToolFactory {
    client: reqwest::Client,
    timeout: Duration,
    rpc_path: Option<String>,
    policy: NegotiationPolicy,
    variants: Vec<EnvelopeVariant>,
}

impl Default for ToolFactory {
    fn default() -> Self {
        Self::new(&BridgeSection::default())
    }
}

impl ToolFactory {
    pub fn new(config: &BridgeSection) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout: config.timeout(),
            rpc_path: config.rpc_path.clone(),
            policy: config.negotiation,
            variants: EnvelopeVariant::NEGOTIATION_ORDER.to_vec(),
        }
    }

    /// Restrict or reorder the dialects tried
    pub fn with_variants(mut self, variants: Vec<EnvelopeVariant>) -> Self {
        self.variants = variants;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Validate the card and bind a tool to its endpoint
    ///
    /// Performs no network I/O.
    pub fn build(&self, card: &AgentCard) -> RouterResult<AgentTool> {
        card.validate()?;

        Ok(AgentTool {
            agent_name: card.name.clone(),
            endpoint: endpoint_url(&card.url, self.rpc_path.as_deref()),
            client: self.client.clone(),
            timeout: self.timeout,
            policy: self.policy,
            variants: self.variants.clone(),
            metadata: None,
        })
    }
}

/// Callable bound to one agent endpoint
#[derive(Debug, Clone)]
pub struct AgentTool {
    agent_name: String,
    endpoint: String,
    client: reqwest::Client,
    timeout: Duration,
    policy: NegotiationPolicy,
    variants: Vec<EnvelopeVariant>,
    metadata: Option<Value>,
}

/// Outcome of sending one envelope variant
#[derive(Debug)]
enum Attempt {
    Accepted(Value),
    Rejected(String),
}

impl AgentTool {
    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Attach `params.metadata` to every request
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Send `text` to the agent, negotiating the dialect
    pub async fn call(&self, text: &str) -> NormalizedResult {
        let span = crate::bridge_span!(agent = %self.agent_name, endpoint = %self.endpoint);

        async {
            let start = Instant::now();
            let outcome = self.negotiate(text).await;
            let elapsed = start.elapsed();

            match outcome {
                Ok(payload) => {
                    metrics().agent_called(&self.agent_name, elapsed, true);
                    info!(elapsed_ms = elapsed.as_millis() as u64, "Agent call succeeded");
                    NormalizedResult::success(payload)
                }
                Err(e) => {
                    metrics().agent_called(&self.agent_name, elapsed, false);
                    if e.kind() == FailureKind::Timeout {
                        metrics().agent_timeout(&self.agent_name);
                    }
                    warn!(error = %e, kind = %e.kind(), "Agent call failed");
                    e.to_failure()
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Like [`call`](Self::call), abandoning the request once `deadline` passes
    pub async fn call_with_deadline(&self, text: &str, deadline: Duration) -> NormalizedResult {
        match tokio::time::timeout(deadline, self.call(text)).await {
            Ok(result) => result,
            Err(_) => {
                metrics().agent_called(&self.agent_name, deadline, false);
                metrics().agent_timeout(&self.agent_name);
                warn!(
                    agent = %self.agent_name,
                    deadline_ms = deadline.as_millis() as u64,
                    "Agent call deadline exceeded"
                );
                NormalizedResult::failure(
                    FailureKind::Timeout,
                    format!(
                        "Agent {} did not answer within {}ms",
                        self.agent_name,
                        deadline.as_millis()
                    ),
                )
            }
        }
    }

    async fn negotiate(&self, text: &str) -> RouterResult<Value> {
        let mut last_rejection = None;

        for (attempt, variant) in self.variants.iter().enumerate() {
            if attempt > 0 {
                metrics().envelope_fallback();
                info!(method = variant.method(), "Retrying with next envelope variant");
            }

            let attempt_result = match self.send(*variant, text).await {
                Ok(attempt_result) => attempt_result,
                // Only the first send fails fast; later failures end the negotiation
                Err(e) => match last_rejection.take() {
                    None => return Err(e),
                    Some(rejection) => {
                        return Err(RouterError::protocol_mismatch(format!(
                            "{rejection}; {} failed: {e}",
                            variant.method()
                        )))
                    }
                },
            };

            match attempt_result {
                Attempt::Accepted(body) => return Ok(body),
                Attempt::Rejected(reason) => {
                    debug!(method = variant.method(), reason = %reason, "Envelope rejected");
                    last_rejection = Some(reason);
                }
            }
        }

        Err(RouterError::protocol_mismatch(last_rejection.unwrap_or_else(
            || "No envelope variants configured".to_string(),
        )))
    }

    async fn send(&self, variant: EnvelopeVariant, text: &str) -> RouterResult<Attempt> {
        let request = variant.build_with_metadata(text, self.metadata.clone());
        debug!(method = %request.method, id = %request.id, "Sending envelope");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.classify_transport_error(e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.classify_transport_error(e))?;

        classify_reply(self.policy, variant, status, &body)
    }

    fn classify_transport_error(&self, error: reqwest::Error) -> RouterError {
        if error.is_timeout() {
            RouterError::timeout(format!(
                "Agent {} at {} timed out after {}ms",
                self.agent_name,
                self.endpoint,
                self.timeout.as_millis()
            ))
        } else if error.is_decode() || error.is_body() {
            RouterError::malformed_response(format!(
                "Failed to read reply from agent {}: {error}",
                self.agent_name
            ))
        } else {
            RouterError::agent_unreachable(format!(
                "Failed to reach agent {} at {}: {error}",
                self.agent_name, self.endpoint
            ))
        }
    }
}

/// Decide whether a reply accepts the envelope, rejects it, or ends the call
fn classify_reply(
    policy: NegotiationPolicy,
    variant: EnvelopeVariant,
    status: StatusCode,
    body: &str,
) -> RouterResult<Attempt> {
    let value: Option<Value> = serde_json::from_str(body).ok();

    if let Some(rpc_body) = value.as_ref().filter(|v| jsonrpc::is_rpc_body(v)) {
        if let Some(error) = jsonrpc::rpc_error_of(rpc_body) {
            let rejected = match policy {
                NegotiationPolicy::CodeGated => error.is_dialect_rejection(),
                NegotiationPolicy::AnyError => true,
            };
            if rejected {
                return Ok(Attempt::Rejected(format!(
                    "{} rejected with {}: {}",
                    variant.method(),
                    error.code,
                    error.message
                )));
            }
        }
        return Ok(Attempt::Accepted(rpc_body.clone()));
    }

    if !status.is_success() {
        let reason = format!("{} answered HTTP {status}", variant.method());
        return match policy {
            NegotiationPolicy::AnyError => Ok(Attempt::Rejected(reason)),
            NegotiationPolicy::CodeGated => Err(RouterError::protocol_mismatch(reason)),
        };
    }

    value.map(Attempt::Accepted).ok_or_else(|| {
        RouterError::malformed_response(format!(
            "Reply to {} is not JSON",
            variant.method()
        ))
    })
}

/// Join the card url with an optional RPC path
fn endpoint_url(base: &str, rpc_path: Option<&str>) -> String {
    match rpc_path.map(|p| p.trim_matches('/')).filter(|p| !p.is_empty()) {
        Some(path) => format!("{}/{}", base.trim_end_matches('/'), path),
        None => base.to_string(),
    }
}
