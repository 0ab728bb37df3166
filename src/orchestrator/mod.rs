//! Query orchestration
//!
//! A run walks a fixed state machine:
//!
//! ```text
//! Start -> FindAgent -> CallAgent -> Done
//!              |            |
//!              +--> Errored <+
//!                     |
//!                     v
//!                   Done
//! ```
//!
//! Every run ends in `Done` with an output set, so callers always receive a
//! [`NormalizedResult`].

use crate::bridge::ToolFactory;
use crate::card::AgentCard;
use crate::discovery::AgentResolver;
use crate::error::{FailureKind, NormalizedResult, RouterError};
use crate::observability::metrics::metrics;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

/// Orchestrator state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Start,
    FindAgent,
    CallAgent,
    Errored,
    Done,
}

/// Context threaded through one run
#[derive(Debug, Serialize)]
pub struct RoutingQuery {
    pub id: Uuid,
    pub text: String,
    pub agent_card: Option<AgentCard>,
    agent_output: Option<NormalizedResult>,
    trace: Vec<Stage>,
    #[serde(skip)]
    pending_error: Option<RouterError>,
}

impl RoutingQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            agent_card: None,
            agent_output: None,
            trace: vec![Stage::Start],
            pending_error: None,
        }
    }

    /// Stages visited, starting with `Start`
    pub fn trace(&self) -> &[Stage] {
        &self.trace
    }

    pub fn output(&self) -> Option<&NormalizedResult> {
        self.agent_output.as_ref()
    }

    /// Final result of the run
    pub fn into_result(self) -> NormalizedResult {
        self.agent_output.unwrap_or_else(|| {
            NormalizedResult::failure(
                FailureKind::AgentUnreachable,
                "Run ended without producing output",
            )
        })
    }

    /// Set the agent output; a later call is ignored
    fn record_output(&mut self, result: NormalizedResult) {
        if self.agent_output.is_some() {
            warn!(query_id = %self.id, "Agent output already recorded, ignoring");
            return;
        }
        self.agent_output = Some(result);
    }

    /// Replace the output with the pending error
    fn wrap_error(&mut self) {
        let error = self.pending_error.take().unwrap_or_else(|| {
            RouterError::no_agent_available("Run failed without a recorded cause")
        });
        self.agent_output = Some(error.to_failure());
    }
}

/// Drives queries through discovery and the protocol bridge
pub struct Orchestrator {
    resolver: Arc<dyn AgentResolver>,
    tools: ToolFactory,
}

impl Orchestrator {
    pub fn new(resolver: Arc<dyn AgentResolver>, tools: ToolFactory) -> Self {
        Self { resolver, tools }
    }

    /// Route `text` and return the agent's normalized answer
    pub async fn run(&self, text: &str) -> NormalizedResult {
        self.run_query(text).await.into_result()
    }

    /// Like [`run`](Self::run), failing with `Timeout` once `deadline` passes
    pub async fn run_with_deadline(&self, text: &str, deadline: Duration) -> NormalizedResult {
        match tokio::time::timeout(deadline, self.run(text)).await {
            Ok(result) => result,
            Err(_) => {
                // The abandoned run never reaches its own bookkeeping
                metrics().query_failed(FailureKind::Timeout, deadline);
                warn!(deadline_ms = deadline.as_millis() as u64, "Query deadline exceeded");
                NormalizedResult::failure(
                    FailureKind::Timeout,
                    format!("Query did not complete within {}ms", deadline.as_millis()),
                )
            }
        }
    }

    /// Run the state machine and return the full context
    pub async fn run_query(&self, text: &str) -> RoutingQuery {
        let mut query = RoutingQuery::new(text);
        let span = crate::route_span!(query_id = %query.id);

        async {
            metrics().query_received();
            let start = Instant::now();

            let mut stage = Stage::Start;
            while stage != Stage::Done {
                let next = self.step(stage, &mut query).await;
                debug!(from = ?stage, to = ?next, "Stage transition");
                query.trace.push(next);
                stage = next;
            }

            let elapsed = start.elapsed();
            match query.output().and_then(NormalizedResult::failure_kind) {
                None => {
                    metrics().query_succeeded(elapsed);
                    info!(elapsed_ms = elapsed.as_millis() as u64, "Query routed");
                }
                Some(kind) => {
                    metrics().query_failed(kind, elapsed);
                    info!(kind = %kind, elapsed_ms = elapsed.as_millis() as u64, "Query failed");
                }
            }

            query
        }
        .instrument(span)
        .await
    }

    async fn step(&self, stage: Stage, query: &mut RoutingQuery) -> Stage {
        match stage {
            Stage::Start => Stage::FindAgent,
            Stage::FindAgent => match self.resolver.resolve(&query.text).await {
                Ok(card) => {
                    info!(agent = %card.name, url = %card.url, "Agent resolved");
                    query.agent_card = Some(card);
                    Stage::CallAgent
                }
                Err(e) => {
                    warn!(error = %e, "Discovery failed");
                    query.pending_error = Some(e);
                    Stage::Errored
                }
            },
            Stage::CallAgent => {
                let built = match &query.agent_card {
                    Some(card) => self.tools.build(card),
                    None => Err(RouterError::no_agent_available("No agent card resolved")),
                };
                match built {
                    Ok(tool) => {
                        let result = tool.call(&query.text).await;
                        query.record_output(result);
                        Stage::Done
                    }
                    Err(e) => {
                        warn!(error = %e, "Agent card rejected by bridge");
                        query.pending_error = Some(e);
                        Stage::Errored
                    }
                }
            }
            Stage::Errored => {
                query.wrap_error();
                Stage::Done
            }
            Stage::Done => Stage::Done,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingResolver, StaticResolver};

    #[tokio::test]
    async fn test_discovery_failure_goes_through_errored() {
        let orchestrator = Orchestrator::new(
            Arc::new(FailingResolver::unavailable()),
            ToolFactory::default(),
        );
        let query = orchestrator.run_query("clima").await;

        assert_eq!(
            query.trace(),
            &[Stage::Start, Stage::FindAgent, Stage::Errored, Stage::Done]
        );
        assert_eq!(
            query.into_result().failure_kind(),
            Some(FailureKind::DiscoveryUnavailable)
        );
    }

    #[tokio::test]
    async fn test_invalid_card_goes_through_errored() {
        let resolver = StaticResolver::new(AgentCard::new("Bad", "", "not-a-url"));
        let orchestrator = Orchestrator::new(Arc::new(resolver), ToolFactory::default());
        let query = orchestrator.run_query("anything").await;

        assert_eq!(
            query.trace(),
            &[
                Stage::Start,
                Stage::FindAgent,
                Stage::CallAgent,
                Stage::Errored,
                Stage::Done
            ]
        );
        assert_eq!(query.agent_card.as_ref().unwrap().name, "Bad");
        assert_eq!(
            query.into_result().failure_kind(),
            Some(FailureKind::InvalidAgentCard)
        );
    }

    #[test]
    fn test_output_is_write_once_except_error_wrapping() {
        let mut query = RoutingQuery::new("x");
        query.record_output(NormalizedResult::success(serde_json::json!(1)));
        query.record_output(NormalizedResult::success(serde_json::json!(2)));
        assert_eq!(
            query.output().and_then(NormalizedResult::payload),
            Some(&serde_json::json!(1))
        );

        query.pending_error = Some(RouterError::timeout("late"));
        query.wrap_error();
        assert_eq!(
            query.output().and_then(NormalizedResult::failure_kind),
            Some(FailureKind::Timeout)
        );
    }

    #[tokio::test]
    async fn test_deadline_yields_timeout() {
        let resolver = StaticResolver::new(AgentCard::new("Slow", "", "http://localhost:1/"))
            .with_delay(Duration::from_millis(200));
        let orchestrator = Orchestrator::new(Arc::new(resolver), ToolFactory::default());

        let result = orchestrator
            .run_with_deadline("clima", Duration::from_millis(20))
            .await;
        assert_eq!(result.failure_kind(), Some(FailureKind::Timeout));
    }
}
