//! Mock implementations for testing
//!
//! Resolvers that answer without consulting any directory.

use crate::card::AgentCard;
use crate::discovery::AgentResolver;
use crate::error::{RouterError, RouterResult};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Resolver that always returns the same card
#[derive(Debug, Clone)]
pub struct StaticResolver {
    card: AgentCard,
    delay: Option<Duration>,
    pub queries: Arc<Mutex<Vec<String>>>,
}

impl StaticResolver {
    pub fn new(card: AgentCard) -> Self {
        Self {
            card,
            delay: None,
            queries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Sleep before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub async fn get_queries(&self) -> Vec<String> {
        self.queries.lock().await.clone()
    }
}

#[async_trait]
impl AgentResolver for StaticResolver {
    async fn resolve(&self, query: &str) -> RouterResult<AgentCard> {
        self.queries.lock().await.push(query.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.card.clone())
    }
}

/// Resolver that always fails with the given error constructor
#[derive(Debug, Clone, Copy)]
pub struct FailingResolver {
    make_error: fn(String) -> RouterError,
}

impl FailingResolver {
    pub fn new(make_error: fn(String) -> RouterError) -> Self {
        Self { make_error }
    }

    pub fn unavailable() -> Self {
        Self::new(RouterError::discovery_unavailable::<String>)
    }

    pub fn empty_directory() -> Self {
        Self::new(RouterError::no_agent_available::<String>)
    }
}

#[async_trait]
impl AgentResolver for FailingResolver {
    async fn resolve(&self, query: &str) -> RouterResult<AgentCard> {
        Err((self.make_error)(format!("mock resolver refused '{query}'")))
    }
}
