//! Agent discovery
//!
//! Maps a free-text query to one [`AgentCard`]. Two resolvers implement the
//! [`AgentResolver`] seam:
//!
//! - [`LocalDiscovery`] applies the keyword [`RuleSet`] to the in-process
//!   directory snapshot and falls back to the first card when no rule fires.
//! - [`RemoteDiscovery`] asks a directory service over HTTP and, if that service
//!   cannot be reached, applies a reduced rule set to a statically known card.

pub mod remote;
pub mod rules;

pub use remote::RemoteDiscovery;
pub use rules::{KeywordRule, RuleMatch, RuleSet};

use crate::card::{default_weather_card, AgentCard, DirectoryHandle, DirectorySnapshot};
use crate::config::{DiscoveryMode, RouterConfig};
use crate::error::{RouterError, RouterResult};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// Resolves a query to the card of the agent that should handle it
#[async_trait]
pub trait AgentResolver: Send + Sync {
    async fn resolve(&self, query: &str) -> RouterResult<AgentCard>;
}

/// Resolver over the in-process directory
pub struct LocalDiscovery {
    directory: Arc<DirectoryHandle>,
    rules: RuleSet,
}

impl LocalDiscovery {
    pub fn new(directory: Arc<DirectoryHandle>) -> Self {
        Self {
            directory,
            rules: RuleSet::default_rules(),
        }
    }

    /// Replace the keyword rules
    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self
    }

    pub fn directory(&self) -> &Arc<DirectoryHandle> {
        &self.directory
    }
}

#[async_trait]
impl AgentResolver for LocalDiscovery {
    async fn resolve(&self, query: &str) -> RouterResult<AgentCard> {
        let snapshot = self.directory.snapshot();
        resolve_in_snapshot(&snapshot, &self.rules, query)
    }
}

/// Apply `rules` to `snapshot`, falling back to its first card
pub fn resolve_in_snapshot(
    snapshot: &DirectorySnapshot,
    rules: &RuleSet,
    query: &str,
) -> RouterResult<AgentCard> {
    let cards: Vec<&AgentCard> = snapshot.cards().collect();
    let Some(first) = cards.first() else {
        return Err(RouterError::no_agent_available(
            "Agent card directory is empty",
        ));
    };

    match rules.select(query, &cards) {
        Some(selected) => {
            debug!(rule = selected.rule, agent = %selected.card.name, "Keyword rule matched");
            Ok(selected.card.clone())
        }
        None => {
            debug!(agent = %first.name, "No keyword rule matched, using first card");
            Ok((*first).clone())
        }
    }
}

/// Build the resolver selected by configuration
pub fn build_resolver(
    config: &RouterConfig,
    directory: Arc<DirectoryHandle>,
) -> RouterResult<Arc<dyn AgentResolver>> {
    match config.discovery.mode {
        DiscoveryMode::Local => {
            info!(cards_dir = %config.directory.cards_dir.display(), "Using local discovery");
            Ok(Arc::new(LocalDiscovery::new(directory)))
        }
        DiscoveryMode::Remote => {
            let base_url = config.discovery.base_url.as_deref().ok_or_else(|| {
                RouterError::discovery_unavailable("Remote discovery requires a base_url")
            })?;
            info!(base_url = %base_url, "Using remote discovery");
            Ok(Arc::new(
                RemoteDiscovery::new(base_url, config.discovery.timeout()).with_fallback_card(
                    default_weather_card(&config.discovery.fallback_card_url),
                ),
            ))
        }
    }
}
