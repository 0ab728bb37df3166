//! On-demand handler agents
//!
//! [`DynamicAgentFactory`] hands out one [`DynamicAgent`] per routing key and
//! reuses it for every later request with that key. The cache is never evicted;
//! its size is visible through [`DynamicAgentFactory::len`] and the
//! `dynamic.agents_created` metric.

pub mod executor;

pub use executor::{dynamic_agent_card, DynamicAgentExecutor};

use crate::observability::metrics::metrics;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

const DEFAULT_LOCATION: &str = "São Paulo";

/// Stateless text handler addressed by a routing key
#[derive(Debug)]
pub struct DynamicAgent {
    id: String,
    created_at: DateTime<Utc>,
}

/// One entry of the dispatch table
struct Behavior {
    name: &'static str,
    matches: fn(&str) -> bool,
    respond: fn(&DynamicAgent, &str) -> String,
}

/// Checked in order; the echo fallback runs when nothing matches
const BEHAVIORS: &[Behavior] = &[
    Behavior {
        name: "weather",
        matches: |t| t.starts_with("clima") || t.contains("weather"),
        respond: |_, text| {
            format!(
                "Weather request received for {}. Connect a weather provider for live data.",
                extract_location(text)
            )
        },
    },
    Behavior {
        name: "information",
        matches: |t| t.starts_with("info") || t.contains("documentação"),
        respond: |_, _| {
            "Information request received. Connect a retrieval agent for answers.".to_string()
        },
    },
    Behavior {
        name: "calculation",
        matches: |t| t.starts_with("calc") || t.contains(['+', '-', '*', '/']),
        respond: |_, _| "Calculation requested. Connect a calculator tool for results.".to_string(),
    },
];

impl DynamicAgent {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Respond to `text`; never fails
    pub fn handle(&self, text: &str) -> String {
        let lowered = text.to_lowercase();

        match BEHAVIORS.iter().find(|b| (b.matches)(&lowered)) {
            Some(behavior) => {
                debug!(agent_id = %self.id, behavior = behavior.name, "Dispatching text");
                (behavior.respond)(self, text)
            }
            None => format!("Agent {} replied: '{}'.", self.id, text),
        }
    }

    /// Name of the behavior `text` dispatches to, `"echo"` for the fallback
    pub fn behavior_for(text: &str) -> &'static str {
        let lowered = text.to_lowercase();
        BEHAVIORS
            .iter()
            .find(|b| (b.matches)(&lowered))
            .map(|b| b.name)
            .unwrap_or("echo")
    }
}

/// City named after " em " or " in ", else the default location
fn extract_location(text: &str) -> String {
    let lowered = text.to_lowercase();

    [" em ", " in "]
        .iter()
        .filter_map(|marker| lowered.find(marker).map(|i| i + marker.len()))
        .min()
        // Lowercasing can shift byte offsets for non-ASCII text
        .and_then(|start| text.get(start..))
        .map(|rest| rest.trim().trim_end_matches(['?', '!', '.']).trim())
        .filter(|location| !location.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| DEFAULT_LOCATION.to_string())
}

/// Memoizing factory for dynamic agents
#[derive(Debug, Default)]
pub struct DynamicAgentFactory {
    agents: RwLock<HashMap<String, Arc<DynamicAgent>>>,
}

impl DynamicAgentFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Agent for `id`, creating it on first use
    ///
    /// Concurrent first calls for the same id all receive the instance inserted
    /// by whichever caller took the write lock first.
    pub fn get_or_create(&self, id: &str) -> Arc<DynamicAgent> {
        {
            let agents = match self.agents.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Some(agent) = agents.get(id) {
                return Arc::clone(agent);
            }
        }

        let mut agents = match self.agents.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let agent = agents.entry(id.to_string()).or_insert_with(|| {
            info!(agent_id = %id, "Creating dynamic agent");
            metrics().dynamic_agent_created();
            Arc::new(DynamicAgent::new(id))
        });
        Arc::clone(agent)
    }

    /// Number of cached agents
    pub fn len(&self) -> usize {
        self.agents.read().map(|a| a.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of cached agents, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .agents
            .read()
            .map(|a| a.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weather_dispatch_extracts_location() {
        let agent = DynamicAgent::new("weather");
        let reply = agent.handle("clima em Lisboa?");
        assert!(reply.contains("Lisboa"), "{reply}");
        assert!(!reply.contains('?'));

        let reply = agent.handle("What's the weather in Porto");
        assert!(reply.contains("Porto"), "{reply}");
    }

    #[test]
    fn test_weather_dispatch_defaults_location() {
        let agent = DynamicAgent::new("weather");
        assert!(agent.handle("clima").contains("São Paulo"));
    }

    #[test]
    fn test_location_with_accented_prefix() {
        assert_eq!(extract_location("Previsão do clima em Brasília"), "Brasília");
    }

    #[test]
    fn test_dispatch_order() {
        assert_eq!(DynamicAgent::behavior_for("Clima em Lisboa"), "weather");
        assert_eq!(DynamicAgent::behavior_for("info sobre Rust"), "information");
        assert_eq!(DynamicAgent::behavior_for("ver a documentação"), "information");
        assert_eq!(DynamicAgent::behavior_for("calc 2 e 2"), "calculation");
        assert_eq!(DynamicAgent::behavior_for("2 + 2"), "calculation");
        // weather wins over calculation when both apply
        assert_eq!(DynamicAgent::behavior_for("weather 2+2"), "weather");
        assert_eq!(DynamicAgent::behavior_for("olá"), "echo");
    }

    #[test]
    fn test_echo_includes_agent_id_and_text() {
        let agent = DynamicAgent::new("helper");
        assert_eq!(agent.handle("olá"), "Agent helper replied: 'olá'.");
    }

    #[test]
    fn test_empty_text_echoes() {
        let agent = DynamicAgent::new("dynamic");
        assert_eq!(agent.handle(""), "Agent dynamic replied: ''.");
    }

    #[test]
    fn test_get_or_create_is_memoized() {
        let factory = DynamicAgentFactory::new();
        let a = factory.get_or_create("weather");
        let b = factory.get_or_create("weather");
        let c = factory.get_or_create("info");

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(factory.len(), 2);
        assert_eq!(factory.ids(), vec!["info".to_string(), "weather".to_string()]);
    }
}
