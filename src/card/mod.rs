//! Agent cards
//!
//! An agent card is the self-describing record of a remote agent: where it lives,
//! what it advertises, and which skills it documents. Cards are plain data; the
//! router never executes skills, it only uses names and descriptions as hints.

pub mod directory;

pub use directory::{DirectoryError, DirectoryHandle, DirectorySnapshot};

use crate::error::RouterError;
use serde::{Deserialize, Serialize};
use url::Url;

/// Identity and contract of a remotely invocable agent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentCard {
    /// Unique within a directory snapshot
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Absolute base address of the agent's RPC endpoint
    pub url: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub capabilities: AgentCapabilities,
    #[serde(default)]
    pub default_input_modes: Vec<String>,
    #[serde(default)]
    pub default_output_modes: Vec<String>,
    #[serde(default)]
    pub skills: Vec<AgentSkill>,
}

/// Advisory capability flags; the bridge does not enforce them
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AgentCapabilities {
    #[serde(default)]
    pub streaming: bool,
    #[serde(default)]
    pub push_notifications: bool,
}

/// Documented skill of an agent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentSkill {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
}

impl AgentCard {
    /// Create a card with the required fields and text in/out modes
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            url: url.into(),
            version: "1.0.0".to_string(),
            capabilities: AgentCapabilities::default(),
            default_input_modes: vec!["text".to_string()],
            default_output_modes: vec!["text".to_string()],
            skills: Vec::new(),
        }
    }

    /// Builder method to attach a skill
    pub fn with_skill(mut self, skill: AgentSkill) -> Self {
        self.skills.push(skill);
        self
    }

    /// Builder method to set capability flags
    pub fn with_capabilities(mut self, capabilities: AgentCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Check that the card url is usable as an RPC endpoint
    pub fn validate(&self) -> Result<(), RouterError> {
        if is_well_formed_url(&self.url) {
            Ok(())
        } else {
            Err(RouterError::invalid_agent_card(format!(
                "Agent card '{}' has malformed url '{}'",
                self.name, self.url
            )))
        }
    }

    /// Lowercased name, used by keyword matching
    pub fn name_lower(&self) -> String {
        self.name.to_lowercase()
    }

    /// Lowercased description, used by keyword matching
    pub fn description_lower(&self) -> String {
        self.description.to_lowercase()
    }
}

/// True for absolute `http://` or `https://` URLs with a host
pub fn is_well_formed_url(raw: &str) -> bool {
    match Url::parse(raw) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host_str().is_some(),
        Err(_) => false,
    }
}

/// The statically known weather card used when remote discovery is down
pub fn default_weather_card(url: &str) -> AgentCard {
    AgentCard::new(
        "WeatherAgent",
        "Provides current weather and short forecasts for a city",
        url,
    )
    .with_skill(AgentSkill {
        id: "weather_lookup".to_string(),
        name: "Weather lookup".to_string(),
        description: "Current conditions for a named city".to_string(),
        tags: vec!["weather".to_string(), "clima".to_string()],
        examples: vec!["clima em São Paulo".to_string()],
    })
}
