//! Testing utilities and fixtures
//!
//! Card builders, on-disk card directories and mock resolvers, so tests can
//! exercise discovery and orchestration without a directory service.

pub mod mocks;

pub use mocks::*;

use crate::card::{AgentCard, AgentSkill, DirectoryHandle, DirectorySnapshot};
use std::path::Path;
use std::sync::Arc;

/// Weather card pointing at `url`
pub fn weather_card(url: &str) -> AgentCard {
    AgentCard::new("WeatherAgent", "Weather information agent", url).with_skill(AgentSkill {
        id: "weather".to_string(),
        name: "Weather".to_string(),
        description: "Current conditions by city".to_string(),
        tags: vec!["weather".to_string()],
        examples: vec!["clima em São Paulo".to_string()],
    })
}

/// Retrieval card pointing at `url`
pub fn information_card(url: &str) -> AgentCard {
    AgentCard::new("InformationAgent", "RAG over internal documentation", url)
}

/// Supervisor card pointing at `url`
pub fn supervisor_card(url: &str) -> AgentCard {
    AgentCard::new("SupervisorAgent", "Coordinates other agents", url)
}

/// Directory handle over in-memory cards
pub fn directory_of(cards: Vec<AgentCard>) -> Arc<DirectoryHandle> {
    Arc::new(DirectoryHandle::from_snapshot(DirectorySnapshot::from_cards(
        cards,
    )))
}

/// Write each card as `<stem>.json` under `dir`
pub fn write_card_files(dir: &Path, cards: &[(&str, AgentCard)]) -> std::io::Result<()> {
    for (stem, card) in cards {
        let json = serde_json::to_string_pretty(card)?;
        std::fs::write(dir.join(format!("{stem}.json")), json)?;
    }
    Ok(())
}
