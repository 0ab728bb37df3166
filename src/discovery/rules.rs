//! Keyword matching rules
//!
//! A rule fires when the query mentions one of its trigger terms, and it accepts
//! a card whose name or description mentions one of its card terms. Rules are
//! evaluated in order; the first rule that both fires and finds a card wins.

use crate::card::AgentCard;

/// One trigger-set → card-predicate pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordRule {
    pub name: String,
    pub triggers: Vec<String>,
    pub name_terms: Vec<String>,
    pub description_terms: Vec<String>,
}

impl KeywordRule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            triggers: Vec::new(),
            name_terms: Vec::new(),
            description_terms: Vec::new(),
        }
    }

    pub fn with_triggers(mut self, triggers: &[&str]) -> Self {
        self.triggers = lowercase_all(triggers);
        self
    }

    pub fn with_name_terms(mut self, terms: &[&str]) -> Self {
        self.name_terms = lowercase_all(terms);
        self
    }

    pub fn with_description_terms(mut self, terms: &[&str]) -> Self {
        self.description_terms = lowercase_all(terms);
        self
    }

    /// Whether the query mentions any trigger term
    pub fn fires(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        self.triggers.iter().any(|t| query.contains(t.as_str()))
    }

    /// Whether the card satisfies this rule's predicate
    pub fn matches(&self, card: &AgentCard) -> bool {
        let name = card.name_lower();
        if self.name_terms.iter().any(|t| name.contains(t.as_str())) {
            return true;
        }
        let description = card.description_lower();
        self.description_terms
            .iter()
            .any(|t| description.contains(t.as_str()))
    }
}

/// A card chosen by a rule
#[derive(Debug, Clone, Copy)]
pub struct RuleMatch<'c> {
    pub rule: &'c str,
    pub card: &'c AgentCard,
}

/// Ordered list of keyword rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSet {
    rules: Vec<KeywordRule>,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::default_rules()
    }
}

impl RuleSet {
    pub fn new(rules: Vec<KeywordRule>) -> Self {
        Self { rules }
    }

    /// Weather, information and supervisor rules, in that order
    pub fn default_rules() -> Self {
        Self::new(vec![
            weather_rule(),
            KeywordRule::new("information")
                .with_triggers(&["informação", "information", "pesquisa", "search"])
                .with_name_terms(&["information", "informação"])
                .with_description_terms(&["rag"]),
            KeywordRule::new("supervisor")
                .with_triggers(&["supervisor", "coordenador", "gerenciar"])
                .with_name_terms(&["supervisor", "coordenador"]),
        ])
    }

    /// Subset applied to the static default card when the remote directory is down
    pub fn weather_fallback() -> Self {
        Self::new(vec![weather_rule()])
    }

    pub fn rules(&self) -> &[KeywordRule] {
        &self.rules
    }

    /// First card matched by the first rule that fires and finds one
    pub fn select<'c>(&'c self, query: &str, cards: &[&'c AgentCard]) -> Option<RuleMatch<'c>> {
        self.rules
            .iter()
            .filter(|rule| rule.fires(query))
            .find_map(|rule| {
                cards
                    .iter()
                    .copied()
                    .find(|card| rule.matches(card))
                    .map(|card| RuleMatch {
                        rule: rule.name.as_str(),
                        card,
                    })
            })
    }
}

fn weather_rule() -> KeywordRule {
    KeywordRule::new("weather")
        .with_triggers(&["clima", "weather", "tempo"])
        .with_name_terms(&["weather", "clima"])
        .with_description_terms(&["weather"])
}

fn lowercase_all(terms: &[&str]) -> Vec<String> {
    terms.iter().map(|t| t.to_lowercase()).collect()
}
