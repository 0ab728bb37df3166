//! Agent card directory
//!
//! Loads every JSON card from a directory into an immutable snapshot. Reloading
//! builds a fresh snapshot and swaps it in; requests holding the previous
//! `Arc<DirectorySnapshot>` keep reading it undisturbed.

use super::AgentCard;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// URI prefix for cards served from a directory
pub const CARD_URI_PREFIX: &str = "resource://agent_cards/";

/// Resource listing every card uri
pub const CARD_LIST_URI: &str = "resource://agent_cards/list";

/// Problems encountered while loading or reading a directory
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid agent card in {path}: {reason}")]
    InvalidCard { path: PathBuf, reason: String },
    #[error("Agent card not found: {0}")]
    NotFound(String),
}

/// Ordered, read-only collection of (uri, card) pairs
#[derive(Debug, Default)]
pub struct DirectorySnapshot {
    entries: Vec<(String, AgentCard)>,
    index: HashMap<String, usize>,
    load_errors: Vec<DirectoryError>,
}

impl DirectorySnapshot {
    /// Empty snapshot
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a snapshot from in-memory cards, deriving uris from card names
    pub fn from_cards(cards: Vec<AgentCard>) -> Self {
        let mut snapshot = Self::default();
        for card in cards {
            let uri = card_uri(&slugify(&card.name));
            if let Err(reason) = snapshot.insert(uri, card) {
                warn!(reason = %reason, "Skipping agent card");
            }
        }
        snapshot
    }

    /// Read every `*.json` file in `dir`
    ///
    /// Files are visited in file-name order so the listing is deterministic.
    /// A missing or unreadable directory yields an empty snapshot, and each
    /// per-file failure is recorded and skipped.
    pub fn load(dir: &Path) -> Self {
        let mut snapshot = Self::default();

        let read_dir = match std::fs::read_dir(dir) {
            Ok(read_dir) => read_dir,
            Err(e) => {
                error!(
                    path = %dir.display(),
                    error = %e,
                    "Agent cards directory not found or unreadable"
                );
                snapshot.load_errors.push(DirectoryError::Read {
                    path: dir.to_path_buf(),
                    source: e,
                });
                return snapshot;
            }
        };

        info!(path = %dir.display(), "Loading agent cards");

        let mut files: Vec<PathBuf> = read_dir
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && is_json_file(path))
            .collect();
        files.sort();

        for path in files {
            debug!(path = %path.display(), "Reading agent card");
            match read_card(&path) {
                Ok(card) => {
                    let stem = path
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    if let Err(reason) = snapshot.insert(card_uri(&stem), card) {
                        error!(path = %path.display(), reason = %reason, "Skipping agent card");
                        snapshot
                            .load_errors
                            .push(DirectoryError::InvalidCard { path, reason });
                    }
                }
                Err(e) => {
                    error!(error = %e, "Skipping agent card");
                    snapshot.load_errors.push(e);
                }
            }
        }

        info!(
            cards = snapshot.len(),
            errors = snapshot.load_errors.len(),
            "Finished loading agent cards"
        );

        snapshot
    }

    /// Add a card unless its uri is reserved or its uri or name is taken
    fn insert(&mut self, uri: String, card: AgentCard) -> Result<(), String> {
        if uri == CARD_LIST_URI {
            return Err(format!("{uri} is reserved for the card listing"));
        }
        if self.index.contains_key(&uri) {
            return Err(format!("Duplicate agent card uri {uri}"));
        }
        if self.get_by_name(&card.name).is_some() {
            return Err(format!("Duplicate agent card name '{}'", card.name));
        }
        self.index.insert(uri.clone(), self.entries.len());
        self.entries.push((uri, card));
        Ok(())
    }

    /// Card uris in load order
    pub fn list(&self) -> Vec<String> {
        self.entries.iter().map(|(uri, _)| uri.clone()).collect()
    }

    /// Exact uri lookup
    pub fn get(&self, uri: &str) -> Result<&AgentCard, DirectoryError> {
        self.index
            .get(uri)
            .map(|&i| &self.entries[i].1)
            .ok_or_else(|| DirectoryError::NotFound(uri.to_string()))
    }

    /// First card with the given name
    pub fn get_by_name(&self, name: &str) -> Option<&AgentCard> {
        self.cards().find(|card| card.name == name)
    }

    /// Cards in load order
    pub fn cards(&self) -> impl Iterator<Item = &AgentCard> {
        self.entries.iter().map(|(_, card)| card)
    }

    /// Decode and validation errors recorded during load
    pub fn load_errors(&self) -> &[DirectoryError] {
        &self.load_errors
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Shared handle to the current snapshot
#[derive(Debug)]
pub struct DirectoryHandle {
    source: Option<PathBuf>,
    current: RwLock<Arc<DirectorySnapshot>>,
}

impl DirectoryHandle {
    /// Load the initial snapshot from `dir`
    pub fn load(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let snapshot = DirectorySnapshot::load(&dir);
        Self {
            source: Some(dir),
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// Wrap a prebuilt snapshot; `reload` keeps it as-is
    pub fn from_snapshot(snapshot: DirectorySnapshot) -> Self {
        Self {
            source: None,
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Arc<DirectorySnapshot> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Re-read the source directory and swap in the new snapshot
    pub fn reload(&self) -> Arc<DirectorySnapshot> {
        let Some(dir) = &self.source else {
            return self.snapshot();
        };

        // Load outside the lock; only the swap is guarded
        let fresh = Arc::new(DirectorySnapshot::load(dir));
        match self.current.write() {
            Ok(mut guard) => *guard = fresh.clone(),
            Err(poisoned) => *poisoned.into_inner() = fresh.clone(),
        }
        fresh
    }
}

fn read_card(path: &Path) -> Result<AgentCard, DirectoryError> {
    let content = std::fs::read_to_string(path).map_err(|source| DirectoryError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let card: AgentCard =
        serde_json::from_str(&content).map_err(|source| DirectoryError::Decode {
            path: path.to_path_buf(),
            source,
        })?;

    card.validate().map_err(|e| DirectoryError::InvalidCard {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    Ok(card)
}

fn is_json_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Build the resource uri for a card stem
pub fn card_uri(stem: &str) -> String {
    format!("{CARD_URI_PREFIX}{stem}")
}

fn slugify(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) {
        fs::write(dir.path().join(name), content).unwrap();
    }

    #[test]
    fn test_load_preserves_file_order_and_skips_non_json() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "b_weather.json",
            r#"{"name": "WeatherAgent", "url": "http://localhost:10110/"}"#,
        );
        write(
            &dir,
            "a_info.json",
            r#"{"name": "InformationAgent", "url": "http://localhost:10111/"}"#,
        );
        write(&dir, "notes.txt", "not a card");

        let snapshot = DirectorySnapshot::load(dir.path());

        assert_eq!(
            snapshot.list(),
            vec![
                "resource://agent_cards/a_info".to_string(),
                "resource://agent_cards/b_weather".to_string()
            ]
        );
        assert!(snapshot.load_errors().is_empty());
    }

    #[test]
    fn test_malformed_file_is_recorded_and_skipped() {
        let dir = TempDir::new().unwrap();
        write(&dir, "broken.json", "{ not json");
        write(
            &dir,
            "good.json",
            r#"{"name": "Good", "url": "http://localhost:1/"}"#,
        );

        let snapshot = DirectorySnapshot::load(dir.path());

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.load_errors().len(), 1);
        assert!(matches!(
            snapshot.load_errors()[0],
            DirectoryError::Decode { .. }
        ));
    }

    #[test]
    fn test_card_with_bad_url_is_skipped() {
        let dir = TempDir::new().unwrap();
        write(&dir, "bad.json", r#"{"name": "Bad", "url": "localhost"}"#);

        let snapshot = DirectorySnapshot::load(dir.path());

        assert!(snapshot.is_empty());
        assert!(matches!(
            snapshot.load_errors()[0],
            DirectoryError::InvalidCard { .. }
        ));
    }

    #[test]
    fn test_listing_uri_is_reserved() {
        let dir = TempDir::new().unwrap();
        write(&dir, "list.json", r#"{"name": "Lister", "url": "http://localhost:1/"}"#);

        let snapshot = DirectorySnapshot::load(dir.path());

        assert!(snapshot.is_empty());
        assert!(snapshot.get(CARD_LIST_URI).is_err());
        assert!(matches!(
            snapshot.load_errors()[0],
            DirectoryError::InvalidCard { .. }
        ));
    }

    #[test]
    fn test_missing_directory_yields_empty_snapshot() {
        let snapshot = DirectorySnapshot::load(Path::new("/definitely/not/here"));
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.load_errors().len(), 1);
    }

    #[test]
    fn test_get_by_uri_and_not_found() {
        let snapshot = DirectorySnapshot::from_cards(vec![AgentCard::new(
            "Weather Agent",
            "weather",
            "http://localhost:1/",
        )]);

        let card = snapshot.get("resource://agent_cards/weather_agent").unwrap();
        assert_eq!(card.name, "Weather Agent");
        assert!(matches!(
            snapshot.get("resource://agent_cards/missing"),
            Err(DirectoryError::NotFound(_))
        ));
        assert!(snapshot.get_by_name("Weather Agent").is_some());
    }

    #[test]
    fn test_reload_swaps_snapshot_without_touching_old_one() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "one.json",
            r#"{"name": "One", "url": "http://localhost:1/"}"#,
        );

        let handle = DirectoryHandle::load(dir.path());
        let before = handle.snapshot();
        assert_eq!(before.len(), 1);

        write(
            &dir,
            "two.json",
            r#"{"name": "Two", "url": "http://localhost:2/"}"#,
        );
        let after = handle.reload();

        assert_eq!(before.len(), 1);
        assert_eq!(after.len(), 2);
        assert_eq!(handle.snapshot().len(), 2);
    }
}
