//! Reward candidate registry.
//!
//! This module provides:
//! - The [`RewardCandidate`] record (name plus optional reward-script source)
//! - A JSON-file backed cache so generated rewards survive between runs
//!
//! The cache file is a single JSON object mapping candidate name to source.
//! A `null` source marks a baseline that trains on the environment's own
//! reward. Loading is forgiving: a missing or corrupt file yields an empty
//! registry. Saving rewrites the whole file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::RegistryError;

/// A named reward-function variant under evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardCandidate {
    /// Unique key within a registry.
    pub name: String,
    /// Reward-script source; `None` means "use the environment's reward".
    pub source: Option<String>,
}

impl RewardCandidate {
    /// Creates a candidate backed by a reward script.
    pub fn scripted(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: Some(source.into()),
        }
    }

    /// Creates a baseline candidate that keeps the environment's reward.
    pub fn baseline(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: None,
        }
    }

    /// Whether this candidate runs on the environment's built-in reward.
    pub fn is_baseline(&self) -> bool {
        self.source.is_none()
    }
}

/// Ordered name → source map with optional file persistence.
#[derive(Debug, Clone, Default)]
pub struct RewardRegistry {
    /// Backing JSON file, if any.
    cache_path: Option<PathBuf>,
    /// Entries in insertion order; names are unique.
    entries: Vec<RewardCandidate>,
}

impl RewardRegistry {
    /// Creates an empty registry with no backing file.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Creates an empty registry that will save to `cache_path`.
    ///
    /// Nothing is read; use [`RewardRegistry::load`] to pick up existing entries.
    pub fn new(cache_path: impl Into<PathBuf>) -> Self {
        Self {
            cache_path: Some(cache_path.into()),
            entries: Vec::new(),
        }
    }

    /// Opens the registry at `cache_path`, reading any existing entries.
    ///
    /// Never fails: a missing file gives an empty registry, and an unreadable
    /// or malformed file is logged and also gives an empty registry.
    pub fn load(cache_path: impl Into<PathBuf>) -> Self {
        let mut registry = Self::new(cache_path);
        match registry.reload() {
            Ok(0) => {}
            Ok(count) => info!(
                count,
                path = %registry.path_display(),
                "Loaded reward candidates from cache"
            ),
            Err(e) => {
                warn!(path = %registry.path_display(), error = %e, "Failed to load reward cache");
                registry.entries.clear();
            }
        }
        registry
    }

    /// Replaces the in-memory entries with the file contents.
    ///
    /// Returns the number of entries read; a missing file reads as zero.
    pub fn reload(&mut self) -> Result<usize, RegistryError> {
        let path = self.cache_path.as_ref().ok_or(RegistryError::NoBackingFile)?;

        if !path.exists() {
            self.entries.clear();
            return Ok(0);
        }

        let contents = fs::read_to_string(path)?;
        self.entries = parse_cache(&contents)?;
        Ok(self.entries.len())
    }

    /// Writes the full map to the backing file.
    ///
    /// Failures are logged and reported as `false`; they never abort the caller.
    pub fn save(&self) -> bool {
        match self.try_save() {
            Ok(()) => {
                info!(
                    count = self.entries.len(),
                    path = %self.path_display(),
                    "Reward cache saved"
                );
                true
            }
            Err(e) => {
                warn!(path = %self.path_display(), error = %e, "Failed to save reward cache");
                false
            }
        }
    }

    /// Writes the full map to the backing file, reporting any error.
    ///
    /// The file is overwritten in place; a crash mid-write can leave it
    /// truncated, which the next [`RewardRegistry::load`] treats as empty.
    pub fn try_save(&self) -> Result<(), RegistryError> {
        let path = self.cache_path.as_ref().ok_or(RegistryError::NoBackingFile)?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Serializes the registry as the pretty-printed cache document.
    pub fn to_json(&self) -> Result<String, RegistryError> {
        let map: Map<String, Value> = self
            .entries
            .iter()
            .map(|c| {
                let value = c.source.clone().map(Value::String).unwrap_or(Value::Null);
                (c.name.clone(), value)
            })
            .collect();
        Ok(serde_json::to_string_pretty(&Value::Object(map))?)
    }

    /// Inserts a candidate, replacing the source of an existing one in place.
    pub fn put(&mut self, name: impl Into<String>, source: Option<String>) {
        let name = name.into();
        match self.entries.iter_mut().find(|c| c.name == name) {
            Some(existing) => existing.source = source,
            None => self.entries.push(RewardCandidate { name, source }),
        }
    }

    /// Whether a candidate with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|c| c.name == name)
    }

    /// Looks up a candidate by name.
    pub fn get(&self, name: &str) -> Option<&RewardCandidate> {
        self.entries.iter().find(|c| c.name == name)
    }

    /// Removes and returns a candidate.
    pub fn remove(&mut self, name: &str) -> Option<RewardCandidate> {
        let index = self.entries.iter().position(|c| c.name == name)?;
        Some(self.entries.remove(index))
    }

    /// Candidate names in insertion order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|c| c.name.as_str()).collect()
    }

    /// Iterates candidates in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &RewardCandidate> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Path of the backing file, if any.
    pub fn cache_path(&self) -> Option<&Path> {
        self.cache_path.as_deref()
    }

    fn path_display(&self) -> String {
        self.cache_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<memory>".to_string())
    }
}

/// Parses a cache document into ordered candidates.
fn parse_cache(contents: &str) -> Result<Vec<RewardCandidate>, RegistryError> {
    let map: Map<String, Value> = serde_json::from_str(contents)?;
    map.into_iter()
        .map(|(name, value)| match value {
            Value::String(source) => Ok(RewardCandidate {
                name,
                source: Some(source),
            }),
            Value::Null => Ok(RewardCandidate { name, source: None }),
            _ => Err(RegistryError::InvalidEntry { name }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const REWARD: &str = "def compute_reward(obs, terminated, truncated, info):\n    return 1.0";

    #[test]
    fn test_put_and_contains() {
        let mut registry = RewardRegistry::in_memory();
        assert!(registry.is_empty());

        registry.put("Default", None);
        registry.put("LLM_gpt-4o-mini", Some(REWARD.to_string()));

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("Default"));
        assert!(registry.contains("LLM_gpt-4o-mini"));
        assert!(!registry.contains("LLM_other"));
        assert!(registry.get("Default").unwrap().is_baseline());
    }

    #[test]
    fn test_put_overwrites_in_place() {
        let mut registry = RewardRegistry::in_memory();
        registry.put("a", Some("one".to_string()));
        registry.put("b", None);
        registry.put("a", Some("two".to_string()));

        assert_eq!(registry.names(), vec!["a", "b"]);
        assert_eq!(registry.get("a").unwrap().source.as_deref(), Some("two"));
    }

    #[test]
    fn test_save_and_load_round_trip_preserves_order() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cache.json");

        let mut registry = RewardRegistry::new(&path);
        registry.put("Default", None);
        registry.put("Zeta", Some(REWARD.to_string()));
        registry.put("Alpha", Some("x".to_string()));
        assert!(registry.save());

        let loaded = RewardRegistry::load(&path);
        assert_eq!(loaded.names(), vec!["Default", "Zeta", "Alpha"]);
        assert_eq!(loaded.get("Zeta").unwrap().source.as_deref(), Some(REWARD));
        assert!(loaded.get("Default").unwrap().is_baseline());
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let registry = RewardRegistry::load(temp_dir.path().join("absent.json"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_load_corrupt_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cache.json");
        fs::write(&path, "{ not json").unwrap();

        let registry = RewardRegistry::load(&path);
        assert!(registry.is_empty());
        assert_eq!(registry.cache_path(), Some(path.as_path()));
    }

    #[test]
    fn test_load_rejects_non_string_entries() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cache.json");
        fs::write(&path, r#"{"a": 3}"#).unwrap();

        let mut registry = RewardRegistry::new(&path);
        assert!(matches!(
            registry.reload(),
            Err(RegistryError::InvalidEntry { .. })
        ));
        assert!(RewardRegistry::load(&path).is_empty());
    }

    #[test]
    fn test_save_without_backing_file_is_non_fatal() {
        let mut registry = RewardRegistry::in_memory();
        registry.put("a", None);
        assert!(!registry.save());
        assert!(matches!(
            registry.try_save(),
            Err(RegistryError::NoBackingFile)
        ));
    }

    #[test]
    fn test_save_creates_parent_directories() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("dir").join("cache.json");

        let mut registry = RewardRegistry::new(&path);
        registry.put("a", Some("src".to_string()));
        assert!(registry.save());
        assert!(path.exists());
    }

    #[test]
    fn test_save_writes_full_map() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cache.json");

        let mut registry = RewardRegistry::new(&path);
        registry.put("a", Some("1".to_string()));
        registry.save();
        registry.put("b", Some("2".to_string()));
        registry.save();

        let raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw, serde_json::json!({"a": "1", "b": "2"}));
    }

    #[test]
    fn test_remove() {
        let mut registry = RewardRegistry::in_memory();
        registry.put("a", None);
        let removed = registry.remove("a").unwrap();
        assert_eq!(removed, RewardCandidate::baseline("a"));
        assert!(registry.remove("a").is_none());
    }
}
