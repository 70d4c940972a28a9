//! Symbol -> asset id assignment, persisted as TOML.
//!
//! Symbols already in the map keep their id across runs. New symbols take
//! the next free id after the current maximum; a fresh map numbers symbols
//! from 0 in the order given.

use crate::config::ConfigError;
use crate::domain::AssetId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetMap {
    #[serde(default)]
    assets: BTreeMap<String, AssetId>,
}

impl AssetMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a map from a TOML file; a missing file yields an empty map.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(path, self.to_toml()?).map_err(io_err)
    }

    /// Ids for `symbols`, assigning new ones where needed. Returned pairs
    /// follow the input order.
    pub fn assign<S: AsRef<str>>(&mut self, symbols: &[S]) -> Vec<(String, AssetId)> {
        let mut next_free = self.next_free_id();
        symbols
            .iter()
            .map(|symbol| {
                let symbol = symbol.as_ref().to_string();
                let id = *self.assets.entry(symbol.clone()).or_insert_with(|| {
                    let id = next_free;
                    next_free = AssetId(next_free.0 + 1);
                    id
                });
                (symbol, id)
            })
            .collect()
    }

    pub fn get(&self, symbol: &str) -> Option<AssetId> {
        self.assets.get(symbol).copied()
    }

    pub fn symbol_of(&self, id: AssetId) -> Option<&str> {
        self.assets
            .iter()
            .find(|(_, v)| **v == id)
            .map(|(k, _)| k.as_str())
    }

    pub fn ids(&self) -> BTreeSet<AssetId> {
        self.assets.values().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    fn next_free_id(&self) -> AssetId {
        self.assets
            .values()
            .map(|id| id.0)
            .max()
            .map_or(AssetId(0), |max| AssetId(max + 1))
    }
}
