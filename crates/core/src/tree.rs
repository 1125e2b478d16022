//! Tree and deployment configuration.

use crate::error::IndexError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// One configured source repository.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TreeConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub source_folder: PathBuf,
    pub object_folder: PathBuf,
    pub temp_folder: PathBuf,
    /// Folder holding one sub-folder of native artifacts per plugin.
    #[serde(default)]
    pub plugin_folder: PathBuf,
    #[serde(default)]
    pub enabled_plugins: Vec<String>,
    /// Shell command run in `object_folder` during the build phase.
    #[serde(default)]
    pub build_command: Option<String>,
    /// Glob patterns (relative to `source_folder`) left out of the index.
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
}

impl TreeConfig {
    /// Check the paths every build needs.
    pub fn validate(&self) -> Result<(), IndexError> {
        if self.name.is_empty() {
            return Err(IndexError::Configuration("tree has no name".into()));
        }
        if !self.source_folder.is_dir() {
            return Err(IndexError::Configuration(format!(
                "source folder {} of tree {} does not exist",
                self.source_folder.display(),
                self.name
            )));
        }
        if self.temp_folder.as_os_str().is_empty() || self.object_folder.as_os_str().is_empty() {
            return Err(IndexError::Configuration(format!(
                "tree {} needs both an object and a temp folder",
                self.name
            )));
        }
        Ok(())
    }

    /// Per-plugin scratch space under the temp folder.
    pub fn plugin_temp_folder(&self, plugin: &str) -> PathBuf {
        self.temp_folder.join("plugins").join(plugin)
    }
}

fn default_max_thumbnail_size() -> u64 {
    20_000
}

/// Deployment-wide settings, as written next to the index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub www_root: String,
    #[serde(default)]
    pub default_tree: Option<String>,
    #[serde(default = "default_max_thumbnail_size")]
    pub max_thumbnail_size: u64,
    #[serde(default)]
    pub generated_date: Option<String>,
    #[serde(default)]
    pub plugin_folder: PathBuf,
    /// Location of the document store.
    pub store_path: PathBuf,
    pub trees: BTreeMap<String, TreeConfig>,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let mut config: Config = serde_json::from_str(raw)?;
        config.normalize();
        Ok(config)
    }

    /// Fill per-tree defaults from the global section.
    pub fn normalize(&mut self) {
        for (name, tree) in self.trees.iter_mut() {
            if tree.name.is_empty() {
                tree.name = name.clone();
            }
            if tree.plugin_folder.as_os_str().is_empty() {
                tree.plugin_folder = self.plugin_folder.clone();
            }
        }
        if self.default_tree.is_none() {
            self.default_tree = self.trees.keys().next().cloned();
        }
    }

    pub fn tree(&self, name: &str) -> Option<&TreeConfig> {
        self.trees.get(name)
    }
}
