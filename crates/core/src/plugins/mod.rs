//! Indexing plugins and the registry that selects them by name.

mod clang;
mod builtin;

pub use clang::{ClangFileToIndex, ClangPlugin, CLANG_PLUGIN_NAME};
pub use builtin::{CorePlugin, CORE_PLUGIN_NAME};

use crate::error::IndexError;
use crate::file_index::FileIndexerFactory;
use crate::tree::TreeConfig;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Environment variables handed to the external build.
pub type Environment = BTreeMap<String, String>;

/// How a search filter matches a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    /// Substring of the line content.
    Text,
    /// Substring of the file path.
    Path,
    /// File extension.
    Ext,
    /// Regular expression over the line content.
    Regexp,
    /// Needles of `field`; qualified arguments use `<field>-qualname`.
    Needle { field: &'static str },
}

/// A filter a plugin contributes to the query language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: FilterKind,
}

impl FilterSpec {
    pub const fn new(name: &'static str, description: &'static str, kind: FilterKind) -> Self {
        Self {
            name,
            description,
            kind,
        }
    }
}

/// A tree-level plugin. The phases in between are driven by
/// [`crate::tree_indexer::TreeIndexer`].
pub trait TreePlugin: Send + Sync {
    fn name(&self) -> &'static str;

    /// Filters offered to searches of trees that enable this plugin.
    fn filters(&self) -> &'static [FilterSpec];

    /// Overlay merged into the external build's environment. Must not touch
    /// the filesystem beyond checking that required inputs exist.
    fn env_setup(&self, tree: &TreeConfig, vars: Environment) -> Result<Environment, IndexError>;

    /// Runs after the external build; returns the per-file indexer factory.
    fn post_build(&self, tree: &TreeConfig) -> Result<Arc<dyn FileIndexerFactory>, IndexError>;
}

/// Resolve plugin names. The core plugin is always present and comes first.
pub fn plugins_named(names: &[String]) -> Result<Vec<Arc<dyn TreePlugin>>, IndexError> {
    let mut plugins: Vec<Arc<dyn TreePlugin>> = vec![Arc::new(CorePlugin)];
    for name in names {
        match name.as_str() {
            CORE_PLUGIN_NAME => {}
            CLANG_PLUGIN_NAME => plugins.push(Arc::new(ClangPlugin::new()?)),
            other => {
                return Err(IndexError::Configuration(format!(
                    "unknown plugin {}",
                    other
                )))
            }
        }
    }
    Ok(plugins)
}

/// `(name, description)` pairs for the search filter menu, in plugin order.
pub fn filter_menu_items(plugins: &[Arc<dyn TreePlugin>]) -> Vec<(&'static str, &'static str)> {
    plugins
        .iter()
        .flat_map(|plugin| plugin.filters().iter())
        .map(|filter| (filter.name, filter.description))
        .collect()
}
