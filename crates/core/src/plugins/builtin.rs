use super::{Environment, FilterKind, FilterSpec, TreePlugin};
use crate::error::IndexError;
use crate::file_index::{EmptyFileIndex, FileIndexerFactory, FileToIndex};
use crate::tree::TreeConfig;
use std::sync::Arc;

pub const CORE_PLUGIN_NAME: &str = "core";

static CORE_FILTERS: &[FilterSpec] = &[
    FilterSpec::new("text", "Full-text search of line contents", FilterKind::Text),
    FilterSpec::new("path", "File or directory sub-path to search within", FilterKind::Path),
    FilterSpec::new("ext", "Filename extension: ext:cpp", FilterKind::Ext),
    FilterSpec::new("regexp", "Regular expression: regexp:^foo(bar)?", FilterKind::Regexp),
];

/// Path and text filters every tree has. Contributes no per-file facts.
#[derive(Debug, Default, Clone, Copy)]
pub struct CorePlugin;

struct CoreFactory;

impl FileIndexerFactory for CoreFactory {
    fn file_indexer(&self, _path: &str, _contents: &str, _tree: &TreeConfig) -> Box<dyn FileToIndex> {
        Box::new(EmptyFileIndex)
    }
}

impl TreePlugin for CorePlugin {
    fn name(&self) -> &'static str {
        CORE_PLUGIN_NAME
    }

    fn filters(&self) -> &'static [FilterSpec] {
        CORE_FILTERS
    }

    fn env_setup(&self, _tree: &TreeConfig, vars: Environment) -> Result<Environment, IndexError> {
        Ok(vars)
    }

    fn post_build(&self, _tree: &TreeConfig) -> Result<Arc<dyn FileIndexerFactory>, IndexError> {
        Ok(Arc::new(CoreFactory))
    }
}
