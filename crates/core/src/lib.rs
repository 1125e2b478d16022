//! treeidx core library
//!
//! Turns analyzer output into condensed symbol tables, needles and the
//! FILE/LINE documents that searches run against.

pub mod condensed;
pub mod document;
pub mod error;
pub mod file_index;
pub mod inheritance;
pub mod mime;
pub mod needle;
pub mod plugins;
pub mod tree;
pub mod tree_indexer;

// Re-export main types
pub use condensed::{CondensedTable, Span, SymbolRecord};
pub use document::{DocKind, FileDocument, IndexedFile, LineDocument, Link, LinkItem, Tag};
pub use error::IndexError;
pub use file_index::{Annotation, FileIndexerFactory, FileToIndex, LineRef, RefTarget};
pub use inheritance::InheritanceGraph;
pub use needle::{Needle, NeedleRule};
pub use plugins::{filter_menu_items, plugins_named, FilterKind, FilterSpec, TreePlugin};
pub use tree::{Config, TreeConfig};
pub use tree_indexer::{Phase, PhaseInput, PhaseOutput, TreeIndexer};
