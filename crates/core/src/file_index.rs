//! Per-file indexing contract implemented by every plugin.

use crate::condensed::Span;
use crate::needle::Needle;
use crate::tree::TreeConfig;
use serde::{Deserialize, Serialize};

/// Where a reference jumps to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefTarget {
    pub qualname: String,
    pub path: String,
    pub line: u32,
}

/// A cross-reference placed on a line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRef {
    pub span: Span,
    pub kind: String,
    pub target: RefTarget,
}

/// Rendering metadata attached to a whole line, e.g. an inheritance badge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub line: u32,
    pub title: String,
    pub class: String,
}

/// What a plugin knows about one source file.
pub trait FileToIndex: Send {
    /// Facts about the file as a whole.
    fn needles(&self) -> Vec<(String, String)>;

    /// Facts positioned on lines.
    fn needles_by_line(&self) -> Vec<Needle>;

    fn refs_by_line(&self) -> Vec<LineRef>;

    fn annotations_by_line(&self) -> Vec<Annotation>;
}

/// Builds configured file indexers once a tree's post-build phase is over.
pub trait FileIndexerFactory: Send + Sync {
    fn file_indexer(&self, path: &str, contents: &str, tree: &TreeConfig) -> Box<dyn FileToIndex>;
}

/// Indexer that knows nothing about its file.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyFileIndex;

impl FileToIndex for EmptyFileIndex {
    fn needles(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    fn needles_by_line(&self) -> Vec<Needle> {
        Vec::new()
    }

    fn refs_by_line(&self) -> Vec<LineRef> {
        Vec::new()
    }

    fn annotations_by_line(&self) -> Vec<Annotation> {
        Vec::new()
    }
}
