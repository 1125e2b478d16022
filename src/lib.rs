//! treeidx: source tree indexing and search.
//!
//! The indexing pipeline lives in [`treeidx_core`], the store and query
//! engine in [`treeidx_engine`]; this crate re-exports both.

pub use treeidx_core;
pub use treeidx_engine;

// Re-export commonly used types
pub use treeidx_core::{Config, DocKind, FileDocument, LineDocument, TreeConfig};
pub use treeidx_engine::{Engine, QueryError, SearchRequest, SearchResponse, Service, SledStore};
