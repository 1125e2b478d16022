//! CLI and IO Layer
//!
//! This crate provides the command-line interface and the build
//! orchestration that walks source trees and publishes them to the store.

// CLI components
pub mod build;
pub mod cli;
pub mod output_format;

// Source walking
pub mod source_walk;

// Re-exports
pub use build::{build_tree, build_trees, BuildOptions, BuildSummary};
pub use cli::Cli;
pub use source_walk::{collect_entries, SourceEntry};
