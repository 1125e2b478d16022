use crate::build::build_trees;
use crate::output_format::{OutputFormat, OutputFormatter};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;
use treeidx_core::{Config, TreeConfig};
use treeidx_engine::{Engine, SearchRequest};

const DEFAULT_CONFIG_PATH: &str = "treeidx.json";

#[derive(Parser)]
#[command(name = "treeidx")]
#[command(about = "Source tree indexer with identifier-aware search")]
#[command(version)]
pub struct Cli {
    /// Config file (default: treeidx.json)
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Output format: human, grep or json
    #[arg(short = 'f', long = "format", global = true, default_value = "human")]
    pub format: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Index trees and publish them [aliases: b]
    #[command(visible_alias = "b")]
    Build {
        /// Trees to build (default: all configured trees)
        trees: Vec<String>,

        /// Show progress
        #[arg(short = 'p', long = "progress")]
        show_progress: bool,
    },

    /// Search a tree [aliases: s]
    #[command(visible_alias = "s")]
    Search {
        /// Query text, e.g. `function:main -path:test`
        query: String,

        /// Tree to search (default: the default tree)
        #[arg(short = 't', long = "tree")]
        tree: Option<String>,

        /// Match case
        #[arg(short = 'C', long = "case")]
        case_sensitive: bool,

        /// Lines to skip
        #[arg(long = "offset", default_value = "0")]
        offset: usize,

        /// Maximum lines (default: 100, at most 1000)
        #[arg(short = 'l', long = "limit")]
        limit: Option<usize>,
    },

    /// Show a folder listing or a file
    Browse {
        /// Path inside the tree (default: the root)
        #[arg(default_value = "")]
        path: String,

        #[arg(short = 't', long = "tree")]
        tree: Option<String>,
    },

    /// Write the stored bytes of a binary file
    Raw {
        path: String,

        /// Output file
        #[arg(short = 'o', long = "output")]
        output: PathBuf,

        #[arg(short = 't', long = "tree")]
        tree: Option<String>,
    },

    /// Where the same path leads in another tree
    Parallel {
        /// Target tree
        tree: String,

        #[arg(default_value = "")]
        path: String,
    },

    /// List the search filters of a tree
    Filters {
        #[arg(short = 't', long = "tree")]
        tree: Option<String>,
    },
}

impl Cli {
    pub fn run(self) -> Result<()> {
        let config_path = self
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        let config = Config::from_file(&config_path)?;
        let format = OutputFormat::from_str(&self.format)?;

        let engine = Engine::open(config)?;
        match self.command {
            Commands::Build { trees, show_progress } => handle_build(&engine, &trees, show_progress),
            Commands::Search {
                query,
                tree,
                case_sensitive,
                offset,
                limit,
            } => {
                let tree = tree_name(&engine, tree)?;
                let request = SearchRequest {
                    q: query,
                    case_sensitive,
                    offset,
                    limit,
                    accept: Some(format.accept_header().to_string()),
                };
                handle_search(&engine, &tree, &request, format)
            }
            Commands::Browse { path, tree } => {
                let tree = tree_name(&engine, tree)?;
                let view = engine.service().browse(&tree, path.trim_matches('/'))?;
                println!("{}", OutputFormatter::new(format).format_browse(&view));
                Ok(())
            }
            Commands::Raw { path, output, tree } => {
                let tree = tree_name(&engine, tree)?;
                let asset = engine.service().raw_asset(&tree, &path)?;
                fs::write(&output, &asset.bytes)
                    .with_context(|| format!("Failed to write {}", output.display()))?;
                println!(
                    "Wrote {} bytes ({}) to {}",
                    asset.bytes.len(),
                    asset.mime.unwrap_or("application/octet-stream"),
                    output.display()
                );
                Ok(())
            }
            Commands::Parallel { tree, path } => {
                println!("{}", engine.service().parallel_path(&tree, &path)?);
                Ok(())
            }
            Commands::Filters { tree } => {
                let tree = tree_name(&engine, tree)?;
                for item in engine.service().filter_menu_items(&tree)? {
                    println!("{:<18} {}", item.name.cyan(), item.description);
                }
                Ok(())
            }
        }
    }
}

fn tree_name(engine: &Engine, tree: Option<String>) -> Result<String> {
    match tree.or_else(|| engine.config().default_tree.clone()) {
        Some(tree) => Ok(tree),
        None => bail!("No tree given and no default tree configured"),
    }
}

fn handle_build(engine: &Engine, names: &[String], show_progress: bool) -> Result<()> {
    let config = engine.config();
    let trees: Vec<&TreeConfig> = if names.is_empty() {
        config.trees.values().collect()
    } else {
        names
            .iter()
            .map(|name| {
                config
                    .tree(name)
                    .with_context(|| format!("No tree named {} in the config", name))
            })
            .collect::<Result<_>>()?
    };

    let start = Instant::now();
    let mut failures = 0;
    for (name, result) in build_trees(&trees, engine.store(), show_progress) {
        match result {
            Ok(summary) => println!(
                "{} {}: {} files, {} folders, {} lines{}",
                "✓".green(),
                name.bold(),
                summary.files,
                summary.folders,
                summary.lines,
                if summary.skipped > 0 {
                    format!(" ({} unreadable files skipped)", summary.skipped)
                } else {
                    String::new()
                }
            ),
            Err(e) => {
                failures += 1;
                eprintln!("{} {}: {:#}", "✗".red(), name.bold(), e);
            }
        }
    }
    println!("Done in {:.2}s", start.elapsed().as_secs_f64());

    if failures > 0 {
        bail!("{} of {} trees failed to build", failures, trees.len());
    }
    Ok(())
}

fn handle_search(
    engine: &Engine,
    tree: &str,
    request: &SearchRequest,
    format: OutputFormat,
) -> Result<()> {
    let response = engine.service().search(tree, request)?;
    let (text, failed) = OutputFormatter::new(format).format_search(&response);
    println!("{}", text);
    if failed {
        bail!("Search failed");
    }
    Ok(())
}
