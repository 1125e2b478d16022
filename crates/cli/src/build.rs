//! Building and publishing trees.
//!
//! A build drives every enabled plugin through its phases, runs the tree's
//! build command in between, indexes the source walk into a fresh store
//! generation and only then points the tree's alias at it. Anything that
//! fails before the alias swap leaves the previously published generation
//! untouched.

use crate::source_walk::{collect_entries, SourceEntry};
use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde_json::Value;
use std::fs;
use std::process::Command;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use treeidx_core::document::index_text_file;
use treeidx_core::mime::is_image;
use treeidx_core::plugins::Environment;
use treeidx_core::{
    plugins_named, DocKind, FileDocument, FileIndexerFactory, FileToIndex, LineDocument,
    PhaseInput, PhaseOutput, TreeConfig, TreeIndexer,
};
use treeidx_engine::DocumentStore;

/// Documents are written in chunks of this many.
const WRITE_CHUNK: usize = 2048;

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub show_progress: bool,
    /// Shared progress display when several trees build at once.
    pub progress: Option<MultiProgress>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSummary {
    pub tree: String,
    pub generation: String,
    pub folders: usize,
    pub files: usize,
    pub lines: usize,
    /// Files that could not be read and were left out.
    pub skipped: usize,
    /// The generation this build replaced, already dropped.
    pub replaced: Option<String>,
}

/// Documents produced for one walk entry.
enum Indexed {
    Folder(FileDocument),
    File(FileDocument, Vec<LineDocument>),
    Skipped,
}

/// Run every plugin's env setup, chaining the environment through them.
fn setup_environment(indexers: &mut [TreeIndexer], tree: &TreeConfig) -> Result<Environment> {
    let mut env: Environment = std::env::vars().collect();
    for indexer in indexers.iter_mut() {
        let plugin = indexer.plugin_name();
        env = match indexer
            .resume(PhaseInput::EnvSetup(env))
            .with_context(|| format!("Environment setup of {} failed for tree {}", plugin, tree.name))?
        {
            PhaseOutput::Environment(next) => next,
            other => bail!("{} plugin answered env setup with {:?}", plugin, other),
        };
    }
    Ok(env)
}

fn advance(indexers: &mut [TreeIndexer], input: PhaseInput) -> Result<()> {
    for indexer in indexers.iter_mut() {
        indexer
            .resume(input.clone())
            .with_context(|| format!("{} plugin failed", indexer.plugin_name()))?;
    }
    Ok(())
}

/// Fresh scratch folders for the build and its analyzers.
fn prepare_folders(tree: &TreeConfig, indexers: &[TreeIndexer]) -> Result<()> {
    fs::create_dir_all(&tree.object_folder)
        .with_context(|| format!("Failed to create {}", tree.object_folder.display()))?;
    for indexer in indexers {
        let folder = tree.plugin_temp_folder(indexer.plugin_name());
        if folder.exists() {
            fs::remove_dir_all(&folder)
                .with_context(|| format!("Failed to clear {}", folder.display()))?;
        }
        fs::create_dir_all(&folder)
            .with_context(|| format!("Failed to create {}", folder.display()))?;
    }
    Ok(())
}

fn run_build_command(tree: &TreeConfig, env: &Environment) -> Result<()> {
    let Some(command) = tree.build_command.as_deref() else {
        debug!("Tree {} has no build command", tree.name);
        return Ok(());
    };
    info!("Building {}: {}", tree.name, command);
    let status = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(&tree.object_folder)
        .env_clear()
        .envs(env)
        .status()
        .with_context(|| format!("Failed to start build command for tree {}", tree.name))?;
    if !status.success() {
        bail!("Build command for tree {} failed with {}", tree.name, status);
    }
    Ok(())
}

/// Drive the plugins to `PostBuild` and collect their file indexer factories.
fn run_phases(tree: &Arc<TreeConfig>) -> Result<Vec<Arc<dyn FileIndexerFactory>>> {
    let plugins = plugins_named(&tree.enabled_plugins)
        .with_context(|| format!("Bad plugin list for tree {}", tree.name))?;
    let mut indexers: Vec<TreeIndexer> = plugins
        .into_iter()
        .map(|plugin| TreeIndexer::new(plugin, tree.clone()))
        .collect();

    let env = setup_environment(&mut indexers, tree)?;
    prepare_folders(tree, &indexers)?;
    advance(&mut indexers, PhaseInput::PreBuild)?;
    advance(&mut indexers, PhaseInput::Build)?;
    run_build_command(tree, &env)?;

    let mut factories = Vec::with_capacity(indexers.len());
    for indexer in indexers.iter_mut() {
        match indexer
            .resume(PhaseInput::PostBuild)
            .with_context(|| format!("Post-build of {} failed", indexer.plugin_name()))?
        {
            PhaseOutput::Ready(factory) => factories.push(factory),
            other => bail!("{} plugin answered post-build with {:?}", indexer.plugin_name(), other),
        }
    }
    Ok(factories)
}

fn index_entry(
    entry: &SourceEntry,
    tree: &TreeConfig,
    factories: &[Arc<dyn FileIndexerFactory>],
) -> Indexed {
    if entry.is_dir {
        return Indexed::Folder(FileDocument::folder(&entry.path, entry.modified));
    }

    let bytes = match fs::read(&entry.absolute) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Skipping {}: {}", entry.path, e);
            return Indexed::Skipped;
        }
    };
    let mut file = FileDocument::file(&entry.path, bytes.len() as u64, entry.modified);

    if is_image(&entry.path) {
        file.raw_data = Some(STANDARD.encode(&bytes));
        return Indexed::File(file, Vec::new());
    }
    if bytes.contains(&0) {
        debug!("{} looks binary; indexing its name only", entry.path);
        return Indexed::File(file, Vec::new());
    }

    let contents = String::from_utf8_lossy(&bytes);
    let indexers: Vec<Box<dyn FileToIndex>> = factories
        .iter()
        .map(|factory| factory.file_indexer(&entry.path, &contents, tree))
        .collect();
    let indexed = index_text_file(file, &contents, &indexers);
    Indexed::File(indexed.file, indexed.lines)
}

struct GenerationCounts {
    folders: usize,
    files: usize,
    lines: usize,
    skipped: usize,
}

fn write_chunked<T: serde::Serialize>(
    store: &dyn DocumentStore,
    generation: &str,
    kind: DocKind,
    docs: &[T],
) -> Result<()> {
    for chunk in docs.chunks(WRITE_CHUNK) {
        let values = chunk
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<Value>, _>>()?;
        store.index(generation, kind, &values)?;
    }
    Ok(())
}

fn fill_generation(
    tree: &TreeConfig,
    store: &dyn DocumentStore,
    generation: &str,
    factories: &[Arc<dyn FileIndexerFactory>],
    progress: Option<&ProgressBar>,
) -> Result<GenerationCounts> {
    let entries = collect_entries(tree)?;
    if let Some(pb) = progress {
        pb.set_length(entries.len() as u64);
    }

    let indexed: Vec<Indexed> = entries
        .par_iter()
        .map(|entry| {
            let result = index_entry(entry, tree, factories);
            if let Some(pb) = progress {
                pb.inc(1);
            }
            result
        })
        .collect();

    let mut counts = GenerationCounts {
        folders: 0,
        files: 0,
        lines: 0,
        skipped: 0,
    };
    let mut file_docs = Vec::new();
    let mut line_docs = Vec::new();
    for item in indexed {
        match item {
            Indexed::Folder(doc) => {
                counts.folders += 1;
                file_docs.push(doc);
            }
            Indexed::File(doc, lines) => {
                counts.files += 1;
                counts.lines += lines.len();
                file_docs.push(doc);
                line_docs.extend(lines);
            }
            Indexed::Skipped => counts.skipped += 1,
        }
        if line_docs.len() >= WRITE_CHUNK {
            write_chunked(store, generation, DocKind::Line, &line_docs)?;
            line_docs.clear();
        }
    }

    if counts.files == 0 {
        bail!("No files were indexed for tree {}", tree.name);
    }
    write_chunked(store, generation, DocKind::Line, &line_docs)?;
    write_chunked(store, generation, DocKind::File, &file_docs)?;
    Ok(counts)
}

fn progress_bar(tree: &str, options: &BuildOptions) -> Option<ProgressBar> {
    if !options.show_progress {
        return None;
    }
    let pb = ProgressBar::new(0);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.set_message(format!("Indexing {}", tree));
    Some(match &options.progress {
        Some(multi) => multi.add(pb),
        None => pb,
    })
}

/// Build one tree and publish it under its name.
pub fn build_tree(
    tree: &TreeConfig,
    store: &dyn DocumentStore,
    options: &BuildOptions,
) -> Result<BuildSummary> {
    let start = Instant::now();
    tree.validate()?;
    let tree = Arc::new(tree.clone());

    let factories = run_phases(&tree)?;

    let generation = store.create_generation(&tree.name)?;
    let progress = progress_bar(&tree.name, options);
    let filled = fill_generation(&tree, store, &generation, &factories, progress.as_ref());
    if let Some(pb) = &progress {
        pb.finish_and_clear();
    }
    let counts = match filled {
        Ok(counts) => counts,
        Err(e) => {
            if let Err(drop_err) = store.drop_generation(&generation) {
                warn!("Failed to drop abandoned generation {}: {}", generation, drop_err);
            }
            return Err(e);
        }
    };

    let replaced = store.publish(&tree.name, &generation)?;
    // The new generation is live; a stale one left behind is only wasted space.
    if let Some(previous) = replaced.as_deref().filter(|p| *p != generation) {
        if let Err(e) = store.drop_generation(previous) {
            warn!("Failed to drop replaced generation {}: {}", previous, e);
        }
    }
    info!(
        "Indexed {} ({} files, {} lines) in {:.2}s",
        tree.name,
        counts.files,
        counts.lines,
        start.elapsed().as_secs_f64()
    );

    Ok(BuildSummary {
        tree: tree.name.clone(),
        generation,
        folders: counts.folders,
        files: counts.files,
        lines: counts.lines,
        skipped: counts.skipped,
        replaced,
    })
}

/// Build several trees concurrently; one tree failing does not stop the
/// others. Results come back in the order of `trees`.
pub fn build_trees(
    trees: &[&TreeConfig],
    store: &dyn DocumentStore,
    show_progress: bool,
) -> Vec<(String, Result<BuildSummary>)> {
    let options = BuildOptions {
        show_progress,
        progress: show_progress.then(MultiProgress::new),
    };
    trees
        .par_iter()
        .map(|tree| (tree.name.clone(), build_tree(tree, store, &options)))
        .collect()
}
