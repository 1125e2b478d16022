//! C and C++ indexing through a clang compiler plugin.
//!
//! The build is run with `CC`/`CXX` pointing at clang with our analyzer
//! loaded. The analyzer writes one CSV dump per translation unit into the
//! plugin's temp folder, which post-build condenses into per-file tables.

use super::{Environment, FilterKind, FilterSpec, TreePlugin};
use crate::condensed::{load_dumps, CondensedTable, Location};
use crate::error::IndexError;
use crate::file_index::{Annotation, FileIndexerFactory, FileToIndex, LineRef, RefTarget};
use crate::inheritance::InheritanceGraph;
use crate::needle::{needles_by_line, validate_rules, Needle, CLANG_NEEDLE_RULES};
use crate::tree::TreeConfig;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub const CLANG_PLUGIN_NAME: &str = "clang";
const PLUGIN_LIBRARY: &str = "libclang-index-plugin.so";

static CLANG_FILTERS: &[FilterSpec] = &[
    FilterSpec::new("function", "Function or method definition: function:foo", FilterKind::Needle { field: "function" }),
    FilterSpec::new("var", "Variable definition", FilterKind::Needle { field: "variable" }),
    FilterSpec::new("type", "Typedef definition", FilterKind::Needle { field: "typedef" }),
    FilterSpec::new("macro", "Macro definition", FilterKind::Needle { field: "macro" }),
    FilterSpec::new("namespace", "Namespace definition", FilterKind::Needle { field: "namespace" }),
    FilterSpec::new("namespace-alias", "Namespace alias", FilterKind::Needle { field: "namespace-alias" }),
];

#[derive(Debug, Clone, Copy)]
pub struct ClangPlugin;

impl ClangPlugin {
    /// Fails if the needle rule table is inconsistent.
    pub fn new() -> Result<Self, IndexError> {
        validate_rules(CLANG_NEEDLE_RULES)?;
        Ok(Self)
    }

    fn compiler_flags(tree: &TreeConfig) -> String {
        let library = tree.plugin_folder.join(CLANG_PLUGIN_NAME).join(PLUGIN_LIBRARY);
        let flags = [
            "-load".to_string(),
            library.display().to_string(),
            "-add-plugin".to_string(),
            "dxr-index".to_string(),
            "-plugin-arg-dxr-index".to_string(),
            tree.source_folder.display().to_string(),
        ];
        flags
            .iter()
            .map(|flag| format!("-Xclang {}", flag))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl TreePlugin for ClangPlugin {
    fn name(&self) -> &'static str {
        CLANG_PLUGIN_NAME
    }

    fn filters(&self) -> &'static [FilterSpec] {
        CLANG_FILTERS
    }

    fn env_setup(&self, tree: &TreeConfig, mut vars: Environment) -> Result<Environment, IndexError> {
        let library = tree.plugin_folder.join(CLANG_PLUGIN_NAME).join(PLUGIN_LIBRARY);
        if !library.is_file() {
            return Err(IndexError::BuildEnvironment(format!(
                "clang analyzer not found at {}",
                library.display()
            )));
        }

        let flags = Self::compiler_flags(tree);
        let cc = format!("clang {}", flags);
        let cxx = format!("clang++ {}", flags);
        vars.insert("CC".into(), cc.clone());
        vars.insert("CXX".into(), cxx.clone());
        vars.insert("DXR_CC".into(), cc);
        vars.insert("DXR_CXX".into(), cxx);
        vars.insert("DXR_CLANG_FLAGS".into(), flags);
        vars.insert(
            "DXR_CXX_CLANG_OBJECT_FOLDER".into(),
            tree.object_folder.display().to_string(),
        );
        vars.insert(
            "DXR_CXX_CLANG_TEMP_FOLDER".into(),
            tree.plugin_temp_folder(CLANG_PLUGIN_NAME).display().to_string(),
        );
        Ok(vars)
    }

    fn post_build(&self, tree: &TreeConfig) -> Result<Arc<dyn FileIndexerFactory>, IndexError> {
        let dumps = load_dumps(&tree.plugin_temp_folder(CLANG_PLUGIN_NAME), &tree.source_folder);
        let inherit = InheritanceGraph::build(&dumps.tables);
        info!(
            "clang: {} files analyzed, {} classes with parents, {} unreadable dumps",
            dumps.tables.len(),
            inherit.len(),
            dumps.failures.len()
        );

        Ok(Arc::new(ClangFactory {
            tables: dumps
                .tables
                .into_iter()
                .map(|(path, table)| (path, Arc::new(table)))
                .collect(),
            inherit: Arc::new(inherit),
        }))
    }
}

struct ClangFactory {
    tables: BTreeMap<String, Arc<CondensedTable>>,
    inherit: Arc<InheritanceGraph>,
}

impl FileIndexerFactory for ClangFactory {
    fn file_indexer(&self, path: &str, _contents: &str, tree: &TreeConfig) -> Box<dyn FileToIndex> {
        let table = self.tables.get(path).cloned();
        if table.is_none() {
            debug!("clang: no analyzer output for {}", path);
        }
        Box::new(ClangFileToIndex::new(
            table,
            self.inherit.clone(),
            &tree.source_folder,
        ))
    }
}

/// Facts about one C/C++ file. Without a condensed table every method
/// returns nothing.
pub struct ClangFileToIndex {
    condensed: Option<Arc<CondensedTable>>,
    inherit: Arc<InheritanceGraph>,
    source_root: PathBuf,
}

impl ClangFileToIndex {
    pub fn new(
        condensed: Option<Arc<CondensedTable>>,
        inherit: Arc<InheritanceGraph>,
        source_root: &Path,
    ) -> Self {
        Self {
            condensed,
            inherit,
            source_root: source_root.to_path_buf(),
        }
    }

    fn target(&self, qualname: &str, raw_location: Option<&str>) -> Option<RefTarget> {
        let location = Location::parse(raw_location?)?;
        let path = Path::new(&location.path)
            .strip_prefix(&self.source_root)
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or(location.path);
        Some(RefTarget {
            qualname: qualname.to_string(),
            path,
            line: location.line,
        })
    }
}

impl FileToIndex for ClangFileToIndex {
    fn needles(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    fn needles_by_line(&self) -> Vec<Needle> {
        match &self.condensed {
            Some(table) => needles_by_line(table, CLANG_NEEDLE_RULES),
            None => Vec::new(),
        }
    }

    fn refs_by_line(&self) -> Vec<LineRef> {
        let Some(table) = &self.condensed else {
            return Vec::new();
        };
        let refs = table.records("ref").iter().filter_map(|record| {
            let target = self.target(record.qualname(), record.attr("declloc"))?;
            Some(LineRef {
                span: record.span,
                kind: record.attr("kind").unwrap_or("ref").to_string(),
                target,
            })
        });
        let decldefs = table.records("decldef").iter().filter_map(|record| {
            let target = self.target(record.qualname(), record.attr("defloc"))?;
            Some(LineRef {
                span: record.span,
                kind: "definition".to_string(),
                target,
            })
        });
        let mut all: Vec<LineRef> = refs.chain(decldefs).collect();
        all.sort_by_key(|r| r.span);
        all
    }

    fn annotations_by_line(&self) -> Vec<Annotation> {
        let Some(table) = &self.condensed else {
            return Vec::new();
        };
        let mut annotations = Vec::new();
        for record in table.records("type") {
            let qualname = record.qualname();
            let parents: Vec<&str> = self.inherit.parents(qualname).collect();
            if !parents.is_empty() {
                annotations.push(Annotation {
                    line: record.span.line,
                    title: format!("Inherits from {}", parents.join(", ")),
                    class: "inherits".into(),
                });
            }
            let children = self.inherit.children(qualname);
            if !children.is_empty() {
                annotations.push(Annotation {
                    line: record.span.line,
                    title: format!("Extended by {}", children.join(", ")),
                    class: "extended".into(),
                });
            }
        }
        for record in table.records("function") {
            if let Some(overridden) = record.attr("overridename") {
                annotations.push(Annotation {
                    line: record.span.line,
                    title: format!("Overrides {}", overridden),
                    class: "overrides".into(),
                });
            }
        }
        annotations.sort_by(|a, b| a.line.cmp(&b.line));
        annotations
    }
}
