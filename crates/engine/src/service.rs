//! Request handling for search and browsing.
//!
//! [`Service`] is what an HTTP layer (or the CLI) calls. It resolves the
//! tree, talks to the store and returns view models; turning those into
//! pages is left to the caller.

use crate::error::QueryError;
use crate::negotiate::request_wants_json;
use crate::query::{clamp_limit, DirectHit, Query, SearchResult};
use crate::render::html_line;
use crate::store::{DocumentStore, SortKey, StoreQuery};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};
use treeidx_core::document::base_name;
use treeidx_core::mime::{guess_type, icon, is_image};
use treeidx_core::{
    filter_menu_items, plugins_named, Annotation, Config, DocKind, Link, Tag, TreeConfig,
    TreePlugin,
};

/// Enough for any single folder.
const FOLDER_LISTING_SIZE: usize = 10_000;
/// Enough for any single file.
const FILE_LINES_SIZE: usize = 1_000_000;

/// Another tree offered in the tree switcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeTuple {
    pub name: String,
    pub url: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterItem {
    pub name: &'static str,
    pub description: &'static str,
}

/// Parameters of a search request, already pulled out of the query string.
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub q: String,
    pub case_sensitive: bool,
    pub offset: usize,
    pub limit: Option<usize>,
    /// The raw `Accept` header.
    pub accept: Option<String>,
}

/// Everything a search results page needs.
#[derive(Debug, Clone, Serialize)]
pub struct SearchPage {
    pub www_root: String,
    pub tree: String,
    pub query: String,
    pub is_case_sensitive: bool,
    pub generated_date: Option<String>,
    pub search_url: String,
    pub filters: Vec<FilterItem>,
    pub tree_tuples: Vec<TreeTuple>,
    pub results: Vec<SearchResult>,
    /// Set when the query could not run; the page then shows this instead.
    pub error: Option<String>,
}

enum Outcome {
    Direct(DirectHit),
    Results(Vec<SearchResult>),
}

#[derive(Debug, Clone)]
pub enum SearchResponse {
    Json { status: u16, body: Value },
    Page { status: u16, page: SearchPage },
    Redirect(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Breadcrumb {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FolderEntry {
    pub icon: String,
    pub name: String,
    pub modified: Option<DateTime<Utc>>,
    pub size: Option<u64>,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FolderView {
    pub tree: String,
    pub name: String,
    pub path: String,
    pub breadcrumbs: Vec<Breadcrumb>,
    pub tree_tuples: Vec<TreeTuple>,
    pub filters: Vec<FilterItem>,
    /// Only the tree root grabs keyboard focus for the search box.
    pub should_autofocus_query: bool,
    pub entries: Vec<FolderEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedLine {
    pub number: u32,
    pub html: String,
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileView {
    pub tree: String,
    pub path: String,
    pub name: String,
    pub icon: String,
    pub breadcrumbs: Vec<Breadcrumb>,
    pub tree_tuples: Vec<TreeTuple>,
    pub filters: Vec<FilterItem>,
    /// Sidebar sections ordered by `(order, heading)`.
    pub sections: Vec<Link>,
    /// `None` for images, which are shown from [`Service::raw_asset`].
    pub lines: Option<Vec<RenderedLine>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum BrowseView {
    Folder(FolderView),
    File(FileView),
}

/// Decoded payload of a binary file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAsset {
    pub mime: Option<&'static str>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct FolderDoc {
    path: String,
    name: String,
    is_folder: bool,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct StoredLine {
    number: u32,
    content: String,
    #[serde(default)]
    tags: Vec<Tag>,
    #[serde(default)]
    annotations: Vec<Annotation>,
}

pub struct Service<'a> {
    config: &'a Config,
    store: &'a dyn DocumentStore,
}

impl<'a> Service<'a> {
    pub fn new(config: &'a Config, store: &'a dyn DocumentStore) -> Self {
        Self { config, store }
    }

    fn tree(&self, tree: &str) -> Result<&'a TreeConfig, QueryError> {
        self.config
            .tree(tree)
            .ok_or_else(|| QueryError::NotFound(format!("No such tree as {}", tree)))
    }

    fn plugins(&self, tree: &TreeConfig) -> Result<Vec<Arc<dyn TreePlugin>>, QueryError> {
        Ok(plugins_named(&tree.enabled_plugins)?)
    }

    fn filters(&self, plugins: &[Arc<dyn TreePlugin>]) -> Vec<FilterItem> {
        filter_menu_items(plugins)
            .into_iter()
            .map(|(name, description)| FilterItem { name, description })
            .collect()
    }

    fn source_url(&self, tree: &str, path: &str) -> String {
        format!("{}/{}/source/{}", self.config.www_root, tree, path)
    }

    fn search_url(&self, tree: &str, q: &str, case_sensitive: bool) -> String {
        format!(
            "{}/{}/search?q={}{}",
            self.config.www_root,
            tree,
            urlencoding::encode(q),
            if case_sensitive { "&case=true" } else { "" }
        )
    }

    /// Tree switcher entries pointing at the same search in every tree.
    pub fn tree_tuples(&self, q: &str, case_sensitive: bool) -> Vec<TreeTuple> {
        self.config
            .trees
            .iter()
            .map(|(name, tree)| TreeTuple {
                name: name.clone(),
                url: self.search_url(name, q, case_sensitive),
                description: tree.description.clone(),
            })
            .collect()
    }

    /// Tree switcher entries pointing at the same path in every tree.
    fn parallel_tuples(&self, path: &str) -> Vec<TreeTuple> {
        self.config
            .trees
            .iter()
            .map(|(name, tree)| TreeTuple {
                name: name.clone(),
                url: format!("{}/{}/parallel/{}", self.config.www_root, name, path),
                description: tree.description.clone(),
            })
            .collect()
    }

    /// Links to the tree root and every ancestor folder of `path`.
    pub fn breadcrumbs(&self, tree: &str, path: &str) -> Vec<Breadcrumb> {
        let mut crumbs = vec![Breadcrumb {
            name: tree.to_string(),
            url: self.source_url(tree, ""),
        }];
        let mut prefix = String::new();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(part);
            crumbs.push(Breadcrumb {
                name: part.to_string(),
                url: self.source_url(tree, &prefix),
            });
        }
        crumbs
    }

    /// Filter menu for a tree.
    pub fn filter_menu_items(&self, tree: &str) -> Result<Vec<FilterItem>, QueryError> {
        let plugins = self.plugins(self.tree(tree)?)?;
        Ok(self.filters(&plugins))
    }

    /// Run a search and pick the response form from the `Accept` header.
    ///
    /// HTML clients first get a direct result redirect when the query
    /// names exactly one location. Bad query terms are reported in the
    /// response body with status 400 rather than as an `Err`.
    pub fn search(&self, tree: &str, request: &SearchRequest) -> Result<SearchResponse, QueryError> {
        let tree_config = self.tree(tree)?;
        let plugins = self.plugins(tree_config)?;
        let limit = clamp_limit(request.limit);
        let wants_json = request_wants_json(request.accept.as_deref());
        debug!(
            "Search {} for {:?} (json: {}, offset: {}, limit: {})",
            tree, request.q, wants_json, request.offset, limit
        );

        let outcome = Query::new(self.store, tree, &request.q, &plugins, request.case_sensitive)
            .and_then(|query| -> Result<Outcome, QueryError> {
                if !wants_json {
                    if let Some(hit) = query.direct_result()? {
                        return Ok(Outcome::Direct(hit));
                    }
                }
                query.results(request.offset, limit).map(Outcome::Results)
            });

        let tree_tuples = self.tree_tuples(&request.q, request.case_sensitive);
        let (status, results, error) = match outcome {
            Ok(Outcome::Direct(hit)) => {
                return Ok(SearchResponse::Redirect(format!(
                    "{}?from={}{}#{}",
                    self.source_url(tree, &hit.path),
                    urlencoding::encode(&request.q),
                    if request.case_sensitive { "&case=true" } else { "" },
                    hit.line
                )));
            }
            Ok(Outcome::Results(results)) => (200, results, None),
            Err(e @ (QueryError::BadTerm { .. } | QueryError::Timeout(_))) => {
                warn!("Search {} for {:?} failed: {}", tree, request.q, e);
                (e.status(), Vec::new(), Some(e))
            }
            Err(e) => return Err(e),
        };

        if wants_json {
            let body = match error {
                Some(e) => json!({
                    "error_html": e.reason(),
                    "error_level": if e.status() == 400 { "warning" } else { "error" },
                }),
                None => json!({
                    "www_root": self.config.www_root,
                    "tree": tree,
                    "results": results,
                    "tree_tuples": tree_tuples,
                }),
            };
            return Ok(SearchResponse::Json { status, body });
        }

        Ok(SearchResponse::Page {
            status,
            page: SearchPage {
                www_root: self.config.www_root.clone(),
                tree: tree.to_string(),
                query: request.q.clone(),
                is_case_sensitive: request.case_sensitive,
                generated_date: self.config.generated_date.clone(),
                search_url: self.search_url(tree, &request.q, request.case_sensitive),
                filters: self.filters(&plugins),
                tree_tuples,
                results,
                error: error.map(|e| e.reason()),
            },
        })
    }

    /// A folder listing if `path` is a folder, else the file view.
    pub fn browse(&self, tree: &str, path: &str) -> Result<BrowseView, QueryError> {
        match self.browse_folder(tree, path) {
            Ok(folder) => Ok(BrowseView::Folder(folder)),
            Err(QueryError::NotFound(_)) => self.browse_file(tree, path).map(BrowseView::File),
            Err(e) => Err(e),
        }
    }

    fn icon_class_name(&self, doc: &FolderDoc) -> String {
        if doc.is_folder {
            return "folder".to_string();
        }
        let mut class = icon(&doc.name);
        if doc.size.unwrap_or(0) > self.config.max_thumbnail_size {
            class.push_str(" too_fat");
        }
        class
    }

    /// Entries whose parent folder is `path`: folders first, then by name.
    pub fn browse_folder(&self, tree: &str, path: &str) -> Result<FolderView, QueryError> {
        let tree_config = self.tree(tree)?;
        let query = StoreQuery::term("folder", path)
            .sort(SortKey::Desc("is_folder".into()))
            .sort(SortKey::Asc("name".into()))
            .size(FOLDER_LISTING_SIZE)
            .exclude(&["raw_data", "links", "needles"]);
        let docs = self.store.search(tree, DocKind::File, &query)?;
        if docs.is_empty() {
            return Err(QueryError::NotFound(format!("No folder {} in {}", path, tree)));
        }

        let mut entries = Vec::with_capacity(docs.len());
        for doc in docs {
            let doc: FolderDoc = serde_json::from_value(doc).map_err(crate::error::StoreError::from)?;
            entries.push(FolderEntry {
                icon: self.icon_class_name(&doc),
                url: self.source_url(tree, &doc.path),
                name: doc.name,
                modified: doc.modified,
                size: doc.size,
            });
        }

        let plugins = self.plugins(tree_config)?;
        Ok(FolderView {
            tree: tree.to_string(),
            name: if path.is_empty() {
                tree.to_string()
            } else {
                base_name(path)
            },
            path: path.to_string(),
            breadcrumbs: self.breadcrumbs(tree, path),
            tree_tuples: self.parallel_tuples(path),
            filters: self.filters(&plugins),
            should_autofocus_query: path.is_empty(),
            entries,
        })
    }

    /// A source file with its rendered lines and sidebar sections.
    pub fn browse_file(&self, tree: &str, path: &str) -> Result<FileView, QueryError> {
        let tree_config = self.tree(tree)?;
        let files = self.store.search(
            tree,
            DocKind::File,
            &StoreQuery::term("path", path).include(&["links"]),
        )?;
        let Some(file) = files.into_iter().next() else {
            return Err(QueryError::NotFound(format!("No file {} in {}", path, tree)));
        };
        let mut sections: Vec<Link> = match file.get("links") {
            Some(links) => serde_json::from_value(links.clone())
                .map_err(crate::error::StoreError::from)?,
            None => Vec::new(),
        };
        sections.sort_by(|a, b| (a.order, &a.heading).cmp(&(b.order, &b.heading)));

        let lines = if is_image(path) {
            None
        } else {
            let query = StoreQuery::term("path", path)
                .sort(SortKey::Asc("number".into()))
                .size(FILE_LINES_SIZE)
                .include(&["number", "content", "tags", "annotations"]);
            let mut rendered = Vec::new();
            for doc in self.store.search(tree, DocKind::Line, &query)? {
                let line: StoredLine =
                    serde_json::from_value(doc).map_err(crate::error::StoreError::from)?;
                rendered.push(RenderedLine {
                    number: line.number,
                    html: html_line(&line.content, &line.tags),
                    annotations: line.annotations,
                });
            }
            Some(rendered)
        };

        let plugins = self.plugins(tree_config)?;
        Ok(FileView {
            tree: tree.to_string(),
            path: path.to_string(),
            name: base_name(path),
            icon: icon(path),
            breadcrumbs: self.breadcrumbs(tree, path),
            tree_tuples: self.parallel_tuples(path),
            filters: self.filters(&plugins),
            sections,
            lines,
        })
    }

    /// The stored bytes of a binary file, such as an image.
    pub fn raw_asset(&self, tree: &str, path: &str) -> Result<RawAsset, QueryError> {
        self.tree(tree)?;
        let files = self.store.search(
            tree,
            DocKind::File,
            &StoreQuery::term("path", path).include(&["raw_data"]),
        )?;
        let data = files
            .first()
            .and_then(|file| file.get("raw_data"))
            .and_then(Value::as_str)
            .ok_or_else(|| QueryError::NotFound(format!("No raw data for {} in {}", path, tree)))?;
        let bytes = STANDARD.decode(data).map_err(|e| {
            warn!("Undecodable raw data for {}: {}", path, e);
            QueryError::NotFound(format!("No raw data for {} in {}", path, tree))
        })?;
        Ok(RawAsset {
            mime: guess_type(path),
            bytes,
        })
    }

    /// Where "the same path in another tree" leads: the path itself if the
    /// tree has it, otherwise that tree's root.
    pub fn parallel_path(&self, tree: &str, path: &str) -> Result<String, QueryError> {
        self.tree(tree)?;
        let files = self.store.search(
            tree,
            DocKind::File,
            &StoreQuery::term("path", path.trim_end_matches('/')).include(&[]),
        )?;
        Ok(if files.is_empty() {
            self.source_url(tree, "")
        } else {
            self.source_url(tree, path)
        })
    }

    /// Browse URL of a tree's root, once the tree has been indexed.
    pub fn tree_root(&self, tree: &str) -> Result<String, QueryError> {
        self.tree(tree)?;
        if self.store.resolve_alias(tree)?.is_none() {
            return Err(QueryError::NotFound(format!("{} has not been indexed", tree)));
        }
        Ok(self.source_url(tree, ""))
    }

    /// Landing URL: the default tree's root.
    pub fn index_url(&self) -> Result<String, QueryError> {
        let tree = self
            .config
            .default_tree
            .as_deref()
            .ok_or_else(|| QueryError::NotFound("No trees are configured".into()))?;
        Ok(self.source_url(tree, ""))
    }
}
