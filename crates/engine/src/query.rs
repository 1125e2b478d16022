//! Query execution against one tree's published generation

use crate::error::{QueryError, StoreError};
use crate::store::{DocumentStore, StoreQuery};
use crate::terms::{parse, CompiledTerm, LineHit, Term};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;
use treeidx_core::mime::icon;
use treeidx_core::{DocKind, FilterKind, FilterSpec, TreePlugin};

/// Lines returned when the caller gives no limit.
pub const DEFAULT_LIMIT: usize = 100;
/// Upper bound on lines per request, whatever the caller asks for.
pub const MAX_LIMIT: usize = 1000;
/// Time budget for scanning a generation.
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Apply the default and the server-side cap.
pub fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT)
}

/// A matching line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultLine {
    pub line_number: u32,
    pub line: String,
}

/// Matching lines of one file, in line order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub icon: String,
    pub path: String,
    pub lines: Vec<ResultLine>,
}

/// Where a direct result points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectHit {
    pub path: String,
    pub line: u32,
}

/// A parsed query bound to a store alias.
///
/// The time budget starts when the query is built and covers every scan it
/// runs, so a direct-result lookup followed by a search share one budget.
pub struct Query<'a> {
    store: &'a dyn DocumentStore,
    alias: &'a str,
    terms: Vec<Term>,
    filters: Vec<FilterSpec>,
    case_sensitive: bool,
    timeout: Duration,
    deadline: Instant,
}

impl<'a> Query<'a> {
    /// Parse `text` with the filters of `plugins`.
    pub fn new(
        store: &'a dyn DocumentStore,
        alias: &'a str,
        text: &str,
        plugins: &[Arc<dyn TreePlugin>],
        case_sensitive: bool,
    ) -> Result<Self, QueryError> {
        let filters: Vec<FilterSpec> = plugins
            .iter()
            .flat_map(|plugin| plugin.filters().iter().copied())
            .collect();
        let terms = parse(text, &filters)?;
        Ok(Self {
            store,
            alias,
            terms,
            filters,
            case_sensitive,
            timeout: QUERY_TIMEOUT,
            deadline: Instant::now() + QUERY_TIMEOUT,
        })
    }

    /// Replace the budget; it is counted from now.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self.deadline = Instant::now() + timeout;
        self
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    fn compiled(&self) -> Result<Vec<CompiledTerm>, QueryError> {
        self.terms
            .iter()
            .map(|term| CompiledTerm::compile(term, self.case_sensitive))
            .collect()
    }

    /// Visit LINE documents under the time budget. `visit` returns whether
    /// to keep going.
    fn scan_lines(&self, visit: &mut dyn FnMut(LineHit) -> bool) -> Result<(), QueryError> {
        let mut corrupt = None;
        let finished = self.store.scan(self.alias, DocKind::Line, Some(self.deadline), &mut |doc| {
            match serde_json::from_value::<LineHit>(doc) {
                Ok(hit) => visit(hit),
                Err(e) => {
                    corrupt = Some(e);
                    false
                }
            }
        })?;
        if let Some(e) = corrupt {
            return Err(StoreError::from(e).into());
        }
        if !finished {
            return Err(QueryError::Timeout(self.timeout));
        }
        Ok(())
    }

    /// Matching lines grouped by file. `offset` and `limit` count lines;
    /// `limit` is capped at [`MAX_LIMIT`]. An empty query matches nothing.
    pub fn results(&self, offset: usize, limit: usize) -> Result<Vec<SearchResult>, QueryError> {
        let compiled = self.compiled()?;
        let limit = limit.min(MAX_LIMIT);
        if compiled.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let mut skipped = 0;
        let mut hits: Vec<LineHit> = Vec::new();
        self.scan_lines(&mut |hit| {
            if !compiled.iter().all(|term| term.matches(&hit)) {
                return true;
            }
            if skipped < offset {
                skipped += 1;
                return true;
            }
            hits.push(hit);
            hits.len() < limit
        })?;

        let mut results: Vec<SearchResult> = Vec::new();
        for hit in hits {
            let line = ResultLine {
                line_number: hit.number,
                line: hit.content,
            };
            match results.last_mut() {
                Some(last) if last.path == hit.path => last.lines.push(line),
                _ => results.push(SearchResult {
                    icon: icon(&hit.path),
                    path: hit.path,
                    lines: vec![line],
                }),
            }
        }
        Ok(results)
    }

    fn needle_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        for filter in &self.filters {
            if let FilterKind::Needle { field } = filter.kind {
                if !fields.contains(&field) {
                    fields.push(field);
                }
            }
        }
        fields
    }

    /// A single unambiguous location for the query, if there is one.
    ///
    /// Only a lone plain-text term qualifies. Identifiers are looked up in
    /// the qualified-name needles first, then the plain-name needles; any
    /// term is finally tried as an exact file path. A lookup with more
    /// than one hit is ambiguous and yields `None`.
    pub fn direct_result(&self) -> Result<Option<DirectHit>, QueryError> {
        let [term] = self.terms.as_slice() else {
            return Ok(None);
        };
        if !term.is_plain_text() {
            return Ok(None);
        }

        if is_identifier(&term.arg) {
            let fields = self.needle_fields();
            let qualified: Vec<CompiledTerm> = fields
                .iter()
                .map(|field| CompiledTerm::needle(field, true, &term.arg, self.case_sensitive))
                .collect();
            let plain: Vec<CompiledTerm> = fields
                .iter()
                .map(|field| CompiledTerm::needle(field, false, &term.arg, self.case_sensitive))
                .collect();

            let mut by_qualname = BTreeSet::new();
            let mut by_name = BTreeSet::new();
            if !fields.is_empty() {
                self.scan_lines(&mut |hit| {
                    if qualified.iter().any(|m| m.matches(&hit)) {
                        by_qualname.insert((hit.path.clone(), hit.number));
                    }
                    if plain.iter().any(|m| m.matches(&hit)) {
                        by_name.insert((hit.path, hit.number));
                    }
                    true
                })?;
            }

            for (pass, hits) in [("qualname", &by_qualname), ("name", &by_name)] {
                match hits.len() {
                    0 => continue,
                    1 => {
                        let (path, line) = hits.iter().next().cloned().unwrap_or_default();
                        debug!("Direct {} hit for {}: {}:{}", pass, term.arg, path, line);
                        return Ok(Some(DirectHit { path, line }));
                    }
                    n => {
                        debug!("{} {} hits for {}, no direct result", n, pass, term.arg);
                        return Ok(None);
                    }
                }
            }
        }

        let files = self.store.search(
            self.alias,
            DocKind::File,
            &StoreQuery::term("path", term.arg.as_str())
                .include(&["path", "is_folder"])
                .size(2),
        )?;
        Ok(match files.as_slice() {
            [file] if file["is_folder"] == false => Some(DirectHit {
                path: term.arg.clone(),
                line: 1,
            }),
            _ => None,
        })
    }
}

/// Characters that can appear in a C/C++ (possibly qualified) name.
fn is_identifier(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | ':' | '~' | '$'))
        && !text.starts_with(|c: char| c.is_ascii_digit())
}
