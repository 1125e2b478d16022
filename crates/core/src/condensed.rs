//! Condensed symbol tables built from the analyzer's per-file CSV dumps.
//!
//! A dump line looks like
//! `function,name,"foo",qualname,"ns::foo",loc,"src/a.cpp:12:6",extent,210:213`:
//! the record kind, then key/value pairs. Values may be quoted; a quote inside
//! a quoted value is doubled.

use crate::error::IndexError;
use once_cell::sync::Lazy;
use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

static LOCATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.*):(\d+):(\d+)$").expect("valid location regex"));

/// A region of one source line. `line` is 1-based, columns are 0-based and
/// `end` is exclusive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Span {
    pub line: u32,
    pub start: u32,
    pub end: u32,
}

/// A `path:line:col` location as printed by the analyzer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub path: String,
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub fn parse(raw: &str) -> Option<Self> {
        let caps = LOCATION_RE.captures(raw)?;
        Some(Self {
            path: caps[1].to_string(),
            line: caps[2].parse().ok()?,
            column: caps[3].parse().ok()?,
        })
    }
}

/// One analyzer record, e.g. a function definition or a reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SymbolRecord {
    pub kind: String,
    pub path: String,
    pub span: Span,
    pub attrs: BTreeMap<String, String>,
}

impl SymbolRecord {
    pub fn name(&self) -> &str {
        self.attrs
            .get("name")
            .or_else(|| self.attrs.get("tcname"))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Qualified name; macros and other unscoped records fall back to `name`.
    pub fn qualname(&self) -> &str {
        self.attrs
            .get("qualname")
            .or_else(|| self.attrs.get("tcname"))
            .map(String::as_str)
            .unwrap_or_else(|| self.name())
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }
}

/// Records of one source file grouped by kind. Record order within a kind is
/// dump order and overloads are kept side by side.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CondensedTable {
    pub kinds: BTreeMap<String, Vec<SymbolRecord>>,
}

impl CondensedTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: SymbolRecord) {
        self.kinds.entry(record.kind.clone()).or_default().push(record);
    }

    /// Records of `kind`; an absent kind is simply empty.
    pub fn records(&self, kind: &str) -> &[SymbolRecord] {
        self.kinds.get(kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.kinds.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Split one dump line into its raw fields, honouring quotes.
pub fn split_fields(line: &str) -> Result<Vec<String>, String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars().peekable();
    let mut in_quotes = false;

    while let Some(c) = chars.next() {
        match (c, in_quotes) {
            ('"', true) if chars.peek() == Some(&'"') => {
                chars.next();
                current.push('"');
            }
            ('"', true) => in_quotes = false,
            ('"', false) if current.is_empty() => in_quotes = true,
            (',', false) => fields.push(std::mem::take(&mut current)),
            (c, _) => current.push(c),
        }
    }
    if in_quotes {
        return Err("unterminated quoted value".to_string());
    }
    fields.push(current);
    Ok(fields)
}

/// Key carrying the location of a record of the given kind.
fn location_key(kind: &str) -> &'static str {
    match kind {
        "impl" => "tcloc",
        "decldef" => "declloc",
        _ => "loc",
    }
}

/// Parse one dump line. Returns `Ok(None)` for records without a usable
/// location (calls, or records inside macro expansions).
pub fn parse_record(line: &str) -> Result<Option<SymbolRecord>, String> {
    let fields = split_fields(line)?;
    let (kind, rest) = match fields.split_first() {
        Some((kind, rest)) if !kind.is_empty() => (kind.clone(), rest),
        _ => return Err("missing record kind".to_string()),
    };
    if rest.len() % 2 != 0 {
        return Err(format!("odd number of fields in {} record", kind));
    }

    let mut attrs = BTreeMap::new();
    let mut extent = None;
    for pair in rest.chunks(2) {
        if pair[0] == "extent" {
            extent = Some(parse_extent(&pair[1])?);
        } else {
            attrs.insert(pair[0].clone(), pair[1].clone());
        }
    }

    let Some(location) = attrs
        .get(location_key(&kind))
        .and_then(|raw| Location::parse(raw))
    else {
        return Ok(None);
    };

    let start = location.column.saturating_sub(1);
    let width = match extent {
        Some((begin, end)) => end.saturating_sub(begin),
        None => attrs
            .get("name")
            .or_else(|| attrs.get("tcname"))
            .map(|n| n.rsplit("::").next().unwrap_or(n).len() as u32)
            .unwrap_or(0),
    };

    let end = start
        .checked_add(width)
        .ok_or_else(|| format!("span overflows in {} record", kind))?;

    Ok(Some(SymbolRecord {
        span: Span {
            line: location.line,
            start,
            end,
        },
        path: location.path,
        kind,
        attrs,
    }))
}

fn parse_extent(raw: &str) -> Result<(u32, u32), String> {
    let (begin, end) = raw
        .split_once(':')
        .ok_or_else(|| format!("malformed extent {:?}", raw))?;
    let begin = begin
        .parse()
        .map_err(|_| format!("malformed extent {:?}", raw))?;
    let end = end
        .parse()
        .map_err(|_| format!("malformed extent {:?}", raw))?;
    Ok((begin, end))
}

/// Parse a whole dump file. Any malformed line rejects the dump.
pub fn parse_dump(contents: &str) -> Result<Vec<SymbolRecord>, String> {
    let mut records = Vec::new();
    for (index, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match parse_record(line) {
            Ok(Some(record)) => records.push(record),
            Ok(None) => {}
            Err(reason) => return Err(format!("line {}: {}", index + 1, reason)),
        }
    }
    Ok(records)
}

/// Every condensed table found in a dump folder, keyed by source path.
#[derive(Debug, Default)]
pub struct DumpSet {
    pub tables: BTreeMap<String, CondensedTable>,
    /// Dumps that could not be read or parsed; their records are excluded.
    pub failures: Vec<IndexError>,
}

/// Load every `*.csv` dump in `folder`.
///
/// Dumps are parsed in parallel and merged in file-name order, so the result
/// does not depend on scheduling. Record paths under `source_root` are made
/// relative to it.
pub fn load_dumps(folder: &Path, source_root: &Path) -> DumpSet {
    let mut dumps: Vec<PathBuf> = match fs::read_dir(folder) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|ext| ext == "csv").unwrap_or(false))
            .collect(),
        Err(e) => {
            warn!("No analyzer output in {}: {}", folder.display(), e);
            return DumpSet::default();
        }
    };
    dumps.sort();

    let parsed: Vec<(PathBuf, Result<Vec<SymbolRecord>, String>)> = dumps
        .into_par_iter()
        .map(|dump| {
            let result = fs::read_to_string(&dump)
                .map_err(|e| e.to_string())
                .and_then(|contents| parse_dump(&contents));
            (dump, result)
        })
        .collect();

    let mut set = DumpSet::default();
    for (dump, result) in parsed {
        match result {
            Ok(records) => {
                debug!("Loaded {} records from {}", records.len(), dump.display());
                for mut record in records {
                    record.path = relative_path(&record.path, source_root);
                    set.tables
                        .entry(record.path.clone())
                        .or_default()
                        .push(record);
                }
            }
            Err(reason) => {
                warn!("Skipping analyzer dump {}: {}", dump.display(), reason);
                set.failures.push(IndexError::file_index(dump, reason));
            }
        }
    }
    set
}

fn relative_path(path: &str, source_root: &Path) -> String {
    Path::new(path)
        .strip_prefix(source_root)
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|_| path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_split_fields_with_escaped_quotes() {
        let fields = split_fields(r#"variable,name,"x",type,"char [3] = ""ab""""#).unwrap();
        assert_eq!(fields, vec!["variable", "name", "x", "type", r#"char [3] = "ab""#]);
    }

    #[test]
    fn test_split_fields_unterminated() {
        assert!(split_fields(r#"function,name,"foo"#).is_err());
    }

    #[test]
    fn test_parse_function_record() {
        let record = parse_record(
            r#"function,name,"bar",qualname,"ns::bar(int)",loc,"src/a.cpp:12:6",extent,210:213"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(record.kind, "function");
        assert_eq!(record.path, "src/a.cpp");
        assert_eq!(record.name(), "bar");
        assert_eq!(record.qualname(), "ns::bar(int)");
        assert_eq!(
            record.span,
            Span {
                line: 12,
                start: 5,
                end: 8
            }
        );
    }

    #[test]
    fn test_macro_qualname_falls_back_to_name() {
        let record = parse_record(r#"macro,loc,"a.h:3:9",name,"MAX",text,"10""#)
            .unwrap()
            .unwrap();
        assert_eq!(record.qualname(), "MAX");
        assert_eq!(record.span.end - record.span.start, 3);
    }

    #[test]
    fn test_record_without_location_is_dropped() {
        let record = parse_record(r#"call,calleename,"f",calleeloc,"a.cpp:1:1""#).unwrap();
        assert!(record.is_none());
    }

    #[test]
    fn test_odd_field_count_is_malformed() {
        assert!(parse_record(r#"function,name"#).is_err());
    }

    #[test]
    fn test_span_past_u32_is_malformed() {
        let err = parse_record(
            r#"function,name,"f",qualname,"f()",loc,"a.cpp:1:4294967295",extent,0:10"#,
        )
        .unwrap_err();
        assert!(err.contains("span overflows"));

        let dump = "function,name,\"f\",qualname,\"f()\",loc,\"a.cpp:1:4294967295\",extent,0:10\n";
        assert!(parse_dump(dump).is_err());
    }

    #[test]
    fn test_overloads_are_kept() {
        let dump = concat!(
            "function,name,\"f\",qualname,\"f(int)\",loc,\"a.cpp:1:6\"\n",
            "function,name,\"f\",qualname,\"f(float)\",loc,\"a.cpp:2:6\"\n",
        );
        let mut table = CondensedTable::new();
        for record in parse_dump(dump).unwrap() {
            table.push(record);
        }
        assert_eq!(table.records("function").len(), 2);
        assert!(table.records("typedef").is_empty());
    }

    #[test]
    fn test_load_dumps_skips_malformed() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("src");
        fs::write(
            temp.path().join("a.csv"),
            format!(
                "function,name,\"f\",qualname,\"f()\",loc,\"{}/a.cpp:1:6\"\n",
                root.display()
            ),
        )
        .unwrap();
        fs::write(temp.path().join("b.csv"), "function,name,\"g\n").unwrap();
        fs::write(temp.path().join("notes.txt"), "ignored").unwrap();

        let set = load_dumps(temp.path(), &root);
        assert_eq!(set.tables.len(), 1);
        assert_eq!(set.tables["a.cpp"].records("function").len(), 1);
        assert_eq!(set.failures.len(), 1);
        assert!(!set.failures[0].is_fatal());
    }

    #[test]
    fn test_load_dumps_missing_folder() {
        let temp = TempDir::new().unwrap();
        let set = load_dumps(&temp.path().join("absent"), temp.path());
        assert!(set.tables.is_empty());
        assert!(set.failures.is_empty());
    }
}
