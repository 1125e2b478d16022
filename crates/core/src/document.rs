//! FILE and LINE documents, the shape of everything the store holds.

use crate::file_index::{Annotation, FileToIndex, LineRef};
use crate::needle::Needle;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::warn;

/// The two document kinds of a generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocKind {
    File,
    Line,
}

impl DocKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocKind::File => "file",
            DocKind::Line => "line",
        }
    }
}

impl fmt::Display for DocKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkItem {
    pub icon: String,
    pub title: String,
    pub href: String,
}

/// A sidebar section of a file view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub heading: String,
    pub order: u32,
    pub items: Vec<LinkItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDocument {
    pub path: String,
    /// Parent folder; `""` for entries at the tree root.
    pub folder: String,
    pub name: String,
    pub is_folder: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
    /// Base64 payload of images.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_data: Option<String>,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub needles: BTreeMap<String, Vec<String>>,
}

impl FileDocument {
    pub fn folder(path: &str, modified: Option<DateTime<Utc>>) -> Self {
        Self {
            path: path.to_string(),
            folder: parent_folder(path),
            name: base_name(path),
            is_folder: true,
            size: None,
            modified,
            raw_data: None,
            links: Vec::new(),
            needles: BTreeMap::new(),
        }
    }

    pub fn file(path: &str, size: u64, modified: Option<DateTime<Utc>>) -> Self {
        Self {
            is_folder: false,
            size: Some(size),
            ..Self::folder(path, modified)
        }
    }
}

/// A highlighted region of a line.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tag {
    pub start: u32,
    pub end: u32,
    pub class: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineDocument {
    pub path: String,
    /// 1-based line number.
    pub number: u32,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default)]
    pub refs: Vec<LineRef>,
    #[serde(default)]
    pub needles: BTreeMap<String, Vec<String>>,
}

pub fn parent_folder(path: &str) -> String {
    match path.rfind('/') {
        Some(index) => path[..index].to_string(),
        None => String::new(),
    }
}

pub fn base_name(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_string()
}

/// One indexed text file.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedFile {
    pub file: FileDocument,
    pub lines: Vec<LineDocument>,
}

/// Turn a text file and its plugin indexers into documents.
///
/// Exactly one LINE document is produced per line of `contents`, numbered
/// from 1. Facts pointing outside the file are dropped.
pub fn index_text_file(
    mut file: FileDocument,
    contents: &str,
    indexers: &[Box<dyn FileToIndex>],
) -> IndexedFile {
    let mut lines: Vec<LineDocument> = contents
        .lines()
        .enumerate()
        .map(|(index, content)| LineDocument {
            path: file.path.clone(),
            number: index as u32 + 1,
            content: content.to_string(),
            ..Default::default()
        })
        .collect();
    let mut tags: Vec<BTreeSet<Tag>> = vec![BTreeSet::new(); lines.len()];
    let mut all_needles = Vec::new();

    for indexer in indexers {
        for (field, value) in indexer.needles() {
            file.needles.entry(field).or_default().push(value);
        }

        for needle in indexer.needles_by_line() {
            let Some(slot) = line_slot(&file.path, needle.span.line, lines.len()) else {
                continue;
            };
            tags[slot].insert(Tag {
                start: needle.span.start,
                end: needle.span.end,
                class: "def".into(),
            });
            let values = lines[slot].needles.entry(needle.field.clone()).or_default();
            if !values.contains(&needle.value) {
                values.push(needle.value.clone());
            }
            all_needles.push(needle);
        }

        for line_ref in indexer.refs_by_line() {
            let Some(slot) = line_slot(&file.path, line_ref.span.line, lines.len()) else {
                continue;
            };
            tags[slot].insert(Tag {
                start: line_ref.span.start,
                end: line_ref.span.end,
                class: "ref".into(),
            });
            lines[slot].refs.push(line_ref);
        }

        for annotation in indexer.annotations_by_line() {
            if let Some(slot) = line_slot(&file.path, annotation.line, lines.len()) {
                lines[slot].annotations.push(annotation);
            }
        }
    }

    for (line, line_tags) in lines.iter_mut().zip(tags) {
        line.tags = line_tags.into_iter().collect();
    }
    file.links = outline_links(&all_needles);
    IndexedFile { file, lines }
}

fn line_slot(path: &str, line: u32, count: usize) -> Option<usize> {
    if line == 0 || line as usize > count {
        warn!("{}: fact on line {} outside a {}-line file", path, line, count);
        return None;
    }
    Some(line as usize - 1)
}

/// Sidebar sections listing the definitions of a file.
pub fn outline_links(needles: &[Needle]) -> Vec<Link> {
    const SECTIONS: &[(&str, &str, &str, u32)] = &[
        ("function-qualname", "Functions", "method", 1),
        ("typedef-qualname", "Types", "type", 2),
        ("namespace-qualname", "Namespaces", "class", 3),
        ("macro-qualname", "Macros", "macro", 4),
    ];

    SECTIONS
        .iter()
        .filter_map(|(field, heading, icon, order)| {
            let mut items: Vec<LinkItem> = needles
                .iter()
                .filter(|n| n.field == *field)
                .map(|n| LinkItem {
                    icon: icon.to_string(),
                    title: n.value.clone(),
                    href: format!("#{}", n.span.line),
                })
                .collect();
            if items.is_empty() {
                return None;
            }
            items.sort_by(|a, b| a.title.cmp(&b.title));
            items.dedup();
            Some(Link {
                heading: heading.to_string(),
                order: *order,
                items,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condensed::Span;
    use crate::file_index::{EmptyFileIndex, RefTarget};

    struct FakeIndex;

    impl FileToIndex for FakeIndex {
        fn needles(&self) -> Vec<(String, String)> {
            vec![("lang".into(), "cpp".into())]
        }

        fn needles_by_line(&self) -> Vec<Needle> {
            vec![
                Needle {
                    field: "function-qualname".into(),
                    value: "ns::f()".into(),
                    other: "f".into(),
                    span: Span { line: 2, start: 5, end: 6 },
                },
                Needle {
                    field: "function".into(),
                    value: "f".into(),
                    other: "ns::f()".into(),
                    span: Span { line: 2, start: 5, end: 6 },
                },
                Needle {
                    field: "function".into(),
                    value: "ghost".into(),
                    other: "ghost".into(),
                    span: Span { line: 40, start: 0, end: 5 },
                },
            ]
        }

        fn refs_by_line(&self) -> Vec<LineRef> {
            vec![LineRef {
                span: Span { line: 3, start: 2, end: 3 },
                kind: "function".into(),
                target: RefTarget {
                    qualname: "ns::f()".into(),
                    path: "a.cpp".into(),
                    line: 2,
                },
            }]
        }

        fn annotations_by_line(&self) -> Vec<Annotation> {
            Vec::new()
        }
    }

    #[test]
    fn test_paths() {
        assert_eq!(parent_folder("a/b/c.cpp"), "a/b");
        assert_eq!(parent_folder("c.cpp"), "");
        assert_eq!(base_name("a/b/c.cpp"), "c.cpp");
    }

    #[test]
    fn test_one_line_document_per_line() {
        let contents = "#include <x>\nvoid f() {}\n  f();\n";
        let indexed = index_text_file(
            FileDocument::file("a.cpp", contents.len() as u64, None),
            contents,
            &[Box::new(EmptyFileIndex) as Box<dyn FileToIndex>],
        );
        let numbers: Vec<u32> = indexed.lines.iter().map(|l| l.number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(indexed.lines[2].content, "  f();");
        assert!(indexed.file.links.is_empty());
    }

    #[test]
    fn test_facts_land_on_lines() {
        let contents = "#include <x>\nvoid f() {}\n  f();\n";
        let indexed = index_text_file(
            FileDocument::file("a.cpp", contents.len() as u64, None),
            contents,
            &[Box::new(FakeIndex) as Box<dyn FileToIndex>],
        );
        let line = &indexed.lines[1];
        assert_eq!(line.needles["function"], vec!["f"]);
        assert_eq!(line.needles["function-qualname"], vec!["ns::f()"]);
        assert_eq!(line.tags.len(), 1);
        assert_eq!(indexed.lines[2].refs.len(), 1);
        assert_eq!(indexed.lines[2].tags[0].class, "ref");
        assert_eq!(indexed.file.needles["lang"], vec!["cpp"]);
        assert_eq!(indexed.file.links[0].heading, "Functions");
        assert_eq!(indexed.file.links[0].items[0].href, "#2");
    }

    #[test]
    fn test_folder_document_has_no_payload() {
        let folder = FileDocument::folder("src/lib", None);
        assert!(folder.is_folder);
        assert!(folder.raw_data.is_none());
        assert_eq!(folder.folder, "src");
        assert_eq!(folder.name, "lib");
    }
}
