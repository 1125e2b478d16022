//! Query text parsing and per-line matching.
//!
//! Terms are separated by whitespace. A term may be negated with a leading
//! `-`, may be `"quoted"` to include spaces, and is a filter when it looks
//! like `name:argument` and `name` is offered by one of the tree's plugins.
//! Everything else is plain text.

use crate::error::QueryError;
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use std::collections::BTreeMap;
use treeidx_core::{FilterKind, FilterSpec};

/// A parsed but not yet compiled term.
#[derive(Debug, Clone, PartialEq)]
pub struct Term {
    pub negated: bool,
    /// `None` for plain text.
    pub filter: Option<FilterSpec>,
    pub arg: String,
}

impl Term {
    pub fn is_plain_text(&self) -> bool {
        !self.negated && self.filter.map(|f| f.kind == FilterKind::Text).unwrap_or(true)
    }
}

/// Split on whitespace outside quotes.
fn tokenize(text: &str) -> Result<Vec<String>, QueryError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in text.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if in_quotes {
        return Err(QueryError::bad_term(format!(
            "Unterminated quotation mark in \"{}\".",
            current
        )));
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    Ok(tokens)
}

fn unquote(raw: &str) -> String {
    raw.replace('"', "")
}

/// Parse query text against the filters available to the tree.
pub fn parse(text: &str, filters: &[FilterSpec]) -> Result<Vec<Term>, QueryError> {
    let mut terms = Vec::new();
    for token in tokenize(text)? {
        let (negated, body) = match token.strip_prefix('-') {
            Some(rest) if !rest.is_empty() => (true, rest),
            _ => (false, token.as_str()),
        };

        let filter = body.split_once(':').and_then(|(name, arg)| {
            filters
                .iter()
                .find(|f| f.name == name)
                .map(|spec| (*spec, arg))
        });

        let term = match filter {
            Some((spec, arg)) => {
                let arg = unquote(arg);
                if arg.is_empty() {
                    return Err(QueryError::bad_term(format!(
                        "The {} filter needs an argument.",
                        spec.name
                    )));
                }
                Term {
                    negated,
                    filter: Some(spec),
                    arg,
                }
            }
            None => {
                let arg = unquote(body);
                if arg.is_empty() {
                    continue;
                }
                Term {
                    negated,
                    filter: None,
                    arg,
                }
            }
        };
        terms.push(term);
    }
    Ok(terms)
}

/// The fields of a LINE document that matching looks at.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LineHit {
    pub path: String,
    pub number: u32,
    pub content: String,
    #[serde(default)]
    pub needles: BTreeMap<String, Vec<String>>,
}

#[derive(Debug)]
enum Matcher {
    Text(String),
    Path(String),
    Ext(String),
    Regexp(Regex),
    Needle { field: String, qualified: bool, arg: String },
}

/// A term ready to be evaluated against lines.
#[derive(Debug)]
pub struct CompiledTerm {
    negated: bool,
    matcher: Matcher,
    case_sensitive: bool,
}

impl CompiledTerm {
    pub fn compile(term: &Term, case_sensitive: bool) -> Result<Self, QueryError> {
        let fold = |s: &str| {
            if case_sensitive {
                s.to_string()
            } else {
                s.to_lowercase()
            }
        };
        let kind = term.filter.map(|f| f.kind).unwrap_or(FilterKind::Text);
        let matcher = match kind {
            FilterKind::Text => Matcher::Text(fold(term.arg.as_str())),
            FilterKind::Path => Matcher::Path(fold(term.arg.as_str())),
            FilterKind::Ext => Matcher::Ext(fold(term.arg.trim_start_matches('.'))),
            FilterKind::Regexp => Matcher::Regexp(
                RegexBuilder::new(&term.arg)
                    .case_insensitive(!case_sensitive)
                    .build()
                    .map_err(|e| {
                        QueryError::bad_term(format!("Invalid regular expression: {}", e))
                    })?,
            ),
            FilterKind::Needle { field } => Matcher::Needle {
                field: field.to_string(),
                qualified: term.arg.contains("::"),
                arg: fold(term.arg.as_str()),
            },
        };
        Ok(Self {
            negated: term.negated,
            matcher,
            case_sensitive,
        })
    }

    /// Exact needle match on one field, ignoring a trailing parameter list
    /// in qualified names.
    pub fn needle(field: &str, qualified: bool, arg: &str, case_sensitive: bool) -> Self {
        Self {
            negated: false,
            matcher: Matcher::Needle {
                field: field.to_string(),
                qualified,
                arg: if case_sensitive {
                    arg.to_string()
                } else {
                    arg.to_lowercase()
                },
            },
            case_sensitive,
        }
    }

    fn fold<'a>(&self, s: &'a str) -> std::borrow::Cow<'a, str> {
        if self.case_sensitive {
            std::borrow::Cow::Borrowed(s)
        } else {
            std::borrow::Cow::Owned(s.to_lowercase())
        }
    }

    pub fn matches(&self, line: &LineHit) -> bool {
        let hit = match &self.matcher {
            Matcher::Text(arg) => self.fold(&line.content).contains(arg.as_str()),
            Matcher::Path(arg) => self.fold(&line.path).contains(arg.as_str()),
            Matcher::Ext(arg) => self
                .fold(&line.path)
                .rsplit_once('.')
                .map(|(_, ext)| ext == arg.as_str())
                .unwrap_or(false),
            Matcher::Regexp(re) => re.is_match(&line.content),
            Matcher::Needle {
                field,
                qualified,
                arg,
            } => {
                let key = if *qualified {
                    format!("{}-qualname", field)
                } else {
                    field.clone()
                };
                line.needles
                    .get(&key)
                    .map(|values| {
                        values.iter().any(|value| {
                            let value = self.fold(value);
                            value == arg.as_str()
                                || value.split('(').next() == Some(arg.as_str())
                        })
                    })
                    .unwrap_or(false)
            }
        };
        hit != self.negated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static FILTERS: &[FilterSpec] = &[
        FilterSpec::new("path", "", FilterKind::Path),
        FilterSpec::new("ext", "", FilterKind::Ext),
        FilterSpec::new("regexp", "", FilterKind::Regexp),
        FilterSpec::new("function", "", FilterKind::Needle { field: "function" }),
    ];

    fn line(path: &str, content: &str) -> LineHit {
        LineHit {
            path: path.into(),
            number: 1,
            content: content.into(),
            needles: BTreeMap::new(),
        }
    }

    #[test]
    fn test_parse_mixed() {
        let terms = parse(r#"path:src -ext:h "two words" frob"#, FILTERS).unwrap();
        assert_eq!(terms.len(), 4);
        assert_eq!(terms[0].filter.unwrap().name, "path");
        assert!(terms[1].negated);
        assert_eq!(terms[2].arg, "two words");
        assert!(terms[2].filter.is_none());
        assert!(terms[3].is_plain_text());
    }

    #[test]
    fn test_unknown_filter_is_text() {
        let terms = parse("std::vector", FILTERS).unwrap();
        assert_eq!(terms.len(), 1);
        assert!(terms[0].filter.is_none());
        assert_eq!(terms[0].arg, "std::vector");
    }

    #[test]
    fn test_empty_argument_is_reported() {
        let err = parse("path:", FILTERS).unwrap_err();
        assert_eq!(err.status(), 400);
        assert_eq!(err.reason(), "The path filter needs an argument.");
    }

    #[test]
    fn test_unterminated_quote_is_reported() {
        let err = parse(r#"path:"src foo"#, FILTERS).unwrap_err();
        assert!(!err.reason().is_empty());
    }

    #[test]
    fn test_invalid_regex_is_reported() {
        let terms = parse("regexp:(unclosed", FILTERS).unwrap();
        let err = CompiledTerm::compile(&terms[0], true).unwrap_err();
        assert!(err.reason().starts_with("Invalid regular expression"));
    }

    #[test]
    fn test_case_sensitivity() {
        let terms = parse("Frob", FILTERS).unwrap();
        let sensitive = CompiledTerm::compile(&terms[0], true).unwrap();
        let insensitive = CompiledTerm::compile(&terms[0], false).unwrap();
        assert!(!sensitive.matches(&line("a.c", "frob();")));
        assert!(insensitive.matches(&line("a.c", "frob();")));
    }

    #[test]
    fn test_ext_and_negation() {
        let terms = parse("-ext:.h", FILTERS).unwrap();
        let term = CompiledTerm::compile(&terms[0], false).unwrap();
        assert!(!term.matches(&line("x/a.h", "")));
        assert!(term.matches(&line("x/a.cpp", "")));
    }

    #[test]
    fn test_needle_match() {
        let mut hit = line("a.cpp", "void Circle::area() {}");
        hit.needles
            .insert("function".into(), vec!["area".into()]);
        hit.needles
            .insert("function-qualname".into(), vec!["geom::Circle::area()".into()]);

        for query in ["function:area", "function:geom::Circle::area"] {
            let terms = parse(query, FILTERS).unwrap();
            let term = CompiledTerm::compile(&terms[0], true).unwrap();
            assert!(term.matches(&hit), "{} should match", query);
        }
        let terms = parse("function:are", FILTERS).unwrap();
        assert!(!CompiledTerm::compile(&terms[0], true).unwrap().matches(&hit));
    }
}
