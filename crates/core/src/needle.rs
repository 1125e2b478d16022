//! Needles: the per-line searchable facts derived from condensed tables.

use crate::condensed::{CondensedTable, Span};
use crate::error::IndexError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Which record attribute becomes the searchable value of a needle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAttr {
    QualName,
    Name,
}

/// Generation rule: one needle per record of `kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeedleRule {
    pub kind: &'static str,
    pub key: KeyAttr,
    pub prefix: Option<&'static str>,
    pub tag: &'static str,
}

impl NeedleRule {
    /// `<prefix->` + tag + (`-qualname` for qualified-name rules).
    pub fn field(&self) -> String {
        let mut field = String::new();
        if let Some(prefix) = self.prefix {
            field.push_str(prefix);
            field.push('-');
        }
        field.push_str(self.tag);
        if self.key == KeyAttr::QualName {
            field.push_str("-qualname");
        }
        field
    }
}

const fn rule(kind: &'static str, key: KeyAttr, prefix: Option<&'static str>, tag: &'static str) -> NeedleRule {
    NeedleRule {
        kind,
        key,
        prefix,
        tag,
    }
}

/// Rules for the clang analyzer's record kinds.
pub static CLANG_NEEDLE_RULES: &[NeedleRule] = &[
    rule("function", KeyAttr::QualName, None, "function"),
    rule("function", KeyAttr::Name, None, "function"),
    rule("variable", KeyAttr::QualName, None, "variable"),
    rule("variable", KeyAttr::Name, None, "variable"),
    rule("typedef", KeyAttr::QualName, None, "typedef"),
    rule("typedef", KeyAttr::Name, None, "typedef"),
    rule("macro", KeyAttr::QualName, None, "macro"),
    rule("macro", KeyAttr::Name, None, "macro"),
    rule("namespace", KeyAttr::QualName, None, "namespace"),
    rule("namespace", KeyAttr::Name, None, "namespace"),
    rule("namespace-alias", KeyAttr::QualName, Some("namespace"), "alias"),
    rule("namespace-alias", KeyAttr::Name, Some("namespace"), "alias"),
];

/// Reject rule tables that would produce clashing or empty field names.
pub fn validate_rules(rules: &[NeedleRule]) -> Result<(), IndexError> {
    let mut seen = BTreeSet::new();
    for rule in rules {
        if rule.kind.is_empty() || rule.tag.is_empty() {
            return Err(IndexError::Configuration(format!(
                "needle rule {:?} has an empty kind or tag",
                rule
            )));
        }
        if rule.prefix.map(str::is_empty).unwrap_or(false) {
            return Err(IndexError::Configuration(format!(
                "needle rule {:?} has an empty prefix",
                rule
            )));
        }
        let field = rule.field();
        if !seen.insert(field.clone()) {
            return Err(IndexError::Configuration(format!(
                "needle field {} is produced by more than one rule",
                field
            )));
        }
    }
    Ok(())
}

/// A searchable fact positioned on a source line.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Needle {
    pub field: String,
    /// The value searched on.
    pub value: String,
    /// The complementary attribute (name for a qualname needle and vice versa).
    pub other: String,
    pub span: Span,
}

/// Apply `rules` to every record of `table`.
pub fn needles_by_line(table: &CondensedTable, rules: &[NeedleRule]) -> Vec<Needle> {
    let mut needles = Vec::new();
    for rule in rules {
        let field = rule.field();
        for record in table.records(rule.kind) {
            let (value, other) = match rule.key {
                KeyAttr::QualName => (record.qualname(), record.name()),
                KeyAttr::Name => (record.name(), record.qualname()),
            };
            needles.push(Needle {
                field: field.clone(),
                value: value.to_string(),
                other: other.to_string(),
                span: record.span,
            });
        }
    }
    needles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condensed::parse_dump;

    #[test]
    fn test_field_names() {
        let fields: Vec<String> = CLANG_NEEDLE_RULES.iter().map(NeedleRule::field).collect();
        assert!(fields.contains(&"function-qualname".to_string()));
        assert!(fields.contains(&"function".to_string()));
        assert!(fields.contains(&"namespace-alias".to_string()));
        assert!(fields.contains(&"namespace-alias-qualname".to_string()));
    }

    #[test]
    fn test_clang_rules_are_valid() {
        validate_rules(CLANG_NEEDLE_RULES).unwrap();
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let rules = [
            rule("function", KeyAttr::Name, None, "function"),
            rule("method", KeyAttr::Name, None, "function"),
        ];
        assert!(matches!(
            validate_rules(&rules),
            Err(IndexError::Configuration(_))
        ));
    }

    #[test]
    fn test_needle_count_matches_records() {
        let dump = concat!(
            "function,name,\"f\",qualname,\"a::f(int)\",loc,\"a.cpp:3:6\"\n",
            "function,name,\"f\",qualname,\"a::f(float)\",loc,\"a.cpp:4:6\"\n",
            "variable,name,\"v\",qualname,\"a::v\",loc,\"a.cpp:5:5\"\n",
            "namespace-alias,name,\"fs\",qualname,\"a::fs\",loc,\"a.cpp:6:11\"\n",
        );
        let mut table = CondensedTable::new();
        for record in parse_dump(dump).unwrap() {
            table.push(record);
        }

        let needles = needles_by_line(&table, CLANG_NEEDLE_RULES);
        let count = |field: &str| needles.iter().filter(|n| n.field == field).count();
        assert_eq!(count("function-qualname"), 2);
        assert_eq!(count("function"), 2);
        assert_eq!(count("variable"), 1);
        assert_eq!(count("typedef"), 0);
        assert_eq!(count("namespace-alias"), 1);

        let alias = needles
            .iter()
            .find(|n| n.field == "namespace-alias-qualname")
            .unwrap();
        assert_eq!(alias.value, "a::fs");
        assert_eq!(alias.other, "fs");
        assert_eq!(alias.span.line, 6);
    }

    #[test]
    fn test_empty_table_yields_nothing() {
        assert!(needles_by_line(&CondensedTable::new(), CLANG_NEEDLE_RULES).is_empty());
    }
}
