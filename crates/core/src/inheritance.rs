//! Class inheritance collected across every condensed table of a tree.

use crate::condensed::CondensedTable;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::warn;

/// Two files disagreeing about the parents of one class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InheritanceConflict {
    pub qualname: String,
    /// Each contributing file with the parents it reported.
    pub contributions: Vec<(String, BTreeSet<String>)>,
}

/// Mapping from a class's qualified name to its direct parents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InheritanceGraph {
    parents: BTreeMap<String, BTreeSet<String>>,
    conflicts: Vec<InheritanceConflict>,
}

impl InheritanceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from per-file tables. Only `impl` records are read.
    ///
    /// Files are merged in path order and parents are unioned, so any
    /// iteration order of `tables` produces the same graph.
    pub fn build<'a, I>(tables: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a CondensedTable)>,
    {
        let mut ordered: Vec<(&String, &CondensedTable)> = tables.into_iter().collect();
        ordered.sort_by(|a, b| a.0.cmp(b.0));

        // qualname -> file -> parents reported by that file
        let mut reports: BTreeMap<String, BTreeMap<String, BTreeSet<String>>> = BTreeMap::new();
        for (path, table) in ordered {
            for record in table.records("impl") {
                let (Some(child), Some(parent)) = (record.attr("tcname"), record.attr("tbname"))
                else {
                    continue;
                };
                reports
                    .entry(child.to_string())
                    .or_default()
                    .entry(path.clone())
                    .or_default()
                    .insert(parent.to_string());
            }
        }

        let mut graph = Self::new();
        for (qualname, by_file) in reports {
            let merged: BTreeSet<String> = by_file.values().flatten().cloned().collect();
            let first = by_file.values().next();
            if by_file.values().any(|set| Some(set) != first) {
                warn!(
                    "Files disagree about the parents of {}; keeping the union",
                    qualname
                );
                graph.conflicts.push(InheritanceConflict {
                    qualname: qualname.clone(),
                    contributions: by_file.into_iter().collect(),
                });
            }
            graph.parents.insert(qualname, merged);
        }
        graph
    }

    pub fn add_parent(&mut self, child: &str, parent: &str) {
        self.parents
            .entry(child.to_string())
            .or_default()
            .insert(parent.to_string());
    }

    /// Direct parents of `qualname`.
    pub fn parents(&self, qualname: &str) -> impl Iterator<Item = &str> {
        self.parents
            .get(qualname)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    /// Direct children of `qualname`, sorted.
    pub fn children(&self, qualname: &str) -> Vec<&str> {
        self.parents
            .iter()
            .filter(|(_, parents)| parents.contains(qualname))
            .map(|(child, _)| child.as_str())
            .collect()
    }

    /// Every transitive ancestor, nearest first. Cycles are tolerated.
    pub fn ancestors(&self, qualname: &str) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut result = Vec::new();
        let mut queue: VecDeque<&str> = self.parents(qualname).collect();

        while let Some(current) = queue.pop_front() {
            if current == qualname || !seen.insert(current.to_string()) {
                continue;
            }
            result.push(current.to_string());
            queue.extend(self.parents(current));
        }
        result
    }

    pub fn conflicts(&self) -> &[InheritanceConflict] {
        &self.conflicts
    }

    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condensed::parse_dump;

    fn table(dump: &str) -> CondensedTable {
        let mut table = CondensedTable::new();
        for record in parse_dump(dump).unwrap() {
            table.push(record);
        }
        table
    }

    fn impl_line(child: &str, parent: &str, file: &str) -> String {
        format!(
            "impl,tcname,\"{}\",tcloc,\"{}:1:7\",tbname,\"{}\",tbloc,\"base.h:1:7\",access,\"public\"\n",
            child, file, parent
        )
    }

    #[test]
    fn test_union_across_files() {
        let mut tables = BTreeMap::new();
        tables.insert("a.cpp".to_string(), table(&impl_line("D", "B1", "a.cpp")));
        tables.insert("b.cpp".to_string(), table(&impl_line("D", "B2", "b.cpp")));

        let graph = InheritanceGraph::build(&tables);
        let parents: Vec<&str> = graph.parents("D").collect();
        assert_eq!(parents, vec!["B1", "B2"]);
        assert_eq!(graph.conflicts().len(), 1);
        assert_eq!(graph.conflicts()[0].qualname, "D");
    }

    #[test]
    fn test_agreeing_files_do_not_conflict() {
        let mut tables = BTreeMap::new();
        tables.insert("a.cpp".to_string(), table(&impl_line("D", "B", "a.cpp")));
        tables.insert("b.cpp".to_string(), table(&impl_line("D", "B", "b.cpp")));

        let graph = InheritanceGraph::build(&tables);
        assert_eq!(graph.len(), 1);
        assert!(graph.conflicts().is_empty());
    }

    #[test]
    fn test_order_independent() {
        let a = ("a.cpp".to_string(), table(&impl_line("C", "A", "a.cpp")));
        let b = (
            "b.cpp".to_string(),
            table(&(impl_line("C", "B", "b.cpp") + &impl_line("E", "C", "b.cpp"))),
        );

        let forward = InheritanceGraph::build(vec![(&a.0, &a.1), (&b.0, &b.1)]);
        let backward = InheritanceGraph::build(vec![(&b.0, &b.1), (&a.0, &a.1)]);
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_ancestors_and_children() {
        let mut graph = InheritanceGraph::new();
        graph.add_parent("C", "B");
        graph.add_parent("B", "A");
        graph.add_parent("A", "C");

        assert_eq!(graph.ancestors("C"), vec!["B", "A"]);
        assert_eq!(graph.children("B"), vec!["C"]);
        assert!(graph.parents("Z").next().is_none());
    }

    #[test]
    fn test_non_impl_records_ignored() {
        let mut tables = BTreeMap::new();
        tables.insert(
            "a.cpp".to_string(),
            table("function,name,\"f\",qualname,\"f()\",loc,\"a.cpp:1:6\"\n"),
        );
        assert!(InheritanceGraph::build(&tables).is_empty());
    }
}
