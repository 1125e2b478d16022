//! Document store: generations of FILE/LINE documents behind aliases.
//!
//! Every build writes a fresh generation and then repoints the tree's alias
//! to it in one step, so readers see either the old or the new generation.
//! A reader holds a lease on the generation it resolved; dropping that
//! generation waits until the last lease is released.

use crate::error::StoreError;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use treeidx_core::DocKind;

const ALIASES_TREE: &str = "__aliases__";
const GENERATIONS_TREE: &str = "__generations__";

/// Which fields of a matched document to return.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Projection {
    #[default]
    All,
    Include(Vec<String>),
    Exclude(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SortKey {
    Asc(String),
    Desc(String),
}

/// Exact-term lookup with optional sort and projection.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreQuery {
    /// All terms must match; array fields match if any element does.
    pub terms: Vec<(String, Value)>,
    pub sort: Vec<SortKey>,
    pub projection: Projection,
    pub size: usize,
}

impl StoreQuery {
    pub fn term(field: &str, value: impl Into<Value>) -> Self {
        Self {
            terms: vec![(field.to_string(), value.into())],
            sort: Vec::new(),
            projection: Projection::All,
            size: 1,
        }
    }

    pub fn sort(mut self, key: SortKey) -> Self {
        self.sort.push(key);
        self
    }

    pub fn size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    pub fn include(mut self, fields: &[&str]) -> Self {
        self.projection = Projection::Include(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    pub fn exclude(mut self, fields: &[&str]) -> Self {
        self.projection = Projection::Exclude(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    fn matches(&self, doc: &Value) -> bool {
        self.terms
            .iter()
            .all(|(field, expected)| match lookup(doc, field) {
                Some(Value::Array(items)) => items.contains(expected),
                Some(actual) => actual == expected,
                None => false,
            })
    }
}

/// Dotted-path field access.
pub fn lookup<'a>(doc: &'a Value, field: &str) -> Option<&'a Value> {
    field
        .split('.')
        .try_fold(doc, |value, part| value.as_object()?.get(part))
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

fn project(doc: Value, projection: &Projection) -> Value {
    let Value::Object(mut fields) = doc else {
        return doc;
    };
    match projection {
        Projection::All => Value::Object(fields),
        Projection::Include(keep) => Value::Object(
            keep.iter()
                .filter_map(|k| fields.remove(k).map(|v| (k.clone(), v)))
                .collect::<Map<String, Value>>(),
        ),
        Projection::Exclude(drop) => {
            for key in drop {
                fields.remove(key);
            }
            Value::Object(fields)
        }
    }
}

/// The search-engine boundary.
pub trait DocumentStore: Send + Sync {
    /// Filtered lookup against the generation behind `alias`.
    fn search(&self, alias: &str, kind: DocKind, query: &StoreQuery) -> Result<Vec<Value>, StoreError>;

    /// Visit documents in index order until `visit` returns `false` or the
    /// deadline passes. Returns whether the scan finished before the deadline.
    fn scan(
        &self,
        alias: &str,
        kind: DocKind,
        deadline: Option<Instant>,
        visit: &mut dyn FnMut(Value) -> bool,
    ) -> Result<bool, StoreError>;

    fn create_generation(&self, tree: &str) -> Result<String, StoreError>;

    /// Append documents to an unpublished generation, keeping their order.
    fn index(&self, generation: &str, kind: DocKind, docs: &[Value]) -> Result<(), StoreError>;

    /// Point `alias` at `generation`; returns the generation it replaced.
    fn publish(&self, alias: &str, generation: &str) -> Result<Option<String>, StoreError>;

    fn drop_generation(&self, generation: &str) -> Result<(), StoreError>;

    fn resolve_alias(&self, alias: &str) -> Result<Option<String>, StoreError>;
}

/// Generations currently being read, and those waiting for their readers
/// to finish before they are dropped.
#[derive(Debug, Default)]
struct Readers {
    active: HashMap<String, usize>,
    doomed: HashSet<String>,
}

/// Keeps one generation alive for the duration of a read.
struct ReadLease<'a> {
    store: &'a SledStore,
    generation: String,
}

impl Drop for ReadLease<'_> {
    fn drop(&mut self) {
        self.store.release(&self.generation);
    }
}

/// [`DocumentStore`] on top of an embedded sled database. Cloning is cheap
/// and clones share the same database.
#[derive(Clone)]
pub struct SledStore {
    db: sled::Db,
    aliases: sled::Tree,
    generations: sled::Tree,
    readers: Arc<Mutex<Readers>>,
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::Config::new()
            .path(path.as_ref())
            .cache_capacity(128 * 1024 * 1024)
            .flush_every_ms(Some(1000))
            .mode(sled::Mode::HighThroughput)
            .open()?;
        Self::from_db(db)
    }

    /// In-memory store removed on drop.
    pub fn temporary() -> Result<Self, StoreError> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: sled::Db) -> Result<Self, StoreError> {
        Ok(Self {
            aliases: db.open_tree(ALIASES_TREE)?,
            generations: db.open_tree(GENERATIONS_TREE)?,
            readers: Arc::new(Mutex::new(Readers::default())),
            db,
        })
    }

    fn kind_tree(&self, generation: &str, kind: DocKind) -> Result<sled::Tree, StoreError> {
        Ok(self.db.open_tree(format!("{}/{}", generation, kind.as_str()))?)
    }

    /// Resolve `alias` and pin the generation it names until the lease is
    /// dropped.
    fn lease(&self, alias: &str) -> Result<ReadLease<'_>, StoreError> {
        let mut readers = self.readers.lock();
        let generation = self
            .resolve_alias(alias)?
            .ok_or_else(|| StoreError::UnknownAlias(alias.to_string()))?;
        *readers.active.entry(generation.clone()).or_insert(0) += 1;
        Ok(ReadLease {
            store: self,
            generation,
        })
    }

    fn release(&self, generation: &str) {
        let mut readers = self.readers.lock();
        let remaining = match readers.active.get_mut(generation) {
            Some(count) => {
                *count = count.saturating_sub(1);
                *count
            }
            None => 0,
        };
        if remaining > 0 {
            return;
        }
        readers.active.remove(generation);
        if readers.doomed.remove(generation) {
            match self.drop_trees(generation) {
                Ok(()) => debug!("Dropped generation {} after its last reader", generation),
                Err(e) => warn!("Failed to drop generation {}: {}", generation, e),
            }
        }
    }

    fn drop_trees(&self, generation: &str) -> Result<(), StoreError> {
        for kind in [DocKind::File, DocKind::Line] {
            self.db.drop_tree(format!("{}/{}", generation, kind.as_str()))?;
        }
        Ok(())
    }

    /// Generations created for `tree`, published or not.
    pub fn generations(&self, tree: &str) -> Result<Vec<String>, StoreError> {
        let mut names = Vec::new();
        for entry in self.generations.iter() {
            let (name, owner) = entry?;
            if &owner[..] == tree.as_bytes() {
                names.push(String::from_utf8_lossy(&name).into_owned());
            }
        }
        Ok(names)
    }
}

impl DocumentStore for SledStore {
    fn search(&self, alias: &str, kind: DocKind, query: &StoreQuery) -> Result<Vec<Value>, StoreError> {
        let lease = self.lease(alias)?;
        let tree = self.kind_tree(&lease.generation, kind)?;
        let mut hits = Vec::new();
        for entry in tree.iter() {
            let (_, bytes) = entry?;
            let doc: Value = serde_json::from_slice(&bytes)?;
            if query.matches(&doc) {
                hits.push(doc);
                // Without a sort the first `size` hits in index order are final.
                if query.sort.is_empty() && hits.len() >= query.size {
                    break;
                }
            }
        }

        if !query.sort.is_empty() {
            hits.sort_by(|a, b| {
                query
                    .sort
                    .iter()
                    .map(|key| match key {
                        SortKey::Asc(field) => compare_values(lookup(a, field), lookup(b, field)),
                        SortKey::Desc(field) => compare_values(lookup(b, field), lookup(a, field)),
                    })
                    .find(|ordering| *ordering != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            });
        }
        hits.truncate(query.size);
        Ok(hits
            .into_iter()
            .map(|doc| project(doc, &query.projection))
            .collect())
    }

    fn scan(
        &self,
        alias: &str,
        kind: DocKind,
        deadline: Option<Instant>,
        visit: &mut dyn FnMut(Value) -> bool,
    ) -> Result<bool, StoreError> {
        let lease = self.lease(alias)?;
        let tree = self.kind_tree(&lease.generation, kind)?;
        for (count, entry) in tree.iter().enumerate() {
            if count % 1024 == 0 && deadline.map(|d| Instant::now() >= d).unwrap_or(false) {
                return Ok(false);
            }
            let (_, bytes) = entry?;
            if !visit(serde_json::from_slice(&bytes)?) {
                break;
            }
        }
        Ok(true)
    }

    fn create_generation(&self, tree: &str) -> Result<String, StoreError> {
        let name = format!(
            "{}-{}-{}",
            tree,
            Utc::now().format("%Y%m%d%H%M%S"),
            self.db.generate_id()?
        );
        self.generations.insert(name.as_bytes(), tree.as_bytes())?;
        debug!("Created generation {}", name);
        Ok(name)
    }

    fn index(&self, generation: &str, kind: DocKind, docs: &[Value]) -> Result<(), StoreError> {
        let tree = self.kind_tree(generation, kind)?;
        let mut batch = sled::Batch::default();
        for doc in docs {
            // generate_id is monotonic, so key order is insertion order.
            let key = self.db.generate_id()?.to_be_bytes();
            batch.insert(&key[..], serde_json::to_vec(doc)?);
        }
        tree.apply_batch(batch)?;
        Ok(())
    }

    fn publish(&self, alias: &str, generation: &str) -> Result<Option<String>, StoreError> {
        self.db.flush()?;
        let previous = self.aliases.insert(alias.as_bytes(), generation.as_bytes())?;
        self.aliases.flush()?;
        info!("Alias {} now serves {}", alias, generation);
        Ok(previous.map(|p| String::from_utf8_lossy(&p).into_owned()))
    }

    /// Forget `generation`. Its documents go now, or once the last read
    /// still using them finishes.
    fn drop_generation(&self, generation: &str) -> Result<(), StoreError> {
        self.generations.remove(generation.as_bytes())?;
        let mut readers = self.readers.lock();
        if readers.active.contains_key(generation) {
            readers.doomed.insert(generation.to_string());
            debug!("Generation {} is still being read; dropping it later", generation);
            return Ok(());
        }
        self.drop_trees(generation)?;
        debug!("Dropped generation {}", generation);
        Ok(())
    }

    fn resolve_alias(&self, alias: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .aliases
            .get(alias.as_bytes())?
            .map(|g| String::from_utf8_lossy(&g).into_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store_with(docs: &[Value]) -> SledStore {
        let store = SledStore::temporary().unwrap();
        let generation = store.create_generation("t").unwrap();
        store.index(&generation, DocKind::File, docs).unwrap();
        store.publish("t", &generation).unwrap();
        store
    }

    #[test]
    fn test_folder_listing_sort() {
        let store = store_with(&[
            json!({"folder": "", "name": "b", "is_folder": false}),
            json!({"folder": "", "name": "a", "is_folder": true}),
            json!({"folder": "", "name": "z", "is_folder": true}),
        ]);
        let query = StoreQuery::term("folder", "")
            .sort(SortKey::Desc("is_folder".into()))
            .sort(SortKey::Asc("name".into()))
            .size(10_000);
        let names: Vec<String> = store
            .search("t", DocKind::File, &query)
            .unwrap()
            .iter()
            .map(|d| d["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a", "z", "b"]);
    }

    #[test]
    fn test_projection() {
        let store = store_with(&[json!({"path": "a.png", "raw_data": "AAAA", "links": []})]);
        let excluded = store
            .search("t", DocKind::File, &StoreQuery::term("path", "a.png").exclude(&["raw_data"]))
            .unwrap();
        assert!(excluded[0].get("raw_data").is_none());
        assert!(excluded[0].get("links").is_some());

        let included = store
            .search("t", DocKind::File, &StoreQuery::term("path", "a.png").include(&["links"]))
            .unwrap();
        assert_eq!(included[0], json!({"links": []}));
    }

    #[test]
    fn test_array_and_dotted_terms() {
        let store = store_with(&[
            json!({"path": "a", "needles": {"function": ["f", "g"]}}),
            json!({"path": "b", "needles": {"function": ["h"]}}),
        ]);
        let hits = store
            .search("t", DocKind::File, &StoreQuery::term("needles.function", "g").size(5))
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0]["path"], "a");
    }

    #[test]
    fn test_unknown_alias() {
        let store = SledStore::temporary().unwrap();
        let err = store
            .search("nope", DocKind::File, &StoreQuery::term("path", ""))
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownAlias(_)));
    }

    #[test]
    fn test_unpublished_generation_is_invisible() {
        let store = store_with(&[json!({"path": "old"})]);
        let next = store.create_generation("t").unwrap();
        store.index(&next, DocKind::File, &[json!({"path": "new"})]).unwrap();

        let visible = store
            .search("t", DocKind::File, &StoreQuery::term("path", "new"))
            .unwrap();
        assert!(visible.is_empty());

        let previous = store.publish("t", &next).unwrap().unwrap();
        store.drop_generation(&previous).unwrap();
        let visible = store
            .search("t", DocKind::File, &StoreQuery::term("path", "new"))
            .unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(store.generations("t").unwrap(), vec![next]);
    }

    #[test]
    fn test_scan_preserves_order_and_stops() {
        let store = SledStore::temporary().unwrap();
        let generation = store.create_generation("t").unwrap();
        let docs: Vec<Value> = (1..=5).map(|n| json!({"number": n})).collect();
        store.index(&generation, DocKind::Line, &docs).unwrap();
        store.publish("t", &generation).unwrap();

        let mut seen = Vec::new();
        let finished = store
            .scan("t", DocKind::Line, None, &mut |doc| {
                seen.push(doc["number"].as_u64().unwrap());
                seen.len() < 3
            })
            .unwrap();
        assert!(finished);
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn test_generation_swap_during_scan() {
        let store = SledStore::temporary().unwrap();
        let old = store.create_generation("t").unwrap();
        let docs: Vec<Value> = (1..=5000).map(|n| json!({"number": n})).collect();
        store.index(&old, DocKind::Line, &docs).unwrap();
        store.publish("t", &old).unwrap();

        let mut seen = 0;
        let mut next = None;
        let finished = store
            .scan("t", DocKind::Line, None, &mut |_| {
                if next.is_none() {
                    let generation = store.create_generation("t").unwrap();
                    store
                        .index(&generation, DocKind::Line, &[json!({"number": 1})])
                        .unwrap();
                    let previous = store.publish("t", &generation).unwrap().unwrap();
                    store.drop_generation(&previous).unwrap();
                    next = Some(generation);
                }
                seen += 1;
                true
            })
            .unwrap();
        assert!(finished);
        assert_eq!(seen, 5000);

        // The old generation is gone once the scan let go of it.
        let names: Vec<String> = store
            .db
            .tree_names()
            .iter()
            .map(|name| String::from_utf8_lossy(name).into_owned())
            .collect();
        assert!(!names.iter().any(|name| name.starts_with(old.as_str())));
        assert_eq!(store.generations("t").unwrap(), vec![next.unwrap()]);

        let mut after = 0;
        store
            .scan("t", DocKind::Line, None, &mut |_| {
                after += 1;
                true
            })
            .unwrap();
        assert_eq!(after, 1);
    }

    #[test]
    fn test_unread_generation_drops_immediately() {
        let store = store_with(&[json!({"path": "a"})]);
        let generation = store.resolve_alias("t").unwrap().unwrap();
        store.drop_generation(&generation).unwrap();
        let names: Vec<String> = store
            .db
            .tree_names()
            .iter()
            .map(|name| String::from_utf8_lossy(name).into_owned())
            .collect();
        assert!(!names.iter().any(|name| name.starts_with(generation.as_str())));
        assert!(store.readers.lock().doomed.is_empty());
    }

    #[test]
    fn test_scan_past_deadline() {
        let store = store_with(&[json!({"path": "a"})]);
        let generation = store.resolve_alias("t").unwrap().unwrap();
        store.index(&generation, DocKind::Line, &[json!({"number": 1})]).unwrap();
        let finished = store
            .scan("t", DocKind::Line, Some(Instant::now()), &mut |_| true)
            .unwrap();
        assert!(!finished);
    }
}
