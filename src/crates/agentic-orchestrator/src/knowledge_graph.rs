//! `KnowledgeGraph` collaborator contract: a read-only view of
//! the user-supplied API catalog. The core never ingests or indexes the
//! catalog itself — that pipeline lives outside this crate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug)]
pub struct GraphError(pub String);

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for GraphError {}

/// One ranked catalog match against a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextMatch {
    pub entity_name: String,
    pub operation_keys: Vec<String>,
    /// Higher is more relevant; used only for ranking, not surfaced on the wire.
    pub confidence: u32,
}

/// The prompt bundle for one operation: everything `StepImplementer` needs
/// to render a snippet-authoring prompt for it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OperationBundle {
    pub operation_id: String,
    pub method: String,
    pub path: String,
    pub request_schema: serde_json::Value,
    pub response_schema: serde_json::Value,
    pub examples: Vec<String>,
    pub docs_markdown: String,
}

#[async_trait]
pub trait KnowledgeGraph: Send + Sync {
    /// Ranked list of `(entityName, operationKeys[])`, highest confidence first.
    async fn query_context(&self, prompt: &str) -> Result<Vec<ContextMatch>, GraphError>;

    /// `None` when nothing matches `operation_key`.
    async fn query_operation_for_prompt(&self, operation_key: &str) -> Result<Option<OperationBundle>, GraphError>;
}

/// A snapshot of the set of `(serviceName, operation)` pairs the catalog
/// actually knows about, taken once per request at plan time. Plans are
/// validated against this snapshot, not a live query.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    known_pairs: std::collections::HashSet<(String, String)>,
}

impl CatalogSnapshot {
    pub fn from_matches(matches: &[ContextMatch]) -> Self {
        let mut known_pairs = std::collections::HashSet::new();
        for m in matches {
            for op in &m.operation_keys {
                known_pairs.insert((m.entity_name.clone(), op.clone()));
            }
        }
        Self { known_pairs }
    }

    pub fn contains(&self, service_name: &str, operation: &str) -> bool {
        self.known_pairs.contains(&(service_name.to_string(), operation.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.known_pairs.is_empty()
    }
}

/// Per-request cache over `KnowledgeGraph::query_operation_for_prompt`.
///
/// Results are cached in memory for the duration of a single
/// `ExecutionRequest` rather than re-queried from the graph on every
/// attempt; `StepImplementer` otherwise re-fetches the same operation's
/// prompt bundle on every retry of a step, so this is the difference between
/// one graph call and one per attempt.
pub struct GraphCache<'a> {
    graph: &'a dyn KnowledgeGraph,
    cache: std::sync::Mutex<std::collections::HashMap<String, Option<OperationBundle>>>,
}

impl<'a> GraphCache<'a> {
    pub fn new(graph: &'a dyn KnowledgeGraph) -> Self {
        Self { graph, cache: std::sync::Mutex::new(std::collections::HashMap::new()) }
    }

    /// Returns the cached bundle for `operation_key` if this request has
    /// already fetched it, otherwise queries the graph once and caches the
    /// result (including a cached `None` for "nothing matches").
    pub async fn bundle_for(&self, operation_key: &str) -> Result<Option<OperationBundle>, GraphError> {
        if let Some(hit) = self.cache.lock().expect("graph cache poisoned").get(operation_key) {
            return Ok(hit.clone());
        }
        let fetched = self.graph.query_operation_for_prompt(operation_key).await?;
        self.cache
            .lock()
            .expect("graph cache poisoned")
            .insert(operation_key.to_string(), fetched.clone());
        Ok(fetched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_contains_only_indexed_pairs() {
        let matches = vec![ContextMatch {
            entity_name: "math".into(),
            operation_keys: vec!["echo".into(), "add".into()],
            confidence: 10,
        }];
        let snapshot = CatalogSnapshot::from_matches(&matches);
        assert!(snapshot.contains("math", "echo"));
        assert!(snapshot.contains("math", "add"));
        assert!(!snapshot.contains("math", "subtract"));
        assert!(!snapshot.contains("other", "echo"));
    }

    #[test]
    fn empty_matches_yield_empty_snapshot() {
        let snapshot = CatalogSnapshot::from_matches(&[]);
        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    async fn graph_cache_queries_the_graph_once_per_operation_key() {
        use crate::testing::StubKnowledgeGraph;

        let bundle = OperationBundle {
            operation_id: "echo".into(),
            method: "GET".into(),
            path: "/echo".into(),
            request_schema: serde_json::json!({}),
            response_schema: serde_json::json!({}),
            examples: vec![],
            docs_markdown: String::new(),
        };
        let graph = StubKnowledgeGraph::new(vec![], vec![("math.echo".to_string(), bundle.clone())]);
        let cache = GraphCache::new(&graph);

        let first = cache.bundle_for("math.echo").await.unwrap();
        let second = cache.bundle_for("math.echo").await.unwrap();
        assert_eq!(first, Some(bundle));
        assert_eq!(second, first);
        assert_eq!(graph.operation_lookup_count(), 1, "second lookup should hit the cache, not the graph");
    }

    #[tokio::test]
    async fn graph_cache_caches_misses_too() {
        use crate::testing::StubKnowledgeGraph;

        let graph = StubKnowledgeGraph::empty();
        let cache = GraphCache::new(&graph);
        assert_eq!(cache.bundle_for("unknown.op").await.unwrap(), None);
        assert_eq!(cache.bundle_for("unknown.op").await.unwrap(), None);
        assert_eq!(graph.operation_lookup_count(), 1);
    }
}
