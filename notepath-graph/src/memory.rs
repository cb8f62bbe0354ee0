//! In-memory backend.
//!
//! Backs tests and small vaults. Similarity search is a brute-force cosine
//! scan, which is fine up to a few thousand documents.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::errors::GraphResult;
use crate::models::{DocMeta, DocStatistics, GraphEdge, GraphNode};
use crate::repository::{
    DocumentRepository, EmbeddingRepository, GraphRepository, StatisticsRepository,
};
use crate::vector::cosine_similarity;

#[derive(Debug, Default)]
struct Inner {
    nodes: HashMap<String, GraphNode>,
    /// Insertion order is the neighbor order.
    edges: Vec<GraphEdge>,
    documents: HashMap<String, DocMeta>,
    embeddings: HashMap<String, Vec<f32>>,
    statistics: HashMap<String, DocStatistics>,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert_node(&self, node: GraphNode) {
        let mut inner = self.inner.write().await;
        inner.nodes.insert(node.id.clone(), node);
    }

    /// Store the metadata and make sure a document node exists for it.
    pub async fn upsert_document(&self, meta: DocMeta) {
        let mut inner = self.inner.write().await;
        let label = meta.title.clone().unwrap_or_else(|| meta.id.clone());
        inner
            .nodes
            .entry(meta.id.clone())
            .or_insert_with(|| GraphNode::document(meta.id.clone(), label, &meta.path));
        inner.documents.insert(meta.id.clone(), meta);
    }

    pub async fn upsert_edge(&self, edge: GraphEdge) {
        let mut inner = self.inner.write().await;
        if !inner.edges.contains(&edge) {
            inner.edges.push(edge);
        }
    }

    pub async fn set_embedding(&self, doc_id: &str, vector: Vec<f32>) {
        let mut inner = self.inner.write().await;
        inner.embeddings.insert(doc_id.to_string(), vector);
    }

    pub async fn record_open(&self, doc_id: &str, timestamp_ms: i64) {
        let mut inner = self.inner.write().await;
        let entry = inner
            .statistics
            .entry(doc_id.to_string())
            .or_insert_with(|| DocStatistics {
                doc_id: doc_id.to_string(),
                open_count: 0,
                last_open_ts: None,
            });
        entry.open_count += 1;
        entry.last_open_ts = Some(timestamp_ms);
    }
}

#[async_trait]
impl GraphRepository for InMemoryStore {
    async fn get_by_id(&self, id: &str) -> GraphResult<Option<GraphNode>> {
        Ok(self.inner.read().await.nodes.get(id).cloned())
    }

    async fn get_by_ids(&self, ids: &[String]) -> GraphResult<Vec<GraphNode>> {
        let inner = self.inner.read().await;
        Ok(ids.iter().filter_map(|id| inner.nodes.get(id).cloned()).collect())
    }

    async fn get_all_edges_for_node(
        &self,
        node_id: &str,
        limit: usize,
    ) -> GraphResult<Vec<GraphEdge>> {
        let inner = self.inner.read().await;
        Ok(inner
            .edges
            .iter()
            .filter(|edge| edge.other_end(node_id).is_some())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_incoming_edges(&self, node_id: &str) -> GraphResult<Vec<GraphEdge>> {
        let inner = self.inner.read().await;
        Ok(inner
            .edges
            .iter()
            .filter(|edge| edge.to_node_id == node_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl DocumentRepository for InMemoryStore {
    async fn get_by_path(&self, path: &str) -> GraphResult<Option<DocMeta>> {
        let wanted = path.trim_start_matches('/');
        let inner = self.inner.read().await;
        Ok(inner
            .documents
            .values()
            .find(|meta| meta.path.trim_start_matches('/') == wanted)
            .cloned())
    }

    async fn get_by_ids(&self, ids: &[String]) -> GraphResult<Vec<DocMeta>> {
        let inner = self.inner.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| inner.documents.get(id).cloned())
            .collect())
    }
}

#[async_trait]
impl EmbeddingRepository for InMemoryStore {
    async fn get_average_embedding(&self, doc_id: &str) -> GraphResult<Option<Vec<f32>>> {
        Ok(self.inner.read().await.embeddings.get(doc_id).cloned())
    }

    async fn find_similar(
        &self,
        vector: &[f32],
        limit: usize,
        exclude: &[String],
    ) -> GraphResult<Vec<(String, f64)>> {
        let inner = self.inner.read().await;
        let mut scored: Vec<(String, f64)> = inner
            .embeddings
            .iter()
            .filter(|(id, _)| !exclude.contains(id))
            .map(|(id, candidate)| (id.clone(), cosine_similarity(vector, candidate)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        scored.truncate(limit);
        Ok(scored)
    }
}

#[async_trait]
impl StatisticsRepository for InMemoryStore {
    async fn get_by_doc_ids(&self, ids: &[String]) -> GraphResult<HashMap<String, DocStatistics>> {
        let inner = self.inner.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| {
                inner
                    .statistics
                    .get(id)
                    .map(|stats| (id.clone(), stats.clone()))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn edges_are_returned_for_both_directions() {
        let store = InMemoryStore::new();
        store.upsert_edge(GraphEdge::new("a", "b", "link")).await;
        store.upsert_edge(GraphEdge::new("c", "a", "link")).await;
        store.upsert_edge(GraphEdge::new("a", "b", "link")).await;

        let edges = store.get_all_edges_for_node("a", 10).await.unwrap();
        assert_eq!(edges.len(), 2);
        let limited = store.get_all_edges_for_node("a", 1).await.unwrap();
        assert_eq!(limited.len(), 1);
        let incoming = store.get_incoming_edges("a").await.unwrap();
        assert_eq!(incoming, vec![GraphEdge::new("c", "a", "link")]);
    }

    #[tokio::test]
    async fn similarity_search_ranks_and_excludes() {
        let store = InMemoryStore::new();
        store.set_embedding("x", vec![1.0, 0.0]).await;
        store.set_embedding("y", vec![0.9, 0.1]).await;
        store.set_embedding("z", vec![0.0, 1.0]).await;

        let hits = store
            .find_similar(&[1.0, 0.0], 2, &["x".to_string()])
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, "y");
        assert_eq!(hits[1].0, "z");
    }

    #[tokio::test]
    async fn documents_resolve_by_path_with_leading_slash() {
        let store = InMemoryStore::new();
        store
            .upsert_document(DocMeta {
                id: "notes/a.md".into(),
                path: "notes/a.md".into(),
                ..Default::default()
            })
            .await;
        let found = store.get_by_path("/notes/a.md").await.unwrap();
        assert!(found.is_some());
        let node = GraphRepository::get_by_id(&store, "notes/a.md").await.unwrap();
        assert!(node.is_some_and(|n| n.is_document()));
    }
}
