use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::context::SearchContext;
use crate::errors::GraphResult;
use crate::models::{NeighborNode, PathFilters};
use crate::repository::PathStores;

pub const DEFAULT_NEIGHBOR_LIMIT: usize = 20;
pub const DEFAULT_SEMANTIC_LIMIT: usize = 5;
/// Smart expansion adds semantic neighbors only below this many physical ones.
pub const SMART_PHYSICAL_THRESHOLD: usize = 3;

/// Which neighbor lists a traversal asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighborMode {
    Physical,
    /// Physical plus semantic, always.
    Mixed,
    /// Physical, topped up with semantic only when the node is sparse.
    Smart,
}

/// Neighbor lookup for one search, with caller filters applied.
///
/// Embeddings fetched while searching are cached for the lifetime of the
/// provider, which never outlives a single `find_path` call.
pub struct NeighborProvider {
    stores: PathStores,
    filters: Arc<PathFilters>,
    endpoints: [String; 2],
    include_semantic: bool,
    physical_limit: usize,
    semantic_limit: usize,
    embeddings: Mutex<HashMap<String, Option<Arc<Vec<f32>>>>>,
}

impl NeighborProvider {
    pub fn new(stores: PathStores, ctx: &SearchContext, physical_limit: usize) -> Self {
        // Endpoints without a known vector are looked up lazily.
        let mut cache = HashMap::new();
        if let Some(vector) = &ctx.start_vector {
            cache.insert(ctx.start_id.clone(), Some(vector.clone()));
        }
        if let Some(vector) = &ctx.end_vector {
            cache.insert(ctx.end_id.clone(), Some(vector.clone()));
        }
        Self {
            stores,
            filters: ctx.filters.clone(),
            endpoints: [ctx.start_id.clone(), ctx.end_id.clone()],
            include_semantic: ctx.include_semantic,
            physical_limit: physical_limit.max(1),
            semantic_limit: DEFAULT_SEMANTIC_LIMIT,
            embeddings: Mutex::new(cache),
        }
    }

    pub fn with_semantic_limit(mut self, limit: usize) -> Self {
        self.semantic_limit = limit;
        self
    }

    pub fn stores(&self) -> &PathStores {
        &self.stores
    }

    pub fn physical_limit(&self) -> usize {
        self.physical_limit
    }

    pub fn semantic_enabled(&self) -> bool {
        self.include_semantic
    }

    pub async fn neighbors(&self, node_id: &str, mode: NeighborMode) -> GraphResult<Vec<NeighborNode>> {
        match mode {
            NeighborMode::Physical => self.physical_neighbors(node_id, self.physical_limit).await,
            NeighborMode::Mixed => self.mixed_neighbors(node_id).await,
            NeighborMode::Smart => self.smart_neighbors(node_id, true).await,
        }
    }

    /// Nodes sharing an edge with `node_id`, either direction, first edge wins.
    pub async fn physical_neighbors(
        &self,
        node_id: &str,
        limit: usize,
    ) -> GraphResult<Vec<NeighborNode>> {
        let edges = self
            .stores
            .graph
            .get_all_edges_for_node(node_id, limit)
            .await?;
        let mut seen = HashSet::new();
        let neighbors = edges
            .iter()
            .filter_map(|edge| edge.other_end(node_id))
            .filter(|other| *other != node_id)
            .filter(|other| seen.insert(other.to_string()))
            .map(NeighborNode::physical)
            .collect();
        self.apply_filters(neighbors).await
    }

    /// Nearest documents by embedding. Empty when semantic search is off or
    /// the node has no embedding.
    pub async fn semantic_neighbors(
        &self,
        node_id: &str,
        limit: usize,
        exclude_ids: &[String],
    ) -> GraphResult<Vec<NeighborNode>> {
        if !self.include_semantic || limit == 0 {
            return Ok(Vec::new());
        }
        let Some(vector) = self.embedding(node_id).await? else {
            return Ok(Vec::new());
        };

        let mut exclude = Vec::with_capacity(exclude_ids.len() + 1);
        exclude.push(node_id.to_string());
        exclude.extend(exclude_ids.iter().cloned());

        let hits = self
            .stores
            .embeddings
            .find_similar(&vector, limit, &exclude)
            .await?;
        let neighbors = hits
            .into_iter()
            .filter(|(id, similarity)| id != node_id && *similarity > 0.0)
            .map(|(id, similarity)| NeighborNode::semantic(id, similarity))
            .collect();
        self.apply_filters(neighbors).await
    }

    pub async fn mixed_neighbors(&self, node_id: &str) -> GraphResult<Vec<NeighborNode>> {
        self.smart_neighbors(node_id, false).await
    }

    /// Physical neighbors first. Semantic ones are appended when `throttle`
    /// is off or fewer than [`SMART_PHYSICAL_THRESHOLD`] physical ones exist.
    pub async fn smart_neighbors(
        &self,
        node_id: &str,
        throttle: bool,
    ) -> GraphResult<Vec<NeighborNode>> {
        let mut neighbors = self.physical_neighbors(node_id, self.physical_limit).await?;
        if throttle && neighbors.len() >= SMART_PHYSICAL_THRESHOLD {
            return Ok(neighbors);
        }
        let exclude: Vec<String> = neighbors.iter().map(|n| n.id.clone()).collect();
        let semantic = self
            .semantic_neighbors(node_id, self.semantic_limit, &exclude)
            .await?;
        neighbors.extend(semantic);
        Ok(neighbors)
    }

    /// Averaged embedding of a node, cached for this search.
    pub async fn embedding(&self, node_id: &str) -> GraphResult<Option<Arc<Vec<f32>>>> {
        let mut cache = self.embeddings.lock().await;
        if let Some(cached) = cache.get(node_id) {
            return Ok(cached.clone());
        }
        let vector = self
            .stores
            .embeddings
            .get_average_embedding(node_id)
            .await?
            .filter(|v| !v.is_empty())
            .map(Arc::new);
        cache.insert(node_id.to_string(), vector.clone());
        Ok(vector)
    }

    fn is_endpoint(&self, id: &str) -> bool {
        self.endpoints.iter().any(|endpoint| endpoint == id)
    }

    async fn apply_filters(&self, mut candidates: Vec<NeighborNode>) -> GraphResult<Vec<NeighborNode>> {
        let filters = &self.filters;
        if filters.is_empty() || candidates.is_empty() {
            return Ok(candidates);
        }

        candidates.retain(|n| self.is_endpoint(&n.id) || !filters.exclude_ids.contains(&n.id));
        let ids: Vec<String> = candidates
            .iter()
            .filter(|n| !self.is_endpoint(&n.id))
            .map(|n| n.id.clone())
            .collect();
        if ids.is_empty() {
            return Ok(candidates);
        }

        let mut rejected = HashSet::new();
        if !filters.exclude_node_types.is_empty() {
            for node in self.stores.graph.get_by_ids(&ids).await? {
                if filters.exclude_node_types.contains(&node.node_type) {
                    rejected.insert(node.id);
                }
            }
        }
        if filters.has_folder_rules() {
            for doc in self.stores.documents.get_by_ids(&ids).await? {
                if !filters.allows_path(&doc.path) {
                    rejected.insert(doc.id);
                }
            }
        }

        candidates.retain(|n| !rejected.contains(&n.id));
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use crate::models::{DocMeta, GraphEdge};

    async fn store() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        for (id, path) in [
            ("a", "projects/a.md"),
            ("b", "projects/b.md"),
            ("c", "archive/c.md"),
            ("d", "areas/d.md"),
        ] {
            store
                .upsert_document(DocMeta {
                    id: id.into(),
                    path: path.into(),
                    ..Default::default()
                })
                .await;
        }
        store.upsert_edge(GraphEdge::new("a", "b", "link")).await;
        store.upsert_edge(GraphEdge::new("c", "a", "link")).await;
        store.upsert_edge(GraphEdge::new("a", "a", "link")).await;
        store.upsert_edge(GraphEdge::new("b", "a", "link")).await;
        store.set_embedding("a", vec![1.0, 0.0]).await;
        store.set_embedding("d", vec![0.9, 0.2]).await;
        store
    }

    #[tokio::test]
    async fn physical_neighbors_dedupe_and_skip_self_loops() {
        let stores = PathStores::from_backend(store().await);
        let ctx = SearchContext::new("a", "d", 4);
        let provider = NeighborProvider::new(stores, &ctx, DEFAULT_NEIGHBOR_LIMIT);

        let ids: Vec<String> = provider
            .physical_neighbors("a", 20)
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn smart_neighbors_add_semantic_for_sparse_nodes() {
        let stores = PathStores::from_backend(store().await);
        let ctx = SearchContext::new("a", "d", 4);
        let provider = NeighborProvider::new(stores, &ctx, DEFAULT_NEIGHBOR_LIMIT);

        let neighbors = provider.smart_neighbors("a", true).await.unwrap();
        assert_eq!(neighbors.len(), 3);
        assert!(neighbors[2].connection.is_semantic());
        assert_eq!(neighbors[2].id, "d");
    }

    #[tokio::test]
    async fn endpoint_vectors_come_from_context_or_store() {
        let stores = PathStores::from_backend(store().await);
        let bare = SearchContext::new("a", "b", 4);
        let provider = NeighborProvider::new(stores.clone(), &bare, DEFAULT_NEIGHBOR_LIMIT);
        let loaded = provider.embedding("a").await.unwrap().expect("stored vector");
        assert_eq!(*loaded, vec![1.0, 0.0]);

        let seeded = SearchContext::new("b", "c", 4).with_vectors(Some(vec![0.0, 1.0]), None);
        let provider = NeighborProvider::new(stores, &seeded, DEFAULT_NEIGHBOR_LIMIT);
        let from_ctx = provider.embedding("b").await.unwrap().expect("context vector");
        assert_eq!(*from_ctx, vec![0.0, 1.0]);
        assert!(provider.embedding("c").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn semantic_is_empty_without_embeddings_or_when_disabled() {
        let stores = PathStores::from_backend(store().await);
        let ctx = SearchContext::new("b", "d", 4);
        let provider = NeighborProvider::new(stores.clone(), &ctx, DEFAULT_NEIGHBOR_LIMIT);
        assert!(provider.semantic_neighbors("b", 5, &[]).await.unwrap().is_empty());

        let off = SearchContext::new("a", "d", 4).with_semantic(false);
        let provider = NeighborProvider::new(stores, &off, DEFAULT_NEIGHBOR_LIMIT);
        assert!(provider.semantic_neighbors("a", 5, &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn folder_filters_keep_endpoints() {
        let stores = PathStores::from_backend(store().await);
        let ctx = SearchContext::new("b", "c", 4).with_filters(PathFilters {
            exclude_folders: vec!["archive".into(), "projects".into()],
            ..Default::default()
        });
        let provider = NeighborProvider::new(stores, &ctx, DEFAULT_NEIGHBOR_LIMIT);

        let ids: Vec<String> = provider
            .physical_neighbors("a", 20)
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec!["b", "c"]);

        let from_c = provider.physical_neighbors("c", 20).await.unwrap();
        assert!(from_c.is_empty(), "non-endpoint a lives in an excluded folder");
    }
}
