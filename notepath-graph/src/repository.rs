//! Storage seams used by the path finder.
//!
//! Every lookup is batched where the engine needs more than one record, and
//! missing data is reported as "absent" (empty vectors, `None`) rather than as
//! an error. Errors are reserved for genuine backend failures.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::GraphResult;
use crate::models::{DocMeta, DocStatistics, GraphEdge, GraphNode};

#[async_trait]
pub trait GraphRepository: Send + Sync {
    async fn get_by_id(&self, id: &str) -> GraphResult<Option<GraphNode>>;

    /// Unknown ids are skipped.
    async fn get_by_ids(&self, ids: &[String]) -> GraphResult<Vec<GraphNode>>;

    /// Edges touching `node_id` in either direction, at most `limit` of them.
    async fn get_all_edges_for_node(&self, node_id: &str, limit: usize)
    -> GraphResult<Vec<GraphEdge>>;

    /// Edges pointing at `node_id`. Used to find common parents.
    async fn get_incoming_edges(&self, node_id: &str) -> GraphResult<Vec<GraphEdge>>;
}

#[async_trait]
pub trait DocumentRepository: Send + Sync {
    async fn get_by_path(&self, path: &str) -> GraphResult<Option<DocMeta>>;

    async fn get_by_ids(&self, ids: &[String]) -> GraphResult<Vec<DocMeta>>;
}

#[async_trait]
pub trait EmbeddingRepository: Send + Sync {
    /// Mean of the document's chunk vectors, if it was embedded.
    async fn get_average_embedding(&self, doc_id: &str) -> GraphResult<Option<Vec<f32>>>;

    /// Nearest documents by cosine similarity, best first, excluding `exclude`.
    async fn find_similar(
        &self,
        vector: &[f32],
        limit: usize,
        exclude: &[String],
    ) -> GraphResult<Vec<(String, f64)>>;
}

#[async_trait]
pub trait StatisticsRepository: Send + Sync {
    async fn get_by_doc_ids(&self, ids: &[String]) -> GraphResult<HashMap<String, DocStatistics>>;
}

/// The four repositories the engine reads from.
#[derive(Clone)]
pub struct PathStores {
    pub graph: Arc<dyn GraphRepository>,
    pub documents: Arc<dyn DocumentRepository>,
    pub embeddings: Arc<dyn EmbeddingRepository>,
    pub statistics: Arc<dyn StatisticsRepository>,
}

impl PathStores {
    /// Use one backend for every repository.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: GraphRepository + DocumentRepository + EmbeddingRepository + StatisticsRepository + 'static,
    {
        Self {
            graph: backend.clone(),
            documents: backend.clone(),
            embeddings: backend.clone(),
            statistics: backend,
        }
    }
}

impl std::fmt::Debug for PathStores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathStores").finish_non_exhaustive()
    }
}
