use std::collections::HashSet;
use std::sync::Arc;

use crate::models::{EdgeKey, PathFilters};

/// Hard cap on hops for every strategy except the fallback.
pub const MAX_HOPS_LIMIT: usize = 10;
/// Hard cap for the fallback search, which doubles the hop budget.
pub const FALLBACK_MAX_HOPS_LIMIT: usize = 16;
pub const FALLBACK_MIN_HOPS: usize = 8;

/// Per-search state handed to a strategy.
///
/// Values are cheap to clone and never mutated in place: blocking an edge
/// returns a new context, so strategies running side by side cannot see each
/// other's forbidden edges.
#[derive(Debug, Clone)]
pub struct SearchContext {
    pub start_id: String,
    pub end_id: String,
    pub start_vector: Option<Arc<Vec<f32>>>,
    pub end_vector: Option<Arc<Vec<f32>>>,
    pub max_hops: usize,
    pub filters: Arc<PathFilters>,
    pub include_semantic: bool,
    forbidden_edges: Arc<HashSet<EdgeKey>>,
}

impl SearchContext {
    pub fn new(start_id: impl Into<String>, end_id: impl Into<String>, max_hops: usize) -> Self {
        Self {
            start_id: start_id.into(),
            end_id: end_id.into(),
            start_vector: None,
            end_vector: None,
            max_hops: max_hops.clamp(1, MAX_HOPS_LIMIT),
            filters: Arc::new(PathFilters::default()),
            include_semantic: true,
            forbidden_edges: Arc::new(HashSet::new()),
        }
    }

    pub fn with_vectors(mut self, start: Option<Vec<f32>>, end: Option<Vec<f32>>) -> Self {
        self.start_vector = start.map(Arc::new);
        self.end_vector = end.map(Arc::new);
        self
    }

    pub fn with_filters(mut self, filters: PathFilters) -> Self {
        self.filters = Arc::new(filters);
        self
    }

    pub fn with_semantic(mut self, include_semantic: bool) -> Self {
        self.include_semantic = include_semantic;
        self
    }

    /// Both endpoint embeddings are known.
    pub fn has_embeddings(&self) -> bool {
        self.start_vector.is_some() && self.end_vector.is_some()
    }

    pub fn is_forbidden(&self, a: &str, b: &str) -> bool {
        !self.forbidden_edges.is_empty() && self.forbidden_edges.contains(&EdgeKey::new(a, b))
    }

    pub fn forbidden_edges(&self) -> &HashSet<EdgeKey> {
        &self.forbidden_edges
    }

    /// Copy of this context with `edge` forbidden.
    pub fn block_edge(&self, edge: EdgeKey) -> Self {
        let mut forbidden = (*self.forbidden_edges).clone();
        forbidden.insert(edge);
        Self {
            forbidden_edges: Arc::new(forbidden),
            ..self.clone()
        }
    }

    /// Relaxed copy for the last-resort search: no forbidden edges, semantic
    /// links forced on, and a doubled hop budget of at least
    /// [`FALLBACK_MIN_HOPS`].
    pub fn for_fallback(&self) -> Self {
        Self {
            max_hops: (self.max_hops * 2)
                .max(FALLBACK_MIN_HOPS)
                .min(FALLBACK_MAX_HOPS_LIMIT),
            include_semantic: true,
            forbidden_edges: Arc::new(HashSet::new()),
            ..self.clone()
        }
    }

    pub fn is_endpoint(&self, id: &str) -> bool {
        id == self.start_id || id == self.end_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocking_does_not_touch_the_original() {
        let base = SearchContext::new("a", "c", 4);
        let blocked = base.block_edge(EdgeKey::new("b", "a"));
        assert!(blocked.is_forbidden("a", "b"));
        assert!(!base.is_forbidden("a", "b"));
        assert!(base.forbidden_edges().is_empty());
    }

    #[test]
    fn hop_limits_are_clamped() {
        assert_eq!(SearchContext::new("a", "b", 99).max_hops, MAX_HOPS_LIMIT);
        assert_eq!(SearchContext::new("a", "b", 0).max_hops, 1);
    }

    #[test]
    fn fallback_doubles_hops_and_clears_blocks() {
        let ctx = SearchContext::new("a", "b", 3)
            .with_semantic(false)
            .block_edge(EdgeKey::new("a", "x"));
        let fallback = ctx.for_fallback();
        assert_eq!(fallback.max_hops, 8);
        assert!(fallback.include_semantic);
        assert!(fallback.forbidden_edges().is_empty());

        let wide = SearchContext::new("a", "b", 10).for_fallback();
        assert_eq!(wide.max_hops, FALLBACK_MAX_HOPS_LIMIT);
    }
}
