use std::collections::BTreeSet;

use tracing::debug;

use crate::bfs::{BfsOptions, bidirectional_bfs, key_edge};
use crate::context::SearchContext;
use crate::errors::GraphResult;
use crate::models::{PathSegment, ScoredPath, Strategy, folder_of};
use crate::neighbors::{NeighborMode, NeighborProvider};
use crate::repository::PathStores;

pub const BRAINSTORM_ITERATIONS: usize = 3;
/// Average semantic similarity that makes a single-folder path worth keeping.
pub const STRONG_SEMANTIC_SIMILARITY: f64 = 0.7;

/// Routes that cross folders, or ride strong semantic links.
pub async fn find_brainstorm_paths(
    stores: &PathStores,
    ctx: &SearchContext,
    neighbor_limit: usize,
) -> GraphResult<Vec<ScoredPath>> {
    let provider = NeighborProvider::new(stores.clone(), ctx, neighbor_limit);
    let endpoints = stores
        .documents
        .get_by_ids(&[ctx.start_id.clone(), ctx.end_id.clone()])
        .await?;
    let folder_for = |id: &str| {
        endpoints
            .iter()
            .find(|doc| doc.id == id)
            .map(|doc| folder_of(&doc.path).to_string())
    };
    let start_folder = folder_for(&ctx.start_id);
    let end_folder = folder_for(&ctx.end_id);
    let same_folder = start_folder.is_some() && start_folder == end_folder;

    let mut ctx = ctx.clone();
    let mut paths = Vec::new();
    for iteration in 0..BRAINSTORM_ITERATIONS {
        let mut options = BfsOptions::new(NeighborMode::Smart);
        if (iteration == 0 || same_folder)
            && let Some(folder) = &end_folder
        {
            options = options.prefer_outside(folder.clone());
        }

        let Some(segments) = bidirectional_bfs(&provider, &ctx, &options).await? else {
            break;
        };
        let blocked = key_edge(&segments);

        match insight_for(stores, &segments).await? {
            Some(insight) => {
                paths.push(ScoredPath::new(Strategy::Brainstorm, segments).with_insight(insight));
            }
            None => debug!(iteration, "brainstorm path stayed inside one domain"),
        }

        match blocked {
            Some(edge) => ctx = ctx.block_edge(edge),
            None => break,
        }
    }

    Ok(paths)
}

/// Insight label for an accepted path, `None` when the path is rejected.
async fn insight_for(stores: &PathStores, segments: &[PathSegment]) -> GraphResult<Option<String>> {
    let ids: Vec<String> = segments.iter().map(|s| s.node_id.clone()).collect();
    let folders: BTreeSet<String> = stores
        .documents
        .get_by_ids(&ids)
        .await?
        .iter()
        .map(|doc| folder_of(&doc.path).to_string())
        .collect();

    let similarities: Vec<f64> = segments
        .iter()
        .skip(1)
        .filter_map(|s| s.connection.similarity())
        .collect();
    let semantic_average = if similarities.is_empty() {
        None
    } else {
        Some(similarities.iter().sum::<f64>() / similarities.len() as f64)
    };

    let label = match folders.len() {
        n if n >= 3 => Some(format!("Cross-domain bridge spanning {n} folders")),
        2 => Some("Bridges two domains".to_string()),
        _ => semantic_average
            .filter(|avg| *avg > STRONG_SEMANTIC_SIMILARITY)
            .map(|avg| format!("Strong semantic resonance ({:.0}% average)", avg * 100.0)),
    };
    Ok(label)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::memory::InMemoryStore;
    use crate::models::{DocMeta, GraphEdge};
    use crate::neighbors::DEFAULT_NEIGHBOR_LIMIT;

    async fn vault(notes: &[(&str, &str)], edges: &[(&str, &str)]) -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        for (id, path) in notes {
            store
                .upsert_document(DocMeta {
                    id: id.to_string(),
                    path: path.to_string(),
                    ..Default::default()
                })
                .await;
        }
        for (from, to) in edges {
            store.upsert_edge(GraphEdge::new(*from, *to, "link")).await;
        }
        store
    }

    fn ids(path: &ScoredPath) -> Vec<&str> {
        path.node_ids().collect()
    }

    #[tokio::test]
    async fn accepts_a_route_through_another_folder() {
        let store = vault(
            &[("a", "x/a.md"), ("b", "y/b.md"), ("c", "x/c.md")],
            &[("a", "b"), ("b", "c")],
        )
        .await;
        let stores = PathStores::from_backend(store);
        let ctx = SearchContext::new("a", "c", 4).with_semantic(false);

        let paths = find_brainstorm_paths(&stores, &ctx, DEFAULT_NEIGHBOR_LIMIT)
            .await
            .unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(ids(&paths[0]), vec!["a", "b", "c"]);
        assert_eq!(paths[0].strategy, Strategy::Brainstorm);
        assert_eq!(paths[0].insight_label.as_deref(), Some("Bridges two domains"));
    }

    #[tokio::test]
    async fn rejects_routes_that_stay_in_one_folder() {
        let store = vault(
            &[("a", "x/a.md"), ("b", "x/b.md"), ("c", "x/c.md")],
            &[("a", "b"), ("b", "c")],
        )
        .await;
        let stores = PathStores::from_backend(store);
        let ctx = SearchContext::new("a", "c", 4).with_semantic(false);

        let paths = find_brainstorm_paths(&stores, &ctx, DEFAULT_NEIGHBOR_LIMIT)
            .await
            .unwrap();
        assert!(paths.is_empty());
    }

    #[tokio::test]
    async fn blocks_a_rejected_route_and_tries_again() {
        // a-b-c is shorter but stays in `x`; the detour through `y` is kept.
        let store = vault(
            &[
                ("a", "x/a.md"),
                ("b", "x/b.md"),
                ("c", "x/c.md"),
                ("d", "y/d.md"),
                ("e", "y/e.md"),
            ],
            &[("a", "b"), ("b", "c"), ("a", "d"), ("d", "e"), ("e", "c")],
        )
        .await;
        let stores = PathStores::from_backend(store);
        let ctx = SearchContext::new("a", "c", 4).with_semantic(false);

        let paths = find_brainstorm_paths(&stores, &ctx, DEFAULT_NEIGHBOR_LIMIT)
            .await
            .unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(ids(&paths[0]), vec!["a", "d", "e", "c"]);
    }

    #[tokio::test]
    async fn outside_folder_neighbors_are_tried_first() {
        // Both middles reach c in two hops; the one outside `x` wins.
        let store = vault(
            &[("a", "x/a.md"), ("b", "x/b.md"), ("c", "x/c.md"), ("d", "y/d.md")],
            &[("a", "b"), ("b", "c"), ("a", "d"), ("d", "c")],
        )
        .await;
        let stores = PathStores::from_backend(store);
        let ctx = SearchContext::new("a", "c", 4).with_semantic(false);

        let paths = find_brainstorm_paths(&stores, &ctx, DEFAULT_NEIGHBOR_LIMIT)
            .await
            .unwrap();
        assert_eq!(ids(&paths[0]), vec!["a", "d", "c"]);
    }

    #[tokio::test]
    async fn strong_semantic_links_pass_inside_one_folder() {
        let store = vault(&[("a", "x/a.md"), ("c", "x/c.md")], &[]).await;
        store.set_embedding("a", vec![1.0, 0.0]).await;
        store.set_embedding("c", vec![0.8, 0.6]).await;
        let stores = PathStores::from_backend(store.clone());
        let ctx = SearchContext::new("a", "c", 4);

        let paths = find_brainstorm_paths(&stores, &ctx, DEFAULT_NEIGHBOR_LIMIT)
            .await
            .unwrap();
        assert_eq!(paths.len(), 1);
        assert!(paths[0].segments[1].connection.is_semantic());
        assert_eq!(
            paths[0].insight_label.as_deref(),
            Some("Strong semantic resonance (80% average)")
        );

        store.set_embedding("c", vec![0.6, 0.8]).await;
        let paths = find_brainstorm_paths(&stores, &ctx, DEFAULT_NEIGHBOR_LIMIT)
            .await
            .unwrap();
        assert!(paths.is_empty(), "0.6 similarity is not strong enough");
    }
}
