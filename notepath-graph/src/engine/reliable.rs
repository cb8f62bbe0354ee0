use tracing::debug;

use crate::bfs::{BfsOptions, bidirectional_bfs, key_edge};
use crate::context::SearchContext;
use crate::errors::GraphResult;
use crate::models::{ScoredPath, Strategy};
use crate::neighbors::{NeighborMode, NeighborProvider};
use crate::repository::PathStores;

pub const RELIABLE_ITERATIONS: usize = 3;

/// Physical-only routes. Each found path blocks its key edge so the next
/// iteration has to take a different way.
pub async fn find_reliable_paths(
    stores: &PathStores,
    ctx: &SearchContext,
    neighbor_limit: usize,
) -> GraphResult<Vec<ScoredPath>> {
    let provider = NeighborProvider::new(stores.clone(), ctx, neighbor_limit);
    let options = BfsOptions::new(NeighborMode::Physical);
    let mut ctx = ctx.clone();
    let mut paths = Vec::new();

    for iteration in 0..RELIABLE_ITERATIONS {
        let Some(segments) = bidirectional_bfs(&provider, &ctx, &options).await? else {
            debug!(iteration, "reliable search exhausted");
            break;
        };
        let blocked = key_edge(&segments);
        paths.push(ScoredPath::new(Strategy::Reliable, segments));

        match blocked {
            Some(edge) => ctx = ctx.block_edge(edge),
            None => break,
        }
    }

    Ok(paths)
}
