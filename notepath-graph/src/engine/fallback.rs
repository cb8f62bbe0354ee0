use crate::bfs::{BfsOptions, bidirectional_bfs};
use crate::context::SearchContext;
use crate::errors::GraphResult;
use crate::models::{ScoredPath, Strategy};
use crate::neighbors::{NeighborMode, NeighborProvider};
use crate::repository::PathStores;

pub const FALLBACK_REASONING: &str = "Degraded result: no regular strategy connected these notes, \
so this route was found with semantic links forced on and a doubled hop budget. \
Treat it as a lead, not as an established connection.";

/// Last resort once every other strategy came back empty.
pub async fn find_fallback_path(
    stores: &PathStores,
    ctx: &SearchContext,
    neighbor_limit: usize,
) -> GraphResult<Vec<ScoredPath>> {
    let relaxed = ctx.for_fallback();
    let provider = NeighborProvider::new(stores.clone(), &relaxed, neighbor_limit);
    let found = bidirectional_bfs(&provider, &relaxed, &BfsOptions::new(NeighborMode::Mixed)).await?;
    Ok(found
        .map(|segments| {
            ScoredPath::new(Strategy::Fallback, segments).with_reasoning(FALLBACK_REASONING)
        })
        .into_iter()
        .collect())
}
