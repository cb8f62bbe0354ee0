//! A* search pulled toward the end note's embedding.
//!
//! The heuristic is `1 - cosine(node, end)`. It
//! is not admissible against the edge weights below, so the result is a good
//! route rather than a provably shortest one.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use tracing::debug;

use crate::context::SearchContext;
use crate::errors::GraphResult;
use crate::models::{Connection, NeighborNode, PathSegment, ScoredPath, Strategy};
use crate::neighbors::NeighborProvider;
use crate::repository::PathStores;
use crate::vector::cosine_similarity;

pub const PHYSICAL_WEIGHT: f64 = 1.0;
pub const SEMANTIC_WEIGHT: f64 = 1.5;
pub const CONSECUTIVE_SEMANTIC_WEIGHT: f64 = 2.0;
pub const HEURISTIC_SCALE: f64 = 1.0;
/// Semantic hops in a row before only physical links are followed.
pub const MAX_SEMANTIC_STREAK: usize = 4;
pub const MIN_SEMANTIC_SIMILARITY: f64 = 0.5;
pub const EXPANSIONS_PER_HOP: usize = 50;

#[derive(Debug, Clone)]
struct AStarNode {
    node_id: String,
    g_cost: f64,
    h_cost: f64,
    f_cost: f64,
    parent: Option<usize>,
    connection: Connection,
    semantic_streak: usize,
    depth: usize,
}

/// Heap entry; lowest `f_cost` first, then insertion order.
#[derive(Debug)]
struct OpenEntry {
    f_cost: f64,
    order: usize,
    index: usize,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenEntry {}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f_cost
            .total_cmp(&self.f_cost)
            .then_with(|| other.order.cmp(&self.order))
    }
}

/// At most one path; empty when either endpoint lacks an embedding.
pub async fn find_fast_track_path(
    stores: &PathStores,
    ctx: &SearchContext,
    neighbor_limit: usize,
) -> GraphResult<Vec<ScoredPath>> {
    let Some(end_vector) = ctx.end_vector.clone() else {
        return Ok(Vec::new());
    };
    if ctx.start_vector.is_none() {
        return Ok(Vec::new());
    }

    let provider = NeighborProvider::new(stores.clone(), ctx, neighbor_limit);
    let heuristic = |vector: Option<&[f32]>| match vector {
        Some(v) => (1.0 - cosine_similarity(v, &end_vector)).max(0.0) * HEURISTIC_SCALE,
        None => HEURISTIC_SCALE,
    };

    let mut arena: Vec<AStarNode> = Vec::new();
    let mut open = BinaryHeap::new();
    let mut best_g: HashMap<String, f64> = HashMap::new();
    let mut closed: HashSet<String> = HashSet::new();
    let mut order = 0usize;

    let start_h = heuristic(ctx.start_vector.as_deref().map(Vec::as_slice));
    arena.push(AStarNode {
        node_id: ctx.start_id.clone(),
        g_cost: 0.0,
        h_cost: start_h,
        f_cost: start_h,
        parent: None,
        connection: Connection::Physical,
        semantic_streak: 0,
        depth: 0,
    });
    best_g.insert(ctx.start_id.clone(), 0.0);
    open.push(OpenEntry {
        f_cost: start_h,
        order,
        index: 0,
    });

    let budget = ctx.max_hops * EXPANSIONS_PER_HOP;
    let mut expansions = 0usize;
    while let Some(entry) = open.pop() {
        if expansions >= budget {
            debug!(expansions, "fast track expansion budget exhausted");
            break;
        }
        expansions += 1;

        let current = arena[entry.index].clone();
        if current.node_id == ctx.end_id {
            debug!(
                expansions,
                cost = current.f_cost,
                remaining = current.h_cost,
                "fast track reached the end note"
            );
            let segments = reconstruct(&arena, entry.index);
            return Ok(vec![ScoredPath::new(Strategy::FastTrack, segments)]);
        }
        if !closed.insert(current.node_id.clone()) || current.depth >= ctx.max_hops {
            continue;
        }

        let neighbors = expand(&provider, &current).await?;
        for neighbor in neighbors {
            if closed.contains(&neighbor.id)
                || ctx.is_forbidden(&current.node_id, &neighbor.id)
                || on_branch(&arena, entry.index, &neighbor.id)
            {
                continue;
            }
            let Some(weight) = hop_weight(&current.connection, &neighbor.connection) else {
                continue;
            };
            let g_cost = current.g_cost + weight;
            if best_g
                .get(&neighbor.id)
                .is_some_and(|known| *known <= g_cost)
            {
                continue;
            }
            best_g.insert(neighbor.id.clone(), g_cost);

            let vector = provider.embedding(&neighbor.id).await?;
            let h_cost = heuristic(vector.as_deref().map(Vec::as_slice));
            let semantic_streak = if neighbor.connection.is_semantic() {
                current.semantic_streak + 1
            } else {
                0
            };
            order += 1;
            arena.push(AStarNode {
                node_id: neighbor.id,
                g_cost,
                h_cost,
                f_cost: g_cost + h_cost,
                parent: Some(entry.index),
                connection: neighbor.connection,
                semantic_streak,
                depth: current.depth + 1,
            });
            open.push(OpenEntry {
                f_cost: g_cost + h_cost,
                order,
                index: arena.len() - 1,
            });
        }
    }

    Ok(Vec::new())
}

/// Cost of stepping over `next` after arriving via `previous`. `None` for
/// semantic links under the similarity floor.
fn hop_weight(previous: &Connection, next: &Connection) -> Option<f64> {
    match *next {
        Connection::Physical => Some(PHYSICAL_WEIGHT),
        Connection::Semantic { similarity } if similarity < MIN_SEMANTIC_SIMILARITY => None,
        Connection::Semantic { .. } if previous.is_semantic() => Some(CONSECUTIVE_SEMANTIC_WEIGHT),
        Connection::Semantic { .. } => Some(SEMANTIC_WEIGHT),
    }
}

async fn expand(provider: &NeighborProvider, node: &AStarNode) -> GraphResult<Vec<NeighborNode>> {
    if node.semantic_streak >= MAX_SEMANTIC_STREAK || !provider.semantic_enabled() {
        provider
            .physical_neighbors(&node.node_id, provider.physical_limit())
            .await
    } else {
        provider.mixed_neighbors(&node.node_id).await
    }
}

fn on_branch(arena: &[AStarNode], mut index: usize, id: &str) -> bool {
    loop {
        let node = &arena[index];
        if node.node_id == id {
            return true;
        }
        match node.parent {
            Some(parent) => index = parent,
            None => return false,
        }
    }
}

fn reconstruct(arena: &[AStarNode], mut index: usize) -> Vec<PathSegment> {
    let mut segments = Vec::new();
    loop {
        let node = &arena[index];
        segments.push(PathSegment::new(node.node_id.clone(), node.connection));
        match node.parent {
            Some(parent) => index = parent,
            None => break,
        }
    }
    segments.reverse();
    segments
}
