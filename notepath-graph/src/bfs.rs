//! Bidirectional breadth-first search shared by the BFS-based strategies.

use std::collections::HashMap;

use tracing::trace;

use crate::context::SearchContext;
use crate::errors::GraphResult;
use crate::models::{Connection, EdgeKey, NeighborNode, PathSegment, folder_of};
use crate::neighbors::{NeighborMode, NeighborProvider};

#[derive(Debug, Clone)]
pub struct BfsOptions {
    pub mode: NeighborMode,
    /// Expand neighbors outside this folder before the others.
    pub prefer_outside_folder: Option<String>,
}

impl BfsOptions {
    pub fn new(mode: NeighborMode) -> Self {
        Self {
            mode,
            prefer_outside_folder: None,
        }
    }

    pub fn prefer_outside(mut self, folder: impl Into<String>) -> Self {
        self.prefer_outside_folder = Some(folder.into());
        self
    }
}

#[derive(Debug, Clone)]
struct Visit {
    parent: Option<String>,
    connection: Connection,
}

type Visited = HashMap<String, Visit>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Start,
    End,
}

/// Search from both endpoints until the frontiers meet.
///
/// Each expansion consumes one BFS level of one side, so a collision after
/// `n` expansions yields a path of at most `n` hops. Returns `None` when the
/// frontiers are exhausted or `ctx.max_hops` levels were used.
pub async fn bidirectional_bfs(
    provider: &NeighborProvider,
    ctx: &SearchContext,
    options: &BfsOptions,
) -> GraphResult<Option<Vec<PathSegment>>> {
    if ctx.start_id == ctx.end_id {
        return Ok(Some(vec![PathSegment::origin(ctx.start_id.clone())]));
    }

    let mut start_visited = Visited::new();
    let mut end_visited = Visited::new();
    start_visited.insert(ctx.start_id.clone(), root_visit());
    end_visited.insert(ctx.end_id.clone(), root_visit());
    let mut start_frontier = vec![ctx.start_id.clone()];
    let mut end_frontier = vec![ctx.end_id.clone()];

    let mut side = Side::Start;
    for level in 0..ctx.max_hops {
        if start_frontier.is_empty() && end_frontier.is_empty() {
            break;
        }
        side = match side {
            Side::Start if start_frontier.is_empty() => Side::End,
            Side::End if end_frontier.is_empty() => Side::Start,
            current => current,
        };

        let collision = match side {
            Side::Start => {
                expand_frontier(
                    provider,
                    ctx,
                    options,
                    &mut start_frontier,
                    &mut start_visited,
                    &end_visited,
                )
                .await?
            }
            Side::End => {
                expand_frontier(
                    provider,
                    ctx,
                    options,
                    &mut end_frontier,
                    &mut end_visited,
                    &start_visited,
                )
                .await?
            }
        };

        if let Some(meeting) = collision {
            trace!(level, meeting = %meeting, "frontiers met");
            return Ok(Some(reconstruct(&meeting, &start_visited, &end_visited)));
        }

        side = match side {
            Side::Start => Side::End,
            Side::End => Side::Start,
        };
    }

    Ok(None)
}

fn root_visit() -> Visit {
    Visit {
        parent: None,
        connection: Connection::Physical,
    }
}

/// Expand every node of `frontier` by one level. Returns the first neighbor
/// already reached by the other side.
async fn expand_frontier(
    provider: &NeighborProvider,
    ctx: &SearchContext,
    options: &BfsOptions,
    frontier: &mut Vec<String>,
    visited: &mut Visited,
    other_visited: &Visited,
) -> GraphResult<Option<String>> {
    let mut next = Vec::new();
    for node_id in std::mem::take(frontier) {
        let mut neighbors = provider.neighbors(&node_id, options.mode).await?;
        if let Some(folder) = &options.prefer_outside_folder {
            prefer_outside_folder(provider, &mut neighbors, folder).await?;
        }

        for neighbor in neighbors {
            if ctx.is_forbidden(&node_id, &neighbor.id) || visited.contains_key(&neighbor.id) {
                continue;
            }
            visited.insert(
                neighbor.id.clone(),
                Visit {
                    parent: Some(node_id.clone()),
                    connection: neighbor.connection,
                },
            );
            if other_visited.contains_key(&neighbor.id) {
                return Ok(Some(neighbor.id));
            }
            next.push(neighbor.id);
        }
    }
    *frontier = next;
    Ok(None)
}

/// Stable reorder: documents outside `folder` first, everything else after.
async fn prefer_outside_folder(
    provider: &NeighborProvider,
    neighbors: &mut [NeighborNode],
    folder: &str,
) -> GraphResult<()> {
    if neighbors.len() < 2 {
        return Ok(());
    }
    let ids: Vec<String> = neighbors.iter().map(|n| n.id.clone()).collect();
    let folders: HashMap<String, String> = provider
        .stores()
        .documents
        .get_by_ids(&ids)
        .await?
        .into_iter()
        .map(|doc| {
            let folder = folder_of(&doc.path).to_string();
            (doc.id, folder)
        })
        .collect();
    neighbors.sort_by_key(|n| match folders.get(&n.id) {
        Some(f) if f != folder => 0u8,
        _ => 1u8,
    });
    Ok(())
}

fn reconstruct(meeting: &str, start_visited: &Visited, end_visited: &Visited) -> Vec<PathSegment> {
    let mut head = Vec::new();
    let mut cursor = Some(meeting.to_string());
    while let Some(id) = cursor {
        let Some(visit) = start_visited.get(&id) else {
            break;
        };
        head.push(PathSegment::new(id, visit.connection));
        cursor = visit.parent.clone();
    }
    head.reverse();
    if let Some(first) = head.first_mut() {
        first.connection = Connection::Physical;
    }

    let mut cursor = meeting.to_string();
    while let Some(visit) = end_visited.get(&cursor) {
        let Some(parent) = &visit.parent else {
            break;
        };
        head.push(PathSegment::new(parent.clone(), visit.connection));
        cursor = parent.clone();
    }
    head
}

/// Blocking priority of the hop between two adjacent segments. Similarity is
/// read as a percentage.
fn blocking_score(previous: &Connection, current: &Connection) -> f64 {
    let similarity = current.similarity().unwrap_or(0.0) * 100.0;
    match (previous.is_physical(), current.is_physical()) {
        (true, true) => 100.0 + similarity,
        (false, false) => similarity,
        _ => 50.0 + 0.5 * similarity,
    }
}

/// The edge whose removal most reliably forces a different route next time.
pub fn key_edge(segments: &[PathSegment]) -> Option<EdgeKey> {
    let mut best: Option<(f64, EdgeKey)> = None;
    for pair in segments.windows(2) {
        let score = blocking_score(&pair[0].connection, &pair[1].connection);
        if best.as_ref().is_none_or(|(top, _)| score > *top) {
            best = Some((score, EdgeKey::new(&pair[0].node_id, &pair[1].node_id)));
        }
    }
    best.map(|(_, edge)| edge)
}
