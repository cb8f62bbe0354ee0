//! Chronological search: follow notes whose timestamps move from the start
//! note toward the end note.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::context::SearchContext;
use crate::errors::GraphResult;
use crate::models::{Connection, NeighborNode, PathSegment, ScoredPath, Strategy};
use crate::neighbors::NeighborProvider;
use crate::repository::PathStores;

pub const TEMPORAL_PHYSICAL_LIMIT: usize = 10;
pub const TEMPORAL_SEMANTIC_LIMIT: usize = 3;
pub const TEMPORAL_SPARSE_THRESHOLD: usize = 3;
pub const TEMPORAL_LEVEL_CAP: usize = 5;
pub const TEMPORAL_WINDOW_MS: i64 = 7 * 24 * 60 * 60 * 1000;

#[derive(Debug, Clone)]
struct Reached {
    parent: Option<String>,
    connection: Connection,
    /// Time used for ordering; inherited from the parent when unknown.
    effective_ms: i64,
    timestamp: Option<i64>,
}

/// At most one path. Gives up quietly once `timeout` elapses.
pub async fn find_temporal_path(
    stores: &PathStores,
    ctx: &SearchContext,
    timeout: Duration,
) -> GraphResult<Vec<ScoredPath>> {
    match tokio::time::timeout(timeout, temporal_bfs(stores, ctx)).await {
        Ok(result) => result,
        Err(_) => {
            debug!(timeout_ms = timeout.as_millis() as u64, "temporal search timed out");
            Ok(Vec::new())
        }
    }
}

async fn temporal_bfs(stores: &PathStores, ctx: &SearchContext) -> GraphResult<Vec<ScoredPath>> {
    let provider = NeighborProvider::new(stores.clone(), ctx, TEMPORAL_PHYSICAL_LIMIT)
        .with_semantic_limit(TEMPORAL_SEMANTIC_LIMIT);
    let times = timestamps(stores, &[ctx.start_id.clone(), ctx.end_id.clone()]).await?;
    let start_time = times.get(&ctx.start_id).copied();
    let end_time = times.get(&ctx.end_id).copied();
    let now = Utc::now().timestamp_millis();
    let start_effective = start_time.unwrap_or(now);
    let target = end_time.unwrap_or(start_effective);
    let forward = start_effective <= target;

    let mut reached: HashMap<String, Reached> = HashMap::new();
    reached.insert(
        ctx.start_id.clone(),
        Reached {
            parent: None,
            connection: Connection::Physical,
            effective_ms: start_effective,
            timestamp: start_time,
        },
    );
    let mut frontier = vec![ctx.start_id.clone()];

    for _ in 0..ctx.max_hops {
        let mut candidates: Vec<(String, String, Connection)> = Vec::new();
        let mut queued = HashSet::new();
        for node_id in &frontier {
            for neighbor in neighbors(&provider, node_id).await? {
                if ctx.is_forbidden(node_id, &neighbor.id) {
                    continue;
                }
                if neighbor.id == ctx.end_id {
                    reached.insert(
                        neighbor.id.clone(),
                        Reached {
                            parent: Some(node_id.clone()),
                            connection: neighbor.connection,
                            effective_ms: target,
                            timestamp: end_time,
                        },
                    );
                    let segments = reconstruct(&reached, &ctx.end_id);
                    let reasoning = evolution_text(start_time, end_time, forward);
                    return Ok(vec![
                        ScoredPath::new(Strategy::Temporal, segments).with_reasoning(reasoning),
                    ]);
                }
                if reached.contains_key(&neighbor.id) || !queued.insert(neighbor.id.clone()) {
                    continue;
                }
                candidates.push((neighbor.id, node_id.clone(), neighbor.connection));
            }
        }
        if candidates.is_empty() {
            break;
        }

        let candidate_ids: Vec<String> = candidates.iter().map(|(id, _, _)| id.clone()).collect();
        let candidate_times = timestamps(stores, &candidate_ids).await?;
        let mut level: Vec<(String, Reached)> = candidates
            .into_iter()
            .filter_map(|(id, parent, connection)| {
                let parent_ms = reached.get(&parent).map(|r| r.effective_ms)?;
                let timestamp = candidate_times.get(&id).copied();
                let effective_ms = timestamp.unwrap_or(parent_ms);
                let in_window = if forward {
                    effective_ms >= parent_ms - TEMPORAL_WINDOW_MS
                } else {
                    effective_ms <= parent_ms + TEMPORAL_WINDOW_MS
                };
                in_window.then(|| {
                    (
                        id,
                        Reached {
                            parent: Some(parent),
                            connection,
                            effective_ms,
                            timestamp,
                        },
                    )
                })
            })
            .collect();
        level.sort_by_key(|(id, r)| ((r.effective_ms - target).abs(), id.clone()));
        level.truncate(TEMPORAL_LEVEL_CAP);

        frontier = level.iter().map(|(id, _)| id.clone()).collect();
        reached.extend(level);
        if frontier.is_empty() {
            break;
        }
    }

    Ok(Vec::new())
}

async fn neighbors(provider: &NeighborProvider, node_id: &str) -> GraphResult<Vec<NeighborNode>> {
    let mut found = provider
        .physical_neighbors(node_id, TEMPORAL_PHYSICAL_LIMIT)
        .await?;
    if found.len() < TEMPORAL_SPARSE_THRESHOLD && provider.semantic_enabled() {
        let exclude: Vec<String> = found.iter().map(|n| n.id.clone()).collect();
        found.extend(
            provider
                .semantic_neighbors(node_id, TEMPORAL_SEMANTIC_LIMIT, &exclude)
                .await?,
        );
    }
    Ok(found)
}

/// `mtime`, falling back to `ctime`, for every id that has one.
async fn timestamps(stores: &PathStores, ids: &[String]) -> GraphResult<HashMap<String, i64>> {
    Ok(stores
        .documents
        .get_by_ids(ids)
        .await?
        .into_iter()
        .filter_map(|doc| doc.timestamp().map(|ts| (doc.id, ts)))
        .collect())
}

fn reconstruct(reached: &HashMap<String, Reached>, end_id: &str) -> Vec<PathSegment> {
    let mut segments = Vec::new();
    let mut cursor = Some(end_id.to_string());
    while let Some(id) = cursor {
        let Some(entry) = reached.get(&id) else {
            break;
        };
        segments.push(PathSegment {
            node_id: id,
            connection: entry.connection,
            timestamp: entry.timestamp,
        });
        cursor = entry.parent.clone();
    }
    segments.reverse();
    segments
}

fn format_day(ms: Option<i64>) -> String {
    ms.and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "an undated note".to_string())
}

fn evolution_text(start: Option<i64>, end: Option<i64>, forward: bool) -> String {
    let direction = if forward { "" } else { " (traced backwards)" };
    format!(
        "thought evolution from {} to {}{direction}",
        format_day(start),
        format_day(end)
    )
}
