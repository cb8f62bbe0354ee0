//! Path scoring, deduplication and strategy diversity.
//!
//! ```text
//! total = physical_ratio * 35 + freshness * 25
//!       + min(domain_jumps, 3) / 3 * 20 + uniqueness * 15 - length * 0.5
//! ```

use std::collections::{HashMap, HashSet};

use crate::errors::GraphResult;
use crate::models::{Connection, DocStatistics, PathScore, ScoredPath, Strategy, folder_of};
use crate::repository::PathStores;

pub const PHYSICAL_RATIO_WEIGHT: f64 = 35.0;
pub const FRESHNESS_WEIGHT: f64 = 25.0;
pub const DOMAIN_JUMP_WEIGHT: f64 = 20.0;
pub const UNIQUENESS_WEIGHT: f64 = 15.0;
pub const LENGTH_PENALTY: f64 = 0.5;
pub const MAX_REWARDED_DOMAIN_JUMPS: usize = 3;
pub const FRESHNESS_HORIZON_MS: f64 = 30.0 * 24.0 * 60.0 * 60.0 * 1000.0;
pub const UNTRACKED_FRESHNESS: f64 = 0.5;

/// Drop paths whose exact node sequence was already seen. First one wins.
pub fn dedupe_paths(paths: Vec<ScoredPath>) -> Vec<ScoredPath> {
    let mut seen = HashSet::new();
    paths
        .into_iter()
        .filter(|path| seen.insert(path.sequence_key()))
        .collect()
}

/// Score every path in place with one statistics lookup and one document
/// lookup for the whole batch.
pub async fn score_paths(
    stores: &PathStores,
    paths: &mut [ScoredPath],
    now_ms: i64,
) -> GraphResult<()> {
    let mut ids: Vec<String> = paths
        .iter()
        .flat_map(|path| path.node_ids().map(str::to_string))
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    ids.sort();

    let statistics = stores.statistics.get_by_doc_ids(&ids).await?;
    let folders: HashMap<String, String> = stores
        .documents
        .get_by_ids(&ids)
        .await?
        .into_iter()
        .map(|doc| {
            let folder = folder_of(&doc.path).to_string();
            (doc.id, folder)
        })
        .collect();

    let uniqueness: Vec<f64> = (0..paths.len()).map(|i| uniqueness(i, paths)).collect();
    for (path, uniqueness) in paths.iter_mut().zip(uniqueness) {
        path.score = score_path(path, uniqueness, &statistics, &folders, now_ms);
    }
    Ok(())
}

pub fn score_path(
    path: &ScoredPath,
    uniqueness: f64,
    statistics: &HashMap<String, DocStatistics>,
    folders: &HashMap<String, String>,
    now_ms: i64,
) -> PathScore {
    let length = path.hops();
    let physical_ratio = physical_ratio(path);
    let freshness = freshness(path, statistics, now_ms);
    let domain_jumps = domain_jumps(path, folders);
    let uniqueness = uniqueness.clamp(0.0, 1.0);

    let total_score = physical_ratio * PHYSICAL_RATIO_WEIGHT
        + freshness * FRESHNESS_WEIGHT
        + domain_jumps.min(MAX_REWARDED_DOMAIN_JUMPS) as f64 / MAX_REWARDED_DOMAIN_JUMPS as f64
            * DOMAIN_JUMP_WEIGHT
        + uniqueness * UNIQUENESS_WEIGHT
        - length as f64 * LENGTH_PENALTY;

    PathScore {
        total_score,
        physical_ratio,
        avg_similarity: avg_similarity(path),
        uniqueness,
        freshness,
        domain_jumps,
        length,
    }
}

/// Share of hops that are physical links; 1.0 for a single-node path.
pub fn physical_ratio(path: &ScoredPath) -> f64 {
    let length = path.hops();
    if length == 0 {
        return 1.0;
    }
    let physical = path
        .segments
        .iter()
        .filter(|s| s.connection == Connection::Physical)
        .count();
    (physical.saturating_sub(1) as f64 / length as f64).clamp(0.0, 1.0)
}

pub fn avg_similarity(path: &ScoredPath) -> f64 {
    let similarities = path.semantic_similarities();
    if similarities.is_empty() {
        return 0.0;
    }
    (similarities.iter().sum::<f64>() / similarities.len() as f64).clamp(0.0, 1.0)
}

/// Mean over nodes of `max(0, 1 - age / 30 days)` from the last open time.
pub fn freshness(path: &ScoredPath, statistics: &HashMap<String, DocStatistics>, now_ms: i64) -> f64 {
    if path.segments.is_empty() {
        return UNTRACKED_FRESHNESS;
    }
    let total: f64 = path
        .node_ids()
        .map(|id| match statistics.get(id).and_then(|s| s.last_open_ts) {
            Some(ts) => {
                let age = (now_ms - ts).max(0) as f64;
                (1.0 - age / FRESHNESS_HORIZON_MS).clamp(0.0, 1.0)
            }
            None => UNTRACKED_FRESHNESS,
        })
        .sum();
    total / path.segments.len() as f64
}

/// Folder changes between consecutive document nodes; other nodes are skipped.
pub fn domain_jumps(path: &ScoredPath, folders: &HashMap<String, String>) -> usize {
    let mut previous: Option<&str> = None;
    let mut jumps = 0;
    for folder in path.node_ids().filter_map(|id| folders.get(id)) {
        if previous.is_some_and(|p| p != folder) {
            jumps += 1;
        }
        previous = Some(folder);
    }
    jumps
}

/// `1 - max(overlap / max(|A|, |B|))` against every other path.
pub fn uniqueness(index: usize, paths: &[ScoredPath]) -> f64 {
    let Some(path) = paths.get(index) else {
        return 1.0;
    };
    let own: HashSet<&str> = path.node_ids().collect();
    let mut worst = 0.0f64;
    for (other_index, other) in paths.iter().enumerate() {
        if other_index == index {
            continue;
        }
        let theirs: HashSet<&str> = other.node_ids().collect();
        let largest = own.len().max(theirs.len());
        if largest == 0 {
            continue;
        }
        let overlap = own.intersection(&theirs).count() as f64 / largest as f64;
        worst = worst.max(overlap);
    }
    (1.0 - worst).clamp(0.0, 1.0)
}

pub fn sort_by_score(paths: &mut [ScoredPath]) {
    paths.sort_by(|a, b| b.score.total_score.total_cmp(&a.score.total_score));
}

/// Keep at most `limit` paths, first giving every strategy that produced
/// something its best path, then filling the rest by score.
pub fn ensure_strategy_diversity(mut paths: Vec<ScoredPath>, limit: usize) -> Vec<ScoredPath> {
    if limit == 0 {
        return Vec::new();
    }
    sort_by_score(&mut paths);

    let mut chosen: Vec<usize> = Vec::with_capacity(limit);
    for strategy in Strategy::ALL {
        if chosen.len() >= limit {
            break;
        }
        if let Some(index) = paths.iter().position(|p| p.strategy == strategy) {
            chosen.push(index);
        }
    }
    for index in 0..paths.len() {
        if chosen.len() >= limit {
            break;
        }
        if !chosen.contains(&index) {
            chosen.push(index);
        }
    }
    chosen.sort_unstable();

    paths
        .into_iter()
        .enumerate()
        .filter(|(index, _)| chosen.contains(index))
        .map(|(_, path)| path)
        .collect()
}
