//! Post-search analysis: recurring hub nodes and what the two notes share
//! even when no path connects them.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::errors::GraphResult;
use crate::models::{CommonParent, ContextIntersection, DocMeta, GraphEdge, HubNode, ScoredPath};
use crate::repository::PathStores;

pub const MIN_HUB_OCCURRENCES: usize = 2;
pub const MAX_COMMON_PARENTS: usize = 5;

/// Interior nodes that show up in at least two of `paths`.
pub fn find_hubs(paths: &[ScoredPath]) -> Vec<HubNode> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for path in paths {
        let len = path.segments.len();
        if len < 3 {
            continue;
        }
        let interior: HashSet<&str> = path.segments[1..len - 1]
            .iter()
            .map(|s| s.node_id.as_str())
            .collect();
        for id in interior {
            *counts.entry(id).or_default() += 1;
        }
    }

    let total = paths.len().max(1) as f64;
    let mut hubs: Vec<HubNode> = counts
        .into_iter()
        .filter(|(_, count)| *count >= MIN_HUB_OCCURRENCES)
        .map(|(id, count)| HubNode {
            node_id: id.to_string(),
            label: id.to_string(),
            occurrences: count,
            betweenness: count as f64 / total,
        })
        .collect();
    hubs.sort_by(|a, b| b.occurrences.cmp(&a.occurrences));
    hubs
}

pub async fn context_intersection(
    stores: &PathStores,
    start: &DocMeta,
    end: &DocMeta,
) -> GraphResult<ContextIntersection> {
    let common_folder = common_folder(&start.path, &end.path);
    let folder_depth = common_folder.split('/').filter(|c| !c.is_empty()).count();
    let shared_tags = shared_tags(start, end);
    let common_parents = common_parents(stores, &start.id, &end.id).await?;
    let is_distant = folder_depth <= 1 && (!shared_tags.is_empty() || !common_parents.is_empty());

    Ok(ContextIntersection {
        common_folder,
        folder_depth,
        shared_tags,
        common_parents,
        is_distant,
    })
}

/// Longest shared folder prefix, component-wise.
pub fn common_folder(a: &str, b: &str) -> String {
    let folders = |path: &str| -> Vec<String> {
        let mut parts: Vec<String> = path
            .trim_start_matches('/')
            .split('/')
            .map(str::to_string)
            .collect();
        parts.pop();
        parts
    };
    folders(a)
        .into_iter()
        .zip(folders(b))
        .take_while(|(x, y)| x == y)
        .map(|(x, _)| x)
        .collect::<Vec<_>>()
        .join("/")
}

fn shared_tags(start: &DocMeta, end: &DocMeta) -> Vec<String> {
    let theirs: HashSet<String> = end.tag_list().iter().map(|t| t.to_lowercase()).collect();
    start
        .tag_list()
        .into_iter()
        .filter(|tag| theirs.contains(&tag.to_lowercase()))
        .collect()
}

/// Nodes with edges into both notes, most references first.
async fn common_parents(
    stores: &PathStores,
    start_id: &str,
    end_id: &str,
) -> GraphResult<Vec<CommonParent>> {
    let tally = |edges: Vec<GraphEdge>| {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for edge in edges {
            if edge.from_node_id != start_id && edge.from_node_id != end_id {
                *counts.entry(edge.from_node_id).or_default() += 1;
            }
        }
        counts
    };
    let into_start = tally(stores.graph.get_incoming_edges(start_id).await?);
    let into_end = tally(stores.graph.get_incoming_edges(end_id).await?);

    let mut parents: Vec<CommonParent> = into_start
        .into_iter()
        .filter_map(|(id, count)| {
            into_end.get(&id).map(|other| CommonParent {
                label: id.clone(),
                node_id: id,
                references: count + other,
            })
        })
        .collect();
    parents.sort_by(|a, b| {
        b.references
            .cmp(&a.references)
            .then_with(|| a.node_id.cmp(&b.node_id))
    });
    parents.truncate(MAX_COMMON_PARENTS);
    Ok(parents)
}
