use std::collections::HashSet;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::PathFindingSettings;
use crate::analysis::{context_intersection, find_hubs};
use crate::context::SearchContext;
use crate::errors::GraphResult;
use crate::format::resolve_labels;
use crate::models::{
    ContextIntersection, DocMeta, EndpointSide, FindPathRequest, FindPathResponse, PathOutcome,
    PathReport, PathSegment, ScoredPath, Strategy,
};
use crate::repository::PathStores;
use crate::scoring::{dedupe_paths, ensure_strategy_diversity, score_paths};

pub mod brainstorm;
pub mod fallback;
pub mod fast_track;
pub mod reliable;
pub mod temporal;

pub const SAME_NOTE_REASONING: &str = "start and end are the same note";

/// Finds several qualitatively different routes between two notes.
#[derive(Debug, Clone)]
pub struct PathFinder {
    stores: PathStores,
    settings: PathFindingSettings,
}

impl PathFinder {
    pub fn new(stores: PathStores, settings: PathFindingSettings) -> Self {
        Self { stores, settings }
    }

    pub fn settings(&self) -> &PathFindingSettings {
        &self.settings
    }

    pub fn stores(&self) -> &PathStores {
        &self.stores
    }

    /// Resolve both notes, run every applicable strategy concurrently under
    /// the global timeout, then score, diversify and analyse the results.
    ///
    /// Missing notes, empty searches and timeouts come back as outcomes;
    /// only storage failures are errors.
    pub async fn find_path(&self, request: FindPathRequest) -> GraphResult<FindPathResponse> {
        let format = request.response_format;
        let started = Instant::now();

        let start = match self
            .resolve_endpoint(&request.start_note_path, EndpointSide::Start)
            .await?
        {
            Ok(meta) => meta,
            Err(outcome) => return Ok(FindPathResponse::new(format, outcome)),
        };
        let end = match self
            .resolve_endpoint(&request.end_note_path, EndpointSide::End)
            .await?
        {
            Ok(meta) => meta,
            Err(outcome) => return Ok(FindPathResponse::new(format, outcome)),
        };

        if start.id == end.id {
            let trivial = ScoredPath::new(Strategy::Reliable, vec![PathSegment::origin(start.id.clone())])
                .with_reasoning(SAME_NOTE_REASONING);
            let outcome = self
                .build_report(&start, &end, vec![trivial], false, 1, started)
                .await?;
            return Ok(FindPathResponse::new(format, outcome));
        }

        let timeout = Duration::from_millis(self.settings.timeout_ms);
        match tokio::time::timeout(timeout, self.search(&request, &start, &end, started)).await {
            Ok(outcome) => Ok(FindPathResponse::new(format, outcome?)),
            Err(_) => {
                warn!(
                    start = %start.path,
                    end = %end.path,
                    timeout_ms = self.settings.timeout_ms,
                    "path search timed out"
                );
                Ok(FindPathResponse::new(
                    format,
                    PathOutcome::Timeout {
                        start_path: start.path,
                        end_path: end.path,
                        timeout_ms: self.settings.timeout_ms,
                    },
                ))
            }
        }
    }

    async fn resolve_endpoint(
        &self,
        path: &str,
        side: EndpointSide,
    ) -> GraphResult<Result<DocMeta, PathOutcome>> {
        let Some(meta) = self.stores.documents.get_by_path(path).await? else {
            return Ok(Err(PathOutcome::NotFound {
                side,
                path: path.to_string(),
                reason: "is not in the index".to_string(),
            }));
        };
        if self.stores.graph.get_by_id(&meta.id).await?.is_none() {
            return Ok(Err(PathOutcome::NotFound {
                side,
                path: path.to_string(),
                reason: "has no node in the knowledge graph".to_string(),
            }));
        }
        Ok(Ok(meta))
    }

    async fn search(
        &self,
        request: &FindPathRequest,
        start: &DocMeta,
        end: &DocMeta,
        started: Instant,
    ) -> GraphResult<PathOutcome> {
        let include_semantic = request
            .include_semantic_paths
            .unwrap_or(self.settings.include_semantic);
        let (start_vector, end_vector) = tokio::join!(
            self.stores.embeddings.get_average_embedding(&start.id),
            self.stores.embeddings.get_average_embedding(&end.id),
        );
        let ctx = SearchContext::new(start.id.clone(), end.id.clone(), self.settings.max_hops)
            .with_vectors(start_vector?, end_vector?)
            .with_filters(request.filters.clone())
            .with_semantic(include_semantic);
        info!(
            start = %start.path,
            end = %end.path,
            semantic = include_semantic,
            embeddings = ctx.has_embeddings(),
            "searching paths"
        );

        let stores = &self.stores;
        let limit = self.settings.neighbor_limit;
        let temporal_timeout = Duration::from_millis(self.settings.temporal_timeout_ms);
        let (reliable, fast_track, brainstorm, temporal) = tokio::join!(
            reliable::find_reliable_paths(stores, &ctx, limit),
            async {
                if ctx.has_embeddings() {
                    fast_track::find_fast_track_path(stores, &ctx, limit).await
                } else {
                    debug!("fast track skipped: endpoint embedding missing");
                    Ok(Vec::new())
                }
            },
            async {
                if include_semantic {
                    brainstorm::find_brainstorm_paths(stores, &ctx, limit).await
                } else {
                    Ok(Vec::new())
                }
            },
            temporal::find_temporal_path(stores, &ctx, temporal_timeout),
        );

        let mut paths = Vec::new();
        for (strategy, result) in [
            (Strategy::Reliable, reliable),
            (Strategy::FastTrack, fast_track),
            (Strategy::Brainstorm, brainstorm),
            (Strategy::Temporal, temporal),
        ] {
            collect_paths(&mut paths, strategy, result);
        }

        let mut fallback_used = false;
        if paths.is_empty() {
            info!("no strategy connected the notes, running fallback search");
            let result = fallback::find_fallback_path(stores, &ctx, limit).await;
            collect_paths(&mut paths, Strategy::Fallback, result);
            fallback_used = !paths.is_empty();
        }

        paths.retain(|path| is_well_formed(path, &ctx));
        if paths.is_empty() {
            let mut context = context_intersection(stores, start, end).await?;
            self.label_context(&mut context).await?;
            return Ok(PathOutcome::NoPath {
                start_path: start.path.clone(),
                end_path: end.path.clone(),
                context,
            });
        }

        let max_results = request.limit.unwrap_or(self.settings.max_results).max(1);
        self.build_report(start, end, paths, fallback_used, max_results, started)
            .await
    }

    async fn build_report(
        &self,
        start: &DocMeta,
        end: &DocMeta,
        paths: Vec<ScoredPath>,
        fallback_used: bool,
        max_results: usize,
        started: Instant,
    ) -> GraphResult<PathOutcome> {
        let mut paths = dedupe_paths(paths);
        score_paths(&self.stores, &mut paths, Utc::now().timestamp_millis()).await?;
        for path in &mut paths {
            if path.reasoning.is_empty() {
                path.reasoning = default_reasoning(path);
            }
        }
        let paths = ensure_strategy_diversity(paths, max_results);

        let mut hubs = find_hubs(&paths);
        let context = context_intersection(&self.stores, start, end).await?;
        let ids = paths
            .iter()
            .flat_map(|path| path.node_ids().map(str::to_string))
            .chain(hubs.iter().map(|hub| hub.node_id.clone()))
            .chain(context.common_parents.iter().map(|p| p.node_id.clone()));
        let labels = resolve_labels(&self.stores, ids.collect::<Vec<_>>()).await?;
        for hub in &mut hubs {
            if let Some(label) = labels.get(&hub.node_id) {
                hub.label = label.clone();
            }
        }
        let mut context = context;
        for parent in &mut context.common_parents {
            if let Some(label) = labels.get(&parent.node_id) {
                parent.label = label.clone();
            }
        }

        debug!(paths = paths.len(), hubs = hubs.len(), "path report ready");
        Ok(PathOutcome::Found(PathReport {
            start_path: start.path.clone(),
            end_path: end.path.clone(),
            start_id: start.id.clone(),
            end_id: end.id.clone(),
            paths,
            hubs,
            context,
            labels,
            fallback_used,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }))
    }

    async fn label_context(&self, context: &mut ContextIntersection) -> GraphResult<()> {
        if context.common_parents.is_empty() {
            return Ok(());
        }
        let ids: Vec<String> = context
            .common_parents
            .iter()
            .map(|p| p.node_id.clone())
            .collect();
        let labels = resolve_labels(&self.stores, ids).await?;
        for parent in &mut context.common_parents {
            if let Some(label) = labels.get(&parent.node_id) {
                parent.label = label.clone();
            }
        }
        Ok(())
    }
}

fn collect_paths(paths: &mut Vec<ScoredPath>, strategy: Strategy, result: GraphResult<Vec<ScoredPath>>) {
    match result {
        Ok(found) => {
            debug!(strategy = %strategy, count = found.len(), "strategy finished");
            paths.extend(found);
        }
        Err(err) => warn!(strategy = %strategy, error = %err, "strategy failed, skipping"),
    }
}

/// Starts at the start note, ends at the end note, visits no node twice.
fn is_well_formed(path: &ScoredPath, ctx: &SearchContext) -> bool {
    let (Some(first), Some(last)) = (path.segments.first(), path.segments.last()) else {
        return false;
    };
    let mut seen = HashSet::new();
    first.node_id == ctx.start_id
        && last.node_id == ctx.end_id
        && path.node_ids().all(|id| seen.insert(id))
}

fn default_reasoning(path: &ScoredPath) -> String {
    let hops = path.hops();
    let semantic = path.semantic_similarities().len();
    match path.strategy {
        Strategy::Reliable => format!("Follows explicit links only, {hops} hop(s)."),
        Strategy::FastTrack => format!(
            "A* search steered toward the end note's embedding: {hops} hop(s), {semantic} of them semantic."
        ),
        Strategy::Brainstorm => format!(
            "Crosses {} folder boundary(ies) to connect different domains.",
            path.score.domain_jumps
        ),
        Strategy::Temporal => "Follows the notes in chronological order.".to_string(),
        Strategy::Fallback => fallback::FALLBACK_REASONING.to_string(),
    }
}
