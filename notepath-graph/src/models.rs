use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const DOCUMENT_NODE_TYPE: &str = "document";
pub const TAG_NODE_TYPE: &str = "tag";

/// A node in the knowledge graph (document, tag, concept, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphNode {
    pub id: String,
    pub node_type: String,
    pub label: String,
    /// Free-form attributes; documents carry `{"path": ...}`.
    #[serde(default)]
    pub attributes: serde_json::Value,
}

impl GraphNode {
    pub fn document(id: impl Into<String>, label: impl Into<String>, path: &str) -> Self {
        Self {
            id: id.into(),
            node_type: DOCUMENT_NODE_TYPE.to_string(),
            label: label.into(),
            attributes: serde_json::json!({ "path": path }),
        }
    }

    pub fn tag(name: &str) -> Self {
        Self {
            id: tag_node_id(name),
            node_type: TAG_NODE_TYPE.to_string(),
            label: name.to_string(),
            attributes: serde_json::Value::Null,
        }
    }

    pub fn is_document(&self) -> bool {
        self.node_type == DOCUMENT_NODE_TYPE
    }

    pub fn path(&self) -> Option<&str> {
        self.attributes.get("path").and_then(|value| value.as_str())
    }

    /// Label shown to users: the vault path for documents, `type:label` otherwise.
    pub fn display_label(&self) -> String {
        if self.is_document() {
            self.path().unwrap_or(&self.label).to_string()
        } else {
            format!("{}:{}", self.node_type, self.label)
        }
    }
}

pub fn tag_node_id(name: &str) -> String {
    format!("tag:{}", name.to_lowercase())
}

/// An explicit link between two nodes. Traversal ignores direction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GraphEdge {
    pub from_node_id: String,
    pub to_node_id: String,
    pub edge_type: String,
}

impl GraphEdge {
    pub fn new(from: impl Into<String>, to: impl Into<String>, edge_type: &str) -> Self {
        Self {
            from_node_id: from.into(),
            to_node_id: to.into(),
            edge_type: edge_type.to_string(),
        }
    }

    /// The endpoint opposite to `node_id`, if the edge touches it.
    pub fn other_end(&self, node_id: &str) -> Option<&str> {
        if self.from_node_id == node_id {
            Some(&self.to_node_id)
        } else if self.to_node_id == node_id {
            Some(&self.from_node_id)
        } else {
            None
        }
    }
}

/// Document metadata as recorded by the indexer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DocMeta {
    pub id: String,
    pub path: String,
    pub title: Option<String>,
    /// Raw tag column: a JSON array or a comma-separated string.
    pub tags: Option<String>,
    /// Creation time, epoch milliseconds.
    pub ctime: Option<i64>,
    /// Modification time, epoch milliseconds.
    pub mtime: Option<i64>,
    pub content_hash: Option<String>,
}

impl DocMeta {
    pub fn timestamp(&self) -> Option<i64> {
        self.mtime.or(self.ctime)
    }

    pub fn tag_list(&self) -> Vec<String> {
        parse_tags(self.tags.as_deref())
    }
}

/// Parent folder of a vault-relative path; empty for the vault root.
pub fn folder_of(path: &str) -> &str {
    path.trim_start_matches('/')
        .rsplit_once('/')
        .map(|(dir, _)| dir)
        .unwrap_or("")
}

/// Parse a tag column. Accepts a JSON array and falls back to a comma list.
pub fn parse_tags(raw: Option<&str>) -> Vec<String> {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Vec::new();
    };

    let candidates: Vec<String> = match serde_json::from_str::<Vec<String>>(raw) {
        Ok(values) => values,
        Err(_) => raw
            .trim_start_matches('[')
            .trim_end_matches(']')
            .split(',')
            .map(|part| part.trim().trim_matches('"').to_string())
            .collect(),
    };

    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .map(|tag| tag.trim().trim_start_matches('#').to_string())
        .filter(|tag| !tag.is_empty())
        .filter(|tag| seen.insert(tag.to_lowercase()))
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocStatistics {
    pub doc_id: String,
    pub open_count: i64,
    /// Last time the note was opened, epoch milliseconds.
    pub last_open_ts: Option<i64>,
}

/// How a node was reached from its predecessor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Connection {
    Physical,
    /// Similarity is in `[0, 1]`.
    Semantic { similarity: f64 },
}

impl Connection {
    pub fn is_physical(&self) -> bool {
        matches!(self, Self::Physical)
    }

    pub fn is_semantic(&self) -> bool {
        matches!(self, Self::Semantic { .. })
    }

    pub fn similarity(&self) -> Option<f64> {
        match self {
            Self::Physical => None,
            Self::Semantic { similarity } => Some(*similarity),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NeighborNode {
    pub id: String,
    pub connection: Connection,
}

impl NeighborNode {
    pub fn physical(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            connection: Connection::Physical,
        }
    }

    pub fn semantic(id: impl Into<String>, similarity: f64) -> Self {
        Self {
            id: id.into(),
            connection: Connection::Semantic {
                similarity: similarity.clamp(0.0, 1.0),
            },
        }
    }
}

/// One node of a path together with the hop that reached it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathSegment {
    pub node_id: String,
    pub connection: Connection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl PathSegment {
    pub fn new(node_id: impl Into<String>, connection: Connection) -> Self {
        Self {
            node_id: node_id.into(),
            connection,
            timestamp: None,
        }
    }

    /// First segment of a path: no incoming hop, recorded as physical.
    pub fn origin(node_id: impl Into<String>) -> Self {
        Self::new(node_id, Connection::Physical)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Reliable,
    FastTrack,
    Brainstorm,
    Temporal,
    Fallback,
}

impl Strategy {
    /// Bucket order used when enforcing diversity.
    pub const ALL: [Strategy; 5] = [
        Strategy::Reliable,
        Strategy::FastTrack,
        Strategy::Brainstorm,
        Strategy::Temporal,
        Strategy::Fallback,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reliable => "reliable",
            Self::FastTrack => "fast_track",
            Self::Brainstorm => "brainstorm",
            Self::Temporal => "temporal",
            Self::Fallback => "fallback",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Reliable => "Reliable",
            Self::FastTrack => "Fast Track",
            Self::Brainstorm => "Brainstorm",
            Self::Temporal => "Temporal",
            Self::Fallback => "Fallback (degraded)",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PathScore {
    pub total_score: f64,
    pub physical_ratio: f64,
    pub avg_similarity: f64,
    pub uniqueness: f64,
    pub freshness: f64,
    pub domain_jumps: usize,
    pub length: usize,
}

/// A candidate route produced by one strategy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredPath {
    pub segments: Vec<PathSegment>,
    pub strategy: Strategy,
    pub score: PathScore,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insight_label: Option<String>,
    pub reasoning: String,
}

impl ScoredPath {
    pub fn new(strategy: Strategy, segments: Vec<PathSegment>) -> Self {
        Self {
            segments,
            strategy,
            score: PathScore::default(),
            insight_label: None,
            reasoning: String::new(),
        }
    }

    pub fn with_insight(mut self, insight: impl Into<String>) -> Self {
        self.insight_label = Some(insight.into());
        self
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }

    /// Number of hops.
    pub fn hops(&self) -> usize {
        self.segments.len().saturating_sub(1)
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().map(|segment| segment.node_id.as_str())
    }

    /// Exact node-sequence key used for deduplication.
    pub fn sequence_key(&self) -> String {
        self.node_ids().collect::<Vec<_>>().join("\u{1f}")
    }

    pub fn semantic_similarities(&self) -> Vec<f64> {
        self.segments
            .iter()
            .skip(1)
            .filter_map(|segment| segment.connection.similarity())
            .collect()
    }
}

/// Undirected edge identity, endpoints stored in sorted order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeKey(String, String);

impl EdgeKey {
    pub fn new(a: &str, b: &str) -> Self {
        if a <= b {
            Self(a.to_string(), b.to_string())
        } else {
            Self(b.to_string(), a.to_string())
        }
    }
}

/// Caller-supplied restrictions applied to every neighbor list.
///
/// The search endpoints are never filtered out.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PathFilters {
    #[serde(default)]
    pub exclude_ids: Vec<String>,
    #[serde(default)]
    pub exclude_node_types: Vec<String>,
    /// Folder prefixes whose documents are skipped.
    #[serde(default)]
    pub exclude_folders: Vec<String>,
    /// When non-empty, documents must live under one of these prefixes.
    #[serde(default)]
    pub include_folders: Vec<String>,
}

impl PathFilters {
    pub fn is_empty(&self) -> bool {
        self.exclude_ids.is_empty()
            && self.exclude_node_types.is_empty()
            && self.exclude_folders.is_empty()
            && self.include_folders.is_empty()
    }

    pub fn has_folder_rules(&self) -> bool {
        !self.exclude_folders.is_empty() || !self.include_folders.is_empty()
    }

    pub fn allows_path(&self, path: &str) -> bool {
        let path = path.trim_start_matches('/');
        if self
            .exclude_folders
            .iter()
            .any(|prefix| path.starts_with(prefix.trim_start_matches('/')))
        {
            return false;
        }
        self.include_folders.is_empty()
            || self
                .include_folders
                .iter()
                .any(|prefix| path.starts_with(prefix.trim_start_matches('/')))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    #[default]
    Narrative,
    Structured,
}

impl FromStr for ResponseFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "narrative" | "text" => Ok(Self::Narrative),
            "structured" | "json" => Ok(Self::Structured),
            other => Err(format!("unknown response format: {other}")),
        }
    }
}

/// Input of [`crate::PathFinder::find_path`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindPathRequest {
    pub start_note_path: String,
    pub end_note_path: String,
    /// Maximum number of paths returned; defaults to the configured value.
    #[serde(default)]
    pub limit: Option<usize>,
    /// Defaults to the configured value.
    #[serde(default)]
    pub include_semantic_paths: Option<bool>,
    #[serde(default)]
    pub response_format: ResponseFormat,
    #[serde(default)]
    pub filters: PathFilters,
}

impl FindPathRequest {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start_note_path: start.into(),
            end_note_path: end.into(),
            limit: None,
            include_semantic_paths: None,
            response_format: ResponseFormat::default(),
            filters: PathFilters::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HubNode {
    pub node_id: String,
    pub label: String,
    pub occurrences: usize,
    /// `occurrences / total_paths`.
    pub betweenness: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommonParent {
    pub node_id: String,
    pub label: String,
    pub references: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContextIntersection {
    /// Longest shared folder prefix of both notes ("" for the vault root).
    pub common_folder: String,
    pub folder_depth: usize,
    pub shared_tags: Vec<String>,
    pub common_parents: Vec<CommonParent>,
    /// Physically far apart but connected through tags or parents.
    pub is_distant: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EndpointSide {
    Start,
    End,
}

impl EndpointSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::End => "end",
        }
    }
}

/// Everything the formatter needs to render a successful search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathReport {
    pub start_path: String,
    pub end_path: String,
    pub start_id: String,
    pub end_id: String,
    pub paths: Vec<ScoredPath>,
    pub hubs: Vec<HubNode>,
    pub context: ContextIntersection,
    /// Resolved display label per node id.
    pub labels: HashMap<String, String>,
    pub fallback_used: bool,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PathOutcome {
    Found(PathReport),
    NotFound {
        side: EndpointSide,
        path: String,
        reason: String,
    },
    NoPath {
        start_path: String,
        end_path: String,
        context: ContextIntersection,
    },
    Timeout {
        start_path: String,
        end_path: String,
        timeout_ms: u64,
    },
}

/// Result of [`crate::PathFinder::find_path`]; see `render()` in the format module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindPathResponse {
    pub format: ResponseFormat,
    #[serde(flatten)]
    pub outcome: PathOutcome,
}

impl FindPathResponse {
    pub fn new(format: ResponseFormat, outcome: PathOutcome) -> Self {
        Self { format, outcome }
    }
}
