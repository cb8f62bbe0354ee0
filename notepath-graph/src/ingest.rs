use std::path::Path;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::chunker::{Chunk, chunk_markdown};
use crate::errors::GraphResult;
use crate::models::{DocMeta, GraphNode};
use crate::parser::{WikiLink, parse_note};

/// Filesystem timestamps of a note, epoch milliseconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileTimes {
    pub created_ms: Option<i64>,
    pub modified_ms: Option<i64>,
}

impl FileTimes {
    pub async fn read(path: &Path) -> GraphResult<Self> {
        let metadata = tokio::fs::metadata(path).await?;
        Ok(Self {
            created_ms: metadata.created().ok().map(system_ms),
            modified_ms: metadata.modified().ok().map(system_ms),
        })
    }
}

fn system_ms(time: SystemTime) -> i64 {
    DateTime::<Utc>::from(time).timestamp_millis()
}

/// Everything the indexer writes for one note.
#[derive(Debug, Clone)]
pub struct IngestedNote {
    pub meta: DocMeta,
    pub node: GraphNode,
    pub tags: Vec<String>,
    pub links: Vec<WikiLink>,
    pub chunks: Vec<Chunk>,
}

/// Build the records for the note at vault-relative `rel_path`.
///
/// The front matter `created` date wins over the filesystem creation time.
pub fn ingest_markdown(rel_path: &str, raw: &str, times: FileTimes) -> GraphResult<IngestedNote> {
    let parsed = parse_note(raw)?;
    let title = parsed.title().unwrap_or_else(|| file_stem(rel_path).to_string());
    let tags_json = serde_json::to_string(&parsed.tags)?;

    let meta = DocMeta {
        id: rel_path.to_string(),
        path: rel_path.to_string(),
        title: Some(title.clone()),
        tags: (!parsed.tags.is_empty()).then_some(tags_json),
        ctime: parsed.front.created_ms().or(times.created_ms),
        mtime: times.modified_ms,
        content_hash: Some(compute_hash(raw)),
    };
    let node = GraphNode::document(rel_path, title.clone(), rel_path);
    let chunks = chunk_markdown(&parsed.body, &title);

    Ok(IngestedNote {
        meta,
        node,
        tags: parsed.tags,
        links: parsed.links,
        chunks,
    })
}

pub fn compute_hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn file_stem(rel_path: &str) -> &str {
    let name = rel_path.rsplit('/').next().unwrap_or(rel_path);
    name.strip_suffix(".md").unwrap_or(name)
}
