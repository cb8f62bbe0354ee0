//! Batch indexing of a Markdown vault into the graph store.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::EmbeddingSettings;
use crate::embeddings::Embedder;
use crate::errors::{GraphError, GraphResult};
use crate::ingest::{FileTimes, IngestedNote, file_stem, ingest_markdown};
use crate::models::{GraphEdge, GraphNode};
use crate::storage::SqliteStore;

pub const LINK_EDGE: &str = "link";
pub const TAG_EDGE: &str = "tagged";

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct IndexReport {
    pub scanned: usize,
    pub indexed: usize,
    pub unchanged: usize,
    pub removed: usize,
    pub failed: usize,
    pub embedded: usize,
    pub embedding_failures: usize,
    pub unresolved_links: usize,
}

/// Maps wikilink targets to document ids, by relative path first, then by
/// file stem. Matching ignores case and a trailing `.md`.
#[derive(Debug, Default)]
struct LinkResolver {
    by_path: HashMap<String, String>,
    by_stem: HashMap<String, String>,
}

impl LinkResolver {
    fn new<'a>(ids: impl IntoIterator<Item = &'a String>) -> Self {
        let mut resolver = Self::default();
        for id in ids {
            let without_ext = id.strip_suffix(".md").unwrap_or(id).to_lowercase();
            resolver.by_path.insert(without_ext, id.clone());
            resolver
                .by_stem
                .entry(file_stem(id).to_lowercase())
                .or_insert_with(|| id.clone());
        }
        resolver
    }

    fn resolve(&self, target: &str) -> Option<&String> {
        let key = target.trim().trim_start_matches('/');
        let key = key.strip_suffix(".md").unwrap_or(key).to_lowercase();
        self.by_path
            .get(&key)
            .or_else(|| self.by_stem.get(file_stem(&key)))
    }
}

/// Index every `*.md` file under `root`.
///
/// Unchanged files (same SHA-256) are skipped unless notes were added or
/// removed, in which case links are re-resolved everywhere. Embeddings are
/// only recomputed for changed files; embedding failures are logged and the
/// note is kept without a vector.
pub async fn index_vault(
    settings: &EmbeddingSettings,
    store: &SqliteStore,
    embedder: Option<&dyn Embedder>,
    root: &Path,
) -> GraphResult<IndexReport> {
    let mut report = IndexReport::default();
    let files = markdown_files(root)?;
    report.scanned = files.len();

    let mut notes: Vec<IngestedNote> = Vec::with_capacity(files.len());
    for (rel_path, abs_path) in files {
        let raw = tokio::fs::read_to_string(&abs_path).await?;
        let times = FileTimes::read(&abs_path).await?;
        match ingest_markdown(&rel_path, &raw, times) {
            Ok(note) => notes.push(note),
            Err(err) => {
                warn!(path = %rel_path, error = %err, "skipping note");
                report.failed += 1;
            }
        }
    }

    let known: HashSet<String> = store.list_document_ids().await?.into_iter().collect();
    let current: HashSet<String> = notes.iter().map(|n| n.meta.id.clone()).collect();
    for stale in known.difference(&current) {
        store.remove_document(stale).await?;
        report.removed += 1;
    }
    let structure_changed = report.removed > 0 || current.difference(&known).next().is_some();

    let resolver = LinkResolver::new(current.iter());
    for note in &notes {
        let changed = store.document_hash(&note.meta.id).await? != note.meta.content_hash;
        if !changed && !structure_changed {
            report.unchanged += 1;
            continue;
        }

        store.upsert_node(&note.node).await?;
        store.upsert_document(&note.meta).await?;
        let mut edges = Vec::new();
        for tag in &note.tags {
            let tag_node = GraphNode::tag(tag);
            store.upsert_node(&tag_node).await?;
            edges.push(GraphEdge::new(note.meta.id.clone(), tag_node.id, TAG_EDGE));
        }
        for link in &note.links {
            match resolver.resolve(&link.target) {
                Some(target) if *target != note.meta.id => {
                    edges.push(GraphEdge::new(note.meta.id.clone(), target.clone(), LINK_EDGE));
                }
                Some(_) => {}
                None => {
                    debug!(from = %note.meta.id, target = %link.target, "unresolved link");
                    report.unresolved_links += 1;
                }
            }
        }
        store.replace_edges_from(&note.meta.id, &edges).await?;

        if changed {
            report.indexed += 1;
            let embedded = match embedder {
                Some(embedder) => match embed_note(settings, store, embedder, note).await {
                    Ok(embedded) => embedded,
                    Err(err) => {
                        warn!(path = %note.meta.path, error = %err, "embedding failed");
                        report.embedding_failures += 1;
                        false
                    }
                },
                None => false,
            };
            if embedded {
                report.embedded += 1;
            } else {
                // The old vector described the previous content.
                store.clear_embedding(&note.meta.id).await?;
            }
        } else {
            report.unchanged += 1;
        }
    }

    info!(
        root = %root.display(),
        scanned = report.scanned,
        indexed = report.indexed,
        removed = report.removed,
        embedded = report.embedded,
        "vault indexed"
    );
    Ok(report)
}

async fn embed_note(
    settings: &EmbeddingSettings,
    store: &SqliteStore,
    embedder: &dyn Embedder,
    note: &IngestedNote,
) -> GraphResult<bool> {
    let mut inputs: Vec<String> = note.chunks.iter().map(|c| c.embedding_input()).collect();
    if inputs.is_empty() {
        match &note.meta.title {
            Some(title) => inputs.push(title.clone()),
            None => return Ok(false),
        }
    }

    let vectors = embedder.embed_batch(&inputs).await?;
    if let (Some(expected), Some(first)) = (settings.dim, vectors.first())
        && expected != first.len()
    {
        return Err(GraphError::EmbeddingDimMismatch {
            expected,
            actual: first.len(),
        });
    }
    store
        .upsert_embedding(&note.meta.id, &vectors, Some(embedder.model()))
        .await?;
    Ok(true)
}

/// `(vault-relative path, absolute path)` of every Markdown file, skipping
/// hidden directories such as `.git` or `.obsidian`.
fn markdown_files(root: &Path) -> GraphResult<Vec<(String, PathBuf)>> {
    if !root.is_dir() {
        return Err(GraphError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("vault not found: {}", root.display()),
        )));
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !entry.file_name().to_string_lossy().starts_with('.'));
    for entry in walker.filter_map(|entry| entry.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|v| v.to_str()) != Some("md") {
            continue;
        }
        let rel = path
            .strip_prefix(root)
            .map_err(|_| GraphError::PathOutsideRoot(path.to_path_buf()))?;
        let rel = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        files.push((rel, path.to_path_buf()));
    }
    Ok(files)
}
