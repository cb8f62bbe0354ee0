use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tempfile::TempDir;

use notepath_graph::repository::{DocumentRepository, EmbeddingRepository, GraphRepository};
use notepath_graph::{
    Embedder, EmbeddingSettings, FindPathRequest, GraphResult, PathFinder, PathFindingSettings,
    PathOutcome, PathStores, SqliteStore, index_vault,
};

/// Deterministic 3-dimensional vectors without a model server.
#[derive(Default)]
struct FakeEmbedder {
    calls: AtomicUsize,
}

#[async_trait]
impl Embedder for FakeEmbedder {
    fn model(&self) -> &str {
        "fake"
    }

    async fn embed_batch(&self, inputs: &[String]) -> GraphResult<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(inputs
            .iter()
            .map(|text| vec![1.0, text.len() as f32 / 100.0, 0.5])
            .collect())
    }
}

async fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.unwrap();
    }
    tokio::fs::write(path, content).await.unwrap();
}

async fn seed_vault(root: &Path) {
    write(
        root,
        "projects/alpha.md",
        "+++\ntitle = \"Alpha\"\ntags = [\"rust\"]\n+++\n\nSee [[beta]] and [[missing]].\n",
    )
    .await;
    write(root, "projects/beta.md", "# Beta\n\nLeads to [[areas/gamma]]. #rust\n").await;
    write(root, "areas/gamma.md", "# Gamma\n\nA leaf note.\n").await;
    write(root, ".obsidian/workspace.md", "ignored [[alpha]]").await;
}

fn settings() -> EmbeddingSettings {
    EmbeddingSettings {
        dim: Some(3),
        ..EmbeddingSettings::default()
    }
}

#[tokio::test]
async fn indexes_notes_links_tags_and_embeddings() {
    let temp = TempDir::new().expect("tempdir");
    let vault = temp.path().join("vault");
    seed_vault(&vault).await;
    let store = SqliteStore::open(&temp.path().join("graph.sqlite3"), Some(3))
        .await
        .expect("store");
    let embedder = FakeEmbedder::default();

    let report = index_vault(&settings(), &store, Some(&embedder), &vault)
        .await
        .expect("index");
    assert_eq!(report.scanned, 3);
    assert_eq!(report.indexed, 3);
    assert_eq!(report.embedded, 3);
    assert_eq!(report.unresolved_links, 1);
    assert_eq!(report.failed, 0);

    let alpha = store
        .get_by_path("projects/alpha.md")
        .await
        .expect("lookup")
        .expect("alpha indexed");
    assert_eq!(alpha.title.as_deref(), Some("Alpha"));
    assert_eq!(alpha.tag_list(), vec!["rust"]);
    assert!(alpha.mtime.is_some());

    let edges = store
        .get_all_edges_for_node("projects/alpha.md", 10)
        .await
        .expect("edges");
    let targets: Vec<&str> = edges.iter().map(|e| e.to_node_id.as_str()).collect();
    assert!(targets.contains(&"projects/beta.md"));
    assert!(targets.contains(&"tag:rust"));

    let tag = GraphRepository::get_by_id(&store, "tag:rust")
        .await
        .expect("tag lookup")
        .expect("tag node");
    assert_eq!(tag.node_type, "tag");
    assert!(
        store
            .get_average_embedding("areas/gamma.md")
            .await
            .expect("embedding")
            .is_some()
    );

    let store = Arc::new(store);
    let finder = PathFinder::new(
        PathStores::from_backend(store.clone()),
        PathFindingSettings::default(),
    );
    let response = finder
        .find_path(FindPathRequest::new("projects/alpha.md", "areas/gamma.md"))
        .await
        .expect("search");
    match response.outcome {
        PathOutcome::Found(report) => assert!(report.paths.iter().any(|p| {
            p.node_ids().collect::<Vec<_>>()
                == vec!["projects/alpha.md", "projects/beta.md", "areas/gamma.md"]
        })),
        other => panic!("expected paths, got {other:?}"),
    }
}

#[tokio::test]
async fn reindexing_skips_unchanged_notes_and_prunes_deleted_ones() {
    let temp = TempDir::new().expect("tempdir");
    let vault = temp.path().join("vault");
    seed_vault(&vault).await;
    let store = SqliteStore::open(&temp.path().join("graph.sqlite3"), Some(3))
        .await
        .expect("store");
    let embedder = FakeEmbedder::default();

    index_vault(&settings(), &store, Some(&embedder), &vault)
        .await
        .expect("first pass");
    let calls_after_first = embedder.calls.load(Ordering::SeqCst);

    let second = index_vault(&settings(), &store, Some(&embedder), &vault)
        .await
        .expect("second pass");
    assert_eq!(second.unchanged, 3);
    assert_eq!(second.indexed, 0);
    assert_eq!(embedder.calls.load(Ordering::SeqCst), calls_after_first);

    write(&vault, "areas/gamma.md", "# Gamma\n\nRewritten.\n").await;
    let third = index_vault(&settings(), &store, Some(&embedder), &vault)
        .await
        .expect("third pass");
    assert_eq!(third.indexed, 1);
    assert_eq!(third.unchanged, 2);
    assert_eq!(third.embedded, 1);

    tokio::fs::remove_file(vault.join("projects/beta.md"))
        .await
        .unwrap();
    let fourth = index_vault(&settings(), &store, None, &vault)
        .await
        .expect("fourth pass");
    assert_eq!(fourth.removed, 1);
    assert_eq!(fourth.unresolved_links, 2);
    assert!(
        store
            .get_by_path("projects/beta.md")
            .await
            .expect("lookup")
            .is_none()
    );
}

#[tokio::test]
async fn changed_notes_indexed_without_embedder_lose_their_old_vector() {
    let temp = TempDir::new().expect("tempdir");
    let vault = temp.path().join("vault");
    seed_vault(&vault).await;
    let store = SqliteStore::open(&temp.path().join("graph.sqlite3"), Some(3))
        .await
        .expect("store");
    let embedder = FakeEmbedder::default();
    index_vault(&settings(), &store, Some(&embedder), &vault)
        .await
        .expect("first pass");

    write(&vault, "areas/gamma.md", "# Gamma\n\nNow about something else.\n").await;
    let report = index_vault(&settings(), &store, None, &vault)
        .await
        .expect("second pass");
    assert_eq!(report.indexed, 1);
    assert_eq!(report.embedded, 0);

    assert!(
        store
            .get_average_embedding("areas/gamma.md")
            .await
            .expect("embedding")
            .is_none()
    );
    let hits = store
        .find_similar(&[1.0, 0.1, 0.5], 10, &[])
        .await
        .expect("knn");
    assert!(hits.iter().all(|(id, _)| id != "areas/gamma.md"));
    assert_eq!(hits.len(), 2);
    assert!(
        store
            .get_average_embedding("projects/beta.md")
            .await
            .expect("embedding")
            .is_some()
    );
}

#[tokio::test]
async fn broken_front_matter_skips_only_that_note() {
    let temp = TempDir::new().expect("tempdir");
    let vault = temp.path().join("vault");
    write(&vault, "good.md", "# Good\n").await;
    write(&vault, "bad.md", "+++\ntitle = \"never closed\"\n").await;
    let store = SqliteStore::open(&temp.path().join("graph.sqlite3"), None)
        .await
        .expect("store");

    let report = index_vault(&EmbeddingSettings::default(), &store, None, &vault)
        .await
        .expect("index");
    assert_eq!(report.scanned, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.indexed, 1);
    assert_eq!(report.embedded, 0);
}

#[tokio::test]
async fn missing_vault_is_an_error() {
    let temp = TempDir::new().expect("tempdir");
    let store = SqliteStore::open(&temp.path().join("graph.sqlite3"), None)
        .await
        .expect("store");
    let result = index_vault(
        &EmbeddingSettings::default(),
        &store,
        None,
        &temp.path().join("nowhere"),
    )
    .await;
    assert!(result.is_err());
}
