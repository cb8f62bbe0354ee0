use std::sync::Arc;

use tempfile::TempDir;

use notepath_graph::repository::{
    DocumentRepository, EmbeddingRepository, GraphRepository, StatisticsRepository,
};
use notepath_graph::{
    DocMeta, FindPathRequest, GraphEdge, GraphError, GraphNode, PathFinder, PathFindingSettings,
    PathOutcome, PathStores, SqliteStore,
};

async fn open_store(temp: &TempDir) -> SqliteStore {
    SqliteStore::open(&temp.path().join("graph.sqlite3"), Some(3))
        .await
        .expect("open store")
}

async fn add_note(store: &SqliteStore, path: &str) {
    store
        .upsert_document(&DocMeta {
            id: path.to_string(),
            path: path.to_string(),
            title: Some(path.to_string()),
            content_hash: Some(format!("hash-{path}")),
            ..Default::default()
        })
        .await
        .expect("document");
    store
        .upsert_node(&GraphNode::document(path, path, path))
        .await
        .expect("node");
}

#[tokio::test]
async fn knn_returns_nearest_documents_first() {
    let temp = TempDir::new().expect("tempdir");
    let store = open_store(&temp).await;
    for path in ["a.md", "b.md", "c.md"] {
        add_note(&store, path).await;
    }
    store
        .upsert_embedding("a.md", &[vec![1.0, 0.0, 0.0]], Some("test"))
        .await
        .expect("embed a");
    store
        .upsert_embedding("b.md", &[vec![1.0, 0.2, 0.0], vec![0.8, 0.0, 0.0]], Some("test"))
        .await
        .expect("embed b");
    store
        .upsert_embedding("c.md", &[vec![0.0, 0.0, 1.0]], Some("test"))
        .await
        .expect("embed c");

    let averaged = store
        .get_average_embedding("b.md")
        .await
        .expect("average")
        .expect("b embedded");
    assert_eq!(averaged.len(), 3);
    assert!((averaged[0] - 0.9).abs() < 1e-6);

    let hits = store
        .find_similar(&[1.0, 0.0, 0.0], 2, &["a.md".to_string()])
        .await
        .expect("knn");
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].0, "b.md");
    assert!(hits[0].1 > 0.9);
    assert_eq!(hits[1].0, "c.md");
    assert!(hits[1].1 < 0.1);
}

#[tokio::test]
async fn rejects_vectors_of_the_wrong_dimension() {
    let temp = TempDir::new().expect("tempdir");
    let store = open_store(&temp).await;
    add_note(&store, "a.md").await;

    let err = store
        .upsert_embedding("a.md", &[vec![1.0, 0.0]], None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GraphError::EmbeddingDimMismatch {
            expected: 3,
            actual: 2
        }
    ));
}

#[tokio::test]
async fn open_statistics_accumulate() {
    let temp = TempDir::new().expect("tempdir");
    let store = open_store(&temp).await;
    add_note(&store, "a.md").await;

    store.record_open("a.md", 1_000).await.expect("open");
    store.record_open("a.md", 2_000).await.expect("open");

    let stats = store
        .get_by_doc_ids(&["a.md".to_string(), "unknown.md".to_string()])
        .await
        .expect("stats");
    assert_eq!(stats.len(), 1);
    assert_eq!(stats["a.md"].open_count, 2);
    assert_eq!(stats["a.md"].last_open_ts, Some(2_000));
}

#[tokio::test]
async fn removing_a_document_drops_its_edges_and_vector() {
    let temp = TempDir::new().expect("tempdir");
    let store = open_store(&temp).await;
    for path in ["a.md", "b.md"] {
        add_note(&store, path).await;
        store
            .upsert_embedding(path, &[vec![1.0, 0.0, 0.0]], None)
            .await
            .expect("embed");
    }
    store
        .upsert_edge(&GraphEdge::new("a.md", "b.md", "link"))
        .await
        .expect("edge");

    store.remove_document("b.md").await.expect("remove");

    assert!(store.get_by_path("b.md").await.expect("lookup").is_none());
    assert!(GraphRepository::get_by_id(&store, "b.md").await.expect("node").is_none());
    assert!(
        store
            .get_all_edges_for_node("a.md", 10)
            .await
            .expect("edges")
            .is_empty()
    );
    let hits = store
        .find_similar(&[1.0, 0.0, 0.0], 5, &[])
        .await
        .expect("knn");
    assert_eq!(hits.iter().map(|(id, _)| id.as_str()).collect::<Vec<_>>(), vec!["a.md"]);
    assert_eq!(store.list_document_ids().await.expect("ids"), vec!["a.md"]);
}

#[tokio::test]
async fn replacing_edges_keeps_other_sources() {
    let temp = TempDir::new().expect("tempdir");
    let store = open_store(&temp).await;
    for path in ["a.md", "b.md", "c.md"] {
        add_note(&store, path).await;
    }
    store
        .upsert_edge(&GraphEdge::new("a.md", "b.md", "link"))
        .await
        .expect("edge");
    store
        .upsert_edge(&GraphEdge::new("c.md", "b.md", "link"))
        .await
        .expect("edge");

    store
        .replace_edges_from("a.md", &[GraphEdge::new("a.md", "c.md", "link")])
        .await
        .expect("replace");

    let incoming = store.get_incoming_edges("b.md").await.expect("incoming");
    assert_eq!(incoming.len(), 1);
    assert_eq!(incoming[0].from_node_id, "c.md");
    let from_a = store.get_all_edges_for_node("a.md", 10).await.expect("edges");
    assert_eq!(from_a, vec![GraphEdge::new("a.md", "c.md", "link")]);
}

#[tokio::test]
async fn path_finder_runs_on_sqlite() {
    let temp = TempDir::new().expect("tempdir");
    let store = Arc::new(open_store(&temp).await);
    for path in ["inbox/a.md", "inbox/b.md", "archive/c.md"] {
        add_note(&store, path).await;
    }
    store
        .upsert_edge(&GraphEdge::new("inbox/a.md", "inbox/b.md", "link"))
        .await
        .expect("edge");
    store
        .upsert_edge(&GraphEdge::new("archive/c.md", "inbox/b.md", "link"))
        .await
        .expect("edge");

    let finder = PathFinder::new(PathStores::from_backend(store), PathFindingSettings::default());
    let response = finder
        .find_path(FindPathRequest::new("inbox/a.md", "archive/c.md"))
        .await
        .expect("search");
    match response.outcome {
        PathOutcome::Found(report) => {
            let best = &report.paths[0];
            assert_eq!(
                best.node_ids().collect::<Vec<_>>(),
                vec!["inbox/a.md", "inbox/b.md", "archive/c.md"]
            );
            assert_eq!(best.score.domain_jumps, 1);
        }
        other => panic!("expected paths, got {other:?}"),
    }
}
