use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

use async_trait::async_trait;
use chrono::Utc;
use libsqlite3_sys::{SQLITE_OK, sqlite3, sqlite3_api_routines, sqlite3_auto_extension};
use sqlite_vec::sqlite3_vec_init;
use sqlx::{SqliteConnection, SqlitePool};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::debug;

use crate::errors::{GraphError, GraphResult};
use crate::models::{DocMeta, DocStatistics, GraphEdge, GraphNode};
use crate::repository::{
    DocumentRepository, EmbeddingRepository, GraphRepository, StatisticsRepository,
};
use crate::vector::average_vectors;

static SQLITE_VEC_INIT_RC: OnceLock<i32> = OnceLock::new();

type NodeRow = (String, String, String, Option<String>);
type EdgeRow = (String, String, String);
type DocRow = (
    String,
    String,
    Option<String>,
    Option<String>,
    Option<i64>,
    Option<i64>,
    Option<String>,
);

const DOC_COLUMNS: &str = "id, path, title, tags, ctime, mtime, content_hash";

/// SQLite backend with a sqlite-vec index over averaged document embeddings.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database. `embedding_dim` fixes the vector
    /// dimension on first use; afterwards the stored value wins.
    pub async fn open(db_path: &Path, embedding_dim: Option<usize>) -> GraphResult<Self> {
        init_sqlite_vec_once()?;
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    sqlx::query("PRAGMA journal_mode = WAL")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query("PRAGMA synchronous = NORMAL")
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations/graph").run(&pool).await?;
        let store = Self { pool };
        if let Some(dim) = store.embedding_dim().await?.or(embedding_dim) {
            store.ensure_vec_table(dim).await?;
        }
        debug!(path = %db_path.display(), "graph store opened");
        Ok(store)
    }

    pub async fn embedding_dim(&self) -> GraphResult<Option<usize>> {
        let existing: Option<(String,)> =
            sqlx::query_as("SELECT value FROM meta WHERE key = 'embedding_dim' LIMIT 1")
                .fetch_optional(&self.pool)
                .await?;
        Ok(existing.and_then(|(value,)| value.parse::<usize>().ok()))
    }

    async fn ensure_vec_table(&self, dimension: usize) -> GraphResult<()> {
        if !self.has_vec_table().await? {
            let create_sql = format!(
                "CREATE VIRTUAL TABLE IF NOT EXISTS doc_vec USING vec0(embedding float[{dimension}] distance_metric=cosine)"
            );
            sqlx::query(&create_sql).execute(&self.pool).await?;
        }
        sqlx::query("INSERT OR REPLACE INTO meta (key, value) VALUES ('embedding_dim', ?)")
            .bind(dimension.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn has_vec_table(&self) -> GraphResult<bool> {
        let table: Option<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'doc_vec'",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(table.is_some())
    }

    pub async fn upsert_node(&self, node: &GraphNode) -> GraphResult<()> {
        let attributes = if node.attributes.is_null() {
            None
        } else {
            Some(serde_json::to_string(&node.attributes)?)
        };
        sqlx::query(
            r#"INSERT INTO graph_nodes (id, node_type, label, attributes) VALUES (?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 node_type=excluded.node_type,
                 label=excluded.label,
                 attributes=excluded.attributes"#,
        )
        .bind(&node.id)
        .bind(&node.node_type)
        .bind(&node.label)
        .bind(attributes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn upsert_edge(&self, edge: &GraphEdge) -> GraphResult<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO graph_edges (from_node_id, to_node_id, edge_type) VALUES (?, ?, ?)",
        )
        .bind(&edge.from_node_id)
        .bind(&edge.to_node_id)
        .bind(&edge.edge_type)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Replace every outgoing edge of `from_id` in one transaction.
    pub async fn replace_edges_from(&self, from_id: &str, edges: &[GraphEdge]) -> GraphResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM graph_edges WHERE from_node_id = ?")
            .bind(from_id)
            .execute(&mut *tx)
            .await?;
        for edge in edges.iter().filter(|edge| edge.from_node_id == from_id) {
            sqlx::query(
                "INSERT OR IGNORE INTO graph_edges (from_node_id, to_node_id, edge_type) VALUES (?, ?, ?)",
            )
            .bind(&edge.from_node_id)
            .bind(&edge.to_node_id)
            .bind(&edge.edge_type)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn upsert_document(&self, meta: &DocMeta) -> GraphResult<()> {
        sqlx::query(
            r#"INSERT INTO documents (id, path, title, tags, ctime, mtime, content_hash, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 path=excluded.path,
                 title=excluded.title,
                 tags=excluded.tags,
                 ctime=excluded.ctime,
                 mtime=excluded.mtime,
                 content_hash=excluded.content_hash,
                 updated_at=excluded.updated_at"#,
        )
        .bind(&meta.id)
        .bind(&meta.path)
        .bind(&meta.title)
        .bind(&meta.tags)
        .bind(meta.ctime)
        .bind(meta.mtime)
        .bind(&meta.content_hash)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn document_hash(&self, doc_id: &str) -> GraphResult<Option<String>> {
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT content_hash FROM documents WHERE id = ?")
                .bind(doc_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.and_then(|(hash,)| hash))
    }

    pub async fn list_document_ids(&self) -> GraphResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT id FROM documents ORDER BY seq")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Drop a document with its node, edges, vectors and statistics.
    pub async fn remove_document(&self, doc_id: &str) -> GraphResult<()> {
        let has_vectors = self.has_vec_table().await?;
        let mut tx = self.pool.begin().await?;
        if has_vectors {
            delete_vector(&mut *tx, doc_id).await?;
        }
        sqlx::query("DELETE FROM graph_edges WHERE from_node_id = ? OR to_node_id = ?")
            .bind(doc_id)
            .bind(doc_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM graph_nodes WHERE id = ?")
            .bind(doc_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM doc_statistics WHERE doc_id = ?")
            .bind(doc_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(doc_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Forget the vector of a document whose content no longer matches it.
    pub async fn clear_embedding(&self, doc_id: &str) -> GraphResult<()> {
        let has_vectors = self.has_vec_table().await?;
        let mut tx = self.pool.begin().await?;
        if has_vectors {
            delete_vector(&mut *tx, doc_id).await?;
        }
        sqlx::query("DELETE FROM doc_embeddings WHERE doc_id = ?")
            .bind(doc_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Store the mean of `chunk_vectors` and index it for KNN search.
    pub async fn upsert_embedding(
        &self,
        doc_id: &str,
        chunk_vectors: &[Vec<f32>],
        model: Option<&str>,
    ) -> GraphResult<()> {
        let Some(average) = average_vectors(chunk_vectors) else {
            return Ok(());
        };

        match self.embedding_dim().await? {
            Some(expected) if expected != average.len() => {
                return Err(GraphError::EmbeddingDimMismatch {
                    expected,
                    actual: average.len(),
                });
            }
            Some(_) => {}
            None => self.ensure_vec_table(average.len()).await?,
        }

        let seq: Option<(i64,)> = sqlx::query_as("SELECT seq FROM documents WHERE id = ?")
            .bind(doc_id)
            .fetch_optional(&self.pool)
            .await?;
        let Some((seq,)) = seq else {
            return Err(GraphError::Embedding(format!(
                "cannot embed unknown document {doc_id}"
            )));
        };

        let payload = serde_json::to_string(&average)?;
        sqlx::query(
            r#"INSERT INTO doc_embeddings (doc_id, embedding, chunk_count, model, updated_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT(doc_id) DO UPDATE SET
                 embedding=excluded.embedding,
                 chunk_count=excluded.chunk_count,
                 model=excluded.model,
                 updated_at=excluded.updated_at"#,
        )
        .bind(doc_id)
        .bind(&payload)
        .bind(chunk_vectors.len() as i64)
        .bind(model)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        // vec0 has no upsert.
        sqlx::query("DELETE FROM doc_vec WHERE rowid = ?")
            .bind(seq)
            .execute(&self.pool)
            .await?;
        sqlx::query("INSERT INTO doc_vec(rowid, embedding) VALUES (?, ?)")
            .bind(seq)
            .bind(payload)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn record_open(&self, doc_id: &str, timestamp_ms: i64) -> GraphResult<()> {
        sqlx::query(
            r#"INSERT INTO doc_statistics (doc_id, open_count, last_open_ts) VALUES (?, 1, ?)
               ON CONFLICT(doc_id) DO UPDATE SET
                 open_count = open_count + 1,
                 last_open_ts = excluded.last_open_ts"#,
        )
        .bind(doc_id)
        .bind(timestamp_ms)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn init_sqlite_vec_once() -> GraphResult<()> {
    let rc = *SQLITE_VEC_INIT_RC.get_or_init(|| unsafe {
        type SqliteVecInitFn =
            unsafe extern "C" fn(*mut sqlite3, *mut *const i8, *const sqlite3_api_routines) -> i32;

        sqlite3_auto_extension(Some(std::mem::transmute::<*const (), SqliteVecInitFn>(
            sqlite3_vec_init as *const (),
        )))
    });

    if rc == SQLITE_OK {
        Ok(())
    } else {
        Err(GraphError::SqliteVec(format!(
            "sqlite3_auto_extension failed with code {rc}"
        )))
    }
}

/// `doc_vec` is keyed by the document's `seq`.
async fn delete_vector(conn: &mut SqliteConnection, doc_id: &str) -> GraphResult<()> {
    let seq: Option<(i64,)> = sqlx::query_as("SELECT seq FROM documents WHERE id = ?")
        .bind(doc_id)
        .fetch_optional(&mut *conn)
        .await?;
    if let Some((seq,)) = seq {
        sqlx::query("DELETE FROM doc_vec WHERE rowid = ?")
            .bind(seq)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn node_from_row((id, node_type, label, attributes): NodeRow) -> GraphNode {
    let attributes = attributes
        .and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or(serde_json::Value::Null);
    GraphNode {
        id,
        node_type,
        label,
        attributes,
    }
}

fn edge_from_row((from_node_id, to_node_id, edge_type): EdgeRow) -> GraphEdge {
    GraphEdge {
        from_node_id,
        to_node_id,
        edge_type,
    }
}

fn doc_from_row((id, path, title, tags, ctime, mtime, content_hash): DocRow) -> DocMeta {
    DocMeta {
        id,
        path,
        title,
        tags,
        ctime,
        mtime,
        content_hash,
    }
}

#[async_trait]
impl GraphRepository for SqliteStore {
    async fn get_by_id(&self, id: &str) -> GraphResult<Option<GraphNode>> {
        let row: Option<NodeRow> = sqlx::query_as(
            "SELECT id, node_type, label, attributes FROM graph_nodes WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(node_from_row))
    }

    async fn get_by_ids(&self, ids: &[String]) -> GraphResult<Vec<GraphNode>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT id, node_type, label, attributes FROM graph_nodes WHERE id IN ({})",
            placeholders(ids.len())
        );
        let mut query = sqlx::query_as::<_, NodeRow>(&sql);
        for id in ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(node_from_row).collect())
    }

    async fn get_all_edges_for_node(
        &self,
        node_id: &str,
        limit: usize,
    ) -> GraphResult<Vec<GraphEdge>> {
        let rows: Vec<EdgeRow> = sqlx::query_as(
            r#"SELECT from_node_id, to_node_id, edge_type FROM graph_edges
               WHERE from_node_id = ? OR to_node_id = ?
               ORDER BY rowid
               LIMIT ?"#,
        )
        .bind(node_id)
        .bind(node_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(edge_from_row).collect())
    }

    async fn get_incoming_edges(&self, node_id: &str) -> GraphResult<Vec<GraphEdge>> {
        let rows: Vec<EdgeRow> = sqlx::query_as(
            "SELECT from_node_id, to_node_id, edge_type FROM graph_edges WHERE to_node_id = ? ORDER BY rowid",
        )
        .bind(node_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(edge_from_row).collect())
    }
}

#[async_trait]
impl DocumentRepository for SqliteStore {
    async fn get_by_path(&self, path: &str) -> GraphResult<Option<DocMeta>> {
        let sql = format!("SELECT {DOC_COLUMNS} FROM documents WHERE path = ? LIMIT 1");
        let row: Option<DocRow> = sqlx::query_as(&sql)
            .bind(path.trim_start_matches('/'))
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(doc_from_row))
    }

    async fn get_by_ids(&self, ids: &[String]) -> GraphResult<Vec<DocMeta>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {DOC_COLUMNS} FROM documents WHERE id IN ({})",
            placeholders(ids.len())
        );
        let mut query = sqlx::query_as::<_, DocRow>(&sql);
        for id in ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(doc_from_row).collect())
    }
}

#[async_trait]
impl EmbeddingRepository for SqliteStore {
    async fn get_average_embedding(&self, doc_id: &str) -> GraphResult<Option<Vec<f32>>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT embedding FROM doc_embeddings WHERE doc_id = ?")
                .bind(doc_id)
                .fetch_optional(&self.pool)
                .await?;
        match row {
            Some((payload,)) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    async fn find_similar(
        &self,
        vector: &[f32],
        limit: usize,
        exclude: &[String],
    ) -> GraphResult<Vec<(String, f64)>> {
        if limit == 0 || vector.is_empty() || !self.has_vec_table().await? {
            return Ok(Vec::new());
        }
        if let Some(dim) = self.embedding_dim().await?
            && dim != vector.len()
        {
            return Err(GraphError::EmbeddingDimMismatch {
                expected: dim,
                actual: vector.len(),
            });
        }

        let payload = serde_json::to_string(vector)?;
        let k = (limit + exclude.len()) as i64;
        let rows: Vec<(String, f64)> = sqlx::query_as(
            r#"WITH knn AS (
                   SELECT rowid, distance FROM doc_vec WHERE embedding MATCH ? AND k = ?
               )
               SELECT d.id, knn.distance FROM knn
               JOIN documents d ON d.seq = knn.rowid
               ORDER BY knn.distance ASC, d.id ASC"#,
        )
        .bind(payload)
        .bind(k)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter(|(id, _)| !exclude.contains(id))
            .map(|(id, distance)| (id, (1.0 - distance).clamp(0.0, 1.0)))
            .take(limit)
            .collect())
    }
}

#[async_trait]
impl StatisticsRepository for SqliteStore {
    async fn get_by_doc_ids(&self, ids: &[String]) -> GraphResult<HashMap<String, DocStatistics>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let sql = format!(
            "SELECT doc_id, open_count, last_open_ts FROM doc_statistics WHERE doc_id IN ({})",
            placeholders(ids.len())
        );
        let mut query = sqlx::query_as::<_, (String, i64, Option<i64>)>(&sql);
        for id in ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|(doc_id, open_count, last_open_ts)| {
                (
                    doc_id.clone(),
                    DocStatistics {
                        doc_id,
                        open_count,
                        last_open_ts,
                    },
                )
            })
            .collect())
    }
}
