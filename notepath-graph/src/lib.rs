//! Knowledge graph path finding for Markdown vaults.
//!
//! Notes, tags and links live in a SQLite graph store with sqlite-vec
//! embeddings. [`PathFinder`] runs several search strategies between two
//! notes and explains how they connect.

pub mod analysis;
pub mod bfs;
pub mod chunker;
pub mod context;
pub mod embeddings;
pub mod engine;
pub mod errors;
pub mod format;
pub mod index;
pub mod ingest;
pub mod memory;
pub mod models;
pub mod neighbors;
pub mod parser;
pub mod repository;
pub mod scoring;
pub mod storage;
pub mod vector;

pub use notepath_core::{EmbeddingSettings, PathFindingSettings};

pub use embeddings::{Embedder, EmbeddingClient};
pub use engine::PathFinder;
pub use errors::{GraphError, GraphResult};
pub use index::{IndexReport, index_vault};
pub use memory::InMemoryStore;
pub use models::{
    Connection, DocMeta, EndpointSide, FindPathRequest, FindPathResponse, GraphEdge, GraphNode,
    PathFilters, PathOutcome, PathReport, ResponseFormat, ScoredPath, Strategy,
};
pub use repository::PathStores;
pub use storage::SqliteStore;
