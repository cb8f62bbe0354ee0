//! Configuration management for notepath.
//!
//! Settings come from a TOML file located at
//! `~/.config/notepath/config.toml`:
//! ```toml
//! [logging]
//! level = "info"
//!
//! [store]
//! db_path = "/home/me/.local/share/notepath/graph.sqlite3"
//!
//! [embedding]
//! url = "http://127.0.0.1:11434"
//! model = "qwen3-embedding:8b"
//!
//! [pathfinding]
//! max_hops = 4
//! max_results = 5
//! ```
//!
//! A `.env` file in the working directory is honored for environment
//! overrides such as `NOTEPATH_CONFIG_DIR` and `NOTEPATH_DATA_DIR`.

pub mod pathfinding;
mod settings;

pub use pathfinding::{EmbeddingSettings, PathFindingSettings};
pub use settings::{
    EmbeddingToolsSettings, LoggingSettings, PathFindingToolsSettings, Settings, SettingsError,
    StoreSettings, data_root,
};

/// Load .env file if it exists.
pub fn load_dotenv() {
    // Silently ignore errors (file might not exist)
    let _ = dotenvy::dotenv();
}
