pub mod config;

pub use config::{
    EmbeddingSettings, LoggingSettings, PathFindingSettings, Settings, SettingsError,
    load_dotenv,
};
