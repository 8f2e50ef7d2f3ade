use crate::plugin::PluginError;
use std::path::PathBuf;
use thiserror::Error;

/// Core error type for dalkey operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read config at {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config at {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("No entry points configured")]
    NoEntries,

    #[error("Entry point not found: {path}")]
    EntryNotFound { path: PathBuf },

    #[error("Transform failed for {module}: {source}")]
    Transform {
        module: String,
        #[source]
        source: PluginError,
    },

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error("{0}")]
    Other(String),
}

impl Error {
    #[must_use]
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}
