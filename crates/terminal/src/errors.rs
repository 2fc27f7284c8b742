use librarian_core::assistant::errors::AssistantError;
use librarian_core::database::types::DatabaseError;
use std::path::PathBuf;

/// The Librarian error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The config file exists but cannot be read
    #[error("Failed to read config file {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The config file is not valid JSON or has fields of the wrong type
    #[error("Malformed config file: {0}")]
    ConfigParse(#[from] serde_json::Error),
    /// The catalog database cannot be opened or queried
    #[error(transparent)]
    Database(#[from] DatabaseError),
    /// The chat client cannot be constructed
    #[error(transparent)]
    Assistant(#[from] AssistantError),
    /// Drawing to or reading from the terminal failed
    #[error("Terminal error: {0}")]
    Terminal(#[from] std::io::Error),
    /// Wildcard error for everything else
    #[error("{0}")]
    Other(String),
}
