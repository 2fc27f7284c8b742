use crate::errors::Error;
use core::time::Duration;
use librarian_core::assistant::client::OllamaConfig;
use librarian_core::assistant::recommender::DEFAULT_TTL;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const APP_CONFIG_PATH: &str = "librarian-config.json";
pub const LIBRARY_DATABASE_NAME: &str = "library.db";
pub const LOG_FILE_NAME: &str = "librarian.log";

/// Settings read from `librarian-config.json`. Every key is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibrarianConfig {
    pub library_path: PathBuf,
    pub log_path: PathBuf,
    pub ollama: OllamaConfig,
    pub recommendation_ttl_secs: u64,
}

impl Default for LibrarianConfig {
    #[inline]
    fn default() -> Self {
        Self {
            library_path: PathBuf::from(LIBRARY_DATABASE_NAME),
            log_path: PathBuf::from(LOG_FILE_NAME),
            ollama: OllamaConfig::default(),
            recommendation_ttl_secs: DEFAULT_TTL.as_secs(),
        }
    }
}

impl LibrarianConfig {
    /// Reads the config file at `path`, falling back to defaults if there is none
    /// # Errors
    /// Fails if the file exists but cannot be read or parsed
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called once at start of program"
    )]
    pub fn load(path: &Path) -> Result<Self, Error> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(Error::ConfigRead {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// # Errors
    /// Fails if `contents` is not a valid config document
    #[inline]
    pub fn from_json(contents: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(contents)?)
    }

    #[must_use]
    #[inline]
    pub const fn recommendation_ttl(&self) -> Duration {
        Duration::from_secs(self.recommendation_ttl_secs)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "Tests are predefined and guaranteed to be Ok"
)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = LibrarianConfig::load(Path::new("does-not-exist/librarian-config.json"));
        assert_eq!(config.unwrap(), LibrarianConfig::default());
    }

    #[test]
    fn test_partial_config() {
        let config = LibrarianConfig::from_json(
            r#"{"library_path": "/srv/books.db", "ollama": {"model": "mistral"}}"#,
        )
        .unwrap();
        assert_eq!(config.library_path, PathBuf::from("/srv/books.db"));
        assert_eq!(config.ollama.model, "mistral");
        assert_eq!(config.ollama.base_url, OllamaConfig::default().base_url);
        assert_eq!(config.recommendation_ttl(), DEFAULT_TTL);
    }

    #[test]
    fn test_malformed_config_is_an_error() {
        assert!(matches!(
            LibrarianConfig::from_json("{library_path"),
            Err(Error::ConfigParse(_))
        ));
    }
}
