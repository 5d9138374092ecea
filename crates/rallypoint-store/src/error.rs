use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store file I/O error on {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("store file {path} is not valid JSON: {source}")]
    Corrupt {
        path: std::path::PathBuf,
        source: serde_json::Error,
    },

    #[error("store lock poisoned")]
    Poisoned,
}
