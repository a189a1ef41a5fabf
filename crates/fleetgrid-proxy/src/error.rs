use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("reload command `{command}` failed: {reason}")]
    Reload { command: String, reason: String },
}

pub type ProxyResult<T> = Result<T, ProxyError>;
