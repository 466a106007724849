use thiserror::Error;

/// Failures from the layers around the session engine. The engine itself has
/// no error path.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("history database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("cannot connect to upstream {addr}: {source}")]
    Connection {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
