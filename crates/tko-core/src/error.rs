use thiserror::Error;

#[derive(Error, Debug)]
pub enum TkoError {
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Compression error: {0}")]
    Compression(String),
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("{0} is closed")]
    Closed(&'static str),
    #[error("Module '{module}' failed: {source}")]
    Module {
        module: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, TkoError>;
