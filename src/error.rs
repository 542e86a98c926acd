//! Error types surfaced by the parts of the cache that can fail.
use std::io;

#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
    #[error("key {key:?} is not a valid cache key")]
    InvalidKey { key: String },
}

pub type Result<T> = std::result::Result<T, CacheError>;
