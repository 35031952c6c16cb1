use thiserror::Error;

/// Backend-facing error. The provider never lets this escape to its
/// own callers — a fetch failure degrades to `None` (plus a `warn!` log) or,
/// for an entry that is merely expired, to the stale cached value.
#[derive(Debug, Error, Clone)]
pub enum CatalogError {
    #[error("catalog backend unreachable: {0}")]
    Unreachable(String),

    #[error("catalog backend returned a malformed record: {0}")]
    Malformed(String),
}
