//! Error types for schedule loading

use thiserror::Error;

/// Failure to turn a schedule document into a snapshot.
///
/// Every variant is fatal to a reload: the engine keeps the previous
/// schedule and caches when one of these comes back.
#[derive(Debug, Error)]
pub enum EpgError {
    #[error("XML error at byte {position}: {message}")]
    Xml { position: u64, message: String },
    #[error("document has no root element")]
    MissingRoot,
    #[error("root element is <{0}>, expected <tv>")]
    UnexpectedRoot(String),
    #[error("document ended with {0} unclosed element(s)")]
    Truncated(usize),
    #[error("failed to decompress schedule: {0}")]
    Decompress(#[from] std::io::Error),
}

impl EpgError {
    /// Whether the document itself is unusable (as opposed to a transport problem).
    pub fn is_structural(&self) -> bool {
        !matches!(self, EpgError::Decompress(_))
    }
}
