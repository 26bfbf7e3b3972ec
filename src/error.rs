use thiserror::Error;

/// Errors raised while parsing a bulk upload.
///
/// A failed upload is rejected as a whole: the previously loaded state
/// stays authoritative. Lookup misses at resolution time are not errors
/// (they resolve to deny), and cache pressure is not an error (it
/// triggers eviction).
#[derive(Debug, Error)]
pub enum UploadError {
    /// The upload text violates the expected grammar.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// A policy line declared a rule id outside the declared rule count.
    #[error("rule id {id} out of range (declared count {count})")]
    RuleIdOutOfRange { id: u32, count: u32 },

    /// A tree node referenced an id outside the declared node count.
    #[error("node id {id} out of range (declared count {count})")]
    NodeIdOutOfRange { id: u32, count: u32 },

    /// A resource path exceeds the maximum accepted length.
    #[error("resource path exceeds {max} bytes")]
    PathTooLong { max: usize },
}

impl UploadError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        UploadError::MalformedInput(msg.into())
    }
}
