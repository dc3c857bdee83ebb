use thiserror::Error;

/// Errors raised by the data pipeline stages.
#[derive(Debug, Error)]
pub enum NerError {
    /// A sentence carries a different number of tokens and tags.
    #[error("sentence {index} has {tokens} tokens but {tags} tags")]
    LengthMismatch {
        /// Position of the offending sentence in its corpus.
        index: usize,
        /// Number of tokens.
        tokens: usize,
        /// Number of tags.
        tags: usize,
    },

    /// A tag is absent from the tag vocabulary. Tags have no fallback id.
    #[error("unknown tag: {0:?}")]
    UnknownTag(String),

    /// A token vocabulary lacks one of its reserved entries.
    #[error("token vocabulary is missing reserved token {0:?}")]
    MissingToken(String),

    /// A sentence template has no name insertion point.
    #[error("template has no `{{}}` insertion point: {0:?}")]
    InvalidTemplate(String),

    /// The generator was given an empty name or template list.
    #[error("generator catalog has no {0}")]
    EmptyCatalog(&'static str),
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, NerError>;
