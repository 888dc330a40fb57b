//! Error types for the mismatch engine.
//!
//! Planning failures are recoverable locally (the caller retries with a
//! relaxed matcher or a different renderer); rewriting failures abort only
//! the current plan; font-generation failures invalidate only outputs that
//! depend on the failed strategy.

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while parsing, rewriting, or assembling.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Content stream could not be tokenized at a specific byte offset
    #[error("Failed to parse content stream at byte {offset}: {reason}")]
    ParseError {
        /// Byte offset where the error occurred
        offset: usize,
        /// Reason for the failure
        reason: String,
    },

    /// A replacement character has no encoding in the segment's font.
    ///
    /// Aborts the whole plan: the rewrite is all-or-nothing, so the caller
    /// falls back to an alternate renderer instead of emitting a stream
    /// that would paint the wrong glyph.
    #[error("Font '{font}' has no encoding for character U+{codepoint:04X}")]
    UnsupportedEncoding {
        /// Font resource id of the affected segment
        font: String,
        /// Codepoint that could not be encoded
        codepoint: u32,
    },

    /// A plan references an operator or fragment that does not exist in the
    /// record sequence it is being applied against
    #[error("Replacement plan is inconsistent with the operator stream: {0}")]
    PlanMismatch(String),

    /// Planning failure (target not found, empty target, ...)
    #[error(transparent)]
    Plan(#[from] crate::planner::PlanError),

    /// Font generation failure
    #[error(transparent)]
    FontGen(#[from] crate::fonts::FontGenError),

    /// Font resource table error
    #[error("Font error: {0}")]
    Font(String),

    /// Snapshot image could not be decoded
    #[error("Image error: {0}")]
    Image(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_encoding_message() {
        let err = Error::UnsupportedEncoding {
            font: "F1".to_string(),
            codepoint: 0x41,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("F1"));
        assert!(msg.contains("U+0041"));
    }

    #[test]
    fn test_plan_error_is_transparent() {
        let err: Error = crate::planner::PlanError::EmptyTarget.into();
        assert!(matches!(
            err,
            Error::Plan(crate::planner::PlanError::EmptyTarget)
        ));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
