use thiserror::Error;

use crate::sort::MAX_BUFFER_SIZE;

/// Error type for all sort operations.
#[derive(Error, Debug)]
pub enum SortError {
    /// The populated prefix of a buffer contains no newline. The input
    /// holds at least one token larger than the whole buffer.
    #[error("token delimiter not found")]
    DelimiterNotFound,

    /// Requested buffer exceeds what the 32-bit index fields can address.
    #[error("buffer size {0} exceeds the maximum of {MAX_BUFFER_SIZE} bytes")]
    BufferSizeTooBig(usize),

    /// A single input token is larger than the configured chunk size.
    #[error("token size {size} greater than chunk size {chunk_size}")]
    TokenTooLarge { size: usize, chunk_size: usize },

    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl SortError {
    pub(crate) fn io(context: &'static str, source: std::io::Error) -> Self {
        SortError::Io { context, source }
    }
}

/// Result type alias for sort operations.
pub type Result<T> = std::result::Result<T, SortError>;
