pub mod chunker;
pub mod merger;
pub mod scan;
pub mod sorter;


pub use self::chunker::*;
pub use self::merger::*;
pub use self::scan::*;
pub use self::sorter::*;

/// An ordered group of owned tokens (delimiters excluded) whose total
/// payload is bounded by the configured chunk size.
pub type Chunk = Vec<Vec<u8>>;
