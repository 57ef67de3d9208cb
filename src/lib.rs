/// Use mimalloc as the global allocator.
/// The external pipeline allocates one Vec per token; mimalloc's
/// thread-local caching keeps that cheap across the sorter workers.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod cancel;
pub mod chunks;
pub mod common;
pub mod error;
pub mod sort;

pub use cancel::Cancel;
pub use error::{Result, SortError};
