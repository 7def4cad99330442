//! Local retrieval engine: chunking plus an in-memory full-text index per
//! uploaded document.

pub mod chunk;
pub mod index;

pub use chunk::TextSplitter;
pub use index::{ChunkIndex, SqliteIndexer};
