pub mod http;
pub mod traits;

pub use http::HttpChatAdapter;
pub use traits::{ChatAdapter, DocumentIndex, DocumentIndexer, IndexHandle, Passage};
