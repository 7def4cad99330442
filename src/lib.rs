//! pdfchat: upload a PDF and chat about it.
//!
//! - [`store`]: upload validation and on-disk storage
//! - [`retrieval`]: chunking and the in-memory full-text index
//! - [`providers`]: index/chat capability traits and the HTTP chat adapter
//! - [`session`]: the active-document record and conversation log
//! - [`service`]: the serialized upload/chat/clear lifecycle
//! - [`gateway`]: the axum HTTP surface

pub mod config;
pub mod error;
pub mod gateway;
pub mod providers;
pub mod retrieval;
pub mod service;
pub mod session;
pub mod store;

pub use error::ChatError;
pub use service::DocumentChat;
