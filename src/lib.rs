// Public modules
pub mod cli;
pub mod client;
pub mod completion;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod history;
pub mod message;
pub mod render;
pub mod sse;

mod observability;

// Re-exports
pub use client::{Client, chat_completion, chat_completion_stream};
pub use completion::{ChatCompletionResult, CollectingSink, DeltaSink};
pub use config::{Config, Paths};
pub use endpoint::Endpoint;
pub use error::{Error, Result};
pub use history::ConversationStore;
pub use message::{Message, Role, decode_messages, encode_messages};
pub use observability::register_biometrics;
pub use render::StreamRenderer;
