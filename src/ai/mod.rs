//! Text generation for thread summaries and reply drafts
//!
//! Talks to any OpenAI-compatible chat-completions endpoint. Replies are
//! expected to follow fixed JSON contracts but are never trusted to.

mod client;
pub mod prompts;
mod summary;

pub use client::{ChatClient, ChatMessage, GenerationRequest, TextGenerator};
pub use summary::{Summary, extract_json};

#[cfg(test)]
pub(crate) use client::fake;
