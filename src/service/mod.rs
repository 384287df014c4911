//! Orchestration over the mailbox, the cache and the generation/transport collaborators.
//!
//! - `threads.rs` - listing pipeline and the thread-load state machine
//! - `summary.rs` - compute-once summaries
//! - `draft.rs` - reply drafts and sending

mod draft;
mod summary;
mod threads;

pub use draft::{DraftRequest, ReplyGateway, SendRequest};
pub use summary::SummaryService;
pub use threads::{ThreadLoad, ThreadService};

#[cfg(test)]
pub(crate) use threads::testing;
