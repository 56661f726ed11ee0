//! # chatrelay_core
//!
//! Core logic for the chat relay: transcripts and their window policy,
//! transcript storage, FAQ lookup, the completion engine client, and the
//! relay that ties them together for one exchange.

pub mod faq;
pub mod generation;
pub mod migrate;
pub mod relay;
pub mod store;
pub mod transcript;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
