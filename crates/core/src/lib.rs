//! llmmerge core library.
//!
//! This crate provides the building blocks of the llmmerge Git merge
//! driver: configuration, input loading, the three-way diff and merge
//! assembly, prompt and reply handling, completion backends, and the
//! resolver tying them together.

pub mod atomic;
pub mod backend;
pub mod config;
pub mod conflict;
pub mod errors;
pub mod input;
pub mod prompt;
pub mod resolver;
pub mod response;

// Re-exports for convenience.
pub use backend::{BackendChain, CompletionBackend};
pub use config::DriverConfig;
pub use errors::CoreError;
pub use input::{MergeInvocation, SideLabels};
pub use resolver::{MergeResolver, ResolutionResult};
