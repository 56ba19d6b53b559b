//! Asynchronous operation lifecycle: registration, progress, completion, cancellation.
//!
//! Every request submitted through [`AsyncDataHandler`] is keyed by its
//! caller-supplied [`OperationId`] in a shared [`OperationRegistry`]. The
//! registry is the single source of truth for "is this operation still
//! alive": progress is only delivered while the id is registered, and the
//! one completion event is delivered by whoever removes the id first.
//!
//! # Architecture
//!
//! - [`registry`](OperationRegistry) - mutex-guarded id → context map
//! - [`ProgressReporter`] - drops progress for ids no longer registered
//! - [`CompletionDispatcher`] - remove-then-post, at most once per id
//! - [`copy_response_to_memory`] - 4 KiB chunked copy with per-chunk cancellation check
//! - [`AsyncDataHandler`] - submit/cancel surface, one worker thread per operation
//!
//! Events reach the caller through an [`OperationContext`], a channel endpoint
//! captured at submit time. Workers never invoke caller code directly.

mod completion;
mod copy;
mod error;
mod handler;
mod progress;
mod registry;
mod types;

pub use completion::CompletionDispatcher;
pub use copy::{copy_chunked, copy_response_to_memory, CHUNK_SIZE};
pub use error::{CopyError, OperationError, RegistryError, SubmitError};
pub use handler::AsyncDataHandler;
pub use progress::{percent_complete, ProgressReporter, ProgressTarget};
pub use registry::{CancellationToken, OperationRegistry};
pub use types::{
    AsyncRequest, CompletedEvent, CompletionOutcome, HttpVerb, OperationContext, OperationEvent,
    OperationId, Payload, ProgressEvent, RequestBody, ResponseMode,
};
