//! Client SDK for Google's GData protocol family.
//!
//! The crate is organised around the asynchronous operation core in
//! [`async_ops`]: callers submit requests tagged with a unique correlation
//! token, receive progress and completion events on a channel they own, and
//! may cancel in-flight work at any time.
//!
//! - [`async_ops`] - operation registry, progress reporting, completion dispatch, chunked copy
//! - [`transport`] - HTTP execution (`reqwest`) with GData headers, retries and redirects
//! - [`auth`] - ClientLogin, AuthSub and OAuth 2.0 authenticators
//! - [`atom`] - Atom/RSS document model, parser and entry writer, including shopping product entries
//! - [`query`] - feed query URI builders, generic and Content API for Shopping
//! - [`config`] - optional TOML configuration
//!
//! # Example
//!
//! ```ignore
//! use gdata::async_ops::{AsyncDataHandler, AsyncRequest, OperationContext, OperationEvent};
//! use gdata::transport::HttpTransport;
//!
//! let handler = AsyncDataHandler::new(Arc::new(HttpTransport::new(settings, auth)));
//! let (context, mut events) = OperationContext::channel();
//! handler.submit(AsyncRequest::get(uri, "feed-1").parse_feed(), context)?;
//!
//! while let Some(event) = events.recv().await {
//!     if let OperationEvent::Completed(done) = event {
//!         break;
//!     }
//! }
//! ```

pub mod async_ops;
pub mod atom;
pub mod auth;
pub mod config;
pub mod query;
pub mod transport;
pub mod util;
