//! HTTP execution layer consumed by the async operation core.
//!
//! The core only needs "send this request, give me a body stream and its
//! declared length". [`Transport`] is that seam; [`HttpTransport`] is the
//! `reqwest` implementation that speaks GData (version header, method
//! override, manual redirects, re-authentication and retry on 500).
//!
//! Transports are called from the operation's worker thread and may block.

mod http;
mod upload;

pub use http::{HttpTransport, RequestSettings};

use crate::async_ops::{AsyncRequest, CancellationToken};
use crate::auth::AuthError;
use crate::util::UrlValidationError;
use std::fmt;
use std::io::Read;
use thiserror::Error;

/// Header carrying the protocol version the client speaks.
pub const GDATA_VERSION_HEADER: &str = "GData-Version";
/// Header used to tunnel PUT/PATCH/DELETE through POST.
pub const METHOD_OVERRIDE_HEADER: &str = "X-HTTP-Method-Override";
/// Header carrying the developer key (`key=<value>`).
pub const DEVELOPER_KEY_HEADER: &str = "X-GData-Key";

/// Errors that can occur while executing a request.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Server answered 304 to a conditional request
    #[error("Not modified since the requested timestamp")]
    NotModified,
    /// Redirect that policy forbids following (non-GET under strict redirect, or no Location)
    #[error("Redirect not followed: status {status}, location {location:?}")]
    Redirect {
        status: u16,
        location: Option<String>,
    },
    #[error("Too many redirects (limit {0})")]
    TooManyRedirects(u32),
    /// Redirect target failed URL validation
    #[error("Invalid redirect target: {0}")]
    InvalidRedirect(#[from] UrlValidationError),
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),
    /// The operation was cancelled while its request body was being sent
    #[error("Operation was cancelled")]
    Cancelled,
}

/// A response ready for the streaming copy.
pub struct TransportResponse {
    /// `None` when the server sent no body (e.g. 204).
    pub body: Option<Box<dyn Read + Send>>,
    pub content_length: Option<u64>,
}

impl TransportResponse {
    pub fn new(body: Box<dyn Read + Send>, content_length: Option<u64>) -> Self {
        Self {
            body: Some(body),
            content_length,
        }
    }

    pub fn empty() -> Self {
        Self {
            body: None,
            content_length: None,
        }
    }
}

impl fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportResponse")
            .field("body", &self.body.as_ref().map(|_| "<stream>"))
            .field("content_length", &self.content_length)
            .finish()
    }
}

/// Performs one request on behalf of the operation core.
pub trait Transport: Send + Sync {
    /// Sends `request` and returns the response body stream.
    ///
    /// Implementations should check `cancel` between units of upload work
    /// and return [`TransportError::Cancelled`] once it fires.
    fn execute(
        &self,
        request: &AsyncRequest,
        cancel: &CancellationToken,
    ) -> Result<TransportResponse, TransportError>;
}
