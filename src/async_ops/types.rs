use crate::async_ops::error::OperationError;
use crate::atom::{AtomEntry, AtomFeed};
use chrono::{DateTime, Utc};
use std::fmt;
use std::io::Cursor;
use std::sync::Arc;
use tokio::sync::mpsc;
use url::Url;

/// Caller-supplied correlation token identifying one in-flight operation.
///
/// Two operations with equal ids may not be registered at the same time.
/// Cloning is cheap (`Arc<str>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationId(Arc<str>);

impl OperationId {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OperationId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for OperationId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpVerb {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpVerb {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpVerb::Get => "GET",
            HttpVerb::Post => "POST",
            HttpVerb::Put => "PUT",
            HttpVerb::Patch => "PATCH",
            HttpVerb::Delete => "DELETE",
        }
    }

    /// Verbs that GData servers only accept through `X-HTTP-Method-Override`
    /// when method override is enabled.
    pub fn needs_override(self) -> bool {
        matches!(self, HttpVerb::Put | HttpVerb::Patch | HttpVerb::Delete)
    }
}

impl fmt::Display for HttpVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the worker does with the buffered response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseMode {
    /// Hand the buffered bytes back untouched.
    #[default]
    Raw,
    /// Parse the body as an Atom (or RSS) feed.
    Feed,
    /// Parse the body as a single Atom entry.
    Entry,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestBody {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// One request to run asynchronously.
///
/// Owned by the worker thread for the lifetime of the operation.
#[derive(Debug, Clone)]
pub struct AsyncRequest {
    pub uri: Url,
    pub verb: HttpVerb,
    pub user_data: OperationId,
    pub mode: ResponseMode,
    pub body: Option<RequestBody>,
    pub if_modified_since: Option<DateTime<Utc>>,
    /// When false the copy loop takes the cheap path and reports nothing.
    pub report_progress: bool,
}

impl AsyncRequest {
    pub fn new(verb: HttpVerb, uri: Url, user_data: impl Into<OperationId>) -> Self {
        Self {
            uri,
            verb,
            user_data: user_data.into(),
            mode: ResponseMode::Raw,
            body: None,
            if_modified_since: None,
            report_progress: true,
        }
    }

    pub fn get(uri: Url, user_data: impl Into<OperationId>) -> Self {
        Self::new(HttpVerb::Get, uri, user_data)
    }

    pub fn with_mode(mut self, mode: ResponseMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn parse_feed(self) -> Self {
        self.with_mode(ResponseMode::Feed)
    }

    pub fn parse_entry(self) -> Self {
        self.with_mode(ResponseMode::Entry)
    }

    pub fn with_body(mut self, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.body = Some(RequestBody {
            content_type: content_type.into(),
            bytes,
        });
        self
    }

    pub fn if_modified_since(mut self, timestamp: DateTime<Utc>) -> Self {
        self.if_modified_since = Some(timestamp);
        self
    }

    pub fn without_progress(mut self) -> Self {
        self.report_progress = false;
        self
    }
}

/// Incremental transfer report for one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    /// Declared total size, `None` when the server did not say.
    pub complete_size: Option<u64>,
    /// Bytes transferred so far.
    pub position: u64,
    /// 0 when the total is unknown or not larger than one chunk.
    pub percent: u32,
    pub uri: Url,
    pub verb: HttpVerb,
    pub user_data: OperationId,
}

/// Successful result of an operation.
#[derive(Debug)]
pub enum Payload {
    /// Raw response bytes, positioned at the start.
    Stream(Cursor<Vec<u8>>),
    Feed(AtomFeed),
    Entry(AtomEntry),
    /// The server returned no body at all.
    Empty,
}

#[derive(Debug)]
pub enum CompletionOutcome {
    Succeeded(Payload),
    Failed(OperationError),
    Cancelled,
}

impl From<Result<Payload, OperationError>> for CompletionOutcome {
    fn from(result: Result<Payload, OperationError>) -> Self {
        match result {
            Ok(payload) => CompletionOutcome::Succeeded(payload),
            Err(OperationError::Cancelled) => CompletionOutcome::Cancelled,
            Err(e) => CompletionOutcome::Failed(e),
        }
    }
}

/// The single terminal event of an operation.
#[derive(Debug)]
pub struct CompletedEvent {
    pub user_data: OperationId,
    pub outcome: CompletionOutcome,
}

impl CompletedEvent {
    pub fn cancelled(&self) -> bool {
        matches!(self.outcome, CompletionOutcome::Cancelled)
    }

    pub fn error(&self) -> Option<&OperationError> {
        match &self.outcome {
            CompletionOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }

    pub fn payload(&self) -> Option<&Payload> {
        match &self.outcome {
            CompletionOutcome::Succeeded(payload) => Some(payload),
            _ => None,
        }
    }

    pub fn feed(&self) -> Option<&AtomFeed> {
        match self.payload() {
            Some(Payload::Feed(feed)) => Some(feed),
            _ => None,
        }
    }

    pub fn entry(&self) -> Option<&AtomEntry> {
        match self.payload() {
            Some(Payload::Entry(entry)) => Some(entry),
            _ => None,
        }
    }

    pub fn stream(&self) -> Option<&Cursor<Vec<u8>>> {
        match self.payload() {
            Some(Payload::Stream(stream)) => Some(stream),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub enum OperationEvent {
    Progress(ProgressEvent),
    Completed(CompletedEvent),
}

impl OperationEvent {
    pub fn user_data(&self) -> &OperationId {
        match self {
            OperationEvent::Progress(p) => &p.user_data,
            OperationEvent::Completed(c) => &c.user_data,
        }
    }
}

/// Handle to the context that issued a request.
///
/// All events for an operation are posted here; the caller drains the
/// paired receiver on whatever thread or task it likes.
#[derive(Debug, Clone)]
pub struct OperationContext {
    tx: mpsc::UnboundedSender<OperationEvent>,
}

impl OperationContext {
    pub fn new(tx: mpsc::UnboundedSender<OperationEvent>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OperationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// Posts an event. Returns false if the receiver has gone away.
    pub(crate) fn post(&self, event: OperationEvent) -> bool {
        match self.tx.send(event) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(
                    user_data = %e.0.user_data(),
                    "Event receiver dropped, discarding event"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_id_equality_by_value() {
        let a = OperationId::from("op1");
        let b = OperationId::from(String::from("op1"));
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "op1");
    }

    #[test]
    fn test_verb_override_set() {
        assert!(!HttpVerb::Get.needs_override());
        assert!(!HttpVerb::Post.needs_override());
        assert!(HttpVerb::Put.needs_override());
        assert!(HttpVerb::Delete.needs_override());
        assert_eq!(HttpVerb::Patch.to_string(), "PATCH");
    }

    #[test]
    fn test_request_builder_defaults() {
        let uri = Url::parse("https://example.com/feeds").unwrap();
        let req = AsyncRequest::get(uri, "a");
        assert_eq!(req.verb, HttpVerb::Get);
        assert_eq!(req.mode, ResponseMode::Raw);
        assert!(req.report_progress);
        assert!(req.body.is_none());

        let req = req.parse_feed().without_progress();
        assert_eq!(req.mode, ResponseMode::Feed);
        assert!(!req.report_progress);
    }

    #[test]
    fn test_outcome_from_cancelled_error() {
        let outcome = CompletionOutcome::from(Err(OperationError::Cancelled));
        assert!(matches!(outcome, CompletionOutcome::Cancelled));
    }

    #[test]
    fn test_post_after_receiver_dropped() {
        let (ctx, rx) = OperationContext::channel();
        drop(rx);
        let delivered = ctx.post(OperationEvent::Completed(CompletedEvent {
            user_data: "gone".into(),
            outcome: CompletionOutcome::Cancelled,
        }));
        assert!(!delivered);
    }
}
