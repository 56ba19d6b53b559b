use crate::async_ops::completion::CompletionDispatcher;
use crate::async_ops::copy::copy_response_to_memory;
use crate::async_ops::error::{OperationError, SubmitError};
use crate::async_ops::progress::{ProgressReporter, ProgressTarget};
use crate::async_ops::registry::OperationRegistry;
use crate::async_ops::types::{
    AsyncRequest, CompletionOutcome, OperationContext, OperationId, Payload, ResponseMode,
};
use crate::atom;
use crate::transport::Transport;
use crate::util::validate_target_url;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Submit/cancel surface over the operation registry.
///
/// Each submitted request runs on its own worker thread: the transport
/// call, the chunked body copy and the optional parse all block there.
/// Progress and the single completion event are posted to the
/// [`OperationContext`] given at submit time.
///
/// # Example
///
/// ```ignore
/// let (context, mut events) = OperationContext::channel();
/// let id = handler.submit(AsyncRequest::get(uri, "op1"), context)?;
/// handler.cancel(&id); // completion arrives later with cancelled() == true
/// ```
pub struct AsyncDataHandler {
    registry: Arc<OperationRegistry>,
    reporter: ProgressReporter,
    dispatcher: CompletionDispatcher,
    transport: Arc<dyn Transport>,
}

impl AsyncDataHandler {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_registry(transport, Arc::new(OperationRegistry::new()))
    }

    /// Builds a handler over an existing registry, e.g. one shared with
    /// another handler so correlation tokens are unique across both.
    pub fn with_registry(transport: Arc<dyn Transport>, registry: Arc<OperationRegistry>) -> Self {
        Self {
            reporter: ProgressReporter::new(registry.clone()),
            dispatcher: CompletionDispatcher::new(registry.clone()),
            registry,
            transport,
        }
    }

    pub fn registry(&self) -> &Arc<OperationRegistry> {
        &self.registry
    }

    /// Registers `request` and starts it on a worker thread.
    ///
    /// # Errors
    ///
    /// - [`SubmitError::DuplicateIdentifier`] if `request.user_data` is already
    ///   in flight; the existing operation is not affected
    /// - [`SubmitError::InvalidUri`] if the target is not an acceptable http(s) URI
    /// - [`SubmitError::Spawn`] if the worker thread could not be started
    ///
    /// No error leaves the operation registered.
    pub fn submit(
        &self,
        request: AsyncRequest,
        context: OperationContext,
    ) -> Result<OperationId, SubmitError> {
        validate_target_url(request.uri.as_str())?;

        let user_data = request.user_data.clone();
        self.registry.register(user_data.clone(), context)?;

        let worker = Worker {
            transport: Arc::clone(&self.transport),
            reporter: self.reporter.clone(),
            dispatcher: self.dispatcher.clone(),
        };
        let verb = request.verb;
        let uri = request.uri.to_string();

        let spawned = std::thread::Builder::new()
            .name("gdata-worker".to_string())
            .spawn(move || worker.run(request));

        if let Err(e) = spawned {
            self.registry.remove(&user_data);
            tracing::error!(user_data = %user_data, error = %e, "Failed to spawn worker thread");
            return Err(SubmitError::Spawn(e));
        }

        tracing::debug!(user_data = %user_data, verb = %verb, uri = %uri, "Submitted operation");
        Ok(user_data)
    }

    /// Requests cancellation and returns immediately.
    ///
    /// If the operation is in flight, a completion with `cancelled() == true`
    /// is posted to its context; the worker notices at its next chunk
    /// boundary and stops. Returns false if the operation already finished.
    pub fn cancel(&self, user_data: &OperationId) -> bool {
        self.dispatcher.cancel(user_data)
    }

    pub fn is_active(&self, user_data: &OperationId) -> bool {
        self.registry.is_active(user_data)
    }

    pub fn in_flight(&self) -> usize {
        self.registry.len()
    }
}

struct Worker {
    transport: Arc<dyn Transport>,
    reporter: ProgressReporter,
    dispatcher: CompletionDispatcher,
}

impl Worker {
    fn run(self, request: AsyncRequest) {
        let user_data = request.user_data.clone();

        // Nothing observes an error or panic escaping this thread, so both
        // become the completion's error payload.
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.execute(&request)))
            .unwrap_or_else(|panic| Err(OperationError::Panicked(panic_message(panic.as_ref()))));

        let outcome = CompletionOutcome::from(result);
        if let CompletionOutcome::Failed(ref e) = outcome {
            tracing::warn!(user_data = %user_data, uri = %request.uri, error = %e, "Operation failed");
        }
        self.dispatcher.complete(&user_data, outcome);
    }

    fn execute(&self, request: &AsyncRequest) -> Result<Payload, OperationError> {
        let cancel = self.reporter.cancellation_token(request.user_data.clone());

        // Cancelled before the worker got going: skip the network entirely.
        if cancel.is_cancelled() {
            return Err(OperationError::Cancelled);
        }

        let target = request.report_progress.then(|| {
            ProgressTarget::new(
                self.reporter.clone(),
                request.uri.clone(),
                request.verb,
                request.user_data.clone(),
            )
        });

        let response = self.transport.execute(request, &cancel)?;
        tracing::trace!(
            user_data = %request.user_data,
            content_length = ?response.content_length,
            "Response received, copying body"
        );

        let Some(buffer) =
            copy_response_to_memory(response.body, response.content_length, target.as_ref(), &cancel)?
        else {
            return Ok(Payload::Empty);
        };

        match request.mode {
            ResponseMode::Raw => Ok(Payload::Stream(buffer)),
            ResponseMode::Feed => Ok(Payload::Feed(atom::parse_feed(buffer.get_ref())?)),
            ResponseMode::Entry => Ok(Payload::Entry(atom::parse_entry(buffer.get_ref())?)),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}
