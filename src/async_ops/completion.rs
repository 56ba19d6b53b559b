use crate::async_ops::registry::OperationRegistry;
use crate::async_ops::types::{CompletedEvent, CompletionOutcome, OperationEvent, OperationId};
use std::sync::Arc;

/// Delivers the one terminal event of each operation.
///
/// Whichever of [`complete`](Self::complete) and [`cancel`](Self::cancel)
/// removes the id from the registry first wins; the loser is suppressed.
#[derive(Debug, Clone)]
pub struct CompletionDispatcher {
    registry: Arc<OperationRegistry>,
}

impl CompletionDispatcher {
    pub fn new(registry: Arc<OperationRegistry>) -> Self {
        Self { registry }
    }

    /// Removes the operation and posts its outcome.
    ///
    /// Returns false if the operation was already removed, in which case
    /// nothing is posted.
    pub fn complete(&self, user_data: &OperationId, outcome: CompletionOutcome) -> bool {
        let kind = outcome_kind(&outcome);
        let event = OperationEvent::Completed(CompletedEvent {
            user_data: user_data.clone(),
            outcome,
        });
        let delivered = self.registry.remove_and_post(user_data, event);
        if delivered {
            tracing::debug!(user_data = %user_data, outcome = kind, "Operation completed");
        } else {
            tracing::debug!(
                user_data = %user_data,
                outcome = kind,
                "Suppressing completion for operation already removed"
            );
        }
        delivered
    }

    /// User-initiated cancellation.
    ///
    /// Posts a cancelled completion if the operation was in flight; a
    /// cancel after natural completion is silently ignored.
    pub fn cancel(&self, user_data: &OperationId) -> bool {
        let cancelled = self.registry.cancel(user_data);
        if cancelled {
            tracing::info!(user_data = %user_data, "Operation cancelled");
        } else {
            tracing::debug!(user_data = %user_data, "Cancel ignored, operation not in flight");
        }
        cancelled
    }
}

fn outcome_kind(outcome: &CompletionOutcome) -> &'static str {
    match outcome {
        CompletionOutcome::Succeeded(_) => "succeeded",
        CompletionOutcome::Failed(_) => "failed",
        CompletionOutcome::Cancelled => "cancelled",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::async_ops::types::{OperationContext, Payload};
    use crate::async_ops::OperationError;

    fn setup(id: &str) -> (
        Arc<OperationRegistry>,
        CompletionDispatcher,
        tokio::sync::mpsc::UnboundedReceiver<OperationEvent>,
    ) {
        let registry = Arc::new(OperationRegistry::new());
        let (ctx, rx) = OperationContext::channel();
        registry.register(id.into(), ctx).unwrap();
        let dispatcher = CompletionDispatcher::new(registry.clone());
        (registry, dispatcher, rx)
    }

    #[test]
    fn test_complete_delivers_once() {
        let (registry, dispatcher, mut rx) = setup("op");

        assert!(dispatcher.complete(&"op".into(), CompletionOutcome::Succeeded(Payload::Empty)));
        assert!(!dispatcher.complete(&"op".into(), CompletionOutcome::Succeeded(Payload::Empty)));
        assert!(!registry.is_active(&"op".into()));

        assert!(matches!(rx.try_recv().unwrap(), OperationEvent::Completed(ref c) if !c.cancelled()));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_cancel_then_complete_suppressed() {
        let (_registry, dispatcher, mut rx) = setup("op");

        assert!(dispatcher.cancel(&"op".into()));
        assert!(!dispatcher.complete(
            &"op".into(),
            CompletionOutcome::Failed(OperationError::Panicked("late".into()))
        ));

        match rx.try_recv().unwrap() {
            OperationEvent::Completed(c) => {
                assert!(c.cancelled());
                assert!(c.error().is_none());
            }
            other => panic!("Expected completion, got {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_complete_then_cancel_ignored() {
        let (_registry, dispatcher, mut rx) = setup("op");

        assert!(dispatcher.complete(&"op".into(), CompletionOutcome::Succeeded(Payload::Empty)));
        assert!(!dispatcher.cancel(&"op".into()));

        assert!(matches!(rx.try_recv().unwrap(), OperationEvent::Completed(ref c) if !c.cancelled()));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_failure_carries_error() {
        let (_registry, dispatcher, mut rx) = setup("op");
        dispatcher.complete(
            &"op".into(),
            CompletionOutcome::Failed(OperationError::Panicked("boom".into())),
        );

        match rx.try_recv().unwrap() {
            OperationEvent::Completed(c) => {
                assert!(!c.cancelled());
                assert!(c.error().unwrap().to_string().contains("boom"));
            }
            other => panic!("Expected completion, got {:?}", other),
        }
    }

    #[test]
    fn test_racing_cancel_and_complete_single_event() {
        for round in 0..50 {
            let id = format!("race-{round}");
            let (_registry, dispatcher, mut rx) = setup(&id);

            let canceller = {
                let dispatcher = dispatcher.clone();
                let id = OperationId::from(id.clone());
                std::thread::spawn(move || dispatcher.cancel(&id))
            };
            let completer = {
                let dispatcher = dispatcher.clone();
                let id = OperationId::from(id.clone());
                std::thread::spawn(move || {
                    dispatcher.complete(&id, CompletionOutcome::Succeeded(Payload::Empty))
                })
            };

            let cancelled = canceller.join().unwrap();
            let completed = completer.join().unwrap();
            assert!(cancelled ^ completed, "exactly one side must win");

            assert!(matches!(rx.try_recv().unwrap(), OperationEvent::Completed(_)));
            assert!(rx.try_recv().is_err());
        }
    }
}
