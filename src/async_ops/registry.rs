use crate::async_ops::error::RegistryError;
use crate::async_ops::types::{
    CompletedEvent, CompletionOutcome, OperationContext, OperationEvent, OperationId,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Map of in-flight operations, keyed by correlation token.
///
/// Every check-then-act sequence (check + insert, check + remove, check +
/// post) runs under the one lock, so a cancel racing a completion can never
/// produce two terminal events. Events are posted while the lock is held;
/// posting to an unbounded channel never blocks.
#[derive(Debug, Default)]
pub struct OperationRegistry {
    operations: Mutex<HashMap<OperationId, OperationContext>>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // The map holds no multi-step invariant a panicking holder could break.
    fn lock(&self) -> MutexGuard<'_, HashMap<OperationId, OperationContext>> {
        self.operations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `id`, failing if it is already in flight.
    ///
    /// On failure the existing registration is left untouched.
    pub fn register(
        &self,
        id: OperationId,
        context: OperationContext,
    ) -> Result<(), RegistryError> {
        let mut ops = self.lock();
        if ops.contains_key(&id) {
            return Err(RegistryError::DuplicateIdentifier(id));
        }
        tracing::trace!(user_data = %id, in_flight = ops.len() + 1, "Registered operation");
        ops.insert(id, context);
        Ok(())
    }

    /// Returns the operation's context if it is still registered.
    pub fn lookup(&self, id: &OperationId) -> Option<OperationContext> {
        self.lock().get(id).cloned()
    }

    /// True while the operation has neither completed nor been cancelled.
    pub fn is_active(&self, id: &OperationId) -> bool {
        self.lock().contains_key(id)
    }

    /// Removes `id` if present. Removing an absent id is a no-op.
    pub fn remove(&self, id: &OperationId) -> Option<OperationContext> {
        self.lock().remove(id)
    }

    /// Removes `id` and posts a cancelled completion to its context.
    ///
    /// Returns false, and posts nothing, if the operation already finished.
    pub fn cancel(&self, id: &OperationId) -> bool {
        let event = OperationEvent::Completed(CompletedEvent {
            user_data: id.clone(),
            outcome: CompletionOutcome::Cancelled,
        });
        self.remove_and_post(id, event)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Posts `event` only if `id` is registered. The id stays registered.
    pub(crate) fn post_if_active(&self, id: &OperationId, event: OperationEvent) -> bool {
        let ops = self.lock();
        match ops.get(id) {
            Some(context) => {
                context.post(event);
                true
            }
            None => false,
        }
    }

    /// Removes `id` and, if it was present, posts `event` before releasing the lock.
    pub(crate) fn remove_and_post(&self, id: &OperationId, event: OperationEvent) -> bool {
        let mut ops = self.lock();
        match ops.remove(id) {
            Some(context) => {
                context.post(event);
                true
            }
            None => false,
        }
    }
}

/// Cheap, cloneable "has this operation been cancelled?" check.
///
/// An operation counts as cancelled once its id has left the registry,
/// whether through [`OperationRegistry::cancel`] or a completion.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    registry: Arc<OperationRegistry>,
    user_data: OperationId,
}

impl CancellationToken {
    pub fn new(registry: Arc<OperationRegistry>, user_data: OperationId) -> Self {
        Self {
            registry,
            user_data,
        }
    }

    pub fn user_data(&self) -> &OperationId {
        &self.user_data
    }

    pub fn is_cancelled(&self) -> bool {
        !self.registry.is_active(&self.user_data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let registry = OperationRegistry::new();
        let (ctx, _rx) = OperationContext::channel();
        registry.register("op1".into(), ctx).unwrap();

        assert!(registry.is_active(&"op1".into()));
        assert!(registry.lookup(&"op1".into()).is_some());
        assert!(registry.lookup(&"op2".into()).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_register_keeps_original() {
        let registry = OperationRegistry::new();
        let (first, mut first_rx) = OperationContext::channel();
        let (second, mut second_rx) = OperationContext::channel();

        registry.register("dup".into(), first).unwrap();
        let err = registry.register("dup".into(), second).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateIdentifier(ref id) if id.as_str() == "dup"));

        // The surviving registration still routes to the first context
        assert!(registry.cancel(&"dup".into()));
        assert!(first_rx.try_recv().is_ok());
        assert!(second_rx.try_recv().is_err());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let registry = OperationRegistry::new();
        let (ctx, _rx) = OperationContext::channel();
        registry.register("op".into(), ctx).unwrap();

        assert!(registry.remove(&"op".into()).is_some());
        assert!(registry.remove(&"op".into()).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_cancel_posts_once() {
        let registry = OperationRegistry::new();
        let (ctx, mut rx) = OperationContext::channel();
        registry.register("op".into(), ctx).unwrap();

        assert!(registry.cancel(&"op".into()));
        assert!(!registry.cancel(&"op".into()));

        match rx.try_recv().unwrap() {
            OperationEvent::Completed(done) => assert!(done.cancelled()),
            other => panic!("Expected completion, got {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_cancel_unknown_is_noop() {
        let registry = OperationRegistry::new();
        assert!(!registry.cancel(&"never".into()));
    }

    #[test]
    fn test_id_reusable_after_removal() {
        let registry = OperationRegistry::new();
        let (ctx, _rx) = OperationContext::channel();
        registry.register("op".into(), ctx.clone()).unwrap();
        registry.remove(&"op".into());
        assert!(registry.register("op".into(), ctx).is_ok());
    }

    #[test]
    fn test_token_tracks_membership() {
        let registry = Arc::new(OperationRegistry::new());
        let (ctx, _rx) = OperationContext::channel();
        registry.register("op".into(), ctx).unwrap();

        let token = CancellationToken::new(registry.clone(), "op".into());
        assert!(!token.is_cancelled());
        registry.cancel(&"op".into());
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_concurrent_register_single_winner() {
        let registry = Arc::new(OperationRegistry::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    let (ctx, _rx) = OperationContext::channel();
                    registry.register("contended".into(), ctx).is_ok()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
