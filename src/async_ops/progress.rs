use crate::async_ops::registry::{CancellationToken, OperationRegistry};
use crate::async_ops::types::{HttpVerb, OperationEvent, OperationId, ProgressEvent};
use std::sync::Arc;
use url::Url;

/// Delivers progress events, but only for operations still registered.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    registry: Arc<OperationRegistry>,
}

impl ProgressReporter {
    pub fn new(registry: Arc<OperationRegistry>) -> Self {
        Self { registry }
    }

    /// Posts `event` to its operation's context.
    ///
    /// Returns false when the operation is no longer registered (cancelled
    /// or already completed); the event is dropped, and the caller should
    /// stop transferring.
    pub fn report(&self, event: ProgressEvent) -> bool {
        let user_data = event.user_data.clone();
        let position = event.position;
        let delivered = self
            .registry
            .post_if_active(&user_data, OperationEvent::Progress(event));
        if !delivered {
            tracing::debug!(
                user_data = %user_data,
                position = position,
                "Dropping progress for inactive operation"
            );
        }
        delivered
    }

    pub fn is_active(&self, user_data: &OperationId) -> bool {
        self.registry.is_active(user_data)
    }

    pub fn cancellation_token(&self, user_data: OperationId) -> CancellationToken {
        CancellationToken::new(self.registry.clone(), user_data)
    }
}

/// A reporter bound to one operation's URI, verb and token.
#[derive(Debug, Clone)]
pub struct ProgressTarget {
    reporter: ProgressReporter,
    uri: Url,
    verb: HttpVerb,
    user_data: OperationId,
}

impl ProgressTarget {
    pub fn new(reporter: ProgressReporter, uri: Url, verb: HttpVerb, user_data: OperationId) -> Self {
        Self {
            reporter,
            uri,
            verb,
            user_data,
        }
    }

    pub fn user_data(&self) -> &OperationId {
        &self.user_data
    }

    pub fn is_cancelled(&self) -> bool {
        !self.reporter.is_active(&self.user_data)
    }

    /// Reports `position` out of `complete_size`. False means cancelled.
    pub fn report(&self, position: u64, complete_size: Option<u64>, percent: u32) -> bool {
        self.reporter.report(ProgressEvent {
            complete_size,
            position,
            percent,
            uri: self.uri.clone(),
            verb: self.verb,
            user_data: self.user_data.clone(),
        })
    }
}

/// Whole-number percentage of `total` transferred.
///
/// Only computed when the total is known and larger than one chunk;
/// smaller or unknown totals report 0.
pub fn percent_complete(transferred: u64, total: Option<u64>, chunk_size: usize) -> u32 {
    match total {
        Some(total) if total > chunk_size as u64 => {
            let percent = transferred as f64 * 100.0 / total as f64;
            percent.min(100.0) as u32
        }
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::async_ops::types::OperationContext;

    fn target(registry: &Arc<OperationRegistry>, id: &str) -> ProgressTarget {
        ProgressTarget::new(
            ProgressReporter::new(registry.clone()),
            Url::parse("https://example.com/feed").unwrap(),
            HttpVerb::Get,
            id.into(),
        )
    }

    #[test]
    fn test_percent_truncates() {
        assert_eq!(percent_complete(4096, Some(10_000), 4096), 40);
        assert_eq!(percent_complete(8192, Some(10_000), 4096), 81);
        assert_eq!(percent_complete(10_000, Some(10_000), 4096), 100);
    }

    #[test]
    fn test_percent_zero_for_small_or_unknown_total() {
        assert_eq!(percent_complete(2000, Some(2000), 4096), 0);
        assert_eq!(percent_complete(4096, Some(4096), 4096), 0);
        assert_eq!(percent_complete(8192, None, 4096), 0);
    }

    #[test]
    fn test_percent_capped_when_server_undercounts() {
        assert_eq!(percent_complete(20_000, Some(10_000), 4096), 100);
    }

    #[test]
    fn test_report_delivers_while_registered() {
        let registry = Arc::new(OperationRegistry::new());
        let (ctx, mut rx) = OperationContext::channel();
        registry.register("op".into(), ctx).unwrap();

        assert!(target(&registry, "op").report(4096, Some(10_000), 40));
        match rx.try_recv().unwrap() {
            OperationEvent::Progress(p) => {
                assert_eq!(p.position, 4096);
                assert_eq!(p.percent, 40);
                assert_eq!(p.complete_size, Some(10_000));
                assert_eq!(p.verb, HttpVerb::Get);
                assert_eq!(p.user_data.as_str(), "op");
            }
            other => panic!("Expected progress, got {:?}", other),
        }
    }

    #[test]
    fn test_report_after_cancel_is_dropped() {
        let registry = Arc::new(OperationRegistry::new());
        let (ctx, mut rx) = OperationContext::channel();
        registry.register("op".into(), ctx).unwrap();
        assert!(registry.cancel(&"op".into()));

        let t = target(&registry, "op");
        assert!(t.is_cancelled());
        assert!(!t.report(4096, None, 0));

        // Only the cancellation completion is observed
        assert!(matches!(rx.try_recv().unwrap(), OperationEvent::Completed(_)));
        assert!(rx.try_recv().is_err());
    }
}
