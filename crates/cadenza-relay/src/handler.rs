//! Event handler trait and subscription registry.

use async_trait::async_trait;
use cadenza_core::{EventEnvelope, EventKind, HandlerError};
use std::collections::HashMap;
use std::sync::Arc;

/// A message consumer. Handlers run concurrently with handlers for other
/// events and must tolerate duplicate and out-of-order delivery.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Stable name for logging.
    fn name(&self) -> &'static str;

    /// Event kinds this handler consumes.
    fn subscriptions(&self) -> &'static [EventKind];

    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), HandlerError>;
}

/// Routing table from event kind to subscribed handlers, fixed at startup.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<EventKind, Vec<Arc<dyn EventHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, handler: Arc<dyn EventHandler>) {
        for kind in handler.subscriptions() {
            self.handlers.entry(*kind).or_default().push(handler.clone());
        }
    }

    pub fn handlers_for(&self, kind: EventKind) -> &[Arc<dyn EventHandler>] {
        self.handlers.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadenza_core::EventPayload;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EventHandler for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn subscriptions(&self) -> &'static [EventKind] {
            &[EventKind::MediaProcessed, EventKind::SongDeleted]
        }

        async fn handle(&self, _envelope: &EventEnvelope) -> Result<(), HandlerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn registry_routes_by_kind() {
        let handler = Arc::new(Counting {
            calls: AtomicUsize::new(0),
        });
        let mut registry = HandlerRegistry::new();
        registry.subscribe(handler.clone());

        assert_eq!(registry.handlers_for(EventKind::MediaProcessed).len(), 1);
        assert_eq!(registry.handlers_for(EventKind::SongDeleted).len(), 1);
        assert!(registry.handlers_for(EventKind::MediaUploaded).is_empty());

        let envelope = EventEnvelope::new(EventPayload::SongDeleted {
            song_id: uuid::Uuid::new_v4(),
        });
        for h in registry.handlers_for(envelope.kind()) {
            h.handle(&envelope).await.unwrap();
        }
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }
}
