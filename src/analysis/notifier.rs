//! Fan-out of result-store changes to connected protocol clients.

use tokio::sync::broadcast;
use tracing::debug;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceEvent {
    /// A new analysis result was stored.
    Created { analysis_id: String },
}

/// Best-effort broadcaster. Nothing the orchestrator does waits on delivery.
#[derive(Debug, Clone)]
pub struct ResourceNotifier {
    event_tx: broadcast::Sender<ResourceEvent>,
}

impl ResourceNotifier {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { event_tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ResourceEvent> {
        self.event_tx.subscribe()
    }

    pub fn notify(&self, event: ResourceEvent) {
        if let Err(e) = self.event_tx.send(event) {
            debug!("Dropped resource notification, no subscribers: {:?}", e.0);
        }
    }
}

impl Default for ResourceNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notify_without_subscribers_is_harmless() {
        ResourceNotifier::new().notify(ResourceEvent::Created {
            analysis_id: "slither_0".into(),
        });
    }

    #[tokio::test]
    async fn subscribers_receive_events() {
        let notifier = ResourceNotifier::new();
        let mut rx = notifier.subscribe();
        notifier.notify(ResourceEvent::Created {
            analysis_id: "mythril_3".into(),
        });
        assert_eq!(
            rx.recv().await.unwrap(),
            ResourceEvent::Created {
                analysis_id: "mythril_3".into()
            }
        );
    }
}
