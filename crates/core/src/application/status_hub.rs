//! In-process fan-out of job status events.
//!
//! The queue publishes one [`StatusEvent`] per persisted transition. Every
//! subscriber sees the global stream filtered down to the properties it
//! watches, so per-job ordering is exactly the publish order.

use crate::application::queue::constants::DEFAULT_STATUS_BUFFER;
use crate::domain::{PropertyId, StatusEvent};
use std::collections::HashSet;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::warn;

/// Why a subscription stopped yielding events
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionClosed {
    /// Subscriber fell behind by this many events; it must resubscribe and
    /// reconcile instead of continuing with a gap
    #[error("subscriber lagged behind by {0} events")]
    Lagged(u64),

    #[error("status hub closed")]
    HubClosed,
}

/// Cloneable publisher handle
#[derive(Clone)]
pub struct StatusHub {
    tx: broadcast::Sender<StatusEvent>,
}

impl StatusHub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_STATUS_BUFFER)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Fan out an event. No-op without subscribers.
    pub fn publish(&self, event: StatusEvent) {
        // Err only means nobody is listening
        let _ = self.tx.send(event);
    }

    /// Subscribe to events of the given properties
    pub fn subscribe<I, S>(&self, property_ids: I) -> StatusSubscription
    where
        I: IntoIterator<Item = S>,
        S: Into<PropertyId>,
    {
        StatusSubscription {
            rx: self.tx.subscribe(),
            interest: property_ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for StatusHub {
    fn default() -> Self {
        Self::new()
    }
}

/// One subscriber's view of the stream
pub struct StatusSubscription {
    rx: broadcast::Receiver<StatusEvent>,
    interest: HashSet<PropertyId>,
}

impl StatusSubscription {
    /// Start receiving events for another property
    pub fn watch(&mut self, property_id: impl Into<PropertyId>) {
        self.interest.insert(property_id.into());
    }

    /// Stop receiving events for a property. Returns `true` if nothing is
    /// watched any more.
    pub fn unwatch(&mut self, property_id: &str) -> bool {
        self.interest.remove(property_id);
        self.interest.is_empty()
    }

    pub fn is_watching(&self, property_id: &str) -> bool {
        self.interest.contains(property_id)
    }

    pub fn interest(&self) -> impl Iterator<Item = &PropertyId> {
        self.interest.iter()
    }

    /// Next event for a watched property.
    ///
    /// A lagging subscriber is closed rather than silently skipping events.
    pub async fn next(&mut self) -> Result<StatusEvent, SubscriptionClosed> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.interest.contains(event.property_id()) => return Ok(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped = skipped, "Status subscriber lagged, closing");
                    return Err(SubscriptionClosed::Lagged(skipped));
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(SubscriptionClosed::HubClosed)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{JobState, Portal, PublicationAction, PublicationJob, StatusEventKind};

    fn event(job_id: &str, property_id: &str) -> StatusEvent {
        StatusEvent::from_job(&PublicationJob::new(
            job_id,
            0,
            property_id,
            Portal::Idealista,
            PublicationAction::Publish,
        ))
    }

    #[tokio::test]
    async fn test_only_watched_properties_are_delivered() {
        let hub = StatusHub::new();
        let mut sub = hub.subscribe(["p1"]);

        hub.publish(event("j1", "p2"));
        hub.publish(event("j2", "p1"));

        let received = sub.next().await.unwrap();
        assert_eq!(received.data.job_id, "j2");
        assert_eq!(received.kind, StatusEventKind::PublicationUpdate);
        assert_eq!(received.data.status, JobState::Queued);
    }

    #[tokio::test]
    async fn test_watch_and_unwatch() {
        let hub = StatusHub::new();
        let mut sub = hub.subscribe(Vec::<String>::new());
        sub.watch("p3");
        assert!(sub.is_watching("p3"));

        hub.publish(event("j1", "p3"));
        assert_eq!(sub.next().await.unwrap().data.job_id, "j1");

        assert!(sub.unwatch("p3"));
    }

    #[tokio::test]
    async fn test_lagging_subscriber_is_closed() {
        let hub = StatusHub::with_capacity(2);
        let mut sub = hub.subscribe(["p1"]);
        for i in 0..5 {
            hub.publish(event(&format!("j{}", i), "p1"));
        }
        assert!(matches!(sub.next().await, Err(SubscriptionClosed::Lagged(_))));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_noop() {
        let hub = StatusHub::new();
        hub.publish(event("j1", "p1"));
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_hub_closed_when_publisher_dropped() {
        let hub = StatusHub::new();
        let mut sub = hub.subscribe(["p1"]);
        drop(hub);
        assert_eq!(sub.next().await, Err(SubscriptionClosed::HubClosed));
    }
}
