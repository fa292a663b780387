// Portal Adapter Port
// Abstraction over the code that talks to each portal's website/API

use crate::domain::{ErrorKind, Portal, PortalSettings, Property, PublicationAction};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Successful adapter call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    /// Listing URL the action applied to
    pub url: String,
}

/// Adapter failures. Anything the adapter cannot classify is `Unclassified`
/// and is treated as permanent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    #[error("Retryable portal error: {0}")]
    Retryable(String),

    #[error("Permanent portal error: {0}")]
    Permanent(String),

    #[error("Portal call timed out: {0}")]
    Timeout(String),

    #[error("Unclassified portal error: {0}")]
    Unclassified(String),
}

impl AdapterError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AdapterError::Retryable(_) => ErrorKind::Retryable,
            AdapterError::Timeout(_) => ErrorKind::Timeout,
            AdapterError::Permanent(_) | AdapterError::Unclassified(_) => ErrorKind::Permanent,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AdapterError::Retryable(m)
            | AdapterError::Permanent(m)
            | AdapterError::Timeout(m)
            | AdapterError::Unclassified(m) => m,
        }
    }
}

/// Handle adapters use to emit intermediate progress (0-100)
#[derive(Clone, Debug)]
pub struct ProgressReporter {
    tx: Option<mpsc::UnboundedSender<i64>>,
}

impl ProgressReporter {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<i64>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Reporter that drops every value
    pub fn noop() -> Self {
        Self { tx: None }
    }

    pub fn report(&self, value: i64) {
        if let Some(tx) = &self.tx {
            // Receiver gone means the attempt already finished
            let _ = tx.send(value);
        }
    }
}

/// One implementation per portal.
///
/// The caller enforces the per-attempt timeout; adapters may still return
/// `AdapterError::Timeout` for timeouts they detect themselves.
#[async_trait]
pub trait PortalAdapter: Send + Sync {
    fn portal(&self) -> Portal;

    async fn publish(
        &self,
        property: &Property,
        settings: &PortalSettings,
        progress: ProgressReporter,
    ) -> Result<PublishReceipt, AdapterError>;

    async fn update(
        &self,
        property: &Property,
        settings: &PortalSettings,
        progress: ProgressReporter,
    ) -> Result<PublishReceipt, AdapterError>;

    async fn unpublish(
        &self,
        property: &Property,
        settings: &PortalSettings,
        progress: ProgressReporter,
    ) -> Result<PublishReceipt, AdapterError>;

    /// Route a job action to the matching call
    async fn execute(
        &self,
        action: PublicationAction,
        property: &Property,
        settings: &PortalSettings,
        progress: ProgressReporter,
    ) -> Result<PublishReceipt, AdapterError> {
        match action {
            PublicationAction::Publish => self.publish(property, settings, progress).await,
            PublicationAction::Update => self.update(property, settings, progress).await,
            PublicationAction::Unpublish => self.unpublish(property, settings, progress).await,
        }
    }
}

#[derive(Clone)]
struct RegisteredPortal {
    adapter: Arc<dyn PortalAdapter>,
    settings: PortalSettings,
}

/// Enabled portals with their adapters and account settings
#[derive(Clone, Default)]
pub struct PortalRegistry {
    portals: HashMap<Portal, RegisteredPortal>,
}

impl PortalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn PortalAdapter>, settings: PortalSettings) {
        let portal = adapter.portal();
        self.portals
            .insert(portal, RegisteredPortal { adapter, settings });
    }

    pub fn with(mut self, adapter: Arc<dyn PortalAdapter>, settings: PortalSettings) -> Self {
        self.register(adapter, settings);
        self
    }

    pub fn contains(&self, portal: Portal) -> bool {
        self.portals.contains_key(&portal)
    }

    pub fn get(&self, portal: Portal) -> Option<(Arc<dyn PortalAdapter>, PortalSettings)> {
        self.portals
            .get(&portal)
            .map(|r| (Arc::clone(&r.adapter), r.settings.clone()))
    }

    pub fn portals(&self) -> Vec<Portal> {
        let mut portals: Vec<_> = self.portals.keys().copied().collect();
        portals.sort();
        portals
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Scripted behavior for one adapter call
    #[derive(Debug, Clone)]
    pub enum MockOutcome {
        /// Succeed with a generated URL
        Success,
        /// Report these progress values, then succeed
        Progress(Vec<i64>),
        /// Fail with this error
        Fail(AdapterError),
        /// Never return (exercises the caller's timeout)
        Hang,
        /// Panic inside the adapter
        Panic(String),
    }

    /// Tracks how many calls run at the same time, optionally shared by
    /// several adapters.
    #[derive(Debug, Default)]
    pub struct ConcurrencyTracker {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ConcurrencyTracker {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn peak(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }

        fn enter(&self) {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
        }

        fn exit(&self) {
            self.current.fetch_sub(1, Ordering::SeqCst);
        }
    }

    struct InFlight<'a>(&'a [Arc<ConcurrencyTracker>]);

    impl<'a> InFlight<'a> {
        fn enter(trackers: &'a [Arc<ConcurrencyTracker>]) -> Self {
            trackers.iter().for_each(|t| t.enter());
            Self(trackers)
        }
    }

    impl Drop for InFlight<'_> {
        fn drop(&mut self) {
            self.0.iter().for_each(|t| t.exit());
        }
    }

    /// Adapter returning scripted outcomes in order; `Success` once the
    /// script runs out.
    pub struct ScriptedPortalAdapter {
        portal: Portal,
        script: Mutex<VecDeque<MockOutcome>>,
        latency: Duration,
        calls: AtomicUsize,
        trackers: Vec<Arc<ConcurrencyTracker>>,
    }

    impl ScriptedPortalAdapter {
        pub fn new(portal: Portal) -> Self {
            Self {
                portal,
                script: Mutex::new(VecDeque::new()),
                latency: Duration::ZERO,
                calls: AtomicUsize::new(0),
                trackers: vec![ConcurrencyTracker::new()],
            }
        }

        pub fn with_script(self, outcomes: impl IntoIterator<Item = MockOutcome>) -> Self {
            self.script.lock().unwrap().extend(outcomes);
            self
        }

        /// Simulated round-trip time of every call
        pub fn with_latency(mut self, latency: Duration) -> Self {
            self.latency = latency;
            self
        }

        /// Also count calls on a tracker shared with other adapters
        pub fn with_tracker(mut self, tracker: Arc<ConcurrencyTracker>) -> Self {
            self.trackers.push(tracker);
            self
        }

        pub fn push(&self, outcome: MockOutcome) {
            self.script.lock().unwrap().push_back(outcome);
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        /// Highest number of overlapping calls on this adapter
        pub fn peak_concurrency(&self) -> usize {
            self.trackers[0].peak()
        }

        async fn run(
            &self,
            property: &Property,
            progress: ProgressReporter,
        ) -> Result<PublishReceipt, AdapterError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let _in_flight = InFlight::enter(&self.trackers);

            let outcome = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(MockOutcome::Success);

            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }

            let receipt = PublishReceipt {
                url: format!("https://{}.example/listings/{}", self.portal, property.id),
            };

            match outcome {
                MockOutcome::Success => Ok(receipt),
                MockOutcome::Progress(values) => {
                    for value in values {
                        progress.report(value);
                        tokio::task::yield_now().await;
                    }
                    Ok(receipt)
                }
                MockOutcome::Fail(err) => Err(err),
                MockOutcome::Hang => {
                    std::future::pending::<()>().await;
                    Ok(receipt)
                }
                MockOutcome::Panic(msg) => panic!("{}", msg),
            }
        }
    }

    #[async_trait]
    impl PortalAdapter for ScriptedPortalAdapter {
        fn portal(&self) -> Portal {
            self.portal
        }

        async fn publish(
            &self,
            property: &Property,
            _settings: &PortalSettings,
            progress: ProgressReporter,
        ) -> Result<PublishReceipt, AdapterError> {
            self.run(property, progress).await
        }

        async fn update(
            &self,
            property: &Property,
            _settings: &PortalSettings,
            progress: ProgressReporter,
        ) -> Result<PublishReceipt, AdapterError> {
            self.run(property, progress).await
        }

        async fn unpublish(
            &self,
            property: &Property,
            _settings: &PortalSettings,
            progress: ProgressReporter,
        ) -> Result<PublishReceipt, AdapterError> {
            self.run(property, progress).await
        }
    }
}
