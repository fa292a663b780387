// Application Layer - Use cases on top of the domain and ports

pub mod bulk;
pub mod queue;
pub mod recovery;
pub mod retry;
pub mod status_hub;

// Re-exports
pub use bulk::{BulkOperationCoordinator, BulkStatus};
pub use queue::{
    shutdown_channel, EnqueueOptions, PublicationQueue, QueueConfig, ShutdownSender,
    ShutdownToken,
};
pub use recovery::RecoveryService;
pub use retry::{exponential_backoff, RetryDecision, RetryPolicy};
pub use status_hub::{StatusHub, StatusSubscription, SubscriptionClosed};
