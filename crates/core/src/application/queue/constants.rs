// Queue constants (no magic values)
use std::time::Duration;

/// Concurrent adapter calls across all portals
pub const DEFAULT_GLOBAL_CONCURRENCY: usize = 4;

/// Concurrent adapter calls per portal
pub const DEFAULT_PER_PORTAL_CONCURRENCY: usize = 1;

/// Upper bound for a single adapter attempt (30s)
pub const DEFAULT_ADAPTER_TIMEOUT: Duration = Duration::from_secs(30);

/// Dispatcher wakes at least this often to pick up due retries (250ms)
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// First retry delay (2s)
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 2_000;

/// Retry delay cap (60s)
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 60_000;

/// +/-10% on every retry delay
pub const DEFAULT_RETRY_JITTER: f64 = 0.1;

/// Buffered status events per subscriber before it is dropped as lagging
pub const DEFAULT_STATUS_BUFFER: usize = 1_024;
