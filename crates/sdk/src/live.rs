//! Live status channel client
//!
//! Keeps one subscription open for the properties the caller is interested
//! in, reconnects with exponential backoff after an abnormal close, and
//! re-fetches current job states after every successful (re)connect. The
//! channel only speeds things up; the reconciliation snapshot is what the
//! caller should treat as authoritative.

use crate::client::{object_params, RealtyClient};
use crate::error::{Result, SdkError};
use crate::types::{Job, StatusEvent};
use async_trait::async_trait;
use futures::StreamExt;
use jsonrpsee::core::client::{Subscription, SubscriptionClientT};
use jsonrpsee::ws_client::{WsClient, WsClientBuilder};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const SUBSCRIBE_METHOD: &str = "publication.subscribe.v1";
pub const UNSUBSCRIBE_METHOD: &str = "publication.unsubscribe.v1";

const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);
const DEFAULT_MAX_RETRIES: u32 = 5;

/// WebSocket close codes the channel distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCode {
    /// 1000: deliberate shutdown, never retried
    Normal,
    /// 1006: connection lost without a close frame
    Abnormal,
}

impl CloseCode {
    pub fn code(&self) -> u16 {
        match self {
            CloseCode::Normal => 1000,
            CloseCode::Abnormal => 1006,
        }
    }
}

/// Reconnect backoff: `delay(attempt) = min(base * 2^attempt, cap)`, at most
/// `max_retries` reconnects in a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_retries: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl ReconnectPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration, max_retries: u32) -> Self {
        Self {
            base_delay,
            max_delay,
            max_retries,
        }
    }

    /// Delay before reconnect number `attempt` (0-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

/// What the channel is doing right now
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelState {
    /// Nothing to watch, no connection held
    Idle,
    Connecting,
    Connected,
    /// Waiting `delay` before reconnect number `attempt`
    Reconnecting { attempt: u32, delay: Duration },
    /// Gave up after the retry budget; only `reconnect()` revives it
    Disconnected,
    /// Closed for good
    Closed { code: CloseCode },
}

/// Updates handed to the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveUpdate {
    Event(StatusEvent),
    /// Current jobs of every watched property, fetched after a (re)connect
    Snapshot(Vec<Job>),
}

/// One item read from an open subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamItem {
    Event(StatusEvent),
    Closed(CloseCode),
}

/// An open status subscription
#[async_trait]
pub trait EventStream: Send {
    async fn next_item(&mut self) -> StreamItem;

    /// Deregister and close with 1000
    async fn close(&mut self);
}

/// How the live client reaches the daemon
#[async_trait]
pub trait StatusTransport: Send + Sync + 'static {
    async fn connect(&self, property_ids: &[String]) -> Result<Box<dyn EventStream>>;

    /// Reconciliation query, outside the live channel
    async fn fetch_current(&self, property_ids: &[String]) -> Result<Vec<Job>>;
}

enum Command {
    Watch(String),
    Unwatch(String),
    Reconnect,
    Close,
}

/// Handle to the background channel task.
///
/// # Example
///
/// ```no_run
/// use realty_sdk::{LiveStatusClient, LiveUpdate, RealtyClient, ReconnectPolicy, WsStatusTransport};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let rpc = RealtyClient::connect("http://127.0.0.1:9630").await?;
/// let transport = Arc::new(WsStatusTransport::new("ws://127.0.0.1:9630", rpc));
/// let (live, mut updates) =
///     LiveStatusClient::spawn(transport, ReconnectPolicy::default(), ["prop-1".to_string()]);
///
/// while let Some(update) = updates.recv().await {
///     match update {
///         LiveUpdate::Snapshot(jobs) => println!("{} jobs", jobs.len()),
///         LiveUpdate::Event(event) => println!("{} -> {}", event.data.job_id, event.data.status),
///     }
/// }
/// live.close().await;
/// # Ok(())
/// # }
/// ```
pub struct LiveStatusClient {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ChannelState>,
    task: JoinHandle<()>,
}

impl LiveStatusClient {
    pub fn spawn<I>(
        transport: Arc<dyn StatusTransport>,
        policy: ReconnectPolicy,
        property_ids: I,
    ) -> (Self, mpsc::UnboundedReceiver<LiveUpdate>)
    where
        I: IntoIterator<Item = String>,
    {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ChannelState::Idle);

        let worker = Worker {
            transport,
            policy,
            interest: property_ids.into_iter().collect(),
            commands: commands_rx,
            state: state_tx,
            updates: updates_tx,
        };
        let task = tokio::spawn(worker.run());

        (
            Self {
                commands: commands_tx,
                state: state_rx,
                task,
            },
            updates_rx,
        )
    }

    /// Start receiving updates for a property
    pub fn watch(&self, property_id: impl Into<String>) {
        let _ = self.commands.send(Command::Watch(property_id.into()));
    }

    /// Stop receiving updates for a property; the connection is closed
    /// cleanly once nothing is watched
    pub fn unwatch(&self, property_id: impl Into<String>) {
        let _ = self.commands.send(Command::Unwatch(property_id.into()));
    }

    /// Retry right away, also after the channel gave up
    pub fn reconnect(&self) {
        let _ = self.commands.send(Command::Reconnect);
    }

    pub fn state(&self) -> ChannelState {
        self.state.borrow().clone()
    }

    pub fn state_changes(&self) -> watch::Receiver<ChannelState> {
        self.state.clone()
    }

    /// Close with 1000 and wait for the background task
    pub async fn close(self) {
        let _ = self.commands.send(Command::Close);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Status channel task ended abnormally");
        }
    }
}

/// How a connected session ended
enum SessionEnd {
    /// `streamed` is set when the session got past reconciliation; the
    /// retry budget counts failed reconnects in a row only
    Lost { streamed: bool },
    ClosedByServer,
    Resubscribe,
    NoInterest,
    Shutdown,
}

struct Worker {
    transport: Arc<dyn StatusTransport>,
    policy: ReconnectPolicy,
    interest: BTreeSet<String>,
    commands: mpsc::UnboundedReceiver<Command>,
    state: watch::Sender<ChannelState>,
    updates: mpsc::UnboundedSender<LiveUpdate>,
}

impl Worker {
    async fn run(mut self) {
        let mut attempt: u32 = 0;

        loop {
            if self.interest.is_empty() {
                self.set_state(ChannelState::Idle);
                if !self.park_until_interest().await {
                    return self.shut_down();
                }
                attempt = 0;
            }

            let end = self.connect_once().await;
            match end {
                SessionEnd::Shutdown => return self.shut_down(),
                SessionEnd::ClosedByServer => {
                    info!("Status channel closed by server");
                    self.set_state(ChannelState::Closed {
                        code: CloseCode::Normal,
                    });
                    return;
                }
                SessionEnd::Resubscribe | SessionEnd::NoInterest => {
                    attempt = 0;
                }
                SessionEnd::Lost { streamed } => {
                    if streamed {
                        attempt = 0;
                    }
                    if !self.policy.should_retry(attempt) {
                        warn!(attempts = attempt, "Status channel gave up reconnecting");
                        self.set_state(ChannelState::Disconnected);
                        if !self.park_disconnected().await {
                            return self.shut_down();
                        }
                        attempt = 0;
                        continue;
                    }

                    let delay = self.policy.delay(attempt);
                    attempt += 1;
                    info!(attempt, delay_ms = delay.as_millis() as u64, "Status channel reconnecting");
                    self.set_state(ChannelState::Reconnecting { attempt, delay });
                    if !self.sleep_handling_commands(delay).await {
                        return self.shut_down();
                    }
                }
            }
        }
    }

    /// Connect, reconcile, then stream until the session ends
    async fn connect_once(&mut self) -> SessionEnd {
        self.set_state(ChannelState::Connecting);
        let ids: Vec<String> = self.interest.iter().cloned().collect();

        let mut stream = match self.transport.connect(&ids).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "Status channel connect failed");
                return SessionEnd::Lost { streamed: false };
            }
        };
        self.set_state(ChannelState::Connected);
        info!(properties = ids.len(), "Status channel connected");

        // Events missed while disconnected are gone; fetch the truth
        match self.transport.fetch_current(&ids).await {
            Ok(jobs) => self.emit(LiveUpdate::Snapshot(jobs)),
            Err(e) => {
                warn!(error = %e, "Reconciliation fetch failed");
                stream.close().await;
                return SessionEnd::Lost { streamed: false };
            }
        }

        self.session(stream.as_mut()).await
    }

    async fn session(&mut self, stream: &mut dyn EventStream) -> SessionEnd {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Watch(id)) => {
                        if self.interest.insert(id) {
                            // subscription interest is fixed per subscribe call
                            stream.close().await;
                            return SessionEnd::Resubscribe;
                        }
                    }
                    Some(Command::Unwatch(id)) => {
                        if self.interest.remove(&id) && self.interest.is_empty() {
                            debug!("No watched properties left, closing status channel");
                            stream.close().await;
                            return SessionEnd::NoInterest;
                        }
                    }
                    Some(Command::Reconnect) => {}
                    Some(Command::Close) | None => {
                        stream.close().await;
                        return SessionEnd::Shutdown;
                    }
                },
                item = stream.next_item() => match item {
                    StreamItem::Event(event) => {
                        if self.interest.contains(&event.data.property_id) {
                            self.emit(LiveUpdate::Event(event));
                        }
                    }
                    StreamItem::Closed(CloseCode::Normal) => return SessionEnd::ClosedByServer,
                    StreamItem::Closed(code) => {
                        warn!(close_code = code.code(), "Status channel lost");
                        return SessionEnd::Lost { streamed: true };
                    }
                },
            }
        }
    }

    /// Wait while nothing is watched. `false` means shut down.
    async fn park_until_interest(&mut self) -> bool {
        while let Some(command) = self.commands.recv().await {
            match command {
                Command::Watch(id) => {
                    self.interest.insert(id);
                    return true;
                }
                Command::Unwatch(id) => {
                    self.interest.remove(&id);
                }
                Command::Reconnect => {}
                Command::Close => return false,
            }
        }
        false
    }

    /// Wait for an explicit reconnect after giving up. `false` means shut down.
    async fn park_disconnected(&mut self) -> bool {
        while let Some(command) = self.commands.recv().await {
            match command {
                Command::Watch(id) => {
                    self.interest.insert(id);
                }
                Command::Unwatch(id) => {
                    self.interest.remove(&id);
                }
                Command::Reconnect => return true,
                Command::Close => return false,
            }
        }
        false
    }

    /// Backoff sleep that still tracks interest changes. `false` means shut
    /// down.
    async fn sleep_handling_commands(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                command = self.commands.recv() => match command {
                    Some(Command::Watch(id)) => {
                        self.interest.insert(id);
                    }
                    Some(Command::Unwatch(id)) => {
                        self.interest.remove(&id);
                    }
                    Some(Command::Reconnect) => return true,
                    Some(Command::Close) | None => return false,
                },
            }
        }
    }

    fn shut_down(&self) {
        info!("Status channel closed");
        self.set_state(ChannelState::Closed {
            code: CloseCode::Normal,
        });
    }

    fn set_state(&self, state: ChannelState) {
        self.state.send_replace(state);
    }

    fn emit(&self, update: LiveUpdate) {
        // Receiver dropped means nobody listens anymore; keep the state
        // machine running for `close()`
        let _ = self.updates.send(update);
    }
}

/// `StatusTransport` over the daemon's WebSocket subscription, reconciling
/// through the HTTP request API
pub struct WsStatusTransport {
    ws_url: String,
    rpc: RealtyClient,
}

impl WsStatusTransport {
    pub fn new(ws_url: impl Into<String>, rpc: RealtyClient) -> Self {
        Self {
            ws_url: ws_url.into(),
            rpc,
        }
    }
}

#[async_trait]
impl StatusTransport for WsStatusTransport {
    async fn connect(&self, property_ids: &[String]) -> Result<Box<dyn EventStream>> {
        let client = WsClientBuilder::default()
            .build(&self.ws_url)
            .await
            .map_err(|e| SdkError::Connection(format!("{}: {}", self.ws_url, e)))?;
        let subscription = client
            .subscribe::<StatusEvent, _>(
                SUBSCRIBE_METHOD,
                object_params(&json!({ "propertyIds": property_ids }))?,
                UNSUBSCRIBE_METHOD,
            )
            .await?;

        Ok(Box::new(WsEventStream {
            client: Some(client),
            subscription: Some(subscription),
        }))
    }

    async fn fetch_current(&self, property_ids: &[String]) -> Result<Vec<Job>> {
        self.rpc.current_jobs(property_ids).await
    }
}

struct WsEventStream {
    client: Option<WsClient>,
    subscription: Option<Subscription<StatusEvent>>,
}

#[async_trait]
impl EventStream for WsEventStream {
    async fn next_item(&mut self) -> StreamItem {
        let Some(subscription) = self.subscription.as_mut() else {
            return StreamItem::Closed(CloseCode::Normal);
        };
        loop {
            match subscription.next().await {
                Some(Ok(event)) => return StreamItem::Event(event),
                Some(Err(e)) => {
                    warn!(error = %e, "Dropping undecodable status event");
                }
                // server went away or dropped the subscription
                None => return StreamItem::Closed(CloseCode::Abnormal),
            }
        }
    }

    async fn close(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            if let Err(e) = subscription.unsubscribe().await {
                debug!(error = %e, "Unsubscribe failed");
            }
        }
        // dropping the client sends the 1000 close frame
        self.client.take();
    }
}
