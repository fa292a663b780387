//! JSON-RPC Server
//!
//! Serves HTTP and WebSocket on the same TCP port. Request methods work over
//! either transport; the status subscription needs WebSocket.

use crate::error::RpcServerError;
use crate::handler::RpcHandler;
use crate::types::{
    BulkPriceUpdateRequest, BulkPublishRequest, BulkScheduleRequest, BulkStatusRequest,
    EnqueueRequest, JobRequest, PropertiesRequest,
};
use jsonrpsee::core::SubscriptionResult;
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::{RpcModule, SubscriptionMessage, SubscriptionSink};
use realty_core::application::{StatusSubscription, SubscriptionClosed};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

const DEFAULT_RPC_HOST: &str = "127.0.0.1";
const DEFAULT_RPC_PORT: u16 = 9630;

pub const SUBSCRIBE_METHOD: &str = "publication.subscribe.v1";
pub const NOTIFICATION_METHOD: &str = "publication.event";
pub const UNSUBSCRIBE_METHOD: &str = "publication.unsubscribe.v1";

/// RPC Server Configuration
#[derive(Debug, Clone)]
pub struct RpcServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
        }
    }
}

/// RPC Server
pub struct RpcServer {
    config: RpcServerConfig,
    handler: Arc<RpcHandler>,
}

macro_rules! register_method {
    ($module:expr, $name:literal, $handler:expr, $call:ident, $request:ty) => {{
        let handler = $handler.clone();
        $module
            .register_async_method($name, move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let request: $request = params.parse()?;
                    handler.$call(request).await
                }
            })
            .map_err(|e| RpcServerError::Register(e.to_string()))?;
    }};
}

impl RpcServer {
    pub fn new(config: RpcServerConfig, handler: RpcHandler) -> Self {
        Self {
            config,
            handler: Arc::new(handler),
        }
    }

    /// Every method and the status subscription
    pub fn module(&self) -> Result<RpcModule<()>, RpcServerError> {
        let mut module = RpcModule::new(());

        register_method!(module, "publication.enqueue.v1", self.handler, enqueue, EnqueueRequest);
        register_method!(module, "publication.cancel.v1", self.handler, cancel, JobRequest);
        register_method!(module, "publication.job.v1", self.handler, job, JobRequest);
        register_method!(module, "publication.jobs.v1", self.handler, jobs, PropertiesRequest);
        register_method!(module, "bulk.publish.v1", self.handler, bulk_publish, BulkPublishRequest);
        register_method!(
            module,
            "bulk.price_update.v1",
            self.handler,
            bulk_price_update,
            BulkPriceUpdateRequest
        );
        register_method!(module, "bulk.schedule.v1", self.handler, bulk_schedule, BulkScheduleRequest);
        register_method!(module, "bulk.status.v1", self.handler, bulk_status, BulkStatusRequest);

        let handler = self.handler.clone();
        module
            .register_subscription(
                SUBSCRIBE_METHOD,
                NOTIFICATION_METHOD,
                UNSUBSCRIBE_METHOD,
                move |params, pending, _, _| {
                    let handler = handler.clone();
                    async move {
                        let request: PropertiesRequest = match params.parse() {
                            Ok(request) => request,
                            Err(e) => {
                                pending.reject(e).await;
                                return Ok(());
                            }
                        };
                        let subscription = match handler.subscribe(request) {
                            Ok(subscription) => subscription,
                            Err(e) => {
                                pending.reject(e).await;
                                return Ok(());
                            }
                        };

                        let sink = pending.accept().await?;
                        info!(
                            subscription_id = ?sink.subscription_id(),
                            properties = subscription.interest().count(),
                            "Status subscription opened"
                        );
                        forward_events(sink, subscription).await
                    }
                },
            )
            .map_err(|e| RpcServerError::Register(e.to_string()))?;

        Ok(module)
    }

    /// Bind and start serving.
    ///
    /// Returns the bound address (useful with port 0) and the handle used to
    /// stop the server.
    pub async fn start(self) -> Result<(SocketAddr, ServerHandle), RpcServerError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let module = self.module()?;

        let server = Server::builder()
            .build(&addr)
            .await
            .map_err(|source| RpcServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = server
            .local_addr()
            .map_err(|source| RpcServerError::Bind { addr, source })?;

        info!(addr = %local_addr, "JSON-RPC server listening (HTTP + WebSocket)");
        Ok((local_addr, server.start(module)))
    }
}

/// Push hub events to one subscriber until either side goes away.
///
/// A lagging subscriber is closed with an error rather than silently
/// skipping events; the client reconnects and reconciles.
async fn forward_events(
    sink: SubscriptionSink,
    mut subscription: StatusSubscription,
) -> SubscriptionResult {
    loop {
        tokio::select! {
            _ = sink.closed() => {
                debug!(subscription_id = ?sink.subscription_id(), "Status subscriber disconnected");
                return Ok(());
            }
            next = subscription.next() => match next {
                Ok(event) => {
                    let message = SubscriptionMessage::from_json(&event)?;
                    if sink.send(message).await.is_err() {
                        return Ok(());
                    }
                }
                Err(SubscriptionClosed::Lagged(missed)) => {
                    warn!(missed, "Status subscriber lagged behind, closing");
                    return Err(format!("subscriber lagged behind by {} events", missed).into());
                }
                Err(SubscriptionClosed::HubClosed) => return Ok(()),
            }
        }
    }
}
