//! Watch a property while it is published
//!
//! # Usage
//!
//! 1. Start the daemon:
//!    ```bash
//!    cargo run --package realty-daemon
//!    ```
//!
//! 2. Run this example:
//!    ```bash
//!    cargo run --example simple -- prop-1 idealista
//!    ```

use realty_sdk::{
    EnqueueRequest, LiveStatusClient, LiveUpdate, RealtyClient, ReconnectPolicy,
    WsStatusTransport,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let property_id = args.next().unwrap_or_else(|| "prop-1".to_string());
    let portal = args.next().unwrap_or_else(|| "idealista".to_string());

    let rpc = RealtyClient::connect("http://127.0.0.1:9630").await?;
    let transport = Arc::new(WsStatusTransport::new("ws://127.0.0.1:9630", rpc.clone()));
    let (live, mut updates) = LiveStatusClient::spawn(
        transport,
        ReconnectPolicy::default(),
        [property_id.clone()],
    );

    let job = rpc
        .enqueue(EnqueueRequest::publish(&property_id, &portal))
        .await?;
    println!("Enqueued {} ({} on {})", job.id, property_id, portal);

    while let Some(update) = updates.recv().await {
        match update {
            LiveUpdate::Snapshot(jobs) => {
                for current in jobs.iter().filter(|j| j.id == job.id) {
                    println!("snapshot: {}", current.state);
                }
            }
            LiveUpdate::Event(event) if event.data.job_id == job.id => {
                println!(
                    "{}: {} {}",
                    event.kind,
                    event.data.status,
                    event.data.url.as_deref().unwrap_or("")
                );
                if event.kind != "publication_update" {
                    break;
                }
            }
            LiveUpdate::Event(_) => {}
        }
    }

    live.close().await;
    Ok(())
}
