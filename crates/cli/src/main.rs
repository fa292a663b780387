//! Realty CLI - Command-line interface for the Realty Publisher daemon

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use colored::Colorize;
use realty_sdk::{
    BulkStatus, Job, LiveStatusClient, LiveUpdate, RealtyClient, ReconnectPolicy,
    WsStatusTransport,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tabled::{Table, Tabled};

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:9630";

#[derive(Parser)]
#[command(name = "realty")]
#[command(about = "Realty Publisher CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RPC server URL
    #[arg(long, env = "REALTY_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Enqueue one property on one portal
    Enqueue {
        property_id: String,

        /// idealista, fotocasa, habitaclia or agency_website
        portal: String,

        /// publish, update or unpublish
        #[arg(short, long, default_value = "publish")]
        action: String,

        /// Do not dispatch before this time (RFC 3339 or epoch ms)
        #[arg(long)]
        at: Option<String>,
    },

    /// Cancel a job that has not reached its portal yet
    Cancel { job_id: String },

    /// Show one job
    Job { job_id: String },

    /// Show the latest job per portal for some properties
    Jobs {
        #[arg(required = true)]
        property_ids: Vec<String>,
    },

    /// Publish properties on several portals
    Publish {
        /// Comma-separated portals
        #[arg(short, long, value_delimiter = ',', required = true)]
        portals: Vec<String>,

        #[arg(required = true)]
        property_ids: Vec<String>,
    },

    /// Adjust the price of several properties
    Price {
        /// Adjustment amount (may be negative)
        #[arg(long, allow_negative_numbers = true)]
        amount: f64,

        /// percentage or fixed
        #[arg(long = "type", default_value = "percentage")]
        kind: String,

        #[arg(required = true)]
        property_ids: Vec<String>,
    },

    /// Publish properties on several portals at a later time
    Schedule {
        /// RFC 3339 or epoch ms
        #[arg(long)]
        at: String,

        /// Comma-separated portals
        #[arg(short, long, value_delimiter = ',', required = true)]
        portals: Vec<String>,

        #[arg(required = true)]
        property_ids: Vec<String>,
    },

    /// Show a bulk operation and its live summary
    BulkStatus { bulk_id: String },

    /// Stream live status updates until interrupted
    Watch {
        #[arg(required = true)]
        property_ids: Vec<String>,
    },
}

#[derive(Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: serde_json::Value,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    #[allow(dead_code)]
    jsonrpc: String,
    #[allow(dead_code)]
    id: u64,
    result: Option<serde_json::Value>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

#[derive(Tabled)]
struct JobRow {
    id: String,
    property: String,
    portal: String,
    action: String,
    state: String,
    progress: String,
    attempt: String,
    detail: String,
}

impl From<&Job> for JobRow {
    fn from(job: &Job) -> Self {
        let detail = match (&job.result_url, &job.last_error) {
            (Some(url), _) => url.clone(),
            (None, Some(err)) => format!("{}: {}", err.kind, err.message),
            (None, None) => job
                .scheduled_for
                .and_then(DateTime::<Utc>::from_timestamp_millis)
                .map(|at| format!("due {}", at.to_rfc3339()))
                .unwrap_or_default(),
        };
        Self {
            id: job.id.clone(),
            property: job.property_id.clone(),
            portal: job.portal.clone(),
            action: job.action.clone(),
            state: job.state.clone(),
            progress: format!("{}%", job.progress),
            attempt: format!("{}/{}", job.attempt, job.max_attempts),
            detail,
        }
    }
}

async fn call_rpc(url: &str, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
    let request = JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        method: method.to_string(),
        params,
        id: 1,
    };

    let client = reqwest::Client::new();
    let response: JsonRpcResponse = client
        .post(url)
        .json(&request)
        .send()
        .await
        .context("Failed to connect to daemon")?
        .json()
        .await
        .context("Failed to parse response")?;

    if let Some(error) = response.error {
        anyhow::bail!("RPC error ({}): {}", error.code, error.message);
    }

    response
        .result
        .ok_or_else(|| anyhow::anyhow!("No result in response"))
}

/// Accept RFC 3339 timestamps or raw epoch milliseconds
fn parse_when(value: &str) -> Result<i64> {
    if let Ok(millis) = value.trim().parse::<i64>() {
        return Ok(millis);
    }
    let at = DateTime::parse_from_rfc3339(value.trim())
        .with_context(|| format!("Invalid time '{}': use RFC 3339 or epoch ms", value))?;
    Ok(at.timestamp_millis())
}

/// WebSocket endpoint served on the same port as the HTTP API
fn ws_url(rpc_url: &str) -> String {
    if let Some(rest) = rpc_url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = rpc_url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        rpc_url.to_string()
    }
}

fn paint_state(state: &str) -> String {
    match state {
        "PUBLISHED" => state.green().to_string(),
        "FAILED" => state.red().to_string(),
        "CANCELED" => state.yellow().to_string(),
        _ => state.cyan().to_string(),
    }
}

fn print_jobs(jobs: &[Job]) {
    if jobs.is_empty() {
        println!("{}", "No jobs".yellow());
        return;
    }
    let rows: Vec<JobRow> = jobs.iter().map(JobRow::from).collect();
    println!("{}", Table::new(rows));
}

fn print_bulk(status: &BulkStatus) {
    let id = status.id().unwrap_or("?");
    let kind = status.operation["kind"].as_str().unwrap_or("?");
    println!("{} {} ({})", "Bulk operation".cyan().bold(), id, kind);
    println!(
        "  {} {}   {} {}   {} {}",
        "succeeded:".bold(),
        status.summary.succeeded.to_string().green(),
        "failed:".bold(),
        status.summary.failed.to_string().red(),
        "pending:".bold(),
        status.summary.pending
    );

    let items = &status.operation["items"];
    for (label, key) in [("skipped", "skipped"), ("rejected", "rejected")] {
        if let Some(pairs) = items[key].as_array().filter(|p| !p.is_empty()) {
            println!("  {}", format!("{}:", label).yellow());
            for pair in pairs {
                println!(
                    "    {} / {}: {}",
                    pair["propertyId"].as_str().unwrap_or("?"),
                    pair["portal"].as_str().unwrap_or("?"),
                    pair["reason"].as_str().unwrap_or("")
                );
            }
        }
    }
    if let Some(mutations) = items["mutations"].as_array() {
        for mutation in mutations {
            let property = mutation["propertyId"].as_str().unwrap_or("?");
            let outcome = &mutation["outcome"];
            match outcome["status"].as_str() {
                Some("applied") => println!(
                    "  {} {}: {} -> {}",
                    "✓".green(),
                    property,
                    outcome["oldPrice"],
                    outcome["newPrice"]
                ),
                _ => println!(
                    "  {} {}: {}",
                    "✗".red(),
                    property,
                    outcome["message"].as_str().unwrap_or("failed")
                ),
            }
        }
    }
}

async fn watch(rpc_url: &str, property_ids: Vec<String>) -> Result<()> {
    let rpc = RealtyClient::connect(rpc_url).await?;
    let transport = Arc::new(WsStatusTransport::new(ws_url(rpc_url), rpc));
    let (live, mut updates) =
        LiveStatusClient::spawn(transport, ReconnectPolicy::default(), property_ids);
    let mut states = live.state_changes();

    println!("{}", "Watching (Ctrl+C to stop)".cyan().bold());
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = states.borrow_and_update().clone();
                println!("{} {:?}", "channel:".dimmed(), state);
                if matches!(state, realty_sdk::ChannelState::Closed { .. }) {
                    break;
                }
            }
            update = updates.recv() => match update {
                Some(LiveUpdate::Snapshot(jobs)) => print_jobs(&jobs),
                Some(LiveUpdate::Event(event)) => {
                    let data = event.data;
                    let extra = data
                        .url
                        .or(data.message)
                        .or(data.progress.map(|p| format!("{}%", p)))
                        .unwrap_or_default();
                    println!(
                        "{} {} {} {} {}",
                        data.job_id,
                        data.property_id,
                        data.portal,
                        paint_state(&data.status),
                        extra
                    );
                }
                None => break,
            },
        }
    }

    live.close().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Enqueue {
            property_id,
            portal,
            action,
            at,
        } => {
            let mut params = json!({
                "propertyId": property_id,
                "portal": portal,
                "action": action,
            });
            if let Some(at) = at {
                params["scheduledFor"] = json!(parse_when(&at)?);
            }

            let result = call_rpc(&cli.rpc_url, "publication.enqueue.v1", params).await?;
            let job: Job = serde_json::from_value(result)?;

            println!("{}", "✓ Job enqueued".green().bold());
            println!();
            print_jobs(&[job]);
        }

        Commands::Cancel { job_id } => {
            let result =
                call_rpc(&cli.rpc_url, "publication.cancel.v1", json!({ "jobId": job_id })).await?;
            let job: Job = serde_json::from_value(result)?;

            println!(
                "{} {}",
                format!("✓ Job {}", job.id).green().bold(),
                paint_state(&job.state)
            );
        }

        Commands::Job { job_id } => {
            let result =
                call_rpc(&cli.rpc_url, "publication.job.v1", json!({ "jobId": job_id })).await?;
            let job: Job = serde_json::from_value(result)?;
            print_jobs(&[job]);
        }

        Commands::Jobs { property_ids } => {
            let result = call_rpc(
                &cli.rpc_url,
                "publication.jobs.v1",
                json!({ "propertyIds": property_ids }),
            )
            .await?;
            let jobs: Vec<Job> = serde_json::from_value(result["jobs"].clone())?;
            print_jobs(&jobs);
        }

        Commands::Publish {
            portals,
            property_ids,
        } => {
            let result = call_rpc(
                &cli.rpc_url,
                "bulk.publish.v1",
                json!({ "propertyIds": property_ids, "portals": portals }),
            )
            .await?;
            print_bulk(&serde_json::from_value(result)?);
        }

        Commands::Price {
            amount,
            kind,
            property_ids,
        } => {
            let result = call_rpc(
                &cli.rpc_url,
                "bulk.price_update.v1",
                json!({
                    "propertyIds": property_ids,
                    "adjustment": { "amount": amount, "type": kind },
                }),
            )
            .await?;
            print_bulk(&serde_json::from_value(result)?);
        }

        Commands::Schedule {
            at,
            portals,
            property_ids,
        } => {
            let when = parse_when(&at)?;
            let result = call_rpc(
                &cli.rpc_url,
                "bulk.schedule.v1",
                json!({ "propertyIds": property_ids, "portals": portals, "when": when }),
            )
            .await?;
            print_bulk(&serde_json::from_value(result)?);
        }

        Commands::BulkStatus { bulk_id } => {
            let result =
                call_rpc(&cli.rpc_url, "bulk.status.v1", json!({ "bulkId": bulk_id })).await?;
            print_bulk(&serde_json::from_value(result)?);
        }

        Commands::Watch { property_ids } => watch(&cli.rpc_url, property_ids).await?,
    }

    Ok(())
}
