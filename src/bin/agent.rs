//! Synthetic multi-agent load generator
//!
//! Spawns many concurrent agents against a running hub. Each agent registers,
//! streams a fixed number of reports over the ingest websocket at the interval
//! the hub hands out, then ends the session and waits for its summary.

use std::time::Duration;

use anyhow::{Context, bail};
use chrono::Utc;
use clap::Parser;
use futures::{SinkExt, StreamExt};
use sysinfo::System;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_tungstenite::tungstenite::{
    Message,
    client::IntoClientRequest,
    http::HeaderValue,
};
use tracing::{debug, error, info, instrument, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};
use watchtower::{
    AgentConfig, AgentInfo, IngestFrame, MetricReport, SessionSummary, util::SERVICE_ID_HEADER,
};

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Base URL of the hub
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    hub: String,

    /// Number of concurrent agents
    #[arg(long, default_value_t = 150)]
    agents: usize,

    /// Reports sent by each agent
    #[arg(long, default_value_t = 15)]
    reports: u64,

    /// Bearer token for the hub's query routes, used for the final stats
    #[arg(long)]
    token: Option<String>,
}

fn init() {
    dotenv::dotenv().ok();

    let filter = filter::Targets::new().with_targets(vec![
        ("watchtower", LevelFilter::DEBUG),
        ("watchtower_agent", LevelFilter::DEBUG),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(true),
        )
        .with(filter)
        .init();
}

/// Host readings every agent derives its values from
#[derive(Debug, Clone, Copy, Default)]
struct HostSample {
    cpu_percent: f64,
    memory_mb: f64,
}

/// Refresh host readings in the background
fn spawn_sampler() -> watch::Receiver<HostSample> {
    let (tx, rx) = watch::channel(HostSample::default());

    tokio::spawn(async move {
        let mut sys = System::new();
        loop {
            sys.refresh_cpu_usage();
            sys.refresh_memory();
            let sample = HostSample {
                cpu_percent: sys.global_cpu_usage() as f64,
                memory_mb: sys.used_memory() as f64 / (1024.0 * 1024.0),
            };
            trace!("host sample: {sample:?}");
            if tx.send(sample).is_err() {
                break;
            }
            tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL.max(Duration::from_millis(500)))
                .await;
        }
    });

    rx
}

/// Shape a host sample into this agent's report
///
/// The offsets depend only on the agent and report number, so a run is
/// repeatable apart from the host readings. Some agents land above the
/// default alert thresholds.
fn synthesize(agent: usize, sequence: u64, host: HostSample) -> MetricReport {
    let spread = ((agent as u64 * 37 + sequence * 13) % 100) as f64;
    let cpu = (host.cpu_percent * 0.2 + spread).min(100.0);

    let memory_offset = ((agent as u64 * 997 + sequence * 101) % 12_000) as f64;
    let memory = (host.memory_mb / 4.0 + memory_offset).min(16_000.0);

    MetricReport {
        cpu_usage_percent: cpu,
        memory_usage_mb: memory,
        request_count: (agent as u64 * 31 + sequence * 7) % 500,
        timestamp: Utc::now(),
    }
}

fn ws_url(hub: &str) -> anyhow::Result<String> {
    let base = hub.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        bail!("hub URL must start with http:// or https://, got {hub}");
    };
    Ok(format!("{base}/api/v1/ingest"))
}

struct Agent {
    id: usize,
    service_id: String,
    hub: String,
    reports: u64,
    client: reqwest::Client,
    host: watch::Receiver<HostSample>,
}

impl Agent {
    fn verbose(&self) -> bool {
        self.id % 20 == 0
    }

    async fn register(&self) -> anyhow::Result<AgentConfig> {
        let info = AgentInfo {
            os_version: System::long_os_version().unwrap_or_else(|| "unknown".to_string()),
            agent_version: AGENT_VERSION.to_string(),
        };

        let response = self
            .client
            .post(format!("{}/api/v1/register", self.hub.trim_end_matches('/')))
            .header(SERVICE_ID_HEADER, &self.service_id)
            .json(&info)
            .send()
            .await
            .context("registration request failed")?;

        if !response.status().is_success() {
            bail!("registration rejected with {}", response.status());
        }

        response
            .json::<AgentConfig>()
            .await
            .context("invalid registration response")
    }

    #[instrument(skip(self), fields(service_id = %self.service_id))]
    async fn run(self) -> anyhow::Result<SessionSummary> {
        let config = self.register().await?;
        if self.verbose() {
            info!(
                "registered successfully, interval={}ms",
                config.report_interval_ms
            );
        }

        let mut request = ws_url(&self.hub)?.into_client_request()?;
        request
            .headers_mut()
            .insert(SERVICE_ID_HEADER, HeaderValue::from_str(&self.service_id)?);

        let (mut ws, _) = tokio_tungstenite::connect_async(request)
            .await
            .context("failed to open ingest stream")?;

        let interval = Duration::from_millis(config.report_interval_ms);
        for sequence in 0..self.reports {
            let report = synthesize(self.id, sequence, *self.host.borrow());
            let frame = serde_json::to_string(&IngestFrame::Report(report))?;
            ws.send(Message::Text(frame))
                .await
                .context("failed to send report")?;
            tokio::time::sleep(interval).await;
        }

        ws.send(Message::Text(serde_json::to_string(&IngestFrame::End)?))
            .await
            .context("failed to end stream")?;

        while let Some(message) = ws.next().await {
            match message.context("stream failed before summary")? {
                Message::Text(text) => {
                    let summary: SessionSummary =
                        serde_json::from_str(&text).context("invalid session summary")?;
                    if self.verbose() {
                        info!("stream closed cleanly, summary status: {}", summary.status);
                    }
                    let _ = ws.close(None).await;
                    return Ok(summary);
                }
                Message::Close(frame) => {
                    bail!("hub closed the stream: {frame:?}");
                }
                _ => continue,
            }
        }

        bail!("connection dropped before summary")
    }
}

async fn print_hub_stats(client: &reqwest::Client, hub: &str, token: Option<&str>) {
    let mut request = client.get(format!("{}/api/v1/stats", hub.trim_end_matches('/')));
    if let Some(token) = token {
        request = request.bearer_auth(token);
    }

    match request.send().await {
        Ok(response) if response.status().is_success() => {
            match response.json::<serde_json::Value>().await {
                Ok(stats) => info!("hub stats: {stats}"),
                Err(e) => warn!("invalid stats response: {e}"),
            }
        }
        Ok(response) => warn!("stats request returned {}", response.status()),
        Err(e) => warn!("stats request failed: {e}"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let client = reqwest::Client::new();
    let host = spawn_sampler();
    info!("starting {} concurrent agents", args.agents);

    let mut agents = JoinSet::new();
    for id in 1..=args.agents {
        let agent = Agent {
            id,
            service_id: format!("service-agent-{id:03}"),
            hub: args.hub.clone(),
            reports: args.reports,
            client: client.clone(),
            host: host.clone(),
        };
        agents.spawn(async move {
            let service_id = agent.service_id.clone();
            (service_id, agent.run().await)
        });
    }

    let mut succeeded = 0usize;
    let mut failed = 0usize;
    while let Some(joined) = agents.join_next().await {
        match joined {
            Ok((_, Ok(summary))) => {
                debug!("agent finished with {} reports", summary.total_reports_received);
                succeeded += 1;
            }
            Ok((service_id, Err(e))) => {
                error!("[{service_id}] {e:#}");
                failed += 1;
            }
            Err(e) => {
                error!("agent task panicked: {e}");
                failed += 1;
            }
        }
    }

    info!("all agents finished: {succeeded} succeeded, {failed} failed");
    print_hub_stats(&client, &args.hub, args.token.as_deref()).await;

    if failed > 0 {
        bail!("{failed} agents failed");
    }
    Ok(())
}
