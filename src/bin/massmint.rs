//! massmint CLI: run and inspect the preview render pipeline.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use massmint_preview::collab::{
    Capture, CaptureRequest, GenerateRequest, GeneratedPreview, MetadataAssembler, MetadataRequest,
};
use massmint_preview::config::{Config, PipelineConfig};
use massmint_preview::engine::{Finalizer, PreviewEngine, PreviewService, RenderRequest, Session};
use massmint_preview::error::{Error, Result};
use massmint_preview::model::{DropInfo, EntropyRange, ImageDataPayload, MetadataRef, WorkItem};
use massmint_preview::telemetry::{TelemetryConfig, init_telemetry};
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Parser)]
#[command(name = "massmint", about = "Mass-mint preview render pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render a batch of previews against a simulated renderer, then pin them
    Simulate {
        /// Number of previews in the session
        #[arg(long, default_value_t = 8)]
        items: usize,
        /// Every Nth render request reports a failed render (0 = never)
        #[arg(long, default_value_t = 0)]
        fail_every: usize,
        /// Base render latency in milliseconds
        #[arg(long, default_value_t = 50)]
        latency_ms: u64,
        /// Override the in-flight ceiling from the pipeline config
        #[arg(long)]
        max_in_flight: Option<usize>,
        /// Override the regeneration limit from the pipeline config
        #[arg(long)]
        max_regenerations: Option<u32>,
    },
    /// Print the effective pipeline configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Command::Config => {
            let pipeline = config.pipeline()?;
            print!("{}", toml::to_string_pretty(&pipeline)?);
            Ok(())
        }
        Command::Simulate {
            items,
            fail_every,
            latency_ms,
            max_in_flight,
            max_regenerations,
        } => {
            let mut pipeline = config.pipeline()?;
            if let Some(n) = max_in_flight {
                pipeline.max_in_flight = n;
            }
            if max_regenerations.is_some() {
                pipeline.max_regenerations = max_regenerations;
            }
            pipeline.validate()?;

            let _guard = init_telemetry(TelemetryConfig {
                endpoint: config.otel_endpoint.clone(),
                service_name: "massmint".to_string(),
                default_filter: config.log_level.clone(),
            })?;

            cmd_simulate(pipeline, items, fail_every, Duration::from_millis(latency_ms)).await
        }
    }
}

async fn cmd_simulate(
    pipeline: PipelineConfig,
    count: usize,
    fail_every: usize,
    latency: Duration,
) -> anyhow::Result<()> {
    let drop = DropInfo {
        name: "Simulated Drop".to_string(),
        price: "1000000000000".to_string(),
        description: Some("Generative previews rendered by the simulator".to_string()),
        collection_name: Some("Simulated Collection".to_string()),
        content: "sim://generative".to_string(),
    };

    let items: Vec<WorkItem> = (0..count as u64)
        .map(|i| {
            let range = EntropyRange(i * 1_000, i * 1_000 + 999);
            WorkItem::new(format!("{:016x}", i + 1), range, placeholder(&drop.content, range, 0))
                .name(&drop.name)
                .price(&drop.price)
        })
        .collect();

    let session = Session::new("sim-account", &drop.content);
    let engine = PreviewEngine::new(&pipeline, session, regenerate);

    let (request_tx, request_rx) = mpsc::channel(64);
    let (completion_tx, completion_rx) = mpsc::channel(64);
    tokio::spawn(simulated_renderer(
        request_rx,
        completion_tx,
        fail_every,
        latency,
        pipeline.failure_marker.clone(),
    ));

    let mut service = PreviewService::new(engine, request_tx, completion_rx);
    let shutdown = service.shutdown_handle();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        shutdown.notify_one();
    });

    let summary = service.run(items).await?;
    println!(
        "Rendered {} / failed {} / unfinished {} ({} completions, exit: {:?})",
        summary.rendered, summary.failed, summary.unfinished, summary.completions, summary.exit
    );

    let mut engine = service.into_engine();
    let finalizer = Finalizer::new(SimulatedCapture, SimulatedMetadata, drop, &pipeline.content_type);
    let outcomes = finalizer.finalize_rendered(&mut engine).await;

    let rendered = engine.rendered_items();
    let candidates = finalizer.mint_candidates(rendered.iter().map(Arc::as_ref));

    println!();
    println!("{:<16}  {:<14}  {:<40}  METADATA", "HASH", "ENTROPY", "IMAGE");
    println!("{}", "-".repeat(110));
    for candidate in &candidates {
        let metadata = outcomes
            .iter()
            .find(|(hash, _)| *hash == candidate.hash)
            .map(|(_, result)| match result {
                Ok(metadata) => metadata.to_string(),
                Err(e) => format!("error: {e}"),
            })
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<16}  {:<14}  {:<40}  {}",
            candidate.hash.as_str(),
            candidate.entropy_range.to_string(),
            candidate.image,
            metadata
        );
    }
    println!("\n{} candidate(s), all pinned: {}", candidates.len(), engine.all_pinned());

    Ok(())
}

fn placeholder(content: &str, range: EntropyRange, attempt: u32) -> String {
    format!("{content}/{}-{}?attempt={attempt}", range.0, range.1)
}

fn regenerate(request: &GenerateRequest<'_>) -> GeneratedPreview {
    GeneratedPreview {
        image: format!(
            "{}&account={}",
            placeholder(request.content, request.entropy_range, 1),
            request.account_id
        ),
    }
}

/// Answers render requests after a staggered delay. Every `fail_every`th
/// request reports the failure marker instead of an image.
async fn simulated_renderer(
    mut requests: mpsc::Receiver<RenderRequest>,
    completions: mpsc::Sender<ImageDataPayload>,
    fail_every: usize,
    latency: Duration,
    failure_marker: String,
) {
    let mut seen = 0usize;
    while let Some(request) = requests.recv().await {
        seen += 1;
        let failed = fail_every > 0 && seen % fail_every == 0;
        let delay = latency * (1 + (seen % 3) as u32);
        let completions = completions.clone();
        let marker = failure_marker.clone();

        debug!(hash = %request.hash, failed, ?delay, "simulated render started");
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let image = if failed {
                marker
            } else {
                format!("data:image/png;base64,{}", request.hash)
            };
            let payload = ImageDataPayload::new(request.hash, image)
                .with_field("source", serde_json::json!(request.image));
            let _ = completions.send(payload).await;
        });
    }
}

struct SimulatedCapture;

impl Capture for SimulatedCapture {
    async fn try_capture(&self, request: CaptureRequest<'_>) -> Result<String> {
        let data = request
            .data
            .ok_or_else(|| Error::Capture(format!("no render payload for {}", request.image)))?;
        Ok(format!("sim-cid-{}", data.hash))
    }
}

struct SimulatedMetadata;

impl MetadataAssembler for SimulatedMetadata {
    async fn assemble(&self, request: MetadataRequest<'_>) -> Result<MetadataRef> {
        Ok(MetadataRef(format!(
            "ipfs://{}/{}.json",
            request.content_id,
            request.display_name.replace(' ', "-").to_lowercase()
        )))
    }
}
