//! Async driver: feeds render results into the engine, forwards dispatches
//! to the renderer.
//!
//! The engine itself is synchronous. This loop is the only place that
//! awaits, so all registry mutations happen one event at a time.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, mpsc};
use tracing::{info, warn};

use crate::collab::PreviewGenerator;
use crate::error::{Error, Result};
use crate::model::{EntropyRange, Hash, ImageDataPayload, RenderState, WorkItem};

use super::preview::PreviewEngine;

/// Request sent to the renderer when the throttle releases an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderRequest {
    pub hash: Hash,
    pub entropy_range: EntropyRange,
    pub image: String,
}

impl From<&WorkItem> for RenderRequest {
    fn from(item: &WorkItem) -> Self {
        Self {
            hash: item.hash.clone(),
            entropy_range: item.entropy_range,
            image: item.image.clone(),
        }
    }
}

/// Why the service loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Every item rendered or gave up.
    Settled,
    /// Shutdown was signalled.
    Shutdown,
    /// The renderer dropped its completion sender.
    CompletionsClosed,
}

/// Tally returned when the service loop exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub exit: ExitReason,
    pub rendered: usize,
    pub failed: usize,
    pub unfinished: usize,
    pub completions: usize,
}

/// Runs one render session over channels.
pub struct PreviewService<G> {
    engine: PreviewEngine<G>,
    requests: mpsc::Sender<RenderRequest>,
    completions: mpsc::Receiver<ImageDataPayload>,
    shutdown: Arc<Notify>,
}

impl<G: PreviewGenerator> PreviewService<G> {
    pub fn new(
        engine: PreviewEngine<G>,
        requests: mpsc::Sender<RenderRequest>,
        completions: mpsc::Receiver<ImageDataPayload>,
    ) -> Self {
        Self {
            engine,
            requests,
            completions,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Handle for stopping the loop from another task.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    pub fn engine(&self) -> &PreviewEngine<G> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut PreviewEngine<G> {
        &mut self.engine
    }

    pub fn into_engine(self) -> PreviewEngine<G> {
        self.engine
    }

    /// Start a session over `items` and process completions until it settles.
    pub async fn run(&mut self, items: Vec<WorkItem>) -> Result<RunSummary> {
        let initial = self.engine.begin_session(items);
        self.forward(&initial).await?;

        let mut completions = 0;
        let exit = loop {
            if self.engine.is_settled() {
                break ExitReason::Settled;
            }

            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("preview service shutting down");
                    break ExitReason::Shutdown;
                }
                msg = self.completions.recv() => {
                    let Some(payload) = msg else {
                        warn!("completion channel closed before session settled");
                        break ExitReason::CompletionsClosed;
                    };
                    completions += 1;
                    let completion = self.engine.on_completion(payload);
                    self.forward(&completion.dispatched).await?;
                }
            }
        };

        Ok(self.summary(exit, completions))
    }

    async fn forward(&self, dispatched: &[Arc<WorkItem>]) -> Result<()> {
        for item in dispatched {
            self.requests
                .send(RenderRequest::from(item.as_ref()))
                .await
                .map_err(|_| Error::ChannelClosed("render requests"))?;
        }
        Ok(())
    }

    fn summary(&self, exit: ExitReason, completions: usize) -> RunSummary {
        let mut summary = RunSummary {
            exit,
            rendered: 0,
            failed: 0,
            unfinished: 0,
            completions,
        };
        for item in self.engine.items() {
            match item.state() {
                RenderState::Rendered => summary.rendered += 1,
                RenderState::Failed => summary.failed += 1,
                RenderState::Pending | RenderState::Dispatched => summary.unfinished += 1,
            }
        }
        info!(
            exit = ?summary.exit,
            rendered = summary.rendered,
            failed = summary.failed,
            unfinished = summary.unfinished,
            "preview session finished"
        );
        summary
    }
}
