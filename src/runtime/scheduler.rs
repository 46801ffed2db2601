//! Hot-reload scheduler
//!
//! Periodically re-fetches the OpenAPI document and swaps in a new tool
//! snapshot when the document bytes changed. Any failure keeps the last
//! good snapshot in place; the next tick simply tries again.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::core::{FetchError, SynthesisError};
use crate::openapi::{Fingerprint, SpecSource};
use crate::tools::{ToolRegistry, ToolSnapshot, ToolSynthesizer};

/// What one reload cycle did
#[derive(Debug)]
pub enum ReloadOutcome {
    /// Same fingerprint as the installed snapshot
    Unchanged,
    /// A new snapshot was installed
    Reloaded { tools: usize },
    FetchFailed(FetchError),
    SynthesisFailed(SynthesisError),
}

/// Fetch and synthesize the first snapshot
///
/// Unlike a reload, failure here is fatal to the caller.
pub async fn load_initial(
    source: &dyn SpecSource,
    synthesizer: &ToolSynthesizer,
) -> Result<(ToolSnapshot, Fingerprint)> {
    let fetched = source
        .fetch()
        .await
        .with_context(|| format!("Failed to fetch OpenAPI spec from {}", source.location()))?;

    let snapshot = synthesizer
        .synthesize(&fetched.document)
        .context("Failed to synthesize tools from OpenAPI spec")?;

    tracing::info!(
        "[ReloadScheduler] Loaded '{}' version {} with {} tools (fingerprint {})",
        fetched.document.title,
        fetched.document.version,
        snapshot.len(),
        fetched.fingerprint.short()
    );

    Ok((snapshot, fetched.fingerprint))
}

/// Drives reload cycles against a registry
pub struct ReloadScheduler {
    source: Arc<dyn SpecSource>,
    synthesizer: ToolSynthesizer,
    registry: Arc<ToolRegistry>,
    /// Fingerprint of the document behind the installed snapshot
    fingerprint: Option<Fingerprint>,
    interval: Duration,
}

impl ReloadScheduler {
    pub fn new(
        source: Arc<dyn SpecSource>,
        synthesizer: ToolSynthesizer,
        registry: Arc<ToolRegistry>,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            synthesizer,
            registry,
            fingerprint: None,
            interval,
        }
    }

    /// Record the fingerprint of the already-installed snapshot
    pub fn with_fingerprint(mut self, fingerprint: Fingerprint) -> Self {
        self.fingerprint = Some(fingerprint);
        self
    }

    pub fn fingerprint(&self) -> Option<Fingerprint> {
        self.fingerprint
    }

    /// Run one fetch / compare / synthesize / install cycle
    pub async fn run_cycle(&mut self) -> ReloadOutcome {
        let fetched = match self.source.fetch().await {
            Ok(fetched) => fetched,
            Err(e) => {
                tracing::warn!(
                    "[ReloadScheduler] Fetch from {} failed, keeping current tools: {}",
                    self.source.location(),
                    e
                );
                return ReloadOutcome::FetchFailed(e);
            }
        };

        if self.fingerprint == Some(fetched.fingerprint) {
            tracing::debug!(
                "[ReloadScheduler] Spec unchanged (fingerprint {})",
                fetched.fingerprint.short()
            );
            return ReloadOutcome::Unchanged;
        }

        let snapshot = match self.synthesizer.synthesize(&fetched.document) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(
                    "[ReloadScheduler] Spec version {} rejected, keeping current tools: {}",
                    fetched.document.version,
                    e
                );
                return ReloadOutcome::SynthesisFailed(e);
            }
        };

        let tools = snapshot.len();
        let previous_version = self.registry.current().api_version().to_string();
        self.registry.install(snapshot);
        self.fingerprint = Some(fetched.fingerprint);

        tracing::info!(
            "[ReloadScheduler] Reloaded tools: version {} -> {}, {} tools (fingerprint {})",
            previous_version,
            fetched.document.version,
            tools,
            fetched.fingerprint.short()
        );

        ReloadOutcome::Reloaded { tools }
    }

    /// Spawn the periodic loop
    ///
    /// The first cycle runs one interval after start.
    pub fn start(mut self) -> SchedulerHandle {
        let token = CancellationToken::new();
        let cancel = token.clone();

        tracing::info!(
            "[ReloadScheduler] Checking {} every {}s",
            self.source.location(),
            self.interval.as_secs()
        );

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(
                tokio::time::Instant::now() + self.interval,
                self.interval,
            );
            // A slow cycle pushes the schedule back instead of bursting
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = self.run_cycle() => {}
                        }
                    }
                }
            }

            tracing::info!("[ReloadScheduler] Stopped");
        });

        SchedulerHandle { token, task }
    }
}

/// Handle to a running scheduler loop
pub struct SchedulerHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop the loop and wait for it to finish
    ///
    /// A cycle in progress is abandoned without installing anything.
    pub async fn shutdown(self) {
        self.token.cancel();
        if let Err(e) = self.task.await {
            tracing::error!("[ReloadScheduler] Task ended abnormally: {}", e);
        }
    }
}
