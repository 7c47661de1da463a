//! Engine facade.
//!
//! Wires store -> resolver -> synthesizer -> reconciler behind the four
//! operations the surrounding session layer consumes: generate, download,
//! apply-as-a-stream, status. Cheaply cloneable; all shared state lives
//! behind `Arc`s.

use kubeprep_common::{
    chart_id, target_namespace, ApplyStage, CleanupReport, ProgressEvent, ProvisionError,
    ReleaseStatus, Result, Track,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info, warn};

use crate::chart::ChartSynthesizer;
use crate::config::Config;
use crate::reconciler::ClusterReconciler;
use crate::resolver::RequirementResolver;
use crate::runner::{CommandRunner, ShellRunner};
use crate::store::QuestionStore;

/// Capacity of one apply request's progress channel. Helm output is line
/// oriented and the consumer renders as it reads, so a small buffer is fine.
const PROGRESS_CHANNEL_CAPACITY: usize = 64;

#[derive(Clone)]
pub struct ProvisionEngine {
    resolver: Arc<RequirementResolver>,
    synthesizer: Arc<ChartSynthesizer>,
    reconciler: Arc<ClusterReconciler>,
}

impl ProvisionEngine {
    /// Production engine: real question bank, real helm/kubectl.
    pub fn new(config: Config) -> Self {
        Self::with_runner(config, Arc::new(ShellRunner))
    }

    /// Engine with a caller-supplied command runner; the seam that lets
    /// tests reconcile against a scripted cluster.
    pub fn with_runner(config: Config, runner: Arc<dyn CommandRunner>) -> Self {
        let store = QuestionStore::new(config.question_bank_dir.clone());
        let synthesizer = ChartSynthesizer::new(config.charts_dir());
        Self {
            resolver: Arc::new(RequirementResolver::new(store)),
            synthesizer: Arc::new(synthesizer),
            reconciler: Arc::new(ClusterReconciler::new(config, runner)),
        }
    }

    /// Generate a fresh chart and its packaged archive. Always regenerates:
    /// the sample cache is invalidated up front so every call sees a new
    /// random selection, while the reads within this call share one sample.
    pub async fn generate(&self, track: Track, difficulty: &str, practice: bool)
        -> Result<String> {
        self.resolver.invalidate(track, difficulty).await;

        let plan = self.resolver.resolve(track, difficulty, practice).await;
        if plan.is_empty() {
            warn!("Nothing to synthesize for {}/{}; generating baseline chart", track, difficulty);
        }
        let questions = self.resolver.sampled_questions(track, difficulty, practice).await;

        let chart =
            self.synthesizer.synthesize(track, difficulty, &plan, &questions, practice).await?;
        self.synthesizer.archive(&chart).await?;

        info!("Generated chart '{}' ({} questions)", chart.id, plan.question_ids.len());
        Ok(chart.id)
    }

    /// Packaged archive bytes for a previously generated chart.
    pub async fn download_archive(&self, chart_id: &str) -> Result<Vec<u8>> {
        self.synthesizer.cached_archive(chart_id).await.ok_or_else(|| {
            ProvisionError::ArchiveMissing { chart_id: chart_id.to_string() }
        })
    }

    /// Reconcile the chart for (track, difficulty, practice), returning a
    /// live progress stream. The previously generated chart is reused so the
    /// applied environment matches what the learner was shown; generation
    /// only happens here when no archive exists yet.
    ///
    /// The stream ends with a terminal `Finished` or `Failed` event. Dropping
    /// the stream does not cancel the underlying reconciliation; it runs to
    /// completion regardless of listener presence.
    pub fn apply_stream(
        &self,
        track: Track,
        difficulty: &str,
        practice: bool,
    ) -> ReceiverStream<ProgressEvent> {
        let (events, stream) = mpsc::channel(PROGRESS_CHANNEL_CAPACITY);
        let engine = self.clone();
        let difficulty = difficulty.to_string();

        tokio::spawn(async move {
            let id = chart_id(track, &difficulty, practice);
            if engine.synthesizer.cached_archive(&id).await.is_none() {
                if let Err(e) = engine.generate(track, &difficulty, practice).await {
                    error!("Generation for apply failed: {e}");
                    let _ = events
                        .send(ProgressEvent::failed(
                            ApplyStage::Cleaning,
                            format!("chart generation failed: {e}"),
                            0,
                        ))
                        .await;
                    return;
                }
            }

            let archive_path = engine.synthesizer.archive_path(&id);
            let namespace = target_namespace(track, &difficulty);
            let outcome =
                engine.reconciler.apply(&id, &archive_path, &namespace, events).await;
            if outcome.succeeded {
                info!("Apply stream for '{}' finished: {} pods seen", id,
                    outcome.pods_seen.values().sum::<u32>());
            }
        });

        ReceiverStream::new(stream)
    }

    /// Release status for the non-practice chart of a track/difficulty.
    pub async fn status(&self, track: Track, difficulty: &str) -> Result<ReleaseStatus> {
        let release = chart_id(track, difficulty, false);
        let namespace = target_namespace(track, difficulty);
        self.reconciler.status(&release, &namespace).await
    }

    /// One best-effort cleanup pass, exposed for operators.
    pub async fn cleanup(&self) -> CleanupReport {
        self.reconciler.cleanup().await
    }
}
