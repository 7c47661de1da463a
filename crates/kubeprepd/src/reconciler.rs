//! Cluster reconciler.
//!
//! Reconciles a packaged chart against the live cluster: idempotent pre-apply
//! cleanup of prior exam artifacts, namespace ensure, upgrade-or-install with
//! line-by-line progress streaming, stuck-release recovery, and best-effort
//! post-apply verification.
//!
//! State machine per apply request:
//! `Cleaning -> EnsuringNamespace -> Applying -> Verifying -> ok | failed`.
//! Transitions are strictly sequential with no retry between states; a
//! failure terminates the run with a structured error. Individual cleanup
//! sub-steps are independently best-effort and never abort the pass.

use kubeprep_common::{
    is_exam_release, release_namespace, ApplyOutcome, ApplyStage, CleanupReport, ProgressEvent,
    ReleaseStatus, Result, THEMED_NAMESPACES,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::runner::{CommandOutput, CommandRunner};

const STATUS_TIMEOUT_SECS: u64 = 30;
const LIST_TIMEOUT_SECS: u64 = 30;

/// Sends progress events into the caller's channel, mirroring each one into
/// the log. A dropped receiver never fails the run; the events just stop
/// being observed.
#[derive(Clone)]
struct ProgressSink {
    events: mpsc::Sender<ProgressEvent>,
    start: Instant,
}

impl ProgressSink {
    fn new(events: mpsc::Sender<ProgressEvent>) -> Self {
        Self { events, start: Instant::now() }
    }

    fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    async fn emit(&self, event: ProgressEvent) {
        debug!("{}", event.format_human());
        let _ = self.events.send(event).await;
    }

    async fn starting(&self, stage: ApplyStage) {
        self.emit(ProgressEvent::starting(stage, self.elapsed_ms())).await;
    }

    async fn output_line(&self, stage: ApplyStage, line: impl Into<String>) {
        self.emit(ProgressEvent::output_line(stage, line, self.elapsed_ms())).await;
    }

    async fn complete(&self, stage: ApplyStage) {
        self.emit(ProgressEvent::complete(stage, self.elapsed_ms())).await;
    }

    async fn warning(&self, stage: ApplyStage, message: impl Into<String>) {
        let message = message.into();
        warn!("[{stage}] {message}");
        self.emit(ProgressEvent::warning(stage, message, self.elapsed_ms())).await;
    }

    async fn failed(&self, stage: ApplyStage, message: impl Into<String>) {
        let message = message.into();
        error!("[{stage}] {message}");
        self.emit(ProgressEvent::failed(stage, message, self.elapsed_ms())).await;
    }

    async fn finished(&self, release: &str) {
        self.emit(ProgressEvent::finished(release, self.elapsed_ms())).await;
    }
}

pub struct ClusterReconciler {
    config: Config,
    runner: Arc<dyn CommandRunner>,
}

impl ClusterReconciler {
    pub fn new(config: Config, runner: Arc<dyn CommandRunner>) -> Self {
        Self { config, runner }
    }

    /// Remove every prior exam artifact the naming convention can identify.
    ///
    /// Never fails: each sub-step (per release, per namespace) degrades to a
    /// warning in the report. Running against a clean cluster yields an empty
    /// report.
    pub async fn cleanup(&self) -> CleanupReport {
        let mut report = CleanupReport::default();
        self.uninstall_exam_releases(&mut report).await;
        self.clear_stuck_releases(&mut report).await;
        self.delete_exam_namespaces(&mut report).await;
        if report.is_empty() {
            debug!("Cleanup: no prior exam artifacts found");
        } else {
            info!(
                "Cleanup: {} releases, {} stuck cleared, {} namespaces, {} warnings",
                report.releases_removed.len(),
                report.stuck_cleared.len(),
                report.namespaces_deleted.len(),
                report.warnings.len()
            );
        }
        report
    }

    /// Apply a packaged chart. One cleanup pass always precedes the apply,
    /// which is what makes re-invoking `apply` self-healing.
    pub async fn apply(
        &self,
        chart_id: &str,
        archive_path: &Path,
        namespace: &str,
        events: mpsc::Sender<ProgressEvent>,
    ) -> ApplyOutcome {
        let progress = ProgressSink::new(events);
        let mut outcome = ApplyOutcome::new(chart_id, namespace);
        let run_id = Uuid::new_v4();
        info!("Run {run_id}: reconciling '{chart_id}' into {namespace}");

        // Cleaning
        progress.starting(ApplyStage::Cleaning).await;
        let report = self.cleanup().await;
        for warning in &report.warnings {
            progress.warning(ApplyStage::Cleaning, warning).await;
        }
        progress.complete(ApplyStage::Cleaning).await;

        // EnsuringNamespace
        progress.starting(ApplyStage::EnsuringNamespace).await;
        if let Err(message) = self.ensure_namespace(namespace).await {
            outcome.error = Some(message.clone());
            progress.failed(ApplyStage::EnsuringNamespace, message).await;
            return outcome;
        }
        progress.complete(ApplyStage::EnsuringNamespace).await;

        // Applying
        progress.starting(ApplyStage::Applying).await;
        let (line_tx, mut line_rx) = mpsc::channel::<String>(64);
        let relay = {
            let progress = progress.clone();
            tokio::spawn(async move {
                while let Some(line) = line_rx.recv().await {
                    progress.output_line(ApplyStage::Applying, line).await;
                }
            })
        };

        let args: Vec<String> = vec![
            "upgrade".into(),
            "--install".into(),
            chart_id.into(),
            archive_path.to_string_lossy().into_owned(),
            "--namespace".into(),
            namespace.into(),
            "--force".into(),
            "--timeout".into(),
            format!("{}s", self.config.apply_timeout_secs),
        ];
        // Give the process a grace window beyond helm's own timeout.
        let result = self
            .runner
            .run_streaming(
                &self.config.helm_binary,
                &args,
                self.config.apply_timeout_secs + 30,
                line_tx,
            )
            .await;
        let _ = relay.await;

        match result {
            Ok(output) => {
                outcome.stdout = output.stdout.clone();
                outcome.stderr = output.stderr.clone();
                if !output.success() {
                    let message = format!("helm upgrade failed: {}", last_diagnostic(&output));
                    outcome.error = Some(message.clone());
                    progress.failed(ApplyStage::Applying, message).await;
                    return outcome;
                }
                progress.complete(ApplyStage::Applying).await;
            }
            Err(e) => {
                let message = format!("helm upgrade failed: {e}");
                outcome.error = Some(message.clone());
                progress.failed(ApplyStage::Applying, message).await;
                return outcome;
            }
        }

        // Verifying: resources may still be starting, so problems here are
        // warnings, never run failures.
        progress.starting(ApplyStage::Verifying).await;
        if self.config.verify_rollout {
            let mut total = 0u32;
            for themed in THEMED_NAMESPACES {
                match self
                    .kubectl(&["get", "pods", "--namespace", themed, "--no-headers"], LIST_TIMEOUT_SECS)
                    .await
                {
                    Ok(output) if output.success() => {
                        let count =
                            output.stdout.lines().filter(|l| !l.trim().is_empty()).count() as u32;
                        total += count;
                        outcome.pods_seen.insert(themed.to_string(), count);
                    }
                    Ok(output) => {
                        progress
                            .warning(
                                ApplyStage::Verifying,
                                format!("pod listing in {themed}: {}", last_diagnostic(&output)),
                            )
                            .await;
                    }
                    Err(e) => {
                        progress
                            .warning(ApplyStage::Verifying, format!("pod listing in {themed}: {e}"))
                            .await;
                    }
                }
            }
            progress
                .output_line(
                    ApplyStage::Verifying,
                    format!("{total} pods across {} themed namespaces", THEMED_NAMESPACES.len()),
                )
                .await;
        }
        progress.complete(ApplyStage::Verifying).await;

        outcome.succeeded = true;
        progress.finished(chart_id).await;
        info!("Run {run_id}: '{chart_id}' applied");
        outcome
    }

    /// Current release state, from the package manager's point of view.
    pub async fn status(&self, release: &str, namespace: &str) -> Result<ReleaseStatus> {
        let output = self
            .helm(&["status", release, "--namespace", namespace, "-o", "json"], STATUS_TIMEOUT_SECS)
            .await?;
        if !output.success() {
            return Ok(ReleaseStatus::not_installed(release, namespace));
        }

        let parsed: serde_json::Value = serde_json::from_str(&output.stdout)?;
        let status = parsed["info"]["status"].as_str().unwrap_or("unknown").to_string();
        Ok(ReleaseStatus {
            applied: status == "deployed",
            release: release.to_string(),
            namespace: namespace.to_string(),
            status,
        })
    }

    async fn uninstall_exam_releases(&self, report: &mut CleanupReport) {
        let listed = self.helm(&["list", "--all", "--short"], LIST_TIMEOUT_SECS).await;
        let releases = match listed {
            Ok(output) if output.success() => exam_releases(&output.stdout),
            Ok(output) => {
                report.warnings.push(format!("helm list: {}", last_diagnostic(&output)));
                return;
            }
            Err(e) => {
                report.warnings.push(format!("helm list: {e}"));
                return;
            }
        };

        let timeout_arg = format!("{}s", self.config.uninstall_timeout_secs);
        for release in releases {
            let args: [&str; 5] =
                ["uninstall", &release, "--wait", "--timeout", &timeout_arg];
            match self.helm(&args, self.config.uninstall_timeout_secs + 15).await {
                Ok(output) if output.success() => {
                    info!("Uninstalled stale release '{release}'");
                    report.releases_removed.push(release);
                }
                Ok(output) => {
                    report
                        .warnings
                        .push(format!("uninstall {release}: {}", last_diagnostic(&output)));
                }
                Err(e) => report.warnings.push(format!("uninstall {release}: {e}")),
            }
        }
    }

    /// Releases stuck pending or failed sometimes survive a normal uninstall.
    /// Deleting the release metadata Secrets clears them from the package
    /// manager's bookkeeping without touching workload objects.
    async fn clear_stuck_releases(&self, report: &mut CleanupReport) {
        let listed = self
            .helm(&["list", "--short", "--pending", "--failed"], LIST_TIMEOUT_SECS)
            .await;
        let stuck = match listed {
            Ok(output) if output.success() => exam_releases(&output.stdout),
            Ok(output) => {
                report.warnings.push(format!("stuck-release scan: {}", last_diagnostic(&output)));
                return;
            }
            Err(e) => {
                report.warnings.push(format!("stuck-release scan: {e}"));
                return;
            }
        };

        for release in stuck {
            let namespace = release_namespace(&release);
            let selector = format!("owner=helm,name={release}");
            let args: [&str; 7] = [
                "delete",
                "secret",
                "--namespace",
                &namespace,
                "--selector",
                &selector,
                "--ignore-not-found=true",
            ];
            match self.kubectl(&args, self.config.namespace_timeout_secs).await {
                Ok(output) if output.success() && output.stdout.contains("deleted") => {
                    warn!("Cleared stuck release '{release}' by deleting its metadata");
                    report.stuck_cleared.push(release);
                }
                Ok(output) if output.success() => {
                    report.warnings.push(format!(
                        "stuck release {release}: no metadata found in {namespace}"
                    ));
                }
                Ok(output) => {
                    report
                        .warnings
                        .push(format!("stuck release {release}: {}", last_diagnostic(&output)));
                }
                Err(e) => report.warnings.push(format!("stuck release {release}: {e}")),
            }
        }
    }

    async fn delete_exam_namespaces(&self, report: &mut CleanupReport) {
        let mut targets: Vec<String> =
            THEMED_NAMESPACES.iter().map(|ns| ns.to_string()).collect();

        match self.kubectl(&["get", "namespaces", "-o", "name"], LIST_TIMEOUT_SECS).await {
            Ok(output) if output.success() => {
                for line in output.stdout.lines() {
                    if let Some(name) = line.trim().strip_prefix("namespace/") {
                        if name.starts_with("exam-") {
                            targets.push(name.to_string());
                        }
                    }
                }
            }
            Ok(output) => {
                report.warnings.push(format!("namespace listing: {}", last_diagnostic(&output)));
            }
            Err(e) => report.warnings.push(format!("namespace listing: {e}")),
        }

        let timeout_arg = format!("--timeout={}s", self.config.namespace_timeout_secs);
        for namespace in targets {
            let args: [&str; 5] =
                ["delete", "namespace", &namespace, "--ignore-not-found=true", &timeout_arg];
            match self.kubectl(&args, self.config.namespace_timeout_secs + 15).await {
                Ok(output) if output.success() => {
                    // --ignore-not-found succeeds silently for absent
                    // namespaces; only count real deletions.
                    if output.stdout.contains("deleted") {
                        info!("Deleted namespace '{namespace}'");
                        report.namespaces_deleted.push(namespace);
                    }
                }
                Ok(output) => {
                    report
                        .warnings
                        .push(format!("delete namespace {namespace}: {}", last_diagnostic(&output)));
                }
                Err(e) => report.warnings.push(format!("delete namespace {namespace}: {e}")),
            }
        }
    }

    /// Idempotent namespace creation: AlreadyExists is success.
    async fn ensure_namespace(&self, namespace: &str) -> std::result::Result<(), String> {
        match self.kubectl(&["create", "namespace", namespace], self.config.namespace_timeout_secs).await
        {
            Ok(output) if output.success() => Ok(()),
            Ok(output) if output.stderr.contains("AlreadyExists") => {
                debug!("Namespace '{namespace}' already exists");
                Ok(())
            }
            Ok(output) => Err(format!(
                "creating namespace {namespace}: {}",
                last_diagnostic(&output)
            )),
            Err(e) => Err(format!("creating namespace {namespace}: {e}")),
        }
    }

    async fn helm(&self, args: &[&str], timeout_secs: u64) -> Result<CommandOutput> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        self.runner.run(&self.config.helm_binary, &args, timeout_secs).await
    }

    async fn kubectl(&self, args: &[&str], timeout_secs: u64) -> Result<CommandOutput> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        self.runner.run(&self.config.kubectl_binary, &args, timeout_secs).await
    }
}

/// Exam-convention release names from `helm list --short` output.
fn exam_releases(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && is_exam_release(line))
        .map(|line| line.to_string())
        .collect()
}

/// Last meaningful diagnostic from a command: trailing stderr first, then
/// stdout, then the bare exit code.
fn last_diagnostic(output: &CommandOutput) -> String {
    let pick = |text: &str| {
        text.lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
    };
    pick(&output.stderr)
        .or_else(|| pick(&output.stdout))
        .unwrap_or_else(|| format!("exit status {}", output.exit_code))
}
