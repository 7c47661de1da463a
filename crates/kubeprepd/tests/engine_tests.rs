//! End-to-end engine tests: generate, download, apply-stream and the cache
//! invalidation guarantees, all against an on-disk bank fixture and a
//! scripted cluster.

use flate2::read::GzDecoder;
use kubeprep_common::{ProgressEventType, Track};
use kubeprepd::config::Config;
use kubeprepd::engine::ProvisionEngine;
use kubeprepd::runner::{CommandOutput, ScriptedRunner};
use std::fs;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_stream::StreamExt;

fn write_question(bank: &Path, track: &str, id: &str, record: serde_json::Value) {
    let dir = bank.join(track);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(format!("{id}.json")), record.to_string()).unwrap();
}

/// 30 ckad beginner questions; `with_prereq` of them assert that the
/// `web-deploy` deployment exists in saturn. Sampling takes 19 of 30, so any
/// value of `with_prereq` greater than 11 makes selection of at least one
/// prerequisite-carrying question certain.
fn seed_ckad_bank(bank: &Path, with_prereq: usize) {
    for i in 0..30 {
        let mut record = serde_json::json!({
            "id": format!("ckad-b-{i:03}"),
            "title": format!("Exercise {i}"),
            "difficulty": "beginner",
            "points": 4,
            "infrastructure": { "namespaces": ["saturn"] }
        });
        if i < with_prereq {
            record["infrastructure"]["prerequisites"] =
                serde_json::json!(["web-deploy deployment exists"]);
        }
        write_question(bank, "ckad", &format!("ckad-b-{i:03}"), record);
    }
}

fn engine(root: &TempDir) -> ProvisionEngine {
    let config = Config {
        question_bank_dir: root.path().join("bank"),
        data_dir: root.path().join("data"),
        ..Config::default()
    };
    ProvisionEngine::with_runner(config, Arc::new(ScriptedRunner::new()))
}

fn engine_with_runner(root: &TempDir, runner: Arc<ScriptedRunner>) -> ProvisionEngine {
    let config = Config {
        question_bank_dir: root.path().join("bank"),
        data_dir: root.path().join("data"),
        ..Config::default()
    };
    ProvisionEngine::with_runner(config, runner)
}

/// Extract one file from a packaged chart archive.
fn read_archived_file(bytes: &[u8], path: &str) -> Option<String> {
    let mut archive = tar::Archive::new(GzDecoder::new(bytes));
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        if entry.path().unwrap().to_string_lossy() == path {
            let mut content = String::new();
            entry.read_to_string(&mut content).unwrap();
            return Some(content);
        }
    }
    None
}

#[tokio::test]
async fn generated_environment_satisfies_named_prerequisites() {
    let root = TempDir::new().unwrap();
    seed_ckad_bank(&root.path().join("bank"), 12);

    let engine = engine(&root);
    let chart_id = engine.generate(Track::Ckad, "beginner", false).await.unwrap();
    assert_eq!(chart_id, "ckad-beginner");

    let bytes = engine.download_archive(&chart_id).await.unwrap();
    let manifest =
        read_archived_file(&bytes, "ckad-beginner/templates/prereq-deployment-web-deploy-saturn.yaml")
            .expect("web-deploy prerequisite manifest missing from archive");
    assert!(manifest.contains("kind: Deployment"));
    assert!(manifest.contains("name: web-deploy"));
    assert!(manifest.contains("namespace: saturn"));
}

#[tokio::test]
async fn regeneration_reselects_and_replaces_the_archive() {
    let root = TempDir::new().unwrap();
    seed_ckad_bank(&root.path().join("bank"), 0);

    let engine = engine(&root);
    let chart_id = engine.generate(Track::Ckad, "beginner", false).await.unwrap();
    let first = engine.download_archive(&chart_id).await.unwrap();
    let first_notes = read_archived_file(&first, "ckad-beginner/templates/NOTES.txt").unwrap();

    // 19 of 30 in a fresh random order: one retry loop keeps the test
    // deterministic in practice.
    let mut changed = false;
    for _ in 0..5 {
        engine.generate(Track::Ckad, "beginner", false).await.unwrap();
        let next = engine.download_archive(&chart_id).await.unwrap();
        let next_notes = read_archived_file(&next, "ckad-beginner/templates/NOTES.txt").unwrap();
        if next_notes != first_notes {
            assert_ne!(first, next, "notes differ but archive bytes did not");
            changed = true;
            break;
        }
    }
    assert!(changed, "five regenerations never changed the selected question set");
}

#[tokio::test]
async fn download_unknown_chart_is_a_structured_error() {
    let root = TempDir::new().unwrap();
    let engine = engine(&root);
    let err = engine.download_archive("cka-advanced").await.unwrap_err();
    assert!(err.to_string().contains("cka-advanced"));
}

#[tokio::test]
async fn practice_mode_takes_the_whole_pool_under_a_suffixed_id() {
    let root = TempDir::new().unwrap();
    seed_ckad_bank(&root.path().join("bank"), 0);

    let engine = engine(&root);
    let chart_id = engine.generate(Track::Ckad, "beginner", true).await.unwrap();
    assert_eq!(chart_id, "ckad-beginner-practice");

    let bytes = engine.download_archive(&chart_id).await.unwrap();
    let notes =
        read_archived_file(&bytes, "ckad-beginner-practice/templates/NOTES.txt").unwrap();
    assert!(notes.contains("Selected questions (30)"));
}

#[tokio::test]
async fn empty_bank_still_generates_a_baseline_chart() {
    let root = TempDir::new().unwrap();
    fs::create_dir_all(root.path().join("bank")).unwrap();

    let engine = engine(&root);
    let chart_id = engine.generate(Track::Kcna, "advanced", false).await.unwrap();
    let bytes = engine.download_archive(&chart_id).await.unwrap();

    let notes = read_archived_file(&bytes, "kcna-advanced/templates/NOTES.txt").unwrap();
    assert!(notes.contains("Selected questions (0)"));
    // Themed namespaces are emitted even with nothing to synthesize.
    let namespaces =
        read_archived_file(&bytes, "kcna-advanced/templates/namespaces.yaml").unwrap();
    assert!(namespaces.contains("name: saturn"));
}

#[tokio::test]
async fn apply_stream_reaches_a_terminal_event() {
    let root = TempDir::new().unwrap();
    seed_ckad_bank(&root.path().join("bank"), 0);

    let runner = Arc::new(ScriptedRunner::new());
    runner.respond("helm list", CommandOutput::ok(""));
    runner.respond("kubectl get namespaces", CommandOutput::ok(""));
    runner.respond("kubectl delete namespace", CommandOutput::ok(""));
    runner.respond("kubectl create namespace", CommandOutput::ok("created"));
    runner.respond("helm upgrade", CommandOutput::ok("STATUS: deployed"));
    runner.respond("kubectl get pods", CommandOutput::ok("web-1 1/1 Running\n"));

    let engine = engine_with_runner(&root, runner.clone());
    let mut stream = engine.apply_stream(Track::Ckad, "beginner", false);

    let mut events = Vec::new();
    while let Some(event) = stream.next().await {
        events.push(event);
    }

    assert!(!events.is_empty());
    let last = events.last().unwrap();
    assert!(
        matches!(&last.event, ProgressEventType::Finished { release } if release == "ckad-beginner"),
        "unexpected terminal event: {last:?}"
    );

    // The chart generated for this stream was handed to helm.
    let upgrade = runner
        .calls()
        .into_iter()
        .find(|c| c.starts_with("helm upgrade"))
        .expect("helm upgrade never invoked");
    assert!(upgrade.contains("ckad-beginner.tgz"));
    assert!(upgrade.contains("--namespace exam-ckad-beginner"));
}

#[tokio::test]
async fn apply_stream_reuses_the_previously_generated_chart() {
    let root = TempDir::new().unwrap();
    seed_ckad_bank(&root.path().join("bank"), 0);

    let runner = Arc::new(ScriptedRunner::new());
    runner.respond("helm list", CommandOutput::ok(""));
    runner.respond("kubectl get namespaces", CommandOutput::ok(""));
    runner.respond("kubectl delete namespace", CommandOutput::ok(""));
    runner.respond("kubectl create namespace", CommandOutput::ok("created"));
    runner.respond("helm upgrade", CommandOutput::ok("STATUS: deployed"));
    runner.respond("kubectl get pods", CommandOutput::ok(""));

    let engine = engine_with_runner(&root, runner);
    let chart_id = engine.generate(Track::Ckad, "beginner", false).await.unwrap();
    let before = engine.download_archive(&chart_id).await.unwrap();

    let mut stream = engine.apply_stream(Track::Ckad, "beginner", false);
    while let Some(_event) = stream.next().await {}

    // Applying did not regenerate: the learner gets the environment that was
    // shown to them.
    let after = engine.download_archive(&chart_id).await.unwrap();
    assert_eq!(before, after);
}
