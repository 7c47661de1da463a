//! Chart synthesis tests: determinism, tier contents, archive caching.

use kubeprep_common::{PrereqKind, Question, RequirementPlan, ResourceCategory, Track, THEMED_NAMESPACES};
use kubeprepd::chart::ChartSynthesizer;
use tempfile::TempDir;

fn plan_with_prereq() -> RequirementPlan {
    let mut plan = RequirementPlan::empty();
    plan.question_ids = vec!["ckad-b-001".to_string(), "ckad-b-002".to_string()];
    plan.namespaces.insert("saturn".to_string());
    plan.set_flag(ResourceCategory::Deployment);
    plan.set_flag(ResourceCategory::NetworkPolicy);
    plan.add_prerequisite(PrereqKind::Deployment, "web-deploy", "saturn");
    plan.add_prerequisite(PrereqKind::Secret, "db-creds", "default");
    plan
}

fn questions() -> Vec<Question> {
    vec![
        serde_json::from_value(serde_json::json!({
            "id": "ckad-b-001",
            "title": "Scale the web deployment",
            "points": 6
        }))
        .unwrap(),
        serde_json::from_value(serde_json::json!({
            "id": "ckad-b-002",
            "title": "Lock down pod traffic",
            "points": 4
        }))
        .unwrap(),
    ]
}

#[tokio::test]
async fn synthesis_is_deterministic() {
    let dir = TempDir::new().unwrap();
    let synthesizer = ChartSynthesizer::new(dir.path());
    let plan = plan_with_prereq();
    let questions = questions();

    let first = synthesizer
        .synthesize(Track::Ckad, "beginner", &plan, &questions, false)
        .await
        .unwrap();
    let second = synthesizer
        .synthesize(Track::Ckad, "beginner", &plan, &questions, false)
        .await
        .unwrap();

    assert_eq!(first.documents.len(), second.documents.len());
    for (a, b) in first.documents.iter().zip(second.documents.iter()) {
        assert_eq!(a.path, b.path);
        assert_eq!(a.content, b.content, "document {} not byte-identical", a.path);
    }

    let archive_a = synthesizer.archive(&first).await.unwrap();
    let archive_b = synthesizer.archive(&second).await.unwrap();
    assert_eq!(archive_a, archive_b);
}

#[tokio::test]
async fn exact_match_tier_emits_named_prerequisites() {
    let dir = TempDir::new().unwrap();
    let synthesizer = ChartSynthesizer::new(dir.path());
    let chart = synthesizer
        .synthesize(Track::Ckad, "beginner", &plan_with_prereq(), &questions(), false)
        .await
        .unwrap();

    let doc = chart
        .document("templates/prereq-deployment-web-deploy-saturn.yaml")
        .expect("prerequisite manifest missing");
    assert!(doc.content.contains("kind: Deployment"));
    assert!(doc.content.contains("name: web-deploy"));
    assert!(doc.content.contains("namespace: saturn"));

    let secret = chart
        .document("templates/prereq-secret-db-creds-default.yaml")
        .expect("secret prerequisite missing");
    assert!(secret.content.contains("kind: Secret"));
    assert!(secret.content.contains("namespace: default"));
}

#[tokio::test]
async fn category_tier_covers_every_themed_namespace() {
    let dir = TempDir::new().unwrap();
    let synthesizer = ChartSynthesizer::new(dir.path());
    let chart = synthesizer
        .synthesize(Track::Ckad, "beginner", &plan_with_prereq(), &questions(), false)
        .await
        .unwrap();

    let samples = chart.document("templates/sample-deployment.yaml").unwrap();
    for themed in THEMED_NAMESPACES {
        assert!(
            samples.content.contains(&format!("namespace: {themed}")),
            "no sample deployment in {themed}"
        );
    }

    // Unflagged categories emit no sample file at all.
    assert!(chart.document("templates/sample-secret.yaml").is_none());
}

#[tokio::test]
async fn notes_pass_question_metadata_through() {
    let dir = TempDir::new().unwrap();
    let synthesizer = ChartSynthesizer::new(dir.path());
    let chart = synthesizer
        .synthesize(Track::Ckad, "beginner", &plan_with_prereq(), &questions(), false)
        .await
        .unwrap();

    let notes = chart.documents.last().unwrap();
    assert_eq!(notes.path, "templates/NOTES.txt");
    assert!(notes.content.contains("ckad-b-001 (6 pts) Scale the web deployment"));
    assert!(notes.content.contains("ckad-b-002 (4 pts) Lock down pod traffic"));
    assert!(notes.content.contains("networkpolicy: yes"));
    assert!(notes.content.contains("rbac: no"));
}

#[tokio::test]
async fn archive_cache_replaces_on_regeneration() {
    let dir = TempDir::new().unwrap();
    let synthesizer = ChartSynthesizer::new(dir.path());
    let questions = questions();

    let mut plan = plan_with_prereq();
    let chart = synthesizer
        .synthesize(Track::Ckad, "beginner", &plan, &questions, false)
        .await
        .unwrap();
    let first = synthesizer.archive(&chart).await.unwrap();
    assert_eq!(synthesizer.cached_archive("ckad-beginner").await.unwrap(), first);

    // Regenerate with a different plan under the same chart id.
    plan.question_ids.push("ckad-b-003".to_string());
    plan.set_flag(ResourceCategory::Service);
    let chart = synthesizer
        .synthesize(Track::Ckad, "beginner", &plan, &questions, false)
        .await
        .unwrap();
    // Synthesis alone already dropped the stale cache entry.
    assert!(synthesizer.cached_archive("ckad-beginner").await.is_none());

    let second = synthesizer.archive(&chart).await.unwrap();
    assert_ne!(first, second);
    assert_eq!(synthesizer.cached_archive("ckad-beginner").await.unwrap(), second);
}

#[tokio::test]
async fn explicit_cache_clear_forgets_archives() {
    let dir = TempDir::new().unwrap();
    let synthesizer = ChartSynthesizer::new(dir.path());
    let chart = synthesizer
        .synthesize(Track::Ckad, "beginner", &plan_with_prereq(), &questions(), false)
        .await
        .unwrap();
    synthesizer.archive(&chart).await.unwrap();
    assert!(synthesizer.cached_archive("ckad-beginner").await.is_some());

    synthesizer.clear_cache().await;
    assert!(synthesizer.cached_archive("ckad-beginner").await.is_none());
}

#[tokio::test]
async fn packaged_archive_lands_on_disk_for_the_package_manager() {
    let dir = TempDir::new().unwrap();
    let synthesizer = ChartSynthesizer::new(dir.path());
    let chart = synthesizer
        .synthesize(Track::Cks, "advanced", &plan_with_prereq(), &questions(), true)
        .await
        .unwrap();
    assert_eq!(chart.id, "cks-advanced-practice");

    synthesizer.archive(&chart).await.unwrap();
    let path = synthesizer.archive_path(&chart.id);
    assert!(path.exists());
    assert!(std::fs::metadata(&path).unwrap().len() > 0);
}
