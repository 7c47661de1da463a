//! Requirement resolver.
//!
//! Samples a bounded subset of questions for a track/difficulty, then
//! aggregates their infrastructure needs into a single [`RequirementPlan`]:
//! namespace union, category presence flags, and named resources parsed out
//! of free-text prerequisite sentences.
//!
//! Samples are cached per (track, difficulty, practice) so that every read
//! within one generation observes the same selected set. The engine
//! invalidates the cache at the start of each generation, which is what makes
//! successive generations re-sample.

use kubeprep_common::{
    PrereqKind, Question, RequirementPlan, ResourceCategory, Track, DEFAULT_NAMESPACE,
};
use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::store::QuestionStore;

/// Case-insensitive keyword table per category. A hit in a question's title,
/// description or tags sets the category flag.
const CATEGORY_KEYWORDS: &[(ResourceCategory, &[&str])] = &[
    (ResourceCategory::Deployment, &["deployment", "deploy", "rollout", "replica", "scale"]),
    (ResourceCategory::Service, &["service", "svc", "expose", "endpoint"]),
    (ResourceCategory::ConfigMap, &["configmap", "config map"]),
    (ResourceCategory::Secret, &["secret"]),
    (ResourceCategory::PersistentVolumeClaim, &["pvc", "persistent volume", "volume", "storage"]),
    (ResourceCategory::NetworkPolicy, &["network", "netpol"]),
    (ResourceCategory::Rbac, &["rbac", "role", "serviceaccount", "service account", "permission"]),
];

/// Stems matched against explicit resource hints ("deployments",
/// "rolebindings", ...). Hints use plural API names, so substring stems.
const HINT_STEMS: &[(ResourceCategory, &[&str])] = &[
    (ResourceCategory::Deployment, &["deployment"]),
    (ResourceCategory::Service, &["service"]),
    (ResourceCategory::ConfigMap, &["configmap"]),
    (ResourceCategory::Secret, &["secret"]),
    (ResourceCategory::PersistentVolumeClaim, &["persistentvolumeclaim", "pvc"]),
    (ResourceCategory::NetworkPolicy, &["networkpolic", "netpol"]),
    (ResourceCategory::Rbac, &["rbac", "role", "serviceaccount"]),
];

/// Prerequisite patterns of the form `<name> <kind-keyword> exists`, tried in
/// [`PrereqKind`] priority order; the first match wins.
static PREREQ_PATTERNS: Lazy<Vec<(PrereqKind, Regex)>> = Lazy::new(|| {
    let table: [(PrereqKind, &str); 6] = [
        (PrereqKind::Deployment, r"(?i)\b([a-z0-9][a-z0-9.-]*)\s+deployment\s+exists"),
        (PrereqKind::ConfigMap, r"(?i)\b([a-z0-9][a-z0-9.-]*)\s+(?:configmap|config\s+map)\s+exists"),
        (PrereqKind::Secret, r"(?i)\b([a-z0-9][a-z0-9.-]*)\s+secret\s+exists"),
        (PrereqKind::ServiceAccount, r"(?i)\b([a-z0-9][a-z0-9.-]*)\s+(?:serviceaccount|service\s+account)\s+exists"),
        (PrereqKind::Pod, r"(?i)\b([a-z0-9][a-z0-9.-]*)\s+pod\s+exists"),
        (
            PrereqKind::PersistentVolumeClaim,
            r"(?i)\b([a-z0-9][a-z0-9.-]*)\s+(?:pvc|persistentvolumeclaim|persistent\s+volume\s+claim)\s+exists",
        ),
    ];
    table
        .into_iter()
        .map(|(kind, pattern)| {
            // The patterns are compile-time constants; a bad one is a bug.
            (kind, Regex::new(pattern).unwrap())
        })
        .collect()
});

type SampleKey = (Track, String, bool);

pub struct RequirementResolver {
    store: QuestionStore,
    samples: Arc<RwLock<HashMap<SampleKey, Vec<Question>>>>,
}

impl RequirementResolver {
    pub fn new(store: QuestionStore) -> Self {
        Self { store, samples: Arc::new(RwLock::new(HashMap::new())) }
    }

    /// Drop cached samples for both practice variants of a track/difficulty.
    ///
    /// Called at the start of every generation so each generated chart sees a
    /// fresh random sample.
    pub async fn invalidate(&self, track: Track, difficulty: &str) {
        let mut samples = self.samples.write().await;
        samples.remove(&(track, difficulty.to_string(), false));
        samples.remove(&(track, difficulty.to_string(), true));
    }

    /// Resolve the requirement plan for one generation.
    ///
    /// An empty candidate pool yields an empty plan, never an error; the
    /// caller decides what "nothing to synthesize" means.
    pub async fn resolve(&self, track: Track, difficulty: &str, practice: bool) -> RequirementPlan {
        let questions = self.sample(track, difficulty, practice).await;
        if questions.is_empty() {
            warn!("No '{}' candidates for {}; resolving an empty plan", difficulty, track);
            return RequirementPlan::empty();
        }
        let plan = build_plan(&questions);
        info!(
            "Resolved {} questions into {} namespaces, {} prerequisites for {}/{}",
            plan.question_ids.len(),
            plan.namespaces.len(),
            plan.prerequisite_count(),
            track,
            difficulty
        );
        plan
    }

    /// The sampled question set behind the current plan, for the notes
    /// document and diagnostics.
    pub async fn sampled_questions(
        &self,
        track: Track,
        difficulty: &str,
        practice: bool,
    ) -> Vec<Question> {
        self.sample(track, difficulty, practice).await
    }

    async fn sample(&self, track: Track, difficulty: &str, practice: bool) -> Vec<Question> {
        let key = (track, difficulty.to_string(), practice);
        if let Some(hit) = self.samples.read().await.get(&key) {
            return hit.clone();
        }

        let mut pool = self.store.list_candidates(track, difficulty);
        if !practice {
            // Uniform shuffle, then truncate to the track's fixed count.
            pool.shuffle(&mut rand::thread_rng());
            pool.truncate(track.max_questions());
        }

        self.samples.write().await.insert(key, pool.clone());
        pool
    }
}

/// Aggregate a sampled question set into a plan.
fn build_plan(questions: &[Question]) -> RequirementPlan {
    let mut plan = RequirementPlan::empty();

    for question in questions {
        plan.question_ids.push(question.id.clone());

        for namespace in &question.infrastructure.namespaces {
            if !namespace.is_empty() {
                plan.namespaces.insert(namespace.clone());
            }
        }

        detect_categories(question, &mut plan);

        let namespace = question.primary_namespace().unwrap_or(DEFAULT_NAMESPACE);
        for sentence in &question.infrastructure.prerequisites {
            match parse_prerequisite(sentence) {
                Some((kind, name)) => plan.add_prerequisite(kind, &name, namespace),
                None => {
                    debug!("Dropping unparseable prerequisite of {}: '{}'", question.id, sentence);
                }
            }
        }
    }

    plan
}

/// OR category flags in from explicit hints and free-text keyword matches.
fn detect_categories(question: &Question, plan: &mut RequirementPlan) {
    let haystack = format!(
        "{} {} {}",
        question.title,
        question.description,
        question.tags.join(" ")
    )
    .to_lowercase();

    for (category, keywords) in CATEGORY_KEYWORDS {
        if keywords.iter().any(|kw| haystack.contains(kw)) {
            plan.set_flag(*category);
        }
    }

    for hint in &question.infrastructure.resources {
        let hint = hint.to_lowercase();
        for (category, stems) in HINT_STEMS {
            if stems.iter().any(|stem| hint.contains(stem)) {
                plan.set_flag(*category);
            }
        }
    }
}

/// Parse one prerequisite sentence into `(kind, name)`.
///
/// Sentences that match no pattern are dropped by the caller with a
/// diagnostic; a malformed prerequisite is never fatal.
fn parse_prerequisite(sentence: &str) -> Option<(PrereqKind, String)> {
    for (kind, pattern) in PREREQ_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(sentence) {
            let name = caps.get(1)?.as_str().to_lowercase();
            return Some((*kind, name));
        }
    }
    None
}
