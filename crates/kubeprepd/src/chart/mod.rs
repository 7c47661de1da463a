//! Chart synthesis.
//!
//! Turns a requirement plan into a named, versioned manifest set laid out as
//! a standard chart (Chart.yaml, templates/, NOTES.txt), packages it into a
//! gzipped tar and caches the archive by chart id. Synthesis is deterministic:
//! the same plan and question set always render byte-identical documents.

mod archive;
pub mod manifests;

use kubeprep_common::{
    chart_id, target_namespace, Question, RequirementPlan, Result, Track, THEMED_NAMESPACES,
};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Chart format version, independent of the crate version.
const CHART_VERSION: &str = "0.1.0";

/// One named document inside a chart.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartDocument {
    /// Path relative to the chart root, e.g. `templates/namespaces.yaml`.
    pub path: String,
    pub content: String,
}

/// An immutable, ordered manifest set for one generation.
///
/// Regeneration produces a new `Chart` under the same id; the synthesizer
/// invalidates the old archive cache entry when that happens.
#[derive(Debug, Clone, PartialEq)]
pub struct Chart {
    pub id: String,
    pub version: String,
    pub documents: Vec<ChartDocument>,
}

impl Chart {
    pub fn document(&self, path: &str) -> Option<&ChartDocument> {
        self.documents.iter().find(|doc| doc.path == path)
    }
}

/// Synthesizer plus the chart-id-keyed archive cache.
pub struct ChartSynthesizer {
    charts_dir: PathBuf,
    archives: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl ChartSynthesizer {
    pub fn new(charts_dir: impl Into<PathBuf>) -> Self {
        Self {
            charts_dir: charts_dir.into(),
            archives: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Build the manifest set for one generation.
    ///
    /// Any previously packaged archive under the same chart id is dropped
    /// first, so a stale download can never outlive a regeneration.
    pub async fn synthesize(
        &self,
        track: Track,
        difficulty: &str,
        plan: &RequirementPlan,
        questions: &[Question],
        practice: bool,
    ) -> Result<Chart> {
        let id = chart_id(track, difficulty, practice);
        self.archives.write().await.remove(&id);

        let chart = build_chart(&id, track, difficulty, plan, questions)?;
        info!("Synthesized chart '{}' with {} documents", chart.id, chart.documents.len());
        Ok(chart)
    }

    /// Package a chart, cache the archive in memory and persist it for the
    /// package manager. Single-writer-wins: whatever was cached before is
    /// replaced unconditionally.
    pub async fn archive(&self, chart: &Chart) -> Result<Vec<u8>> {
        let bytes = archive::package(chart)?;

        tokio::fs::create_dir_all(&self.charts_dir).await?;
        let path = self.archive_path(&chart.id);
        tokio::fs::write(&path, &bytes).await?;

        self.archives.write().await.insert(chart.id.clone(), bytes.clone());
        info!("Packaged '{}' ({} bytes) at {}", chart.id, bytes.len(), path.display());
        Ok(bytes)
    }

    pub async fn cached_archive(&self, chart_id: &str) -> Option<Vec<u8>> {
        self.archives.read().await.get(chart_id).cloned()
    }

    pub async fn clear_cache(&self) {
        self.archives.write().await.clear();
    }

    /// On-disk location of a packaged chart.
    pub fn archive_path(&self, chart_id: &str) -> PathBuf {
        self.charts_dir.join(format!("{chart_id}.tgz"))
    }
}

fn build_chart(
    id: &str,
    track: Track,
    difficulty: &str,
    plan: &RequirementPlan,
    questions: &[Question],
) -> Result<Chart> {
    let mut documents = Vec::new();

    documents.push(ChartDocument {
        path: "Chart.yaml".to_string(),
        content: format!(
            "apiVersion: v2\nname: {id}\ndescription: Generated practice environment for {id}\ntype: application\nversion: {CHART_VERSION}\nappVersion: \"{CHART_VERSION}\"\n"
        ),
    });
    documents.push(ChartDocument {
        path: "values.yaml".to_string(),
        content: "# Charts are fully rendered at synthesis time; there are no tunables.\n"
            .to_string(),
    });

    // Namespace declarations: themed set, every namespace the plan references,
    // the track namespace and the release's target namespace. Collapsed by
    // name, emitted sorted.
    let mut namespaces: BTreeSet<String> =
        THEMED_NAMESPACES.iter().map(|ns| ns.to_string()).collect();
    namespaces.extend(plan.namespaces.iter().cloned());
    namespaces.insert(track.track_namespace());
    namespaces.insert(target_namespace(track, difficulty));
    let namespace_docs: Vec<Value> =
        namespaces.iter().map(|ns| manifests::namespace(ns)).collect();
    documents.push(ChartDocument {
        path: "templates/namespaces.yaml".to_string(),
        content: render_multi(&namespace_docs)?,
    });

    // Exact-match tier: one manifest per parsed prerequisite, so questions
    // that reference a resource by name find exactly that resource.
    for (kind, resources) in &plan.prerequisites {
        for resource in resources {
            let manifest = manifests::prerequisite(*kind, &resource.name, &resource.namespace);
            documents.push(ChartDocument {
                path: format!(
                    "templates/prereq-{kind}-{}-{}.yaml",
                    resource.name, resource.namespace
                ),
                content: render_multi(std::slice::from_ref(&manifest))?,
            });
        }
    }

    // Category-presence tier: a generic resource of each flagged kind in
    // every themed namespace.
    for category in plan.flagged_categories() {
        let mut docs = Vec::new();
        for namespace in THEMED_NAMESPACES {
            docs.extend(manifests::samples(category, namespace));
        }
        documents.push(ChartDocument {
            path: format!("templates/sample-{category}.yaml"),
            content: render_multi(&docs)?,
        });
    }

    // Track-specific layer.
    match track {
        Track::Ckad => {}
        Track::Cka => {
            documents.push(ChartDocument {
                path: "templates/track-admin-rbac.yaml".to_string(),
                content: render_multi(&manifests::admin_rbac(track))?,
            });
        }
        Track::Cks => {
            let policies: Vec<Value> =
                THEMED_NAMESPACES.iter().map(|ns| manifests::deny_all_policy(ns)).collect();
            documents.push(ChartDocument {
                path: "templates/track-deny-all.yaml".to_string(),
                content: render_multi(&policies)?,
            });
        }
        Track::Kcna => {
            documents.push(ChartDocument {
                path: "README.md".to_string(),
                content: format!(
                    "# {id}\n\nConceptual track: this environment carries reference resources\nonly. Work through the selected questions in templates/NOTES.txt and\nexplore the themed namespaces with read-only verbs.\n"
                ),
            });
        }
    }

    // Notes document, always last: the only artifact that tells a learner
    // which questions this environment actually targets.
    documents.push(ChartDocument {
        path: "templates/NOTES.txt".to_string(),
        content: render_notes(id, plan, questions),
    });

    Ok(Chart {
        id: id.to_string(),
        version: CHART_VERSION.to_string(),
        documents,
    })
}

/// Render manifests as one multi-document YAML file.
fn render_multi(docs: &[Value]) -> Result<String> {
    let mut out = String::new();
    for doc in docs {
        out.push_str("---\n");
        out.push_str(&serde_yaml::to_string(doc)?);
    }
    Ok(out)
}

fn render_notes(id: &str, plan: &RequirementPlan, questions: &[Question]) -> String {
    let mut notes = String::new();
    notes.push_str(&format!("Practice environment: {id}\n"));
    notes.push_str(&format!("Selected questions ({}):\n", plan.question_ids.len()));
    for question_id in &plan.question_ids {
        match questions.iter().find(|q| &q.id == question_id) {
            Some(q) if !q.title.is_empty() => {
                notes.push_str(&format!("  - {} ({} pts) {}\n", q.id, q.points, q.title));
            }
            _ => notes.push_str(&format!("  - {question_id}\n")),
        }
    }

    notes.push_str("\nProvisioned categories:\n");
    for category in &kubeprep_common::ResourceCategory::ALL {
        let present = if plan.flag(*category) { "yes" } else { "no" };
        notes.push_str(&format!("  {category}: {present}\n"));
    }

    notes.push_str(&format!("\nNamed prerequisites: {}\n", plan.prerequisite_count()));
    notes.push_str(&format!("Themed namespaces: {}\n", THEMED_NAMESPACES.join(", ")));
    notes
}
