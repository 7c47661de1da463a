//! Requirement plans - the resolver's aggregated view of a question sample.
//!
//! A plan is built once per generation and never mutated afterwards. All
//! collections are B-tree based so that downstream manifest synthesis
//! iterates in a stable order.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Resource categories tracked by presence flags.
///
/// A flagged category guarantees at least one sample resource of that kind in
/// every themed namespace, so category-level kubectl verbs always have
/// something to act on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum ResourceCategory {
    Deployment,
    Service,
    ConfigMap,
    Secret,
    PersistentVolumeClaim,
    NetworkPolicy,
    Rbac,
}

impl ResourceCategory {
    pub const ALL: [ResourceCategory; 7] = [
        ResourceCategory::Deployment,
        ResourceCategory::Service,
        ResourceCategory::ConfigMap,
        ResourceCategory::Secret,
        ResourceCategory::PersistentVolumeClaim,
        ResourceCategory::NetworkPolicy,
        ResourceCategory::Rbac,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceCategory::Deployment => "deployment",
            ResourceCategory::Service => "service",
            ResourceCategory::ConfigMap => "configmap",
            ResourceCategory::Secret => "secret",
            ResourceCategory::PersistentVolumeClaim => "persistentvolumeclaim",
            ResourceCategory::NetworkPolicy => "networkpolicy",
            ResourceCategory::Rbac => "rbac",
        }
    }
}

impl fmt::Display for ResourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resource kinds a prerequisite sentence can name.
///
/// Declaration order is the parser's priority order: the first kind whose
/// pattern matches a sentence wins.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum PrereqKind {
    Deployment,
    ConfigMap,
    Secret,
    ServiceAccount,
    Pod,
    PersistentVolumeClaim,
}

impl PrereqKind {
    pub const ALL: [PrereqKind; 6] = [
        PrereqKind::Deployment,
        PrereqKind::ConfigMap,
        PrereqKind::Secret,
        PrereqKind::ServiceAccount,
        PrereqKind::Pod,
        PrereqKind::PersistentVolumeClaim,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PrereqKind::Deployment => "deployment",
            PrereqKind::ConfigMap => "configmap",
            PrereqKind::Secret => "secret",
            PrereqKind::ServiceAccount => "serviceaccount",
            PrereqKind::Pod => "pod",
            PrereqKind::PersistentVolumeClaim => "pvc",
        }
    }
}

impl fmt::Display for PrereqKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named resource extracted from a prerequisite sentence.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct PrereqResource {
    pub name: String,
    pub namespace: String,
}

/// Aggregated infrastructure requirements for one sampled question set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequirementPlan {
    /// Identifiers of the selected questions, in sample order.
    pub question_ids: Vec<String>,

    /// Union of every namespace referenced by a sampled question.
    pub namespaces: BTreeSet<String>,

    /// Category presence derived from hints and keyword matches.
    pub category_flags: BTreeMap<ResourceCategory, bool>,

    /// Named resources extracted from prerequisite sentences.
    pub prerequisites: BTreeMap<PrereqKind, BTreeSet<PrereqResource>>,
}

impl RequirementPlan {
    /// A plan with every category flag present but false.
    pub fn empty() -> Self {
        let mut plan = RequirementPlan::default();
        for category in ResourceCategory::ALL {
            plan.category_flags.insert(category, false);
        }
        plan
    }

    pub fn is_empty(&self) -> bool {
        self.question_ids.is_empty()
    }

    pub fn flag(&self, category: ResourceCategory) -> bool {
        self.category_flags.get(&category).copied().unwrap_or(false)
    }

    pub fn set_flag(&mut self, category: ResourceCategory) {
        self.category_flags.insert(category, true);
    }

    /// Categories whose flag is set, in stable order.
    pub fn flagged_categories(&self) -> impl Iterator<Item = ResourceCategory> + '_ {
        self.category_flags
            .iter()
            .filter(|(_, set)| **set)
            .map(|(category, _)| *category)
    }

    pub fn add_prerequisite(&mut self, kind: PrereqKind, name: &str, namespace: &str) {
        self.prerequisites.entry(kind).or_default().insert(PrereqResource {
            name: name.to_string(),
            namespace: namespace.to_string(),
        });
    }

    /// Total number of parsed prerequisite resources.
    pub fn prerequisite_count(&self) -> usize {
        self.prerequisites.values().map(BTreeSet::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_plan_has_all_flags_unset() {
        let plan = RequirementPlan::empty();
        assert!(plan.is_empty());
        assert_eq!(plan.category_flags.len(), ResourceCategory::ALL.len());
        assert_eq!(plan.flagged_categories().count(), 0);
    }

    #[test]
    fn prerequisites_dedupe_by_name_and_namespace() {
        let mut plan = RequirementPlan::empty();
        plan.add_prerequisite(PrereqKind::Deployment, "web-deploy", "saturn");
        plan.add_prerequisite(PrereqKind::Deployment, "web-deploy", "saturn");
        plan.add_prerequisite(PrereqKind::Deployment, "web-deploy", "mars");
        assert_eq!(plan.prerequisite_count(), 2);
    }

    #[test]
    fn flagged_categories_iterate_in_declaration_order() {
        let mut plan = RequirementPlan::empty();
        plan.set_flag(ResourceCategory::Rbac);
        plan.set_flag(ResourceCategory::Deployment);
        let flagged: Vec<_> = plan.flagged_categories().collect();
        assert_eq!(flagged, vec![ResourceCategory::Deployment, ResourceCategory::Rbac]);
    }
}
