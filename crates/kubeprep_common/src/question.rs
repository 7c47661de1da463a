//! Question bank records.
//!
//! The on-disk format is owned by the question bank tooling; this crate only
//! models the fields the provisioner reads. Everything else in a record
//! (solution steps, validations, time limits per step) is ignored on
//! deserialization and never round-tripped.

use serde::{Deserialize, Serialize};

/// Infrastructure requirements attached to a question.
///
/// `prerequisites` holds free-text sentences of the form
/// `"<name> <kind> exists"`; parsing them is the resolver's job, the record
/// just carries them verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Infrastructure {
    /// Namespaces the question expects to work in.
    #[serde(default)]
    pub namespaces: Vec<String>,

    /// Resource category hints, e.g. "deployments", "configmaps".
    #[serde(default)]
    pub resources: Vec<String>,

    /// Free-text prerequisite sentences.
    #[serde(default)]
    pub prerequisites: Vec<String>,
}

/// A single exam question as stored in the bank.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub difficulty: String,

    #[serde(default)]
    pub category: String,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub points: u32,

    #[serde(default)]
    pub time_limit: u32,

    #[serde(default)]
    pub infrastructure: Infrastructure,
}

impl Question {
    /// First namespace declared by the question, if any.
    ///
    /// Prerequisite resources land in this namespace; questions that declare
    /// none fall back to [`crate::track::DEFAULT_NAMESPACE`].
    pub fn primary_namespace(&self) -> Option<&str> {
        self.infrastructure
            .namespaces
            .iter()
            .map(String::as_str)
            .find(|ns| !ns.is_empty())
    }
}
