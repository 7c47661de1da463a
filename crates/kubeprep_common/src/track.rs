//! Certification tracks and the cluster naming conventions derived from them.
//!
//! Release names, chart ids and namespaces are all pure functions of
//! `(track, difficulty, practice)`. Keeping every naming rule in one place is
//! what makes cleanup able to recognize its own artifacts later.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The eight themed namespaces sample resources are spread across.
///
/// Question descriptions reference these by name, so the set is part of the
/// question bank contract and must not change order or content.
pub const THEMED_NAMESPACES: [&str; 8] = [
    "saturn", "venus", "pluto", "mars", "mercury", "jupiter", "uranus", "neptune",
];

/// Namespace used for prerequisites whose owning question declares none.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Chart id / release name suffix for practice mode.
pub const PRACTICE_SUFFIX: &str = "practice";

/// Certification track being practiced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Track {
    /// Application development.
    Ckad,
    /// Cluster administration.
    Cka,
    /// Security.
    Cks,
    /// Conceptual knowledge.
    Kcna,
}

impl Track {
    pub const ALL: [Track; 4] = [Track::Ckad, Track::Cka, Track::Cks, Track::Kcna];

    pub fn as_str(&self) -> &'static str {
        match self {
            Track::Ckad => "ckad",
            Track::Cka => "cka",
            Track::Cks => "cks",
            Track::Kcna => "kcna",
        }
    }

    /// Fixed per-track question count for non-practice exams.
    ///
    /// A lookup table, not a computation; mirrors the real exam sizes.
    pub fn max_questions(&self) -> usize {
        match self {
            Track::Ckad => 19,
            Track::Cka => 17,
            Track::Cks => 16,
            Track::Kcna => 60,
        }
    }

    /// Track-scoped namespace, always created alongside the themed set.
    pub fn track_namespace(&self) -> String {
        format!("exam-{}", self.as_str())
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Track {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ckad" => Ok(Track::Ckad),
            "cka" => Ok(Track::Cka),
            "cks" => Ok(Track::Cks),
            "kcna" => Ok(Track::Kcna),
            other => Err(format!("unknown track '{other}' (expected ckad, cka, cks or kcna)")),
        }
    }
}

/// Chart id for a generation request. Doubles as the helm release name.
pub fn chart_id(track: Track, difficulty: &str, practice: bool) -> String {
    if practice {
        format!("{}-{}-{}", track.as_str(), difficulty, PRACTICE_SUFFIX)
    } else {
        format!("{}-{}", track.as_str(), difficulty)
    }
}

/// Namespace the release itself is installed into.
pub fn target_namespace(track: Track, difficulty: &str) -> String {
    format!("exam-{}-{}", track.as_str(), difficulty)
}

/// Whether a helm release name follows the exam naming convention
/// `<track>-<difficulty>[-variant]`.
///
/// Cleanup uses this to decide which releases it is allowed to touch; it must
/// never match releases the exam system did not create.
pub fn is_exam_release(name: &str) -> bool {
    let mut parts = name.split('-');
    let Some(track) = parts.next() else {
        return false;
    };
    if Track::from_str(track).is_err() {
        return false;
    }
    // At least a difficulty segment, and nothing empty.
    let rest: Vec<&str> = parts.collect();
    !rest.is_empty()
        && rest
            .iter()
            .all(|seg| !seg.is_empty() && seg.chars().all(|c| c.is_ascii_alphanumeric()))
}

/// Namespace a release of the given name was installed into, derived from the
/// naming convention. Practice releases share the non-practice namespace.
pub fn release_namespace(release: &str) -> String {
    let base = release
        .strip_suffix(&format!("-{PRACTICE_SUFFIX}"))
        .unwrap_or(release);
    format!("exam-{base}")
}
