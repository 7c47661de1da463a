//! Question store adapter.
//!
//! Reads question records from the directory-structured bank:
//! `<bank>/<track>/**/*.json`, one record per file. The bank is an external,
//! read-only data source; a bad record is skipped with a log line and never
//! fails a whole listing.

use kubeprep_common::{Question, Track};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct QuestionStore {
    bank_dir: PathBuf,
}

impl QuestionStore {
    pub fn new(bank_dir: impl Into<PathBuf>) -> Self {
        Self { bank_dir: bank_dir.into() }
    }

    /// All questions for a track and difficulty, sorted by id.
    ///
    /// The walk covers the whole track subtree so both layouts work: one
    /// directory per difficulty, or a flat directory with the difficulty only
    /// in the record. Filtering is always record-driven.
    pub fn list_candidates(&self, track: Track, difficulty: &str) -> Vec<Question> {
        let root = self.bank_dir.join(track.as_str());
        if !root.is_dir() {
            warn!("Question bank has no '{}' directory at {}", track, root.display());
            return Vec::new();
        }

        let mut candidates = Vec::new();
        for entry in WalkDir::new(&root).into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|e| e.to_str()) != Some("json")
            {
                continue;
            }
            match read_question(path) {
                Ok(question) => {
                    if question.difficulty.eq_ignore_ascii_case(difficulty) {
                        candidates.push(question);
                    }
                }
                Err(e) => {
                    warn!("Skipping unreadable question {}: {e:#}", path.display());
                }
            }
        }

        // Stable base order; the resolver shuffles on top of this.
        candidates.sort_by(|a, b| a.id.cmp(&b.id));
        debug!("Question bank: {} candidates for {}/{}", candidates.len(), track, difficulty);
        candidates
    }
}

fn read_question(path: &Path) -> anyhow::Result<Question> {
    let raw = fs::read_to_string(path)?;
    let question: Question = serde_json::from_str(&raw)?;
    if question.id.is_empty() {
        anyhow::bail!("record has no id");
    }
    Ok(question)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_question(dir: &Path, id: &str, difficulty: &str) {
        let record = serde_json::json!({
            "id": id,
            "title": format!("Question {id}"),
            "difficulty": difficulty,
            "infrastructure": { "namespaces": ["saturn"] }
        });
        fs::write(dir.join(format!("{id}.json")), record.to_string()).unwrap();
    }

    #[test]
    fn lists_only_matching_difficulty() {
        let tmp = tempfile::tempdir().unwrap();
        let ckad = tmp.path().join("ckad");
        fs::create_dir_all(&ckad).unwrap();
        write_question(&ckad, "ckad-b-1", "beginner");
        write_question(&ckad, "ckad-b-2", "beginner");
        write_question(&ckad, "ckad-i-1", "intermediate");

        let store = QuestionStore::new(tmp.path());
        let beginners = store.list_candidates(Track::Ckad, "beginner");
        assert_eq!(beginners.len(), 2);
        assert!(beginners.iter().all(|q| q.difficulty == "beginner"));
    }

    #[test]
    fn malformed_record_is_skipped_not_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let cka = tmp.path().join("cka");
        fs::create_dir_all(&cka).unwrap();
        write_question(&cka, "cka-b-1", "beginner");
        fs::write(cka.join("broken.json"), "{ not json").unwrap();
        fs::write(cka.join("no-id.json"), "{}").unwrap();

        let store = QuestionStore::new(tmp.path());
        let candidates = store.list_candidates(Track::Cka, "beginner");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, "cka-b-1");
    }

    #[test]
    fn missing_track_directory_is_empty_pool() {
        let tmp = tempfile::tempdir().unwrap();
        let store = QuestionStore::new(tmp.path());
        assert!(store.list_candidates(Track::Cks, "advanced").is_empty());
    }

    #[test]
    fn candidates_come_back_sorted_by_id() {
        let tmp = tempfile::tempdir().unwrap();
        let kcna = tmp.path().join("kcna");
        fs::create_dir_all(&kcna).unwrap();
        write_question(&kcna, "kcna-b-3", "beginner");
        write_question(&kcna, "kcna-b-1", "beginner");
        write_question(&kcna, "kcna-b-2", "beginner");

        let store = QuestionStore::new(tmp.path());
        let ids: Vec<String> = store
            .list_candidates(Track::Kcna, "beginner")
            .into_iter()
            .map(|q| q.id)
            .collect();
        assert_eq!(ids, vec!["kcna-b-1", "kcna-b-2", "kcna-b-3"]);
    }
}
