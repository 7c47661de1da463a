//! Configuration for kubeprepd.
//!
//! Loads settings from /etc/kubeprep/config.toml or uses defaults. Every
//! field has a serde default so a partial file is fine.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Config file path
pub const CONFIG_PATH: &str = "/etc/kubeprep/config.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root of the question bank tree (one subdirectory per track).
    #[serde(default = "default_question_bank_dir")]
    pub question_bank_dir: PathBuf,

    /// Working directory for packaged charts.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Package manager binary.
    #[serde(default = "default_helm_binary")]
    pub helm_binary: String,

    /// Cluster CLI binary.
    #[serde(default = "default_kubectl_binary")]
    pub kubectl_binary: String,

    /// Timeout for the upgrade-or-install operation, seconds.
    #[serde(default = "default_apply_timeout")]
    pub apply_timeout_secs: u64,

    /// Per-release uninstall timeout during cleanup, seconds.
    #[serde(default = "default_uninstall_timeout")]
    pub uninstall_timeout_secs: u64,

    /// Per-namespace deletion timeout during cleanup, seconds.
    #[serde(default = "default_namespace_timeout")]
    pub namespace_timeout_secs: u64,

    /// Whether to count pods per themed namespace after a successful apply.
    #[serde(default = "default_verify_rollout")]
    pub verify_rollout: bool,
}

fn default_question_bank_dir() -> PathBuf {
    PathBuf::from("/var/lib/kubeprep/question-bank")
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/kubeprep")
}

fn default_helm_binary() -> String {
    "helm".to_string()
}

fn default_kubectl_binary() -> String {
    "kubectl".to_string()
}

fn default_apply_timeout() -> u64 {
    120
}

fn default_uninstall_timeout() -> u64 {
    60
}

fn default_namespace_timeout() -> u64 {
    60
}

fn default_verify_rollout() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            question_bank_dir: default_question_bank_dir(),
            data_dir: default_data_dir(),
            helm_binary: default_helm_binary(),
            kubectl_binary: default_kubectl_binary(),
            apply_timeout_secs: default_apply_timeout(),
            uninstall_timeout_secs: default_uninstall_timeout(),
            namespace_timeout_secs: default_namespace_timeout(),
            verify_rollout: default_verify_rollout(),
        }
    }
}

impl Config {
    /// Load from [`CONFIG_PATH`], falling back to defaults when the file is
    /// missing or unparseable. A bad config file is a warning, not a fatal
    /// error.
    pub fn load() -> Self {
        Self::load_from(Path::new(CONFIG_PATH))
    }

    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(raw) => match toml::from_str::<Config>(&raw) {
                Ok(config) => {
                    info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    warn!("Invalid config at {}: {}. Using defaults.", path.display(), e);
                    Config::default()
                }
            },
            Err(_) => {
                info!("No config at {}, using defaults", path.display());
                Config::default()
            }
        }
    }

    /// Directory packaged chart archives are written to.
    pub fn charts_dir(&self) -> PathBuf {
        self.data_dir.join("charts")
    }

}
