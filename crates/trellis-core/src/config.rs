use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrellisError};

/// Runtime configuration for the workflow dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Run-level deadline. A run that has not drained its worklist by then
    /// is reported incomplete rather than left hanging.
    #[serde(default = "default_run_deadline_secs")]
    pub run_deadline_secs: u64,

    /// Most recent conversation turns loaded before a run starts.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_run_deadline_secs() -> u64 {
    60
}

fn default_history_limit() -> usize {
    50
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            run_deadline_secs: default_run_deadline_secs(),
            history_limit: default_history_limit(),
        }
    }
}

impl WorkflowConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| TrellisError::ConfigNotFound(path.display().to_string()))?;

        toml::from_str(&content).map_err(|e| TrellisError::Config(e.to_string()))
    }

    pub fn run_deadline(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.run_deadline_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = WorkflowConfig::default();
        assert_eq!(config.run_deadline_secs, 60);
        assert_eq!(config.history_limit, 50);
    }

    #[test]
    fn test_load_from_file() {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(b"run_deadline_secs = 5\nhistory_limit = 10\n")
            .expect("write toml");

        let config = WorkflowConfig::load(tmp.path()).expect("load config");
        assert_eq!(config.run_deadline_secs, 5);
        assert_eq!(config.history_limit, 10);
    }

    #[test]
    fn test_load_partial_file_uses_defaults() {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(b"run_deadline_secs = 120\n").expect("write toml");

        let config = WorkflowConfig::load(tmp.path()).expect("load config");
        assert_eq!(config.run_deadline_secs, 120);
        assert_eq!(config.history_limit, 50);
    }

    #[test]
    fn test_load_missing_file() {
        let err = WorkflowConfig::load(Path::new("/nonexistent/trellis.toml")).unwrap_err();
        assert!(matches!(err, TrellisError::ConfigNotFound(_)));
    }
}
