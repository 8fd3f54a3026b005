use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_path: Option<String>,
    pub logging_level: Option<String>,

    // Feature configs
    pub evaluator: Option<EvaluatorConfig>,
    pub trainer: Option<TrainerConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct EvaluatorConfig {
    pub dataset_dir: Option<String>,
    pub file_storage_dir: Option<String>,
    pub poll_interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct TrainerConfig {
    /// Shell-style command line, split into program and arguments.
    pub command: Option<String>,
    /// Extra arguments appended after the ones in `command`.
    pub args: Option<Vec<String>>,
    pub timeout_secs: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_full_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
db_path = "/data/eval.db"
logging_level = "debug"

[evaluator]
dataset_dir = "/data/datasets"
file_storage_dir = "/data/files"
poll_interval_secs = 5

[trainer]
command = "python3 /opt/trainer/train.py"
args = ["--seed", "42"]
timeout_secs = 3600
"#
        )
        .unwrap();

        let config = FileConfig::load(file.path()).unwrap();
        assert_eq!(config.db_path.as_deref(), Some("/data/eval.db"));
        assert_eq!(config.logging_level.as_deref(), Some("debug"));

        let evaluator = config.evaluator.unwrap();
        assert_eq!(evaluator.dataset_dir.as_deref(), Some("/data/datasets"));
        assert_eq!(evaluator.poll_interval_secs, Some(5));

        let trainer = config.trainer.unwrap();
        assert_eq!(
            trainer.command.as_deref(),
            Some("python3 /opt/trainer/train.py")
        );
        assert_eq!(trainer.args, Some(vec!["--seed".to_string(), "42".to_string()]));
        assert_eq!(trainer.timeout_secs, Some(3600));
    }

    #[test]
    fn test_load_empty_config() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let config = FileConfig::load(file.path()).unwrap();
        assert!(config.db_path.is_none());
        assert!(config.evaluator.is_none());
        assert!(config.trainer.is_none());
    }

    #[test]
    fn test_load_errors() {
        assert!(FileConfig::load(Path::new("/nonexistent/config.toml")).is_err());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[evaluator]\npoll_interval_secs = \"often\"").unwrap();
        let err = FileConfig::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
