mod file_config;

pub use file_config::{EvaluatorConfig, FileConfig, TrainerConfig};

use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Seconds the worker sleeps when the queue is empty.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_DATASET_DIR: &str = "./datasets";
pub const DEFAULT_FILE_STORAGE_DIR: &str = "./files";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LoggingLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<LoggingLevel> for LevelFilter {
    fn from(level: LoggingLevel) -> Self {
        match level {
            LoggingLevel::Error => LevelFilter::ERROR,
            LoggingLevel::Warn => LevelFilter::WARN,
            LoggingLevel::Info => LevelFilter::INFO,
            LoggingLevel::Debug => LevelFilter::DEBUG,
            LoggingLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub dataset_dir: Option<PathBuf>,
    pub file_storage_dir: Option<PathBuf>,
    pub poll_interval_secs: Option<u64>,
    pub trainer_command: Option<String>,
    pub trainer_timeout_secs: Option<u64>,
    pub logging_level: LoggingLevel,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub logging_level: LoggingLevel,
    pub evaluator: EvaluatorSettings,
    /// Only the worker needs a trainer.
    pub trainer: Option<TrainerSettings>,
}

#[derive(Debug, Clone)]
pub struct EvaluatorSettings {
    /// Parent of the per-job project directories.
    pub dataset_dir: PathBuf,
    /// Training history files are kept under `<file_storage_dir>/history`.
    pub file_storage_dir: PathBuf,
    pub poll_interval_secs: u64,
}

impl EvaluatorSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Default for EvaluatorSettings {
    fn default() -> Self {
        Self {
            dataset_dir: PathBuf::from(DEFAULT_DATASET_DIR),
            file_storage_dir: PathBuf::from(DEFAULT_FILE_STORAGE_DIR),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainerSettings {
    pub command: String,
    pub args: Vec<String>,
    pub timeout_secs: Option<u64>,
}

impl TrainerSettings {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_path must be specified via --db-path or in config file")
            })?;
        if db_path.is_dir() {
            bail!("db_path is a directory: {:?}", db_path);
        }
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.is_dir() {
                bail!("Database directory does not exist: {:?}", parent);
            }
        }

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or(cli.logging_level);

        let evaluator_file = file.evaluator.unwrap_or_default();
        let defaults = EvaluatorSettings::default();
        let evaluator = EvaluatorSettings {
            dataset_dir: evaluator_file
                .dataset_dir
                .map(PathBuf::from)
                .or_else(|| cli.dataset_dir.clone())
                .unwrap_or(defaults.dataset_dir),
            file_storage_dir: evaluator_file
                .file_storage_dir
                .map(PathBuf::from)
                .or_else(|| cli.file_storage_dir.clone())
                .unwrap_or(defaults.file_storage_dir),
            poll_interval_secs: evaluator_file
                .poll_interval_secs
                .or(cli.poll_interval_secs)
                .unwrap_or(defaults.poll_interval_secs),
        };
        if evaluator.poll_interval_secs == 0 {
            bail!("poll_interval_secs must be greater than 0");
        }

        // Trainer settings - TOML [trainer] section takes precedence over CLI args
        let trainer_file = file.trainer.unwrap_or_default();
        let trainer = trainer_file
            .command
            .or_else(|| cli.trainer_command.clone())
            .map(|command| TrainerSettings {
                command,
                args: trainer_file.args.unwrap_or_default(),
                timeout_secs: trainer_file.timeout_secs.or(cli.trainer_timeout_secs),
            });
        if trainer.as_ref().and_then(|t| t.timeout_secs) == Some(0) {
            bail!("trainer timeout_secs must be greater than 0");
        }

        Ok(Self {
            db_path,
            logging_level,
            evaluator,
            trainer,
        })
    }
}

/// Install the global tracing subscriber. `LOG_LEVEL`, or `RUST_LOG` when
/// that is unset, overrides `default_level`.
pub fn init_logging(default_level: LoggingLevel) -> Result<()> {
    let env_var = if std::env::var_os("LOG_LEVEL").is_some() {
        "LOG_LEVEL"
    } else {
        "RUST_LOG"
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::from(default_level).into())
                .with_env_var(env_var)
                .from_env_lossy(),
        )
        .try_init()?;
    Ok(())
}

/// Parses a logging level string into LoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<LoggingLevel> {
    LoggingLevel::from_str(s, true).ok()
}
