use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use acousticbrainz_dataset_eval::config::{self, AppConfig, FileConfig, LoggingLevel};
use acousticbrainz_dataset_eval::{
    CommandTrainer, Database, DatasetEvaluator, SqliteDatasetStore, SqliteEvalJobStore,
    SqliteLowLevelStore,
};

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(format!("Error resolving path '{}': {}", s, msg));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
#[command(version, about = "Runs pending local dataset evaluation jobs")]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Path to the SQLite database file. Created if missing.
    #[clap(long, value_parser = parse_path)]
    pub db_path: Option<PathBuf>,

    /// Directory where per-job project directories are created.
    #[clap(long, value_parser = parse_path)]
    pub dataset_dir: Option<PathBuf>,

    /// Directory where training history files are kept.
    #[clap(long, value_parser = parse_path)]
    pub file_storage_dir: Option<PathBuf>,

    /// Seconds to wait before polling again when no job is pending.
    #[clap(long)]
    pub poll_interval_secs: Option<u64>,

    /// Trainer command line. The project directory, groundtruth file and
    /// filelist are appended as arguments.
    #[clap(long)]
    pub trainer_command: Option<String>,

    /// Kill the trainer and fail the job after this many seconds.
    #[clap(long)]
    pub trainer_timeout_secs: Option<u64>,

    /// Default log level, overridden by LOG_LEVEL.
    #[clap(long, default_value = "info")]
    pub logging_level: LoggingLevel,
}

/// Convert CLI args to CliConfig for config resolution
impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            db_path: args.db_path.clone(),
            dataset_dir: args.dataset_dir.clone(),
            file_storage_dir: args.file_storage_dir.clone(),
            poll_interval_secs: args.poll_interval_secs,
            trainer_command: args.trainer_command.clone(),
            trainer_timeout_secs: args.trainer_timeout_secs,
            logging_level: args.logging_level,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    let file_config = cli_args
        .config
        .as_deref()
        .map(FileConfig::load)
        .transpose()?;
    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = AppConfig::resolve(&cli_config, file_config)?;

    config::init_logging(app_config.logging_level)?;
    info!(
        "dataset-evaluator {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH")
    );

    let trainer_settings = app_config.trainer.clone().context(
        "A trainer command must be specified via --trainer-command or in the [trainer] config section",
    )?;
    let mut trainer =
        CommandTrainer::from_command_line(&trainer_settings.command, trainer_settings.timeout())?;
    trainer.append_args(trainer_settings.args);
    info!("Using trainer command: {}", trainer_settings.command);

    info!("Opening SQLite database at {:?}...", app_config.db_path);
    let db = Database::open(&app_config.db_path)
        .with_context(|| format!("Failed to open database {:?}", app_config.db_path))?;

    let lowlevel = Arc::new(SqliteLowLevelStore::new(db.clone()));
    let datasets = Arc::new(SqliteDatasetStore::new(db.clone()));
    let jobs = Arc::new(SqliteEvalJobStore::new(db, lowlevel.clone()));
    let evaluator = DatasetEvaluator::new(
        datasets,
        jobs,
        lowlevel,
        Arc::new(trainer),
        app_config.evaluator.clone(),
    );

    let shutdown_token = CancellationToken::new();
    tokio::spawn({
        let shutdown_token = shutdown_token.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl+C, finishing current job and shutting down");
                shutdown_token.cancel();
            }
        }
    });

    evaluator.run(shutdown_token).await;
    Ok(())
}
