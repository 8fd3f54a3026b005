use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use acousticbrainz_dataset_eval::config::{self, AppConfig, FileConfig, LoggingLevel};
use acousticbrainz_dataset_eval::dataset::{
    classes_from_csv, validation::is_valid_mbid, DatasetInput, PublicStatusFilter, UserId,
};
use acousticbrainz_dataset_eval::dataset_eval::{EvalLocation, FilterType, JobOptions};
use acousticbrainz_dataset_eval::{
    Database, DatasetStore, EvalJobStore, LowLevelStore, SqliteDatasetStore, SqliteEvalJobStore,
    SqliteLowLevelStore,
};

fn parse_path(s: &str) -> Result<PathBuf> {
    let original_path = PathBuf::from(s);
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
#[command(version, about = "Manage datasets and their evaluation jobs")]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Path to the SQLite database file. Created if missing.
    #[clap(long, value_parser = parse_path)]
    pub db_path: Option<PathBuf>,

    /// Default log level, overridden by LOG_LEVEL.
    #[clap(long, default_value = "warn")]
    pub logging_level: LoggingLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Creates a dataset from a JSON document with name, description,
    /// public and classes fields.
    ImportJson {
        #[clap(value_parser = parse_path)]
        file: PathBuf,
        #[clap(long)]
        author: UserId,
    },

    /// Creates a dataset from a CSV file of `<mbid>,<class name>` rows.
    ImportCsv {
        #[clap(value_parser = parse_path)]
        file: PathBuf,
        #[clap(long)]
        name: String,
        #[clap(long)]
        author: UserId,
        #[clap(long)]
        description: Option<String>,
        /// Keep the dataset out of the public listing.
        #[clap(long)]
        private: bool,
    },

    /// Shows a dataset with its classes and recordings.
    Show { dataset_id: Uuid },

    /// Lists the datasets of a user, newest first.
    List {
        #[clap(long)]
        author: UserId,
        #[clap(long)]
        public_only: bool,
    },

    /// Lists public datasets with the status of their latest evaluation.
    Public {
        /// "all" or one of pending, running, done, failed.
        #[clap(long, default_value = "all")]
        status: PublicStatusFilter,
    },

    /// Stores a low-level JSON document as a new submission for a recording.
    ImportLowlevel {
        mbid: String,
        #[clap(value_parser = parse_path)]
        file: PathBuf,
    },

    /// Submits a dataset for evaluation.
    Evaluate {
        dataset_id: Uuid,
        #[clap(long)]
        normalize: bool,
        #[clap(long)]
        filter_type: Option<FilterType>,
        #[clap(long, default_value = "local")]
        location: EvalLocation,
        #[clap(long, value_delimiter = ',')]
        c_values: Vec<i64>,
        #[clap(long, value_delimiter = ',')]
        gamma_values: Vec<i64>,
        #[clap(long, value_delimiter = ',')]
        preprocessing_values: Vec<String>,
    },

    /// Lists the evaluation jobs of a dataset, oldest first.
    Jobs { dataset_id: Uuid },

    /// Shows an evaluation job and its train/test sets.
    Job { job_id: Uuid },

    /// Lists pending remote jobs of a user's datasets.
    RemoteJobs {
        #[clap(long)]
        user: UserId,
    },

    /// Deletes a pending evaluation job and its snapshot.
    DeleteJob { job_id: Uuid },
}

struct Stores {
    datasets: SqliteDatasetStore,
    jobs: SqliteEvalJobStore,
    lowlevel: Arc<SqliteLowLevelStore>,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn execute(command: Command, stores: &Stores) -> Result<()> {
    match command {
        Command::ImportJson { file, author } => {
            let input: DatasetInput = serde_json::from_reader(
                File::open(&file).with_context(|| format!("Failed to open {:?}", file))?,
            )
            .with_context(|| format!("Failed to parse dataset from {:?}", file))?;
            let id = stores.datasets.create(&input, author)?;
            println!("{}", id);
        }
        Command::ImportCsv {
            file,
            name,
            author,
            description,
            private,
        } => {
            let classes = classes_from_csv(
                File::open(&file).with_context(|| format!("Failed to open {:?}", file))?,
            )?;
            let input = DatasetInput {
                name,
                description,
                public: !private,
                classes,
            };
            let id = stores.datasets.create(&input, author)?;
            println!("{}", id);
        }
        Command::Show { dataset_id } => print_json(&stores.datasets.get(&dataset_id)?)?,
        Command::List {
            author,
            public_only,
        } => print_json(&stores.datasets.get_by_user(author, public_only)?)?,
        Command::Public { status } => print_json(&stores.datasets.get_public_datasets(status)?)?,
        Command::ImportLowlevel { mbid, file } => {
            if !is_valid_mbid(&mbid) {
                bail!("Not a valid recording MBID: {}", mbid);
            }
            let data: serde_json::Value = serde_json::from_reader(
                File::open(&file).with_context(|| format!("Failed to open {:?}", file))?,
            )
            .with_context(|| format!("Failed to parse low-level data from {:?}", file))?;
            let offset = stores.lowlevel.submit_low_level(&mbid, &data)?;
            info!("Stored low-level submission {} for {}", offset, mbid);
            println!("{}", offset);
        }
        Command::Evaluate {
            dataset_id,
            normalize,
            filter_type,
            location,
            c_values,
            gamma_values,
            preprocessing_values,
        } => {
            let options = JobOptions {
                normalize,
                filter_type,
                c_values,
                gamma_values,
                preprocessing_values,
            };
            let job_id = stores
                .jobs
                .evaluate_dataset(&dataset_id, &options, location)?;
            println!("{}", job_id);
        }
        Command::Jobs { dataset_id } => {
            print_json(&stores.jobs.get_jobs_for_dataset(&dataset_id)?)?
        }
        Command::Job { job_id } => {
            let Some(job) = stores.jobs.get_job(&job_id)? else {
                bail!("No evaluation job with ID {}", job_id);
            };
            print_json(&serde_json::json!({
                "job": job,
                "sets": stores.jobs.get_sets_for_job(&job_id)?,
            }))?;
        }
        Command::RemoteJobs { user } => {
            print_json(&stores.jobs.get_remote_pending_jobs_for_user(user)?)?
        }
        Command::DeleteJob { job_id } => {
            stores.jobs.delete_job(&job_id)?;
            println!("Deleted job {}", job_id);
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    let file_config = cli_args
        .config
        .as_deref()
        .map(FileConfig::load)
        .transpose()?;
    let cli_config = config::CliConfig {
        db_path: cli_args.db_path.clone(),
        logging_level: cli_args.logging_level,
        ..Default::default()
    };
    let app_config = AppConfig::resolve(&cli_config, file_config)?;
    config::init_logging(app_config.logging_level)?;

    info!("Opening SQLite database at {:?}...", app_config.db_path);
    let db = Database::open(&app_config.db_path)
        .with_context(|| format!("Failed to open database {:?}", app_config.db_path))?;
    let lowlevel = Arc::new(SqliteLowLevelStore::new(db.clone()));
    let stores = Stores {
        datasets: SqliteDatasetStore::new(db.clone()),
        jobs: SqliteEvalJobStore::new(db, lowlevel.clone()),
        lowlevel,
    };

    execute(cli_args.command, &stores)
}
