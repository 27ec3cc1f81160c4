use datastore_importer::config::Settings;
use datastore_importer::ingestion::{
    sanitize_header, Collaborators, CsvRowSourceFactory, FileJobStore, ImportConfig, ImportJob, JobStore,
    Resource, Status,
};
use datastore_importer::storage::{SqliteStorage, StoragePort};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "datastore-importer")]
#[command(about = "Resumable, time-boxed import of CSV files into a SQLite datastore")]
#[command(version)]
struct Args {
    /// SQLite datastore (or set IMPORTER_DATABASE)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Directory for persisted import jobs (or set IMPORTER_STATE_DIR)
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one pass of an import, creating the job on first use
    Import {
        /// Delimited file to import
        file: PathBuf,

        /// Task identity; a new one is generated when omitted
        #[arg(long)]
        id: Option<String>,

        /// Declared media type of the file
        #[arg(long, default_value = "text/csv")]
        media_type: String,

        /// Seconds per pass (or set IMPORTER_TIME_LIMIT)
        #[arg(long)]
        time_limit: Option<u64>,

        /// Keep running passes until the import is done or fails
        #[arg(long)]
        until_done: bool,

        /// Infer column types from the first data row
        #[arg(long)]
        typed: bool,
    },
    /// Show the persisted state of an import job
    Status {
        id: String,
    },
    /// Print imported rows
    Show {
        id: String,

        /// Maximum rows to print
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Drop imported rows and schema, resetting the job
    Drop {
        id: String,

        /// Also delete the persisted job document
        #[arg(long)]
        forget: bool,
    },
}

/// Table name and storage reference for a task identity
fn storage_ref(id: &str) -> (String, String) {
    let table = format!("import_{}", sanitize_header(id, 0));
    (format!("sqlite:{}", table), table)
}

fn collaborators_for(id: &str, settings: &Settings, typed: bool) -> Result<Collaborators> {
    let (reference, table) = storage_ref(id);
    let storage = SqliteStorage::open(&settings.database, &table)
        .with_context(|| format!("Failed to open datastore {}", settings.database.display()))?
        .with_typed(typed);

    Ok(Collaborators::new()
        .with_storage(reference, Arc::new(storage))
        .with_row_source("csv", Arc::new(CsvRowSourceFactory::new())))
}

fn load_job(id: &str, settings: &Settings, jobs: Arc<dyn JobStore>) -> Result<ImportJob> {
    let collaborators = collaborators_for(id, settings, false)?;
    ImportJob::load(id, jobs, &collaborators)?
        .with_context(|| format!("No import job with id {}", id))
}

fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut settings = Settings::from_env().context("Invalid importer settings")?;
    if let Some(database) = args.database {
        settings.database = database;
    }
    if let Some(state_dir) = args.state_dir {
        settings.state_dir = state_dir;
    }

    let jobs: Arc<dyn JobStore> = Arc::new(
        FileJobStore::new(&settings.state_dir)
            .with_context(|| format!("Failed to open job directory {}", settings.state_dir.display()))?,
    );

    match args.command {
        Commands::Import { file, id, media_type, time_limit, until_done, typed } => {
            let id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            run_import(&settings, jobs, id, file, media_type, time_limit, until_done, typed)
        }
        Commands::Status { id } => {
            let job = load_job(&id, &settings, jobs)?;
            println!("{}", serde_json::to_string_pretty(&job.task().to_state())?);
            Ok(())
        }
        Commands::Show { id, limit } => show_rows(&settings, jobs, &id, limit),
        Commands::Drop { id, forget } => {
            let mut job = load_job(&id, &settings, jobs)?;
            job.drop_import()?;
            if forget {
                job.forget()?;
            }
            println!("Dropped import {}", id);
            Ok(())
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_import(
    settings: &Settings,
    jobs: Arc<dyn JobStore>,
    id: String,
    file: PathBuf,
    media_type: String,
    time_limit: Option<u64>,
    until_done: bool,
    typed: bool,
) -> Result<()> {
    let collaborators = collaborators_for(&id, settings, typed)?;
    let (reference, _) = storage_ref(&id);

    let mut config = ImportConfig::new(
        Resource::new(id.clone(), file.to_string_lossy().to_string(), media_type),
        reference,
        "csv",
    );
    config.time_limit_seconds = time_limit.or(settings.time_limit_seconds);

    let mut job = ImportJob::get(&id, jobs, config, &collaborators)?;
    if let Some(seconds) = time_limit {
        job.task_mut().set_time_limit(Some(seconds));
    }

    info!("Importing {} as job {}", file.display(), id);
    let mut passes = 0;
    let status = loop {
        let status = job.run()?;
        passes += 1;
        if !until_done || status.is_terminal() {
            break status;
        }
    };

    let count = job.task().storage().count()?;
    println!("Job:     {}", id);
    println!("Status:  {}", status);
    println!("Passes:  {}", passes);
    println!("Rows:    {}", count);

    match status {
        Status::Error(message) => anyhow::bail!("Import {} failed: {}", id, message),
        _ => Ok(()),
    }
}

fn show_rows(settings: &Settings, jobs: Arc<dyn JobStore>, id: &str, limit: usize) -> Result<()> {
    let job = load_job(id, settings, jobs)?;
    let storage = job.task().storage();

    if let Some(schema) = storage.schema()? {
        println!("{}", schema.names().join("\t"));
    }
    for (row_id, values) in storage.retrieve_all()?.into_iter().take(limit) {
        println!("{}\t{}", row_id, values.join("\t"));
    }
    Ok(())
}
