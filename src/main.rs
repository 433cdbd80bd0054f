use clap::Parser;
use log::{error, info, warn, LevelFilter};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use talen_jobs::logging::init_logging;
use talen_jobs::utils::get_settings_json_path;
use talen_jobs::{
    CommandPredictor, InputTable, JobState, JobStore, JsonJobStore, MemoryJobStore, Orchestrator,
    Predictor, ReferencePredictor, Settings,
};

#[derive(Parser)]
#[command(name = "talen-jobs")]
#[command(about = "Predict TALEN pairs for every variant in a table", long_about = None)]
#[command(version)]
struct Cli {
    /// Variant table (tab-separated, with a header line)
    #[arg(value_name = "VARIANTS.TSV")]
    variants: PathBuf,

    /// Reference FASTA for the built-in predictor (not needed with predictor_command)
    #[arg(short = 'r', long, value_name = "REF.FA")]
    reference: Option<PathBuf>,

    /// Write the combined table here instead of stdout
    #[arg(short = 'o', long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Settings JSON (default: application data directory)
    #[arg(short = 's', long, value_name = "FILE", env = "TALEN_JOBS_SETTINGS")]
    settings: Option<PathBuf>,

    /// Override max_concurrent_tasks
    #[arg(short = 't', long, value_name = "INT")]
    threads: Option<usize>,

    /// Verbosity level (1=error, 2=warning, 3=info, 4=debug, 5+=trace)
    #[arg(short = 'v', long, value_name = "INT", default_value = "3")]
    verbosity: u8,
}

fn fail(message: impl std::fmt::Display) -> ! {
    error!("{}", message);
    process::exit(1);
}

fn build_predictor(settings: &Settings, reference: Option<&Path>) -> Arc<dyn Predictor> {
    if let Some(argv) = &settings.predictor_command {
        let predictor = CommandPredictor::from_argv(argv)
            .unwrap_or_else(|| fail("predictor_command is empty"));
        info!("Using external predictor: {}", argv.join(" "));
        if reference.is_some() {
            warn!("--reference is ignored while predictor_command is set");
        }
        return Arc::new(predictor);
    }

    let Some(reference) = reference else {
        fail("No predictor: pass --reference or set predictor_command in settings");
    };
    let predictor = ReferencePredictor::from_fasta(reference)
        .unwrap_or_else(|e| fail(format!("Failed to load reference {:?}: {}", reference, e)));
    info!("Loaded reference {} ({} bp)", predictor.name(), predictor.len());

    Arc::new(predictor)
}

fn build_store(settings: &Settings) -> Arc<dyn JobStore> {
    match &settings.jobs_path {
        Some(path) => match JsonJobStore::open(Path::new(path)) {
            Ok(store) => Arc::new(store),
            Err(e) => fail(format!("Failed to open job store {}: {}", path, e)),
        },
        None => Arc::new(MemoryJobStore::new()),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbosity {
        0 | 1 => LevelFilter::Error,
        2 => LevelFilter::Warn,
        3 => LevelFilter::Info,
        4 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    init_logging(log_level);

    let settings_path = cli.settings.unwrap_or_else(get_settings_json_path);
    let mut settings = Settings::load(&settings_path)
        .unwrap_or_else(|e| fail(format!("{:?}: {}", settings_path, e)));
    if let Some(threads) = cli.threads {
        settings.max_concurrent_tasks = threads;
        if let Err(e) = settings.validate() {
            fail(e);
        }
    }

    let predictor = build_predictor(&settings, cli.reference.as_deref());
    let orchestrator = Orchestrator::with_store(predictor, &settings, build_store(&settings));

    let table = InputTable::read_tsv(&cli.variants).unwrap_or_else(|e| fail(e));
    let job_id = orchestrator.submit(table).unwrap_or_else(|e| fail(e));

    let status = orchestrator.wait(&job_id).await.unwrap_or_else(|e| fail(e));
    if status.state != JobState::Completed {
        fail(format!(
            "Job {} ended {}: {}",
            job_id,
            status.state,
            status.error.unwrap_or_default()
        ));
    }

    info!(
        "Job {} completed: {} rows, {} succeeded, {} failed",
        job_id, status.rows_total, status.rows_succeeded, status.rows_failed
    );
    if status.rows_failed > 0 {
        warn!("{} rows carry a failure marker", status.rows_failed);
    }

    let combined = orchestrator.result(&job_id).unwrap_or_else(|e| fail(e));
    match cli.output {
        Some(path) => {
            if let Err(e) = combined.write_tsv(&path) {
                fail(format!("Failed to write {:?}: {}", path, e));
            }
            info!("Wrote {} rows to {:?}", combined.len(), path);
        }
        None => print!("{}", combined.to_tsv()),
    }
}
