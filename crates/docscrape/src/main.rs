use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use log::{info, warn};
use tokio::sync::watch;

use docscrape::config::{load_config, Config};
use docscrape::error::{ConfigError, DocscrapeError};
use docscrape::fetcher::HttpFetcherFactory;
use docscrape::logging::init_logging;
use docscrape::site::SearchSite;
use docscrape::status::JsonFileStatusStore;
use docscrape::storage::CsvResultSink;
use docscrape::worker::{JobStatus, Orchestrator};

const CONFIG_ENV: &str = "DOCSCRAPE_CONFIG";

const USAGE: &str = "Usage: docscrape [CONFIG] [--once]

Polls the status store for rows marked Start and scrapes each into a CSV file.

Arguments:
  CONFIG   Path to config.json (default: $DOCSCRAPE_CONFIG, then the user config dir)

Options:
  --once   Run a single sync pass and exit
  -h, --help";

struct Args {
    config_path: Option<PathBuf>,
    once: bool,
}

fn parse_args() -> Result<Option<Args>, String> {
    let mut args = Args {
        config_path: None,
        once: false,
    };

    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--once" => args.once = true,
            "-h" | "--help" => return Ok(None),
            flag if flag.starts_with('-') => return Err(format!("Unknown option: {}", flag)),
            path if args.config_path.is_none() => args.config_path = Some(PathBuf::from(path)),
            extra => return Err(format!("Unexpected argument: {}", extra)),
        }
    }

    Ok(Some(args))
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("docscrape").join("config.json"))
}

/// Explicit path, then the environment, then the platform config dir.
/// Only an explicitly named file has to exist.
fn resolve_config(cli_path: Option<PathBuf>) -> Result<(Config, Option<PathBuf>), ConfigError> {
    let explicit = cli_path.or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
    if let Some(path) = explicit {
        return load_config(&path).map(|config| (config, Some(path)));
    }

    match default_config_path().filter(|path| path.is_file()) {
        Some(path) => load_config(&path).map(|config| (config, Some(path))),
        None => Ok((Config::default(), None)),
    }
}

async fn run(args: Args) -> Result<bool, DocscrapeError> {
    let (config, config_path) = resolve_config(args.config_path)?;
    init_logging(&config.logging)?;

    info!("Starting docscrape v{}", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => info!("Loaded configuration from {}", path.display()),
        None => info!("No configuration file found, using defaults"),
    }

    let site = SearchSite::parse(&config.site.base_url, &config.site.search_path).map_err(|e| {
        ConfigError::Validation {
            message: format!("Invalid site URL: {}", e),
        }
    })?;
    let site = Arc::new(site);

    let fetchers = Arc::new(HttpFetcherFactory::new(
        Arc::clone(&site),
        config.http_fetcher_config(),
    ));
    let store = Arc::new(JsonFileStatusStore::new(&config.status_store.path));
    let sink = Arc::new(CsvResultSink::new(config.results_directory()));
    info!(
        "Status store: {}, results: {}",
        store.path().display(),
        sink.results_directory().display()
    );

    let mut orchestrator = Orchestrator::new(
        config.orchestrator_config(),
        store,
        site,
        fetchers,
        sink,
        config.session_config(),
    );

    if args.once {
        orchestrator.run_until_idle().await?;

        let jobs = orchestrator.board().list();
        for job in &jobs {
            match (&job.result_path, &job.error) {
                (_, Some(err)) => info!("Job {} {}: {}", job.job_id, job.status, err),
                (Some(path), None) => info!("Job {} {}: {}", job.job_id, job.status, path),
                (None, None) => info!("Job {} {}", job.job_id, job.status),
            }
        }
        let failed = jobs.iter().filter(|j| j.status == JobStatus::Failed).count();
        let unsynced = jobs.iter().filter(|j| !j.status_synced).count();
        info!(
            "Sync finished: {} jobs, {} failed, {} with unsaved status",
            jobs.len(),
            failed,
            unsynced
        );
        return Ok(failed == 0 && unsynced == 0);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    // Kept alive here so a missing handler does not read as a shutdown.
    let shutdown_tx = Arc::new(shutdown_tx);
    let handler_tx = Arc::clone(&shutdown_tx);
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received Ctrl-C, finishing running jobs");
        let _ = handler_tx.send(true);
    }) {
        warn!("Could not install Ctrl-C handler: {}", e);
    }

    orchestrator.run(shutdown_rx).await;
    drop(shutdown_tx);
    Ok(true)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = match parse_args() {
        Ok(Some(args)) => args,
        Ok(None) => {
            println!("{}", USAGE);
            return ExitCode::SUCCESS;
        }
        Err(message) => {
            eprintln!("{}\n\n{}", message, USAGE);
            return ExitCode::from(2);
        }
    };

    match run(args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("docscrape: {}", e);
            ExitCode::FAILURE
        }
    }
}
