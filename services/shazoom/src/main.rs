//!
//! src/main.rs  Oct 16th, 2026
//!
//! Command line front end of the shazoom client: catalog search, example
//! samples and the upload/identify workflow against the remote service
//!
//!

mod config;
mod errors;
mod logging;

mod catalog;
mod clock;
mod fetch;
mod samples;
mod search;
mod types;
mod upload;
mod workflow;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;

use crate::catalog::CatalogStore;
use crate::config::AppConfig;
use crate::errors::ShazoomError;
use crate::fetch::HttpBackend;
use crate::search::SearchOutcome;
use crate::types::IdentificationResult;
use crate::upload::LocalFile;
use crate::workflow::Workflow;

#[derive(Parser, Debug)]
#[command(name = "shazoom", version, about = "Identify songs from audio samples")]
struct Cli {
    /// Skip the initial request that wakes the identification backend
    #[arg(long, global = true)]
    no_warmup: bool,

    #[command(subcommand)]
    command: Command
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search the song database by title, artist or album
    Search {
        query: Vec<String>
    },
    /// Upload an audio file and identify it
    Identify {
        #[arg(value_name = "FILE")]
        file: PathBuf
    },
    /// Identify one of the bundled example samples
    Sample {
        #[arg(value_name = "ID", required_unless_present = "payload")]
        id: Option<String>,

        /// A raw drag payload: {"id","title","fileKey"}
        #[arg(long, conflicts_with = "id")]
        payload: Option<String>
    },
    /// List the bundled example samples
    Samples,
    /// Show the first songs of the database
    Catalog {
        #[arg(long)]
        limit: Option<usize>
    }
}

/// Application scoped state, built once and passed down explicitly
struct App {
    cfgs: AppConfig,
    catalog: CatalogStore,
    workflow: Arc<Workflow<HttpBackend>>
}

impl App {
    async fn init(cfgs: AppConfig, warmup: bool) -> Result<Self, ShazoomError> {
        let backend = Arc::new(HttpBackend::new(&cfgs.http, &cfgs.api)?);
        let workflow = Arc::new(Workflow::new(backend, cfgs.workflow));

        let warm = {
            let workflow = workflow.clone();
            let enabled = warmup && cfgs.api.warmup;
            async move { if enabled { workflow.warm_up().await } }
        };
        let (catalog, ()) = tokio::join!(
            CatalogStore::load_or_empty(&cfgs.catalog, &cfgs.http),
            warm
        );

        Ok( Self { cfgs, catalog, workflow } )
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let cfgs = match config::load_config() {
        Ok(cfgs) => cfgs,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let _logger = match logging::init_logging(&cfgs.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        service = "shazoom",
        version = %env!("CARGO_PKG_VERSION"),
        "starting"
    );

    match run(cli, cfgs).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "shazoom.failed");
            if e.is_inline() {
                eprintln!("  ! {}", e.user_message());
            } else {
                eprintln!("error: {}", e.user_message());
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, cfgs: AppConfig) -> Result<(), ShazoomError> {
    match cli.command {
        Command::Samples => print_samples(),
        Command::Search { query } => {
            let app = App::init(cfgs, false).await?;
            report_catalog_error(&app.catalog);
            let outcome = search::search(app.catalog.catalog().entries(), &query.join(" "));
            print_search(&outcome);
            Ok(())
        },
        Command::Catalog { limit } => {
            let app = App::init(cfgs, false).await?;
            report_catalog_error(&app.catalog);
            let limit = limit.unwrap_or(app.cfgs.catalog.preview_len);
            print_catalog(&app.catalog, limit);
            Ok(())
        },
        Command::Identify { file } => {
            // a rejected file never wakes the backend
            let file = LocalFile::open(&file, cfgs.workflow.max_upload_bytes).await?;
            let app = App::init(cfgs, !cli.no_warmup).await?;

            let progress = watch_progress(app.workflow.clone());
            let identified = async {
                let reference = app.workflow.select_file(file).await?;
                println!("Uploaded as {reference}");
                app.workflow.submit().await
            }.await;
            progress.abort();

            print_result(&app, &identified?);
            Ok(())
        },
        Command::Sample { id, payload } => {
            let app = App::init(cfgs, !cli.no_warmup).await?;

            let progress = watch_progress(app.workflow.clone());
            let identified = match (id, payload) {
                (_, Some(payload)) => app.workflow.drop_sample(&payload).await,
                (Some(id), None) => match samples::find_sample(&id) {
                    Some(sample) => {
                        println!("{} ({})", sample.title, sample.description);
                        app.workflow.select_sample(sample.reference()).await
                    },
                    None => Err(ShazoomError::ExampleSampleParse(format!("no sample {id}")))
                },
                (None, None) => Err(ShazoomError::ExampleSampleParse(
                    "no sample given".to_string()
                ))
            };
            progress.abort();

            print_result(&app, &identified?);
            Ok(())
        }
    }
}

/// Follows workflow transitions and reprints the elapsed time while busy
fn watch_progress(workflow: Arc<Workflow<HttpBackend>>) -> tokio::task::JoinHandle<()> {
    let mut transitions = workflow.subscribe();
    tokio::spawn(async move {
        let mut busy = false;
        let mut noticed = false;
        let mut shown = None;
        let mut ticks = tokio::time::interval(Duration::from_millis(250));
        loop {
            tokio::select! {
                event = transitions.recv() => {
                    busy = match event {
                        Ok(transition) => transition.to.is_busy(),
                        Err(RecvError::Lagged(_)) => workflow.state().phase().is_busy(),
                        Err(RecvError::Closed) => break
                    };
                    shown = None;
                    if busy && !noticed {
                        eprintln!(
                            "Song identification can take up to 30 seconds depending on \
                             the audio quality and length."
                        );
                        noticed = true;
                    }
                },
                _ = ticks.tick(), if busy => {
                    let secs = workflow.elapsed_secs();
                    if shown != Some(secs) {
                        eprintln!("Processing time: {secs} seconds");
                        shown = Some(secs);
                    }
                }
            }
        }
    })
}

fn report_catalog_error(store: &CatalogStore) {
    if let Some(error) = store.error() {
        eprintln!("warning: {error}");
    }
}

fn print_samples() -> Result<(), ShazoomError> {
    for sample in &samples::EXAMPLE_SAMPLES {
        println!(
            "{:<8} {:<22} {:<32} {}",
            sample.id, sample.title, sample.description, sample.duration
        );
        println!("         --payload '{}'", sample.drag_payload()?);
    }
    Ok(())
}

fn print_catalog(store: &CatalogStore, limit: usize) {
    let catalog = store.catalog();
    if catalog.is_empty() {
        println!("No songs available.");
        return;
    }
    println!("Available Songs ({})", catalog.len());
    for entry in catalog.preview(limit) {
        println!("  {} - {} ({})", entry.title, entry.artist, entry.year);
    }
}

fn print_search(outcome: &SearchOutcome) {
    if !outcome.has_searched() {
        println!("Enter a song title, artist, or album to search.");
        return;
    }
    if let Some(summary) = outcome.summary() {
        println!("{summary}");
    }
    for hit in outcome.results() {
        println!(
            "{:>5}  {} - {} [{}] {}",
            hit.score, hit.entry.title, hit.entry.artist, hit.entry.album, hit.entry.year
        );
    }
}

fn print_result(app: &App, result: &IdentificationResult) {
    println!("Processing time: {} seconds", app.workflow.elapsed_secs());
    match &result.matched_track {
        Some(track) => {
            println!("Most similar song in database:");
            println!("  {}", track.title);
            println!("  {}", track.artist);
            println!("  {} ({})", track.album, track.year);
            println!("  Confidence: {}%", result.confidence_percent);
        },
        None => println!("No match found. Confidence: {}%", result.confidence_percent)
    }
    if app.workflow.is_low_confidence(result) {
        println!("Low confidence: likely not a match.");
    }
}
