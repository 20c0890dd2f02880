mod indicator;
mod logging;
mod workspace;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{ArgAction, Args, Parser, Subcommand};
use contactgen_core::{ContactStore, GenderFilter, StoreError};
use contactgen_generate::{AssetsLoader, GenerationError, GeneratorFactory, NameCorpus};
use contactgen_service::{
    ChannelSink, GenerationCoordinator, ProgressEvent, ProgressSink, ResultSink, SessionEvent,
    SessionOutcome,
};
use indicator::TerminalIndicator;
use logging::{LoggingError, init_logging};
use rand::Rng;
use thiserror::Error;
use tokio::runtime::Handle;
use workspace::{
    AppPaths, JsonContactStore, SessionReport, Settings, WorkspaceError, load_or_create_settings,
    write_session_report,
};

const STOCK_AVATARS: [&str; 6] = [
    "stock/avatar_blue.png",
    "stock/avatar_green.png",
    "stock/avatar_orange.png",
    "stock/avatar_purple.png",
    "stock/avatar_red.png",
    "stock/avatar_teal.png",
];

#[derive(Debug, Error)]
enum CliError {
    #[error("workspace error: {0}")]
    Workspace(#[from] WorkspaceError),
    #[error("logging error: {0}")]
    Logging(#[from] LoggingError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("generation error: {0}")]
    Generation(#[from] GenerationError),
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("session failed: {0}")]
    Session(String),
}

#[derive(Parser, Debug)]
#[command(name = "contactgen", version, about = "Synthetic contact generator")]
struct Cli {
    /// Directory holding config, data, reports and logs.
    #[arg(long, global = true, default_value = ".contactgen")]
    home: PathBuf,
    /// Raise stderr verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate synthetic contacts into the store.
    Generate(GenerateArgs),
    /// Delete every generated contact from the store.
    Delete(DeleteArgs),
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Number of contacts to generate.
    #[arg(short = 'n', long, default_value_t = 10)]
    count: u64,
    /// Attach a synthesized avatar to each contact.
    #[arg(long)]
    photos: bool,
    /// Gender filter: male, female or any.
    #[arg(long)]
    gender: Option<GenderFilter>,
    /// Seed for reproducible output.
    #[arg(long)]
    seed: Option<u64>,
    /// Email domain marking generated contacts.
    #[arg(long)]
    marker: Option<String>,
}

#[derive(Args, Debug)]
struct DeleteArgs {
    /// Email domain marking generated contacts.
    #[arg(long)]
    marker: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();

    let paths = AppPaths::new(cli.home);
    paths.ensure_dirs()?;
    init_logging(&paths.log_path(), cli.verbose)?;
    let settings = load_or_create_settings(&paths)?;

    match cli.command {
        Command::Generate(args) => run_generate(&paths, settings, args).await,
        Command::Delete(args) => run_delete(&paths, settings, args).await,
    }
}

async fn run_generate(
    paths: &AppPaths,
    mut settings: Settings,
    args: GenerateArgs,
) -> Result<(), CliError> {
    override_marker(&mut settings, args.marker)?;
    if args.seed.is_some() {
        settings.seed = args.seed;
    }
    let gender = args.gender.unwrap_or(settings.default_gender);
    let with_photos = args.photos || settings.default_photos;

    let coordinator = build_coordinator(paths, &settings)?;
    let (sink, mut rx) = ChannelSink::new();
    let sink = Arc::new(sink);
    coordinator.set_progress_observer(Some(Arc::clone(&sink) as Arc<dyn ProgressSink>));
    coordinator.set_result_observer(Some(sink as Arc<dyn ResultSink>));

    tracing::info!(
        event = "generate_requested",
        requested = args.count,
        gender = %gender,
        with_photos,
        marker = %settings.marker_domain
    );
    if !coordinator.generate(args.count, with_photos, gender) {
        return Err(CliError::Session("generation did not start".to_string()));
    }

    let mut rng = rand::rng();
    let outcome = loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(SessionEvent::Progress(event)) => render_progress(&event, &mut rng),
                Some(SessionEvent::Finished(outcome)) => break outcome,
                None => return Err(CliError::Session("session channel closed".to_string())),
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!(event = "interrupt", "stopping generation");
                coordinator.stop_generating();
            }
        }
    };

    let report = SessionReport::from_outcome(&outcome, &settings.marker_domain);
    let report_path = write_session_report(paths, &report)?;
    tracing::info!(event = "report_written", path = %report_path.display());

    let handle = coordinator.clone();
    tokio::task::spawn_blocking(move || handle.shutdown()).await?;

    print_summary(&outcome);
    match outcome.error {
        Some(error) => Err(CliError::Session(error)),
        None => Ok(()),
    }
}

async fn run_delete(
    paths: &AppPaths,
    mut settings: Settings,
    args: DeleteArgs,
) -> Result<(), CliError> {
    override_marker(&mut settings, args.marker)?;

    let coordinator = build_coordinator(paths, &settings)?;
    let mut stop = coordinator.stop_signal();
    tracing::info!(event = "delete_requested", marker = %settings.marker_domain);
    if !coordinator.start_deletion() {
        return Err(CliError::Session("deletion did not start".to_string()));
    }

    loop {
        tokio::select! {
            stopped = stop.wait_for(|stopped| *stopped) => {
                stopped.map_err(|_| CliError::Session("stop signal dropped".to_string()))?;
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!(event = "interrupt", "stopping deletion");
                coordinator.stop_deletion();
            }
        }
    }

    let outcome = coordinator.last_deletion();
    let handle = coordinator.clone();
    tokio::task::spawn_blocking(move || handle.shutdown()).await?;

    let Some(outcome) = outcome else {
        return Err(CliError::Session("deletion finished without an outcome".to_string()));
    };
    let suffix = if outcome.cancelled { " (cancelled)" } else { "" };
    println!(
        "deleted {} contacts marked @{}{suffix}",
        outcome.deleted, settings.marker_domain
    );
    match outcome.error {
        Some(error) => Err(CliError::Session(error)),
        None => Ok(()),
    }
}

/// Applies a `--marker` flag and re-checks the settings it lands in.
fn override_marker(settings: &mut Settings, marker: Option<String>) -> Result<(), CliError> {
    if let Some(marker) = marker {
        settings.marker_domain = marker;
    }
    settings.validate()?;
    Ok(())
}

fn build_coordinator(
    paths: &AppPaths,
    settings: &Settings,
) -> Result<GenerationCoordinator, CliError> {
    let corpus = match &settings.assets_dir {
        Some(dir) => NameCorpus::load(&AssetsLoader::new(dir))?,
        None => NameCorpus::builtin(),
    };
    let factory = GeneratorFactory::new(corpus)
        .with_marker(settings.marker_domain.clone())
        .with_seed(settings.seed);

    let store = JsonContactStore::open(settings.store_path(paths))?;
    tracing::info!(
        event = "store_opened",
        path = %store.path().display(),
        records = store.len()?
    );

    Ok(GenerationCoordinator::new(
        settings.coordinator_config(),
        Arc::new(factory),
        Arc::new(store),
        Handle::current(),
    )
    .with_indicator(Arc::new(TerminalIndicator)))
}

fn render_progress(event: &ProgressEvent, rng: &mut impl Rng) {
    let record = &event.record;
    let avatar = match record.image() {
        Some(bytes) => format!("identicon, {} bytes", bytes.len()),
        None => STOCK_AVATARS[rng.random_range(0..STOCK_AVATARS.len())].to_string(),
    };
    println!(
        "[{:>3.0}%] #{:<4} {} <{}> {} [{}] ({avatar})",
        event.progress * 100.0,
        event.step,
        record.display_name(),
        record.email(),
        record.phone(),
        record.gender(),
    );
}

fn print_summary(outcome: &SessionOutcome) {
    let stats = &outcome.stats;
    let status = if outcome.error.is_some() {
        "aborted"
    } else if outcome.forced {
        "stopped"
    } else {
        "done"
    };
    println!(
        "{status}: {}/{} contacts generated ({} male, {} female, {} skipped)",
        outcome.generated, outcome.requested, stats.males, stats.females, stats.failed_persists
    );
}
