mod display;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use rallypoint_core::{CategoryFilter, MapConfig, Position, filter_markers};
use rallypoint_store::{
    FULL_NAME_KEY, FilePositionCache, FileSessionStore, SESSION_KEYS, SESSION_STARTED_KEY,
    SessionStore, TOKEN_KEY,
};
use rallypoint_sync::{
    CycleOutcome, EventFetcher, FixedLocation, HttpBackend, PollScheduler, SessionGate, Snapshot,
    SyncEvent, SyncPipeline,
};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

const SESSION_FILE: &str = "session.json";
const POSITION_FILE: &str = "position.json";

#[derive(Parser, Debug)]
#[command(name = "rallypoint", author, version, about = "Live disaster-response map from the terminal")]
struct Cli {
    /// JSON config file; built-in defaults apply when omitted.
    #[arg(long, global = true, env = "RALLYPOINT_CONFIG")]
    config: Option<PathBuf>,

    /// Backend base URL, overriding the config file.
    #[arg(long, global = true, env = "RALLYPOINT_API_URL")]
    api_url: Option<String>,

    /// Where the session credential and last known position are kept.
    #[arg(long, global = true, env = "RALLYPOINT_STATE_DIR", default_value = ".rallypoint")]
    state_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one sync cycle and print the marker set.
    Snapshot {
        #[command(flatten)]
        view: ViewArgs,

        /// Print JSON instead of cards.
        #[arg(long)]
        json: bool,
    },
    /// Poll the backend until interrupted.
    Watch {
        #[command(flatten)]
        view: ViewArgs,

        /// Poll period in seconds, overriding the config file.
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Manage the stored session credential.
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },
    /// Print the effective configuration.
    Config,
}

#[derive(Args, Debug)]
struct ViewArgs {
    /// all, help, safe, area or address.
    #[arg(long, default_value = "all")]
    filter: CategoryFilter,

    /// Current latitude. Without --lat/--lon the last known or default position is used.
    #[arg(long, requires = "lon", allow_hyphen_values = true)]
    lat: Option<f64>,

    #[arg(long, requires = "lat", allow_hyphen_values = true)]
    lon: Option<f64>,
}

impl ViewArgs {
    fn location(&self) -> FixedLocation {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => FixedLocation::at(Position::new(lat, lon)),
            _ => FixedLocation::unavailable(),
        }
    }
}

#[derive(Subcommand, Debug)]
enum TokenAction {
    /// Store a bearer token obtained from the login endpoint.
    Set {
        token: String,
        /// Display name stored next to the token.
        #[arg(long)]
        name: Option<String>,
    },
    /// Sign out: remove the token and display name.
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so `snapshot --json` stays parseable.
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&cli)?;

    match &cli.command {
        Command::Snapshot { view, json } => snapshot(&cli, &config, view, *json).await,
        Command::Watch { view, .. } => watch(&cli, &config, view).await,
        Command::Token { action } => token(&cli.state_dir, action),
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

/// Config file or defaults, with command-line overrides applied before
/// validation.
fn load_config(cli: &Cli) -> anyhow::Result<MapConfig> {
    let mut config = match &cli.config {
        Some(path) => MapConfig::load(path)?,
        None => MapConfig::default(),
    };
    if let Some(url) = &cli.api_url {
        config.api_base_url = url.clone();
    }
    if let Command::Watch {
        interval: Some(secs),
        ..
    } = &cli.command
    {
        config.poll_interval_secs = *secs;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn build_pipeline(
    state_dir: &Path,
    config: &MapConfig,
    location: FixedLocation,
) -> anyhow::Result<SyncPipeline> {
    let backend = HttpBackend::new(config.base_url(), config.request_timeout())
        .context("failed to build HTTP client")?;
    let mut gate = SessionGate::new(
        Arc::new(FileSessionStore::open(state_dir.join(SESSION_FILE))),
        Arc::new(location),
        Arc::new(FilePositionCache::open(state_dir.join(POSITION_FILE))),
        config.default_position,
        config.position_timeout(),
    );
    if let Some(timeout) = config.session_timeout() {
        gate = gate.with_session_timeout(timeout);
    }
    let fetcher = EventFetcher::new(
        Arc::new(backend),
        config.assembly_areas.clone(),
        config.request_timeout(),
    );
    Ok(SyncPipeline::new(gate, fetcher, config.backend_offset()))
}

async fn snapshot(
    cli: &Cli,
    config: &MapConfig,
    view: &ViewArgs,
    json: bool,
) -> anyhow::Result<()> {
    let pipeline = build_pipeline(&cli.state_dir, config, view.location())?;

    let snapshot = match pipeline.run_cycle().await {
        Ok(CycleOutcome::Fresh(snapshot)) => snapshot,
        Ok(CycleOutcome::Stale { errors }) => {
            for err in &errors {
                warn!(error = %err, "feed unavailable");
            }
            bail!("no feed answered; backend at {} unreachable", config.base_url());
        }
        Err(e) if e.requires_login() => {
            bail!("{e}; sign in and run `rallypoint token set <TOKEN>`")
        }
        Err(e) => return Err(e.into()),
    };

    if json {
        println!("{}", snapshot_json(&snapshot, view.filter)?);
    } else {
        display::print_snapshot(&snapshot, view.filter, Utc::now());
    }
    Ok(())
}

fn snapshot_json(snapshot: &Snapshot, filter: CategoryFilter) -> anyhow::Result<String> {
    let now = Utc::now();
    let markers: Vec<serde_json::Value> = filter_markers(&snapshot.markers, filter)
        .into_iter()
        .map(|marker| -> Result<serde_json::Value, serde_json::Error> {
            let mut value = serde_json::to_value(marker)?;
            if let Some(obj) = value.as_object_mut() {
                obj.insert("key".into(), marker.key().to_string().into());
                if let Some(minutes) = marker.minutes_elapsed(now) {
                    obj.insert("minutes_elapsed".into(), minutes.into());
                }
            }
            Ok(value)
        })
        .collect::<Result<_, serde_json::Error>>()?;

    let body = serde_json::json!({
        "fetched_at": snapshot.fetched_at,
        "position": snapshot.position,
        "position_source": snapshot.position_source,
        "permission_denied": snapshot.permission_denied,
        "filter": filter.to_string(),
        "markers": markers,
        "unavailable": snapshot.errors.iter().map(|e| e.to_string()).collect::<Vec<_>>(),
        "rejected": snapshot.rejected.iter().map(|e| e.to_string()).collect::<Vec<_>>(),
    });
    Ok(serde_json::to_string_pretty(&body)?)
}

async fn watch(cli: &Cli, config: &MapConfig, view: &ViewArgs) -> anyhow::Result<()> {
    let pipeline = build_pipeline(&cli.state_dir, config, view.location())?;
    let mut scheduler = PollScheduler::new(Arc::new(pipeline), config.poll_interval())?;
    let mut events = scheduler.start()?;
    info!(url = config.base_url(), "watching live map, Ctrl-C to stop");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(SyncEvent::Snapshot { cycle, snapshot }) => {
                    display::print_cycle_line(cycle, &snapshot, view.filter);
                }
                Some(SyncEvent::Stale { cycle, errors }) => {
                    warn!(cycle, failed = errors.len(), "all feeds down, keeping previous markers");
                }
                Some(SyncEvent::Skipped { cycle, reason }) => {
                    warn!(cycle, %reason, "cycle skipped");
                }
                Some(SyncEvent::Halted(reason)) => {
                    scheduler.stop().await;
                    if reason.requires_login() {
                        bail!("{reason}; sign in and run `rallypoint token set <TOKEN>`");
                    }
                    bail!("sync halted: {reason}");
                }
                None => break,
            },
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for Ctrl-C")?;
                info!("interrupted, stopping");
                break;
            }
        }
    }

    scheduler.stop().await;
    if let Some(last) = scheduler.latest() {
        display::print_snapshot(&last, view.filter, Utc::now());
    }
    Ok(())
}

fn token(state_dir: &Path, action: &TokenAction) -> anyhow::Result<()> {
    let store = FileSessionStore::open(state_dir.join(SESSION_FILE));
    match action {
        TokenAction::Set { token, name } => {
            if token.trim().is_empty() {
                bail!("token must not be blank");
            }
            store.set(TOKEN_KEY, token.trim())?;
            store.set(SESSION_STARTED_KEY, &Utc::now().to_rfc3339())?;
            if let Some(name) = name {
                store.set(FULL_NAME_KEY, name)?;
            }
            println!("Token stored in {}", store.path().display());
        }
        TokenAction::Clear => {
            store.remove(SESSION_KEYS)?;
            println!("Signed out.");
        }
    }
    Ok(())
}
