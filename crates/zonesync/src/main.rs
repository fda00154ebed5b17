// # zonesync - Re2o to Gandi LiveDNS synchronisation
//
// One-shot command, meant to run from cron or a systemd timer.
//
// This binary is a THIN integration layer:
// 1. Parse the command line and initialise logging
// 2. Load and validate `config.toml`
// 3. Take the run lock
// 4. Build the Re2o source, the ledger store and one Gandi provider per zone
// 5. Run `SyncEngine::sync_zone` for every zone, one after the other
// 6. Tell Re2o the DNS service is regenerated, when every zone converged
//
// All reconciliation logic lives in zonesync-core.
//
// ## Example
//
// ```bash
// zonesync --config-dir /etc/zonesync --dry-run
// ZONESYNC_LOG=zonesync_core=debug,info zonesync --config-dir /etc/zonesync
// ```

mod lock;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use zonesync_core::traits::{RecordSource, StateStore, StatusNotifier};
use zonesync_core::{Config, EngineOptions, FileStateStore, SyncEngine};
use zonesync_provider_gandi::GandiProvider;
use zonesync_source_re2o::Re2oSource;

use crate::lock::RunLock;

/// Environment variable holding a full `tracing` filter directive
const LOG_ENV_VAR: &str = "ZONESYNC_LOG";

/// Exit codes for the different run outcomes
///
/// - 0: Every zone converged
/// - 1: Configuration or startup error
/// - 2: A zone run failed before applying anything
/// - 3: A zone stopped part-way through its operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ZonesyncExitCode {
    /// Every selected zone synchronised
    Success = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Source, provider or ledger failure
    RunFailure = 2,
    /// Some operations committed, then one failed
    PartialApply = 3,
}

impl From<ZonesyncExitCode> for ExitCode {
    fn from(code: ZonesyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Synchronise Re2o DNS records with Gandi LiveDNS."
)]
struct Cli {
    /// Directory holding config.toml and, by default, the ledgers.
    #[arg(long, default_value = ".")]
    config_dir: PathBuf,

    /// Log the operations without applying them or saving the ledgers.
    #[arg(long)]
    dry_run: bool,

    /// Do not clear the Re2o regeneration flag after a successful run.
    #[arg(long)]
    no_notify: bool,

    /// Only synchronise this zone (repeatable).
    #[arg(long = "zone", value_name = "NAME")]
    zones: Vec<String>,

    /// Log verbosity; ZONESYNC_LOG overrides it.
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// How a single zone run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ZoneOutcome {
    /// Plan applied (or simulated) in full
    Synced,
    /// Zone served by Re2o but absent from the configuration
    Skipped,
    /// Some operations committed before one failed
    Partial,
    /// Aborted before applying anything
    Failed,
}

/// Overall exit code for a set of zone outcomes
///
/// A failed zone outranks a partial one; skipped zones do not count.
fn exit_code(outcomes: &[ZoneOutcome]) -> ZonesyncExitCode {
    if outcomes.contains(&ZoneOutcome::Failed) {
        ZonesyncExitCode::RunFailure
    } else if outcomes.contains(&ZoneOutcome::Partial) {
        ZonesyncExitCode::PartialApply
    } else {
        ZonesyncExitCode::Success
    }
}

/// Why the Re2o regeneration flag must stay set, or `None` to clear it
///
/// The flag covers the whole DNS service, so it is cleared only when every
/// zone Re2o serves was synchronised in a live run.
fn notify_withheld(
    cli: &Cli,
    unselected: usize,
    outcomes: &[ZoneOutcome],
) -> Option<&'static str> {
    if cli.dry_run {
        Some("dry run")
    } else if cli.no_notify {
        Some("--no-notify given")
    } else if exit_code(outcomes) != ZonesyncExitCode::Success {
        Some("some zones did not synchronise")
    } else if unselected > 0 {
        Some("some Re2o zones were not selected with --zone")
    } else if outcomes.contains(&ZoneOutcome::Skipped) {
        Some("some Re2o zones are missing from the configuration")
    } else {
        None
    }
}

fn init_tracing(level: LogLevel) -> Result<()> {
    let filter = match std::env::var(LOG_ENV_VAR) {
        Ok(directive) => EnvFilter::try_new(&directive)
            .with_context(|| format!("Invalid {} directive '{}'", LOG_ENV_VAR, directive))?,
        Err(_) => EnvFilter::new(level.as_directive()),
    };

    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.log_level) {
        eprintln!("Logging setup error: {:#}", e);
        return ZonesyncExitCode::ConfigError.into();
    }

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return ZonesyncExitCode::ConfigError.into();
        }
    };

    rt.block_on(run(cli)).into()
}

/// Load and validate the configuration
fn load_config(config_dir: &Path) -> Result<Config> {
    debug!("Fetching configuration from {}", config_dir.display());
    let config = Config::load_from_dir(config_dir)?;
    config.validate().context("Configuration validation error")?;
    Ok(config)
}

/// Everything a zone run needs, built once
struct RunContext {
    config: Config,
    source: Arc<Re2oSource>,
    store: Arc<FileStateStore>,
    _lock: RunLock,
}

async fn startup(cli: &Cli) -> Result<RunContext> {
    let config = load_config(&cli.config_dir)?;
    let lock = RunLock::acquire(&cli.config_dir)?;

    let mut source = Re2oSource::new(&config.re2o, &config.http)?;
    for (zone, settings) in &config.gandi.zone {
        if let Some(ttl) = settings.ttl {
            source = source.with_zone_ttl(zone, ttl);
        }
    }

    let state_dir = config.state_directory(&cli.config_dir);
    let store = FileStateStore::new(&state_dir)
        .await
        .with_context(|| format!("Failed to open ledger directory {}", state_dir.display()))?;

    Ok(RunContext {
        config,
        source: Arc::new(source),
        store: Arc::new(store),
        _lock: lock,
    })
}

async fn run(cli: Cli) -> ZonesyncExitCode {
    let context = match startup(&cli).await {
        Ok(context) => context,
        Err(e) => {
            error!("Startup error: {:#}", e);
            return ZonesyncExitCode::ConfigError;
        }
    };

    info!(
        "Starting zonesync [mode: {}]",
        if cli.dry_run { "DRY-RUN" } else { "LIVE" }
    );

    let zones = match context.source.list_zones().await {
        Ok(zones) => zones,
        Err(e) => {
            error!("Failed to list Re2o zones: {}", e);
            return ZonesyncExitCode::RunFailure;
        }
    };

    for wanted in &cli.zones {
        if !zones.contains(wanted) {
            warn!("Zone {} was requested but is not served by Re2o", wanted);
        }
    }

    let mut outcomes = Vec::new();
    let mut unselected = 0;
    for zone in &zones {
        if !cli.zones.is_empty() && !cli.zones.contains(zone) {
            debug!("Skipping zone {} (not selected)", zone);
            unselected += 1;
            continue;
        }
        outcomes.push(sync_zone(&context, zone, cli.dry_run).await);
    }

    let code = exit_code(&outcomes);
    info!(
        "Finished: {} synced, {} skipped, {} partial, {} failed",
        count(&outcomes, ZoneOutcome::Synced),
        count(&outcomes, ZoneOutcome::Skipped),
        count(&outcomes, ZoneOutcome::Partial),
        count(&outcomes, ZoneOutcome::Failed)
    );

    if let Some(reason) = notify_withheld(&cli, unselected, &outcomes) {
        info!("Leaving the Re2o regeneration flag set: {}", reason);
        return code;
    }

    let service = &context.config.re2o.service_name;
    if let Err(e) = context.source.notify_success(service).await {
        error!("Failed to notify Re2o that {} is regenerated: {}", service, e);
        return ZonesyncExitCode::RunFailure;
    }

    code
}

fn count(outcomes: &[ZoneOutcome], wanted: ZoneOutcome) -> usize {
    outcomes.iter().filter(|o| **o == wanted).count()
}

/// Run the engine for one zone
async fn sync_zone(context: &RunContext, zone: &str, dry_run: bool) -> ZoneOutcome {
    if context.config.zone(zone).is_none() {
        error!("Could not find zone named {} in configuration", zone);
        return ZoneOutcome::Skipped;
    }

    let Some(api_key) = context.config.gandi.api_key_for(zone) else {
        error!("No Gandi API key for zone {}", zone);
        return ZoneOutcome::Failed;
    };

    let api_url = &context.config.gandi.api_url;
    let provider = match GandiProvider::new(api_key, api_url, &context.config.http) {
        Ok(provider) => provider,
        Err(e) => {
            error!("Failed to build Gandi client for zone {}: {}", zone, e);
            return ZoneOutcome::Failed;
        }
    };

    let source: Arc<dyn RecordSource> = context.source.clone();
    let store: Arc<dyn StateStore> = context.store.clone();
    let options = EngineOptions {
        dry_run,
        ..EngineOptions::default()
    };

    let (engine, mut events) = match SyncEngine::new(source, Box::new(provider), store, options) {
        Ok(pair) => pair,
        Err(e) => {
            error!("Failed to build engine for zone {}: {}", zone, e);
            return ZoneOutcome::Failed;
        }
    };

    let result = engine.sync_zone(zone).await;

    while let Ok(event) = events.try_recv() {
        debug!("Engine event: {:?}", event);
    }

    match result {
        Ok(report) => {
            info!(
                "Zone {}: {} operation(s) {}, {} shadowed",
                zone,
                report.plan.operations.len(),
                if dry_run { "simulated" } else { "applied" },
                report.plan.shadowed.len()
            );
            ZoneOutcome::Synced
        }
        Err(e) if e.is_partial() => {
            error!("Zone {} partially applied: {}", zone, e);
            ZoneOutcome::Partial
        }
        Err(e) => {
            error!("Zone {} failed: {}", zone, e);
            ZoneOutcome::Failed
        }
    }
}
