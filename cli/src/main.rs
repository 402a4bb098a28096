//! Depot CLI - run the startup sequence once and report readiness.
//!
//! ```text
//! main() -> DepotConfig::load() -> StartupServices -> run_startup() -> checklist | JSON
//! ```
//!
//! Exit status is `0` when the run is ready, `1` when it is not, and `130`
//! when it was interrupted with Ctrl-C.
//!
//! The database probe, reference feeds and services wired up here are
//! in-memory stand-ins so the sequence can be exercised without a depot
//! backend.

use anyhow::{Context, Result, bail};
use std::{
    env,
    fs::{self, OpenOptions},
    path::PathBuf,
    process::ExitCode,
    sync::{Arc, Mutex},
    time::Duration,
};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use depot_config::DepotConfig;
use depot_engine::{
    AsyncInitializable, Bus, CancellationToken, ConfigProvider, Driver, ProgressSink,
    ReferenceData, ReferenceLoaders, Route, ServiceFut, StartupOptions, StartupResult,
    StartupServices, StartupStatus, StaticLoader, StaticProbe, Student, TracingProgress,
    generate_checklist, run_startup,
};

const LOG_FILE_ENV: &str = "DEPOT_LOG_FILE";
const USAGE: &str = "usage: depot [--config PATH] [--json] [--smooth]";

/// Command-line switches.
#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    json: bool,
    smooth: bool,
}

impl Args {
    fn parse(mut raw: impl Iterator<Item = String>) -> Result<Self> {
        let mut args = Self::default();
        while let Some(arg) = raw.next() {
            match arg.as_str() {
                "--json" => args.json = true,
                "--smooth" => args.smooth = true,
                "--config" => {
                    let path = raw.next().context("--config needs a path")?;
                    args.config = Some(PathBuf::from(path));
                }
                "-h" | "--help" => {
                    println!("{USAGE}");
                    std::process::exit(0);
                }
                other => bail!("unknown argument '{other}'\n{USAGE}"),
            }
        }
        Ok(args)
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (log_file, init_warning) = open_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        return;
    }

    // stdout carries the checklist or JSON, so logs go to stderr.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
    if let Some(warning) = init_warning {
        tracing::warn!("{warning}");
    }
}

fn open_log_file() -> (Option<(PathBuf, fs::File)>, Option<String>) {
    let Some(path) = env::var_os(LOG_FILE_ENV).map(PathBuf::from) else {
        return (None, None);
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && let Err(e) = fs::create_dir_all(parent)
    {
        return (
            None,
            Some(format!("Failed to create log dir {}: {e}", parent.display())),
        );
    }

    match OpenOptions::new().create(true).append(true).open(&path) {
        Ok(file) => (Some((path, file)), None),
        Err(e) => (
            None,
            Some(format!("Failed to open log file {}: {e}", path.display())),
        ),
    }
}

// ============================================================================
// In-memory collaborators
// ============================================================================

/// Stand-in for the route planner, which warms its graph on start.
struct RoutePlanner;

impl AsyncInitializable for RoutePlanner {
    fn name(&self) -> &str {
        "route-planner"
    }

    fn initialize<'a>(&'a self, cancel: &'a CancellationToken) -> ServiceFut<'a, ()> {
        Box::pin(async move {
            tokio::select! {
                () = tokio::time::sleep(Duration::from_millis(120)) => Ok(()),
                () = cancel.cancelled() => bail!("route planner start interrupted"),
            }
        })
    }
}

fn demo_loaders() -> ReferenceLoaders {
    let delay = Duration::from_millis(80);
    ReferenceLoaders {
        buses: Arc::new(
            StaticLoader::new(vec![
                Bus {
                    id: 1,
                    registration: "FLT-001".to_string(),
                    capacity: 48,
                },
                Bus {
                    id: 2,
                    registration: "FLT-002".to_string(),
                    capacity: 32,
                },
            ])
            .with_delay(delay),
        ),
        drivers: Arc::new(
            StaticLoader::new(vec![Driver {
                id: 7,
                name: "Ana Ruiz".to_string(),
                license_number: "D-5531".to_string(),
            }])
            .with_delay(delay),
        ),
        routes: Arc::new(
            StaticLoader::new(vec![Route {
                id: 3,
                name: "North loop".to_string(),
                stops: vec!["Depot".to_string(), "Elm St".to_string(), "Harbor".to_string()],
            }])
            .with_delay(delay),
        ),
        students: Arc::new(
            StaticLoader::new(vec![Student {
                id: 11,
                name: "Sam Okafor".to_string(),
                route_id: Some(3),
            }])
            .with_delay(delay),
        ),
    }
}

fn build_services(config: Arc<dyn ConfigProvider>, options: &StartupOptions) -> StartupServices {
    let probe = StaticProbe::reachable().with_delay(Duration::from_millis(40));
    let reference = ReferenceData::new(demo_loaders(), options.startup.reference_data_ttl());
    StartupServices::new(Arc::new(probe), config, reference)
        .with_initializable(Arc::new(RoutePlanner))
}

// ============================================================================
// Entry point
// ============================================================================

fn exit_code(result: &StartupResult) -> ExitCode {
    match result.status() {
        StartupStatus::Cancelled => ExitCode::from(130),
        _ if result.is_ready() => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse(env::args().skip(1))?;
    init_tracing();

    let config = match &args.config {
        Some(path) => DepotConfig::load_from(path)?,
        None => DepotConfig::load()?.unwrap_or_default(),
    };
    let mut options = StartupOptions::from_config(&config);
    if args.smooth {
        options.startup.smooth_progress = true;
    }
    let services = build_services(Arc::new(config), &options);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received; cancelling startup");
                cancel.cancel();
            }
        });
    }

    let console = |percent: u8, message: &str| eprintln!("[{percent:>3}%] {message}");
    let sink: &dyn ProgressSink = if args.json { &TracingProgress } else { &console };

    let result = run_startup(&services, &options, &cancel, sink).await?;
    services.reference().shutdown();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", generate_checklist(&result));
    }

    Ok(exit_code(&result))
}
