//! scanward - Concurrent malware and integrity scan orchestration.
//!
//! Usage:
//!   scanward scan [PATH]        Run one scan session and print the report
//!   scanward watch [PATH]       Interactive session control from stdin
//!   scanward baseline [PATH]    Build an integrity baseline
//!   scanward engines            List detection engines and their availability
//!   scanward --help             Show help

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Context, Result, bail};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

use scanward_core::{EngineKind, ProgressEvent, ScanConfig, ScanRequest, ScanType};
use scanward_engine::{
    AdapterSet, Baseline, CommandAdapter, CommandSpec, IntegrityAdapter, SignatureAdapter,
};
use scanward_session::{
    LogSink, MemorySink, ReportSink, ScanSessionController, SessionEvent, SessionReport,
    StartOutcome,
};

/// Cadence of the cooperative dispatcher loop.
const TICK: Duration = Duration::from_millis(100);

#[derive(Parser)]
#[command(
    name = "scanward",
    version,
    about = "Concurrent malware and integrity scan orchestration",
    long_about = "scanward runs signature and integrity scans over a bounded pool of \
                  workers, with cooperative stop and re-queue.\n\n\
                  Logging is controlled with RUST_LOG (default: info)."
)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one scan session and print the report
    Scan {
        /// Path to scan
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Only scan high-risk file types
        #[arg(short, long)]
        quick: bool,

        /// Explicit scan category (quick, full, integrity, custom)
        #[arg(long)]
        category: Option<ScanType>,

        /// Override the number of concurrent engine invocations
        #[arg(short, long)]
        workers: Option<usize>,

        /// Write the session report as JSON
        #[arg(long)]
        json: Option<PathBuf>,

        #[command(flatten)]
        engines: EngineArgs,
    },

    /// Control sessions interactively (start, quick, stop, status, quit)
    Watch {
        /// Default path for start commands
        #[arg(default_value = ".")]
        path: PathBuf,

        #[command(flatten)]
        engines: EngineArgs,
    },

    /// Build an integrity baseline for a directory
    Baseline {
        /// Path to record
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// List detection engines and their availability
    Engines {
        /// Refresh definitions before probing
        #[arg(short, long)]
        update: bool,

        #[command(flatten)]
        engines: EngineArgs,
    },
}

#[derive(Args, Clone)]
struct EngineArgs {
    /// Signature database (`<blake3-hex> <threat-name>` per line)
    #[arg(long)]
    signatures: Option<PathBuf>,

    /// Integrity baseline produced by `scanward baseline`
    #[arg(long)]
    baseline: Option<PathBuf>,

    /// Use ClamAV's clamscan as the signature engine
    #[arg(long)]
    clamscan: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Scan {
            path,
            quick,
            category,
            workers,
            json,
            engines,
        } => {
            let mut request = ScanRequest::new(path).with_quick_scan(quick);
            if let Some(category) = category {
                request = request.with_category(category);
            }
            run_scan(config, request, workers, json, &engines).await?;
        }
        Command::Watch { path, engines } => {
            run_watch(config, path, &engines).await?;
        }
        Command::Baseline { path, output } => {
            run_baseline(&config, &path, &output)?;
        }
        Command::Engines { update, engines } => {
            run_engines(&config, update, &engines)?;
        }
    }

    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<ScanConfig> {
    match path {
        Some(path) => ScanConfig::load(path)
            .wrap_err_with(|| format!("Failed to load config from {}", path.display())),
        None => ScanConfig::load_or_default().wrap_err("Failed to load default config"),
    }
}

/// Assemble the engines named on the command line. Without any, clamscan
/// serves signature scans.
fn build_adapters(args: &EngineArgs, config: &ScanConfig) -> Result<AdapterSet> {
    let mut adapters = AdapterSet::new();

    if let Some(path) = &args.signatures {
        let adapter = SignatureAdapter::from_file(path, config.file_timeout)
            .wrap_err_with(|| format!("Failed to load signatures from {}", path.display()))?;
        adapters.insert(Arc::new(adapter));
    }
    if args.clamscan || !adapters.contains(EngineKind::Signature) {
        adapters.insert(Arc::new(CommandAdapter::new(
            CommandSpec::clamscan(),
            EngineKind::Signature,
            config.file_timeout,
        )));
    }
    if let Some(path) = &args.baseline {
        let adapter = IntegrityAdapter::from_file(path, config.file_timeout)
            .wrap_err_with(|| format!("Failed to load baseline from {}", path.display()))?;
        adapters.insert(Arc::new(adapter));
    }

    Ok(adapters)
}

/// Run a single session through the controller and print its report.
async fn run_scan(
    mut config: ScanConfig,
    request: ScanRequest,
    workers: Option<usize>,
    json: Option<PathBuf>,
    engines: &EngineArgs,
) -> Result<()> {
    if let Some(workers) = workers {
        config.max_workers = workers;
        config.validate()?;
    }
    let adapters = build_adapters(engines, &config)?;
    let sink = Arc::new(MemorySink::new());
    let mut controller = ScanSessionController::new(config, adapters, sink.clone());
    let mut events = controller.subscribe();

    let target = request.target.clone();
    match controller.start(request) {
        StartOutcome::Started(id) => {
            eprintln!("Scanning {} (session {id})...", target.display());
        }
        other => bail!("Could not start scan: {other:?}"),
    }

    let mut ticker = tokio::time::interval(TICK);
    let report = loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Some(report) = controller.tick() {
                    break report;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                if controller.stop() {
                    eprintln!("\nStopping, waiting for in-flight files...");
                }
            }
            event = events.recv() => match event {
                Ok(SessionEvent::Progress(progress)) => render_progress(&progress),
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => bail!("Session controller went away"),
            },
        }
    };
    eprintln!();

    print_report(&report);

    if let Some(output) = json {
        let content = serde_json::to_string_pretty(&report)?;
        std::fs::write(&output, content)
            .wrap_err_with(|| format!("Failed to write report to {}", output.display()))?;
        eprintln!("Report written to {}", output.display());
    }

    if report.result.has_threats() {
        std::process::exit(1);
    }
    Ok(())
}

/// Interactive dispatcher: reads commands from stdin while ticking the
/// controller, never blocking on the session.
async fn run_watch(config: ScanConfig, default_path: PathBuf, engines: &EngineArgs) -> Result<()> {
    let adapters = build_adapters(engines, &config)?;
    let reporter: Arc<dyn ReportSink> = Arc::new(LogSink);
    let mut controller = ScanSessionController::new(config, adapters, reporter);
    let mut events = controller.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = tokio::time::interval(TICK);

    eprintln!("Commands: start [PATH], quick [PATH], stop, status, quit");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                controller.tick();
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let mut words = line.split_whitespace();
                let command = words.next().unwrap_or_default();
                let path = words.next().map_or_else(|| default_path.clone(), PathBuf::from);

                match command {
                    "start" | "quick" => {
                        let request = ScanRequest::new(path).with_quick_scan(command == "quick");
                        println!("{:?}", controller.start(request));
                    }
                    "stop" => {
                        if !controller.stop() {
                            println!("Nothing to stop");
                        }
                    }
                    "status" => print_status(&controller),
                    "quit" | "exit" => break,
                    "" => {}
                    other => println!("Unknown command: {other}"),
                }
            }
            event = events.recv() => match event {
                Ok(SessionEvent::Started { session_id, scan_type }) => {
                    println!("Session {session_id} started ({scan_type})");
                }
                Ok(SessionEvent::Stopping { session_id }) => {
                    println!("Session {session_id} stopping");
                }
                Ok(SessionEvent::Queued { quick_scan, replaced }) => {
                    let kind = if quick_scan { "quick" } else { "full" };
                    let note = if replaced { ", replacing the previous request" } else { "" };
                    println!("Queued {kind} scan{note}");
                }
                Ok(SessionEvent::PendingDropped { quick_scan }) => {
                    let kind = if quick_scan { "quick" } else { "full" };
                    println!("Dropped queued {kind} scan in favour of a direct start");
                }
                Ok(
                    SessionEvent::Completed(report)
                    | SessionEvent::Stopped(report)
                    | SessionEvent::Failed(report),
                ) => println!("{}", report.headline()),
                Ok(SessionEvent::Progress(_)) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
        }
    }

    controller.shutdown();
    Ok(())
}

fn print_status(controller: &ScanSessionController) {
    match controller.session() {
        Some(session) => {
            let progress = controller.latest_progress();
            println!(
                "Session {} {} ({}) {:.1}% {}",
                session.id,
                session.state,
                session.scan_type,
                progress.percent,
                progress.message
            );
        }
        None => println!("Idle"),
    }
    if let Some(pending) = controller.pending() {
        let kind = if pending.quick_scan() { "quick" } else { "full" };
        println!("Pending: {kind} scan of {}", pending.request.target.display());
    }
    if let Some(report) = controller.last_report() {
        println!("Last: {}", report.headline());
    }
}

/// Hash every file under `path` and save the baseline.
fn run_baseline(config: &ScanConfig, path: &Path, output: &Path) -> Result<()> {
    eprintln!("Recording {}...", path.display());

    let token = scanward_scan::CancellationController::new().token();
    let enumeration = scanward_scan::enumerate_tasks(path, config, EngineKind::Integrity, &token)
        .wrap_err("Failed to enumerate baseline target")?;
    let total_size: u64 = enumeration.tasks.iter().map(|task| task.size).sum();
    let paths: Vec<PathBuf> = enumeration.tasks.into_iter().map(|task| task.path).collect();

    let (baseline, failures) = Baseline::build(&paths);
    for (path, error) in &failures {
        tracing::warn!(path = %path.display(), %error, "not recorded");
    }
    baseline
        .save(output)
        .wrap_err_with(|| format!("Failed to write baseline to {}", output.display()))?;

    println!(
        "Recorded {} files ({}) to {}",
        baseline.len(),
        format_size(total_size),
        output.display()
    );
    if !failures.is_empty() {
        println!("{} file(s) could not be read", failures.len());
    }
    Ok(())
}

fn run_engines(config: &ScanConfig, update: bool, engines: &EngineArgs) -> Result<()> {
    let adapters = build_adapters(engines, config)?;

    if update {
        for (name, updated) in adapters.update_all() {
            println!(" {name:<12} {}", if updated { "updated" } else { "update failed" });
        }
        println!();
    }

    for (name, available) in adapters.availability() {
        println!(" {name:<12} {}", if available { "available" } else { "unavailable" });
    }
    Ok(())
}

fn render_progress(progress: &ProgressEvent) {
    let path = progress.current_path.display().to_string();
    eprint!(
        "\r{:>5.1}% {:<14} {:<50}",
        progress.percent,
        progress.message,
        truncate(&path, 50)
    );
}

fn print_report(report: &SessionReport) {
    let result = &report.result;

    println!("{}", "─".repeat(60));
    println!(" {} - session {} {}", result.target.display(), report.session_id, report.outcome);
    println!(" {}", result.summary());
    println!("{}", "─".repeat(60));

    if !result.threats.is_empty() {
        println!();
        println!(" Threats:");
        for threat in &result.threats {
            println!(
                "   {} {} ({})",
                threat.verdict,
                threat.path.display(),
                threat.threat_name.as_deref().unwrap_or("unknown")
            );
        }
    }

    if !result.errors.is_empty() {
        println!();
        println!(" Errors:");
        for error in result.errors.iter().take(20) {
            println!(
                "   {} ({})",
                error.path.display(),
                error.detail.as_deref().unwrap_or("unknown error")
            );
        }
        if result.errors.len() > 20 {
            println!("   ... and {} more", result.errors.len() - 20);
        }
    }

    if !result.warnings.is_empty() {
        println!();
        println!("{} warning(s) during scan", result.warnings.len());
    }
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

/// Keep the tail of a string, which is the informative end of a path.
fn truncate(s: &str, max_len: usize) -> String {
    let count = s.chars().count();
    if count <= max_len {
        s.to_string()
    } else {
        let tail: String = s.chars().skip(count - max_len + 1).collect();
        format!("…{tail}")
    }
}
