//! Sightline - movement analytics for tracked identifiers
//!
//! The `sightline` binary reads a JSON dataset of sightings and movement
//! samples and prints:
//! - Route profiles and anomaly findings per identifier
//! - Risk assessments, optionally scored by a linear model
//! - Batch trend insights and descriptive summaries
//! - The effective configuration and output schemas

use chrono::{DateTime, Utc};
use clap::error::ErrorKind;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use sl_common::error::format_error_human;
use sl_common::{Identifier, OutputFormat, StructuredError, TimeWindow, SCHEMA_VERSION};
use sl_core::config::{load_config, ConfigError, ConfigSnapshot, ResolvedConfig};
use sl_core::engine::AnalyticsEngine;
use sl_core::exit_codes::ExitCode;
use sl_core::inference::{InferenceBackend, InferenceWorker, LazyBackend, LinearModel};
use sl_core::log_event;
use sl_core::logging::{
    event_names, generate_run_id, init_logging, LogConfig, LogContext, LogFormat, LogLevel, Stage,
};
use sl_core::schema;
use sl_core::store::{MemoryStore, SampleStore, StoreError};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Sightline - route profiling, anomaly detection and risk scoring
#[derive(Parser)]
#[command(name = "sightline")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Analytics config file (TOML or JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "json")]
    format: OutputFormat,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log format on stderr (human, jsonl)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,
}

#[derive(Subcommand)]
enum Commands {
    /// Route profile for one identifier
    Profile(ProfileArgs),

    /// Anomaly findings for one identifier
    Anomalies(AnomaliesArgs),

    /// Profile, findings and risk assessment for one or more identifiers
    Assess(AssessArgs),

    /// Trend insights over all sightings in range
    Trends(TrendsArgs),

    /// Descriptive statistics over all sightings in range
    Summary(DataArgs),

    /// Configuration management
    Config(ConfigArgs),

    /// Print JSON schemas for output types
    Schema(SchemaArgs),
}

#[derive(Args, Debug)]
struct DataArgs {
    /// Dataset file: {"sightings": [...], "samples": [...]}
    #[arg(long)]
    data: PathBuf,

    /// Ignore records captured before this instant (RFC 3339)
    #[arg(long)]
    since: Option<DateTime<Utc>>,

    /// Ignore records captured after this instant (RFC 3339)
    #[arg(long)]
    until: Option<DateTime<Utc>>,
}

impl DataArgs {
    fn window(&self) -> TimeWindow {
        TimeWindow::new(self.since, self.until)
    }
}

#[derive(Args, Debug)]
struct ProfileArgs {
    #[command(flatten)]
    data: DataArgs,

    /// Identifier (plate) to profile
    #[arg(long)]
    id: String,
}

#[derive(Args, Debug)]
struct AnomaliesArgs {
    #[command(flatten)]
    data: DataArgs,

    /// Identifier (plate) to check
    #[arg(long)]
    id: String,

    /// Reference instant for the analysis (RFC 3339, defaults to now)
    #[arg(long)]
    now: Option<DateTime<Utc>>,
}

#[derive(Args, Debug)]
struct AssessArgs {
    #[command(flatten)]
    data: DataArgs,

    /// Identifier (plate) to assess; repeat for several
    #[arg(long = "id", required_unless_present = "all")]
    ids: Vec<String>,

    /// Assess every identifier in the dataset
    #[arg(long, conflicts_with = "ids")]
    all: bool,

    /// Linear model weights (JSON) used for risk scoring
    #[arg(long)]
    model: Option<PathBuf>,

    /// Run the model on a dedicated worker thread
    #[arg(long, requires = "model")]
    worker: bool,

    /// Reference instant for the analysis (RFC 3339, defaults to now)
    #[arg(long)]
    now: Option<DateTime<Utc>>,
}

#[derive(Args, Debug)]
struct TrendsArgs {
    #[command(flatten)]
    data: DataArgs,

    /// Profile every identifier in range and attach finding counts
    #[arg(long)]
    with_findings: bool,

    /// Reference instant for the analysis (RFC 3339, defaults to now)
    #[arg(long)]
    now: Option<DateTime<Utc>>,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show the effective configuration and where it came from
    Show,
    /// Validate a configuration file
    Validate {
        /// File to validate (defaults to the resolved config)
        path: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct SchemaArgs {
    /// Type name to print
    name: Option<String>,

    /// List available type names
    #[arg(long, conflicts_with = "name")]
    list: bool,

    /// Print every schema
    #[arg(long, conflicts_with_all = ["name", "list"])]
    all: bool,
}

/// Per-invocation state shared by the command handlers.
struct Run {
    ctx: LogContext,
    command: &'static str,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::Clean,
                _ => ExitCode::ArgsError,
            };
            let _ = e.print();
            std::process::exit(code.as_i32());
        }
    };

    let log_level = if cli.global.quiet {
        Some(LogLevel::Error)
    } else {
        match cli.global.verbose {
            0 => None,
            1 => Some(LogLevel::Debug),
            _ => Some(LogLevel::Trace),
        }
    };
    init_logging(&LogConfig::from_env(log_level, cli.global.log_format));

    let run = Run {
        ctx: LogContext::new(generate_run_id()),
        command: command_name(&cli.command),
    };
    log_event!(
        run.ctx,
        DEBUG,
        event_names::RUN_STARTED,
        Stage::Init,
        "sightline run started",
        command = run.command
    );

    let exit_code = match &cli.command {
        Commands::Profile(args) => run_profile(&cli.global, &run, args),
        Commands::Anomalies(args) => run_anomalies(&cli.global, &run, args),
        Commands::Assess(args) => run_assess(&cli.global, &run, args),
        Commands::Trends(args) => run_trends(&cli.global, &run, args),
        Commands::Summary(args) => run_summary(&cli.global, &run, args),
        Commands::Config(args) => match &args.command {
            ConfigCommands::Show => run_config_show(&cli.global, &run),
            ConfigCommands::Validate { path } => {
                run_config_validate(&cli.global, &run, path.as_deref())
            }
        },
        Commands::Schema(args) => run_schema(&cli.global, &run, args),
    };

    log_event!(
        run.ctx,
        DEBUG,
        event_names::RUN_FINISHED,
        Stage::Output,
        "sightline run finished",
        command = run.command,
        exit_code = exit_code.as_i32()
    );
    std::process::exit(exit_code.as_i32());
}

fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Profile(_) => "profile",
        Commands::Anomalies(_) => "anomalies",
        Commands::Assess(_) => "assess",
        Commands::Trends(_) => "trends",
        Commands::Summary(_) => "summary",
        Commands::Config(_) => "config",
        Commands::Schema(_) => "schema",
    }
}

// ============================================================================
// Analytics commands
// ============================================================================

/// Everything an analytics command needs once inputs are loaded.
struct Session {
    resolved: ResolvedConfig,
    store: Arc<MemoryStore>,
    engine: AnalyticsEngine,
}

impl Session {
    fn snapshot(&self) -> ConfigSnapshot {
        self.resolved.snapshot()
    }
}

fn open_session(global: &GlobalOpts, run: &Run, data: &DataArgs) -> Result<Session, ExitCode> {
    let resolved = match load_config(global.config.as_deref()) {
        Ok(r) => r,
        Err(e) => return Err(output_config_error(global, run, &e)),
    };

    let store = match open_store(run, &data.data) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            let exit = match e {
                StoreError::Parse(_) => ExitCode::ArgsError,
                _ => ExitCode::IoError,
            };
            return Err(output_error(global, run, &e.into(), exit));
        }
    };

    let shared: Arc<dyn SampleStore> = store.clone();
    let engine = match AnalyticsEngine::new(shared, resolved.config.clone()) {
        Ok(engine) => engine,
        Err(e) => {
            let exit = ExitCode::from(&e);
            return Err(output_error(global, run, &e, exit));
        }
    };

    Ok(Session {
        resolved,
        store,
        engine,
    })
}

fn open_store(run: &Run, path: &Path) -> Result<MemoryStore, StoreError> {
    let store = MemoryStore::from_file(path)?;
    let (sightings, samples) = store.counts()?;
    log_event!(
        run.ctx,
        DEBUG,
        event_names::STORE_LOADED,
        Stage::Load,
        "dataset loaded",
        path = tracing::field::display(path.display()),
        sightings = sightings,
        samples = samples
    );
    Ok(store)
}

fn run_profile(global: &GlobalOpts, run: &Run, args: &ProfileArgs) -> ExitCode {
    let session = match open_session(global, run, &args.data) {
        Ok(s) => s,
        Err(code) => return code,
    };

    let identifier = Identifier::new(&args.id).normalized();
    let profile = session
        .engine
        .profile_identifier(&identifier, args.data.window());

    let line = format!(
        "{}: {} samples, {:.0} m, {:.1} km/h, variation {:.4}, {} frequent, {} flagged",
        identifier,
        profile.sample_count,
        profile.total_distance_m,
        profile.average_speed_kmh,
        profile.route_variation,
        profile.frequent_locations.len(),
        profile.flagged_movements.len(),
    );
    emit(global, run, &session.snapshot(), "profile", &profile, vec![line])
}

fn run_anomalies(global: &GlobalOpts, run: &Run, args: &AnomaliesArgs) -> ExitCode {
    let session = match open_session(global, run, &args.data) {
        Ok(s) => s,
        Err(code) => return code,
    };

    let identifier = Identifier::new(&args.id).normalized();
    let now = args.now.unwrap_or_else(Utc::now);
    let findings = session
        .engine
        .findings_for(&identifier, args.data.window(), now);

    let mut lines: Vec<String> = findings
        .iter()
        .map(|f| {
            format!(
                "{}: {:?} ({:?})",
                f.identifier, f.anomaly_type, f.severity
            )
        })
        .collect();
    if lines.is_empty() {
        lines.push(format!("{}: no anomalies", identifier));
    }
    emit(global, run, &session.snapshot(), "findings", &findings, lines)
}

fn run_assess(global: &GlobalOpts, run: &Run, args: &AssessArgs) -> ExitCode {
    let session = match open_session(global, run, &args.data) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let snapshot = session.snapshot();
    let Session { store, engine, .. } = session;

    let engine = match &args.model {
        Some(path) => match model_backend(path, args.worker) {
            Ok(backend) => engine.with_inference(backend),
            Err(e) => return output_error(global, run, &e, ExitCode::ArgsError),
        },
        None => engine,
    };

    let identifiers: Vec<Identifier> = if args.all {
        match store.identifiers() {
            Ok(ids) => ids,
            Err(e) => return output_error(global, run, &e.into(), ExitCode::InternalError),
        }
    } else {
        args.ids.iter().map(Identifier::new).collect()
    };

    let now = args.now.unwrap_or_else(Utc::now);
    let reports = engine.analyze_batch(&identifiers, args.data.window(), now);

    let lines = reports.iter().map(|r| r.summary_line()).collect();
    emit(global, run, &snapshot, "reports", &reports, lines)
}

fn model_backend(path: &Path, worker: bool) -> Result<Arc<dyn InferenceBackend>, sl_common::Error> {
    if !path.is_file() {
        return Err(sl_common::Error::ModelUnavailable(format!(
            "model file not found: {}",
            path.display()
        )));
    }

    let path = path.to_path_buf();
    if worker {
        let worker = InferenceWorker::spawn("linear", move || LinearModel::from_file(&path))?;
        Ok(Arc::new(worker))
    } else {
        Ok(Arc::new(LazyBackend::new("linear", move || {
            LinearModel::from_file(&path).map(|m| Arc::new(m) as Arc<dyn InferenceBackend>)
        })))
    }
}

fn run_trends(global: &GlobalOpts, run: &Run, args: &TrendsArgs) -> ExitCode {
    let session = match open_session(global, run, &args.data) {
        Ok(s) => s,
        Err(code) => return code,
    };

    let now = args.now.unwrap_or_else(Utc::now);
    let insights = session
        .engine
        .trends(args.data.window(), args.with_findings, now);

    let mut lines: Vec<String> = insights
        .iter()
        .map(|i| {
            format!(
                "{:?}: {:?}, {} affected, {} .. {}",
                i.trend_type,
                i.intensity,
                i.affected_count,
                i.start.to_rfc3339(),
                i.end.to_rfc3339(),
            )
        })
        .collect();
    if lines.is_empty() {
        lines.push("no sightings in range".to_string());
    }
    emit(global, run, &session.snapshot(), "insights", &insights, lines)
}

fn run_summary(global: &GlobalOpts, run: &Run, args: &DataArgs) -> ExitCode {
    let session = match open_session(global, run, args) {
        Ok(s) => s,
        Err(code) => return code,
    };

    let summary = session.engine.summary(args.window());
    let line = summary.summary_line();
    emit(global, run, &session.snapshot(), "summary", &summary, vec![line])
}

// ============================================================================
// Config and schema commands
// ============================================================================

fn run_config_show(global: &GlobalOpts, run: &Run) -> ExitCode {
    let resolved = match load_config(global.config.as_deref()) {
        Ok(r) => r,
        Err(e) => return output_config_error(global, run, &e),
    };
    let snapshot = resolved.snapshot();

    match global.format {
        OutputFormat::Summary => {
            println!(
                "config {} from {} (schema {}, {})",
                snapshot.short_id(),
                snapshot.source,
                snapshot.schema_version,
                snapshot.path.as_deref().unwrap_or("built-in defaults"),
            );
            ExitCode::Clean
        }
        _ => {
            let response = serde_json::json!({
                "schema_version": SCHEMA_VERSION,
                "run_id": &run.ctx.run_id,
                "generated_at": Utc::now().to_rfc3339(),
                "source": {
                    "path": &snapshot.path,
                    "origin": &snapshot.source,
                    "hash": &snapshot.hash,
                    "using_defaults": resolved.is_default(),
                },
                "config": &resolved.config,
            });
            print_json(global, &response)
        }
    }
}

fn run_config_validate(global: &GlobalOpts, run: &Run, path: Option<&Path>) -> ExitCode {
    let target = path.or(global.config.as_deref());
    let resolved = match load_config(target) {
        Ok(r) => r,
        Err(e) => return output_config_error(global, run, &e),
    };
    let snapshot = resolved.snapshot();

    match global.format {
        OutputFormat::Summary => {
            println!(
                "valid: {} ({})",
                snapshot.path.as_deref().unwrap_or("built-in defaults"),
                snapshot.short_id()
            );
            ExitCode::Clean
        }
        _ => {
            let response = serde_json::json!({
                "schema_version": SCHEMA_VERSION,
                "run_id": &run.ctx.run_id,
                "generated_at": Utc::now().to_rfc3339(),
                "status": "valid",
                "snapshot": &snapshot,
            });
            print_json(global, &response)
        }
    }
}

fn run_schema(global: &GlobalOpts, run: &Run, args: &SchemaArgs) -> ExitCode {
    if args.all {
        return print_json(global, &schema::generate_all_schemas());
    }

    let Some(name) = args.name.as_deref().filter(|_| !args.list) else {
        return run_schema_list(global);
    };

    match schema::generate_schema(name) {
        Some(schema) => print_json(global, &schema),
        None => {
            let err = sl_common::Error::Config(format!(
                "unknown schema type '{}' (see `sightline schema --list`)",
                name
            ));
            output_error(global, run, &err, ExitCode::ArgsError)
        }
    }
}

fn run_schema_list(global: &GlobalOpts) -> ExitCode {
    let available = schema::available_schemas();
    if global.format == OutputFormat::Summary {
        for (name, description) in available {
            println!("{:20} {}", name, description);
        }
        return ExitCode::Clean;
    }

    let types: Vec<Value> = available
        .into_iter()
        .map(|(name, description)| serde_json::json!({ "name": name, "description": description }))
        .collect();
    print_json(global, &serde_json::json!({ "types": types }))
}

// ============================================================================
// Output
// ============================================================================

/// Print a command result.
///
/// - json: one pretty document with run metadata and the result under `key`
/// - jsonl: one compact line per item (or one line for a single object)
/// - summary: the given human-readable lines
fn emit<T: Serialize>(
    global: &GlobalOpts,
    run: &Run,
    snapshot: &ConfigSnapshot,
    key: &str,
    result: &T,
    summary: Vec<String>,
) -> ExitCode {
    let value = match serde_json::to_value(result) {
        Ok(v) => v,
        Err(e) => return output_error(global, run, &e.into(), ExitCode::InternalError),
    };

    match global.format {
        OutputFormat::Json => {
            let mut response = serde_json::json!({
                "schema_version": SCHEMA_VERSION,
                "run_id": &run.ctx.run_id,
                "command": run.command,
                "generated_at": Utc::now().to_rfc3339(),
                "config": {
                    "id": snapshot.short_id(),
                    "source": &snapshot.source,
                    "hash": &snapshot.hash,
                },
            });
            response[key] = value;
            print_json(global, &response)
        }
        OutputFormat::Jsonl => {
            match value {
                Value::Array(items) => {
                    for item in items {
                        println!("{}", item);
                    }
                }
                other => println!("{}", other),
            }
            ExitCode::Clean
        }
        OutputFormat::Summary => {
            for line in summary {
                println!("{}", line);
            }
            ExitCode::Clean
        }
    }
}

fn print_json<T: Serialize>(global: &GlobalOpts, value: &T) -> ExitCode {
    let rendered = match global.format {
        OutputFormat::Jsonl => serde_json::to_string(value),
        _ => serde_json::to_string_pretty(value),
    };
    match rendered {
        Ok(text) => {
            println!("{}", text);
            ExitCode::Clean
        }
        Err(e) => {
            eprintln!("{}", format_error_human(&e.into()));
            ExitCode::InternalError
        }
    }
}

/// Report an error on stderr in the selected format.
fn output_error(
    global: &GlobalOpts,
    run: &Run,
    error: &sl_common::Error,
    exit_code: ExitCode,
) -> ExitCode {
    log_event!(
        run.ctx,
        ERROR,
        event_names::RUN_FAILED,
        Stage::Output,
        "command failed",
        command = run.command,
        error = tracing::field::display(error),
        exit_code = exit_code.as_i32()
    );

    match global.format {
        OutputFormat::Summary => {
            eprintln!("{}", format_error_human(error));
        }
        OutputFormat::Json | OutputFormat::Jsonl => {
            let response = serde_json::json!({
                "schema_version": SCHEMA_VERSION,
                "run_id": &run.ctx.run_id,
                "generated_at": Utc::now().to_rfc3339(),
                "status": "error",
                "exit_code": exit_code.code_name(),
                "error": StructuredError::from(error),
            });
            eprintln!("{}", response);
        }
    }

    exit_code
}

fn output_config_error(global: &GlobalOpts, run: &Run, error: &ConfigError) -> ExitCode {
    log_event!(
        run.ctx,
        ERROR,
        event_names::CONFIG_ERROR,
        Stage::Init,
        "configuration rejected",
        error = tracing::field::display(error)
    );
    output_error(
        global,
        run,
        &sl_common::Error::from(error),
        ExitCode::ConfigError,
    )
}
