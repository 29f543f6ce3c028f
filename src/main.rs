//! Pipeline runner CLI
//!
//! Entry point for the `pipeline-runner` command-line tool.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};

use pipeline_job_runner::archive::{compress, detect_kind, extract, CompressionKind};
use pipeline_job_runner::config::{EffectiveConfig, RunnerConfig};
use pipeline_job_runner::logging::{self, LOG_TAG};
use pipeline_job_runner::pipeline::{CycleOutcome, JobRunner, PipelineError, RunnerOptions};
use pipeline_job_runner::signal::SignalHandler;
use pipeline_job_runner::store::{JobService, LocalStore, ObjectStore};
use pipeline_protocol::ops::Job;
use pipeline_protocol::QUERY_PARAM_PROJECT;

#[derive(Parser)]
#[command(name = "pipeline-runner")]
#[command(about = "Polling job runner for a CI pipeline orchestrator", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll for work items and process them
    Run {
        /// Path to config file
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,

        /// Log level when RUST_LOG is unset (default: info)
        #[arg(long)]
        log_level: Option<String>,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Pack a directory into an archive
    Pack {
        /// Directory to pack
        dir: PathBuf,

        /// Archive format: none, zip, tar or tar-gz
        #[arg(long, short = 'f', default_value = "zip")]
        format: CompressionKind,

        /// Output archive path
        #[arg(long, short = 'o')]
        output: PathBuf,
    },

    /// Extract an archive into a directory
    Unpack {
        /// Archive to extract
        file: PathBuf,

        /// Destination directory
        dest: PathBuf,

        /// Archive format (default: detected from the file name)
        #[arg(long, short = 'f')]
        format: Option<CompressionKind>,
    },

    /// Print the compression kind detected for an object
    Detect {
        /// Object key
        key: String,

        /// Content type reported by the store
        #[arg(long)]
        content_type: Option<String>,
    },

    /// Print the effective configuration with secrets redacted
    Config {
        /// Path to config file
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Queue a job (JSON) in the local store for the configured project
    Enqueue {
        /// Job file
        job: PathBuf,

        /// Path to config file
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        #[command(flatten)]
        overrides: Overrides,
    },
}

/// Settings that override the config file
#[derive(clap::Args, Debug, Default)]
struct Overrides {
    /// Project name
    #[arg(long)]
    project: Option<String>,

    /// Poll query tag (default: project name)
    #[arg(long)]
    query_tag: Option<String>,

    /// Workspace directory
    #[arg(long)]
    workspace: Option<PathBuf>,

    /// Local store directory
    #[arg(long)]
    store_root: Option<PathBuf>,

    /// Seconds between polls
    #[arg(long)]
    poll_interval: Option<u64>,

    /// Build command run in the workspace
    #[arg(long)]
    build_command: Option<String>,
}

impl Overrides {
    /// Only the flags that were given, as a config layer
    fn to_value(&self) -> Option<Value> {
        let mut root = Map::new();
        let mut set = |section: Option<&str>, key: &str, value: Value| {
            let target = match section {
                Some(section) => root
                    .entry(section)
                    .or_insert_with(|| Value::Object(Map::new()))
                    .as_object_mut(),
                None => Some(&mut root),
            };
            if let Some(target) = target {
                target.insert(key.to_string(), value);
            }
        };

        if let Some(project) = &self.project {
            set(None, "project_name", json!(project));
        }
        if let Some(tag) = &self.query_tag {
            set(None, "query_tag", json!(tag));
        }
        if let Some(path) = &self.workspace {
            set(Some("workspace"), "path", json!(path));
        }
        if let Some(path) = &self.store_root {
            set(Some("store"), "root", json!(path));
        }
        if let Some(secs) = self.poll_interval {
            set(None, "poll_interval_seconds", json!(secs));
        }
        if let Some(command) = &self.build_command {
            set(Some("build"), "command", json!(command));
        }

        (!root.is_empty()).then_some(Value::Object(root))
    }
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            once,
            log_level,
            overrides,
        } => {
            logging::init(log_level.as_deref());
            run_runner(config.as_deref(), &overrides, once);
        }
        Commands::Pack {
            dir,
            format,
            output,
        } => {
            logging::init(None);
            run_pack(&dir, format, &output);
        }
        Commands::Unpack { file, dest, format } => {
            logging::init(None);
            run_unpack(&file, &dest, format);
        }
        Commands::Detect { key, content_type } => {
            println!("{}", detect_kind(&key, content_type.as_deref()));
        }
        Commands::Config { config, overrides } => {
            run_config(config.as_deref(), &overrides);
        }
        Commands::Enqueue {
            job,
            config,
            overrides,
        } => {
            logging::init(None);
            run_enqueue(&job, config.as_deref(), &overrides);
        }
    }
}

fn load_settings(config_path: Option<&Path>, overrides: &Overrides) -> RunnerConfig {
    match EffectiveConfig::build(config_path, overrides.to_value()).and_then(|e| e.settings()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(1);
        }
    }
}

fn open_store(settings: &RunnerConfig) -> Arc<LocalStore> {
    match LocalStore::open(&settings.store.root) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            eprintln!("Error opening store {}: {}", settings.store.root.display(), e);
            process::exit(PipelineError::from(e).exit_code());
        }
    }
}

fn run_runner(config_path: Option<&Path>, overrides: &Overrides, once: bool) {
    let settings = load_settings(config_path, overrides);

    tracing::info!(
        project = %settings.project_name,
        query_tag = %settings.query_tag(),
        region = %settings.store.region,
        proxy = ?settings.store.proxy(),
        ambient_credentials = settings.store.uses_ambient_credentials(),
        store = %settings.store.root.display(),
        "{LOG_TAG} starting runner"
    );

    let store = open_store(&settings);
    let service: Arc<dyn JobService> = store.clone();
    let objects: Arc<dyn ObjectStore> = store;

    let mut runner = JobRunner::new(
        service,
        objects,
        RunnerOptions {
            capability: settings.capability(),
            query_tag: settings.query_tag().to_string(),
            project_name: settings.project_name.clone(),
            workspace: settings.workspace.path.clone(),
            transfer: settings.transfer_options(),
        },
    );

    let signals = SignalHandler::new();
    if let Err(e) = signals.install() {
        tracing::warn!(error = %e, "{LOG_TAG} could not install interrupt handler");
    }

    let step = settings.build_step();
    match runner.run_loop(&step, signals.state(), settings.poll_interval(), once) {
        Ok(outcomes) => {
            if once {
                for outcome in &outcomes {
                    print_outcome(outcome);
                }
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "{LOG_TAG} runner failed");
            eprintln!("Error: {}", e);
            process::exit(e.exit_code());
        }
    }
}

fn print_outcome(outcome: &CycleOutcome) {
    match outcome {
        CycleOutcome::Idle => println!("idle: no work items"),
        CycleOutcome::RaceLost { job_id } => println!("{}: claimed by another runner", job_id),
        CycleOutcome::Completed {
            job_id,
            execution_id,
            outcome,
            uploads,
        } => {
            let result = if outcome.is_success() { "succeeded" } else { "failed" };
            println!(
                "{}: {} (execution {}, {} upload(s))",
                job_id, result, execution_id, uploads
            );
        }
    }
}

fn run_pack(dir: &Path, format: CompressionKind, output: &Path) {
    match compress(dir, format, output) {
        Ok(summary) => {
            println!(
                "Packed {} file(s), {} bytes -> {} ({}, {} bytes)",
                summary.entries,
                summary.source_bytes,
                output.display(),
                summary.kind,
                summary.archive_bytes
            );
        }
        Err(e) => {
            eprintln!("Error packing {}: {}", dir.display(), e);
            process::exit(PipelineError::from(e).exit_code());
        }
    }
}

fn run_unpack(file: &Path, dest: &Path, format: Option<CompressionKind>) {
    let kind = format.unwrap_or_else(|| detect_kind(&file.to_string_lossy(), None));
    match extract(file, kind, dest) {
        Ok(summary) => {
            println!(
                "Extracted {} file(s), {} directories, {} bytes into {}",
                summary.files,
                summary.directories,
                summary.bytes,
                dest.display()
            );
            if summary.skipped > 0 {
                println!("Skipped {} unsupported entries", summary.skipped);
            }
        }
        Err(e) => {
            eprintln!("Error extracting {}: {}", file.display(), e);
            process::exit(PipelineError::from(e).exit_code());
        }
    }
}

fn run_config(config_path: Option<&Path>, overrides: &Overrides) {
    let effective = match EffectiveConfig::build(config_path, overrides.to_value()) {
        Ok(effective) => effective,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(1);
        }
    };
    if let Err(e) = effective.settings() {
        eprintln!("Configuration error: {}", e);
        process::exit(1);
    }

    let (config, redacted_keys) = effective.redacted();
    let output = json!({
        "config": config,
        "sources": effective.sources,
        "redacted_keys": redacted_keys,
    });
    match serde_json::to_string_pretty(&output) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error serializing output: {}", e);
            process::exit(1);
        }
    }
}

fn run_enqueue(job_path: &Path, config_path: Option<&Path>, overrides: &Overrides) {
    let settings = load_settings(config_path, overrides);

    let job: Job = match fs::read_to_string(job_path)
        .map_err(|e| e.to_string())
        .and_then(|raw| serde_json::from_str(&raw).map_err(|e| e.to_string()))
    {
        Ok(job) => job,
        Err(e) => {
            eprintln!("Error reading job {}: {}", job_path.display(), e);
            process::exit(1);
        }
    };

    let store = open_store(&settings);
    let query_param = BTreeMap::from([(
        QUERY_PARAM_PROJECT.to_string(),
        settings.query_tag().to_string(),
    )]);
    let job_id = job.id.clone();
    if let Err(e) = store.enqueue_job(job, query_param) {
        eprintln!("Error queueing job {}: {}", job_id, e);
        process::exit(PipelineError::from(e).exit_code());
    }
    println!("Queued {} for {}", job_id, settings.query_tag());
}
