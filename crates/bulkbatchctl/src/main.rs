//! bulkbatch command line tool.
//!
//! Validates declarative batch job files against the stock component
//! registry and prints their flow graphs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bulkbatch_engine::builtins::create_default_registry;
use bulkbatch_engine::config::load_job_file;
use bulkbatch_engine::{EngineConfig, ExecutableJob, JobAssembler, JobParameters};

#[derive(Parser)]
#[command(name = "bulkbatch")]
#[command(version, about = "BulkBatch job assembly tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Activate an operational profile (repeatable, adds to BULKBATCH_PROFILES)
    #[arg(long = "profile", global = true)]
    profiles: Vec<String>,

    /// Dotted key under which the job is nested in the file
    #[arg(long, global = true)]
    job_root: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble a job file and report problems
    ///
    /// Examples:
    ///     bulkbatch validate jobs/import.yaml
    ///     bulkbatch validate jobs/import.yaml --fail-on-orphans
    #[command(verbatim_doc_comment)]
    Validate {
        /// Job file path
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Treat unused registered components as errors
        #[arg(long)]
        fail_on_orphans: bool,
    },
    /// Print the flow graph of a job file
    Graph {
        /// Job file path
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Emit JSON instead of one edge per line
        #[arg(long)]
        json: bool,
    },
    /// Parse launch parameters (key=value[,type]) and print them as JSON
    ///
    /// Examples:
    ///     bulkbatch params run.id=7,long schedule.date=2024-01-31,date
    #[command(verbatim_doc_comment)]
    Params {
        #[arg(value_name = "ARGS", trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

fn init_tracing(config: &EngineConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,bulkbatch_engine=debug".into());

    let registry = tracing_subscriber::registry().with(filter);
    if config.log_format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().with_target(true)).init();
    }
}

fn assemble(path: &Path, config: &EngineConfig) -> Result<ExecutableJob> {
    let job = load_job_file(path, &config.job_root)
        .with_context(|| format!("loading {}", path.display()))?;
    let registry = Arc::new(create_default_registry());
    let executable = JobAssembler::new(registry)
        .with_config(config.clone())
        .assemble(&job)
        .with_context(|| format!("assembling job '{}'", job.name))?;
    Ok(executable)
}

fn print_graph(job: &ExecutableJob, json: bool) -> Result<()> {
    if json {
        let edges: Vec<serde_json::Value> = job
            .graph
            .edges()
            .iter()
            .map(|e| {
                serde_json::json!({
                    "from": e.from,
                    "on": e.pattern.as_str(),
                    "to": e.target.to_string(),
                    "endsFlow": e.ends_flow,
                })
            })
            .collect();
        let doc = serde_json::json!({
            "job": job.name,
            "start": job.graph.start,
            "steps": job.graph.step_names(),
            "edges": edges,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
    } else {
        println!("job {} (start: {})", job.name, job.graph.start);
        for edge in job.graph.edges() {
            println!("  {edge}");
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = match EngineConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("warning: ignoring invalid BULKBATCH_* environment: {e}");
            EngineConfig::default()
        }
    };
    config.profiles.extend(cli.profiles);
    if let Some(root) = cli.job_root {
        config.job_root = root;
    }

    init_tracing(&config);
    tracing::debug!(profiles = ?config.profiles, job_root = %config.job_root, "Configuration loaded");

    match cli.command {
        Commands::Validate {
            file,
            fail_on_orphans,
        } => {
            config.fail_on_orphans |= fail_on_orphans;
            let job = assemble(&file, &config)?;
            let steps = job.graph.steps();
            println!(
                "job '{}' is valid: {} step(s), {} edge(s)",
                job.name,
                steps.len(),
                job.graph.edges().len()
            );
            for step in steps {
                let fault_tolerant = if step.is_fault_tolerant() { ", fault tolerant" } else { "" };
                println!("  {} [{}{}]", step.name, step.mode(), fault_tolerant);
                for component in step.components() {
                    println!(
                        "    {} : {} ({:?})",
                        component.name(),
                        component.declared_type,
                        component.provenance
                    );
                }
            }
            if !job.report.is_clean() {
                for name in &job.report.orphaned_steplets {
                    println!("  warning: steplet '{name}' matches no step");
                }
                for name in &job.report.unreferenced_components {
                    println!("  warning: component '{name}' is never referenced");
                }
            }
        }
        Commands::Graph { file, json } => {
            let job = assemble(&file, &config)?;
            print_graph(&job, json)?;
        }
        Commands::Params { args } => {
            let params = JobParameters::parse_args(&args).context("parsing job parameters")?;
            println!("{}", serde_json::to_string_pretty(&params)?);
        }
    }

    Ok(())
}
