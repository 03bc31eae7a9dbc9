//! CLI command definitions for reward-forge.
//!
//! The binary covers the parts of the harness that need no concrete
//! environment: generating reward candidates into the cache, inspecting the
//! cache, and evaluating a cached script against a hand-written step.
//! Training runs are driven from library code that supplies an environment.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};

use crate::experiment::{CandidateGenerator, GenerationPlan, DEFAULT_CACHE_FILE};
use crate::llm::{LlmClient, LlmConfig};
use crate::registry::RewardRegistry;
use crate::sandbox::{compile, invoke};
use crate::training::Info;

/// Reward-function synthesis and evaluation harness.
#[derive(Parser)]
#[command(name = "reward-forge")]
#[command(about = "Generate, cache and check LLM-written reward functions")]
#[command(version)]
#[command(
    long_about = "reward-forge asks language models to write reward functions for tabular RL tasks, caches them, and checks them in a sandboxed interpreter.\n\nExample usage:\n  reward-forge generate --prompt-file cooling.md -m openai/gpt-4o-mini -m anthropic/claude-3.5-haiku\n  reward-forge cache list\n  reward-forge eval LLM_gpt-4o-mini --obs '[55.0, 40.0]' --info '{\"temp\": 55.0}'"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Ask models for reward functions and store them in the cache.
    #[command(alias = "gen")]
    Generate(GenerateArgs),

    /// Inspect or edit the reward cache.
    Cache(CacheArgs),

    /// Evaluate a cached (or file) reward script on one step.
    Eval(EvalArgs),
}

/// Arguments for `reward-forge generate`.
#[derive(Parser, Debug)]
pub struct GenerateArgs {
    /// YAML generation plan (prompt, models, cache, force, request delay).
    /// Command-line flags override the plan.
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Prompt text sent to every model.
    #[arg(short = 'p', long, conflicts_with = "prompt_file")]
    pub prompt: Option<String>,

    /// File holding the prompt text.
    #[arg(long)]
    pub prompt_file: Option<PathBuf>,

    /// Model id to query; repeat for several models.
    #[arg(short = 'm', long = "model")]
    pub models: Vec<String>,

    /// Reward cache file.
    #[arg(long)]
    pub cache: Option<PathBuf>,

    /// Regenerate candidates that are already cached.
    #[arg(short = 'f', long)]
    pub force: bool,

    /// Pause after each model request, in milliseconds.
    #[arg(long)]
    pub delay_ms: Option<u64>,

    /// OpenRouter API key (can also be set via OPENROUTER_API_KEY env var).
    #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Output JSON summary.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `reward-forge cache`.
#[derive(Parser, Debug)]
pub struct CacheArgs {
    /// Reward cache file.
    #[arg(long, default_value = DEFAULT_CACHE_FILE, global = true)]
    pub cache: PathBuf,

    #[command(subcommand)]
    pub command: CacheSubcommand,
}

/// Cache subcommands.
#[derive(clap::Subcommand, Debug)]
pub enum CacheSubcommand {
    /// List cached candidates and whether each script compiles.
    List {
        /// Output JSON.
        #[arg(short = 'j', long)]
        json: bool,
    },

    /// Print a candidate's source.
    Show {
        /// Candidate name.
        name: String,
    },

    /// Add or replace a candidate from a script file, or as a baseline.
    Add {
        /// Candidate name.
        name: String,

        /// Script file; omit to register an environment-reward baseline.
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Remove a candidate.
    Remove {
        /// Candidate name.
        name: String,
    },
}

/// Arguments for `reward-forge eval`.
#[derive(Parser, Debug)]
pub struct EvalArgs {
    /// Cached candidate name.
    #[arg(required_unless_present = "file", conflicts_with = "file")]
    pub name: Option<String>,

    /// Evaluate a script file instead of a cached candidate.
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Reward cache file.
    #[arg(long, default_value = DEFAULT_CACHE_FILE)]
    pub cache: PathBuf,

    /// Observation as a JSON array of numbers.
    #[arg(long, default_value = "[]")]
    pub obs: String,

    /// Info as a JSON object of numbers, booleans and number arrays.
    #[arg(long, default_value = "{}")]
    pub info: String,

    #[arg(long)]
    pub terminated: bool,

    #[arg(long)]
    pub truncated: bool,

    /// Environment reward used if the script faults.
    #[arg(long, default_value = "0.0", allow_negative_numbers = true)]
    pub fallback: f64,
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Generate(args) => run_generate_command(args).await,
        Commands::Cache(args) => run_cache_command(args),
        Commands::Eval(args) => run_eval_command(args),
    }
}

// ============================================================================
// Generate
// ============================================================================

/// Merges the optional plan file with command-line flags.
fn resolve_plan(args: &GenerateArgs) -> anyhow::Result<GenerationPlan> {
    let mut plan = match &args.config {
        Some(path) => GenerationPlan::from_file(path)
            .with_context(|| format!("Failed to load generation plan {}", path.display()))?,
        None => GenerationPlan {
            prompt: None,
            prompt_file: None,
            models: Vec::new(),
            cache: PathBuf::from(DEFAULT_CACHE_FILE),
            force: false,
            request_delay_ms: 1000,
        },
    };

    if let Some(prompt) = &args.prompt {
        plan.prompt = Some(prompt.clone());
    }
    if let Some(path) = &args.prompt_file {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read prompt file {}", path.display()))?;
        plan.prompt = Some(text);
        plan.prompt_file = Some(path.clone());
    }
    if !args.models.is_empty() {
        plan.models = args.models.clone();
    }
    if let Some(cache) = &args.cache {
        plan.cache = cache.clone();
    }
    if let Some(delay_ms) = args.delay_ms {
        plan.request_delay_ms = delay_ms;
    }
    plan.force |= args.force;

    plan.validate()?;
    Ok(plan)
}

#[derive(Serialize)]
struct GenerateOutput<'a> {
    cache: String,
    generated: usize,
    skipped: usize,
    failed: usize,
    candidates: Vec<&'a str>,
}

async fn run_generate_command(args: GenerateArgs) -> anyhow::Result<()> {
    let plan = resolve_plan(&args)?;

    let mut config = LlmConfig::from_env().context("Invalid LLM configuration")?;
    if let Some(key) = &args.api_key {
        config = config.with_api_key(key.clone());
    }
    if config.api_key.is_none() {
        anyhow::bail!("No API key: pass --api-key or set OPENROUTER_API_KEY");
    }
    info!(
        api_url = %config.api_url,
        api_key = %config.api_key_masked(),
        models = plan.models.len(),
        "Starting reward generation"
    );

    let generator = CandidateGenerator::new(Some(LlmClient::new(config)?))
        .with_request_delay(plan.request_delay());
    let mut registry = RewardRegistry::load(&plan.cache);
    let summary = generator
        .generate(&mut registry, plan.prompt_text(), &plan.models, plan.force)
        .await;

    if args.json {
        let output = GenerateOutput {
            cache: plan.cache.display().to_string(),
            generated: summary.generated,
            skipped: summary.skipped,
            failed: summary.failed,
            candidates: registry.names(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("✓ Generation finished");
        println!("  Cache:     {}", plan.cache.display());
        println!("  Generated: {}", summary.generated);
        println!("  Skipped:   {}", summary.skipped);
        println!("  Failed:    {}", summary.failed);
    }

    if summary.generated == 0 && summary.skipped == 0 {
        anyhow::bail!("No reward function could be generated");
    }
    Ok(())
}

// ============================================================================
// Cache
// ============================================================================

#[derive(Serialize)]
struct CacheEntryOutput {
    name: String,
    baseline: bool,
    compiles: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn run_cache_command(args: CacheArgs) -> anyhow::Result<()> {
    let mut registry = RewardRegistry::load(&args.cache);

    match args.command {
        CacheSubcommand::List { json } => {
            let entries: Vec<CacheEntryOutput> = registry
                .iter()
                .map(|candidate| {
                    let error = candidate
                        .source
                        .as_deref()
                        .and_then(|source| compile(source).err())
                        .map(|e| e.to_string());
                    CacheEntryOutput {
                        name: candidate.name.clone(),
                        baseline: candidate.is_baseline(),
                        compiles: error.is_none(),
                        error,
                    }
                })
                .collect();

            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else if entries.is_empty() {
                println!("No candidates in {}", args.cache.display());
            } else {
                for entry in &entries {
                    let status = match (&entry.error, entry.baseline) {
                        (_, true) => "baseline".to_string(),
                        (None, false) => "ok".to_string(),
                        (Some(e), false) => format!("error: {}", e),
                    };
                    println!("{:<32} {}", entry.name, status);
                }
            }
        }
        CacheSubcommand::Show { name } => {
            let candidate = registry
                .get(&name)
                .with_context(|| format!("No candidate named '{}'", name))?;
            match &candidate.source {
                Some(source) => println!("{}", source),
                None => println!("# '{}' uses the environment reward", name),
            }
        }
        CacheSubcommand::Add { name, file } => {
            let source = match &file {
                Some(path) => {
                    let source = std::fs::read_to_string(path)
                        .with_context(|| format!("Failed to read {}", path.display()))?;
                    if let Err(e) = compile(&source) {
                        warn!(candidate = %name, error = %e, "Script does not compile, storing anyway");
                    }
                    Some(source)
                }
                None => None,
            };
            registry.put(name.clone(), source);
            registry.try_save().context("Failed to save reward cache")?;
            println!("✓ Stored '{}' in {}", name, args.cache.display());
        }
        CacheSubcommand::Remove { name } => {
            if registry.remove(&name).is_none() {
                anyhow::bail!("No candidate named '{}'", name);
            }
            registry.try_save().context("Failed to save reward cache")?;
            println!("✓ Removed '{}' from {}", name, args.cache.display());
        }
    }

    Ok(())
}

// ============================================================================
// Eval
// ============================================================================

fn load_script(args: &EvalArgs) -> anyhow::Result<String> {
    if let Some(path) = &args.file {
        return std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()));
    }

    let name = args.name.as_deref().unwrap_or_default();
    let registry = RewardRegistry::load(&args.cache);
    let candidate = registry
        .get(name)
        .with_context(|| format!("No candidate named '{}' in {}", name, args.cache.display()))?;
    candidate
        .source
        .clone()
        .with_context(|| format!("'{}' is a baseline with no script", name))
}

fn run_eval_command(args: EvalArgs) -> anyhow::Result<()> {
    let source = load_script(&args)?;
    let reward = compile(&source).context("Reward script does not compile")?;

    let obs: Vec<f64> = serde_json::from_str(&args.obs).context("--obs must be a JSON number array")?;
    let info: Info = serde_json::from_str(&args.info)
        .context("--info must be a JSON object of numbers, booleans or number arrays")?;

    // Faults are logged at debug level.
    let value = invoke(&reward, &obs, args.terminated, args.truncated, &info, args.fallback);
    println!("{}", value);
    Ok(())
}
