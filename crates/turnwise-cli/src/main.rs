//! `turnwise` command line.
//!
//! ```text
//! turnwise rules
//! turnwise parse multi_turn:FIRST_N:conv:complication_phone -n 3
//! turnwise evaluate --input case.json --mode golden
//! turnwise batch --input cases.jsonl --output out/ --mode interactive
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use turnwise_core::{parse, Catalog, EvaluationCase, RuleKind};
use turnwise_runtime::{
    read_cases, BatchRunner, Engine, EvaluationMode, ProviderRegistry, RuntimeConfig,
};

#[derive(Parser)]
#[command(name = "turnwise", author, version, about = "Rule-based evaluation of multi-turn dialogue transcripts")]
struct Cli {
    /// Runtime config (YAML, or JSON by extension)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Rule catalog to use instead of the built-in one
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// No judge: deterministic rules and heuristic preconditions only
    #[arg(long, global = true)]
    offline: bool,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the rule catalog
    Rules {
        /// Print the catalog as JSON
        #[arg(long)]
        json: bool,
    },

    /// Resolve a rule tag against the catalog
    Parse {
        tag: String,

        /// N substituted into the description
        #[arg(short)]
        n: Option<u32>,
    },

    /// Evaluate one case (JSON)
    Evaluate {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long, value_enum, default_value_t = Mode::Interactive)]
        mode: Mode,
    },

    /// Evaluate a JSONL file of cases
    Batch {
        #[arg(short, long)]
        input: PathBuf,

        /// Directory for the per-case output and the summary
        #[arg(short, long)]
        output: PathBuf,

        #[arg(short, long, value_enum, default_value_t = Mode::Interactive)]
        mode: Mode,

        /// Cases evaluated at once; overrides the config
        #[arg(long)]
        concurrency: Option<usize>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Interactive,
    Golden,
}

impl From<Mode> for EvaluationMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Interactive => EvaluationMode::Interactive,
            Mode::Golden => EvaluationMode::Golden,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(&cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Command::Rules { json } => list_rules(&load_catalog(cli)?, *json),
        Command::Parse { tag, n } => show_rule(&load_catalog(cli)?, tag, *n),
        Command::Evaluate { input, mode } => evaluate(cli, input, (*mode).into()).await,
        Command::Batch {
            input,
            output,
            mode,
            concurrency,
        } => batch(cli, input, output, (*mode).into(), *concurrency).await,
    }
}

fn load_config(cli: &Cli) -> Result<RuntimeConfig> {
    match &cli.config {
        Some(path) => RuntimeConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(RuntimeConfig::default()),
    }
}

fn load_catalog(cli: &Cli) -> Result<Catalog> {
    let catalog = match &cli.catalog {
        None => Catalog::builtin()?,
        Some(path) if path.extension().is_some_and(|e| e == "json") => {
            Catalog::from_json_file(path)?
        }
        Some(path) => Catalog::from_yaml_file(path)?,
    };
    Ok(catalog)
}

fn build_engine(cli: &Cli, config: RuntimeConfig) -> Result<Engine> {
    let mut builder = Engine::builder()
        .config(config)
        .catalog(Arc::new(load_catalog(cli)?));

    if cli.offline {
        tracing::info!("Offline mode: judged rules fail as unavailable");
    } else {
        builder = builder
            .connect(&ProviderRegistry::with_defaults())
            .context("connecting judge provider (use --offline to run without one)")?;
    }

    Ok(builder.build()?)
}

fn list_rules(catalog: &Catalog, json: bool) -> Result<()> {
    if json {
        let rules: Vec<_> = catalog.iter().map(|r| r.as_ref()).collect();
        println!("{}", serde_json::to_string_pretty(&rules)?);
        return Ok(());
    }

    for rule in catalog.iter() {
        let kind = match rule.judgment {
            RuleKind::Judged => "judged",
            RuleKind::Deterministic { .. } => "check",
        };
        let gate = if rule.precondition.is_some() { "gated" } else { "" };
        println!(
            "{:<48} {:>3}  {:<6} {:<5} {}",
            rule.tag().to_string(),
            rule.score,
            kind,
            gate,
            rule.description
        );
    }
    Ok(())
}

#[derive(Serialize)]
struct ResolvedRule<'a> {
    tag: String,
    resolved_description: String,
    #[serde(flatten)]
    rule: &'a turnwise_core::RuleDefinition,
}

fn show_rule(catalog: &Catalog, tag: &str, n: Option<u32>) -> Result<()> {
    let parsed = parse(tag, catalog)?;
    let resolved = ResolvedRule {
        tag: parsed.tag.to_string(),
        resolved_description: parsed.rule.describe(n),
        rule: parsed.rule.as_ref(),
    };
    print!("{}", serde_yaml::to_string(&resolved)?);
    Ok(())
}

async fn evaluate(cli: &Cli, input: &Path, mode: EvaluationMode) -> Result<()> {
    let text = fs::read_to_string(input).with_context(|| format!("reading {}", input.display()))?;
    let case: EvaluationCase =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", input.display()))?;

    let engine = build_engine(cli, load_config(cli)?)?;
    let report = match mode {
        EvaluationMode::Interactive => {
            serde_json::to_string_pretty(&engine.evaluate_interactive(&case).await?)?
        }
        EvaluationMode::Golden => {
            serde_json::to_string_pretty(&engine.evaluate_golden(&case).await?)?
        }
    };
    println!("{}", report);

    let usage = engine.usage();
    tracing::info!(
        llm_calls = usage.llm_calls,
        total_tokens = usage.total_tokens,
        "Judge usage"
    );
    Ok(())
}

async fn batch(
    cli: &Cli,
    input: &Path,
    output: &Path,
    mode: EvaluationMode,
    concurrency: Option<usize>,
) -> Result<()> {
    let text = fs::read_to_string(input).with_context(|| format!("reading {}", input.display()))?;
    let cases = read_cases(&text);
    if cases.is_empty() {
        bail!("{} contains no cases", input.display());
    }

    let config = load_config(cli)?;
    let concurrency = concurrency.unwrap_or(config.batch.concurrency);
    let engine = Arc::new(build_engine(cli, config)?);

    let result = BatchRunner::new(engine.clone(), mode)
        .with_concurrency(concurrency)
        .run(cases)
        .await;

    fs::create_dir_all(output).with_context(|| format!("creating {}", output.display()))?;
    let reports_path = output.join(mode.output_file_name());
    let file = fs::File::create(&reports_path)
        .with_context(|| format!("creating {}", reports_path.display()))?;
    result.write_jsonl(std::io::BufWriter::new(file))?;

    let summary_path = output.join("evaluation_summary.json");
    fs::write(&summary_path, serde_json::to_string_pretty(&result.summary)?)
        .with_context(|| format!("writing {}", summary_path.display()))?;

    let summary = &result.summary;
    let usage = engine.usage();
    println!("Entries:     {}", summary.total_entries);
    println!("Evaluated:   {}", summary.evaluated_entries);
    println!("Failed:      {}", summary.failed_entries);
    println!("Total score: {}", summary.total_score);
    println!("Avg score:   {:.2}", summary.average_score);
    println!("Triggered:   {:.1}%", summary.average_triggered_percent);
    println!("LLM calls:   {} ({} tokens)", usage.llm_calls, usage.total_tokens);
    println!("Reports:     {}", reports_path.display());
    println!("Summary:     {}", summary_path.display());
    Ok(())
}
