//! preemptiond - replay recorded preemption signals through the subsystem.
//!
//! Loads a registry snapshot (JSON array of evaluator descriptors) and a
//! signal log (one JSON signal per line), scripts the cluster manager's
//! verdict, and feeds the log through a signal listener exactly as a live
//! connection would. Prints the listener summary as JSON on stdout.

mod handler;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use evaluator_registry::fakes::MemoryEvaluatorRegistry;
use evaluator_registry::EvaluatorId;
use preemption_core::fakes::{ScriptedClusterManager, ScriptedVerdict};
use preemption_core::{
    init_tracing, InboundSignal, ListenerSummary, LogFormat, PreemptionConfig, PreemptionSubsystem,
};
use tokio::sync::mpsc;
use tracing::{info, Level};

use crate::handler::SpareEvaluatorHandler;

#[derive(Parser)]
#[command(name = "preemptiond")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Replay preemption signals against a driver registry snapshot", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,

    /// Subsystem configuration (TOML)
    #[arg(short, long, env = "PREEMPTION_CONFIG")]
    config: Option<PathBuf>,

    /// Registry snapshot: JSON array of evaluator descriptors
    #[arg(short, long)]
    registry: PathBuf,

    /// Recorded signals, one JSON object per line
    #[arg(short, long)]
    signals: PathBuf,

    /// How the simulated cluster manager answers mitigation proposals
    #[arg(long, value_enum, default_value_t = Verdict::Accept)]
    verdict: Verdict,

    /// Evaluators the driver offers to release instead
    #[arg(long, num_args = 1..)]
    spare: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Verdict {
    Accept,
    Reject,
    Silent,
}

impl From<Verdict> for ScriptedVerdict {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Accept => ScriptedVerdict::Accept,
            Verdict::Reject => ScriptedVerdict::Reject("rejected by replay".to_string()),
            Verdict::Silent => ScriptedVerdict::Silent,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let format = if cli.json {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    init_tracing(format, level);

    let config = load_config(cli.config.as_deref())?;
    let registry = load_registry(&cli.registry)?;
    let signals = read_signals(&cli.signals)?;
    let spare = parse_spare(&cli.spare)?;

    let summary = replay(config, registry, signals, cli.verdict, spare).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Config file (or defaults), then environment overrides.
fn load_config(path: Option<&Path>) -> Result<PreemptionConfig> {
    let config = match path {
        Some(path) => PreemptionConfig::from_path(path)
            .with_context(|| format!("Failed to load config: {:?}", path))?,
        None => PreemptionConfig::default(),
    };
    config
        .with_env_overrides()
        .context("Invalid preemption environment overrides")
}

fn load_registry(path: &Path) -> Result<MemoryEvaluatorRegistry> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read registry snapshot: {:?}", path))?;
    MemoryEvaluatorRegistry::from_json(&raw).context("Failed to parse registry snapshot")
}

/// Non-blank lines of the signal log. Lines starting with `#` are comments.
/// Each line stays encoded so malformed entries surface through the listener.
fn read_signals(path: &Path) -> Result<Vec<InboundSignal>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read signal log: {:?}", path))?;
    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| InboundSignal::Encoded(line.as_bytes().to_vec()))
        .collect())
}

fn parse_spare(raw: &[String]) -> Result<Vec<EvaluatorId>> {
    raw.iter()
        .map(|id| EvaluatorId::new(id.as_str()).with_context(|| format!("Bad spare id: {id:?}")))
        .collect()
}

async fn replay(
    config: PreemptionConfig,
    registry: MemoryEvaluatorRegistry,
    signals: Vec<InboundSignal>,
    verdict: Verdict,
    spare: Vec<EvaluatorId>,
) -> Result<ListenerSummary> {
    info!(
        evaluators = registry.len(),
        signals = signals.len(),
        verdict = ?verdict,
        timeout_ms = config.negotiation_timeout_ms,
        "replaying preemption signals"
    );

    let link = Arc::new(ScriptedClusterManager::new(verdict.into()));
    let subsystem = PreemptionSubsystem::new(Arc::new(registry), link, config)?;
    subsystem.register_handler(Arc::new(SpareEvaluatorHandler::new(spare)));

    let (tx, rx) = mpsc::channel(signals.len().max(1));
    let listener = subsystem.listen(rx);
    for signal in signals {
        tx.send(signal)
            .await
            .context("Signal listener stopped early")?;
    }
    drop(tx);

    let summary = listener.await.context("Signal listener panicked")?;
    info!(
        signals = summary.signals,
        dispatched = summary.reports.len(),
        malformed = summary.malformed,
        suppressed = summary.suppressed,
        "replay complete"
    );
    Ok(summary)
}
