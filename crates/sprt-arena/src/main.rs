use anyhow::Context;
use clap::Parser;
use sprt_arena::config::{
    duration_from_secs, ArenaConfig, ConfigError, EngineHandle, MatchSettings, PresetConfig,
};
use sprt_arena::engine::preflight;
use sprt_arena::openings::{load_openings, Opening};
use sprt_arena::report::Report;
use sprt_arena::scheduler::Scheduler;
use sprt_arena::sprt::{Sprt, SprtConfig};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::signal;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sprt-arena")]
#[command(about = "Run an SPRT match between two UCI engines")]
struct Cli {
    /// Engine A (baseline): a name from the config file or a path
    #[arg(long)]
    engine_a: String,
    /// Engine B (contender): a name from the config file or a path
    #[arg(long)]
    engine_b: String,
    /// Display name for engine A
    #[arg(long, default_value = "Baseline")]
    name_a: String,
    /// Display name for engine B
    #[arg(long, default_value = "Contender")]
    name_b: String,
    /// Maximum number of games to play [default: 200]
    #[arg(long)]
    games: Option<u32>,
    /// Seconds per move [default: 0.40]
    #[arg(long)]
    movetime: Option<f64>,
    /// UCI Threads option, when supported [default: 1]
    #[arg(long)]
    threads: Option<u32>,
    /// UCI Hash option in MB, when supported [default: 8]
    #[arg(long)]
    hash_mb: Option<u32>,
    /// Opening list (FEN/EPD or startpos lines) [default: startpos only]
    #[arg(long)]
    openings: Option<PathBuf>,
    /// Elo difference under H0 [default: -2]
    #[arg(long = "sprt-elo0", allow_negative_numbers = true)]
    elo0: Option<f64>,
    /// Elo difference under H1 [default: 2]
    #[arg(long = "sprt-elo1", allow_negative_numbers = true)]
    elo1: Option<f64>,
    /// SPRT type I error [default: 0.05]
    #[arg(long)]
    alpha: Option<f64>,
    /// SPRT type II error [default: 0.05]
    #[arg(long)]
    beta: Option<f64>,
    /// Write the summary to this file
    #[arg(long)]
    report: Option<PathBuf>,
    /// Write a JSON summary to this file
    #[arg(long)]
    json: Option<PathBuf>,
    /// Games played in parallel [default: 1]
    #[arg(long)]
    concurrency: Option<usize>,
    /// Adjudicate a draw after this many plies
    #[arg(long, default_value_t = 400)]
    max_plies: u32,
    /// Slack over movetime before a move counts as a timeout
    #[arg(long, default_value_t = 1000)]
    timeout_margin_ms: u64,
    /// Limit for the uci/isready handshake
    #[arg(long, default_value_t = 10_000)]
    handshake_timeout_ms: u64,
    /// Progress report every N games (0 disables)
    #[arg(long, default_value_t = 10)]
    report_every: u32,
    /// Configuration file [default: arena.toml if present]
    #[arg(long)]
    config: Option<PathBuf>,
    /// Preset from the configuration file
    #[arg(short, long)]
    preset: Option<String>,
}

/// Everything a run needs, resolved from flags, preset and defaults.
#[derive(Debug)]
struct MatchPlan {
    engine_a: EngineHandle,
    engine_b: EngineHandle,
    settings: MatchSettings,
    sprt: SprtConfig,
    openings: Option<PathBuf>,
}

/// Explicit flags win over the preset, the preset over built-in defaults.
fn resolve(cli: &Cli, config: &ArenaConfig) -> Result<MatchPlan, ConfigError> {
    let preset = match &cli.preset {
        Some(name) => config.get_preset(name)?.clone(),
        None => PresetConfig::default(),
    };
    let defaults = MatchSettings::default();
    let sprt_defaults = SprtConfig::default();

    let movetime = match cli.movetime.or(preset.movetime) {
        Some(secs) => duration_from_secs(secs)?,
        None => defaults.movetime,
    };
    let settings = MatchSettings {
        games: cli.games.or(preset.games).unwrap_or(defaults.games),
        movetime,
        timeout_margin: Duration::from_millis(cli.timeout_margin_ms),
        handshake_timeout: Duration::from_millis(cli.handshake_timeout_ms),
        max_plies: cli.max_plies,
        concurrency: cli
            .concurrency
            .or(preset.concurrency)
            .unwrap_or(defaults.concurrency),
        report_every: cli.report_every,
    };
    settings.validate()?;

    let sprt = SprtConfig {
        elo0: cli.elo0.or(preset.elo0).unwrap_or(sprt_defaults.elo0),
        elo1: cli.elo1.or(preset.elo1).unwrap_or(sprt_defaults.elo1),
        alpha: cli.alpha.or(preset.alpha).unwrap_or(sprt_defaults.alpha),
        beta: cli.beta.or(preset.beta).unwrap_or(sprt_defaults.beta),
    };
    sprt.validate()?;

    Ok(MatchPlan {
        engine_a: config.resolve_engine(&cli.engine_a, &cli.name_a, cli.hash_mb, cli.threads),
        engine_b: config.resolve_engine(&cli.engine_b, &cli.name_b, cli.hash_mb, cli.threads),
        settings,
        sprt,
        openings: cli.openings.clone().or(preset.openings),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = ArenaConfig::load(cli.config.as_deref())?;
    let plan = resolve(&cli, &config)?;
    if let Some(name) = &cli.preset {
        tracing::info!("Using preset: {}", name);
    }

    let openings = match &plan.openings {
        Some(path) => load_openings(path)?,
        None => vec![Opening::startpos()],
    };
    let sprt = Sprt::new(plan.sprt)?;
    let bounds = sprt.bounds();
    tracing::info!(
        "SPRT elo0={} elo1={} alpha={} beta={} bounds=({:.3}, {:.3})",
        plan.sprt.elo0,
        plan.sprt.elo1,
        plan.sprt.alpha,
        plan.sprt.beta,
        bounds.lower,
        bounds.upper
    );

    let scheduler = Scheduler::new(
        plan.engine_a.clone(),
        plan.engine_b.clone(),
        openings,
        plan.settings.clone(),
        sprt,
    )?;

    for engine in [&plan.engine_a, &plan.engine_b] {
        preflight(engine)
            .await
            .with_context(|| format!("Engine {} failed pre-flight check", engine.name))?;
    }

    let shutdown = scheduler.shutdown_flag();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            tracing::info!("Received shutdown signal, finishing running games");
            shutdown.store(true, Ordering::SeqCst);
        }
    });

    let outcome = scheduler
        .run(|sprt| {
            let report = Report::new(&plan.engine_a, &plan.engine_b, &plan.settings, sprt, None);
            tracing::info!("Progress:\n{}", report.render());
            if let Some(path) = &cli.report {
                if let Err(e) = report.write_text(path) {
                    tracing::warn!("Failed to write progress report: {}", e);
                }
            }
            if let Some(path) = &cli.json {
                if let Err(e) = report.write_json(path) {
                    tracing::warn!("Failed to write progress summary: {}", e);
                }
            }
        })
        .await;

    if outcome.dispatched != outcome.tally.games() {
        tracing::warn!(
            "{} games dispatched but {} recorded",
            outcome.dispatched,
            outcome.tally.games()
        );
    }

    let report = Report::new(
        &plan.engine_a,
        &plan.engine_b,
        &plan.settings,
        scheduler.sprt(),
        Some(outcome.status),
    );
    print!("{}", report.render());
    if let Some(path) = &cli.report {
        report
            .write_text(path)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
    }
    if let Some(path) = &cli.json {
        report
            .write_json(path)
            .with_context(|| format!("Failed to write summary to {}", path.display()))?;
    }

    Ok(())
}
