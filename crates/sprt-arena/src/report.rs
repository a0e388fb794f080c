//! Match summaries: Elo estimate, tallies, SPRT state and game lengths.
//!
//! A [`Report`] is built from a [`RunningTally`] plus the fixed run
//! configuration only, so progress reports and the final report always agree.
//! Files are written atomically: a temporary file in the target directory is
//! renamed over the old report.

use crate::config::{EngineHandle, MatchSettings};
use crate::scheduler::RunStatus;
use crate::sprt::{
    elo_from_score, RunningTally, Sprt, SprtBounds, SprtConfig, BUCKET_PLIES, LENGTH_BUCKETS,
};
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use thiserror::Error;

/// Two-sided 95% normal quantile.
const Z_95: f64 = 1.959964;

/// Errors from writing report artifacts.
#[derive(Error, Debug)]
pub enum ReportError {
    /// Failed to write or rename the report file.
    #[error("Failed to write report: {0}")]
    Io(#[from] std::io::Error),
    /// Failed to serialize the JSON summary.
    #[error("Failed to serialize summary: {0}")]
    Json(#[from] serde_json::Error),
}

/// Elo difference of EngineA over EngineB with a 95% interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EloEstimate {
    pub elo: f64,
    /// Half the width of the interval.
    pub margin: f64,
    pub lower: f64,
    pub upper: f64,
}

impl EloEstimate {
    /// Normal approximation on the mean score, mapped through the logistic
    /// Elo curve. All zero without games.
    pub fn from_tally(tally: &RunningTally) -> Self {
        let Some((mean, var)) = tally.score_stats() else {
            return Self {
                elo: 0.0,
                margin: 0.0,
                lower: 0.0,
                upper: 0.0,
            };
        };
        let half_width = Z_95 * (var / f64::from(tally.games())).sqrt();
        let lower = elo_from_score(mean - half_width);
        let upper = elo_from_score(mean + half_width);
        Self {
            elo: elo_from_score(mean),
            margin: (upper - lower) / 2.0,
            lower,
            upper,
        }
    }
}

/// Label of a length histogram bucket, e.g. `20-39` or `80+`.
pub fn bucket_label(bucket: usize) -> String {
    let start = bucket as u32 * BUCKET_PLIES;
    if bucket + 1 >= LENGTH_BUCKETS {
        format!("{}+", start)
    } else {
        format!("{}-{}", start, start + BUCKET_PLIES - 1)
    }
}

/// Everything a summary shows.
#[derive(Debug, Clone)]
pub struct Report {
    pub engine_a: EngineHandle,
    pub engine_b: EngineHandle,
    pub movetime_secs: f64,
    pub config: SprtConfig,
    pub bounds: SprtBounds,
    pub tally: RunningTally,
    pub llr: f64,
    /// `None` while the match is still running.
    pub status: Option<RunStatus>,
}

impl Report {
    /// Snapshot of the statistics engine.
    pub fn new(
        engine_a: &EngineHandle,
        engine_b: &EngineHandle,
        settings: &MatchSettings,
        sprt: &Sprt,
        status: Option<RunStatus>,
    ) -> Self {
        let tally = sprt.snapshot();
        Self {
            engine_a: engine_a.clone(),
            engine_b: engine_b.clone(),
            movetime_secs: settings.movetime.as_secs_f64(),
            config: *sprt.config(),
            bounds: sprt.bounds(),
            llr: sprt.llr_of(&tally),
            tally,
            status,
        }
    }

    pub fn elo(&self) -> EloEstimate {
        EloEstimate::from_tally(&self.tally)
    }

    fn status_label(&self) -> &'static str {
        self.status.map(|s| s.as_str()).unwrap_or("running")
    }

    /// Human-readable summary, one `Label | value` line per item.
    pub fn render(&self) -> String {
        let elo = self.elo();
        let t = &self.tally;

        let lengths: Vec<String> = t
            .lengths
            .iter()
            .enumerate()
            .map(|(i, n)| format!("{}: {}", bucket_label(i), n))
            .collect();
        let ends: Vec<String> = t
            .terminations
            .iter()
            .map(|(term, n)| format!("{}: {}", term.label(), n))
            .collect();

        let mut lines = vec![
            format!("Engines | {} vs {}", self.engine_a.name, self.engine_b.name),
            format!("Elo     | {:.2} +- {:.2} (95%)", elo.elo, elo.margin),
            format!(
                "Conf    | {:.2}s/move {}: Hash={}MB Threads={} {}: Hash={}MB Threads={}",
                self.movetime_secs,
                self.engine_a.name,
                self.engine_a.hash_mb,
                self.engine_a.threads,
                self.engine_b.name,
                self.engine_b.hash_mb,
                self.engine_b.threads
            ),
            format!(
                "Games   | N: {} W: {} L: {} D: {}",
                t.games(),
                t.a_wins,
                t.b_wins,
                t.draws
            ),
            format!(
                "SPRT    | LLR={:.3} bounds=({:.3}, {:.3}) elo0={:.2} elo1={:.2} alpha={} beta={} verdict={}",
                self.llr,
                self.bounds.lower,
                self.bounds.upper,
                self.config.elo0,
                self.config.elo1,
                self.config.alpha,
                self.config.beta,
                self.bounds.decide(self.llr)
            ),
            format!("Status  | {}", self.status_label()),
            format!("Lengths | {}", lengths.join("  ")),
        ];
        if !ends.is_empty() {
            lines.push(format!("Ends    | {}", ends.join("  ")));
        }
        lines.join("\n") + "\n"
    }

    /// Machine-readable form of the same summary.
    pub fn to_json(&self) -> Result<String, ReportError> {
        let t = &self.tally;
        let summary = JsonSummary {
            engine_a: &self.engine_a.name,
            engine_b: &self.engine_b.name,
            games: t.games(),
            a_wins: t.a_wins,
            draws: t.draws,
            b_wins: t.b_wins,
            elo: self.elo(),
            llr: self.llr,
            lower_bound: self.bounds.lower,
            upper_bound: self.bounds.upper,
            elo0: self.config.elo0,
            elo1: self.config.elo1,
            alpha: self.config.alpha,
            beta: self.config.beta,
            decision: self.bounds.decide(self.llr).as_str(),
            status: self.status_label(),
            lengths: (0..LENGTH_BUCKETS)
                .map(|i| (bucket_label(i), t.lengths[i]))
                .collect(),
            terminations: t
                .terminations
                .iter()
                .map(|(term, n)| (term.label(), n))
                .collect(),
            created_at: Utc::now().to_rfc3339(),
        };
        Ok(serde_json::to_string_pretty(&summary)?)
    }

    /// Writes [`render`](Self::render) to `path` atomically.
    pub fn write_text(&self, path: &Path) -> Result<(), ReportError> {
        write_atomic(path, self.render().as_bytes())
    }

    /// Writes [`to_json`](Self::to_json) to `path` atomically.
    pub fn write_json(&self, path: &Path) -> Result<(), ReportError> {
        let json = self.to_json()?;
        write_atomic(path, json.as_bytes())
    }
}

#[derive(Serialize)]
struct JsonSummary<'a> {
    engine_a: &'a str,
    engine_b: &'a str,
    games: u32,
    a_wins: u32,
    draws: u32,
    b_wins: u32,
    elo: EloEstimate,
    llr: f64,
    lower_bound: f64,
    upper_bound: f64,
    elo0: f64,
    elo1: f64,
    alpha: f64,
    beta: f64,
    decision: &'static str,
    status: &'static str,
    lengths: BTreeMap<String, u32>,
    terminations: BTreeMap<&'static str, u32>,
    /// ISO 8601 timestamp when the summary was produced.
    created_at: String,
}

/// Replaces `path` with `contents` via a temporary file in the same
/// directory, so readers never see a partial file.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), ReportError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| ReportError::Io(e.error))?;
    Ok(())
}
