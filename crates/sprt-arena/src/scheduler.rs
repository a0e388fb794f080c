//! Match scheduler: which games to play, and how many at once.
//!
//! Openings are used in file order and cycled when the game budget is larger
//! than the list. Each opening is played twice in a row, EngineA taking White
//! in the first game and Black in the second, so colour advantage cancels
//! out within every pair.
//!
//! Games run concurrently up to `concurrency`, each session owning its own
//! pair of engine processes. Finished games go straight into the
//! [`Sprt`] engine; once it reaches a decision (or the shutdown flag is
//! raised) no new game is dispatched, while games already running finish and
//! still count.

use crate::config::{ConfigError, EngineHandle, MatchSettings};
use crate::game_runner::{play_game, GameRecord};
use crate::openings::Opening;
use crate::sprt::{MatchDecision, RunningTally, Sprt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinSet;

/// One game to play. Consumed exactly once by a game session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameTask {
    pub index: u32,
    pub opening_index: usize,
    pub engine_a_white: bool,
}

/// The ordered list of games for a budget of `games` over `openings`
/// openings. Empty when there are no openings.
pub fn plan_tasks(openings: usize, games: u32) -> Vec<GameTask> {
    if openings == 0 {
        return Vec::new();
    }
    (0..games)
        .map(|index| GameTask {
            index,
            opening_index: (index / 2) as usize % openings,
            engine_a_white: index % 2 == 0,
        })
        .collect()
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// The test reached this decision; dispatching stopped there.
    Decided(MatchDecision),
    /// The game budget ran out first.
    Inconclusive,
    /// Stopped by the operator.
    Interrupted,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Decided(MatchDecision::AcceptH1) => "accept-h1",
            RunStatus::Decided(MatchDecision::AcceptH0) => "accept-h0",
            RunStatus::Decided(MatchDecision::Continue) | RunStatus::Inconclusive => "inconclusive",
            RunStatus::Interrupted => "interrupted",
        }
    }
}

/// Final state of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub status: RunStatus,
    pub tally: RunningTally,
    pub llr: f64,
    /// Games dispatched; equals `tally.games()` unless a session task died.
    pub dispatched: u32,
}

struct MatchContext {
    engine_a: EngineHandle,
    engine_b: EngineHandle,
    openings: Vec<Opening>,
    settings: MatchSettings,
}

/// Runs a match between EngineA and EngineB.
pub struct Scheduler {
    ctx: Arc<MatchContext>,
    sprt: Sprt,
    shutdown: Arc<AtomicBool>,
}

impl Scheduler {
    /// # Errors
    ///
    /// [`ConfigError`] if the settings are invalid or there are no openings.
    pub fn new(
        engine_a: EngineHandle,
        engine_b: EngineHandle,
        openings: Vec<Opening>,
        settings: MatchSettings,
        sprt: Sprt,
    ) -> Result<Self, ConfigError> {
        settings.validate()?;
        if openings.is_empty() {
            return Err(ConfigError::InvalidSetting(
                "at least one opening is required".to_string(),
            ));
        }
        Ok(Self {
            ctx: Arc::new(MatchContext {
                engine_a,
                engine_b,
                openings,
                settings,
            }),
            sprt,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Flag that stops dispatching when set.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn sprt(&self) -> &Sprt {
        &self.sprt
    }

    pub fn settings(&self) -> &MatchSettings {
        &self.ctx.settings
    }

    /// Plays games until a decision, the budget, or shutdown.
    ///
    /// `on_progress` is called every `report_every` finished games.
    pub async fn run<F>(&self, mut on_progress: F) -> MatchOutcome
    where
        F: FnMut(&Sprt),
    {
        let settings = &self.ctx.settings;
        let mut pending = plan_tasks(self.ctx.openings.len(), settings.games).into_iter();
        let mut running: JoinSet<GameRecord> = JoinSet::new();
        let mut stopped: Option<RunStatus> = None;
        let mut dispatched = 0u32;

        tracing::info!(
            "Starting {} vs {}: up to {} games, {} at a time",
            self.ctx.engine_a.name,
            self.ctx.engine_b.name,
            settings.games,
            settings.concurrency
        );

        loop {
            while stopped.is_none() && running.len() < settings.concurrency {
                if self.shutdown.load(Ordering::SeqCst) {
                    tracing::info!("Interrupted, waiting for {} running games", running.len());
                    stopped = Some(RunStatus::Interrupted);
                    break;
                }
                let Some(task) = pending.next() else {
                    break;
                };
                let ctx = Arc::clone(&self.ctx);
                running.spawn(async move {
                    let opening = &ctx.openings[task.opening_index];
                    play_game(&task, opening, &ctx.engine_a, &ctx.engine_b, &ctx.settings).await
                });
                dispatched += 1;
            }

            let Some(joined) = running.join_next().await else {
                break;
            };
            let record = match joined {
                Ok(record) => record,
                Err(e) => {
                    tracing::error!("Game session task failed: {}", e);
                    continue;
                }
            };

            let update = self.sprt.update(&record);
            let (white, black) = if record.engine_a_white {
                (&self.ctx.engine_a.name, &self.ctx.engine_b.name)
            } else {
                (&self.ctx.engine_b.name, &self.ctx.engine_a.name)
            };
            tracing::info!(
                "Game {} {} - {}: {} ({}, {} plies) LLR {:.3} [{}]",
                record.index + 1,
                white,
                black,
                record.outcome.as_str(),
                record.termination.label(),
                record.plies,
                update.llr,
                update.decision
            );

            if settings.report_every > 0 && update.games % settings.report_every == 0 {
                on_progress(&self.sprt);
            }

            if stopped.is_none() && update.decision.is_final() {
                tracing::info!(
                    "SPRT accepted {} after {} games, finishing {} running games",
                    update.decision,
                    update.games,
                    running.len()
                );
                stopped = Some(RunStatus::Decided(update.decision));
            }
        }

        MatchOutcome {
            status: stopped.unwrap_or(RunStatus::Inconclusive),
            tally: self.sprt.snapshot(),
            llr: self.sprt.llr(),
            dispatched,
        }
    }
}
