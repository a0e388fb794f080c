//! Game session: plays exactly one game between two engine processes.
//!
//! A session moves through [`SessionState`]s in order:
//!
//! - `Init`: colours are taken from the [`GameTask`], the opening is set up
//! - `Handshaking`: both engines are started and handshaken; a failing side
//!   loses by [`Termination::Crash`]
//! - `Playing`: turns alternate; every move is checked by the rules oracle
//! - `Terminated`: one [`GameRecord`] is produced and both engines are shut
//!   down, however the game ended
//!
//! Engine misbehaviour never escapes the session as an error: it is scored
//! as a loss for the offending side.

use crate::board::{GameBoard, GameEnd};
use crate::config::{EngineHandle, MatchSettings};
use crate::engine::{DriverError, EngineDriver, MoveReply};
use crate::openings::Opening;
use crate::scheduler::GameTask;
use shakmaty::Color;
use tracing::Instrument;

/// Game result in board terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    WhiteWin,
    BlackWin,
    Draw,
}

impl Outcome {
    /// Result when `side` loses.
    pub fn loss_for(side: Color) -> Self {
        match side {
            Color::White => Outcome::BlackWin,
            Color::Black => Outcome::WhiteWin,
        }
    }

    /// PGN-style result string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::WhiteWin => "1-0",
            Outcome::BlackWin => "0-1",
            Outcome::Draw => "1/2-1/2",
        }
    }
}

/// Game result from EngineA's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    AWin,
    Draw,
    BWin,
}

/// Why a game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Termination {
    Checkmate,
    Stalemate,
    InsufficientMaterial,
    FiftyMoveRule,
    Repetition,
    /// Illegal, malformed or null move; the mover loses.
    IllegalMove,
    /// No move within the budget; the mover loses.
    Timeout,
    /// The engine died or broke the protocol; that engine loses.
    Crash,
    /// Ply ceiling reached; adjudicated a draw.
    LengthLimit,
}

impl Termination {
    pub const ALL: [Termination; 9] = [
        Termination::Checkmate,
        Termination::Stalemate,
        Termination::InsufficientMaterial,
        Termination::FiftyMoveRule,
        Termination::Repetition,
        Termination::IllegalMove,
        Termination::Timeout,
        Termination::Crash,
        Termination::LengthLimit,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Termination::Checkmate => "checkmate",
            Termination::Stalemate => "stalemate",
            Termination::InsufficientMaterial => "insufficient-material",
            Termination::FiftyMoveRule => "fifty-move-rule",
            Termination::Repetition => "repetition",
            Termination::IllegalMove => "illegal-move",
            Termination::Timeout => "timeout",
            Termination::Crash => "crash",
            Termination::LengthLimit => "length-limit",
        }
    }

    /// True when the game was ended by the arena rather than by the rules.
    pub fn is_adjudicated(&self) -> bool {
        matches!(
            self,
            Termination::IllegalMove
                | Termination::Timeout
                | Termination::Crash
                | Termination::LengthLimit
        )
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

/// Count of games per [`Termination`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TerminationCounts([u32; 9]);

impl TerminationCounts {
    pub fn add(&mut self, termination: Termination) {
        self.0[termination.index()] += 1;
    }

    pub fn get(&self, termination: Termination) -> u32 {
        self.0[termination.index()]
    }

    /// Non-zero counts in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (Termination, u32)> + '_ {
        Termination::ALL
            .into_iter()
            .map(move |t| (t, self.get(t)))
            .filter(|(_, n)| *n > 0)
    }
}

/// Lifecycle of one game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Handshaking,
    Playing,
    Terminated,
}

/// Immutable result of one game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameRecord {
    /// Index of the [`GameTask`] this game played.
    pub index: u32,
    pub opening_index: usize,
    pub engine_a_white: bool,
    pub outcome: Outcome,
    /// Plies played by the engines, opening moves excluded.
    pub plies: u32,
    pub termination: Termination,
}

impl GameRecord {
    pub fn verdict(&self) -> Verdict {
        match (self.outcome, self.engine_a_white) {
            (Outcome::Draw, _) => Verdict::Draw,
            (Outcome::WhiteWin, true) | (Outcome::BlackWin, false) => Verdict::AWin,
            (Outcome::WhiteWin, false) | (Outcome::BlackWin, true) => Verdict::BWin,
        }
    }

    /// EngineA's score: 1, 0.5 or 0.
    pub fn score_a(&self) -> f64 {
        match self.verdict() {
            Verdict::AWin => 1.0,
            Verdict::Draw => 0.5,
            Verdict::BWin => 0.0,
        }
    }
}

/// Plays one game and always returns its record.
pub async fn play_game(
    task: &GameTask,
    opening: &Opening,
    engine_a: &EngineHandle,
    engine_b: &EngineHandle,
    settings: &MatchSettings,
) -> GameRecord {
    let span = tracing::info_span!(
        "game",
        index = task.index,
        opening = task.opening_index
    );
    let (white, black) = if task.engine_a_white {
        (engine_a, engine_b)
    } else {
        (engine_b, engine_a)
    };
    GameSession::new(task, opening, settings)
        .run(white, black)
        .instrument(span)
        .await
}

struct GameSession<'a> {
    task: &'a GameTask,
    opening: &'a Opening,
    settings: &'a MatchSettings,
    state: SessionState,
}

impl<'a> GameSession<'a> {
    fn new(task: &'a GameTask, opening: &'a Opening, settings: &'a MatchSettings) -> Self {
        Self {
            task,
            opening,
            settings,
            state: SessionState::Init,
        }
    }

    fn enter(&mut self, next: SessionState) {
        tracing::debug!("{:?} -> {:?}", self.state, next);
        self.state = next;
    }

    async fn run(mut self, white: &EngineHandle, black: &EngineHandle) -> GameRecord {
        tracing::debug!(
            "{} (white) vs {} (black) from {}",
            white.name,
            black.name,
            self.opening.describe()
        );

        self.enter(SessionState::Handshaking);
        let (white_ready, black_ready) = tokio::join!(self.prepare(white), self.prepare(black));
        let (mut white_driver, mut black_driver) = match (white_ready, black_ready) {
            (Ok(w), Ok(b)) => (w, b),
            (Err(e), other) => {
                tracing::warn!("{} failed to get ready: {}", white.name, e);
                if let Ok(b) = other {
                    b.shutdown().await;
                }
                return self.finish(Outcome::BlackWin, Termination::Crash, 0);
            }
            (Ok(w), Err(e)) => {
                tracing::warn!("{} failed to get ready: {}", black.name, e);
                w.shutdown().await;
                return self.finish(Outcome::WhiteWin, Termination::Crash, 0);
            }
        };

        self.enter(SessionState::Playing);
        let mut board = self.opening.board();
        let mut played: Vec<String> = Vec::new();
        let (outcome, termination) = loop {
            if let Some(end) = board.game_end() {
                break natural_result(end);
            }
            if played.len() >= self.settings.max_plies as usize {
                break (Outcome::Draw, Termination::LengthLimit);
            }
            let mover = board.turn();
            let driver = match mover {
                Color::White => &mut white_driver,
                Color::Black => &mut black_driver,
            };
            match self.take_turn(driver, &mut board, &played).await {
                Ok(mv) => played.push(mv),
                Err(termination) => break (Outcome::loss_for(mover), termination),
            }
        };

        tokio::join!(white_driver.shutdown(), black_driver.shutdown());
        self.finish(outcome, termination, played.len() as u32)
    }

    /// Start, handshake and reset one engine. A driver that fails here is
    /// shut down before the error is returned.
    async fn prepare(&self, handle: &EngineHandle) -> Result<EngineDriver, DriverError> {
        let mut driver = EngineDriver::start(handle)?;
        let timeout = self.settings.handshake_timeout;
        let ready = match driver.handshake(timeout).await {
            Ok(()) => driver.new_game(timeout).await,
            Err(e) => Err(e),
        };
        match ready {
            Ok(()) => Ok(driver),
            Err(e) => {
                driver.shutdown().await;
                Err(e)
            }
        }
    }

    /// One move by the side to move; `Err` carries the reason that side lost.
    async fn take_turn(
        &self,
        driver: &mut EngineDriver,
        board: &mut GameBoard,
        played: &[String],
    ) -> Result<String, Termination> {
        let reply = match driver.set_position(self.opening, played).await {
            Ok(()) => {
                driver
                    .request_move(self.settings.movetime, self.settings.move_deadline())
                    .await
            }
            Err(e) => Err(e),
        };

        let MoveReply { mv, info } = match reply {
            Ok(reply) => reply,
            Err(e) => {
                tracing::info!("{} lost on move {}: {}", driver.name(), played.len() + 1, e);
                return Err(match e {
                    DriverError::Timeout { .. } => {
                        driver.stop().await;
                        Termination::Timeout
                    }
                    DriverError::IllegalReply(_) => Termination::IllegalMove,
                    DriverError::Spawn { .. } | DriverError::Protocol(_) | DriverError::Crash(_) => {
                        Termination::Crash
                    }
                });
            }
        };

        if let Some(info) = info {
            tracing::trace!(engine = driver.name(), depth = ?info.depth, score = ?info.score, "search info");
        }

        let Some(mv) = mv else {
            tracing::info!("{} claimed no legal move in a running game", driver.name());
            return Err(Termination::IllegalMove);
        };
        if let Err(e) = board.play_uci(&mv) {
            tracing::info!("{} lost: {}", driver.name(), e);
            return Err(Termination::IllegalMove);
        }
        Ok(mv)
    }

    fn finish(mut self, outcome: Outcome, termination: Termination, plies: u32) -> GameRecord {
        self.enter(SessionState::Terminated);
        tracing::debug!("{} by {} after {} plies", outcome.as_str(), termination.label(), plies);
        GameRecord {
            index: self.task.index,
            opening_index: self.task.opening_index,
            engine_a_white: self.task.engine_a_white,
            outcome,
            plies,
            termination,
        }
    }
}

fn natural_result(end: GameEnd) -> (Outcome, Termination) {
    match end {
        GameEnd::Checkmate {
            winner: Color::White,
        } => (Outcome::WhiteWin, Termination::Checkmate),
        GameEnd::Checkmate {
            winner: Color::Black,
        } => (Outcome::BlackWin, Termination::Checkmate),
        GameEnd::Stalemate => (Outcome::Draw, Termination::Stalemate),
        GameEnd::InsufficientMaterial => (Outcome::Draw, Termination::InsufficientMaterial),
        GameEnd::FiftyMoveRule => (Outcome::Draw, Termination::FiftyMoveRule),
        GameEnd::Repetition => (Outcome::Draw, Termination::Repetition),
    }
}
