//! Rules oracle: legality and game-end detection for arena games.
//!
//! Move generation and position rules come from `shakmaty`; this wrapper
//! adds the history a single position cannot know about (threefold
//! repetition) and reports how a game ended naturally.

use shakmaty::uci::UciMove;
use shakmaty::zobrist::{Zobrist64, ZobristHash};
use shakmaty::{Chess, Color, EnPassantMode, Position};
use std::collections::HashMap;
use thiserror::Error;

/// A move the oracle refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IllegalMove {
    /// Not long algebraic notation at all.
    #[error("malformed move: {0}")]
    Malformed(String),
    /// Well-formed but not legal in the current position.
    #[error("illegal move: {0}")]
    Illegal(String),
}

/// Natural end of a game, as detected by the rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameEnd {
    Checkmate { winner: Color },
    Stalemate,
    InsufficientMaterial,
    /// 100 plies without capture or pawn move.
    FiftyMoveRule,
    /// Same position for the third time.
    Repetition,
}

/// Board state plus the history needed for repetition draws.
#[derive(Debug, Clone)]
pub struct GameBoard {
    position: Chess,
    seen: HashMap<Zobrist64, u8>,
}

impl Default for GameBoard {
    fn default() -> Self {
        Self::new(Chess::default())
    }
}

impl GameBoard {
    pub fn new(position: Chess) -> Self {
        let mut board = Self {
            position,
            seen: HashMap::new(),
        };
        board.remember();
        board
    }

    pub fn position(&self) -> &Chess {
        &self.position
    }

    /// Side to move.
    pub fn turn(&self) -> Color {
        self.position.turn()
    }

    /// Validates and plays a move given in long algebraic notation.
    pub fn play_uci(&mut self, mv: &str) -> Result<(), IllegalMove> {
        let uci: UciMove = mv
            .parse()
            .map_err(|_| IllegalMove::Malformed(mv.to_string()))?;
        let m = uci
            .to_move(&self.position)
            .map_err(|_| IllegalMove::Illegal(mv.to_string()))?;
        self.position.play_unchecked(&m);
        self.remember();
        Ok(())
    }

    /// Returns how the game ended, or `None` while it is still running.
    ///
    /// Draw rules that are normally claimable (fifty moves, threefold) end
    /// the game as soon as they apply.
    pub fn game_end(&self) -> Option<GameEnd> {
        if self.position.is_checkmate() {
            return Some(GameEnd::Checkmate {
                winner: !self.position.turn(),
            });
        }
        if self.position.is_stalemate() {
            return Some(GameEnd::Stalemate);
        }
        if self.position.is_insufficient_material() {
            return Some(GameEnd::InsufficientMaterial);
        }
        if self.position.halfmoves() >= 100 {
            return Some(GameEnd::FiftyMoveRule);
        }
        if self.seen.get(&self.key()).copied().unwrap_or(0) >= 3 {
            return Some(GameEnd::Repetition);
        }
        None
    }

    fn key(&self) -> Zobrist64 {
        self.position.zobrist_hash(EnPassantMode::Legal)
    }

    fn remember(&mut self) {
        *self.seen.entry(self.key()).or_insert(0) += 1;
    }
}
