//! Opening positions for arena games.
//!
//! One opening per line:
//!
//! ```text
//! # comment
//! startpos
//! startpos moves e2e4 c7c5
//! rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1
//! r1bqkbnr/pppp1ppp/2n5/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R w KQkq - bm Bb5; id "spanish";
//! 8/8/8/4k3/8/8/3K1R2/8 moves d2d3
//! ```
//!
//! A position is `startpos`, a FEN/EPD string (missing trailing fields get
//! their usual defaults, EPD opcodes are ignored) or a bare board layout,
//! optionally followed by `moves` in long algebraic notation. Lines that fail
//! to parse are skipped with a warning.

use crate::board::{GameBoard, IllegalMove};
use crate::config::ConfigError;
use shakmaty::fen::Fen;
use shakmaty::{CastlingMode, Chess};
use std::path::Path;
use thiserror::Error;
use uci::GuiCommand;

/// Why a single opening line was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OpeningError {
    #[error("invalid FEN '{0}'")]
    InvalidFen(String),
    #[error("position '{0}' is not legal")]
    IllegalPosition(String),
    #[error("{0}")]
    IllegalMove(#[from] IllegalMove),
    #[error("opening is already decided")]
    GameOver,
}

/// A starting position, immutable once loaded.
#[derive(Debug, Clone)]
pub struct Opening {
    /// Normalized FEN, `None` for the standard start position.
    pub fen: Option<String>,
    /// Moves played from `fen` before the engines take over.
    pub moves: Vec<String>,
    board: GameBoard,
}

impl Opening {
    /// The standard start position with no moves.
    pub fn startpos() -> Self {
        Self {
            fen: None,
            moves: Vec::new(),
            board: GameBoard::default(),
        }
    }

    /// Parses one (comment-free, non-empty) line.
    pub fn parse(line: &str) -> Result<Self, OpeningError> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let (head, moves) = match tokens.iter().position(|&t| t == "moves") {
            Some(idx) => (&tokens[..idx], &tokens[idx + 1..]),
            None => (&tokens[..], &[][..]),
        };

        let (fen, position) = match head {
            [] | ["startpos"] => (None, Chess::default()),
            fields => {
                let normalized = normalize_fen(fields);
                let parsed: Fen = normalized
                    .parse()
                    .map_err(|_| OpeningError::InvalidFen(head.join(" ")))?;
                let position: Chess = parsed
                    .into_position(CastlingMode::Standard)
                    .map_err(|_| OpeningError::IllegalPosition(head.join(" ")))?;
                (Some(normalized), position)
            }
        };

        let mut board = GameBoard::new(position);
        for mv in moves {
            board.play_uci(mv)?;
        }
        if board.game_end().is_some() {
            return Err(OpeningError::GameOver);
        }

        Ok(Self {
            fen,
            moves: moves.iter().map(|m| m.to_string()).collect(),
            board,
        })
    }

    /// Fresh board at the end of the opening line.
    pub fn board(&self) -> GameBoard {
        self.board.clone()
    }

    /// `position` command for the opening followed by `played` moves.
    pub fn position_command(&self, played: &[String]) -> GuiCommand {
        GuiCommand::Position {
            fen: self.fen.clone(),
            moves: self.moves.iter().chain(played).cloned().collect(),
        }
    }

    /// Short label for logs.
    pub fn describe(&self) -> String {
        let base = self.fen.as_deref().unwrap_or("startpos");
        if self.moves.is_empty() {
            base.to_string()
        } else {
            format!("{} moves {}", base, self.moves.join(" "))
        }
    }
}

/// Keeps the FEN fields of an EPD/FEN token list and fills in missing ones.
fn normalize_fen(fields: &[&str]) -> String {
    const DEFAULTS: [&str; 6] = ["", "w", "-", "-", "0", "1"];

    let mut out: Vec<&str> = fields.iter().take(4).copied().collect();
    // halfmove/fullmove clocks only if numeric; anything else is an EPD opcode
    for clock in fields.iter().skip(4).take(2) {
        if clock.parse::<u32>().is_err() {
            break;
        }
        out.push(clock);
    }
    for default in DEFAULTS.iter().skip(out.len()) {
        out.push(default);
    }
    out.join(" ")
}

/// Strips `#` and `;` comments.
fn strip_comment(raw: &str) -> &str {
    let end = raw.find(|c| c == '#' || c == ';').unwrap_or(raw.len());
    raw[..end].trim()
}

/// Parses an openings listing, returning usable openings in file order and
/// the rejected lines (1-based line number, reason).
pub fn parse_openings(text: &str) -> (Vec<Opening>, Vec<(usize, OpeningError)>) {
    let mut openings = Vec::new();
    let mut rejected = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = strip_comment(raw);
        if line.is_empty() {
            continue;
        }
        match Opening::parse(line) {
            Ok(opening) => openings.push(opening),
            Err(e) => rejected.push((idx + 1, e)),
        }
    }
    (openings, rejected)
}

/// Loads the openings file, warning about and skipping bad lines.
///
/// # Errors
///
/// [`ConfigError::ReadError`] if the file cannot be read and
/// [`ConfigError::NoOpenings`] if no line yields a usable opening.
pub fn load_openings(path: &Path) -> Result<Vec<Opening>, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;
    let (openings, rejected) = parse_openings(&text);
    for (line, err) in &rejected {
        tracing::warn!("{}:{}: skipping opening: {}", path.display(), line, err);
    }
    if openings.is_empty() {
        return Err(ConfigError::NoOpenings(path.to_path_buf()));
    }
    tracing::info!(
        "Loaded {} openings from {} ({} skipped)",
        openings.len(),
        path.display(),
        rejected.len()
    );
    Ok(openings)
}
