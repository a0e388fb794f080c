//! UCI (Universal Chess Interface) protocol codec.
//!
//! This crate covers both ends of the line-oriented UCI channel:
//!
//! - the controller side renders [`GuiCommand`]s and parses engine replies
//!   into [`EngineMessage`]s;
//! - the engine side parses [`GuiCommand`]s and writes replies through
//!   [`UciEngine`].
//!
//! # Commands used by the arena
//!
//! - `uci` / `uciok` - Handshake, engine id and options
//! - `isready` / `readyok` - Synchronization
//! - `setoption name <name> value <value>` - Configure the engine
//! - `ucinewgame` - Reset before a new game
//! - `position (startpos | fen <fen>) [moves <move>...]` - Set position
//! - `go movetime <ms>` - Timed search, answered by `bestmove`
//! - `stop` / `quit`

mod command;
mod info;

pub use command::{GoOptions, GuiCommand};
pub use info::{EngineInfo, Score};

use std::io::{BufRead, Write};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UciError {
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Messages sent from engine to GUI.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineMessage {
    /// Engine identification.
    Id { name: Option<String>, author: Option<String> },
    /// Advertised engine option (only the name is kept).
    Option { name: String },
    /// UCI initialization complete.
    UciOk,
    /// Engine is ready.
    ReadyOk,
    /// Search information.
    Info(EngineInfo),
    /// Best move found.
    BestMove { mv: String, ponder: Option<String> },
    /// Anything else; engines are free to print noise.
    Unknown(String),
}

impl EngineMessage {
    /// Format message for output.
    pub fn to_uci(&self) -> String {
        match self {
            EngineMessage::Id { name, author } => {
                let mut parts = Vec::new();
                if let Some(n) = name {
                    parts.push(format!("id name {}", n));
                }
                if let Some(a) = author {
                    parts.push(format!("id author {}", a));
                }
                parts.join("\n")
            }
            EngineMessage::Option { name } => format!("option name {} type string", name),
            EngineMessage::UciOk => "uciok".to_string(),
            EngineMessage::ReadyOk => "readyok".to_string(),
            EngineMessage::Info(info) => info.to_uci(),
            EngineMessage::BestMove { mv, ponder } => match ponder {
                Some(p) => format!("bestmove {} ponder {}", mv, p),
                None => format!("bestmove {}", mv),
            },
            EngineMessage::Unknown(raw) => raw.clone(),
        }
    }

    /// Parse one line of engine output.
    ///
    /// # Errors
    ///
    /// Returns [`UciError::ParseError`] for a `bestmove` line without a move
    /// and for an `option` line without a name.
    pub fn parse(line: &str) -> Result<Self, UciError> {
        let line = line.trim();
        let mut parts = line.split_whitespace();

        match parts.next() {
            Some("uciok") => Ok(EngineMessage::UciOk),
            Some("readyok") => Ok(EngineMessage::ReadyOk),
            Some("id") => {
                let rest = |prefix: &str| {
                    line.strip_prefix(prefix)
                        .map(|v| v.trim().to_string())
                };
                Ok(match parts.next() {
                    Some("name") => EngineMessage::Id {
                        name: rest("id name"),
                        author: None,
                    },
                    Some("author") => EngineMessage::Id {
                        name: None,
                        author: rest("id author"),
                    },
                    _ => EngineMessage::Unknown(line.to_string()),
                })
            }
            Some("option") => {
                let tokens: Vec<&str> = parts.collect();
                if tokens.first() != Some(&"name") {
                    return Err(UciError::ParseError(format!("option without name: {}", line)));
                }
                let end = tokens
                    .iter()
                    .position(|&t| t == "type")
                    .unwrap_or(tokens.len());
                let name = tokens[1..end].join(" ");
                if name.is_empty() {
                    return Err(UciError::ParseError(format!("option without name: {}", line)));
                }
                Ok(EngineMessage::Option { name })
            }
            Some("info") => Ok(EngineInfo::parse(line)
                .map(EngineMessage::Info)
                .unwrap_or_else(|| EngineMessage::Unknown(line.to_string()))),
            Some("bestmove") => {
                let mv = parts
                    .next()
                    .ok_or_else(|| UciError::ParseError("bestmove without a move".to_string()))?
                    .to_string();
                let ponder = match parts.next() {
                    Some("ponder") => parts.next().map(str::to_string),
                    _ => None,
                };
                Ok(EngineMessage::BestMove { mv, ponder })
            }
            _ => Ok(EngineMessage::Unknown(line.to_string())),
        }
    }
}

/// Returns true if `token` is syntactically a long-algebraic move
/// (`e2e4`, `e7e8q`). Legality is not checked.
pub fn is_move_token(token: &str) -> bool {
    let b = token.as_bytes();
    let square = |f: u8, r: u8| (b'a'..=b'h').contains(&f) && (b'1'..=b'8').contains(&r);
    match b.len() {
        4 => square(b[0], b[1]) && square(b[2], b[3]),
        5 => square(b[0], b[1]) && square(b[2], b[3]) && matches!(b[4], b'q' | b'r' | b'b' | b'n'),
        _ => false,
    }
}

/// Returns true for the tokens engines use when they have no move to play.
pub fn is_null_move(token: &str) -> bool {
    matches!(token, "0000" | "(none)" | "none")
}

/// Simple UCI engine wrapper for writing bots.
pub struct UciEngine<R: BufRead, W: Write> {
    reader: R,
    writer: W,
}

impl<R: BufRead, W: Write> UciEngine<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Read and parse the next command from GUI.
    ///
    /// End of input is reported as [`GuiCommand::Quit`].
    pub fn read_command(&mut self) -> Result<GuiCommand, UciError> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Ok(GuiCommand::Quit);
        }
        GuiCommand::parse(&line)
    }

    /// Send a message to the GUI.
    pub fn send(&mut self, msg: &EngineMessage) -> Result<(), UciError> {
        self.send_raw(&msg.to_uci())
    }

    /// Send an arbitrary line, bypassing message formatting.
    pub fn send_raw(&mut self, line: &str) -> Result<(), UciError> {
        writeln!(self.writer, "{}", line)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Send engine identification.
    pub fn send_id(&mut self, name: &str, author: &str) -> Result<(), UciError> {
        self.send(&EngineMessage::Id {
            name: Some(name.to_string()),
            author: None,
        })?;
        self.send(&EngineMessage::Id {
            name: None,
            author: Some(author.to_string()),
        })
    }

    /// Advertise a supported option.
    pub fn send_option(&mut self, name: &str) -> Result<(), UciError> {
        self.send(&EngineMessage::Option {
            name: name.to_string(),
        })
    }

    /// Send uciok.
    pub fn send_uciok(&mut self) -> Result<(), UciError> {
        self.send(&EngineMessage::UciOk)
    }

    /// Send readyok.
    pub fn send_readyok(&mut self) -> Result<(), UciError> {
        self.send(&EngineMessage::ReadyOk)
    }

    /// Send best move.
    pub fn send_bestmove(&mut self, mv: &str) -> Result<(), UciError> {
        self.send(&EngineMessage::BestMove {
            mv: mv.to_string(),
            ponder: None,
        })
    }

    /// Send search info.
    pub fn send_info(&mut self, info: EngineInfo) -> Result<(), UciError> {
        self.send(&EngineMessage::Info(info))
    }
}

/// Create a UCI engine using stdin/stdout.
pub fn stdio_engine() -> UciEngine<std::io::BufReader<std::io::Stdin>, std::io::Stdout> {
    UciEngine::new(std::io::BufReader::new(std::io::stdin()), std::io::stdout())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_handshake_replies() {
        assert_eq!(
            EngineMessage::parse("id name Stockfish 16").unwrap(),
            EngineMessage::Id {
                name: Some("Stockfish 16".to_string()),
                author: None
            }
        );
        assert_eq!(EngineMessage::parse("uciok").unwrap(), EngineMessage::UciOk);
        assert_eq!(EngineMessage::parse("readyok\r\n").unwrap(), EngineMessage::ReadyOk);
    }

    #[test]
    fn parse_option_keeps_multi_word_name() {
        let msg =
            EngineMessage::parse("option name Clear Hash type button").unwrap();
        assert_eq!(
            msg,
            EngineMessage::Option {
                name: "Clear Hash".to_string()
            }
        );
        let msg = EngineMessage::parse("option name Hash type spin default 16 min 1 max 33554432")
            .unwrap();
        assert_eq!(
            msg,
            EngineMessage::Option {
                name: "Hash".to_string()
            }
        );
    }

    #[test]
    fn parse_bestmove_with_and_without_ponder() {
        assert_eq!(
            EngineMessage::parse("bestmove e2e4 ponder e7e5").unwrap(),
            EngineMessage::BestMove {
                mv: "e2e4".to_string(),
                ponder: Some("e7e5".to_string())
            }
        );
        assert_eq!(
            EngineMessage::parse("bestmove (none)").unwrap(),
            EngineMessage::BestMove {
                mv: "(none)".to_string(),
                ponder: None
            }
        );
    }

    #[test]
    fn bestmove_without_move_is_error() {
        assert!(matches!(
            EngineMessage::parse("bestmove"),
            Err(UciError::ParseError(_))
        ));
    }

    #[test]
    fn noise_is_unknown() {
        assert_eq!(
            EngineMessage::parse("Stockfish by the Stockfish developers").unwrap(),
            EngineMessage::Unknown("Stockfish by the Stockfish developers".to_string())
        );
    }

    #[test]
    fn move_token_syntax() {
        assert!(is_move_token("e2e4"));
        assert!(is_move_token("a7a8q"));
        assert!(!is_move_token("a7a8k"));
        assert!(!is_move_token("e2e9"));
        assert!(!is_move_token("zz99"));
        assert!(!is_move_token("e4"));
        assert!(is_null_move("0000"));
        assert!(is_null_move("(none)"));
        assert!(!is_null_move("e2e4"));
    }

    #[test]
    fn engine_side_round_trip() {
        let input = b"uci\nposition startpos moves e2e4\n";
        let mut out = Vec::new();
        {
            let mut engine = UciEngine::new(&input[..], &mut out);
            assert_eq!(engine.read_command().unwrap(), GuiCommand::Uci);
            engine.send_id("TestBot", "Nobody").unwrap();
            engine.send_uciok().unwrap();
            assert!(matches!(
                engine.read_command().unwrap(),
                GuiCommand::Position { .. }
            ));
            assert_eq!(engine.read_command().unwrap(), GuiCommand::Quit);
        }
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "id name TestBot\nid author Nobody\nuciok\n");
    }
}
