//! UCI commands sent from the controller to the engine.

use crate::UciError;

/// Commands sent from GUI to engine.
#[derive(Debug, Clone, PartialEq)]
pub enum GuiCommand {
    /// Initialize UCI mode.
    Uci,
    /// Check if engine is ready.
    IsReady,
    /// Reset engine state before a new game.
    UciNewGame,
    /// Change an engine option.
    SetOption { name: String, value: Option<String> },
    /// Set up position.
    Position {
        fen: Option<String>,
        moves: Vec<String>,
    },
    /// Start calculating.
    Go(GoOptions),
    /// Stop calculating.
    Stop,
    /// Quit the engine.
    Quit,
    /// Unknown command (for forward compatibility).
    Unknown(String),
}

/// Options for the `go` command.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GoOptions {
    /// Search for exactly this time in milliseconds.
    pub movetime: Option<u64>,
}

impl GoOptions {
    /// Fixed time per move.
    pub fn movetime(ms: u64) -> Self {
        Self { movetime: Some(ms) }
    }
}

impl GuiCommand {
    /// Format the command as a single protocol line (without newline).
    pub fn to_uci(&self) -> String {
        match self {
            GuiCommand::Uci => "uci".to_string(),
            GuiCommand::IsReady => "isready".to_string(),
            GuiCommand::UciNewGame => "ucinewgame".to_string(),
            GuiCommand::SetOption { name, value } => match value {
                Some(v) => format!("setoption name {} value {}", name, v),
                None => format!("setoption name {}", name),
            },
            GuiCommand::Position { fen, moves } => {
                let mut line = match fen {
                    Some(f) => format!("position fen {}", f),
                    None => "position startpos".to_string(),
                };
                if !moves.is_empty() {
                    line.push_str(" moves ");
                    line.push_str(&moves.join(" "));
                }
                line
            }
            GuiCommand::Go(opts) => {
                let mut parts = vec!["go".to_string()];
                if let Some(ms) = opts.movetime {
                    parts.push(format!("movetime {}", ms));
                }
                parts.join(" ")
            }
            GuiCommand::Stop => "stop".to_string(),
            GuiCommand::Quit => "quit".to_string(),
            GuiCommand::Unknown(raw) => raw.clone(),
        }
    }

    /// Parse a UCI command string.
    pub fn parse(input: &str) -> Result<Self, UciError> {
        let input = input.trim();
        let mut parts = input.split_whitespace();

        let cmd = parts.next().unwrap_or("");

        match cmd {
            "uci" => Ok(GuiCommand::Uci),
            "isready" => Ok(GuiCommand::IsReady),
            "ucinewgame" => Ok(GuiCommand::UciNewGame),
            "setoption" => Self::parse_setoption(parts),
            "stop" => Ok(GuiCommand::Stop),
            "quit" => Ok(GuiCommand::Quit),
            "position" => Self::parse_position(parts),
            "go" => Self::parse_go(parts),
            _ => Ok(GuiCommand::Unknown(input.to_string())),
        }
    }

    fn parse_setoption<'a>(parts: impl Iterator<Item = &'a str>) -> Result<Self, UciError> {
        let parts: Vec<&str> = parts.collect();
        if parts.first() != Some(&"name") {
            return Err(UciError::ParseError("setoption without name".to_string()));
        }
        let value_idx = parts.iter().position(|&p| p == "value");
        let name_end = value_idx.unwrap_or(parts.len());
        let name = parts[1..name_end].join(" ");
        if name.is_empty() {
            return Err(UciError::ParseError("setoption without name".to_string()));
        }
        let value = value_idx.map(|idx| parts[idx + 1..].join(" "));
        Ok(GuiCommand::SetOption { name, value })
    }

    fn parse_position<'a>(mut parts: impl Iterator<Item = &'a str>) -> Result<Self, UciError> {
        let mut fen = None;

        match parts.next() {
            Some("startpos") => {}
            Some("fen") => {
                let mut fen_parts = Vec::new();
                for part in parts.by_ref() {
                    if part == "moves" {
                        break;
                    }
                    fen_parts.push(part);
                }
                if !fen_parts.is_empty() {
                    fen = Some(fen_parts.join(" "));
                }
                // "moves" already consumed
                let moves = parts.map(str::to_string).collect();
                return Ok(GuiCommand::Position { fen, moves });
            }
            Some(other) => {
                return Err(UciError::ParseError(format!(
                    "Expected 'startpos' or 'fen', got '{}'",
                    other
                )));
            }
            None => {
                return Err(UciError::ParseError(
                    "Expected 'startpos' or 'fen'".to_string(),
                ));
            }
        }

        let remaining: Vec<&str> = parts.collect();
        let moves = match remaining.iter().position(|&s| s == "moves") {
            Some(idx) => remaining[idx + 1..].iter().map(|s| s.to_string()).collect(),
            None => Vec::new(),
        };

        Ok(GuiCommand::Position { fen, moves })
    }

    fn parse_go<'a>(mut parts: impl Iterator<Item = &'a str>) -> Result<Self, UciError> {
        let mut opts = GoOptions::default();

        while let Some(token) = parts.next() {
            match token {
                "movetime" => opts.movetime = parts.next().and_then(|v| v.parse().ok()),
                _ => {}
            }
        }

        Ok(GuiCommand::Go(opts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_uci() {
        assert_eq!(GuiCommand::parse("uci").unwrap(), GuiCommand::Uci);
    }

    #[test]
    fn parse_isready() {
        assert_eq!(GuiCommand::parse("isready").unwrap(), GuiCommand::IsReady);
    }

    #[test]
    fn parse_position_startpos_with_moves() {
        let cmd = GuiCommand::parse("position startpos moves e2e4 e7e5").unwrap();
        assert_eq!(
            cmd,
            GuiCommand::Position {
                fen: None,
                moves: vec!["e2e4".to_string(), "e7e5".to_string()]
            }
        );
    }

    #[test]
    fn parse_position_fen_with_moves() {
        let cmd = GuiCommand::parse(
            "position fen rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1 moves c7c5",
        )
        .unwrap();
        assert_eq!(
            cmd,
            GuiCommand::Position {
                fen: Some(
                    "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1".to_string()
                ),
                moves: vec!["c7c5".to_string()]
            }
        );
    }

    #[test]
    fn parse_position_without_kind_is_error() {
        assert!(GuiCommand::parse("position").is_err());
        assert!(GuiCommand::parse("position somewhere").is_err());
    }

    #[test]
    fn parse_go_movetime() {
        match GuiCommand::parse("go movetime 1000").unwrap() {
            GuiCommand::Go(opts) => assert_eq!(opts.movetime, Some(1000)),
            other => panic!("Expected Go command, got {:?}", other),
        }
    }

    #[test]
    fn parse_go_ignores_other_limits() {
        assert_eq!(
            GuiCommand::parse("go wtime 5000 btime 5000 depth 8 movetime 250").unwrap(),
            GuiCommand::Go(GoOptions::movetime(250))
        );
        assert_eq!(
            GuiCommand::parse("go infinite").unwrap(),
            GuiCommand::Go(GoOptions::default())
        );
    }

    #[test]
    fn parse_setoption_with_spaces_in_name() {
        let cmd = GuiCommand::parse("setoption name Clear Hash").unwrap();
        assert_eq!(
            cmd,
            GuiCommand::SetOption {
                name: "Clear Hash".to_string(),
                value: None
            }
        );

        let cmd = GuiCommand::parse("setoption name Hash value 64").unwrap();
        assert_eq!(
            cmd,
            GuiCommand::SetOption {
                name: "Hash".to_string(),
                value: Some("64".to_string())
            }
        );
    }

    #[test]
    fn render_position_and_go() {
        let pos = GuiCommand::Position {
            fen: None,
            moves: vec!["e2e4".to_string(), "c7c5".to_string()],
        };
        assert_eq!(pos.to_uci(), "position startpos moves e2e4 c7c5");

        let pos = GuiCommand::Position {
            fen: Some("8/8/8/8/8/8/8/K1k5 w - - 0 1".to_string()),
            moves: vec![],
        };
        assert_eq!(pos.to_uci(), "position fen 8/8/8/8/8/8/8/K1k5 w - - 0 1");

        assert_eq!(GuiCommand::Go(GoOptions::movetime(400)).to_uci(), "go movetime 400");
    }

    #[test]
    fn rendered_commands_parse_back() {
        let commands = [
            GuiCommand::Uci,
            GuiCommand::IsReady,
            GuiCommand::UciNewGame,
            GuiCommand::SetOption {
                name: "Threads".to_string(),
                value: Some("2".to_string()),
            },
            GuiCommand::Position {
                fen: Some("8/8/8/8/8/8/8/K1k5 w - - 0 1".to_string()),
                moves: vec!["a1a2".to_string()],
            },
            GuiCommand::Go(GoOptions::movetime(100)),
            GuiCommand::Stop,
            GuiCommand::Quit,
        ];
        for cmd in commands {
            assert_eq!(GuiCommand::parse(&cmd.to_uci()).unwrap(), cmd);
        }
    }
}
