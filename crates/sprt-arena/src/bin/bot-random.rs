//! Random move bot - plays a random legal move.
//!
//! Also the arena's test opponent: `--mode` makes it misbehave in the ways
//! real engines do (hang, crash, illegal or garbled replies), or play a
//! little better than random (`greedy`: mate in one, else the biggest
//! capture). `noisy` plays randomly but prints bytes that are not UTF-8.

use clap::{Parser, ValueEnum};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use shakmaty::fen::Fen;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, Move, Position, Role};
use std::io::Write;
use uci::{stdio_engine, EngineInfo, GuiCommand, Score, UciError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Uniformly random legal moves.
    Random,
    /// Mate in one, else the most valuable capture, else random.
    Greedy,
    /// Handshakes, then never answers `go`.
    Hang,
    /// Handshakes, then exits on the first `go`.
    Crash,
    /// Exits at once without reading anything.
    Silent,
    /// Answers with a move that is never legal.
    Illegal,
    /// Answers `bestmove` with something that is not a move.
    Garbage,
    /// Plays random moves, each preceded by an `info string` that is not UTF-8.
    Noisy,
}

#[derive(Parser)]
#[command(name = "bot-random")]
#[command(about = "Random-move UCI engine with misbehaviour modes for testing")]
struct Args {
    #[arg(long, value_enum, default_value_t = Mode::Random)]
    mode: Mode,
    /// Seed for reproducible games.
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    if args.mode == Mode::Silent {
        return Ok(());
    }

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut engine = stdio_engine();
    let mut position = Chess::default();

    loop {
        let cmd = match engine.read_command() {
            Ok(cmd) => cmd,
            Err(UciError::IoError(e)) => {
                eprintln!("Error reading command: {}", e);
                break;
            }
            Err(e) => {
                eprintln!("Error reading command: {}", e);
                continue;
            }
        };

        match cmd {
            GuiCommand::Uci => {
                engine.send_id("RandomBot", "sprt-arena")?;
                engine.send_option("Hash")?;
                engine.send_option("Threads")?;
                engine.send_uciok()?;
            }

            GuiCommand::IsReady => engine.send_readyok()?,

            GuiCommand::UciNewGame => position = Chess::default(),

            GuiCommand::Position { fen, moves } => {
                position = setup_position(fen.as_deref(), &moves).unwrap_or_else(|| {
                    eprintln!("Bad position, falling back to startpos");
                    Chess::default()
                });
            }

            GuiCommand::Go(_) => match args.mode {
                Mode::Hang => {}
                Mode::Crash => std::process::exit(3),
                Mode::Illegal => engine.send_bestmove("a1a1")?,
                Mode::Garbage => engine.send_raw("bestmove ???")?,
                Mode::Random | Mode::Greedy | Mode::Noisy | Mode::Silent => {
                    if args.mode == Mode::Noisy {
                        let mut out = std::io::stdout();
                        out.write_all(b"info string caf\xE9 \xFF\xFE\n")?;
                        out.flush()?;
                    }
                    let chosen = if args.mode == Mode::Greedy {
                        greedy_move(&position, &mut rng)
                    } else {
                        position.legal_moves().choose(&mut rng).cloned()
                    };
                    match chosen {
                        Some(m) => {
                            let mv = m.to_uci(CastlingMode::Standard).to_string();
                            engine.send_info(EngineInfo {
                                depth: Some(1),
                                score: Some(Score::Cp(0)),
                                nodes: Some(position.legal_moves().len() as u64),
                                pv: vec![mv.clone()],
                                ..EngineInfo::default()
                            })?;
                            engine.send_bestmove(&mv)?;
                        }
                        None => engine.send_bestmove("0000")?,
                    }
                }
            },

            GuiCommand::Quit => break,

            GuiCommand::SetOption { .. } | GuiCommand::Stop | GuiCommand::Unknown(_) => {}
        }
    }

    Ok(())
}

fn setup_position(fen: Option<&str>, moves: &[String]) -> Option<Chess> {
    let mut position = match fen {
        Some(f) => f
            .parse::<Fen>()
            .ok()?
            .into_position(CastlingMode::Standard)
            .ok()?,
        None => Chess::default(),
    };
    for mv in moves {
        let m = mv.parse::<UciMove>().ok()?.to_move(&position).ok()?;
        position.play_unchecked(&m);
    }
    Some(position)
}

fn role_value(role: Role) -> u8 {
    match role {
        Role::Pawn => 1,
        Role::Knight | Role::Bishop => 3,
        Role::Rook => 5,
        Role::Queen => 9,
        Role::King => 0,
    }
}

fn greedy_move(position: &Chess, rng: &mut StdRng) -> Option<Move> {
    let moves = position.legal_moves();
    let mate = moves.iter().find(|m| {
        let mut after = position.clone();
        after.play_unchecked(m);
        after.is_checkmate()
    });
    if let Some(m) = mate {
        return Some(m.clone());
    }
    let best_capture = moves
        .iter()
        .filter_map(|m| m.capture().map(|victim| (role_value(victim), m)))
        .max_by_key(|(value, _)| *value);
    if let Some((_, m)) = best_capture {
        return Some(m.clone());
    }
    moves.choose(rng).cloned()
}
