//! Protocol driver for one UCI engine process.
//!
//! An [`EngineDriver`] owns exactly one child process for the length of one
//! game. Every wait on the engine is bounded: the handshake by the handshake
//! timeout, each move by `movetime` plus a margin. Nothing is retried here;
//! failures go back to the game session, which adjudicates them.
//!
//! # Example
//!
//! ```no_run
//! use sprt_arena::config::EngineHandle;
//! use sprt_arena::engine::EngineDriver;
//! use sprt_arena::openings::Opening;
//! use std::time::Duration;
//!
//! # async fn demo() -> Result<(), sprt_arena::engine::DriverError> {
//! let handle = EngineHandle::new("Baseline", "/usr/bin/stockfish");
//! let mut driver = EngineDriver::start(&handle)?;
//! driver.handshake(Duration::from_secs(10)).await?;
//! driver.set_position(&Opening::startpos(), &[]).await?;
//! let reply = driver
//!     .request_move(Duration::from_millis(400), Duration::from_millis(1400))
//!     .await?;
//! println!("Best move: {:?}", reply.mv);
//! driver.shutdown().await;
//! # Ok(())
//! # }
//! ```

use crate::config::EngineHandle;
use crate::openings::Opening;
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use uci::{EngineInfo, EngineMessage, GoOptions, GuiCommand};

/// How long `shutdown` waits for the engine to honour `quit` before killing it.
pub const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Failures of a single engine, attributed to that engine.
#[derive(Error, Debug)]
pub enum DriverError {
    /// The executable could not be launched.
    #[error("Failed to start engine {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The handshake did not complete as the protocol requires.
    #[error("Protocol error: {0}")]
    Protocol(String),
    /// No `bestmove` within the move budget.
    #[error("No reply within {budget:?}")]
    Timeout { budget: Duration },
    /// The process went away or its pipes broke.
    #[error("Engine crashed: {0}")]
    Crash(String),
    /// A reply that is not a usable move.
    #[error("Illegal reply: {0}")]
    IllegalReply(String),
}

/// The engine's answer to one move request.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveReply {
    /// Chosen move, `None` when the engine answered with a null move.
    pub mv: Option<String>,
    /// Last `info` line seen during the search.
    pub info: Option<EngineInfo>,
}

/// A running engine process speaking UCI over its stdio.
pub struct EngineDriver {
    handle: EngineHandle,
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    /// Bytes of the line being read; kept across an interrupted read.
    pending: Vec<u8>,
    /// Lower-cased names of the options the engine advertised.
    advertised: HashSet<String>,
    id_name: Option<String>,
}

impl EngineDriver {
    /// Spawns the engine process. The protocol is not started yet; call
    /// [`handshake`](Self::handshake) next.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Spawn`] if the executable is missing or cannot
    /// be run.
    pub fn start(handle: &EngineHandle) -> Result<Self, DriverError> {
        let spawn_error = |source: std::io::Error| DriverError::Spawn {
            path: handle.path.clone(),
            source,
        };

        let mut child = Command::new(&handle.path)
            .args(&handle.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_error)?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                return Err(spawn_error(std::io::Error::new(
                    ErrorKind::BrokenPipe,
                    "engine stdio not captured",
                )))
            }
        };

        tracing::debug!(engine = %handle.name, path = %handle.path.display(), "Engine started");

        Ok(Self {
            handle: handle.clone(),
            child,
            stdin,
            stdout: BufReader::new(stdout),
            pending: Vec::new(),
            advertised: HashSet::new(),
            id_name: None,
        })
    }

    /// Display name from the engine handle.
    pub fn name(&self) -> &str {
        &self.handle.name
    }

    /// Name the engine reported with `id name`, if any.
    pub fn id_name(&self) -> Option<&str> {
        self.id_name.as_deref()
    }

    /// Whether the engine advertised an option with this name.
    pub fn supports_option(&self, name: &str) -> bool {
        self.advertised.contains(&name.to_ascii_lowercase())
    }

    /// `uci` ... `uciok`, configured options, then `isready` ... `readyok`.
    ///
    /// Options the engine did not advertise are skipped.
    ///
    /// # Errors
    ///
    /// [`DriverError::Protocol`] if the exchange does not finish within
    /// `timeout`, [`DriverError::Crash`] if the process goes away.
    pub async fn handshake(&mut self, timeout: Duration) -> Result<(), DriverError> {
        tokio::time::timeout(timeout, self.exchange_handshake())
            .await
            .map_err(|_| {
                DriverError::Protocol(format!("handshake not completed within {:?}", timeout))
            })?
    }

    async fn exchange_handshake(&mut self) -> Result<(), DriverError> {
        self.send(&GuiCommand::Uci).await?;
        loop {
            let line = self.read_line().await?;
            match EngineMessage::parse(&line) {
                Ok(EngineMessage::UciOk) => break,
                Ok(EngineMessage::Id {
                    name: Some(name), ..
                }) => self.id_name = Some(name),
                Ok(EngineMessage::Option { name }) => {
                    self.advertised.insert(name.to_ascii_lowercase());
                }
                _ => {}
            }
        }

        for (name, value) in self.handle.options() {
            if self.supports_option(name) {
                self.send(&GuiCommand::SetOption {
                    name: name.to_string(),
                    value: Some(value),
                })
                .await?;
            } else {
                tracing::debug!(engine = %self.handle.name, "Option {} not supported, skipped", name);
            }
        }

        self.sync().await
    }

    /// `ucinewgame` followed by a readiness check.
    pub async fn new_game(&mut self, timeout: Duration) -> Result<(), DriverError> {
        self.send(&GuiCommand::UciNewGame).await?;
        tokio::time::timeout(timeout, self.sync())
            .await
            .map_err(|_| DriverError::Protocol(format!("no readyok within {:?}", timeout)))?
    }

    /// Sets the opening position plus the moves played since.
    pub async fn set_position(
        &mut self,
        opening: &Opening,
        played: &[String],
    ) -> Result<(), DriverError> {
        self.send(&opening.position_command(played)).await
    }

    /// Asks for a move with `go movetime` and waits at most `deadline`.
    ///
    /// # Errors
    ///
    /// - [`DriverError::Timeout`] when `deadline` elapses first
    /// - [`DriverError::Crash`] when the process exits or a pipe breaks
    /// - [`DriverError::IllegalReply`] when `bestmove` does not name a move
    pub async fn request_move(
        &mut self,
        movetime: Duration,
        deadline: Duration,
    ) -> Result<MoveReply, DriverError> {
        let millis = u64::try_from(movetime.as_millis()).unwrap_or(u64::MAX);
        self.send(&GuiCommand::Go(GoOptions::movetime(millis))).await?;

        tokio::time::timeout(deadline, self.await_bestmove())
            .await
            .map_err(|_| DriverError::Timeout { budget: deadline })?
    }

    async fn await_bestmove(&mut self) -> Result<MoveReply, DriverError> {
        let mut last_info = None;
        loop {
            let line = self.read_line().await?;
            match EngineMessage::parse(&line) {
                Ok(EngineMessage::Info(info)) => last_info = Some(info),
                Ok(EngineMessage::BestMove { mv, .. }) => {
                    if uci::is_null_move(&mv) {
                        return Ok(MoveReply {
                            mv: None,
                            info: last_info,
                        });
                    }
                    if !uci::is_move_token(&mv) {
                        return Err(DriverError::IllegalReply(line));
                    }
                    return Ok(MoveReply {
                        mv: Some(mv),
                        info: last_info,
                    });
                }
                Err(_) if line.trim_start().starts_with("bestmove") => {
                    return Err(DriverError::IllegalReply(line));
                }
                _ => {}
            }
        }
    }

    /// Tells a searching engine to stop. Failures are ignored; the engine is
    /// about to be shut down anyway.
    pub async fn stop(&mut self) {
        let _ = self.send(&GuiCommand::Stop).await;
    }

    /// Sends `quit`, waits [`SHUTDOWN_GRACE`], then kills the process.
    ///
    /// Never fails: every exit path leaves no process behind.
    pub async fn shutdown(mut self) {
        let _ = self.send(&GuiCommand::Quit).await;
        match tokio::time::timeout(SHUTDOWN_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::trace!(engine = %self.handle.name, "Engine exited: {}", status);
            }
            Ok(Err(e)) => {
                tracing::debug!(engine = %self.handle.name, "Waiting for engine failed: {}", e);
            }
            Err(_) => {
                tracing::debug!(engine = %self.handle.name, "Engine ignored quit, killing");
                if let Err(e) = self.child.kill().await {
                    tracing::warn!(engine = %self.handle.name, "Failed to kill engine: {}", e);
                }
            }
        }
    }

    async fn sync(&mut self) -> Result<(), DriverError> {
        self.send(&GuiCommand::IsReady).await?;
        loop {
            let line = self.read_line().await?;
            if matches!(EngineMessage::parse(&line), Ok(EngineMessage::ReadyOk)) {
                return Ok(());
            }
        }
    }

    async fn send(&mut self, cmd: &GuiCommand) -> Result<(), DriverError> {
        let line = cmd.to_uci();
        tracing::trace!(engine = %self.handle.name, ">> {}", line);
        self.stdin
            .write_all(format!("{}\n", line).as_bytes())
            .await
            .map_err(|e| DriverError::Crash(format!("write failed: {}", e)))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| DriverError::Crash(format!("flush failed: {}", e)))
    }

    /// Next output line. Bytes that are not UTF-8 are replaced, so garbled
    /// noise reads as an unknown message rather than failing the engine.
    async fn read_line(&mut self) -> Result<String, DriverError> {
        match self.stdout.read_until(b'\n', &mut self.pending).await {
            Ok(0) if self.pending.is_empty() => {
                Err(DriverError::Crash("engine closed its output".to_string()))
            }
            Ok(_) => {
                let line = String::from_utf8_lossy(&self.pending)
                    .trim_end_matches(|c| c == '\n' || c == '\r')
                    .to_string();
                self.pending.clear();
                tracing::trace!(engine = %self.handle.name, "<< {}", line);
                Ok(line)
            }
            Err(e) => Err(DriverError::Crash(format!("read failed: {}", e))),
        }
    }
}

/// Launches and immediately shuts down the engine, so a bad path fails the
/// run before any game is scheduled.
pub async fn preflight(handle: &EngineHandle) -> Result<(), DriverError> {
    let driver = EngineDriver::start(handle)?;
    driver.shutdown().await;
    Ok(())
}
