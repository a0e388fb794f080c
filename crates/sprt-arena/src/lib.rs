//! SPRT Arena - head-to-head matches between two UCI chess engines.
//!
//! Games are played in colour-swapped pairs over a list of openings, each
//! with a fresh pair of engine processes, and fed into a sequential
//! probability ratio test that stops the match as soon as one hypothesis
//! about the Elo difference is accepted.
//!
//! # Modules
//!
//! - [`config`] - Match settings, engine handles and the TOML config file
//! - [`openings`] - Opening list parsing
//! - [`board`] - Rules oracle: legality and game-end detection
//! - [`engine`] - Protocol driver for one engine process
//! - [`game_runner`] - Game session: plays one game, produces a record
//! - [`scheduler`] - Game planning and bounded concurrent execution
//! - [`sprt`] - Running tally, log-likelihood ratio and decision
//! - [`report`] - Elo estimate, text and JSON summaries

pub mod board;
pub mod config;
pub mod engine;
pub mod game_runner;
pub mod openings;
pub mod report;
pub mod scheduler;
pub mod sprt;
