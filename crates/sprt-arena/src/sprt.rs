//! Sequential probability ratio test over game results.
//!
//! Scores are modelled with the logistic Elo curve. The log-likelihood ratio
//! is the normal approximation of the trinomial (win/draw/loss) generalized
//! SPRT:
//!
//! ```text
//! LLR = N (s1 - s0) (2 s - s0 - s1) / (2 var)
//! ```
//!
//! where `s` and `var` are the mean and variance of EngineA's per-game score,
//! and `s0`, `s1` the expected scores at `elo0` and `elo1`. Every outcome
//! count carries a pseudo-count of one half so lopsided tallies keep a
//! finite variance.
//!
//! [`Sprt`] owns the only [`RunningTally`] of a match. Updates take its lock,
//! so the tally and the decision derived from it always agree.

use crate::config::ConfigError;
use crate::game_runner::{GameRecord, TerminationCounts, Verdict};
use std::fmt;
use std::sync::{Mutex, PoisonError};

const PSEUDO_COUNT: f64 = 0.5;

/// Number of game-length histogram buckets.
pub const LENGTH_BUCKETS: usize = 5;
/// Width of one histogram bucket in plies.
pub const BUCKET_PLIES: u32 = 20;

/// Hypotheses and error rates of the test. Fixed for a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SprtConfig {
    /// Elo difference under H0.
    pub elo0: f64,
    /// Elo difference under H1.
    pub elo1: f64,
    /// Probability of accepting H1 when H0 holds.
    pub alpha: f64,
    /// Probability of accepting H0 when H1 holds.
    pub beta: f64,
}

impl Default for SprtConfig {
    fn default() -> Self {
        Self {
            elo0: -2.0,
            elo1: 2.0,
            alpha: 0.05,
            beta: 0.05,
        }
    }
}

impl SprtConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let in_unit = |p: f64| p > 0.0 && p < 1.0;
        if !in_unit(self.alpha) || !in_unit(self.beta) {
            return Err(ConfigError::InvalidSprt(format!(
                "alpha and beta must lie in (0, 1), got alpha={} beta={}",
                self.alpha, self.beta
            )));
        }
        if self.alpha + self.beta >= 1.0 {
            return Err(ConfigError::InvalidSprt(format!(
                "alpha + beta must be below 1, got {}",
                self.alpha + self.beta
            )));
        }
        if !self.elo0.is_finite() || !self.elo1.is_finite() {
            return Err(ConfigError::InvalidSprt(
                "elo bounds must be finite".to_string(),
            ));
        }
        if self.elo0 >= self.elo1 {
            return Err(ConfigError::InvalidSprt(format!(
                "elo0 must be below elo1, got elo0={} elo1={}",
                self.elo0, self.elo1
            )));
        }
        Ok(())
    }

    pub fn bounds(&self) -> SprtBounds {
        SprtBounds::from_rates(self.alpha, self.beta)
    }
}

/// Wald decision thresholds on the LLR.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SprtBounds {
    pub lower: f64,
    pub upper: f64,
}

impl SprtBounds {
    pub fn from_rates(alpha: f64, beta: f64) -> Self {
        Self {
            lower: (beta / (1.0 - alpha)).ln(),
            upper: ((1.0 - beta) / alpha).ln(),
        }
    }

    pub fn decide(&self, llr: f64) -> MatchDecision {
        if llr >= self.upper {
            MatchDecision::AcceptH1
        } else if llr <= self.lower {
            MatchDecision::AcceptH0
        } else {
            MatchDecision::Continue
        }
    }
}

/// State of the test after the latest update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchDecision {
    Continue,
    AcceptH0,
    AcceptH1,
}

impl MatchDecision {
    pub fn is_final(&self) -> bool {
        !matches!(self, MatchDecision::Continue)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchDecision::Continue => "continue",
            MatchDecision::AcceptH0 => "H0",
            MatchDecision::AcceptH1 => "H1",
        }
    }
}

impl fmt::Display for MatchDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Histogram bucket for a game of `plies` plies.
pub fn length_bucket(plies: u32) -> usize {
    ((plies / BUCKET_PLIES) as usize).min(LENGTH_BUCKETS - 1)
}

/// Counts from EngineA's point of view. Only ever grows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunningTally {
    pub a_wins: u32,
    pub draws: u32,
    pub b_wins: u32,
    /// Game lengths, see [`length_bucket`].
    pub lengths: [u32; LENGTH_BUCKETS],
    pub terminations: TerminationCounts,
}

impl RunningTally {
    pub fn games(&self) -> u32 {
        self.a_wins + self.draws + self.b_wins
    }

    pub fn record(&mut self, record: &GameRecord) {
        match record.verdict() {
            Verdict::AWin => self.a_wins += 1,
            Verdict::Draw => self.draws += 1,
            Verdict::BWin => self.b_wins += 1,
        }
        self.lengths[length_bucket(record.plies)] += 1;
        self.terminations.add(record.termination);
    }

    /// EngineA's mean score and its per-game variance, `None` without games.
    pub fn score_stats(&self) -> Option<(f64, f64)> {
        let n = self.games();
        if n == 0 {
            return None;
        }
        Some(moments(
            f64::from(self.a_wins),
            f64::from(self.draws),
            f64::from(self.b_wins),
        ))
    }
}

/// Mean and variance of a score distribution given outcome weights.
fn moments(wins: f64, draws: f64, losses: f64) -> (f64, f64) {
    let n = wins + draws + losses;
    let mean = (wins + 0.5 * draws) / n;
    let var = (wins * (1.0 - mean).powi(2)
        + draws * (0.5 - mean).powi(2)
        + losses * mean.powi(2))
        / n;
    (mean, var)
}

/// Expected score of a player `elo` points stronger.
pub fn score_from_elo(elo: f64) -> f64 {
    1.0 / (1.0 + 10f64.powf(-elo / 400.0))
}

/// Inverse of [`score_from_elo`]; the score is clamped away from 0 and 1.
pub fn elo_from_score(score: f64) -> f64 {
    let score = score.clamp(1e-6, 1.0 - 1e-6);
    -400.0 * (1.0 / score - 1.0).log10()
}

/// Log-likelihood ratio of `s1` against `s0` for the tally. Zero without games.
pub fn llr(tally: &RunningTally, s0: f64, s1: f64) -> f64 {
    if tally.games() == 0 {
        return 0.0;
    }
    let wins = f64::from(tally.a_wins) + PSEUDO_COUNT;
    let draws = f64::from(tally.draws) + PSEUDO_COUNT;
    let losses = f64::from(tally.b_wins) + PSEUDO_COUNT;
    let n = wins + draws + losses;
    let (mean, var) = moments(wins, draws, losses);
    n * (s1 - s0) * (2.0 * mean - s0 - s1) / (2.0 * var)
}

/// Result of absorbing one game.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SprtUpdate {
    pub games: u32,
    pub llr: f64,
    pub decision: MatchDecision,
}

/// The statistics engine: single owner of the match tally.
#[derive(Debug)]
pub struct Sprt {
    config: SprtConfig,
    bounds: SprtBounds,
    s0: f64,
    s1: f64,
    tally: Mutex<RunningTally>,
}

impl Sprt {
    /// # Errors
    ///
    /// [`ConfigError::InvalidSprt`] when the configuration does not validate.
    pub fn new(config: SprtConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            bounds: config.bounds(),
            s0: score_from_elo(config.elo0),
            s1: score_from_elo(config.elo1),
            config,
            tally: Mutex::new(RunningTally::default()),
        })
    }

    pub fn config(&self) -> &SprtConfig {
        &self.config
    }

    pub fn bounds(&self) -> SprtBounds {
        self.bounds
    }

    /// Counts one finished game and re-evaluates the test.
    pub fn update(&self, record: &GameRecord) -> SprtUpdate {
        let mut tally = self.lock();
        tally.record(record);
        let llr = self.llr_of(&tally);
        SprtUpdate {
            games: tally.games(),
            llr,
            decision: self.bounds.decide(llr),
        }
    }

    pub fn decision(&self) -> MatchDecision {
        self.bounds.decide(self.llr())
    }

    pub fn llr(&self) -> f64 {
        self.llr_of(&self.lock())
    }

    /// LLR for an arbitrary tally under this configuration.
    pub fn llr_of(&self, tally: &RunningTally) -> f64 {
        llr(tally, self.s0, self.s1)
    }

    /// Copy of the current tally.
    pub fn snapshot(&self) -> RunningTally {
        *self.lock()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RunningTally> {
        // every update leaves the tally consistent, so a poisoned lock is still usable
        self.tally.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game_runner::{Outcome, Termination};
    use proptest::prelude::*;

    fn tally(a_wins: u32, draws: u32, b_wins: u32) -> RunningTally {
        RunningTally {
            a_wins,
            draws,
            b_wins,
            ..RunningTally::default()
        }
    }

    fn record(index: u32, outcome: Outcome, engine_a_white: bool, plies: u32) -> GameRecord {
        GameRecord {
            index,
            opening_index: (index / 2) as usize,
            engine_a_white,
            outcome,
            plies,
            termination: Termination::Checkmate,
        }
    }

    fn config(elo0: f64, elo1: f64) -> SprtConfig {
        SprtConfig {
            elo0,
            elo1,
            alpha: 0.05,
            beta: 0.05,
        }
    }

    #[test]
    fn test_bounds_for_five_percent_rates() {
        let bounds = SprtBounds::from_rates(0.05, 0.05);
        assert!((bounds.upper - 19f64.ln()).abs() < 1e-12);
        assert!((bounds.lower + 19f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_elo_score_conversions() {
        assert!((score_from_elo(0.0) - 0.5).abs() < 1e-12);
        assert!((score_from_elo(400.0) - 10.0 / 11.0).abs() < 1e-12);
        assert!((elo_from_score(score_from_elo(35.0)) - 35.0).abs() < 1e-9);
        assert!(elo_from_score(1.0).is_finite());
        assert!(elo_from_score(0.0) < -2000.0);
    }

    #[test]
    fn test_llr_empty_tally_is_zero() {
        let sprt = Sprt::new(config(0.0, 10.0)).unwrap();
        assert_eq!(sprt.llr(), 0.0);
        assert_eq!(sprt.decision(), MatchDecision::Continue);
    }

    #[test]
    fn test_llr_reference_values() {
        let sprt = Sprt::new(config(0.0, 10.0)).unwrap();
        let cases = [
            ((25, 10, 5), 1.0847),
            ((75, 30, 15), 3.3184),
            ((20, 0, 0), 5.0855),
            ((0, 0, 20), -5.2453),
            ((0, 40, 0), -0.7130),
            ((10, 20, 10), -0.0340),
        ];
        for ((w, d, l), expected) in cases {
            let got = sprt.llr_of(&tally(w, d, l));
            assert!(
                (got - expected).abs() < 1e-3,
                "{}/{}/{}: expected {}, got {}",
                w,
                d,
                l,
                expected,
                got
            );
        }
    }

    #[test]
    fn test_winning_tally_short_of_bound_until_more_games() {
        // 25/10/5 scores 75% over 40 games: clearly positive, still short of ln(19)
        let sprt = Sprt::new(config(0.0, 10.0)).unwrap();
        let bounds = sprt.bounds();
        let early = sprt.llr_of(&tally(25, 10, 5));
        assert!(early > 0.0);
        assert_eq!(bounds.decide(early), MatchDecision::Continue);

        let later = sprt.llr_of(&tally(75, 30, 15));
        assert!(later > bounds.upper);
        assert_eq!(bounds.decide(later), MatchDecision::AcceptH1);
    }

    #[test]
    fn test_losing_tally_accepts_h0() {
        let sprt = Sprt::new(config(0.0, 10.0)).unwrap();
        let llr = sprt.llr_of(&tally(5, 10, 25));
        assert!(llr < 0.0);
        assert_eq!(
            sprt.bounds().decide(sprt.llr_of(&tally(15, 30, 75))),
            MatchDecision::AcceptH0
        );
    }

    #[test]
    fn test_all_wins_decide_after_seven_games() {
        let sprt = Sprt::new(config(0.0, 50.0)).unwrap();
        let a_win = |i: u32| {
            let a_white = i % 2 == 0;
            let outcome = if a_white { Outcome::WhiteWin } else { Outcome::BlackWin };
            record(i, outcome, a_white, 30)
        };
        for i in 0..6 {
            assert_eq!(sprt.update(&a_win(i)).decision, MatchDecision::Continue);
        }
        let update = sprt.update(&a_win(6));
        assert_eq!(update.games, 7);
        assert_eq!(update.decision, MatchDecision::AcceptH1);
        assert_eq!(sprt.decision(), MatchDecision::AcceptH1);
        assert_eq!(sprt.snapshot().a_wins, 7);
    }

    #[test]
    fn test_update_counts_verdicts_and_lengths() {
        let sprt = Sprt::new(SprtConfig::default()).unwrap();
        sprt.update(&record(0, Outcome::WhiteWin, true, 0));
        sprt.update(&record(1, Outcome::WhiteWin, false, 45));
        sprt.update(&record(2, Outcome::Draw, true, 79));
        let update = sprt.update(&record(3, Outcome::BlackWin, false, 400));

        assert_eq!(update.games, 4);
        let snapshot = sprt.snapshot();
        assert_eq!((snapshot.a_wins, snapshot.draws, snapshot.b_wins), (2, 1, 1));
        assert_eq!(snapshot.lengths, [1, 0, 1, 1, 1]);
        assert_eq!(snapshot.terminations.get(Termination::Checkmate), 4);
    }

    #[test]
    fn test_length_buckets() {
        assert_eq!(length_bucket(0), 0);
        assert_eq!(length_bucket(19), 0);
        assert_eq!(length_bucket(20), 1);
        assert_eq!(length_bucket(79), 3);
        assert_eq!(length_bucket(80), 4);
        assert_eq!(length_bucket(u32::MAX), 4);
    }

    #[test]
    fn test_config_validation() {
        assert!(SprtConfig::default().validate().is_ok());
        let bad = [
            SprtConfig { alpha: 0.0, ..SprtConfig::default() },
            SprtConfig { beta: 1.0, ..SprtConfig::default() },
            SprtConfig { alpha: 0.6, beta: 0.5, ..SprtConfig::default() },
            SprtConfig { elo0: 5.0, elo1: 5.0, ..SprtConfig::default() },
            SprtConfig { elo1: f64::NAN, ..SprtConfig::default() },
        ];
        for config in bad {
            assert!(
                matches!(Sprt::new(config), Err(ConfigError::InvalidSprt(_))),
                "{:?} should be rejected",
                config
            );
        }
    }

    #[test]
    fn test_concurrent_updates_are_all_counted() {
        let sprt = Sprt::new(SprtConfig::default()).unwrap();
        std::thread::scope(|s| {
            for worker in 0..4u32 {
                let sprt = &sprt;
                s.spawn(move || {
                    for i in 0..250 {
                        let outcome = match i % 3 {
                            0 => Outcome::WhiteWin,
                            1 => Outcome::Draw,
                            _ => Outcome::BlackWin,
                        };
                        sprt.update(&record(worker * 250 + i, outcome, i % 2 == 0, i));
                    }
                });
            }
        });
        let snapshot = sprt.snapshot();
        assert_eq!(snapshot.games(), 1000);
        assert_eq!(snapshot.lengths.iter().sum::<u32>(), 1000);
    }

    proptest! {
        #[test]
        fn bounds_straddle_zero(alpha in 0.001f64..0.499, beta in 0.001f64..0.499) {
            let bounds = SprtBounds::from_rates(alpha, beta);
            prop_assert!(bounds.upper > 0.0);
            prop_assert!(bounds.lower < 0.0);
        }

        #[test]
        fn tally_sums_to_games_recorded(
            games in proptest::collection::vec((0u8..3, any::<bool>(), 0u32..600), 0..200)
        ) {
            let sprt = Sprt::new(SprtConfig::default()).unwrap();
            for (i, (result, a_white, plies)) in games.iter().enumerate() {
                let outcome = match result {
                    0 => Outcome::WhiteWin,
                    1 => Outcome::Draw,
                    _ => Outcome::BlackWin,
                };
                sprt.update(&record(i as u32, outcome, *a_white, *plies));
            }
            let snapshot = sprt.snapshot();
            prop_assert_eq!(snapshot.games() as usize, games.len());
            prop_assert_eq!(snapshot.lengths.iter().sum::<u32>() as usize, games.len());
        }

        #[test]
        fn decision_is_idempotent(w in 0u32..200, d in 0u32..200, l in 0u32..200) {
            let sprt = Sprt::new(SprtConfig { elo0: 0.0, elo1: 10.0, ..SprtConfig::default() }).unwrap();
            let t = tally(w, d, l);
            let first = sprt.bounds().decide(sprt.llr_of(&t));
            let second = sprt.bounds().decide(sprt.llr_of(&t));
            prop_assert_eq!(first, second);
            prop_assert!(sprt.llr_of(&t).is_finite());
        }
    }
}
