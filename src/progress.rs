//! Synthetic progress for a transcription request.
//!
//! The transcription endpoint reports nothing until it is done, so progress
//! is made up: every tick adds a random amount, never going past
//! [`SYNTHETIC_CEILING`]. Only [`ProgressTicker::complete`] takes it to 100.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub const MAX_INCREMENT: f64 = 15.0;
pub const SYNTHETIC_CEILING: f64 = 90.0;
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(1000);

/// Where the per-tick increments come from.
pub trait IncrementSource: Send {
    /// A value in `[0, MAX_INCREMENT)`.
    fn next_increment(&mut self) -> f64;
}

pub struct RandomIncrement {
    rng: StdRng,
}

impl RandomIncrement {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    #[cfg(test)]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomIncrement {
    fn default() -> Self {
        Self::new()
    }
}

impl IncrementSource for RandomIncrement {
    fn next_increment(&mut self) -> f64 {
        self.rng.gen_range(0.0..MAX_INCREMENT)
    }
}

/// Remaining time, as displayed next to the percentage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RemainingEstimate(pub Duration);

impl fmt::Display for RemainingEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0.as_secs_f64();
        if secs > 60.0 {
            write!(f, "~{} min", (secs / 60.0).ceil())
        } else {
            write!(f, "~{} sec", secs.ceil())
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub percent: f64,
    pub remaining: Option<RemainingEstimate>,
}

#[derive(Debug, Clone)]
pub struct ProgressEstimator {
    percent: f64,
    started_at: DateTime<Utc>,
    completed: bool,
}

impl ProgressEstimator {
    pub fn start(now: DateTime<Utc>) -> Self {
        Self {
            percent: 0.0,
            started_at: now,
            completed: false,
        }
    }

    pub fn percent(&self) -> f64 {
        self.percent
    }

    pub fn is_complete(&self) -> bool {
        self.completed
    }

    /// Advances by `increment`, capped at [`SYNTHETIC_CEILING`].
    ///
    /// Returns `false` without changing anything once completed.
    pub fn tick(&mut self, increment: f64) -> bool {
        if self.completed {
            return false;
        }
        let increment = if increment.is_finite() {
            increment.clamp(0.0, MAX_INCREMENT)
        } else {
            0.0
        };
        self.percent = (self.percent + increment).min(SYNTHETIC_CEILING);
        true
    }

    pub fn complete(&mut self) {
        self.percent = 100.0;
        self.completed = true;
    }

    /// `elapsed / percent * (100 - percent)`, only while `0 < percent < 100`.
    ///
    /// Saturates at [`Duration::MAX`] when `percent` is too small for the
    /// quotient to fit.
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<RemainingEstimate> {
        if self.completed || self.percent <= 0.0 || self.percent >= 100.0 {
            return None;
        }
        let elapsed = (now - self.started_at)
            .to_std()
            .unwrap_or_default()
            .as_secs_f64();
        let remaining = elapsed / self.percent * (100.0 - self.percent);
        Some(RemainingEstimate(
            Duration::try_from_secs_f64(remaining).unwrap_or(Duration::MAX),
        ))
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> ProgressSnapshot {
        ProgressSnapshot {
            percent: self.percent,
            remaining: self.remaining(now),
        }
    }
}

/// Receives every change of the estimate.
pub trait ProgressSink: Send + Sync {
    fn update(&self, snapshot: &ProgressSnapshot);
}

struct Shared {
    estimator: ProgressEstimator,
    sink: Arc<dyn ProgressSink>,
}

impl Shared {
    fn tick(&mut self, increment: f64) -> bool {
        if !self.estimator.tick(increment) {
            return false;
        }
        // publish under the lock so a late tick cannot overwrite completion
        self.sink.update(&self.estimator.snapshot(Utc::now()));
        true
    }
}

/// A running estimator ticking on its own task.
///
/// Dropping the handle stops the ticks, so every way out of a transcription
/// attempt also stops the timer.
pub struct ProgressTicker {
    shared: Arc<Mutex<Shared>>,
    task: JoinHandle<()>,
}

impl ProgressTicker {
    pub fn start<I>(period: Duration, mut increments: I, sink: Arc<dyn ProgressSink>) -> Self
    where
        I: IncrementSource + 'static,
    {
        let now = Utc::now();
        let estimator = ProgressEstimator::start(now);
        sink.update(&estimator.snapshot(now));
        let shared = Arc::new(Mutex::new(Shared { estimator, sink }));

        let task = tokio::spawn({
            let shared = Arc::clone(&shared);
            async move {
                let mut interval = tokio::time::interval(period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                // the first tick completes immediately
                interval.tick().await;
                loop {
                    interval.tick().await;
                    let mut shared = shared.lock().unwrap_or_else(PoisonError::into_inner);
                    if !shared.tick(increments.next_increment()) {
                        break;
                    }
                }
            }
        });

        Self { shared, task }
    }

    pub fn percent(&self) -> f64 {
        self.shared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .estimator
            .percent()
    }

    /// The operation finished: stop ticking and report 100% with no estimate.
    pub fn complete(self) {
        self.task.abort();
        let mut shared = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
        shared.estimator.complete();
        let snapshot = shared.estimator.snapshot(Utc::now());
        shared.sink.update(&snapshot);
    }

    /// The operation failed or was superseded: stop ticking, leave the estimate as is.
    pub fn cancel(self) {
        log::debug!("cancelling progress ticker at {:.0}%", self.percent());
    }
}

impl Drop for ProgressTicker {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    struct Fixed(f64);

    impl IncrementSource for Fixed {
        fn next_increment(&mut self) -> f64 {
            self.0
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<ProgressSnapshot>>);

    impl ProgressSink for Recorder {
        fn update(&self, snapshot: &ProgressSnapshot) {
            self.0.lock().unwrap().push(snapshot.clone());
        }
    }

    impl Recorder {
        fn percents(&self) -> Vec<f64> {
            self.0.lock().unwrap().iter().map(|s| s.percent).collect()
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn ticks_are_capped_below_completion() {
        let mut est = ProgressEstimator::start(at(0));
        let mut increments = RandomIncrement::seeded(7);
        let mut last = est.percent();
        for _ in 0..1000 {
            assert!(est.tick(increments.next_increment()));
            assert!(est.percent() >= last);
            assert!(est.percent() <= SYNTHETIC_CEILING);
            last = est.percent();
        }
        assert_relative_eq!(est.percent(), SYNTHETIC_CEILING);
    }

    #[test]
    fn out_of_range_increments_are_clamped() {
        let mut est = ProgressEstimator::start(at(0));
        est.tick(-20.0);
        assert_eq!(est.percent(), 0.0);
        est.tick(f64::NAN);
        assert_eq!(est.percent(), 0.0);
        est.tick(1000.0);
        assert_relative_eq!(est.percent(), MAX_INCREMENT);
    }

    #[test]
    fn completion_is_final() {
        let mut est = ProgressEstimator::start(at(0));
        est.tick(10.0);
        est.complete();
        assert_eq!(est.percent(), 100.0);
        assert!(!est.tick(10.0));
        assert_eq!(est.percent(), 100.0);
        assert_eq!(est.remaining(at(30)), None);
    }

    #[test]
    fn no_estimate_at_zero() {
        let est = ProgressEstimator::start(at(0));
        assert_eq!(est.remaining(at(10)), None);
    }

    #[test]
    fn estimate_from_elapsed() {
        let mut est = ProgressEstimator::start(at(0));
        est.tick(10.0);
        est.tick(10.0);
        // 20% after 10s leaves 40s
        let remaining = est.remaining(at(10)).unwrap();
        assert_relative_eq!(remaining.0.as_secs_f64(), 40.0, epsilon = 1e-9);
        assert_eq!(remaining.to_string(), "~40 sec");

        // 20% after 30s leaves 120s
        assert_eq!(est.remaining(at(30)).unwrap().to_string(), "~2 min");
    }

    #[test]
    fn tiny_progress_saturates() {
        let mut est = ProgressEstimator::start(at(0));
        est.tick(1e-300);
        let remaining = est.remaining(at(2)).unwrap();
        assert_eq!(remaining.0, Duration::MAX);
        assert!(remaining.to_string().ends_with(" min"));
    }

    #[test]
    fn label_switches_above_sixty_seconds() {
        let label = |secs: f64| RemainingEstimate(Duration::from_secs_f64(secs)).to_string();
        assert_eq!(label(0.2), "~1 sec");
        assert_eq!(label(59.1), "~60 sec");
        assert_eq!(label(60.0), "~60 sec");
        assert_eq!(label(60.5), "~2 min");
        assert_eq!(label(120.0), "~2 min");
        assert_eq!(label(121.0), "~3 min");
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_runs_until_completed() {
        let recorder = Arc::new(Recorder::default());
        let ticker = ProgressTicker::start(DEFAULT_TICK_INTERVAL, Fixed(14.0), recorder.clone());

        tokio::time::sleep(Duration::from_millis(10_500)).await;
        let percents = recorder.percents();
        // initial snapshot plus ten ticks
        assert_eq!(percents.len(), 11);
        assert_eq!(percents[0], 0.0);
        assert_relative_eq!(percents[1], 14.0);
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
        assert!(percents.iter().all(|&p| p < 100.0));
        assert_relative_eq!(ticker.percent(), SYNTHETIC_CEILING);

        ticker.complete();
        let last = recorder.0.lock().unwrap().last().cloned().unwrap();
        assert_eq!(last.percent, 100.0);
        assert_eq!(last.remaining, None);

        let before = recorder.percents().len();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(recorder.percents().len(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_ticker_stops_it() {
        let recorder = Arc::new(Recorder::default());
        let ticker = ProgressTicker::start(DEFAULT_TICK_INTERVAL, Fixed(1.0), recorder.clone());
        tokio::time::sleep(Duration::from_millis(3_500)).await;
        ticker.cancel();
        let before = recorder.percents().len();
        assert_eq!(before, 4);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(recorder.percents().len(), before);
        assert!(recorder.percents().iter().all(|&p| p < 100.0));
    }
}
