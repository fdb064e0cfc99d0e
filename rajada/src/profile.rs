//! Workload profiles: the arrival rate of new virtual users over time.
//!
//! A [`Profile`] is a list of [`Phase`]s run back to back. Each phase either holds a
//! constant rate or ramps linearly to a target rate. A ramp without an explicit start
//! continues from the rate in effect when the previous phase ended (0 before the first
//! phase), so profiles read like a rate curve drawn left to right.
//!
//! # Arrival placement
//! Within a phase of duration `d` ramping from `r0` to `r1` (a constant phase has
//! `r0 == r1`), the expected number of arrivals by time `t` is
//!
//! ```text
//! N(t) = r0·t + (r1 - r0)·t² / (2d)
//! ```
//!
//! The k-th arrival (k = 0, 1, …) is placed where `N(t) = k + ½`, for as long as that
//! stays below `N(d)`. A phase therefore yields `N(d)` arrivals rounded to the nearest
//! integer (halves round down). A constant phase spaces them exactly `1/r` apart and a
//! phase at rate 0 yields none.
//!
//! Solving the quadratic in its cancellation-free form:
//!
//! ```text
//! t = 2n / (r0 + sqrt(r0² + 2·a·n)),   a = (r1 - r0) / d
//! ```
//!
//! # Randomization
//! A randomized phase moves every arrival by an independent uniform offset of at most
//! half the local inter-arrival gap, `1 / (2·r(t))`, clamped to the phase window. The
//! number of arrivals never changes.
use std::time::Duration;

use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

use crate::{config::millis, error::ConfigError};
use internals::*;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rate {
    /// Arrivals per second held for the whole phase.
    Constant { rate: f64 },
    /// Linear ramp to `to`; `from` defaults to the rate in effect at phase start.
    Ramp {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<f64>,
        to: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    #[serde(flatten)]
    pub rate: Rate,
    #[serde(rename = "duration_ms", with = "millis")]
    pub duration: Duration,
    #[serde(default)]
    pub randomized: bool,
}

impl Phase {
    pub fn constant(rate: f64, duration: Duration) -> Self {
        Self {
            rate: Rate::Constant { rate },
            duration,
            randomized: false,
        }
    }

    /// Ramp from the rate in effect at phase start to `to`.
    pub fn ramp(to: f64, duration: Duration) -> Self {
        Self {
            rate: Rate::Ramp { from: None, to },
            duration,
            randomized: false,
        }
    }

    pub fn ramp_from(from: f64, to: f64, duration: Duration) -> Self {
        Self {
            rate: Rate::Ramp {
                from: Some(from),
                to,
            },
            duration,
            randomized: false,
        }
    }

    pub fn randomized(mut self) -> Self {
        self.randomized = true;
        self
    }

    /// Start and end rate of this phase given the rate in effect before it.
    pub fn endpoints(&self, rate_in_effect: f64) -> (f64, f64) {
        match self.rate {
            Rate::Constant { rate } => (rate, rate),
            Rate::Ramp { from, to } => (from.unwrap_or(rate_in_effect), to),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let rates = match self.rate {
            Rate::Constant { rate } => vec![rate],
            Rate::Ramp { from, to } => from.into_iter().chain([to]).collect(),
        };
        match rates.into_iter().find(|r| !r.is_finite() || *r < 0.0) {
            Some(bad) => Err(ConfigError::Invalid(format!(
                "phase rate must be a finite, non-negative number, got {bad}"
            ))),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Phase>", into = "Vec<Phase>")]
pub struct Profile {
    phases: Vec<Phase>,
}

impl Profile {
    pub fn new(phases: Vec<Phase>) -> Result<Self, ConfigError> {
        for phase in &phases {
            phase.validate()?;
        }
        Ok(Self { phases })
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn duration(&self) -> Duration {
        self.phases.iter().map(|p| p.duration).sum()
    }

    /// Number of arrivals the profile schedules.
    pub fn expected_arrivals(&self) -> u64 {
        let mut rate = 0.0;
        let mut total = 0;
        for phase in &self.phases {
            let (r0, r1) = phase.endpoints(rate);
            total += phase_arrivals(phase.duration, r0, r1);
            rate = r1;
        }
        total
    }

    pub fn schedule(&self) -> Schedule<StdRng> {
        self.schedule_with(StdRng::from_entropy())
    }

    /// Schedule drawing its jitter from `rng`; a seeded rng gives a reproducible
    /// schedule.
    pub fn schedule_with<R: Rng>(&self, rng: R) -> Schedule<R> {
        Schedule {
            phases: self.phases.clone(),
            index: 0,
            phase_start: Duration::ZERO,
            rate_in_effect: 0.0,
            k: 0,
            rng,
        }
    }
}

impl TryFrom<Vec<Phase>> for Profile {
    type Error = ConfigError;

    fn try_from(phases: Vec<Phase>) -> Result<Self, Self::Error> {
        Profile::new(phases)
    }
}

impl From<Profile> for Vec<Phase> {
    fn from(profile: Profile) -> Self {
        profile.phases
    }
}

/// One scheduled virtual-user start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arrival {
    /// Offset from the start of the run.
    pub offset: Duration,
    /// Index of the phase that produced it.
    pub phase: usize,
}

/// Lazy, ordered stream of [`Arrival`]s over every phase of a profile.
///
/// Offsets are non-decreasing except for jitter of randomized phases.
#[derive(Debug, Clone)]
pub struct Schedule<R> {
    phases: Vec<Phase>,
    index: usize,
    phase_start: Duration,
    rate_in_effect: f64,
    k: u64,
    rng: R,
}

impl<R: Rng> Iterator for Schedule<R> {
    type Item = Arrival;

    fn next(&mut self) -> Option<Arrival> {
        loop {
            let phase = *self.phases.get(self.index)?;
            let (r0, r1) = phase.endpoints(self.rate_in_effect);

            if let Some(t) = arrival_time(self.k, phase.duration, r0, r1) {
                self.k += 1;
                let t = if phase.randomized {
                    jitter(&mut self.rng, t, phase.duration, r0, r1)
                } else {
                    t
                };
                return Some(Arrival {
                    offset: self.phase_start + t,
                    phase: self.index,
                });
            }

            self.phase_start += phase.duration;
            self.rate_in_effect = r1;
            self.index += 1;
            self.k = 0;
        }
    }
}

#[cfg(feature = "internals")]
pub use internals::*;

/// Pure schedule math, exposed with the `internals` feature.
mod internals {
    use super::*;

    /// Expected arrivals by `elapsed` into a phase, i.e. the integral of the rate.
    pub fn cumulative_arrivals(elapsed: Duration, duration: Duration, r0: f64, r1: f64) -> f64 {
        let d = duration.as_secs_f64();
        if d == 0.0 {
            return 0.0;
        }
        let t = elapsed.as_secs_f64().min(d);
        r0 * t + (r1 - r0) * t * t / (2.0 * d)
    }

    /// Number of arrivals a phase produces: the count of `k` with `k + ½ < N(d)`.
    pub fn phase_arrivals(duration: Duration, r0: f64, r1: f64) -> u64 {
        let total = cumulative_arrivals(duration, duration, r0, r1);
        if total.is_finite() && total > 0.0 {
            (total - 0.5).ceil() as u64
        } else {
            0
        }
    }

    /// Offset of the k-th arrival inside a phase, or `None` once the phase is spent.
    pub fn arrival_time(k: u64, duration: Duration, r0: f64, r1: f64) -> Option<Duration> {
        let n = k as f64 + 0.5;
        if n >= cumulative_arrivals(duration, duration, r0, r1) {
            return None;
        }
        let a = (r1 - r0) / duration.as_secs_f64();
        let t = 2.0 * n / (r0 + (r0 * r0 + 2.0 * a * n).max(0.0).sqrt());
        if t.is_finite() {
            Some(Duration::from_secs_f64(t.clamp(0.0, duration.as_secs_f64())))
        } else {
            None
        }
    }

    /// Instantaneous rate `elapsed` into the phase.
    pub fn rate_at(elapsed: Duration, duration: Duration, r0: f64, r1: f64) -> f64 {
        if duration.is_zero() {
            return r1;
        }
        let t = (elapsed.as_secs_f64() / duration.as_secs_f64()).min(1.0);
        r0 + (r1 - r0) * t
    }

    /// Moves `t` by at most half the local inter-arrival gap, staying inside the phase.
    pub fn jitter<R: Rng>(rng: &mut R, t: Duration, duration: Duration, r0: f64, r1: f64) -> Duration {
        let rate = rate_at(t, duration, r0, r1);
        if rate <= 0.0 || !rate.is_finite() {
            return t;
        }
        let half_gap = 0.5 / rate;
        let shifted = (t.as_secs_f64() + rng.gen_range(-half_gap..=half_gap)).max(0.0);
        // keep strictly inside the window so the arrival stays in its phase
        Duration::from_secs_f64(shifted).min(duration.saturating_sub(Duration::from_nanos(1)))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn offsets(profile: &Profile) -> Vec<f64> {
        profile
            .schedule_with(StdRng::seed_from_u64(7))
            .map(|a| a.offset.as_secs_f64())
            .collect()
    }

    #[rstest]
    #[case(2.0, 10)]
    #[case(5.0, 15)]
    #[case(0.3, 10)]
    #[case(600.0, 3)]
    #[case(7.7, 13)]
    fn constant_phase_count(#[case] rate: f64, #[case] duration: u64) {
        let profile = Profile::new(vec![Phase::constant(rate, secs(duration))]).unwrap();
        let count = profile.schedule().count() as f64;
        assert!((count - rate * duration as f64).abs() <= 1.0, "{count}");
        assert_eq!(count as u64, profile.expected_arrivals());
    }

    #[test]
    fn constant_phase_gaps() {
        let profile = Profile::new(vec![Phase::constant(4.0, secs(5))]).unwrap();
        let offsets = offsets(&profile);
        assert_eq!(offsets.len(), 20);
        assert!((offsets[0] - 0.125).abs() < 1e-9);
        for pair in offsets.windows(2) {
            assert!((pair[1] - pair[0] - 0.25).abs() < 1e-9);
        }
    }

    #[test]
    fn zero_rate_schedules_nothing() {
        let profile = Profile::new(vec![Phase::constant(0.0, secs(10))]).unwrap();
        assert_eq!(profile.schedule().count(), 0);
        assert_eq!(profile.duration(), secs(10));
    }

    #[test]
    fn ramp_follows_integral() {
        let (r0, r1, d) = (5.0, 600.0, secs(180));
        let profile = Profile::new(vec![Phase::ramp_from(r0, r1, d)]).unwrap();
        let offsets = offsets(&profile);

        let expected_total = cumulative_arrivals(d, d, r0, r1);
        assert!((offsets.len() as f64 - expected_total).abs() <= 1.0);

        for t in [1u64, 10, 45, 90, 120, 179] {
            let by_t = offsets.iter().filter(|o| **o <= t as f64).count() as f64;
            let expected = cumulative_arrivals(secs(t), d, r0, r1);
            assert!((by_t - expected).abs() <= 1.0, "t={t}: {by_t} vs {expected}");
        }
    }

    #[test]
    fn ramp_down_follows_integral() {
        let d = secs(10);
        let profile = Profile::new(vec![Phase::ramp_from(100.0, 0.0, d)]).unwrap();
        let offsets = offsets(&profile);
        assert_eq!(offsets.len(), 500);
        for t in 1..10u64 {
            let by_t = offsets.iter().filter(|o| **o <= t as f64).count() as f64;
            let expected = cumulative_arrivals(secs(t), d, 100.0, 0.0);
            assert!((by_t - expected).abs() <= 1.0);
        }
    }

    #[test]
    fn ramp_starts_from_rate_in_effect() {
        let profile = Profile::new(vec![
            Phase::constant(5.0, secs(2)),
            Phase::ramp(15.0, secs(2)),
        ])
        .unwrap();
        // 5·2 + (5 + 15)/2·2
        assert_eq!(profile.expected_arrivals(), 30);
        assert_eq!(profile.schedule().count(), 30);
    }

    #[test]
    fn zero_duration_phase_only_sets_rate() {
        let profile = Profile::new(vec![
            Phase::ramp(10.0, Duration::ZERO),
            Phase::ramp(10.0, secs(3)),
        ])
        .unwrap();
        let arrivals: Vec<_> = profile.schedule().collect();
        assert_eq!(arrivals.len(), 30);
        assert!(arrivals.iter().all(|a| a.phase == 1));
    }

    #[test]
    fn phases_run_back_to_back() {
        let profile = Profile::new(vec![
            Phase::constant(2.0, secs(10)),
            Phase::constant(5.0, secs(15)),
        ])
        .unwrap();
        let arrivals: Vec<_> = profile.schedule().collect();
        assert_eq!(arrivals.len(), 95);
        let first_of_second = arrivals.iter().find(|a| a.phase == 1).unwrap();
        assert!((first_of_second.offset.as_secs_f64() - 10.1).abs() < 1e-9);
        assert!(arrivals.windows(2).all(|w| w[0].offset <= w[1].offset));
    }

    #[test]
    fn randomized_keeps_count_and_bounds() {
        let plain = Profile::new(vec![Phase::constant(5.0, secs(15))]).unwrap();
        let jittered = Profile::new(vec![Phase::constant(5.0, secs(15)).randomized()]).unwrap();

        let a = offsets(&plain);
        let b = offsets(&jittered);
        assert_eq!(a.len(), b.len());
        assert_eq!(b.len(), 75);
        assert_ne!(a, b);
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() <= 0.1 + 1e-9);
            assert!(*y >= 0.0 && *y < 15.0);
        }
    }

    #[test]
    fn seeded_schedule_is_reproducible() {
        let profile = Profile::new(vec![Phase::constant(5.0, secs(15)).randomized()]).unwrap();
        assert_eq!(offsets(&profile), offsets(&profile));
    }

    #[rstest]
    #[case(Phase::constant(-1.0, secs(1)))]
    #[case(Phase::constant(f64::NAN, secs(1)))]
    #[case(Phase::ramp(f64::INFINITY, secs(1)))]
    #[case(Phase::ramp_from(-3.0, 10.0, secs(1)))]
    fn invalid_rates_are_rejected(#[case] phase: Phase) {
        assert!(matches!(Profile::new(vec![phase]), Err(ConfigError::Invalid(_))));
    }

    mod math {
        use super::*;

        #[test]
        fn cumulative_is_capped_at_duration() {
            let d = secs(10);
            assert_eq!(
                cumulative_arrivals(secs(20), d, 0.0, 100.0),
                cumulative_arrivals(d, d, 0.0, 100.0)
            );
            assert_eq!(cumulative_arrivals(d, d, 0.0, 100.0), 500.0);
        }

        #[test]
        fn hold_steady() {
            for k in 0..10 {
                let t = arrival_time(k, secs(10), 1.0, 1.0).unwrap();
                assert!((t.as_secs_f64() - (k as f64 + 0.5)).abs() < 1e-9);
            }
            assert_eq!(arrival_time(10, secs(10), 1.0, 1.0), None);
        }

        #[test]
        fn ramp_up_from_zero() {
            // N(t) = 5t² over 10s → 500 arrivals
            let d = secs(10);
            let t = arrival_time(0, d, 0.0, 100.0).unwrap().as_secs_f64();
            assert!((t - (0.5f64 / 5.0).sqrt()).abs() < 1e-9);
            assert!(arrival_time(499, d, 0.0, 100.0).is_some());
            assert_eq!(arrival_time(500, d, 0.0, 100.0), None);
        }

        #[test]
        fn rate_is_interpolated() {
            let d = secs(10);
            assert_eq!(rate_at(Duration::ZERO, d, 10.0, 20.0), 10.0);
            assert_eq!(rate_at(secs(5), d, 10.0, 20.0), 15.0);
            assert_eq!(rate_at(secs(50), d, 10.0, 20.0), 20.0);
            assert_eq!(rate_at(Duration::ZERO, Duration::ZERO, 10.0, 20.0), 20.0);
        }

        #[test]
        fn fractional_totals_round() {
            assert_eq!(phase_arrivals(secs(10), 0.34, 0.34), 3);
            assert_eq!(phase_arrivals(secs(10), 0.36, 0.36), 4);
            assert_eq!(phase_arrivals(secs(10), 0.0, 0.0), 0);
        }
    }
}
