//! Pull-based sample sources.
//!
//! The estimation engine only ever asks a [`SampleSource`] for its next observation.
//! How observations are produced (replaying a recorded dataset,
//! invoking a simulator, timing a benchmark) is up to the implementation.
//! Sources may block for arbitrarily long: the engine imposes no timeouts.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::error::Error as StdError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    /// No further observations can be obtained.
    /// This is an expected terminal condition, not a failure.
    #[error("sample source exhausted")]
    Exhausted,
    /// The source broke down while producing an observation.
    #[error("sample source failed")]
    Failed(#[source] Box<dyn StdError + Send + Sync>),
}

/// Trait for producers of (conceptually infinite) sequences of observations.
pub trait SampleSource {
    /// The type of the observations produced by the source.
    type Observation;

    /// Produces the next observation, or signals exhaustion.
    fn next_observation(&mut self) -> Result<Self::Observation, SourceError>;
}

impl<S: SampleSource + ?Sized> SampleSource for &mut S {
    type Observation = S::Observation;

    fn next_observation(&mut self) -> Result<Self::Observation, SourceError> {
        (**self).next_observation()
    }
}

/// Replays a finite sequence of recorded observations.
#[derive(Debug, Clone)]
pub struct Recorded<I> {
    iter: I,
}

impl<I: Iterator> Recorded<I> {
    pub fn new<T: IntoIterator<IntoIter = I>>(observations: T) -> Self {
        Self {
            iter: observations.into_iter(),
        }
    }
}

impl<I: Iterator> SampleSource for Recorded<I> {
    type Observation = I::Item;

    fn next_observation(&mut self) -> Result<I::Item, SourceError> {
        self.iter.next().ok_or(SourceError::Exhausted)
    }
}

/// Adapts a closure, e.g. one invoking a simulator.
#[derive(Debug, Clone)]
pub struct FnSource<F>(pub F);

impl<O, F> SampleSource for FnSource<F>
where
    F: FnMut() -> Result<O, SourceError>,
{
    type Observation = O;

    fn next_observation(&mut self) -> Result<O, SourceError> {
        (self.0)()
    }
}

/// Synthetic Bernoulli trials with success probability `p`.
#[derive(Debug, Clone)]
pub struct BernoulliSource {
    p: f64,
    rng: SmallRng,
}

impl BernoulliSource {
    /// Returns `None` if `p` is not a probability.
    pub fn new(p: f64, seed: u64) -> Option<Self> {
        (0f64..=1f64).contains(&p).then(|| Self {
            p,
            rng: SmallRng::seed_from_u64(seed),
        })
    }
}

impl SampleSource for BernoulliSource {
    type Observation = bool;

    fn next_observation(&mut self) -> Result<bool, SourceError> {
        Ok(self.rng.random_bool(self.p))
    }
}

/// Synthetic uniform samples on `[lo, hi)`.
#[derive(Debug, Clone)]
pub struct UniformSource {
    lo: f64,
    hi: f64,
    rng: SmallRng,
}

impl UniformSource {
    /// Returns `None` unless `lo < hi` are finite.
    pub fn new(lo: f64, hi: f64, seed: u64) -> Option<Self> {
        (lo < hi && lo.is_finite() && hi.is_finite()).then(|| Self {
            lo,
            hi,
            rng: SmallRng::seed_from_u64(seed),
        })
    }
}

impl SampleSource for UniformSource {
    type Observation = f64;

    fn next_observation(&mut self) -> Result<f64, SourceError> {
        Ok(self.rng.random_range(self.lo..self.hi))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorded_exhausts() {
        let mut source = Recorded::new([1.0, 2.0]);
        assert_eq!(source.next_observation().ok(), Some(1.0));
        assert_eq!(source.next_observation().ok(), Some(2.0));
        assert!(matches!(
            source.next_observation(),
            Err(SourceError::Exhausted)
        ));
    }

    #[test]
    fn seeded_sources_replay() {
        let mut a = BernoulliSource::new(0.3, 7).expect("probability");
        let mut b = BernoulliSource::new(0.3, 7).expect("probability");
        for _ in 0..100 {
            assert_eq!(a.next_observation().ok(), b.next_observation().ok());
        }
        assert!(BernoulliSource::new(1.5, 0).is_none());

        let mut u = UniformSource::new(2.0, 3.0, 11).expect("range");
        for _ in 0..100 {
            let x = u.next_observation().expect("uniform");
            assert!((2.0..3.0).contains(&x));
        }
        assert!(UniformSource::new(3.0, 3.0, 0).is_none());
    }

    #[test]
    fn closures() {
        let mut count = 0u32;
        let mut source = FnSource(|| {
            count += 1;
            if count <= 3 {
                Ok(count)
            } else {
                Err(SourceError::Exhausted)
            }
        });
        let mut seen = Vec::new();
        while let Ok(o) = source.next_observation() {
            seen.push(o);
        }
        assert_eq!(seen, vec![1, 2, 3]);
    }
}
