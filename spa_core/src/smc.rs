//! Sample-size planning for Bernoulli experiments.
//!
//! These bounds do not drive the sequential engine, which computes exact intervals after every sample.
//! They answer the question "how many runs should I budget for?" up front.

// An efficient statistical model checker for nondeterminism and rare events,
// Carlos E. Budde, Pedro R. D’Argenio, Arnd Hartmanns, Sean Sedwards.
// International Journal on Software Tools for Technology Transfer (2020) 22:759–780
// https://doi.org/10.1007/s10009-020-00563-2

/// Computes Okamoto bound for given confidence and precision.
///
/// This many samples guarantee the precision for any success probability.
pub fn okamoto_bound(confidence: f64, precision: f64) -> f64 {
    (2f64 / (1f64 - confidence)).ln() / (2f64 * precision.powf(2f64))
}

/// Computes adaptive bound for given confidence, precision and (partial) experimental results.
pub fn adaptive_bound(avg: f64, confidence: f64, precision: f64) -> f64 {
    4f64 * okamoto_bound(confidence, precision)
        * (0.25f64 - ((avg - 0.5f64).abs() - (2f64 * precision / 3f64)).powf(2f64))
}

/// Computes precision for given experimental results and confidence
/// deriving it from adaptive bound through quadratic equation.
pub fn derive_precision(s: u64, f: u64, confidence: f64) -> f64 {
    let n = s + f;
    let avg = s as f64 / n as f64;
    let k = 2f64 * (2f64 / (1f64 - confidence)).ln();
    // Compute quadratic equation coefficients.
    let a = (n as f64) + (4f64 * k / 9f64);
    let b = -4f64 * k * (avg - 0.5f64).abs() / 3f64;
    let c = k * ((avg - 0.5f64).powf(2f64) - 0.25f64);
    // Take (larger positive) quadratic equation solution.
    (-b + (b.powf(2f64) - 4f64 * a * c).sqrt()) / (2f64 * a)
}

/// Minimum number of samples a hypothesis test needs before it can conclude either way.
///
/// A run of only failures (resp. only successes) reaches the confidence
/// once `(1 - θ)^n` (resp. `θ^n`) drops to `1 - confidence`.
pub fn min_samples(prob_threshold: f64, confidence: f64) -> u64 {
    let target = (1f64 - confidence).ln();
    let all_failures = (target / (1f64 - prob_threshold).ln()).ceil();
    let all_successes = (target / prob_threshold.ln()).ceil();
    all_failures.max(all_successes).max(1f64) as u64
}
