//! Special functions behind the exact binomial interval.
//!
//! - `ln_gamma` uses the Lanczos approximation (g = 7, 9 coefficients).
//! - `beta_cdf` is the regularized incomplete beta function `I_x(a, b)`,
//!   evaluated with the modified Lentz continued fraction (Numerical Recipes, §6.4).
//! - `beta_quantile` inverts `beta_cdf` with Newton steps on the beta density,
//!   safeguarded by a shrinking bisection bracket.

use std::f64::consts::PI;

/// Log-gamma for `x > 0`.
#[allow(clippy::excessive_precision)]
pub fn ln_gamma(x: f64) -> f64 {
    const COEFFS: [f64; 9] = [
        0.999_999_999_999_809_93,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_13,
        -176.615_029_162_140_59,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_571_6e-6,
        1.505_632_735_149_311_6e-7,
    ];

    if x < 0.5 {
        // Reflection formula
        PI.ln() - (PI * x).sin().abs().ln() - ln_gamma(1f64 - x)
    } else {
        let x = x - 1f64;
        let ag = COEFFS[1..]
            .iter()
            .enumerate()
            .fold(COEFFS[0], |ag, (i, c)| ag + c / (x + i as f64 + 1f64));
        let t = x + 7.5;
        0.5 * (2f64 * PI).ln() + (x + 0.5) * t.ln() - t + ag.ln()
    }
}

pub fn ln_beta(a: f64, b: f64) -> f64 {
    ln_gamma(a) + ln_gamma(b) - ln_gamma(a + b)
}

/// Regularized incomplete beta function `I_x(a, b)`, i.e., the CDF of `Beta(a, b)` at `x`.
///
/// Requires `a, b > 0`. Arguments outside of `[0, 1]` are clamped.
pub fn beta_cdf(x: f64, a: f64, b: f64) -> f64 {
    if x <= 0f64 {
        return 0f64;
    }
    if x >= 1f64 {
        return 1f64;
    }
    // The continued fraction converges fast for x < (a + 1) / (a + b + 2),
    // otherwise use the symmetry I_x(a, b) = 1 - I_{1-x}(b, a).
    if x > (a + 1f64) / (a + b + 2f64) {
        return (1f64 - beta_cdf(1f64 - x, b, a)).clamp(0f64, 1f64);
    }
    let ln_front = a * x.ln() + b * (1f64 - x).ln() - ln_beta(a, b);
    (ln_front.exp() * beta_continued_fraction(x, a, b) / a).clamp(0f64, 1f64)
}

#[allow(clippy::many_single_char_names)]
fn beta_continued_fraction(x: f64, a: f64, b: f64) -> f64 {
    const EPS: f64 = 1e-15;
    const TINY: f64 = 1e-300;
    const MAX_ITER: usize = 1_000;

    let qab = a + b;
    let qap = a + 1f64;
    let qam = a - 1f64;

    let mut c = 1f64;
    let mut d = 1f64 - qab * x / qap;
    if d.abs() < TINY {
        d = TINY;
    }
    d = 1f64 / d;
    let mut h = d;
    for m in 1..=MAX_ITER {
        let m = m as f64;
        let m2 = 2f64 * m;
        // Even step
        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1f64 + aa * d;
        if d.abs() < TINY {
            d = TINY;
        }
        c = 1f64 + aa / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1f64 / d;
        h *= d * c;
        // Odd step
        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1f64 + aa * d;
        if d.abs() < TINY {
            d = TINY;
        }
        c = 1f64 + aa / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1f64 / d;
        let del = d * c;
        h *= del;
        if (del - 1f64).abs() < EPS {
            break;
        }
    }
    h
}

/// Density of `Beta(a, b)` at `x` in `(0, 1)`.
pub fn beta_pdf(x: f64, a: f64, b: f64) -> f64 {
    ((a - 1f64) * x.ln() + (b - 1f64) * (1f64 - x).ln() - ln_beta(a, b)).exp()
}

/// Inverse of [`beta_cdf`]: the `x` such that `I_x(a, b) = p`.
pub fn beta_quantile(p: f64, a: f64, b: f64) -> f64 {
    const MAX_ITER: usize = 64;

    if p <= 0f64 {
        return 0f64;
    }
    if p >= 1f64 {
        return 1f64;
    }
    let (mut lo, mut hi) = (0f64, 1f64);
    let mut x = a / (a + b);
    for _ in 0..MAX_ITER {
        let err = beta_cdf(x, a, b) - p;
        if err == 0f64 {
            return x;
        }
        if err < 0f64 {
            lo = x;
        } else {
            hi = x;
        }
        let newton = x - err / beta_pdf(x, a, b);
        // Newton leaves the bracket near the tails of skewed densities: bisect instead.
        let next = if lo < newton && newton < hi {
            newton
        } else {
            0.5 * (lo + hi)
        };
        if (next - x).abs() <= 4f64 * f64::EPSILON * next || hi - lo <= f64::EPSILON * hi {
            return next;
        }
        x = next;
    }
    x
}
