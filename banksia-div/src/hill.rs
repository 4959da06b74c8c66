//! Hill numbers: the deformed exponential/logarithm pair and the
//! entropy ↔ diversity transform.
//!
//! A Hill number is the "effective number of equally common species": the
//! deformed exponential of the Tsallis entropy of the same order,
//! D_q = exp_q(H_q). Both deformed maps are evaluated through `ln_1p`/`exp_m1`
//! so they stay numerically continuous across q → 1.

use banksia_core::Result;

use crate::entropy::{tsallis, EntropyOptions, Q_TOL};
use crate::record::{DiversityEstimate, Quantity};

/// Deformed logarithm ln_q(x) = (x^{1−q} − 1)/(1 − q); natural log at q = 1.
///
/// Returns NaN for x ≤ 0.
pub fn ln_q(x: f64, q: f64) -> f64 {
    if x <= 0.0 {
        return f64::NAN;
    }
    if (q - 1.0).abs() <= Q_TOL {
        x.ln()
    } else {
        ((1.0 - q) * x.ln()).exp_m1() / (1.0 - q)
    }
}

/// Deformed exponential exp_q(x) = (1 + (1−q)x)^{1/(1−q)}; plain exp at q = 1.
///
/// Returns NaN outside the domain (1 + (1−q)x ≤ 0).
pub fn exp_q(x: f64, q: f64) -> f64 {
    if (q - 1.0).abs() <= Q_TOL {
        x.exp()
    } else {
        let t = (1.0 - q) * x;
        if 1.0 + t <= 0.0 {
            f64::NAN
        } else {
            (t.ln_1p() / (1.0 - q)).exp()
        }
    }
}

/// Estimate the Hill diversity of order `q` from a count vector.
///
/// This is [`tsallis`] followed by the deformed exponential; the record
/// keeps the underlying estimator, coverage, and diagnostics.
///
/// # Errors
///
/// Propagates any error from the entropy estimation.
///
/// # Example
///
/// ```
/// use banksia_div::entropy::EntropyOptions;
/// use banksia_div::hill::hill_number;
///
/// // Four equally common species: D_q = 4 at every order.
/// let d = hill_number(&[25, 25, 25, 25], 2.0, &EntropyOptions::naive()).unwrap();
/// assert!((d.value - 4.0).abs() < 1e-9);
/// ```
pub fn hill_number(counts: &[usize], q: f64, opts: &EntropyOptions) -> Result<DiversityEstimate> {
    let mut record = tsallis(counts, q, opts)?;
    record.value = exp_q(record.value, q);
    record.quantity = Quantity::Diversity;
    Ok(record)
}
