//! Sample-coverage estimation.
//!
//! Coverage is the probability mass of the population already represented by
//! the observed species. Four estimators are provided:
//!
//! - **Turing** — the Good-Turing rule C = 1 − f1/n
//! - **Good** — Turing plus the doubleton correction term
//! - **Chao** — Turing refined by the singleton/doubleton ratio (Chao & Jost 2012)
//! - **ZhangHuang** — the full alternating frequency-class series
//!   (Zhang & Huang 2007), the default and the most accurate at moderate n
//!
//! All four agree within about 1% on well-sampled communities. A sample made
//! entirely of singletons has mathematically zero coverage and is reported as
//! degenerate, not as an error.

use banksia_core::{BanksiaError, Result};

use crate::distribution::FrequencyCounts;
use crate::math::ln_binomial;
use crate::record::Diagnostic;

/// Coverage estimator variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CoverageEstimator {
    /// Alternating frequency-class series (Zhang & Huang 2007).
    #[default]
    ZhangHuang,
    /// Singleton/doubleton refinement of Turing (Chao & Jost 2012).
    Chao,
    /// Good-Turing rule, singletons only.
    Turing,
    /// Good-Turing with the doubleton correction term.
    Good,
}

impl CoverageEstimator {
    /// Estimator name as recorded on results.
    pub fn name(&self) -> &'static str {
        match self {
            CoverageEstimator::ZhangHuang => "ZhangHuang",
            CoverageEstimator::Chao => "Chao",
            CoverageEstimator::Turing => "Turing",
            CoverageEstimator::Good => "Good",
        }
    }
}

/// A coverage estimate with its provenance.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CoverageEstimate {
    /// Estimated coverage in [0, 1]; NaN when the sample cannot support the
    /// estimator.
    pub value: f64,
    /// The estimator that produced the value.
    pub estimator: CoverageEstimator,
    /// Degenerate-sample notice, if any.
    pub diagnostic: Option<Diagnostic>,
}

/// Estimate the sample coverage of a count vector.
///
/// # Errors
///
/// Returns an error if `counts` is empty.
///
/// # Example
///
/// ```
/// use banksia_div::coverage::{coverage, CoverageEstimator};
///
/// let est = coverage(&[4, 3, 3, 2, 1, 1], CoverageEstimator::default()).unwrap();
/// assert!(est.value > 0.8 && est.value < 1.0);
/// ```
pub fn coverage(counts: &[usize], estimator: CoverageEstimator) -> Result<CoverageEstimate> {
    if counts.is_empty() {
        return Err(BanksiaError::InvalidInput(
            "coverage: counts must be non-empty".into(),
        ));
    }
    Ok(coverage_from_frequencies(
        &FrequencyCounts::from_counts(counts),
        estimator,
    ))
}

/// Estimate coverage from pre-tallied frequency counts.
pub fn coverage_from_frequencies(
    freq: &FrequencyCounts,
    estimator: CoverageEstimator,
) -> CoverageEstimate {
    if freq.n == 0 {
        return CoverageEstimate {
            value: f64::NAN,
            estimator,
            diagnostic: Some(Diagnostic::DegenerateSample {
                reason: "sample has no individuals".into(),
            }),
        };
    }
    if freq.all_singletons() {
        // Every observed species was seen once: the observed mass estimate
        // is exactly zero. Chao's refinement needs doubletons and cannot be
        // evaluated at all.
        let value = if estimator == CoverageEstimator::Chao {
            f64::NAN
        } else {
            0.0
        };
        return CoverageEstimate {
            value,
            estimator,
            diagnostic: Some(Diagnostic::DegenerateSample {
                reason: "all observed species are singletons; coverage is zero".into(),
            }),
        };
    }

    let n = freq.n as f64;
    let f1 = freq.f1() as f64;
    let f2 = freq.f2() as f64;

    let value = match estimator {
        CoverageEstimator::Turing => 1.0 - f1 / n,
        CoverageEstimator::Good => 1.0 - f1 / n + 2.0 * f2 / (n * (n - 1.0)),
        CoverageEstimator::Chao => {
            let ratio = if f2 > 0.0 {
                (n - 1.0) * f1 / ((n - 1.0) * f1 + 2.0 * f2)
            } else {
                // One-term fallback when no doubletons were observed.
                (n - 1.0) * (f1 - 1.0) / ((n - 1.0) * (f1 - 1.0) + 2.0)
            };
            1.0 - (f1 / n) * ratio
        }
        CoverageEstimator::ZhangHuang => {
            // C = 1 − Σ_v (−1)^{v+1} f_v / C(n, v); terms vanish quickly
            // with v, so summing over the observed classes is exact enough.
            let mut deficit = 0.0;
            for (v, f_v) in freq.classes() {
                let sign = if v % 2 == 1 { 1.0 } else { -1.0 };
                deficit += sign * f_v as f64 * (-ln_binomial(freq.n, v)).exp();
            }
            (1.0 - deficit).clamp(0.0, 1.0)
        }
    };

    CoverageEstimate {
        value: value.clamp(0.0, 1.0),
        estimator,
        diagnostic: None,
    }
}
