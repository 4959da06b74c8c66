//! Total-richness estimation: observed plus unseen species.
//!
//! These estimators size the unseen-species pool the unveiled probability
//! and entropy estimators hang their tails on:
//!
//! - **Chao1** — the classic singleton/doubleton lower bound
//! - **iChao1** — Chao1 plus the tripleton/quadrupleton refinement
//!   (Chiu et al. 2014); needs quadrupletons, else falls back to Chao1
//! - **Jackknife** — Burnham-Overton resampling estimator with the order
//!   chosen by a sequential significance test

use banksia_core::{BanksiaError, Result};

use crate::distribution::FrequencyCounts;
use crate::math::normal_cdf;
use crate::record::Diagnostic;

/// Richness estimator variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RichnessEstimator {
    /// Observed richness, no correction.
    Observed,
    /// Chao1 lower bound.
    Chao1,
    /// Improved Chao1 (Chiu et al. 2014).
    IChao1,
    /// Burnham-Overton jackknife with automatic order selection.
    #[default]
    Jackknife,
}

impl RichnessEstimator {
    /// Estimator name as recorded on results.
    pub fn name(&self) -> &'static str {
        match self {
            RichnessEstimator::Observed => "Observed",
            RichnessEstimator::Chao1 => "Chao1",
            RichnessEstimator::IChao1 => "iChao1",
            RichnessEstimator::Jackknife => "Jackknife",
        }
    }
}

/// A richness estimate with its provenance.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RichnessEstimate {
    /// Estimated total (observed + unseen) species count.
    pub value: f64,
    /// The estimator that produced the value, after any fallback.
    pub estimator: RichnessEstimator,
    /// Selected jackknife order, when the jackknife was used.
    pub jackknife_order: Option<usize>,
    /// Fallback or degeneracy notices.
    pub diagnostics: Vec<Diagnostic>,
}

/// Default cap on the jackknife order scan.
pub const DEFAULT_JACK_MAX: usize = 10;
/// Default significance level for the jackknife order test.
pub const DEFAULT_JACK_ALPHA: f64 = 0.05;

/// Estimate total species richness from a count vector.
///
/// `jack_max` and `jack_alpha` only matter for [`RichnessEstimator::Jackknife`].
///
/// # Errors
///
/// Returns an error if `counts` is empty or `jack_alpha` is outside (0, 1).
pub fn richness(
    counts: &[usize],
    estimator: RichnessEstimator,
    jack_max: usize,
    jack_alpha: f64,
) -> Result<RichnessEstimate> {
    if counts.is_empty() {
        return Err(BanksiaError::InvalidInput(
            "richness: counts must be non-empty".into(),
        ));
    }
    if !(0.0..1.0).contains(&jack_alpha) || jack_alpha == 0.0 {
        return Err(BanksiaError::InvalidInput(
            "richness: jack_alpha must be in (0, 1)".into(),
        ));
    }
    Ok(richness_from_frequencies(
        &FrequencyCounts::from_counts(counts),
        estimator,
        jack_max,
        jack_alpha,
    ))
}

/// Estimate richness from pre-tallied frequency counts.
pub fn richness_from_frequencies(
    freq: &FrequencyCounts,
    estimator: RichnessEstimator,
    jack_max: usize,
    jack_alpha: f64,
) -> RichnessEstimate {
    if freq.observed == 0 {
        return RichnessEstimate {
            value: f64::NAN,
            estimator,
            jackknife_order: None,
            diagnostics: vec![Diagnostic::DegenerateSample {
                reason: "sample has no individuals".into(),
            }],
        };
    }

    match estimator {
        RichnessEstimator::Observed => RichnessEstimate {
            value: freq.observed as f64,
            estimator,
            jackknife_order: None,
            diagnostics: Vec::new(),
        },
        RichnessEstimator::Chao1 => RichnessEstimate {
            value: chao1(freq),
            estimator,
            jackknife_order: None,
            diagnostics: Vec::new(),
        },
        RichnessEstimator::IChao1 => {
            let f4 = freq.count_of(4);
            if f4 == 0 {
                RichnessEstimate {
                    value: chao1(freq),
                    estimator: RichnessEstimator::Chao1,
                    jackknife_order: None,
                    diagnostics: vec![Diagnostic::EstimatorFallback {
                        requested: "iChao1".into(),
                        used: "Chao1".into(),
                        reason: "no quadrupletons in the sample".into(),
                    }],
                }
            } else {
                let f1 = freq.f1() as f64;
                let f2 = freq.f2() as f64;
                let f3 = freq.count_of(3) as f64;
                let f4 = f4 as f64;
                let refinement =
                    (f3 / (4.0 * f4)) * (f1 - f2 * f3 / (2.0 * f4)).max(0.0);
                RichnessEstimate {
                    value: chao1(freq) + refinement,
                    estimator,
                    jackknife_order: None,
                    diagnostics: Vec::new(),
                }
            }
        }
        RichnessEstimator::Jackknife => {
            let (value, order) = jackknife(freq, jack_max, jack_alpha);
            RichnessEstimate {
                value,
                estimator,
                jackknife_order: Some(order),
                diagnostics: Vec::new(),
            }
        }
    }
}

/// Chao1 point estimate: S_obs + f1²/(2 f2), with the f2 = 0 variant
/// S_obs + f1(f1−1)/2.
pub fn chao1(freq: &FrequencyCounts) -> f64 {
    let s_obs = freq.observed as f64;
    let f1 = freq.f1() as f64;
    let f2 = freq.f2() as f64;
    if f2 > 0.0 {
        s_obs + f1 * f1 / (2.0 * f2)
    } else if f1 > 0.0 {
        s_obs + f1 * (f1 - 1.0) / 2.0
    } else {
        s_obs
    }
}

/// Burnham-Overton jackknife of order k:
/// S_k = S_obs + Σ_{i=1..k} (−1)^{i+1} C(k, i) f_i.
fn jackknife_of_order(freq: &FrequencyCounts, k: usize) -> f64 {
    let mut s = freq.observed as f64;
    // C(k, i) built incrementally.
    let mut binom = 1.0;
    for i in 1..=k {
        binom *= (k - i + 1) as f64 / i as f64;
        let sign = if i % 2 == 1 { 1.0 } else { -1.0 };
        s += sign * binom * freq.count_of(i) as f64;
    }
    s
}

/// Jackknife with sequential order selection (Burnham & Overton 1978).
///
/// Starting at order 0 (observed richness), the order is incremented while
/// the increment S_{k+1} − S_k is significant at `alpha` under a normal
/// test, stopping at `max_order`. The scan depends only on the frequency
/// counts, so it is deterministic and independent of species order.
fn jackknife(freq: &FrequencyCounts, max_order: usize, alpha: f64) -> (f64, usize) {
    let n = freq.n as f64;
    let mut order = 0usize;
    while order < max_order {
        let s_k = jackknife_of_order(freq, order);
        let s_next = jackknife_of_order(freq, order + 1);
        let diff = s_next - s_k;
        // Coefficient of f_i changes by (−1)^{i+1} C(k, i−1) between orders
        // k and k+1; the increment variance follows Burnham & Overton.
        let mut var = 0.0;
        for (v, f_v) in freq.classes() {
            if v > order + 1 {
                break;
            }
            let mut binom = 1.0; // C(order, v-1)
            for j in 1..v {
                if j > order {
                    binom = 0.0;
                    break;
                }
                binom *= (order - j + 1) as f64 / j as f64;
            }
            var += binom * binom * f_v as f64;
        }
        var = (var - diff * diff / n) * n / (n - 1.0).max(1.0);
        if var <= 0.0 {
            break;
        }
        let t = diff / var.sqrt();
        let p = 2.0 * (1.0 - normal_cdf(t.abs()));
        if p >= alpha {
            break;
        }
        order += 1;
    }
    (jackknife_of_order(freq, order), order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::FrequencyCounts;

    fn freq(counts: &[usize]) -> FrequencyCounts {
        FrequencyCounts::from_counts(counts)
    }

    #[test]
    fn chao1_no_rare_species_is_observed() {
        assert!((chao1(&freq(&[10, 20, 30, 40])) - 4.0).abs() < 1e-10);
    }

    #[test]
    fn chao1_with_doubletons() {
        // S_obs = 5, f1 = 2, f2 = 1: 5 + 4/2 = 7.
        let est = richness(&[1, 1, 2, 5, 9], RichnessEstimator::Chao1, 10, 0.05).unwrap();
        assert!((est.value - 7.0).abs() < 1e-10);
    }

    #[test]
    fn ichao1_falls_back_without_quadrupletons() {
        let est = richness(&[1, 1, 2, 5, 9], RichnessEstimator::IChao1, 10, 0.05).unwrap();
        assert_eq!(est.estimator, RichnessEstimator::Chao1);
        assert!(est
            .diagnostics
            .iter()
            .any(|d| matches!(d, Diagnostic::EstimatorFallback { .. })));
    }

    #[test]
    fn ichao1_adds_refinement_when_defined() {
        // f1=2, f2=1, f3=1, f4=1: refinement = (1/4)·max(2 − 1/2, 0) = 0.375.
        let counts = [1, 1, 2, 3, 4, 9];
        let plain = chao1(&freq(&counts));
        let est = richness(&counts, RichnessEstimator::IChao1, 10, 0.05).unwrap();
        assert!((est.value - (plain + 0.375)).abs() < 1e-10);
    }

    #[test]
    fn jackknife_order_one_formula() {
        // First-order jackknife adds f1 exactly.
        let f = freq(&[1, 1, 3, 5]);
        assert!((jackknife_of_order(&f, 1) - (4.0 + 2.0)).abs() < 1e-10);
        // Second order: S + 2f1 − f2.
        assert!((jackknife_of_order(&f, 2) - (4.0 + 4.0 - 0.0)).abs() < 1e-10);
    }

    #[test]
    fn jackknife_selection_is_deterministic() {
        let counts = [1, 1, 1, 2, 2, 3, 4, 8, 15];
        let a = richness(&counts, RichnessEstimator::Jackknife, 10, 0.05).unwrap();
        let b = richness(&counts, RichnessEstimator::Jackknife, 10, 0.05).unwrap();
        assert_eq!(a.value, b.value);
        assert_eq!(a.jackknife_order, b.jackknife_order);
        // Permuting species must not change the estimate.
        let permuted = [15, 2, 1, 8, 3, 1, 2, 4, 1];
        let c = richness(&permuted, RichnessEstimator::Jackknife, 10, 0.05).unwrap();
        assert_eq!(a.value, c.value);
    }

    #[test]
    fn abundant_sample_selects_order_zero() {
        // No rare species: every jackknife increment is zero, so the scan
        // stops immediately and returns observed richness.
        let est = richness(&[50, 40, 30], RichnessEstimator::Jackknife, 10, 0.05).unwrap();
        assert_eq!(est.jackknife_order, Some(0));
        assert!((est.value - 3.0).abs() < 1e-10);
    }

    #[test]
    fn empty_sample_is_degenerate() {
        let est = richness(&[0, 0], RichnessEstimator::Chao1, 10, 0.05).unwrap();
        assert!(est.value.is_nan());
        assert!(!est.diagnostics.is_empty());
    }
}
