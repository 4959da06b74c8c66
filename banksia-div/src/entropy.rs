//! Bias-corrected Tsallis entropy estimation.
//!
//! Tsallis entropy of order q, H_q = (1 − Σ p_i^q)/(q − 1), generalizes
//! Shannon entropy (q → 1) and the Gini-Simpson index (q = 2). The plug-in
//! estimate is negatively biased on incomplete samples; the estimators here
//! correct that bias along different routes:
//!
//! - **Naive** — the plug-in value, no correction
//! - **ChaoShen** — coverage-rescaled probabilities under the
//!   Horvitz-Thompson correction (Chao & Shen 2003)
//! - **Grassberger** — digamma-based correction, Shannon order only
//! - **ZhangHuang** — frequency-class expansion (Zhang & Grabchak style);
//!   reduces to the unbiased Simpson estimator at q = 2
//! - **MarconZhang** — the larger of ChaoShen and ZhangHuang (both
//!   underestimate, so the larger is the less biased)
//! - **UnveilJ / UnveilC / UnveiliC** — plug-in over an unveiled probability
//!   vector whose unseen pool is sized by the Jackknife / Chao1 / iChao1
//!   richness estimator
//!
//! Fallback policy is a single table ([`EntropyEstimator::resolve`]) so it
//! can be tested in isolation. Degenerate samples yield NaN plus a
//! diagnostic rather than an error, so batch runs keep going.

use banksia_core::{BanksiaError, Result};

use crate::coverage::{coverage_from_frequencies, CoverageEstimator};
use crate::distribution::FrequencyCounts;
use crate::math::digamma;
use crate::record::{Diagnostic, DiversityEstimate, Quantity};
use crate::richness::{RichnessEstimator, DEFAULT_JACK_ALPHA, DEFAULT_JACK_MAX};
use crate::unveil::{unveil, ProbabilityEstimator, UnveilOptions, Unveiling};

/// Orders closer to 1 than this take the dedicated Shannon path.
pub(crate) const Q_TOL: f64 = 1e-12;

/// Entropy estimator variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EntropyEstimator {
    /// Plug-in estimate, no bias correction.
    Naive,
    /// Horvitz-Thompson coverage correction.
    ChaoShen,
    /// Digamma correction (Shannon order only).
    Grassberger,
    /// Frequency-class expansion.
    ZhangHuang,
    /// max(ChaoShen, ZhangHuang).
    MarconZhang,
    /// Unveiled plug-in, jackknife-sized unseen pool.
    #[default]
    UnveilJ,
    /// Unveiled plug-in, Chao1-sized unseen pool.
    UnveilC,
    /// Unveiled plug-in, iChao1-sized unseen pool.
    UnveiliC,
}

impl EntropyEstimator {
    /// Estimator name as recorded on results.
    pub fn name(&self) -> &'static str {
        match self {
            EntropyEstimator::Naive => "Naive",
            EntropyEstimator::ChaoShen => "ChaoShen",
            EntropyEstimator::Grassberger => "Grassberger",
            EntropyEstimator::ZhangHuang => "ZhangHuang",
            EntropyEstimator::MarconZhang => "MarconZhang",
            EntropyEstimator::UnveilJ => "UnveilJ",
            EntropyEstimator::UnveilC => "UnveilC",
            EntropyEstimator::UnveiliC => "UnveiliC",
        }
    }

    /// The fallback table: estimator → prerequisite → substitute.
    ///
    /// | requested   | prerequisite        | fallback   |
    /// |-------------|---------------------|------------|
    /// | Grassberger | q = 1               | ZhangHuang |
    /// | UnveiliC    | quadrupletons (f4)  | UnveilC    |
    ///
    /// Everything else passes through unchanged; prerequisites of the
    /// probability layer (Chao2015 needing doubletons) are resolved there.
    pub fn resolve(self, q: f64, freq: &FrequencyCounts) -> (Self, Option<Diagnostic>) {
        match self {
            EntropyEstimator::Grassberger if (q - 1.0).abs() > Q_TOL => (
                EntropyEstimator::ZhangHuang,
                Some(Diagnostic::EstimatorFallback {
                    requested: "Grassberger".into(),
                    used: "ZhangHuang".into(),
                    reason: "Grassberger is only defined at order 1".into(),
                }),
            ),
            EntropyEstimator::UnveiliC if freq.count_of(4) == 0 => (
                EntropyEstimator::UnveilC,
                Some(Diagnostic::EstimatorFallback {
                    requested: "UnveiliC".into(),
                    used: "UnveilC".into(),
                    reason: "iChao1 needs quadrupletons in the sample".into(),
                }),
            ),
            other => (other, None),
        }
    }
}

/// Options shared by the entropy, similarity, accumulation, and partitioning
/// entry points.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EntropyOptions {
    /// Entropy estimator.
    pub estimator: EntropyEstimator,
    /// Probability estimator used by the unveiled family.
    pub probability: ProbabilityEstimator,
    /// Unseen-tail shape used by the unveiled family.
    pub unveiling: Unveiling,
    /// Coverage estimator backing the corrections.
    pub coverage: CoverageEstimator,
    /// Jackknife order cap.
    pub jack_max: usize,
    /// Jackknife significance level.
    pub jack_alpha: f64,
}

impl Default for EntropyOptions {
    fn default() -> Self {
        Self {
            estimator: EntropyEstimator::UnveilJ,
            probability: ProbabilityEstimator::Chao2015,
            unveiling: Unveiling::Geometric,
            coverage: CoverageEstimator::ZhangHuang,
            jack_max: DEFAULT_JACK_MAX,
            jack_alpha: DEFAULT_JACK_ALPHA,
        }
    }
}

impl EntropyOptions {
    /// Options selecting the plug-in estimator everywhere.
    pub fn naive() -> Self {
        Self {
            estimator: EntropyEstimator::Naive,
            probability: ProbabilityEstimator::Naive,
            unveiling: Unveiling::None,
            ..Self::default()
        }
    }

    /// Options selecting one entropy estimator, defaults elsewhere.
    pub fn with_estimator(estimator: EntropyEstimator) -> Self {
        Self {
            estimator,
            ..Self::default()
        }
    }
}

/// Richness estimator backing each unveiled entropy variant (Chao1 for the
/// non-unveiled ones, which only need it for bootstrap tails).
pub(crate) fn richness_for(estimator: EntropyEstimator) -> RichnessEstimator {
    match estimator {
        EntropyEstimator::UnveilJ => RichnessEstimator::Jackknife,
        EntropyEstimator::UnveiliC => RichnessEstimator::IChao1,
        _ => RichnessEstimator::Chao1,
    }
}

/// Validate an order parameter.
pub(crate) fn validate_order(q: f64) -> Result<()> {
    if !q.is_finite() || q < 0.0 {
        return Err(BanksiaError::InvalidInput(format!(
            "order q must be finite and non-negative, got {}",
            q
        )));
    }
    Ok(())
}

/// Plug-in Tsallis entropy of a probability vector (no validation; zeros are
/// skipped). The q = 1 singularity takes the closed-form Shannon path and
/// q = 0 the richness path.
pub(crate) fn naive_tsallis(probs: &[f64], q: f64) -> f64 {
    if q == 0.0 {
        return probs.iter().filter(|&&p| p > 0.0).count() as f64 - 1.0;
    }
    if (q - 1.0).abs() <= Q_TOL {
        return probs
            .iter()
            .filter(|&&p| p > 0.0)
            .map(|&p| -p * p.ln())
            .sum();
    }
    let sum_pq: f64 = probs
        .iter()
        .filter(|&&p| p > 0.0)
        .map(|&p| p.powf(q))
        .sum();
    (1.0 - sum_pq) / (q - 1.0)
}

/// Tsallis entropy of an already-validated probability vector.
///
/// Only the plug-in estimator is meaningful here: bias corrections need the
/// integer frequency counts of a sample.
///
/// # Errors
///
/// Returns an error if entries are negative or do not sum to one, or if `q`
/// is invalid.
pub fn tsallis_probabilities(probs: &[f64], q: f64) -> Result<f64> {
    validate_order(q)?;
    if probs.is_empty() {
        return Err(BanksiaError::InvalidInput(
            "probability vector must be non-empty".into(),
        ));
    }
    let mut sum = 0.0;
    for &p in probs {
        if !(p >= 0.0) {
            return Err(BanksiaError::InvalidInput(
                "probabilities must be non-negative".into(),
            ));
        }
        sum += p;
    }
    if (sum - 1.0).abs() > 1e-9 {
        return Err(BanksiaError::InvalidInput(format!(
            "probabilities sum to {}, expected 1",
            sum
        )));
    }
    Ok(naive_tsallis(probs, q))
}

/// Horvitz-Thompson summand: g(p)/(1 − (1 − p)^n) with
/// g(p) = (p^q − p)/(1 − q), the per-species Tsallis contribution.
fn chao_shen_tsallis(counts: &[usize], q: f64, c: f64) -> f64 {
    let n: usize = counts.iter().sum();
    let nf = n as f64;
    let shannon = (q - 1.0).abs() <= Q_TOL;
    counts
        .iter()
        .filter(|&&x| x > 0)
        .map(|&x| {
            let cp = c * x as f64 / nf;
            let g = if shannon {
                -cp * cp.ln()
            } else {
                (cp.powf(q) - cp) / (1.0 - q)
            };
            g / (1.0 - (1.0 - cp).powf(nf))
        })
        .sum()
}

/// Frequency-class expansion estimator.
///
/// Shannon path: Ĥ = Σ_i (n_i/n) Σ_{v=1}^{n−n_i} (1/v) Π_{j=1}^{v} φ_{ij}
/// with φ_{ij} = 1 − (n_i − 1)/(n − j). General path estimates p_i^{q−1} by
/// ŵ_i = 1 + Σ_v Π_{j≤v} ((j − q)/j) φ_{ij}; at q = 2 only the v = 1 term
/// survives and the estimator collapses to the unbiased Simpson form.
fn zhang_huang_tsallis(counts: &[usize], q: f64) -> f64 {
    let n: usize = counts.iter().sum();
    let nf = n as f64;
    if (q - 1.0).abs() <= Q_TOL {
        let mut h = 0.0;
        for &x in counts.iter().filter(|&&x| x > 0) {
            let xf = x as f64;
            let mut prod = 1.0;
            let mut inner = 0.0;
            for v in 1..=(n - x) {
                prod *= 1.0 - (xf - 1.0) / (nf - v as f64);
                inner += prod / v as f64;
            }
            h += (xf / nf) * inner;
        }
        return h;
    }
    let mut sum = 0.0;
    for &x in counts.iter().filter(|&&x| x > 0) {
        let xf = x as f64;
        let mut term = 1.0;
        let mut w = 1.0;
        for v in 1..=(n - x) {
            let vf = v as f64;
            term *= ((vf - q) / vf) * (1.0 - (xf - 1.0) / (nf - vf));
            w += term;
            if term.abs() < 1e-16 {
                break;
            }
        }
        sum += (xf / nf) * w;
    }
    (1.0 - sum) / (q - 1.0)
}

/// Grassberger's Shannon correction:
/// Ĥ = Σ (n_i/n)(ln n − ψ(n_i) − (−1)^{n_i}/(n_i + 1)).
fn grassberger_shannon(counts: &[usize]) -> f64 {
    let n: usize = counts.iter().sum();
    let nf = n as f64;
    counts
        .iter()
        .filter(|&&x| x > 0)
        .map(|&x| {
            let xf = x as f64;
            let alt = if x % 2 == 0 { 1.0 } else { -1.0 };
            (xf / nf) * (nf.ln() - digamma(xf) - alt / (xf + 1.0))
        })
        .sum()
}

/// Estimate Tsallis entropy of order `q` from a count vector.
///
/// The returned record carries the estimator actually used after any
/// fallback, the coverage it relied on, and any diagnostics. Degenerate
/// samples (no individuals, zero coverage where coverage is required)
/// produce a NaN value with a [`Diagnostic::DegenerateSample`] instead of an
/// error.
///
/// # Errors
///
/// Returns an error if `counts` is empty or `q` is negative or non-finite.
///
/// # Example
///
/// ```
/// use banksia_div::entropy::{tsallis, EntropyOptions};
///
/// let est = tsallis(&[12, 7, 3, 1, 1], 2.0, &EntropyOptions::naive()).unwrap();
/// assert!(est.value > 0.0 && est.value < 1.0);
/// ```
pub fn tsallis(counts: &[usize], q: f64, opts: &EntropyOptions) -> Result<DiversityEstimate> {
    validate_order(q)?;
    if counts.is_empty() {
        return Err(BanksiaError::InvalidInput(
            "tsallis: counts must be non-empty".into(),
        ));
    }
    let freq = FrequencyCounts::from_counts(counts);
    if freq.n == 0 {
        return Ok(DiversityEstimate {
            community: None,
            order: q,
            estimator: opts.estimator.name().into(),
            coverage: None,
            quantity: Quantity::Entropy,
            value: f64::NAN,
            std_error: None,
            diagnostics: vec![Diagnostic::DegenerateSample {
                reason: "sample has no individuals".into(),
            }],
        });
    }

    let mut diagnostics = Vec::new();
    let (used, fallback) = opts.estimator.resolve(q, &freq);
    diagnostics.extend(fallback);

    let mut coverage_used = None;
    let mut value = f64::NAN;

    match used {
        EntropyEstimator::Naive => {
            let n = freq.n as f64;
            let probs: Vec<f64> = counts
                .iter()
                .filter(|&&x| x > 0)
                .map(|&x| x as f64 / n)
                .collect();
            value = naive_tsallis(&probs, q);
        }
        EntropyEstimator::Grassberger => {
            value = grassberger_shannon(counts);
        }
        EntropyEstimator::ZhangHuang => {
            value = zhang_huang_tsallis(counts, q);
        }
        EntropyEstimator::ChaoShen | EntropyEstimator::MarconZhang => {
            let cov = coverage_from_frequencies(&freq, opts.coverage);
            coverage_used = Some(cov.value);
            if let Some(d) = cov.diagnostic {
                diagnostics.push(d);
            }
            if !(cov.value > 0.0) {
                diagnostics.push(Diagnostic::DegenerateSample {
                    reason: format!(
                        "{} requires a positive coverage estimate",
                        used.name()
                    ),
                });
            } else {
                let cs = chao_shen_tsallis(counts, q, cov.value);
                value = if used == EntropyEstimator::MarconZhang {
                    cs.max(zhang_huang_tsallis(counts, q))
                } else {
                    cs
                };
            }
        }
        EntropyEstimator::UnveilJ | EntropyEstimator::UnveilC | EntropyEstimator::UnveiliC => {
            let uopts = UnveilOptions {
                estimator: opts.probability,
                unveiling: opts.unveiling,
                coverage: opts.coverage,
                richness: richness_for(used),
                jack_max: opts.jack_max,
                jack_alpha: opts.jack_alpha,
            };
            let unveiled = unveil(counts, &uopts)?;
            coverage_used = unveiled.coverage;
            diagnostics.extend(unveiled.diagnostics.iter().cloned());
            if matches!(unveiled.coverage, Some(c) if !(c > 0.0)) {
                diagnostics.push(Diagnostic::DegenerateSample {
                    reason: format!("{} requires a positive coverage estimate", used.name()),
                });
            } else {
                value = naive_tsallis(&unveiled.probabilities, q);
            }
        }
    }

    if value.is_finite() && value < 0.0 {
        diagnostics.push(Diagnostic::NegativeEntropy { value });
    }

    Ok(DiversityEstimate {
        community: None,
        order: q,
        estimator: used.name().into(),
        coverage: coverage_used,
        quantity: Quantity::Entropy,
        value,
        std_error: None,
        diagnostics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hill::ln_q;

    #[test]
    fn uniform_distribution_is_exact() {
        // Naive entropy of a uniform S-species vector equals ln_q(S).
        for s in [2usize, 5, 10] {
            let probs = vec![1.0 / s as f64; s];
            for q in [0.0, 1.0, 2.0] {
                let h = tsallis_probabilities(&probs, q).unwrap();
                let expected = ln_q(s as f64, q);
                assert!(
                    (h - expected).abs() < 1e-9,
                    "S={} q={}: {} vs {}",
                    s,
                    q,
                    h,
                    expected
                );
            }
        }
    }

    #[test]
    fn shannon_limit_is_continuous() {
        let counts = [10, 20, 30, 40];
        let near = tsallis(&counts, 1.0 + 1e-9, &EntropyOptions::naive()).unwrap();
        let at = tsallis(&counts, 1.0, &EntropyOptions::naive()).unwrap();
        assert!((near.value - at.value).abs() < 1e-6);
    }

    #[test]
    fn order_zero_is_richness_minus_one() {
        let est = tsallis(&[5, 3, 0, 2, 1], 0.0, &EntropyOptions::naive()).unwrap();
        assert!((est.value - 3.0).abs() < 1e-12);
    }

    #[test]
    fn zhang_huang_q2_is_unbiased_simpson() {
        let counts = [14, 8, 5, 3, 2, 1, 1];
        let n: usize = counts.iter().sum();
        let nf = n as f64;
        let expected = 1.0
            - counts
                .iter()
                .map(|&x| (x * (x - 1)) as f64)
                .sum::<f64>()
                / (nf * (nf - 1.0));
        let est = tsallis(
            &counts,
            2.0,
            &EntropyOptions::with_estimator(EntropyEstimator::ZhangHuang),
        )
        .unwrap();
        assert!((est.value - expected).abs() < 1e-10, "{}", est.value);
    }

    #[test]
    fn corrections_exceed_naive_shannon() {
        // Bias corrections should raise the Shannon estimate on an
        // undersampled community.
        let counts = [14, 8, 5, 3, 2, 1, 1, 1];
        let naive = tsallis(&counts, 1.0, &EntropyOptions::naive())
            .unwrap()
            .value;
        for est in [
            EntropyEstimator::ChaoShen,
            EntropyEstimator::Grassberger,
            EntropyEstimator::ZhangHuang,
            EntropyEstimator::MarconZhang,
            EntropyEstimator::UnveilJ,
            EntropyEstimator::UnveilC,
        ] {
            let v = tsallis(&counts, 1.0, &EntropyOptions::with_estimator(est))
                .unwrap()
                .value;
            assert!(
                v > naive,
                "{} = {} should exceed naive {}",
                est.name(),
                v,
                naive
            );
        }
    }

    #[test]
    fn marcon_zhang_is_max_of_parts() {
        let counts = [14, 8, 5, 3, 2, 1, 1, 1];
        for q in [0.5, 1.0, 2.0] {
            let cs = tsallis(
                &counts,
                q,
                &EntropyOptions::with_estimator(EntropyEstimator::ChaoShen),
            )
            .unwrap()
            .value;
            let zh = tsallis(
                &counts,
                q,
                &EntropyOptions::with_estimator(EntropyEstimator::ZhangHuang),
            )
            .unwrap()
            .value;
            let mz = tsallis(
                &counts,
                q,
                &EntropyOptions::with_estimator(EntropyEstimator::MarconZhang),
            )
            .unwrap()
            .value;
            assert!((mz - cs.max(zh)).abs() < 1e-12);
        }
    }

    #[test]
    fn grassberger_falls_back_off_shannon() {
        let est = tsallis(
            &[5, 3, 2, 1, 1],
            2.0,
            &EntropyOptions::with_estimator(EntropyEstimator::Grassberger),
        )
        .unwrap();
        assert_eq!(est.estimator, "ZhangHuang");
        assert!(est.had_fallback());
    }

    #[test]
    fn unveilic_falls_back_without_quadrupletons() {
        let est = tsallis(
            &[5, 3, 2, 1, 1],
            1.0,
            &EntropyOptions::with_estimator(EntropyEstimator::UnveiliC),
        )
        .unwrap();
        assert_eq!(est.estimator, "UnveilC");
        assert!(est.had_fallback());
    }

    #[test]
    fn all_singleton_sample_is_degenerate_for_coverage_estimators() {
        let est = tsallis(
            &[1, 1, 1, 1, 1],
            1.0,
            &EntropyOptions::with_estimator(EntropyEstimator::ChaoShen),
        )
        .unwrap();
        assert!(est.value.is_nan());
        assert!(est.is_degenerate());
    }

    #[test]
    fn empty_sample_is_degenerate_not_error() {
        let est = tsallis(&[0, 0, 0], 1.0, &EntropyOptions::default()).unwrap();
        assert!(est.value.is_nan());
        assert!(est.is_degenerate());
    }

    #[test]
    fn negative_order_is_invalid() {
        assert!(tsallis(&[1, 2, 3], -0.5, &EntropyOptions::naive()).is_err());
        assert!(tsallis(&[1, 2, 3], f64::NAN, &EntropyOptions::naive()).is_err());
    }

    #[test]
    fn negative_small_sample_entropy_is_flagged_not_clipped() {
        // ChaoShen at small q can dip below zero on tiny samples; the value
        // must be reported as-is with a NegativeEntropy diagnostic.
        let est = tsallis(
            &[9, 1],
            0.1,
            &EntropyOptions::with_estimator(EntropyEstimator::ChaoShen),
        )
        .unwrap();
        if est.value < 0.0 {
            assert!(est
                .diagnostics
                .iter()
                .any(|d| matches!(d, Diagnostic::NegativeEntropy { .. })));
        }
    }

    #[test]
    fn fallback_table_is_order_sensitive() {
        let freq = FrequencyCounts::from_counts(&[5, 3, 2, 1, 1]);
        let (used, diag) = EntropyEstimator::Grassberger.resolve(1.0, &freq);
        assert_eq!(used, EntropyEstimator::Grassberger);
        assert!(diag.is_none());
        let (used, diag) = EntropyEstimator::Grassberger.resolve(2.0, &freq);
        assert_eq!(used, EntropyEstimator::ZhangHuang);
        assert!(diag.is_some());
    }
}
