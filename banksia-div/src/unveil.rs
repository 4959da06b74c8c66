//! Probability estimation with unseen-species unveiling.
//!
//! Reconstructs a full species probability vector from a sample, including a
//! hypothesized tail of unseen species carrying the unobserved probability
//! mass:
//!
//! - **Naive** — empirical frequencies, no tail
//! - **ChaoShen** — empirical frequencies rescaled by coverage (the vector
//!   sums to the coverage estimate unless a tail is requested)
//! - **Chao2013** — one-parameter tuning of the observed probabilities; the
//!   unseen mass is spread uniformly over the estimated unseen-species count
//! - **Chao2015** — two-parameter model; the unseen mass decays geometrically
//!   with a ratio derived from the singleton/doubleton ratio. Needs
//!   doubletons, else falls back to the one-parameter model with a notice.

use banksia_core::{BanksiaError, Result};

use crate::coverage::{coverage_from_frequencies, CoverageEstimator};
use crate::distribution::FrequencyCounts;
use crate::record::Diagnostic;
use crate::richness::{
    richness_from_frequencies, RichnessEstimator, DEFAULT_JACK_ALPHA, DEFAULT_JACK_MAX,
};

/// Probability estimator variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ProbabilityEstimator {
    /// Empirical frequencies.
    Naive,
    /// Coverage-rescaled empirical frequencies (Chao & Shen 2003).
    ChaoShen,
    /// One-parameter unveiling (Chao et al. 2013).
    Chao2013,
    /// Two-parameter unveiling with a geometric tail (Chao et al. 2015).
    #[default]
    Chao2015,
}

impl ProbabilityEstimator {
    /// Estimator name as recorded on results.
    pub fn name(&self) -> &'static str {
        match self {
            ProbabilityEstimator::Naive => "Naive",
            ProbabilityEstimator::ChaoShen => "ChaoShen",
            ProbabilityEstimator::Chao2013 => "Chao2013",
            ProbabilityEstimator::Chao2015 => "Chao2015",
        }
    }

    /// Resolve the estimator against the sample's prerequisites.
    ///
    /// The only entry in the fallback table here: Chao2015 needs doubletons
    /// for its geometric ratio; without them it degrades to Chao2013.
    pub fn resolve(self, freq: &FrequencyCounts) -> (Self, Option<Diagnostic>) {
        match self {
            ProbabilityEstimator::Chao2015 if freq.f2() == 0 => (
                ProbabilityEstimator::Chao2013,
                Some(Diagnostic::EstimatorFallback {
                    requested: "Chao2015".into(),
                    used: "Chao2013".into(),
                    reason: "no doubletons in the sample".into(),
                }),
            ),
            other => (other, None),
        }
    }
}

/// How the unobserved probability mass is distributed over unseen species.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Unveiling {
    /// No unseen-species tail.
    None,
    /// Equal shares.
    Uniform,
    /// Decreasing geometric shares, ratio from the singleton/doubleton ratio.
    #[default]
    Geometric,
}

/// Options for probability estimation.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UnveilOptions {
    /// Probability estimator.
    pub estimator: ProbabilityEstimator,
    /// Tail shape.
    pub unveiling: Unveiling,
    /// Coverage estimator used for the observed/unseen mass split.
    pub coverage: CoverageEstimator,
    /// Richness estimator sizing the unseen pool.
    pub richness: RichnessEstimator,
    /// Jackknife order cap.
    pub jack_max: usize,
    /// Jackknife significance level.
    pub jack_alpha: f64,
}

impl Default for UnveilOptions {
    fn default() -> Self {
        Self {
            estimator: ProbabilityEstimator::Chao2015,
            unveiling: Unveiling::Geometric,
            coverage: CoverageEstimator::ZhangHuang,
            richness: RichnessEstimator::Chao1,
            jack_max: DEFAULT_JACK_MAX,
            jack_alpha: DEFAULT_JACK_ALPHA,
        }
    }
}

/// A reconstructed probability vector: observed species first (in their
/// original order, zero counts dropped), unseen-species slots after.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UnveiledDistribution {
    /// Probabilities, length `observed + unseen`.
    pub probabilities: Vec<f64>,
    /// Number of observed-species slots.
    pub observed: usize,
    /// Probability estimator actually used, after any fallback.
    pub estimator: ProbabilityEstimator,
    /// Tail shape actually used.
    pub unveiling: Unveiling,
    /// Coverage estimate backing the mass split, when one was needed.
    pub coverage: Option<f64>,
    /// Notices accumulated while estimating.
    pub diagnostics: Vec<Diagnostic>,
}

impl UnveiledDistribution {
    /// Number of synthetic unseen-species slots.
    pub fn unseen(&self) -> usize {
        self.probabilities.len() - self.observed
    }
}

/// Reconstruct a species probability vector from a count vector.
///
/// # Errors
///
/// Returns an error if `counts` is empty or all zero, or if the one-parameter
/// tuning would produce a negative probability.
pub fn unveil(counts: &[usize], opts: &UnveilOptions) -> Result<UnveiledDistribution> {
    if counts.is_empty() {
        return Err(BanksiaError::InvalidInput(
            "unveil: counts must be non-empty".into(),
        ));
    }
    let freq = FrequencyCounts::from_counts(counts);
    if freq.n == 0 {
        return Err(BanksiaError::InvalidInput(
            "unveil: all counts are zero".into(),
        ));
    }

    let n = freq.n as f64;
    let empirical: Vec<f64> = counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| c as f64 / n)
        .collect();

    if opts.estimator == ProbabilityEstimator::Naive {
        return Ok(UnveiledDistribution {
            observed: empirical.len(),
            probabilities: empirical,
            estimator: ProbabilityEstimator::Naive,
            unveiling: Unveiling::None,
            coverage: None,
            diagnostics: Vec::new(),
        });
    }

    let mut diagnostics = Vec::new();
    let (estimator, fallback) = opts.estimator.resolve(&freq);
    diagnostics.extend(fallback);

    let cov = coverage_from_frequencies(&freq, opts.coverage);
    let c = cov.value;
    if let Some(d) = cov.diagnostic {
        diagnostics.push(d);
    }
    if !(c > 0.0) {
        // Zero or undefined coverage: nothing to rescale against. Report the
        // empirical vector and let the caller decide what the NaN-coverage
        // means for its estimate.
        return Ok(UnveiledDistribution {
            observed: empirical.len(),
            probabilities: empirical,
            estimator: ProbabilityEstimator::Naive,
            unveiling: Unveiling::None,
            coverage: Some(c),
            diagnostics,
        });
    }

    let mut observed_probs: Vec<f64> = match estimator {
        ProbabilityEstimator::ChaoShen => empirical.iter().map(|&p| c * p).collect(),
        ProbabilityEstimator::Chao2013 | ProbabilityEstimator::Chao2015 => {
            // One-parameter tuning: p̂ = p (1 − λ (1 − p)^n), with λ chosen
            // so the observed part sums to the coverage estimate.
            let denom: f64 = empirical.iter().map(|&p| p * (1.0 - p).powf(n)).sum();
            if denom <= 0.0 || c >= 1.0 {
                empirical.clone()
            } else {
                let lambda = (1.0 - c) / denom;
                let tuned: Vec<f64> = empirical
                    .iter()
                    .map(|&p| p * (1.0 - lambda * (1.0 - p).powf(n)))
                    .collect();
                if tuned.iter().any(|&p| p < 0.0) {
                    return Err(BanksiaError::InvalidInput(
                        "unveil: probability tuning produced a negative probability".into(),
                    ));
                }
                tuned
            }
        }
        ProbabilityEstimator::Naive => unreachable!("handled above"),
    };
    let observed = observed_probs.len();

    // Tail construction.
    let unseen_mass = 1.0 - c;
    let mut unveiling = match estimator {
        ProbabilityEstimator::ChaoShen => opts.unveiling,
        ProbabilityEstimator::Chao2013 => match opts.unveiling {
            Unveiling::None => Unveiling::None,
            _ => Unveiling::Uniform,
        },
        ProbabilityEstimator::Chao2015 => Unveiling::Geometric,
        ProbabilityEstimator::Naive => Unveiling::None,
    };

    if unveiling != Unveiling::None && unseen_mass > 0.0 {
        let est = richness_from_frequencies(&freq, opts.richness, opts.jack_max, opts.jack_alpha);
        diagnostics.extend(est.diagnostics.iter().cloned());
        let unseen = ((est.value - freq.observed as f64).round() as isize).max(1) as usize;

        if unveiling == Unveiling::Geometric {
            let f1 = freq.f1() as f64;
            let f2 = freq.f2() as f64;
            let ratio = if f1 > 0.0 { 2.0 * f2 / ((n - 1.0) * f1) } else { f64::INFINITY };
            if ratio > 0.0 && ratio < 1.0 {
                let norm = (1.0 - ratio) / (1.0 - ratio.powi(unseen as i32));
                for j in 0..unseen {
                    observed_probs.push(unseen_mass * norm * ratio.powi(j as i32));
                }
            } else {
                diagnostics.push(Diagnostic::EstimatorFallback {
                    requested: "geometric unveiling".into(),
                    used: "uniform unveiling".into(),
                    reason: "singleton/doubleton ratio does not yield a ratio in (0, 1)".into(),
                });
                unveiling = Unveiling::Uniform;
            }
        }
        if unveiling == Unveiling::Uniform {
            for _ in 0..unseen {
                observed_probs.push(unseen_mass / unseen as f64);
            }
        }
    } else if unseen_mass <= 0.0 {
        unveiling = Unveiling::None;
    }

    Ok(UnveiledDistribution {
        probabilities: observed_probs,
        observed,
        estimator,
        unveiling,
        coverage: Some(c),
        diagnostics,
    })
}
