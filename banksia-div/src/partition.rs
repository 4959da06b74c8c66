//! Alpha/beta/gamma partitioning of metacommunity diversity.
//!
//! Decomposes the diversity of a weighted metacommunity into within-community
//! (alpha) and among-community (beta) components:
//!
//! - gamma — entropy/diversity of the weight-normalized pooled community
//! - alpha — the weighted average of per-community entropies
//! - beta — derived from gamma and alpha
//!
//! The decomposition is additive in entropy space at q = 1
//! (H_γ = H_α + H_β, exact) and multiplicative in diversity space at every
//! order (D_γ = D_α × D_β); the two framings are connected only through the
//! deformed exponential, never mixed.

use banksia_core::Result;

use crate::distribution::Metacommunity;
use crate::entropy::{
    naive_tsallis, tsallis, validate_order, EntropyEstimator, EntropyOptions,
};
use crate::hill::{exp_q, ln_q};
use crate::record::{Diagnostic, DiversityEstimate, Quantity};

/// The components of a partitioned metacommunity.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PartitionResult {
    /// Order of the decomposition.
    pub order: f64,
    /// Entropy estimator used for the per-community and gamma estimates.
    pub estimator: String,
    /// Entropy of the pooled community.
    pub gamma_entropy: f64,
    /// Weighted mean of the per-community entropies.
    pub alpha_entropy: f64,
    /// Between-community entropy.
    pub beta_entropy: f64,
    /// Hill diversity of the pooled community.
    pub gamma_diversity: f64,
    /// Effective number of species per community.
    pub alpha_diversity: f64,
    /// Effective number of distinct communities.
    pub beta_diversity: f64,
    /// One entropy record per community, in metacommunity order.
    pub communities: Vec<DiversityEstimate>,
    /// Conditions affecting the gamma estimate.
    pub diagnostics: Vec<Diagnostic>,
}

/// Partition a metacommunity's diversity of order `q`.
///
/// Per-community entropies use the configured estimator. The pooled (gamma)
/// community keeps that estimator when the site weights are proportional to
/// sample sizes, so its pooled counts are exact integers; under any other
/// weighting the gamma row is a probability mix, the plug-in estimate is
/// used, and the substitution is recorded.
///
/// A degenerate community yields a NaN record (with its diagnostics) and a
/// NaN alpha, but never aborts the whole decomposition.
///
/// # Errors
///
/// Returns an error for an invalid order.
///
/// # Example
///
/// ```
/// use banksia_div::distribution::{Metacommunity, SpeciesDistribution};
/// use banksia_div::entropy::EntropyOptions;
/// use banksia_div::partition::partition;
///
/// let dist = SpeciesDistribution::from_counts(
///     vec![vec![10, 0, 25, 10], vec![20, 15, 10, 35], vec![0, 10, 5, 2]],
///     vec!["p1".into(), "p2".into(), "p3".into()],
///     vec!["s1".into(), "s2".into(), "s3".into(), "s4".into()],
///     None,
/// ).unwrap();
/// let meta = Metacommunity::new(dist).unwrap();
/// let part = partition(&meta, 1.0, &EntropyOptions::naive()).unwrap();
/// assert!(part.beta_diversity >= 1.0);
/// ```
pub fn partition(meta: &Metacommunity, q: f64, opts: &EntropyOptions) -> Result<PartitionResult> {
    validate_order(q)?;
    let dist = meta.distribution();
    let weights = dist.normalized_weights();

    let mut communities = Vec::with_capacity(dist.n_communities());
    for i in 0..dist.n_communities() {
        let mut record = tsallis(dist.counts_row(i).unwrap(), q, opts)?;
        record.community = Some(dist.community_names()[i].clone());
        communities.push(record);
    }

    let alpha_entropy: f64 = communities
        .iter()
        .zip(&weights)
        .map(|(r, w)| w * r.value)
        .sum();

    let mut diagnostics = Vec::new();
    let gamma_entropy = match meta.pooled_counts() {
        Some(pooled) => {
            let record = tsallis(&pooled, q, opts)?;
            diagnostics.extend(record.diagnostics.iter().cloned());
            record.value
        }
        None => {
            if opts.estimator != EntropyEstimator::Naive {
                diagnostics.push(Diagnostic::EstimatorFallback {
                    requested: opts.estimator.name().into(),
                    used: "Naive".into(),
                    reason: "pooled gamma community has non-integer abundances under the given site weights"
                        .into(),
                });
            }
            let mut gamma = meta.gamma_probabilities();
            let mass: f64 = gamma.iter().sum();
            if (mass - 1.0).abs() > 1e-9 {
                // A community with no individuals contributes no probability
                // mass; the mix is renormalized over the remaining weight.
                diagnostics.push(Diagnostic::DegenerateSample {
                    reason: "a community with no individuals left the gamma mix short; renormalized"
                        .into(),
                });
                if mass > 0.0 {
                    for g in &mut gamma {
                        *g /= mass;
                    }
                }
            }
            if mass > 0.0 {
                naive_tsallis(&gamma, q)
            } else {
                f64::NAN
            }
        }
    };

    let gamma_diversity = exp_q(gamma_entropy, q);
    let alpha_diversity = exp_q(alpha_entropy, q);
    // At q = 1 the decomposition is additive in entropy space; elsewhere it
    // is multiplicative in diversity space. Each framing derives the other
    // through the deformed exponential so both identities hold exactly.
    let (beta_entropy, beta_diversity) = if (q - 1.0).abs() <= crate::entropy::Q_TOL {
        let bh = gamma_entropy - alpha_entropy;
        (bh, bh.exp())
    } else {
        let bd = gamma_diversity / alpha_diversity;
        (ln_q(bd, q), bd)
    };

    Ok(PartitionResult {
        order: q,
        estimator: opts.estimator.name().into(),
        gamma_entropy,
        alpha_entropy,
        beta_entropy,
        gamma_diversity,
        alpha_diversity,
        beta_diversity,
        communities,
        diagnostics,
    })
}

/// Partition returning Hill-number records for every component.
///
/// Convenience wrapper over [`partition`] producing one [`DiversityEstimate`]
/// per community plus the three components, all in diversity units.
///
/// # Errors
///
/// Returns an error for an invalid order.
pub fn partition_diversity(
    meta: &Metacommunity,
    q: f64,
    opts: &EntropyOptions,
) -> Result<PartitionResult> {
    let mut result = partition(meta, q, opts)?;
    for record in &mut result.communities {
        record.value = exp_q(record.value, q);
        record.quantity = Quantity::Diversity;
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::SpeciesDistribution;

    /// The worked example: 3 communities × 4 species, weights (1, 2, 1).
    fn example() -> Metacommunity {
        let dist = SpeciesDistribution::from_counts(
            vec![
                vec![10, 0, 25, 10],
                vec![20, 15, 10, 35],
                vec![0, 10, 5, 2],
            ],
            vec!["p1".into(), "p2".into(), "p3".into()],
            vec!["s1".into(), "s2".into(), "s3".into(), "s4".into()],
            Some(vec![1.0, 2.0, 1.0]),
        )
        .unwrap();
        Metacommunity::new(dist).unwrap()
    }

    #[test]
    fn shannon_partitioning_is_additive() {
        let part = partition(&example(), 1.0, &EntropyOptions::naive()).unwrap();
        // Exact: beta is defined as gamma − alpha at q = 1.
        assert_eq!(
            part.gamma_entropy,
            part.alpha_entropy + part.beta_entropy
        );
        // Independent check: beta equals the weighted mean Kullback-Leibler
        // divergence of community distributions from the gamma mix.
        let meta = example();
        let dist = meta.distribution();
        let gamma = meta.gamma_probabilities();
        let weights = dist.normalized_weights();
        let mut kl = 0.0;
        for i in 0..dist.n_communities() {
            let p = dist.probability_row(i);
            kl += weights[i]
                * p.iter()
                    .zip(&gamma)
                    .filter(|(&pi, _)| pi > 0.0)
                    .map(|(&pi, &gi)| pi * (pi / gi).ln())
                    .sum::<f64>();
        }
        assert!((part.beta_entropy - kl).abs() < 1e-12);
    }

    #[test]
    fn simpson_partitioning_is_multiplicative() {
        let part = partition(&example(), 2.0, &EntropyOptions::naive()).unwrap();
        assert!(
            (part.gamma_diversity - part.alpha_diversity * part.beta_diversity).abs() < 1e-9
        );
        assert!(part.beta_diversity >= 1.0 - 1e-12);
    }

    #[test]
    fn alpha_is_weighted_mean_of_communities() {
        let part = partition(&example(), 1.0, &EntropyOptions::naive()).unwrap();
        let weights = example().distribution().normalized_weights();
        let expected: f64 = part
            .communities
            .iter()
            .zip(&weights)
            .map(|(r, w)| w * r.value)
            .sum();
        assert_eq!(part.alpha_entropy, expected);
    }

    #[test]
    fn non_proportional_weights_fall_back_to_naive_gamma() {
        let part = partition(
            &example(),
            1.0,
            &EntropyOptions::with_estimator(EntropyEstimator::ChaoShen),
        )
        .unwrap();
        assert!(part
            .diagnostics
            .iter()
            .any(|d| matches!(d, Diagnostic::EstimatorFallback { .. })));
    }

    #[test]
    fn size_proportional_weights_keep_the_estimator() {
        let dist = SpeciesDistribution::from_counts(
            vec![vec![10, 0, 25, 10], vec![20, 15, 10, 35]],
            vec!["p1".into(), "p2".into()],
            vec!["s1".into(), "s2".into(), "s3".into(), "s4".into()],
            None,
        )
        .unwrap();
        let meta = Metacommunity::new(dist).unwrap();
        let part = partition(
            &meta,
            1.0,
            &EntropyOptions::with_estimator(EntropyEstimator::ChaoShen),
        )
        .unwrap();
        assert!(part.diagnostics.iter().all(|d| !matches!(
            d,
            Diagnostic::EstimatorFallback { .. }
        )));
        assert!(part.gamma_entropy.is_finite());
    }

    #[test]
    fn degenerate_community_does_not_abort_the_batch() {
        let dist = SpeciesDistribution::from_counts(
            vec![vec![10, 5, 3], vec![0, 0, 0]],
            vec!["good".into(), "empty".into()],
            vec!["s1".into(), "s2".into(), "s3".into()],
            Some(vec![1.0, 1.0]),
        )
        .unwrap();
        let meta = Metacommunity::new(dist).unwrap();
        let part = partition(&meta, 1.0, &EntropyOptions::naive()).unwrap();
        assert_eq!(part.communities.len(), 2);
        assert!(part.communities[0].value.is_finite());
        assert!(part.communities[1].value.is_nan());
        assert!(part.communities[1].is_degenerate());
        assert!(part.alpha_entropy.is_nan());
        assert!(part.gamma_entropy.is_finite());
    }

    #[test]
    fn single_community_has_unit_beta() {
        let dist = SpeciesDistribution::from_counts(
            vec![vec![10, 20, 30]],
            vec!["only".into()],
            vec!["s1".into(), "s2".into(), "s3".into()],
            None,
        )
        .unwrap();
        let meta = Metacommunity::new(dist).unwrap();
        for q in [0.0, 1.0, 2.0] {
            let part = partition(&meta, q, &EntropyOptions::naive()).unwrap();
            assert!(
                (part.beta_diversity - 1.0).abs() < 1e-9,
                "q={}: {}",
                q,
                part.beta_diversity
            );
        }
    }
}
