//! Diversity profiles and classical-index wrappers.
//!
//! Batch layer over the entropy engine: one record per requested order (and
//! per community for tabular input). Rows are independent, so a degenerate
//! community yields its NaN record without disturbing the rest; under the
//! `parallel` feature rows are distributed across the rayon pool.

use banksia_core::Result;

use crate::distribution::{DistributionKind, SpeciesDistribution};
use crate::entropy::{
    naive_tsallis, tsallis, validate_order, EntropyEstimator, EntropyOptions,
};
use crate::hill::exp_q;
use crate::record::{Diagnostic, DiversityEstimate, Quantity};

/// Tsallis entropy of one community across a sequence of orders.
///
/// # Errors
///
/// Returns an error if `counts` is empty or any order is invalid.
pub fn entropy_profile(
    counts: &[usize],
    orders: &[f64],
    opts: &EntropyOptions,
) -> Result<Vec<DiversityEstimate>> {
    orders.iter().map(|&q| tsallis(counts, q, opts)).collect()
}

/// Hill diversity of one community across a sequence of orders.
///
/// # Errors
///
/// Returns an error if `counts` is empty or any order is invalid.
pub fn diversity_profile(
    counts: &[usize],
    orders: &[f64],
    opts: &EntropyOptions,
) -> Result<Vec<DiversityEstimate>> {
    let mut records = entropy_profile(counts, orders, opts)?;
    for record in &mut records {
        record.value = exp_q(record.value, record.order);
        record.quantity = Quantity::Diversity;
    }
    Ok(records)
}

/// Entropy of every community in a distribution across a sequence of orders:
/// one record per (community, order), communities in row order.
///
/// Counts rows use the configured estimator. Probability rows carry no
/// frequency information, so they take the plug-in estimate with a recorded
/// fallback when a corrected estimator was requested.
///
/// # Errors
///
/// Returns an error if any order is invalid.
pub fn community_profile(
    dist: &SpeciesDistribution,
    orders: &[f64],
    opts: &EntropyOptions,
) -> Result<Vec<DiversityEstimate>> {
    for &q in orders {
        validate_order(q)?;
    }

    let row = |i: usize| -> Result<Vec<DiversityEstimate>> {
        let name = &dist.community_names()[i];
        let mut records = match dist.kind() {
            DistributionKind::Counts => {
                entropy_profile(dist.counts_row(i).unwrap(), orders, opts)?
            }
            DistributionKind::Probabilities => {
                let probs = dist.probability_row(i);
                orders
                    .iter()
                    .map(|&q| {
                        let mut diagnostics = Vec::new();
                        if opts.estimator != EntropyEstimator::Naive {
                            diagnostics.push(Diagnostic::EstimatorFallback {
                                requested: opts.estimator.name().into(),
                                used: "Naive".into(),
                                reason: "probability rows carry no frequency counts to correct with"
                                    .into(),
                            });
                        }
                        DiversityEstimate {
                            community: None,
                            order: q,
                            estimator: "Naive".into(),
                            coverage: None,
                            quantity: Quantity::Entropy,
                            value: naive_tsallis(&probs, q),
                            std_error: None,
                            diagnostics,
                        }
                    })
                    .collect()
            }
        };
        for record in &mut records {
            record.community = Some(name.clone());
        }
        Ok(records)
    };

    #[cfg(feature = "parallel")]
    let rows: Vec<Vec<DiversityEstimate>> = {
        use rayon::prelude::*;
        (0..dist.n_communities())
            .into_par_iter()
            .map(row)
            .collect::<Result<_>>()?
    };
    #[cfg(not(feature = "parallel"))]
    let rows: Vec<Vec<DiversityEstimate>> = (0..dist.n_communities())
        .map(row)
        .collect::<Result<_>>()?;

    Ok(rows.into_iter().flatten().collect())
}

/// Shannon entropy: the Tsallis family at order 1.
///
/// # Errors
///
/// Returns an error if `counts` is empty.
pub fn shannon(counts: &[usize], opts: &EntropyOptions) -> Result<DiversityEstimate> {
    tsallis(counts, 1.0, opts)
}

/// Gini-Simpson index: the Tsallis family at order 2.
///
/// # Errors
///
/// Returns an error if `counts` is empty.
pub fn simpson(counts: &[usize], opts: &EntropyOptions) -> Result<DiversityEstimate> {
    tsallis(counts, 2.0, opts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::SpeciesDistribution;

    #[test]
    fn profile_covers_all_orders() {
        let orders = [0.0, 0.5, 1.0, 2.0];
        let records = diversity_profile(&[10, 5, 3, 1, 1], &orders, &EntropyOptions::naive())
            .unwrap();
        assert_eq!(records.len(), orders.len());
        for (record, &q) in records.iter().zip(&orders) {
            assert_eq!(record.order, q);
            assert_eq!(record.quantity, Quantity::Diversity);
        }
        // Profiles are non-increasing in q.
        for w in records.windows(2) {
            assert!(w[0].value >= w[1].value - 1e-9);
        }
    }

    #[test]
    fn community_profile_labels_rows() {
        let dist = SpeciesDistribution::from_counts(
            vec![vec![5, 3, 1], vec![2, 2, 2]],
            vec!["north".into(), "south".into()],
            vec!["s1".into(), "s2".into(), "s3".into()],
            None,
        )
        .unwrap();
        let records = community_profile(&dist, &[1.0, 2.0], &EntropyOptions::naive()).unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(records[0].community.as_deref(), Some("north"));
        assert_eq!(records[3].community.as_deref(), Some("south"));
    }

    #[test]
    fn degenerate_row_does_not_block_others() {
        let dist = SpeciesDistribution::from_counts(
            vec![vec![0, 0, 0], vec![4, 3, 2]],
            vec!["empty".into(), "full".into()],
            vec!["s1".into(), "s2".into(), "s3".into()],
            Some(vec![1.0, 1.0]),
        )
        .unwrap();
        let records = community_profile(&dist, &[1.0], &EntropyOptions::default()).unwrap();
        assert!(records[0].value.is_nan());
        assert!(records[0].is_degenerate());
        assert!(records[1].value.is_finite());
    }

    #[test]
    fn probability_rows_record_the_fallback() {
        let dist = SpeciesDistribution::from_probabilities(
            vec![vec![0.5, 0.3, 0.2]],
            vec!["site".into()],
            vec!["s1".into(), "s2".into(), "s3".into()],
            None,
        )
        .unwrap();
        let records = community_profile(&dist, &[1.0], &EntropyOptions::default()).unwrap();
        assert_eq!(records[0].estimator, "Naive");
        assert!(records[0].had_fallback());
        assert!(records[0].value.is_finite());

        let naive = community_profile(&dist, &[1.0], &EntropyOptions::naive()).unwrap();
        assert!(!naive[0].had_fallback());
    }

    #[test]
    fn shannon_and_simpson_are_the_fixed_orders() {
        let counts = [10, 20, 30, 40];
        let h = shannon(&counts, &EntropyOptions::naive()).unwrap();
        assert_eq!(h.order, 1.0);
        let s = simpson(&counts, &EntropyOptions::naive()).unwrap();
        assert_eq!(s.order, 2.0);
        // Plug-in Gini-Simpson: 1 − Σ p².
        let n = 100.0f64;
        let expected =
            1.0 - counts.iter().map(|&c| (c as f64 / n).powi(2)).sum::<f64>();
        assert!((s.value - expected).abs() < 1e-12);
    }
}
