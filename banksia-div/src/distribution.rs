//! Community abundance data structures.
//!
//! Create and validate the inputs every estimator consumes:
//!
//! - [`AbundanceVector`] — one community row of non-negative counts
//! - [`FrequencyCounts`] — abundance-frequency counts (f1, f2, …) shared by
//!   the coverage, richness, and entropy estimators
//! - [`SpeciesDistribution`] — a communities × species table with per-site
//!   weights, tagged as counts or probabilities once at construction
//! - [`Metacommunity`] — a counts table plus site weights, pooled into a
//!   weight-normalized gamma community

use banksia_core::{BanksiaError, Result, Summarizable};

/// One community sample: non-negative species counts with an optional name.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AbundanceVector {
    counts: Vec<usize>,
    name: Option<String>,
}

impl AbundanceVector {
    /// Create an abundance vector.
    ///
    /// # Errors
    ///
    /// Returns an error if `counts` is empty. An all-zero vector is accepted;
    /// estimators report it as a degenerate sample rather than an error so
    /// batch computations can continue.
    pub fn new(counts: Vec<usize>) -> Result<Self> {
        if counts.is_empty() {
            return Err(BanksiaError::InvalidInput(
                "abundance vector must be non-empty".into(),
            ));
        }
        Ok(Self { counts, name: None })
    }

    /// Attach a community name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The raw counts.
    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    /// The community name, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Total number of individuals.
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    /// Number of species with a nonzero count.
    pub fn richness(&self) -> usize {
        self.counts.iter().filter(|&&c| c > 0).count()
    }

    /// Empirical species probabilities (zero-count species dropped).
    pub fn probabilities(&self) -> Vec<f64> {
        let n = self.total() as f64;
        if n == 0.0 {
            return Vec::new();
        }
        self.counts
            .iter()
            .filter(|&&c| c > 0)
            .map(|&c| c as f64 / n)
            .collect()
    }

    /// Abundance-frequency counts of this sample.
    pub fn frequency_counts(&self) -> FrequencyCounts {
        FrequencyCounts::from_counts(&self.counts)
    }

    /// Tsallis entropy of this community; the record carries its name.
    ///
    /// # Errors
    ///
    /// Propagates any error from the estimation.
    pub fn tsallis(
        &self,
        q: f64,
        opts: &crate::entropy::EntropyOptions,
    ) -> Result<crate::record::DiversityEstimate> {
        let mut record = crate::entropy::tsallis(&self.counts, q, opts)?;
        record.community = self.name.clone();
        Ok(record)
    }

    /// Hill diversity of this community; the record carries its name.
    ///
    /// # Errors
    ///
    /// Propagates any error from the estimation.
    pub fn hill_number(
        &self,
        q: f64,
        opts: &crate::entropy::EntropyOptions,
    ) -> Result<crate::record::DiversityEstimate> {
        let mut record = crate::hill::hill_number(&self.counts, q, opts)?;
        record.community = self.name.clone();
        Ok(record)
    }
}

impl Summarizable for AbundanceVector {
    fn summary(&self) -> String {
        format!(
            "AbundanceVector{}: {} species, {} individuals",
            self.name
                .as_deref()
                .map(|n| format!(" '{}'", n))
                .unwrap_or_default(),
            self.richness(),
            self.total()
        )
    }
}

/// Abundance-frequency counts: how many species were observed exactly v times.
///
/// Every non-parametric estimator in this crate is a function of these counts
/// rather than of the raw vector, so they are computed once and shared.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FrequencyCounts {
    /// Sample size n (total individuals).
    pub n: usize,
    /// Observed richness (species with nonzero count).
    pub observed: usize,
    /// Sorted (abundance, number of species with that abundance) pairs.
    classes: Vec<(usize, usize)>,
}

impl FrequencyCounts {
    /// Tally the frequency classes of a count vector.
    pub fn from_counts(counts: &[usize]) -> Self {
        let mut sorted: Vec<usize> = counts.iter().copied().filter(|&c| c > 0).collect();
        sorted.sort_unstable();
        let mut classes: Vec<(usize, usize)> = Vec::new();
        for c in &sorted {
            match classes.last_mut() {
                Some((v, f)) if v == c => *f += 1,
                _ => classes.push((*c, 1)),
            }
        }
        Self {
            n: sorted.iter().sum(),
            observed: sorted.len(),
            classes,
        }
    }

    /// Number of species observed exactly `v` times.
    pub fn count_of(&self, v: usize) -> usize {
        self.classes
            .iter()
            .find(|(a, _)| *a == v)
            .map_or(0, |(_, f)| *f)
    }

    /// Singleton count f1.
    pub fn f1(&self) -> usize {
        self.count_of(1)
    }

    /// Doubleton count f2.
    pub fn f2(&self) -> usize {
        self.count_of(2)
    }

    /// Iterate over (abundance, species count) classes in increasing abundance.
    pub fn classes(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.classes.iter().copied()
    }

    /// True when every observed species is a singleton.
    pub fn all_singletons(&self) -> bool {
        self.observed > 0 && self.f1() == self.observed
    }
}

/// Whether a distribution row holds raw counts or probabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DistributionKind {
    /// Non-negative integer abundances.
    Counts,
    /// Rows summing to one.
    Probabilities,
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
enum DistributionData {
    Counts(Vec<Vec<usize>>),
    Probabilities(Vec<Vec<f64>>),
}

/// A communities × species table with per-community weights.
///
/// The counts-vs-probabilities distinction is resolved once here; downstream
/// code operates uniformly row-at-a-time.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpeciesDistribution {
    data: DistributionData,
    weights: Vec<f64>,
    community_names: Vec<String>,
    species_names: Vec<String>,
}

impl SpeciesDistribution {
    /// Create a distribution of raw counts.
    ///
    /// When `weights` is `None`, each community is weighted by its sample
    /// size, the conventional choice for pooling.
    ///
    /// # Errors
    ///
    /// Returns an error if dimensions are inconsistent or any weight is not
    /// strictly positive and finite.
    pub fn from_counts(
        counts: Vec<Vec<usize>>,
        community_names: Vec<String>,
        species_names: Vec<String>,
        weights: Option<Vec<f64>>,
    ) -> Result<Self> {
        validate_shape(counts.len(), &counts, &community_names, &species_names)?;
        let weights = match weights {
            Some(w) => w,
            None => {
                // Default weighting is by sample size, which an empty
                // community would turn into a zero weight.
                if let Some(i) = counts.iter().position(|row| row.iter().sum::<usize>() == 0) {
                    return Err(BanksiaError::InvalidInput(format!(
                        "community '{}' has no individuals; pass explicit weights",
                        community_names[i]
                    )));
                }
                counts
                    .iter()
                    .map(|row| row.iter().sum::<usize>() as f64)
                    .collect()
            }
        };
        validate_weights(&weights, counts.len())?;
        Ok(Self {
            data: DistributionData::Counts(counts),
            weights,
            community_names,
            species_names,
        })
    }

    /// Create a distribution of probability rows (each summing to one).
    ///
    /// When `weights` is `None`, communities are weighted equally.
    ///
    /// # Errors
    ///
    /// Returns an error on dimension mismatches, negative entries, rows not
    /// summing to one, or non-positive weights.
    pub fn from_probabilities(
        rows: Vec<Vec<f64>>,
        community_names: Vec<String>,
        species_names: Vec<String>,
        weights: Option<Vec<f64>>,
    ) -> Result<Self> {
        validate_shape(rows.len(), &rows, &community_names, &species_names)?;
        for (i, row) in rows.iter().enumerate() {
            let mut sum = 0.0;
            for &p in row {
                if !(p >= 0.0) {
                    return Err(BanksiaError::InvalidInput(format!(
                        "row {} contains a negative or non-finite probability",
                        i
                    )));
                }
                sum += p;
            }
            if (sum - 1.0).abs() > 1e-9 {
                return Err(BanksiaError::InvalidInput(format!(
                    "row {} sums to {}, expected 1",
                    i, sum
                )));
            }
        }
        let weights = weights.unwrap_or_else(|| vec![1.0; rows.len()]);
        validate_weights(&weights, rows.len())?;
        Ok(Self {
            data: DistributionData::Probabilities(rows),
            weights,
            community_names,
            species_names,
        })
    }

    /// Counts or probabilities?
    pub fn kind(&self) -> DistributionKind {
        match self.data {
            DistributionData::Counts(_) => DistributionKind::Counts,
            DistributionData::Probabilities(_) => DistributionKind::Probabilities,
        }
    }

    /// Number of communities (rows).
    pub fn n_communities(&self) -> usize {
        self.community_names.len()
    }

    /// Number of species (columns).
    pub fn n_species(&self) -> usize {
        self.species_names.len()
    }

    /// Community names in row order.
    pub fn community_names(&self) -> &[String] {
        &self.community_names
    }

    /// Species names in column order.
    pub fn species_names(&self) -> &[String] {
        &self.species_names
    }

    /// Raw site weights.
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Weights normalized to sum to one.
    pub fn normalized_weights(&self) -> Vec<f64> {
        let total: f64 = self.weights.iter().sum();
        self.weights.iter().map(|w| w / total).collect()
    }

    /// Count row `i`, when this is a counts distribution.
    pub fn counts_row(&self, i: usize) -> Option<&[usize]> {
        match &self.data {
            DistributionData::Counts(rows) => rows.get(i).map(|r| r.as_slice()),
            DistributionData::Probabilities(_) => None,
        }
    }

    /// Probability row `i` (empirical frequencies for counts rows).
    ///
    /// An all-zero counts row yields an all-zero probability row.
    pub fn probability_row(&self, i: usize) -> Vec<f64> {
        match &self.data {
            DistributionData::Counts(rows) => {
                let row = &rows[i];
                let total: usize = row.iter().sum();
                if total == 0 {
                    vec![0.0; row.len()]
                } else {
                    row.iter().map(|&c| c as f64 / total as f64).collect()
                }
            }
            DistributionData::Probabilities(rows) => rows[i].clone(),
        }
    }
}

impl Summarizable for SpeciesDistribution {
    fn summary(&self) -> String {
        format!(
            "SpeciesDistribution: {} communities × {} species ({:?})",
            self.n_communities(),
            self.n_species(),
            self.kind()
        )
    }
}

fn validate_shape<T>(
    n_rows: usize,
    rows: &[Vec<T>],
    community_names: &[String],
    species_names: &[String],
) -> Result<()> {
    if n_rows == 0 {
        return Err(BanksiaError::InvalidInput(
            "distribution must have at least one community".into(),
        ));
    }
    if community_names.len() != n_rows {
        return Err(BanksiaError::InvalidInput(format!(
            "number of community names ({}) does not match number of rows ({})",
            community_names.len(),
            n_rows
        )));
    }
    for (i, row) in rows.iter().enumerate() {
        if row.len() != species_names.len() {
            return Err(BanksiaError::InvalidInput(format!(
                "row {} has {} species, expected {}",
                i,
                row.len(),
                species_names.len()
            )));
        }
    }
    Ok(())
}

fn validate_weights(weights: &[f64], n_rows: usize) -> Result<()> {
    if weights.len() != n_rows {
        return Err(BanksiaError::InvalidInput(format!(
            "number of weights ({}) does not match number of communities ({})",
            weights.len(),
            n_rows
        )));
    }
    if weights.iter().any(|w| !w.is_finite() || *w <= 0.0) {
        return Err(BanksiaError::InvalidInput(
            "community weights must be strictly positive and finite".into(),
        ));
    }
    Ok(())
}

/// A set of weighted communities treated as partitions of one pooled
/// (gamma) community.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Metacommunity {
    distribution: SpeciesDistribution,
}

impl Metacommunity {
    /// Wrap a counts distribution as a metacommunity.
    ///
    /// # Errors
    ///
    /// Returns an error if the distribution holds probabilities rather than
    /// counts, or has no individuals at all.
    pub fn new(distribution: SpeciesDistribution) -> Result<Self> {
        if distribution.kind() != DistributionKind::Counts {
            return Err(BanksiaError::InvalidInput(
                "metacommunity requires raw counts, not probabilities".into(),
            ));
        }
        let total: usize = (0..distribution.n_communities())
            .map(|i| distribution.counts_row(i).unwrap().iter().sum::<usize>())
            .sum();
        if total == 0 {
            return Err(BanksiaError::InvalidInput(
                "metacommunity has no individuals".into(),
            ));
        }
        Ok(Self { distribution })
    }

    /// The underlying distribution.
    pub fn distribution(&self) -> &SpeciesDistribution {
        &self.distribution
    }

    /// Gamma community probabilities: the weight-normalized mix of the
    /// per-community probability rows.
    pub fn gamma_probabilities(&self) -> Vec<f64> {
        let w = self.distribution.normalized_weights();
        let s = self.distribution.n_species();
        let mut gamma = vec![0.0; s];
        for (i, wi) in w.iter().enumerate() {
            for (g, p) in gamma.iter_mut().zip(self.distribution.probability_row(i)) {
                *g += wi * p;
            }
        }
        gamma
    }

    /// Pooled integer counts of the gamma community, available exactly when
    /// the site weights are proportional to the sample sizes.
    ///
    /// With any other weighting the pooled community is a probability mix
    /// with no honest integer representation, and `None` is returned.
    pub fn pooled_counts(&self) -> Option<Vec<usize>> {
        let sizes: Vec<f64> = (0..self.distribution.n_communities())
            .map(|i| {
                self.distribution.counts_row(i).unwrap().iter().sum::<usize>() as f64
            })
            .collect();
        let total: f64 = sizes.iter().sum();
        let w = self.distribution.normalized_weights();
        let proportional = sizes
            .iter()
            .zip(&w)
            .all(|(sz, wi)| (sz / total - wi).abs() < 1e-9);
        if !proportional {
            return None;
        }
        let s = self.distribution.n_species();
        let mut pooled = vec![0usize; s];
        for i in 0..self.distribution.n_communities() {
            for (acc, c) in pooled.iter_mut().zip(self.distribution.counts_row(i).unwrap()) {
                *acc += c;
            }
        }
        Some(pooled)
    }
}

impl Summarizable for Metacommunity {
    fn summary(&self) -> String {
        format!(
            "Metacommunity: {} communities × {} species",
            self.distribution.n_communities(),
            self.distribution.n_species()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frequency_counts_tally() {
        let freq = FrequencyCounts::from_counts(&[5, 3, 1, 1, 1, 0, 2]);
        assert_eq!(freq.n, 13);
        assert_eq!(freq.observed, 6);
        assert_eq!(freq.f1(), 3);
        assert_eq!(freq.f2(), 1);
        assert_eq!(freq.count_of(3), 1);
        assert_eq!(freq.count_of(4), 0);
        assert!(!freq.all_singletons());
    }

    #[test]
    fn all_singletons_detected() {
        let freq = FrequencyCounts::from_counts(&[1, 1, 1, 1, 1]);
        assert!(freq.all_singletons());
        let with_zero = FrequencyCounts::from_counts(&[1, 0, 1]);
        assert!(with_zero.all_singletons());
    }

    #[test]
    fn abundance_vector_rejects_empty() {
        assert!(AbundanceVector::new(vec![]).is_err());
    }

    #[test]
    fn named_vector_labels_its_records() {
        let av = AbundanceVector::new(vec![10, 5, 3])
            .unwrap()
            .with_name("quadrat-7");
        let record = av
            .tsallis(1.0, &crate::entropy::EntropyOptions::naive())
            .unwrap();
        assert_eq!(record.community.as_deref(), Some("quadrat-7"));
        let d = av
            .hill_number(0.0, &crate::entropy::EntropyOptions::naive())
            .unwrap();
        assert!((d.value - 3.0).abs() < 1e-12);
    }

    #[test]
    fn probability_rows_must_sum_to_one() {
        let bad = SpeciesDistribution::from_probabilities(
            vec![vec![0.5, 0.4]],
            vec!["a".into()],
            vec!["s1".into(), "s2".into()],
            None,
        );
        assert!(bad.is_err());
    }

    #[test]
    fn default_count_weights_are_sample_sizes() {
        let dist = SpeciesDistribution::from_counts(
            vec![vec![1, 2], vec![3, 4]],
            vec!["a".into(), "b".into()],
            vec!["s1".into(), "s2".into()],
            None,
        )
        .unwrap();
        assert_eq!(dist.weights(), &[3.0, 7.0]);
        let norm = dist.normalized_weights();
        assert!((norm[0] - 0.3).abs() < 1e-12);
    }

    #[test]
    fn pooled_counts_requires_size_proportional_weights() {
        let dist = SpeciesDistribution::from_counts(
            vec![vec![1, 2], vec![3, 4]],
            vec!["a".into(), "b".into()],
            vec!["s1".into(), "s2".into()],
            None,
        )
        .unwrap();
        let meta = Metacommunity::new(dist).unwrap();
        assert_eq!(meta.pooled_counts(), Some(vec![4, 6]));

        let weighted = SpeciesDistribution::from_counts(
            vec![vec![1, 2], vec![3, 4]],
            vec!["a".into(), "b".into()],
            vec!["s1".into(), "s2".into()],
            Some(vec![1.0, 1.0]),
        )
        .unwrap();
        let meta = Metacommunity::new(weighted).unwrap();
        assert_eq!(meta.pooled_counts(), None);
    }

    #[test]
    fn gamma_probabilities_mix_by_weight() {
        let dist = SpeciesDistribution::from_counts(
            vec![vec![10, 0], vec![0, 10]],
            vec!["a".into(), "b".into()],
            vec!["s1".into(), "s2".into()],
            Some(vec![3.0, 1.0]),
        )
        .unwrap();
        let meta = Metacommunity::new(dist).unwrap();
        let gamma = meta.gamma_probabilities();
        assert!((gamma[0] - 0.75).abs() < 1e-12);
        assert!((gamma[1] - 0.25).abs() < 1e-12);
    }
}
