//! Rarefaction and extrapolation of entropy and diversity.
//!
//! Predicts the expected entropy/diversity of a community at a sample size
//! (or coverage level) other than the one observed:
//!
//! - **Interpolation** (target below the observed size) is the exact
//!   expectation under conditional hypergeometric subsampling, in log-binomial
//!   space. Orders 0 and 2 have closed forms; Shannon and general orders use
//!   the exact combinatorial expectation. No simulation anywhere.
//! - **Extrapolation** (target above the observed size) anchors on an
//!   asymptotic bias-corrected estimate and approaches it at the Chao
//!   saturation rate, joining the interpolated curve continuously at the
//!   observed size. Monotonicity in the level is expected by theory but not
//!   guaranteed for every estimator/order pair.
//!
//! Shared intermediates (frequency counts, coverage, the unveiled
//! probability vector, the saturation rate) are computed once per abundance
//! vector and reused across level queries. Bootstrap standard errors draw
//! multinomial resamples from the unveiled vector, one independently seeded
//! generator per replicate, so results are reproducible for a fixed seed
//! regardless of worker count.

use banksia_core::{BanksiaError, Result};

use crate::coverage::coverage_from_frequencies;
use crate::distribution::FrequencyCounts;
use crate::entropy::{richness_for, tsallis, EntropyOptions, Q_TOL};
use crate::hill::exp_q;
use crate::math::ln_binomial;
use crate::record::{DiversityEstimate, Quantity};
use crate::richness::chao1;
use crate::unveil::{unveil, UnveilOptions, UnveiledDistribution};

// ── Xorshift64 PRNG ────────────────────────────────────────────────────────

/// Minimal xorshift64 PRNG for reproducible bootstrap draws without
/// external deps.
struct Xorshift64 {
    state: u64,
}

impl Xorshift64 {
    fn new(seed: u64) -> Self {
        Self {
            state: if seed == 0 { 1 } else { seed },
        }
    }

    fn next_u64(&mut self) -> u64 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        self.state
    }

    fn next_f64(&mut self) -> f64 {
        self.next_u64() as f64 / u64::MAX as f64
    }
}

/// A target sampling level.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TargetLevel {
    /// An integer sample size.
    Size(usize),
    /// A coverage fraction in (0, 1), translated to the smallest sample size
    /// whose expected coverage reaches it.
    Coverage(f64),
}

/// Rarefaction/extrapolation engine for one abundance vector.
///
/// Construction computes every intermediate shared across level queries;
/// the query methods are read-only and freely usable from parallel code.
#[derive(Debug, Clone)]
pub struct DiversityAccumulation {
    counts: Vec<usize>,
    freq: FrequencyCounts,
    coverage: f64,
    unveiled: UnveiledDistribution,
    /// Chao1 estimate of the unseen-species count.
    f0: f64,
    /// Chao saturation rate r = 1 − f1/(n f̂0 + f1).
    rate: f64,
    opts: EntropyOptions,
}

impl DiversityAccumulation {
    /// Build the engine for a count vector.
    ///
    /// # Errors
    ///
    /// Returns an error if `counts` is empty or all zero.
    pub fn new(counts: &[usize], opts: EntropyOptions) -> Result<Self> {
        let freq = FrequencyCounts::from_counts(counts);
        if counts.is_empty() || freq.n == 0 {
            return Err(BanksiaError::InvalidInput(
                "accumulation: sample has no individuals".into(),
            ));
        }
        let coverage = coverage_from_frequencies(&freq, opts.coverage).value;
        let uopts = UnveilOptions {
            estimator: opts.probability,
            unveiling: opts.unveiling,
            coverage: opts.coverage,
            richness: richness_for(opts.estimator),
            jack_max: opts.jack_max,
            jack_alpha: opts.jack_alpha,
        };
        let unveiled = unveil(counts, &uopts)?;
        let f0 = chao1(&freq) - freq.observed as f64;
        let f1 = freq.f1() as f64;
        let rate = if f1 > 0.0 && f0 > 0.0 {
            1.0 - f1 / (freq.n as f64 * f0 + f1)
        } else {
            0.0
        };
        Ok(Self {
            counts: counts.to_vec(),
            freq,
            coverage,
            unveiled,
            f0,
            rate,
            opts,
        })
    }

    /// Observed sample size.
    pub fn observed_size(&self) -> usize {
        self.freq.n
    }

    /// Full-sample coverage estimate.
    pub fn coverage(&self) -> f64 {
        self.coverage
    }

    /// Translate a target level to a sample size.
    ///
    /// # Errors
    ///
    /// Returns an error for a zero size or a coverage outside (0, 1).
    pub fn resolve_level(&self, level: TargetLevel) -> Result<usize> {
        match level {
            TargetLevel::Size(0) => Err(BanksiaError::InvalidInput(
                "target size must be at least 1".into(),
            )),
            TargetLevel::Size(m) => Ok(m),
            TargetLevel::Coverage(c) => self.size_for_coverage(c),
        }
    }

    /// Expected coverage of a sample of size `m` from this community.
    ///
    /// Below the observed size this is the exact hypergeometric expectation;
    /// above it, the Chao-style geometric completion.
    pub fn coverage_at_size(&self, m: usize) -> f64 {
        let n = self.freq.n;
        if m == 0 {
            return 0.0;
        }
        if m < n {
            let nf = n as f64;
            let mut deficit = 0.0;
            for &x in self.counts.iter().filter(|&&x| x > 0) {
                if n - x >= m {
                    deficit += (x as f64 / nf)
                        * (ln_binomial(n - x, m) - ln_binomial(n - 1, m)).exp();
                }
            }
            return (1.0 - deficit).clamp(0.0, 1.0);
        }
        let nf = n as f64;
        let f1 = self.freq.f1() as f64;
        let f2 = self.freq.f2() as f64;
        if f1 == 0.0 {
            return 1.0;
        }
        let a = if f2 > 0.0 {
            (nf - 1.0) * f1 / ((nf - 1.0) * f1 + 2.0 * f2)
        } else if f1 > 1.0 {
            (nf - 1.0) * (f1 - 1.0) / ((nf - 1.0) * (f1 - 1.0) + 2.0)
        } else {
            0.0
        };
        (1.0 - (f1 / nf) * a.powi((m - n) as i32 + 1)).clamp(0.0, 1.0)
    }

    /// Smallest sample size whose expected coverage reaches `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if `target` is outside (0, 1) or unreachable.
    pub fn size_for_coverage(&self, target: f64) -> Result<usize> {
        if !(target > 0.0 && target < 1.0) {
            return Err(BanksiaError::InvalidInput(format!(
                "coverage target must be in (0, 1), got {}",
                target
            )));
        }
        // Exponential search for an upper bound, then bisect.
        let mut hi = 1usize;
        let cap = self
            .freq
            .n
            .saturating_mul(1_000)
            .max(1_000);
        while self.coverage_at_size(hi) < target {
            if hi >= cap {
                return Err(BanksiaError::InvalidInput(format!(
                    "coverage target {} not reachable below {} individuals",
                    target, cap
                )));
            }
            hi *= 2;
        }
        let mut lo = hi / 2;
        while lo + 1 < hi {
            let mid = lo + (hi - lo) / 2;
            if self.coverage_at_size(mid) >= target {
                hi = mid;
            } else {
                lo = mid;
            }
        }
        Ok(hi)
    }

    /// Asymptotic entropy anchor for extrapolation, using the configured
    /// estimator.
    fn asymptotic_entropy(&self, q: f64) -> Result<DiversityEstimate> {
        tsallis(&self.counts, q, &self.opts)
    }

    /// Expected Tsallis entropy at a target level.
    ///
    /// At the observed size the naive empirical value is returned exactly.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid order or level.
    pub fn entropy_at(&self, q: f64, level: TargetLevel) -> Result<DiversityEstimate> {
        let m = self.resolve_level(level)?;
        let n = self.freq.n;
        let (value, label) = if m == n {
            (
                tsallis(&self.counts, q, &EntropyOptions::naive())?.value,
                "Naive".to_string(),
            )
        } else if m < n {
            crate::entropy::validate_order(q)?;
            (self.interpolated_entropy(q, m), "Interpolation".to_string())
        } else {
            crate::entropy::validate_order(q)?;
            let (v, label) = self.extrapolated_entropy(q, m)?;
            (v, label)
        };
        Ok(DiversityEstimate {
            community: None,
            order: q,
            estimator: label,
            coverage: Some(self.coverage_at_size(m)),
            quantity: Quantity::Entropy,
            value,
            std_error: None,
            diagnostics: Vec::new(),
        })
    }

    /// Expected Hill diversity at a target level.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid order or level.
    pub fn diversity_at(&self, q: f64, level: TargetLevel) -> Result<DiversityEstimate> {
        let mut record = self.entropy_at(q, level)?;
        record.value = exp_q(record.value, q);
        record.quantity = Quantity::Diversity;
        Ok(record)
    }

    /// Exact hypergeometric expectation for m < n.
    fn interpolated_entropy(&self, q: f64, m: usize) -> f64 {
        let n = self.freq.n;
        let nf = n as f64;
        let mf = m as f64;

        if q == 0.0 {
            // E[S_m] − 1 via per-species absence probabilities.
            let ln_total = ln_binomial(n, m);
            let mut expected = self.freq.observed as f64;
            for &x in self.counts.iter().filter(|&&x| x > 0) {
                if n - x >= m {
                    expected -= (ln_binomial(n - x, m) - ln_total).exp();
                }
            }
            return expected - 1.0;
        }
        if q == 2.0 {
            // Second-moment identity, exact for any m:
            // E[Σ (X/m)²] = 1/m + ((m−1)/m) Σ n_i(n_i−1)/(n(n−1)).
            let simpson: f64 = self
                .counts
                .iter()
                .map(|&x| (x * x.saturating_sub(1)) as f64)
                .sum::<f64>()
                / (nf * (nf - 1.0));
            return 1.0 - (1.0 / mf + (mf - 1.0) / mf * simpson);
        }

        // General order: Σ_i Σ_k g(k/m) P[X_i = k] with hypergeometric
        // weights in log space.
        let shannon = (q - 1.0).abs() <= Q_TOL;
        let ln_total = ln_binomial(n, m);
        let mut acc = 0.0;
        for &x in self.counts.iter().filter(|&&x| x > 0) {
            let k_min = m.saturating_sub(n - x).max(1);
            let k_max = m.min(x);
            for k in k_min..=k_max {
                let ln_p = ln_binomial(x, k) + ln_binomial(n - x, m - k) - ln_total;
                let share = k as f64 / mf;
                let g = if shannon {
                    -share * share.ln()
                } else {
                    share.powf(q)
                };
                acc += g * ln_p.exp();
            }
        }
        if shannon {
            acc
        } else {
            (1.0 - acc) / (q - 1.0)
        }
    }

    /// Anchored extrapolation for m > n.
    fn extrapolated_entropy(&self, q: f64, m: usize) -> Result<(f64, String)> {
        let n = self.freq.n;
        let nf = n as f64;
        let mf = m as f64;

        if q == 0.0 {
            // Chao-style richness completion.
            let s_m = self.freq.observed as f64
                + self.f0 * (1.0 - self.rate.powi((m - n) as i32));
            return Ok((s_m - 1.0, "Extrapolation(Chao1)".to_string()));
        }
        if q == 2.0 {
            // The second-moment identity extends across the boundary with
            // the unbiased Simpson concentration.
            let simpson: f64 = self
                .counts
                .iter()
                .map(|&x| (x * x.saturating_sub(1)) as f64)
                .sum::<f64>()
                / (nf * (nf - 1.0));
            return Ok((
                1.0 - (1.0 / mf + (mf - 1.0) / mf * simpson),
                "Extrapolation(Simpson)".to_string(),
            ));
        }

        let anchor = self.asymptotic_entropy(q)?;
        let observed = tsallis(&self.counts, q, &EntropyOptions::naive())?.value;
        let decay = self.rate.powi((m - n) as i32);
        let value = anchor.value - (anchor.value - observed) * decay;
        Ok((value, format!("Extrapolation({})", anchor.estimator)))
    }

    /// Accumulation curve: one record per requested level, in input order.
    ///
    /// Levels are computed independently; under the `parallel` feature they
    /// are distributed across the rayon pool.
    ///
    /// # Errors
    ///
    /// Returns an error if any level or the order is invalid.
    pub fn entropy_curve(
        &self,
        q: f64,
        levels: &[TargetLevel],
    ) -> Result<Vec<(usize, DiversityEstimate)>> {
        let sizes: Vec<usize> = levels
            .iter()
            .map(|&l| self.resolve_level(l))
            .collect::<Result<_>>()?;

        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            sizes
                .par_iter()
                .map(|&m| Ok((m, self.entropy_at(q, TargetLevel::Size(m))?)))
                .collect()
        }
        #[cfg(not(feature = "parallel"))]
        {
            sizes
                .iter()
                .map(|&m| Ok((m, self.entropy_at(q, TargetLevel::Size(m))?)))
                .collect()
        }
    }

    /// Diversity accumulation curve.
    ///
    /// # Errors
    ///
    /// Returns an error if any level or the order is invalid.
    pub fn diversity_curve(
        &self,
        q: f64,
        levels: &[TargetLevel],
    ) -> Result<Vec<(usize, DiversityEstimate)>> {
        let mut curve = self.entropy_curve(q, levels)?;
        for (_, record) in &mut curve {
            record.value = exp_q(record.value, q);
            record.quantity = Quantity::Diversity;
        }
        Ok(curve)
    }

    /// Expected entropy at a level with a bootstrap standard error.
    ///
    /// Draws `replicates` multinomial resamples of the observed size from the
    /// unveiled probability vector and recomputes the estimate on each; the
    /// reported error is the sample standard deviation. Each replicate owns
    /// a generator seeded from `seed` and its index, so a fixed seed
    /// reproduces results regardless of execution order.
    ///
    /// # Errors
    ///
    /// Returns an error if `replicates` is zero or the level is invalid.
    pub fn entropy_at_with_error(
        &self,
        q: f64,
        level: TargetLevel,
        replicates: usize,
        seed: u64,
    ) -> Result<DiversityEstimate> {
        if replicates == 0 {
            return Err(BanksiaError::InvalidInput(
                "bootstrap needs at least one replicate".into(),
            ));
        }
        let mut record = self.entropy_at(q, level)?;
        let m = self.resolve_level(level)?;

        // Cumulative distribution for inverse-CDF sampling.
        let probs = &self.unveiled.probabilities;
        let total: f64 = probs.iter().sum();
        let mut cum = Vec::with_capacity(probs.len());
        let mut acc = 0.0;
        for &p in probs {
            acc += p / total;
            cum.push(acc);
        }

        let replicate_value = |rep: usize| -> Option<f64> {
            let mut rng =
                Xorshift64::new(seed ^ (rep as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15));
            let mut resample = vec![0usize; cum.len()];
            for _ in 0..self.freq.n {
                let u = rng.next_f64();
                let idx = cum.partition_point(|&c| c < u).min(cum.len() - 1);
                resample[idx] += 1;
            }
            let engine = DiversityAccumulation::new(&resample, self.opts.clone()).ok()?;
            let est = engine.entropy_at(q, TargetLevel::Size(m)).ok()?;
            est.value.is_finite().then_some(est.value)
        };

        #[cfg(feature = "parallel")]
        let values: Vec<f64> = {
            use rayon::prelude::*;
            (0..replicates)
                .into_par_iter()
                .filter_map(replicate_value)
                .collect()
        };
        #[cfg(not(feature = "parallel"))]
        let values: Vec<f64> = (0..replicates).filter_map(replicate_value).collect();

        if values.len() > 1 {
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            let var = values
                .iter()
                .map(|v| (v - mean) * (v - mean))
                .sum::<f64>()
                / (values.len() - 1) as f64;
            record.std_error = Some(var.sqrt());
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entropy::EntropyOptions;

    const COUNTS: [usize; 8] = [40, 25, 12, 8, 5, 3, 1, 1];

    fn engine() -> DiversityAccumulation {
        DiversityAccumulation::new(&COUNTS, EntropyOptions::default()).unwrap()
    }

    #[test]
    fn boundary_equals_naive_exactly() {
        let eng = engine();
        let n = eng.observed_size();
        for q in [0.0, 0.5, 1.0, 2.0] {
            let at_n = eng.entropy_at(q, TargetLevel::Size(n)).unwrap();
            let naive = tsallis(&COUNTS, q, &EntropyOptions::naive()).unwrap();
            assert_eq!(at_n.value, naive.value, "q={}", q);
        }
    }

    #[test]
    fn interpolated_richness_matches_hypergeometric() {
        // Two species, counts [1, 1], subsample of 1: expect 1 species.
        let eng = DiversityAccumulation::new(&[1, 1], EntropyOptions::naive()).unwrap();
        let h0 = eng.entropy_at(0.0, TargetLevel::Size(1)).unwrap();
        assert!((h0.value - 0.0).abs() < 1e-12); // 1 species − 1
    }

    #[test]
    fn interpolation_increases_with_level() {
        let eng = engine();
        for q in [0.0, 1.0, 2.0] {
            let mut prev = f64::NEG_INFINITY;
            for m in [5, 20, 50, 95] {
                let v = eng.entropy_at(q, TargetLevel::Size(m)).unwrap().value;
                assert!(v >= prev - 1e-9, "q={} m={}: {} < {}", q, m, v, prev);
                prev = v;
            }
        }
    }

    #[test]
    fn q2_extrapolation_is_continuous_at_boundary() {
        let eng = engine();
        let n = eng.observed_size();
        let at_n = eng.entropy_at(2.0, TargetLevel::Size(n)).unwrap().value;
        let just_above = eng.entropy_at(2.0, TargetLevel::Size(n + 1)).unwrap().value;
        // The second-moment identity converges to the naive value as m → n.
        assert!((just_above - at_n).abs() < 1e-3);
        // And the limit as m → n from the formula is exactly the naive value.
        let nf = n as f64;
        let simpson: f64 = COUNTS
            .iter()
            .map(|&x| (x * (x - 1)) as f64)
            .sum::<f64>()
            / (nf * (nf - 1.0));
        let formula_at_n = 1.0 - (1.0 / nf + (nf - 1.0) / nf * simpson);
        assert!((formula_at_n - at_n).abs() < 1e-12);
    }

    #[test]
    fn shannon_extrapolation_approaches_anchor() {
        let eng = engine();
        let n = eng.observed_size();
        let anchor = tsallis(&COUNTS, 1.0, &EntropyOptions::default())
            .unwrap()
            .value;
        let far = eng
            .entropy_at(1.0, TargetLevel::Size(10 * n))
            .unwrap()
            .value;
        assert!((far - anchor).abs() < 1e-3);
        // And the curve starts at the observed value.
        let at_n = eng.entropy_at(1.0, TargetLevel::Size(n)).unwrap().value;
        let naive = tsallis(&COUNTS, 1.0, &EntropyOptions::naive())
            .unwrap()
            .value;
        assert_eq!(at_n, naive);
    }

    #[test]
    fn coverage_curve_is_monotone() {
        let eng = engine();
        let n = eng.observed_size();
        let mut prev = 0.0;
        for m in [1, 5, 20, 50, n, n + 10, n * 3] {
            let c = eng.coverage_at_size(m);
            assert!(c >= prev - 1e-9, "m={}: {} < {}", m, c, prev);
            assert!((0.0..=1.0).contains(&c));
            prev = c;
        }
    }

    #[test]
    fn coverage_target_resolves_to_smallest_size() {
        let eng = engine();
        let target = 0.9;
        let m = eng.size_for_coverage(target).unwrap();
        assert!(eng.coverage_at_size(m) >= target);
        assert!(m == 1 || eng.coverage_at_size(m - 1) < target);
    }

    #[test]
    fn invalid_levels_are_rejected() {
        let eng = engine();
        assert!(eng.entropy_at(1.0, TargetLevel::Size(0)).is_err());
        assert!(eng.entropy_at(1.0, TargetLevel::Coverage(1.2)).is_err());
        assert!(eng.entropy_at(1.0, TargetLevel::Coverage(0.0)).is_err());
    }

    #[test]
    fn bootstrap_is_reproducible() {
        let eng = engine();
        let n = eng.observed_size();
        let a = eng
            .entropy_at_with_error(1.0, TargetLevel::Size(2 * n), 20, 42)
            .unwrap();
        let b = eng
            .entropy_at_with_error(1.0, TargetLevel::Size(2 * n), 20, 42)
            .unwrap();
        assert_eq!(a.std_error, b.std_error);
        assert!(a.std_error.unwrap() > 0.0);
        let c = eng
            .entropy_at_with_error(1.0, TargetLevel::Size(2 * n), 20, 43)
            .unwrap();
        assert_ne!(a.std_error, c.std_error);
    }

    #[test]
    fn curve_covers_both_sides() {
        let eng = engine();
        let n = eng.observed_size();
        let levels: Vec<TargetLevel> = [n / 4, n / 2, n, 2 * n]
            .iter()
            .map(|&m| TargetLevel::Size(m))
            .collect();
        let curve = eng.diversity_curve(1.0, &levels).unwrap();
        assert_eq!(curve.len(), 4);
        for (m, rec) in &curve {
            assert!(rec.value.is_finite(), "m={}", m);
            assert!(rec.value >= 1.0);
        }
    }
}
