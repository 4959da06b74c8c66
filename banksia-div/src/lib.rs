//! Bias-corrected entropy and diversity estimation for community samples.
//!
//! `banksia-div` estimates entropy-based biodiversity indices from species
//! abundance counts, correcting for the species a sample failed to observe:
//!
//! - **Coverage** — four estimators of the observed probability mass
//! - **Richness** — Chao1, iChao1, and jackknife unseen-species counts
//! - **Unveiling** — reconstructed probability vectors with unseen tails
//! - **Tsallis entropy** — a family of bias-corrected estimators with a
//!   central fallback table
//! - **Hill numbers** — the deformed exponential/logarithm transform
//! - **Rarefaction/extrapolation** — expected diversity at any sample size
//!   or coverage level, with seeded bootstrap errors
//! - **Similarity weighting** — Leinster-Cobbold ordinariness and Rao's Q
//! - **Partitioning** — alpha/beta/gamma decomposition of weighted
//!   metacommunities
//!
//! Everything is a pure function of its inputs; batch entry points report
//! degenerate rows as NaN records with diagnostics instead of failing, and
//! the `parallel` feature distributes batch loops over rayon.

pub mod accumulation;
pub mod coverage;
pub mod distribution;
pub mod entropy;
pub mod hill;
pub mod math;
pub mod partition;
pub mod profile;
pub mod record;
pub mod richness;
pub mod similarity;
pub mod unveil;

pub use accumulation::{DiversityAccumulation, TargetLevel};
pub use coverage::{coverage, CoverageEstimate, CoverageEstimator};
pub use distribution::{
    AbundanceVector, DistributionKind, FrequencyCounts, Metacommunity, SpeciesDistribution,
};
pub use entropy::{tsallis, tsallis_probabilities, EntropyEstimator, EntropyOptions};
pub use hill::{exp_q, hill_number, ln_q};
pub use partition::{partition, partition_diversity, PartitionResult};
pub use profile::{community_profile, diversity_profile, entropy_profile, shannon, simpson};
pub use record::{Diagnostic, DiversityEstimate, Quantity};
pub use richness::{richness, RichnessEstimate, RichnessEstimator};
pub use similarity::{
    rao_quadratic, similarity_diversity, similarity_entropy, SimilarityMatrix,
};
pub use unveil::{unveil, ProbabilityEstimator, UnveilOptions, UnveiledDistribution, Unveiling};
