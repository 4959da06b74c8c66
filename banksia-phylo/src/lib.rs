//! Phylogenetic entropy and diversity for the Banksia workspace.
//!
//! - **Tree data structure** — arena-stored rooted trees with branch lengths,
//!   consumed already parsed
//! - **Phylogenetic entropy** — branch-length-weighted Tsallis entropy over
//!   ultrametric tree slices
//! - **Phylogenetic diversity** — the Hill-consistent deformed exponential
//!   of phylogenetic entropy

pub mod phylodiv;
pub mod tree;

pub use phylodiv::{phylo_diversity, phylo_entropy, PhyloEstimate, SliceEntropy};
pub use tree::{Node, NodeId, SpeciesTree};
