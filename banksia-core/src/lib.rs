//! Shared primitives for the Banksia biodiversity-estimation workspace.
//!
//! `banksia-core` provides the foundation the other Banksia crates build on:
//!
//! - **Error types** — [`BanksiaError`] and [`Result`] for structured error handling
//! - **Traits** — [`Summarizable`] for one-line displays of domain objects

pub mod error;
pub mod traits;

pub use error::{BanksiaError, Result};
pub use traits::Summarizable;
