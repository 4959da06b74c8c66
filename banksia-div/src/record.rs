//! Uniform result records.
//!
//! Every estimation entry point returns a [`DiversityEstimate`]: one record
//! per (community, order, estimator) request, carrying the estimator actually
//! used after any fallback, the coverage it relied on, and structured
//! [`Diagnostic`]s. Records are created per call and never mutated afterward.

/// Whether a record's value is an entropy or its Hill-number transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Quantity {
    /// Tsallis entropy of the requested order.
    Entropy,
    /// Hill number (effective number of species).
    Diversity,
}

/// A non-fatal condition recorded on a result instead of aborting a batch.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Diagnostic {
    /// The sample cannot support the requested estimate (zero richness,
    /// all singletons, zero coverage). The value is NaN or a degenerate 0.
    DegenerateSample {
        /// What made the sample degenerate.
        reason: String,
    },
    /// The requested estimator's prerequisites were unmet and a documented
    /// substitute was used instead.
    EstimatorFallback {
        /// Name of the estimator that was asked for.
        requested: String,
        /// Name of the estimator that produced the value.
        used: String,
        /// Which prerequisite failed.
        reason: String,
    },
    /// A mathematically negative entropy was produced (possible for q < 1 on
    /// small samples). The value is reported as-is, never clipped.
    NegativeEntropy {
        /// The offending value.
        value: f64,
    },
}

/// One estimation result.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DiversityEstimate {
    /// Community identifier, when the input carried one.
    pub community: Option<String>,
    /// Order q of the estimate.
    pub order: f64,
    /// Name of the estimator that produced the value, after any fallback.
    pub estimator: String,
    /// Sample coverage used by the estimator, when it relied on one.
    pub coverage: Option<f64>,
    /// Entropy or diversity?
    pub quantity: Quantity,
    /// The estimate itself (NaN for degenerate samples).
    pub value: f64,
    /// Bootstrap standard error, when one was computed.
    pub std_error: Option<f64>,
    /// Non-fatal conditions encountered while estimating.
    pub diagnostics: Vec<Diagnostic>,
}

impl DiversityEstimate {
    /// True if any diagnostic marks the sample as degenerate.
    pub fn is_degenerate(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| matches!(d, Diagnostic::DegenerateSample { .. }))
    }

    /// True if a fallback estimator was substituted for the requested one.
    pub fn had_fallback(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| matches!(d, Diagnostic::EstimatorFallback { .. }))
    }
}
