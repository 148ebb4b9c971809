// Copyright 2022 Lucas Javaudin
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// https://creativecommons.org/licenses/by-nc-nd/4.0/legalcode

//! Errors raised by the network model, the forward integrator and the adjoint computations.
use thiserror::Error;

/// Error type of the library.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum AdjointError {
    /// The network or the problem is badly configured (unsupported junction shape, invalid
    /// priorities, disconnected path, `alpha = 0` when a control is requested, ...).
    #[error("Invalid configuration: {0}")]
    Configuration(String),
    /// A computed value is not a finite number (or is outside of its physical domain).
    #[error("Invalid value for {what}: {value}")]
    NumericalInvalidity {
        /// Name of the quantity that was computed.
        what: &'static str,
        /// The invalid value.
        value: f64,
    },
    /// The barrier term requires the sum of the compliant split ratios to be larger than 1.
    #[error(
        "The sum of split ratios at origin {origin} and step {step} is {sum}, the barrier requires \
         a value larger than 1"
    )]
    InfeasibleSplitRatios {
        /// Index of the origin.
        origin: usize,
        /// Time step.
        step: usize,
        /// Sum of the (unscaled) split ratios.
        sum: f64,
    },
    /// A vector does not have the size expected by the layout.
    #[error("Vector of size {actual} given, expected size {expected}")]
    DimensionMismatch {
        /// Expected size.
        expected: usize,
        /// Actual size.
        actual: usize,
    },
}

impl AdjointError {
    /// Returns `true` if the error comes from an invalid numerical value, i.e., the current point
    /// is not acceptable but another point could be.
    pub const fn is_numerical(&self) -> bool {
        matches!(
            self,
            Self::NumericalInvalidity { .. } | Self::InfeasibleSplitRatios { .. }
        )
    }
}

/// Result type of the library.
pub type AdjointResult<T> = Result<T, AdjointError>;

/// Returns the value if it is finite, or a [AdjointError::NumericalInvalidity] otherwise.
pub fn finite(what: &'static str, value: f64) -> AdjointResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(AdjointError::NumericalInvalidity { what, value })
    }
}

/// Returns a [AdjointError::DimensionMismatch] if `actual` is not equal to `expected`.
pub fn check_dimension(expected: usize, actual: usize) -> AdjointResult<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(AdjointError::DimensionMismatch { expected, actual })
    }
}
