// Copyright 2022 Lucas Javaudin
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// https://creativecommons.org/licenses/by-nc-nd/4.0/legalcode

//! Everything related to stopping criteria.
use serde_derive::{Deserialize, Serialize};

/// Criterion that is used to check if an optimization must be stopped.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", content = "value")]
pub enum StopCriterion {
    /// Stop when the number of iterations has reached a given value.
    MaxIteration(u32),
    /// Stop when the Euclidean norm of the gradient is below a threshold value.
    GradientNorm(f64),
    /// Stop when the decrease of the objective from one iteration to another is below a
    /// threshold value.
    ObjectiveImprovement(f64),
}

impl StopCriterion {
    /// Returns `true` if the optimization must be stopped according to the current
    /// `StopCriterion`.
    ///
    /// `improvement` is the decrease of the objective during the last iteration (`None` before
    /// the first iteration).
    pub fn stop(&self, iteration_counter: u32, gradient_norm: f64, improvement: Option<f64>) -> bool {
        match *self {
            Self::MaxIteration(max_iter) => max_iter <= iteration_counter,
            Self::GradientNorm(threshold) => gradient_norm <= threshold,
            Self::ObjectiveImprovement(threshold) => {
                improvement.map_or(false, |improvement| improvement <= threshold)
            }
        }
    }
}
