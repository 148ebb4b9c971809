// Copyright 2022 Lucas Javaudin
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// https://creativecommons.org/licenses/by-nc-nd/4.0/legalcode

//! Results of an optimization run.
use std::path::Path;

use anyhow::Result;
use serde_derive::Serialize;

use crate::adjoint::OptimizationResult;
use crate::error::AdjointResult;
use crate::problem::SystemOptimalProblem;
use crate::simulator::ForwardIntegrator;

/// Summary of an optimization, written in file `results.json`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OptimizationReport {
    /// Optimal control, indexed by `step * nb_compliant_commodities + position`.
    pub control: Vec<f64>,
    /// Absolute split ratios `(commodity, ratio)` of each origin at each time step.
    pub full_control: Vec<Vec<Vec<(usize, f64)>>>,
    pub objective_history: Vec<f64>,
    pub gradient_norms: Vec<f64>,
    pub iterations: u32,
    /// Total travel time of the optimal state (objective without the barrier term).
    pub total_travel_time: f64,
    /// Sum of the control values of each origin at each time step.
    pub split_ratio_sums: Vec<Vec<f64>>,
}

impl OptimizationReport {
    /// Builds the report of an optimization of a [SystemOptimalProblem].
    pub fn new<I: ForwardIntegrator>(
        problem: &SystemOptimalProblem<I>,
        result: OptimizationResult,
    ) -> AdjointResult<Self> {
        let state = problem.forward_simulate(&result.control)?;
        Ok(OptimizationReport {
            full_control: problem.full_control(&result.control)?,
            total_travel_time: problem.total_travel_time(&state),
            split_ratio_sums: state.split_ratio_sums().to_vec(),
            control: result.control,
            objective_history: result.objective_history,
            gradient_norms: result.gradient_norms,
            iterations: result.iterations,
        })
    }

    /// Writes the report in file `results.json` of the given output directory.
    pub fn write(&self, output_dir: &Path) -> Result<()> {
        crate::io::json::write_json(self, output_dir, "results")
    }
}
