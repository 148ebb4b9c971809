// Copyright 2022 Lucas Javaudin
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// https://creativecommons.org/licenses/by-nc-nd/4.0/legalcode

//! System-optimal dynamic traffic assignment: the split ratios of the compliant vehicles at the
//! origins of a cell-transmission network are optimized with the adjoint method to minimize the
//! total travel time.
#![doc(html_no_source)]

pub mod adjoint;
pub mod error;
pub mod flow_policy;
pub mod io;
pub mod layout;
pub mod logging;
pub mod network;
pub mod parameters;
pub mod problem;
pub mod progress_bar;
pub mod report;
pub mod simulator;
pub mod sparse;
pub mod split_ratios;
pub mod state;
pub mod stop;

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use log::info;

use crate::adjoint::GradientDescent;
use crate::problem::SystemOptimalProblem;
use crate::report::OptimizationReport;

// Dependencies only used in the bins.
use clap as _;

/// Deserializes the input files, optimizes the split ratios and stores the results in the output
/// directory.
///
/// This function takes as argument the path to the `parameters.json` file.
pub fn run_optimization(path: &Path) -> Result<()> {
    let parameters = io::json::get_parameters_from_json(path)?;

    // Create output directory if it does not exists yet.
    std::fs::create_dir_all(&parameters.output_directory).with_context(|| {
        format!(
            "Failed to create output directory `{:?}`",
            parameters.output_directory
        )
    })?;

    logging::initialize_logging(&parameters.output_directory)?;

    let graph = io::json::get_graph_from_json(&parameters)?;
    let network = graph
        .discretize(parameters.time_step, parameters.nb_steps, parameters.alpha)
        .context("Failed to discretize the graph")?;
    info!(
        "Network with {} cells, {} junctions and {} compliant commodities",
        network.nb_cells(),
        network.nb_junctions(),
        network.nb_compliant_commodities()
    );
    let problem = SystemOptimalProblem::new(network, parameters.alpha, parameters.barrier_weight)?;

    let now = Instant::now();
    let start = problem.starting_point()?;
    let result = GradientDescent::new(parameters.optimizer.clone())
        .optimize(&problem, start)
        .context("Optimization failed")?;
    info!("Running time: {:.2?}", now.elapsed());

    let report = OptimizationReport::new(&problem, result)?;
    info!("Total travel time: {}", report.total_travel_time);
    report.write(&parameters.output_directory)?;
    info!("Results written to `{:?}`", parameters.output_directory);
    Ok(())
}
