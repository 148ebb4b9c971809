// Copyright 2022 Lucas Javaudin
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// https://creativecommons.org/licenses/by-nc-nd/4.0/legalcode

//! Parameters of an optimization run.
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use serde_derive::{Deserialize, Serialize};

use crate::adjoint::OptimizerParameters;
use crate::problem::DEFAULT_BARRIER_WEIGHT;

const fn default_barrier_weight() -> f64 {
    DEFAULT_BARRIER_WEIGHT
}

/// Set of parameters.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Parameters {
    /// Paths to the input files.
    pub input_files: InputFiles,
    /// Directory where the output files are stored.
    pub output_directory: PathBuf,
    /// Duration of a time step.
    pub time_step: f64,
    /// Number of time steps of the simulation.
    pub nb_steps: usize,
    /// Proportion of compliant vehicles.
    pub alpha: f64,
    /// Weight of the logarithmic barrier on the sum of the split ratios of the origins.
    #[serde(default = "default_barrier_weight")]
    pub barrier_weight: f64,
    /// Parameters of the gradient-descent optimizer.
    #[serde(default)]
    pub optimizer: OptimizerParameters,
}

/// Struct to store all the input file paths.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct InputFiles {
    /// Path to the file where the graph is stored (JSON, possibly zstd-compressed).
    pub network: PathBuf,
}

impl Parameters {
    /// Checks that the parameters are valid.
    pub fn validate(&self) -> Result<()> {
        if !(self.time_step.is_finite() && self.time_step > 0.0) {
            bail!("The time step must be positive, got {}", self.time_step);
        }
        if self.nb_steps == 0 {
            bail!("The number of time steps must be positive");
        }
        if !(self.alpha > 0.0 && self.alpha <= 1.0) {
            bail!(
                "The proportion of compliant vehicles must be such that 0.0 < alpha <= 1.0, got {}",
                self.alpha
            );
        }
        if !(self.barrier_weight.is_finite() && self.barrier_weight >= 0.0) {
            bail!(
                "The barrier weight must be non-negative, got {}",
                self.barrier_weight
            );
        }
        self.optimizer.validate()?;
        Ok(())
    }

    /// Resolves the relative paths of the input files and of the output directory against the
    /// directory of the parameters file.
    pub fn resolve_paths(&mut self, parameters_path: &Path) {
        if let Some(dir) = parameters_path.parent() {
            if self.input_files.network.is_relative() {
                self.input_files.network = dir.join(&self.input_files.network);
            }
            if self.output_directory.is_relative() {
                self.output_directory = dir.join(&self.output_directory);
            }
        }
    }
}
