// Copyright 2022 Lucas Javaudin
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// https://creativecommons.org/licenses/by-nc-nd/4.0/legalcode

//! Adjoint method and gradient-descent optimizer.
//!
//! A problem is written as `min_U J(X, U)` subject to `H(X, U) = 0`, where the state `X` is
//! obtained from the control `U` by forward simulation. The gradient of the reduced objective is
//! `dJ/dU + lambda^T dH/dU`, where the adjoint vector `lambda` solves
//! `(dH/dX)^T lambda = -(dJ/dX)^T`.
use log::{debug, info, warn};
use serde_derive::{Deserialize, Serialize};

use crate::error::{check_dimension, AdjointError, AdjointResult};
use crate::progress_bar::IterationBar;
use crate::sparse::SparseMatrix;
use crate::stop::StopCriterion;

/// An optimization problem whose gradient can be computed with the adjoint method.
pub trait AdjointProblem: Sync {
    /// Simulated state of the problem.
    type State: Sync;

    /// Returns the initial control.
    fn starting_point(&self) -> AdjointResult<Vec<f64>>;

    /// Simulates the state given a control.
    fn forward_simulate(&self, control: &[f64]) -> AdjointResult<Self::State>;

    /// Returns the value of the objective.
    fn objective(&self, state: &Self::State, control: &[f64]) -> AdjointResult<f64>;

    /// Returns the Jacobian of the residual with respect to the control.
    fn dhdu(&self, state: &Self::State, control: &[f64]) -> AdjointResult<SparseMatrix>;

    /// Returns the Jacobian of the residual with respect to the state.
    ///
    /// The matrix must be square and lower triangular, with a non-zero diagonal.
    fn dhdx(&self, state: &Self::State, control: &[f64]) -> AdjointResult<SparseMatrix>;

    /// Returns the gradient of the objective with respect to the state.
    fn djdx(&self, state: &Self::State, control: &[f64]) -> AdjointResult<Vec<f64>>;

    /// Returns the gradient of the objective with respect to the control.
    fn djdu(&self, state: &Self::State, control: &[f64]) -> AdjointResult<Vec<f64>>;

    /// Simulates the state of a control and returns it along with the value of the objective.
    fn evaluate(&self, control: &[f64]) -> AdjointResult<(Self::State, f64)> {
        let state = self.forward_simulate(control)?;
        let value = self.objective(&state, control)?;
        Ok((state, value))
    }

    /// Returns the value of the reduced objective `U -> J(X(U), U)`.
    fn reduced_objective(&self, control: &[f64]) -> AdjointResult<f64> {
        self.evaluate(control).map(|(_, value)| value)
    }

    /// Returns the gradient of the reduced objective `U -> J(X(U), U)`.
    fn gradient(&self, state: &Self::State, control: &[f64]) -> AdjointResult<Vec<f64>> {
        let ((dhdx, djdx), (dhdu, djdu)) = rayon::join(
            || {
                rayon::join(
                    || self.dhdx(state, control),
                    || self.djdx(state, control),
                )
            },
            || {
                rayon::join(
                    || self.dhdu(state, control),
                    || self.djdu(state, control),
                )
            },
        );
        let (dhdx, djdx, dhdu, djdu) = (dhdx?, djdx?, dhdu?, djdu?);
        debug!(
            "Jacobians: dH/dX {}x{} ({} non-zeros), dH/dU {}x{} ({} non-zeros)",
            dhdx.nrows(),
            dhdx.ncols(),
            dhdx.nnz(),
            dhdu.nrows(),
            dhdu.ncols(),
            dhdu.nnz()
        );
        let rhs: Vec<f64> = djdx.iter().map(|v| -v).collect();
        let lambda = dhdx.solve_lower_transposed(&rhs)?;
        let mut gradient = dhdu.transpose_mul_vec(&lambda)?;
        check_dimension(gradient.len(), djdu.len())?;
        for (g, d) in gradient.iter_mut().zip(djdu) {
            *g += d;
        }
        Ok(gradient)
    }
}

fn default_initial_step() -> f64 {
    1.0
}

fn default_armijo_coefficient() -> f64 {
    1e-4
}

fn default_backtracking_factor() -> f64 {
    0.5
}

fn default_min_step() -> f64 {
    1e-10
}

fn default_stopping_criteria() -> Vec<StopCriterion> {
    vec![StopCriterion::MaxIteration(100)]
}

/// Parameters of the [GradientDescent] optimizer.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct OptimizerParameters {
    /// Step tried first by the line search, at each iteration.
    #[serde(default = "default_initial_step")]
    pub initial_step: f64,
    /// Sufficient-decrease coefficient of the Armijo condition.
    #[serde(default = "default_armijo_coefficient")]
    pub armijo_coefficient: f64,
    /// Factor applied to the step when a trial point is rejected.
    #[serde(default = "default_backtracking_factor")]
    pub backtracking_factor: f64,
    /// The line search fails when the step gets below this value.
    #[serde(default = "default_min_step")]
    pub min_step: f64,
    /// The optimization stops as soon as one criterion is met.
    #[serde(default = "default_stopping_criteria")]
    pub stopping_criteria: Vec<StopCriterion>,
}

impl Default for OptimizerParameters {
    fn default() -> Self {
        OptimizerParameters {
            initial_step: default_initial_step(),
            armijo_coefficient: default_armijo_coefficient(),
            backtracking_factor: default_backtracking_factor(),
            min_step: default_min_step(),
            stopping_criteria: default_stopping_criteria(),
        }
    }
}

impl OptimizerParameters {
    /// Checks that the parameters are consistent.
    pub fn validate(&self) -> AdjointResult<()> {
        if !(self.initial_step > 0.0) {
            return Err(AdjointError::Configuration(format!(
                "The initial step must be positive (got {})",
                self.initial_step
            )));
        }
        if !(self.armijo_coefficient > 0.0 && self.armijo_coefficient < 1.0) {
            return Err(AdjointError::Configuration(format!(
                "The Armijo coefficient must be between 0 and 1 (got {})",
                self.armijo_coefficient
            )));
        }
        if !(self.backtracking_factor > 0.0 && self.backtracking_factor < 1.0) {
            return Err(AdjointError::Configuration(format!(
                "The backtracking factor must be between 0 and 1 (got {})",
                self.backtracking_factor
            )));
        }
        if !(self.min_step > 0.0) {
            return Err(AdjointError::Configuration(format!(
                "The minimum step must be positive (got {})",
                self.min_step
            )));
        }
        if self.stopping_criteria.is_empty() {
            return Err(AdjointError::Configuration(
                "At least one stopping criterion is required".to_owned(),
            ));
        }
        Ok(())
    }

    /// Returns `true` if one of the stopping criteria is met.
    pub fn stop(&self, iteration_counter: u32, gradient_norm: f64, improvement: Option<f64>) -> bool {
        self.stopping_criteria
            .iter()
            .any(|c| c.stop(iteration_counter, gradient_norm, improvement))
    }

    fn max_iteration(&self) -> Option<u32> {
        self.stopping_criteria
            .iter()
            .filter_map(|c| match *c {
                StopCriterion::MaxIteration(n) => Some(n),
                _ => None,
            })
            .min()
    }
}

/// Result of an optimization.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OptimizationResult {
    /// Last accepted control.
    pub control: Vec<f64>,
    /// Value of the objective at the starting point and after each iteration.
    pub objective_history: Vec<f64>,
    /// Norm of the gradient at each evaluated point.
    pub gradient_norms: Vec<f64>,
    /// Number of accepted iterations.
    pub iterations: u32,
}

impl OptimizationResult {
    /// Returns the value of the objective at the last accepted control.
    pub fn objective(&self) -> f64 {
        self.objective_history.last().copied().unwrap_or(f64::NAN)
    }
}

/// Steepest descent with an Armijo backtracking line search.
#[derive(Clone, Debug, Default)]
pub struct GradientDescent {
    parameters: OptimizerParameters,
}

/// An accepted point of the line search.
struct Trial<S> {
    control: Vec<f64>,
    state: S,
    objective: f64,
}

impl GradientDescent {
    /// Creates a new [GradientDescent].
    pub const fn new(parameters: OptimizerParameters) -> Self {
        GradientDescent { parameters }
    }

    /// Returns the parameters of the optimizer.
    pub const fn parameters(&self) -> &OptimizerParameters {
        &self.parameters
    }

    /// Minimizes the objective of the problem, starting from the given control.
    pub fn optimize<P: AdjointProblem>(
        &self,
        problem: &P,
        start: Vec<f64>,
    ) -> AdjointResult<OptimizationResult> {
        self.parameters.validate()?;
        let mut control = start;
        let (mut state, mut objective) = problem.evaluate(&control)?;
        info!("Initial objective: {objective}");
        let mut objective_history = vec![objective];
        let mut gradient_norms = Vec::new();
        let mut iteration_counter = 0;
        let bar = IterationBar::new(u64::from(self.parameters.max_iteration().unwrap_or(0)));
        loop {
            let gradient = problem.gradient(&state, &control)?;
            let norm = gradient.iter().map(|g| g * g).sum::<f64>().sqrt();
            gradient_norms.push(norm);
            let improvement = match objective_history.as_slice() {
                [.., previous, last] => Some(previous - last),
                _ => None,
            };
            if self.parameters.stop(iteration_counter, norm, improvement) {
                break;
            }
            match self.line_search(problem, &control, &gradient, objective, norm)? {
                Some(trial) => {
                    control = trial.control;
                    state = trial.state;
                    objective = trial.objective;
                }
                None => {
                    bar.suspend(|| {
                        warn!("Line search failed at iteration {}", iteration_counter + 1)
                    });
                    break;
                }
            }
            objective_history.push(objective);
            iteration_counter += 1;
            bar.set_message(format!("J = {objective:.6}"));
            bar.inc();
            debug!(
                "Iteration {iteration_counter}: objective = {objective}, gradient norm = {norm}"
            );
        }
        bar.finish();
        info!(
            "Optimization finished after {iteration_counter} iterations (objective: {objective})"
        );
        Ok(OptimizationResult {
            control,
            objective_history,
            gradient_norms,
            iterations: iteration_counter,
        })
    }

    /// Returns the first point `U - t * gradient` satisfying the Armijo condition, for
    /// `t = initial_step * backtracking_factor^n`, or `None` if the step gets too small.
    ///
    /// A trial point where the simulation or the objective fails with a numerical error is
    /// rejected.
    fn line_search<P: AdjointProblem>(
        &self,
        problem: &P,
        control: &[f64],
        gradient: &[f64],
        objective: f64,
        gradient_norm: f64,
    ) -> AdjointResult<Option<Trial<P::State>>> {
        let p = &self.parameters;
        let mut step = p.initial_step;
        while step >= p.min_step {
            let trial_control: Vec<f64> = control
                .iter()
                .zip(gradient)
                .map(|(u, g)| u - step * g)
                .collect();
            match problem.evaluate(&trial_control) {
                Ok((state, value))
                    if value <= objective - p.armijo_coefficient * step * gradient_norm.powi(2) =>
                {
                    return Ok(Some(Trial {
                        control: trial_control,
                        state,
                        objective: value,
                    }));
                }
                Ok((_, value)) => {
                    debug!("Step {step} rejected (objective: {value})");
                }
                Err(e) if e.is_numerical() => {
                    debug!("Step {step} rejected ({e})");
                }
                Err(e) => return Err(e),
            }
            step *= p.backtracking_factor;
        }
        Ok(None)
    }
}
