// Copyright 2022 Lucas Javaudin
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// https://creativecommons.org/licenses/by-nc-nd/4.0/legalcode

//! System-optimal routing problem: choose the compliant split ratios of the origins to minimize
//! the total travel time of the network.
//!
//! The dynamics are written as an implicit system `H(X, U) = 0` (see [Layout] for the
//! vectorization of `X`, `U` and `H`), so that the gradient of the objective can be computed with
//! the adjoint method (see [AdjointProblem]).
mod jacobian;
mod residual;

use log::{debug, warn};

use crate::adjoint::AdjointProblem;
use crate::error::{check_dimension, AdjointError, AdjointResult};
use crate::layout::Layout;
use crate::network::{Network, OriginIndex, NON_COMPLIANT};
use crate::simulator::{CellTransmissionModel, ForwardIntegrator};
use crate::sparse::SparseMatrix;
use crate::state::State;

/// Default weight of the barrier term.
pub const DEFAULT_BARRIER_WEIGHT: f64 = 0.001;

/// Margin above 1 of the sum of the control values of an origin, used to make the starting point
/// feasible.
pub const STARTING_MARGIN: f64 = 0.1;

/// System-optimal routing problem on a [Network].
#[derive(Clone, Debug)]
pub struct SystemOptimalProblem<I = CellTransmissionModel> {
    network: Network,
    layout: Layout,
    integrator: I,
    /// Proportion of compliant vehicles.
    alpha: f64,
    barrier_weight: f64,
}

impl SystemOptimalProblem<CellTransmissionModel> {
    /// Creates a new problem simulated with the default [CellTransmissionModel].
    pub fn new(network: Network, alpha: f64, barrier_weight: f64) -> AdjointResult<Self> {
        Self::with_integrator(network, alpha, barrier_weight, CellTransmissionModel::default())
    }
}

impl<I: ForwardIntegrator> SystemOptimalProblem<I> {
    /// Creates a new problem simulated with the given integrator.
    ///
    /// `alpha` is the proportion of compliant vehicles and `barrier_weight` is the weight of the
    /// logarithmic barrier on the sum of the split ratios.
    pub fn with_integrator(
        network: Network,
        alpha: f64,
        barrier_weight: f64,
        integrator: I,
    ) -> AdjointResult<Self> {
        if !(0.0..=1.0).contains(&alpha) {
            return Err(AdjointError::Configuration(format!(
                "The proportion of compliant vehicles must be between 0 and 1 (got {alpha})"
            )));
        }
        if !(barrier_weight.is_finite() && barrier_weight >= 0.0) {
            return Err(AdjointError::Configuration(format!(
                "The barrier weight must be non-negative (got {barrier_weight})"
            )));
        }
        let layout = Layout::new(&network);
        debug!(
            "Problem sizes: X = {}, U = {}, H = {} ({} time steps, {} cells, {} junctions, {} \
             commodities)",
            layout.x_size(),
            layout.u_size(),
            layout.h_size(),
            network.nb_steps(),
            network.nb_cells(),
            network.nb_junctions(),
            network.nb_commodities(),
        );
        Ok(SystemOptimalProblem {
            network,
            layout,
            integrator,
            alpha,
            barrier_weight,
        })
    }

    /// Returns the network of the problem.
    pub const fn network(&self) -> &Network {
        &self.network
    }

    /// Returns the layout of the vectors of the problem.
    pub const fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Returns the proportion of compliant vehicles.
    pub const fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Returns the weight of the barrier term.
    pub const fn barrier_weight(&self) -> f64 {
        self.barrier_weight
    }

    fn check_control(&self, control: &[f64]) -> AdjointResult<()> {
        check_dimension(self.layout.u_size(), control.len())
    }

    /// Returns the control matching the split ratios seeded in the network (divided by the
    /// proportion of compliant vehicles).
    ///
    /// When the sum of the control values of an origin with a non-zero demand is not larger than
    /// 1 at a time step, the control values of its commodities are raised evenly so that the sum
    /// is `1 + STARTING_MARGIN`.
    pub fn starting_point(&self) -> AdjointResult<Vec<f64>> {
        if self.alpha == 0.0 {
            return Err(AdjointError::Configuration(
                "Cannot compute a control with no compliant vehicle (alpha = 0)".to_owned(),
            ));
        }
        let seeded = self.network.initial_split_ratios();
        let mut control = vec![0.0; self.layout.u_size()];
        for (position, &(o, c)) in self.layout.control_entries().iter().enumerate() {
            for k in 0..self.network.nb_steps() {
                control[self.layout.u_index(k, position)] = seeded.get(o, k, c) / self.alpha;
            }
        }
        let sums = self.split_ratio_sums(&control)?;
        for (o, origin) in self.network.iter_origins() {
            let nb_commodities = origin.compliant_commodities().len();
            for (k, &sum) in sums[o.index()].iter().enumerate() {
                if origin.demand(k) == 0.0 || sum > 1.0 || nb_commodities == 0 {
                    continue;
                }
                warn!(
                    "The seeded split ratios of origin {} at step {k} are outside of the barrier \
                     domain (sum: {sum}), they are raised",
                    o.index()
                );
                let shift = (1.0 + STARTING_MARGIN - sum) / nb_commodities as f64;
                for &c in origin.compliant_commodities() {
                    if let Some(position) = self.layout.control_position(c) {
                        control[self.layout.u_index(k, position)] += shift;
                    }
                }
            }
        }
        Ok(control)
    }

    /// Returns, for each origin and each time step, the sum of the control values of the
    /// compliant commodities of the origin.
    pub fn split_ratio_sums(&self, control: &[f64]) -> AdjointResult<Vec<Vec<f64>>> {
        self.check_control(control)?;
        let mut sums = vec![vec![0.0; self.network.nb_steps()]; self.network.iter_origins().count()];
        for (position, &(o, _)) in self.layout.control_entries().iter().enumerate() {
            for (k, sum) in sums[o.index()].iter_mut().enumerate() {
                *sum += control[self.layout.u_index(k, position)];
            }
        }
        Ok(sums)
    }

    /// Returns the first (origin, step, sum) with a non-zero demand where the barrier is not
    /// defined.
    fn first_infeasible(&self, sums: &[Vec<f64>]) -> Option<(OriginIndex, usize, f64)> {
        self.network.iter_origins().find_map(|(o, origin)| {
            sums[o.index()]
                .iter()
                .enumerate()
                .find(|&(k, &sum)| origin.demand(k) != 0.0 && !(sum > 1.0))
                .map(|(k, &sum)| (o, k, sum))
        })
    }

    /// Returns the value of the barrier term, `-eps * sum ln(S - 1)` over the origins and time
    /// steps with a non-zero demand.
    fn barrier(&self, sums: &[Vec<f64>]) -> AdjointResult<f64> {
        if let Some((o, step, sum)) = self.first_infeasible(sums) {
            return Err(AdjointError::InfeasibleSplitRatios {
                origin: o.index(),
                step,
                sum,
            });
        }
        let mut total = 0.0;
        for (o, origin) in self.network.iter_origins() {
            for (k, &sum) in sums[o.index()].iter().enumerate() {
                if origin.demand(k) != 0.0 {
                    total += (sum - 1.0).ln();
                }
            }
        }
        Ok(-self.barrier_weight * total)
    }

    /// Simulates the network with the given control.
    ///
    /// The split ratios seeded in the network are copied and the split ratio of each compliant
    /// commodity is replaced by the control value multiplied by the proportion of compliant
    /// vehicles.
    pub fn forward_simulate(&self, control: &[f64]) -> AdjointResult<State> {
        self.check_control(control)?;
        let mut split_ratios = self.network.initial_split_ratios().clone();
        for (position, &(o, c)) in self.layout.control_entries().iter().enumerate() {
            for k in 0..self.network.nb_steps() {
                split_ratios.set(o, k, c, control[self.layout.u_index(k, position)] * self.alpha);
            }
        }
        let profiles = self.integrator.run(&self.network, &split_ratios)?;
        check_dimension(self.network.nb_steps(), profiles.len())?;
        Ok(State::new(profiles, self.split_ratio_sums(control)?))
    }

    /// Returns the total travel time of a state: the sum of the total densities of all cells at
    /// all time steps, excluding the vehicles which reached their destination.
    pub fn total_travel_time(&self, state: &State) -> f64 {
        let mut total = 0.0;
        for profile in state.iter_profiles() {
            total += profile.total_density();
            for (_, destination) in self.network.iter_destinations() {
                total -= profile.cell(destination.sink()).total_density;
            }
        }
        total
    }

    /// Returns the objective: the total travel time plus the barrier term.
    pub fn objective(&self, state: &State, control: &[f64]) -> AdjointResult<f64> {
        self.check_control(control)?;
        Ok(self.total_travel_time(state) + self.barrier(state.split_ratio_sums())?)
    }

    /// Returns the objective as a function of the state vector `X` and the control `U`.
    pub fn objective_at(&self, x: &[f64], control: &[f64]) -> AdjointResult<f64> {
        check_dimension(self.layout.x_size(), x.len())?;
        let sums = self.split_ratio_sums(control)?;
        let mut total = 0.0;
        for k in 0..self.network.nb_steps() {
            for (i, _) in self.network.iter_cells() {
                if self.network.is_sink(i) {
                    continue;
                }
                for c in 0..self.layout.nb_commodities() {
                    total += x[self.layout.x_density(k, i, c)];
                }
            }
        }
        Ok(total + self.barrier(&sums)?)
    }

    /// Returns the absolute split ratios of the origins (non-compliant commodity and compliant
    /// commodities) at each time step, for the given control.
    ///
    /// The result is indexed by origin then time step; each value is a list of
    /// `(commodity, split ratio)`.
    pub fn full_control(&self, control: &[f64]) -> AdjointResult<Vec<Vec<Vec<(usize, f64)>>>> {
        self.check_control(control)?;
        let seeded = self.network.initial_split_ratios();
        Ok(self
            .network
            .iter_origins()
            .map(|(o, origin)| {
                (0..self.network.nb_steps())
                    .map(|k| {
                        std::iter::once((NON_COMPLIANT, seeded.get(o, k, NON_COMPLIANT)))
                            .chain(origin.compliant_commodities().iter().filter_map(|&c| {
                                self.layout.control_position(c).map(|position| {
                                    (c, control[self.layout.u_index(k, position)] * self.alpha)
                                })
                            }))
                            .collect()
                    })
                    .collect()
            })
            .collect())
    }
}

impl<I: ForwardIntegrator> AdjointProblem for SystemOptimalProblem<I> {
    type State = State;

    fn starting_point(&self) -> AdjointResult<Vec<f64>> {
        SystemOptimalProblem::starting_point(self)
    }

    fn forward_simulate(&self, control: &[f64]) -> AdjointResult<State> {
        SystemOptimalProblem::forward_simulate(self, control)
    }

    fn objective(&self, state: &State, control: &[f64]) -> AdjointResult<f64> {
        SystemOptimalProblem::objective(self, state, control)
    }

    fn dhdu(&self, state: &State, control: &[f64]) -> AdjointResult<SparseMatrix> {
        SystemOptimalProblem::dhdu(self, state, control)
    }

    fn dhdx(&self, state: &State, control: &[f64]) -> AdjointResult<SparseMatrix> {
        SystemOptimalProblem::dhdx(self, state, control)
    }

    fn djdx(&self, state: &State, control: &[f64]) -> AdjointResult<Vec<f64>> {
        SystemOptimalProblem::djdx(self, state, control)
    }

    fn djdu(&self, state: &State, control: &[f64]) -> AdjointResult<Vec<f64>> {
        SystemOptimalProblem::djdu(self, state, control)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{origin_index, test_networks};

    #[test]
    fn single_link_test() {
        let problem = SystemOptimalProblem::new(test_networks::single_link(5), 1.0, 0.001).unwrap();
        let control = vec![1.0; 5];
        let state = problem.forward_simulate(&control).unwrap();
        assert_eq!(state.nb_steps(), 5);
        assert_eq!(problem.total_travel_time(&state), 120.0);
        assert_eq!(state.sum_of_split_ratios(origin_index(0), 3), 1.0);
        assert_eq!(
            problem.objective(&state, &control),
            Err(AdjointError::InfeasibleSplitRatios {
                origin: 0,
                step: 0,
                sum: 1.0
            })
        );
        let control = vec![1.5; 5];
        let state = problem.forward_simulate(&control).unwrap();
        assert_eq!(problem.total_travel_time(&state), 180.0);
        let expected = 180.0 - 5.0 * 0.001 * 0.5f64.ln();
        assert!((problem.objective(&state, &control).unwrap() - expected).abs() < 1e-9);
        let x = problem.layout().flatten(problem.network(), &state);
        assert!((problem.objective_at(&x, &control).unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn control_errors_test() {
        let problem = SystemOptimalProblem::new(test_networks::single_link(5), 1.0, 0.001).unwrap();
        assert_eq!(
            problem.forward_simulate(&[1.0; 4]),
            Err(AdjointError::DimensionMismatch {
                expected: 5,
                actual: 4
            })
        );
        let problem = SystemOptimalProblem::new(test_networks::single_link(5), 0.0, 0.001).unwrap();
        assert!(matches!(
            problem.starting_point(),
            Err(AdjointError::Configuration(_))
        ));
        assert!(SystemOptimalProblem::new(test_networks::single_link(5), 1.5, 0.001).is_err());
    }

    #[test]
    fn full_control_test() {
        let problem =
            SystemOptimalProblem::new(test_networks::merge_diverge(2), 0.5, 0.001).unwrap();
        assert_eq!(problem.starting_point().unwrap(), vec![1.1; 4]);
        let control = vec![1.2, 1.4, 1.6, 1.8];
        let full = problem.full_control(&control).unwrap();
        assert_eq!(full[0][1], vec![(0, 0.5), (1, 0.8)]);
        assert_eq!(full[1][0], vec![(0, 0.5), (2, 0.7)]);
        let sums = problem.split_ratio_sums(&control).unwrap();
        assert_eq!(sums, vec![vec![1.2, 1.6], vec![1.4, 1.8]]);
    }
}
