// Copyright 2022 Lucas Javaudin
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// https://creativecommons.org/licenses/by-nc-nd/4.0/legalcode

//! Analytic Jacobians of the residual and of the objective.
use super::SystemOptimalProblem;
use crate::error::{check_dimension, finite, AdjointError, AdjointResult};
use crate::flow_policy::{PolicyInputs, PolicyVariable};
use crate::simulator::ForwardIntegrator;
use crate::sparse::{SparseMatrix, TripletMatrix};
use crate::state::State;

/// Writes a checked value in a [TripletMatrix].
fn set_checked(
    matrix: &mut TripletMatrix,
    row: usize,
    col: usize,
    what: &'static str,
    value: f64,
) -> AdjointResult<()> {
    matrix.set(row, col, finite(what, value)?);
    Ok(())
}

impl<I: ForwardIntegrator> SystemOptimalProblem<I> {
    fn check_state(&self, state: &State, control: &[f64]) -> AdjointResult<()> {
        check_dimension(self.network.nb_steps(), state.nb_steps())?;
        check_dimension(self.layout.u_size(), control.len())
    }

    /// Returns the Jacobian of the residual with respect to the control, `dH/dU`.
    ///
    /// The control only appears in the injection of the compliant commodities in the buffer cells
    /// of the origins: `d rho(k, buffer, c) / d U(k, c) = demand(k) * alpha`.
    pub fn dhdu(&self, state: &State, control: &[f64]) -> AdjointResult<SparseMatrix> {
        self.check_state(state, control)?;
        let layout = &self.layout;
        let mut matrix = TripletMatrix::new(layout.h_size(), layout.u_size());
        for (position, &(o, c)) in layout.control_entries().iter().enumerate() {
            let origin = &self.network[o];
            for k in 0..self.network.nb_steps() {
                set_checked(
                    &mut matrix,
                    layout.h_mass(k, origin.buffer(), c),
                    layout.u_index(k, position),
                    "dH/dU",
                    origin.demand(k) * self.alpha,
                )?;
            }
        }
        Ok(matrix.to_sparse())
    }

    /// Returns the Jacobian of the residual with respect to the state, `dH/dX`.
    ///
    /// The matrix is lower triangular: the variables of step `k` depend on the variables of step
    /// `k - 1` and on the variables defined before them in block `k`. Its diagonal is `-1`.
    ///
    /// The derivatives with respect to the partial densities of an empty cell are not defined;
    /// no entry is written for them.
    pub fn dhdx(&self, state: &State, control: &[f64]) -> AdjointResult<SparseMatrix> {
        self.check_state(state, control)?;
        let layout = &self.layout;
        let network = &self.network;
        let nc = layout.nb_commodities();
        let dt = network.time_step();
        let mut matrix = TripletMatrix::new(layout.h_size(), layout.x_size());

        // Mass conservation.
        for k in 1..network.nb_steps() {
            for (i, cell) in network.iter_cells() {
                let dt_over_length = finite("dt / length", dt / cell.length())?;
                for c in 0..nc {
                    let row = layout.h_mass(k, i, c);
                    matrix.set(row, layout.x_density(k - 1, i, c), 1.0);
                    matrix.set(row, layout.x_out_flow(k - 1, i, c), -dt_over_length);
                    matrix.set(row, layout.x_in_flow(k - 1, i, c), dt_over_length);
                }
            }
            // Origin buffers have no in-flow and destination sinks have no out-flow.
            for (_, origin) in network.iter_origins() {
                for c in 0..nc {
                    let row = layout.h_mass(k, origin.buffer(), c);
                    matrix.set(row, layout.x_in_flow(k - 1, origin.buffer(), c), 0.0);
                }
            }
            for (_, destination) in network.iter_destinations() {
                for c in 0..nc {
                    let row = layout.h_mass(k, destination.sink(), c);
                    matrix.set(row, layout.x_out_flow(k - 1, destination.sink(), c), 0.0);
                }
            }
        }

        for k in 0..network.nb_steps() {
            let profile = state.profile(k);

            // Flow propagation: demand and supply as functions of the total density.
            for (i, cell) in network.iter_cells() {
                let total = profile.cell(i).total_density;
                let demand_derivative = finite("demand derivative", cell.demand_derivative(total))?;
                let supply_derivative = finite("supply derivative", cell.supply_derivative(total))?;
                for c in 0..nc {
                    let col = layout.x_density(k, i, c);
                    matrix.set(layout.h_demand(k, i), col, demand_derivative);
                    matrix.set(layout.h_supply(k, i), col, supply_derivative);
                }
            }

            for (j, junction) in network.iter_junctions() {
                let junction_info = profile.junction(j);

                // Aggregate split ratios: d beta / d rho_c = (beta_c - beta) / rho.
                if !junction.is_single_output() {
                    for (a, &incoming) in junction.prev().iter().enumerate() {
                        let total = profile.cell(incoming).total_density;
                        if total <= 0.0 {
                            continue;
                        }
                        for b in 0..junction.next().len() {
                            let beta = junction_info.aggregate_split_ratio(a, b);
                            let row = layout.h_aggregate(k, j, a, b);
                            for c in 0..nc {
                                let beta_c = network.turning_ratio(k, j, a, b, c);
                                set_checked(
                                    &mut matrix,
                                    row,
                                    layout.x_density(k, incoming, c),
                                    "aggregate split ratio derivative",
                                    (beta_c - beta) / total,
                                )?;
                            }
                        }
                    }
                }

                // Out-flows: f_out(c) = g * rho_c / rho.
                let demands: Vec<f64> = junction
                    .prev()
                    .iter()
                    .map(|&i| profile.cell(i).demand)
                    .collect();
                let supplies: Vec<f64> = junction
                    .next()
                    .iter()
                    .map(|&i| profile.cell(i).supply)
                    .collect();
                let inputs = PolicyInputs {
                    demands: &demands,
                    supplies: &supplies,
                    aggregate_split_ratios: junction_info.aggregate_split_ratios(),
                };
                let totals = junction.total_flows(&inputs);
                let gradients = junction.total_flow_gradients(&inputs);
                for (a, &incoming) in junction.prev().iter().enumerate() {
                    let info = profile.cell(incoming);
                    let total = info.total_density;
                    if total <= 0.0 {
                        continue;
                    }
                    let g = totals[a];
                    for c in 0..nc {
                        let row = layout.h_out_flow(k, incoming, c);
                        let rho_c = info.partial_densities.get(c);
                        for c2 in 0..nc {
                            let numerator = if c == c2 { total - rho_c } else { -rho_c };
                            set_checked(
                                &mut matrix,
                                row,
                                layout.x_density(k, incoming, c2),
                                "out-flow density derivative",
                                g * numerator / (total * total),
                            )?;
                        }
                        let share = rho_c / total;
                        if share == 0.0 {
                            continue;
                        }
                        for &(variable, coefficient) in gradients[a].iter() {
                            let col = match variable {
                                PolicyVariable::Demand(a2) => {
                                    layout.x_demand(k, junction.prev()[a2])
                                }
                                PolicyVariable::Supply(b) => layout.x_supply(k, junction.next()[b]),
                                PolicyVariable::AggregateSplitRatio(a2, b) => {
                                    layout.x_aggregate(k, j, a2, b)
                                }
                            };
                            set_checked(
                                &mut matrix,
                                row,
                                col,
                                "out-flow policy derivative",
                                share * coefficient,
                            )?;
                        }
                    }
                }

                // In-flows: f_in(out, c) = sum_in beta_c(in, out) * f_out(in, c).
                for (b, &outgoing) in junction.next().iter().enumerate() {
                    for (a, &incoming) in junction.prev().iter().enumerate() {
                        for c in 0..nc {
                            set_checked(
                                &mut matrix,
                                layout.h_in_flow(k, outgoing, c),
                                layout.x_out_flow(k, incoming, c),
                                "in-flow derivative",
                                network.turning_ratio(k, j, a, b, c),
                            )?;
                        }
                    }
                }
            }
        }

        for index in 0..layout.h_size() {
            matrix.set(index, index, -1.0);
        }
        Ok(matrix.to_sparse())
    }

    /// Returns the gradient of the objective with respect to the state, `dJ/dX`.
    ///
    /// The objective is the sum of the partial densities of all the cells but the destination
    /// sinks, so the gradient is 1 for these densities and 0 elsewhere.
    pub fn djdx(&self, state: &State, control: &[f64]) -> AdjointResult<Vec<f64>> {
        self.check_state(state, control)?;
        let layout = &self.layout;
        let mut gradient = vec![0.0; layout.x_size()];
        for k in 0..self.network.nb_steps() {
            for (i, _) in self.network.iter_cells() {
                if self.network.is_sink(i) {
                    continue;
                }
                for c in 0..layout.nb_commodities() {
                    gradient[layout.x_density(k, i, c)] = 1.0;
                }
            }
        }
        Ok(gradient)
    }

    /// Returns the gradient of the objective with respect to the control, `dJ/dU`.
    ///
    /// Only the barrier term depends on the control: the derivative with respect to a control of
    /// origin `o` at step `k` is `eps / (1 - S(o, k))` when the demand of the origin is not zero.
    pub fn djdu(&self, state: &State, control: &[f64]) -> AdjointResult<Vec<f64>> {
        self.check_state(state, control)?;
        let layout = &self.layout;
        let mut gradient = vec![0.0; layout.u_size()];
        for (position, &(o, _)) in layout.control_entries().iter().enumerate() {
            let origin = &self.network[o];
            for k in 0..self.network.nb_steps() {
                if origin.demand(k) == 0.0 {
                    continue;
                }
                let sum = state.sum_of_split_ratios(o, k);
                if !(sum > 1.0) {
                    return Err(AdjointError::InfeasibleSplitRatios {
                        origin: o.index(),
                        step: k,
                        sum,
                    });
                }
                gradient[layout.u_index(k, position)] =
                    finite("dJ/dU", self.barrier_weight / (1.0 - sum))?;
            }
        }
        Ok(gradient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{cell_index, junction_index, test_networks};

    #[test]
    fn degenerate_density_test() {
        // The cells of the link are empty at the first step.
        let problem = SystemOptimalProblem::new(test_networks::single_link(3), 1.0, 0.001).unwrap();
        let control = vec![1.5; 3];
        let state = problem.forward_simulate(&control).unwrap();
        let c1 = cell_index(0);
        assert_eq!(state.profile(0).cell(c1).total_density, 0.0);
        let dhdx = problem.dhdx(&state, &control).unwrap();
        let layout = problem.layout();
        let rows: Vec<usize> = (0..2)
            .map(|c| layout.h_out_flow(0, c1, c))
            .chain(std::iter::once(layout.h_aggregate(0, junction_index(0), 0, 0)))
            .collect();
        for (row, col, value) in dhdx.iter() {
            if rows.contains(&row) {
                assert_eq!((row, col, value), (row, row, -1.0));
            }
        }
        // The cell is not empty at the next step and the link is demand-bound.
        assert_eq!(dhdx.get(layout.h_out_flow(1, c1, 1), layout.x_demand(1, c1)), 1.0);
    }

    #[test]
    fn dhdx_structure_test() {
        let problem =
            SystemOptimalProblem::new(test_networks::merge_diverge(3), 0.5, 0.001).unwrap();
        let control = vec![1.2; problem.layout().u_size()];
        let state = problem.forward_simulate(&control).unwrap();
        let dhdx = problem.dhdx(&state, &control).unwrap();
        let layout = problem.layout();
        for (row, col, _) in dhdx.iter() {
            assert!(col <= row, "Entry above the diagonal at ({row}, {col})");
        }
        for index in 0..layout.h_size() {
            assert_eq!(dhdx.get(index, index), -1.0);
        }
        // No in-flow term for the buffers and no out-flow term for the sinks.
        let network = problem.network();
        for (_, origin) in network.iter_origins() {
            let b = origin.buffer();
            assert_eq!(dhdx.get(layout.h_mass(1, b, 0), layout.x_in_flow(0, b, 0)), 0.0);
            assert_eq!(dhdx.get(layout.h_mass(1, b, 0), layout.x_out_flow(0, b, 0)), -1.0);
        }
        for (_, destination) in network.iter_destinations() {
            let s = destination.sink();
            assert_eq!(dhdx.get(layout.h_mass(1, s, 0), layout.x_out_flow(0, s, 0)), 0.0);
            assert_eq!(dhdx.get(layout.h_mass(1, s, 0), layout.x_in_flow(0, s, 0)), 1.0);
        }
    }

    #[test]
    fn dhdu_test() {
        let problem =
            SystemOptimalProblem::new(test_networks::merge_diverge(2), 0.5, 0.001).unwrap();
        let control = vec![1.2; 4];
        let state = problem.forward_simulate(&control).unwrap();
        let dhdu = problem.dhdu(&state, &control).unwrap();
        assert_eq!(dhdu.nnz(), 4);
        let layout = problem.layout();
        let network = problem.network();
        let o2 = &network[crate::network::origin_index(1)];
        assert_eq!(dhdu.get(layout.h_mass(1, o2.buffer(), 2), layout.u_index(1, 1)), 0.25);
    }

    #[test]
    fn djdu_test() {
        let problem = SystemOptimalProblem::new(test_networks::single_link(2), 1.0, 0.001).unwrap();
        let state = problem.forward_simulate(&[1.5, 3.0]).unwrap();
        let djdu = problem.djdu(&state, &[1.5, 3.0]).unwrap();
        assert!((djdu[0] + 0.002).abs() < 1e-15);
        assert!((djdu[1] + 0.0005).abs() < 1e-15);
        let state = problem.forward_simulate(&[1.5, 0.5]).unwrap();
        assert_eq!(
            problem.djdu(&state, &[1.5, 0.5]),
            Err(AdjointError::InfeasibleSplitRatios {
                origin: 0,
                step: 1,
                sum: 0.5
            })
        );
        let djdx = problem.djdx(&state, &[1.5, 0.5]).unwrap();
        let layout = problem.layout();
        assert_eq!(djdx[layout.x_density(1, cell_index(0), 1)], 1.0);
        assert_eq!(djdx[layout.x_density(1, cell_index(3), 1)], 0.0);
        assert_eq!(djdx[layout.x_demand(1, cell_index(0))], 0.0);
        assert_eq!(djdx.iter().sum::<f64>(), 2.0 * 3.0 * 2.0);
    }
}
