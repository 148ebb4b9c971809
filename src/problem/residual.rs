// Copyright 2022 Lucas Javaudin
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// https://creativecommons.org/licenses/by-nc-nd/4.0/legalcode

//! Direct evaluation of the residual `H(X, U) = F(X, U) - X`.
use super::SystemOptimalProblem;
use crate::error::{check_dimension, AdjointResult};
use crate::flow_policy::{aggregate_split_ratio, PolicyInputs};
use crate::network::{CellIndex, CellRole, Commodity, NON_COMPLIANT};
use crate::simulator::ForwardIntegrator;

impl<I: ForwardIntegrator> SystemOptimalProblem<I> {
    /// Returns the number of vehicles of a commodity injected in a cell at a time step.
    fn injection(&self, step: usize, cell: CellIndex, commodity: Commodity, control: &[f64]) -> f64 {
        let CellRole::Buffer(o) = self.network.role(cell) else {
            return 0.0;
        };
        let beta = match self.layout.control_position(commodity) {
            Some(position) if self.network.commodity_origin(commodity) == Some(o) => {
                control[self.layout.u_index(step, position)] * self.alpha
            }
            _ => self.network.initial_split_ratios().get(o, step, commodity),
        };
        self.network[o].demand(step) * beta
    }

    /// Evaluates the residual of the dynamics for a state vector `X` and a control `U`.
    ///
    /// The residual is zero (up to rounding errors) for the state vector of a simulated state
    /// (see [Layout::flatten](crate::layout::Layout::flatten)).
    pub fn residual(&self, x: &[f64], control: &[f64]) -> AdjointResult<Vec<f64>> {
        let layout = &self.layout;
        let network = &self.network;
        check_dimension(layout.x_size(), x.len())?;
        check_dimension(layout.u_size(), control.len())?;
        let nc = layout.nb_commodities();
        let dt = network.time_step();
        let mut h = vec![0.0; layout.h_size()];
        for k in 0..network.nb_steps() {
            let density = |i: CellIndex, c: Commodity| x[layout.x_density(k, i, c)];
            let total_density = |i: CellIndex| (0..nc).map(|c| density(i, c)).sum::<f64>();

            // Mass conservation and flow propagation.
            for (i, cell) in network.iter_cells() {
                let dt_over_length = dt / cell.length();
                for c in 0..nc {
                    let propagated = if k == 0 {
                        network.initial_densities(i).get(c)
                    } else {
                        let f_in = if network.is_buffer(i) {
                            0.0
                        } else {
                            x[layout.x_in_flow(k - 1, i, c)]
                        };
                        let f_out = if network.is_sink(i) {
                            0.0
                        } else {
                            x[layout.x_out_flow(k - 1, i, c)]
                        };
                        x[layout.x_density(k - 1, i, c)] + dt_over_length * (f_in - f_out)
                    };
                    let value = propagated + self.injection(k, i, c, control);
                    h[layout.h_mass(k, i, c)] = value - density(i, c);
                }
                let total = total_density(i);
                h[layout.h_demand(k, i)] = cell.demand(total) - x[layout.x_demand(k, i)];
                h[layout.h_supply(k, i)] = cell.supply(total) - x[layout.x_supply(k, i)];
            }

            let mut out_flows = vec![0.0; network.nb_cells() * nc];
            let mut in_flows = vec![0.0; network.nb_cells() * nc];
            for (j, junction) in network.iter_junctions() {
                // Aggregate split ratios.
                for (a, &incoming) in junction.prev().iter().enumerate() {
                    for b in 0..junction.next().len() {
                        let beta = if junction.is_single_output() {
                            1.0
                        } else {
                            aggregate_split_ratio(
                                (0..nc).map(|c| (c, density(incoming, c))),
                                |c| network.turning_ratio(k, j, a, b, c),
                                network.turning_ratio(k, j, a, b, NON_COMPLIANT),
                            )
                        };
                        let index = layout.h_aggregate(k, j, a, b);
                        h[index] = beta - x[layout.x_aggregate(k, j, a, b)];
                    }
                }

                // Out-flows.
                let demands: Vec<f64> = junction
                    .prev()
                    .iter()
                    .map(|&i| x[layout.x_demand(k, i)])
                    .collect();
                let supplies: Vec<f64> = junction
                    .next()
                    .iter()
                    .map(|&i| x[layout.x_supply(k, i)])
                    .collect();
                let aggregates: Vec<f64> = (0..junction.prev().len())
                    .flat_map(|a| (0..junction.next().len()).map(move |b| (a, b)))
                    .map(|(a, b)| x[layout.x_aggregate(k, j, a, b)])
                    .collect();
                let totals = junction.total_flows(&PolicyInputs {
                    demands: &demands,
                    supplies: &supplies,
                    aggregate_split_ratios: &aggregates,
                });
                for (&incoming, &g) in junction.prev().iter().zip(totals.iter()) {
                    let total = total_density(incoming);
                    if total > 0.0 {
                        for c in 0..nc {
                            out_flows[incoming.index() * nc + c] =
                                g * (density(incoming, c) / total);
                        }
                    }
                }

                // In-flows.
                for (b, &outgoing) in junction.next().iter().enumerate() {
                    for (a, &incoming) in junction.prev().iter().enumerate() {
                        for c in 0..nc {
                            let beta = network.turning_ratio(k, j, a, b, c);
                            if beta != 0.0 {
                                in_flows[outgoing.index() * nc + c] +=
                                    x[layout.x_out_flow(k, incoming, c)] * beta;
                            }
                        }
                    }
                }
            }
            for (i, _) in network.iter_cells() {
                for c in 0..nc {
                    h[layout.h_out_flow(k, i, c)] =
                        out_flows[i.index() * nc + c] - x[layout.x_out_flow(k, i, c)];
                    h[layout.h_in_flow(k, i, c)] =
                        in_flows[i.index() * nc + c] - x[layout.x_in_flow(k, i, c)];
                }
            }
        }
        Ok(h)
    }
}
