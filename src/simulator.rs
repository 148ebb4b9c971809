// Copyright 2022 Lucas Javaudin
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// https://creativecommons.org/licenses/by-nc-nd/4.0/legalcode

//! Forward integration of the cell-transmission model.
use log::trace;

use crate::error::{finite, AdjointError, AdjointResult};
use crate::flow_policy::{aggregate_split_ratio, PolicyInputs};
use crate::network::{cell_index, CellRole, Network, NON_COMPLIANT};
use crate::split_ratios::{CommodityMap, OriginSplitRatios};
use crate::state::{CellInfo, JunctionInfo, Profile};

/// Default tolerance below which negative densities are rounded to zero.
const DENSITY_TOLERANCE: f64 = 1e-9;

/// An integrator computing the profiles of a network over the simulation horizon, given the split
/// ratios of the origins.
pub trait ForwardIntegrator: Send + Sync {
    /// Returns one [Profile] per time step, in order.
    fn run(
        &self,
        network: &Network,
        origin_split_ratios: &OriginSplitRatios,
    ) -> AdjointResult<Vec<Profile>>;
}

/// Multi-commodity cell-transmission model.
///
/// At each time step `k`, the partial densities are
/// `rho(k) = rho(k-1) + dt / L * (f_in(k-1) - f_out(k-1)) + inj(k)`, where the injection is the
/// demand of the origins multiplied by their split ratios (for the buffer cells only). The flows
/// of step `k` are then computed from the densities of step `k` with the flow policy of the
/// junctions.
#[derive(Clone, Debug)]
pub struct CellTransmissionModel {
    density_tolerance: f64,
}

impl Default for CellTransmissionModel {
    fn default() -> Self {
        CellTransmissionModel {
            density_tolerance: DENSITY_TOLERANCE,
        }
    }
}

impl CellTransmissionModel {
    /// Creates a [CellTransmissionModel] rounding to zero the negative densities larger than
    /// `-density_tolerance`.
    pub const fn with_tolerance(density_tolerance: f64) -> Self {
        CellTransmissionModel { density_tolerance }
    }

    /// Returns the partial densities at step `k > 0` (before injection), given the profile at
    /// step `k - 1`.
    fn propagate(&self, network: &Network, previous: &Profile) -> Vec<CommodityMap> {
        let dt = network.time_step();
        network
            .iter_cells()
            .map(|(i, cell)| {
                let info = previous.cell(i);
                let dt_over_length = dt / cell.length();
                let role = network.role(i);
                let mut densities = info.partial_densities.clone();
                let mut commodities: Vec<_> = info
                    .in_flows
                    .commodities()
                    .chain(info.out_flows.commodities())
                    .collect();
                commodities.sort_unstable();
                commodities.dedup();
                for c in commodities {
                    let f_in = if matches!(role, CellRole::Buffer(_)) {
                        0.0
                    } else {
                        info.in_flows.get(c)
                    };
                    let f_out = if matches!(role, CellRole::Sink(_)) {
                        0.0
                    } else {
                        info.out_flows.get(c)
                    };
                    densities.set(
                        c,
                        info.partial_densities.get(c) + dt_over_length * (f_in - f_out),
                    );
                }
                densities
            })
            .collect()
    }

    /// Adds the demand of the origins to their buffer cell.
    fn inject(
        &self,
        network: &Network,
        origin_split_ratios: &OriginSplitRatios,
        step: usize,
        densities: &mut [CommodityMap],
    ) {
        for (o, origin) in network.iter_origins() {
            let demand = origin.demand(step);
            let buffer = &mut densities[origin.buffer().index()];
            for (c, beta) in origin_split_ratios.at(o, step).iter() {
                buffer.add(c, demand * beta);
            }
        }
    }

    /// Checks the partial densities and rounds to zero the small negative values.
    fn check_densities(
        &self,
        network: &Network,
        densities: &mut [CommodityMap],
    ) -> AdjointResult<()> {
        for ((_, cell), cell_densities) in network.iter_cells().zip(densities.iter_mut()) {
            let negatives: Vec<_> = cell_densities
                .iter()
                .filter(|&(_, rho)| !(rho > 0.0))
                .collect();
            for (c, rho) in negatives {
                if rho.is_nan() || rho < -self.density_tolerance {
                    return Err(AdjointError::NumericalInvalidity {
                        what: "partial density",
                        value: rho,
                    });
                }
                cell_densities.set(c, 0.0);
            }
            let total = finite("total density", cell_densities.sum())?;
            if total > cell.jam_density() * (1.0 + self.density_tolerance) {
                return Err(AdjointError::NumericalInvalidity {
                    what: "total density above jam density",
                    value: total,
                });
            }
        }
        Ok(())
    }

    /// Computes the profile of a time step from the partial densities of the cells.
    fn evaluate(
        &self,
        network: &Network,
        step: usize,
        densities: Vec<CommodityMap>,
    ) -> AdjointResult<Profile> {
        let mut cells: Vec<CellInfo> = network
            .iter_cells()
            .zip(densities)
            .map(|((_, cell), d)| CellInfo::new(cell, d))
            .collect();
        let mut junctions = Vec::with_capacity(network.nb_junctions());
        for (j, junction) in network.iter_junctions() {
            let nb_next = junction.next().len();
            let mut aggregates = Vec::with_capacity(junction.nb_pairs());
            for (a, &incoming) in junction.prev().iter().enumerate() {
                for b in 0..nb_next {
                    let beta = if junction.is_single_output() {
                        1.0
                    } else {
                        aggregate_split_ratio(
                            cells[incoming.index()].partial_densities.iter(),
                            |c| network.turning_ratio(step, j, a, b, c),
                            network.turning_ratio(step, j, a, b, NON_COMPLIANT),
                        )
                    };
                    aggregates.push(beta);
                }
            }
            let demands: Vec<f64> = junction
                .prev()
                .iter()
                .map(|i| cells[i.index()].demand)
                .collect();
            let supplies: Vec<f64> = junction
                .next()
                .iter()
                .map(|i| cells[i.index()].supply)
                .collect();
            let totals = junction.total_flows(&PolicyInputs {
                demands: &demands,
                supplies: &supplies,
                aggregate_split_ratios: &aggregates,
            });
            for &g in totals.iter() {
                if !(finite("total flow", g)? >= 0.0) {
                    return Err(AdjointError::NumericalInvalidity {
                        what: "negative total flow",
                        value: g,
                    });
                }
            }
            let allocation = {
                let incoming: Vec<&CellInfo> =
                    junction.prev().iter().map(|i| &cells[i.index()]).collect();
                junction.allocate(&incoming, &totals, |a, b, c| {
                    network.turning_ratio(step, j, a, b, c)
                })
            };
            for (&incoming, out_flows) in junction.prev().iter().zip(allocation.out_flows) {
                cells[incoming.index()].out_flows = out_flows;
            }
            for (a, _) in junction.prev().iter().enumerate() {
                for (b, &outgoing) in junction.next().iter().enumerate() {
                    for (c, flow) in allocation.pair_flows[a * nb_next + b].iter() {
                        cells[outgoing.index()].in_flows.add(c, flow);
                    }
                }
            }
            junctions.push(JunctionInfo::new(
                nb_next,
                aggregates,
                allocation.pair_flows,
            ));
        }
        Ok(Profile::new(cells, junctions))
    }
}

impl ForwardIntegrator for CellTransmissionModel {
    fn run(
        &self,
        network: &Network,
        origin_split_ratios: &OriginSplitRatios,
    ) -> AdjointResult<Vec<Profile>> {
        let mut profiles: Vec<Profile> = Vec::with_capacity(network.nb_steps());
        for k in 0..network.nb_steps() {
            let mut densities = match profiles.last() {
                Some(previous) => self.propagate(network, previous),
                None => (0..network.nb_cells())
                    .map(|i| network.initial_densities(cell_index(i)).clone())
                    .collect(),
            };
            self.inject(network, origin_split_ratios, k, &mut densities);
            self.check_densities(network, &mut densities)?;
            let profile = self.evaluate(network, k, densities)?;
            trace!(
                "Step {k}: {} vehicles in the network",
                profile.total_density()
            );
            profiles.push(profile);
        }
        Ok(profiles)
    }
}
