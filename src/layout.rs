// Copyright 2022 Lucas Javaudin
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// https://creativecommons.org/licenses/by-nc-nd/4.0/legalcode

//! Layout of the flat state vector `X`, control vector `U` and residual vector `H`.
//!
//! `X` and `H` are made of one block per time step. Each block is organized as:
//!
//! 1. partial densities (cell-major, then commodity);
//! 2. demand and supply of each cell (interleaved);
//! 3. aggregate split ratios of each (incoming, outgoing) pair of each junction;
//! 4. out-flows (cell-major, then commodity);
//! 5. in-flows (cell-major, then commodity).
//!
//! Each residual defines exactly one variable of `X`, so `H` uses the same offsets as `X`.
//!
//! `U` has one block of `C` values per time step, one for each compliant commodity, ordered by
//! origin then by commodity.
use crate::network::{
    cell_index, junction_index, CellIndex, Commodity, JunctionIndex, Network, OriginIndex,
};
use crate::state::State;

/// Variable of the state vector (or, equivalently, row of the residual vector).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum StateEntry {
    /// Partial density of a commodity in a cell.
    Density {
        /// Time step.
        step: usize,
        /// Cell.
        cell: CellIndex,
        /// Commodity.
        commodity: Commodity,
    },
    /// Demand of a cell.
    Demand {
        /// Time step.
        step: usize,
        /// Cell.
        cell: CellIndex,
    },
    /// Supply of a cell.
    Supply {
        /// Time step.
        step: usize,
        /// Cell.
        cell: CellIndex,
    },
    /// Aggregate split ratio of an (incoming, outgoing) pair of a junction.
    AggregateSplitRatio {
        /// Time step.
        step: usize,
        /// Junction.
        junction: JunctionIndex,
        /// Position of the incoming cell.
        incoming: usize,
        /// Position of the outgoing cell.
        outgoing: usize,
    },
    /// Flow of a commodity leaving a cell.
    OutFlow {
        /// Time step.
        step: usize,
        /// Cell.
        cell: CellIndex,
        /// Commodity.
        commodity: Commodity,
    },
    /// Flow of a commodity entering a cell.
    InFlow {
        /// Time step.
        step: usize,
        /// Cell.
        cell: CellIndex,
        /// Commodity.
        commodity: Commodity,
    },
}

/// Offsets of the vectorized problem, derived from the (fixed) topology of a network.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Layout {
    nb_steps: usize,
    nb_cells: usize,
    nb_commodities: usize,
    /// Number of outgoing cells of each junction.
    nb_next: Vec<usize>,
    /// Offset of the pairs of each junction in the aggregate-split-ratio section (with the total
    /// number of pairs as last value).
    pair_offsets: Vec<usize>,
    /// Compliant commodity (with its origin) at each position of a control block.
    control_entries: Vec<(OriginIndex, Commodity)>,
    /// Position of each commodity in a control block.
    control_positions: Vec<Option<usize>>,
    density_size: usize,
    demand_supply_size: usize,
    aggregate_size: usize,
    block_size: usize,
}

impl Layout {
    /// Creates the [Layout] of a [Network].
    pub fn new(network: &Network) -> Self {
        let nb_cells = network.nb_cells();
        let nb_commodities = network.nb_commodities();
        let nb_next: Vec<usize> = network
            .iter_junctions()
            .map(|(_, j)| j.next().len())
            .collect();
        let mut pair_offsets = Vec::with_capacity(network.nb_junctions() + 1);
        let mut nb_pairs = 0;
        for (_, junction) in network.iter_junctions() {
            pair_offsets.push(nb_pairs);
            nb_pairs += junction.nb_pairs();
        }
        pair_offsets.push(nb_pairs);
        let control_entries: Vec<_> = network
            .iter_origins()
            .flat_map(|(o, origin)| origin.compliant_commodities().iter().map(move |&c| (o, c)))
            .collect();
        let mut control_positions = vec![None; nb_commodities];
        for (position, &(_, c)) in control_entries.iter().enumerate() {
            control_positions[c] = Some(position);
        }
        let density_size = nb_cells * nb_commodities;
        let demand_supply_size = 2 * nb_cells;
        Layout {
            nb_steps: network.nb_steps(),
            nb_cells,
            nb_commodities,
            nb_next,
            pair_offsets,
            control_entries,
            control_positions,
            density_size,
            demand_supply_size,
            aggregate_size: nb_pairs,
            block_size: 3 * density_size + demand_supply_size + nb_pairs,
        }
    }

    /// Returns the number of time steps.
    pub const fn nb_steps(&self) -> usize {
        self.nb_steps
    }

    /// Returns the number of commodities (including the non-compliant commodity).
    pub const fn nb_commodities(&self) -> usize {
        self.nb_commodities
    }

    /// Returns the number of compliant commodities, i.e., the size of a control block.
    pub fn nb_controls(&self) -> usize {
        self.control_entries.len()
    }

    /// Returns the size of a block of `X` (or `H`).
    pub const fn block_size(&self) -> usize {
        self.block_size
    }

    /// Returns the size of `X`.
    pub const fn x_size(&self) -> usize {
        self.nb_steps * self.block_size
    }

    /// Returns the size of `H`.
    pub const fn h_size(&self) -> usize {
        self.x_size()
    }

    /// Returns the size of `U`.
    pub fn u_size(&self) -> usize {
        self.nb_steps * self.control_entries.len()
    }

    fn out_flow_offset(&self) -> usize {
        self.density_size + self.demand_supply_size + self.aggregate_size
    }

    fn in_flow_offset(&self) -> usize {
        self.out_flow_offset() + self.density_size
    }

    /// Index of a partial density in `X`.
    pub fn x_density(&self, step: usize, cell: CellIndex, commodity: Commodity) -> usize {
        step * self.block_size + cell.index() * self.nb_commodities + commodity
    }

    /// Index of the demand of a cell in `X`.
    pub fn x_demand(&self, step: usize, cell: CellIndex) -> usize {
        step * self.block_size + self.density_size + 2 * cell.index()
    }

    /// Index of the supply of a cell in `X`.
    pub fn x_supply(&self, step: usize, cell: CellIndex) -> usize {
        self.x_demand(step, cell) + 1
    }

    /// Index in `X` of the aggregate split ratio from the `incoming`-th incoming cell to the
    /// `outgoing`-th outgoing cell of a junction.
    pub fn x_aggregate(
        &self,
        step: usize,
        junction: JunctionIndex,
        incoming: usize,
        outgoing: usize,
    ) -> usize {
        step * self.block_size
            + self.density_size
            + self.demand_supply_size
            + self.pair_offsets[junction.index()]
            + incoming * self.nb_next[junction.index()]
            + outgoing
    }

    /// Index of an out-flow in `X`.
    pub fn x_out_flow(&self, step: usize, cell: CellIndex, commodity: Commodity) -> usize {
        step * self.block_size
            + self.out_flow_offset()
            + cell.index() * self.nb_commodities
            + commodity
    }

    /// Index of an in-flow in `X`.
    pub fn x_in_flow(&self, step: usize, cell: CellIndex, commodity: Commodity) -> usize {
        step * self.block_size
            + self.in_flow_offset()
            + cell.index() * self.nb_commodities
            + commodity
    }

    /// Index of the mass-conservation residual of a partial density in `H`.
    pub fn h_mass(&self, step: usize, cell: CellIndex, commodity: Commodity) -> usize {
        self.x_density(step, cell, commodity)
    }

    /// Index of the residual defining the demand of a cell in `H`.
    pub fn h_demand(&self, step: usize, cell: CellIndex) -> usize {
        self.x_demand(step, cell)
    }

    /// Index of the residual defining the supply of a cell in `H`.
    pub fn h_supply(&self, step: usize, cell: CellIndex) -> usize {
        self.x_supply(step, cell)
    }

    /// Index of the residual defining an aggregate split ratio in `H`.
    pub fn h_aggregate(
        &self,
        step: usize,
        junction: JunctionIndex,
        incoming: usize,
        outgoing: usize,
    ) -> usize {
        self.x_aggregate(step, junction, incoming, outgoing)
    }

    /// Index of the out-flow allocation residual in `H`.
    pub fn h_out_flow(&self, step: usize, cell: CellIndex, commodity: Commodity) -> usize {
        self.x_out_flow(step, cell, commodity)
    }

    /// Index of the in-flow allocation residual in `H`.
    pub fn h_in_flow(&self, step: usize, cell: CellIndex, commodity: Commodity) -> usize {
        self.x_in_flow(step, cell, commodity)
    }

    /// Index in `U` of the `position`-th control at a time step.
    pub fn u_index(&self, step: usize, position: usize) -> usize {
        step * self.control_entries.len() + position
    }

    /// Returns the position of a commodity in a control block (`None` for the non-compliant
    /// commodity).
    pub fn control_position(&self, commodity: Commodity) -> Option<usize> {
        self.control_positions.get(commodity).copied().flatten()
    }

    /// Returns the (origin, compliant commodity) pairs of a control block, in order.
    pub fn control_entries(&self) -> &[(OriginIndex, Commodity)] {
        &self.control_entries
    }

    /// Returns the index in `X` (or `H`) of an entry.
    pub fn index_of(&self, entry: StateEntry) -> usize {
        match entry {
            StateEntry::Density {
                step,
                cell,
                commodity,
            } => self.x_density(step, cell, commodity),
            StateEntry::Demand { step, cell } => self.x_demand(step, cell),
            StateEntry::Supply { step, cell } => self.x_supply(step, cell),
            StateEntry::AggregateSplitRatio {
                step,
                junction,
                incoming,
                outgoing,
            } => self.x_aggregate(step, junction, incoming, outgoing),
            StateEntry::OutFlow {
                step,
                cell,
                commodity,
            } => self.x_out_flow(step, cell, commodity),
            StateEntry::InFlow {
                step,
                cell,
                commodity,
            } => self.x_in_flow(step, cell, commodity),
        }
    }

    /// Returns the entry of `X` (or `H`) at a given index, or `None` if the index is out of
    /// bounds.
    pub fn locate(&self, index: usize) -> Option<StateEntry> {
        if index >= self.x_size() {
            return None;
        }
        let step = index / self.block_size;
        let mut r = index % self.block_size;
        if r < self.density_size {
            return Some(StateEntry::Density {
                step,
                cell: cell_index(r / self.nb_commodities),
                commodity: r % self.nb_commodities,
            });
        }
        r -= self.density_size;
        if r < self.demand_supply_size {
            let cell = cell_index(r / 2);
            return Some(if r % 2 == 0 {
                StateEntry::Demand { step, cell }
            } else {
                StateEntry::Supply { step, cell }
            });
        }
        r -= self.demand_supply_size;
        if r < self.aggregate_size {
            // Last junction whose first pair is not after `r` (junctions without pairs cannot
            // exist).
            let j = self.pair_offsets.partition_point(|&offset| offset <= r) - 1;
            let local = r - self.pair_offsets[j];
            return Some(StateEntry::AggregateSplitRatio {
                step,
                junction: junction_index(j),
                incoming: local / self.nb_next[j],
                outgoing: local % self.nb_next[j],
            });
        }
        r -= self.aggregate_size;
        let (cell, commodity) = (
            cell_index((r % self.density_size) / self.nb_commodities),
            r % self.nb_commodities,
        );
        Some(if r < self.density_size {
            StateEntry::OutFlow {
                step,
                cell,
                commodity,
            }
        } else {
            StateEntry::InFlow {
                step,
                cell,
                commodity,
            }
        })
    }

    /// Returns the `(step, position)` of an index of `U`, or `None` if the index is out of
    /// bounds.
    pub fn locate_control(&self, index: usize) -> Option<(usize, usize)> {
        if index >= self.u_size() {
            None
        } else {
            let n = self.control_entries.len();
            Some((index / n, index % n))
        }
    }

    /// Flattens a [State] into the state vector `X`.
    pub fn flatten(&self, network: &Network, state: &State) -> Vec<f64> {
        let mut x = vec![0.0; self.x_size()];
        for (k, profile) in state.iter_profiles().enumerate() {
            for (i, info) in profile.iter_cells().enumerate() {
                let cell = cell_index(i);
                for (c, rho) in info.partial_densities.iter() {
                    x[self.x_density(k, cell, c)] = rho;
                }
                x[self.x_demand(k, cell)] = info.demand;
                x[self.x_supply(k, cell)] = info.supply;
                for (c, f) in info.out_flows.iter() {
                    x[self.x_out_flow(k, cell, c)] = f;
                }
                for (c, f) in info.in_flows.iter() {
                    x[self.x_in_flow(k, cell, c)] = f;
                }
            }
            for (j, junction) in network.iter_junctions() {
                let info = profile.junction(j);
                for a in 0..junction.prev().len() {
                    for b in 0..junction.next().len() {
                        x[self.x_aggregate(k, j, a, b)] = info.aggregate_split_ratio(a, b);
                    }
                }
            }
        }
        x
    }
}
