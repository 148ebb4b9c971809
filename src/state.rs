// Copyright 2022 Lucas Javaudin
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// https://creativecommons.org/licenses/by-nc-nd/4.0/legalcode

//! Simulated state of the network: one [Profile] per time step.
use crate::network::{Cell, CellIndex, JunctionIndex, OriginIndex};
use crate::split_ratios::CommodityMap;

/// State of a cell at a time step.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CellInfo {
    /// Density of each commodity in the cell.
    pub partial_densities: CommodityMap,
    /// Sum of the partial densities.
    pub total_density: f64,
    /// Demand of the cell at the total density.
    pub demand: f64,
    /// Supply of the cell at the total density.
    pub supply: f64,
    /// Flow of each commodity leaving the cell during the time step.
    pub out_flows: CommodityMap,
    /// Flow of each commodity entering the cell during the time step.
    pub in_flows: CommodityMap,
}

impl CellInfo {
    /// Creates a [CellInfo] from the partial densities of a cell, with no flow.
    pub fn new(cell: &Cell, partial_densities: CommodityMap) -> Self {
        let total_density = partial_densities.sum();
        CellInfo {
            demand: cell.demand(total_density),
            supply: cell.supply(total_density),
            partial_densities,
            total_density,
            out_flows: CommodityMap::new(),
            in_flows: CommodityMap::new(),
        }
    }
}

/// State of a junction at a time step.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct JunctionInfo {
    nb_next: usize,
    /// Aggregate split ratio of each (incoming, outgoing) pair, at position
    /// `incoming * nb_next + outgoing`.
    aggregate_split_ratios: Vec<f64>,
    /// Flow of each commodity on each (incoming, outgoing) pair.
    flows: Vec<CommodityMap>,
}

impl JunctionInfo {
    /// Creates a [JunctionInfo] for a junction with `nb_next` outgoing cells.
    pub fn new(nb_next: usize, aggregate_split_ratios: Vec<f64>, flows: Vec<CommodityMap>) -> Self {
        debug_assert_eq!(aggregate_split_ratios.len(), flows.len());
        JunctionInfo {
            nb_next,
            aggregate_split_ratios,
            flows,
        }
    }

    /// Returns the aggregate split ratio from the `incoming`-th incoming cell to the
    /// `outgoing`-th outgoing cell.
    pub fn aggregate_split_ratio(&self, incoming: usize, outgoing: usize) -> f64 {
        self.aggregate_split_ratios[incoming * self.nb_next + outgoing]
    }

    /// Returns all the aggregate split ratios, by incoming cell then outgoing cell.
    pub fn aggregate_split_ratios(&self) -> &[f64] {
        &self.aggregate_split_ratios
    }

    /// Returns the per-commodity flows from the `incoming`-th incoming cell to the `outgoing`-th
    /// outgoing cell.
    pub fn flows(&self, incoming: usize, outgoing: usize) -> &CommodityMap {
        &self.flows[incoming * self.nb_next + outgoing]
    }
}

/// State of the network at a time step.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Profile {
    cells: Vec<CellInfo>,
    junctions: Vec<JunctionInfo>,
}

impl Profile {
    /// Creates a new [Profile].
    pub fn new(cells: Vec<CellInfo>, junctions: Vec<JunctionInfo>) -> Self {
        Profile { cells, junctions }
    }

    /// Returns the state of a cell.
    pub fn cell(&self, cell: CellIndex) -> &CellInfo {
        &self.cells[cell.index()]
    }

    /// Returns the state of a junction.
    pub fn junction(&self, junction: JunctionIndex) -> &JunctionInfo {
        &self.junctions[junction.index()]
    }

    /// Iterates over the states of the cells.
    pub fn iter_cells(&self) -> impl Iterator<Item = &CellInfo> {
        self.cells.iter()
    }

    /// Returns the sum of the total densities of all cells.
    pub fn total_density(&self) -> f64 {
        self.cells.iter().map(|c| c.total_density).sum()
    }
}

/// Result of a forward simulation.
///
/// A state is never modified once created.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct State {
    profiles: Vec<Profile>,
    sum_of_split_ratios: Vec<Vec<f64>>,
}

impl State {
    /// Creates a new [State] from the simulated profiles and the sum of the (unscaled) compliant
    /// split ratios of each origin at each time step.
    pub fn new(profiles: Vec<Profile>, sum_of_split_ratios: Vec<Vec<f64>>) -> Self {
        State {
            profiles,
            sum_of_split_ratios,
        }
    }

    /// Returns the number of time steps.
    pub fn nb_steps(&self) -> usize {
        self.profiles.len()
    }

    /// Returns the profile of a time step.
    pub fn profile(&self, step: usize) -> &Profile {
        &self.profiles[step]
    }

    /// Iterates over the profiles.
    pub fn iter_profiles(&self) -> impl Iterator<Item = &Profile> {
        self.profiles.iter()
    }

    /// Returns the sum of the compliant split ratios of an origin at a time step.
    pub fn sum_of_split_ratios(&self, origin: OriginIndex, step: usize) -> f64 {
        self.sum_of_split_ratios[origin.index()][step]
    }

    /// Returns the sums of the compliant split ratios, by origin then time step.
    pub fn split_ratio_sums(&self) -> &[Vec<f64>] {
        &self.sum_of_split_ratios
    }
}
