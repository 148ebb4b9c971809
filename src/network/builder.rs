// Copyright 2022 Lucas Javaudin
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// https://creativecommons.org/licenses/by-nc-nd/4.0/legalcode

//! Incremental construction of a [Network].
//!
//! ```
//! use so_dta::network::{Cell, NetworkBuilder};
//!
//! let mut builder = NetworkBuilder::new(1.0, 5);
//! let c1 = builder.add_cell(Cell::new(1.0, 1.0, 1.0, 100.0, 20.0).unwrap());
//! let c2 = builder.add_cell(Cell::new(1.0, 1.0, 1.0, 100.0, 20.0).unwrap());
//! builder.add_junction(vec![c1], vec![c2], None).unwrap();
//! let origin = builder
//!     .add_origin(vec![c1], Cell::buffer(1.0, 1.0, 20.0).unwrap(), vec![10.0; 5])
//!     .unwrap();
//! builder.add_destination(vec![c2], None).unwrap();
//! let commodity = builder.add_path(origin, vec![c1, c2]);
//! assert_eq!(commodity, 1);
//! let network = builder.build().unwrap();
//! assert_eq!(network.nb_cells(), 4);
//! ```
use log::warn;

use super::{
    cell_index, destination_index, junction_index, origin_index, Cell, CellIndex, CellRole,
    Commodity, Destination, DestinationIndex, Junction, JunctionIndex, Network, Origin,
    OriginIndex, NON_COMPLIANT,
};
use crate::error::{AdjointError, AdjointResult};
use crate::split_ratios::{CommodityMap, JunctionSplitRatios, OriginSplitRatios};

/// Tolerance used to check that the turning ratios of a diverge sum to 1.
const SUM_TOLERANCE: f64 = 1e-6;

/// A compliant path, stored until the network is built.
#[derive(Clone, Debug)]
struct PathDefinition {
    origin: OriginIndex,
    cells: Vec<CellIndex>,
}

/// A split ratio set before the network is built (`None` step means all steps).
#[derive(Clone, Debug)]
struct SplitRatioDefinition<K> {
    key: K,
    step: Option<usize>,
    commodity: Commodity,
    value: f64,
}

/// Builder of a [Network].
///
/// Cells, junctions, origins and destinations are allocated in arenas and identified by the
/// indices returned by the `add_*` methods. The topology is validated by
/// [NetworkBuilder::build].
#[derive(Clone, Debug)]
pub struct NetworkBuilder {
    time_step: f64,
    nb_steps: usize,
    cells: Vec<Cell>,
    roles: Vec<CellRole>,
    junctions: Vec<Junction>,
    origins: Vec<Origin>,
    destinations: Vec<Destination>,
    paths: Vec<PathDefinition>,
    junction_ratios: Vec<SplitRatioDefinition<(JunctionIndex, CellIndex, CellIndex)>>,
    origin_ratios: Vec<SplitRatioDefinition<OriginIndex>>,
    initial_densities: Vec<CommodityMap>,
}

impl NetworkBuilder {
    /// Creates an empty builder for a simulation with `nb_steps` time steps of duration
    /// `time_step`.
    pub fn new(time_step: f64, nb_steps: usize) -> Self {
        NetworkBuilder {
            time_step,
            nb_steps,
            cells: Vec::new(),
            roles: Vec::new(),
            junctions: Vec::new(),
            origins: Vec::new(),
            destinations: Vec::new(),
            paths: Vec::new(),
            junction_ratios: Vec::new(),
            origin_ratios: Vec::new(),
            initial_densities: Vec::new(),
        }
    }

    /// Returns the number of time steps.
    pub const fn nb_steps(&self) -> usize {
        self.nb_steps
    }

    /// Adds a road cell and returns its index.
    pub fn add_cell(&mut self, cell: Cell) -> CellIndex {
        self.push_cell(cell, CellRole::Road)
    }

    fn push_cell(&mut self, cell: Cell, role: CellRole) -> CellIndex {
        let index = cell_index(self.cells.len());
        self.cells.push(cell);
        self.roles.push(role);
        self.initial_densities.push(CommodityMap::new());
        index
    }

    fn check_cell(&self, cell: CellIndex) -> AdjointResult<()> {
        if cell.index() < self.cells.len() {
            Ok(())
        } else {
            Err(AdjointError::Configuration(format!(
                "Unknown cell {}",
                cell.index()
            )))
        }
    }

    /// Adds a junction between the incoming cells `prev` and the outgoing cells `next` and
    /// returns its index.
    ///
    /// Priorities must be given for merge junctions (two incoming cells).
    pub fn add_junction(
        &mut self,
        prev: Vec<CellIndex>,
        next: Vec<CellIndex>,
        priorities: Option<[f64; 2]>,
    ) -> AdjointResult<JunctionIndex> {
        for &cell in prev.iter().chain(next.iter()) {
            self.check_cell(cell)?;
        }
        let junction = Junction::new(prev, next, priorities)?;
        let index = junction_index(self.junctions.len());
        self.junctions.push(junction);
        Ok(index)
    }

    /// Adds an origin injecting the given demand (one value per time step) into a buffer cell
    /// which feeds the `next` cells.
    ///
    /// The buffer cell and the junction between the buffer and the `next` cells are created.
    pub fn add_origin(
        &mut self,
        next: Vec<CellIndex>,
        buffer: Cell,
        demands: Vec<f64>,
    ) -> AdjointResult<OriginIndex> {
        if demands.len() != self.nb_steps {
            return Err(AdjointError::Configuration(format!(
                "The demand of an origin must have {} values, got {}",
                self.nb_steps,
                demands.len()
            )));
        }
        if let Some(d) = demands.iter().find(|d| !(d.is_finite() && **d >= 0.0)) {
            return Err(AdjointError::Configuration(format!(
                "The demand of an origin must be non-negative and finite (got {d})"
            )));
        }
        for &cell in next.iter() {
            self.check_cell(cell)?;
        }
        let index = origin_index(self.origins.len());
        let junction = Junction::new(vec![cell_index(self.cells.len())], next, None)?;
        let buffer_cell = self.push_cell(buffer, CellRole::Buffer(index));
        let junction_id = junction_index(self.junctions.len());
        self.junctions.push(junction);
        self.origins.push(Origin {
            buffer: buffer_cell,
            junction: junction_id,
            demands,
            compliant_commodities: Vec::new(),
        });
        Ok(index)
    }

    /// Adds a destination where the vehicles of the `prev` cells exit the network.
    ///
    /// A sink cell with the length of the first `prev` cell and a junction between the `prev`
    /// cells and the sink are created.
    pub fn add_destination(
        &mut self,
        prev: Vec<CellIndex>,
        priorities: Option<[f64; 2]>,
    ) -> AdjointResult<DestinationIndex> {
        let length = match prev.first() {
            Some(&cell) => {
                self.check_cell(cell)?;
                self.cells[cell.index()].length()
            }
            None => {
                return Err(AdjointError::Configuration(
                    "A destination requires at least one incoming cell".to_owned(),
                ))
            }
        };
        for &cell in prev.iter() {
            self.check_cell(cell)?;
        }
        let index = destination_index(self.destinations.len());
        let sink_cell = Cell::sink(length)?;
        let junction = Junction::new(prev, vec![cell_index(self.cells.len())], priorities)?;
        let sink = self.push_cell(sink_cell, CellRole::Sink(index));
        let junction_id = junction_index(self.junctions.len());
        self.junctions.push(junction);
        self.destinations.push(Destination {
            sink,
            junction: junction_id,
        });
        Ok(index)
    }

    /// Returns the buffer cell and the junction of an origin.
    pub fn origin_entry(&self, origin: OriginIndex) -> Option<(CellIndex, JunctionIndex)> {
        self.origins
            .get(origin.index())
            .map(|o| (o.buffer, o.junction))
    }

    /// Returns the junction emptying into the sink of a destination.
    pub fn destination_junction(&self, destination: DestinationIndex) -> Option<JunctionIndex> {
        self.destinations
            .get(destination.index())
            .map(|d| d.junction)
    }

    /// Adds a compliant path from an origin and returns the new compliant commodity.
    ///
    /// The path is the sequence of road cells traveled after the buffer of the origin, the last
    /// cell being connected to the sink of a destination. The path is validated when the network
    /// is built.
    pub fn add_path(&mut self, origin: OriginIndex, cells: Vec<CellIndex>) -> Commodity {
        self.paths.push(PathDefinition { origin, cells });
        self.paths.len()
    }

    /// Sets the turning ratio of a commodity at a junction, for all time steps.
    pub fn set_split_ratio(
        &mut self,
        junction: JunctionIndex,
        incoming: CellIndex,
        outgoing: CellIndex,
        commodity: Commodity,
        value: f64,
    ) {
        self.junction_ratios.push(SplitRatioDefinition {
            key: (junction, incoming, outgoing),
            step: None,
            commodity,
            value,
        });
    }

    /// Sets the turning ratio of a commodity at a junction, for a single time step.
    pub fn set_split_ratio_at(
        &mut self,
        step: usize,
        junction: JunctionIndex,
        incoming: CellIndex,
        outgoing: CellIndex,
        commodity: Commodity,
        value: f64,
    ) {
        self.junction_ratios.push(SplitRatioDefinition {
            key: (junction, incoming, outgoing),
            step: Some(step),
            commodity,
            value,
        });
    }

    /// Sets the split ratio of a commodity at an origin, for all time steps.
    pub fn set_origin_split_ratio(&mut self, origin: OriginIndex, commodity: Commodity, value: f64) {
        self.origin_ratios.push(SplitRatioDefinition {
            key: origin,
            step: None,
            commodity,
            value,
        });
    }

    /// Sets the split ratio of a commodity at an origin, for a single time step.
    pub fn set_origin_split_ratio_at(
        &mut self,
        origin: OriginIndex,
        step: usize,
        commodity: Commodity,
        value: f64,
    ) {
        self.origin_ratios.push(SplitRatioDefinition {
            key: origin,
            step: Some(step),
            commodity,
            value,
        });
    }

    /// Sets the partial density of a commodity in a cell at the start of the simulation.
    pub fn set_initial_density(&mut self, cell: CellIndex, commodity: Commodity, value: f64) {
        self.initial_densities[cell.index()].set(commodity, value);
    }

    fn steps(&self, step: Option<usize>) -> AdjointResult<std::ops::Range<usize>> {
        match step {
            None => Ok(0..self.nb_steps),
            Some(k) if k < self.nb_steps => Ok(k..(k + 1)),
            Some(k) => Err(AdjointError::Configuration(format!(
                "Time step {k} is out of the simulation horizon"
            ))),
        }
    }

    /// Validates the topology and returns the [Network].
    pub fn build(mut self) -> AdjointResult<Network> {
        if !(self.time_step.is_finite() && self.time_step > 0.0) || self.nb_steps == 0 {
            return Err(AdjointError::Configuration(format!(
                "Invalid time discretization: {} steps of duration {}",
                self.nb_steps, self.time_step
            )));
        }
        let nb_cells = self.cells.len();
        let mut upstream = vec![None; nb_cells];
        let mut downstream = vec![None; nb_cells];
        for (j, junction) in self.junctions.iter().enumerate() {
            for (a, &cell) in junction.prev().iter().enumerate() {
                if downstream[cell.index()]
                    .replace((junction_index(j), a))
                    .is_some()
                {
                    return Err(AdjointError::Configuration(format!(
                        "Cell {} is an incoming cell of two junctions",
                        cell.index()
                    )));
                }
            }
            for (b, &cell) in junction.next().iter().enumerate() {
                if upstream[cell.index()].replace((junction_index(j), b)).is_some() {
                    return Err(AdjointError::Configuration(format!(
                        "Cell {} is an outgoing cell of two junctions",
                        cell.index()
                    )));
                }
            }
        }
        for (i, role) in self.roles.iter().enumerate() {
            match role {
                CellRole::Buffer(_) if upstream[i].is_some() => {
                    return Err(AdjointError::Configuration(format!(
                        "The buffer cell {i} cannot be fed by a junction"
                    )));
                }
                CellRole::Sink(_) if downstream[i].is_some() => {
                    return Err(AdjointError::Configuration(format!(
                        "The sink cell {i} cannot feed a junction"
                    )));
                }
                CellRole::Road if upstream[i].is_none() || downstream[i].is_none() => {
                    warn!("Cell {i} is not connected on both sides");
                }
                _ => {}
            }
            let cell = &self.cells[i];
            if !cell.is_unbounded() && cell.free_flow_speed() * self.time_step > cell.length() {
                warn!("Cell {i} violates the CFL condition (v * dt > length)");
            }
        }

        let mut junction_split_ratios =
            JunctionSplitRatios::new(self.junctions.len(), self.nb_steps);
        for def in self.junction_ratios.iter() {
            let (j, incoming, outgoing) = def.key;
            let junction = self.junctions.get(j.index()).ok_or_else(|| {
                AdjointError::Configuration(format!("Unknown junction {}", j.index()))
            })?;
            if junction.incoming_position(incoming).is_none()
                || junction.outgoing_position(outgoing).is_none()
            {
                return Err(AdjointError::Configuration(format!(
                    "Cells {} and {} are not connected by junction {}",
                    incoming.index(),
                    outgoing.index(),
                    j.index()
                )));
            }
            if !(def.value.is_finite() && def.value >= 0.0) {
                return Err(AdjointError::Configuration(format!(
                    "Split ratios must be non-negative (got {})",
                    def.value
                )));
            }
            for k in self.steps(def.step)? {
                junction_split_ratios.set(j, k, incoming, outgoing, def.commodity, def.value);
            }
        }

        // Compliant paths: each commodity follows its path with certainty.
        let mut origins = std::mem::take(&mut self.origins);
        let mut commodity_origins = Vec::with_capacity(self.paths.len());
        for (p, path) in self.paths.iter().enumerate() {
            let commodity = p + 1;
            let origin = origins.get_mut(path.origin.index()).ok_or_else(|| {
                AdjointError::Configuration(format!("Unknown origin {}", path.origin.index()))
            })?;
            let mut current = origin.buffer;
            // The last hop goes from the last cell of the path to a sink.
            let hops = path.cells.iter().copied().map(Some).chain(std::iter::once(None));
            for target in hops {
                let (j, a) = downstream[current.index()].ok_or_else(|| {
                    AdjointError::Configuration(format!(
                        "Path of commodity {commodity} is interrupted at cell {}",
                        current.index()
                    ))
                })?;
                let junction = &self.junctions[j.index()];
                let b = match target {
                    Some(cell) => junction.outgoing_position(cell).ok_or_else(|| {
                        AdjointError::Configuration(format!(
                            "Path of commodity {commodity}: cells {} and {} are not adjacent",
                            current.index(),
                            cell.index()
                        ))
                    })?,
                    None => junction
                        .next()
                        .iter()
                        .position(|n| matches!(self.roles[n.index()], CellRole::Sink(_)))
                        .ok_or_else(|| {
                            AdjointError::Configuration(format!(
                                "Path of commodity {commodity} does not end at a destination"
                            ))
                        })?,
                };
                if !junction.is_single_output() {
                    let (from, to) = (junction.prev()[a], junction.next()[b]);
                    for k in 0..self.nb_steps {
                        junction_split_ratios.set(j, k, from, to, commodity, 1.0);
                    }
                }
                current = junction.next()[b];
            }
            origin.compliant_commodities.push(commodity);
            commodity_origins.push(path.origin);
        }

        let mut initial_split_ratios = OriginSplitRatios::new(origins.len(), self.nb_steps);
        for def in self.origin_ratios.iter() {
            if def.key.index() >= origins.len() {
                return Err(AdjointError::Configuration(format!(
                    "Unknown origin {}",
                    def.key.index()
                )));
            }
            if def.commodity != NON_COMPLIANT
                && commodity_origins.get(def.commodity - 1) != Some(&def.key)
            {
                return Err(AdjointError::Configuration(format!(
                    "Commodity {} is not controlled by origin {}",
                    def.commodity,
                    def.key.index()
                )));
            }
            for k in self.steps(def.step)? {
                initial_split_ratios.set(def.key, k, def.commodity, def.value);
            }
        }

        for (j, junction) in self.junctions.iter().enumerate() {
            if junction.is_single_output() {
                continue;
            }
            let incoming = junction.prev()[0];
            for k in 0..self.nb_steps {
                let total: f64 = junction
                    .next()
                    .iter()
                    .map(|&out| {
                        junction_split_ratios.get(
                            junction_index(j),
                            k,
                            incoming,
                            out,
                            NON_COMPLIANT,
                        )
                    })
                    .sum();
                if (total - 1.0).abs() > SUM_TOLERANCE {
                    warn!(
                        "Non-compliant split ratios of junction {j} sum to {total} at step {k}"
                    );
                    break;
                }
            }
        }

        Ok(Network {
            time_step: self.time_step,
            nb_steps: self.nb_steps,
            cells: self.cells,
            roles: self.roles,
            junctions: self.junctions,
            upstream,
            downstream,
            origins,
            destinations: self.destinations,
            commodity_origins,
            junction_split_ratios,
            initial_split_ratios,
            initial_densities: self.initial_densities,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::test_networks;

    fn road() -> Cell {
        Cell::new(1.0, 1.0, 1.0, 10.0, 5.0).unwrap()
    }

    fn buffer() -> Cell {
        Cell::buffer(1.0, 1.0, 5.0).unwrap()
    }

    #[test]
    fn single_link_test() {
        let network = test_networks::single_link(5);
        assert_eq!(network.nb_cells(), 4);
        assert_eq!(network.nb_junctions(), 3);
        assert_eq!(network.nb_commodities(), 2);
        let origin = &network[origin_index(0)];
        assert_eq!(origin.buffer(), cell_index(2));
        assert_eq!(origin.compliant_commodities(), &[1]);
        assert_eq!(network.commodity_origin(1), Some(origin_index(0)));
        assert_eq!(network.commodity_origin(0), None);
        assert!(network.is_buffer(cell_index(2)));
        assert!(network.is_sink(cell_index(3)));
        assert_eq!(
            network.downstream_junction(cell_index(0)),
            Some((junction_index(0), 0))
        );
        assert_eq!(
            network.upstream_junction(cell_index(0)),
            Some((junction_index(1), 0))
        );
        assert_eq!(network.upstream_junction(cell_index(2)), None);
    }

    #[test]
    fn path_split_ratios_test() {
        let network = test_networks::merge_diverge(2);
        let diverge = junction_index(1);
        // Commodity 1 goes to d (position 0), commodity 2 to e (position 1).
        assert_eq!(network.turning_ratio(1, diverge, 0, 0, 1), 1.0);
        assert_eq!(network.turning_ratio(1, diverge, 0, 1, 1), 0.0);
        assert_eq!(network.turning_ratio(0, diverge, 0, 1, 2), 1.0);
        assert_eq!(network.turning_ratio(0, diverge, 0, 0, 0), 0.6);
        // Single-output junctions.
        assert_eq!(network.turning_ratio(0, junction_index(0), 1, 0, 2), 1.0);
        assert_eq!(network.nb_compliant_commodities(), 2);
        assert_eq!(
            network
                .initial_split_ratios()
                .get(origin_index(1), 1, NON_COMPLIANT),
            0.5
        );
    }

    #[test]
    fn invalid_path_test() {
        let mut builder = NetworkBuilder::new(1.0, 2);
        let a = builder.add_cell(road());
        let b = builder.add_cell(road());
        let c = builder.add_cell(road());
        builder.add_junction(vec![a], vec![b], None).unwrap();
        let o = builder.add_origin(vec![a], buffer(), vec![1.0; 2]).unwrap();
        builder.add_destination(vec![b], None).unwrap();
        builder.add_path(o, vec![a, c]);
        assert!(builder.clone().build().is_err());

        let mut builder = NetworkBuilder::new(1.0, 2);
        let a = builder.add_cell(road());
        let b = builder.add_cell(road());
        builder.add_junction(vec![a], vec![b], None).unwrap();
        let o = builder.add_origin(vec![a], buffer(), vec![1.0; 2]).unwrap();
        // The path does not reach a destination.
        builder.add_path(o, vec![a, b]);
        assert!(builder.build().is_err());
    }

    #[test]
    fn invalid_topology_test() {
        let mut builder = NetworkBuilder::new(1.0, 2);
        let a = builder.add_cell(road());
        let b = builder.add_cell(road());
        let c = builder.add_cell(road());
        builder.add_junction(vec![a], vec![b], None).unwrap();
        builder.add_junction(vec![a], vec![c], None).unwrap();
        assert!(builder.build().is_err());

        let mut builder = NetworkBuilder::new(1.0, 2);
        let a = builder.add_cell(road());
        assert!(builder.add_origin(vec![a], buffer(), vec![1.0]).is_err());
        assert!(builder.add_origin(vec![a], buffer(), vec![1.0, -1.0]).is_err());
        assert!(builder.add_junction(vec![cell_index(7)], vec![a], None).is_err());
        assert!(builder.add_destination(vec![], None).is_err());
    }

    #[test]
    fn foreign_commodity_test() {
        let mut builder = NetworkBuilder::new(1.0, 1);
        let a = builder.add_cell(road());
        let b = builder.add_cell(road());
        let o1 = builder.add_origin(vec![a], buffer(), vec![1.0]).unwrap();
        let o2 = builder.add_origin(vec![b], buffer(), vec![1.0]).unwrap();
        builder.add_destination(vec![a], None).unwrap();
        builder.add_destination(vec![b], None).unwrap();
        builder.add_path(o1, vec![a]);
        builder.set_origin_split_ratio(o2, 1, 0.5);
        assert!(builder.build().is_err());
    }

    #[test]
    fn origin_split_ratio_steps_test() {
        let mut builder = NetworkBuilder::new(1.0, 3);
        let a = builder.add_cell(road());
        let o = builder.add_origin(vec![a], buffer(), vec![1.0; 3]).unwrap();
        builder.add_destination(vec![a], None).unwrap();
        let commodity = builder.add_path(o, vec![a]);
        builder.set_origin_split_ratio(o, commodity, 0.4);
        builder.set_origin_split_ratio_at(o, 2, commodity, 0.9);
        builder.set_origin_split_ratio_at(o, 1, NON_COMPLIANT, 0.2);
        let network = builder.clone().build().unwrap();
        let ratios = network.initial_split_ratios();
        assert_eq!(ratios.get(o, 0, commodity), 0.4);
        assert_eq!(ratios.get(o, 2, commodity), 0.9);
        assert_eq!(ratios.get(o, 1, NON_COMPLIANT), 0.2);
        assert_eq!(ratios.get(o, 0, NON_COMPLIANT), 0.0);
        assert_eq!(network[o].compliant_commodities(), &[commodity]);

        builder.set_origin_split_ratio_at(o, 3, commodity, 0.5);
        assert!(builder.build().is_err());
    }
}
