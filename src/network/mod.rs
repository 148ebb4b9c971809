// Copyright 2022 Lucas Javaudin
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// https://creativecommons.org/licenses/by-nc-nd/4.0/legalcode

//! Discretized road network: cells, junctions, origins and destinations.
//!
//! All the elements of a [Network] are stored in arenas and identified by typed indices which are
//! used directly as vector indices. The network is immutable once built.
pub mod builder;
pub mod cell;
pub mod discretization;
pub mod junction;

use std::ops::Index;

pub use self::builder::NetworkBuilder;
pub use self::cell::Cell;
pub use self::discretization::GraphInput;
pub use self::junction::{Junction, JunctionKind};
use crate::split_ratios::{CommodityMap, JunctionSplitRatios, OriginSplitRatios};

/// Identifier of a commodity.
///
/// Commodity `0` is the aggregate non-compliant flow, commodities `1..=C` are the compliant
/// commodities, each one bound to an origin and a path.
pub type Commodity = usize;

/// The non-compliant commodity.
pub const NON_COMPLIANT: Commodity = 0;

macro_rules! index_type {
    ($(#[$doc:meta])* $name:ident, $short:ident) => {
        $(#[$doc])*
        #[derive(Copy, Clone, Debug, Default, PartialEq, PartialOrd, Eq, Ord, Hash)]
        pub struct $name(usize);

        impl $name {
            #[doc = concat!("Creates a new ", stringify!($name), ".")]
            pub const fn new(x: usize) -> Self {
                $name(x)
            }

            #[doc = concat!("Returns the index of the ", stringify!($name), ".")]
            pub const fn index(self) -> usize {
                self.0
            }
        }

        #[doc = concat!("Short version of `", stringify!($name), "::new`.")]
        pub const fn $short(index: usize) -> $name {
            $name::new(index)
        }
    };
}

index_type!(
    /// Cell identifier.
    CellIndex,
    cell_index
);
index_type!(
    /// Junction identifier.
    JunctionIndex,
    junction_index
);
index_type!(
    /// Origin identifier.
    OriginIndex,
    origin_index
);
index_type!(
    /// Destination identifier.
    DestinationIndex,
    destination_index
);

/// Role of a cell in the network.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CellRole {
    /// A regular road cell.
    Road,
    /// The buffer cell where the demand of an origin is injected.
    Buffer(OriginIndex),
    /// The sink cell where the vehicles reaching a destination accumulate.
    Sink(DestinationIndex),
}

/// An origin of the network.
#[derive(Clone, Debug, PartialEq)]
pub struct Origin {
    pub(crate) buffer: CellIndex,
    pub(crate) junction: JunctionIndex,
    pub(crate) demands: Vec<f64>,
    pub(crate) compliant_commodities: Vec<Commodity>,
}

impl Origin {
    /// Returns the buffer cell of the origin.
    pub const fn buffer(&self) -> CellIndex {
        self.buffer
    }

    /// Returns the junction between the buffer cell and the network.
    pub const fn junction(&self) -> JunctionIndex {
        self.junction
    }

    /// Returns the demand of the origin at the given time step.
    pub fn demand(&self, step: usize) -> f64 {
        self.demands[step]
    }

    /// Returns the compliant commodities controlled by the origin, in increasing order.
    pub fn compliant_commodities(&self) -> &[Commodity] {
        &self.compliant_commodities
    }
}

/// A destination of the network.
#[derive(Clone, Debug, PartialEq)]
pub struct Destination {
    pub(crate) sink: CellIndex,
    pub(crate) junction: JunctionIndex,
}

impl Destination {
    /// Returns the sink cell of the destination.
    pub const fn sink(&self) -> CellIndex {
        self.sink
    }

    /// Returns the junction between the network and the sink cell.
    pub const fn junction(&self) -> JunctionIndex {
        self.junction
    }
}

/// A discretized network, ready to be simulated.
///
/// Use a [NetworkBuilder] to create a network.
#[derive(Clone, Debug)]
pub struct Network {
    pub(crate) time_step: f64,
    pub(crate) nb_steps: usize,
    pub(crate) cells: Vec<Cell>,
    pub(crate) roles: Vec<CellRole>,
    pub(crate) junctions: Vec<Junction>,
    /// For each cell, the junction (and the position in its outgoing cells) upstream of the cell.
    pub(crate) upstream: Vec<Option<(JunctionIndex, usize)>>,
    /// For each cell, the junction (and the position in its incoming cells) downstream of the
    /// cell.
    pub(crate) downstream: Vec<Option<(JunctionIndex, usize)>>,
    pub(crate) origins: Vec<Origin>,
    pub(crate) destinations: Vec<Destination>,
    /// Owner of each compliant commodity (index `c - 1`).
    pub(crate) commodity_origins: Vec<OriginIndex>,
    pub(crate) junction_split_ratios: JunctionSplitRatios,
    pub(crate) initial_split_ratios: OriginSplitRatios,
    pub(crate) initial_densities: Vec<CommodityMap>,
}

impl Network {
    /// Returns the duration of a time step.
    pub const fn time_step(&self) -> f64 {
        self.time_step
    }

    /// Returns the number of time steps of the simulation horizon.
    pub const fn nb_steps(&self) -> usize {
        self.nb_steps
    }

    /// Returns the number of cells (including buffers and sinks).
    pub fn nb_cells(&self) -> usize {
        self.cells.len()
    }

    /// Returns the number of junctions.
    pub fn nb_junctions(&self) -> usize {
        self.junctions.len()
    }

    /// Returns the number of compliant commodities (`C`).
    pub fn nb_compliant_commodities(&self) -> usize {
        self.commodity_origins.len()
    }

    /// Returns the number of commodities, including the non-compliant commodity (`C + 1`).
    pub fn nb_commodities(&self) -> usize {
        self.commodity_origins.len() + 1
    }

    /// Iterates over the cells with their index.
    pub fn iter_cells(&self) -> impl Iterator<Item = (CellIndex, &Cell)> {
        self.cells
            .iter()
            .enumerate()
            .map(|(i, c)| (cell_index(i), c))
    }

    /// Iterates over the junctions with their index.
    pub fn iter_junctions(&self) -> impl Iterator<Item = (JunctionIndex, &Junction)> {
        self.junctions
            .iter()
            .enumerate()
            .map(|(i, j)| (junction_index(i), j))
    }

    /// Iterates over the origins with their index.
    pub fn iter_origins(&self) -> impl Iterator<Item = (OriginIndex, &Origin)> {
        self.origins
            .iter()
            .enumerate()
            .map(|(i, o)| (origin_index(i), o))
    }

    /// Iterates over the destinations with their index.
    pub fn iter_destinations(&self) -> impl Iterator<Item = (DestinationIndex, &Destination)> {
        self.destinations
            .iter()
            .enumerate()
            .map(|(i, d)| (destination_index(i), d))
    }

    /// Returns the role of a cell.
    pub fn role(&self, cell: CellIndex) -> CellRole {
        self.roles[cell.index()]
    }

    /// Returns `true` if the cell is the buffer of an origin.
    pub fn is_buffer(&self, cell: CellIndex) -> bool {
        matches!(self.roles[cell.index()], CellRole::Buffer(_))
    }

    /// Returns `true` if the cell is the sink of a destination.
    pub fn is_sink(&self, cell: CellIndex) -> bool {
        matches!(self.roles[cell.index()], CellRole::Sink(_))
    }

    /// Returns the junction upstream of a cell and the position of the cell in the outgoing cells
    /// of this junction.
    pub fn upstream_junction(&self, cell: CellIndex) -> Option<(JunctionIndex, usize)> {
        self.upstream[cell.index()]
    }

    /// Returns the junction downstream of a cell and the position of the cell in the incoming
    /// cells of this junction.
    pub fn downstream_junction(&self, cell: CellIndex) -> Option<(JunctionIndex, usize)> {
        self.downstream[cell.index()]
    }

    /// Returns the origin controlling a compliant commodity.
    ///
    /// Returns `None` for the non-compliant commodity and for unknown commodities.
    pub fn commodity_origin(&self, commodity: Commodity) -> Option<OriginIndex> {
        commodity
            .checked_sub(1)
            .and_then(|i| self.commodity_origins.get(i))
            .copied()
    }

    /// Returns the turning ratio of a commodity from the `incoming`-th incoming cell to the
    /// `outgoing`-th outgoing cell of a junction.
    ///
    /// Junctions with a single outgoing cell have a turning ratio of 1 for every commodity.
    pub fn turning_ratio(
        &self,
        step: usize,
        junction: JunctionIndex,
        incoming: usize,
        outgoing: usize,
        commodity: Commodity,
    ) -> f64 {
        let j = &self[junction];
        if j.is_single_output() {
            1.0
        } else {
            self.junction_split_ratios.get(
                junction,
                step,
                j.prev()[incoming],
                j.next()[outgoing],
                commodity,
            )
        }
    }

    /// Returns the per-commodity turning ratios of the junctions.
    pub const fn junction_split_ratios(&self) -> &JunctionSplitRatios {
        &self.junction_split_ratios
    }

    /// Returns the split ratios of the origins, as seeded when building the network.
    pub const fn initial_split_ratios(&self) -> &OriginSplitRatios {
        &self.initial_split_ratios
    }

    /// Returns the initial partial densities of a cell.
    pub fn initial_densities(&self, cell: CellIndex) -> &CommodityMap {
        &self.initial_densities[cell.index()]
    }
}

impl Index<CellIndex> for Network {
    type Output = Cell;
    fn index(&self, index: CellIndex) -> &Self::Output {
        &self.cells[index.index()]
    }
}

impl Index<JunctionIndex> for Network {
    type Output = Junction;
    fn index(&self, index: JunctionIndex) -> &Self::Output {
        &self.junctions[index.index()]
    }
}

impl Index<OriginIndex> for Network {
    type Output = Origin;
    fn index(&self, index: OriginIndex) -> &Self::Output {
        &self.origins[index.index()]
    }
}

impl Index<DestinationIndex> for Network {
    type Output = Destination;
    fn index(&self, index: DestinationIndex) -> &Self::Output {
        &self.destinations[index.index()]
    }
}
