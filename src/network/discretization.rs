// Copyright 2022 Lucas Javaudin
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// https://creativecommons.org/licenses/by-nc-nd/4.0/legalcode

//! Discretization of a graph of links into a [Network] of cells.
//!
//! Each link of length `l` and free-flow speed `v` is split into `ceil(l / (v * dt))` cells of
//! length `v * dt`, chained by simple junctions. Each node of the graph becomes a junction
//! joining the last cells of its incoming links to the first cells of its outgoing links. Origin
//! nodes are fed by the buffer cell of an origin and destination nodes empty into a sink.
use hashbrown::HashMap;
use log::{debug, warn};
use petgraph::algo::has_path_connecting;
use petgraph::graph::{edge_index, node_index, DiGraph, NodeIndex};
use petgraph::Direction;
use serde_derive::{Deserialize, Serialize};

use super::{Cell, CellIndex, JunctionIndex, Network, NetworkBuilder, OriginIndex, NON_COMPLIANT};
use crate::error::{AdjointError, AdjointResult};

/// Maximum number of cells a link can be discretized into.
pub const MAX_CELLS_PER_LINK: usize = 1_000_000;

/// Description of a link of the graph.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LinkInput {
    /// Id of the link, used to describe the paths and the split ratios.
    pub id: u64,
    pub length: f64,
    pub free_flow_speed: f64,
    pub congestion_wave_speed: f64,
    pub jam_density: f64,
    /// Capacity of the link.
    pub max_flow: f64,
}

/// Demand of an origin: either a constant value or one value per time step.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum DemandInput {
    Constant(f64),
    Profile(Vec<f64>),
}

impl DemandInput {
    fn values(&self, nb_steps: usize) -> Vec<f64> {
        match self {
            Self::Constant(d) => vec![*d; nb_steps],
            Self::Profile(values) => values.clone(),
        }
    }
}

/// An origin node of the graph.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct OriginInput {
    pub node: u64,
    pub demand: DemandInput,
}

/// A destination node of the graph.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DestinationInput {
    pub node: u64,
}

/// A compliant path, given as a sequence of link ids from an origin to a destination.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PathInput {
    pub links: Vec<u64>,
    /// Initial control of the commodity of the path (defaults to 1).
    #[serde(default)]
    pub initial_control: Option<f64>,
}

/// Turning ratio of the non-compliant vehicles from a link to another link.
///
/// When `incoming` is `None`, the ratio applies to the vehicles leaving the buffer of the origin
/// at the start node of the `outgoing` link.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SplitRatioInput {
    #[serde(default)]
    pub incoming: Option<u64>,
    pub outgoing: u64,
    pub value: f64,
    /// Time step where the ratio applies (all time steps if `None`).
    #[serde(default)]
    pub step: Option<usize>,
}

/// Graph of nodes and links, as read from a JSON file.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct GraphInput {
    /// Links of the graph, represented as a tuple `(s, t, l)`, where `s` is the id of the source
    /// node, `t` is the id of the target node and `l` is the description of the link.
    pub links: Vec<(u64, u64, LinkInput)>,
    pub origins: Vec<OriginInput>,
    pub destinations: Vec<DestinationInput>,
    #[serde(default)]
    pub paths: Vec<PathInput>,
    /// Priorities of the merge nodes, by node id.
    #[serde(default)]
    pub priorities: HashMap<u64, [f64; 2]>,
    #[serde(default)]
    pub split_ratios: Vec<SplitRatioInput>,
}

/// First and last cells of a discretized link.
#[derive(Copy, Clone, Debug)]
struct LinkCells {
    first: CellIndex,
    last: CellIndex,
}

/// Junction of a node, with the buffer cell of the origin for origin nodes.
#[derive(Copy, Clone, Debug)]
struct NodeJunction {
    junction: JunctionIndex,
    origin: Option<(OriginIndex, CellIndex)>,
}

fn unknown(what: &str, id: u64) -> AdjointError {
    AdjointError::Configuration(format!("Unknown {what} {id}"))
}

impl GraphInput {
    /// Discretizes the graph into a [Network] with `nb_steps` time steps of duration `time_step`.
    ///
    /// The split ratios of the origins are seeded with `1 - alpha` for the non-compliant commodity
    /// and `alpha * initial_control` for the compliant commodities.
    pub fn discretize(&self, time_step: f64, nb_steps: usize, alpha: f64) -> AdjointResult<Network> {
        if !(time_step.is_finite() && time_step > 0.0) {
            return Err(AdjointError::Configuration(format!(
                "The time step must be positive (got {time_step})"
            )));
        }
        // The nodes in the DiGraph need to be ordered from 0 to n-1 so we create a map
        // u64 -> NodeIndex to re-index the nodes.
        let mut node_map: HashMap<u64, NodeIndex> = HashMap::new();
        for &(s, t, _) in self.links.iter() {
            for id in [s, t] {
                let next = node_index(node_map.len());
                node_map.entry(id).or_insert(next);
            }
        }
        let link_map: HashMap<u64, usize> = self
            .links
            .iter()
            .enumerate()
            .map(|(i, (_, _, l))| (l.id, i))
            .collect();
        if link_map.len() != self.links.len() {
            return Err(AdjointError::Configuration(
                "The link ids are not unique".to_owned(),
            ));
        }
        let graph: DiGraph<(), usize> = DiGraph::from_edges(
            self.links
                .iter()
                .enumerate()
                .map(|(i, &(s, t, _))| (node_map[&s], node_map[&t], i)),
        );
        let node = |id: u64| node_map.get(&id).copied().ok_or_else(|| unknown("node", id));
        let link = |id: u64| link_map.get(&id).copied().ok_or_else(|| unknown("link", id));

        let mut builder = NetworkBuilder::new(time_step, nb_steps);

        let mut link_cells = Vec::with_capacity(self.links.len());
        for (_, _, l) in self.links.iter() {
            let cell_length = l.free_flow_speed * time_step;
            let nb_cells = (l.length / cell_length).ceil();
            if !(nb_cells.is_finite() && nb_cells >= 1.0) {
                return Err(AdjointError::Configuration(format!(
                    "Link {} cannot be discretized (length: {}, free-flow speed: {})",
                    l.id, l.length, l.free_flow_speed
                )));
            }
            if nb_cells > MAX_CELLS_PER_LINK as f64 {
                return Err(AdjointError::Configuration(format!(
                    "Link {} would be discretized into {nb_cells} cells (at most \
                     {MAX_CELLS_PER_LINK} allowed), increase the time step",
                    l.id
                )));
            }
            let mut cells = Vec::with_capacity(nb_cells as usize);
            for _ in 0..(nb_cells as usize) {
                let cell = Cell::new(
                    cell_length,
                    l.free_flow_speed,
                    l.congestion_wave_speed,
                    l.jam_density,
                    l.max_flow,
                )?;
                cells.push(builder.add_cell(cell));
            }
            for pair in cells.windows(2) {
                builder.add_junction(vec![pair[0]], vec![pair[1]], None)?;
            }
            debug!("Link {} discretized into {} cells", l.id, cells.len());
            link_cells.push(LinkCells {
                first: cells[0],
                last: cells[cells.len() - 1],
            });
        }

        let mut origin_nodes: HashMap<NodeIndex, &OriginInput> = HashMap::new();
        for origin in self.origins.iter() {
            if origin_nodes.insert(node(origin.node)?, origin).is_some() {
                return Err(AdjointError::Configuration(format!(
                    "Node {} is the node of two origins",
                    origin.node
                )));
            }
        }
        let mut destination_nodes = Vec::with_capacity(self.destinations.len());
        for destination in self.destinations.iter() {
            let n = node(destination.node)?;
            if origin_nodes.contains_key(&n) || destination_nodes.contains(&n) {
                return Err(AdjointError::Configuration(format!(
                    "Node {} cannot be the node of two origins / destinations",
                    destination.node
                )));
            }
            destination_nodes.push(n);
        }

        let mut node_junctions = Vec::with_capacity(graph.node_count());
        let mut node_ids = vec![0; graph.node_count()];
        for (&id, n) in node_map.iter() {
            node_ids[n.index()] = id;
        }
        for n in graph.node_indices() {
            let id = node_ids[n.index()];
            let links_of = |dir: Direction| {
                let mut links: Vec<usize> = graph.edges_directed(n, dir).map(|e| *e.weight()).collect();
                links.sort_unstable();
                links
            };
            let prev: Vec<CellIndex> = links_of(Direction::Incoming)
                .into_iter()
                .map(|l| link_cells[l].last)
                .collect();
            let next: Vec<CellIndex> = links_of(Direction::Outgoing)
                .into_iter()
                .map(|l| link_cells[l].first)
                .collect();
            let priorities = self.priorities.get(&id).copied();
            let node_junction = if let Some(origin) = origin_nodes.get(&n) {
                if !prev.is_empty() {
                    return Err(AdjointError::Configuration(format!(
                        "Origin node {id} cannot have incoming links"
                    )));
                }
                let first_link = &self.links[links_of(Direction::Outgoing)[0]].2;
                let buffer = Cell::buffer(
                    first_link.free_flow_speed * time_step,
                    first_link.free_flow_speed,
                    first_link.max_flow,
                )?;
                let o = builder.add_origin(next, buffer, origin.demand.values(nb_steps))?;
                let (buffer, junction) = builder
                    .origin_entry(o)
                    .ok_or_else(|| unknown("origin node", id))?;
                NodeJunction {
                    junction,
                    origin: Some((o, buffer)),
                }
            } else if destination_nodes.contains(&n) {
                if !next.is_empty() {
                    return Err(AdjointError::Configuration(format!(
                        "Destination node {id} cannot have outgoing links"
                    )));
                }
                let d = builder.add_destination(prev, priorities)?;
                NodeJunction {
                    junction: builder
                        .destination_junction(d)
                        .ok_or_else(|| unknown("destination node", id))?,
                    origin: None,
                }
            } else {
                if prev.is_empty() || next.is_empty() {
                    return Err(AdjointError::Configuration(format!(
                        "Node {id} is neither an origin nor a destination and must have incoming \
                         and outgoing links"
                    )));
                }
                NodeJunction {
                    junction: builder.add_junction(prev, next, priorities)?,
                    origin: None,
                }
            };
            node_junctions.push(node_junction);
        }

        for (o, origin) in self.origins.iter().enumerate() {
            let n = node(origin.node)?;
            if !destination_nodes
                .iter()
                .any(|&d| has_path_connecting(&graph, n, d, None))
            {
                warn!("No destination can be reached from origin {o}");
            }
        }

        for (p, path) in self.paths.iter().enumerate() {
            let (&first, &last) = match (path.links.first(), path.links.last()) {
                (Some(first), Some(last)) => (first, last),
                _ => {
                    return Err(AdjointError::Configuration(format!("Path {p} is empty")));
                }
            };
            let start = graph
                .edge_endpoints(edge_index(link(first)?))
                .map(|(s, _)| s)
                .ok_or_else(|| unknown("link", first))?;
            let (o, _) = node_junctions[start.index()].origin.ok_or_else(|| {
                AdjointError::Configuration(format!("Path {p} does not start at an origin"))
            })?;
            let end = graph
                .edge_endpoints(edge_index(link(last)?))
                .map(|(_, t)| t)
                .ok_or_else(|| unknown("link", last))?;
            if !destination_nodes.contains(&end) {
                return Err(AdjointError::Configuration(format!(
                    "Path {p} does not end at a destination"
                )));
            }
            let mut cells = Vec::new();
            for pair in path.links.windows(2) {
                let (_, t) = graph
                    .edge_endpoints(edge_index(link(pair[0])?))
                    .ok_or_else(|| unknown("link", pair[0]))?;
                let (s, _) = graph
                    .edge_endpoints(edge_index(link(pair[1])?))
                    .ok_or_else(|| unknown("link", pair[1]))?;
                if t != s {
                    return Err(AdjointError::Configuration(format!(
                        "Path {p}: links {} and {} are not connected",
                        pair[0], pair[1]
                    )));
                }
            }
            for &l in path.links.iter() {
                let LinkCells { first, last } = link_cells[link(l)?];
                cells.extend((first.index()..=last.index()).map(super::cell_index));
            }
            let commodity = builder.add_path(o, cells);
            builder.set_origin_split_ratio(
                o,
                commodity,
                alpha * path.initial_control.unwrap_or(1.0),
            );
        }

        for node_junction in node_junctions.iter() {
            if let Some((o, _)) = node_junction.origin {
                builder.set_origin_split_ratio(o, NON_COMPLIANT, 1.0 - alpha);
            }
        }

        for ratio in self.split_ratios.iter() {
            let outgoing = link(ratio.outgoing)?;
            let (s, _) = graph
                .edge_endpoints(edge_index(outgoing))
                .ok_or_else(|| unknown("link", ratio.outgoing))?;
            let node_junction = node_junctions[s.index()];
            let incoming_cell = match (ratio.incoming, node_junction.origin) {
                (Some(incoming), _) => {
                    let l = link(incoming)?;
                    if graph.edge_endpoints(edge_index(l)).map(|(_, t)| t) != Some(s) {
                        return Err(AdjointError::Configuration(format!(
                            "Links {incoming} and {} are not connected",
                            ratio.outgoing
                        )));
                    }
                    link_cells[l].last
                }
                (None, Some((_, buffer))) => buffer,
                (None, None) => {
                    return Err(AdjointError::Configuration(format!(
                        "The split ratio towards link {} requires an incoming link",
                        ratio.outgoing
                    )));
                }
            };
            let outgoing_cell = link_cells[outgoing].first;
            match ratio.step {
                Some(step) => builder.set_split_ratio_at(
                    step,
                    node_junction.junction,
                    incoming_cell,
                    outgoing_cell,
                    NON_COMPLIANT,
                    ratio.value,
                ),
                None => builder.set_split_ratio(
                    node_junction.junction,
                    incoming_cell,
                    outgoing_cell,
                    NON_COMPLIANT,
                    ratio.value,
                ),
            }
        }

        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{cell_index, origin_index};

    fn link(id: u64, length: f64) -> LinkInput {
        LinkInput {
            id,
            length,
            free_flow_speed: 1.0,
            congestion_wave_speed: 1.0,
            jam_density: 100.0,
            max_flow: 20.0,
        }
    }

    #[test]
    fn single_link_test() {
        let graph = GraphInput {
            links: vec![(10, 20, link(1, 2.0))],
            origins: vec![OriginInput {
                node: 10,
                demand: DemandInput::Constant(10.0),
            }],
            destinations: vec![DestinationInput { node: 20 }],
            paths: vec![PathInput {
                links: vec![1],
                initial_control: None,
            }],
            priorities: HashMap::new(),
            split_ratios: Vec::new(),
        };
        let network = graph.discretize(1.0, 4, 1.0).unwrap();
        // Two road cells, a buffer and a sink.
        assert_eq!(network.nb_cells(), 4);
        assert_eq!(network.nb_junctions(), 3);
        assert_eq!(network.nb_commodities(), 2);
        let origin = &network[origin_index(0)];
        assert_eq!(origin.demand(3), 10.0);
        assert_eq!(network.initial_split_ratios().get(origin_index(0), 2, 1), 1.0);
        assert_eq!(network.initial_split_ratios().get(origin_index(0), 2, 0), 0.0);
        assert_eq!(network[cell_index(0)].length(), 1.0);
    }

    #[test]
    fn cell_count_test() {
        let graph = GraphInput {
            links: vec![(0, 1, link(0, 2.5))],
            origins: vec![OriginInput {
                node: 0,
                demand: DemandInput::Profile(vec![1.0, 2.0]),
            }],
            destinations: vec![DestinationInput { node: 1 }],
            paths: Vec::new(),
            priorities: HashMap::new(),
            split_ratios: Vec::new(),
        };
        let network = graph.discretize(0.5, 2, 0.5).unwrap();
        // ceil(2.5 / 0.5) = 5 road cells.
        assert_eq!(network.nb_cells(), 7);
        assert_eq!(network[origin_index(0)].demand(1), 2.0);
        assert_eq!(network.initial_split_ratios().get(origin_index(0), 0, 0), 0.5);
    }

    #[test]
    fn too_many_cells_test() {
        let mut graph = GraphInput {
            links: vec![(0, 1, link(0, 1e12))],
            origins: vec![OriginInput {
                node: 0,
                demand: DemandInput::Constant(1.0),
            }],
            destinations: vec![DestinationInput { node: 1 }],
            paths: Vec::new(),
            priorities: HashMap::new(),
            split_ratios: Vec::new(),
        };
        assert!(matches!(
            graph.discretize(1.0, 2, 1.0),
            Err(AdjointError::Configuration(_))
        ));
        // Same issue with a tiny time step.
        graph.links[0].2.length = 1.0;
        assert!(matches!(
            graph.discretize(1e-9, 2, 1.0),
            Err(AdjointError::Configuration(_))
        ));
        assert_eq!(graph.discretize(0.25, 2, 1.0).unwrap().nb_cells(), 6);
    }

    #[test]
    fn invalid_graph_test() {
        let mut graph = GraphInput {
            links: vec![(0, 1, link(0, 1.0)), (1, 2, link(1, 1.0))],
            origins: vec![OriginInput {
                node: 0,
                demand: DemandInput::Constant(1.0),
            }],
            destinations: vec![DestinationInput { node: 2 }],
            paths: vec![PathInput {
                links: vec![1],
                initial_control: None,
            }],
            priorities: HashMap::new(),
            split_ratios: Vec::new(),
        };
        // The path does not start at an origin.
        assert!(matches!(
            graph.discretize(1.0, 2, 1.0),
            Err(AdjointError::Configuration(_))
        ));
        graph.paths[0].links = vec![0, 1];
        assert!(graph.discretize(1.0, 2, 1.0).is_ok());
        graph.paths[0].links = vec![0, 7];
        assert!(matches!(
            graph.discretize(1.0, 2, 1.0),
            Err(AdjointError::Configuration(_))
        ));
        graph.paths.clear();
        graph.destinations[0].node = 1;
        // Node 1 has an outgoing link.
        assert!(matches!(
            graph.discretize(1.0, 2, 1.0),
            Err(AdjointError::Configuration(_))
        ));
    }
}
