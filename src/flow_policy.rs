// Copyright 2022 Lucas Javaudin
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// https://creativecommons.org/licenses/by-nc-nd/4.0/legalcode

//! Flow policy of the junctions.
//!
//! The policy grants a total flow to each incoming cell of a junction, given the demands of the
//! incoming cells, the supplies of the outgoing cells and the aggregate split ratios of the
//! junction. The total flow of an incoming cell is then shared among the commodities
//! proportionally to their partial densities.
//!
//! - **Simple** junctions: `g = min(d, s)`.
//! - **Merge** junctions: both incoming cells are fully served when `d1 + d2 <= s`. Otherwise the
//!   supply is shared according to the priorities, an incoming cell whose priority share exceeds
//!   its demand being capped at its demand (the other cell receiving the remainder).
//! - **Diverge** junctions: `g = min(d, min_b s_b / beta_b)` where the minimum is over the
//!   outgoing cells with a positive aggregate split ratio `beta_b`.
use crate::network::{Commodity, Junction, JunctionKind};
use crate::split_ratios::CommodityMap;
use crate::state::CellInfo;

/// Input of the flow policy with respect to which a total flow can be differentiated.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PolicyVariable {
    /// Demand of the `i`-th incoming cell.
    Demand(usize),
    /// Supply of the `i`-th outgoing cell.
    Supply(usize),
    /// Aggregate split ratio of the (`a`-th incoming, `b`-th outgoing) pair.
    AggregateSplitRatio(usize, usize),
}

/// Gradient of a total flow, as a list of `(variable, partial derivative)`.
pub type FlowGradient = Vec<(PolicyVariable, f64)>;

/// Inputs of the flow policy of a junction.
#[derive(Clone, Copy, Debug)]
pub struct PolicyInputs<'a> {
    /// Demand of each incoming cell.
    pub demands: &'a [f64],
    /// Supply of each outgoing cell.
    pub supplies: &'a [f64],
    /// Aggregate split ratio of each (incoming, outgoing) pair, by incoming cell then outgoing
    /// cell.
    pub aggregate_split_ratios: &'a [f64],
}

/// Per-commodity flows allocated by a junction.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Allocation {
    /// Flow leaving each incoming cell, per commodity.
    pub out_flows: Vec<CommodityMap>,
    /// Flow on each (incoming, outgoing) pair, per commodity, by incoming cell then outgoing
    /// cell.
    pub pair_flows: Vec<CommodityMap>,
}

impl Junction {
    /// Returns the total flow granted to each incoming cell.
    pub fn total_flows(&self, inputs: &PolicyInputs) -> Vec<f64> {
        let d = inputs.demands;
        let s = inputs.supplies;
        match self.kind() {
            JunctionKind::Simple => vec![d[0].min(s[0])],
            JunctionKind::Merge { priorities } => {
                let (flows, _) = merge(d[0], d[1], s[0], *priorities);
                flows.to_vec()
            }
            JunctionKind::Diverge => {
                match diverge_bottleneck(s, inputs.aggregate_split_ratios) {
                    Some((_, ratio)) if ratio < d[0] => vec![ratio],
                    _ => vec![d[0]],
                }
            }
        }
    }

    /// Returns the gradient of the total flow granted to each incoming cell.
    ///
    /// When the demand and the supply are equal, the derivative is taken with respect to the
    /// demand.
    pub fn total_flow_gradients(&self, inputs: &PolicyInputs) -> Vec<FlowGradient> {
        let d = inputs.demands;
        let s = inputs.supplies;
        match self.kind() {
            JunctionKind::Simple => {
                if d[0] <= s[0] {
                    vec![vec![(PolicyVariable::Demand(0), 1.0)]]
                } else {
                    vec![vec![(PolicyVariable::Supply(0), 1.0)]]
                }
            }
            JunctionKind::Merge { priorities } => {
                let (_, regime) = merge(d[0], d[1], s[0], *priorities);
                regime.gradients(*priorities).to_vec()
            }
            JunctionKind::Diverge => {
                let betas = inputs.aggregate_split_ratios;
                match diverge_bottleneck(s, betas) {
                    Some((b, ratio)) if ratio < d[0] => vec![vec![
                        (PolicyVariable::Supply(b), 1.0 / betas[b]),
                        (
                            PolicyVariable::AggregateSplitRatio(0, b),
                            -s[b] / (betas[b] * betas[b]),
                        ),
                    ]],
                    _ => vec![vec![(PolicyVariable::Demand(0), 1.0)]],
                }
            }
        }
    }

    /// Allocates the total flows among the commodities and the outgoing cells.
    ///
    /// The flow of commodity `c` leaving the `a`-th incoming cell is `g_a * rho_c / rho`, where
    /// `g_a` is the total flow of the cell (see [Junction::total_flows]); this flow is sent to the
    /// `b`-th outgoing cell with the turning ratio `turning_ratio(a, b, c)`.
    pub fn allocate(
        &self,
        incoming: &[&CellInfo],
        total_flows: &[f64],
        turning_ratio: impl Fn(usize, usize, Commodity) -> f64,
    ) -> Allocation {
        let nb_next = self.next().len();
        let mut out_flows = vec![CommodityMap::new(); incoming.len()];
        let mut pair_flows = vec![CommodityMap::new(); self.nb_pairs()];
        for (a, (info, &g)) in incoming.iter().zip(total_flows.iter()).enumerate() {
            if info.total_density <= 0.0 {
                continue;
            }
            for (c, rho) in info.partial_densities.iter() {
                let flow = g * (rho / info.total_density);
                out_flows[a].set(c, flow);
                for b in 0..nb_next {
                    let beta = turning_ratio(a, b, c);
                    if beta != 0.0 {
                        pair_flows[a * nb_next + b].add(c, flow * beta);
                    }
                }
            }
        }
        Allocation {
            out_flows,
            pair_flows,
        }
    }
}

/// Returns the aggregate split ratio of an (incoming, outgoing) pair: the average of the
/// per-commodity turning ratios weighted by the partial densities of the incoming cell.
///
/// The `fallback` value is returned when the incoming cell is empty.
pub fn aggregate_split_ratio(
    partial_densities: impl Iterator<Item = (Commodity, f64)>,
    turning_ratio: impl Fn(Commodity) -> f64,
    fallback: f64,
) -> f64 {
    let mut total = 0.0;
    let mut weighted = 0.0;
    for (c, rho) in partial_densities {
        total += rho;
        weighted += turning_ratio(c) * rho;
    }
    if total > 0.0 {
        weighted / total
    } else {
        fallback
    }
}

/// Returns the outgoing cell which limits the flow of a diverge, with the flow it allows.
fn diverge_bottleneck(supplies: &[f64], aggregate_split_ratios: &[f64]) -> Option<(usize, f64)> {
    let mut bottleneck: Option<(usize, f64)> = None;
    for (b, (&s, &beta)) in supplies.iter().zip(aggregate_split_ratios).enumerate() {
        if beta > 0.0 {
            let ratio = s / beta;
            if bottleneck.map_or(true, |(_, r)| ratio < r) {
                bottleneck = Some((b, ratio));
            }
        }
    }
    bottleneck
}

/// Active branch of a merge junction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum MergeRegime {
    /// The combined demand is served.
    FreeFlow,
    /// The first incoming cell is capped at its demand.
    FirstCapped,
    /// The second incoming cell is capped at its demand.
    SecondCapped,
    /// The supply is shared according to the priorities.
    Priority,
}

impl MergeRegime {
    fn gradients(self, priorities: [f64; 2]) -> [FlowGradient; 2] {
        use PolicyVariable::{Demand, Supply};
        match self {
            Self::FreeFlow => [vec![(Demand(0), 1.0)], vec![(Demand(1), 1.0)]],
            Self::FirstCapped => [
                vec![(Demand(0), 1.0)],
                vec![(Supply(0), 1.0), (Demand(0), -1.0)],
            ],
            Self::SecondCapped => [
                vec![(Supply(0), 1.0), (Demand(1), -1.0)],
                vec![(Demand(1), 1.0)],
            ],
            Self::Priority => [
                vec![(Supply(0), priorities[0])],
                vec![(Supply(0), priorities[1])],
            ],
        }
    }
}

/// Returns the flows of the two incoming cells of a merge and the active branch.
fn merge(d1: f64, d2: f64, s: f64, priorities: [f64; 2]) -> ([f64; 2], MergeRegime) {
    if d1 + d2 <= s {
        ([d1, d2], MergeRegime::FreeFlow)
    } else if priorities[0] * s > d1 {
        ([d1, s - d1], MergeRegime::FirstCapped)
    } else if priorities[1] * s > d2 {
        ([s - d2, d2], MergeRegime::SecondCapped)
    } else {
        let f1 = priorities[0] * s;
        ([f1, s - f1], MergeRegime::Priority)
    }
}
