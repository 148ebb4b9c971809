// Copyright 2022 Lucas Javaudin
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// https://creativecommons.org/licenses/by-nc-nd/4.0/legalcode

//! Junctions between cells.
use super::CellIndex;
use crate::error::{AdjointError, AdjointResult};

/// Tolerance on the sum of the merge priorities.
const PRIORITY_TOLERANCE: f64 = 1e-9;

/// Shape of a junction, which determines the flow policy used to allocate flows.
#[derive(Clone, Debug, PartialEq)]
pub enum JunctionKind {
    /// One incoming cell and one outgoing cell.
    Simple,
    /// Two incoming cells and one outgoing cell.
    ///
    /// The priorities are used to share the supply of the outgoing cell when the combined demand
    /// exceeds it.
    Merge {
        /// Priorities of the two incoming cells (they sum to 1).
        priorities: [f64; 2],
    },
    /// One incoming cell and any number of outgoing cells.
    Diverge,
}

/// A junction with an ordered list of incoming cells and an ordered list of outgoing cells.
#[derive(Clone, Debug, PartialEq)]
pub struct Junction {
    prev: Vec<CellIndex>,
    next: Vec<CellIndex>,
    kind: JunctionKind,
}

impl Junction {
    /// Creates a new [Junction].
    ///
    /// The kind of the junction is deduced from the number of incoming and outgoing cells.
    /// Priorities are required for (and only for) junctions with two incoming cells.
    ///
    /// Returns an error if the shape of the junction is not supported.
    pub fn new(
        prev: Vec<CellIndex>,
        next: Vec<CellIndex>,
        priorities: Option<[f64; 2]>,
    ) -> AdjointResult<Self> {
        let kind = match (prev.len(), next.len(), priorities) {
            (1, 1, None) => JunctionKind::Simple,
            (1, n, None) if n > 1 => JunctionKind::Diverge,
            (2, 1, Some([p1, p2])) => {
                if !(p1 >= 0.0 && p2 >= 0.0 && (p1 + p2 - 1.0).abs() <= PRIORITY_TOLERANCE) {
                    return Err(AdjointError::Configuration(format!(
                        "Merge priorities must be non-negative and sum to 1 (got {p1} and {p2})"
                    )));
                }
                JunctionKind::Merge {
                    priorities: [p1, 1.0 - p1],
                }
            }
            (2, 1, None) => {
                return Err(AdjointError::Configuration(
                    "Merge junctions require priorities".to_owned(),
                ))
            }
            (_, _, Some(_)) if prev.len() != 2 || next.len() != 1 => {
                return Err(AdjointError::Configuration(
                    "Priorities are only allowed for merge junctions".to_owned(),
                ))
            }
            (p, n, _) => {
                return Err(AdjointError::Configuration(format!(
                    "Unsupported junction with {p} incoming cell(s) and {n} outgoing cell(s)"
                )))
            }
        };
        if has_duplicates(&prev) || has_duplicates(&next) {
            return Err(AdjointError::Configuration(
                "A cell appears twice on the same side of a junction".to_owned(),
            ));
        }
        Ok(Junction { prev, next, kind })
    }

    /// Returns the incoming cells of the junction.
    pub fn prev(&self) -> &[CellIndex] {
        &self.prev
    }

    /// Returns the outgoing cells of the junction.
    pub fn next(&self) -> &[CellIndex] {
        &self.next
    }

    /// Returns the kind of the junction.
    pub const fn kind(&self) -> &JunctionKind {
        &self.kind
    }

    /// Returns the number of (incoming, outgoing) pairs of the junction.
    pub fn nb_pairs(&self) -> usize {
        self.prev.len() * self.next.len()
    }

    /// Returns `true` if the junction has a single outgoing cell.
    ///
    /// All the flow of such junctions goes to the outgoing cell so the turning ratios are
    /// implicitly equal to 1.
    pub fn is_single_output(&self) -> bool {
        self.next.len() == 1
    }

    /// Returns the position of the incoming cell in the list of incoming cells.
    pub fn incoming_position(&self, cell: CellIndex) -> Option<usize> {
        self.prev.iter().position(|&c| c == cell)
    }

    /// Returns the position of the outgoing cell in the list of outgoing cells.
    pub fn outgoing_position(&self, cell: CellIndex) -> Option<usize> {
        self.next.iter().position(|&c| c == cell)
    }
}

fn has_duplicates(cells: &[CellIndex]) -> bool {
    cells
        .iter()
        .enumerate()
        .any(|(i, c)| cells[(i + 1)..].contains(c))
}
