// Copyright 2022 Lucas Javaudin
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// https://creativecommons.org/licenses/by-nc-nd/4.0/legalcode

//! Per-commodity values and split-ratio stores.
use hashbrown::HashMap;

use crate::network::{CellIndex, Commodity, JunctionIndex, OriginIndex};

/// Sparse map from commodities to values, sorted by commodity.
///
/// Zero values are never stored and reading a missing commodity returns `0.0`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CommodityMap(Vec<(Commodity, f64)>);

impl CommodityMap {
    /// Creates an empty [CommodityMap].
    pub const fn new() -> Self {
        CommodityMap(Vec::new())
    }

    /// Returns the value of the given commodity.
    pub fn get(&self, commodity: Commodity) -> f64 {
        match self.0.binary_search_by_key(&commodity, |&(c, _)| c) {
            Ok(i) => self.0[i].1,
            Err(_) => 0.0,
        }
    }

    /// Sets the value of the given commodity.
    pub fn set(&mut self, commodity: Commodity, value: f64) {
        match self.0.binary_search_by_key(&commodity, |&(c, _)| c) {
            Ok(i) => {
                if value == 0.0 {
                    self.0.remove(i);
                } else {
                    self.0[i].1 = value;
                }
            }
            Err(i) => {
                if value != 0.0 {
                    self.0.insert(i, (commodity, value));
                }
            }
        }
    }

    /// Adds a value to the current value of the given commodity.
    pub fn add(&mut self, commodity: Commodity, value: f64) {
        let new_value = self.get(commodity) + value;
        self.set(commodity, new_value);
    }

    /// Iterates over the `(commodity, value)` pairs with non-zero values, by increasing
    /// commodity.
    pub fn iter(&self) -> impl Iterator<Item = (Commodity, f64)> + '_ {
        self.0.iter().copied()
    }

    /// Iterates over the commodities with non-zero values.
    pub fn commodities(&self) -> impl Iterator<Item = Commodity> + '_ {
        self.0.iter().map(|&(c, _)| c)
    }

    /// Returns the sum of the values, accumulated by increasing commodity.
    pub fn sum(&self) -> f64 {
        self.0.iter().map(|&(_, v)| v).sum()
    }

    /// Returns the number of commodities with non-zero value.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if all values are zero.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(Commodity, f64)> for CommodityMap {
    fn from_iter<I: IntoIterator<Item = (Commodity, f64)>>(iter: I) -> Self {
        let mut map = CommodityMap::new();
        for (c, v) in iter {
            map.add(c, v);
        }
        map
    }
}

/// Split ratios of the origins: for each origin and each time step, the share of the origin
/// demand assigned to each commodity.
///
/// The values of the compliant commodities are absolute split ratios, i.e., the control scaled by
/// the compliant proportion.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OriginSplitRatios(Vec<Vec<CommodityMap>>);

impl OriginSplitRatios {
    /// Creates a store with no split ratio for the given number of origins and time steps.
    pub fn new(nb_origins: usize, nb_steps: usize) -> Self {
        OriginSplitRatios(vec![vec![CommodityMap::new(); nb_steps]; nb_origins])
    }

    /// Returns the split ratio of a commodity at an origin and time step.
    pub fn get(&self, origin: OriginIndex, step: usize, commodity: Commodity) -> f64 {
        self.0[origin.index()][step].get(commodity)
    }

    /// Sets the split ratio of a commodity at an origin and time step.
    pub fn set(&mut self, origin: OriginIndex, step: usize, commodity: Commodity, value: f64) {
        self.0[origin.index()][step].set(commodity, value);
    }

    /// Returns the split ratios of all commodities at an origin and time step.
    pub fn at(&self, origin: OriginIndex, step: usize) -> &CommodityMap {
        &self.0[origin.index()][step]
    }

    /// Returns the number of time steps.
    pub fn nb_steps(&self) -> usize {
        self.0.first().map(|steps| steps.len()).unwrap_or(0)
    }
}

/// Turning ratios at the junctions: for each junction and each time step, the share of the
/// out-flow of a commodity from an incoming cell that goes to an outgoing cell.
///
/// Missing ratios are zero.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct JunctionSplitRatios(Vec<Vec<HashMap<(CellIndex, CellIndex, Commodity), f64>>>);

impl JunctionSplitRatios {
    /// Creates a store with no split ratio for the given number of junctions and time steps.
    pub fn new(nb_junctions: usize, nb_steps: usize) -> Self {
        JunctionSplitRatios(vec![vec![HashMap::new(); nb_steps]; nb_junctions])
    }

    /// Returns the split ratio of a commodity between two cells, at a junction and time step.
    pub fn get(
        &self,
        junction: JunctionIndex,
        step: usize,
        incoming: CellIndex,
        outgoing: CellIndex,
        commodity: Commodity,
    ) -> f64 {
        self.0[junction.index()][step]
            .get(&(incoming, outgoing, commodity))
            .copied()
            .unwrap_or(0.0)
    }

    /// Sets the split ratio of a commodity between two cells, at a junction and time step.
    pub fn set(
        &mut self,
        junction: JunctionIndex,
        step: usize,
        incoming: CellIndex,
        outgoing: CellIndex,
        commodity: Commodity,
        value: f64,
    ) {
        let ratios = &mut self.0[junction.index()][step];
        if value == 0.0 {
            ratios.remove(&(incoming, outgoing, commodity));
        } else {
            ratios.insert((incoming, outgoing, commodity), value);
        }
    }

    /// Iterates over the `((incoming, outgoing, commodity), ratio)` entries of a junction at a
    /// time step.
    pub fn iter_at(
        &self,
        junction: JunctionIndex,
        step: usize,
    ) -> impl Iterator<Item = (&(CellIndex, CellIndex, Commodity), &f64)> {
        self.0[junction.index()][step].iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{cell_index, junction_index, origin_index};

    #[test]
    fn commodity_map_test() {
        let mut map = CommodityMap::new();
        assert_eq!(map.get(3), 0.0);
        map.set(3, 1.5);
        map.set(0, 2.0);
        map.add(1, 0.5);
        assert_eq!(map.iter().collect::<Vec<_>>(), vec![(0, 2.0), (1, 0.5), (3, 1.5)]);
        assert_eq!(map.sum(), 4.0);
        map.add(1, -0.5);
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(1), 0.0);
        map.set(3, 0.0);
        assert_eq!(map.commodities().collect::<Vec<_>>(), vec![0]);
        let map: CommodityMap = vec![(2, 1.0), (2, 1.0), (1, 0.0)].into_iter().collect();
        assert_eq!(map.iter().collect::<Vec<_>>(), vec![(2, 2.0)]);
    }

    #[test]
    fn origin_split_ratios_test() {
        let mut ratios = OriginSplitRatios::new(2, 3);
        assert_eq!(ratios.nb_steps(), 3);
        ratios.set(origin_index(1), 2, 4, 0.25);
        assert_eq!(ratios.get(origin_index(1), 2, 4), 0.25);
        assert_eq!(ratios.get(origin_index(0), 2, 4), 0.0);
        assert_eq!(ratios.at(origin_index(1), 2).len(), 1);
    }

    #[test]
    fn junction_split_ratios_test() {
        let mut ratios = JunctionSplitRatios::new(1, 2);
        let (a, b) = (cell_index(0), cell_index(1));
        ratios.set(junction_index(0), 1, a, b, 0, 0.4);
        assert_eq!(ratios.get(junction_index(0), 1, a, b, 0), 0.4);
        assert_eq!(ratios.get(junction_index(0), 0, a, b, 0), 0.0);
        ratios.set(junction_index(0), 1, a, b, 0, 0.0);
        assert_eq!(ratios.iter_at(junction_index(0), 1).count(), 0);
    }
}
