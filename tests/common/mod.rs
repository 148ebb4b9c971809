//! Networks shared by the integration tests.
#![allow(dead_code)]

use so_dta::network::{Cell, Network, NetworkBuilder, NON_COMPLIANT};

/// A link of two cells fed by one origin with one compliant commodity.
///
/// Cells: 0 = c1, 1 = c2, 2 = buffer, 3 = sink.
pub fn single_link(demands: Vec<f64>) -> Network {
    let mut builder = NetworkBuilder::new(1.0, demands.len());
    let c1 = builder.add_cell(Cell::new(1.0, 1.0, 1.0, 100.0, 20.0).unwrap());
    let c2 = builder.add_cell(Cell::new(1.0, 1.0, 1.0, 100.0, 20.0).unwrap());
    builder.add_junction(vec![c1], vec![c2], None).unwrap();
    let origin = builder
        .add_origin(vec![c1], Cell::buffer(1.0, 1.0, 20.0).unwrap(), demands)
        .unwrap();
    builder.add_destination(vec![c2], None).unwrap();
    builder.add_path(origin, vec![c1, c2]);
    builder.build().unwrap()
}

/// Two origins merging into a cell `c` which diverges to two destinations.
///
/// Cells: 0 = a, 1 = b, 2 = c, 3 = d, 4 = e, then the buffers and the sinks.
pub fn merge_diverge(nb_steps: usize, d_densities: &[(usize, f64)]) -> Network {
    let mut builder = NetworkBuilder::new(1.0, nb_steps);
    let road = || Cell::new(1.0, 1.0, 0.5, 10.0, 3.0).unwrap();
    let a = builder.add_cell(road());
    let b = builder.add_cell(road());
    let c = builder.add_cell(road());
    let d = builder.add_cell(road());
    let e = builder.add_cell(road());
    builder.add_junction(vec![a, b], vec![c], Some([0.6, 0.4])).unwrap();
    let diverge = builder.add_junction(vec![c], vec![d, e], None).unwrap();
    let o1 = builder
        .add_origin(vec![a], Cell::buffer(1.0, 1.0, 3.0).unwrap(), vec![1.0; nb_steps])
        .unwrap();
    let o2 = builder
        .add_origin(vec![b], Cell::buffer(1.0, 1.0, 3.0).unwrap(), vec![0.5; nb_steps])
        .unwrap();
    builder.add_destination(vec![d], None).unwrap();
    builder.add_destination(vec![e], None).unwrap();
    builder.add_path(o1, vec![a, c, d]);
    builder.add_path(o2, vec![b, c, e]);
    builder.set_split_ratio(diverge, c, d, NON_COMPLIANT, 0.6);
    builder.set_split_ratio(diverge, c, e, NON_COMPLIANT, 0.4);
    builder.set_origin_split_ratio(o1, NON_COMPLIANT, 0.5);
    builder.set_origin_split_ratio(o2, NON_COMPLIANT, 0.5);
    for (cell, densities) in [
        (a, &[(0, 1.5), (1, 1.0)][..]),
        (b, &[(0, 1.0), (2, 0.75)][..]),
        (c, &[(0, 3.0), (1, 1.0), (2, 1.5)][..]),
        (d, d_densities),
        (e, &[(0, 0.5), (2, 1.0)][..]),
    ] {
        for &(commodity, value) in densities {
            builder.set_initial_density(cell, commodity, value);
        }
    }
    builder.build().unwrap()
}

/// Initial densities of `d` where the diverge is demand-bound.
pub const FREE_D: [(usize, f64); 2] = [(0, 1.0), (1, 0.5)];

/// Initial densities of `d` where the supply of `d` binds at the diverge.
pub const CONGESTED_D: [(usize, f64); 2] = [(0, 8.0), (1, 0.5)];

/// Two origins feeding cells `a` and `b`, which merge into a congested cell `c` leading to a
/// destination.
///
/// Cells: 0 = a, 1 = b, 2 = c, then the buffers and the sink.
pub fn merge(
    nb_steps: usize,
    a_densities: &[(usize, f64)],
    b_densities: &[(usize, f64)],
) -> Network {
    let mut builder = NetworkBuilder::new(1.0, nb_steps);
    let road = || Cell::new(1.0, 1.0, 0.5, 10.0, 3.0).unwrap();
    let a = builder.add_cell(road());
    let b = builder.add_cell(road());
    let c = builder.add_cell(road());
    builder.add_junction(vec![a, b], vec![c], Some([0.6, 0.4])).unwrap();
    let o1 = builder
        .add_origin(vec![a], Cell::buffer(1.0, 1.0, 3.0).unwrap(), vec![0.2; nb_steps])
        .unwrap();
    let o2 = builder
        .add_origin(vec![b], Cell::buffer(1.0, 1.0, 3.0).unwrap(), vec![0.2; nb_steps])
        .unwrap();
    builder.add_destination(vec![c], None).unwrap();
    builder.add_path(o1, vec![a, c]);
    builder.add_path(o2, vec![b, c]);
    builder.set_origin_split_ratio(o1, NON_COMPLIANT, 0.5);
    builder.set_origin_split_ratio(o2, NON_COMPLIANT, 0.5);
    for (cell, densities) in [
        (a, a_densities),
        (b, b_densities),
        (c, &[(0, 4.0), (1, 1.0), (2, 1.0)][..]),
    ] {
        for &(commodity, value) in densities {
            builder.set_initial_density(cell, commodity, value);
        }
    }
    builder.build().unwrap()
}

/// Initial densities of `a` and `b` where the demand of `a` is below its priority share of the
/// supply of `c`.
pub const FIRST_CAPPED: ([(usize, f64); 2], [(usize, f64); 2]) =
    ([(0, 0.25), (1, 0.25)], [(0, 1.5), (2, 1.0)]);

/// Initial densities of `a` and `b` where the demand of `b` is below its priority share of the
/// supply of `c`.
pub const SECOND_CAPPED: ([(usize, f64); 2], [(usize, f64); 2]) =
    ([(0, 1.5), (1, 1.0)], [(0, 0.25), (2, 0.25)]);
