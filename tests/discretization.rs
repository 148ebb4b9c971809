//! Discretization of a graph read from JSON.
use so_dta::layout::Layout;
use so_dta::network::{origin_index, GraphInput, NON_COMPLIANT};
use so_dta::problem::SystemOptimalProblem;

const GRAPH: &str = r#"{
    "links": [
        [1, 3, {"id": 10, "length": 2.0, "free_flow_speed": 1.0, "congestion_wave_speed": 0.5,
                "jam_density": 10.0, "max_flow": 3.0}],
        [2, 3, {"id": 20, "length": 1.0, "free_flow_speed": 1.0, "congestion_wave_speed": 0.5,
                "jam_density": 10.0, "max_flow": 3.0}],
        [3, 4, {"id": 30, "length": 1.0, "free_flow_speed": 1.0, "congestion_wave_speed": 0.5,
                "jam_density": 10.0, "max_flow": 3.0}],
        [4, 5, {"id": 40, "length": 1.0, "free_flow_speed": 1.0, "congestion_wave_speed": 0.5,
                "jam_density": 10.0, "max_flow": 3.0}],
        [4, 6, {"id": 50, "length": 1.0, "free_flow_speed": 1.0, "congestion_wave_speed": 0.5,
                "jam_density": 10.0, "max_flow": 3.0}]
    ],
    "origins": [
        {"node": 1, "demand": 1.0},
        {"node": 2, "demand": [0.5, 0.5, 0.5, 0.5]}
    ],
    "destinations": [{"node": 5}, {"node": 6}],
    "paths": [
        {"links": [10, 30, 40]},
        {"links": [20, 30, 50], "initial_control": 1.5}
    ],
    "priorities": {"3": [0.6, 0.4]},
    "split_ratios": [
        {"incoming": 30, "outgoing": 40, "value": 0.6},
        {"incoming": 30, "outgoing": 50, "value": 0.4}
    ]
}"#;

#[test]
fn graph_test() {
    let graph: GraphInput = serde_json::from_str(GRAPH).unwrap();
    let network = graph.discretize(1.0, 4, 0.5).unwrap();
    // 6 road cells, 2 buffers and 2 sinks.
    assert_eq!(network.nb_cells(), 10);
    // 1 junction inside link 10, 2 origin junctions, 1 merge, 1 diverge, 2 destination junctions.
    assert_eq!(network.nb_junctions(), 7);
    assert_eq!(network.nb_compliant_commodities(), 2);
    let seeded = network.initial_split_ratios();
    assert_eq!(seeded.get(origin_index(0), 0, NON_COMPLIANT), 0.5);
    assert_eq!(seeded.get(origin_index(0), 3, 1), 0.5);
    assert_eq!(seeded.get(origin_index(1), 2, 2), 0.75);
    assert_eq!(network[origin_index(1)].demand(3), 0.5);
    assert_eq!(Layout::new(&network).u_size(), 8);
}

#[test]
fn conservation_test() {
    let graph: GraphInput = serde_json::from_str(GRAPH).unwrap();
    let network = graph.discretize(1.0, 4, 0.5).unwrap();
    let problem = SystemOptimalProblem::new(network, 0.5, 0.001).unwrap();
    let control = problem.starting_point().unwrap();
    // The first origin starts with a control of 1, raised to 1.1.
    assert_eq!(control[0], 1.1);
    assert_eq!(control[1], 1.5);
    let state = problem.forward_simulate(&control).unwrap();
    // All cells have length 1: the vehicles are conserved.
    let mut injected = 0.0;
    for k in 0..4 {
        injected += 1.0 * (0.5 + 0.5 * 1.1) + 0.5 * (0.5 + 0.5 * 1.5);
        let total = state.profile(k).total_density();
        assert!((total - injected).abs() < 1e-12, "Step {k}: {total} != {injected}");
    }
    let x = problem.layout().flatten(problem.network(), &state);
    let h = problem.residual(&x, &control).unwrap();
    assert!(h.iter().all(|v| v.abs() < 1e-9));
}

#[test]
fn invalid_graph_test() {
    let mut graph: GraphInput = serde_json::from_str(GRAPH).unwrap();
    graph.paths[0].links = vec![10, 40];
    assert!(graph.discretize(1.0, 4, 0.5).is_err());
    let mut graph: GraphInput = serde_json::from_str(GRAPH).unwrap();
    graph.split_ratios[0].incoming = Some(10);
    assert!(graph.discretize(1.0, 4, 0.5).is_err());
    let graph: GraphInput = serde_json::from_str(GRAPH).unwrap();
    // Wrong number of demand values.
    assert!(graph.discretize(1.0, 5, 0.5).is_err());
}
