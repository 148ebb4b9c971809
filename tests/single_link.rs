//! End-to-end scenario on a single link of two cells fed by a constant demand of 10 vehicles per
//! time step.
mod common;

use so_dta::adjoint::AdjointProblem;
use so_dta::error::AdjointError;
use so_dta::network::cell_index;
use so_dta::problem::SystemOptimalProblem;

#[test]
fn total_travel_time_test() {
    let problem = SystemOptimalProblem::new(common::single_link(vec![10.0; 5]), 1.0, 0.001).unwrap();
    let control = vec![1.0; 5];
    let state = problem.forward_simulate(&control).unwrap();
    // Each vehicle spends one step in the buffer and in each cell of the link.
    for k in 0..5 {
        let profile = state.profile(k);
        assert_eq!(profile.cell(cell_index(2)).total_density, 10.0);
        assert_eq!(profile.cell(cell_index(0)).total_density, if k >= 1 { 10.0 } else { 0.0 });
        assert_eq!(profile.cell(cell_index(1)).total_density, if k >= 2 { 10.0 } else { 0.0 });
        assert_eq!(profile.cell(cell_index(3)).total_density, 10.0 * (k as f64 - 2.0).max(0.0));
    }
    assert_eq!(problem.total_travel_time(&state), 120.0);
    // The barrier is not defined when the sum of the split ratios is 1.
    assert_eq!(
        AdjointProblem::objective(&problem, &state, &control),
        Err(AdjointError::InfeasibleSplitRatios {
            origin: 0,
            step: 0,
            sum: 1.0
        })
    );
}

#[test]
fn objective_test() {
    let problem = SystemOptimalProblem::new(common::single_link(vec![10.0; 5]), 1.0, 0.001).unwrap();
    let control = vec![1.5; 5];
    let state = problem.forward_simulate(&control).unwrap();
    assert_eq!(problem.total_travel_time(&state), 180.0);
    let objective = problem.objective(&state, &control).unwrap();
    assert!((objective - (180.0 - 5.0 * 0.001 * 0.5f64.ln())).abs() < 1e-9);
}

#[test]
fn gradient_test() {
    let problem = SystemOptimalProblem::new(common::single_link(vec![10.0; 5]), 1.0, 0.001).unwrap();
    let control = vec![1.5; 5];
    let state = problem.forward_simulate(&control).unwrap();
    let gradient = problem.gradient(&state, &control).unwrap();
    // A vehicle injected at step k stays in the network for min(3, 5 - k) steps.
    let expected = [30.0, 30.0, 30.0, 20.0, 10.0];
    for (g, e) in gradient.iter().zip(expected) {
        assert!((g - (e - 0.002)).abs() < 1e-9, "{g} != {e} - 0.002");
    }
}
