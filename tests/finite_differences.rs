//! Comparison of the analytic Jacobians with central finite differences of the residual and of
//! the objective, at simulated states away from the kinks of the flow policies.
mod common;

use so_dta::network::{cell_index, Network};
use so_dta::problem::SystemOptimalProblem;
use so_dta::sparse::SparseMatrix;

const STEP: f64 = 1e-6;
const TOLERANCE: f64 = 1e-5;

fn close(fd: f64, analytic: f64) -> bool {
    (fd - analytic).abs() <= TOLERANCE * analytic.abs().max(1.0)
}

/// Perturbs coordinate `j` of `v` by `+STEP` and `-STEP`; returns `None` if the perturbation is
/// lost in rounding (e.g., for the infinite supply of the sinks).
fn perturb(v: &[f64], j: usize) -> Option<(Vec<f64>, Vec<f64>, f64)> {
    let mut plus = v.to_vec();
    let mut minus = v.to_vec();
    plus[j] += STEP;
    minus[j] -= STEP;
    let width = plus[j] - minus[j];
    if width == 0.0 {
        None
    } else {
        Some((plus, minus, width))
    }
}

fn check_matrix<F>(matrix: &SparseMatrix, point: &[f64], residual: F, name: &str)
where
    F: Fn(&[f64]) -> Vec<f64>,
{
    assert_eq!(matrix.ncols(), point.len());
    for j in 0..point.len() {
        let Some((plus, minus, width)) = perturb(point, j) else {
            continue;
        };
        let (h_plus, h_minus) = (residual(&plus), residual(&minus));
        for i in 0..matrix.nrows() {
            let fd = (h_plus[i] - h_minus[i]) / width;
            let analytic = matrix.get(i, j);
            assert!(
                close(fd, analytic),
                "{name} at ({i}, {j}): finite difference {fd}, analytic {analytic}"
            );
        }
    }
}

fn check_gradient<F>(gradient: &[f64], point: &[f64], objective: F, name: &str)
where
    F: Fn(&[f64]) -> f64,
{
    assert_eq!(gradient.len(), point.len());
    for j in 0..point.len() {
        let Some((plus, minus, width)) = perturb(point, j) else {
            continue;
        };
        let fd = (objective(&plus) - objective(&minus)) / width;
        assert!(
            close(fd, gradient[j]),
            "{name} at {j}: finite difference {fd}, analytic {}",
            gradient[j]
        );
    }
}

fn check_all(network: Network, alpha: f64, u: f64) {
    let problem = SystemOptimalProblem::new(network, alpha, 0.001).unwrap();
    let control = vec![u; problem.layout().u_size()];
    let state = problem.forward_simulate(&control).unwrap();
    let x = problem.layout().flatten(problem.network(), &state);

    let h = problem.residual(&x, &control).unwrap();
    assert!(h.iter().all(|v| v.abs() < 1e-9));

    let dhdx = problem.dhdx(&state, &control).unwrap();
    check_matrix(
        &dhdx,
        &x,
        |x| problem.residual(x, &control).unwrap(),
        "dH/dX",
    );
    let dhdu = problem.dhdu(&state, &control).unwrap();
    check_matrix(
        &dhdu,
        &control,
        |u| problem.residual(&x, u).unwrap(),
        "dH/dU",
    );
    let djdx = problem.djdx(&state, &control).unwrap();
    check_gradient(
        &djdx,
        &x,
        |x| problem.objective_at(x, &control).unwrap(),
        "dJ/dX",
    );
    let djdu = problem.djdu(&state, &control).unwrap();
    check_gradient(
        &djdu,
        &control,
        |u| problem.objective_at(&x, u).unwrap(),
        "dJ/dU",
    );
}

#[test]
fn single_link_jacobians_test() {
    check_all(common::single_link(vec![10.0; 4]), 1.0, 1.5);
}

#[test]
fn merge_diverge_jacobians_test() {
    check_all(common::merge_diverge(3, &common::FREE_D), 0.5, 1.2);
}

#[test]
fn congested_diverge_jacobians_test() {
    check_all(common::merge_diverge(3, &common::CONGESTED_D), 0.5, 1.2);
}

/// Checks the flows leaving `a` and `b` at the first step, then all the Jacobians.
fn check_merge(network: Network, flows: [f64; 2]) {
    let problem = SystemOptimalProblem::new(network.clone(), 0.5, 0.001).unwrap();
    let state = problem.forward_simulate(&[1.2; 4]).unwrap();
    for (i, flow) in flows.into_iter().enumerate() {
        let out_flow = state.profile(0).cell(cell_index(i)).out_flows.sum();
        assert!((out_flow - flow).abs() < 1e-12, "Cell {i}: {out_flow}");
    }
    check_all(network, 0.5, 1.2);
}

#[test]
fn first_capped_merge_jacobians_test() {
    // Supply of c = 2, demands 0.5 and 2.5: a is served fully, b gets the rest.
    let (a, b) = common::FIRST_CAPPED;
    check_merge(common::merge(2, &a, &b), [0.5, 1.5]);
}

#[test]
fn second_capped_merge_jacobians_test() {
    let (a, b) = common::SECOND_CAPPED;
    check_merge(common::merge(2, &a, &b), [1.5, 0.5]);
}
