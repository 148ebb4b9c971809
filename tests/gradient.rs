//! Adjoint gradient against finite differences of the simulated objective `U -> J(X(U), U)`.
mod common;

use so_dta::adjoint::AdjointProblem;
use so_dta::network::Network;
use so_dta::problem::SystemOptimalProblem;

fn check_gradient(network: Network, alpha: f64, control: Vec<f64>) {
    let problem = SystemOptimalProblem::new(network, alpha, 0.001).unwrap();
    let state = problem.forward_simulate(&control).unwrap();
    let gradient = problem.gradient(&state, &control).unwrap();
    assert_eq!(gradient.len(), control.len());
    let h = 1e-6;
    for j in 0..control.len() {
        let mut plus = control.clone();
        let mut minus = control.clone();
        plus[j] += h;
        minus[j] -= h;
        let fd = (problem.reduced_objective(&plus).unwrap()
            - problem.reduced_objective(&minus).unwrap())
            / (2.0 * h);
        assert!(
            (fd - gradient[j]).abs() <= 1e-5 * gradient[j].abs().max(1.0),
            "Control {j}: finite difference {fd}, adjoint {}",
            gradient[j]
        );
    }
}

#[test]
fn single_link_gradient_test() {
    check_gradient(common::single_link(vec![10.0; 5]), 1.0, vec![1.5; 5]);
}

#[test]
fn merge_diverge_gradient_test() {
    check_gradient(
        common::merge_diverge(3, &common::FREE_D),
        0.5,
        vec![1.2, 1.3, 1.25, 1.4, 1.2, 1.3],
    );
}
