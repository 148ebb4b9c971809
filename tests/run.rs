//! Full run from JSON input files.
use std::fs;

use serde_json::{json, Value};

#[test]
fn run_optimization_test() {
    let dir = std::env::temp_dir().join(format!("so_dta_run_{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    let link = |id: u64| {
        json!({
            "id": id,
            "length": 1.0,
            "free_flow_speed": 1.0,
            "congestion_wave_speed": 1.0,
            "jam_density": 100.0,
            "max_flow": 20.0
        })
    };
    let graph = json!({
        "links": [[0, 1, link(0)], [1, 2, link(1)]],
        "origins": [{"node": 0, "demand": 10.0}],
        "destinations": [{"node": 2}],
        "paths": [{"links": [0, 1], "initial_control": 1.5}]
    });
    fs::write(dir.join("network.json"), graph.to_string()).unwrap();
    let parameters = json!({
        "input_files": {"network": "network.json"},
        "output_directory": "output",
        "time_step": 1.0,
        "nb_steps": 5,
        "alpha": 1.0,
        "optimizer": {
            "stopping_criteria": [{"type": "MaxIteration", "value": 5}]
        }
    });
    let parameters_path = dir.join("parameters.json");
    fs::write(&parameters_path, parameters.to_string()).unwrap();

    so_dta::run_optimization(&parameters_path).unwrap();

    let output = dir.join("output");
    assert!(output.join("log.txt").is_file());
    let results: Value =
        serde_json::from_slice(&fs::read(output.join("results.json")).unwrap()).unwrap();
    let iterations = results["iterations"].as_u64().unwrap();
    assert!(iterations > 0 && iterations <= 5);
    let history = results["objective_history"].as_array().unwrap();
    assert_eq!(history.len() as u64, iterations + 1);
    let total_travel_time = results["total_travel_time"].as_f64().unwrap();
    assert!(total_travel_time > 120.0 && total_travel_time < 180.0);
    assert_eq!(results["control"].as_array().unwrap().len(), 5);
    fs::remove_dir_all(&dir).unwrap();
}
