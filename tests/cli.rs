use std::fs;
use std::process::Command;
use tempfile::TempDir;

const STUDENTS: &str = r#"[
    {"id": "A", "options": {"languages": ["EN", "FR"]}},
    {"id": "B", "options": {"languages": ["FR", "DE"]}},
    {"id": "C", "options": {"languages": ["EN"]}}
]"#;

#[test]
fn missing_input_fails_without_creating_output() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("absent.json");
    let results = temp_dir.path().join("results");

    let output = Command::new(env!("CARGO_BIN_EXE_cohort-clusterer"))
        .args([
            "--input",
            input.to_str().unwrap(),
            "--output-dir",
            results.to_str().unwrap(),
        ])
        .output()
        .expect("Failed to execute cohort-clusterer");

    assert!(!output.status.success());
    assert!(!results.exists(), "failed run left {}", results.display());
}

#[test]
fn both_pipelines_write_their_directories() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("students.json");
    let results = temp_dir.path().join("results");
    fs::write(&input, STUDENTS).unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_cohort-clusterer"))
        .args([
            "--input",
            input.to_str().unwrap(),
            "--output-dir",
            results.to_str().unwrap(),
            "--min-cluster-size",
            "0",
            "--max-cluster-size",
            "10",
            "--skip-viz",
        ])
        .output()
        .expect("Failed to execute cohort-clusterer");

    assert!(
        output.status.success(),
        "Command failed with status: {:?}\nstderr: {}",
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(results.join("graph/clusters/0.json").exists());
    assert!(results.join("kmeans/clusters/2.json").exists());
}

#[test]
fn invalid_friend_weight_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("students.json");
    let results = temp_dir.path().join("results");
    fs::write(&input, STUDENTS).unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_cohort-clusterer"))
        .args([
            "--input",
            input.to_str().unwrap(),
            "--output-dir",
            results.to_str().unwrap(),
            "--friend-weight",
            "0",
        ])
        .output()
        .expect("Failed to execute cohort-clusterer");

    assert!(!output.status.success());
    assert!(!results.exists());
}
