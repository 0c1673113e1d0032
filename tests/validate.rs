use std::fs;
use std::path::{Path, PathBuf};
use tw_bench::tree_decomposition::validate_text;
use tw_bench::Violation;

fn read(name: &str) -> String {
    let path: PathBuf = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/data")
        .join(name);
    fs::read_to_string(path).unwrap()
}

#[test]
fn optimal_decomposition_is_valid() {
    let validation = validate_text(&read("pendant.gr"), &read("pendant.td")).unwrap();
    assert!(validation.is_valid());
    assert_eq!(validation.treewidth, 2);
}

#[test]
fn every_defect_is_reported() {
    let validation = validate_text(&read("pendant.gr"), &read("pendant_broken.td")).unwrap();
    assert!(!validation.is_valid());
    assert_eq!(validation.treewidth, 1);
    assert_eq!(
        validation.violations,
        vec![
            Violation::MissingVertex(4),
            Violation::MissingEdge((3, 4)),
            Violation::NotInducingSubtree(1),
            Violation::NotInducingSubtree(3),
        ]
    );
    let messages: Vec<String> = validation.violations.iter().map(|v| v.to_string()).collect();
    assert_eq!(messages[0], "Vertex 4 not in any bag");
    assert_eq!(messages[1], "Edge (3,4) not covered by any bag");
    assert_eq!(messages[2], "Bags for vertex 1 are not connected");
}

#[test]
fn decomposition_of_another_graph() {
    let validation = validate_text(&read("cycle.gr"), &read("pendant.td")).unwrap();
    assert!(validation
        .violations
        .contains(&Violation::MissingVertex(5)));
    assert!(validation
        .violations
        .contains(&Violation::MissingEdge((5, 1))));
}

#[test]
fn graph_without_header_is_rejected() {
    assert!(validate_text("1 2\n", &read("pendant.td")).is_err());
}
