use std::fs;
use std::path::{Path, PathBuf};
use tw_bench::{BenchmarkSet, Scheduler, SolverDescriptor, SolverRegistry, Status, WorkItem};

fn data_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/data")
}

fn item(solver: &str, instance: &str) -> WorkItem {
    WorkItem {
        solver: solver.to_string(),
        instance: data_dir().join(instance),
        timeout: 10,
        benchmark_set: "fixtures".to_string(),
        heuristic: false,
    }
}

#[test]
fn one_broken_solver_does_not_affect_the_others() {
    let dir = tempfile::tempdir().unwrap();
    let registry = SolverRegistry::new(vec![
        SolverDescriptor::new("good", "echo 's td 2 3 4'", dir.path()).unwrap(),
        SolverDescriptor::new("broken", "echo 1", dir.path().join("not-installed")).unwrap(),
    ]);
    let items = vec![
        item("good", "pendant.gr"),
        item("broken", "pendant.gr"),
        item("good", "cycle.gr"),
    ];

    let mut progress = Vec::new();
    let records = Scheduler::new(&registry)
        .jobs(3)
        .run(&items, |done, total, _| progress.push((done, total)));

    assert_eq!(records.len(), 3);
    assert_eq!(progress, vec![(1, 3), (2, 3), (3, 3)]);
    let errors: Vec<_> = records
        .iter()
        .filter(|r| r.status().to_string().starts_with("error:"))
        .collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].solver(), "broken");
    assert!(records
        .iter()
        .filter(|r| r.solver() == "good")
        .all(|r| r.status() == &Status::Ok { treewidth: 2 }));
}

#[test]
fn planned_runs_cover_every_combination() {
    let dir = tempfile::tempdir().unwrap();
    let set_dir = dir.path().join("fixtures");
    fs::create_dir(&set_dir).unwrap();
    for name in &["pendant.gr", "cycle.gr"] {
        fs::copy(data_dir().join(name), set_dir.join(name)).unwrap();
    }
    let set = BenchmarkSet::new("fixtures", &set_dir).unwrap();
    let registry = SolverRegistry::new(vec![
        SolverDescriptor::new("one", "echo 1", dir.path()).unwrap(),
        SolverDescriptor::new("two", "echo 2", dir.path()).unwrap(),
    ]);

    let items = Scheduler::plan(&["one", "two"], &[&set], 10, false, None);
    let records = Scheduler::new(&registry).run(&items, |_, _, _| {});
    let summary: Vec<_> = records
        .iter()
        .map(|r| (r.solver(), r.instance(), r.treewidth()))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("one", "cycle", Some(1)),
            ("one", "pendant", Some(1)),
            ("two", "cycle", Some(2)),
            ("two", "pendant", Some(2)),
        ]
    );
}
