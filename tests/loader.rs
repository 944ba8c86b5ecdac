//! DAG document parsing and validation.

use std::io::Write;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::json;

use dagsim::dag::{StageStatus, TaskStatus, load_from_path};
use dagsim::errors::DagsimError;
use dagsim_test_utils::builders::{DagBuilder, StageBuilder};

fn rng() -> StdRng {
    StdRng::seed_from_u64(7)
}

fn write_doc(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn loads_a_two_stage_document() {
    let doc = DagBuilder::new()
        .stage(StageBuilder::new(0).partitions(2).avg(5.0))
        .stage(
            StageBuilder::new(1)
                .dep(0)
                .partitions(2)
                .avg(5.0)
                .shuffle_avg(3.0),
        )
        .to_json();
    let file = write_doc(&doc);

    let dag = load_from_path(file.path(), &mut rng()).unwrap();
    assert_eq!(dag.stages.len(), 2);
    assert_eq!(dag.stages[0].status, StageStatus::Pending);
    assert_eq!(dag.stages[1].deps, vec![0]);
    assert_eq!(dag.stages[1].stats.shuffle_avg, Some(3.0));
    assert_eq!(dag.stages[0].tasks.len(), 2);
    assert!(
        dag.stages[0]
            .tasks
            .iter()
            .all(|t| t.status == TaskStatus::Pending && t.current.is_none())
    );
}

#[test]
fn accepts_integer_and_human_readable_sizes() {
    let doc = DagBuilder::new()
        .stage(
            StageBuilder::new(0)
                .partitions(4)
                .avg(1.0)
                .input(json!({
                    "size": "64 MB",
                    "partitions": 4,
                    "distribution": { "kind": "uniform" }
                }))
                .output(json!({
                    "size": 1048576,
                    "partitions": 4,
                    "distribution": { "kind": "zipf", "alpha": 2.0 }
                })),
        )
        .to_json();
    let file = write_doc(&doc);

    let dag = load_from_path(file.path(), &mut rng()).unwrap();
    let input = dag.stages[0].input.as_ref().unwrap();
    assert_eq!(input.size, 64_000_000);
    let split_sum: f64 = input.splits.iter().sum();
    assert!((split_sum - input.size as f64).abs() < 1e-3);

    let output = dag.stages[0].output.as_ref().unwrap();
    assert_eq!(output.size, 1_048_576);
    assert_eq!(output.splits.len(), 4);
}

#[test]
fn splits_are_reproducible_from_the_seed() {
    let doc = || {
        DagBuilder::new()
            .stage(
                StageBuilder::new(0)
                    .partitions(8)
                    .avg(1.0)
                    .input(json!({
                        "size": "1 GB",
                        "partitions": 8,
                        "distribution": { "kind": "pareto", "alpha": 1.2 }
                    })),
            )
            .to_json()
    };
    let file_a = write_doc(&doc());
    let file_b = write_doc(&doc());

    let a = load_from_path(file_a.path(), &mut StdRng::seed_from_u64(11)).unwrap();
    let b = load_from_path(file_b.path(), &mut StdRng::seed_from_u64(11)).unwrap();
    assert_eq!(
        a.stages[0].input.as_ref().unwrap().splits,
        b.stages[0].input.as_ref().unwrap().splits
    );
}

#[test]
fn missing_file_is_an_io_error() {
    let err = load_from_path("/nonexistent/dag.json", &mut rng()).unwrap_err();
    assert!(matches!(err, DagsimError::Io(_)));
}

#[test]
fn malformed_json_is_a_parse_error() {
    let file = write_doc("{ not json");
    let err = load_from_path(file.path(), &mut rng()).unwrap_err();
    assert!(matches!(err, DagsimError::Json(_)));
}

#[test]
fn id_must_match_position() {
    let doc = DagBuilder::new()
        .stage(StageBuilder::new(1).partitions(1).avg(1.0))
        .to_json();
    let file = write_doc(&doc);
    let err = load_from_path(file.path(), &mut rng()).unwrap_err();
    assert!(matches!(err, DagsimError::InvalidDag(_)));
}

#[test]
fn deps_must_precede_their_stage() {
    let doc = DagBuilder::new()
        .stage(
            StageBuilder::new(0)
                .dep(0)
                .partitions(1)
                .avg(1.0)
                .shuffle_avg(1.0),
        )
        .to_json();
    let file = write_doc(&doc);
    let err = load_from_path(file.path(), &mut rng()).unwrap_err();
    assert!(matches!(err, DagsimError::InvalidDag(_)));
}

#[test]
fn zero_partitions_is_rejected() {
    let doc = DagBuilder::new()
        .stage(StageBuilder::new(0).partitions(0).avg(1.0))
        .to_json();
    let file = write_doc(&doc);
    let err = load_from_path(file.path(), &mut rng()).unwrap_err();
    assert!(matches!(err, DagsimError::InvalidDag(_)));
}

#[test]
fn dependent_stage_requires_shuffle_stats() {
    let doc = DagBuilder::new()
        .stage(StageBuilder::new(0).partitions(1).avg(1.0))
        .stage(StageBuilder::new(1).dep(0).partitions(1).avg(1.0))
        .to_json();
    let file = write_doc(&doc);
    let err = load_from_path(file.path(), &mut rng()).unwrap_err();
    assert!(matches!(err, DagsimError::InvalidDag(_)));
}

#[test]
fn unknown_distribution_kind_is_rejected() {
    let doc = DagBuilder::new()
        .stage(
            StageBuilder::new(0)
                .partitions(2)
                .avg(1.0)
                .input(json!({
                    "size": 1024,
                    "partitions": 2,
                    "distribution": { "kind": "weibull", "k": 2.0 }
                })),
        )
        .to_json();
    let file = write_doc(&doc);
    let err = load_from_path(file.path(), &mut rng()).unwrap_err();
    assert!(matches!(err, DagsimError::Json(_)));
}
