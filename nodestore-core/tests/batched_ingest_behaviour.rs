//! Behavioural tests for batched ingestion using rstest-bdd.

use std::{cell::RefCell, convert::Infallible, fs, num::NonZeroU64, path::PathBuf};

use nodestore_core::{
    BatchError, IngestError, IngestReport, PipelineConfig, Record, ingest,
    test_support::{MemoryNodeStore, MemoryStoreError, RecordingObserver, node_records},
};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

type Outcome = Result<IngestReport, IngestError<Infallible, MemoryStoreError>>;

/// Shared scenario state so each step takes a single world argument.
#[derive(Debug, Default)]
struct IngestWorld {
    store: MemoryNodeStore,
    batch_size: RefCell<Option<NonZeroU64>>,
    records: RefCell<Vec<Record>>,
    observer: RefCell<RecordingObserver>,
    outcome: RefCell<Option<Outcome>>,
}

impl IngestWorld {
    fn expect_report(&self) -> IngestReport {
        self.outcome
            .borrow()
            .as_ref()
            .expect("ingestion was attempted")
            .as_ref()
            .expect("ingestion should succeed")
            .clone()
    }
}

#[fixture]
fn world() -> IngestWorld {
    IngestWorld::default()
}

#[given("a batch size of two")]
fn batch_size_two(world: &IngestWorld) {
    world.batch_size.replace(NonZeroU64::new(2));
}

#[given("a stream of three nodes and one way")]
fn three_nodes_and_a_way(world: &IngestWorld) {
    let mut records = node_records(1..=3);
    records.push(Record::Way { id: 100 });
    world.records.replace(records);
}

#[given("a stream with no nodes")]
fn no_nodes(world: &IngestWorld) {
    world
        .records
        .replace(vec![Record::Way { id: 100 }, Record::Relation { id: 200 }]);
}

#[given("a stream of four nodes")]
fn four_nodes(world: &IngestWorld) {
    world.records.replace(node_records(1..=4));
}

#[given("a stream repeating a node identifier")]
fn repeated_identifier(world: &IngestWorld) {
    world.records.replace(node_records([1, 2, 3, 1]));
}

#[when("I ingest the stream")]
fn ingest_stream(world: &IngestWorld) {
    let batch_size = world
        .batch_size
        .borrow()
        .expect("batch size should be configured");
    let config = PipelineConfig::default().with_batch_size(batch_size);
    let records = world.records.take();
    let outcome = {
        let mut observer = world.observer.borrow_mut();
        ingest(
            &world.store,
            records.into_iter().map(Ok),
            &config,
            &mut *observer,
        )
    };
    world.outcome.replace(Some(outcome));
}

#[then("three nodes are committed")]
fn three_committed(world: &IngestWorld) {
    assert_eq!(world.expect_report().summary.nodes, 3);
    assert_eq!(world.store.committed_ids(), vec![1, 2, 3]);
}

#[then("four nodes are committed")]
fn four_committed(world: &IngestWorld) {
    assert_eq!(world.expect_report().summary.nodes, 4);
    assert_eq!(world.store.committed_ids(), vec![1, 2, 3, 4]);
}

#[then("no nodes are committed")]
fn none_committed(world: &IngestWorld) {
    assert_eq!(world.expect_report().summary.nodes, 0);
    assert!(world.store.committed_ids().is_empty());
}

#[then("one progress notification reports two nodes")]
fn one_notification(world: &IngestWorld) {
    assert_eq!(world.observer.borrow().batch_counts(), &[2]);
}

#[then("two progress notifications report two and four nodes")]
fn two_notifications(world: &IngestWorld) {
    assert_eq!(world.observer.borrow().batch_counts(), &[2, 4]);
}

#[then("the final batch holds one node")]
fn final_batch_one(world: &IngestWorld) {
    assert_eq!(world.store.commit_sizes().last(), Some(&1));
}

#[then("the final batch holds no nodes")]
fn final_batch_empty(world: &IngestWorld) {
    assert_eq!(world.store.commit_sizes().last(), Some(&0));
}

#[then("the coordinate index is built")]
fn index_built(world: &IngestWorld) {
    assert!(world.store.is_indexed(), "expected the coordinate index");
    assert_eq!(
        world
            .observer
            .borrow()
            .finished_report()
            .map(|report| report.summary.nodes),
        Some(world.expect_report().summary.nodes)
    );
}

#[then("the run fails on the duplicate identifier")]
fn fails_on_duplicate(world: &IngestWorld) {
    let borrowed = world.outcome.borrow();
    let outcome = borrowed.as_ref().expect("ingestion was attempted");
    match outcome {
        Err(IngestError::Batch(BatchError::Insert { node_id, .. })) => assert_eq!(*node_id, 1),
        other => panic!("expected an insert failure, got {other:?}"),
    }
}

#[then("only the first batch is committed")]
fn first_batch_only(world: &IngestWorld) {
    assert_eq!(world.store.committed_ids(), vec![1, 2]);
    assert!(!world.store.is_indexed());
}

#[test]
fn scenario_indices_follow_feature_order() {
    let feature =
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/features/batched_ingest.feature");
    let contents = fs::read_to_string(&feature).unwrap_or_else(|err| {
        panic!("failed to read feature file {feature:?}: {err}");
    });
    let titles: Vec<&str> = contents
        .lines()
        .filter_map(|line| line.trim().strip_prefix("Scenario: "))
        .collect();
    assert_eq!(
        titles,
        [
            "rolling over once for three nodes and a way",
            "indexing an empty stream",
            "rolling over on the last record",
            "aborting on a duplicate identifier",
        ]
    );
}

#[scenario(path = "tests/features/batched_ingest.feature", index = 0)]
fn rolls_over_once(world: IngestWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/batched_ingest.feature", index = 1)]
fn indexes_empty_stream(world: IngestWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/batched_ingest.feature", index = 2)]
fn rolls_over_on_last_record(world: IngestWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/batched_ingest.feature", index = 3)]
fn aborts_on_duplicate(world: IngestWorld) {
    let _ = world;
}
