// tests/debug_executor.rs

use std::sync::Arc;
use std::time::Duration;

use modelflow::engine::{DebugExecutor, NodeStatus, RuntimeContext, Scheduler};
use modelflow::errors::ModelflowError;
use modelflow::task::{Payload, TaskSet, TestCase};
use modelflow_test_utils::fake_task::{FakeTask, execution_log};
use modelflow_test_utils::observer::{Observed, RecordingObserver};
use modelflow_test_utils::{init_tracing, with_timeout};

fn pipeline() -> TaskSet {
    TaskSet::new()
        .with_task(FakeTask::new("A"))
        .with_task(FakeTask::new("B").after("A"))
        .with_task(FakeTask::new("C").after("A"))
        .with_task(FakeTask::new("D").after("B").after("C"))
}

fn executor(tasks: &TaskSet, ctx: RuntimeContext) -> (DebugExecutor, Arc<RecordingObserver>) {
    let observer = Arc::new(RecordingObserver::new());
    let exec = DebugExecutor::new(ctx.with_observer(observer.clone()), tasks).unwrap();
    (exec, observer)
}

#[tokio::test]
async fn fresh_executor_reports_initial_state() {
    init_tracing();
    let (exec, _observer) = executor(&pipeline(), RuntimeContext::new(Some(1)));

    let snapshot = exec.snapshot();
    assert_eq!(snapshot.invocation_id, None);
    assert_eq!(
        snapshot.levels,
        vec![vec!["A".to_string()], vec!["B".into(), "C".into()], vec!["D".into()]]
    );
    assert!(snapshot.nodes.iter().all(|n| n.status == NodeStatus::Initial));
    assert_eq!(snapshot.totals.nodes, 4);
    assert_eq!(snapshot.totals.initial, 4);
    assert!(!exec.is_busy());
}

#[tokio::test]
async fn every_node_succeeds_in_level_order() {
    init_tracing();
    let log = execution_log();
    let tasks = TaskSet::new()
        .with_task(FakeTask::new("A").logging_to(log.clone()))
        .with_task(FakeTask::new("B").after("A").logging_to(log.clone()))
        .with_task(FakeTask::new("C").after("A").logging_to(log.clone()))
        .with_task(FakeTask::new("D").after("B").after("C").logging_to(log.clone()));
    let (exec, _observer) = executor(&tasks, RuntimeContext::new(Some(1)));

    let results = with_timeout(exec.execute("inv-1", Payload::Empty)).await.unwrap();
    assert_eq!(results.keys().collect::<Vec<_>>(), vec!["D"]);
    assert_eq!(
        results["D"].as_map().unwrap()["edges"],
        serde_json::json!(["B", "C"])
    );

    let order: Vec<String> = log.lock().unwrap().iter().map(|(n, _)| n.clone()).collect();
    assert_eq!(order, vec!["A", "B", "C", "D"]);

    for name in ["A", "B", "C", "D"] {
        assert_eq!(exec.status_of(name), Some(NodeStatus::Success));
    }
    let a = exec.node_state("A").unwrap();
    assert!(a.started_at.is_some());
    assert!(a.ended_at.is_some());
    assert_eq!(a.downstreams, vec!["B".to_string(), "C".to_string()]);
    assert_eq!(exec.snapshot().invocation_id.as_deref(), Some("inv-1"));
    assert_eq!(exec.totals().succeeded, 4);
}

#[tokio::test]
async fn failure_is_recorded_and_run_continues() {
    init_tracing();
    let tasks = TaskSet::new()
        .with_task(FakeTask::new("A"))
        .with_task(FakeTask::new("B").after("A").failing("relation missing"))
        .with_task(FakeTask::new("C").after("A"))
        .with_task(FakeTask::new("D").after("B").after("C"));
    let (exec, observer) = executor(&tasks, RuntimeContext::new(Some(1)));

    let results = with_timeout(exec.execute("inv-1", Payload::Empty)).await.unwrap();

    let b = exec.node_state("B").unwrap();
    assert_eq!(b.status, NodeStatus::Failed);
    assert_eq!(b.last_error.as_deref(), Some("relation missing"));
    assert!(b.last_result.is_none());

    // D still runs, seeing only the upstream that produced a result.
    assert_eq!(exec.status_of("D"), Some(NodeStatus::Success));
    assert_eq!(
        results["D"].as_map().unwrap()["edges"],
        serde_json::json!(["C"])
    );

    let totals = exec.totals();
    assert_eq!(totals.failed, 1);
    assert_eq!(totals.succeeded, 3);
    assert!(observer.events().contains(&Observed::Failed {
        invocation: "inv-1".into(),
        node: "B".into(),
        error: "relation missing".into(),
    }));
}

#[tokio::test]
async fn failing_leaf_is_absent_from_results() {
    init_tracing();
    let tasks = TaskSet::new()
        .with_task(FakeTask::new("A"))
        .with_task(FakeTask::new("B").after("A").failing("boom"))
        .with_task(FakeTask::new("C").after("A"));
    let (exec, observer) = executor(&tasks, RuntimeContext::new(Some(1)));

    let results = with_timeout(exec.execute("inv-1", Payload::Empty)).await.unwrap();
    assert_eq!(results.keys().collect::<Vec<_>>(), vec!["C"]);
    assert!(observer.events().contains(&Observed::Completed {
        invocation: "inv-1".into(),
        delivered: 1,
        leaves: 2,
    }));
}

#[tokio::test]
async fn passing_tests_leave_node_successful() {
    init_tracing();
    let ctx = RuntimeContext::new(Some(1)).with_tests(
        "B",
        vec![TestCase::new("not_null", "id"), TestCase::new("unique", "id")],
    );
    let (exec, observer) = executor(&pipeline(), ctx);

    with_timeout(exec.execute("inv-1", Payload::Empty)).await.unwrap();

    let b = exec.node_state("B").unwrap();
    assert_eq!(b.status, NodeStatus::Success);
    assert_eq!(b.tests_passed, 2);
    assert_eq!(b.tests_failed, 0);
    assert_eq!(b.tests.len(), 2);
    assert_eq!(b.test_duration, Duration::from_millis(2));
    assert!(observer.events().contains(&Observed::TestsFinished {
        invocation: "inv-1".into(),
        node: "B".into(),
        passed: 2,
        failed: 0,
    }));
}

#[tokio::test]
async fn failing_test_marks_node_failed_but_keeps_result() {
    init_tracing();
    let tasks = TaskSet::new()
        .with_task(FakeTask::new("A"))
        .with_task(
            FakeTask::new("B")
                .after("A")
                .returning(Payload::rows("orders", 10))
                .with_test_result("unique", false),
        );
    let ctx = RuntimeContext::new(Some(1)).with_tests(
        "B",
        vec![TestCase::new("not_null", "id"), TestCase::new("unique", "id")],
    );
    let (exec, _observer) = executor(&tasks, ctx);

    let results = with_timeout(exec.execute("inv-1", Payload::Empty)).await.unwrap();
    assert_eq!(results["B"], Payload::rows("orders", 10));

    let b = exec.node_state("B").unwrap();
    assert_eq!(b.status, NodeStatus::Failed);
    assert_eq!(b.tests_passed, 1);
    assert_eq!(b.tests_failed, 1);
    assert_eq!(b.last_error.as_deref(), Some("1 of 2 tests failed"));
    let failed: Vec<&str> = b.tests.iter().filter(|t| !t.passed).map(|t| t.name.as_str()).collect();
    assert_eq!(failed, vec!["unique"]);

    let totals = exec.totals();
    assert_eq!(totals.tests_passed, 1);
    assert_eq!(totals.tests_failed, 1);
}

#[tokio::test]
async fn state_is_reset_between_invocations() {
    init_tracing();
    let ctx = RuntimeContext::new(Some(1)).with_tests("A", vec![TestCase::new("t", "")]);
    let tasks = TaskSet::new()
        .with_task(FakeTask::new("A").with_test_result("t", false))
        .with_task(FakeTask::new("B").after("A"));
    let (exec, _observer) = executor(&tasks, ctx);

    with_timeout(exec.execute("inv-1", Payload::Empty)).await.unwrap();
    assert_eq!(exec.totals().tests_failed, 1);

    with_timeout(exec.execute("inv-2", Payload::Empty)).await.unwrap();
    let snapshot = exec.snapshot();
    assert_eq!(snapshot.invocation_id.as_deref(), Some("inv-2"));
    // Counts are per run, not cumulative.
    assert_eq!(snapshot.totals.tests_failed, 1);
    assert_eq!(snapshot.node("A").unwrap().tests.len(), 1);
    assert_eq!(
        snapshot.node("B").unwrap().last_result.as_ref().unwrap().as_map().unwrap()["invocation"],
        "inv-2"
    );
}

#[tokio::test]
async fn snapshot_serializes_durations_as_millis() {
    init_tracing();
    let (exec, _observer) = executor(&pipeline(), RuntimeContext::new(Some(1)));
    with_timeout(exec.execute("inv-1", Payload::Empty)).await.unwrap();

    let json = serde_json::to_value(exec.snapshot()).unwrap();
    assert_eq!(json["invocation_id"], "inv-1");
    assert_eq!(json["totals"]["succeeded"], 4);
    assert!(json["totals"]["execution_ms"].is_u64());
    let first = &json["nodes"][0];
    assert_eq!(first["name"], "A");
    assert_eq!(first["status"], "success");
    assert!(first["test_ms"].is_u64());
}

#[tokio::test]
async fn unknown_node_has_no_state() {
    let (exec, _observer) = executor(&pipeline(), RuntimeContext::new(Some(1)));
    assert!(exec.node_state("nope").is_none());
    assert!(exec.status_of("nope").is_none());
}

#[tokio::test]
async fn scheduler_runs_pushed_invocations_sequentially() {
    init_tracing();
    let log = execution_log();
    let tasks = TaskSet::new()
        .with_task(
            FakeTask::new("A")
                .with_delay(Duration::from_millis(5))
                .logging_to(log.clone()),
        )
        .with_task(FakeTask::new("B").after("A").logging_to(log.clone()));
    let (exec, observer) = executor(&tasks, RuntimeContext::new(Some(4)));

    let wait = exec.run().unwrap();
    let first = exec.push("inv-1".into(), Payload::Empty).await.unwrap();
    let second = exec.push("inv-2".into(), Payload::Empty).await.unwrap();

    let r1 = with_timeout(first).await.unwrap();
    let r2 = with_timeout(second).await.unwrap();
    assert!(r1.contains_key("B"));
    assert!(r2.contains_key("B"));

    // Never interleaved: each invocation runs every node before the next starts.
    let entries = log.lock().unwrap().clone();
    let expected: Vec<(String, String)> = [("A", "inv-1"), ("B", "inv-1"), ("A", "inv-2"), ("B", "inv-2")]
        .iter()
        .map(|(n, i)| (n.to_string(), i.to_string()))
        .collect();
    assert_eq!(entries, expected);
    assert_eq!(observer.completions(), vec!["inv-1".to_string(), "inv-2".to_string()]);

    with_timeout(exec.stop()).await.unwrap();
    assert!(wait.is_finished());
}

#[tokio::test]
async fn scheduler_lifecycle_errors() {
    init_tracing();
    let (exec, _observer) = executor(&pipeline(), RuntimeContext::new(Some(1)));

    assert!(matches!(
        exec.push("early".into(), Payload::Empty).await,
        Err(ModelflowError::NotRunning)
    ));

    exec.run().unwrap();
    assert!(matches!(exec.run(), Err(ModelflowError::AlreadyRunning)));

    with_timeout(exec.stop()).await.unwrap();
    with_timeout(exec.stop()).await.unwrap();
    assert!(matches!(
        exec.push("late".into(), Payload::Empty).await,
        Err(ModelflowError::Stopped)
    ));
}

#[tokio::test]
async fn duplicate_in_flight_invocation_is_rejected() {
    init_tracing();
    let tasks = TaskSet::new().with_task(FakeTask::new("A").with_delay(Duration::from_millis(100)));
    let (exec, _observer) = executor(&tasks, RuntimeContext::new(Some(2)));
    exec.run().unwrap();

    let first = exec.push("same".into(), Payload::Empty).await.unwrap();
    assert!(matches!(
        exec.push("same".into(), Payload::Empty).await,
        Err(ModelflowError::DuplicateInvocation(id)) if id == "same"
    ));
    with_timeout(first).await.unwrap();

    with_timeout(exec.stop()).await.unwrap();
}

#[tokio::test]
async fn stop_before_run_finishes_immediately() {
    let (exec, _observer) = executor(&pipeline(), RuntimeContext::new(Some(1)));
    with_timeout(exec.stop()).await.unwrap();
    assert!(matches!(exec.run(), Err(ModelflowError::Stopped)));
}

#[tokio::test]
async fn concurrent_direct_executions_never_interleave() {
    init_tracing();
    let log = execution_log();
    let tasks = TaskSet::new()
        .with_task(
            FakeTask::new("A")
                .with_delay(Duration::from_millis(20))
                .logging_to(log.clone()),
        )
        .with_task(
            FakeTask::new("B")
                .after("A")
                .with_delay(Duration::from_millis(20))
                .logging_to(log.clone()),
        );
    let (exec, _observer) = executor(&tasks, RuntimeContext::new(Some(1)));

    let (first, second) = with_timeout(async {
        tokio::join!(
            exec.execute("inv-1", Payload::Empty),
            exec.execute("inv-2", Payload::Empty)
        )
    })
    .await;
    assert!(first.unwrap().contains_key("B"));
    assert!(second.unwrap().contains_key("B"));

    let entries = log.lock().unwrap().clone();
    assert_eq!(entries.len(), 4);
    let nodes: Vec<&str> = entries.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(nodes, vec!["A", "B", "A", "B"]);
    // Each run covers both nodes before the other run starts.
    assert_eq!(entries[0].1, entries[1].1);
    assert_eq!(entries[2].1, entries[3].1);
    assert_ne!(entries[0].1, entries[2].1);
}

#[tokio::test]
async fn abandoned_execution_releases_its_invocation_id() {
    init_tracing();
    let tasks = TaskSet::new()
        .with_task(FakeTask::new("A").with_delay(Duration::from_millis(200)))
        .with_task(FakeTask::new("B").after("A"));
    let (exec, _observer) = executor(&tasks, RuntimeContext::new(Some(1)));

    let abandoned =
        tokio::time::timeout(Duration::from_millis(20), exec.execute("retry-me", Payload::Empty))
            .await;
    assert!(abandoned.is_err());
    assert!(!exec.is_busy());

    let results = with_timeout(exec.execute("retry-me", Payload::Empty)).await.unwrap();
    assert!(results.contains_key("B"));
    assert_eq!(exec.status_of("A"), Some(NodeStatus::Success));
}
