// tests/shell_task.rs

#![cfg(unix)]

use serde_json::json;

use modelflow::task::{INVOCATION_EDGE, Payload, ShellTask, Task, TaskInputs, TestCase};
use modelflow_test_utils::{init_tracing, with_timeout};

fn inputs() -> TaskInputs {
    TaskInputs::new("inv-7").with_edge(INVOCATION_EDGE, Payload::rows("raw_orders", 5))
}

#[tokio::test]
async fn json_object_stdout_becomes_map() {
    init_tracing();
    let task = ShellTask::new("orders", r#"echo '{"rows": 3, "ok": true}'"#, vec![]);

    let payload = with_timeout(task.execute(inputs())).await.unwrap();
    let map = payload.as_map().unwrap();
    assert_eq!(map["rows"], 3);
    assert_eq!(map["ok"], true);
}

#[tokio::test]
async fn empty_stdout_becomes_empty_payload() {
    init_tracing();
    let task = ShellTask::new("orders", "true", vec![]);
    let payload = with_timeout(task.execute(inputs())).await.unwrap();
    assert_eq!(payload, Payload::Empty);
}

#[tokio::test]
async fn plain_text_stdout_is_wrapped() {
    init_tracing();
    let task = ShellTask::new("orders", "echo built", vec![]);
    let payload = with_timeout(task.execute(inputs())).await.unwrap();
    assert_eq!(payload, Payload::map([("stdout", json!("built"))]));
}

#[tokio::test]
async fn environment_and_stdin_carry_invocation() {
    init_tracing();
    let task = ShellTask::new(
        "orders",
        r#"printf '{"node":"%s","invocation":"%s","stdin":%s}' "$MODELFLOW_NODE" "$MODELFLOW_INVOCATION" "$(cat)""#,
        vec![],
    );

    let payload = with_timeout(task.execute(inputs())).await.unwrap();
    let map = payload.as_map().unwrap();
    assert_eq!(map["node"], "orders");
    assert_eq!(map["invocation"], "inv-7");
    assert_eq!(
        map["stdin"][INVOCATION_EDGE],
        json!({"kind": "rows", "value": {"relation": "raw_orders", "rows": 5}})
    );
}

#[tokio::test]
async fn non_zero_exit_is_an_error() {
    init_tracing();
    let task = ShellTask::new("orders", "exit 3", vec![]);
    let err = with_timeout(task.execute(inputs())).await.unwrap_err();
    assert!(err.to_string().contains("exited with code 3"));
}

#[tokio::test]
async fn tests_pass_on_zero_exit() {
    init_tracing();
    let task = ShellTask::new("orders", "true", vec![]);
    let tests = vec![
        TestCase::new("ok", "true"),
        TestCase::new("broken", "echo nope >&2; exit 1"),
    ];

    let outcomes = with_timeout(task.run_tests(&tests)).await;
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes[0].passed);
    assert!(!outcomes[1].passed);
    assert_eq!(outcomes[1].message.as_deref(), Some("exited with code 1: nope"));
}

#[tokio::test]
async fn large_output_before_reading_large_input_completes() {
    init_tracing();
    // Writes more than a pipe buffer before touching stdin, then drains it.
    let task = ShellTask::new(
        "wide",
        r"head -c 200000 /dev/zero | tr '\0' a; cat >/dev/null",
        vec![],
    );
    let big = TaskInputs::new("inv-big")
        .with_edge(INVOCATION_EDGE, Payload::map([("blob", json!("x".repeat(200_000)))]));

    let payload = with_timeout(task.execute(big)).await.unwrap();
    let stdout = payload.as_map().unwrap()["stdout"].as_str().unwrap();
    assert_eq!(stdout.len(), 200_000);
    assert!(stdout.bytes().all(|b| b == b'a'));
}
