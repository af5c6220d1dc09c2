use serde_json::Value;
use skyguard::telemetry::{GuardEvent, Telemetry};
use skyguard_jsonl::JsonlSink;
use std::time::Duration;
use tower_service::Service;

fn lines(path: &std::path::Path) -> Vec<Value> {
    std::fs::read_to_string(path)
        .expect("file")
        .lines()
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect()
}

#[tokio::test]
async fn writes_json_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("guard.log");
    let mut sink = JsonlSink::new(&path);

    sink.call(GuardEvent::RetryAttempt { category: "posts".into(), attempt: 1, delay: Duration::from_millis(1000) })
        .await
        .unwrap();
    sink.call(GuardEvent::Denied { category: "global".into(), retry_after: Duration::from_secs(45) }).await.unwrap();

    let written = lines(&path);
    assert_eq!(written.len(), 2);
    assert_eq!(written[0]["kind"], "retry_attempt");
    assert_eq!(written[0]["delay_ms"], 1000);
    assert_eq!(written[1]["category"], "global");
    assert_eq!(written[1]["retry_after_ms"], 45_000);
}

#[tokio::test]
async fn works_behind_a_telemetry_handle() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("guard.log");
    let telemetry = Telemetry::new(JsonlSink::new(&path));

    telemetry.emit(GuardEvent::QueueAcquired { active: 1, max_concurrent: 5 }).await;

    assert_eq!(lines(&path)[0], serde_json::json!({ "kind": "queue_acquired", "active": 1, "max": 5 }));
}

#[tokio::test]
async fn unwritable_path_is_an_error_not_a_panic() {
    let dir = tempfile::tempdir().unwrap();
    let mut sink = JsonlSink::new(dir.path());
    let result = sink.call(GuardEvent::Admitted { category: "likes".into(), remaining: 99 }).await;
    assert!(result.is_err());

    // the telemetry handle swallows the failure
    Telemetry::new(sink).emit(GuardEvent::Admitted { category: "likes".into(), remaining: 98 }).await;
}
