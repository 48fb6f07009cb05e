//! Submission through to the CSV log, against a mocked Ollama server.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use mockito::Matcher;
use serde_json::json;
use switchboard_core::CsvOutcomeSink;
use switchboard_core::server::{self, AppState};
use switchboard_models::OllamaBackend;
use switchboard_orchestrator::{
    ModelLifecycle, ResourceSnapshot, StaticSampler, TaskDispatcher, TaskDispatcherConfig, Tick, channel,
};
use switchboard_abstraction::KeepAlive;
use tower::ServiceExt;

fn submission(model: &str, prompt: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/perform_task")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({"task_type": "arithmetic", "model_name": model, "prompt": prompt}).to_string(),
        ))
        .unwrap()
}

#[tokio::test]
async fn test_submission_is_processed_and_logged() {
    let mut ollama = mockito::Server::new_async().await;
    let load = ollama
        .mock("POST", "/api/chat")
        .match_body(Matcher::Json(json!({"model": "llama3", "keep_alive": -1})))
        .with_status(200)
        .with_body(r#"{"model":"llama3","done":true}"#)
        .expect(1)
        .create_async()
        .await;
    let generate = ollama
        .mock("POST", "/api/generate")
        .match_body(Matcher::PartialJson(json!({
            "model": "llama3",
            "prompt": "Perform arithmetic on: 2+2",
            "stream": false
        })))
        .with_status(200)
        .with_body(
            json!({
                "response": "4",
                "total_duration": 5_000_000,
                "eval_count": 10,
                "eval_duration": 500_000_000
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("llm_metrics.csv");

    let backend = Arc::new(OllamaBackend::with_base_url(ollama.url(), Some(Duration::from_secs(5))).unwrap());
    let lifecycle = Arc::new(ModelLifecycle::new(backend.clone(), KeepAlive::Forever));
    let (queue, receiver) = channel();
    let mut dispatcher = TaskDispatcher::new(
        Arc::clone(&lifecycle),
        backend,
        receiver,
        Arc::new(StaticSampler(ResourceSnapshot::sanitized(5.0, 40.0, 0.2))),
        Arc::new(CsvOutcomeSink::create(&log).unwrap()),
        TaskDispatcherConfig { poll_interval: Duration::from_millis(10), idle_timeout: Duration::from_secs(600) },
    );
    let app = server::router(Arc::new(AppState::new(queue, Arc::clone(&lifecycle), dispatcher.stats())));

    let response = app.oneshot(submission("llama3", "2+2")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let Tick::Processed(outcome) = dispatcher.run_once().await.unwrap() else {
        panic!("expected the submitted task to be processed");
    };
    assert_eq!(outcome.result, "4");

    load.assert_async().await;
    generate.assert_async().await;
    assert_eq!(lifecycle.current_model().await.as_deref(), Some("llama3"));

    let mut reader = csv::Reader::from_path(&log).unwrap();
    let rows: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
    assert_eq!(rows.len(), 1);
    assert_eq!(&rows[0][2], "llama3");
    assert_eq!(&rows[0][6], "4");
    assert_eq!(&rows[0][7], "Success");
    assert_eq!(&rows[0][15], "20");
}

#[tokio::test]
async fn test_unknown_model_is_logged_as_load_failure() {
    let mut ollama = mockito::Server::new_async().await;
    ollama
        .mock("POST", "/api/chat")
        .with_status(404)
        .with_body(r#"{"error":"model \"ghost\" not found, try pulling it first"}"#)
        .create_async()
        .await;
    let generate = ollama.mock("POST", "/api/generate").expect(0).create_async().await;

    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("llm_metrics.csv");

    let backend = Arc::new(OllamaBackend::with_base_url(ollama.url(), None).unwrap());
    let lifecycle = Arc::new(ModelLifecycle::new(backend.clone(), KeepAlive::Forever));
    let (queue, receiver) = channel();
    let mut dispatcher = TaskDispatcher::new(
        Arc::clone(&lifecycle),
        backend,
        receiver,
        Arc::new(StaticSampler::default()),
        Arc::new(CsvOutcomeSink::create(&log).unwrap()),
        TaskDispatcherConfig { poll_interval: Duration::from_millis(10), idle_timeout: Duration::from_secs(600) },
    );
    let app = server::router(Arc::new(AppState::new(queue, Arc::clone(&lifecycle), dispatcher.stats())));

    app.oneshot(submission("ghost", "hello")).await.unwrap();
    dispatcher.run_once().await.unwrap();

    generate.assert_async().await;
    assert_eq!(lifecycle.current_model().await, None);

    let mut reader = csv::Reader::from_path(&log).unwrap();
    let rows: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
    assert_eq!(&rows[0][4], "0");
    assert_eq!(&rows[0][6], "N/A");
    assert_eq!(&rows[0][7], "Model Load Failed");
    assert_eq!(&rows[0][8], "Failed");
    assert_eq!(dispatcher.stats().snapshot().load_failed, 1);
}
