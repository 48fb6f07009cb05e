//! End-to-end dispatch scenarios against a scripted backend.

use std::sync::Arc;
use std::time::{Duration, Instant};

use switchboard_abstraction::{GenerateResponse, KeepAlive};
use switchboard_models::{MockBackend, MockCall};
use switchboard_orchestrator::{
    IdleReaper, MemorySink, ModelLifecycle, ModelLoadState, ResourceSnapshot, StaticSampler, Task,
    TaskDispatcher, TaskDispatcherConfig, TaskQueue, TaskStatus, Tick, channel,
};

struct Setup {
    backend: Arc<MockBackend>,
    lifecycle: Arc<ModelLifecycle>,
    sink: Arc<MemorySink>,
    queue: TaskQueue,
    dispatcher: TaskDispatcher,
}

fn setup(idle_timeout: Duration) -> Setup {
    let backend = Arc::new(MockBackend::new());
    let lifecycle = Arc::new(ModelLifecycle::new(backend.clone(), KeepAlive::Forever));
    let sink = Arc::new(MemorySink::new());
    let (queue, receiver) = channel();
    let dispatcher = TaskDispatcher::new(
        Arc::clone(&lifecycle),
        backend.clone(),
        receiver,
        Arc::new(StaticSampler(ResourceSnapshot::sanitized(25.0, 60.0, 0.5))),
        sink.clone(),
        TaskDispatcherConfig { poll_interval: Duration::from_millis(10), idle_timeout },
    );
    Setup { backend, lifecycle, sink, queue, dispatcher }
}

fn submit(queue: &TaskQueue, model: &str, prompt: &str) {
    queue.enqueue(Task::try_new("arithmetic", model, prompt).unwrap()).unwrap();
}

async fn drive(dispatcher: &mut TaskDispatcher, ticks: usize) {
    for _ in 0..ticks {
        dispatcher.run_once().await.unwrap();
    }
}

#[tokio::test]
async fn test_single_task_with_nothing_loaded() {
    let mut s = setup(Duration::from_secs(60));
    submit(&s.queue, "M1", "2+2");

    drive(&mut s.dispatcher, 1).await;

    assert_eq!(s.backend.load_count("M1"), 1);
    assert_eq!(s.backend.generate_count(), 1);
    let outcomes = s.sink.outcomes();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].status, TaskStatus::Success);
    assert_eq!(outcomes[0].model_load_state, ModelLoadState::Loaded);
    assert_eq!(outcomes[0].result, "mock response");
    assert!((outcomes[0].resources.cpu_percent - 25.0).abs() < f64::EPSILON);
    // 20 tokens over 2ms
    assert!((outcomes[0].metrics.tokens_per_second - 10_000.0).abs() < 1e-6);
}

#[tokio::test]
async fn test_prompt_sent_to_backend() {
    let mut s = setup(Duration::from_secs(60));
    submit(&s.queue, "M1", "2+2");
    drive(&mut s.dispatcher, 1).await;

    assert!(
        s.backend
            .calls()
            .contains(&MockCall::Generate("M1".to_string(), "Perform arithmetic on: 2+2".to_string()))
    );
}

#[tokio::test]
async fn test_consecutive_tasks_share_one_load() {
    let mut s = setup(Duration::from_secs(60));
    submit(&s.queue, "M1", "2+2");
    submit(&s.queue, "M1", "3+3");

    drive(&mut s.dispatcher, 2).await;

    assert_eq!(s.backend.load_count("M1"), 1);
    assert_eq!(s.backend.generate_count(), 2);
    let outcomes = s.sink.outcomes();
    assert_eq!(outcomes[1].model_switching_time, Duration::ZERO);
}

#[tokio::test]
async fn test_load_failure_skips_generate() {
    let mut s = setup(Duration::from_secs(60));
    s.backend.fail_load("missing");
    submit(&s.queue, "missing", "2+2");

    drive(&mut s.dispatcher, 1).await;

    assert_eq!(s.backend.generate_count(), 0);
    let outcome = &s.sink.outcomes()[0];
    assert_eq!(outcome.status, TaskStatus::ModelLoadFailed);
    assert_eq!(outcome.model_load_state, ModelLoadState::Failed);
    assert_eq!(outcome.task_latency, Duration::ZERO);
    assert_eq!(outcome.result, "N/A");
    assert_eq!(s.dispatcher.stats().snapshot().load_failed, 1);
}

#[tokio::test]
async fn test_load_failure_does_not_block_later_tasks() {
    let mut s = setup(Duration::from_secs(60));
    s.backend.fail_load("missing");
    submit(&s.queue, "missing", "a");
    submit(&s.queue, "M1", "b");

    drive(&mut s.dispatcher, 2).await;

    let statuses: Vec<_> = s.sink.outcomes().iter().map(|o| o.status).collect();
    assert_eq!(statuses, vec![TaskStatus::ModelLoadFailed, TaskStatus::Success]);
    // A failed load is never retried.
    assert_eq!(s.backend.load_count("missing"), 1);
}

#[tokio::test]
async fn test_generate_failure_keeps_model_loaded() {
    let mut s = setup(Duration::from_secs(60));
    s.backend.fail_generate("M1");
    submit(&s.queue, "M1", "2+2");

    drive(&mut s.dispatcher, 1).await;

    let outcome = &s.sink.outcomes()[0];
    assert_eq!(outcome.status, TaskStatus::Failed);
    assert_eq!(outcome.model_load_state, ModelLoadState::Loaded);
    assert_eq!(outcome.metrics.tokens_per_second, 0.0);
    assert_eq!(s.lifecycle.current_model().await.as_deref(), Some("M1"));
    assert_eq!(s.backend.unload_count("M1"), 0);
}

#[tokio::test]
async fn test_missing_eval_duration_is_safe() {
    let mut s = setup(Duration::from_secs(60));
    s.backend.set_response(GenerateResponse {
        response: Some("4".to_string()),
        eval_count: Some(7),
        eval_duration: None,
        ..Default::default()
    });
    submit(&s.queue, "M1", "2+2");

    drive(&mut s.dispatcher, 1).await;

    let outcome = &s.sink.outcomes()[0];
    assert_eq!(outcome.status, TaskStatus::Success);
    assert_eq!(outcome.metrics.eval_duration_ns, 1);
    assert!(outcome.metrics.tokens_per_second.is_finite());
}

#[tokio::test]
async fn test_idle_sweep_after_threshold() {
    let s = setup(Duration::from_secs(60));
    s.lifecycle.ensure_loaded("M1").await;

    let reaper = IdleReaper::new(Arc::clone(&s.lifecycle), Duration::from_secs(60));
    let report = reaper.sweep(Instant::now() + Duration::from_secs(120), Duration::from_secs(60)).await;

    assert_eq!(report.unloaded, vec!["M1".to_string()]);
    assert_eq!(s.backend.unload_count("M1"), 1);
    assert_eq!(s.lifecycle.current_model().await, None);
}

#[tokio::test]
async fn test_zero_threshold_unloads_between_tasks() {
    let mut s = setup(Duration::ZERO);
    submit(&s.queue, "M1", "a");
    drive(&mut s.dispatcher, 1).await;
    assert_eq!(s.lifecycle.current_model().await.as_deref(), Some("M1"));

    tokio::time::sleep(Duration::from_millis(2)).await;
    submit(&s.queue, "M1", "b");
    // The sweep at the top of this iteration evicts M1 before the task reloads it.
    drive(&mut s.dispatcher, 1).await;

    assert_eq!(s.backend.unload_count("M1"), 1);
    assert_eq!(s.backend.load_count("M1"), 2);
    let calls = s.backend.calls();
    let unload_at = calls.iter().position(|c| *c == MockCall::Unload("M1".to_string())).unwrap();
    let second_load_at = calls.iter().rposition(|c| *c == MockCall::Load("M1".to_string())).unwrap();
    assert!(unload_at < second_load_at);
}

#[tokio::test]
async fn test_fifo_order_across_models() {
    let mut s = setup(Duration::from_secs(60));
    for (model, prompt) in [("A", "1"), ("B", "2"), ("A", "3")] {
        submit(&s.queue, model, prompt);
    }
    drive(&mut s.dispatcher, 3).await;

    let prompts: Vec<_> = s.sink.outcomes().iter().map(|o| o.prompt.clone()).collect();
    assert_eq!(prompts, vec!["1", "2", "3"]);
    assert_eq!(s.backend.load_count("A"), 2);
    assert_eq!(s.backend.load_count("B"), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_at_most_one_generate_in_flight() {
    let mut s = setup(Duration::from_secs(60));
    s.backend.set_generate_delay(Duration::from_millis(5));

    let mut producers = Vec::new();
    for p in 0..4 {
        let queue = s.queue.clone();
        producers.push(tokio::spawn(async move {
            for i in 0..5 {
                let model = if i % 2 == 0 { "A" } else { "B" };
                submit(&queue, model, &format!("{p}-{i}"));
            }
        }));
    }
    for producer in producers {
        producer.await.unwrap();
    }

    s.dispatcher.start().unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    while s.sink.len() < 20 && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    s.dispatcher.stop().await.unwrap();

    assert_eq!(s.sink.len(), 20);
    assert_eq!(s.backend.generate_count(), 20);
    assert_eq!(s.backend.max_concurrent_generates(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_load_and_sweep_stay_consistent() {
    for _ in 0..20 {
        let s = setup(Duration::ZERO);
        let reaper = IdleReaper::new(Arc::clone(&s.lifecycle), Duration::ZERO);

        let lifecycle = Arc::clone(&s.lifecycle);
        let loader = tokio::spawn(async move { lifecycle.ensure_loaded("A").await });
        let sweeper = tokio::spawn(async move {
            reaper.sweep(Instant::now() + Duration::from_secs(1), Duration::ZERO).await
        });
        let load = loader.await.unwrap();
        let report = sweeper.await.unwrap();
        assert!(load.success);

        let snapshot = s.lifecycle.snapshot();
        match snapshot.current_model.as_deref() {
            Some("A") => {
                // Load won the race: A is registered and the sweep saw nothing.
                assert!(snapshot.models.iter().any(|m| m.name == "A"));
                assert!(report.unloaded.is_empty());
            }
            None => {
                // Sweep ran after the load and evicted A; a new load brings it back.
                assert_eq!(report.unloaded, vec!["A".to_string()]);
                assert!(snapshot.models.is_empty());
                assert!(s.lifecycle.ensure_loaded("A").await.success);
                assert_eq!(s.backend.load_count("A"), 2);
            }
            Some(other) => panic!("Unexpected current model {other}"),
        }
    }
}

#[tokio::test]
async fn test_run_once_reports_tick() {
    let mut s = setup(Duration::from_secs(60));
    assert_eq!(s.dispatcher.run_once().await.unwrap(), Tick::Idle);
    submit(&s.queue, "M1", "x");
    assert!(matches!(s.dispatcher.run_once().await.unwrap(), Tick::Processed(_)));
}
