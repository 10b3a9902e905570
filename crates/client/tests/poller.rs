//! Integration tests for `StatusPoller`.
//!
//! The poller runs against a [`ScriptedBackend`] with a short interval.
//! These tests check the terminal-state signal, stall escalation, the
//! single-flight tick body, and that nothing is emitted after cancel.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use batchconv_client::events::{PollEvent, PollEventKind};
use batchconv_client::poller::{poll_once, PollError, StatusPoller};
use batchconv_core::batch::BatchSummary;
use batchconv_core::status::FileStatus;
use batchconv_core::types::JobId;
use common::{fast_config, row, wait_until, ScriptedBackend, Tick, TEST_TIMEOUT};
use tokio::sync::{mpsc, Notify};

fn job() -> JobId {
    JobId::new("job-1").unwrap()
}

/// Receive events until the channel closes.
async fn drain(rx: &mut mpsc::Receiver<PollEvent>) -> Vec<PollEvent> {
    tokio::time::timeout(TEST_TIMEOUT, async {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    })
    .await
    .expect("poller did not stop")
}

/// Receive exactly `n` events.
async fn take(rx: &mut mpsc::Receiver<PollEvent>, n: usize) -> Vec<PollEvent> {
    tokio::time::timeout(TEST_TIMEOUT, async {
        let mut events = Vec::with_capacity(n);
        while events.len() < n {
            match rx.recv().await {
                Some(event) => events.push(event),
                None => break,
            }
        }
        events
    })
    .await
    .expect("not enough events")
}

fn running_tick(total: u32) -> Tick {
    Tick::ok(
        vec![row("plans/a.pdf", "Converting", 40)],
        BatchSummary::new(total, 0, 0),
    )
}

// ---------------------------------------------------------------------------
// Test: completion is signalled once and polling stops
// ---------------------------------------------------------------------------

#[tokio::test]
async fn completion_is_emitted_once_and_polling_stops() {
    let backend = Arc::new(ScriptedBackend::new(
        "job-1",
        vec![
            running_tick(2),
            running_tick(2),
            Tick::ok(
                vec![
                    row("plans/a.pdf", "Converted ✔", 100),
                    row("plans/b.pdf", "Failed ❌", 0),
                ],
                BatchSummary::new(2, 1, 1),
            ),
        ],
    ));
    let poller = StatusPoller::new(backend.clone(), fast_config(10));
    let (tx, mut rx) = mpsc::channel(16);
    let handle = poller.spawn(job(), tx);

    let events = drain(&mut rx).await;

    assert_eq!(events.len(), 3);
    assert_eq!(events.iter().filter(|e| e.is_completion()).count(), 1);
    assert!(events.last().unwrap().is_completion());

    let calls = backend.status_calls();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(backend.status_calls(), calls, "poller kept polling after completion");
    assert!(handle.is_finished());
}

// ---------------------------------------------------------------------------
// Test: an empty summary never completes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_summary_is_never_complete() {
    let backend = Arc::new(ScriptedBackend::new(
        "job-1",
        vec![Tick::ok(vec![], BatchSummary::new(0, 0, 0))],
    ));
    let poller = StatusPoller::new(backend, fast_config(10));
    let (tx, mut rx) = mpsc::channel(16);
    let handle = poller.spawn(job(), tx);

    let events = take(&mut rx, 5).await;
    handle.cancel();

    assert_eq!(events.len(), 5);
    assert!(events.iter().all(|e| !e.is_completion()));
}

// ---------------------------------------------------------------------------
// Test: finished counters with a running record do not complete
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stale_snapshot_delays_completion() {
    let backend = Arc::new(ScriptedBackend::new(
        "job-1",
        vec![
            Tick::ok(
                vec![row("plans/a.pdf", "Finalizing", 95)],
                BatchSummary::new(1, 1, 0),
            ),
            Tick::ok(
                vec![row("plans/a.pdf", "Converted ✔", 100)],
                BatchSummary::new(1, 1, 0),
            ),
        ],
    ));
    let poller = StatusPoller::new(backend, fast_config(10));
    let (tx, mut rx) = mpsc::channel(16);
    let _handle = poller.spawn(job(), tx);

    let events = drain(&mut rx).await;

    assert_eq!(events.len(), 2);
    assert!(!events[0].is_completion());
    assert!(events[1].is_completion());
}

// ---------------------------------------------------------------------------
// Test: failed ticks are reported and escalate to a stall
// ---------------------------------------------------------------------------

#[tokio::test]
async fn repeated_failures_stall_then_recover() {
    let backend = Arc::new(ScriptedBackend::new(
        "job-1",
        vec![
            Tick::StatusError(503),
            Tick::StatusError(503),
            Tick::StatusError(503),
            running_tick(1),
        ],
    ));
    let poller = StatusPoller::new(backend, fast_config(3));
    let (tx, mut rx) = mpsc::channel(16);
    let handle = poller.spawn(job(), tx);

    let events = take(&mut rx, 6).await;
    handle.cancel();

    let kinds: Vec<_> = events.into_iter().map(|e| e.kind).collect();
    assert_matches!(kinds[0], PollEventKind::TickFailed { consecutive: 1, .. });
    assert_matches!(kinds[1], PollEventKind::TickFailed { consecutive: 2, .. });
    assert_matches!(kinds[2], PollEventKind::TickFailed { consecutive: 3, .. });
    assert_matches!(kinds[3], PollEventKind::Stalled { consecutive: 3 });
    assert_matches!(kinds[4], PollEventKind::Recovered);
    assert_matches!(&kinds[5], PollEventKind::Update(update) if !update.completed);
}

#[tokio::test]
async fn zero_threshold_never_stalls() {
    let backend = Arc::new(ScriptedBackend::new("job-1", vec![Tick::StatusError(502)]));
    let poller = StatusPoller::new(backend, fast_config(0));
    let (tx, mut rx) = mpsc::channel(16);
    let handle = poller.spawn(job(), tx);

    let events = take(&mut rx, 6).await;
    handle.cancel();

    assert!(events
        .iter()
        .all(|e| matches!(e.kind, PollEventKind::TickFailed { .. })));
}

// ---------------------------------------------------------------------------
// Test: an inconsistent summary skips the tick
// ---------------------------------------------------------------------------

#[tokio::test]
async fn inconsistent_summary_fails_the_tick() {
    let backend = Arc::new(ScriptedBackend::new(
        "job-1",
        vec![Tick::ok(vec![], BatchSummary::new(1, 1, 1))],
    ));
    let poller = StatusPoller::new(backend, fast_config(10));
    let (tx, mut rx) = mpsc::channel(16);
    let handle = poller.spawn(job(), tx);

    let events = take(&mut rx, 1).await;
    handle.cancel();

    assert_matches!(
        &events[0].kind,
        PollEventKind::TickFailed { error, .. } if error.starts_with("Inconsistent summary")
    );
}

// ---------------------------------------------------------------------------
// Test: at most one tick is in flight
// ---------------------------------------------------------------------------

#[tokio::test]
async fn slow_responses_never_overlap() {
    let backend = Arc::new(
        ScriptedBackend::new("job-1", vec![running_tick(1)])
            .with_latency(Duration::from_millis(30)),
    );
    let poller = StatusPoller::new(backend.clone(), fast_config(10));
    let (tx, mut rx) = mpsc::channel(16);
    let handle = poller.spawn(job(), tx);

    let events = take(&mut rx, 4).await;
    handle.cancel();

    assert_eq!(events.len(), 4);
    assert_eq!(backend.max_in_flight.load(Ordering::SeqCst), 1);
}

// ---------------------------------------------------------------------------
// Test: results that resolve after cancellation are discarded
// ---------------------------------------------------------------------------

#[tokio::test]
async fn late_result_after_cancel_is_discarded() {
    let gate = Arc::new(Notify::new());
    let backend = Arc::new(
        ScriptedBackend::new(
            "job-1",
            vec![Tick::ok(
                vec![row("plans/a.pdf", "Converted ✔", 100)],
                BatchSummary::new(1, 1, 0),
            )],
        )
        .with_gate(gate.clone()),
    );
    let poller = StatusPoller::new(backend.clone(), fast_config(10));
    let (tx, mut rx) = mpsc::channel(16);
    let handle = poller.spawn(job(), tx);

    wait_until(|| backend.status_calls() == 1).await;
    handle.cancel();
    gate.notify_one();

    assert!(drain(&mut rx).await.is_empty());
    handle.join().await;
}

#[tokio::test]
async fn dropping_the_handle_stops_polling() {
    let backend = Arc::new(ScriptedBackend::new("job-1", vec![running_tick(1)]));
    let poller = StatusPoller::new(backend.clone(), fast_config(10));
    let (tx, mut rx) = mpsc::channel(16);
    let handle = poller.spawn(job(), tx);

    take(&mut rx, 1).await;
    drop(handle);

    drain(&mut rx).await;
    let calls = backend.status_calls();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(backend.status_calls(), calls);
}

// ---------------------------------------------------------------------------
// Test: poll_once
// ---------------------------------------------------------------------------

#[tokio::test]
async fn poll_once_classifies_rows_and_keeps_meta() {
    let backend = ScriptedBackend::new(
        "job-1",
        vec![Tick::ok(
            vec![
                row("plans/a.pdf", "Batch 1/2 – Preparing", 5),
                serde_json::json!({ "folder_name": "plans", "cooldown": false }),
                serde_json::json!({ "name": 7 }),
            ],
            BatchSummary::new(1, 0, 0),
        )],
    );

    let update = poll_once(&backend, &job()).await.unwrap();

    assert_eq!(update.records.len(), 1);
    assert_eq!(update.records[0].status, FileStatus::Running);
    assert_eq!(
        update.meta.and_then(|m| m.folder_name).as_deref(),
        Some("plans")
    );
    assert!(!update.completed);
}

#[tokio::test]
async fn poll_once_summary_failure_yields_no_update() {
    let backend = ScriptedBackend::new(
        "job-1",
        vec![Tick::SummaryError {
            status: vec![row("plans/a.pdf", "Converted ✔", 100)],
            code: 500,
        }],
    );

    let result = poll_once(&backend, &job()).await;

    assert_matches!(result, Err(PollError::Summary(e)) if e.status() == Some(500));
}
