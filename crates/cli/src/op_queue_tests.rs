// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};

fn recording_task(
    applied: Arc<Mutex<Vec<usize>>>,
    completed: Arc<AtomicUsize>,
    n: usize,
    delay: Duration,
) -> OpTask {
    Box::new(move |token| {
        Box::pin(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    applied.lock().push(n);
                    completed.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
                _ = token.cancelled() => Ok(()),
            }
        })
    })
}

#[tokio::test]
async fn interactive_drains_before_background() {
    let queue = OpQueue::new();
    let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    for _ in 0..3 {
        let order = Arc::clone(&order);
        queue.enqueue(
            OpSpec::background("bg"),
            Box::new(move |_| {
                Box::pin(async move {
                    order.lock().push("background");
                    Ok(())
                })
            }),
        );
    }
    for _ in 0..3 {
        let order = Arc::clone(&order);
        queue.enqueue(
            OpSpec::interactive("fg"),
            Box::new(move |_| {
                Box::pin(async move {
                    order.lock().push("interactive");
                    Ok(())
                })
            }),
        );
    }

    queue.wait_for_drain().await;
    let order = order.lock().clone();
    assert_eq!(order.len(), 6);
    assert!(order[..3].iter().all(|lane| *lane == "interactive"), "{order:?}");
}

#[tokio::test]
async fn priority_orders_within_a_lane_fifo_within_priority() {
    let queue = OpQueue::new();
    let order: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));

    // Hold the loop busy so ordering is decided at enqueue time.
    queue.enqueue(
        OpSpec::interactive("gate"),
        Box::new(|_| Box::pin(async { tokio::time::sleep(Duration::from_millis(50)).await; Ok(()) })),
    );

    for (n, priority) in [(1, 0), (2, 5), (3, 0), (4, 5)] {
        let order = Arc::clone(&order);
        queue.enqueue(
            OpSpec::interactive(format!("op-{n}")).with_priority(priority),
            Box::new(move |_| {
                Box::pin(async move {
                    order.lock().push(n);
                    Ok(())
                })
            }),
        );
    }

    queue.wait_for_drain().await;
    assert_eq!(order.lock().clone(), vec![2, 4, 1, 3]);
}

#[tokio::test]
async fn keyed_supersession_applies_only_the_last() {
    let queue = OpQueue::new();
    let applied: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));
    let completed = Arc::new(AtomicUsize::new(0));

    for n in 1..=40 {
        queue.enqueue(
            OpSpec::interactive(format!("activate-{n}")).with_key(
                "activate-conversation",
                Supersede::PendingAndRunning,
            ),
            recording_task(
                Arc::clone(&applied),
                Arc::clone(&completed),
                n,
                Duration::from_millis(10),
            ),
        );
    }

    queue.wait_for_drain().await;
    let applied = applied.lock().clone();
    assert_eq!(applied.last().copied(), Some(40), "final value is the 40th");
    // Far fewer than 40 actually complete; the rest were superseded.
    assert!(completed.load(Ordering::SeqCst) <= 6, "completed {completed:?}");
}

#[tokio::test]
async fn pending_and_running_aborts_the_running_op() {
    let queue = OpQueue::new();
    let aborted = Arc::new(AtomicUsize::new(0));

    let aborted_clone = Arc::clone(&aborted);
    queue.enqueue(
        OpSpec::interactive("long").with_key("k", Supersede::PendingAndRunning),
        Box::new(move |token| {
            Box::pin(async move {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(30)) => Ok(()),
                    _ = token.cancelled() => {
                        aborted_clone.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                }
            })
        }),
    );
    // Let the long op start.
    tokio::time::sleep(Duration::from_millis(50)).await;

    queue.enqueue(
        OpSpec::interactive("replacement").with_key("k", Supersede::PendingAndRunning),
        Box::new(|_| Box::pin(async { Ok(()) })),
    );

    queue.wait_for_drain().await;
    assert_eq!(aborted.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn task_error_fires_on_error_and_loop_continues() {
    let queue = OpQueue::new();
    let errors: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let errors_cb = Arc::clone(&errors);
    queue.on_error(move |message| errors_cb.lock().push(message.to_string()));

    queue.enqueue(
        OpSpec::interactive("bad"),
        Box::new(|_| Box::pin(async { Err("boom".to_string()) })),
    );
    let ran = Arc::new(AtomicUsize::new(0));
    let ran_clone = Arc::clone(&ran);
    queue.enqueue(
        OpSpec::interactive("good"),
        Box::new(move |_| {
            Box::pin(async move {
                ran_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        }),
    );

    queue.wait_for_drain().await;
    assert_eq!(errors.lock().clone(), vec!["boom".to_string()]);
    assert_eq!(ran.load(Ordering::SeqCst), 1, "queue continued after the error");
}

#[tokio::test]
async fn metrics_track_transitions() {
    let queue = OpQueue::new();
    let peak: Arc<Mutex<QueueMetrics>> = Arc::new(Mutex::new(QueueMetrics::default()));
    let peak_cb = Arc::clone(&peak);
    queue.on_metrics(move |metrics| {
        let mut peak = peak_cb.lock();
        peak.interactive_queued = peak.interactive_queued.max(metrics.interactive_queued);
        peak.running = peak.running.max(metrics.running);
    });

    for _ in 0..4 {
        queue.enqueue(
            OpSpec::interactive("op"),
            Box::new(|_| {
                Box::pin(async {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    Ok(())
                })
            }),
        );
    }
    queue.wait_for_drain().await;

    let peak = *peak.lock();
    assert!(peak.interactive_queued >= 1);
    assert_eq!(peak.running, 1);
    assert_eq!(queue.metrics(), QueueMetrics::default());
}

#[tokio::test]
async fn lifecycle_events_carry_wait_time() {
    let queue = OpQueue::new();
    let events: Arc<Mutex<Vec<OpEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let events_cb = Arc::clone(&events);
    queue.on_lifecycle(move |event| events_cb.lock().push(event));

    queue.enqueue(OpSpec::interactive("op"), Box::new(|_| Box::pin(async { Ok(()) })));
    queue.wait_for_drain().await;

    let events = events.lock();
    assert!(events
        .iter()
        .any(|e| matches!(e, OpEvent::Started { label, .. } if label == "op")));
    assert!(events
        .iter()
        .any(|e| matches!(e, OpEvent::Completed { label, .. } if label == "op")));
}

#[tokio::test]
async fn external_abort_token_cancels_the_op() {
    let queue = OpQueue::new();
    let external = CancellationToken::new();
    let finished = Arc::new(AtomicUsize::new(0));
    let finished_clone = Arc::clone(&finished);

    let spec = OpSpec {
        abort: Some(external.clone()),
        ..OpSpec::interactive("cancellable")
    };
    queue.enqueue(
        spec,
        Box::new(move |token| {
            Box::pin(async move {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(30)) => {
                        finished_clone.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                    _ = token.cancelled() => Ok(()),
                }
            })
        }),
    );

    tokio::time::sleep(Duration::from_millis(50)).await;
    external.cancel();
    queue.wait_for_drain().await;
    assert_eq!(finished.load(Ordering::SeqCst), 0, "op honored the abort signal");
}

#[tokio::test]
async fn shutdown_drains_everything() {
    let queue = OpQueue::new();
    for _ in 0..5 {
        queue.enqueue(
            OpSpec::background("op"),
            Box::new(|token| {
                Box::pin(async move {
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_secs(30)) => Ok(()),
                        _ = token.cancelled() => Ok(()),
                    }
                })
            }),
        );
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
    queue.shutdown();
    queue.wait_for_drain().await;
    assert_eq!(queue.metrics(), QueueMetrics::default());
}
