use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cardflow_bot::TaskRegistry;

async fn wait_until_empty(registry: &TaskRegistry) {
    for _ in 0..500 {
        if registry.is_empty() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("registry did not drain");
}

#[tokio::test]
async fn concurrency_is_bounded_by_the_limiter() {
    let registry = TaskRegistry::new(2);
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    for _ in 0..5 {
        let active = active.clone();
        let peak = peak.clone();
        registry.spawn(async move {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            active.fetch_sub(1, Ordering::SeqCst);
        });
    }

    wait_until_empty(&registry).await;
    assert!(peak.load(Ordering::SeqCst) <= 2, "peak was {}", peak.load(Ordering::SeqCst));
}

#[tokio::test]
async fn tasks_deregister_themselves_on_completion() {
    let registry = TaskRegistry::new(4);
    registry.spawn(async {});
    registry.spawn(async {
        tokio::time::sleep(Duration::from_millis(5)).await;
    });
    wait_until_empty(&registry).await;
    assert_eq!(registry.in_flight(), 0);
}

#[tokio::test]
async fn abort_removes_a_running_task() {
    let registry = TaskRegistry::new(4);
    let id = registry.spawn(async {
        tokio::time::sleep(Duration::from_secs(60)).await;
    });
    assert_eq!(registry.in_flight(), 1);

    assert!(registry.abort(id));
    assert_eq!(registry.in_flight(), 0);
    // Already gone.
    assert!(!registry.abort(id));
}

#[tokio::test]
async fn abort_all_clears_the_registry() {
    let registry = TaskRegistry::new(4);
    for _ in 0..3 {
        registry.spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
    }
    assert_eq!(registry.in_flight(), 3);

    registry.abort_all();
    assert!(registry.is_empty());
}

#[tokio::test]
async fn queued_tasks_still_run_to_completion() {
    let registry = TaskRegistry::new(1);
    let done = Arc::new(AtomicUsize::new(0));
    for _ in 0..4 {
        let done = done.clone();
        registry.spawn(async move {
            done.fetch_add(1, Ordering::SeqCst);
        });
    }
    wait_until_empty(&registry).await;
    assert_eq!(done.load(Ordering::SeqCst), 4);
}
