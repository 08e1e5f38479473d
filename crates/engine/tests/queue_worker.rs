//! Queue handoff: jobs enqueued by a front-end are picked up and driven
//! by a worker loop.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use restack_core::job::JobStatus;
use restack_engine::{JobDispatcher, JobQueue, MemoryQueue, QueueWorker};

use common::*;

#[tokio::test(start_paused = true)]
async fn queued_jobs_are_started_by_the_worker() {
    let service = ScriptedService::new();
    service.script("t1", Behavior::Succeed { delay_ms: 20 });

    let manager = manager(service, test_config(1, 3));
    let queue = Arc::new(MemoryQueue::new());

    let cancel = CancellationToken::new();
    let worker = QueueWorker::new(queue.clone(), manager.clone());
    let worker_cancel = cancel.clone();
    let worker_handle = tokio::spawn(async move { worker.run(worker_cancel).await });

    let job = manager.create(1, plan(vec![task("t1", &[], 10.0)])).await.unwrap();
    queue.enqueue(job.id).await.unwrap();

    let finished = wait_for_terminal(&manager, job.id).await;
    assert_eq!(finished.status, JobStatus::Completed);

    cancel.cancel();
    worker_handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn stale_messages_are_dropped_and_the_worker_continues() {
    let service = ScriptedService::new();
    service.script("t1", Behavior::Succeed { delay_ms: 20 });

    let manager = manager(service, test_config(1, 3));
    let queue = Arc::new(MemoryQueue::new());

    let cancel = CancellationToken::new();
    let worker = QueueWorker::new(queue.clone(), manager.clone());
    let worker_cancel = cancel.clone();
    let worker_handle = tokio::spawn(async move { worker.run(worker_cancel).await });

    // A message for a job that no longer exists must not wedge the loop.
    queue.enqueue(uuid::Uuid::now_v7()).await.unwrap();

    let job = manager.create(1, plan(vec![task("t1", &[], 10.0)])).await.unwrap();
    queue.enqueue(job.id).await.unwrap();

    let finished = wait_for_terminal(&manager, job.id).await;
    assert_eq!(finished.status, JobStatus::Completed);

    cancel.cancel();
    worker_handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn dispatcher_adopts_jobs_created_by_another_process() {
    let service = ScriptedService::new();
    service.script("t1", Behavior::Succeed { delay_ms: 20 });

    // Two managers over the same store model a front-end process and a
    // worker process.
    let store = Arc::new(restack_engine::MemoryJobStore::new());
    let front_end = manager_with_store(service.clone(), store.clone(), test_config(1, 3));
    let worker_side = manager_with_store(service, store, test_config(1, 3));

    let queue = Arc::new(MemoryQueue::new());
    let cancel = CancellationToken::new();

    let worker = QueueWorker::new(queue.clone(), worker_side.clone());
    let worker_cancel = cancel.clone();
    let worker_handle = tokio::spawn(async move { worker.run(worker_cancel).await });

    let dispatcher = JobDispatcher::new(worker_side.clone(), queue)
        .with_poll_interval(Duration::from_millis(10));
    let dispatcher_cancel = cancel.clone();
    let dispatcher_handle = tokio::spawn(async move { dispatcher.run(dispatcher_cancel).await });

    // The front-end only creates the job; the worker must adopt it from
    // the store, enqueue it, and drive it to completion.
    let job = front_end
        .create(1, plan(vec![task("t1", &[], 10.0)]))
        .await
        .unwrap();

    // Wait until the worker-side manager has adopted the job.
    let adopted = async {
        loop {
            if worker_side.get_status(job.id).await.is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(60), adopted)
        .await
        .expect("job was never adopted");

    let finished = wait_for_terminal(&worker_side, job.id).await;
    assert_eq!(finished.status, JobStatus::Completed);

    cancel.cancel();
    dispatcher_handle.await.unwrap();
    worker_handle.await.unwrap();
}
