use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam::sync::WaitGroup;

use crate::thread_pool::rayon::RayonThreadPool;
use crate::thread_pool::shared_queue::SharedQueueThreadPool;
use crate::thread_pool::{self, ThreadPool};

fn pool_runs_jobs<P: ThreadPool>(pool: P) {
    let counter = Arc::new(AtomicUsize::new(0));
    let wg = WaitGroup::new();
    for _ in 0..50 {
        let counter = counter.clone();
        let wg = wg.clone();
        pool.spawn(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            drop(wg)
        });
    }
    wg.wait();
    assert_eq!(counter.load(Ordering::SeqCst), 50);
}

#[test]
fn shared_queue_pool_runs_jobs() {
    pool_runs_jobs(SharedQueueThreadPool::new(4).unwrap());
}

#[test]
fn rayon_pool_runs_jobs() {
    pool_runs_jobs(RayonThreadPool::new(4).unwrap());
}

#[test]
fn shared_queue_pool_rejects_zero_workers() {
    assert!(SharedQueueThreadPool::new(0).is_err());
}

#[test]
fn shared_queue_pool_survives_panicking_job() {
    let pool = SharedQueueThreadPool::new(1).unwrap();
    pool.spawn(|| panic!("job failed"));
    pool_runs_jobs(pool);
}

#[tokio::test]
async fn run_returns_job_result() {
    let pool = SharedQueueThreadPool::new(2).unwrap();
    let value = thread_pool::run(&pool, || 6 * 7).await.unwrap();
    assert_eq!(value, 42);

    let dropped = thread_pool::run(&pool, || -> u8 { panic!("job failed") }).await;
    assert!(dropped.is_err());
}

#[tokio::test]
async fn rayon_pool_survives_panicking_job() {
    let pool = RayonThreadPool::new(1).unwrap();

    let dropped = thread_pool::run(&pool, || -> u8 { panic!("job failed") }).await;
    assert!(dropped.is_err());
    assert_eq!(thread_pool::run(&pool, || 6 * 7).await.unwrap(), 42);

    pool_runs_jobs(pool);
}
