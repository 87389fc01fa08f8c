use anyhow::{anyhow, Result};
use tokio::sync::oneshot;

pub mod rayon;
pub mod shared_queue;

pub trait ThreadPool: Send + Sync + 'static {
    fn new(threads: u32) -> Result<Self>
    where
        Self: Sized;

    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static;
}

pub async fn run<P, F, T>(pool: &P, job: F) -> Result<T>
where
    P: ThreadPool,
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let (sender, receiver) = oneshot::channel();
    pool.spawn(move || {
        // the requester may have gone away, nothing to report then
        let _ = sender.send(job());
    });
    receiver
        .await
        .map_err(|_| anyhow!("worker dropped the job before finishing it"))
}
