use std::thread;

use anyhow::{anyhow, Result};
use crossbeam::channel::{unbounded, Receiver, Sender};

use crate::thread_pool::ThreadPool;

// a worker that panics in a job is replaced
pub struct SharedQueueThreadPool {
    sender: Sender<Message>,
    threads: u32,
}

enum Message {
    RunJob(Box<dyn FnOnce() + Send + 'static>),
    Shutdown,
}

impl ThreadPool for SharedQueueThreadPool {
    fn new(threads: u32) -> Result<Self>
    where
        Self: Sized,
    {
        if threads == 0 {
            return Err(anyhow!("thread pool needs at least one worker"));
        }

        let (sender, receiver) = unbounded::<Message>();
        for _ in 0..threads {
            spawn_worker(Worker(receiver.clone()))?;
        }

        Ok(SharedQueueThreadPool { sender, threads })
    }

    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.sender.send(Message::RunJob(Box::new(job))).is_err() {
            log::error!("thread pool has no live workers, job dropped");
        }
    }
}

impl Drop for SharedQueueThreadPool {
    fn drop(&mut self) {
        for _ in 0..self.threads {
            let _ = self.sender.send(Message::Shutdown);
        }
    }
}

struct Worker(Receiver<Message>);

impl Drop for Worker {
    fn drop(&mut self) {
        if thread::panicking() {
            log::error!("pool worker panicked, starting a replacement");
            if let Err(e) = spawn_worker(Worker(self.0.clone())) {
                log::error!("replace pool worker failed, reason: {}", e);
            }
        }
    }
}

fn spawn_worker(worker: Worker) -> Result<()> {
    thread::Builder::new()
        .name("kvblob-worker".to_string())
        .spawn(move || worker.run())?;
    Ok(())
}

impl Worker {
    fn run(&self) {
        loop {
            match self.0.recv() {
                Ok(Message::RunJob(job)) => job(),
                Ok(Message::Shutdown) => break,
                Err(_) => break,
            }
        }
    }
}
