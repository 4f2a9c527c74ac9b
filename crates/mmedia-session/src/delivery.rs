//! Serialized delivery context.
//!
//! Every observer callback of a session runs as a job on one tokio task, in
//! the order the jobs were posted, so no two callbacks of the same session
//! ever run concurrently.  Posting never blocks and may happen from any
//! thread, including from inside a running job.

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Clone)]
pub struct DeliveryContext {
    tx: mpsc::UnboundedSender<Job>,
}

impl DeliveryContext {
    /// Start the delivery task.  Must be called from inside a tokio runtime.
    /// The task ends once every clone of the context is dropped.
    pub fn spawn() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                job();
            }
            debug!("delivery: context closed");
        });
        Self { tx }
    }

    /// Queue `job` behind everything posted so far.
    pub fn post<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.tx.send(Box::new(job)).is_err() {
            debug!("delivery: context gone, dropping job");
        }
    }

    /// Wait until every job posted before this call has run.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        self.post(move || {
            let _ = tx.send(());
        });
        let _ = rx.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn test_jobs_run_in_post_order() {
        let delivery = DeliveryContext::spawn();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..50 {
            let seen = seen.clone();
            delivery.post(move || seen.lock().unwrap().push(i));
        }
        delivery.flush().await;
        assert_eq!(*seen.lock().unwrap(), (0..50).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_post_from_inside_a_job_runs_after_it() {
        let delivery = DeliveryContext::spawn();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let inner = delivery.clone();
        let s = seen.clone();
        delivery.post(move || {
            let s2 = s.clone();
            inner.post(move || s2.lock().unwrap().push("nested"));
            s.lock().unwrap().push("outer");
        });
        delivery.flush().await;
        delivery.flush().await;
        assert_eq!(*seen.lock().unwrap(), vec!["outer", "nested"]);
    }
}
