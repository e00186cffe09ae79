//! Periodic background tasks.
//!
//! A task runs once right after start-up and then on a fixed interval until
//! its `CancellationToken` fires. A cycle that overruns the interval delays
//! the next one instead of bunching ticks up.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::{
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[async_trait]
pub trait ScheduledTask: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self);
}

/// Spawn `task` on the runtime. The returned handle finishes after `cancel`.
pub fn spawn_periodic(
    task: Arc<dyn ScheduledTask>,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(task = task.name(), every_secs = every.as_secs(), "periodic task started");
        job_loop(task.as_ref(), every, &cancel).await;
        info!(task = task.name(), "periodic task stopped");
    })
}

async fn job_loop(task: &dyn ScheduledTask, every: Duration, cancel: &CancellationToken) {
    let mut ticker = interval(every.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                debug!(task = task.name(), "running periodic task");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = task.run() => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter(AtomicUsize);

    #[async_trait]
    impl ScheduledTask for Counter {
        fn name(&self) -> &str {
            "counter"
        }

        async fn run(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn runs_at_start_even_with_long_interval() {
        let counter = Arc::new(Counter::default());
        let cancel = CancellationToken::new();
        let handle = spawn_periodic(counter.clone(), Duration::from_secs(3600), cancel.clone());

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn repeats_until_cancelled() {
        let counter = Arc::new(Counter::default());
        let cancel = CancellationToken::new();
        let handle = spawn_periodic(counter.clone(), Duration::from_millis(10), cancel.clone());

        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        handle.await.unwrap();

        let runs = counter.0.load(Ordering::SeqCst);
        assert!(runs >= 3, "only {runs} runs");
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(counter.0.load(Ordering::SeqCst), runs);
    }
}
