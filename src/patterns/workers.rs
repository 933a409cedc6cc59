use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;
use tracing::{Instrument, error, info_span};

use crate::utils::{MessagingError, Result, Shutdown, ShutdownTrigger};

struct Worker {
    stop: ShutdownTrigger,
    task: JoinHandle<()>,
}

/// Background loops of a pattern client, one per topic.
pub(crate) struct Workers {
    lifetime: ShutdownTrigger,
    running: Mutex<HashMap<String, Worker>>,
    retired: Mutex<Vec<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Workers {
    pub(crate) fn new() -> Self {
        Self {
            lifetime: ShutdownTrigger::new(),
            running: Mutex::new(HashMap::new()),
            retired: Mutex::new(Vec::new()),
        }
    }

    /// Fires when the owning client closes.
    pub(crate) fn lifetime(&self) -> Shutdown {
        self.lifetime.subscribe()
    }

    pub(crate) fn is_running(&self, topic: &str) -> bool {
        lock(&self.running).contains_key(topic)
    }

    /// Spawns the loop built by `run` for `topic`. The loop receives a signal
    /// that fires on unsubscribe or close.
    pub(crate) fn start<F, Fut>(&self, topic: &str, run: F) -> Result<()>
    where
        F: FnOnce(Shutdown) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut running = lock(&self.running);
        if running.contains_key(topic) {
            return Err(MessagingError::AlreadySubscribed(topic.to_string()));
        }
        if self.lifetime.is_triggered() {
            return Err(MessagingError::Closed);
        }
        let stop = ShutdownTrigger::new();
        let shutdown = self.lifetime.subscribe().or(&stop.subscribe());
        let task = tokio::spawn(run(shutdown).instrument(info_span!("worker", topic)));
        running.insert(topic.to_string(), Worker { stop, task });
        Ok(())
    }

    /// Signals the loop of `topic` to stop. It is awaited on shutdown.
    pub(crate) fn stop(&self, topic: &str) -> Result<()> {
        let worker = lock(&self.running)
            .remove(topic)
            .ok_or_else(|| MessagingError::TopicNotFound(topic.to_string()))?;
        worker.stop.trigger();
        let mut retired = lock(&self.retired);
        retired.retain(|task| !task.is_finished());
        retired.push(worker.task);
        Ok(())
    }

    /// Stopped loops that have not been awaited yet.
    #[cfg(test)]
    pub(crate) fn retired(&self) -> usize {
        lock(&self.retired).len()
    }

    /// Stops every loop and waits for all of them to exit.
    pub(crate) async fn shutdown(&self) {
        self.lifetime.trigger();
        let mut tasks: Vec<JoinHandle<()>> = lock(&self.retired).drain(..).collect();
        tasks.extend(lock(&self.running).drain().map(|(_, worker)| worker.task));
        for task in tasks {
            if let Err(error) = task.await {
                error!(%error, "pattern loop did not exit cleanly");
            }
        }
    }
}
