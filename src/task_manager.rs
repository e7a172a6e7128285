//! Lifecycle of the background tasks that run beside the crawler.
use futures::future::join_all;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Spawns named tasks, hands out shutdown receivers and waits for the tasks
/// to finish once shutdown is signalled.
#[derive(Clone, Debug)]
pub struct TaskManager {
    handles: Arc<Mutex<Vec<(&'static str, JoinHandle<()>)>>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl TaskManager {
    pub fn new(shutdown_rx: watch::Receiver<bool>) -> Self {
        Self {
            handles: Arc::new(Mutex::new(Vec::new())),
            shutdown_rx,
        }
    }

    /// Spawns a new task and adds its handle to the manager.
    pub fn spawn<F>(&self, name: &'static str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        debug!(task_name = name, "Spawning task");
        let handle = tokio::spawn(future);
        if let Ok(mut handles) = self.handles.lock() {
            handles.push((name, handle));
        }
    }

    /// Returns a clone of the shutdown receiver.
    pub fn get_shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Waits up to `timeout` for all managed tasks, aborting any stragglers.
    pub async fn shutdown(self, timeout: Duration) {
        let handles = match self.handles.lock() {
            Ok(mut handles) => handles.drain(..).collect::<Vec<_>>(),
            Err(_) => return,
        };
        info!(
            "TaskManager shutting down. Waiting for {} tasks to complete...",
            handles.len()
        );

        let task_names: Vec<&'static str> = handles.iter().map(|(name, _)| *name).collect();
        let aborts: Vec<_> = handles.iter().map(|(_, handle)| handle.abort_handle()).collect();

        match tokio::time::timeout(
            timeout,
            join_all(handles.into_iter().map(|(_, handle)| handle)),
        )
        .await
        {
            Ok(results) => {
                for (task_name, result) in task_names.iter().zip(results) {
                    match result {
                        Ok(()) => debug!(task_name, "Task shut down gracefully."),
                        Err(e) => error!(task_name, error = %e, "Task panicked during shutdown."),
                    }
                }
            }
            Err(_) => {
                warn!(tasks = ?task_names, "Tasks did not finish in time, aborting them.");
                for abort in aborts {
                    abort.abort();
                }
            }
        }
    }
}
