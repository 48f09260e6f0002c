//! Host-owned periodic task runner.
//!
//! Nothing in the crate starts a timer on its own. The host creates a
//! [`Scheduler`], registers the periodic jobs it wants (weight recompute,
//! monitor ticks) and decides when to stop them.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::Result;

struct ScheduledTask {
    name: String,
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

#[derive(Default)]
pub struct Scheduler {
    tasks: Vec<ScheduledTask>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `task` every `interval` on a dedicated thread, first run one
    /// interval from now. A panicking run is logged and the schedule continues.
    pub fn every<F>(&mut self, name: &str, interval: Duration, mut task: F) -> Result<()>
    where
        F: FnMut() + Send + 'static,
    {
        let (stop, signal) = mpsc::channel::<()>();
        let task_name = name.to_string();
        let handle = thread::Builder::new().name(task_name.clone()).spawn(move || {
            loop {
                match signal.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        if panic::catch_unwind(AssertUnwindSafe(&mut task)).is_err() {
                            warn!(task = %task_name, "scheduled task panicked");
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            debug!(task = %task_name, "scheduled task stopped");
        })?;

        debug!(task = name, interval_ms = interval.as_millis() as u64, "scheduled task started");
        self.tasks.push(ScheduledTask {
            name: name.to_string(),
            stop: Some(stop),
            handle: Some(handle),
        });
        Ok(())
    }

    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.iter().map(|task| task.name.as_str()).collect()
    }

    /// Signals every task to stop after its current run. Does not wait.
    pub fn stop(&mut self) {
        for task in &mut self.tasks {
            if let Some(stop) = task.stop.take() {
                let _ = stop.send(());
            }
        }
    }

    /// Stops every task and waits for the threads to exit.
    pub fn join(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop();
        for task in &mut self.tasks {
            if let Some(handle) = task.handle.take() {
                if handle.join().is_err() {
                    warn!(task = %task.name, "scheduled task thread panicked");
                }
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
