//! Fan-out of background tasks with a single join barrier.

use crate::errors::{Result, RigError};
use std::thread::{self, JoinHandle};

pub struct WorkerGroup<T: Send + 'static> {
    name: String,
    handles: Vec<(String, JoinHandle<Result<T>>)>,
}

impl<T: Send + 'static> WorkerGroup<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handles: Vec::new(),
        }
    }

    /// Start `task` on its own thread.
    pub fn spawn<F>(&mut self, label: impl Into<String>, task: F) -> Result<()>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let label = label.into();
        let handle = thread::Builder::new()
            .name(format!("{}-{}", self.name, label))
            .spawn(task)?;
        log::debug!("Worker {} started", label);
        self.handles.push((label, handle));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every worker. Returns the results in spawn order, or the
    /// first failure (in spawn order) once all workers have finished.
    pub fn join_all(mut self) -> Result<Vec<T>> {
        let mut results = Vec::with_capacity(self.handles.len());
        let mut first_error = None;

        for (label, handle) in self.handles.drain(..) {
            match handle.join() {
                Ok(Ok(value)) => results.push(value),
                Ok(Err(e)) => {
                    log::error!("Worker {} failed: {}", label, e);
                    first_error.get_or_insert(e);
                }
                Err(_) => {
                    log::error!("Worker {} panicked", label);
                    first_error.get_or_insert(RigError::WorkerPanicked(label));
                }
            }
        }

        log::info!("{} workers joined", self.name);
        match first_error {
            Some(e) => Err(e),
            None => Ok(results),
        }
    }
}

impl<T: Send + 'static> Drop for WorkerGroup<T> {
    fn drop(&mut self) {
        for (_, handle) in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}
