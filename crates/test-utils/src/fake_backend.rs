use std::sync::{Arc, Mutex};

use simqueue::backend::{ComputeBackend, DispatchUnit};
use simqueue::errors::{GridError, Result};
use simqueue::store::JobId;

/// A fake compute backend that:
/// - records every dispatched unit
/// - optionally refuses chosen jobs, to exercise dispatch-failure paths.
#[derive(Default)]
pub struct FakeBackend {
    dispatched: Arc<Mutex<Vec<DispatchUnit>>>,
    refuse: Vec<JobId>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle onto the dispatch log.
    pub fn log(&self) -> Arc<Mutex<Vec<DispatchUnit>>> {
        Arc::clone(&self.dispatched)
    }

    pub fn refuse(mut self, job: JobId) -> Self {
        self.refuse.push(job);
        self
    }

    pub fn dispatched_jobs(&self) -> Vec<JobId> {
        self.dispatched
            .lock()
            .expect("dispatch log poisoned")
            .iter()
            .map(|u| u.job)
            .collect()
    }
}

impl ComputeBackend for FakeBackend {
    fn dispatch(&mut self, unit: &DispatchUnit) -> Result<()> {
        if self.refuse.contains(&unit.job) {
            return Err(GridError::Backend(format!(
                "refusing job {} by test configuration",
                unit.job
            )));
        }
        self.dispatched
            .lock()
            .expect("dispatch log poisoned")
            .push(unit.clone());
        Ok(())
    }
}
