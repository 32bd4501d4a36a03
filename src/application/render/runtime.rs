use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use uuid::Uuid;

/// Tracks export jobs currently being handled by this process.
///
/// The queue may hand the same job to two worker slots after a lease expires;
/// the second slot backs off while the first still holds the guard.
#[derive(Default, Clone)]
pub struct InFlightRenders {
    jobs: Arc<DashMap<Uuid, ()>>,
}

#[derive(Debug, Error)]
pub enum InFlightError {
    #[error("export job {job_id} is already being rendered")]
    AlreadyRunning { job_id: Uuid },
}

impl InFlightRenders {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(DashMap::new()),
        }
    }

    pub fn acquire(&self, job_id: Uuid) -> Result<RenderGuard, InFlightError> {
        use dashmap::mapref::entry::Entry;

        match self.jobs.entry(job_id) {
            Entry::Vacant(vacant) => {
                vacant.insert(());
                Ok(RenderGuard {
                    job_id,
                    jobs: Arc::clone(&self.jobs),
                })
            }
            Entry::Occupied(_) => Err(InFlightError::AlreadyRunning { job_id }),
        }
    }

    pub fn is_running(&self, job_id: Uuid) -> bool {
        self.jobs.contains_key(&job_id)
    }
}

pub struct RenderGuard {
    job_id: Uuid,
    jobs: Arc<DashMap<Uuid, ()>>,
}

impl Drop for RenderGuard {
    fn drop(&mut self) {
        self.jobs.remove(&self.job_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_releases_on_drop() {
        let inflight = InFlightRenders::new();
        let job_id = Uuid::new_v4();

        let guard = inflight.acquire(job_id).unwrap();
        assert!(inflight.is_running(job_id));
        assert!(matches!(
            inflight.acquire(job_id),
            Err(InFlightError::AlreadyRunning { .. })
        ));

        drop(guard);
        assert!(!inflight.is_running(job_id));
        assert!(inflight.acquire(job_id).is_ok());
    }
}
