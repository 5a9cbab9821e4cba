//! Application State
//!
//! Shared handles to the job store, the worker pool and the services built
//! over them.

use std::sync::Arc;

use courier_queue::{AdmissionConfig, AdmissionRouter, JobStore, StatusService, WorkerPool};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn JobStore>,
    pool: Arc<WorkerPool>,
    admission: Arc<AdmissionRouter>,
    status: StatusService,
}

impl AppState {
    pub fn new(store: Arc<dyn JobStore>, pool: Arc<WorkerPool>, admission: AdmissionConfig) -> Self {
        Self {
            admission: Arc::new(AdmissionRouter::new(store.clone(), pool.clone(), admission)),
            status: StatusService::new(store.clone()),
            store,
            pool,
        }
    }

    /// Get job store (cloned Arc for sharing)
    pub fn store(&self) -> Arc<dyn JobStore> {
        self.store.clone()
    }

    /// Get worker pool (cloned Arc for sharing)
    pub fn pool(&self) -> Arc<WorkerPool> {
        self.pool.clone()
    }

    pub fn admission(&self) -> &AdmissionRouter {
        &self.admission
    }

    pub fn status(&self) -> &StatusService {
        &self.status
    }
}
