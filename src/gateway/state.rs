use std::sync::Arc;
use std::time::Instant;

use crate::transfer::{TransferCoordinator, TransferStore};

/// Shared gateway state
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<TransferCoordinator>,
    started_at: Instant,
}

impl AppState {
    pub fn new(coordinator: Arc<TransferCoordinator>) -> Self {
        Self {
            coordinator,
            started_at: Instant::now(),
        }
    }

    pub fn store(&self) -> &Arc<dyn TransferStore> {
        self.coordinator.store()
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
