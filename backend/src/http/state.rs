//! Application state for the HTTP server.

use std::sync::Arc;

use crate::db::NightRepository;
use crate::services::{MonitorHandle, MonitorSupervisor};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Starts and switches night monitors
    pub supervisor: Arc<MonitorSupervisor>,
    /// Live view of the running monitor
    pub monitor: MonitorHandle,
    pub repository: Arc<dyn NightRepository>,
}

impl AppState {
    pub fn new(supervisor: Arc<MonitorSupervisor>) -> Self {
        Self {
            monitor: supervisor.handle().clone(),
            repository: supervisor.repository().clone(),
            supervisor,
        }
    }
}
