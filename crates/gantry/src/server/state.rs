//! Server Application State
//!
//! Shared state accessible by all request handlers.

use std::sync::Arc;
use std::time::Duration;

use crate::addin::AddinManager;
use crate::services::ServiceRegistry;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Registry the front door dispatches into
    registry: Arc<ServiceRegistry>,

    /// Addin lifecycle manager (health reporting)
    manager: Arc<AddinManager>,

    /// Per-call dispatch deadline
    call_timeout: Duration,
}

impl AppState {
    pub fn new(
        registry: Arc<ServiceRegistry>,
        manager: Arc<AddinManager>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                registry,
                manager,
                call_timeout,
            }),
        }
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.inner.registry
    }

    pub fn manager(&self) -> &Arc<AddinManager> {
        &self.inner.manager
    }

    pub fn call_timeout(&self) -> Duration {
        self.inner.call_timeout
    }
}
