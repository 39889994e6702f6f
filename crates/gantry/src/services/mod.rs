//! Callable Services
//!
//! The registry that routes calls and the built-in system service.

mod registry;
mod system;

pub use registry::{CallStats, ServiceRegistry};
pub use system::system_service;
