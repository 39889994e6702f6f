//! RPC Front Door
//!
//! HTTP surface of the host: one call endpoint plus a health check.

mod handler;
mod router;
mod state;

pub use handler::*;
pub use router::*;
pub use state::*;
