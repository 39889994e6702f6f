//! Gantry - Addin Host
//!
//! A long-running host process that exposes named, remotely callable
//! functions over HTTP and can be extended at runtime by installing
//! addin modules.

pub mod addin;
pub mod config;
pub mod server;
pub mod services;
pub mod types;
