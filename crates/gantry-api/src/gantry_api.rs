//! Gantry API
//!
//! Shared vocabulary between the gantry host, its clients, and addins:
//! the wire envelope and return message, management payloads and service
//! metadata, service/function definition builders, and the addin ABI.

pub mod addin;
pub mod meta;
pub mod service;
pub mod wire;

pub use addin::{ABI_VERSION, AddinDeclaration, DECLARATION_SYMBOL};
pub use meta::{FunctionMetaData, InputMetaData, InstallMessage, ServiceMetaData, TransferMessage};
pub use service::{FunctionDef, Handler, ServiceDef};
pub use wire::{Envelope, ReturnKind, ReturnMessage, error_json, success_json};
