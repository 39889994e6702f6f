//! System Service
//!
//! The reserved `_` service through which hosts are managed remotely:
//! file transfer into staging, addin install and uninstall, and service
//! discovery. Domain failures of these functions travel in-band as
//! error payloads inside a success reply, so a caller can always decode
//! the payload the same way.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::info;

use gantry_api::wire::system;
use gantry_api::{
    FunctionDef, InputMetaData, InstallMessage, ServiceDef, TransferMessage, error_json,
    success_json,
};

use crate::addin::{AddinManager, bare_file_name};
use crate::services::ServiceRegistry;

/// Build the management service definition
///
/// Handlers hold weak references back into the host so the service can
/// live inside the registry it manages without keeping it alive.
pub fn system_service(
    registry: &Arc<ServiceRegistry>,
    manager: &Arc<AddinManager>,
    staging_dir: PathBuf,
) -> ServiceDef {
    let registry = Arc::downgrade(registry);
    let install_manager = Arc::downgrade(manager);
    let uninstall_manager = install_manager.clone();

    ServiceDef::new(system::SERVICE)
        .function(
            FunctionDef::new(system::TRANSFER, move |input: &str| {
                Ok(transfer(&staging_dir, input))
            })
            .input(InputMetaData::new("filename", "String"))
            .input(InputMetaData::new("type", "String"))
            .input(InputMetaData::new("content", "String")),
        )
        .function(
            FunctionDef::new(system::INSTALL, move |input: &str| {
                Ok(install(&install_manager, input))
            })
            .input(InputMetaData::new("mainDll", "String"))
            .input(InputMetaData::array("filenames", "String")),
        )
        .function(
            FunctionDef::new(system::UNINSTALL, move |input: &str| {
                Ok(uninstall(&uninstall_manager, input))
            })
            .input(InputMetaData::new("mainDll", "String"))
            .input(InputMetaData::array("filenames", "String")),
        )
        .function(FunctionDef::new(system::LIST, move |_: &str| {
            list(&registry)
        }))
}

/// Write a transferred file into the staging directory.
fn transfer(staging_dir: &Path, input: &str) -> String {
    let message: TransferMessage = match serde_json::from_str(input) {
        Ok(message) => message,
        Err(e) => return error_json(format!("invalid transfer request: {e}")),
    };
    let filename = match bare_file_name(&message.filename) {
        Ok(filename) => filename,
        Err(e) => return error_json(e.to_string()),
    };

    let path = staging_dir.join(filename);
    let written = if message.kind.eq_ignore_ascii_case("base64") {
        match BASE64.decode(message.content.as_bytes()) {
            Ok(bytes) => std::fs::write(&path, bytes),
            Err(e) => return error_json(format!("invalid base64 content: {e}")),
        }
    } else {
        std::fs::write(&path, message.content.as_bytes())
    };

    match written {
        Ok(()) => {
            info!("Transferred {} into staging", filename);
            success_json("Transfer OK")
        }
        Err(e) => error_json(format!("failed to write {}: {e}", path.display())),
    }
}

fn install(manager: &Weak<AddinManager>, input: &str) -> String {
    let message: InstallMessage = match serde_json::from_str(input) {
        Ok(message) => message,
        Err(e) => return error_json(format!("invalid install request: {e}")),
    };
    let Some(manager) = manager.upgrade() else {
        return error_json("host is shutting down");
    };
    match manager.install(&message) {
        Ok(()) => success_json("Install OK"),
        Err(e) => error_json(e.to_string()),
    }
}

fn uninstall(manager: &Weak<AddinManager>, input: &str) -> String {
    let message: InstallMessage = match serde_json::from_str(input) {
        Ok(message) => message,
        Err(e) => return error_json(format!("invalid uninstall request: {e}")),
    };
    let Some(manager) = manager.upgrade() else {
        return error_json("host is shutting down");
    };
    match manager.uninstall(&message) {
        Ok(()) => success_json("Uninstall OK"),
        Err(e) => error_json(e.to_string()),
    }
}

/// Describe every registered service. Unlike the other system functions
/// the success payload is the metadata array itself.
fn list(registry: &Weak<ServiceRegistry>) -> anyhow::Result<String> {
    let Some(registry) = registry.upgrade() else {
        return Ok(error_json("host is shutting down"));
    };
    Ok(serde_json::to_string(&registry.list_metadata())?)
}
