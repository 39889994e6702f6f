//! Addin Lifecycle
//!
//! Loading of addin modules and management of the installed set.

mod loader;
mod manager;

pub use loader::{DylibLoader, ModuleLoader};
pub use manager::AddinManager;

use std::path::Path;

use crate::types::{Error, Result};

/// Accept only bare file names, so a transferred or installed name can
/// never escape the staging and addin directories.
pub(crate) fn bare_file_name(name: &str) -> Result<&str> {
    match Path::new(name).file_name().and_then(|f| f.to_str()) {
        Some(file_name) if file_name == name => Ok(name),
        _ => Err(Error::Configuration(format!("invalid file name: {name:?}"))),
    }
}
