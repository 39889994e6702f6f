//! OpenCmd Addin
//!
//! Demonstration addin: a `Utils` service whose `OpenCmd` function
//! launches the platform shell, detached from the host. Build as a
//! cdylib, transfer the library to a host, and install it with the
//! library file as the main module.

use std::process::Command;

use gantry_api::{FunctionDef, ServiceDef, success_json};

fn open_cmd(_input: &str) -> anyhow::Result<String> {
    #[cfg(windows)]
    let mut command = Command::new("cmd.exe");
    #[cfg(not(windows))]
    let mut command = Command::new("sh");

    command.spawn()?;
    Ok(success_json("OK"))
}

fn services() -> Vec<ServiceDef> {
    vec![ServiceDef::new("Utils").function(FunctionDef::new("OpenCmd", open_cmd))]
}

gantry_api::export_addin!(services);
