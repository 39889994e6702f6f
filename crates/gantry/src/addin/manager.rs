//! Addin Lifecycle Manager
//!
//! Owns the persisted list of installed addins and orchestrates file
//! placement, loading, and removal. The record list's mutex doubles as
//! the install critical section: a mutation holds it from the
//! precondition checks through manifest persistence, so concurrent
//! installs cannot interleave.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use gantry_api::InstallMessage;

use crate::types::{Error, Result};

use super::{ModuleLoader, bare_file_name};

pub struct AddinManager {
    loader: Arc<dyn ModuleLoader>,
    staging_dir: PathBuf,
    addin_dir: PathBuf,
    manifest_path: PathBuf,
    records: Mutex<Vec<InstallMessage>>,
}

impl AddinManager {
    pub fn new(
        loader: Arc<dyn ModuleLoader>,
        staging_dir: impl Into<PathBuf>,
        addin_dir: impl Into<PathBuf>,
        manifest_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            loader,
            staging_dir: staging_dir.into(),
            addin_dir: addin_dir.into(),
            manifest_path: manifest_path.into(),
            records: Mutex::new(Vec::new()),
        }
    }

    /// Install a previously transferred addin: move its files out of
    /// staging, load the main module, and persist the updated manifest.
    pub fn install(&self, addin: &InstallMessage) -> Result<()> {
        let mut records = self.records.lock();

        if records.iter().any(|r| r.main_dll == addin.main_dll) {
            return Err(Error::Configuration(format!(
                "addin {} is already installed",
                addin.main_dll
            )));
        }

        let names = Self::file_set(addin)?;

        // Verify every file before moving any, so a bad request leaves
        // staging untouched.
        for name in &names {
            if !self.staging_dir.join(name).exists() {
                return Err(Error::NotFound(format!("file {name}")));
            }
        }

        for name in &names {
            let staged = self.staging_dir.join(name);
            let installed = self.addin_dir.join(name);
            if installed.exists() {
                fs::remove_file(&installed)?;
            }
            fs::rename(&staged, &installed)?;
        }

        // On load failure the files stay in the addin directory but no
        // record is written: the addin is inert on disk.
        let (main_module, dependencies) = self.module_paths(&names);
        let service_names = self.loader.load(&main_module, &dependencies)?;
        info!(
            "Installed addin {} ({} services)",
            addin.main_dll,
            service_names.len()
        );

        records.push(addin.clone());
        self.persist(&records)
    }

    /// Uninstall an addin: unload it first so no live context maps a
    /// file that is about to be deleted, then remove its files and its
    /// manifest record. Unknown addins are tolerated.
    pub fn uninstall(&self, addin: &InstallMessage) -> Result<()> {
        let mut records = self.records.lock();
        let names = Self::file_set(addin)?;

        let (main_module, _) = self.module_paths(&names);
        self.loader.unload(&main_module)?;

        for name in &names {
            let installed = self.addin_dir.join(name);
            if installed.exists() {
                fs::remove_file(&installed)?;
            }
        }

        records.retain(|r| r.main_dll != addin.main_dll);
        self.persist(&records)?;
        info!("Uninstalled addin {}", addin.main_dll);
        Ok(())
    }

    /// Bring every addin recorded in the manifest back up. Called once
    /// at startup, before the server accepts calls. An addin that fails
    /// to load is skipped with its record retained, so a later fix plus
    /// restart can recover it.
    pub fn restore(&self) -> Result<usize> {
        let mut records = self.records.lock();
        *records = self.read_manifest()?;

        let mut restored = 0;
        for record in records.iter() {
            let names = match Self::file_set(record) {
                Ok(names) => names,
                Err(e) => {
                    warn!("Skipping addin {}: {e}", record.main_dll);
                    continue;
                }
            };
            let (main_module, dependencies) = self.module_paths(&names);
            match self.loader.load(&main_module, &dependencies) {
                Ok(_) => restored += 1,
                Err(e) => warn!("Failed to restore addin {}: {e}", record.main_dll),
            }
        }
        Ok(restored)
    }

    pub fn installed_count(&self) -> usize {
        self.records.lock().len()
    }

    /// Main module plus dependencies as bare file names, main first,
    /// de-duplicated. Clients differ on whether `filenames` repeats the
    /// main module; both conventions land here.
    fn file_set(addin: &InstallMessage) -> Result<Vec<String>> {
        let mut names = vec![bare_file_name(&addin.main_dll)?.to_string()];
        for filename in &addin.filenames {
            let name = bare_file_name(filename)?;
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    /// Installed path of the main module and its dependencies. The main
    /// module path is also the load context key, constructed the same
    /// way on every call site so install and uninstall agree.
    fn module_paths(&self, names: &[String]) -> (PathBuf, Vec<PathBuf>) {
        let main_module = self.addin_dir.join(&names[0]);
        let dependencies = names[1..].iter().map(|n| self.addin_dir.join(n)).collect();
        (main_module, dependencies)
    }

    fn read_manifest(&self) -> Result<Vec<InstallMessage>> {
        if !self.manifest_path.exists() {
            return Ok(Vec::new());
        }
        let json = fs::read_to_string(&self.manifest_path).map_err(|e| {
            Error::Persistence(format!(
                "failed to read {}: {e}",
                self.manifest_path.display()
            ))
        })?;
        serde_json::from_str(&json).map_err(|e| {
            Error::Persistence(format!(
                "failed to parse {}: {e}",
                self.manifest_path.display()
            ))
        })
    }

    fn persist(&self, records: &[InstallMessage]) -> Result<()> {
        let json = serde_json::to_string_pretty(records)
            .map_err(|e| Error::Persistence(format!("failed to serialize manifest: {e}")))?;
        fs::write(&self.manifest_path, json).map_err(|e| {
            Error::Persistence(format!(
                "failed to write {}: {e}",
                self.manifest_path.display()
            ))
        })
    }
}
