//! Module Loader
//!
//! Opens addin dynamic libraries via dlopen, each in its own load
//! context, and registers the services they declare. A context keeps its
//! libraries mapped until the addin is unloaded, and handlers pin the
//! mapping for as long as a call can still reach them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::Library;
use parking_lot::Mutex;
use tracing::info;

use gantry_api::{ABI_VERSION, AddinDeclaration, DECLARATION_SYMBOL, Handler, ServiceDef};

use crate::services::ServiceRegistry;
use crate::types::{Error, Result};

/// Loads and unloads addin modules
///
/// Seam between the lifecycle manager and the platform loading
/// primitive; tests substitute an in-memory implementation.
pub trait ModuleLoader: Send + Sync {
    /// Load the module at `main_module`, resolving its imports against
    /// `dependencies`, and register the services it declares. Returns
    /// the registered service names.
    fn load(&self, main_module: &Path, dependencies: &[PathBuf]) -> Result<Vec<String>>;

    /// Unregister the module's services and release its load context.
    /// Unknown modules are a no-op.
    fn unload(&self, main_module: &Path) -> Result<()>;
}

/// The opened libraries of one addin. `_main` is declared first so it
/// closes before the dependencies it links against.
struct AddinLibrary {
    _main: Library,
    _deps: Vec<Library>,
}

struct LoadContext {
    _library: Arc<AddinLibrary>,
    /// `(service, function)` pairs this context registered.
    functions: Vec<(String, String)>,
}

/// Keeps a handler's code mapped: the library reference drops after the
/// handler itself.
struct PinnedHandler {
    handler: Handler,
    _library: Arc<AddinLibrary>,
}

/// Dynamic library loader
pub struct DylibLoader {
    registry: Arc<ServiceRegistry>,
    contexts: Mutex<HashMap<PathBuf, LoadContext>>,
}

impl DylibLoader {
    pub fn new(registry: Arc<ServiceRegistry>) -> Self {
        Self {
            registry,
            contexts: Mutex::new(HashMap::new()),
        }
    }

    fn open_main(path: &Path) -> Result<Library> {
        #[cfg(unix)]
        unsafe {
            use libloading::os::unix;
            unix::Library::open(Some(path), unix::RTLD_NOW)
                .map(Library::from)
                .map_err(|e| Error::Load(format!("{}: {e}", path.display())))
        }
        #[cfg(not(unix))]
        unsafe {
            Library::new(path).map_err(|e| Error::Load(format!("{}: {e}", path.display())))
        }
    }

    fn open_dependency(path: &Path) -> Result<Library> {
        // RTLD_GLOBAL so the main module resolves its imports against
        // already-opened dependencies.
        #[cfg(unix)]
        unsafe {
            use libloading::os::unix;
            unix::Library::open(Some(path), unix::RTLD_NOW | unix::RTLD_GLOBAL)
                .map(Library::from)
                .map_err(|e| Error::Load(format!("{}: {e}", path.display())))
        }
        #[cfg(not(unix))]
        Self::open_main(path)
    }

    fn read_declaration(library: &Library, path: &Path) -> Result<AddinDeclaration> {
        let declaration = unsafe {
            library
                .get::<*const AddinDeclaration>(DECLARATION_SYMBOL)
                .map_err(|e| Error::Load(format!("{}: {e}", path.display())))?
                .read()
        };
        if declaration.abi_version != ABI_VERSION {
            return Err(Error::Load(format!(
                "{}: declares abi version {}, host expects {}",
                path.display(),
                declaration.abi_version,
                ABI_VERSION
            )));
        }
        Ok(declaration)
    }

    /// Register the declared services, rolling the batch back function
    /// by function on a partial failure so no half-loaded addin stays
    /// visible. Rollback leaves functions other parties registered
    /// under a shared service name in place.
    fn register_services(&self, defs: Vec<ServiceDef>) -> Result<Vec<(String, String)>> {
        let mut registered: Vec<(String, String)> = Vec::new();
        for def in defs {
            let functions: Vec<(String, String)> = def
                .functions
                .iter()
                .map(|function| (def.name.clone(), function.name.clone()))
                .collect();
            if let Err(e) = self.registry.register(def) {
                for (service, function) in &registered {
                    self.registry.unregister_function(service, function);
                }
                return Err(e);
            }
            registered.extend(functions);
        }
        Ok(registered)
    }
}

impl ModuleLoader for DylibLoader {
    fn load(&self, main_module: &Path, dependencies: &[PathBuf]) -> Result<Vec<String>> {
        let key = main_module.to_path_buf();
        if self.contexts.lock().contains_key(&key) {
            return Err(Error::Load(format!("{} is already loaded", key.display())));
        }

        let mut deps = Vec::with_capacity(dependencies.len());
        for dependency in dependencies {
            deps.push(Self::open_dependency(dependency)?);
        }
        let main = Self::open_main(main_module)?;
        let declaration = Self::read_declaration(&main, main_module)?;

        let library = Arc::new(AddinLibrary {
            _main: main,
            _deps: deps,
        });
        let mut defs = (declaration.entry)();
        pin_handlers(&mut defs, &library);

        // A registration failure drops `library` on the way out, which
        // closes the freshly opened context.
        let functions = self.register_services(defs)?;
        let names = service_names(&functions);

        info!(
            "Loaded addin {} ({} services)",
            main_module.display(),
            names.len()
        );
        self.contexts.lock().insert(
            key,
            LoadContext {
                _library: library,
                functions,
            },
        );
        Ok(names)
    }

    fn unload(&self, main_module: &Path) -> Result<()> {
        let Some(context) = self.contexts.lock().remove(main_module) else {
            return Ok(());
        };
        // Only this context's functions go; a service name shared with
        // another context keeps that context's functions.
        for (service, function) in &context.functions {
            self.registry.unregister_function(service, function);
        }
        info!("Unloaded addin {}", main_module.display());
        // `context` drops here; in-flight calls keep the mapping alive
        // through their pinned handlers.
        drop(context);
        Ok(())
    }
}

/// Distinct service names in declaration order.
fn service_names(functions: &[(String, String)]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for (service, _) in functions {
        if !names.contains(service) {
            names.push(service.clone());
        }
    }
    names
}

fn pin_handlers(defs: &mut [ServiceDef], library: &Arc<AddinLibrary>) {
    for def in defs {
        for function in &mut def.functions {
            let pinned = PinnedHandler {
                handler: Arc::clone(&function.handler),
                _library: Arc::clone(library),
            };
            function.handler = Arc::new(move |input: &str| (pinned.handler)(input));
        }
    }
}
