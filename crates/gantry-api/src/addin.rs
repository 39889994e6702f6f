//! Addin ABI
//!
//! An addin is a dynamic library exporting a single well-known static,
//! [`AddinDeclaration`], whose entry function returns the services the
//! addin contributes. The declaration carries an ABI version so the host
//! can refuse modules built against an incompatible interface; beyond
//! that check, addins must be built with the same toolchain and
//! `gantry-api` version as the host.

use crate::service::ServiceDef;

/// Version of the host/addin interface.
///
/// Bump whenever the declaration layout or the types reachable from
/// [`ServiceDef`] change incompatibly.
pub const ABI_VERSION: u32 = 1;

/// Exported symbol name the loader resolves in every addin.
pub const DECLARATION_SYMBOL: &[u8] = b"GANTRY_ADDIN";

/// The declaration an addin exports under [`DECLARATION_SYMBOL`]
#[derive(Copy, Clone)]
pub struct AddinDeclaration {
    pub abi_version: u32,
    pub entry: fn() -> Vec<ServiceDef>,
}

/// Export an addin entry point.
///
/// ```ignore
/// fn services() -> Vec<ServiceDef> {
///     vec![ServiceDef::new("Utils")
///         .function(FunctionDef::new("OpenCmd", |_| Ok(success_json("OK"))))]
/// }
///
/// gantry_api::export_addin!(services);
/// ```
#[macro_export]
macro_rules! export_addin {
    ($entry:path) => {
        #[unsafe(no_mangle)]
        pub static GANTRY_ADDIN: $crate::AddinDeclaration = $crate::AddinDeclaration {
            abi_version: $crate::ABI_VERSION,
            entry: $entry,
        };
    };
}
