//! Service Registry & Dispatcher
//!
//! Maps service and function names to handlers and routes call envelopes
//! to them. Every dispatched call updates the function's usage counters,
//! which surface through service discovery.

use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{info, warn};

use gantry_api::wire::stats;
use gantry_api::{
    Envelope, FunctionDef, FunctionMetaData, Handler, InputMetaData, ServiceDef, ServiceMetaData,
};

use crate::types::{Error, Result};

/// Usage counters for one registered function
#[derive(Debug, Clone, Default)]
pub struct CallStats {
    /// Dispatched calls, including failed ones
    pub count: u64,
    /// Accumulated handler execution time
    pub total: Duration,
    /// `"OK"` or the failure text of the most recent call
    pub last_result: String,
}

struct FunctionEntry {
    handler: Handler,
    inputs: Vec<InputMetaData>,
    stats: Arc<Mutex<CallStats>>,
}

#[derive(Default)]
struct ServiceEntry {
    functions: HashMap<String, FunctionEntry>,
}

/// Registry of callable services
///
/// Registrations with the same service name merge: the first one creates
/// the service, later ones add functions to it. Function names within a
/// service must stay unique.
pub struct ServiceRegistry {
    services: DashMap<String, ServiceEntry>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            services: DashMap::new(),
        }
    }

    /// Register a service definition
    ///
    /// Validates the whole definition before touching the registry, so a
    /// rejected definition leaves no partial registration behind.
    pub fn register(&self, def: ServiceDef) -> Result<()> {
        if def.name.is_empty() {
            return Err(Error::Configuration(
                "service definition has no name".to_string(),
            ));
        }

        let added = def.functions.len();
        match self.services.entry(def.name.clone()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                Self::check_functions(&def, |name| entry.functions.contains_key(name))?;
                Self::insert_functions(entry, def.functions);
            }
            // A new service entry only appears once the whole definition
            // passed validation.
            Entry::Vacant(vacant) => {
                Self::check_functions(&def, |_| false)?;
                let mut entry = ServiceEntry::default();
                Self::insert_functions(&mut entry, def.functions);
                vacant.insert(entry);
            }
        }

        info!("Registered service {} ({} functions)", def.name, added);
        Ok(())
    }

    fn check_functions(def: &ServiceDef, taken: impl Fn(&str) -> bool) -> Result<()> {
        let mut seen = HashSet::new();
        for function in &def.functions {
            if taken(&function.name) || !seen.insert(function.name.clone()) {
                return Err(Error::Configuration(format!(
                    "function {}.{} is already registered",
                    def.name, function.name
                )));
            }
        }
        Ok(())
    }

    fn insert_functions(entry: &mut ServiceEntry, functions: Vec<FunctionDef>) {
        for function in functions {
            entry.functions.insert(
                function.name.clone(),
                FunctionEntry {
                    handler: function.handler,
                    inputs: function.inputs,
                    stats: Arc::new(Mutex::new(CallStats::default())),
                },
            );
        }
    }

    /// Remove a service and all of its functions. Returns whether the
    /// service existed.
    pub fn unregister(&self, name: &str) -> bool {
        match self.services.remove(name) {
            Some(_) => {
                info!("Unregistered service {name}");
                true
            }
            None => false,
        }
    }

    /// Remove one function from a service, dropping the service entry
    /// when its last function goes. Returns whether the function
    /// existed. Functions other registrations contributed to the same
    /// service name stay in place.
    pub fn unregister_function(&self, service: &str, function: &str) -> bool {
        let Some(mut entry) = self.services.get_mut(service) else {
            return false;
        };
        let removed = entry.functions.remove(function).is_some();
        let emptied = entry.functions.is_empty();
        drop(entry);
        // Re-checked under the removal lock; a concurrent registration
        // may have repopulated the service meanwhile.
        if emptied
            && self
                .services
                .remove_if(service, |_, entry| entry.functions.is_empty())
                .is_some()
        {
            info!("Unregistered service {service}");
        }
        removed
    }

    /// Route one call envelope to its handler and build the reply
    ///
    /// Misses produce an error reply and leave all counters untouched. A
    /// hit counts the call before invoking the handler and accumulates
    /// the handler's execution time afterwards.
    pub fn dispatch(&self, request: &Envelope) -> Envelope {
        let (handler, stats) = {
            let Some(service) = self.services.get(&request.service) else {
                return request.reply_error(format!("{} was not found", request.service));
            };
            let Some(function) = service.functions.get(&request.function) else {
                return request.reply_error(format!(
                    "{}.{} was not found",
                    request.service, request.function
                ));
            };
            // Clone out of the map and drop the guard before invoking:
            // handlers may reenter the registry.
            (function.handler.clone(), Arc::clone(&function.stats))
        };

        stats.lock().count += 1;

        let started = Instant::now();
        let outcome = Self::invoke(&handler, &request.data);
        let elapsed = started.elapsed();

        let mut guard = stats.lock();
        guard.total += elapsed;
        match outcome {
            Ok(result) => {
                guard.last_result = "OK".to_string();
                request.reply(result)
            }
            Err(e) => {
                let message = format!("{}.{} failed: {e}", request.service, request.function);
                guard.last_result = message.clone();
                warn!("{message}");
                request.reply_error(message)
            }
        }
    }

    /// Run the handler, converting panics into handler errors so one bad
    /// addin cannot take the host down.
    fn invoke(handler: &Handler, data: &str) -> Result<String> {
        match panic::catch_unwind(AssertUnwindSafe(|| handler(data))) {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => Err(Error::Handler(format!("{e:#}"))),
            Err(payload) => Err(Error::Handler(panic_text(payload))),
        }
    }

    /// Snapshot of every registered service for discovery, sorted by
    /// service name and function name.
    pub fn list_metadata(&self) -> Vec<ServiceMetaData> {
        let mut services: Vec<ServiceMetaData> = self
            .services
            .iter()
            .map(|entry| {
                let mut functions: Vec<FunctionMetaData> = entry
                    .functions
                    .iter()
                    .map(|(name, function)| {
                        let snapshot = function.stats.lock().clone();
                        let mut properties = serde_json::Map::new();
                        properties.insert(stats::COUNT.to_string(), Value::from(snapshot.count));
                        properties.insert(
                            stats::TOTAL.to_string(),
                            Value::from(snapshot.total.as_secs_f64()),
                        );
                        properties
                            .insert(stats::RESULT.to_string(), Value::from(snapshot.last_result));
                        FunctionMetaData {
                            name: name.clone(),
                            inputs: function.inputs.clone(),
                            properties,
                        }
                    })
                    .collect();
                functions.sort_by(|a, b| a.name.cmp(&b.name));
                ServiceMetaData {
                    name: entry.key().clone(),
                    functions,
                }
            })
            .collect();
        services.sort_by(|a, b| a.name.cmp(&b.name));
        services
    }

    pub fn contains(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_text(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_api::{FunctionDef, ReturnMessage};

    fn echo_service() -> ServiceDef {
        ServiceDef::new("echo").function(FunctionDef::new("upper", |input: &str| {
            Ok(input.to_uppercase())
        }))
    }

    fn function_properties(
        registry: &ServiceRegistry,
        service: &str,
        function: &str,
    ) -> serde_json::Map<String, Value> {
        registry
            .list_metadata()
            .into_iter()
            .find(|s| s.name == service)
            .unwrap()
            .functions
            .into_iter()
            .find(|f| f.name == function)
            .unwrap()
            .properties
    }

    #[test]
    fn test_dispatch_success_echoes_envelope() {
        let registry = ServiceRegistry::new();
        registry.register(echo_service()).unwrap();

        let reply = registry.dispatch(&Envelope::new("echo", "upper", "hi"));
        assert_eq!(reply.service, "echo");
        assert_eq!(reply.function, "upper");
        assert_eq!(reply.data, "HI");
    }

    #[test]
    fn test_unknown_service_is_error_reply() {
        let registry = ServiceRegistry::new();
        registry.register(echo_service()).unwrap();

        let reply = registry.dispatch(&Envelope::new("ghost", "upper", ""));
        let message: ReturnMessage = serde_json::from_str(&reply.data).unwrap();
        assert!(!message.is_success());
        assert_eq!(message.result, "ghost was not found");

        let properties = function_properties(&registry, "echo", "upper");
        assert_eq!(properties[stats::COUNT], Value::from(0u64));
    }

    #[test]
    fn test_unknown_function_is_error_reply() {
        let registry = ServiceRegistry::new();
        registry.register(echo_service()).unwrap();

        let reply = registry.dispatch(&Envelope::new("echo", "missing", ""));
        let message: ReturnMessage = serde_json::from_str(&reply.data).unwrap();
        assert_eq!(message.result, "echo.missing was not found");

        let properties = function_properties(&registry, "echo", "upper");
        assert_eq!(properties[stats::COUNT], Value::from(0u64));
    }

    #[test]
    fn test_counters_track_successes_and_failures() {
        let registry = ServiceRegistry::new();
        registry
            .register(
                echo_service().function(FunctionDef::new("fail", |_: &str| {
                    Err(anyhow::anyhow!("boom"))
                })),
            )
            .unwrap();

        registry.dispatch(&Envelope::new("echo", "upper", "a"));
        registry.dispatch(&Envelope::new("echo", "upper", "b"));
        let properties = function_properties(&registry, "echo", "upper");
        assert_eq!(properties[stats::COUNT], Value::from(2u64));
        assert_eq!(properties[stats::RESULT], Value::from("OK"));
        assert!(properties[stats::TOTAL].as_f64().unwrap() >= 0.0);

        let reply = registry.dispatch(&Envelope::new("echo", "fail", ""));
        let message: ReturnMessage = serde_json::from_str(&reply.data).unwrap();
        assert!(!message.is_success());
        assert_eq!(message.result, "echo.fail failed: boom");

        let properties = function_properties(&registry, "echo", "fail");
        assert_eq!(properties[stats::COUNT], Value::from(1u64));
        assert_eq!(properties[stats::RESULT], Value::from("echo.fail failed: boom"));
    }

    #[test]
    fn test_panicking_handler_is_contained() {
        let registry = ServiceRegistry::new();
        registry
            .register(
                ServiceDef::new("bad")
                    .function(FunctionDef::new("crash", |_: &str| panic!("kaboom"))),
            )
            .unwrap();

        let reply = registry.dispatch(&Envelope::new("bad", "crash", ""));
        let message: ReturnMessage = serde_json::from_str(&reply.data).unwrap();
        assert!(!message.is_success());
        assert_eq!(message.result, "bad.crash failed: kaboom");

        let properties = function_properties(&registry, "bad", "crash");
        assert_eq!(properties[stats::COUNT], Value::from(1u64));
    }

    #[test]
    fn test_same_name_registrations_merge() {
        let registry = ServiceRegistry::new();
        registry.register(echo_service()).unwrap();
        registry
            .register(ServiceDef::new("echo").function(FunctionDef::new(
                "reverse",
                |input: &str| Ok(input.chars().rev().collect()),
            )))
            .unwrap();

        assert_eq!(registry.len(), 1);
        let reply = registry.dispatch(&Envelope::new("echo", "reverse", "abc"));
        assert_eq!(reply.data, "cba");

        let services = registry.list_metadata();
        assert_eq!(services[0].functions.len(), 2);
    }

    #[test]
    fn test_duplicate_function_rejected_without_partial_merge() {
        let registry = ServiceRegistry::new();
        registry.register(echo_service()).unwrap();

        let duplicate = ServiceDef::new("echo")
            .function(FunctionDef::new("lower", |input: &str| {
                Ok(input.to_lowercase())
            }))
            .function(FunctionDef::new("upper", |input: &str| Ok(input.to_string())));
        let err = registry.register(duplicate).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("echo.upper is already registered"));

        // The accepted definition is unchanged and nothing from the
        // rejected one leaked in.
        let services = registry.list_metadata();
        assert_eq!(services[0].functions.len(), 1);
        let reply = registry.dispatch(&Envelope::new("echo", "upper", "hi"));
        assert_eq!(reply.data, "HI");
    }

    #[test]
    fn test_rejected_new_service_leaves_no_ghost_entry() {
        let registry = ServiceRegistry::new();

        // Internal duplicate inside a definition for a service that does
        // not exist yet.
        let def = ServiceDef::new("ghost")
            .function(FunctionDef::new("f", |_: &str| Ok(String::new())))
            .function(FunctionDef::new("f", |_: &str| Ok(String::new())));
        let err = registry.register(def).unwrap_err();
        assert!(err.to_string().contains("ghost.f is already registered"));

        // No empty service entry stays behind to pollute discovery or
        // shadow the service-not-found reply.
        assert!(registry.is_empty());
        assert!(!registry.contains("ghost"));
        assert!(registry.list_metadata().is_empty());
        let reply = registry.dispatch(&Envelope::new("ghost", "f", ""));
        let message: ReturnMessage = serde_json::from_str(&reply.data).unwrap();
        assert_eq!(message.result, "ghost was not found");
    }

    #[test]
    fn test_unnamed_service_rejected() {
        let registry = ServiceRegistry::new();
        let err = registry.register(ServiceDef::new("")).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unregister_drops_counters() {
        let registry = ServiceRegistry::new();
        registry.register(echo_service()).unwrap();
        registry.dispatch(&Envelope::new("echo", "upper", "x"));

        assert!(registry.unregister("echo"));
        assert!(!registry.unregister("echo"));

        let reply = registry.dispatch(&Envelope::new("echo", "upper", "x"));
        let message: ReturnMessage = serde_json::from_str(&reply.data).unwrap();
        assert_eq!(message.result, "echo was not found");

        // A fresh registration starts from zero.
        registry.register(echo_service()).unwrap();
        let properties = function_properties(&registry, "echo", "upper");
        assert_eq!(properties[stats::COUNT], Value::from(0u64));
    }

    #[test]
    fn test_unregister_function_keeps_siblings() {
        let registry = ServiceRegistry::new();
        registry.register(echo_service()).unwrap();
        registry
            .register(ServiceDef::new("echo").function(FunctionDef::new(
                "reverse",
                |input: &str| Ok(input.chars().rev().collect()),
            )))
            .unwrap();

        assert!(!registry.unregister_function("ghost", "f"));
        assert!(registry.unregister_function("echo", "reverse"));
        assert!(!registry.unregister_function("echo", "reverse"));

        // The sibling function is untouched.
        assert!(registry.contains("echo"));
        let reply = registry.dispatch(&Envelope::new("echo", "upper", "hi"));
        assert_eq!(reply.data, "HI");

        // The last function takes the service entry with it.
        assert!(registry.unregister_function("echo", "upper"));
        assert!(!registry.contains("echo"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_handler_may_reenter_registry() {
        let registry = Arc::new(ServiceRegistry::new());
        let weak = Arc::downgrade(&registry);
        registry
            .register(
                ServiceDef::new("admin").function(FunctionDef::new("retire", move |_: &str| {
                    if let Some(registry) = weak.upgrade() {
                        registry.unregister("admin");
                    }
                    Ok("retired".to_string())
                })),
            )
            .unwrap();

        let reply = registry.dispatch(&Envelope::new("admin", "retire", ""));
        assert_eq!(reply.data, "retired");
        assert!(!registry.contains("admin"));
    }

    #[test]
    fn test_list_metadata_is_sorted() {
        let registry = ServiceRegistry::new();
        registry
            .register(
                ServiceDef::new("zeta")
                    .function(FunctionDef::new("b", |_: &str| Ok(String::new())))
                    .function(FunctionDef::new("a", |_: &str| Ok(String::new()))),
            )
            .unwrap();
        registry.register(echo_service()).unwrap();

        let services = registry.list_metadata();
        assert_eq!(services[0].name, "echo");
        assert_eq!(services[1].name, "zeta");
        assert_eq!(services[1].functions[0].name, "a");
        assert_eq!(services[1].functions[1].name, "b");
    }

    #[test]
    fn test_input_metadata_survives_registration() {
        let registry = ServiceRegistry::new();
        registry
            .register(
                ServiceDef::new("calc").function(
                    FunctionDef::new("add", |_: &str| Ok(String::new()))
                        .input(InputMetaData::new("lhs", "Number"))
                        .input(InputMetaData::new("rhs", "Number")),
                ),
            )
            .unwrap();

        let services = registry.list_metadata();
        let inputs = &services[0].functions[0].inputs;
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[0].name, "lhs");
        assert_eq!(inputs[0].type_name, "Number");
    }
}
