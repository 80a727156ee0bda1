// Method catalog
//
// Lazily builds the list of invocable service descriptors by
// introspecting each registered service's interface. Derivation failures
// are logged per service and that service is skipped; partial catalogs
// are expected. The list is computed once and memoized: the first caller
// pays the cost while holding the lock, concurrent callers block and
// share the result.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::warn;

use tether_error::{EngineError, EngineResult};
use tether_types::{CollectionBridge, RecordShape, Value};

use crate::binder::ArgumentBinder;
use crate::context::{ContextSource, ScriptContext, ServiceContextProvider};
use crate::dispatcher::{AmbientState, Dispatcher, ServiceRunner};
use crate::service::{Service, ServiceLister, ServiceResolver};

/// Description of a single invocable parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterDescription {
    pub name: String,
    /// Identifier of the declared type, if it has one
    pub type_id: Option<String>,
    pub is_list: bool,
    /// True only for the final input parameter when it is list-typed
    /// and the catalog allows varargs
    pub is_varargs: bool,
}

/// Description of an invocable service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDescriptor {
    pub namespace: Option<String>,
    pub name: String,
    pub inputs: Vec<ParameterDescription>,
    pub outputs: Vec<ParameterDescription>,
}

/// Splits a dotted identifier at the last separator.
fn split_identifier(id: &str) -> (Option<String>, String) {
    match id.rfind('.') {
        Some(index) => (
            Some(id[..index].to_string()),
            id[index + 1..].to_string(),
        ),
        None => (None, id.to_string()),
    }
}

/// The method-provider surface exposed to the script evaluator.
pub struct ServiceCatalog {
    resolver: Arc<dyn ServiceResolver>,
    lister: Option<Arc<dyn ServiceLister>>,
    provider: Arc<dyn ServiceContextProvider>,
    runner: Option<Arc<dyn ServiceRunner>>,
    bridge: Arc<CollectionBridge>,
    allow_varargs: bool,
    methods: Mutex<Option<Arc<Vec<MethodDescriptor>>>>,
}

impl ServiceCatalog {
    pub fn new(
        resolver: Arc<dyn ServiceResolver>,
        lister: Option<Arc<dyn ServiceLister>>,
        provider: Arc<dyn ServiceContextProvider>,
    ) -> Self {
        ServiceCatalog {
            resolver,
            lister,
            provider,
            runner: None,
            bridge: Arc::new(CollectionBridge::new()),
            allow_varargs: true,
            methods: Mutex::new(None),
        }
    }

    /// Route dispatches through an async runner instead of running
    /// services in-process.
    pub fn with_runner(mut self, runner: Arc<dyn ServiceRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn with_varargs(mut self, allow_varargs: bool) -> Self {
        self.allow_varargs = allow_varargs;
        self
    }

    pub fn with_bridge(mut self, bridge: Arc<CollectionBridge>) -> Self {
        self.bridge = bridge;
        self
    }

    /// List every invocable method, memoized.
    pub fn list_methods(&self) -> EngineResult<Arc<Vec<MethodDescriptor>>> {
        let mut cached = self
            .methods
            .lock()
            .map_err(|_| EngineError::SyncError("Failed to lock method cache".to_string()))?;
        if let Some(methods) = cached.as_ref() {
            return Ok(methods.clone());
        }
        let methods = Arc::new(self.build_methods());
        *cached = Some(methods.clone());
        Ok(methods)
    }

    fn build_methods(&self) -> Vec<MethodDescriptor> {
        let mut methods = Vec::new();
        let Some(lister) = &self.lister else {
            return methods;
        };
        for service in lister.services() {
            match self.describe(service.as_ref()) {
                Ok(descriptor) => methods.push(descriptor),
                Err(error) => {
                    warn!(service = %service.id(), %error, "could not load service");
                }
            }
        }
        methods
    }

    /// Derive the descriptor for one service.
    pub fn describe(&self, service: &dyn Service) -> EngineResult<MethodDescriptor> {
        let interface = service.interface()?;
        let (namespace, name) = split_identifier(&service.id());
        Ok(MethodDescriptor {
            namespace,
            name,
            inputs: Self::to_parameters(&interface.input, self.allow_varargs),
            outputs: Self::to_parameters(&interface.output, false),
        })
    }

    /// Map a record shape to parameter descriptions, tagging the final
    /// field as varargs iff it is list-typed and varargs are allowed.
    pub fn to_parameters(shape: &Arc<RecordShape>, allow_varargs: bool) -> Vec<ParameterDescription> {
        let fields = shape.all_fields();
        let last = fields.len().saturating_sub(1);
        fields
            .iter()
            .enumerate()
            .map(|(index, field)| ParameterDescription {
                name: field.name.clone(),
                type_id: field.field_type.type_id(),
                is_list: field.is_list,
                is_varargs: allow_varargs && field.is_list && index == last,
            })
            .collect()
    }

    /// Resolve a single method by exact identifier. `None` signals "not
    /// a method this provider can satisfy", chaining to the next
    /// provider.
    pub fn resolve(&self, name: &str) -> Option<ServiceCall> {
        let service = self.resolver.resolve(name)?;
        Some(ServiceCall {
            service,
            provider: self.provider.clone(),
            runner: self.runner.clone(),
            bridge: self.bridge.clone(),
            allow_varargs: self.allow_varargs,
        })
    }
}

/// A resolved service bound to the catalog's binding and dispatch
/// configuration.
pub struct ServiceCall {
    service: Arc<dyn Service>,
    provider: Arc<dyn ServiceContextProvider>,
    runner: Option<Arc<dyn ServiceRunner>>,
    bridge: Arc<CollectionBridge>,
    allow_varargs: bool,
}

impl ServiceCall {
    pub fn service(&self) -> &Arc<dyn Service> {
        &self.service
    }

    /// Run the full marshalling flow: combine contexts, bind arguments,
    /// dispatch, and hand the output record back to the evaluator.
    ///
    /// `source` is the caller's decision on where the service-side
    /// context comes from; `None` falls back to the catalog's provider.
    pub fn invoke(
        &self,
        script: Arc<dyn ScriptContext>,
        source: Option<ContextSource>,
        args: &[Value],
        ambient: &AmbientState,
    ) -> EngineResult<Value> {
        let source =
            source.unwrap_or_else(|| ContextSource::NeedsProvider(self.provider.clone()));
        let principal = script.principal();
        let combined = source.combine(script, principal.as_ref());

        let interface = self.service.interface()?;
        let binder = ArgumentBinder::new(self.bridge.clone()).with_varargs(self.allow_varargs);
        let input = binder.bind(args, &interface.input)?;

        let dispatcher = match &self.runner {
            Some(runner) => Dispatcher::with_runner(runner.clone()),
            None => Dispatcher::new(),
        };
        let output = dispatcher.dispatch(&self.service, &combined, input, ambient)?;
        Ok(Value::Record(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{BasicContextProvider, CombinedContext};
    use crate::service::{InMemoryServices, ServiceInterface};
    use tether_types::{FieldDescriptor, FieldType, ScalarType, StructuredRecord};

    struct StubService {
        id: String,
        broken: bool,
    }

    impl StubService {
        fn new(id: &str) -> Arc<dyn Service> {
            Arc::new(StubService {
                id: id.to_string(),
                broken: false,
            })
        }

        fn broken(id: &str) -> Arc<dyn Service> {
            Arc::new(StubService {
                id: id.to_string(),
                broken: true,
            })
        }
    }

    impl Service for StubService {
        fn id(&self) -> String {
            self.id.clone()
        }

        fn interface(&self) -> EngineResult<ServiceInterface> {
            if self.broken {
                return Err(EngineError::ShapeDerivation(format!(
                    "{}: unparseable declarations",
                    self.id
                )));
            }
            let input = Arc::new(
                RecordShape::new("input")
                    .with_field(FieldDescriptor::new(
                        "message",
                        FieldType::Scalar(ScalarType::String),
                    ))
                    .with_field(
                        FieldDescriptor::new("extras", FieldType::Scalar(ScalarType::String))
                            .as_list(),
                    ),
            );
            let output = Arc::new(RecordShape::new("output").with_field(FieldDescriptor::new(
                "echo",
                FieldType::Scalar(ScalarType::String),
            )));
            Ok(ServiceInterface { input, output })
        }

        fn execute(
            &self,
            _context: &Arc<CombinedContext>,
            input: StructuredRecord,
            _ambient: &AmbientState,
        ) -> EngineResult<StructuredRecord> {
            let output = StructuredRecord::new(self.interface()?.output);
            output.set("echo", input.get("message")?)?;
            Ok(output)
        }
    }

    fn catalog_over(services: Arc<InMemoryServices>) -> ServiceCatalog {
        ServiceCatalog::new(
            services.clone(),
            Some(services),
            Arc::new(BasicContextProvider),
        )
    }

    #[test]
    fn test_namespace_split_on_last_separator() {
        assert_eq!(
            split_identifier("shop.orders.place"),
            (Some("shop.orders".to_string()), "place".to_string())
        );
        assert_eq!(split_identifier("ping"), (None, "ping".to_string()));
    }

    #[test]
    fn test_partial_catalog_with_one_malformed_service() {
        let services = Arc::new(InMemoryServices::new());
        for index in 0..9 {
            services.register(StubService::new(&format!("demo.service{}", index)));
        }
        services.register(StubService::broken("demo.broken"));

        let catalog = catalog_over(services);
        let methods = catalog.list_methods().unwrap();
        assert_eq!(methods.len(), 9);
        assert!(methods.iter().all(|method| method.name != "broken"));
    }

    #[test]
    fn test_catalog_is_memoized() {
        let services = Arc::new(InMemoryServices::new());
        services.register(StubService::new("demo.echo"));

        let catalog = catalog_over(services);
        let first = catalog.list_methods().unwrap();
        let second = catalog.list_methods().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_trailing_list_parameter_is_varargs_tagged() {
        let services = Arc::new(InMemoryServices::new());
        services.register(StubService::new("demo.echo"));

        let catalog = catalog_over(services);
        let methods = catalog.list_methods().unwrap();
        let method = &methods[0];

        assert_eq!(method.namespace.as_deref(), Some("demo"));
        assert_eq!(method.name, "echo");
        assert!(!method.inputs[0].is_varargs);
        assert!(method.inputs[1].is_varargs);
        // outputs are never varargs-tagged
        assert!(method.outputs.iter().all(|parameter| !parameter.is_varargs));
    }

    #[test]
    fn test_varargs_disabled_catalog_tags_nothing() {
        let services = Arc::new(InMemoryServices::new());
        services.register(StubService::new("demo.echo"));

        let catalog = catalog_over(services).with_varargs(false);
        let methods = catalog.list_methods().unwrap();
        assert!(methods[0].inputs.iter().all(|parameter| !parameter.is_varargs));
    }

    #[test]
    fn test_resolve_unknown_returns_none() {
        let services = Arc::new(InMemoryServices::new());
        let catalog = catalog_over(services);
        assert!(catalog.resolve("no.such.service").is_none());
    }
}
