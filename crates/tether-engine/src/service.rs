// Service surface
//
// The seams to the external service framework (resolver, lister) and the
// reverse direction of the bridge: a script exposed as a strongly
// described service. The script's input/output shapes are derived lazily
// from its declarations and cached for the lifetime of the registration.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use tracing::{debug, warn};

use tether_error::{EngineError, EngineResult};
use tether_types::{shared_map, CollectionBridge, FieldDescriptor, RecordShape, StructuredRecord};

use crate::assembler::ResultAssembler;
use crate::context::{CombinedContext, SimpleScriptContext};
use crate::dispatcher::AmbientState;

/// A resolved, invocable service.
pub trait Service: Send + Sync {
    /// Dotted identifier of the service.
    fn id(&self) -> String;

    /// The structured input/output interface. Derivation may fail with
    /// `ShapeDerivation`.
    fn interface(&self) -> EngineResult<ServiceInterface>;

    /// Run the service against a conforming input record.
    fn execute(
        &self,
        context: &Arc<CombinedContext>,
        input: StructuredRecord,
        ambient: &AmbientState,
    ) -> EngineResult<StructuredRecord>;
}

/// Structured input/output description of a service.
#[derive(Debug, Clone)]
pub struct ServiceInterface {
    pub input: Arc<RecordShape>,
    pub output: Arc<RecordShape>,
}

/// Lists every invocable service (external framework seam).
pub trait ServiceLister: Send + Sync {
    fn services(&self) -> Vec<Arc<dyn Service>>;
}

/// Resolves a dotted identifier to a service (external framework seam).
pub trait ServiceResolver: Send + Sync {
    fn resolve(&self, id: &str) -> Option<Arc<dyn Service>>;
}

/// In-memory service registry implementing both seams.
#[derive(Default)]
pub struct InMemoryServices {
    services: RwLock<HashMap<String, Arc<dyn Service>>>,
}

impl InMemoryServices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, service: Arc<dyn Service>) {
        if let Ok(mut services) = self.services.write() {
            services.insert(service.id(), service);
        }
    }
}

impl ServiceLister for InMemoryServices {
    fn services(&self) -> Vec<Arc<dyn Service>> {
        self.services
            .read()
            .map(|services| {
                let mut list: Vec<_> = services.values().cloned().collect();
                list.sort_by_key(|service| service.id());
                list
            })
            .unwrap_or_default()
    }
}

impl ServiceResolver for InMemoryServices {
    fn resolve(&self, id: &str) -> Option<Arc<dyn Service>> {
        self.services
            .read()
            .ok()
            .and_then(|services| services.get(id).cloned())
    }
}

/// Observer of service run lifecycles.
pub trait RunTracker: Send + Sync {
    fn started(&self, _id: &str) {}

    fn finished(&self, _id: &str) {}

    fn failed(&self, _id: &str, _error: &EngineError) {}
}

/// Default tracker emitting structured log events.
#[derive(Debug, Default)]
pub struct LogTracker;

impl RunTracker for LogTracker {
    fn started(&self, id: &str) {
        debug!(service = %id, "service run started");
    }

    fn finished(&self, id: &str) {
        debug!(service = %id, "service run finished");
    }

    fn failed(&self, id: &str, error: &EngineError) {
        warn!(service = %id, %error, "service run failed");
    }
}

/// The external script evaluator seam.
pub trait ScriptSource: Send + Sync {
    /// Fully qualified (dotted) name of the script.
    fn full_name(&self) -> String;

    /// Declared input fields, in declaration order.
    fn declared_inputs(&self) -> EngineResult<Vec<FieldDescriptor>>;

    /// Declared output fields, in declaration order.
    fn declared_outputs(&self) -> EngineResult<Vec<FieldDescriptor>>;

    /// Evaluate the script against the combined context's pipeline.
    fn run(&self, context: &Arc<CombinedContext>) -> EngineResult<()>;
}

/// A script exposed as a service.
pub struct ScriptService {
    source: Arc<dyn ScriptSource>,
    tracker: Arc<dyn RunTracker>,
    bridge: Arc<CollectionBridge>,
    input: Mutex<Option<Arc<RecordShape>>>,
    output: Mutex<Option<Arc<RecordShape>>>,
}

impl ScriptService {
    pub fn new(source: Arc<dyn ScriptSource>) -> Self {
        ScriptService {
            source,
            tracker: Arc::new(LogTracker),
            bridge: Arc::new(CollectionBridge::new()),
            input: Mutex::new(None),
            output: Mutex::new(None),
        }
    }

    pub fn with_tracker(mut self, tracker: Arc<dyn RunTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn with_bridge(mut self, bridge: Arc<CollectionBridge>) -> Self {
        self.bridge = bridge;
        self
    }

    // Shape derivation is cached: the first caller computes while
    // holding the lock, concurrent callers block and share the result.

    fn input_shape(&self) -> EngineResult<Arc<RecordShape>> {
        Self::derive_shape(&self.input, "input", || self.source.declared_inputs())
    }

    fn output_shape(&self) -> EngineResult<Arc<RecordShape>> {
        Self::derive_shape(&self.output, "output", || self.source.declared_outputs())
    }

    fn derive_shape(
        slot: &Mutex<Option<Arc<RecordShape>>>,
        name: &str,
        declared: impl FnOnce() -> EngineResult<Vec<FieldDescriptor>>,
    ) -> EngineResult<Arc<RecordShape>> {
        let mut cached = slot
            .lock()
            .map_err(|_| EngineError::SyncError("Failed to lock shape cache".to_string()))?;
        if let Some(shape) = cached.as_ref() {
            return Ok(shape.clone());
        }
        let fields =
            declared().map_err(|error| EngineError::ShapeDerivation(error.to_string()))?;
        let mut shape = RecordShape::new(name);
        for field in fields {
            shape = shape.with_field(field);
        }
        let shape = Arc::new(shape);
        *cached = Some(shape.clone());
        Ok(shape)
    }
}

impl Service for ScriptService {
    fn id(&self) -> String {
        self.source.full_name()
    }

    fn interface(&self) -> EngineResult<ServiceInterface> {
        Ok(ServiceInterface {
            input: self.input_shape()?,
            output: self.output_shape()?,
        })
    }

    fn execute(
        &self,
        context: &Arc<CombinedContext>,
        input: StructuredRecord,
        ambient: &AmbientState,
    ) -> EngineResult<StructuredRecord> {
        let id = self.id();
        let output_shape = self.output_shape()?;

        // seed a fresh pipeline from the input record
        let pipeline = shared_map();
        {
            let mut entries = pipeline
                .write()
                .map_err(|_| EngineError::SyncError("Failed to lock pipeline".to_string()))?;
            for (name, value) in input.field_values()? {
                entries.insert(name, value);
            }
        }

        // the script runs in its own script context, sharing the
        // caller's service-side delegate
        let script = Arc::new(SimpleScriptContext::over_pipeline(pipeline.clone()));
        let combined = Arc::new(CombinedContext::new(script, context.service_delegate()));

        self.tracker.started(&id);
        let run_result = {
            let _root = ambient.register_root();
            self.source.run(&combined)
        };
        if let Err(error) = run_result {
            let failure = EngineError::ScriptFailure(format!("{}: {}", id, error));
            self.tracker.failed(&id, &failure);
            return Err(failure);
        }

        let assembler = ResultAssembler::new(self.bridge.clone());
        assembler.materialize_outputs(&pipeline, &output_shape)?;
        let output = assembler.assemble(&pipeline, &output_shape)?;
        self.tracker.finished(&id);
        Ok(output)
    }
}
