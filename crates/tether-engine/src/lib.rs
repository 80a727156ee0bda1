// Tether invocation engine
//
// The machinery that lets a dynamically-typed script call strongly
// described services and vice versa: the method catalog exposed to the
// script evaluator, positional argument binding with varargs flattening,
// context combination, dispatch (in-process or through a pluggable
// runner) and assembly of script pipelines back into declared output
// records.

pub mod assembler;
pub mod binder;
pub mod catalog;
pub mod context;
pub mod dispatcher;
pub mod service;

pub use assembler::ResultAssembler;
pub use binder::ArgumentBinder;
pub use catalog::{MethodDescriptor, ParameterDescription, ServiceCall, ServiceCatalog};
pub use context::{
    BasicContextProvider, BasicServiceContext, CombinedContext, ContextSource, LabelEvaluator,
    MetricSink, Principal, ScriptContext, ServiceContextProvider, ServiceExecutionContext,
    SimpleScriptContext,
};
pub use dispatcher::{
    AmbientState, CallRootGuard, DispatchRecord, DispatchState, Dispatcher, PendingResult,
    ServiceHandle, ServiceRunner, ThreadRunner,
};
pub use service::{
    InMemoryServices, LogTracker, RunTracker, ScriptService, ScriptSource, Service,
    ServiceInterface, ServiceLister, ServiceResolver,
};
