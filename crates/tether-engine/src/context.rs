// Execution context bridge
//
// A service call evaluated inside a script runs against two contexts at
// once: the script-side context (pipeline, debug state, breakpoints) and
// the service-side context (security, transaction, metrics). This module
// merges the two into one combined view with exactly one delegate per
// side, and encodes the construction precedence as an explicit tagged
// union decided once at the call boundary.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use tether_error::EngineResult;
use tether_types::{shared_map, SharedMap};

/// The caller's identity, optionally carrying an authentication token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub name: String,
    pub token: Option<String>,
}

impl Principal {
    pub fn new(name: impl Into<String>) -> Self {
        Principal {
            name: name.into(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// Evaluates conditional execution labels against the active environment.
pub trait LabelEvaluator: Send + Sync {
    fn should_execute(&self, label: &str, environment: &str) -> bool;
}

/// Script-side execution context capability set.
pub trait ScriptContext: Send + Sync {
    /// The live variable pipeline. Shared storage, not a copy.
    fn pipeline(&self) -> SharedMap;

    fn is_debug(&self) -> bool;

    fn is_trace(&self) -> bool;

    fn set_trace(&self, trace: bool);

    fn breakpoints(&self) -> Vec<String>;

    fn add_breakpoint(&self, id: &str);

    fn remove_breakpoint(&self, id: &str);

    fn clear_breakpoints(&self);

    /// Label of the executor currently being evaluated, if any.
    fn current_executor(&self) -> Option<String>;

    fn set_current_executor(&self, executor: Option<String>);

    fn label_evaluator(&self) -> Option<Arc<dyn LabelEvaluator>> {
        None
    }

    /// Load named auxiliary content (attachments, resources) by name.
    fn content(&self, _name: &str) -> EngineResult<Option<Vec<u8>>> {
        Ok(None)
    }

    fn principal(&self) -> Option<Principal> {
        None
    }
}

/// Sink for a single named metric.
pub trait MetricSink: Send + Sync {
    fn increment(&self, name: &str, amount: i64);

    fn duration(&self, name: &str, millis: u64);
}

/// Service-side execution context capability set.
pub trait ServiceExecutionContext: Send + Sync {
    /// Authenticated principal of the security context, if any.
    fn security_principal(&self) -> Option<Principal>;

    /// Identifier of the service context this call runs in.
    fn service_context(&self) -> String;

    /// Active transaction identifier, if a transaction is open.
    fn transaction_id(&self) -> Option<String>;

    fn metric_instance(&self, _id: &str) -> Option<Arc<dyn MetricSink>> {
        None
    }

    fn enabled_features(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Produces fresh service-side contexts, keyed by an optional principal.
/// `None` yields an anonymous context.
pub trait ServiceContextProvider: Send + Sync {
    fn new_context(&self, principal: Option<&Principal>) -> Arc<dyn ServiceExecutionContext>;
}

/// Union of a script context and a service context. Once built, the two
/// delegates never change; every accessor reads through exactly one of
/// them.
pub struct CombinedContext {
    script: Arc<dyn ScriptContext>,
    service: Arc<dyn ServiceExecutionContext>,
}

impl CombinedContext {
    pub fn new(script: Arc<dyn ScriptContext>, service: Arc<dyn ServiceExecutionContext>) -> Self {
        CombinedContext { script, service }
    }

    pub fn script_delegate(&self) -> Arc<dyn ScriptContext> {
        self.script.clone()
    }

    pub fn service_delegate(&self) -> Arc<dyn ServiceExecutionContext> {
        self.service.clone()
    }

    // script-side accessors

    pub fn pipeline(&self) -> SharedMap {
        self.script.pipeline()
    }

    pub fn is_debug(&self) -> bool {
        self.script.is_debug()
    }

    pub fn is_trace(&self) -> bool {
        self.script.is_trace()
    }

    pub fn set_trace(&self, trace: bool) {
        self.script.set_trace(trace)
    }

    pub fn breakpoints(&self) -> Vec<String> {
        self.script.breakpoints()
    }

    pub fn add_breakpoint(&self, id: &str) {
        self.script.add_breakpoint(id)
    }

    pub fn remove_breakpoint(&self, id: &str) {
        self.script.remove_breakpoint(id)
    }

    pub fn current_executor(&self) -> Option<String> {
        self.script.current_executor()
    }

    pub fn set_current_executor(&self, executor: Option<String>) {
        self.script.set_current_executor(executor)
    }

    pub fn label_evaluator(&self) -> Option<Arc<dyn LabelEvaluator>> {
        self.script.label_evaluator()
    }

    pub fn content(&self, name: &str) -> EngineResult<Option<Vec<u8>>> {
        self.script.content(name)
    }

    // service-side accessors

    pub fn principal(&self) -> Option<Principal> {
        self.service.security_principal()
    }

    pub fn service_context(&self) -> String {
        self.service.service_context()
    }

    pub fn transaction_id(&self) -> Option<String> {
        self.service.transaction_id()
    }

    pub fn metric_instance(&self, id: &str) -> Option<Arc<dyn MetricSink>> {
        self.service.metric_instance(id)
    }

    pub fn enabled_features(&self) -> Vec<String> {
        self.service.enabled_features()
    }
}

impl fmt::Debug for CombinedContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CombinedContext")
            .field("service_context", &self.service.service_context())
            .field("debug", &self.script.is_debug())
            .finish()
    }
}

/// Where the service-side half of a combined context comes from. The
/// caller decides this once at the call boundary instead of inspecting
/// context types at runtime.
pub enum ContextSource {
    /// An explicit service context was supplied alongside the call.
    Explicit(Arc<dyn ServiceExecutionContext>),
    /// The script context is already a combined context; reuse it.
    AlreadyCombined(Arc<CombinedContext>),
    /// The script context object itself satisfies the service-side
    /// capability set; both halves are the same object.
    AlreadyServiceShaped(Arc<dyn ServiceExecutionContext>),
    /// Construct a fresh service context from a provider, keyed by the
    /// caller's principal.
    NeedsProvider(Arc<dyn ServiceContextProvider>),
}

impl ContextSource {
    /// Build the combined context for a call.
    pub fn combine(
        self,
        script: Arc<dyn ScriptContext>,
        principal: Option<&Principal>,
    ) -> Arc<CombinedContext> {
        match self {
            ContextSource::Explicit(service) => Arc::new(CombinedContext::new(script, service)),
            ContextSource::AlreadyCombined(combined) => combined,
            ContextSource::AlreadyServiceShaped(service) => {
                Arc::new(CombinedContext::new(script, service))
            }
            ContextSource::NeedsProvider(provider) => {
                let service = provider.new_context(principal);
                Arc::new(CombinedContext::new(script, service))
            }
        }
    }
}

/// Straightforward script context over a shared pipeline map.
pub struct SimpleScriptContext {
    pipeline: SharedMap,
    debug: bool,
    trace: AtomicBool,
    breakpoints: RwLock<HashSet<String>>,
    current: RwLock<Option<String>>,
    labels: Option<Arc<dyn LabelEvaluator>>,
    principal: Option<Principal>,
}

impl SimpleScriptContext {
    pub fn new() -> Self {
        Self::over_pipeline(shared_map())
    }

    /// Build a context over an existing pipeline map (shared, not copied).
    pub fn over_pipeline(pipeline: SharedMap) -> Self {
        SimpleScriptContext {
            pipeline,
            debug: false,
            trace: AtomicBool::new(false),
            breakpoints: RwLock::new(HashSet::new()),
            current: RwLock::new(None),
            labels: None,
            principal: None,
        }
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    pub fn with_label_evaluator(mut self, labels: Arc<dyn LabelEvaluator>) -> Self {
        self.labels = Some(labels);
        self
    }
}

impl Default for SimpleScriptContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptContext for SimpleScriptContext {
    fn pipeline(&self) -> SharedMap {
        self.pipeline.clone()
    }

    fn is_debug(&self) -> bool {
        self.debug
    }

    fn is_trace(&self) -> bool {
        self.trace.load(Ordering::Relaxed)
    }

    fn set_trace(&self, trace: bool) {
        self.trace.store(trace, Ordering::Relaxed)
    }

    fn breakpoints(&self) -> Vec<String> {
        self.breakpoints
            .read()
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn add_breakpoint(&self, id: &str) {
        if let Ok(mut set) = self.breakpoints.write() {
            set.insert(id.to_string());
        }
    }

    fn remove_breakpoint(&self, id: &str) {
        if let Ok(mut set) = self.breakpoints.write() {
            set.remove(id);
        }
    }

    fn clear_breakpoints(&self) {
        if let Ok(mut set) = self.breakpoints.write() {
            set.clear();
        }
    }

    fn current_executor(&self) -> Option<String> {
        self.current.read().ok().and_then(|current| current.clone())
    }

    fn set_current_executor(&self, executor: Option<String>) {
        if let Ok(mut current) = self.current.write() {
            *current = executor;
        }
    }

    fn label_evaluator(&self) -> Option<Arc<dyn LabelEvaluator>> {
        self.labels.clone()
    }

    fn principal(&self) -> Option<Principal> {
        self.principal.clone()
    }
}

/// Minimal service-side context carrying identity and transaction state.
#[derive(Debug, Clone)]
pub struct BasicServiceContext {
    principal: Option<Principal>,
    name: String,
    transaction: Option<String>,
}

impl BasicServiceContext {
    pub fn anonymous() -> Self {
        BasicServiceContext {
            principal: None,
            name: "anonymous".to_string(),
            transaction: None,
        }
    }

    pub fn for_principal(principal: Principal) -> Self {
        let name = principal.name.clone();
        BasicServiceContext {
            principal: Some(principal),
            name,
            transaction: None,
        }
    }

    pub fn with_transaction(mut self, transaction: impl Into<String>) -> Self {
        self.transaction = Some(transaction.into());
        self
    }
}

impl ServiceExecutionContext for BasicServiceContext {
    fn security_principal(&self) -> Option<Principal> {
        self.principal.clone()
    }

    fn service_context(&self) -> String {
        self.name.clone()
    }

    fn transaction_id(&self) -> Option<String> {
        self.transaction.clone()
    }
}

/// Default provider: a fresh `BasicServiceContext` per call.
#[derive(Debug, Default)]
pub struct BasicContextProvider;

impl ServiceContextProvider for BasicContextProvider {
    fn new_context(&self, principal: Option<&Principal>) -> Arc<dyn ServiceExecutionContext> {
        match principal {
            Some(principal) => Arc::new(BasicServiceContext::for_principal(principal.clone())),
            None => Arc::new(BasicServiceContext::anonymous()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined_context_delegates_per_side() {
        let script = Arc::new(SimpleScriptContext::new().with_debug(true));
        let service = Arc::new(
            BasicServiceContext::for_principal(Principal::new("alice"))
                .with_transaction("tx-1"),
        );
        let combined = CombinedContext::new(script.clone(), service);

        assert!(combined.is_debug());
        assert_eq!(combined.principal().unwrap().name, "alice");
        assert_eq!(combined.transaction_id().as_deref(), Some("tx-1"));

        combined.add_breakpoint("step-3");
        assert_eq!(script.breakpoints(), vec!["step-3".to_string()]);
    }

    #[test]
    fn test_already_combined_is_idempotent() {
        let script: Arc<dyn ScriptContext> = Arc::new(SimpleScriptContext::new());
        let combined = Arc::new(CombinedContext::new(
            script.clone(),
            Arc::new(BasicServiceContext::anonymous()),
        ));

        let reused = ContextSource::AlreadyCombined(combined.clone()).combine(script, None);
        assert!(Arc::ptr_eq(&combined, &reused));
    }

    #[test]
    fn test_provider_keyed_by_principal() {
        let script: Arc<dyn ScriptContext> = Arc::new(SimpleScriptContext::new());
        let provider = Arc::new(BasicContextProvider);

        let principal = Principal::new("bob").with_token("t-9");
        let combined = ContextSource::NeedsProvider(provider.clone())
            .combine(script.clone(), Some(&principal));
        assert_eq!(combined.principal().unwrap().name, "bob");

        let anonymous = ContextSource::NeedsProvider(provider).combine(script, None);
        assert!(anonymous.principal().is_none());
        assert_eq!(anonymous.service_context(), "anonymous");
    }
}
