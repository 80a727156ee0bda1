// Invocation dispatcher
//
// Executes a resolved service either synchronously in-process or through
// a pluggable runner returning a future-like handle, and normalizes both
// paths to a single result/error outcome. The calling thread always
// blocks until resolution; this core exposes no non-blocking call
// semantics upward.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, SyncSender};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use tether_error::{EngineError, EngineResult};
use tether_types::{StructuredRecord, Value};

use crate::context::CombinedContext;
use crate::service::Service;

/// Lifecycle of a single dispatched call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchState {
    /// Input record bound, not yet handed to an executor
    Bound,
    /// Handed to the synchronous path or a runner
    Dispatched,
    /// Finished with an output record
    Completed,
    /// Finished with an error
    Failed(String),
}

/// Per-call dispatch bookkeeping.
#[derive(Debug, Clone)]
pub struct DispatchRecord {
    pub service_id: String,
    pub state: DispatchState,
    pub bound_at: DateTime<Utc>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl DispatchRecord {
    pub fn new(service_id: impl Into<String>) -> Self {
        DispatchRecord {
            service_id: service_id.into(),
            state: DispatchState::Bound,
            bound_at: Utc::now(),
            dispatched_at: None,
            finished_at: None,
        }
    }

    /// Mark the call as handed off for execution.
    pub fn mark_dispatched(&mut self) -> EngineResult<()> {
        if self.state != DispatchState::Bound {
            return Err(EngineError::InvalidState(format!(
                "Cannot dispatch from state: {:?}",
                self.state
            )));
        }
        self.state = DispatchState::Dispatched;
        self.dispatched_at = Some(Utc::now());
        Ok(())
    }

    /// Mark the call as successfully completed.
    pub fn complete(&mut self) -> EngineResult<()> {
        if self.state != DispatchState::Dispatched {
            return Err(EngineError::InvalidState(format!(
                "Cannot complete from state: {:?}",
                self.state
            )));
        }
        self.state = DispatchState::Completed;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Mark the call as failed.
    pub fn fail(&mut self, reason: &str) {
        self.state = DispatchState::Failed(reason.to_string());
        self.finished_at = Some(Utc::now());
    }

    /// Duration between dispatch and completion, in milliseconds.
    pub fn duration_ms(&self) -> Option<i64> {
        match (self.dispatched_at, self.finished_at) {
            (Some(start), Some(end)) => Some(end.timestamp_millis() - start.timestamp_millis()),
            _ => None,
        }
    }
}

/// A future-like handle to an asynchronously running service. Resolution
/// blocks the calling thread. Cancellation is not distinguished: a
/// handle whose producer disappears resolves to a generic dispatch
/// failure.
pub trait ServiceHandle: Send {
    fn wait(self: Box<Self>) -> EngineResult<StructuredRecord>;
}

/// Pluggable async executor for service runs.
pub trait ServiceRunner: Send + Sync {
    fn run(
        &self,
        service: Arc<dyn Service>,
        context: Arc<CombinedContext>,
        input: StructuredRecord,
    ) -> Box<dyn ServiceHandle>;
}

/// Channel-backed handle implementation.
pub struct PendingResult {
    receiver: Receiver<EngineResult<StructuredRecord>>,
}

impl PendingResult {
    /// Create a handle and the sender its producer resolves it through.
    pub fn channel() -> (SyncSender<EngineResult<StructuredRecord>>, PendingResult) {
        let (sender, receiver) = std::sync::mpsc::sync_channel(1);
        (sender, PendingResult { receiver })
    }
}

impl ServiceHandle for PendingResult {
    fn wait(self: Box<Self>) -> EngineResult<StructuredRecord> {
        match self.receiver.recv() {
            Ok(result) => result,
            Err(_) => Err(EngineError::DispatchFailure(
                "Result channel closed before resolution".to_string(),
            )),
        }
    }
}

/// Runner executing each call on a dedicated thread.
#[derive(Debug, Default)]
pub struct ThreadRunner;

impl ServiceRunner for ThreadRunner {
    fn run(
        &self,
        service: Arc<dyn Service>,
        context: Arc<CombinedContext>,
        input: StructuredRecord,
    ) -> Box<dyn ServiceHandle> {
        let (sender, handle) = PendingResult::channel();
        std::thread::spawn(move || {
            let ambient = AmbientState::new();
            let result = service.execute(&context, input, &ambient);
            let _ = sender.send(result);
        });
        Box::new(handle)
    }
}

/// Call-scoped ambient state, passed explicitly from caller to callee so
/// that nested script-to-service-to-script chains share tracing state.
/// Replaces the thread-scoped "current runtime" singleton lookup.
#[derive(Clone, Default)]
pub struct AmbientState {
    inner: Arc<AmbientInner>,
}

#[derive(Default)]
struct AmbientInner {
    attributes: RwLock<HashMap<String, Value>>,
    roots: AtomicUsize,
}

impl AmbientState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_attribute(&self, key: impl Into<String>, value: Value) {
        if let Ok(mut attributes) = self.inner.attributes.write() {
            attributes.insert(key.into(), value);
        }
    }

    pub fn attribute(&self, key: &str) -> Option<Value> {
        self.inner
            .attributes
            .read()
            .ok()
            .and_then(|attributes| attributes.get(key).cloned())
    }

    /// Number of currently registered call roots.
    pub fn root_count(&self) -> usize {
        self.inner.roots.load(Ordering::SeqCst)
    }

    /// Register a call root. The registration is released when the
    /// returned guard is dropped, on every exit path.
    pub fn register_root(&self) -> CallRootGuard {
        self.inner.roots.fetch_add(1, Ordering::SeqCst);
        CallRootGuard {
            state: self.clone(),
        }
    }
}

impl std::fmt::Debug for AmbientState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmbientState")
            .field("roots", &self.root_count())
            .finish()
    }
}

/// Guard pairing a call-root registration with its release.
pub struct CallRootGuard {
    state: AmbientState,
}

impl Drop for CallRootGuard {
    fn drop(&mut self) {
        self.state.inner.roots.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Runs resolved services and normalizes the outcome.
pub struct Dispatcher {
    runner: Option<Arc<dyn ServiceRunner>>,
}

impl Dispatcher {
    /// A dispatcher running everything synchronously in-process.
    pub fn new() -> Self {
        Dispatcher { runner: None }
    }

    /// A dispatcher submitting calls to the given runner and blocking on
    /// the returned handle.
    pub fn with_runner(runner: Arc<dyn ServiceRunner>) -> Self {
        Dispatcher {
            runner: Some(runner),
        }
    }

    /// Execute a service call. The caller's ambient state flows into the
    /// nested run on the synchronous path.
    pub fn dispatch(
        &self,
        service: &Arc<dyn Service>,
        context: &Arc<CombinedContext>,
        input: StructuredRecord,
        ambient: &AmbientState,
    ) -> EngineResult<StructuredRecord> {
        let mut record = DispatchRecord::new(service.id());
        debug!(service = %record.service_id, "dispatching service call");
        record.mark_dispatched()?;

        let result = match &self.runner {
            Some(runner) => runner
                .run(service.clone(), context.clone(), input)
                .wait()
                .map_err(|error| {
                    EngineError::DispatchFailure(format!(
                        "{}: {}",
                        record.service_id, error
                    ))
                }),
            None => service.execute(context, input, ambient),
        };

        match &result {
            Ok(_) => {
                record.complete()?;
                debug!(
                    service = %record.service_id,
                    duration_ms = record.duration_ms(),
                    "service call completed"
                );
            }
            Err(error) => {
                record.fail(&error.to_string());
                warn!(service = %record.service_id, %error, "service call failed");
            }
        }
        result
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
