//! Tool dispatch.
//!
//! Looks up a tool by the name the model asked for, validates the arguments,
//! runs it and packages the outcome as a [`FunctionCallingRecord`]. There are
//! two entry points over the same logic: [`ToolDispatcher::dispatch`] for
//! callers outside async code and [`ToolDispatcher::dispatch_async`] for
//! callers that can await. Both produce the same record for the same call.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use parley_core::blocking;
use parley_core::error::{Error, ToolError};
use parley_core::event::{DomainEvent, EventBus};
use parley_core::model::{FunctionCallRequest, ToolSchema};
use parley_core::tool::{Tool, ToolOutput, ToolRegistry};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// The outcome of one tool invocation, kept in the step's info.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallingRecord {
    pub func_name: String,
    pub args: serde_json::Map<String, serde_json::Value>,
    pub result: serde_json::Value,
}

impl fmt::Display for FunctionCallingRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Function Execution: {}\n\tArgs: {}\n\tResult: {}",
            self.func_name,
            serde_json::Value::Object(self.args.clone()),
            self.result
        )
    }
}

/// Parse the raw argument text of a function call.
///
/// Empty text means no arguments. Anything other than a JSON object is
/// rejected.
pub(crate) fn parse_arguments(
    raw: &str,
) -> Result<serde_json::Map<String, serde_json::Value>, ToolError> {
    if raw.trim().is_empty() {
        return Ok(serde_json::Map::new());
    }
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(other) => Err(ToolError::InvalidArguments(format!(
            "expected a JSON object, got {other}"
        ))),
        Err(e) => Err(ToolError::InvalidArguments(e.to_string())),
    }
}

/// A call that has been resolved to a tool and started.
struct Invocation {
    name: String,
    args: serde_json::Map<String, serde_json::Value>,
    output: ToolOutput,
    started: Instant,
}

/// Routes model function calls to registered tools.
pub struct ToolDispatcher {
    registry: ToolRegistry,
    event_bus: Option<Arc<EventBus>>,
}

impl ToolDispatcher {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry,
            event_bus: None,
        }
    }

    /// Register more tools. Fails on a name that is already taken.
    pub fn register(&mut self, tool: Box<dyn Tool>) -> Result<(), ToolError> {
        self.registry.register(tool)
    }

    /// Publish a `ToolExecuted` event for every invocation.
    pub fn set_event_bus(&mut self, event_bus: Arc<EventBus>) {
        self.event_bus = Some(event_bus);
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.registry.schemas()
    }

    pub fn names(&self) -> Vec<&str> {
        self.registry.names()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Run a call to completion, blocking the current thread if the tool is
    /// asynchronous.
    ///
    /// Inside a multi-threaded tokio runtime the pending work is driven on
    /// the current worker; inside a current-thread runtime this fails with
    /// [`Error::Runtime`], use [`dispatch_async`](Self::dispatch_async) there.
    pub fn dispatch(&self, call: &FunctionCallRequest) -> Result<FunctionCallingRecord, Error> {
        let invocation = self.begin(call)?;
        let result = match invocation.output {
            ToolOutput::Ready(result) => result,
            ToolOutput::Pending(future) => blocking::block_on(future)?,
        };
        Ok(self.finish(invocation.name, invocation.args, invocation.started, result))
    }

    /// Run a call to completion, awaiting the tool if it is asynchronous.
    pub async fn dispatch_async(
        &self,
        call: &FunctionCallRequest,
    ) -> Result<FunctionCallingRecord, Error> {
        let invocation = self.begin(call)?;
        let result = match invocation.output {
            ToolOutput::Ready(result) => result,
            ToolOutput::Pending(future) => future.await,
        };
        Ok(self.finish(invocation.name, invocation.args, invocation.started, result))
    }

    fn begin(&self, call: &FunctionCallRequest) -> Result<Invocation, ToolError> {
        let tool = self
            .registry
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;

        debug!(tool = %call.name, "Dispatching tool call");
        let started = Instant::now();

        let (args, output) = match parse_arguments(&call.arguments) {
            Ok(args) => {
                let output = match tool.validate(args.clone()) {
                    Ok(validated) => tool.call(validated),
                    Err(e) => ToolOutput::Ready(Err(e)),
                };
                (args, output)
            }
            Err(e) => (serde_json::Map::new(), ToolOutput::Ready(Err(e))),
        };

        Ok(Invocation {
            name: call.name.clone(),
            args,
            output,
            started,
        })
    }

    fn finish(
        &self,
        name: String,
        args: serde_json::Map<String, serde_json::Value>,
        started: Instant,
        result: Result<serde_json::Value, ToolError>,
    ) -> FunctionCallingRecord {
        let duration_ms = started.elapsed().as_millis() as u64;
        let success = result.is_ok();

        if let Some(bus) = &self.event_bus {
            bus.publish(DomainEvent::ToolExecuted {
                tool_name: name.clone(),
                success,
                duration_ms,
                timestamp: chrono::Utc::now(),
            });
        }

        let result = match result {
            Ok(value) => value,
            Err(e) => {
                warn!(tool = %name, error = %e, "Tool execution failed");
                // Reported back to the model so it can recover.
                serde_json::Value::String(format!("Error: {e}"))
            }
        };

        FunctionCallingRecord {
            func_name: name,
            args,
            result,
        }
    }
}

impl fmt::Debug for ToolDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDispatcher")
            .field("tools", &self.registry.names())
            .finish()
    }
}
