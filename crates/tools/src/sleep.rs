//! Asynchronous sleep tool.
//!
//! Mostly useful for exercising the asynchronous side of tool dispatch: the
//! work happens in a future that the caller either awaits or blocks on.

use std::time::Duration;
use parley_core::tool::{ParamKind, Tool, ToolArgs, ToolOutput, ToolParam};
use tracing::debug;

pub struct SleepTool {
    params: Vec<ToolParam>,
}

impl SleepTool {
    pub fn new() -> Self {
        Self {
            params: vec![ToolParam::required(
                "second",
                ParamKind::Integer,
                "Number of seconds to sleep.",
            )],
        }
    }
}

impl Default for SleepTool {
    fn default() -> Self {
        Self::new()
    }
}

impl Tool for SleepTool {
    fn name(&self) -> &str {
        "sleep"
    }

    fn description(&self) -> &str {
        "Sleeps for the given number of seconds and returns how long it slept."
    }

    fn parameters(&self) -> &[ToolParam] {
        &self.params
    }

    fn call(&self, args: ToolArgs) -> ToolOutput {
        let seconds: u64 = match args.require("second") {
            Ok(s) => s,
            Err(e) => return ToolOutput::Ready(Err(e)),
        };
        ToolOutput::Pending(Box::pin(async move {
            debug!(seconds, "Sleeping");
            tokio::time::sleep(Duration::from_secs(seconds)).await;
            Ok(serde_json::Value::from(seconds))
        }))
    }
}
