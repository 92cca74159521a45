//! Integer arithmetic tools — `add`, `sub`, `mul`.
//!
//! Overflow is reported as an execution failure rather than wrapping.

use parley_core::error::ToolError;
use parley_core::tool::{ParamKind, Tool, ToolArgs, ToolOutput, ToolParam};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Add,
    Sub,
    Mul,
}

pub struct ArithmeticTool {
    op: Op,
    params: Vec<ToolParam>,
}

impl ArithmeticTool {
    fn new(op: Op) -> Self {
        let (first, second) = match op {
            Op::Add => ("The first number to add.", "The second number to add."),
            Op::Sub => ("The number to subtract from.", "The number to subtract."),
            Op::Mul => ("The first number to multiply.", "The second number to multiply."),
        };
        Self {
            op,
            params: vec![
                ToolParam::required("a", ParamKind::Integer, first),
                ToolParam::required("b", ParamKind::Integer, second),
            ],
        }
    }

    pub fn add() -> Self {
        Self::new(Op::Add)
    }

    pub fn sub() -> Self {
        Self::new(Op::Sub)
    }

    pub fn mul() -> Self {
        Self::new(Op::Mul)
    }

    fn apply(&self, a: i64, b: i64) -> Result<i64, ToolError> {
        let result = match self.op {
            Op::Add => a.checked_add(b),
            Op::Sub => a.checked_sub(b),
            Op::Mul => a.checked_mul(b),
        };
        result.ok_or_else(|| ToolError::ExecutionFailed {
            tool_name: self.name().to_string(),
            reason: format!("integer overflow computing {a} and {b}"),
        })
    }
}

impl Tool for ArithmeticTool {
    fn name(&self) -> &str {
        match self.op {
            Op::Add => "add",
            Op::Sub => "sub",
            Op::Mul => "mul",
        }
    }

    fn description(&self) -> &str {
        match self.op {
            Op::Add => "Adds two numbers.",
            Op::Sub => "Do subtraction between two numbers.",
            Op::Mul => "Multiplies two integers.",
        }
    }

    fn parameters(&self) -> &[ToolParam] {
        &self.params
    }

    fn call(&self, args: ToolArgs) -> ToolOutput {
        let result = (|| {
            let a: i64 = args.require("a")?;
            let b: i64 = args.require("b")?;
            self.apply(a, b).map(serde_json::Value::from)
        })();
        ToolOutput::Ready(result)
    }
}
