//! Built-in tool implementations for Parley.
//!
//! - [`math`]: integer `add`, `sub` and `mul` (synchronous)
//! - [`sleep`]: waits a number of seconds (asynchronous)

pub mod math;
pub mod sleep;

use parley_core::tool::Tool;

pub use math::ArithmeticTool;
pub use sleep::SleepTool;

/// The math tool set: `add`, `sub`, `mul`.
pub fn math_tools() -> Vec<Box<dyn Tool>> {
    vec![
        Box::new(ArithmeticTool::add()),
        Box::new(ArithmeticTool::sub()),
        Box::new(ArithmeticTool::mul()),
    ]
}

/// Every built-in tool.
pub fn default_tools() -> Vec<Box<dyn Tool>> {
    let mut tools = math_tools();
    tools.push(Box::new(SleepTool::new()));
    tools
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::tool::ToolRegistry;

    #[test]
    fn default_tools_have_unique_names() {
        let registry = ToolRegistry::from_tools(default_tools()).unwrap();
        assert_eq!(registry.names(), ["add", "sub", "mul", "sleep"]);
    }
}
