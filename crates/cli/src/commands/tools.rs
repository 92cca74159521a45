//! `parley tools` — List the built-in tools.

use parley_core::tool::Tool;

pub fn run() -> anyhow::Result<()> {
    for tool in parley_tools::default_tools() {
        println!("{}", describe(tool.as_ref()));
    }
    Ok(())
}

fn describe(tool: &dyn Tool) -> String {
    let params: Vec<String> = tool
        .parameters()
        .iter()
        .map(|p| {
            let optional = if p.required { "" } else { "?" };
            format!("{}{optional}", p.name)
        })
        .collect();
    format!("  {}({}) — {}", tool.name(), params.join(", "), tool.description())
}
