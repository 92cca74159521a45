//! `parley chat` — Interactive or single-message chat mode.

use anyhow::Context;
use parley_agent::{AgentResponse, ChatAgent};
use parley_config::ParleyConfig;
use parley_core::message::Message;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

const USER_ROLE: &str = "User";

pub async fn run(
    message: Option<String>,
    language: Option<String>,
    with_tools: bool,
) -> anyhow::Result<()> {
    let mut config = ParleyConfig::load().context("Failed to load config")?;
    if language.is_some() {
        config.agent.output_language = language;
    }
    let mut agent = super::build_agent(&config, with_tools)?;

    if let Some(msg) = message {
        // Single message mode
        let response = agent.step_async(Message::user(USER_ROLE, msg)).await?;
        print_response(&response);
        return Ok(());
    }

    // Interactive mode
    println!();
    println!("  Parley — Interactive Mode");
    println!();
    println!("  Agent:     {agent}");
    println!("  Tools:     {}", describe_tools(&agent));
    if let Some(language) = agent.output_language() {
        println!("  Language:  {language}");
    }
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type '/reset' to start over, 'exit' or Ctrl+D to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt()?;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => {}
            "exit" | "quit" => break,
            "/reset" => {
                agent.reset();
                println!("  (conversation reset)");
            }
            text => match agent.step_async(Message::user(USER_ROLE, text)).await {
                Ok(response) => {
                    print_response(&response);
                    if response.terminated {
                        println!("  (conversation ended; type '/reset' to start over)");
                    }
                }
                Err(e) => eprintln!("  [Error] {e}"),
            },
        }
        println!();
        prompt()?;
    }

    println!();
    println!("  Goodbye!");
    Ok(())
}

fn prompt() -> anyhow::Result<()> {
    print!("  You > ");
    std::io::stdout().flush()?;
    Ok(())
}

fn describe_tools(agent: &ChatAgent) -> String {
    if agent.is_tools_added() {
        agent.tool_names().join(", ")
    } else {
        "none".into()
    }
}

fn print_response(response: &AgentResponse) {
    for record in &response.info.tool_calls {
        tracing::info!("{record}");
    }

    let many = response.msgs.len() > 1;
    for (i, msg) in response.msgs.iter().enumerate() {
        for line in msg.content().lines() {
            if many {
                println!("  Assistant [{i}] > {line}");
            } else {
                println!("  Assistant > {line}");
            }
        }
    }

    if !response.info.termination_reasons.is_empty() {
        let reasons: Vec<String> = response
            .info
            .termination_reasons
            .iter()
            .map(ToString::to_string)
            .collect();
        println!("  (terminated: {})", reasons.join(", "));
    }
}
