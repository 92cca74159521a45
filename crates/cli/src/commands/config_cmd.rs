//! `parley config` — Configuration management commands.

use anyhow::Context;
use parley_config::ParleyConfig;

pub fn validate() -> anyhow::Result<()> {
    println!("Validating configuration...");

    match ParleyConfig::load() {
        Ok(config) => {
            println!("   Config parsed successfully");
            println!();
            println!("   Model:        {}", config.default_model);
            println!("   Role:         {}", config.agent.role_name);
            match config.agent.message_window_size {
                Some(size) => println!("   Window:       last {size} records"),
                None => println!("   Window:       token bounded"),
            }
            println!("   Tool depth:   {}", config.agent.max_tool_depth);
            println!("   Terminators:  {}", config.terminators.words.len());
        }
        Err(e) => {
            println!("   Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub fn show() -> anyhow::Result<()> {
    let config = ParleyConfig::load().context("Failed to load config")?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub fn path() -> anyhow::Result<()> {
    let config_path = ParleyConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}

pub fn init() -> anyhow::Result<()> {
    let dir = ParleyConfig::config_dir();
    let config_path = dir.join("config.toml");
    if config_path.exists() {
        println!("Config already exists at {}", config_path.display());
        return Ok(());
    }
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    std::fs::write(&config_path, ParleyConfig::default_toml())
        .with_context(|| format!("Failed to write {}", config_path.display()))?;
    println!("Wrote default config to {}", config_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    #[test]
    fn config_path_is_valid() {
        let path = parley_config::ParleyConfig::config_dir().join("config.toml");
        assert!(path.to_str().unwrap().contains(".parley"));
    }
}
