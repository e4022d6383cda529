use super::NodeArgs;
use anyhow::Result;
use knode::config::{self, find_config_file};
use std::path::Path;

/// Handle config command
pub fn handle_config(node: &NodeArgs, config_path: Option<&Path>) -> Result<()> {
    match find_config_file(config_path)? {
        Some(path) => println!("# Config file: {}", path.display()),
        None => println!("# No config file found; using command line, environment and defaults"),
    }
    let config = config::load_config(node.to_layer(), config_path)?;
    print!("{}", config.to_toml()?);
    Ok(())
}
