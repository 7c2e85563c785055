//! `augur tools`: list the built-in tools.

use augur_config::AppConfig;

use crate::runtime;

pub fn list(config: &AppConfig) -> anyhow::Result<()> {
    let registry = runtime::build_registry(config)?;
    println!("  {} tools available:", registry.len());
    println!();
    for def in registry.definitions() {
        println!("  {:<16} {}", def.name, def.description);
    }
    Ok(())
}
