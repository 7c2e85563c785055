//! `augur config`: print the effective configuration.

use std::fmt::Write;
use std::path::Path;

use augur_config::AppConfig;

pub fn show(config: &AppConfig, path: &Path) -> anyhow::Result<()> {
    print!("{}", render(config, path)?);
    Ok(())
}

fn render(config: &AppConfig, path: &Path) -> anyhow::Result<String> {
    let mut out = String::new();
    writeln!(out, "# {}", path.display())?;
    if !config.has_api_key() {
        writeln!(
            out,
            "# warning: no API key set (ANTHROPIC_API_KEY or AUGUR_API_KEY)"
        )?;
    }
    writeln!(out)?;
    out.push_str(&config.redacted_toml());
    Ok(out)
}
