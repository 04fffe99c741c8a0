use anyhow::{Context, Result};
use hls_pull::HlsPluginConfig;
use std::path::Path;

/// Loads the plugin configuration. A missing file yields the defaults.
pub fn load(config_path: Option<&Path>) -> Result<HlsPluginConfig> {
    match config_path {
        Some(path) if path.exists() => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read configuration file {}", path.display()))?;
            toml::from_str(&content).context("Failed to parse configuration file")
        }
        _ => Ok(HlsPluginConfig::default()),
    }
}
