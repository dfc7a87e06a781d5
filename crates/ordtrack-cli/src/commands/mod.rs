//! Command handler modules for the `ordtrack` binary.

pub mod latency;
pub mod paper;

use anyhow::Result;
use ordtrack_config::{ClientConfig, LoadedConfig};

/// Load layered config; no paths means built-in defaults.
pub fn load_client_config(paths: &[String]) -> Result<(LoadedConfig, ClientConfig)> {
    let loaded = if paths.is_empty() {
        ordtrack_config::load_layered_yaml_from_strings(&[])?
    } else {
        ordtrack_config::load_layered_yaml(paths)?
    };
    let cfg = ClientConfig::from_loaded(&loaded)?;
    Ok((loaded, cfg))
}
