//! CLI configuration loading.
//!
//! Reads `<config dir>/fhircast/config.json` unless a path is given. The
//! document is either an application config with a `fhircast` section or
//! the FHIRcast section on its own.

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use serde::Deserialize;

use fhircast_hub_connection::FhircastConfig;

#[derive(Deserialize)]
#[serde(untagged)]
enum ConfigFile {
    App { fhircast: FhircastConfig },
    Bare(FhircastConfig),
}

/// Default location of the configuration file.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("fhircast").join("config.json"))
}

/// Loads the configuration.
///
/// An explicit path must exist. A missing default file yields the default
/// configuration, with no hubs.
pub fn load(path: Option<&Path>) -> anyhow::Result<FhircastConfig> {
    let path = match path {
        Some(p) => {
            if !p.exists() {
                bail!("config file {} does not exist", p.display());
            }
            p.to_path_buf()
        }
        None => match default_config_path() {
            Some(p) if p.exists() => p,
            Some(p) => {
                tracing::warn!(path = %p.display(), "no config file, FHIRcast is not configured");
                return Ok(FhircastConfig::default());
            }
            None => {
                tracing::warn!("no config directory on this platform");
                return Ok(FhircastConfig::default());
            }
        },
    };

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse(&content).with_context(|| format!("failed to parse {}", path.display()))
}

fn parse(content: &str) -> anyhow::Result<FhircastConfig> {
    let file: ConfigFile = serde_json::from_str(content)?;
    Ok(match file {
        ConfigFile::App { fhircast } => fhircast,
        ConfigFile::Bare(config) => config,
    })
}
