//! Layout configuration.

use std::io;
use std::path::{Path, PathBuf};

use misc_writer::MiscLayout;
use thiserror::Error;
use tracing::debug;

/// Path of the layout configuration file.
pub const LAYOUT_CONFIG_PATH: &str = "/etc/misc-writer/layout.toml";

/// Error loading the layout configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read layout configuration {path:?}")]
    Read { path: PathBuf, source: io::Error },
    #[error("unable to parse layout configuration {path:?}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Load the layout configuration.
///
/// Without an explicit path, the default configuration file is used if it exists.
/// Otherwise, the default layout is returned.
pub fn load_layout(path: Option<&Path>) -> Result<MiscLayout, ConfigError> {
    match path {
        Some(path) => load_layout_from(path, true),
        None => load_layout_from(Path::new(LAYOUT_CONFIG_PATH), false),
    }
}

/// Load the layout configuration from the given path.
fn load_layout_from(path: &Path, required: bool) -> Result<MiscLayout, ConfigError> {
    if !required && !path.exists() {
        debug!("no layout configuration at {path:?}, using defaults");
        return Ok(MiscLayout::default());
    }
    let config = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_owned(),
        source,
    })?;
    toml::from_str(&config).map_err(|source| ConfigError::Parse {
        path: path.to_owned(),
        source,
    })
}
