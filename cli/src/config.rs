use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use interpreter::{InlineStyle, LineMarkerFormat, Options};

/// Looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG: &str = "fortiel.toml";

/// Contents of a `fortiel.toml` file. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub include_paths: Vec<PathBuf>,

    /// Name -> expression source.
    #[serde(default)]
    pub defines: BTreeMap<String, String>,

    #[serde(default)]
    pub line_markers: Option<String>,

    #[serde(default)]
    pub inline_style: Option<String>,

    #[serde(default)]
    pub max_expansion_depth: Option<usize>,
}

impl FileConfig {
    /// Read `explicit`, or `fortiel.toml` if it exists, or nothing.
    pub fn load(explicit: Option<&Path>) -> Result<FileConfig, String> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG);
                if !default.is_file() {
                    return Ok(FileConfig::default());
                }
                default
            }
        };
        let text = std::fs::read_to_string(&path)
            .map_err(|e| format!("cannot read '{}': {}", path.display(), e))?;
        let config = FileConfig::parse(&text).map_err(|e| format!("{}: {}", path.display(), e))?;
        log::debug!("loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn parse(text: &str) -> Result<FileConfig, String> {
        toml::from_str(text).map_err(|e| format!("TOML parse error: {}", e))
    }

    /// Options from this file alone; command-line flags are applied on top.
    pub fn into_options(self) -> Result<Options, String> {
        let mut options = Options {
            include_paths: self.include_paths,
            defines: self.defines.into_iter().collect(),
            ..Options::default()
        };
        if let Some(format) = self.line_markers {
            options.line_markers = format.parse::<LineMarkerFormat>()?;
        }
        if let Some(style) = self.inline_style {
            options.inline_style = style.parse::<InlineStyle>()?;
        }
        if let Some(depth) = self.max_expansion_depth {
            options.max_expansion_depth = depth;
        }
        Ok(options)
    }
}
