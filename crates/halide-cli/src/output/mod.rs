//! Output formatting for different formats.

use clap::ValueEnum;
use serde::Serialize;

/// Available output formats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed tables with colors
    #[default]
    #[value(alias = "table")]
    Pretty,
    /// JSON output
    Json,
    /// YAML output
    #[value(alias = "yml")]
    Yaml,
}

impl OutputFormat {
    /// Print `value` as JSON or YAML.
    ///
    /// Returns `false` for [`OutputFormat::Pretty`], which each command
    /// renders itself.
    pub fn print_structured<T: Serialize>(self, value: &T) -> anyhow::Result<bool> {
        match self {
            Self::Json => println!("{}", serde_json::to_string_pretty(value)?),
            Self::Yaml => print!("{}", serde_yaml::to_string(value)?),
            Self::Pretty => return Ok(false),
        }
        Ok(true)
    }
}
