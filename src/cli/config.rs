//! Config CLI subcommands.
//!
//! - `show`: Print the merged settings (API key redacted)
//! - `get`: Print one value by dot key
//! - `set`: Persist one value by dot key

use anyhow::Result;
use clap::Subcommand;
use serde_json::Value;

use crate::config::Config;

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show all settings
    Show,

    /// Print a single setting
    Get {
        /// Dot-separated key (e.g. api.model)
        key: String,
    },

    /// Change a setting
    Set {
        /// Dot-separated key (e.g. conversion.output_format)
        key: String,

        /// New value; parsed as JSON when possible, otherwise stored as a string
        value: String,
    },
}

/// Execute config subcommands
pub fn execute(command: ConfigCommands) -> Result<()> {
    let mut config = Config::load_default()?;

    match command {
        ConfigCommands::Show => {
            if let Some(path) = config.path() {
                eprintln!("Config file: {}\n", path.display());
            }
            println!("{}", serde_json::to_string_pretty(&redacted(config.values()))?);
        }
        ConfigCommands::Get { key } => match config.get(&key) {
            Some(Value::String(s)) => println!("{}", s),
            Some(value) => println!("{}", value),
            None => anyhow::bail!("Unknown config key: {}", key),
        },
        ConfigCommands::Set { key, value } => {
            config.set(&key, parse_value(&value))?;
            eprintln!("Set {}", key);
        }
    }

    Ok(())
}

/// JSON literal if it parses, plain string otherwise
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Copy of `values` with a non-empty `api.key` masked
fn redacted(values: &Value) -> Value {
    let mut copy = values.clone();
    if let Some(key) = copy.pointer_mut("/api/key") {
        if key.as_str().map(|s| !s.is_empty()).unwrap_or(false) {
            *key = Value::String("********".to_string());
        }
    }
    copy
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("true"), json!(true));
        assert_eq!(parse_value("600"), json!(600));
        assert_eq!(parse_value("null"), Value::Null);
        assert_eq!(parse_value("directory"), json!("directory"));
        assert_eq!(
            parse_value("https://api.example.com"),
            json!("https://api.example.com")
        );
    }

    #[test]
    fn test_redacted_masks_only_set_keys() {
        let masked = redacted(&json!({"api": {"key": "sk-secret", "model": "m"}}));
        assert_eq!(masked["api"]["key"], "********");
        assert_eq!(masked["api"]["model"], "m");

        let empty = redacted(&json!({"api": {"key": ""}}));
        assert_eq!(empty["api"]["key"], "");
    }
}
