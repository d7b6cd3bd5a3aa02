//! Run configuration binding.
//!
//! A configuration document declares one `in` and one `out` block, each
//! carrying a `type` discriminator and adapter-specific fields. Binding
//! peeks the two `type` values, then hands each adapter the *full*
//! configuration bytes for it to deserialize its own block.

use std::collections::HashMap;

use regex::Regex;
use serde::Deserialize;

use crate::error::EngineError;

/// The raw shape of a configuration document: just enough structure to peek
/// `in.type` / `out.type` before handing the whole document to an adapter.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfig {
    pub r#in: serde_yaml::Value,
    pub out: serde_yaml::Value,
}

impl RawConfig {
    pub fn parse(yaml: &str) -> Result<RawConfig, EngineError> {
        serde_yaml::from_str(yaml).map_err(|e| EngineError::ConfigInvalid(e.to_string()))
    }

    pub fn in_type(&self) -> Result<&str, EngineError> {
        peek_type(&self.r#in)
    }

    pub fn out_type(&self) -> Result<&str, EngineError> {
        peek_type(&self.out)
    }

    /// Deserializes the full `in` block into an adapter-specific spec type.
    pub fn parse_in<T: for<'de> Deserialize<'de>>(&self) -> Result<T, EngineError> {
        serde_yaml::from_value(self.r#in.clone()).map_err(|e| EngineError::ConfigInvalid(e.to_string()))
    }

    /// Deserializes the full `out` block into an adapter-specific spec type.
    pub fn parse_out<T: for<'de> Deserialize<'de>>(&self) -> Result<T, EngineError> {
        serde_yaml::from_value(self.out.clone()).map_err(|e| EngineError::ConfigInvalid(e.to_string()))
    }
}

fn peek_type(v: &serde_yaml::Value) -> Result<&str, EngineError> {
    v.get("type")
        .and_then(|t| t.as_str())
        .ok_or_else(|| EngineError::ConfigInvalid("missing `type` discriminator".to_string()))
}

/// Minimal `${VAR}` / `{{VAR}}` substitution against a caller-supplied
/// dictionary — the engine's "text templating" step. There is no
/// templating-engine crate anywhere in this codebase's dependency tree, so
/// this stays a small regex pass rather than reaching for one.
pub fn render_template(text: &str, vars: &HashMap<String, String>) -> String {
    let dollar_brace = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();
    let mustache = Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").unwrap();

    let once = dollar_brace.replace_all(text, |caps: &regex::Captures| {
        vars.get(&caps[1]).cloned().unwrap_or_default()
    });
    let twice = mustache.replace_all(&once, |caps: &regex::Captures| {
        vars.get(&caps[1]).cloned().unwrap_or_default()
    });
    twice.into_owned()
}

/// Seeds a template dictionary from the process environment
/// (`--template-with-env`).
pub fn env_vars() -> HashMap<String, String> {
    std::env::vars().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peeks_type_discriminators() {
        let cfg = RawConfig::parse("in:\n  type: random\nout:\n  type: file\n").unwrap();
        assert_eq!(cfg.in_type().unwrap(), "random");
        assert_eq!(cfg.out_type().unwrap(), "file");
    }

    #[test]
    fn missing_type_is_config_invalid() {
        let cfg = RawConfig::parse("in:\n  path: x\nout:\n  type: file\n").unwrap();
        assert!(matches!(cfg.in_type(), Err(EngineError::ConfigInvalid(_))));
    }

    #[test]
    fn renders_both_template_flavors() {
        let mut vars = HashMap::new();
        vars.insert("HOST".to_string(), "db1".to_string());
        assert_eq!(render_template("host: ${HOST}", &vars), "host: db1");
        assert_eq!(render_template("host: {{ HOST }}", &vars), "host: db1");
    }
}
