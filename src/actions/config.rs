#![allow(clippy::option_map_unit_fn)]
use crate::config::Config;
use crate::config::cli::CONFIG_KEYS;
use crate::outln;
use crate::util::set_json_output;
use anyhow::Result;
use log::debug;
use serde_json::Value;
use std::collections::HashMap;

fn path_value(path: &std::path::Path) -> Value {
    Value::String(path.display().to_string())
}

fn list_value(values: &[String]) -> Value {
    Value::Array(values.iter().cloned().map(Value::String).collect())
}

fn optional_value(value: &Option<String>) -> Value {
    value.clone().map_or(Value::Null, Value::String)
}

/// The value of `key` in `config`, with its canonical name.
pub fn config_value(config: &Config, key: &str) -> Result<(&'static str, Value)> {
    let key = key.replace('-', "_");
    let canonical = CONFIG_KEYS
        .iter()
        .copied()
        .find(|k| *k == key)
        .ok_or_else(|| anyhow::anyhow!("Unknown key: {}", key))?;

    let value = match canonical {
        "log_level" => Value::String(config.log_level.as_str().to_lowercase()),
        "distribution" => Value::String(config.distribution.to_string()),
        "release" => Value::String(config.release.clone()),
        "architecture" => Value::String(config.architecture.to_string()),
        "mirror" => optional_value(&config.mirror),
        "local_mirror" => optional_value(&config.local_mirror),
        "repositories" => list_value(&config.repositories),
        "repository_key_check" => Value::Bool(config.repository_key_check),
        "with_docs" => Value::Bool(config.with_docs),
        "with_recommends" => Value::Bool(config.with_recommends),
        "network" => Value::Bool(config.network),
        "debug_shell" => Value::Bool(config.debug_shell),
        "packages" => list_value(&config.packages),
        "remove_packages" => list_value(&config.remove_packages),
        "environment" => Value::Object(
            config
                .environment
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
        ),
        "root" => path_value(&config.root),
        "pkgmngr" => config.pkgmngr.as_deref().map_or(Value::Null, path_value),
        "cache_dir" => path_value(&config.cache_dir),
        "workspace_dir" => path_value(&config.workspace_dir),
        _ => return Err(anyhow::anyhow!("Unknown key: {}", key)),
    };
    Ok((canonical, value))
}

/// Renders a value the way `KEY=VALUE` lines show it.
fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(values) => values
            .iter()
            .map(display_value)
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| format!("{}={}", k, display_value(v)))
            .collect::<Vec<_>>()
            .join(","),
        other => other.to_string(),
    }
}

pub fn config(config: &Config, keys: Option<Vec<String>>) -> Result<()> {
    let keys = keys.unwrap_or_else(|| CONFIG_KEYS.map(String::from).to_vec());
    let multi_line = keys.len() > 1;

    for key in keys {
        let (key, value) = config_value(config, &key)?;
        print_config_line(key, &value, multi_line, &config.sources);
    }

    Ok(())
}

fn print_config_line(
    key: &str,
    value: &Value,
    multi_line: bool,
    sources: &HashMap<String, String>,
) {
    let shown = display_value(value);
    sources.get(key).map(|s| {
        debug!("{}={} set from {}", key, shown, s);
    });
    set_json_output(key, value);

    if multi_line {
        outln!("{}={}", key, shown);
    } else {
        outln!("{}", shown);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributions::Distribution;
    use crate::installer::test_support::test_config;
    use std::path::Path;

    #[test]
    fn test_config_value() {
        let mut config = test_config(Path::new("/build"), Distribution::Fedora);
        config.packages = vec!["kernel".to_string(), "systemd".to_string()];
        config.environment.insert("A".to_string(), "1".to_string());

        let (key, value) = config_value(&config, "with-docs").unwrap();
        assert_eq!(key, "with_docs");
        assert_eq!(value, Value::Bool(false));

        let (_, value) = config_value(&config, "packages").unwrap();
        assert_eq!(display_value(&value), "kernel,systemd");

        let (_, value) = config_value(&config, "environment").unwrap();
        assert_eq!(display_value(&value), "A=1");

        let (_, value) = config_value(&config, "root").unwrap();
        assert_eq!(value, Value::String("/build/root".to_string()));

        let (_, value) = config_value(&config, "pkgmngr").unwrap();
        assert_eq!(display_value(&value), "");
    }

    #[test]
    fn test_unknown_key() {
        let config = test_config(Path::new("/build"), Distribution::Debian);
        assert!(config_value(&config, "colour").is_err());
    }
}
