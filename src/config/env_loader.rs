//! `.env` file loading.
//!
//! Values from the file fill in variables the process environment does not
//! set; the process environment always wins.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::path::Path;

/// Read KEY=VALUE pairs from a .env file without touching the process
/// environment.
///
/// Parsing is done by dotenvy: comments, blank lines and quoted values are
/// handled there.
pub fn load_env_file<P: AsRef<Path>>(path: P) -> Result<HashMap<String, String>> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(Error::Config(format!(
            "Environment file not found: {}",
            path.display()
        )));
    }

    let iter = dotenvy::from_path_iter(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read environment file {}: {}",
            path.display(),
            e
        ))
    })?;

    let mut env_vars = HashMap::new();
    for item in iter {
        let (key, value) = item.map_err(|e| {
            Error::Config(format!(
                "Failed to parse environment file {}: {}",
                path.display(),
                e
            ))
        })?;
        validate_env_name(&key)?;
        env_vars.insert(key, value);
    }

    Ok(env_vars)
}

/// Validate an environment variable name (POSIX: letter or underscore, then
/// alphanumerics and underscores).
pub fn validate_env_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    match chars.next() {
        None => {
            return Err(Error::Config(
                "Environment variable name cannot be empty".to_string(),
            ))
        }
        Some(first) if !first.is_ascii_alphabetic() && first != '_' => {
            return Err(Error::Config(format!(
                "Invalid environment variable name '{}': must start with a letter or underscore",
                name
            )));
        }
        Some(_) => {}
    }

    if let Some((i, c)) = name
        .char_indices()
        .find(|(_, c)| !c.is_ascii_alphanumeric() && *c != '_')
    {
        return Err(Error::Config(format!(
            "Invalid environment variable name '{}': character '{}' at position {} is not allowed",
            name, c, i
        )));
    }

    Ok(())
}
