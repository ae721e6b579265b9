use anyhow::Context;
use std::env;
use std::path::PathBuf;

const CONFIG_FILE: &str = "config.toml";

fn home_dir() -> anyhow::Result<PathBuf> {
    let home = env::var_os("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home))
}

fn routegate_home() -> Option<PathBuf> {
    env::var_os("ROUTEGATE_HOME").map(PathBuf::from)
}

/// Directory searched for `config.toml` when no explicit path is given.
/// Not created; a missing config simply means an empty gateway.
pub fn config_dir() -> anyhow::Result<PathBuf> {
    if let Some(base) = routegate_home() {
        return Ok(base.join("config"));
    }

    if let Some(xdg) = env::var_os("XDG_CONFIG_HOME").map(PathBuf::from) {
        return Ok(xdg.join("routegate"));
    }

    Ok(home_dir()?.join(".config").join("routegate"))
}

/// Explicit path (flag or `ROUTEGATE_CONFIG`) wins over the search directory.
pub fn config_path(explicit: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match explicit {
        Some(p) => Ok(p),
        None => Ok(config_dir()?.join(CONFIG_FILE)),
    }
}
