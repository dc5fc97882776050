//! Configuration management for Playrack.
//!
//! This module defines the structure of the `playrack.toml` configuration file
//! and the resolved `Settings` produced by merging it with CLI overrides.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::output::DEFAULT_MAX_LINES;

/// Default number of tree levels to auto-expand on load.
pub const DEFAULT_EXPAND_LEVELS: usize = 3;

/// Top-level configuration structure corresponding to `playrack.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Path to the inventory directory or file, relative to the project root.
    pub inventory: Option<String>,
    /// Path to the playbooks directory, relative to the project root.
    pub playbooks: Option<String>,
    /// Number of tree levels to auto-expand on load.
    pub expand_levels: Option<usize>,
    /// Whether the vault toggle starts enabled.
    pub vault: Option<bool>,
    /// Maximum number of output lines to keep in memory.
    pub max_lines: Option<usize>,
    /// Path for the per-run output log file.
    pub log_file: Option<String>,
}

/// Loads and parses the configuration from a file path.
pub fn load_config(path: &Path) -> Result<Config> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config: Config = toml::from_str(&raw)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    Ok(config)
}

/// Fully resolved runtime settings: config file values with CLI overrides
/// applied and defaults filled in.
#[derive(Debug, Clone)]
pub struct Settings {
    pub project_root: PathBuf,
    pub inventory_root: PathBuf,
    pub playbooks_root: PathBuf,
    pub expand_levels: usize,
    pub vault: bool,
    pub max_lines: usize,
    pub log_file: Option<PathBuf>,
}

/// CLI-provided overrides, all optional.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub inventory: Option<PathBuf>,
    pub playbooks: Option<PathBuf>,
    pub expand_levels: Option<usize>,
    pub vault: bool,
    pub max_lines: Option<usize>,
    pub log_file: Option<PathBuf>,
}

impl Settings {
    /// Merges config file values and CLI overrides; CLI wins.
    pub fn resolve(project_root: PathBuf, config: &Config, overrides: &Overrides) -> Self {
        let resolve_path = |value: Option<&PathBuf>, configured: Option<&String>, default: &str| {
            value
                .cloned()
                .or_else(|| configured.map(|p| project_root.join(p)))
                .unwrap_or_else(|| project_root.join(default))
        };
        Self {
            inventory_root: resolve_path(
                overrides.inventory.as_ref(),
                config.inventory.as_ref(),
                "inventory",
            ),
            playbooks_root: resolve_path(
                overrides.playbooks.as_ref(),
                config.playbooks.as_ref(),
                "playbooks",
            ),
            expand_levels: overrides
                .expand_levels
                .or(config.expand_levels)
                .unwrap_or(DEFAULT_EXPAND_LEVELS),
            vault: overrides.vault || config.vault.unwrap_or(false),
            max_lines: overrides
                .max_lines
                .or(config.max_lines)
                .unwrap_or(DEFAULT_MAX_LINES),
            log_file: overrides
                .log_file
                .clone()
                .or_else(|| config.log_file.as_ref().map(|p| project_root.join(p))),
            project_root,
        }
    }
}
