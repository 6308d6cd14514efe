//! Deployment tooling for the JobPortal ledger.

pub mod cli;
pub mod deploy;
pub mod script;

use std::path::PathBuf;

use anyhow::Context;
use jobportal_infra::Settings;

/// Settings from `path` when given, otherwise from the default sources.
pub fn load_settings(path: Option<PathBuf>) -> anyhow::Result<Settings> {
    match path {
        Some(path) => Settings::load_from_path(path.clone())
            .with_context(|| format!("loading settings from {}", path.display())),
        None => Settings::load().context("loading settings"),
    }
}
