pub mod error;
pub mod event;
pub mod handlers;
pub mod logging;
pub mod notify;
pub mod pipeline;
pub mod queue;
pub mod signature;

#[cfg(test)]
pub mod test_utils;

use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::error::HookError;
use crate::queue::{HookTask, TaskQueue};

/// Key in the `scripts` table consulted when a branch has no dedicated entry.
pub const DEFAULT_SCRIPT_KEY: &str = "#default";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Shared secret for webhook signature verification. Unset or empty
    /// means signed requests are accepted unverified.
    pub secret: Option<String>,
    /// Accounts whose pushes are allowed to trigger builds.
    pub accounts: Vec<String>,
    pub gh_server: String,
    pub public_repo: bool,
    /// Root of the per-branch checkout/build directory tree.
    pub temp: String,
    /// Number of queue workers. The default of 1 keeps builds strictly
    /// serialized so no two tasks ever touch the same temp paths.
    #[serde(default = "default_workers")]
    pub workers: usize,
    pub scripts: HashMap<String, ScriptPair>,
    pub email: Option<EmailConfig>,
    pub notify_email: Option<String>,
    pub log_dir: Option<String>,
}

fn default_workers() -> usize {
    1
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScriptPair {
    pub build: String,
    pub publish: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmailConfig {
    #[serde(default)]
    pub enabled: bool,
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    pub user: String,
    pub password: String,
    #[serde(default)]
    pub tls: bool,
}

fn default_smtp_port() -> u16 {
    25
}

impl Config {
    /// Returns the webhook secret if one is configured and non-empty.
    pub fn configured_secret(&self) -> Option<&str> {
        self.secret.as_deref().filter(|s| !s.is_empty())
    }

    /// Returns true if `owner` is an authorized account (case-sensitive).
    pub fn is_authorized_account(&self, owner: &str) -> bool {
        self.accounts.iter().any(|a| a == owner)
    }

    /// Resolves the build/publish pair for a branch: the branch's own entry
    /// if present, otherwise `#default`.
    pub fn resolve_scripts(&self, branch: &str) -> Result<&ScriptPair, HookError> {
        self.scripts
            .get(branch)
            .or_else(|| self.scripts.get(DEFAULT_SCRIPT_KEY))
            .ok_or_else(|| {
                HookError::Config(format!("no default script defined for branch '{branch}'"))
            })
    }

    /// Startup validation. An empty scripts table means no event could ever
    /// be executed; a missing `#default` entry only affects unlisted
    /// branches, so it is reported but tolerated.
    pub fn validate(&self) -> Result<(), HookError> {
        if self.scripts.is_empty() {
            return Err(HookError::Config("no scripts defined".to_string()));
        }
        if !self.scripts.contains_key(DEFAULT_SCRIPT_KEY) {
            warn!("no '#default' script pair configured; pushes to unlisted branches will fail");
        }
        if self.email.as_ref().is_some_and(|e| e.enabled) && self.notify_email.is_none() {
            warn!("email is enabled but notify_email is not set; outcome reports will be skipped");
        }
        Ok(())
    }
}

pub struct AppState {
    pub config: Arc<Config>,
    pub queue: TaskQueue<HookTask>,
}

pub type SharedState = Arc<AppState>;
