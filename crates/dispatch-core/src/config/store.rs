//! Config Store — loads agent definitions and resolves lookups.
//!
//! Discovery order when no explicit path is given:
//! 1. `./dispatch.toml` in the working directory
//! 2. `~/.dispatch/config.toml`
//!
//! Group and `default_agents` references are checked at load time so a
//! bad config fails before any process is spawned.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::schema::{AgentDefinition, ConfigFile, Settings};
use crate::error::DispatchError;

const LOCAL_CONFIG: &str = "dispatch.toml";
const HOME_CONFIG: &str = ".dispatch/config.toml";

/// Immutable agent configuration for the process lifetime.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    settings: Settings,
    agents: HashMap<String, AgentDefinition>,
    groups: HashMap<String, Vec<String>>,
}

impl ConfigStore {
    /// Build a store from a parsed config file, checking cross-references.
    pub fn new(config: ConfigFile) -> Result<Self, DispatchError> {
        let store = Self {
            settings: config.settings,
            agents: config.agents,
            groups: config.groups,
        };

        for (group, members) in &store.groups {
            for member in members {
                if !store.agents.contains_key(member) {
                    return Err(DispatchError::Config(format!(
                        "Group '{}' references unknown agent '{}'",
                        group, member
                    )));
                }
            }
        }
        for name in &store.settings.default_agents {
            if !store.agents.contains_key(name) && !store.groups.contains_key(name) {
                return Err(DispatchError::Config(format!(
                    "default_agents references unknown agent '{}'",
                    name
                )));
            }
        }

        Ok(store)
    }

    /// Parse and validate a store from a TOML string.
    pub fn from_toml(text: &str) -> Result<Self, DispatchError> {
        Self::new(ConfigFile::from_toml(text)?)
    }

    /// Load a store from a file path.
    pub fn from_file(path: &str) -> Result<Self, DispatchError> {
        Self::new(ConfigFile::from_file(path)?)
    }

    /// Load a store from an explicit path or the discovery chain.
    pub fn discover(explicit: Option<&str>) -> Result<Self, DispatchError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        if Path::new(LOCAL_CONFIG).exists() {
            return Self::from_file(LOCAL_CONFIG);
        }

        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(HOME_CONFIG);
            if home_config.exists() {
                return Self::from_file(&home_config.to_string_lossy());
            }
        }

        Err(DispatchError::Config(format!(
            "No agent configuration found. Create '{}' or '~/{}', or pass --config.",
            LOCAL_CONFIG, HOME_CONFIG
        )))
    }

    /// Look up an agent definition by name.
    pub fn agent(&self, name: &str) -> Result<&AgentDefinition, DispatchError> {
        self.agents.get(name).ok_or_else(|| {
            let mut known: Vec<&str> = self.agents.keys().map(|s| s.as_str()).collect();
            known.sort();
            DispatchError::AgentNotFound(format!(
                "'{}' (configured agents: {})",
                name,
                if known.is_empty() {
                    "none".to_string()
                } else {
                    known.join(", ")
                }
            ))
        })
    }

    /// Expand a mixed list of agent and group names into agent names.
    ///
    /// An empty input falls back to `settings.default_agents`. Order is
    /// preserved and duplicates are dropped.
    pub fn expand_agents(&self, names: &[String]) -> Result<Vec<String>, DispatchError> {
        let source: &[String] = if names.is_empty() {
            if self.settings.default_agents.is_empty() {
                return Err(DispatchError::Config(
                    "No agents named and settings.default_agents is empty".to_string(),
                ));
            }
            &self.settings.default_agents
        } else {
            names
        };

        let mut expanded: Vec<String> = Vec::new();
        for name in source {
            if let Some(members) = self.groups.get(name) {
                for member in members {
                    if !expanded.contains(member) {
                        expanded.push(member.clone());
                    }
                }
            } else {
                self.agent(name)?;
                if !expanded.contains(name) {
                    expanded.push(name.clone());
                }
            }
        }
        Ok(expanded)
    }

    /// All agents, sorted by name.
    pub fn agents(&self) -> Vec<&AgentDefinition> {
        let mut all: Vec<&AgentDefinition> = self.agents.values().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// All groups with their members, sorted by name.
    pub fn groups(&self) -> Vec<(&str, &[String])> {
        let mut all: Vec<(&str, &[String])> = self
            .groups
            .iter()
            .map(|(name, members)| (name.as_str(), members.as_slice()))
            .collect();
        all.sort_by_key(|(name, _)| *name);
        all
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Per-invocation timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.settings.timeout)
    }

    /// Session directory with `~` expanded.
    pub fn session_dir(&self) -> PathBuf {
        expand_tilde(&self.settings.session_dir)
    }
}

/// Expand a leading `~` or `~/` to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}
