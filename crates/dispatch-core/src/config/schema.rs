//! TOML schema types for the agent configuration file.
//!
//! The config file declares every agent the dispatcher may invoke, plus
//! named groups and global settings:
//!
//! ```toml
//! [settings]
//! timeout = 300
//! session_dir = "~/.dispatch/sessions"
//! default_agents = ["claude"]
//!
//! [agents.claude]
//! start = "claude -p {{prompt}} --output-format stream-json"
//! continue = "claude -p {{prompt}} --resume {{session}} --output-format stream-json"
//! format = "stream-json"
//! flags = ["--dangerously-skip-permissions"]
//!
//! [agents.gemini]
//! start = "gemini --output-format json"
//! format = "json"
//!
//! [groups]
//! reviewers = ["claude", "gemini"]
//! ```
//!
//! An agent whose `start` template contains no `{{prompt}}` placeholder
//! receives the prompt on stdin instead (the `gemini` example above).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::DispatchError;

/// How an agent's stdout is parsed into an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    /// Line-delimited JSON messages; the final `result` message carries
    /// the answer text and the native session id.
    StreamJson,
    /// One JSON object on stdout.
    Json,
    /// Raw text (default); the whole trimmed stdout is the answer.
    #[default]
    Text,
}

/// A single agent definition from the `[agents.<name>]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefinition {
    /// Agent name — the table key, filled in after parsing.
    #[serde(skip)]
    pub name: String,

    /// Command template for a fresh invocation. `{{prompt}}` is replaced
    /// by the resolved prompt; without it the prompt goes to stdin.
    pub start: String,

    /// Command template to resume a session. `{{session}}` is replaced by
    /// the agent's native continuation handle.
    #[serde(default, rename = "continue")]
    pub continue_command: Option<String>,

    /// Output parsing mode.
    #[serde(default)]
    pub format: OutputFormat,

    /// Extra argv appended verbatim after the template tokens.
    #[serde(default)]
    pub flags: Vec<String>,
}

/// Global settings from the `[settings]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Per-invocation timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Directory holding session files. Supports a leading `~`.
    #[serde(default = "default_session_dir")]
    pub session_dir: String,

    /// Agents used when a parallel dispatch names none.
    #[serde(default)]
    pub default_agents: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            session_dir: default_session_dir(),
            default_agents: Vec::new(),
        }
    }
}

fn default_timeout() -> u64 {
    300
}

fn default_session_dir() -> String {
    "~/.dispatch/sessions".to_string()
}

/// Top-level agent configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub settings: Settings,

    #[serde(default)]
    pub agents: HashMap<String, AgentDefinition>,

    #[serde(default)]
    pub groups: HashMap<String, Vec<String>>,
}

impl ConfigFile {
    /// Parse a configuration from a TOML string.
    pub fn from_toml(text: &str) -> Result<Self, DispatchError> {
        let mut config: ConfigFile = toml::from_str(text)
            .map_err(|e| DispatchError::Config(format!("Failed to parse agent config: {}", e)))?;
        for (name, agent) in config.agents.iter_mut() {
            agent.name = name.clone();
        }
        Ok(config)
    }

    /// Load a configuration from a file path.
    pub fn from_file(path: &str) -> Result<Self, DispatchError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DispatchError::Config(format!("Failed to read agent config '{}': {}", path, e))
        })?;
        Self::from_toml(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let toml = r#"
[agents.echo]
start = "echo {{prompt}}"
"#;
        let config = ConfigFile::from_toml(toml).unwrap();
        let agent = config.agents.get("echo").unwrap();
        assert_eq!(agent.name, "echo");
        assert_eq!(agent.start, "echo {{prompt}}");
        assert_eq!(agent.format, OutputFormat::Text);
        assert!(agent.continue_command.is_none());
        assert!(agent.flags.is_empty());
        assert_eq!(config.settings.timeout, 300);
        assert_eq!(config.settings.session_dir, "~/.dispatch/sessions");
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[settings]
timeout = 120
session_dir = "/tmp/dispatch-sessions"
default_agents = ["claude"]

[agents.claude]
start = "claude -p {{prompt}} --output-format stream-json"
continue = "claude -p {{prompt}} --resume {{session}}"
format = "stream-json"
flags = ["--dangerously-skip-permissions"]

[agents.gemini]
start = "gemini --output-format json"
format = "json"

[groups]
reviewers = ["claude", "gemini"]
"#;
        let config = ConfigFile::from_toml(toml).unwrap();
        assert_eq!(config.settings.timeout, 120);
        assert_eq!(config.settings.default_agents, vec!["claude"]);
        assert_eq!(config.agents.len(), 2);

        let claude = config.agents.get("claude").unwrap();
        assert_eq!(claude.format, OutputFormat::StreamJson);
        assert_eq!(
            claude.continue_command.as_deref(),
            Some("claude -p {{prompt}} --resume {{session}}")
        );
        assert_eq!(claude.flags, vec!["--dangerously-skip-permissions"]);

        assert_eq!(config.groups.get("reviewers").unwrap().len(), 2);
    }

    #[test]
    fn test_parse_rejects_bad_format() {
        let toml = r#"
[agents.x]
start = "x"
format = "xml"
"#;
        let err = ConfigFile::from_toml(toml).unwrap_err();
        assert!(matches!(err, DispatchError::Config(_)));
    }
}
