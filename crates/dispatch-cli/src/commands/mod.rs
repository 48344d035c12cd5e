//! CLI command implementations.
//!
//! Each submodule corresponds to a top-level CLI command and reuses
//! the dispatch-core domain logic through a shared `Dispatcher`.

pub mod agent;
pub mod agents;
pub mod continue_session;
pub mod parallel;
pub mod run_loop;
pub mod sessions;
pub mod workflow;

use std::io::{IsTerminal, Read};
use std::sync::Arc;

use dispatch_core::{ConfigStore, DispatchError, Dispatcher};

/// Initialize a `Dispatcher` from the discovered config.
///
/// `config_path` is the `--config` override; when absent the usual
/// discovery chain applies (`./dispatch.toml`, then the home config).
pub fn init_dispatcher(config_path: Option<&str>) -> Result<Dispatcher, DispatchError> {
    load_dotenv();
    let config = Arc::new(ConfigStore::discover(config_path)?);
    Ok(Dispatcher::from_config(config))
}

/// Resolve the prompt for a command.
///
/// A positional prompt always wins. Without one, piped stdin is read
/// in full; an interactive terminal with no prompt is an error.
pub fn resolve_prompt(positional: Option<String>) -> Result<String, DispatchError> {
    if let Some(prompt) = positional {
        return Ok(prompt);
    }

    let mut stdin = std::io::stdin();
    if stdin.is_terminal() {
        return Err(DispatchError::Validation(
            "No prompt given; pass one as an argument or pipe it on stdin".to_string(),
        ));
    }

    let mut buffer = String::new();
    stdin
        .read_to_string(&mut buffer)
        .map_err(|e| DispatchError::Io(format!("Failed to read prompt from stdin: {}", e)))?;

    let prompt = buffer.trim().to_string();
    if prompt.is_empty() {
        return Err(DispatchError::Validation(
            "Prompt from stdin is empty".to_string(),
        ));
    }
    Ok(prompt)
}

/// Load environment variables from dotenv files in the current directory.
fn load_dotenv() {
    // Try .env.local first (higher priority), then .env
    for filename in &[".env.local", ".env"] {
        let path = std::path::Path::new(filename);
        if path.exists() {
            if let Ok(content) = std::fs::read_to_string(path) {
                for line in content.lines() {
                    if let Some((key, value)) = parse_dotenv_line(line) {
                        // Only set if not already present (existing env vars take priority)
                        if std::env::var(key).is_err() {
                            std::env::set_var(key, &value);
                        }
                    }
                }
                tracing::debug!("[Dispatch] Loaded environment from '{}'", filename);
            }
        }
    }
}

/// Parse one `KEY=VALUE` dotenv line; comments and blanks yield `None`.
fn parse_dotenv_line(line: &str) -> Option<(&str, String)> {
    let line = line.trim();
    // Skip comments and empty lines
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    // Parse KEY=VALUE
    let eq_idx = line.find('=')?;
    let key = line[..eq_idx].trim();
    let mut value = line[eq_idx + 1..].trim().to_string();
    // Strip surrounding quotes; a lone quote character is a value, not a pair
    if value.len() >= 2
        && ((value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\'')))
    {
        value = value[1..value.len() - 1].to_string();
    }
    Some((key, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dotenv_line_basics() {
        assert_eq!(
            parse_dotenv_line("KEY=value"),
            Some(("KEY", "value".to_string()))
        );
        assert_eq!(
            parse_dotenv_line("KEY=\"quoted value\""),
            Some(("KEY", "quoted value".to_string()))
        );
        assert_eq!(
            parse_dotenv_line("KEY='single quoted'"),
            Some(("KEY", "single quoted".to_string()))
        );
        assert_eq!(parse_dotenv_line("KEY="), Some(("KEY", String::new())));
        assert_eq!(parse_dotenv_line("# comment"), None);
        assert_eq!(parse_dotenv_line("   "), None);
        assert_eq!(parse_dotenv_line("no equals sign"), None);
    }

    #[test]
    fn test_parse_dotenv_line_lone_quote_value() {
        // A value that is a single quote character is kept as-is.
        assert_eq!(parse_dotenv_line("KEY=\""), Some(("KEY", "\"".to_string())));
        assert_eq!(parse_dotenv_line("KEY='"), Some(("KEY", "'".to_string())));
        assert_eq!(parse_dotenv_line("KEY=\"\""), Some(("KEY", String::new())));
    }
}
