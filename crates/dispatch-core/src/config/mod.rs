pub mod schema;
pub mod store;

pub use schema::{AgentDefinition, ConfigFile, OutputFormat, Settings};
pub use store::{expand_tilde, ConfigStore};
