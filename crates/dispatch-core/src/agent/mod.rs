pub mod command;
pub mod dispatcher;
pub mod output;

pub use command::{build_command, resolve_env_vars, CommandPlan, InvokeMode};
pub use dispatcher::{Dispatcher, InvocationResult, InvokeOptions};
pub use output::{parse_output, ParsedOutput};
