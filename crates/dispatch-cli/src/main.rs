//! Dispatch CLI — run and orchestrate coding agents from the terminal.
//!
//! A thin argument-parsing layer over dispatch-core: single agent
//! invocations, parallel fan-out, YAML workflows, stored sessions, and
//! plan-driven loops all share the same `Dispatcher`.

use clap::{Parser, Subcommand};

use dispatch_cli::commands;
use dispatch_cli::commands::workflow::WorkflowAction;
use dispatch_cli::output::OutputMode;

/// dispatch CLI — run and orchestrate coding agents
#[derive(Parser)]
#[command(
    name = "dispatch",
    version,
    about = "Run and orchestrate coding agents from the command line"
)]
pub struct Cli {
    /// Path to the agent config file (default: ./dispatch.toml, then
    /// ~/.dispatch/config.toml)
    #[arg(long, env = "DISPATCH_CONFIG", global = true)]
    config: Option<String>,

    /// Output rendering
    #[arg(long, value_enum, default_value_t = OutputMode::Text, global = true)]
    output: OutputMode,

    /// Debug-level logging for the dispatch crates
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Invoke one agent with a prompt
    Agent {
        /// Agent name from the config
        name: String,
        /// Prompt text; read from stdin when omitted
        prompt: Option<String>,
        /// Session id to file the conversation under (default: random)
        #[arg(long)]
        session: Option<String>,
        /// Timeout in seconds, overriding the configured default
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Fan one prompt out to several agents at once
    Parallel {
        /// Comma-separated agents and groups; settings.default_agents
        /// when omitted
        #[arg(value_delimiter = ',', num_args = 1)]
        agents: Option<Vec<String>>,
        /// Prompt text; read from stdin when omitted
        prompt: Option<String>,
        /// Abort the remaining agents on the first failure
        #[arg(long)]
        fail_fast: bool,
        /// Fail unless every agent succeeds
        #[arg(long)]
        require_all: bool,
        /// Timeout in seconds, overriding the configured default
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Run a YAML-defined workflow of agent steps
    Workflow {
        /// Path to the workflow YAML file
        file: String,
        /// Run input, available to steps as {{input}}
        input: Option<String>,
        /// Check the file and agent references without running
        #[arg(long, conflicts_with_all = ["dry_run", "describe", "extract_step"])]
        validate: bool,
        /// Resolve every prompt with stand-in outputs, spawning nothing
        #[arg(long, conflicts_with = "describe")]
        dry_run: bool,
        /// Print each step's agents and dependencies
        #[arg(long)]
        describe: bool,
        /// Run only this step and the steps it depends on
        #[arg(long, value_name = "STEP")]
        extract_step: Option<String>,
        /// Timeout in seconds for steps without their own
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Send a follow-up prompt into a stored session
    Continue {
        /// Session id printed by a previous command
        session_id: String,
        /// Prompt text; read from stdin when omitted
        prompt: Option<String>,
        /// Agent to resume; required when several share the session
        #[arg(long)]
        agent: Option<String>,
        /// Timeout in seconds, overriding the configured default
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// List stored sessions, or delete stale ones
    Sessions {
        /// Delete sessions idle for more than this many days
        #[arg(long, value_name = "DAYS")]
        cleanup: Option<u32>,
        /// Skip the confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Run one agent in a loop until its plan file is complete
    Loop {
        /// Agent name from the config
        agent: String,
        /// File whose contents are sent as the prompt every iteration
        #[arg(long, value_name = "FILE")]
        prompt: String,
        /// Markdown plan file with `- [ ]` task checkboxes
        #[arg(long, value_name = "FILE")]
        plan: String,
        /// Check the agent, prompt, and plan without invoking anything
        #[arg(long)]
        validate: bool,
        /// Hard cap on iterations
        #[arg(long, default_value_t = 10)]
        max_iterations: u32,
        /// Per-iteration timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Iteration log path (default: <plan>.iterations.jsonl)
        #[arg(long, value_name = "FILE")]
        log: Option<String>,
    },

    /// List configured agents, groups, and defaults
    Agents,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    let default_filter = if cli.verbose {
        "dispatch_core=debug,dispatch_cli=debug"
    } else {
        "dispatch_core=warn,dispatch_cli=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    let result = if let Some(command) = cli.command {
        run_command(command, cli.config.as_deref(), cli.output).await
    } else {
        // No subcommand — show help
        use clap::CommandFactory;
        Cli::command().print_help().ok();
        println!();
        Ok(())
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run_command(
    command: Commands,
    config: Option<&str>,
    output: OutputMode,
) -> Result<(), dispatch_core::DispatchError> {
    match command {
        Commands::Agent {
            name,
            prompt,
            session,
            timeout,
        } => {
            let dispatcher = commands::init_dispatcher(config)?;
            commands::agent::run(&dispatcher, output, &name, prompt, session, timeout).await
        }

        Commands::Parallel {
            agents,
            prompt,
            fail_fast,
            require_all,
            timeout,
        } => {
            let dispatcher = commands::init_dispatcher(config)?;
            commands::parallel::run(
                &dispatcher,
                output,
                agents,
                prompt,
                fail_fast,
                require_all,
                timeout,
            )
            .await
        }

        Commands::Workflow {
            file,
            input,
            validate,
            dry_run,
            describe,
            extract_step,
            timeout,
        } => {
            let action = if validate {
                WorkflowAction::Validate
            } else if describe {
                WorkflowAction::Describe
            } else if dry_run {
                WorkflowAction::DryRun
            } else {
                WorkflowAction::Run { extract_step }
            };
            let dispatcher = commands::init_dispatcher(config)?;
            commands::workflow::run(&dispatcher, output, &file, input, timeout, action).await
        }

        Commands::Continue {
            session_id,
            prompt,
            agent,
            timeout,
        } => {
            let dispatcher = commands::init_dispatcher(config)?;
            commands::continue_session::run(&dispatcher, output, &session_id, prompt, agent, timeout)
                .await
        }

        Commands::Sessions { cleanup, yes } => {
            let dispatcher = commands::init_dispatcher(config)?;
            commands::sessions::run(&dispatcher, output, cleanup, yes).await
        }

        Commands::Loop {
            agent,
            prompt,
            plan,
            validate,
            max_iterations,
            timeout,
            log,
        } => {
            let dispatcher = commands::init_dispatcher(config)?;
            commands::run_loop::run(
                &dispatcher,
                output,
                &agent,
                &prompt,
                &plan,
                validate,
                max_iterations,
                timeout,
                log,
            )
            .await
        }

        Commands::Agents => {
            let dispatcher = commands::init_dispatcher(config)?;
            commands::agents::run(&dispatcher, output)
        }
    }
}
