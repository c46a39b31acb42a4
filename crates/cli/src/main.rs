//! Clawsmith CLI — the main entry point.
//!
//! Commands:
//! - `run`      — Execute a single prompt and exit
//! - `chat`     — Interactive conversation mode
//! - `sessions` — List, show or delete saved sessions

use clap::{Parser, Subcommand};

mod commands;
mod terminal;

#[derive(Parser)]
#[command(
    name = "clawsmith",
    about = "Clawsmith — a minimal AI coding assistant",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a single prompt and print the result
    Run {
        prompt: String,

        /// Model to use, as provider/model
        #[arg(short, long, env = "CLAWSMITH_MODEL", default_value = "openai/gpt-4o")]
        model: String,

        /// Agent to run with
        #[arg(short, long, env = "CLAWSMITH_AGENT", default_value = "build")]
        agent: String,

        /// Working directory for the agent
        #[arg(short, long, env = "CLAWSMITH_WORKING_DIR", default_value = ".")]
        directory: String,

        /// Resume an existing session (accepts a partial id)
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Start an interactive conversation
    Chat {
        /// Model to use, as provider/model
        #[arg(short, long, env = "CLAWSMITH_MODEL", default_value = "openai/gpt-4o")]
        model: String,

        /// Agent to start with
        #[arg(short, long, env = "CLAWSMITH_AGENT", default_value = "build")]
        agent: String,

        /// Working directory for the agent
        #[arg(short, long, env = "CLAWSMITH_WORKING_DIR", default_value = ".")]
        directory: String,

        /// Resume an existing session (accepts a partial id)
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Manage saved sessions
    Sessions {
        #[command(subcommand)]
        command: SessionCommands,
    },
}

#[derive(Subcommand)]
enum SessionCommands {
    /// List saved sessions, most recent first
    List,
    /// Print the full transcript of a session
    Show { id: String },
    /// Delete a session
    Delete { id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            prompt,
            model,
            agent,
            directory,
            session,
        } => commands::run::run(&prompt, &model, &agent, &directory, session.as_deref()).await?,
        Commands::Chat {
            model,
            agent,
            directory,
            session,
        } => commands::chat::run(&model, &agent, &directory, session.as_deref()).await?,
        Commands::Sessions { command } => match command {
            SessionCommands::List => commands::sessions::list()?,
            SessionCommands::Show { id } => commands::sessions::show(&id)?,
            SessionCommands::Delete { id } => commands::sessions::delete(&id)?,
        },
    }

    Ok(())
}
