use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use punt_core::Niveau;
use punt_gateway::DEFAULT_API_BASE;

mod commands;
mod display;

/// PUNT! writing feedback engine
#[derive(Parser)]
#[command(name = "punt", version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Directory holding assignments, sessions and the AI configuration
    #[arg(long, global = true, env = "PUNT_STORE", default_value = ".punt")]
    pub store: PathBuf,

    /// Chat-completions API base URL
    #[arg(long, global = true, env = "PUNT_API_BASE", default_value = DEFAULT_API_BASE)]
    pub api_base: String,

    /// API key (falls back to the stored AI configuration)
    #[arg(long, global = true, env = "OPENROUTER_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Model name (falls back to the stored AI configuration)
    #[arg(long, global = true, env = "PUNT_MODEL")]
    pub model: Option<String>,

    /// Upper bound on each generation call
    #[arg(long, global = true, default_value_t = 60)]
    pub timeout_secs: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Save or check the generation service credentials
    AiConfig {
        #[command(subcommand)]
        action: AiConfigAction,
    },

    /// List the bundled rubric criteria for a niveau
    Rubric {
        #[arg(long)]
        level: Niveau,
    },

    /// Ask for 2-3 criteria tailored to an assignment text
    Suggest {
        #[arg(long)]
        level: Niveau,
        /// Assignment text
        assignment: String,
    },

    /// Publish an assignment (JSON file) and print one code per student
    Publish {
        config: PathBuf,
        #[arg(long, default_value_t = 1)]
        students: usize,
    },

    /// Update a session's text and request a feedback round
    Feedback {
        code: String,
        /// Read the new text from this file ("-" for stdin)
        #[arg(long)]
        text: Option<PathBuf>,
        /// Record the new text as pasted
        #[arg(long)]
        pasted: bool,
    },

    /// Accept or reject one feedback item
    Review {
        code: String,
        round: u8,
        item: String,
        decision: Decision,
    },

    /// Show a session's state
    Status {
        code: String,
        /// Print the raw session JSON
        #[arg(long)]
        json: bool,
    },

    /// Write the teacher report as HTML
    Export {
        code: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum AiConfigAction {
    /// Store the API key and model
    Set {
        #[arg(long)]
        api_key: String,
        #[arg(long)]
        model: String,
    },
    /// Report whether a configuration is stored
    Check,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Decision {
    Accept,
    Reject,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    tracing::debug!("punt v{}", env!("CARGO_PKG_VERSION"));
    let g = &cli.global;

    match cli.command {
        Commands::AiConfig { action } => match action {
            AiConfigAction::Set { api_key, model } => commands::ai_config_set(g, &api_key, &model),
            AiConfigAction::Check => commands::ai_config_check(g),
        },
        Commands::Rubric { level } => commands::rubric(level),
        Commands::Suggest { level, assignment } => {
            commands::suggest(g, level, &assignment).await
        }
        Commands::Publish { config, students } => commands::publish(g, &config, students),
        Commands::Feedback { code, text, pasted } => {
            commands::feedback(g, &code, text.as_deref(), pasted).await
        }
        Commands::Review {
            code,
            round,
            item,
            decision,
        } => commands::review(g, &code, round, &item, decision),
        Commands::Status { code, json } => commands::status(g, &code, json),
        Commands::Export { code, out } => commands::export(g, &code, out.as_deref()).await,
    }
}
