use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "chorus")]
#[command(version)]
#[command(
    about = "Send one prompt to several AI models and compare the answers side by side",
    long_about = None
)]
pub struct Cli {
    /// Model to query; repeat to fan out (gpt, claude, gemini, deepseek)
    #[arg(short, long = "model", value_name = "ID")]
    pub models: Vec<String>,

    /// OpenRouter API key (overrides config and environment)
    #[arg(long, value_name = "KEY")]
    pub api_key: Option<String>,

    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Show responses in full as soon as they arrive
    #[arg(long)]
    pub no_reveal: bool,

    /// Non-interactive prompt to execute
    #[arg(short, long)]
    pub prompt: Option<String>,

    /// Output format for non-interactive mode
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, requires = "prompt")]
    pub output_format: OutputFormat,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize configuration
    Init,
    /// List available models
    Models {
        /// Filter by category (all, pro, free, openai, anthropic, google)
        #[arg(short, long)]
        category: Option<String>,
        /// Match against name, provider and description
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Start a chat session (default)
    Chat,
    /// Browse saved prompt history
    History {
        #[command(subcommand)]
        action: Option<HistoryAction>,
    },
    /// Sign in to the hosted history backend
    Login {
        email: String,
        /// Password (prompted for when omitted)
        #[arg(long, env = "CHORUS_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        /// Create the account first
        #[arg(long)]
        sign_up: bool,
    },
    /// Sign out of the hosted history backend
    Logout,
    /// Show the signed-in identity
    Whoami,
    /// Check configuration and credentials
    Status,
    /// Show version information
    Version,
}

#[derive(Subcommand, Debug, Clone)]
pub enum HistoryAction {
    /// List saved prompts, newest first
    List {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Print one saved prompt with its responses
    Show { id: String },
    /// Delete a saved prompt
    Delete { id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Plain text output
    Text,
    /// JSON structured output
    Json,
    /// Markdown formatted output
    Markdown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeatable_models() {
        let cli = Cli::try_parse_from(["chorus", "-m", "gpt", "--model", "claude", "-p", "hi"])
            .unwrap();
        assert_eq!(cli.models, vec!["gpt", "claude"]);
        assert_eq!(cli.prompt.as_deref(), Some("hi"));
        assert_eq!(cli.output_format, OutputFormat::Text);
    }

    #[test]
    fn test_output_format_requires_prompt() {
        assert!(Cli::try_parse_from(["chorus", "--output-format", "json"]).is_err());
        let cli = Cli::try_parse_from(["chorus", "-p", "hi", "--output-format", "json"]).unwrap();
        assert_eq!(cli.output_format, OutputFormat::Json);
    }

    #[test]
    fn test_history_subcommands() {
        let cli = Cli::try_parse_from(["chorus", "history", "delete", "42"]).unwrap();
        match cli.command {
            Some(Commands::History {
                action: Some(HistoryAction::Delete { id }),
            }) => assert_eq!(id, "42"),
            other => panic!("unexpected parse: {:?}", other),
        }

        let cli = Cli::try_parse_from(["chorus", "history"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::History { action: None })));
    }

    #[test]
    fn test_login_flags() {
        let cli =
            Cli::try_parse_from(["chorus", "login", "a@b.c", "--password", "pw", "--sign-up"])
                .unwrap();
        match cli.command {
            Some(Commands::Login {
                email,
                password,
                sign_up,
            }) => {
                assert_eq!(email, "a@b.c");
                assert_eq!(password.as_deref(), Some("pw"));
                assert!(sign_up);
            }
            other => panic!("unexpected parse: {:?}", other),
        }
    }
}
