//! CLI argument parsing and command routing

use clap::{Args, Parser, Subcommand};

/// duoHome: a voice companion for young children
#[derive(Debug, Parser)]
#[command(name = "duohome")]
#[command(about = "Voice companion for young children", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Model profile to use instead of the configured default
    #[arg(short, long, global = true, env = "DUOHOME_MODEL")]
    pub model: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Talk with the assistant, one utterance per line
    Chat {
        /// Print the text a speech engine would receive
        #[arg(long)]
        spoken: bool,
    },

    /// Handle a single utterance and exit
    Ask {
        /// What the child said
        prompt: String,
    },

    /// Manage reward stars
    Stars(StarsArgs),

    /// Show configuration
    Config {
        /// Print the effective configuration
        #[arg(long)]
        list: bool,

        /// Print the config file location
        #[arg(long)]
        path: bool,

        /// Write a default config file if none exists
        #[arg(long)]
        init: bool,
    },

    /// Show version information
    Version,
}

#[derive(Debug, Args)]
#[command(group(clap::ArgGroup::new("action").args(["add", "remove", "report", "reset_week"])))]
pub struct StarsArgs {
    /// Give stars for today
    #[arg(long, value_name = "N")]
    pub add: Option<u32>,

    /// Take back stars from today
    #[arg(long, value_name = "N")]
    pub remove: Option<u32>,

    /// Show this week's stars
    #[arg(long)]
    pub report: bool,

    /// Clear this week's stars
    #[arg(long)]
    pub reset_week: bool,
}

impl Cli {
    /// Parse CLI arguments from environment
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_ask_with_model() {
        let cli = Cli::parse_from(["duohome", "-v", "--model", "local", "ask", "讲个故事"]);
        assert!(cli.verbose);
        assert_eq!(cli.model.as_deref(), Some("local"));
        assert!(matches!(cli.command, Some(Commands::Ask { ref prompt }) if prompt == "讲个故事"));
    }

    #[test]
    fn test_star_actions_are_exclusive() {
        let cli = Cli::parse_from(["duohome", "stars", "--add", "2"]);
        assert!(matches!(cli.command, Some(Commands::Stars(StarsArgs { add: Some(2), .. }))));

        assert!(Cli::try_parse_from(["duohome", "stars", "--add", "1", "--report"]).is_err());
    }

    #[test]
    fn test_parse_config_init() {
        let cli = Cli::parse_from(["duohome", "config", "--init"]);
        assert!(matches!(
            cli.command,
            Some(Commands::Config { init: true, list: false, path: false })
        ));
    }

    #[test]
    fn test_no_subcommand() {
        let cli = Cli::parse_from(["duohome"]);
        assert!(cli.command.is_none());
    }
}
