use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "gitrecap",
    about = "Monthly GitHub activity recap: sync commits, compute statistics, summarize"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the HTTP API on 127.0.0.1:<api_port>.
    Serve,
    /// Fetch one repository's commits for a month and store them.
    Sync {
        owner: String,
        repo: String,
        year: i32,
        month: u32,
        /// Falls back to GITRECAP_GITHUB_TOKEN, then to github.token in the config.
        #[arg(long)]
        token: Option<String>,
    },
    /// Print the monthly activity statistics from stored commits.
    Stats {
        owner: String,
        year: i32,
        month: u32,
        /// Last day considered by the longest gap; defaults to the end of the month.
        #[arg(long)]
        cutoff_day: Option<u32>,
    },
    /// Generate and store per-repository recaps for a month.
    Summarize { owner: String, year: i32, month: u32 },
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    Status,
    Doctor,
    Ai {
        #[command(subcommand)]
        command: AiCommands,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    Set { key: String, value: String },
    Get { key: String },
}

#[derive(Debug, Subcommand)]
pub enum AiCommands {
    Test {
        #[arg(long)]
        key: Option<String>,
        #[arg(long)]
        base_url: Option<String>,
        #[arg(long)]
        model: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::{Cli, Commands};
    use clap::Parser;

    #[test]
    fn sync_arguments_parse() {
        let cli = Cli::try_parse_from([
            "gitrecap", "sync", "octo", "recap", "2025", "1", "--token", "ghp_x",
        ])
        .expect("parsed");

        match cli.command {
            Commands::Sync {
                owner,
                repo,
                year,
                month,
                token,
            } => {
                assert_eq!((owner.as_str(), repo.as_str()), ("octo", "recap"));
                assert_eq!((year, month), (2025, 1));
                assert_eq!(token.as_deref(), Some("ghp_x"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn stats_cutoff_is_optional() {
        let cli = Cli::try_parse_from(["gitrecap", "stats", "octo", "2025", "2", "--cutoff-day", "14"])
            .expect("parsed");

        assert!(matches!(
            cli.command,
            Commands::Stats {
                cutoff_day: Some(14),
                ..
            }
        ));
    }
}
