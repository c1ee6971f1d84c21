//! CLI module for delve
//!
//! Provides command-line interface parsing and the command handlers for the
//! `delve` binary. Uses clap for argument parsing and owo-colors for colored
//! terminal output.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// delve - expand research seeds into structured findings
///
/// Queue URLs, ideas and questions, let a tool-using agent research them,
/// then digest, archive and evaluate the results.
#[derive(Parser, Debug)]
#[command(
    name = "delve",
    version,
    about = "Expand research seeds into structured findings",
    after_help = "EXAMPLES:\n    \
                  delve add https://example.com/post -n \"rare practitioner detail\"\n    \
                  delve run                     # Expand every pending seed\n    \
                  delve digest --all            # Digest and archive all expansions\n    \
                  delve reliability 20240101_000000 -k 5"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "delve.toml", global = true)]
    pub config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Add a URL, idea or question to the inbox
    Add {
        /// URL or idea/question text
        content: String,

        /// Why you found this interesting
        #[arg(short, long)]
        note: Option<String>,

        /// File with the source text for gated content ('-' reads stdin)
        #[arg(short, long)]
        file: Option<String>,

        /// Treat non-URL content as a question rather than an idea
        #[arg(short, long)]
        question: bool,
    },

    /// Expand every pending inbox seed
    Run,

    /// Build a digest from expansions, then archive them
    Digest {
        /// Include all expansions, not just today's
        #[arg(long)]
        all: bool,

        /// Keep expansions and inbox records after the digest
        #[arg(long)]
        no_archive: bool,

        /// Score the digest with the model-graded digest evaluators
        #[arg(long)]
        judged: bool,
    },

    /// Show inbox contents and their status
    Show,

    /// List archive topics
    Topics,

    /// Score pending expansions
    Eval {
        /// Evaluate a single expansion by id
        #[arg(long)]
        id: Option<String>,

        /// Also run the model-graded evaluators (costs API calls)
        #[arg(long)]
        judged: bool,
    },

    /// Expand one seed k times and report pass@k / pass^k
    Reliability {
        /// Inbox id of the seed
        id: String,

        /// Number of runs (defaults to eval.k)
        #[arg(short)]
        k: Option<usize>,

        /// Score threshold (defaults to eval.threshold)
        #[arg(long)]
        threshold: Option<f64>,

        /// Include the model-graded evaluators in each run's score
        #[arg(long)]
        judged: bool,
    },

    /// List recorded trajectories or show one
    Trajectories {
        /// Show the events of one run
        #[arg(long)]
        run_id: Option<String>,
    },
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_add() {
        let cli = Cli::try_parse_from([
            "delve",
            "--no-color",
            "add",
            "https://example.com",
            "-n",
            "why",
            "-f",
            "-",
        ])
        .unwrap();
        assert!(cli.no_color);
        assert_eq!(cli.config, PathBuf::from("delve.toml"));
        match cli.command {
            Commands::Add { content, note, file, question } => {
                assert_eq!(content, "https://example.com");
                assert_eq!(note.as_deref(), Some("why"));
                assert_eq!(file.as_deref(), Some("-"));
                assert!(!question);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_reliability() {
        let cli = Cli::try_parse_from(["delve", "reliability", "20240101_000000", "-k", "5", "--threshold", "0.8"]).unwrap();
        match cli.command {
            Commands::Reliability { id, k, threshold, judged } => {
                assert_eq!(id, "20240101_000000");
                assert_eq!(k, Some(5));
                assert_eq!(threshold, Some(0.8));
                assert!(!judged);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["delve", "digest", "--all", "--verbose", "-c", "other.toml"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, PathBuf::from("other.toml"));
        assert!(matches!(
            cli.command,
            Commands::Digest { all: true, no_archive: false, judged: false }
        ));
    }

    #[test]
    fn test_digest_judged_flag() {
        let cli = Cli::try_parse_from(["delve", "digest", "--judged", "--no-archive"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Digest { all: false, no_archive: true, judged: true }
        ));
    }

    #[test]
    fn test_command_required() {
        assert!(Cli::try_parse_from(["delve"]).is_err());
    }
}
