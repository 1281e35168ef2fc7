//! CLI interface for Muse
//!
//! This module provides the command-line interface using clap's derive API.
//! Commands map one-to-one onto registry actions and pipeline workflows.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Muse Content Engine
///
/// An AI content studio that plans, drafts, and art-directs branded
/// social-media content from your own post history.
#[derive(Parser, Debug)]
#[command(name = "muse")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Ingest a JSONL export of historical posts into the brand memory
    Ingest {
        /// Path to the JSONL file
        file: PathBuf,
    },

    /// Search the brand memory for posts relevant to a query
    Ask {
        /// The query text
        query: String,

        /// Number of results to return
        #[arg(short = 'n', long, default_value = "3")]
        results: usize,
    },

    /// Generate the brand voice report
    Report {
        /// Number of recent posts to sample
        #[arg(long)]
        samples: Option<usize>,
    },

    /// Generate a strategic content plan
    Plan {
        /// Time frame to plan for (day, week, month)
        #[arg(long = "for", value_name = "FRAME")]
        time_frame: Option<String>,

        /// Number of posts to plan instead of a time frame
        #[arg(short = 'n', long)]
        num: Option<usize>,

        /// Anchor date (YYYY-MM-DD); defaults to today
        #[arg(long)]
        date: Option<String>,

        /// Recent themes the plan should avoid repeating
        #[arg(long = "avoid", value_name = "THEME")]
        avoid_themes: Vec<String>,
    },

    /// Generate post ideas for a content pillar
    Ideas {
        /// The content pillar
        pillar: String,

        /// Number of ideas to generate
        #[arg(short = 'n', long, default_value = "3")]
        num: usize,

        /// Spark the brainstorm with a wildcard angle first
        #[arg(long)]
        wildcard: bool,
    },

    /// Develop a full post (caption + image prompts) from an idea
    Develop {
        /// The idea title
        title: String,

        /// The idea's content pillar
        pillar: String,

        /// Why the idea is relevant and valuable
        defense: String,

        /// The expected outcome of the post
        outcome: String,

        /// Number of content image prompts (the CTA slide is extra)
        #[arg(short = 'n', long = "num-images")]
        num_images: Option<usize>,
    },

    /// Autonomously plan and develop a full content calendar
    PlanAndDevelop {
        /// Time frame to plan for (day, week, month)
        #[arg(long = "for", value_name = "FRAME")]
        time_frame: Option<String>,

        /// Number of posts instead of a time frame
        #[arg(short = 'n', long)]
        num: Option<usize>,
    },

    /// Refine existing content against feedback
    Refine {
        /// What is being refined (e.g. caption, prompt)
        component: String,

        /// The original content
        original: String,

        /// The refinement feedback
        feedback: String,
    },

    /// Generate an unconventional creative angle for a pillar
    Wildcard {
        /// The content pillar
        pillar: String,
    },

    /// Hand a free-form request to the conductor
    Run {
        /// The request
        request: String,

        /// Session id (defaults to the active session)
        #[arg(long)]
        session: Option<String>,

        /// Resolution when the session is over its token budget:
        /// proceed, clear, or new
        #[arg(long, value_name = "CHOICE")]
        on_budget: Option<String>,
    },

    /// Manage conversation sessions
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
}

/// Session management actions
#[derive(Subcommand, Debug)]
pub enum SessionAction {
    /// Start a new session and make it active
    New {
        /// Session id; generated when omitted
        id: Option<String>,
    },

    /// Show the active session's history
    Show,

    /// Irreversibly clear the active session's history
    Clear,

    /// End the active session (history is retained)
    End,

    /// List all sessions
    List,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_command_parses_both_shapes() {
        let cli = Cli::parse_from(["muse", "plan", "--for", "week"]);
        match cli.command {
            Command::Plan {
                time_frame, num, ..
            } => {
                assert_eq!(time_frame.as_deref(), Some("week"));
                assert_eq!(num, None);
            }
            other => panic!("unexpected command {:?}", other),
        }

        let cli = Cli::parse_from(["muse", "plan", "-n", "4", "--avoid", "pricing"]);
        match cli.command {
            Command::Plan {
                num, avoid_themes, ..
            } => {
                assert_eq!(num, Some(4));
                assert_eq!(avoid_themes, vec!["pricing"]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_run_command_with_budget_choice() {
        let cli = Cli::parse_from([
            "muse",
            "run",
            "give me three ideas",
            "--session",
            "studio",
            "--on-budget",
            "clear",
        ]);
        match cli.command {
            Command::Run {
                request,
                session,
                on_budget,
            } => {
                assert_eq!(request, "give me three ideas");
                assert_eq!(session.as_deref(), Some("studio"));
                assert_eq!(on_budget.as_deref(), Some("clear"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_session_subcommands_parse() {
        let cli = Cli::parse_from(["muse", "session", "new", "studio-chat"]);
        match cli.command {
            Command::Session {
                action: SessionAction::New { id },
            } => assert_eq!(id.as_deref(), Some("studio-chat")),
            other => panic!("unexpected command {:?}", other),
        }

        let cli = Cli::parse_from(["muse", "session", "list"]);
        assert!(matches!(
            cli.command,
            Command::Session {
                action: SessionAction::List
            }
        ));
    }
}
