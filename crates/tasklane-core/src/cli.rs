use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use chrono::NaiveDate;
use clap::{ArgAction, Parser, Subcommand};
use tasklane_shared::{TaskPriority, TaskStatus};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "tasklane",
    version,
    about = "Tasklane: terminal client for a todo-list API",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append,
        global = true
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "config", global = true)]
    pub config: Option<PathBuf>,

    #[arg(long = "data", global = true)]
    pub data: Option<PathBuf>,

    #[arg(long = "api-url", global = true)]
    pub api_url: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Sign in and store the session credential.
    Login {
        #[arg(long)]
        email: String,
        /// Falls back to $TASKLANE_PASSWORD.
        #[arg(long)]
        password: Option<String>,
    },
    Register {
        #[arg(long)]
        email: String,
        #[arg(long = "user-name")]
        user_name: String,
        #[arg(long)]
        password: Option<String>,
    },
    Logout,
    Whoami,
    /// Show one page of tasks, pending first.
    List {
        #[arg(long)]
        status: Option<TaskStatus>,
        /// 1-based page number.
        #[arg(long, default_value_t = 1)]
        page: usize,
    },
    Show {
        id: String,
    },
    Add {
        title: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, value_parser = parse_date)]
        due: Option<NaiveDate>,
        #[arg(long)]
        priority: Option<TaskPriority>,
        #[arg(long)]
        completed: bool,
    },
    Edit {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long, conflicts_with = "clear_description")]
        description: Option<String>,
        #[arg(long = "clear-description")]
        clear_description: bool,
        #[arg(long, value_parser = parse_date, conflicts_with = "clear_due")]
        due: Option<NaiveDate>,
        #[arg(long = "clear-due")]
        clear_due: bool,
        #[arg(long)]
        priority: Option<TaskPriority>,
        #[arg(long)]
        status: Option<TaskStatus>,
    },
    /// Flip a task between pending and completed.
    Toggle {
        id: String,
    },
    Delete {
        id: String,
    },
    /// Show or change the display theme.
    Theme {
        #[arg(default_value = "show")]
        action: ThemeAction,
    },
    /// Interactive dashboard with paging and reordering.
    Shell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ThemeAction {
    Show,
    Toggle,
    Dark,
    Light,
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|err| format!("expected YYYY-MM-DD: {err}"))
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = GlobalCli::parse_from([
            "tasklane",
            "list",
            "--status",
            "pending",
            "--page",
            "2",
            "-vv",
            "--rc",
            "page.size=3",
        ]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.rc_overrides.len(), 1);
        assert_eq!(cli.rc_overrides[0].key, "page.size");
        match cli.command {
            Some(Command::List { status, page }) => {
                assert_eq!(status, Some(TaskStatus::Pending));
                assert_eq!(page, 2);
            }
            other => panic!("expected list, got {other:?}"),
        }
    }

    #[test]
    fn add_parses_due_date_and_priority() {
        let cli = GlobalCli::parse_from([
            "tasklane",
            "add",
            "Buy milk",
            "--due",
            "2025-01-31",
            "--priority",
            "high",
        ]);
        match cli.command {
            Some(Command::Add {
                title,
                due,
                priority,
                completed,
                ..
            }) => {
                assert_eq!(title, "Buy milk");
                assert_eq!(due, NaiveDate::from_ymd_opt(2025, 1, 31));
                assert_eq!(priority, Some(TaskPriority::High));
                assert!(!completed);
            }
            other => panic!("expected add, got {other:?}"),
        }
    }

    #[test]
    fn edit_accepts_clear_flags_but_not_alongside_values() {
        let cli = GlobalCli::parse_from(["tasklane", "edit", "3", "--clear-due", "--clear-description"]);
        match cli.command {
            Some(Command::Edit {
                id,
                clear_due,
                clear_description,
                due,
                ..
            }) => {
                assert_eq!(id, "3");
                assert!(clear_due);
                assert!(clear_description);
                assert_eq!(due, None);
            }
            other => panic!("expected edit, got {other:?}"),
        }

        assert!(
            GlobalCli::try_parse_from(["tasklane", "edit", "3", "--due", "2025-01-01", "--clear-due"])
                .is_err()
        );
    }

    #[test]
    fn rejects_malformed_rc_override() {
        assert!(GlobalCli::try_parse_from(["tasklane", "--rc", "nonsense"]).is_err());
    }
}
