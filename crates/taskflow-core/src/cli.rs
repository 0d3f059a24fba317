use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::task::{Priority, Status};

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

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
    name = "taskflow",
    version,
    about = "TaskFlow: tasks and categories synced with the TaskFlow server",
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

    #[arg(long = "taskflowrc", global = true)]
    pub taskflowrc: Option<PathBuf>,

    #[arg(long = "data", global = true)]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Sign in and remember the session.
    Login(LoginArgs),
    /// Create an account and sign in.
    Signup(SignupArgs),
    /// Forget the saved session.
    Logout,
    /// Show the signed-in user.
    Whoami,
    /// Show tasks, highest priority first.
    List(ListArgs),
    Add(AddArgs),
    Edit(EditArgs),
    /// Flip a task between pending and completed.
    Toggle { task: String },
    Delete { task: String },
    /// List categories with their task counts.
    Categories,
    #[command(subcommand)]
    Category(CategoryCommand),
    /// Change the account password.
    Passwd(PasswdArgs),
}

#[derive(Subcommand, Debug, Clone)]
pub enum CategoryCommand {
    Add { name: String },
    /// Delete a category and every task filed under it.
    Delete { category: String },
}

#[derive(Args, Debug, Clone)]
pub struct LoginArgs {
    pub email: String,
    /// Read from stdin when omitted.
    #[arg(long)]
    pub password: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct SignupArgs {
    pub name: String,
    pub email: String,
    #[arg(long)]
    pub password: Option<String>,
    /// Defaults to the password itself.
    #[arg(long)]
    pub confirm: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    #[arg(
        long = "status",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<Status>()),
        action = ArgAction::Append
    )]
    pub status: Vec<Status>,

    #[arg(
        long = "priority",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<Priority>()),
        action = ArgAction::Append
    )]
    pub priority: Vec<Priority>,

    #[arg(long, short = 's')]
    pub search: Option<String>,

    /// Category id or name.
    #[arg(long, short = 'c')]
    pub category: Option<String>,

    #[arg(long)]
    pub show_completed: bool,
}

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    #[arg(required = true, num_args = 1..)]
    pub title: Vec<String>,

    #[arg(
        long,
        short = 'p',
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<Priority>())
    )]
    pub priority: Option<Priority>,

    /// `today`, `tomorrow` or YYYY-MM-DD.
    #[arg(long, short = 'd')]
    pub due: Option<String>,

    /// Category id or name; the first category when omitted.
    #[arg(long, short = 'c')]
    pub category: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct EditArgs {
    pub task: String,

    #[arg(long, short = 't')]
    pub title: Option<String>,

    #[arg(
        long,
        short = 'p',
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<Priority>())
    )]
    pub priority: Option<Priority>,

    #[arg(long, short = 'd')]
    pub due: Option<String>,

    #[arg(long, short = 'c')]
    pub category: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct PasswdArgs {
    #[arg(long)]
    pub old: Option<String>,
    #[arg(long)]
    pub new: Option<String>,
    /// Defaults to the new password.
    #[arg(long)]
    pub confirm: Option<String>,
}

impl Command {
    /// Commands that work without a saved session.
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Login(_) | Self::Signup(_) | Self::Logout)
    }
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
        .with_thread_ids(true)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls positional `rc.key=value` (or `rc.key:value`) overrides out of the
/// argument list before clap sees it.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = if let Some((k, v)) = rest.split_once('=') {
                Some((format!("rc.{k}"), v.to_string()))
            } else if let Some((k, v)) = rest.split_once(':') {
                Some((format!("rc.{k}"), v.to_string()))
            } else {
                None
            };

            if let Some((k, v)) = parsed {
                debug!(key = %k, "captured positional rc override");
                overrides.push((k, v));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}
