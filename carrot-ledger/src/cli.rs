use carrot_ledger::ledger::Period;
use carrot_shared::auth::Actor;
use carrot_shared::domain::{ChildId, TaskId, TaskStatus};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

const HELP_EPILOG: &str = r#"Options can also be provided via environment variables:
  CONFIG_PATH (default: ./config.yaml, overridden by --config)
  DB_PATH     (default: data/carrot.db or config db_path, overridden by --db)
  RUST_LOG    (default: warn)

Every command runs as a parent unless --as child:<id> is given.
Use `session` to keep timers and delayed streak bonuses running between
commands; one-shot commands wait for scheduled bonuses before exiting.
"#;

#[derive(Debug, Parser)]
#[command(
    name = "carrot",
    version,
    about = "Household tasks that earn game time",
    long_about = None,
    after_long_help = HELP_EPILOG,
)]
pub struct Cli {
    /// Acting user: `parent` or `child:<id>`
    #[arg(long = "as", global = true, value_name = "ACTOR", default_value = "parent")]
    pub actor: Actor,
    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,
    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// SQLite database path
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,
    /// Keep everything in memory; nothing is loaded or saved
    #[arg(long, global = true, conflicts_with = "db")]
    pub ephemeral: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    #[command(flatten)]
    Ledger(LedgerCommand),
    /// Interactive session; reads commands from stdin while timers run
    Session,
    /// List stored snapshots or prune old ones
    Snapshots {
        /// Keep only the newest N snapshots
        #[arg(long, value_name = "N")]
        prune: Option<u32>,
    },
    /// Write a commented example config
    InitConfig {
        #[arg(long, default_value = "config.yaml")]
        path: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Commands shared by the command line and the interactive session.
#[derive(Debug, Clone, Subcommand)]
pub enum LedgerCommand {
    /// Manage children
    #[command(subcommand)]
    Child(ChildCommand),
    /// Manage tasks
    #[command(subcommand)]
    Task(TaskCommand),
    /// Change a child's game-time balance
    #[command(subcommand)]
    Time(TimeCommand),
    /// Scheduled streak bonuses
    #[command(subcommand)]
    Bonus(BonusCommand),
    /// Daily (or weekly) summary for a child
    Report {
        child: ChildId,
        #[arg(long)]
        weekly: bool,
    },
    /// Tasks waiting for approval
    Pending {
        #[arg(long)]
        child: Option<ChildId>,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum ChildCommand {
    /// Add a child; the id is derived from the name unless given
    Add {
        name: String,
        #[arg(long)]
        id: Option<ChildId>,
        #[arg(long)]
        age: Option<u8>,
        #[arg(long)]
        avatar: Option<String>,
        /// Minutes per day, 0 for no limit
        #[arg(long)]
        daily_limit: Option<u32>,
    },
    List,
    Show {
        id: ChildId,
    },
    /// Change the daily limit or lock state
    Settings {
        id: ChildId,
        #[arg(long)]
        daily_limit: Option<u32>,
        #[arg(long)]
        lock: bool,
        #[arg(long, conflicts_with = "lock")]
        unlock: bool,
    },
    ResetStreak {
        id: ChildId,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum TaskCommand {
    /// Assign a task to a child
    Create {
        child: ChildId,
        title: String,
        #[arg(long)]
        description: Option<String>,
        /// Earn game time for the minutes spent (default is a fixed credit)
        #[arg(long, conflicts_with = "credit")]
        timed: bool,
        /// Fixed credit in minutes (default from config)
        #[arg(long)]
        credit: Option<u32>,
    },
    List {
        #[arg(long)]
        child: Option<ChildId>,
        #[arg(long)]
        status: Option<TaskStatus>,
        /// today, yesterday or this-week
        #[arg(long)]
        period: Option<Period>,
        /// Hide approved and rejected tasks
        #[arg(long)]
        open: bool,
    },
    Show {
        id: TaskId,
    },
    /// Start the timer of a time-tracked task
    Start {
        id: TaskId,
    },
    Pause {
        id: TaskId,
    },
    /// Stop the timer and submit the task
    Stop {
        id: TaskId,
    },
    /// Submit a task; timed tasks are stopped first
    Complete {
        id: TaskId,
        /// Record this many seconds instead of the measured time (parents only)
        #[arg(long)]
        elapsed: Option<u64>,
    },
    Approve {
        id: TaskId,
    },
    Reject {
        id: TaskId,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum TimeCommand {
    /// Add or remove minutes (balance never drops below zero)
    Adjust {
        child: ChildId,
        #[arg(allow_hyphen_values = true)]
        delta: i64,
    },
    /// Use game time
    Spend {
        child: ChildId,
        minutes: u32,
        /// Only check whether spending is allowed
        #[arg(long)]
        check: bool,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum BonusCommand {
    List,
    Cancel { task: TaskId },
}

/// One line typed into `carrot session`.
#[derive(Debug, Parser)]
#[command(no_binary_name = true, disable_version_flag = true)]
pub struct SessionLine {
    #[command(subcommand)]
    pub command: SessionCommand,
}

#[derive(Debug, Subcommand)]
pub enum SessionCommand {
    #[command(flatten)]
    Ledger(LedgerCommand),
    /// Switch the acting user
    As { actor: Actor },
    /// Leave the session
    #[command(visible_alias = "exit")]
    Quit,
}
