//! CLI argument definitions for Capstan.

use clap::{Parser, Subcommand};

/// Capstan - a workflow orchestrator for AI coding agents and humans.
///
/// Tickets move backlog -> ready -> in_progress -> ai_review ->
/// human_review -> done. Start with `cap system init`, then `cap ticket
/// create` and `cap work start`.
#[derive(Parser, Debug)]
#[command(name = "cap")]
#[command(author, version, about = "A CLI workflow orchestrator for AI coding agents", long_about = None)]
pub struct Cli {
    /// Output in human-readable format instead of JSON
    #[arg(short = 'H', long = "human", global = true)]
    pub human_readable: bool,

    /// Run as if cap was started in <path> instead of the current directory.
    /// Can also be set via CAP_REPO environment variable.
    #[arg(short = 'C', long = "repo", global = true, env = "CAP_REPO")]
    pub repo_path: Option<std::path::PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ticket management commands
    Ticket {
        #[command(subcommand)]
        command: TicketCommands,
    },

    /// Epic management commands
    Epic {
        #[command(subcommand)]
        command: EpicCommands,
    },

    /// Workflow transitions (start and complete implementation work)
    Work {
        #[command(subcommand)]
        command: WorkCommands,
    },

    /// Review findings and the AI-review gate
    Review {
        #[command(subcommand)]
        command: ReviewCommands,
    },

    /// Conversation session auditing
    Session {
        #[command(subcommand)]
        command: SessionCommands,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// System administration commands
    System {
        #[command(subcommand)]
        command: SystemCommands,
    },
}

/// Ticket subcommands
#[derive(Subcommand, Debug)]
pub enum TicketCommands {
    /// Create a new ticket in the backlog
    Create {
        /// Ticket title
        title: String,

        /// Detailed description
        #[arg(short = 'd', long)]
        description: Option<String>,

        /// Priority level (0-4, lower is higher priority)
        #[arg(short = 'p', long, default_value = "2")]
        priority: u8,

        /// Epic this ticket belongs to (id or unique prefix)
        #[arg(short = 'e', long)]
        epic: Option<String>,

        /// Tags for categorization (repeatable)
        #[arg(short = 't', long = "tag")]
        tags: Vec<String>,
    },

    /// List tickets
    List {
        /// Filter by status (backlog, ready, in_progress, ai_review, human_review, done)
        #[arg(short = 's', long)]
        status: Option<String>,

        /// Filter by epic (id or unique prefix)
        #[arg(short = 'e', long)]
        epic: Option<String>,
    },

    /// Show a ticket with its workflow state, findings, and sessions
    Show {
        /// Ticket id or unique prefix
        id: String,
    },

    /// Update a ticket's fields
    Update {
        /// Ticket id or unique prefix
        id: String,

        /// New title
        #[arg(long)]
        title: Option<String>,

        /// New description
        #[arg(short = 'd', long)]
        description: Option<String>,

        /// New priority (0-4)
        #[arg(short = 'p', long)]
        priority: Option<u8>,

        /// New position within the status column
        #[arg(long)]
        position: Option<i64>,

        /// Groom the ticket to 'backlog' or 'ready' (workflow statuses are
        /// reached through work/review commands, never set directly)
        #[arg(short = 's', long)]
        status: Option<String>,
    },

    /// Approve a ticket in human review, marking it done
    Approve {
        /// Ticket id or unique prefix
        id: String,
    },

    /// Add a subtask to a ticket
    SubtaskAdd {
        /// Ticket id or unique prefix
        id: String,

        /// Subtask title
        title: String,
    },

    /// Mark a subtask done (or reopen it with --undone)
    SubtaskDone {
        /// Ticket id or unique prefix
        id: String,

        /// Subtask position
        position: i64,

        /// Reopen instead of completing
        #[arg(long)]
        undone: bool,
    },

    /// Attach a file reference to a ticket
    Attach {
        /// Ticket id or unique prefix
        id: String,

        /// Attachment name
        name: String,

        /// Attachment path
        path: String,
    },
}

/// Epic subcommands
#[derive(Subcommand, Debug)]
pub enum EpicCommands {
    /// Create a new epic
    Create {
        /// Epic title
        title: String,

        /// Detailed description
        #[arg(short = 'd', long)]
        description: Option<String>,

        /// Branch isolation mode: shared-branch or worktree
        #[arg(long, default_value = "shared-branch")]
        isolation: String,
    },

    /// List epics with derived progress
    List,

    /// Show an epic and its workflow state
    Show {
        /// Epic id or unique prefix
        id: String,
    },

    /// Resolve or create the epic's shared branch; optionally open a draft PR
    Start {
        /// Epic id or unique prefix
        id: String,

        /// Push the branch and open a draft pull request
        #[arg(long)]
        create_pr: bool,
    },
}

/// Work subcommands
#[derive(Subcommand, Debug)]
pub enum WorkCommands {
    /// Start work on a ticket: resolve a branch and move it to in_progress
    Start {
        /// Ticket id or unique prefix
        id: String,
    },

    /// Complete implementation work: move the ticket to ai_review
    Complete {
        /// Ticket id or unique prefix
        id: String,

        /// Summary of what was done
        #[arg(short = 'm', long)]
        summary: Option<String>,
    },
}

/// Review subcommands
#[derive(Subcommand, Debug)]
pub enum ReviewCommands {
    /// Submit a review finding against a ticket
    Submit {
        /// Ticket id or unique prefix
        id: String,

        /// Finding description
        description: String,

        /// Severity: critical, major, minor, suggestion
        #[arg(short = 's', long)]
        severity: String,

        /// Category (e.g., correctness, security, style)
        #[arg(short = 'c', long, default_value = "general")]
        category: String,

        /// Reviewer or agent identifier
        #[arg(short = 'r', long, default_value = "reviewer")]
        reviewer: String,
    },

    /// Mark a finding as fixed
    Fix {
        /// Finding id or unique prefix
        id: String,

        /// How it was fixed
        #[arg(short = 'm', long)]
        fix_description: Option<String>,
    },

    /// Check whether the ticket may advance past AI review
    Check {
        /// Ticket id or unique prefix
        id: String,
    },

    /// List all findings for a ticket
    List {
        /// Ticket id or unique prefix
        id: String,
    },

    /// Record a manual demo script and advance the ticket to human_review
    Demo {
        /// Ticket id or unique prefix
        id: String,

        /// Manual verification step (repeat at least three times)
        #[arg(short = 's', long = "step")]
        steps: Vec<String>,
    },
}

/// Session subcommands
#[derive(Subcommand, Debug)]
pub enum SessionCommands {
    /// Open an audit session for a ticket (ends stragglers first)
    Start {
        /// Ticket id or unique prefix
        id: String,

        /// Environment label
        #[arg(short = 'e', long, default_value = "terminal")]
        environment: String,
    },

    /// End the open session(s) for a ticket
    End {
        /// Ticket id or unique prefix
        id: String,
    },
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Get a configuration value
    Get {
        /// Configuration key
        key: String,
    },

    /// Set a configuration value
    Set {
        /// Configuration key
        key: String,

        /// Configuration value
        value: String,
    },
}

/// System subcommands
#[derive(Subcommand, Debug)]
pub enum SystemCommands {
    /// Initialize capstan for this repository
    Init {
        /// Project name (defaults to the repository directory name)
        #[arg(long)]
        name: Option<String>,
    },
}
