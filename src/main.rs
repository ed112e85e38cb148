//! Capstan CLI - a workflow orchestrator for AI coding agents and humans.

use capstan::action_log;
use capstan::cli::{
    Cli, Commands, ConfigCommands, EpicCommands, ReviewCommands, SessionCommands, SystemCommands,
    TicketCommands, WorkCommands,
};
use capstan::commands::{self, output};
use capstan::lock::{LockState, ProcessLock};
use capstan::storage::{self, Storage};
use clap::Parser;
use std::env;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Instant;

fn main() {
    let cli = Cli::parse();
    let human = cli.human_readable;

    // Determine repo path: --repo flag > CAP_REPO env > auto-detect git root > cwd
    let repo_path = resolve_repo_path(cli.repo_path, human);

    // Serialize command for logging
    let (cmd_name, args_json) = serialize_command(&cli.command);

    // Advisory lock against a second orchestrator process on the same store.
    // A live foreign holder warns; it never blocks (the store tolerates
    // concurrent readers). Held for the duration of the command.
    let _lock = acquire_lock(&repo_path);

    // Start timing
    let start = Instant::now();

    // Execute command
    let result = run_command(cli.command, &repo_path, human);

    // Calculate duration
    let duration = start.elapsed().as_millis() as u64;

    // Determine success/error
    let (success, error) = match &result {
        Ok(_) => (true, None),
        Err(e) => (false, Some(e.to_string())),
    };

    // Log the action (silently fails if logging is disabled or encounters errors)
    let _ = action_log::log_action(&repo_path, &cmd_name, args_json, success, error, duration);

    // Handle result
    if let Err(e) = result {
        if human {
            eprintln!("Error: {}", e);
        } else {
            let err = serde_json::json!({ "error": e.to_string() });
            eprintln!("{}", err);
        }
        process::exit(1);
    }
}

/// Resolve the repository path based on explicit flag, environment variable,
/// or auto-detection.
///
/// When no explicit path is given, we auto-detect the git root from the
/// current directory so storage is consistent regardless of which
/// subdirectory the user runs from.
fn resolve_repo_path(explicit_path: Option<PathBuf>, human: bool) -> PathBuf {
    match explicit_path {
        Some(path) => {
            if !path.exists() {
                if human {
                    eprintln!(
                        "Error: Specified repo path does not exist: {}",
                        path.display()
                    );
                } else {
                    let err = serde_json::json!({
                        "error": format!("Specified repo path does not exist: {}", path.display())
                    });
                    eprintln!("{}", err);
                }
                process::exit(1);
            }
            path
        }
        None => {
            let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            storage::find_git_root(&cwd).unwrap_or(cwd)
        }
    }
}

fn acquire_lock(repo_path: &Path) -> Option<ProcessLock> {
    // Only meaningful once storage exists; `system init` runs unlocked.
    if !Storage::exists(repo_path).unwrap_or(false) {
        return None;
    }
    let data_root = storage::get_storage_dir(repo_path).ok()?;
    match ProcessLock::acquire(&data_root, "cli") {
        Ok(lock) => {
            if let LockState::HeldByOther(info) = &lock.state {
                eprintln!(
                    "Warning: another {} process (pid {}) holds the orchestrator lock",
                    info.kind, info.pid
                );
            }
            Some(lock)
        }
        Err(e) => {
            eprintln!("Warning: could not acquire process lock: {}", e);
            None
        }
    }
}

/// Build a (command name, loggable args) pair for the action log.
fn serialize_command(command: &Commands) -> (String, serde_json::Value) {
    match command {
        Commands::Ticket { command } => match command {
            TicketCommands::Create { title, .. } => (
                "ticket create".to_string(),
                serde_json::json!({ "title": title }),
            ),
            TicketCommands::List { .. } => ("ticket list".to_string(), serde_json::json!({})),
            TicketCommands::Show { id } => {
                ("ticket show".to_string(), serde_json::json!({ "id": id }))
            }
            TicketCommands::Update { id, .. } => {
                ("ticket update".to_string(), serde_json::json!({ "id": id }))
            }
            TicketCommands::Approve { id } => {
                ("ticket approve".to_string(), serde_json::json!({ "id": id }))
            }
            TicketCommands::SubtaskAdd { id, .. } => (
                "ticket subtask-add".to_string(),
                serde_json::json!({ "id": id }),
            ),
            TicketCommands::SubtaskDone { id, position, .. } => (
                "ticket subtask-done".to_string(),
                serde_json::json!({ "id": id, "position": position }),
            ),
            TicketCommands::Attach { id, name, .. } => (
                "ticket attach".to_string(),
                serde_json::json!({ "id": id, "name": name }),
            ),
        },
        Commands::Epic { command } => match command {
            EpicCommands::Create { title, .. } => (
                "epic create".to_string(),
                serde_json::json!({ "title": title }),
            ),
            EpicCommands::List => ("epic list".to_string(), serde_json::json!({})),
            EpicCommands::Show { id } => {
                ("epic show".to_string(), serde_json::json!({ "id": id }))
            }
            EpicCommands::Start { id, create_pr } => (
                "epic start".to_string(),
                serde_json::json!({ "id": id, "create_pr": create_pr }),
            ),
        },
        Commands::Work { command } => match command {
            WorkCommands::Start { id } => {
                ("work start".to_string(), serde_json::json!({ "id": id }))
            }
            WorkCommands::Complete { id, .. } => {
                ("work complete".to_string(), serde_json::json!({ "id": id }))
            }
        },
        Commands::Review { command } => match command {
            ReviewCommands::Submit { id, severity, .. } => (
                "review submit".to_string(),
                serde_json::json!({ "id": id, "severity": severity }),
            ),
            ReviewCommands::Fix { id, .. } => {
                ("review fix".to_string(), serde_json::json!({ "id": id }))
            }
            ReviewCommands::Check { id } => {
                ("review check".to_string(), serde_json::json!({ "id": id }))
            }
            ReviewCommands::List { id } => {
                ("review list".to_string(), serde_json::json!({ "id": id }))
            }
            ReviewCommands::Demo { id, steps } => (
                "review demo".to_string(),
                serde_json::json!({ "id": id, "steps": steps.len() }),
            ),
        },
        Commands::Session { command } => match command {
            SessionCommands::Start { id, environment } => (
                "session start".to_string(),
                serde_json::json!({ "id": id, "environment": environment }),
            ),
            SessionCommands::End { id } => {
                ("session end".to_string(), serde_json::json!({ "id": id }))
            }
        },
        Commands::Config { command } => match command {
            ConfigCommands::Get { key } => {
                ("config get".to_string(), serde_json::json!({ "key": key }))
            }
            ConfigCommands::Set { key, .. } => {
                ("config set".to_string(), serde_json::json!({ "key": key }))
            }
        },
        Commands::System { command } => match command {
            SystemCommands::Init { .. } => ("system init".to_string(), serde_json::json!({})),
        },
    }
}

fn run_command(command: Commands, repo_path: &Path, human: bool) -> Result<(), capstan::Error> {
    match command {
        Commands::System { command } => match command {
            SystemCommands::Init { name } => {
                let result = commands::system_init(repo_path, name)?;
                output(&result, human);
            }
        },

        Commands::Ticket { command } => match command {
            TicketCommands::Create {
                title,
                description,
                priority,
                epic,
                tags,
            } => {
                let result =
                    commands::ticket_create(repo_path, title, description, priority, epic, tags)?;
                output(&result, human);
            }
            TicketCommands::List { status, epic } => {
                let result = commands::ticket_list(repo_path, status, epic)?;
                output(&result, human);
            }
            TicketCommands::Show { id } => {
                let result = commands::ticket_show(repo_path, &id)?;
                output(&result, human);
            }
            TicketCommands::Update {
                id,
                title,
                description,
                priority,
                position,
                status,
            } => {
                let result = commands::ticket_update(
                    repo_path,
                    &id,
                    title,
                    description,
                    priority,
                    position,
                    status,
                )?;
                output(&result, human);
            }
            TicketCommands::Approve { id } => {
                let result = commands::ticket_approve(repo_path, &id)?;
                output(&result, human);
            }
            TicketCommands::SubtaskAdd { id, title } => {
                let result = commands::ticket_subtask_add(repo_path, &id, title)?;
                output(&result, human);
            }
            TicketCommands::SubtaskDone {
                id,
                position,
                undone,
            } => {
                let result = commands::ticket_subtask_done(repo_path, &id, position, !undone)?;
                output(&result, human);
            }
            TicketCommands::Attach { id, name, path } => {
                let result = commands::ticket_attach(repo_path, &id, name, path)?;
                output(&result, human);
            }
        },

        Commands::Epic { command } => match command {
            EpicCommands::Create {
                title,
                description,
                isolation,
            } => {
                let result = commands::epic_create(repo_path, title, description, isolation)?;
                output(&result, human);
            }
            EpicCommands::List => {
                let result = commands::epic_list(repo_path)?;
                output(&result, human);
            }
            EpicCommands::Show { id } => {
                let result = commands::epic_show(repo_path, &id)?;
                output(&result, human);
            }
            EpicCommands::Start { id, create_pr } => {
                let result = commands::epic_start(repo_path, &id, create_pr)?;
                output(&result, human);
            }
        },

        Commands::Work { command } => match command {
            WorkCommands::Start { id } => {
                let result = commands::work_start(repo_path, &id)?;
                output(&result, human);
            }
            WorkCommands::Complete { id, summary } => {
                let result = commands::work_complete(repo_path, &id, summary)?;
                output(&result, human);
            }
        },

        Commands::Review { command } => match command {
            ReviewCommands::Submit {
                id,
                description,
                severity,
                category,
                reviewer,
            } => {
                let result = commands::review_submit(
                    repo_path,
                    &id,
                    &description,
                    &severity,
                    &category,
                    &reviewer,
                )?;
                output(&result, human);
            }
            ReviewCommands::Fix {
                id,
                fix_description,
            } => {
                let result = commands::review_fix(repo_path, &id, fix_description.as_deref())?;
                output(&result, human);
            }
            ReviewCommands::Check { id } => {
                let result = commands::review_check(repo_path, &id)?;
                output(&result, human);
            }
            ReviewCommands::List { id } => {
                let result = commands::review_list(repo_path, &id)?;
                output(&result, human);
            }
            ReviewCommands::Demo { id, steps } => {
                let result = commands::review_demo(repo_path, &id, steps)?;
                output(&result, human);
            }
        },

        Commands::Session { command } => match command {
            SessionCommands::Start { id, environment } => {
                let result = commands::session_start(repo_path, &id, &environment)?;
                output(&result, human);
            }
            SessionCommands::End { id } => {
                let result = commands::session_end(repo_path, &id)?;
                output(&result, human);
            }
        },

        Commands::Config { command } => match command {
            ConfigCommands::Get { key } => {
                let result = commands::config_get(repo_path, &key)?;
                output(&result, human);
            }
            ConfigCommands::Set { key, value } => {
                let result = commands::config_set(repo_path, &key, &value)?;
                output(&result, human);
            }
        },
    }

    Ok(())
}
