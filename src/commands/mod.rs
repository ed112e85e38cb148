//! Command implementations for the Capstan CLI.
//!
//! Each function opens storage for the repository, runs the requested
//! operation (delegating workflow transitions to the engine), and returns a
//! structured result. Formatting lives here, in the presentation layer; the
//! engine itself only ever returns snapshots and warning lists.

use crate::models::{
    ConversationSession, Epic, EpicWorkflowState, FindingSeverity, IsolationMode, Project,
    ReviewFinding, Ticket, TicketStatus, TicketWorkflowState,
};
use crate::session;
use crate::storage::{Storage, generate_id};
use crate::workflow::review::{DemoScriptReport, GateReport, MarkFixedReport, SubmitFindingReport};
use crate::workflow::{CompleteWorkReport, EpicStartReport, StartWorkReport, WorkflowEngine};
use crate::{Error, Result};
use serde::Serialize;
use std::path::Path;

/// Command results that can be serialized to JSON or formatted for humans.
pub trait Render: Serialize {
    /// Format for human-readable output.
    fn human(&self) -> String;
}

/// Print a command result as JSON (default) or human-readable text.
pub fn output<T: Render>(result: &T, human: bool) {
    if human {
        println!("{}", result.human());
    } else {
        match serde_json::to_string(result) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Warning: could not serialize result: {}", e),
        }
    }
}

fn render_warnings(warnings: &[String]) -> String {
    warnings
        .iter()
        .map(|w| format!("\nWarning: {}", w))
        .collect()
}

fn open_storage(repo_path: &Path) -> Result<Storage> {
    Storage::open(repo_path)
}

fn current_project(storage: &Storage, repo_path: &Path) -> Result<Project> {
    let canonical = repo_path
        .canonicalize()
        .map_err(|e| Error::Other(format!("Could not canonicalize repo path: {}", e)))?;
    storage
        .find_project_by_path(&canonical.to_string_lossy())?
        .ok_or_else(|| {
            Error::NotFound(
                "No project registered for this repository; run `cap system init`".to_string(),
            )
        })
}

// === System ===

/// Result of `system init`.
#[derive(Debug, Serialize)]
pub struct InitResult {
    /// False when the repository was already initialized
    pub initialized: bool,
    /// The registered project
    pub project: Project,
}

impl Render for InitResult {
    fn human(&self) -> String {
        if self.initialized {
            format!(
                "Initialized capstan for project \"{}\" at {}",
                self.project.name, self.project.path
            )
        } else {
            format!("Already initialized (project \"{}\")", self.project.name)
        }
    }
}

/// Initialize storage and register the project for this repository.
pub fn system_init(repo_path: &Path, name: Option<String>) -> Result<InitResult> {
    let existed = Storage::exists(repo_path)?;
    let storage = Storage::init(repo_path)?;

    let canonical = repo_path
        .canonicalize()
        .map_err(|e| Error::Other(format!("Could not canonicalize repo path: {}", e)))?;
    let path_str = canonical.to_string_lossy().to_string();

    let project = match storage.find_project_by_path(&path_str)? {
        Some(project) => project,
        None => {
            let name = name.unwrap_or_else(|| {
                canonical
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| "project".to_string())
            });
            let project = Project::new(generate_id(&name), name, path_str);
            storage.insert_project(&project)?;
            project
        }
    };

    Ok(InitResult {
        initialized: !existed,
        project,
    })
}

// === Tickets ===

/// A single-ticket result (create/update/approve).
#[derive(Debug, Serialize)]
pub struct TicketResult {
    pub ticket: Ticket,
}

impl Render for TicketResult {
    fn human(&self) -> String {
        format!(
            "Ticket {} \"{}\" [{}]",
            self.ticket.short_id(),
            self.ticket.title,
            self.ticket.status
        )
    }
}

/// Result of `ticket list`.
#[derive(Debug, Serialize)]
pub struct TicketListResult {
    pub tickets: Vec<Ticket>,
    pub count: usize,
}

impl Render for TicketListResult {
    fn human(&self) -> String {
        if self.tickets.is_empty() {
            return "No tickets".to_string();
        }
        self.tickets
            .iter()
            .map(|t| {
                format!(
                    "{}  p{}  {:<12}  {}",
                    t.short_id(),
                    t.priority,
                    t.status.to_string(),
                    t.title
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Result of `ticket show`.
#[derive(Debug, Serialize)]
pub struct TicketShowResult {
    pub ticket: Ticket,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_state: Option<TicketWorkflowState>,
    pub findings: Vec<ReviewFinding>,
    pub sessions: Vec<ConversationSession>,
    pub subtasks: Vec<(i64, String, bool)>,
    pub attachments: Vec<(String, String)>,
    pub demo_steps: Vec<String>,
}

impl Render for TicketShowResult {
    fn human(&self) -> String {
        let mut lines = vec![format!(
            "{} \"{}\" [{}] p{}",
            self.ticket.short_id(),
            self.ticket.title,
            self.ticket.status,
            self.ticket.priority
        )];
        if let Some(desc) = &self.ticket.description {
            lines.push(desc.clone());
        }
        if let Some(branch) = &self.ticket.branch_name {
            lines.push(format!("branch: {}", branch));
        }
        if let Some(state) = &self.workflow_state {
            lines.push(format!(
                "phase: {} (iteration {}, findings {}/{})",
                state.phase, state.review_iteration, state.findings_fixed, state.findings_raised
            ));
        }
        for finding in &self.findings {
            lines.push(format!(
                "finding {} [{}/{}] {}",
                crate::models::short_id(&finding.id),
                finding.severity,
                finding.fix_status,
                finding.description
            ));
        }
        for (pos, title, done) in &self.subtasks {
            lines.push(format!(
                "  [{}] {}. {}",
                if *done { "x" } else { " " },
                pos,
                title
            ));
        }
        lines.join("\n")
    }
}

pub fn ticket_create(
    repo_path: &Path,
    title: String,
    description: Option<String>,
    priority: u8,
    epic: Option<String>,
    tags: Vec<String>,
) -> Result<TicketResult> {
    if priority > 4 {
        return Err(Error::InvalidInput(format!(
            "Priority must be 0-4, got {}",
            priority
        )));
    }
    let storage = open_storage(repo_path)?;
    let project = current_project(&storage, repo_path)?;

    let mut ticket = Ticket::new(generate_id(&title), title, project.id);
    ticket.description = description;
    ticket.priority = priority;
    ticket.tags = tags;
    if let Some(prefix) = epic {
        ticket.epic_id = Some(storage.resolve_epic_id(&prefix)?);
    }
    storage.insert_ticket(&ticket)?;
    Ok(TicketResult { ticket })
}

pub fn ticket_list(
    repo_path: &Path,
    status: Option<String>,
    epic: Option<String>,
) -> Result<TicketListResult> {
    let storage = open_storage(repo_path)?;
    let status = status
        .map(|s| {
            s.parse::<TicketStatus>()
                .map_err(Error::InvalidInput)
        })
        .transpose()?;
    let epic_id = epic
        .map(|prefix| storage.resolve_epic_id(&prefix))
        .transpose()?;
    let tickets = storage.list_tickets(status, epic_id.as_deref())?;
    let count = tickets.len();
    Ok(TicketListResult { tickets, count })
}

pub fn ticket_show(repo_path: &Path, id: &str) -> Result<TicketShowResult> {
    let storage = open_storage(repo_path)?;
    let ticket_id = storage.resolve_ticket_id(id)?;
    let ticket = storage.get_ticket(&ticket_id)?;
    Ok(TicketShowResult {
        workflow_state: storage.get_ticket_state(&ticket_id)?,
        findings: storage.list_findings(&ticket_id)?,
        sessions: storage.list_sessions(&ticket_id)?,
        subtasks: storage.list_subtasks(&ticket_id)?,
        attachments: storage.list_attachments(&ticket_id)?,
        demo_steps: storage.list_demo_steps(&ticket_id)?,
        ticket,
    })
}

#[allow(clippy::too_many_arguments)]
pub fn ticket_update(
    repo_path: &Path,
    id: &str,
    title: Option<String>,
    description: Option<String>,
    priority: Option<u8>,
    position: Option<i64>,
    status: Option<String>,
) -> Result<TicketResult> {
    let storage = open_storage(repo_path)?;
    let ticket_id = storage.resolve_ticket_id(id)?;
    let mut ticket = storage.get_ticket(&ticket_id)?;

    // Validate everything before mutating anything.
    // Grooming statuses only; the lifecycle statuses are reached through
    // work/review commands and the external approval action.
    let groomed_status = status
        .map(|s| s.parse::<TicketStatus>().map_err(Error::InvalidInput))
        .transpose()?;
    if let Some(parsed) = groomed_status {
        if !matches!(parsed, TicketStatus::Backlog | TicketStatus::Ready) {
            return Err(Error::InvalidInput(format!(
                "Status can only be set to 'backlog' or 'ready' directly; \
                 '{}' is reached through workflow commands",
                parsed
            )));
        }
        if ticket.status == TicketStatus::Done {
            return Err(Error::Precondition(
                "Cannot groom a ticket that is already done".to_string(),
            ));
        }
    }
    if let Some(priority) = priority {
        if priority > 4 {
            return Err(Error::InvalidInput(format!(
                "Priority must be 0-4, got {}",
                priority
            )));
        }
        ticket.priority = priority;
    }

    if let Some(title) = title {
        ticket.title = title;
    }
    if let Some(description) = description {
        ticket.description = Some(description);
    }
    if let Some(position) = position {
        ticket.position = position;
    }
    storage.update_ticket(&ticket)?;

    if let Some(parsed) = groomed_status {
        storage.set_ticket_status(&ticket.id, parsed)?;
        ticket.status = parsed;
    }

    Ok(TicketResult { ticket })
}

/// The external human-approval action: human_review -> done.
pub fn ticket_approve(repo_path: &Path, id: &str) -> Result<TicketResult> {
    let storage = open_storage(repo_path)?;
    let ticket_id = storage.resolve_ticket_id(id)?;
    let ticket = storage.get_ticket(&ticket_id)?;

    if ticket.status == TicketStatus::Done {
        return Ok(TicketResult { ticket });
    }
    if ticket.status != TicketStatus::HumanReview {
        return Err(Error::Precondition(format!(
            "Ticket {} is in '{}'; only tickets in human_review can be approved",
            ticket.short_id(),
            ticket.status
        )));
    }
    storage.set_ticket_status(&ticket_id, TicketStatus::Done)?;
    let ticket = storage.get_ticket(&ticket_id)?;
    Ok(TicketResult { ticket })
}

/// Result of subtask operations.
#[derive(Debug, Serialize)]
pub struct SubtaskResult {
    pub ticket_id: String,
    pub position: i64,
    pub title: String,
    pub done: bool,
}

impl Render for SubtaskResult {
    fn human(&self) -> String {
        format!(
            "Subtask {} on {}: [{}] {}",
            self.position,
            crate::models::short_id(&self.ticket_id),
            if self.done { "x" } else { " " },
            self.title
        )
    }
}

pub fn ticket_subtask_add(repo_path: &Path, id: &str, title: String) -> Result<SubtaskResult> {
    let storage = open_storage(repo_path)?;
    let ticket_id = storage.resolve_ticket_id(id)?;
    storage.get_ticket(&ticket_id)?;
    let position = storage.add_subtask(&ticket_id, &title)?;
    Ok(SubtaskResult {
        ticket_id,
        position,
        title,
        done: false,
    })
}

pub fn ticket_subtask_done(
    repo_path: &Path,
    id: &str,
    position: i64,
    done: bool,
) -> Result<SubtaskResult> {
    let storage = open_storage(repo_path)?;
    let ticket_id = storage.resolve_ticket_id(id)?;
    storage.set_subtask_done(&ticket_id, position, done)?;
    let title = storage
        .list_subtasks(&ticket_id)?
        .into_iter()
        .find(|(p, _, _)| *p == position)
        .map(|(_, title, _)| title)
        .unwrap_or_default();
    Ok(SubtaskResult {
        ticket_id,
        position,
        title,
        done,
    })
}

/// Result of `ticket attach`.
#[derive(Debug, Serialize)]
pub struct AttachResult {
    pub ticket_id: String,
    pub name: String,
    pub path: String,
}

impl Render for AttachResult {
    fn human(&self) -> String {
        format!(
            "Attached \"{}\" to {}",
            self.name,
            crate::models::short_id(&self.ticket_id)
        )
    }
}

pub fn ticket_attach(
    repo_path: &Path,
    id: &str,
    name: String,
    path: String,
) -> Result<AttachResult> {
    let storage = open_storage(repo_path)?;
    let ticket_id = storage.resolve_ticket_id(id)?;
    storage.get_ticket(&ticket_id)?;
    storage.add_attachment(&ticket_id, &name, &path)?;
    Ok(AttachResult {
        ticket_id,
        name,
        path,
    })
}

// === Epics ===

/// A single-epic result.
#[derive(Debug, Serialize)]
pub struct EpicResult {
    pub epic: Epic,
}

impl Render for EpicResult {
    fn human(&self) -> String {
        format!(
            "Epic {} \"{}\" ({})",
            self.epic.short_id(),
            self.epic.title,
            self.epic.isolation
        )
    }
}

/// An epic with derived progress.
#[derive(Debug, Serialize)]
pub struct EpicProgress {
    pub epic: Epic,
    pub tickets_total: i64,
    pub tickets_done: i64,
}

/// Result of `epic list`.
#[derive(Debug, Serialize)]
pub struct EpicListResult {
    pub epics: Vec<EpicProgress>,
    pub count: usize,
}

impl Render for EpicListResult {
    fn human(&self) -> String {
        if self.epics.is_empty() {
            return "No epics".to_string();
        }
        self.epics
            .iter()
            .map(|e| {
                format!(
                    "{}  {}/{}  {}",
                    e.epic.short_id(),
                    e.tickets_done,
                    e.tickets_total,
                    e.epic.title
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Result of `epic show`.
#[derive(Debug, Serialize)]
pub struct EpicShowResult {
    pub epic: Epic,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_state: Option<EpicWorkflowState>,
    pub tickets_total: i64,
    pub tickets_done: i64,
}

impl Render for EpicShowResult {
    fn human(&self) -> String {
        let mut lines = vec![format!(
            "Epic {} \"{}\" ({}) {}/{} done",
            self.epic.short_id(),
            self.epic.title,
            self.epic.isolation,
            self.tickets_done,
            self.tickets_total
        )];
        if let Some(state) = &self.workflow_state {
            if let Some(branch) = &state.branch_name {
                lines.push(format!("branch: {}", branch));
            }
            if let Some(wt) = &state.worktree_path {
                lines.push(format!("worktree: {}", wt));
            }
            if let Some(url) = &state.pr_url {
                lines.push(format!(
                    "pr: {} ({})",
                    url,
                    state.pr_status.as_deref().unwrap_or("unknown")
                ));
            }
        }
        lines.join("\n")
    }
}

pub fn epic_create(
    repo_path: &Path,
    title: String,
    description: Option<String>,
    isolation: String,
) -> Result<EpicResult> {
    let isolation = isolation
        .parse::<IsolationMode>()
        .map_err(Error::InvalidInput)?;
    let storage = open_storage(repo_path)?;
    let project = current_project(&storage, repo_path)?;

    let mut epic = Epic::new(generate_id(&title), title, project.id);
    epic.description = description;
    epic.isolation = isolation;
    storage.insert_epic(&epic)?;
    Ok(EpicResult { epic })
}

pub fn epic_list(repo_path: &Path) -> Result<EpicListResult> {
    let storage = open_storage(repo_path)?;
    let mut epics = Vec::new();
    for epic in storage.list_epics()? {
        let (tickets_total, tickets_done) = storage.epic_ticket_counts(&epic.id)?;
        epics.push(EpicProgress {
            epic,
            tickets_total,
            tickets_done,
        });
    }
    let count = epics.len();
    Ok(EpicListResult { epics, count })
}

pub fn epic_show(repo_path: &Path, id: &str) -> Result<EpicShowResult> {
    let storage = open_storage(repo_path)?;
    let epic_id = storage.resolve_epic_id(id)?;
    let epic = storage.get_epic(&epic_id)?;
    let (tickets_total, tickets_done) = storage.epic_ticket_counts(&epic_id)?;
    Ok(EpicShowResult {
        workflow_state: storage.get_epic_state(&epic_id)?,
        tickets_total,
        tickets_done,
        epic,
    })
}

pub fn epic_start(repo_path: &Path, id: &str, create_pr: bool) -> Result<EpicStartReport> {
    let storage = open_storage(repo_path)?;
    let epic_id = storage.resolve_epic_id(id)?;
    let engine = WorkflowEngine::new(&storage);
    engine.start_epic_work(&epic_id, create_pr)
}

// === Work ===

pub fn work_start(repo_path: &Path, id: &str) -> Result<StartWorkReport> {
    let storage = open_storage(repo_path)?;
    let ticket_id = storage.resolve_ticket_id(id)?;
    let engine = WorkflowEngine::new(&storage);
    engine.start_work(&ticket_id)
}

pub fn work_complete(
    repo_path: &Path,
    id: &str,
    summary: Option<String>,
) -> Result<CompleteWorkReport> {
    let storage = open_storage(repo_path)?;
    let ticket_id = storage.resolve_ticket_id(id)?;
    let engine = WorkflowEngine::new(&storage);
    engine.complete_work(&ticket_id, summary)
}

// === Review ===

pub fn review_submit(
    repo_path: &Path,
    id: &str,
    description: &str,
    severity: &str,
    category: &str,
    reviewer: &str,
) -> Result<SubmitFindingReport> {
    let severity = severity
        .parse::<FindingSeverity>()
        .map_err(Error::InvalidInput)?;
    let storage = open_storage(repo_path)?;
    let ticket_id = storage.resolve_ticket_id(id)?;
    let engine = WorkflowEngine::new(&storage);
    engine.submit_finding(&ticket_id, reviewer, severity, category, description)
}

pub fn review_fix(
    repo_path: &Path,
    id: &str,
    fix_description: Option<&str>,
) -> Result<MarkFixedReport> {
    let storage = open_storage(repo_path)?;
    let finding_id = storage.resolve_finding_id(id)?;
    let engine = WorkflowEngine::new(&storage);
    engine.mark_fixed(&finding_id, fix_description)
}

pub fn review_check(repo_path: &Path, id: &str) -> Result<GateReport> {
    let storage = open_storage(repo_path)?;
    let ticket_id = storage.resolve_ticket_id(id)?;
    let engine = WorkflowEngine::new(&storage);
    engine.check_complete(&ticket_id)
}

/// Result of `review list`.
#[derive(Debug, Serialize)]
pub struct FindingListResult {
    pub findings: Vec<ReviewFinding>,
    pub count: usize,
}

impl Render for FindingListResult {
    fn human(&self) -> String {
        if self.findings.is_empty() {
            return "No findings".to_string();
        }
        self.findings
            .iter()
            .map(|f| {
                format!(
                    "{}  [{}/{}]  {}",
                    crate::models::short_id(&f.id),
                    f.severity,
                    f.fix_status,
                    f.description
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub fn review_list(repo_path: &Path, id: &str) -> Result<FindingListResult> {
    let storage = open_storage(repo_path)?;
    let ticket_id = storage.resolve_ticket_id(id)?;
    let findings = storage.list_findings(&ticket_id)?;
    let count = findings.len();
    Ok(FindingListResult { findings, count })
}

pub fn review_demo(repo_path: &Path, id: &str, steps: Vec<String>) -> Result<DemoScriptReport> {
    let storage = open_storage(repo_path)?;
    let ticket_id = storage.resolve_ticket_id(id)?;
    let engine = WorkflowEngine::new(&storage);
    engine.generate_demo_script(&ticket_id, steps)
}

// === Sessions ===

pub fn session_start(
    repo_path: &Path,
    id: &str,
    environment: &str,
) -> Result<session::SessionStartReport> {
    let storage = open_storage(repo_path)?;
    let ticket_id = storage.resolve_ticket_id(id)?;
    let ticket = storage.get_ticket(&ticket_id)?;
    session::start_session(&storage, &ticket, environment)
}

pub fn session_end(repo_path: &Path, id: &str) -> Result<session::SessionEndReport> {
    let storage = open_storage(repo_path)?;
    let ticket_id = storage.resolve_ticket_id(id)?;
    let ticket = storage.get_ticket(&ticket_id)?;
    session::end_session(&storage, &ticket)
}

// === Config ===

/// Result of config get/set.
#[derive(Debug, Serialize)]
pub struct ConfigResult {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl Render for ConfigResult {
    fn human(&self) -> String {
        match &self.value {
            Some(value) => format!("{} = {}", self.key, value),
            None => format!("{} is not set", self.key),
        }
    }
}

pub fn config_get(repo_path: &Path, key: &str) -> Result<ConfigResult> {
    let storage = open_storage(repo_path)?;
    Ok(ConfigResult {
        value: storage.get_config(key)?,
        key: key.to_string(),
    })
}

pub fn config_set(repo_path: &Path, key: &str, value: &str) -> Result<ConfigResult> {
    let storage = open_storage(repo_path)?;
    storage.set_config(key, value)?;
    Ok(ConfigResult {
        key: key.to_string(),
        value: Some(value.to_string()),
    })
}

// === Render for engine reports ===

impl Render for StartWorkReport {
    fn human(&self) -> String {
        let mut line = if self.already_in_progress {
            format!(
                "Ticket {} is already in progress on branch {}",
                self.ticket.short_id(),
                self.branch_name
            )
        } else {
            format!(
                "Started work on {} \"{}\": branch {} ({}{})",
                self.ticket.short_id(),
                self.ticket.title,
                self.branch_name,
                if self.branch_created {
                    "created"
                } else {
                    "checked out"
                },
                if self.using_epic_branch {
                    ", shared epic branch"
                } else {
                    ""
                },
            )
        };
        line.push_str(&render_warnings(&self.warnings));
        line
    }
}

impl Render for CompleteWorkReport {
    fn human(&self) -> String {
        let mut line = match &self.already {
            Some(message) => message.clone(),
            None => format!(
                "Ticket {} moved to ai_review (iteration {}): {} commit(s), {} file(s) changed",
                self.ticket.short_id(),
                self.review_iteration,
                self.commits_ahead,
                self.changed_files.len()
            ),
        };
        line.push_str(&render_warnings(&self.warnings));
        line
    }
}

impl Render for EpicStartReport {
    fn human(&self) -> String {
        let mut lines = vec![format!(
            "Epic {} \"{}\" on branch {} ({}); {}/{} tickets done",
            self.epic.short_id(),
            self.epic.title,
            self.branch_name,
            if self.branch_created {
                "created"
            } else {
                "reused"
            },
            self.tickets_done,
            self.tickets_total
        )];
        if let Some(wt) = &self.worktree_path {
            lines.push(format!("worktree: {}", wt));
        }
        if let Some(url) = &self.pr_url {
            lines.push(format!("draft PR: {}", url));
        }
        let mut text = lines.join("\n");
        text.push_str(&render_warnings(&self.warnings));
        text
    }
}

impl Render for SubmitFindingReport {
    fn human(&self) -> String {
        let mut line = format!(
            "Recorded {} finding {} on {}: {}",
            self.finding.severity,
            crate::models::short_id(&self.finding.id),
            crate::models::short_id(&self.finding.ticket_id),
            self.finding.description
        );
        line.push_str(&render_warnings(&self.warnings));
        line
    }
}

impl Render for MarkFixedReport {
    fn human(&self) -> String {
        let mut line = if self.already_fixed {
            format!(
                "Finding {} was already fixed",
                crate::models::short_id(&self.finding.id)
            )
        } else {
            format!(
                "Finding {} marked fixed",
                crate::models::short_id(&self.finding.id)
            )
        };
        line.push_str(&render_warnings(&self.warnings));
        line
    }
}

impl Render for GateReport {
    fn human(&self) -> String {
        if self.can_proceed_to_human_review {
            format!(
                "Gate open: ready for human review ({} finding(s) on record, {} minor, {} suggestion(s) open)",
                self.total_findings, self.open_minor, self.open_suggestion
            )
        } else {
            format!(
                "Gate closed: {} critical and {} major finding(s) still open",
                self.open_critical, self.open_major
            )
        }
    }
}

impl Render for DemoScriptReport {
    fn human(&self) -> String {
        let mut lines = vec![format!(
            "Ticket {} moved to human_review with a {}-step demo script:",
            self.ticket.short_id(),
            self.steps.len()
        )];
        for (i, step) in self.steps.iter().enumerate() {
            lines.push(format!("  {}. {}", i + 1, step));
        }
        let mut text = lines.join("\n");
        text.push_str(&render_warnings(&self.warnings));
        text
    }
}

impl Render for session::SessionStartReport {
    fn human(&self) -> String {
        format!(
            "Opened session {} on {} ({}); {} straggler(s) ended",
            crate::models::short_id(&self.session.id),
            crate::models::short_id(&self.session.ticket_id),
            self.session.environment,
            self.stragglers_ended
        )
    }
}

impl Render for session::SessionEndReport {
    fn human(&self) -> String {
        format!("Ended {} session(s)", self.ended)
    }
}
