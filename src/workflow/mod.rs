//! Workflow orchestration engine.
//!
//! Advances tickets and epics through the lifecycle
//! `backlog|ready -> in_progress -> ai_review -> human_review -> done` by
//! coordinating the record store and the git working tree. Failure in either
//! resource leaves the other consistent: a git failure aborts before anything
//! is persisted, and a primary-persistence failure after a branch was created
//! triggers the compensating rollback in [`WorkflowEngine::start_work`].
//!
//! The engine talks to storage through the [`WorkflowStore`] trait so tests
//! can inject persistence failures at the exact seam the rollback guards.

pub mod branch;
pub mod review;

use crate::git;
use crate::models::{
    ConversationSession, Epic, EpicWorkflowState, Project, ReviewFinding, Ticket, TicketStatus,
    TicketWorkflowState, WorkflowPhase,
};
use crate::storage::Storage;
use crate::{Error, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use branch::BranchResolution;

/// Bound on the optional `git push` when opening a draft PR.
const PUSH_TIMEOUT: Duration = Duration::from_secs(30);

/// Record-store operations the engine depends on.
///
/// `Storage` is the production implementation; tests wrap it to inject
/// failures into individual persistence steps.
pub trait WorkflowStore {
    fn ticket(&self, id: &str) -> Result<Ticket>;
    fn project(&self, id: &str) -> Result<Project>;
    fn epic(&self, id: &str) -> Result<Epic>;

    /// Atomic primary write for StartWork: status + branch name.
    fn persist_start_transition(&self, ticket_id: &str, branch_name: &str) -> Result<()>;
    /// Primary write for CompleteWork: status to ai_review.
    fn persist_review_transition(&self, ticket_id: &str) -> Result<()>;
    /// Primary write for the review gate: status to human_review.
    fn persist_human_review_transition(&self, ticket_id: &str) -> Result<()>;

    fn ticket_state(&self, ticket_id: &str) -> Result<Option<TicketWorkflowState>>;
    fn upsert_ticket_state(&self, state: &TicketWorkflowState) -> Result<()>;
    fn epic_state(&self, epic_id: &str) -> Result<Option<EpicWorkflowState>>;
    fn upsert_epic_state(&self, state: &EpicWorkflowState) -> Result<()>;
    fn epic_ticket_counts(&self, epic_id: &str) -> Result<(i64, i64)>;

    fn findings(&self, ticket_id: &str) -> Result<Vec<ReviewFinding>>;
    fn insert_finding(&self, finding: &ReviewFinding) -> Result<()>;
    fn finding(&self, id: &str) -> Result<ReviewFinding>;
    fn mark_finding_fixed(&self, id: &str, fix_description: Option<&str>) -> Result<()>;
    fn replace_demo_steps(&self, ticket_id: &str, steps: &[String]) -> Result<()>;

    fn end_open_sessions(&self, ticket_id: &str) -> Result<usize>;
    fn insert_session(&self, session: &ConversationSession) -> Result<()>;

    /// Directory under which epic worktree checkouts are provisioned.
    fn worktree_root(&self) -> PathBuf;
}

impl WorkflowStore for Storage {
    fn ticket(&self, id: &str) -> Result<Ticket> {
        self.get_ticket(id)
    }

    fn project(&self, id: &str) -> Result<Project> {
        self.get_project(id)
    }

    fn epic(&self, id: &str) -> Result<Epic> {
        self.get_epic(id)
    }

    fn persist_start_transition(&self, ticket_id: &str, branch_name: &str) -> Result<()> {
        Storage::persist_start_transition(self, ticket_id, branch_name)
    }

    fn persist_review_transition(&self, ticket_id: &str) -> Result<()> {
        Storage::persist_review_transition(self, ticket_id)
    }

    fn persist_human_review_transition(&self, ticket_id: &str) -> Result<()> {
        Storage::persist_human_review_transition(self, ticket_id)
    }

    fn ticket_state(&self, ticket_id: &str) -> Result<Option<TicketWorkflowState>> {
        self.get_ticket_state(ticket_id)
    }

    fn upsert_ticket_state(&self, state: &TicketWorkflowState) -> Result<()> {
        Storage::upsert_ticket_state(self, state)
    }

    fn epic_state(&self, epic_id: &str) -> Result<Option<EpicWorkflowState>> {
        self.get_epic_state(epic_id)
    }

    fn upsert_epic_state(&self, state: &EpicWorkflowState) -> Result<()> {
        Storage::upsert_epic_state(self, state)
    }

    fn epic_ticket_counts(&self, epic_id: &str) -> Result<(i64, i64)> {
        Storage::epic_ticket_counts(self, epic_id)
    }

    fn findings(&self, ticket_id: &str) -> Result<Vec<ReviewFinding>> {
        self.list_findings(ticket_id)
    }

    fn insert_finding(&self, finding: &ReviewFinding) -> Result<()> {
        Storage::insert_finding(self, finding)
    }

    fn finding(&self, id: &str) -> Result<ReviewFinding> {
        self.get_finding(id)
    }

    fn mark_finding_fixed(&self, id: &str, fix_description: Option<&str>) -> Result<()> {
        Storage::mark_finding_fixed(self, id, fix_description)
    }

    fn replace_demo_steps(&self, ticket_id: &str, steps: &[String]) -> Result<()> {
        Storage::replace_demo_steps(self, ticket_id, steps)
    }

    fn end_open_sessions(&self, ticket_id: &str) -> Result<usize> {
        Storage::end_open_sessions(self, ticket_id)
    }

    fn insert_session(&self, session: &ConversationSession) -> Result<()> {
        Storage::insert_session(self, session)
    }

    fn worktree_root(&self) -> PathBuf {
        self.root.join("worktrees")
    }
}

/// Result of `work start`.
#[derive(Debug, Serialize)]
pub struct StartWorkReport {
    /// Ticket snapshot after the transition
    pub ticket: Ticket,
    /// Resolved working branch
    pub branch_name: String,
    /// Whether the branch was created by this call
    pub branch_created: bool,
    /// Whether the ticket rides its epic's shared branch
    pub using_epic_branch: bool,
    /// True when the ticket was already in progress and nothing was mutated
    pub already_in_progress: bool,
    /// Working directory the branch was resolved in
    pub workdir: String,
    /// Secondary failures that did not abort the operation
    pub warnings: Vec<String>,
}

/// Result of `work complete`.
#[derive(Debug, Serialize)]
pub struct CompleteWorkReport {
    /// Ticket snapshot after the transition
    pub ticket: Ticket,
    /// Review iteration after this completion
    pub review_iteration: i64,
    /// Commits on the working branch not on trunk (reporting only)
    pub commits_ahead: usize,
    /// Files changed relative to trunk (reporting only)
    pub changed_files: Vec<String>,
    /// Caller-provided completion summary
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Set when the ticket was already past in_progress; nothing was mutated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub already: Option<String>,
    /// Secondary failures that did not abort the operation
    pub warnings: Vec<String>,
}

/// Result of `epic start`.
#[derive(Debug, Serialize)]
pub struct EpicStartReport {
    /// Epic snapshot
    pub epic: Epic,
    /// Resolved shared branch
    pub branch_name: String,
    /// Whether the branch was created by this call
    pub branch_created: bool,
    /// Dedicated checkout for worktree isolation, when provisioned
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worktree_path: Option<String>,
    /// Child ticket count at this recount
    pub tickets_total: i64,
    /// Completed child ticket count at this recount
    pub tickets_done: i64,
    /// Draft PR number when one was opened
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pr_number: Option<i64>,
    /// Draft PR URL when one was opened
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
    /// Secondary failures that did not abort the operation
    pub warnings: Vec<String>,
}

/// The workflow orchestration engine.
///
/// Invoked synchronously, one operation at a time; all results are
/// structured (snapshot + warnings list), never pre-formatted prose.
pub struct WorkflowEngine<'a, S: WorkflowStore> {
    store: &'a S,
}

impl<'a, S: WorkflowStore> WorkflowEngine<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub(crate) fn store(&self) -> &'a S {
        self.store
    }

    /// Start work on a ticket: validate status, resolve a working branch,
    /// persist the transition, and create or reset the workflow-state row.
    ///
    /// If the primary persistence write fails after a new branch was created,
    /// the branch is deleted and HEAD restored before the error is returned.
    pub fn start_work(&self, ticket_id: &str) -> Result<StartWorkReport> {
        let mut ticket = self.store.ticket(ticket_id)?;
        let mut warnings = Vec::new();

        // Idempotent: a ticket already being worked on is success, not error.
        if ticket.status == TicketStatus::InProgress {
            let branch_name = ticket.branch_name.clone().unwrap_or_default();
            return Ok(StartWorkReport {
                using_epic_branch: ticket.epic_id.is_some(),
                already_in_progress: true,
                branch_created: false,
                workdir: String::new(),
                warnings,
                branch_name,
                ticket,
            });
        }

        let restartable = matches!(
            ticket.status,
            TicketStatus::Backlog | TicketStatus::Ready | TicketStatus::AiReview
        );
        if !restartable {
            return Err(Error::Precondition(format!(
                "Cannot start work on ticket {} in status '{}'",
                ticket.id, ticket.status
            )));
        }
        let fix_cycle = ticket.status == TicketStatus::AiReview;

        let project = self.store.project(&ticket.project_id)?;
        let workdir = self.resolve_workdir(&ticket, &project)?;
        git::ensure_work_tree(&workdir)?;

        // Straggler sessions from earlier work are closed before new work.
        if let Err(e) = self.store.end_open_sessions(&ticket.id) {
            warnings.push(format!("Failed to end stale sessions: {}", e));
        }

        // Git first; nothing is persisted for a failed git step.
        let resolution = branch::resolve(self.store, &ticket, &workdir)?;

        // Primary persist: status + branch name, atomically.
        if let Err(e) = self
            .store
            .persist_start_transition(&ticket.id, &resolution.branch_name)
        {
            self.rollback_branch(&workdir, &resolution);
            return Err(e);
        }

        // Secondary: workflow-state row. A fix cycle keeps its iteration and
        // counters; a restart from backlog/ready resets to defaults.
        let state = match self.store.ticket_state(&ticket.id) {
            Ok(Some(mut existing)) if fix_cycle => {
                existing.phase = WorkflowPhase::Implementation;
                existing
            }
            Ok(_) => TicketWorkflowState::new(ticket.id.clone()),
            Err(e) => {
                warnings.push(format!("Failed to read workflow state: {}", e));
                TicketWorkflowState::new(ticket.id.clone())
            }
        };
        if let Err(e) = self.store.upsert_ticket_state(&state) {
            warnings.push(format!("Failed to update workflow state: {}", e));
        }

        // Secondary: remember which ticket the epic is currently on.
        if let Some(epic_id) = &ticket.epic_id {
            match self.store.epic_state(epic_id) {
                Ok(Some(mut epic_state)) => {
                    epic_state.current_ticket_id = Some(ticket.id.clone());
                    if let Err(e) = self.store.upsert_epic_state(&epic_state) {
                        warnings.push(format!("Failed to update epic state: {}", e));
                    }
                }
                Ok(None) => {}
                Err(e) => warnings.push(format!("Failed to read epic state: {}", e)),
            }
        }

        ticket.status = TicketStatus::InProgress;
        ticket.branch_name = Some(resolution.branch_name.clone());

        Ok(StartWorkReport {
            branch_name: resolution.branch_name,
            branch_created: resolution.created,
            using_epic_branch: resolution.using_epic_branch,
            already_in_progress: false,
            workdir: workdir.to_string_lossy().to_string(),
            warnings,
            ticket,
        })
    }

    /// Complete implementation work: move the ticket to AI review and bump
    /// the review iteration. Diff information is collected for reporting
    /// only and never gates the transition.
    pub fn complete_work(
        &self,
        ticket_id: &str,
        summary: Option<String>,
    ) -> Result<CompleteWorkReport> {
        let mut ticket = self.store.ticket(ticket_id)?;
        let mut warnings = Vec::new();

        match ticket.status {
            TicketStatus::Done => {
                return Ok(already_report(ticket, "Ticket is already done".to_string()));
            }
            TicketStatus::AiReview => {
                return Ok(already_report(
                    ticket,
                    "Ticket is already in ai_review; submit findings or generate \
                     the demo script to advance it"
                        .to_string(),
                ));
            }
            TicketStatus::HumanReview => {
                return Ok(already_report(
                    ticket,
                    "Ticket is already in human_review; waiting on human approval".to_string(),
                ));
            }
            TicketStatus::Backlog | TicketStatus::Ready => {
                return Err(Error::Precondition(format!(
                    "Cannot complete ticket {} in status '{}': work was never started",
                    ticket.id, ticket.status
                )));
            }
            TicketStatus::InProgress => {}
        }

        let (commits_ahead, changed_files) = match self.collect_diff_stats(&ticket) {
            Ok(stats) => stats,
            Err(e) => {
                warnings.push(format!("Could not collect diff stats: {}", e));
                (0, Vec::new())
            }
        };

        // Primary persist: ai_review is the only status this operation sets.
        // human_review belongs to the review gate; done is never assigned
        // by the engine.
        self.store.persist_review_transition(&ticket.id)?;

        let mut state = match self.store.ticket_state(&ticket.id) {
            Ok(Some(state)) => state,
            Ok(None) => TicketWorkflowState::new(ticket.id.clone()),
            Err(e) => {
                warnings.push(format!("Failed to read workflow state: {}", e));
                TicketWorkflowState::new(ticket.id.clone())
            }
        };
        state.review_iteration += 1;
        state.phase = WorkflowPhase::AiReview;
        let review_iteration = state.review_iteration;
        if let Err(e) = self.store.upsert_ticket_state(&state) {
            warnings.push(format!("Failed to update workflow state: {}", e));
        }

        ticket.status = TicketStatus::AiReview;

        Ok(CompleteWorkReport {
            ticket,
            review_iteration,
            commits_ahead,
            changed_files,
            summary,
            already: None,
            warnings,
        })
    }

    /// Start (or resume) shared-branch work for an epic: resolve/create the
    /// epic branch, provision a worktree when the epic is isolated, recount
    /// child tickets, and optionally push and open a draft PR.
    ///
    /// PR-side failures are warnings: the branch work already succeeded and
    /// is never rolled back for a secondary convenience action.
    pub fn start_epic_work(&self, epic_id: &str, create_pr: bool) -> Result<EpicStartReport> {
        let epic = self.store.epic(epic_id)?;
        let project = self.store.project(&epic.project_id)?;
        let mut warnings = Vec::new();

        let repo_dir = PathBuf::from(&project.path);
        if !repo_dir.exists() {
            return Err(Error::NotFound(format!(
                "Project path does not exist: {}",
                project.path
            )));
        }
        git::ensure_work_tree(&repo_dir)?;

        // An existing worktree checkout wins as the place to operate; the
        // epic branch can only be checked out in one worktree at a time.
        let existing_worktree = self
            .store
            .epic_state(&epic.id)?
            .and_then(|s| s.worktree_path)
            .filter(|p| Path::new(p).exists());
        let workdir = existing_worktree
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(|| repo_dir.clone());

        let resolution = branch::resolve_epic(self.store, &epic, &workdir)?;

        let mut state = self
            .store
            .epic_state(&epic.id)?
            .unwrap_or_else(|| EpicWorkflowState::new(epic.id.clone()));

        // Worktree isolation: a dedicated checkout so this epic's agent never
        // races another epic on the shared HEAD.
        if epic.isolation == crate::models::IsolationMode::Worktree && existing_worktree.is_none() {
            match self.provision_worktree(&epic, &repo_dir, &resolution) {
                Ok(path) => state.worktree_path = Some(path),
                Err(e) => warnings.push(format!("Failed to provision worktree: {}", e)),
            }
        }

        let (total, done) = self.store.epic_ticket_counts(&epic.id)?;
        state.tickets_total = total;
        state.tickets_done = done;
        if let Err(e) = self.store.upsert_epic_state(&state) {
            warnings.push(format!("Failed to persist epic progress: {}", e));
        }

        if create_pr {
            match self.open_draft_pr(&epic, &resolution.branch_name, &repo_dir) {
                Ok((number, url)) => {
                    state.pr_number = Some(number);
                    state.pr_url = Some(url);
                    state.pr_status = Some("draft".to_string());
                    if let Err(e) = self.store.upsert_epic_state(&state) {
                        warnings.push(format!("Failed to record PR linkage: {}", e));
                    }
                }
                Err(e) => warnings.push(format!("Draft PR not created: {}", e)),
            }
        }

        Ok(EpicStartReport {
            branch_name: resolution.branch_name,
            branch_created: resolution.created,
            worktree_path: state.worktree_path.clone(),
            tickets_total: total,
            tickets_done: done,
            pr_number: state.pr_number,
            pr_url: state.pr_url.clone(),
            warnings,
            epic,
        })
    }

    /// Working directory for a ticket: the epic's dedicated worktree when one
    /// is recorded and still present, else the project repository itself.
    fn resolve_workdir(&self, ticket: &Ticket, project: &Project) -> Result<PathBuf> {
        let repo_dir = PathBuf::from(&project.path);
        if !repo_dir.exists() {
            return Err(Error::NotFound(format!(
                "Project path does not exist: {}",
                project.path
            )));
        }
        if let Some(epic_id) = &ticket.epic_id {
            if let Some(state) = self.store.epic_state(epic_id)? {
                if let Some(wt) = &state.worktree_path {
                    let wt_path = PathBuf::from(wt);
                    if wt_path.exists() {
                        return Ok(wt_path);
                    }
                }
            }
        }
        Ok(repo_dir)
    }

    /// Create the epic's dedicated checkout. The shared tree is parked on
    /// the previous branch (or trunk) first: git refuses to check one
    /// branch out in two worktrees at once.
    fn provision_worktree(
        &self,
        epic: &Epic,
        repo_dir: &Path,
        resolution: &BranchResolution,
    ) -> Result<String> {
        let park = if resolution.previous_branch != resolution.branch_name {
            resolution.previous_branch.clone()
        } else {
            git::detect_trunk(repo_dir)?
        };
        git::checkout(repo_dir, &park)?;

        let wt_path = self.store.worktree_root().join(epic.short_id());
        if let Some(parent) = wt_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        git::worktree_add(repo_dir, &wt_path, &resolution.branch_name)?;
        Ok(wt_path.to_string_lossy().to_string())
    }

    fn collect_diff_stats(&self, ticket: &Ticket) -> Result<(usize, Vec<String>)> {
        let project = self.store.project(&ticket.project_id)?;
        let workdir = self.resolve_workdir(ticket, &project)?;
        git::ensure_work_tree(&workdir)?;
        let trunk = git::detect_trunk(&workdir)?;
        let commits = git::commits_ahead(&workdir, &trunk)?;
        let files = git::changed_files(&workdir, &trunk)?;
        Ok((commits, files))
    }

    /// Undo a branch-side effect after a failed primary persist: restore the
    /// previous HEAD, then delete the branch if this call created it. Two
    /// independently-checked steps; a checkout failure never skips the
    /// delete. Reused branches are never deleted.
    fn rollback_branch(&self, workdir: &Path, resolution: &BranchResolution) {
        if let Err(e) = git::checkout(workdir, &resolution.previous_branch) {
            eprintln!(
                "Warning: rollback could not restore branch '{}': {}",
                resolution.previous_branch, e
            );
        }
        if resolution.created {
            if let Err(e) = git::delete_branch(workdir, &resolution.branch_name) {
                eprintln!(
                    "Warning: rollback could not delete branch '{}': {}",
                    resolution.branch_name, e
                );
            }
        }
    }

    fn open_draft_pr(&self, epic: &Epic, branch: &str, repo_dir: &Path) -> Result<(i64, String)> {
        git::push_upstream(repo_dir, branch, PUSH_TIMEOUT)?;

        let url = git::remote_url(repo_dir)?
            .ok_or_else(|| Error::Precondition("No 'origin' remote configured".to_string()))?;
        let (owner, repo) = git::parse_github_remote(&url).ok_or_else(|| {
            Error::Precondition(format!("Remote is not a GitHub repository: {}", url))
        })?;
        let trunk = git::detect_trunk(repo_dir)?;

        let pr = crate::github::create_draft_pull_request(
            &owner,
            &repo,
            &format!("Epic: {}", epic.title),
            branch,
            &trunk,
            epic.description.as_deref().unwrap_or(""),
        )
        .map_err(|e| Error::Other(e.to_string()))?;
        Ok((pr.number, pr.html_url))
    }
}

fn already_report(ticket: Ticket, message: String) -> CompleteWorkReport {
    CompleteWorkReport {
        ticket,
        review_iteration: 0,
        commits_ahead: 0,
        changed_files: Vec::new(),
        summary: None,
        already: Some(message),
        warnings: Vec::new(),
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{FailingStore, WorkflowEnv};
    use super::*;
    use crate::models::{Epic, IsolationMode, Ticket};
    use crate::storage::generate_id;

    fn seed_ticket(env: &WorkflowEnv, title: &str) -> Ticket {
        let ticket = Ticket::new(
            generate_id(title),
            title.to_string(),
            env.project.id.clone(),
        );
        env.storage.insert_ticket(&ticket).unwrap();
        ticket
    }

    fn seed_epic(env: &WorkflowEnv, title: &str) -> Epic {
        let epic = Epic::new(generate_id(title), title.to_string(), env.project.id.clone());
        env.storage.insert_epic(&epic).unwrap();
        epic
    }

    #[test]
    fn test_start_work_creates_branch_and_persists() {
        let env = WorkflowEnv::new();
        let ticket = seed_ticket(&env, "Add login form");
        let engine = WorkflowEngine::new(&env.storage);

        let report = engine.start_work(&ticket.id).unwrap();
        assert!(!report.already_in_progress);
        assert!(report.branch_created);
        assert!(!report.using_epic_branch);
        let expected = format!("feature/{}-add-login-form", ticket.short_id());
        assert_eq!(report.branch_name, expected);

        // Git side.
        assert_eq!(git::current_branch(env.path()).unwrap(), expected);
        // Store side.
        let loaded = env.storage.get_ticket(&ticket.id).unwrap();
        assert_eq!(loaded.status, TicketStatus::InProgress);
        assert_eq!(loaded.branch_name.as_deref(), Some(expected.as_str()));
        let state = env.storage.get_ticket_state(&ticket.id).unwrap().unwrap();
        assert_eq!(state.phase, WorkflowPhase::Implementation);
        assert_eq!(state.review_iteration, 0);
    }

    #[test]
    fn test_start_work_is_idempotent_on_in_progress() {
        let env = WorkflowEnv::new();
        let ticket = seed_ticket(&env, "Add login form");
        let engine = WorkflowEngine::new(&env.storage);

        let first = engine.start_work(&ticket.id).unwrap();
        let second = engine.start_work(&ticket.id).unwrap();
        assert!(second.already_in_progress);
        assert_eq!(second.branch_name, first.branch_name);
        assert!(!second.branch_created);
    }

    #[test]
    fn test_start_work_missing_ticket() {
        let env = WorkflowEnv::new();
        let engine = WorkflowEngine::new(&env.storage);
        let err = engine.start_work(&"0".repeat(32)).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_start_work_refuses_done_ticket() {
        let env = WorkflowEnv::new();
        let ticket = seed_ticket(&env, "Shipped");
        env.storage
            .set_ticket_status(&ticket.id, TicketStatus::Done)
            .unwrap();
        let engine = WorkflowEngine::new(&env.storage);
        let err = engine.start_work(&ticket.id).unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));
    }

    #[test]
    fn test_start_work_missing_project_path() {
        let env = WorkflowEnv::new();
        let mut project = env.project.clone();
        project.id = generate_id("ghost");
        project.path = "/nonexistent/path/for/capstan".to_string();
        env.storage.insert_project(&project).unwrap();

        let mut ticket = Ticket::new(
            generate_id("Orphan"),
            "Orphan".to_string(),
            project.id.clone(),
        );
        ticket.project_id = project.id.clone();
        env.storage.insert_ticket(&ticket).unwrap();

        let engine = WorkflowEngine::new(&env.storage);
        let err = engine.start_work(&ticket.id).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        // Nothing mutated.
        let loaded = env.storage.get_ticket(&ticket.id).unwrap();
        assert_eq!(loaded.status, TicketStatus::Backlog);
    }

    #[test]
    fn test_start_work_rollback_deletes_created_branch() {
        let env = WorkflowEnv::new();
        let ticket = seed_ticket(&env, "Doomed ticket");
        let failing = FailingStore {
            fail_start_transition: true,
            ..FailingStore::wrapping(&env.storage)
        };
        let engine = WorkflowEngine::new(&failing);

        let err = engine.start_work(&ticket.id).unwrap_err();
        assert!(matches!(err, Error::Other(_)));

        // Branch was deleted and HEAD restored to the prior branch.
        let expected = format!("feature/{}-doomed-ticket", ticket.short_id());
        assert!(!git::branch_exists(env.path(), &expected).unwrap());
        assert_eq!(git::current_branch(env.path()).unwrap(), "main");
        // Store untouched.
        let loaded = env.storage.get_ticket(&ticket.id).unwrap();
        assert_eq!(loaded.status, TicketStatus::Backlog);
        assert!(loaded.branch_name.is_none());
    }

    #[test]
    fn test_start_work_rollback_keeps_reused_branch() {
        let env = WorkflowEnv::new();
        let ticket = seed_ticket(&env, "Reused branch");
        let expected = format!("feature/{}-reused-branch", ticket.short_id());

        // Branch exists before the engine ever runs.
        git::create_branch(env.path(), &expected).unwrap();
        git::checkout(env.path(), "main").unwrap();

        let failing = FailingStore {
            fail_start_transition: true,
            ..FailingStore::wrapping(&env.storage)
        };
        let engine = WorkflowEngine::new(&failing);
        engine.start_work(&ticket.id).unwrap_err();

        // A reused branch is never deleted by rollback.
        assert!(git::branch_exists(env.path(), &expected).unwrap());
        assert_eq!(git::current_branch(env.path()).unwrap(), "main");
    }

    #[test]
    fn test_workflow_state_failure_is_warning_not_error() {
        let env = WorkflowEnv::new();
        let ticket = seed_ticket(&env, "State warning");
        let failing = FailingStore {
            fail_ticket_state: true,
            ..FailingStore::wrapping(&env.storage)
        };
        let engine = WorkflowEngine::new(&failing);

        let report = engine.start_work(&ticket.id).unwrap();
        assert!(!report.warnings.is_empty());
        // Ticket still started.
        let loaded = env.storage.get_ticket(&ticket.id).unwrap();
        assert_eq!(loaded.status, TicketStatus::InProgress);
    }

    #[test]
    fn test_complete_work_moves_to_ai_review() {
        let env = WorkflowEnv::new();
        let ticket = seed_ticket(&env, "Add login form");
        let engine = WorkflowEngine::new(&env.storage);
        engine.start_work(&ticket.id).unwrap();

        let report = engine
            .complete_work(&ticket.id, Some("added form + tests".to_string()))
            .unwrap();
        assert_eq!(report.ticket.status, TicketStatus::AiReview);
        assert_eq!(report.review_iteration, 1);
        assert!(report.already.is_none());

        let state = env.storage.get_ticket_state(&ticket.id).unwrap().unwrap();
        assert_eq!(state.phase, WorkflowPhase::AiReview);
        assert_eq!(state.review_iteration, 1);
    }

    #[test]
    fn test_complete_work_idempotent_past_in_progress() {
        let env = WorkflowEnv::new();
        let ticket = seed_ticket(&env, "Add login form");
        let engine = WorkflowEngine::new(&env.storage);
        engine.start_work(&ticket.id).unwrap();
        engine.complete_work(&ticket.id, None).unwrap();

        let again = engine.complete_work(&ticket.id, None).unwrap();
        assert!(again.already.is_some());
        // Iteration untouched by the no-op.
        let state = env.storage.get_ticket_state(&ticket.id).unwrap().unwrap();
        assert_eq!(state.review_iteration, 1);
    }

    #[test]
    fn test_complete_work_requires_started_ticket() {
        let env = WorkflowEnv::new();
        let ticket = seed_ticket(&env, "Never started");
        let engine = WorkflowEngine::new(&env.storage);
        let err = engine.complete_work(&ticket.id, None).unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));
    }

    #[test]
    fn test_fix_cycle_preserves_iteration() {
        let env = WorkflowEnv::new();
        let ticket = seed_ticket(&env, "Fix cycle");
        let engine = WorkflowEngine::new(&env.storage);

        engine.start_work(&ticket.id).unwrap();
        engine.complete_work(&ticket.id, None).unwrap();
        // Back to implementation for fixes, then complete again.
        engine.start_work(&ticket.id).unwrap();
        let state = env.storage.get_ticket_state(&ticket.id).unwrap().unwrap();
        assert_eq!(state.phase, WorkflowPhase::Implementation);
        assert_eq!(state.review_iteration, 1);

        let report = engine.complete_work(&ticket.id, None).unwrap();
        assert_eq!(report.review_iteration, 2);
    }

    #[test]
    fn test_epic_tickets_share_one_branch() {
        let env = WorkflowEnv::new();
        let epic = seed_epic(&env, "Checkout flow");
        let mut t2 = seed_ticket(&env, "Cart page");
        let mut t3 = seed_ticket(&env, "Payment page");
        t2.epic_id = Some(epic.id.clone());
        t3.epic_id = Some(epic.id.clone());
        env.storage.update_ticket(&t2).unwrap();
        env.storage.update_ticket(&t3).unwrap();

        let engine = WorkflowEngine::new(&env.storage);
        let epic_report = engine.start_epic_work(&epic.id, false).unwrap();
        let expected = format!("feature/epic-{}-checkout-flow", epic.short_id());
        assert_eq!(epic_report.branch_name, expected);
        assert!(epic_report.branch_created);

        let r2 = engine.start_work(&t2.id).unwrap();
        let r3 = engine.start_work(&t3.id).unwrap();
        assert!(r2.using_epic_branch);
        assert!(r3.using_epic_branch);
        assert_eq!(r2.branch_name, expected);
        assert_eq!(r3.branch_name, expected);
        assert!(!r2.branch_created);
        assert!(!r3.branch_created);
    }

    #[test]
    fn test_start_epic_work_counts_children() {
        let env = WorkflowEnv::new();
        let epic = seed_epic(&env, "Payments");
        for title in ["A", "B"] {
            let mut ticket = seed_ticket(&env, title);
            ticket.epic_id = Some(epic.id.clone());
            env.storage.update_ticket(&ticket).unwrap();
            if title == "B" {
                env.storage
                    .set_ticket_status(&ticket.id, TicketStatus::Done)
                    .unwrap();
            }
        }

        let engine = WorkflowEngine::new(&env.storage);
        let report = engine.start_epic_work(&epic.id, false).unwrap();
        assert_eq!(report.tickets_total, 2);
        assert_eq!(report.tickets_done, 1);

        let state = env.storage.get_epic_state(&epic.id).unwrap().unwrap();
        assert_eq!(state.tickets_total, 2);
        assert_eq!(state.tickets_done, 1);
    }

    #[test]
    fn test_start_epic_work_is_reentrant() {
        let env = WorkflowEnv::new();
        let epic = seed_epic(&env, "Payments");
        let engine = WorkflowEngine::new(&env.storage);

        let first = engine.start_epic_work(&epic.id, false).unwrap();
        assert!(first.branch_created);
        let second = engine.start_epic_work(&epic.id, false).unwrap();
        assert!(!second.branch_created);
        assert_eq!(second.branch_name, first.branch_name);
    }

    #[test]
    fn test_epic_branch_deleted_out_of_band_is_reported() {
        let env = WorkflowEnv::new();
        let epic = seed_epic(&env, "Payments");
        let engine = WorkflowEngine::new(&env.storage);

        let report = engine.start_epic_work(&epic.id, false).unwrap();
        git::checkout(env.path(), "main").unwrap();
        git::delete_branch(env.path(), &report.branch_name).unwrap();

        // No silent re-create; the caller is told to re-initialize.
        let err = engine.start_epic_work(&epic.id, false).unwrap_err();
        assert!(matches!(err, Error::EpicBranchMissing { .. }));

        let mut ticket = seed_ticket(&env, "Child");
        ticket.epic_id = Some(epic.id.clone());
        env.storage.update_ticket(&ticket).unwrap();
        let err = engine.start_work(&ticket.id).unwrap_err();
        assert!(matches!(err, Error::EpicBranchMissing { .. }));
    }

    #[test]
    fn test_worktree_isolation_provisions_checkout() {
        let env = WorkflowEnv::new();
        let mut epic = Epic::new(
            generate_id("Isolated"),
            "Isolated".to_string(),
            env.project.id.clone(),
        );
        epic.isolation = IsolationMode::Worktree;
        env.storage.insert_epic(&epic).unwrap();

        let engine = WorkflowEngine::new(&env.storage);
        let report = engine.start_epic_work(&epic.id, false).unwrap();
        let wt = report.worktree_path.expect("worktree path recorded");
        assert!(Path::new(&wt).exists());
        assert_eq!(
            git::current_branch(Path::new(&wt)).unwrap(),
            report.branch_name
        );
    }

    #[test]
    fn test_engine_never_assigns_done() {
        // done appears only as a pre-existing state check in the engine: a
        // full pass through every operation leaves it unset.
        let env = WorkflowEnv::new();
        let ticket = seed_ticket(&env, "Full pass");
        let engine = WorkflowEngine::new(&env.storage);

        engine.start_work(&ticket.id).unwrap();
        engine.complete_work(&ticket.id, None).unwrap();
        let loaded = env.storage.get_ticket(&ticket.id).unwrap();
        assert_ne!(loaded.status, TicketStatus::Done);
        assert!(loaded.completed_at.is_none());
    }
}
