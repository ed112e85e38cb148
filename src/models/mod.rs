//! Data models for Capstan entities.
//!
//! This module defines the core data structures:
//! - `Project` - A tracked repository that tickets and epics belong to
//! - `Ticket` - Work items with lifecycle status, priority, and branch linkage
//! - `Epic` - Groupings of tickets that may share one feature branch
//! - `EpicWorkflowState` / `TicketWorkflowState` - Durable workflow metadata
//! - `ReviewFinding` - Recorded review issues with severity and fix status
//! - `ConversationSession` - Audit-trail sessions bound to a ticket

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ticket lifecycle status.
///
/// The serialized strings are part of the persisted schema and must remain
/// stable across versions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    #[default]
    Backlog,
    Ready,
    InProgress,
    AiReview,
    HumanReview,
    Done,
}

impl TicketStatus {
    /// All statuses in lifecycle order.
    pub fn all() -> &'static [TicketStatus] {
        &[
            TicketStatus::Backlog,
            TicketStatus::Ready,
            TicketStatus::InProgress,
            TicketStatus::AiReview,
            TicketStatus::HumanReview,
            TicketStatus::Done,
        ]
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TicketStatus::Backlog => "backlog",
            TicketStatus::Ready => "ready",
            TicketStatus::InProgress => "in_progress",
            TicketStatus::AiReview => "ai_review",
            TicketStatus::HumanReview => "human_review",
            TicketStatus::Done => "done",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "backlog" => Ok(TicketStatus::Backlog),
            "ready" => Ok(TicketStatus::Ready),
            "in_progress" => Ok(TicketStatus::InProgress),
            "ai_review" => Ok(TicketStatus::AiReview),
            "human_review" => Ok(TicketStatus::HumanReview),
            "done" => Ok(TicketStatus::Done),
            _ => Err(format!("Unknown ticket status: {}", s)),
        }
    }
}

/// Workflow phase within a started ticket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowPhase {
    #[default]
    Implementation,
    AiReview,
    HumanReview,
}

impl fmt::Display for WorkflowPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkflowPhase::Implementation => "implementation",
            WorkflowPhase::AiReview => "ai_review",
            WorkflowPhase::HumanReview => "human_review",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for WorkflowPhase {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "implementation" => Ok(WorkflowPhase::Implementation),
            "ai_review" => Ok(WorkflowPhase::AiReview),
            "human_review" => Ok(WorkflowPhase::HumanReview),
            _ => Err(format!("Unknown workflow phase: {}", s)),
        }
    }
}

/// Severity of a review finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingSeverity {
    Critical,
    Major,
    Minor,
    Suggestion,
}

impl FindingSeverity {
    /// Whether an open finding of this severity blocks the review gate.
    pub fn is_blocking(&self) -> bool {
        matches!(self, FindingSeverity::Critical | FindingSeverity::Major)
    }
}

impl fmt::Display for FindingSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FindingSeverity::Critical => "critical",
            FindingSeverity::Major => "major",
            FindingSeverity::Minor => "minor",
            FindingSeverity::Suggestion => "suggestion",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for FindingSeverity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "critical" => Ok(FindingSeverity::Critical),
            "major" => Ok(FindingSeverity::Major),
            "minor" => Ok(FindingSeverity::Minor),
            "suggestion" => Ok(FindingSeverity::Suggestion),
            _ => Err(format!("Unknown severity: {}", s)),
        }
    }
}

/// Fix status of a review finding. Findings are append-only; fixing one
/// flips this flag, never deletes the row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixStatus {
    #[default]
    Open,
    Fixed,
}

impl fmt::Display for FixStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FixStatus::Open => write!(f, "open"),
            FixStatus::Fixed => write!(f, "fixed"),
        }
    }
}

impl std::str::FromStr for FixStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "open" => Ok(FixStatus::Open),
            "fixed" => Ok(FixStatus::Fixed),
            _ => Err(format!("Unknown fix status: {}", s)),
        }
    }
}

/// Branch isolation mode for an epic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationMode {
    /// All of the epic's tickets share one branch in the trunk working tree.
    #[default]
    SharedBranch,
    /// The epic gets a dedicated `git worktree` checkout.
    Worktree,
}

impl fmt::Display for IsolationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IsolationMode::SharedBranch => write!(f, "shared_branch"),
            IsolationMode::Worktree => write!(f, "worktree"),
        }
    }
}

impl std::str::FromStr for IsolationMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "shared_branch" | "shared-branch" => Ok(IsolationMode::SharedBranch),
            "worktree" => Ok(IsolationMode::Worktree),
            _ => Err(format!("Unknown isolation mode: {}", s)),
        }
    }
}

/// A tracked repository that tickets and epics belong to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Unique identifier (32 hex chars)
    pub id: String,

    /// Project name
    pub name: String,

    /// Filesystem path of the repository root
    pub path: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Create a new project record for a repository path.
    pub fn new(id: String, name: String, path: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            name,
            path,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A unit of work with a single-owner lifecycle status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    /// Unique identifier (32 hex chars; first 8 form the branch short id)
    pub id: String,

    /// Ticket title
    pub title: String,

    /// Detailed description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Current lifecycle status
    #[serde(default)]
    pub status: TicketStatus,

    /// Priority level (0-4, lower is higher priority)
    #[serde(default)]
    pub priority: u8,

    /// Ordering within a status column
    #[serde(default)]
    pub position: i64,

    /// Owning project
    pub project_id: String,

    /// Owning epic, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epic_id: Option<String>,

    /// Tags for categorization
    #[serde(default)]
    pub tags: Vec<String>,

    /// Branch name once work has started
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<String>,

    /// Completion timestamp, set by the external human-approval action
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    /// Create a new ticket in the backlog.
    pub fn new(id: String, title: String, project_id: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            title,
            description: None,
            status: TicketStatus::default(),
            priority: 2,
            position: 0,
            project_id,
            epic_id: None,
            tags: Vec::new(),
            branch_name: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The 8-character id prefix used in branch names.
    pub fn short_id(&self) -> &str {
        short_id(&self.id)
    }
}

/// A named grouping of tickets that may share one branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Epic {
    /// Unique identifier (32 hex chars)
    pub id: String,

    /// Epic title
    pub title: String,

    /// Detailed description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Owning project
    pub project_id: String,

    /// Branch isolation mode
    #[serde(default)]
    pub isolation: IsolationMode,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Epic {
    /// Create a new epic with shared-branch isolation.
    pub fn new(id: String, title: String, project_id: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            title,
            description: None,
            project_id,
            isolation: IsolationMode::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// The 8-character id prefix used in branch names.
    pub fn short_id(&self) -> &str {
        short_id(&self.id)
    }
}

/// Durable memory of which branch an epic committed to.
///
/// Created lazily on the first `work start` / `epic start` call for the
/// epic; never deleted, only updated. Once `branch_name` is set it is
/// authoritative for every ticket in the epic, across process restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpicWorkflowState {
    /// Owning epic
    pub epic_id: String,

    /// Resolved shared branch name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<String>,

    /// When the shared branch was created
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch_created_at: Option<DateTime<Utc>>,

    /// Dedicated checkout path for worktree isolation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worktree_path: Option<String>,

    /// Ticket currently being worked in this epic
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_ticket_id: Option<String>,

    /// Linked pull request number
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pr_number: Option<i64>,

    /// Linked pull request URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,

    /// Linked pull request status (e.g., "draft")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pr_status: Option<String>,

    /// Total child tickets at last recount
    #[serde(default)]
    pub tickets_total: i64,

    /// Completed child tickets at last recount
    #[serde(default)]
    pub tickets_done: i64,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl EpicWorkflowState {
    /// Create an empty workflow state for an epic.
    pub fn new(epic_id: String) -> Self {
        Self {
            epic_id,
            branch_name: None,
            branch_created_at: None,
            worktree_path: None,
            current_ticket_id: None,
            pr_number: None,
            pr_url: None,
            pr_status: None,
            tickets_total: 0,
            tickets_done: 0,
            updated_at: Utc::now(),
        }
    }
}

/// Per-ticket workflow metadata, separate from the ticket's own status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketWorkflowState {
    /// Owning ticket
    pub ticket_id: String,

    /// Current phase
    #[serde(default)]
    pub phase: WorkflowPhase,

    /// Bumped each time the ticket re-enters AI review
    #[serde(default)]
    pub review_iteration: i64,

    /// Findings raised against this ticket
    #[serde(default)]
    pub findings_raised: i64,

    /// Findings marked fixed on this ticket
    #[serde(default)]
    pub findings_fixed: i64,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl TicketWorkflowState {
    /// Create a fresh implementation-phase state.
    pub fn new(ticket_id: String) -> Self {
        Self {
            ticket_id,
            phase: WorkflowPhase::Implementation,
            review_iteration: 0,
            findings_raised: 0,
            findings_fixed: 0,
            updated_at: Utc::now(),
        }
    }
}

/// A recorded issue against a ticket's implementation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewFinding {
    /// Unique identifier (32 hex chars)
    pub id: String,

    /// Owning ticket
    pub ticket_id: String,

    /// Authoring reviewer or agent identifier
    pub reviewer: String,

    /// Severity level
    pub severity: FindingSeverity,

    /// Category (e.g., "correctness", "style")
    pub category: String,

    /// What was found
    pub description: String,

    /// Fix status; flipping this is the audit trail, rows are never deleted
    #[serde(default)]
    pub fix_status: FixStatus,

    /// How it was fixed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix_description: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// When the finding was marked fixed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed_at: Option<DateTime<Utc>>,
}

impl ReviewFinding {
    /// Create a new open finding.
    pub fn new(
        id: String,
        ticket_id: String,
        reviewer: String,
        severity: FindingSeverity,
        category: String,
        description: String,
    ) -> Self {
        Self {
            id,
            ticket_id,
            reviewer,
            severity,
            category,
            description,
            fix_status: FixStatus::Open,
            fix_description: None,
            created_at: Utc::now(),
            fixed_at: None,
        }
    }

    /// Whether this finding currently blocks the review gate.
    pub fn blocks_gate(&self) -> bool {
        self.fix_status == FixStatus::Open && self.severity.is_blocking()
    }
}

/// A compliance-log session bound to a ticket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSession {
    /// Unique identifier (uuid v4, simple format)
    pub id: String,

    /// Owning ticket
    pub ticket_id: String,

    /// Owning project
    pub project_id: String,

    /// Environment label (e.g., "terminal", "sandbox")
    pub environment: String,

    /// Session start timestamp
    pub started_at: DateTime<Utc>,

    /// Session end timestamp; None while active
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl ConversationSession {
    /// Open a new session.
    pub fn new(id: String, ticket_id: String, project_id: String, environment: String) -> Self {
        Self {
            id,
            ticket_id,
            project_id,
            environment,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Whether the session is still open.
    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }
}

/// The 8-character short form of a 32-hex-char entity id.
pub fn short_id(id: &str) -> &str {
    if id.len() >= 8 { &id[..8] } else { id }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticket_status_serialization() {
        let status = TicketStatus::AiReview;
        let json = serde_json::to_string(&status).unwrap();
        assert_eq!(json, r#""ai_review""#);

        let parsed: TicketStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, TicketStatus::AiReview);
    }

    #[test]
    fn test_ticket_status_strings_are_stable() {
        // Persisted schema contract: these exact strings, nothing else.
        let expected = [
            "backlog",
            "ready",
            "in_progress",
            "ai_review",
            "human_review",
            "done",
        ];
        for (status, want) in TicketStatus::all().iter().zip(expected) {
            assert_eq!(status.to_string(), want);
            assert_eq!(want.parse::<TicketStatus>().unwrap(), *status);
        }
    }

    #[test]
    fn test_workflow_phase_roundtrip() {
        for s in ["implementation", "ai_review", "human_review"] {
            let phase: WorkflowPhase = s.parse().unwrap();
            assert_eq!(phase.to_string(), s);
        }
        assert!("review".parse::<WorkflowPhase>().is_err());
    }

    #[test]
    fn test_severity_blocking() {
        assert!(FindingSeverity::Critical.is_blocking());
        assert!(FindingSeverity::Major.is_blocking());
        assert!(!FindingSeverity::Minor.is_blocking());
        assert!(!FindingSeverity::Suggestion.is_blocking());
    }

    #[test]
    fn test_finding_blocks_gate_only_while_open() {
        let mut finding = ReviewFinding::new(
            "f".repeat(32),
            "t".repeat(32),
            "reviewer-1".to_string(),
            FindingSeverity::Major,
            "correctness".to_string(),
            "off by one".to_string(),
        );
        assert!(finding.blocks_gate());

        finding.fix_status = FixStatus::Fixed;
        assert!(!finding.blocks_gate());
    }

    #[test]
    fn test_isolation_mode_accepts_both_spellings() {
        assert_eq!(
            "shared-branch".parse::<IsolationMode>().unwrap(),
            IsolationMode::SharedBranch
        );
        assert_eq!(
            "shared_branch".parse::<IsolationMode>().unwrap(),
            IsolationMode::SharedBranch
        );
        assert_eq!(
            "worktree".parse::<IsolationMode>().unwrap(),
            IsolationMode::Worktree
        );
    }

    #[test]
    fn test_ticket_serialization_roundtrip() {
        let ticket = Ticket::new(
            "a1b2c3d4".repeat(4),
            "Add login form".to_string(),
            "p".repeat(32),
        );
        let json = serde_json::to_string(&ticket).unwrap();
        let parsed: Ticket = serde_json::from_str(&json).unwrap();
        assert_eq!(ticket.id, parsed.id);
        assert_eq!(parsed.status, TicketStatus::Backlog);
        assert_eq!(parsed.priority, 2);
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("a1b2c3d4e5f6"), "a1b2c3d4");
        assert_eq!(short_id("abc"), "abc");

        let ticket = Ticket::new("a1b2c3d4".repeat(4), "Login".to_string(), "p".repeat(32));
        assert_eq!(ticket.short_id(), "a1b2c3d4");
    }

    #[test]
    fn test_session_active() {
        let mut session = ConversationSession::new(
            "s".repeat(32),
            "t".repeat(32),
            "p".repeat(32),
            "terminal".to_string(),
        );
        assert!(session.is_active());
        session.ended_at = Some(Utc::now());
        assert!(!session.is_active());
    }
}
