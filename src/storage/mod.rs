//! Storage layer for Capstan data.
//!
//! SQLite is the system of record: one `cache.db` per tracked repository,
//! living under `~/.local/share/capstan/<repo-hash>/` (overridable with the
//! `CAPSTAN_DATA_DIR` environment variable, or injected directly via the
//! `*_with_data_dir` constructors in tests).
//!
//! Writes that must appear atomic to a single workflow step (ticket status +
//! branch name) run inside one transaction; everything else is row-level CRUD
//! over the workflow entities.

use crate::models::{
    ConversationSession, Epic, EpicWorkflowState, FindingSeverity, FixStatus, IsolationMode,
    Project, ReviewFinding, Ticket, TicketStatus, TicketWorkflowState, WorkflowPhase,
};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// Storage manager for a single repository.
pub struct Storage {
    /// Root directory for this repository's data
    pub root: PathBuf,
    /// SQLite connection
    conn: Connection,
}

impl Storage {
    /// Open existing storage for the given repository path.
    pub fn open(repo_path: &Path) -> Result<Self> {
        let root = get_storage_dir(repo_path)?;
        Self::open_at(root)
    }

    /// Open or create storage for the given repository path.
    pub fn init(repo_path: &Path) -> Result<Self> {
        let root = get_storage_dir(repo_path)?;
        Self::init_at(root)
    }

    /// Check if storage exists for the given repository.
    pub fn exists(repo_path: &Path) -> Result<bool> {
        let root = get_storage_dir(repo_path)?;
        Ok(root.join("cache.db").exists())
    }

    /// Open storage rooted at an explicit data directory (test DI).
    pub fn open_with_data_dir(repo_path: &Path, data_dir: &Path) -> Result<Self> {
        let root = storage_dir_under(data_dir, repo_path)?;
        Self::open_at(root)
    }

    /// Initialize storage rooted at an explicit data directory (test DI).
    pub fn init_with_data_dir(repo_path: &Path, data_dir: &Path) -> Result<Self> {
        let root = storage_dir_under(data_dir, repo_path)?;
        Self::init_at(root)
    }

    fn open_at(root: PathBuf) -> Result<Self> {
        if !root.join("cache.db").exists() {
            return Err(Error::NotInitialized);
        }
        let conn = Connection::open(root.join("cache.db"))?;
        Self::init_schema(&conn)?;
        Ok(Self { root, conn })
    }

    fn init_at(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root)?;
        let conn = Connection::open(root.join("cache.db"))?;
        Self::init_schema(&conn)?;
        Ok(Self { root, conn })
    }

    /// Initialize the SQLite schema.
    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS projects (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                path TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS epics (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT,
                project_id TEXT NOT NULL REFERENCES projects(id),
                isolation TEXT NOT NULL DEFAULT 'shared_branch',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS tickets (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT,
                status TEXT NOT NULL DEFAULT 'backlog',
                priority INTEGER NOT NULL DEFAULT 2,
                position INTEGER NOT NULL DEFAULT 0,
                project_id TEXT NOT NULL REFERENCES projects(id),
                epic_id TEXT REFERENCES epics(id),
                branch_name TEXT,
                completed_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS ticket_tags (
                ticket_id TEXT NOT NULL,
                tag TEXT NOT NULL,
                PRIMARY KEY (ticket_id, tag),
                FOREIGN KEY (ticket_id) REFERENCES tickets(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS ticket_subtasks (
                ticket_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                title TEXT NOT NULL,
                done INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (ticket_id, position),
                FOREIGN KEY (ticket_id) REFERENCES tickets(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS ticket_attachments (
                ticket_id TEXT NOT NULL,
                name TEXT NOT NULL,
                path TEXT NOT NULL,
                added_at TEXT NOT NULL,
                PRIMARY KEY (ticket_id, name),
                FOREIGN KEY (ticket_id) REFERENCES tickets(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS epic_workflow_states (
                epic_id TEXT PRIMARY KEY REFERENCES epics(id),
                branch_name TEXT,
                branch_created_at TEXT,
                worktree_path TEXT,
                current_ticket_id TEXT,
                pr_number INTEGER,
                pr_url TEXT,
                pr_status TEXT,
                tickets_total INTEGER NOT NULL DEFAULT 0,
                tickets_done INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS ticket_workflow_states (
                ticket_id TEXT PRIMARY KEY REFERENCES tickets(id),
                phase TEXT NOT NULL DEFAULT 'implementation',
                review_iteration INTEGER NOT NULL DEFAULT 0,
                findings_raised INTEGER NOT NULL DEFAULT 0,
                findings_fixed INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS review_findings (
                id TEXT PRIMARY KEY,
                ticket_id TEXT NOT NULL REFERENCES tickets(id),
                reviewer TEXT NOT NULL,
                severity TEXT NOT NULL,
                category TEXT NOT NULL,
                description TEXT NOT NULL,
                fix_status TEXT NOT NULL DEFAULT 'open',
                fix_description TEXT,
                created_at TEXT NOT NULL,
                fixed_at TEXT
            );

            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                ticket_id TEXT NOT NULL REFERENCES tickets(id),
                project_id TEXT NOT NULL REFERENCES projects(id),
                environment TEXT NOT NULL,
                started_at TEXT NOT NULL,
                ended_at TEXT
            );

            CREATE TABLE IF NOT EXISTS demo_steps (
                ticket_id TEXT NOT NULL REFERENCES tickets(id),
                position INTEGER NOT NULL,
                instruction TEXT NOT NULL,
                PRIMARY KEY (ticket_id, position)
            );

            CREATE TABLE IF NOT EXISTS config (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tickets_status ON tickets(status);
            CREATE INDEX IF NOT EXISTS idx_tickets_epic ON tickets(epic_id);
            CREATE INDEX IF NOT EXISTS idx_findings_ticket ON review_findings(ticket_id);
            CREATE INDEX IF NOT EXISTS idx_findings_status ON review_findings(fix_status);
            CREATE INDEX IF NOT EXISTS idx_sessions_ticket ON sessions(ticket_id);
            "#,
        )?;
        Ok(())
    }

    // === Projects ===

    /// Insert a project record.
    pub fn insert_project(&self, project: &Project) -> Result<()> {
        self.conn.execute(
            "INSERT INTO projects (id, name, path, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                project.id,
                project.name,
                project.path,
                project.created_at.to_rfc3339(),
                project.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Get a project by id.
    pub fn get_project(&self, id: &str) -> Result<Project> {
        self.conn
            .query_row(
                "SELECT id, name, path, created_at, updated_at FROM projects WHERE id = ?1",
                params![id],
                project_from_row,
            )
            .map_err(|e| not_found(e, &format!("Project not found: {}", id)))
    }

    /// Find the project registered for a repository path.
    pub fn find_project_by_path(&self, path: &str) -> Result<Option<Project>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, path, created_at, updated_at FROM projects WHERE path = ?1",
        )?;
        let mut rows = stmt.query_map(params![path], project_from_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    // === Tickets ===

    /// Insert a ticket and its tags.
    pub fn insert_ticket(&self, ticket: &Ticket) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO tickets (id, title, description, status, priority, position,
                                  project_id, epic_id, branch_name, completed_at,
                                  created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                ticket.id,
                ticket.title,
                ticket.description,
                ticket.status.to_string(),
                ticket.priority,
                ticket.position,
                ticket.project_id,
                ticket.epic_id,
                ticket.branch_name,
                ticket.completed_at.map(|t| t.to_rfc3339()),
                ticket.created_at.to_rfc3339(),
                ticket.updated_at.to_rfc3339(),
            ],
        )?;
        for tag in &ticket.tags {
            tx.execute(
                "INSERT OR IGNORE INTO ticket_tags (ticket_id, tag) VALUES (?1, ?2)",
                params![ticket.id, tag],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Get a ticket by id, tags included.
    pub fn get_ticket(&self, id: &str) -> Result<Ticket> {
        let mut ticket = self
            .conn
            .query_row(
                "SELECT id, title, description, status, priority, position, project_id,
                        epic_id, branch_name, completed_at, created_at, updated_at
                 FROM tickets WHERE id = ?1",
                params![id],
                ticket_from_row,
            )
            .map_err(|e| not_found(e, &format!("Ticket not found: {}", id)))?;
        ticket.tags = self.ticket_tags(&ticket.id)?;
        Ok(ticket)
    }

    /// List tickets, optionally filtered by status and/or epic.
    pub fn list_tickets(
        &self,
        status: Option<TicketStatus>,
        epic_id: Option<&str>,
    ) -> Result<Vec<Ticket>> {
        let mut sql = String::from(
            "SELECT id, title, description, status, priority, position, project_id,
                    epic_id, branch_name, completed_at, created_at, updated_at
             FROM tickets WHERE 1=1",
        );
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(s) = status {
            sql.push_str(" AND status = ?");
            params_vec.push(Box::new(s.to_string()));
        }
        if let Some(e) = epic_id {
            sql.push_str(" AND epic_id = ?");
            params_vec.push(Box::new(e.to_string()));
        }
        sql.push_str(" ORDER BY status, position, priority, created_at");

        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_refs.as_slice(), ticket_from_row)?;

        let mut tickets = Vec::new();
        for row in rows {
            let mut ticket = row?;
            ticket.tags = self.ticket_tags(&ticket.id)?;
            tickets.push(ticket);
        }
        Ok(tickets)
    }

    fn ticket_tags(&self, ticket_id: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT tag FROM ticket_tags WHERE ticket_id = ?1 ORDER BY tag")?;
        let tags = stmt
            .query_map(params![ticket_id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(tags)
    }

    /// Update a ticket's editable fields (title, description, priority,
    /// position, epic membership) and replace its tags.
    pub fn update_ticket(&self, ticket: &Ticket) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let changed = tx.execute(
            "UPDATE tickets SET title = ?2, description = ?3, priority = ?4,
                                position = ?5, epic_id = ?6, updated_at = ?7
             WHERE id = ?1",
            params![
                ticket.id,
                ticket.title,
                ticket.description,
                ticket.priority,
                ticket.position,
                ticket.epic_id,
                Utc::now().to_rfc3339(),
            ],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(format!("Ticket not found: {}", ticket.id)));
        }
        tx.execute(
            "DELETE FROM ticket_tags WHERE ticket_id = ?1",
            params![ticket.id],
        )?;
        for tag in &ticket.tags {
            tx.execute(
                "INSERT OR IGNORE INTO ticket_tags (ticket_id, tag) VALUES (?1, ?2)",
                params![ticket.id, tag],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Set a ticket's status directly.
    ///
    /// Used by the command layer for backlog/ready grooming and the external
    /// human-approval action; the workflow engine uses the transition methods
    /// below instead.
    pub fn set_ticket_status(&self, id: &str, status: TicketStatus) -> Result<()> {
        let completed_at = if status == TicketStatus::Done {
            Some(Utc::now().to_rfc3339())
        } else {
            None
        };
        let changed = self.conn.execute(
            "UPDATE tickets SET status = ?2, completed_at = ?3, updated_at = ?4 WHERE id = ?1",
            params![
                id,
                status.to_string(),
                completed_at,
                Utc::now().to_rfc3339()
            ],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(format!("Ticket not found: {}", id)));
        }
        Ok(())
    }

    /// Persist the start-of-work transition: status to `in_progress` and the
    /// resolved branch name, atomically.
    pub fn persist_start_transition(&self, id: &str, branch_name: &str) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let changed = tx.execute(
            "UPDATE tickets SET status = ?2, branch_name = ?3, updated_at = ?4 WHERE id = ?1",
            params![
                id,
                TicketStatus::InProgress.to_string(),
                branch_name,
                Utc::now().to_rfc3339(),
            ],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(format!("Ticket not found: {}", id)));
        }
        tx.commit()?;
        Ok(())
    }

    /// Persist the completion transition: status to `ai_review`.
    pub fn persist_review_transition(&self, id: &str) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE tickets SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![
                id,
                TicketStatus::AiReview.to_string(),
                Utc::now().to_rfc3339()
            ],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(format!("Ticket not found: {}", id)));
        }
        Ok(())
    }

    /// Persist the review-gate transition: status to `human_review`.
    pub fn persist_human_review_transition(&self, id: &str) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE tickets SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![
                id,
                TicketStatus::HumanReview.to_string(),
                Utc::now().to_rfc3339()
            ],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(format!("Ticket not found: {}", id)));
        }
        Ok(())
    }

    // === Subtasks & attachments ===

    /// Append a subtask, returning its position.
    pub fn add_subtask(&self, ticket_id: &str, title: &str) -> Result<i64> {
        let next: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(position), 0) + 1 FROM ticket_subtasks WHERE ticket_id = ?1",
            params![ticket_id],
            |row| row.get(0),
        )?;
        self.conn.execute(
            "INSERT INTO ticket_subtasks (ticket_id, position, title, done) VALUES (?1, ?2, ?3, 0)",
            params![ticket_id, next, title],
        )?;
        Ok(next)
    }

    /// List subtasks as (position, title, done).
    pub fn list_subtasks(&self, ticket_id: &str) -> Result<Vec<(i64, String, bool)>> {
        let mut stmt = self.conn.prepare(
            "SELECT position, title, done FROM ticket_subtasks
             WHERE ticket_id = ?1 ORDER BY position",
        )?;
        let rows = stmt
            .query_map(params![ticket_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)? != 0,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Flip a subtask's done flag.
    pub fn set_subtask_done(&self, ticket_id: &str, position: i64, done: bool) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE ticket_subtasks SET done = ?3 WHERE ticket_id = ?1 AND position = ?2",
            params![ticket_id, position, done as i64],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(format!(
                "Subtask {} not found on ticket {}",
                position, ticket_id
            )));
        }
        Ok(())
    }

    /// Record an attachment reference.
    pub fn add_attachment(&self, ticket_id: &str, name: &str, path: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO ticket_attachments (ticket_id, name, path, added_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![ticket_id, name, path, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// List attachments as (name, path).
    pub fn list_attachments(&self, ticket_id: &str) -> Result<Vec<(String, String)>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, path FROM ticket_attachments WHERE ticket_id = ?1 ORDER BY name",
        )?;
        let rows = stmt
            .query_map(params![ticket_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // === Epics ===

    /// Insert an epic record.
    pub fn insert_epic(&self, epic: &Epic) -> Result<()> {
        self.conn.execute(
            "INSERT INTO epics (id, title, description, project_id, isolation,
                                created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                epic.id,
                epic.title,
                epic.description,
                epic.project_id,
                epic.isolation.to_string(),
                epic.created_at.to_rfc3339(),
                epic.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Get an epic by id.
    pub fn get_epic(&self, id: &str) -> Result<Epic> {
        self.conn
            .query_row(
                "SELECT id, title, description, project_id, isolation, created_at, updated_at
                 FROM epics WHERE id = ?1",
                params![id],
                epic_from_row,
            )
            .map_err(|e| not_found(e, &format!("Epic not found: {}", id)))
    }

    /// List all epics.
    pub fn list_epics(&self) -> Result<Vec<Epic>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title, description, project_id, isolation, created_at, updated_at
             FROM epics ORDER BY created_at",
        )?;
        let epics = stmt
            .query_map([], epic_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(epics)
    }

    /// Count an epic's child tickets: (total, done).
    pub fn epic_ticket_counts(&self, epic_id: &str) -> Result<(i64, i64)> {
        let total: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM tickets WHERE epic_id = ?1",
            params![epic_id],
            |row| row.get(0),
        )?;
        let done: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM tickets WHERE epic_id = ?1 AND status = 'done'",
            params![epic_id],
            |row| row.get(0),
        )?;
        Ok((total, done))
    }

    // === Workflow state ===

    /// Get an epic's workflow state, if any.
    pub fn get_epic_state(&self, epic_id: &str) -> Result<Option<EpicWorkflowState>> {
        let mut stmt = self.conn.prepare(
            "SELECT epic_id, branch_name, branch_created_at, worktree_path,
                    current_ticket_id, pr_number, pr_url, pr_status,
                    tickets_total, tickets_done, updated_at
             FROM epic_workflow_states WHERE epic_id = ?1",
        )?;
        let mut rows = stmt.query_map(params![epic_id], epic_state_from_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Insert or update an epic's workflow state.
    pub fn upsert_epic_state(&self, state: &EpicWorkflowState) -> Result<()> {
        self.conn.execute(
            "INSERT INTO epic_workflow_states
                 (epic_id, branch_name, branch_created_at, worktree_path,
                  current_ticket_id, pr_number, pr_url, pr_status,
                  tickets_total, tickets_done, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(epic_id) DO UPDATE SET
                 branch_name = excluded.branch_name,
                 branch_created_at = excluded.branch_created_at,
                 worktree_path = excluded.worktree_path,
                 current_ticket_id = excluded.current_ticket_id,
                 pr_number = excluded.pr_number,
                 pr_url = excluded.pr_url,
                 pr_status = excluded.pr_status,
                 tickets_total = excluded.tickets_total,
                 tickets_done = excluded.tickets_done,
                 updated_at = excluded.updated_at",
            params![
                state.epic_id,
                state.branch_name,
                state.branch_created_at.map(|t| t.to_rfc3339()),
                state.worktree_path,
                state.current_ticket_id,
                state.pr_number,
                state.pr_url,
                state.pr_status,
                state.tickets_total,
                state.tickets_done,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Get a ticket's workflow state, if any.
    pub fn get_ticket_state(&self, ticket_id: &str) -> Result<Option<TicketWorkflowState>> {
        let mut stmt = self.conn.prepare(
            "SELECT ticket_id, phase, review_iteration, findings_raised,
                    findings_fixed, updated_at
             FROM ticket_workflow_states WHERE ticket_id = ?1",
        )?;
        let mut rows = stmt.query_map(params![ticket_id], ticket_state_from_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Insert or update a ticket's workflow state.
    pub fn upsert_ticket_state(&self, state: &TicketWorkflowState) -> Result<()> {
        self.conn.execute(
            "INSERT INTO ticket_workflow_states
                 (ticket_id, phase, review_iteration, findings_raised,
                  findings_fixed, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(ticket_id) DO UPDATE SET
                 phase = excluded.phase,
                 review_iteration = excluded.review_iteration,
                 findings_raised = excluded.findings_raised,
                 findings_fixed = excluded.findings_fixed,
                 updated_at = excluded.updated_at",
            params![
                state.ticket_id,
                state.phase.to_string(),
                state.review_iteration,
                state.findings_raised,
                state.findings_fixed,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    // === Review findings ===

    /// Insert a review finding.
    pub fn insert_finding(&self, finding: &ReviewFinding) -> Result<()> {
        self.conn.execute(
            "INSERT INTO review_findings
                 (id, ticket_id, reviewer, severity, category, description,
                  fix_status, fix_description, created_at, fixed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                finding.id,
                finding.ticket_id,
                finding.reviewer,
                finding.severity.to_string(),
                finding.category,
                finding.description,
                finding.fix_status.to_string(),
                finding.fix_description,
                finding.created_at.to_rfc3339(),
                finding.fixed_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    /// Get a finding by id.
    pub fn get_finding(&self, id: &str) -> Result<ReviewFinding> {
        self.conn
            .query_row(
                "SELECT id, ticket_id, reviewer, severity, category, description,
                        fix_status, fix_description, created_at, fixed_at
                 FROM review_findings WHERE id = ?1",
                params![id],
                finding_from_row,
            )
            .map_err(|e| not_found(e, &format!("Finding not found: {}", id)))
    }

    /// List all findings for a ticket, oldest first.
    pub fn list_findings(&self, ticket_id: &str) -> Result<Vec<ReviewFinding>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, ticket_id, reviewer, severity, category, description,
                    fix_status, fix_description, created_at, fixed_at
             FROM review_findings WHERE ticket_id = ?1 ORDER BY created_at, id",
        )?;
        let findings = stmt
            .query_map(params![ticket_id], finding_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(findings)
    }

    /// Flip a finding to fixed. Rows are never deleted; this is the audit trail.
    pub fn mark_finding_fixed(&self, id: &str, fix_description: Option<&str>) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE review_findings
             SET fix_status = 'fixed', fix_description = ?2, fixed_at = ?3
             WHERE id = ?1",
            params![id, fix_description, Utc::now().to_rfc3339()],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(format!("Finding not found: {}", id)));
        }
        Ok(())
    }

    // === Conversation sessions ===

    /// Insert a conversation session.
    pub fn insert_session(&self, session: &ConversationSession) -> Result<()> {
        self.conn.execute(
            "INSERT INTO sessions (id, ticket_id, project_id, environment, started_at, ended_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                session.id,
                session.ticket_id,
                session.project_id,
                session.environment,
                session.started_at.to_rfc3339(),
                session.ended_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    /// End every open session for a ticket, returning how many were ended.
    pub fn end_open_sessions(&self, ticket_id: &str) -> Result<usize> {
        let changed = self.conn.execute(
            "UPDATE sessions SET ended_at = ?2 WHERE ticket_id = ?1 AND ended_at IS NULL",
            params![ticket_id, Utc::now().to_rfc3339()],
        )?;
        Ok(changed)
    }

    /// The active (unended) session for a ticket, if one exists.
    pub fn active_session(&self, ticket_id: &str) -> Result<Option<ConversationSession>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, ticket_id, project_id, environment, started_at, ended_at
             FROM sessions WHERE ticket_id = ?1 AND ended_at IS NULL
             ORDER BY started_at DESC",
        )?;
        let mut rows = stmt.query_map(params![ticket_id], session_from_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// List all sessions for a ticket, oldest first.
    pub fn list_sessions(&self, ticket_id: &str) -> Result<Vec<ConversationSession>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, ticket_id, project_id, environment, started_at, ended_at
             FROM sessions WHERE ticket_id = ?1 ORDER BY started_at",
        )?;
        let sessions = stmt
            .query_map(params![ticket_id], session_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(sessions)
    }

    // === Demo scripts ===

    /// Replace the demo script for a ticket.
    pub fn replace_demo_steps(&self, ticket_id: &str, steps: &[String]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM demo_steps WHERE ticket_id = ?1",
            params![ticket_id],
        )?;
        for (i, step) in steps.iter().enumerate() {
            tx.execute(
                "INSERT INTO demo_steps (ticket_id, position, instruction) VALUES (?1, ?2, ?3)",
                params![ticket_id, (i + 1) as i64, step],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// List the demo script steps for a ticket, in order.
    pub fn list_demo_steps(&self, ticket_id: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT instruction FROM demo_steps WHERE ticket_id = ?1 ORDER BY position",
        )?;
        let steps = stmt
            .query_map(params![ticket_id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(steps)
    }

    // === Id resolution ===

    /// Resolve a ticket id from a unique hex prefix (8 chars or more).
    pub fn resolve_ticket_id(&self, prefix: &str) -> Result<String> {
        self.resolve_id("tickets", prefix)
    }

    /// Resolve an epic id from a unique hex prefix.
    pub fn resolve_epic_id(&self, prefix: &str) -> Result<String> {
        self.resolve_id("epics", prefix)
    }

    /// Resolve a finding id from a unique hex prefix.
    pub fn resolve_finding_id(&self, prefix: &str) -> Result<String> {
        self.resolve_id("review_findings", prefix)
    }

    fn resolve_id(&self, table: &str, prefix: &str) -> Result<String> {
        if prefix.len() < 8 || !prefix.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::InvalidId(format!(
                "ID prefix must be at least 8 hex characters, got: {}",
                prefix
            )));
        }
        let sql = format!("SELECT id FROM {} WHERE id LIKE ?1 ORDER BY id LIMIT 2", table);
        let mut stmt = self.conn.prepare(&sql)?;
        let pattern = format!("{}%", prefix);
        let ids: Vec<String> = stmt
            .query_map(params![pattern], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        match ids.len() {
            0 => Err(Error::NotFound(format!("No entity with id {}", prefix))),
            1 => Ok(ids.into_iter().next().unwrap_or_default()),
            _ => Err(Error::InvalidId(format!(
                "ID prefix {} is ambiguous; give more characters",
                prefix
            ))),
        }
    }

    // === Config ===

    /// Get a configuration value.
    pub fn get_config(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM config WHERE key = ?1")?;
        let mut rows = stmt.query_map(params![key], |row| row.get::<_, String>(0))?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Set a configuration value.
    pub fn set_config(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO config (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}

// === Row mapping ===

fn parse_ts(idx: usize, s: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn parse_opt_ts(idx: usize, s: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    s.map(|s| parse_ts(idx, s)).transpose()
}

fn parse_enum<T: std::str::FromStr<Err = String>>(idx: usize, s: String) -> rusqlite::Result<T> {
    s.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
        )
    })
}

fn project_from_row(row: &Row) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        path: row.get(2)?,
        created_at: parse_ts(3, row.get(3)?)?,
        updated_at: parse_ts(4, row.get(4)?)?,
    })
}

fn ticket_from_row(row: &Row) -> rusqlite::Result<Ticket> {
    Ok(Ticket {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        status: parse_enum::<TicketStatus>(3, row.get(3)?)?,
        priority: row.get(4)?,
        position: row.get(5)?,
        project_id: row.get(6)?,
        epic_id: row.get(7)?,
        tags: Vec::new(),
        branch_name: row.get(8)?,
        completed_at: parse_opt_ts(9, row.get(9)?)?,
        created_at: parse_ts(10, row.get(10)?)?,
        updated_at: parse_ts(11, row.get(11)?)?,
    })
}

fn epic_from_row(row: &Row) -> rusqlite::Result<Epic> {
    Ok(Epic {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        project_id: row.get(3)?,
        isolation: parse_enum::<IsolationMode>(4, row.get(4)?)?,
        created_at: parse_ts(5, row.get(5)?)?,
        updated_at: parse_ts(6, row.get(6)?)?,
    })
}

fn epic_state_from_row(row: &Row) -> rusqlite::Result<EpicWorkflowState> {
    Ok(EpicWorkflowState {
        epic_id: row.get(0)?,
        branch_name: row.get(1)?,
        branch_created_at: parse_opt_ts(2, row.get(2)?)?,
        worktree_path: row.get(3)?,
        current_ticket_id: row.get(4)?,
        pr_number: row.get(5)?,
        pr_url: row.get(6)?,
        pr_status: row.get(7)?,
        tickets_total: row.get(8)?,
        tickets_done: row.get(9)?,
        updated_at: parse_ts(10, row.get(10)?)?,
    })
}

fn ticket_state_from_row(row: &Row) -> rusqlite::Result<TicketWorkflowState> {
    Ok(TicketWorkflowState {
        ticket_id: row.get(0)?,
        phase: parse_enum::<WorkflowPhase>(1, row.get(1)?)?,
        review_iteration: row.get(2)?,
        findings_raised: row.get(3)?,
        findings_fixed: row.get(4)?,
        updated_at: parse_ts(5, row.get(5)?)?,
    })
}

fn finding_from_row(row: &Row) -> rusqlite::Result<ReviewFinding> {
    Ok(ReviewFinding {
        id: row.get(0)?,
        ticket_id: row.get(1)?,
        reviewer: row.get(2)?,
        severity: parse_enum::<FindingSeverity>(3, row.get(3)?)?,
        category: row.get(4)?,
        description: row.get(5)?,
        fix_status: parse_enum::<FixStatus>(6, row.get(6)?)?,
        fix_description: row.get(7)?,
        created_at: parse_ts(8, row.get(8)?)?,
        fixed_at: parse_opt_ts(9, row.get(9)?)?,
    })
}

fn session_from_row(row: &Row) -> rusqlite::Result<ConversationSession> {
    Ok(ConversationSession {
        id: row.get(0)?,
        ticket_id: row.get(1)?,
        project_id: row.get(2)?,
        environment: row.get(3)?,
        started_at: parse_ts(4, row.get(4)?)?,
        ended_at: parse_opt_ts(5, row.get(5)?)?,
    })
}

/// Map a no-rows query error to NotFound with a domain message.
fn not_found(e: rusqlite::Error, msg: &str) -> Error {
    match e {
        rusqlite::Error::QueryReturnedNoRows => Error::NotFound(msg.to_string()),
        other => Error::Database(other),
    }
}

// === Paths & ids ===

/// Get the storage directory for a repository.
///
/// Uses a hash of the repository path to create a unique directory under
/// `$CAPSTAN_DATA_DIR` (if set) or the platform data directory.
pub fn get_storage_dir(repo_path: &Path) -> Result<PathBuf> {
    let data_dir = match std::env::var_os("CAPSTAN_DATA_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => dirs::data_dir()
            .ok_or_else(|| Error::Other("Could not determine data directory".to_string()))?
            .join("capstan"),
    };
    storage_dir_under(&data_dir, repo_path)
}

fn storage_dir_under(data_dir: &Path, repo_path: &Path) -> Result<PathBuf> {
    let repo_canonical = repo_path
        .canonicalize()
        .map_err(|e| Error::Other(format!("Could not canonicalize repo path: {}", e)))?;

    let mut hasher = Sha256::new();
    hasher.update(repo_canonical.to_string_lossy().as_bytes());
    let hash = hasher.finalize();
    let hash_hex = format!("{:x}", hash);
    let short_hash = &hash_hex[..12];

    Ok(data_dir.join(short_hash))
}

/// Walk up from `start` looking for a `.git` entry.
pub fn find_git_root(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        if current.join(".git").exists() {
            return Some(current);
        }
        if !current.pop() {
            return None;
        }
    }
}

/// Generate a unique 32-hex-char entity id.
///
/// The first 8 characters form the short id used in branch names, so ids are
/// hex throughout rather than carrying a type prefix.
pub fn generate_id(seed: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    hasher.update(
        chrono::Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or(0)
            .to_le_bytes(),
    );
    let hash = hasher.finalize();
    let hash_hex = format!("{:x}", hash);
    hash_hex[..32].to_string()
}

/// Validate that an entity id is 32 lowercase hex characters.
pub fn validate_id(id: &str) -> Result<()> {
    if id.len() != 32 || !id.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::InvalidId(format!(
            "ID must be 32 hex characters, got: {}",
            id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_storage() -> (TempDir, TempDir, Storage) {
        let repo = TempDir::new().unwrap();
        let data = TempDir::new().unwrap();
        let storage = Storage::init_with_data_dir(repo.path(), data.path()).unwrap();
        (repo, data, storage)
    }

    fn seed_project(storage: &Storage) -> Project {
        let project = Project::new(
            generate_id("proj"),
            "demo".to_string(),
            "/tmp/demo".to_string(),
        );
        storage.insert_project(&project).unwrap();
        project
    }

    #[test]
    fn test_generate_id_format() {
        let id = generate_id("Add login form");
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        validate_id(&id).unwrap();
    }

    #[test]
    fn test_validate_id_rejects_bad_input() {
        assert!(validate_id("short").is_err());
        assert!(validate_id(&"g".repeat(32)).is_err());
        assert!(validate_id(&"a".repeat(32)).is_ok());
    }

    #[test]
    fn test_open_uninitialized_fails() {
        let repo = TempDir::new().unwrap();
        let data = TempDir::new().unwrap();
        let result = Storage::open_with_data_dir(repo.path(), data.path());
        assert!(matches!(result, Err(Error::NotInitialized)));
    }

    #[test]
    fn test_ticket_crud_roundtrip() {
        let (_repo, _data, storage) = create_test_storage();
        let project = seed_project(&storage);

        let mut ticket = Ticket::new(
            generate_id("Add login form"),
            "Add login form".to_string(),
            project.id.clone(),
        );
        ticket.tags = vec!["auth".to_string(), "frontend".to_string()];
        storage.insert_ticket(&ticket).unwrap();

        let loaded = storage.get_ticket(&ticket.id).unwrap();
        assert_eq!(loaded.title, "Add login form");
        assert_eq!(loaded.status, TicketStatus::Backlog);
        assert_eq!(loaded.tags, vec!["auth", "frontend"]);
        assert!(loaded.branch_name.is_none());
    }

    #[test]
    fn test_get_missing_ticket_is_not_found() {
        let (_repo, _data, storage) = create_test_storage();
        let err = storage.get_ticket(&"0".repeat(32)).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_list_tickets_filters_by_status_and_epic() {
        let (_repo, _data, storage) = create_test_storage();
        let project = seed_project(&storage);

        let epic = Epic::new(
            generate_id("Checkout flow"),
            "Checkout flow".to_string(),
            project.id.clone(),
        );
        storage.insert_epic(&epic).unwrap();

        let mut in_epic = Ticket::new(
            generate_id("Cart page"),
            "Cart page".to_string(),
            project.id.clone(),
        );
        in_epic.epic_id = Some(epic.id.clone());
        storage.insert_ticket(&in_epic).unwrap();

        let loose = Ticket::new(
            generate_id("Fix typo"),
            "Fix typo".to_string(),
            project.id.clone(),
        );
        storage.insert_ticket(&loose).unwrap();
        storage
            .set_ticket_status(&loose.id, TicketStatus::Ready)
            .unwrap();

        let backlog = storage
            .list_tickets(Some(TicketStatus::Backlog), None)
            .unwrap();
        assert_eq!(backlog.len(), 1);
        assert_eq!(backlog[0].id, in_epic.id);

        let by_epic = storage.list_tickets(None, Some(&epic.id)).unwrap();
        assert_eq!(by_epic.len(), 1);
        assert_eq!(by_epic[0].id, in_epic.id);
    }

    #[test]
    fn test_start_transition_sets_status_and_branch_atomically() {
        let (_repo, _data, storage) = create_test_storage();
        let project = seed_project(&storage);
        let ticket = Ticket::new(
            generate_id("Login"),
            "Login".to_string(),
            project.id.clone(),
        );
        storage.insert_ticket(&ticket).unwrap();

        storage
            .persist_start_transition(&ticket.id, "feature/abcd1234-login")
            .unwrap();

        let loaded = storage.get_ticket(&ticket.id).unwrap();
        assert_eq!(loaded.status, TicketStatus::InProgress);
        assert_eq!(
            loaded.branch_name.as_deref(),
            Some("feature/abcd1234-login")
        );
    }

    #[test]
    fn test_done_sets_completed_at() {
        let (_repo, _data, storage) = create_test_storage();
        let project = seed_project(&storage);
        let ticket = Ticket::new(
            generate_id("Ship it"),
            "Ship it".to_string(),
            project.id.clone(),
        );
        storage.insert_ticket(&ticket).unwrap();

        storage
            .set_ticket_status(&ticket.id, TicketStatus::Done)
            .unwrap();
        let loaded = storage.get_ticket(&ticket.id).unwrap();
        assert_eq!(loaded.status, TicketStatus::Done);
        assert!(loaded.completed_at.is_some());
    }

    #[test]
    fn test_epic_state_upsert_and_reload() {
        let (_repo, _data, storage) = create_test_storage();
        let project = seed_project(&storage);
        let epic = Epic::new(
            generate_id("Payments"),
            "Payments".to_string(),
            project.id.clone(),
        );
        storage.insert_epic(&epic).unwrap();

        assert!(storage.get_epic_state(&epic.id).unwrap().is_none());

        let mut state = EpicWorkflowState::new(epic.id.clone());
        state.branch_name = Some("feature/epic-abcd1234-payments".to_string());
        state.branch_created_at = Some(Utc::now());
        storage.upsert_epic_state(&state).unwrap();

        let loaded = storage.get_epic_state(&epic.id).unwrap().unwrap();
        assert_eq!(
            loaded.branch_name.as_deref(),
            Some("feature/epic-abcd1234-payments")
        );

        // Update survives and keeps the row unique.
        state.pr_number = Some(42);
        state.pr_status = Some("draft".to_string());
        storage.upsert_epic_state(&state).unwrap();
        let loaded = storage.get_epic_state(&epic.id).unwrap().unwrap();
        assert_eq!(loaded.pr_number, Some(42));
    }

    #[test]
    fn test_ticket_state_upsert() {
        let (_repo, _data, storage) = create_test_storage();
        let project = seed_project(&storage);
        let ticket = Ticket::new(
            generate_id("Login"),
            "Login".to_string(),
            project.id.clone(),
        );
        storage.insert_ticket(&ticket).unwrap();

        let mut state = TicketWorkflowState::new(ticket.id.clone());
        storage.upsert_ticket_state(&state).unwrap();

        state.review_iteration = 1;
        state.phase = WorkflowPhase::AiReview;
        storage.upsert_ticket_state(&state).unwrap();

        let loaded = storage.get_ticket_state(&ticket.id).unwrap().unwrap();
        assert_eq!(loaded.review_iteration, 1);
        assert_eq!(loaded.phase, WorkflowPhase::AiReview);
    }

    #[test]
    fn test_findings_are_append_only() {
        let (_repo, _data, storage) = create_test_storage();
        let project = seed_project(&storage);
        let ticket = Ticket::new(
            generate_id("Login"),
            "Login".to_string(),
            project.id.clone(),
        );
        storage.insert_ticket(&ticket).unwrap();

        let finding = ReviewFinding::new(
            generate_id("finding"),
            ticket.id.clone(),
            "reviewer-agent".to_string(),
            FindingSeverity::Major,
            "correctness".to_string(),
            "missing null check".to_string(),
        );
        storage.insert_finding(&finding).unwrap();
        storage
            .mark_finding_fixed(&finding.id, Some("added check"))
            .unwrap();

        let listed = storage.list_findings(&ticket.id).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].fix_status, FixStatus::Fixed);
        assert_eq!(listed[0].fix_description.as_deref(), Some("added check"));
        assert!(listed[0].fixed_at.is_some());
    }

    #[test]
    fn test_sessions_end_open() {
        let (_repo, _data, storage) = create_test_storage();
        let project = seed_project(&storage);
        let ticket = Ticket::new(
            generate_id("Login"),
            "Login".to_string(),
            project.id.clone(),
        );
        storage.insert_ticket(&ticket).unwrap();

        let session = ConversationSession::new(
            generate_id("session"),
            ticket.id.clone(),
            project.id.clone(),
            "terminal".to_string(),
        );
        storage.insert_session(&session).unwrap();
        assert!(storage.active_session(&ticket.id).unwrap().is_some());

        let ended = storage.end_open_sessions(&ticket.id).unwrap();
        assert_eq!(ended, 1);
        assert!(storage.active_session(&ticket.id).unwrap().is_none());

        // Ending again is a no-op.
        assert_eq!(storage.end_open_sessions(&ticket.id).unwrap(), 0);
    }

    #[test]
    fn test_demo_steps_replace() {
        let (_repo, _data, storage) = create_test_storage();
        let project = seed_project(&storage);
        let ticket = Ticket::new(
            generate_id("Login"),
            "Login".to_string(),
            project.id.clone(),
        );
        storage.insert_ticket(&ticket).unwrap();

        let steps = vec![
            "Open the login page".to_string(),
            "Submit valid credentials".to_string(),
            "Verify redirect to dashboard".to_string(),
        ];
        storage.replace_demo_steps(&ticket.id, &steps).unwrap();
        assert_eq!(storage.list_demo_steps(&ticket.id).unwrap(), steps);

        let fewer = vec!["One".to_string(), "Two".to_string(), "Three".to_string()];
        storage.replace_demo_steps(&ticket.id, &fewer).unwrap();
        assert_eq!(storage.list_demo_steps(&ticket.id).unwrap(), fewer);
    }

    #[test]
    fn test_subtasks_and_attachments() {
        let (_repo, _data, storage) = create_test_storage();
        let project = seed_project(&storage);
        let ticket = Ticket::new(
            generate_id("Login"),
            "Login".to_string(),
            project.id.clone(),
        );
        storage.insert_ticket(&ticket).unwrap();

        let p1 = storage.add_subtask(&ticket.id, "Write form").unwrap();
        let p2 = storage.add_subtask(&ticket.id, "Wire backend").unwrap();
        assert_eq!((p1, p2), (1, 2));

        storage.set_subtask_done(&ticket.id, 1, true).unwrap();
        let subtasks = storage.list_subtasks(&ticket.id).unwrap();
        assert_eq!(subtasks[0], (1, "Write form".to_string(), true));
        assert_eq!(subtasks[1], (2, "Wire backend".to_string(), false));

        storage
            .add_attachment(&ticket.id, "mock.png", "/tmp/mock.png")
            .unwrap();
        let attachments = storage.list_attachments(&ticket.id).unwrap();
        assert_eq!(
            attachments,
            vec![("mock.png".to_string(), "/tmp/mock.png".to_string())]
        );
    }

    #[test]
    fn test_config_roundtrip() {
        let (_repo, _data, storage) = create_test_storage();
        assert_eq!(storage.get_config("action_log_enabled").unwrap(), None);
        storage.set_config("action_log_enabled", "false").unwrap();
        assert_eq!(
            storage.get_config("action_log_enabled").unwrap().as_deref(),
            Some("false")
        );
        storage.set_config("action_log_enabled", "true").unwrap();
        assert_eq!(
            storage.get_config("action_log_enabled").unwrap().as_deref(),
            Some("true")
        );
    }

    #[test]
    fn test_epic_ticket_counts() {
        let (_repo, _data, storage) = create_test_storage();
        let project = seed_project(&storage);
        let epic = Epic::new(
            generate_id("Payments"),
            "Payments".to_string(),
            project.id.clone(),
        );
        storage.insert_epic(&epic).unwrap();

        for title in ["A", "B", "C"] {
            let mut ticket = Ticket::new(
                generate_id(title),
                title.to_string(),
                project.id.clone(),
            );
            ticket.epic_id = Some(epic.id.clone());
            storage.insert_ticket(&ticket).unwrap();
            if title == "C" {
                storage
                    .set_ticket_status(&ticket.id, TicketStatus::Done)
                    .unwrap();
            }
        }

        assert_eq!(storage.epic_ticket_counts(&epic.id).unwrap(), (3, 1));
    }

    #[test]
    fn test_resolve_id_prefix() {
        let (_repo, _data, storage) = create_test_storage();
        let project = seed_project(&storage);
        let ticket = Ticket::new(
            generate_id("Login"),
            "Login".to_string(),
            project.id.clone(),
        );
        storage.insert_ticket(&ticket).unwrap();

        let resolved = storage.resolve_ticket_id(&ticket.id[..8]).unwrap();
        assert_eq!(resolved, ticket.id);

        assert!(matches!(
            storage.resolve_ticket_id("abc"),
            Err(Error::InvalidId(_))
        ));

        // A prefix guaranteed not to match the seeded ticket.
        let missing = if ticket.id.starts_with('0') { "1" } else { "0" }.repeat(8);
        assert!(matches!(
            storage.resolve_ticket_id(&missing),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_find_git_root() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("a/b/c");
        fs::create_dir_all(&nested).unwrap();
        assert_eq!(find_git_root(&nested), None);

        fs::create_dir(temp.path().join(".git")).unwrap();
        assert_eq!(
            find_git_root(&nested).unwrap(),
            temp.path().to_path_buf()
        );
    }
}
