//! Conversation-session auditing.
//!
//! Opens and closes compliance-log sessions bound to a ticket, independent
//! of the lifecycle components. At most one active session per ticket is
//! meaningful, so opening a new one always ends stragglers first.

use crate::models::ConversationSession;
use crate::storage::Storage;
use crate::{Result, models::Ticket};
use serde::Serialize;
use uuid::Uuid;

/// Result of `session start`.
#[derive(Debug, Serialize)]
pub struct SessionStartReport {
    /// The newly opened session
    pub session: ConversationSession,
    /// How many straggler sessions were closed first
    pub stragglers_ended: usize,
}

/// Result of `session end`.
#[derive(Debug, Serialize)]
pub struct SessionEndReport {
    /// How many open sessions were closed
    pub ended: usize,
}

/// Open an audit session for a ticket, closing any stragglers first.
pub fn start_session(
    storage: &Storage,
    ticket: &Ticket,
    environment: &str,
) -> Result<SessionStartReport> {
    let stragglers_ended = storage.end_open_sessions(&ticket.id)?;
    let session = ConversationSession::new(
        Uuid::new_v4().simple().to_string(),
        ticket.id.clone(),
        ticket.project_id.clone(),
        environment.to_string(),
    );
    storage.insert_session(&session)?;
    Ok(SessionStartReport {
        session,
        stragglers_ended,
    })
}

/// Close every open session for a ticket.
pub fn end_session(storage: &Storage, ticket: &Ticket) -> Result<SessionEndReport> {
    let ended = storage.end_open_sessions(&ticket.id)?;
    Ok(SessionEndReport { ended })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Project, Ticket};
    use crate::storage::{Storage, generate_id};
    use tempfile::TempDir;

    fn setup() -> (TempDir, TempDir, Storage, Ticket) {
        let repo = TempDir::new().unwrap();
        let data = TempDir::new().unwrap();
        let storage = Storage::init_with_data_dir(repo.path(), data.path()).unwrap();
        let project = Project::new(
            generate_id("proj"),
            "demo".to_string(),
            repo.path().to_string_lossy().to_string(),
        );
        storage.insert_project(&project).unwrap();
        let ticket = Ticket::new(
            generate_id("Login"),
            "Login".to_string(),
            project.id.clone(),
        );
        storage.insert_ticket(&ticket).unwrap();
        (repo, data, storage, ticket)
    }

    #[test]
    fn test_start_session_opens_one_active() {
        let (_repo, _data, storage, ticket) = setup();
        let report = start_session(&storage, &ticket, "terminal").unwrap();
        assert_eq!(report.stragglers_ended, 0);
        assert!(report.session.is_active());
        assert!(storage.active_session(&ticket.id).unwrap().is_some());
    }

    #[test]
    fn test_start_session_ends_stragglers() {
        let (_repo, _data, storage, ticket) = setup();
        start_session(&storage, &ticket, "terminal").unwrap();
        let second = start_session(&storage, &ticket, "sandbox").unwrap();
        assert_eq!(second.stragglers_ended, 1);

        // Only the newest session remains active.
        let active = storage.active_session(&ticket.id).unwrap().unwrap();
        assert_eq!(active.id, second.session.id);
        assert_eq!(storage.list_sessions(&ticket.id).unwrap().len(), 2);
    }

    #[test]
    fn test_end_session_closes_open() {
        let (_repo, _data, storage, ticket) = setup();
        start_session(&storage, &ticket, "terminal").unwrap();
        let report = end_session(&storage, &ticket).unwrap();
        assert_eq!(report.ended, 1);
        assert!(storage.active_session(&ticket.id).unwrap().is_none());

        // Ending with nothing open is a no-op.
        assert_eq!(end_session(&storage, &ticket).unwrap().ended, 0);
    }
}
